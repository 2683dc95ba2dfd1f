use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{AnswerId, CategoryId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {0} has empty text")]
    EmptyText(QuestionId),

    #[error("question {0} has no answers")]
    NoAnswers(QuestionId),

    #[error("unknown difficulty: {0}")]
    UnknownDifficulty(String),
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            _ => Err(QuestionError::UnknownDifficulty(s.to_string())),
        }
    }
}

//
// ─── DRAFTS ────────────────────────────────────────────────────────────────────
//

/// Unvalidated answer option as it comes out of a question source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerDraft {
    pub id: AnswerId,
    pub text: String,
    pub is_correct: bool,
}

impl AnswerDraft {
    #[must_use]
    pub fn new(id: AnswerId, text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            id,
            text: text.into(),
            is_correct,
        }
    }
}

/// Unvalidated question as it comes out of a question source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub id: QuestionId,
    pub text: String,
    pub explanation: Option<String>,
    pub difficulty: Difficulty,
    pub category_id: CategoryId,
    pub answers: Vec<AnswerDraft>,
}

impl QuestionDraft {
    /// Validate the draft into an immutable `Question`.
    ///
    /// Only the question text and the presence of answers are checked. Blank
    /// answer options are kept as they are, and a repeated answer id resolves to
    /// its first occurrence. The number of answers flagged correct is not checked.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` describing the first structural problem found.
    pub fn validate(self) -> Result<Question, QuestionError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(QuestionError::EmptyText(self.id));
        }
        if self.answers.is_empty() {
            return Err(QuestionError::NoAnswers(self.id));
        }

        let answers = self
            .answers
            .into_iter()
            .map(|draft| Answer {
                id: draft.id,
                question_id: self.id,
                text: draft.text.trim().to_string(),
                is_correct: draft.is_correct,
            })
            .collect();

        let explanation = self
            .explanation
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        Ok(Question {
            id: self.id,
            text: text.to_string(),
            explanation,
            difficulty: self.difficulty,
            category_id: self.category_id,
            answers,
        })
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    id: AnswerId,
    question_id: QuestionId,
    text: String,
    is_correct: bool,
}

impl Answer {
    #[must_use]
    pub fn id(&self) -> AnswerId {
        self.id
    }

    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.is_correct
    }
}

/// A validated multiple-choice question. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    text: String,
    explanation: Option<String>,
    difficulty: Difficulty,
    category_id: CategoryId,
    answers: Vec<Answer>,
}

impl Question {
    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn category_id(&self) -> CategoryId {
        self.category_id
    }

    /// Answer options in presentation order.
    #[must_use]
    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    #[must_use]
    pub fn answer(&self, id: AnswerId) -> Option<&Answer> {
        self.answers.iter().find(|a| a.id == id)
    }

    #[must_use]
    pub fn has_answer(&self, id: AnswerId) -> bool {
        self.answer(id).is_some()
    }

    /// Ids of every answer flagged correct, in presentation order.
    pub fn correct_answer_ids(&self) -> impl Iterator<Item = AnswerId> + '_ {
        self.answers.iter().filter(|a| a.is_correct).map(|a| a.id)
    }

    /// First answer flagged correct, if any.
    #[must_use]
    pub fn correct_answer(&self) -> Option<&Answer> {
        self.answers.iter().find(|a| a.is_correct)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
