use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{AnswerId, QuestionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamResultError {
    #[error("correct answers ({correct}) exceed total questions ({total})")]
    TooManyCorrect { correct: u32, total: u32 },

    #[error("expected {expected} per-question outcomes, found {found}")]
    OutcomeCountMismatch { expected: u32, found: usize },

    #[error("correct answers ({stored}) do not match outcomes ({counted})")]
    CorrectCountMismatch { stored: u32, counted: u32 },

    #[error("passed flag does not match threshold {threshold} for {correct} correct")]
    VerdictMismatch { correct: u32, threshold: u32 },
}

/// Scoring outcome of a single question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question_id: QuestionId,
    pub selected_answer_id: Option<AnswerId>,
    /// First answer flagged correct. `None` when the question has no correct answer.
    pub correct_answer_id: Option<AnswerId>,
    pub is_correct: bool,
}

/// Final, immutable result of an exam session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamResult {
    total_questions: u32,
    correct_answers: u32,
    time_spent_secs: u64,
    passing_threshold: u32,
    passed: bool,
    per_question: Vec<QuestionOutcome>,
}

impl ExamResult {
    pub(crate) fn new(
        time_spent_secs: u64,
        passing_threshold: u32,
        per_question: Vec<QuestionOutcome>,
    ) -> Self {
        let total_questions = u32::try_from(per_question.len()).unwrap_or(u32::MAX);
        let correct = per_question.iter().filter(|o| o.is_correct).count();
        let correct_answers = u32::try_from(correct).unwrap_or(u32::MAX);
        Self {
            total_questions,
            correct_answers,
            time_spent_secs,
            passing_threshold,
            passed: correct_answers >= passing_threshold,
            per_question,
        }
    }

    /// Rehydrate a result from persisted storage, checking internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `ExamResultError` if counts, outcomes and verdict disagree.
    pub fn from_persisted(
        total_questions: u32,
        correct_answers: u32,
        time_spent_secs: u64,
        passing_threshold: u32,
        passed: bool,
        per_question: Vec<QuestionOutcome>,
    ) -> Result<Self, ExamResultError> {
        if correct_answers > total_questions {
            return Err(ExamResultError::TooManyCorrect {
                correct: correct_answers,
                total: total_questions,
            });
        }
        if u32::try_from(per_question.len()).ok() != Some(total_questions) {
            return Err(ExamResultError::OutcomeCountMismatch {
                expected: total_questions,
                found: per_question.len(),
            });
        }
        let counted = per_question.iter().filter(|o| o.is_correct).count();
        let counted = u32::try_from(counted).unwrap_or(u32::MAX);
        if counted != correct_answers {
            return Err(ExamResultError::CorrectCountMismatch {
                stored: correct_answers,
                counted,
            });
        }
        if passed != (correct_answers >= passing_threshold) {
            return Err(ExamResultError::VerdictMismatch {
                correct: correct_answers,
                threshold: passing_threshold,
            });
        }

        Ok(Self {
            total_questions,
            correct_answers,
            time_spent_secs,
            passing_threshold,
            passed,
            per_question,
        })
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn correct_answers(&self) -> u32 {
        self.correct_answers
    }

    #[must_use]
    pub fn time_spent_secs(&self) -> u64 {
        self.time_spent_secs
    }

    #[must_use]
    pub fn passing_threshold(&self) -> u32 {
        self.passing_threshold
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.passed
    }

    #[must_use]
    pub fn per_question(&self) -> &[QuestionOutcome] {
        &self.per_question
    }

    #[must_use]
    pub fn unanswered(&self) -> u32 {
        let n = self
            .per_question
            .iter()
            .filter(|o| o.selected_answer_id.is_none())
            .count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    /// Score as a whole percentage, rounded half away from zero.
    #[must_use]
    pub fn score_percent(&self) -> u32 {
        if self.total_questions == 0 {
            return 0;
        }
        let correct = u64::from(self.correct_answers);
        let total = u64::from(self.total_questions);
        let rounded = (correct * 200 + total) / (total * 2);
        u32::try_from(rounded).unwrap_or(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: u64, is_correct: bool) -> QuestionOutcome {
        QuestionOutcome {
            question_id: QuestionId::new(id),
            selected_answer_id: Some(AnswerId::new(id * 10)),
            correct_answer_id: Some(AnswerId::new(id * 10)),
            is_correct,
        }
    }

    #[test]
    fn new_counts_correct_and_verdict() {
        let result = ExamResult::new(
            30,
            2,
            vec![outcome(1, true), outcome(2, true), outcome(3, false)],
        );
        assert_eq!(result.total_questions(), 3);
        assert_eq!(result.correct_answers(), 2);
        assert!(result.passed());
        assert_eq!(result.score_percent(), 67);
    }

    #[test]
    fn from_persisted_rejects_inconsistent_verdict() {
        let err =
            ExamResult::from_persisted(1, 1, 10, 1, false, vec![outcome(1, true)]).unwrap_err();
        assert!(matches!(err, ExamResultError::VerdictMismatch { .. }));
    }

    #[test]
    fn from_persisted_rejects_outcome_mismatch() {
        let err =
            ExamResult::from_persisted(2, 1, 10, 1, true, vec![outcome(1, true)]).unwrap_err();
        assert!(matches!(err, ExamResultError::OutcomeCountMismatch { .. }));
    }

    #[test]
    fn score_percent_handles_empty() {
        let result = ExamResult::new(0, 0, Vec::new());
        assert_eq!(result.score_percent(), 0);
        assert!(result.passed());
    }

    #[test]
    fn serializes_to_json() {
        let result = ExamResult::new(5, 1, vec![outcome(1, true)]);
        let json = serde_json::to_string(&result).unwrap();
        let back: ExamResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
