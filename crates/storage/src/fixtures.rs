//! Built-in question set used for seeding and as an offline fallback.

use async_trait::async_trait;
use exam_core::model::{
    AnswerDraft, AnswerId, CategoryId, Difficulty, Question, QuestionDraft, QuestionId,
};

use crate::repository::{LoadError, QuestionSetLoader, select_valid};

struct Sample {
    text: &'static str,
    explanation: Option<&'static str>,
    difficulty: Difficulty,
    category: u64,
    answers: [&'static str; 4],
    correct: usize,
}

const SAMPLES: &[Sample] = &[
    Sample {
        text: "Which body elects the Federal Chancellor?",
        explanation: Some("The Chancellor is elected by the members of the Bundestag."),
        difficulty: Difficulty::Easy,
        category: 1,
        answers: [
            "The Bundestag",
            "The Bundesrat",
            "The people directly",
            "The Federal President",
        ],
        correct: 0,
    },
    Sample {
        text: "How many federal states does Germany have?",
        explanation: None,
        difficulty: Difficulty::Easy,
        category: 2,
        answers: ["14", "15", "16", "17"],
        correct: 2,
    },
    Sample {
        text: "What does freedom of the press mean?",
        explanation: Some("Journalists may report without state censorship."),
        difficulty: Difficulty::Medium,
        category: 1,
        answers: [
            "Newspapers may only report approved news",
            "Journalists may report their opinion",
            "Only state media may publish",
            "The government decides what is printed",
        ],
        correct: 1,
    },
    Sample {
        text: "In which year was the Berlin Wall built?",
        explanation: None,
        difficulty: Difficulty::Medium,
        category: 3,
        answers: ["1949", "1953", "1961", "1989"],
        correct: 2,
    },
    Sample {
        text: "Who appoints the federal ministers?",
        explanation: Some(
            "Ministers are appointed by the Federal President on the Chancellor's proposal.",
        ),
        difficulty: Difficulty::Hard,
        category: 1,
        answers: [
            "The Federal President",
            "The President of the Bundestag",
            "The Bundesrat",
            "The Federal Constitutional Court",
        ],
        correct: 0,
    },
    Sample {
        text: "What is the minimum voting age for Bundestag elections?",
        explanation: None,
        difficulty: Difficulty::Easy,
        category: 2,
        answers: ["16", "18", "21", "25"],
        correct: 1,
    },
];

/// The built-in sample questions as raw drafts.
///
/// Question ids start at 1; answer ids are `question_id * 10 + position`.
#[must_use]
pub fn sample_questions() -> Vec<QuestionDraft> {
    SAMPLES
        .iter()
        .zip(1_u64..)
        .map(|(sample, id)| QuestionDraft {
            id: QuestionId::new(id),
            text: sample.text.to_string(),
            explanation: sample.explanation.map(str::to_string),
            difficulty: sample.difficulty,
            category_id: CategoryId::new(sample.category),
            answers: sample
                .answers
                .iter()
                .zip(0_u64..)
                .map(|(text, pos)| {
                    AnswerDraft::new(
                        AnswerId::new(id * 10 + pos),
                        *text,
                        usize::try_from(pos).is_ok_and(|p| p == sample.correct),
                    )
                })
                .collect(),
        })
        .collect()
}

/// Loader serving the built-in sample questions in a fixed order.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticQuestionSet;

#[async_trait]
impl QuestionSetLoader for StaticQuestionSet {
    async fn load(&self, desired_count: u32) -> Result<Vec<Question>, LoadError> {
        select_valid(sample_questions(), desired_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_sample_is_well_formed_with_one_correct_answer() {
        for draft in sample_questions() {
            let q = draft.validate().unwrap();
            assert_eq!(q.correct_answer_ids().count(), 1, "question {}", q.id());
        }
    }

    #[tokio::test]
    async fn static_set_honors_desired_count() {
        let questions = StaticQuestionSet.load(2).await.unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].id(), QuestionId::new(1));

        let all = StaticQuestionSet.load(100).await.unwrap();
        assert_eq!(all.len(), SAMPLES.len());
    }
}
