use exam_core::model::{ExamResult, Question};

/// Label used when a question was left unanswered.
pub const NOT_ANSWERED: &str = "Not answered";

/// One row of the post-exam review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewItem {
    pub question_text: String,
    pub selected_answer: String,
    /// Empty when the question had no answer flagged correct.
    pub correct_answer: String,
    pub is_correct: bool,
    pub explanation: Option<String>,
}

/// Join a result with the questions it was scored against.
///
/// Outcomes whose question is missing from `questions` are skipped.
#[must_use]
pub fn review_items(result: &ExamResult, questions: &[Question]) -> Vec<ReviewItem> {
    result
        .per_question()
        .iter()
        .filter_map(|outcome| {
            let question = questions.iter().find(|q| q.id() == outcome.question_id)?;
            let text_of = |id| question.answer(id).map(|a| a.text().to_owned());
            Some(ReviewItem {
                question_text: question.text().to_owned(),
                selected_answer: outcome
                    .selected_answer_id
                    .and_then(text_of)
                    .unwrap_or_else(|| NOT_ANSWERED.to_owned()),
                correct_answer: outcome
                    .correct_answer_id
                    .and_then(text_of)
                    .unwrap_or_default(),
                is_correct: outcome.is_correct,
                explanation: question.explanation().map(str::to_owned),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::ScoringEngine;
    use exam_core::model::{
        AnswerDraft, AnswerId, AnswerMap, CategoryId, Difficulty, QuestionDraft, QuestionId,
    };

    fn questions() -> Vec<Question> {
        vec![
            QuestionDraft {
                id: QuestionId::new(1),
                text: "Capital of Germany?".into(),
                explanation: Some("Berlin since 1990.".into()),
                difficulty: Difficulty::Easy,
                category_id: CategoryId::new(1),
                answers: vec![
                    AnswerDraft::new(AnswerId::new(1), "Berlin", true),
                    AnswerDraft::new(AnswerId::new(2), "Bonn", false),
                ],
            },
            QuestionDraft {
                id: QuestionId::new(2),
                text: "Broken question".into(),
                explanation: None,
                difficulty: Difficulty::Hard,
                category_id: CategoryId::new(1),
                answers: vec![AnswerDraft::new(AnswerId::new(3), "Nothing right", false)],
            },
        ]
        .into_iter()
        .map(|d| d.validate().unwrap())
        .collect()
    }

    #[test]
    fn review_resolves_answer_texts() {
        let questions = questions();
        let mut answers = AnswerMap::new();
        answers.select(QuestionId::new(1), AnswerId::new(2));
        let result = ScoringEngine::new(1).score(&questions, &answers, 60, 0);

        let items = review_items(&result, &questions);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].selected_answer, "Bonn");
        assert_eq!(items[0].correct_answer, "Berlin");
        assert!(!items[0].is_correct);
        assert_eq!(items[0].explanation.as_deref(), Some("Berlin since 1990."));

        assert_eq!(items[1].selected_answer, NOT_ANSWERED);
        assert_eq!(items[1].correct_answer, "");
    }
}
