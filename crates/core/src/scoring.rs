use crate::model::{AnswerMap, ExamResult, Question, QuestionOutcome};

//
// ─── SCORING ENGINE ────────────────────────────────────────────────────────────
//

/// Pure scorer turning a question set and final selections into an `ExamResult`.
///
/// Scoring is deterministic: the same inputs always produce an equal result.
///
/// # Malformed questions
///
/// - No answer flagged correct: the question is always scored incorrect.
/// - Several answers flagged correct: selecting any of them scores correct.
///
/// # Examples
///
/// ```
/// # use exam_core::ScoringEngine;
/// # use exam_core::model::{
/// #     AnswerDraft, AnswerId, AnswerMap, CategoryId, Difficulty, QuestionDraft, QuestionId,
/// # };
/// let question = QuestionDraft {
///     id: QuestionId::new(1),
///     text: "Capital?".into(),
///     explanation: None,
///     difficulty: Difficulty::Easy,
///     category_id: CategoryId::new(1),
///     answers: vec![
///         AnswerDraft::new(AnswerId::new(1), "Berlin", true),
///         AnswerDraft::new(AnswerId::new(2), "Bonn", false),
///     ],
/// }
/// .validate()?;
///
/// let mut answers = AnswerMap::new();
/// answers.select(QuestionId::new(1), AnswerId::new(1));
///
/// let result = ScoringEngine::new(1).score(&[question], &answers, 60, 45);
/// assert!(result.passed());
/// assert_eq!(result.time_spent_secs(), 15);
/// # Ok::<(), exam_core::model::QuestionError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringEngine {
    passing_threshold: u32,
}

impl ScoringEngine {
    #[must_use]
    pub fn new(passing_threshold: u32) -> Self {
        Self { passing_threshold }
    }

    #[must_use]
    pub fn passing_threshold(&self) -> u32 {
        self.passing_threshold
    }

    /// Score `questions` in order against `answers`.
    ///
    /// Time spent is `duration_secs - remaining_secs`, saturating at zero.
    #[must_use]
    pub fn score(
        &self,
        questions: &[Question],
        answers: &AnswerMap,
        duration_secs: u64,
        remaining_secs: u64,
    ) -> ExamResult {
        let per_question = questions
            .iter()
            .map(|q| Self::score_question(q, answers))
            .collect();
        ExamResult::new(
            duration_secs.saturating_sub(remaining_secs),
            self.passing_threshold,
            per_question,
        )
    }

    fn score_question(question: &Question, answers: &AnswerMap) -> QuestionOutcome {
        let selected = answers.get(question.id());
        let is_correct = selected
            .and_then(|id| question.answer(id))
            .is_some_and(|answer| answer.is_correct());
        QuestionOutcome {
            question_id: question.id(),
            selected_answer_id: selected,
            correct_answer_id: question.correct_answer().map(|a| a.id()),
            is_correct,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
