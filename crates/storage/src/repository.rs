use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::model::{ExamResult, Question, QuestionDraft};
use rand::seq::SliceRandom;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::warn;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Why a question set could not be produced.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LoadError {
    #[error("no valid questions available")]
    NoQuestionsAvailable,

    #[error("question source unavailable: {0}")]
    SourceUnavailable(String),
}

impl From<StorageError> for LoadError {
    fn from(err: StorageError) -> Self {
        LoadError::SourceUnavailable(err.to_string())
    }
}

/// Persisted exam result together with its row id and completion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamResultRow {
    pub id: i64,
    pub completed_at: DateTime<Utc>,
    pub result: ExamResult,
}

impl ExamResultRow {
    #[must_use]
    pub fn new(id: i64, completed_at: DateTime<Utc>, result: ExamResult) -> Self {
        Self {
            id,
            completed_at,
            result,
        }
    }
}

/// Source of exam questions.
#[async_trait]
pub trait QuestionSetLoader: Send + Sync {
    /// Load up to `desired_count` well-formed questions.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::NoQuestionsAvailable` when nothing valid is left, or
    /// `LoadError::SourceUnavailable` when the backing source fails.
    async fn load(&self, desired_count: u32) -> Result<Vec<Question>, LoadError>;
}

/// Sink for finished exam results.
#[async_trait]
pub trait ResultsStore: Send + Sync {
    /// Persist a result, returning its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the result cannot be stored.
    async fn save(
        &self,
        result: &ExamResult,
        completed_at: DateTime<Utc>,
    ) -> Result<i64, StorageError>;

    /// Fetch a stored result by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_result(&self, id: i64) -> Result<ExamResultRow, StorageError>;

    /// Most recent results first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failures.
    async fn list_results(&self, limit: u32) -> Result<Vec<ExamResultRow>, StorageError>;
}

/// Validate raw drafts, dropping malformed ones, and keep at most `desired_count`.
///
/// # Errors
///
/// Returns `LoadError::NoQuestionsAvailable` if no draft survives validation.
pub fn select_valid(
    drafts: impl IntoIterator<Item = QuestionDraft>,
    desired_count: u32,
) -> Result<Vec<Question>, LoadError> {
    let limit = usize::try_from(desired_count).unwrap_or(usize::MAX);
    let questions: Vec<Question> = drafts
        .into_iter()
        .filter_map(|draft| match draft.validate() {
            Ok(q) => Some(q),
            Err(err) => {
                warn!(%err, "skipping malformed question");
                None
            }
        })
        .take(limit)
        .collect();

    if questions.is_empty() {
        return Err(LoadError::NoQuestionsAvailable);
    }
    Ok(questions)
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    questions: Arc<Mutex<Vec<QuestionDraft>>>,
    results: Arc<Mutex<Vec<ExamResultRow>>>,
    shuffle: bool,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_questions(questions: Vec<QuestionDraft>) -> Self {
        Self {
            questions: Arc::new(Mutex::new(questions)),
            ..Self::default()
        }
    }

    /// Return questions in random order instead of insertion order.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Add a question to the bank.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id is already present.
    pub fn add_question(&self, draft: QuestionDraft) -> Result<(), StorageError> {
        let mut guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.iter().any(|q| q.id == draft.id) {
            return Err(StorageError::Conflict);
        }
        guard.push(draft);
        Ok(())
    }
}

#[async_trait]
impl QuestionSetLoader for InMemoryRepository {
    async fn load(&self, desired_count: u32) -> Result<Vec<Question>, LoadError> {
        let mut drafts = self
            .questions
            .lock()
            .map_err(|e| LoadError::SourceUnavailable(e.to_string()))?
            .clone();
        if self.shuffle {
            drafts.shuffle(&mut rand::rng());
        }
        select_valid(drafts, desired_count)
    }
}

#[async_trait]
impl ResultsStore for InMemoryRepository {
    async fn save(
        &self,
        result: &ExamResult,
        completed_at: DateTime<Utc>,
    ) -> Result<i64, StorageError> {
        let mut guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let id = i64::try_from(guard.len() + 1)
            .map_err(|_| StorageError::Serialization("result id overflow".into()))?;
        guard.push(ExamResultRow::new(id, completed_at, result.clone()));
        Ok(id)
    }

    async fn get_result(&self, id: i64) -> Result<ExamResultRow, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .iter()
            .find(|row| row.id == id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_results(&self, limit: u32) -> Result<Vec<ExamResultRow>, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut rows: Vec<_> = guard.iter().cloned().collect();
        rows.sort_by(|a, b| b.completed_at.cmp(&a.completed_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }
}

/// Aggregates the exam collaborators behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionSetLoader>,
    pub results: Arc<dyn ResultsStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory(questions: Vec<QuestionDraft>) -> Self {
        let repo = InMemoryRepository::with_questions(questions).with_shuffle(true);
        let loader: Arc<dyn QuestionSetLoader> = Arc::new(repo.clone());
        let results: Arc<dyn ResultsStore> = Arc::new(repo);
        Self {
            questions: loader,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::ScoringEngine;
    use exam_core::model::{AnswerDraft, AnswerId, AnswerMap, CategoryId, Difficulty, QuestionId};
    use exam_core::time::fixed_now;

    fn draft(id: u64, text: &str) -> QuestionDraft {
        QuestionDraft {
            id: QuestionId::new(id),
            text: text.into(),
            explanation: None,
            difficulty: Difficulty::Easy,
            category_id: CategoryId::new(1),
            answers: vec![
                AnswerDraft::new(AnswerId::new(id * 10), "yes", true),
                AnswerDraft::new(AnswerId::new(id * 10 + 1), "no", false),
            ],
        }
    }

    #[tokio::test]
    async fn load_caps_at_desired_count() {
        let repo = InMemoryRepository::with_questions((1..=5).map(|i| draft(i, "Q")).collect());
        let questions = repo.load(3).await.unwrap();
        let ids: Vec<_> = questions.iter().map(|q| q.id().value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn load_skips_malformed_questions() {
        let mut broken = draft(2, "Q2");
        broken.answers.clear();
        let repo = InMemoryRepository::with_questions(vec![draft(1, "Q1"), broken, draft(3, " ")]);

        let questions = repo.load(10).await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id(), QuestionId::new(1));
    }

    #[tokio::test]
    async fn blank_answer_option_does_not_drop_the_question() {
        let mut with_blank = draft(1, "Q1");
        with_blank.answers[1].text = "   ".into();
        let repo = InMemoryRepository::with_questions(vec![with_blank]);

        let questions = repo.load(10).await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].answers().len(), 2);
    }

    #[tokio::test]
    async fn empty_bank_reports_no_questions() {
        let repo = InMemoryRepository::new();
        assert_eq!(
            repo.load(33).await.unwrap_err(),
            LoadError::NoQuestionsAvailable
        );
    }

    #[tokio::test]
    async fn shuffled_load_keeps_the_same_set() {
        let repo = InMemoryRepository::with_questions((1..=8).map(|i| draft(i, "Q")).collect())
            .with_shuffle(true);
        let mut ids: Vec<_> = repo
            .load(8)
            .await
            .unwrap()
            .iter()
            .map(|q| q.id().value())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn add_question_rejects_duplicates() {
        let repo = InMemoryRepository::new();
        repo.add_question(draft(1, "Q")).unwrap();
        assert_eq!(
            repo.add_question(draft(1, "again")).unwrap_err(),
            StorageError::Conflict
        );
    }

    #[tokio::test]
    async fn saved_results_round_trip() {
        let repo = InMemoryRepository::with_questions(vec![draft(1, "Q")]);
        let questions = repo.load(1).await.unwrap();
        let result = ScoringEngine::new(1).score(&questions, &AnswerMap::new(), 60, 30);

        let id = repo.save(&result, fixed_now()).await.unwrap();
        let row = repo.get_result(id).await.unwrap();
        assert_eq!(row.result, result);
        assert_eq!(row.completed_at, fixed_now());

        let listed = repo.list_results(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(
            repo.get_result(99).await.unwrap_err(),
            StorageError::NotFound
        );
    }

    #[tokio::test]
    async fn list_results_keeps_the_newest_completions() {
        let repo = InMemoryRepository::with_questions(vec![draft(1, "Q")]);
        let questions = repo.load(1).await.unwrap();
        let result = ScoringEngine::new(1).score(&questions, &AnswerMap::new(), 60, 30);

        // Saved out of completion order.
        let newest = repo
            .save(&result, fixed_now() + chrono::Duration::hours(2))
            .await
            .unwrap();
        let middle = repo
            .save(&result, fixed_now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        let _oldest = repo.save(&result, fixed_now()).await.unwrap();

        let ids: Vec<_> = repo
            .list_results(2)
            .await
            .unwrap()
            .iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(ids, vec![newest, middle]);
    }
}
