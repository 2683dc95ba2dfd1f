use std::sync::Arc;

use exam_core::model::{ExamConfig, Question};
use storage::repository::{ExamResultRow, QuestionSetLoader, ResultsStore};
use storage::Storage;
use tracing::debug;

use crate::Clock;
use crate::error::{ExamError, HistoryError};
use crate::exams::session::ExamSession;

/// Wires collaborators into exam sessions and exposes result history.
#[derive(Clone)]
pub struct ExamSessionService {
    clock: Clock,
    loader: Arc<dyn QuestionSetLoader>,
    store: Arc<dyn ResultsStore>,
    config: ExamConfig,
}

impl ExamSessionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        loader: Arc<dyn QuestionSetLoader>,
        store: Arc<dyn ResultsStore>,
    ) -> Self {
        Self {
            clock,
            loader,
            store,
            config: ExamConfig::citizenship(),
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.questions),
            Arc::clone(&storage.results),
        )
    }

    #[must_use]
    pub fn with_config(mut self, config: ExamConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ExamConfig {
        &self.config
    }

    /// Start a session that loads its questions from the configured loader.
    ///
    /// # Errors
    ///
    /// Only for a config whose duration the session refuses, which
    /// [`ExamConfig::new`] already rules out.
    pub fn start_exam(&self) -> Result<ExamSession, ExamError> {
        self.start_exam_from(Arc::clone(&self.loader))
    }

    /// Start a session from another loader, such as the built-in sample set
    /// after the primary source failed.
    ///
    /// # Errors
    ///
    /// See [`ExamSessionService::start_exam`].
    pub fn start_exam_from(
        &self,
        loader: Arc<dyn QuestionSetLoader>,
    ) -> Result<ExamSession, ExamError> {
        debug!(
            questions = self.config.question_count(),
            duration_secs = self.config.duration_secs(),
            "starting exam"
        );
        ExamSession::load(
            loader,
            self.config.question_count(),
            self.config.duration_secs(),
            self.config.passing_threshold(),
            Arc::clone(&self.store),
            self.clock,
        )
    }

    /// Start a session over questions the caller already holds.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::Config` for an invalid duration.
    pub fn start_with_questions(&self, questions: Vec<Question>) -> Result<ExamSession, ExamError> {
        ExamSession::create(
            questions,
            self.config.duration_secs(),
            self.config.passing_threshold(),
            Arc::clone(&self.store),
            self.clock,
        )
    }

    /// Most recent stored results first.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError` if the store cannot be read.
    pub async fn history(&self, limit: u32) -> Result<Vec<ExamResultRow>, HistoryError> {
        Ok(self.store.list_results(limit).await?)
    }

    /// A single stored result.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError` if the result is missing or the store fails.
    pub async fn result(&self, id: i64) -> Result<ExamResultRow, HistoryError> {
        Ok(self.store.get_result(id).await?)
    }
}
