//! Pure exam state machine.
//!
//! `ExamMachine` owns the question order, cursor, answer map and the frozen
//! countdown value. It performs no I/O and never touches a timer; the session
//! actor feeds it user commands and clock notifications one at a time.

use std::sync::Arc;

use exam_core::ScoringEngine;
use exam_core::model::{AnswerId, AnswerMap, ExamResult, Question, QuestionId};
use storage::LoadError;
use tracing::{debug, info};

use crate::error::{ExamError, Operation};

/// Lifecycle of a single exam attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExamStatus {
    Loading,
    LoadError(LoadError),
    InProgress,
    ConfirmingSubmit { auto_triggered: bool },
    Submitted,
}

impl ExamStatus {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ExamStatus::Loading => "loading",
            ExamStatus::LoadError(_) => "failed to load",
            ExamStatus::InProgress => "in progress",
            ExamStatus::ConfirmingSubmit { .. } => "confirming submission",
            ExamStatus::Submitted => "submitted",
        }
    }

    /// `LoadError` and `Submitted` accept no further operations.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExamStatus::LoadError(_) | ExamStatus::Submitted)
    }
}

/// Outcome of a manual submit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRequest {
    /// Confirmation is now pending.
    Pending,
    /// The deadline already triggered submission; the request was dropped.
    Superseded,
}

#[derive(Debug, Clone)]
pub struct ExamMachine {
    questions: Arc<[Question]>,
    current_index: usize,
    answers: AnswerMap,
    remaining_secs: u64,
    duration_secs: u64,
    scoring: ScoringEngine,
    status: ExamStatus,
}

impl ExamMachine {
    /// A machine waiting for its question set.
    #[must_use]
    pub fn new(duration_secs: u64, passing_threshold: u32) -> Self {
        Self {
            questions: Arc::from(Vec::new()),
            current_index: 0,
            answers: AnswerMap::new(),
            remaining_secs: duration_secs,
            duration_secs,
            scoring: ScoringEngine::new(passing_threshold),
            status: ExamStatus::Loading,
        }
    }

    /// Finish loading. An empty set is treated as `NoQuestionsAvailable`.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::InvalidStateTransition` unless the machine is loading.
    pub fn finish_loading(
        &mut self,
        loaded: Result<Vec<Question>, LoadError>,
    ) -> Result<(), ExamError> {
        self.require(Operation::Load, |s| matches!(s, ExamStatus::Loading))?;
        match loaded {
            Ok(questions) if !questions.is_empty() => {
                info!(questions = questions.len(), "exam started");
                self.questions = Arc::from(questions);
                self.status = ExamStatus::InProgress;
            }
            Ok(_) => self.fail(LoadError::NoQuestionsAvailable),
            Err(err) => self.fail(err),
        }
        Ok(())
    }

    fn fail(&mut self, err: LoadError) {
        info!(%err, "exam failed to load");
        self.status = ExamStatus::LoadError(err);
    }

    fn require(
        &self,
        operation: Operation,
        allowed: impl FnOnce(&ExamStatus) -> bool,
    ) -> Result<(), ExamError> {
        if allowed(&self.status) {
            Ok(())
        } else {
            Err(ExamError::InvalidStateTransition {
                operation,
                status: self.status.name(),
            })
        }
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn status(&self) -> &ExamStatus {
        &self.status
    }

    #[must_use]
    pub fn questions(&self) -> &Arc<[Question]> {
        &self.questions
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    #[must_use]
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    #[must_use]
    pub fn passing_threshold(&self) -> u32 {
        self.scoring.passing_threshold()
    }

    //
    // ─── USER OPERATIONS ───────────────────────────────────────────────────────
    //

    /// Record `answer` for `question`, returning the previous selection.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` outside `InProgress`, `UnknownQuestion`
    /// for ids outside the loaded set, and `UnknownAnswer` when the answer
    /// belongs to a different question.
    pub fn select_answer(
        &mut self,
        question: QuestionId,
        answer: AnswerId,
    ) -> Result<Option<AnswerId>, ExamError> {
        self.require(Operation::SelectAnswer, |s| {
            matches!(s, ExamStatus::InProgress)
        })?;
        let q = self
            .questions
            .iter()
            .find(|q| q.id() == question)
            .ok_or(ExamError::UnknownQuestion(question))?;
        if !q.has_answer(answer) {
            return Err(ExamError::UnknownAnswer { question, answer });
        }
        Ok(self.answers.select(question, answer))
    }

    /// Select `answer` for the question under the cursor.
    ///
    /// # Errors
    ///
    /// Same as [`ExamMachine::select_answer`].
    pub fn select_current(&mut self, answer: AnswerId) -> Result<Option<AnswerId>, ExamError> {
        let question = self.current_question().map(Question::id).ok_or(
            ExamError::InvalidStateTransition {
                operation: Operation::SelectAnswer,
                status: self.status.name(),
            },
        )?;
        self.select_answer(question, answer)
    }

    /// Move the cursor by `delta`, clamped to the question range.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` outside `InProgress`.
    pub fn navigate(&mut self, delta: isize) -> Result<usize, ExamError> {
        self.require(Operation::Navigate, |s| matches!(s, ExamStatus::InProgress))?;
        let last = self.questions.len().saturating_sub(1);
        self.current_index = self.current_index.saturating_add_signed(delta).min(last);
        Ok(self.current_index)
    }

    /// Ask for confirmation before submitting.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the exam is in progress or the
    /// deadline has already opened an automatic confirmation.
    pub fn request_submit(&mut self) -> Result<SubmitRequest, ExamError> {
        match self.status {
            ExamStatus::InProgress => {
                debug!(remaining_secs = self.remaining_secs, "submit requested");
                self.status = ExamStatus::ConfirmingSubmit {
                    auto_triggered: false,
                };
                Ok(SubmitRequest::Pending)
            }
            ExamStatus::ConfirmingSubmit {
                auto_triggered: true,
            } => {
                debug!("submit request superseded by deadline");
                Ok(SubmitRequest::Superseded)
            }
            _ => Err(ExamError::InvalidStateTransition {
                operation: Operation::RequestSubmit,
                status: self.status.name(),
            }),
        }
    }

    /// Return to the exam from a manual confirmation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless a manual confirmation is pending.
    pub fn cancel_submit(&mut self) -> Result<(), ExamError> {
        self.require(Operation::CancelSubmit, |s| {
            matches!(
                s,
                ExamStatus::ConfirmingSubmit {
                    auto_triggered: false
                }
            )
        })?;
        debug!("submit cancelled");
        self.status = ExamStatus::InProgress;
        Ok(())
    }

    /// Score the attempt and close the session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless a confirmation is pending.
    pub fn confirm_submit(&mut self) -> Result<ExamResult, ExamError> {
        self.require(Operation::ConfirmSubmit, |s| {
            matches!(s, ExamStatus::ConfirmingSubmit { .. })
        })?;
        let result = self.scoring.score(
            &self.questions,
            &self.answers,
            self.duration_secs,
            self.remaining_secs,
        );
        self.status = ExamStatus::Submitted;
        info!(
            correct = result.correct_answers(),
            total = result.total_questions(),
            passed = result.passed(),
            time_spent_secs = result.time_spent_secs(),
            "exam submitted"
        );
        Ok(result)
    }

    //
    // ─── CLOCK NOTIFICATIONS ───────────────────────────────────────────────────
    //

    /// Apply a countdown tick. Only lowers the remaining time, and only while
    /// in progress. Returns whether the value changed.
    pub fn tick(&mut self, remaining_secs: u64) -> bool {
        if !matches!(self.status, ExamStatus::InProgress) || remaining_secs >= self.remaining_secs
        {
            return false;
        }
        self.remaining_secs = remaining_secs;
        true
    }

    /// Handle deadline expiry. Returns whether the status changed.
    ///
    /// From `InProgress` the countdown drops to zero; a pending manual
    /// confirmation keeps its frozen value and becomes automatic.
    pub fn expire(&mut self) -> bool {
        match self.status {
            ExamStatus::InProgress => {
                self.remaining_secs = 0;
            }
            ExamStatus::ConfirmingSubmit {
                auto_triggered: false,
            } => {}
            _ => return false,
        }
        info!("exam time expired");
        self.status = ExamStatus::ConfirmingSubmit {
            auto_triggered: true,
        };
        true
    }
}
