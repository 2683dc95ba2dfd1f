//! Shared error types for the services crate.

use std::fmt;

use thiserror::Error;

use exam_core::model::{AnswerId, ExamConfigError, QuestionId};
use storage::StorageError;

/// Session operation names, used to report rejected transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    SelectAnswer,
    Navigate,
    RequestSubmit,
    ConfirmSubmit,
    CancelSubmit,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Load => "load questions",
            Operation::SelectAnswer => "select an answer",
            Operation::Navigate => "navigate",
            Operation::RequestSubmit => "request submission",
            Operation::ConfirmSubmit => "confirm submission",
            Operation::CancelSubmit => "cancel submission",
        };
        f.write_str(name)
    }
}

/// Errors emitted by exam sessions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamError {
    #[error("cannot {operation} while the exam is {status}")]
    InvalidStateTransition {
        operation: Operation,
        status: &'static str,
    },
    #[error("question {0} is not part of this exam")]
    UnknownQuestion(QuestionId),
    #[error("answer {answer} does not belong to question {question}")]
    UnknownAnswer {
        question: QuestionId,
        answer: AnswerId,
    },
    #[error("exam session has shut down")]
    SessionClosed,
    #[error(transparent)]
    Config(#[from] ExamConfigError),
}

/// Errors emitted by result history queries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
