use thiserror::Error;

use crate::model::{ExamConfigError, ExamResultError, QuestionError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Config(#[from] ExamConfigError),
    #[error(transparent)]
    Result(#[from] ExamResultError),
}
