mod answers;
mod config;
mod ids;
mod question;
mod result;

pub use answers::AnswerMap;
pub use config::{ExamConfig, ExamConfigError};
pub use ids::{AnswerId, CategoryId, ParseIdError, QuestionId};
pub use question::{Answer, AnswerDraft, Difficulty, Question, QuestionDraft, QuestionError};
pub use result::{ExamResult, ExamResultError, QuestionOutcome};
