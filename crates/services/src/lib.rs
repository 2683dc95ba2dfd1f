#![forbid(unsafe_code)]

pub mod error;
pub mod exam_clock;
pub mod exams;

pub use exam_core::Clock;

pub use error::{ExamError, HistoryError, Operation};
pub use exam_clock::{ClockEvent, ExamClock};
pub use exams::{
    ExamEvent, ExamMachine, ExamSession, ExamSessionService, ExamSessionState, ExamStatus,
    ReviewItem, SubmitOutcome, SubmitRequest, review_items,
};
