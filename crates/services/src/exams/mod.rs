pub mod machine;
pub mod review;
pub mod service;
pub mod session;

pub use machine::{ExamMachine, ExamStatus, SubmitRequest};
pub use review::{NOT_ANSWERED, ReviewItem, review_items};
pub use service::ExamSessionService;
pub use session::{ExamEvent, ExamSession, ExamSessionState, SubmitOutcome};
