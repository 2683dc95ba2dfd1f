#![forbid(unsafe_code)]

pub mod fixtures;
pub mod repository;
pub mod sqlite;

pub use repository::{
    ExamResultRow, InMemoryRepository, LoadError, QuestionSetLoader, ResultsStore, Storage,
    StorageError,
};
