use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing an id from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self::new)
                    .map_err(|_| ParseIdError {
                        kind: stringify!($name),
                    })
            }
        }
    };
}

numeric_id!(
    /// Unique identifier for a question in the bank.
    QuestionId
);
numeric_id!(
    /// Unique identifier for an answer option. Ids are global, not per question.
    AnswerId
);
numeric_id!(
    /// Topic grouping for questions.
    CategoryId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_id_display() {
        assert_eq!(QuestionId::new(42).to_string(), "42");
    }

    #[test]
    fn answer_id_from_str() {
        let id: AnswerId = " 7 ".parse().unwrap();
        assert_eq!(id, AnswerId::new(7));
    }

    #[test]
    fn invalid_id_reports_kind() {
        let err = "abc".parse::<CategoryId>().unwrap_err();
        assert_eq!(err.to_string(), "failed to parse CategoryId from string");
    }

    #[test]
    fn debug_names_the_type() {
        assert_eq!(format!("{:?}", QuestionId::new(3)), "QuestionId(3)");
    }
}
