use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamConfigError {
    #[error("question count must be > 0")]
    InvalidQuestionCount,

    #[error("exam duration must be > 0 seconds")]
    InvalidDuration,

    #[error("exam duration must be at most {max} seconds")]
    DurationTooLong { max: u64 },

    #[error("passing threshold ({threshold}) exceeds question count ({count})")]
    ThresholdAboveCount { threshold: u32, count: u32 },
}

/// Parameters of one exam attempt.
///
/// `question_count` is the number requested from the question source; the
/// source may deliver fewer. The passing threshold is an absolute count of
/// correct answers and is not rescaled when fewer questions arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExamConfig {
    question_count: u32,
    duration_secs: u64,
    passing_threshold: u32,
}

impl ExamConfig {
    /// Questions in the official citizenship test.
    pub const CITIZENSHIP_QUESTIONS: u32 = 33;
    /// Sixty minutes.
    pub const CITIZENSHIP_DURATION_SECS: u64 = 60 * 60;
    pub const CITIZENSHIP_PASSING_THRESHOLD: u32 = 17;
    /// One week. Longer deadlines are not representable on every platform.
    pub const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

    /// # Errors
    ///
    /// Returns `ExamConfigError` if the count or duration is zero, if the
    /// duration exceeds [`Self::MAX_DURATION_SECS`], or if the threshold can
    /// never be reached with `question_count` questions.
    pub fn new(
        question_count: u32,
        duration_secs: u64,
        passing_threshold: u32,
    ) -> Result<Self, ExamConfigError> {
        if question_count == 0 {
            return Err(ExamConfigError::InvalidQuestionCount);
        }
        Self::check_duration(duration_secs)?;
        if passing_threshold > question_count {
            return Err(ExamConfigError::ThresholdAboveCount {
                threshold: passing_threshold,
                count: question_count,
            });
        }
        Ok(Self {
            question_count,
            duration_secs,
            passing_threshold,
        })
    }

    /// Checks a duration on its own, for callers that take one without a full
    /// config.
    ///
    /// # Errors
    ///
    /// `InvalidDuration` for zero, `DurationTooLong` above the limit.
    pub fn check_duration(duration_secs: u64) -> Result<(), ExamConfigError> {
        if duration_secs == 0 {
            return Err(ExamConfigError::InvalidDuration);
        }
        if duration_secs > Self::MAX_DURATION_SECS {
            return Err(ExamConfigError::DurationTooLong {
                max: Self::MAX_DURATION_SECS,
            });
        }
        Ok(())
    }

    /// 33 questions, 60 minutes, 17 correct to pass.
    #[must_use]
    pub fn citizenship() -> Self {
        Self {
            question_count: Self::CITIZENSHIP_QUESTIONS,
            duration_secs: Self::CITIZENSHIP_DURATION_SECS,
            passing_threshold: Self::CITIZENSHIP_PASSING_THRESHOLD,
        }
    }

    #[must_use]
    pub fn question_count(&self) -> u32 {
        self.question_count
    }

    #[must_use]
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    #[must_use]
    pub fn passing_threshold(&self) -> u32 {
        self.passing_threshold
    }
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self::citizenship()
    }
}
