//! Error types for the marble harness.

use crate::marble::Tick;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Crate-wide error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Caller passed an argument the harness cannot honor.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The scheduler refused to drive (re-entrancy, runaway drain).
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// A marble diagram could not be parsed.
    #[error("Marble diagram error: {0}")]
    Marble(String),

    /// A scheduled callback failed.
    #[error("Callback failed: {0}")]
    Callback(String),

    /// The assertion engine found a difference.
    #[error("Assertion failed: {0}")]
    Assertion(Mismatch),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::Scheduler(message.into())
    }

    pub fn marble(message: impl Into<String>) -> Self {
        Self::Marble(message.into())
    }

    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback(message.into())
    }

    /// Returns the mismatch if this is an assertion failure.
    #[must_use]
    pub const fn mismatch(&self) -> Option<&Mismatch> {
        match self {
            Self::Assertion(mismatch) => Some(mismatch),
            _ => None,
        }
    }
}

impl From<Mismatch> for Error {
    fn from(mismatch: Mismatch) -> Self {
        Self::Assertion(mismatch)
    }
}

/// Verdict details produced by the assertion engine.
///
/// Values are captured in their `Debug` rendering so a mismatch can outlive
/// the sequences that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    /// The items at `index` differ.
    Element {
        index: usize,
        expected: String,
        actual: String,
    },
    /// The actual sequence ended at `index` while more items were expected.
    Insufficient { index: usize },
    /// The actual sequence kept going after the expected one ended at `index`.
    Extra { index: usize },
    /// Both asynchronous sequences completed with different lengths.
    Count { expected: usize, actual: usize },
    /// The action succeeded but an error was expected.
    NoError { expected: String },
    /// The action failed with the wrong error.
    WrongError { expected: String, actual: String },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element {
                index,
                expected,
                actual,
            } => write!(
                f,
                "sequences differ at index {index}: expected {expected}, actual {actual}"
            ),
            Self::Insufficient { index } => {
                write!(f, "insufficient items: actual sequence ended at index {index}")
            }
            Self::Extra { index } => {
                write!(f, "extra items: expected sequence ended at index {index}")
            }
            Self::Count { expected, actual } => write!(
                f,
                "sequence lengths differ: expected {expected} items, actual {actual}"
            ),
            Self::NoError { expected } => {
                write!(f, "expected error {expected}, but the action succeeded")
            }
            Self::WrongError { expected, actual } => {
                write!(f, "expected error {expected}, got {actual}")
            }
        }
    }
}

/// Error payload carried by `OnError` notifications.
///
/// Comparable and cheap to clone so recorded logs keep structural equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct TestError {
    message: String,
}

impl TestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for TestError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for TestError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

pub(crate) fn clock_backwards(now: Tick, target: Tick) -> Error {
    Error::validation(format!(
        "cannot move the virtual clock backwards (now={now}, target={target})"
    ))
}
