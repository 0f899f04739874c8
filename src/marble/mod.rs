//! Marble data model: timestamped notifications and subscription windows.
//!
//! A marble script is an ordered `Vec<Recorded<T>>`. The constructors in this
//! module (`on_next`, `on_error`, `on_completed`, `subscribed`,
//! `subscribed_until`) are the vocabulary test authors use to describe what a
//! source should emit and what a pipeline is expected to produce.

mod diagram;

pub use diagram::{
    DEFAULT_FRAME_TICKS, Diagram, parse_marbles, parse_subscription, parse_subscription_with_frame,
};

use crate::error::TestError;
use crate::observable::Observer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Virtual time unit.
pub type Tick = i64;

/// Sentinel for "never unsubscribed".
pub const INFINITE: Tick = Tick::MAX;

/// Conventional tick at which the pipeline under test is built.
pub const CREATED: Tick = 100;
/// Conventional tick at which the test observer subscribes.
pub const SUBSCRIBED: Tick = 200;
/// Conventional tick at which the test observer unsubscribes.
pub const DISPOSED: Tick = 1000;

/// One of value-emission, error-termination, or normal completion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Notification<T> {
    OnNext(T),
    OnError(TestError),
    OnCompleted,
}

impl<T> Notification<T> {
    /// `OnError` and `OnCompleted` end a sequence.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::OnError(_) | Self::OnCompleted)
    }

    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::OnNext(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Notification<U> {
        match self {
            Self::OnNext(value) => Notification::OnNext(f(value)),
            Self::OnError(error) => Notification::OnError(error),
            Self::OnCompleted => Notification::OnCompleted,
        }
    }

    /// Hands this notification to the matching observer method.
    pub fn accept(self, observer: &dyn Observer<T>) {
        match self {
            Self::OnNext(value) => observer.on_next(value),
            Self::OnError(error) => observer.on_error(error),
            Self::OnCompleted => observer.on_completed(),
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Notification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnNext(value) => write!(f, "OnNext({value:?})"),
            Self::OnError(error) => write!(f, "OnError({error})"),
            Self::OnCompleted => f.write_str("OnCompleted"),
        }
    }
}

/// A notification stamped with the tick it was (or should be) observed at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recorded<T> {
    pub time: Tick,
    pub value: Notification<T>,
}

impl<T> Recorded<T> {
    #[must_use]
    pub const fn new(time: Tick, value: Notification<T>) -> Self {
        Self { time, value }
    }
}

impl<T: fmt::Debug> fmt::Display for Recorded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.value, self.time)
    }
}

/// The `(subscribe, unsubscribe)` window a consumer was attached for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub subscribe: Tick,
    pub unsubscribe: Tick,
}

impl Subscription {
    /// An open window starting at `subscribe`.
    #[must_use]
    pub const fn new(subscribe: Tick) -> Self {
        Self {
            subscribe,
            unsubscribe: INFINITE,
        }
    }

    #[must_use]
    pub const fn with_end(subscribe: Tick, unsubscribe: Tick) -> Self {
        Self {
            subscribe,
            unsubscribe,
        }
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.unsubscribe == INFINITE
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_active() {
            write!(f, "({}, Infinite)", self.subscribe)
        } else {
            write!(f, "({}, {})", self.subscribe, self.unsubscribe)
        }
    }
}

#[must_use]
pub const fn on_next<T>(time: Tick, value: T) -> Recorded<T> {
    Recorded::new(time, Notification::OnNext(value))
}

pub fn on_error<T>(time: Tick, error: impl Into<TestError>) -> Recorded<T> {
    Recorded::new(time, Notification::OnError(error.into()))
}

#[must_use]
pub const fn on_completed<T>(time: Tick) -> Recorded<T> {
    Recorded::new(time, Notification::OnCompleted)
}

#[must_use]
pub const fn subscribed(start: Tick) -> Subscription {
    Subscription::new(start)
}

#[must_use]
pub const fn subscribed_until(start: Tick, end: Tick) -> Subscription {
    Subscription::with_end(start, end)
}
