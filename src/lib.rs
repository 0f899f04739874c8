//! Deterministic virtual-time harness for testing reactive pipelines.
//!
//! A [`TestScheduler`] owns a virtual clock and an ordered task queue. Test
//! sources ([`ColdObservable`], [`HotObservable`]) play marble scripts on that
//! clock, a [`TestObserver`] records what a pipeline emits with the tick of
//! arrival, and [`TestScheduler::start`] wires the three together on the
//! conventional 100/200/1000 timeline. Nothing reads the wall clock, so a test
//! produces the same log on every run.
//!
//! ```
//! use marble::{TestScheduler, assert_messages_eq, on_completed, on_next};
//!
//! let sched = TestScheduler::new();
//! let source = sched.create_cold_observable(vec![on_next(10, 'a'), on_completed(20)]);
//! let observer = sched.start(move || source).unwrap();
//! assert_messages_eq(
//!     &[on_next(210, 'a'), on_completed(220)],
//!     &observer.messages(),
//! )
//! .unwrap();
//! ```

#![forbid(unsafe_code)]

pub mod assertions;
pub mod config;
pub mod error;
pub mod marble;
pub mod observable;
pub mod observer;
mod orchestrator;
pub mod scheduler;
pub mod sources;

pub use assertions::{
    assert_err, assert_err_eq, assert_err_kind, assert_messages_eq, assert_panics,
    assert_sequence_eq, assert_streams_eq,
};
pub use config::{HarnessConfig, Timing};
pub use error::{Error, Mismatch, Result, TestError};
pub use marble::{
    CREATED, DISPOSED, Diagram, INFINITE, Notification, Recorded, SUBSCRIBED, Subscription, Tick,
    on_completed, on_error, on_next, parse_marbles, parse_subscription, subscribed,
    subscribed_until,
};
pub use observable::{Disposable, Observable, Observer, from_fn};
pub use observer::TestObserver;
pub use scheduler::{Clock, TaskHandle, TestScheduler, VirtualClock};
pub use sources::{ColdObservable, HotObservable};
