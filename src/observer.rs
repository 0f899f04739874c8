//! Observer that timestamps everything it receives.

use crate::error::TestError;
use crate::marble::{Notification, Recorded};
use crate::observable::Observer;
use crate::scheduler::{Clock, TestScheduler, VirtualClock};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Records each notification with the clock tick at which it arrived.
///
/// Clones share the same log, so a clone handed to a pipeline and the one kept
/// by the test see the same messages.
pub struct TestObserver<T> {
    clock: VirtualClock,
    messages: Rc<RefCell<Vec<Recorded<T>>>>,
}

impl<T> TestObserver<T> {
    #[must_use]
    pub fn new(clock: VirtualClock) -> Self {
        Self {
            clock,
            messages: Rc::default(),
        }
    }

    /// Snapshot of the recorded log.
    #[must_use]
    pub fn messages(&self) -> Vec<Recorded<T>>
    where
        T: Clone,
    {
        self.messages.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }

    /// Values of the recorded `OnNext` notifications, in arrival order.
    #[must_use]
    pub fn values(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.messages
            .borrow()
            .iter()
            .filter_map(|recorded| recorded.value.value().cloned())
            .collect()
    }

    fn record(&self, notification: Notification<T>) {
        let time = self.clock.now();
        self.messages
            .borrow_mut()
            .push(Recorded::new(time, notification));
    }
}

impl<T> Clone for TestObserver<T> {
    fn clone(&self) -> Self {
        Self {
            clock: self.clock.clone(),
            messages: Rc::clone(&self.messages),
        }
    }
}

impl<T> Observer<T> for TestObserver<T> {
    fn on_next(&self, value: T) {
        self.record(Notification::OnNext(value));
    }

    fn on_error(&self, error: TestError) {
        self.record(Notification::OnError(error));
    }

    fn on_completed(&self) {
        self.record(Notification::OnCompleted);
    }
}

impl<T: fmt::Debug> fmt::Debug for TestObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestObserver")
            .field("messages", &self.messages.borrow())
            .finish_non_exhaustive()
    }
}

impl TestScheduler {
    /// Observer stamping notifications with this scheduler's clock.
    #[must_use]
    pub fn create_observer<T>(&self) -> TestObserver<T> {
        TestObserver::new(self.clock())
    }
}
