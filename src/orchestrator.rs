//! `start`: create, subscribe to and dispose a pipeline on the virtual timeline.

use crate::config::Timing;
use crate::error::{Error, Result};
use crate::marble::Tick;
use crate::observable::{Disposable, Observable, Observer};
use crate::observer::TestObserver;
use crate::scheduler::TestScheduler;
use std::cell::RefCell;
use std::rc::Rc;

impl TestScheduler {
    /// Runs `factory`'s pipeline with the configured timing (by default
    /// created at 100, subscribed at 200, disposed at 1000).
    pub fn start<T, O, F>(&self, factory: F) -> Result<TestObserver<T>>
    where
        T: 'static,
        O: Observable<T> + 'static,
        F: FnOnce() -> O + 'static,
    {
        self.start_with_timing(factory, self.config().timing)
    }

    /// Like `start`, disposing the subscription at `disposed`.
    pub fn start_with_dispose<T, O, F>(&self, factory: F, disposed: Tick) -> Result<TestObserver<T>>
    where
        T: 'static,
        O: Observable<T> + 'static,
        F: FnOnce() -> O + 'static,
    {
        let timing = Timing {
            disposed,
            ..self.config().timing
        };
        self.start_with_timing(factory, timing)
    }

    /// Schedules creation, subscription and disposal at the given ticks,
    /// drives the clock to `timing.disposed` and returns the observer log.
    pub fn start_with_timing<T, O, F>(&self, factory: F, timing: Timing) -> Result<TestObserver<T>>
    where
        T: 'static,
        O: Observable<T> + 'static,
        F: FnOnce() -> O + 'static,
    {
        timing.validate()?;

        let observer = self.create_observer::<T>();
        let pipeline: Rc<RefCell<Option<O>>> = Rc::default();
        let subscription: Rc<RefCell<Option<Disposable>>> = Rc::default();

        let slot = Rc::clone(&pipeline);
        self.schedule_absolute(timing.created, move |sched| {
            tracing::debug!(event = "orchestrator.create", now = sched.now(), "Creating pipeline");
            *slot.borrow_mut() = Some(factory());
            Ok(())
        });

        let slot = Rc::clone(&pipeline);
        let handle = Rc::clone(&subscription);
        let sink: Rc<dyn Observer<T>> = Rc::new(observer.clone());
        self.schedule_absolute(timing.subscribed, move |sched| {
            tracing::debug!(event = "orchestrator.subscribe", now = sched.now(), "Subscribing observer");
            let slot = slot.borrow();
            let source = slot
                .as_ref()
                .ok_or_else(|| Error::scheduler("pipeline was not created before subscription"))?;
            let disposable = source.subscribe(sink);
            *handle.borrow_mut() = Some(disposable);
            Ok(())
        });

        let slot = Rc::clone(&pipeline);
        let handle = Rc::clone(&subscription);
        self.schedule_absolute(timing.disposed, move |sched| {
            tracing::debug!(event = "orchestrator.dispose", now = sched.now(), "Disposing subscription");
            let disposable = handle.borrow_mut().take();
            if let Some(disposable) = disposable {
                disposable.dispose();
            }
            slot.borrow_mut().take();
            Ok(())
        });

        self.advance_to(timing.disposed.max(self.now()))?;
        Ok(observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marble::{on_completed, on_next, subscribed_until};
    use crate::observable::from_fn;

    #[test]
    fn synchronous_source_is_recorded_at_subscription_tick() {
        let sched = TestScheduler::new();
        let observer = sched
            .start(|| {
                from_fn(|observer: Rc<dyn Observer<i32>>| {
                    for value in [1, 2, 3] {
                        observer.on_next(value);
                    }
                    observer.on_completed();
                    Disposable::empty()
                })
            })
            .expect("start");

        assert_eq!(
            observer.messages(),
            vec![on_next(200, 1), on_next(200, 2), on_next(200, 3), on_completed(200)]
        );
        assert_eq!(sched.now(), 1000);
    }

    #[test]
    fn factory_runs_at_created_tick() {
        let sched = TestScheduler::new();
        let created_at = Rc::new(RefCell::new(None));
        let probe = Rc::clone(&created_at);
        let clock = sched.clock();

        let observer = sched
            .start(move || {
                use crate::scheduler::Clock;
                *probe.borrow_mut() = Some(clock.now());
                from_fn(|_observer: Rc<dyn Observer<()>>| Disposable::empty())
            })
            .expect("start");

        assert_eq!(*created_at.borrow(), Some(100));
        assert!(observer.is_empty());
    }

    #[test]
    fn disposal_tick_closes_the_source_window() {
        let sched = TestScheduler::new();
        let source = sched.create_cold_observable(vec![on_next(50, 'a'), on_next(400, 'b')]);

        let pipeline = source.clone();
        let observer = sched
            .start_with_dispose(move || pipeline, 400)
            .expect("start");

        assert_eq!(observer.messages(), vec![on_next(250, 'a')]);
        assert_eq!(source.subscriptions(), vec![subscribed_until(200, 400)]);
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn misordered_timing_is_rejected() {
        let sched = TestScheduler::new();
        let result = sched.start_with_timing(
            || from_fn(|_observer: Rc<dyn Observer<i32>>| Disposable::empty()),
            Timing::new(300, 200, 1000),
        );
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(sched.pending(), 0);
    }
}
