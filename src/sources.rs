//! Cold and hot test sources built from marble scripts.
//!
//! Both log a `Subscription` window per subscribe call. A cold source replays
//! its script relative to each subscriber's subscribe tick; a hot source
//! broadcasts its script on the absolute timeline, scheduled once at
//! construction.

use crate::error::Result;
use crate::marble::{
    Diagram, Notification, Recorded, Subscription, Tick, parse_subscription_with_frame,
};
use crate::observable::{Disposable, Observable, Observer};
use crate::scheduler::{Clock, TaskHandle, TestScheduler, VirtualClock};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Append-only log of subscription windows.
#[derive(Debug, Default)]
struct WindowLog {
    windows: RefCell<Vec<Subscription>>,
}

impl WindowLog {
    fn open(&self, now: Tick) -> usize {
        let mut windows = self.windows.borrow_mut();
        windows.push(Subscription::new(now));
        windows.len() - 1
    }

    fn close(&self, index: usize, now: Tick) {
        if let Some(window) = self.windows.borrow_mut().get_mut(index) {
            window.unsubscribe = now;
        }
    }

    fn snapshot(&self) -> Vec<Subscription> {
        self.windows.borrow().clone()
    }
}

struct ColdInner<T> {
    scheduler: TestScheduler,
    messages: Vec<Recorded<T>>,
    log: WindowLog,
}

/// Replays its script independently for every subscriber.
pub struct ColdObservable<T> {
    inner: Rc<ColdInner<T>>,
}

impl<T> ColdObservable<T> {
    /// The script, with ticks relative to subscription.
    #[must_use]
    pub fn messages(&self) -> &[Recorded<T>] {
        &self.inner.messages
    }

    #[must_use]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.inner.log.snapshot()
    }
}

impl<T> Clone for ColdObservable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ColdObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColdObservable")
            .field("messages", &self.inner.messages)
            .field("subscriptions", &self.inner.log.windows.borrow())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + 'static> Observable<T> for ColdObservable<T> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) -> Disposable {
        let scheduler = &self.inner.scheduler;
        let start = scheduler.now();
        let index = self.inner.log.open(start);
        let stopped = Rc::new(Cell::new(false));

        let handles: Vec<TaskHandle> = self
            .inner
            .messages
            .iter()
            .map(|recorded| {
                let observer = Rc::clone(&observer);
                let stopped = Rc::clone(&stopped);
                let notification = recorded.value.clone();
                scheduler.schedule_absolute(start.saturating_add(recorded.time), move |sched| {
                    if stopped.get() {
                        tracing::trace!(
                            event = "source.cold.ignored",
                            now = sched.now(),
                            "Notification after terminal ignored"
                        );
                        return Ok(());
                    }
                    if notification.is_terminal() {
                        stopped.set(true);
                    }
                    notification.accept(&*observer);
                    Ok(())
                })
            })
            .collect();

        tracing::trace!(
            event = "source.cold.subscribe",
            now = start,
            window = index,
            scheduled = handles.len(),
            "Cold source subscribed"
        );

        let inner = Rc::clone(&self.inner);
        Disposable::new(move || {
            stopped.set(true);
            let cancelled = handles.iter().filter(|handle| handle.cancel()).count();
            let now = inner.scheduler.now();
            inner.log.close(index, now);
            tracing::trace!(
                event = "source.cold.unsubscribe",
                now,
                window = index,
                cancelled,
                "Cold source unsubscribed"
            );
        })
    }
}

struct HotInner<T> {
    clock: VirtualClock,
    messages: Vec<Recorded<T>>,
    log: WindowLog,
    observers: RefCell<Vec<(u64, Rc<dyn Observer<T>>)>>,
    next_observer: Cell<u64>,
    stopped: Cell<bool>,
}

impl<T: Clone> HotInner<T> {
    fn broadcast(&self, notification: &Notification<T>) {
        if self.stopped.get() {
            tracing::trace!(
                event = "source.hot.ignored",
                now = self.clock.now(),
                "Notification after terminal ignored"
            );
            return;
        }
        if notification.is_terminal() {
            self.stopped.set(true);
        }
        // Snapshot so observers may unsubscribe while being notified.
        let observers: Vec<Rc<dyn Observer<T>>> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, observer)| Rc::clone(observer))
            .collect();
        for observer in observers {
            notification.clone().accept(&*observer);
        }
    }
}

/// Broadcasts its script on the absolute timeline to whoever is attached.
pub struct HotObservable<T> {
    inner: Rc<HotInner<T>>,
}

impl<T> HotObservable<T> {
    /// The script, with absolute ticks.
    #[must_use]
    pub fn messages(&self) -> &[Recorded<T>] {
        &self.inner.messages
    }

    #[must_use]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.inner.log.snapshot()
    }
}

impl<T> Clone for HotObservable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for HotObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotObservable")
            .field("messages", &self.inner.messages)
            .field("subscriptions", &self.inner.log.windows.borrow())
            .field("stopped", &self.inner.stopped.get())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + 'static> Observable<T> for HotObservable<T> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) -> Disposable {
        let now = self.inner.clock.now();
        let index = self.inner.log.open(now);
        let id = self.inner.next_observer.get();
        self.inner.next_observer.set(id + 1);
        self.inner.observers.borrow_mut().push((id, observer));

        tracing::trace!(
            event = "source.hot.subscribe",
            now,
            window = index,
            "Hot source subscribed"
        );

        let inner = Rc::clone(&self.inner);
        Disposable::new(move || {
            inner.observers.borrow_mut().retain(|(observer, _)| *observer != id);
            let now = inner.clock.now();
            inner.log.close(index, now);
            tracing::trace!(
                event = "source.hot.unsubscribe",
                now,
                window = index,
                "Hot source unsubscribed"
            );
        })
    }
}

impl TestScheduler {
    /// Diagram builder using the configured frame size.
    #[must_use]
    pub fn diagram<'a, T: Clone>(&self, source: &'a str) -> Diagram<'a, T> {
        Diagram::new(source).frame_ticks(self.config().frame_ticks)
    }

    /// Parses a `"--^---!"` subscription diagram with the configured frame size.
    pub fn subscription_diagram(&self, source: &str) -> Result<Subscription> {
        parse_subscription_with_frame(source, self.config().frame_ticks)
    }

    /// Source replaying `messages` relative to each subscribe tick.
    #[must_use]
    pub fn create_cold_observable<T>(&self, messages: Vec<Recorded<T>>) -> ColdObservable<T> {
        ColdObservable {
            inner: Rc::new(ColdInner {
                scheduler: self.clone(),
                messages,
                log: WindowLog::default(),
            }),
        }
    }

    /// Source broadcasting `messages` at their absolute ticks.
    ///
    /// Deliveries are scheduled now, so a broadcast and a subscription at the
    /// same tick resolve in favor of whichever was scheduled first.
    /// Entries whose tick is already behind the clock are never delivered.
    #[must_use]
    pub fn create_hot_observable<T: Clone + 'static>(
        &self,
        messages: Vec<Recorded<T>>,
    ) -> HotObservable<T> {
        let inner = Rc::new(HotInner {
            clock: self.clock(),
            messages,
            log: WindowLog::default(),
            observers: RefCell::new(Vec::new()),
            next_observer: Cell::new(0),
            stopped: Cell::new(false),
        });

        let now = self.now();
        for recorded in &inner.messages {
            // Past ticks are unobservable; scheduling them would clamp to now.
            if recorded.time < now {
                tracing::trace!(
                    event = "source.hot.skip_past",
                    time = recorded.time,
                    now,
                    "Hot notification already in the past"
                );
                continue;
            }
            let source = Rc::clone(&inner);
            let notification = recorded.value.clone();
            self.schedule_absolute(recorded.time, move |_| {
                source.broadcast(&notification);
                Ok(())
            });
        }

        HotObservable { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::marble::{on_completed, on_next, parse_marbles, subscribed, subscribed_until};
    use crate::observer::TestObserver;

    fn observer_for(
        sched: &TestScheduler,
    ) -> (TestObserver<&'static str>, Rc<dyn Observer<&'static str>>) {
        let observer = sched.create_observer();
        let shared: Rc<dyn Observer<&'static str>> = Rc::new(observer.clone());
        (observer, shared)
    }

    #[test]
    fn cold_replays_per_subscriber() {
        let sched = TestScheduler::new();
        let source = sched.create_cold_observable(vec![on_next(10, "a"), on_completed(20)]);
        let (first, first_rc) = observer_for(&sched);
        let (second, second_rc) = observer_for(&sched);

        let s1 = source.clone();
        sched.schedule_absolute(200, move |_| {
            let _ = s1.subscribe(first_rc);
            Ok(())
        });
        let s2 = source.clone();
        sched.schedule_absolute(500, move |_| {
            let _ = s2.subscribe(second_rc);
            Ok(())
        });
        sched.advance_to(1000).expect("drain");

        assert_eq!(first.messages(), vec![on_next(210, "a"), on_completed(220)]);
        assert_eq!(second.messages(), vec![on_next(510, "a"), on_completed(520)]);
        assert_eq!(source.subscriptions(), vec![subscribed(200), subscribed(500)]);
    }

    #[test]
    fn cold_ignores_entries_after_terminal() {
        let sched = TestScheduler::new();
        let source = sched.create_cold_observable(vec![
            on_next(10, "a"),
            on_completed(20),
            on_next(30, "late"),
        ]);
        let (observer, shared) = observer_for(&sched);
        let _handle = source.subscribe(shared);
        sched.advance_to(100).expect("drain");

        assert_eq!(observer.messages(), vec![on_next(10, "a"), on_completed(20)]);
    }

    #[test]
    fn hot_subscribers_only_see_the_remainder() {
        let sched = TestScheduler::new();
        let source = sched.create_hot_observable(vec![
            on_next(150, "early"),
            on_next(300, "x"),
            on_completed(400),
        ]);
        let (observer, shared) = observer_for(&sched);

        sched.advance_to(200).expect("advance");
        let handle = source.subscribe(shared);
        sched.advance_to(350).expect("advance");
        handle.dispose();
        sched.advance_to(500).expect("advance");

        assert_eq!(observer.messages(), vec![on_next(300, "x")]);
        assert_eq!(source.subscriptions(), vec![subscribed_until(200, 350)]);
    }

    #[test]
    fn hot_stops_after_terminal() {
        let sched = TestScheduler::new();
        let source = sched.create_hot_observable(vec![
            on_completed(100),
            on_next(200, "ghost"),
        ]);
        let (observer, shared) = observer_for(&sched);
        let _handle = source.subscribe(shared);
        sched.advance_to(300).expect("drain");

        assert_eq!(observer.messages(), vec![on_completed(100)]);
    }

    #[test]
    fn hot_built_late_drops_past_entries() {
        let sched = TestScheduler::new();
        sched.advance_to(500).expect("advance");
        let source = sched.create_hot_observable(vec![on_next(300, "x"), on_next(600, "y")]);
        let (observer, shared) = observer_for(&sched);
        let _handle = source.subscribe(shared);
        sched.advance_to(1000).expect("drain");

        assert_eq!(observer.messages(), vec![on_next(600, "y")]);
        assert_eq!(source.messages().len(), 2);
    }

    #[test]
    fn hot_frames_before_origin_are_never_delivered() {
        let sched = TestScheduler::new();
        let script = parse_marbles("a-^-b", &[('a', "a"), ('b', "b")]).expect("parse");
        assert_eq!(script, vec![on_next(-20, "a"), on_next(20, "b")]);

        let source = sched.create_hot_observable(script);
        let (observer, shared) = observer_for(&sched);
        let _handle = source.subscribe(shared);
        sched.advance_to(100).expect("drain");

        assert_eq!(observer.messages(), vec![on_next(20, "b")]);
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn hot_subscribers_share_one_timeline() {
        let sched = TestScheduler::new();
        let source = sched.create_hot_observable(vec![
            on_next(150, "a"),
            on_next(300, "b"),
            on_completed(400),
        ]);
        let (early, early_rc) = observer_for(&sched);
        let (late, late_rc) = observer_for(&sched);
        let early_handle: Rc<RefCell<Option<Disposable>>> = Rc::default();

        let (s, slot) = (source.clone(), Rc::clone(&early_handle));
        sched.schedule_absolute(100, move |_| {
            *slot.borrow_mut() = Some(s.subscribe(early_rc));
            Ok(())
        });
        let s = source.clone();
        sched.schedule_absolute(250, move |_| {
            let _ = s.subscribe(late_rc);
            Ok(())
        });
        // Leaves between the two broadcasts.
        let slot = Rc::clone(&early_handle);
        sched.schedule_absolute(200, move |_| {
            if let Some(handle) = slot.borrow_mut().take() {
                assert!(handle.dispose());
            }
            Ok(())
        });
        sched.advance_to(1000).expect("drain");

        assert_eq!(early.messages(), vec![on_next(150, "a")]);
        assert_eq!(late.messages(), vec![on_next(300, "b"), on_completed(400)]);
        assert_eq!(
            source.subscriptions(),
            vec![subscribed_until(100, 200), subscribed(250)]
        );
    }

    #[test]
    fn diagrams_follow_the_configured_frame() {
        let sched = TestScheduler::with_config(HarnessConfig::new().frame_ticks(5));
        let script = sched
            .diagram("-a|")
            .value('a', "a")
            .parse()
            .expect("parse");
        assert_eq!(script, vec![on_next(5, "a"), on_completed(10)]);
        assert_eq!(
            sched.subscription_diagram("^-!").expect("parse"),
            subscribed_until(0, 10)
        );
    }
}
