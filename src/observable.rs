//! Minimal observer/observable seam the harness drives pipelines through.
//!
//! The harness is single-threaded: observers are shared as `Rc<dyn Observer<T>>`
//! and all callbacks run on the thread that drives the scheduler.

use crate::error::TestError;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Receiver of notifications.
pub trait Observer<T> {
    fn on_next(&self, value: T);
    fn on_error(&self, error: TestError);
    fn on_completed(&self);
}

/// Source of notifications.
pub trait Observable<T> {
    /// Attaches `observer`; the returned handle detaches it.
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) -> Disposable;
}

impl<T, O: Observable<T> + ?Sized> Observable<T> for Rc<O> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) -> Disposable {
        self.as_ref().subscribe(observer)
    }
}

/// One-shot teardown handle.
///
/// `dispose` runs the teardown at most once; later calls are no-ops. The
/// teardown is taken out before it runs, so it may dispose itself again.
pub struct Disposable {
    action: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Disposable {
    pub fn new(action: impl FnOnce() + 'static) -> Self {
        Self {
            action: RefCell::new(Some(Box::new(action))),
        }
    }

    /// A handle with nothing to tear down.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            action: RefCell::new(None),
        }
    }

    /// Runs the teardown. Returns `false` if it already ran.
    pub fn dispose(&self) -> bool {
        let action = self.action.borrow_mut().take();
        action.is_some_and(|action| {
            action();
            true
        })
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.action.borrow().is_none()
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Observable backed by a subscribe closure.
pub struct FnObservable<F> {
    subscribe: F,
}

/// Builds an ad-hoc observable from its subscribe function.
pub const fn from_fn<T, F>(subscribe: F) -> FnObservable<F>
where
    F: Fn(Rc<dyn Observer<T>>) -> Disposable,
{
    FnObservable { subscribe }
}

impl<T, F> Observable<T> for FnObservable<F>
where
    F: Fn(Rc<dyn Observer<T>>) -> Disposable,
{
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) -> Disposable {
        (self.subscribe)(observer)
    }
}
