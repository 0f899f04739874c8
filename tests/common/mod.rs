//! Shared helpers for the integration tests.
//!
//! - `init_test_logging`: route `tracing` output through the test writer
//! - `staggered`: a stream that stays pending for a while before each item

use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::sync::Once;
use std::task::Poll;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Installs a test-writer subscriber filtered by `RUST_LOG` (default `debug`).
///
/// The first call wins; later calls are no-ops.
#[allow(dead_code)]
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Yields `items` in order, returning `Pending` `gaps[i]` times before item `i`.
///
/// Lets two streams with the same content arrive on different schedules
/// under a single-threaded executor.
#[allow(dead_code)]
pub fn staggered<T>(items: Vec<T>, gaps: Vec<usize>) -> impl Stream<Item = T> {
    let mut queue: VecDeque<(usize, T)> = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| (gaps.get(index).copied().unwrap_or(0), item))
        .collect();

    stream::poll_fn(move |cx| {
        let Some((gap, _)) = queue.front_mut() else {
            return Poll::Ready(None);
        };
        if *gap > 0 {
            *gap -= 1;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        Poll::Ready(queue.pop_front().map(|(_, item)| item))
    })
}
