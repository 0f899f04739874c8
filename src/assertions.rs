//! Assertion engine.
//!
//! Every assertion returns `Result<_, Error>` with an `Error::Assertion`
//! carrying a [`Mismatch`]; the caller decides whether to `?`, `unwrap` or
//! report it.

use crate::error::{Error, Mismatch, Result};
use crate::marble::Recorded;
use futures::stream::{self, Stream, StreamExt};
use std::any::{Any, type_name};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Positional equality of two finite sequences.
///
/// Reports the first differing index, or where the shorter sequence ended.
pub fn assert_sequence_eq<T, E, A>(expected: E, actual: A) -> Result<()>
where
    T: PartialEq + fmt::Debug,
    E: IntoIterator<Item = T>,
    A: IntoIterator<Item = T>,
{
    walk(expected, actual, |value| format!("{value:?}"))
}

/// Like [`assert_sequence_eq`] for marble logs, rendering items as `OnNext(a)@210`.
pub fn assert_messages_eq<T>(expected: &[Recorded<T>], actual: &[Recorded<T>]) -> Result<()>
where
    T: PartialEq + fmt::Debug,
{
    walk(expected, actual, |recorded| recorded.to_string())
}

fn walk<T, E, A>(expected: E, actual: A, render: impl Fn(&T) -> String) -> Result<()>
where
    T: PartialEq,
    E: IntoIterator<Item = T>,
    A: IntoIterator<Item = T>,
{
    let mut expected = expected.into_iter();
    let mut actual = actual.into_iter();
    let mut index = 0;
    loop {
        match (expected.next(), actual.next()) {
            (None, None) => return Ok(()),
            (Some(_), None) => return Err(Mismatch::Insufficient { index }.into()),
            (None, Some(_)) => return Err(Mismatch::Extra { index }.into()),
            (Some(want), Some(got)) if want != got => {
                return Err(Mismatch::Element {
                    index,
                    expected: render(&want),
                    actual: render(&got),
                }
                .into());
            }
            (Some(_), Some(_)) => {}
        }
        index += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Expected,
    Actual,
}

struct Arrival<T> {
    side: Side,
    index: usize,
    value: T,
}

/// Equality of two asynchronous sequences, paired by arrival index.
///
/// Both streams are polled concurrently. The Nth item of `expected` is
/// compared with the Nth item of `actual` whenever both have arrived, so the
/// streams may run on different timelines as long as they agree on order and
/// content. Once both end, their lengths must match.
pub async fn assert_streams_eq<T, E, A>(expected: E, actual: A) -> Result<()>
where
    T: PartialEq + fmt::Debug,
    E: Stream<Item = T>,
    A: Stream<Item = T>,
{
    let expected = expected.enumerate().map(|(index, value)| Arrival {
        side: Side::Expected,
        index,
        value,
    });
    let actual = actual.enumerate().map(|(index, value)| Arrival {
        side: Side::Actual,
        index,
        value,
    });
    let mut merged = std::pin::pin!(stream::select(expected, actual));

    let mut unmatched: VecDeque<Arrival<T>> = VecDeque::new();
    let mut expected_count = 0usize;
    let mut actual_count = 0usize;

    while let Some(arrival) = merged.next().await {
        match arrival.side {
            Side::Expected => expected_count += 1,
            Side::Actual => actual_count += 1,
        }

        // Only one side can be ahead, so the queue never mixes sides.
        let partner = if unmatched
            .front()
            .is_some_and(|front| front.side != arrival.side)
        {
            unmatched.pop_front()
        } else {
            None
        };
        let Some(partner) = partner else {
            unmatched.push_back(arrival);
            continue;
        };

        debug_assert_eq!(partner.index, arrival.index);
        let (want, got) = match arrival.side {
            Side::Expected => (arrival.value, partner.value),
            Side::Actual => (partner.value, arrival.value),
        };
        if want != got {
            tracing::debug!(
                event = "assert.streams.mismatch",
                index = arrival.index,
                "Stream items differ"
            );
            return Err(Mismatch::Element {
                index: arrival.index,
                expected: format!("{want:?}"),
                actual: format!("{got:?}"),
            }
            .into());
        }
    }

    if expected_count != actual_count {
        return Err(Mismatch::Count {
            expected: expected_count,
            actual: actual_count,
        }
        .into());
    }
    Ok(())
}

/// Fails unless `action` returns an error; yields that error.
pub fn assert_err<R, E, F>(action: F) -> Result<E>
where
    R: fmt::Debug,
    F: FnOnce() -> std::result::Result<R, E>,
{
    match action() {
        Ok(value) => {
            tracing::debug!(event = "assert.err.none", value = ?value, "Action succeeded");
            Err(Mismatch::NoError {
                expected: "any error".to_string(),
            }
            .into())
        }
        Err(err) => Ok(err),
    }
}

/// Fails unless `action` returns an error of concrete type `K`.
pub fn assert_err_kind<K, R, F>(action: F) -> Result<Box<K>>
where
    K: std::error::Error + 'static,
    F: FnOnce() -> std::result::Result<R, Box<dyn std::error::Error>>,
{
    let expected = type_name::<K>();
    match action() {
        Ok(_) => Err(Mismatch::NoError {
            expected: expected.to_string(),
        }
        .into()),
        Err(err) => err.downcast::<K>().map_err(|other| {
            Error::from(Mismatch::WrongError {
                expected: expected.to_string(),
                actual: other.to_string(),
            })
        }),
    }
}

/// Fails unless `action` returns an error equal to `expected`.
pub fn assert_err_eq<R, E, F>(action: F, expected: &E) -> Result<()>
where
    E: PartialEq + fmt::Debug,
    F: FnOnce() -> std::result::Result<R, E>,
{
    match action() {
        Ok(_) => Err(Mismatch::NoError {
            expected: format!("{expected:?}"),
        }
        .into()),
        Err(err) if err == *expected => Ok(()),
        Err(err) => Err(Mismatch::WrongError {
            expected: format!("{expected:?}"),
            actual: format!("{err:?}"),
        }
        .into()),
    }
}

/// Fails unless `action` panics; yields the panic message.
pub fn assert_panics<F: FnOnce()>(action: F) -> Result<String> {
    match panic::catch_unwind(AssertUnwindSafe(action)) {
        Ok(()) => Err(Mismatch::NoError {
            expected: "a panic".to_string(),
        }
        .into()),
        Err(payload) => Ok(panic_message(&*payload)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "<non-string panic payload>".to_string())
}
