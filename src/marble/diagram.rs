//! ASCII marble diagrams.
//!
//! Every non-whitespace character occupies one frame of `frame_ticks` ticks:
//!
//! - `-` an empty frame
//! - `a`..`z`, digits, any other symbol: an `OnNext` looked up in the value table
//! - `|` completion, `#` error
//! - `(ab)` emits `a` and `b` in the frame where the group opens
//! - `^` marks tick zero; frames before it have negative ticks
//!
//! Subscription diagrams use `^` for subscribe and `!` for unsubscribe.

use super::{Notification, Recorded, Subscription, Tick, on_completed, on_next};
use crate::error::{Error, Result, TestError};

/// Ticks per frame when none is configured.
pub const DEFAULT_FRAME_TICKS: Tick = 10;

const DEFAULT_ERROR_MESSAGE: &str = "error";

/// Builder for parsing a marble diagram into a script.
#[derive(Debug, Clone)]
pub struct Diagram<'a, T> {
    source: &'a str,
    values: Vec<(char, T)>,
    error: TestError,
    frame_ticks: Tick,
}

impl<'a, T: Clone> Diagram<'a, T> {
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            values: Vec::new(),
            error: TestError::new(DEFAULT_ERROR_MESSAGE),
            frame_ticks: DEFAULT_FRAME_TICKS,
        }
    }

    /// Binds `symbol` to the value it emits.
    #[must_use]
    pub fn value(mut self, symbol: char, value: T) -> Self {
        self.values.push((symbol, value));
        self
    }

    /// Error payload emitted by `#`.
    #[must_use]
    pub fn error(mut self, error: impl Into<TestError>) -> Self {
        self.error = error.into();
        self
    }

    #[must_use]
    pub fn frame_ticks(mut self, frame_ticks: Tick) -> Self {
        self.frame_ticks = frame_ticks;
        self
    }

    pub fn parse(&self) -> Result<Vec<Recorded<T>>> {
        if self.frame_ticks <= 0 {
            return Err(Error::validation(format!(
                "frame_ticks must be > 0 (got {})",
                self.frame_ticks
            )));
        }
        let origin = locate_origin(self.source)?;

        let mut script = Vec::new();
        let mut frame: Tick = 0;
        let mut group_start: Option<Tick> = None;
        for (column, symbol) in self.source.chars().enumerate() {
            if symbol.is_whitespace() {
                continue;
            }
            let time = (group_start.unwrap_or(frame) - origin).saturating_mul(self.frame_ticks);
            match symbol {
                '-' | '^' => {}
                '(' => {
                    if group_start.is_some() {
                        return Err(Error::marble(format!(
                            "nested group at column {column} in {:?}",
                            self.source
                        )));
                    }
                    group_start = Some(frame);
                }
                ')' => {
                    if group_start.take().is_none() {
                        return Err(Error::marble(format!(
                            "unmatched ')' at column {column} in {:?}",
                            self.source
                        )));
                    }
                }
                '|' => script.push(on_completed(time)),
                '#' => script.push(Recorded::new(
                    time,
                    Notification::OnError(self.error.clone()),
                )),
                '!' => {
                    return Err(Error::marble(format!(
                        "'!' only belongs in subscription diagrams (column {column})"
                    )));
                }
                other => {
                    let value = self.lookup(other).ok_or_else(|| {
                        Error::marble(format!(
                            "no value bound to {other:?} (column {column}) in {:?}",
                            self.source
                        ))
                    })?;
                    script.push(on_next(time, value));
                }
            }
            frame += 1;
        }

        if group_start.is_some() {
            return Err(Error::marble(format!("unclosed group in {:?}", self.source)));
        }
        Ok(script)
    }

    fn lookup(&self, symbol: char) -> Option<T> {
        self.values
            .iter()
            .find(|(bound, _)| *bound == symbol)
            .map(|(_, value)| value.clone())
    }
}

/// Frame index of `^`, or zero when the diagram has none.
fn locate_origin(source: &str) -> Result<Tick> {
    let mut origin = None;
    for (frame, symbol) in source.chars().filter(|c| !c.is_whitespace()).enumerate() {
        if symbol == '^' {
            if origin.is_some() {
                return Err(Error::marble(format!("more than one '^' in {source:?}")));
            }
            origin = Some(frame);
        }
    }
    let origin = origin.unwrap_or(0);
    Tick::try_from(origin).map_err(|_| Error::marble("diagram too long"))
}

/// Parses `diagram` with the default frame size and error payload.
pub fn parse_marbles<T: Clone>(diagram: &str, values: &[(char, T)]) -> Result<Vec<Recorded<T>>> {
    values
        .iter()
        .fold(Diagram::new(diagram), |builder, (symbol, value)| {
            builder.value(*symbol, value.clone())
        })
        .parse()
}

/// Parses a subscription diagram such as `"--^---!"`.
pub fn parse_subscription(diagram: &str) -> Result<Subscription> {
    parse_subscription_with_frame(diagram, DEFAULT_FRAME_TICKS)
}

pub fn parse_subscription_with_frame(diagram: &str, frame_ticks: Tick) -> Result<Subscription> {
    if frame_ticks <= 0 {
        return Err(Error::validation(format!(
            "frame_ticks must be > 0 (got {frame_ticks})"
        )));
    }
    let mut subscribe = None;
    let mut unsubscribe = None;
    let mut frame: Tick = 0;
    for symbol in diagram.chars().filter(|c| !c.is_whitespace()) {
        let time = frame.saturating_mul(frame_ticks);
        match symbol {
            '-' => {}
            '^' if subscribe.is_none() => subscribe = Some(time),
            '!' if subscribe.is_some() && unsubscribe.is_none() => unsubscribe = Some(time),
            other => {
                return Err(Error::marble(format!(
                    "unexpected {other:?} in subscription diagram {diagram:?}"
                )));
            }
        }
        frame += 1;
    }

    let subscribe = subscribe
        .ok_or_else(|| Error::marble(format!("missing '^' in subscription diagram {diagram:?}")))?;
    Ok(unsubscribe.map_or_else(
        || Subscription::new(subscribe),
        |end| Subscription::with_end(subscribe, end),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marble::{on_error, subscribed, subscribed_until};

    #[test]
    fn frames_map_to_ticks() {
        let script = parse_marbles("--a--b-|", &[('a', 1), ('b', 2)]).expect("parse");
        assert_eq!(script, vec![on_next(20, 1), on_next(50, 2), on_completed(70)]);
    }

    #[test]
    fn whitespace_takes_no_time() {
        let script = parse_marbles("a - b |", &[('a', 1), ('b', 2)]).expect("parse");
        assert_eq!(script, vec![on_next(0, 1), on_next(20, 2), on_completed(30)]);
    }

    #[test]
    fn groups_share_a_frame() {
        let script = parse_marbles("-(ab)-|", &[('a', 1), ('b', 2)]).expect("parse");
        assert_eq!(
            script,
            vec![on_next(10, 1), on_next(10, 2), on_completed(60)]
        );
    }

    #[test]
    fn origin_marker_makes_earlier_frames_negative() {
        let script = parse_marbles("a-^-b", &[('a', 'a'), ('b', 'b')]).expect("parse");
        assert_eq!(script, vec![on_next(-20, 'a'), on_next(20, 'b')]);
    }

    #[test]
    fn error_uses_builder_payload_and_frame_size() {
        let script = Diagram::<i32>::new("-#")
            .error("broken")
            .frame_ticks(5)
            .parse()
            .expect("parse");
        assert_eq!(script, vec![on_error(5, "broken")]);
    }

    #[test]
    fn malformed_diagrams_are_rejected() {
        assert!(matches!(
            parse_marbles::<i32>("-x-", &[]),
            Err(Error::Marble(_))
        ));
        assert!(matches!(
            parse_marbles::<i32>("-(a", &[('a', 1)]),
            Err(Error::Marble(_))
        ));
        assert!(matches!(
            parse_marbles::<i32>("((a))", &[('a', 1)]),
            Err(Error::Marble(_))
        ));
        assert!(matches!(
            parse_marbles::<i32>("^-^", &[]),
            Err(Error::Marble(_))
        ));
        assert!(matches!(
            parse_marbles::<i32>("--!", &[]),
            Err(Error::Marble(_))
        ));
        assert!(matches!(
            Diagram::<i32>::new("-|").frame_ticks(0).parse(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn subscription_diagrams() {
        assert_eq!(parse_subscription("--^--!").expect("parse"), subscribed_until(20, 50));
        assert_eq!(parse_subscription("^").expect("parse"), subscribed(0));
        assert_eq!(
            parse_subscription_with_frame("-^-!", 100).expect("parse"),
            subscribed_until(100, 300)
        );
        assert!(parse_subscription("---").is_err());
        assert!(parse_subscription("-!-^").is_err());
        assert!(parse_subscription("^-a").is_err());
    }
}
