//! Harness configuration.
//!
//! Defaults come from the reference ticks and can be overridden in code or
//! through the environment:
//! - `MARBLE_FRAME_TICKS`: ticks per marble diagram frame (positive integer)
//! - `MARBLE_DRAIN_LIMIT`: max callbacks per drive call (`off` disables)

use crate::error::{Error, Result};
use crate::marble::{CREATED, DEFAULT_FRAME_TICKS, DISPOSED, SUBSCRIBED, Tick};

pub const FRAME_TICKS_ENV: &str = "MARBLE_FRAME_TICKS";
pub const DRAIN_LIMIT_ENV: &str = "MARBLE_DRAIN_LIMIT";

/// Callbacks a single drive call may execute before it is treated as runaway.
pub const DEFAULT_DRAIN_LIMIT: u64 = 1_000_000;

/// Ticks at which `start` creates, subscribes to and disposes a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub created: Tick,
    pub subscribed: Tick,
    pub disposed: Tick,
}

impl Timing {
    #[must_use]
    pub const fn new(created: Tick, subscribed: Tick, disposed: Tick) -> Self {
        Self {
            created,
            subscribed,
            disposed,
        }
    }

    /// Reference creation/subscription ticks with a custom disposal tick.
    #[must_use]
    pub const fn with_disposed(disposed: Tick) -> Self {
        Self::new(CREATED, SUBSCRIBED, disposed)
    }

    pub fn validate(&self) -> Result<()> {
        if self.created > self.subscribed || self.subscribed > self.disposed {
            return Err(Error::validation(format!(
                "timing must satisfy created <= subscribed <= disposed (got {}, {}, {})",
                self.created, self.subscribed, self.disposed
            )));
        }
        Ok(())
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::new(CREATED, SUBSCRIBED, DISPOSED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Default timing used by `TestScheduler::start`.
    pub timing: Timing,
    /// Ticks per frame when parsing marble diagrams.
    pub frame_ticks: Tick,
    /// Maximum callbacks per drive call; `None` is unbounded.
    pub drain_limit: Option<u64>,
}

impl HarnessConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timing: Timing::new(CREATED, SUBSCRIBED, DISPOSED),
            frame_ticks: DEFAULT_FRAME_TICKS,
            drain_limit: Some(DEFAULT_DRAIN_LIMIT),
        }
    }

    #[must_use]
    pub const fn timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    #[must_use]
    pub const fn frame_ticks(mut self, frame_ticks: Tick) -> Self {
        self.frame_ticks = frame_ticks;
        self
    }

    #[must_use]
    pub const fn drain_limit(mut self, limit: Option<u64>) -> Self {
        self.drain_limit = limit;
        self
    }

    /// Defaults overridden by `MARBLE_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new();

        if let Some(raw) = lookup(FRAME_TICKS_ENV) {
            match parse_frame_ticks(&raw) {
                Some(frame_ticks) => config.frame_ticks = frame_ticks,
                None => tracing::warn!(
                    event = "config.ignored",
                    key = FRAME_TICKS_ENV,
                    value = %raw,
                    "Ignoring invalid frame size"
                ),
            }
        }

        if let Some(raw) = lookup(DRAIN_LIMIT_ENV) {
            match parse_drain_limit(&raw) {
                Some(limit) => config.drain_limit = limit,
                None => tracing::warn!(
                    event = "config.ignored",
                    key = DRAIN_LIMIT_ENV,
                    value = %raw,
                    "Ignoring invalid drain limit"
                ),
            }
        }

        config
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_frame_ticks(value: &str) -> Option<Tick> {
    value.trim().parse::<Tick>().ok().filter(|ticks| *ticks > 0)
}

/// `Some(None)` disables the limit; `None` means unparseable.
fn parse_drain_limit(value: &str) -> Option<Option<u64>> {
    match value.trim().to_ascii_lowercase().as_str() {
        "off" | "none" | "unlimited" | "disabled" | "0" => Some(None),
        other => other.parse::<u64>().ok().map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_reference_ticks() {
        let config = HarnessConfig::default();
        assert_eq!(config.timing, Timing::new(100, 200, 1000));
        assert_eq!(config.frame_ticks, 10);
        assert_eq!(config.drain_limit, Some(DEFAULT_DRAIN_LIMIT));
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = HarnessConfig::from_lookup(lookup_from(&[
            (FRAME_TICKS_ENV, " 5 "),
            (DRAIN_LIMIT_ENV, "250"),
        ]));
        assert_eq!(config.frame_ticks, 5);
        assert_eq!(config.drain_limit, Some(250));
    }

    #[test]
    fn drain_limit_can_be_disabled() {
        for raw in ["off", "NONE", "0", "unlimited"] {
            let config = HarnessConfig::from_lookup(lookup_from(&[(DRAIN_LIMIT_ENV, raw)]));
            assert_eq!(config.drain_limit, None, "raw={raw}");
        }
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = HarnessConfig::from_lookup(lookup_from(&[
            (FRAME_TICKS_ENV, "-3"),
            (DRAIN_LIMIT_ENV, "lots"),
        ]));
        assert_eq!(config, HarnessConfig::new());
    }

    #[test]
    fn timing_validation() {
        assert!(Timing::default().validate().is_ok());
        assert!(Timing::with_disposed(200).validate().is_ok());
        assert!(Timing::new(300, 200, 1000).validate().is_err());
        assert!(Timing::new(100, 200, 150).validate().is_err());
    }
}
