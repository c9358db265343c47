// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::{LoaderError, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable that overrides `[locking] timeout`.
pub const LOCK_TIMEOUT_ENV: &str = "UNITLOADER_LOCK_TIMEOUT";

pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 120;

/// How long a thread may wait for a provider lock, or for work it handed to
/// the lock's owner, before the wait is treated as a deadlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTimeoutValue {
    Finite(Duration),
    Infinite,
}

impl LockTimeoutValue {
    pub const fn from_secs(seconds: u64) -> Self {
        Self::Finite(Duration::from_secs(seconds))
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self::Finite(Duration::from_millis(millis))
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, LockTimeoutValue::Infinite)
    }

    /// Time left after `elapsed`; `None` when the wait is unbounded.
    pub fn remaining_after(&self, elapsed: Duration) -> Option<Duration> {
        match self {
            LockTimeoutValue::Finite(limit) => Some(limit.saturating_sub(elapsed)),
            LockTimeoutValue::Infinite => None,
        }
    }
}

impl Default for LockTimeoutValue {
    fn default() -> Self {
        Self::from_secs(DEFAULT_LOCK_TIMEOUT_SECS)
    }
}

impl FromStr for LockTimeoutValue {
    type Err = LoaderError;

    /// Accepts `infinite`, whole seconds (`30` or `30s`) and milliseconds
    /// (`250ms`).
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("infinite") {
            return Ok(LockTimeoutValue::Infinite);
        }

        let invalid = || {
            LoaderError::ConfigError(format!(
                "Lock timeout '{trimmed}' is invalid. Use seconds (30, 30s), milliseconds \
                 (250ms) or 'infinite'."
            ))
        };
        if let Some(millis) = trimmed.strip_suffix("ms") {
            return millis
                .parse()
                .map(LockTimeoutValue::from_millis)
                .map_err(|_| invalid());
        }
        trimmed
            .strip_suffix('s')
            .unwrap_or(trimmed)
            .parse()
            .map(LockTimeoutValue::from_secs)
            .map_err(|_| invalid())
    }
}

impl fmt::Display for LockTimeoutValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTimeoutValue::Infinite => f.write_str("infinite"),
            LockTimeoutValue::Finite(duration) if duration.subsec_millis() != 0 => {
                write!(f, "{}ms", duration.as_millis())
            }
            LockTimeoutValue::Finite(duration) => write!(f, "{}s", duration.as_secs()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> LockTimeoutValue {
        LockTimeoutValue::from_str(s).unwrap()
    }

    #[test]
    fn parses_seconds_millis_and_infinite() {
        assert_eq!(parse("42"), LockTimeoutValue::from_secs(42));
        assert_eq!(parse(" 42s "), LockTimeoutValue::from_secs(42));
        assert_eq!(parse("0"), LockTimeoutValue::from_secs(0));
        assert_eq!(parse("250ms"), LockTimeoutValue::from_millis(250));
        assert_eq!(parse("Infinite"), LockTimeoutValue::Infinite);
    }

    #[test]
    fn rejects_other_input() {
        for bad in ["abc", "", "-1", "1.5", "10m"] {
            let err = LockTimeoutValue::from_str(bad).unwrap_err();
            assert!(matches!(err, LoaderError::ConfigError(_)), "{bad}");
        }
    }

    #[test]
    fn default_is_two_minutes_and_displays_compactly() {
        assert_eq!(LockTimeoutValue::default(), LockTimeoutValue::from_secs(120));
        assert_eq!(LockTimeoutValue::default().to_string(), "120s");
        assert_eq!(LockTimeoutValue::from_millis(250).to_string(), "250ms");
        assert_eq!(LockTimeoutValue::Infinite.to_string(), "infinite");
    }

    #[test]
    fn remaining_time_saturates() {
        let budget = LockTimeoutValue::from_millis(100);
        assert_eq!(
            budget.remaining_after(Duration::from_millis(40)),
            Some(Duration::from_millis(60))
        );
        assert_eq!(
            budget.remaining_after(Duration::from_secs(1)),
            Some(Duration::ZERO)
        );
        assert_eq!(
            LockTimeoutValue::Infinite.remaining_after(Duration::from_secs(1)),
            None
        );
    }
}
