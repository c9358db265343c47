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
use crate::models::NameFilter;
use std::fmt;
use std::str::FromStr;

/// When a domain asks its parent, relative to its own providers.
///
/// Names accepted by the before filter go to the parent first; names
/// accepted by the after filter go to the parent once everything local has
/// failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentPolicy {
    before: NameFilter,
    after: NameFilter,
}

impl ParentPolicy {
    pub fn before() -> Self {
        Self {
            before: NameFilter::Everything,
            after: NameFilter::Nothing,
        }
    }

    pub fn after() -> Self {
        Self {
            before: NameFilter::Nothing,
            after: NameFilter::Everything,
        }
    }

    pub fn restricted(before: NameFilter, after: NameFilter) -> Self {
        Self { before, after }
    }

    pub fn before_filter(&self) -> &NameFilter {
        &self.before
    }

    pub fn after_filter(&self) -> &NameFilter {
        &self.after
    }
}

impl Default for ParentPolicy {
    fn default() -> Self {
        Self::before()
    }
}

impl FromStr for ParentPolicy {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "before" => Ok(Self::before()),
            "after" => Ok(Self::after()),
            other => Err(LoaderError::ConfigError(format!(
                "Unknown parent policy '{other}' (expected 'before' or 'after')"
            ))),
        }
    }
}

impl fmt::Display for ParentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::before() {
            f.write_str("before")
        } else if *self == Self::after() {
            f.write_str("after")
        } else {
            write!(f, "restricted(before: {}, after: {})", self.before, self.after)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_values() {
        assert_eq!(ParentPolicy::from_str("before").unwrap(), ParentPolicy::before());
        assert_eq!(ParentPolicy::from_str(" AFTER ").unwrap(), ParentPolicy::after());
        assert!(matches!(
            ParentPolicy::from_str("sideways"),
            Err(LoaderError::ConfigError(_))
        ));
    }

    #[test]
    fn restricted_filters() {
        let policy = ParentPolicy::restricted(NameFilter::packages(["com.a"]), NameFilter::Nothing);
        assert!(policy.before_filter().matches_unit("com.a.Foo"));
        assert!(!policy.before_filter().matches_unit("com.b.Bar"));
        assert!(!policy.after_filter().matches_unit("com.b.Bar"));
        assert!(policy.to_string().starts_with("restricted"));
    }
}
