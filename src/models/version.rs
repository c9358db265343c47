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
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Version of an exported capability. Missing components compare as zero,
/// so `1`, `1.0` and `1.0.0` are the same version.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: Option<u32>,
    pub patch: Option<u32>,
    pub qualifier: Option<String>,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor: Some(minor),
            patch: Some(patch),
            qualifier: None,
        }
    }

    pub fn from_components(major: u32, minor: Option<u32>, patch: Option<u32>) -> Self {
        Self {
            major,
            minor,
            patch,
            qualifier: None,
        }
    }

    pub fn with_qualifier(mut self, qualifier: String) -> Self {
        self.qualifier = Some(qualifier);
        self
    }

    fn sort_key(&self) -> (u32, u32, u32, &str) {
        (
            self.major,
            self.minor.unwrap_or(0),
            self.patch.unwrap_or(0),
            self.qualifier.as_deref().unwrap_or(""),
        )
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl FromStr for Version {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (version_part, qualifier) = match trimmed.split_once('+') {
            Some((version, qualifier)) => (version, Some(qualifier.to_string())),
            None => (trimmed, None),
        };

        let components: Vec<&str> = version_part.split('.').collect();
        if components.is_empty() || components.len() > 3 {
            return Err(LoaderError::InvalidVersion(s.to_string()));
        }

        let parse = |component: &str| {
            component
                .parse::<u32>()
                .map_err(|_| LoaderError::InvalidVersion(s.to_string()))
        };

        let major = parse(components[0])?;
        let minor = components.get(1).map(|c| parse(*c)).transpose()?;
        let patch = components.get(2).map(|c| parse(*c)).transpose()?;

        let mut version = Version::from_components(major, minor, patch);
        if let Some(qualifier) = qualifier {
            version = version.with_qualifier(qualifier);
        }
        Ok(version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major)?;

        if let Some(minor) = self.minor {
            write!(f, ".{minor}")?;

            if let Some(patch) = self.patch {
                write!(f, ".{patch}")?;
            }
        }

        if let Some(qualifier) = &self.qualifier {
            write!(f, "+{qualifier}")?;
        }
        Ok(())
    }
}

/// Interval of acceptable versions. An unbounded side is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRange {
    pub low: Option<Version>,
    pub low_inclusive: bool,
    pub high: Option<Version>,
    pub high_inclusive: bool,
}

impl VersionRange {
    pub const ALL: VersionRange = VersionRange {
        low: None,
        low_inclusive: true,
        high: None,
        high_inclusive: true,
    };

    pub fn new(
        low: Option<Version>,
        low_inclusive: bool,
        high: Option<Version>,
        high_inclusive: bool,
    ) -> Self {
        Self {
            low,
            low_inclusive,
            high,
            high_inclusive,
        }
    }

    pub fn exact(version: Version) -> Self {
        Self::new(Some(version.clone()), true, Some(version), true)
    }

    pub fn at_least(version: Version) -> Self {
        Self::new(Some(version), true, None, false)
    }

    pub fn is_unbounded(&self) -> bool {
        self.low.is_none() && self.high.is_none()
    }

    /// Unversioned capabilities only satisfy unbounded ranges.
    pub fn contains_optional(&self, version: Option<&Version>) -> bool {
        match version {
            Some(version) => self.contains(version),
            None => self.is_unbounded(),
        }
    }

    pub fn contains(&self, version: &Version) -> bool {
        let above_low = match &self.low {
            None => true,
            Some(low) if self.low_inclusive => version >= low,
            Some(low) => version > low,
        };
        let below_high = match &self.high {
            None => true,
            Some(high) if self.high_inclusive => version <= high,
            Some(high) => version < high,
        };
        above_low && below_high
    }

    /// Two ranges are consistent when at least one version satisfies both.
    pub fn is_consistent(&self, other: &VersionRange) -> bool {
        let (low, low_inclusive) = match (&self.low, &other.low) {
            (None, None) => (None, true),
            (Some(a), None) => (Some(a), self.low_inclusive),
            (None, Some(b)) => (Some(b), other.low_inclusive),
            (Some(a), Some(b)) => match a.cmp(b) {
                Ordering::Greater => (Some(a), self.low_inclusive),
                Ordering::Less => (Some(b), other.low_inclusive),
                Ordering::Equal => (Some(a), self.low_inclusive && other.low_inclusive),
            },
        };
        let (high, high_inclusive) = match (&self.high, &other.high) {
            (None, None) => (None, true),
            (Some(a), None) => (Some(a), self.high_inclusive),
            (None, Some(b)) => (Some(b), other.high_inclusive),
            (Some(a), Some(b)) => match a.cmp(b) {
                Ordering::Less => (Some(a), self.high_inclusive),
                Ordering::Greater => (Some(b), other.high_inclusive),
                Ordering::Equal => (Some(a), self.high_inclusive && other.high_inclusive),
            },
        };

        match (low, high) {
            (Some(low), Some(high)) => match low.cmp(high) {
                Ordering::Less => true,
                Ordering::Equal => low_inclusive && high_inclusive,
                Ordering::Greater => false,
            },
            _ => true,
        }
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromStr for VersionRange {
    type Err = LoaderError;

    /// Accepts `*`, a bare version (at least), or interval notation such as
    /// `[1.0,2.0)`, `(1.0,]`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::ALL);
        }

        let first = trimmed.chars().next().unwrap_or_default();
        if first != '[' && first != '(' {
            return Ok(Self::at_least(Version::from_str(trimmed)?));
        }

        let last = trimmed.chars().last().unwrap_or_default();
        if (last != ']' && last != ')') || trimmed.len() < 3 {
            return Err(LoaderError::InvalidVersion(s.to_string()));
        }

        let inner = &trimmed[1..trimmed.len() - 1];
        let (low, high) = inner
            .split_once(',')
            .ok_or_else(|| LoaderError::InvalidVersion(s.to_string()))?;

        let bound = |value: &str| -> Result<Option<Version>> {
            let value = value.trim();
            if value.is_empty() {
                Ok(None)
            } else {
                Version::from_str(value).map(Some)
            }
        };

        Ok(Self::new(bound(low)?, first == '[', bound(high)?, last == ']'))
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded() {
            return f.write_str("*");
        }
        let open = if self.low_inclusive { '[' } else { '(' };
        let close = if self.high_inclusive { ']' } else { ')' };
        write!(f, "{open}")?;
        if let Some(low) = &self.low {
            write!(f, "{low}")?;
        }
        f.write_str(",")?;
        if let Some(high) = &self.high {
            write!(f, "{high}")?;
        }
        write!(f, "{close}")
    }
}
