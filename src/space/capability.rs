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

use crate::models::{NameFilter, SplitPolicy, Version, VersionRange};
use std::fmt;

/// Something a module offers to others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Package {
        name: String,
        version: Option<Version>,
        split_policy: SplitPolicy,
        /// Optional exports do not take part in package ownership.
        optional: bool,
    },
    Module {
        name: String,
        version: Option<Version>,
    },
}

impl Capability {
    pub fn package(name: impl Into<String>) -> Self {
        Capability::Package {
            name: name.into(),
            version: None,
            split_policy: SplitPolicy::default(),
            optional: false,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Capability::Package { name, .. } | Capability::Module { name, .. } => name,
        }
    }

    pub fn version(&self) -> Option<&Version> {
        match self {
            Capability::Package { version, .. } | Capability::Module { version, .. } => {
                version.as_ref()
            }
        }
    }
}

/// Something a module needs from another module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Package {
        name: String,
        range: VersionRange,
        optional: bool,
    },
    Module {
        name: String,
        range: VersionRange,
        optional: bool,
    },
}

impl Requirement {
    pub fn package(name: impl Into<String>, range: VersionRange) -> Self {
        Requirement::Package {
            name: name.into(),
            range,
            optional: false,
        }
    }

    pub fn module(name: impl Into<String>, range: VersionRange) -> Self {
        Requirement::Module {
            name: name.into(),
            range,
            optional: false,
        }
    }

    pub fn optional(self) -> Self {
        match self {
            Requirement::Package { name, range, .. } => Requirement::Package {
                name,
                range,
                optional: true,
            },
            Requirement::Module { name, range, .. } => Requirement::Module {
                name,
                range,
                optional: true,
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Requirement::Package { name, .. } | Requirement::Module { name, .. } => name,
        }
    }

    pub fn range(&self) -> &VersionRange {
        match self {
            Requirement::Package { range, .. } | Requirement::Module { range, .. } => range,
        }
    }

    pub fn is_optional(&self) -> bool {
        match self {
            Requirement::Package { optional, .. } | Requirement::Module { optional, .. } => {
                *optional
            }
        }
    }

    fn same_target(&self, other: &Requirement) -> bool {
        matches!(
            (self, other),
            (Requirement::Package { .. }, Requirement::Package { .. })
                | (Requirement::Module { .. }, Requirement::Module { .. })
        ) && self.name() == other.name()
    }

    /// Requirements on the same package or module must have intersecting
    /// ranges. Requirements on different targets never conflict.
    pub fn is_consistent(&self, other: &Requirement) -> bool {
        !self.same_target(other) || self.range().is_consistent(other.range())
    }

    pub fn is_satisfied_by(&self, capability: &Capability) -> bool {
        match (self, capability) {
            (
                Requirement::Package { name, range, .. },
                Capability::Package {
                    name: offered,
                    version,
                    ..
                },
            )
            | (
                Requirement::Module { name, range, .. },
                Capability::Module {
                    name: offered,
                    version,
                },
            ) => name == offered && range.contains_optional(version.as_ref()),
            _ => false,
        }
    }

    /// Whether a parent policy filter lets this requirement through.
    pub fn is_visible_through(&self, filter: &NameFilter) -> bool {
        match self {
            Requirement::Package { name, .. } => filter.matches_package(name),
            Requirement::Module { .. } => !filter.is_nothing(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, optional) = match self {
            Requirement::Package { optional, .. } => ("package", *optional),
            Requirement::Module { optional, .. } => ("module", *optional),
        };
        write!(f, "{kind} {} {}", self.name(), self.range())?;
        if optional {
            f.write_str(" (optional)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn range(s: &str) -> VersionRange {
        VersionRange::from_str(s).unwrap()
    }

    fn versioned_package(name: &str, version: &str) -> Capability {
        Capability::Package {
            name: name.to_string(),
            version: Some(Version::from_str(version).unwrap()),
            split_policy: SplitPolicy::Error,
            optional: false,
        }
    }

    #[test]
    fn consistency_only_compares_same_target() {
        let a = Requirement::package("com.a", range("[1,2)"));
        let b = Requirement::package("com.a", range("[2,3)"));
        let c = Requirement::package("com.b", range("[2,3)"));
        let m = Requirement::module("com.a", range("[2,3)"));

        assert!(!a.is_consistent(&b));
        assert!(a.is_consistent(&c));
        assert!(a.is_consistent(&m));
        assert!(a.is_consistent(&Requirement::package("com.a", VersionRange::ALL)));
    }

    #[test]
    fn satisfaction_checks_kind_name_and_version() {
        let requirement = Requirement::package("com.a", range("[1,2)"));
        assert!(requirement.is_satisfied_by(&versioned_package("com.a", "1.5")));
        assert!(!requirement.is_satisfied_by(&versioned_package("com.a", "2.0")));
        assert!(!requirement.is_satisfied_by(&versioned_package("com.b", "1.5")));
        assert!(!requirement.is_satisfied_by(&Capability::package("com.a")));
        assert!(
            Requirement::package("com.a", VersionRange::ALL)
                .is_satisfied_by(&Capability::package("com.a"))
        );

        let module = Requirement::module("app", VersionRange::ALL);
        assert!(module.is_satisfied_by(&Capability::Module {
            name: "app".to_string(),
            version: None,
        }));
        assert!(!module.is_satisfied_by(&Capability::package("app")));
    }

    #[test]
    fn visibility_through_filters() {
        let package = Requirement::package("com.a", VersionRange::ALL);
        assert!(package.is_visible_through(&NameFilter::packages(["com.a"])));
        assert!(!package.is_visible_through(&NameFilter::Nothing));
        let module = Requirement::module("app", VersionRange::ALL);
        assert!(module.is_visible_through(&NameFilter::packages(["x"])));
        assert!(!module.is_visible_through(&NameFilter::Nothing));
    }

    #[test]
    fn display_mentions_optional() {
        let requirement = Requirement::package("com.a", range("[1,2)")).optional();
        assert_eq!(requirement.to_string(), "package com.a [1,2) (optional)");
    }
}
