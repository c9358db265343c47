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

use crate::models::name::{resource_package, unit_package};
use std::collections::BTreeSet;
use std::fmt;

/// Decides which unit names, resource paths and packages are visible
/// through a parent policy or a delegate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NameFilter {
    #[default]
    Everything,
    Nothing,
    /// Exact package names.
    Packages(BTreeSet<String>),
    /// Packages and all of their sub-packages.
    PackagePrefixes(Vec<String>),
    Not(Box<NameFilter>),
    AnyOf(Vec<NameFilter>),
}

impl NameFilter {
    pub fn packages<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NameFilter::Packages(packages.into_iter().map(Into::into).collect())
    }

    pub fn package_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NameFilter::PackagePrefixes(prefixes.into_iter().map(Into::into).collect())
    }

    pub fn negate(self) -> Self {
        match self {
            NameFilter::Everything => NameFilter::Nothing,
            NameFilter::Nothing => NameFilter::Everything,
            NameFilter::Not(inner) => *inner,
            other => NameFilter::Not(Box::new(other)),
        }
    }

    pub fn matches_unit(&self, name: &str) -> bool {
        self.matches_package(unit_package(name))
    }

    pub fn matches_resource(&self, path: &str) -> bool {
        self.matches_package(&resource_package(path))
    }

    pub fn matches_package(&self, package: &str) -> bool {
        match self {
            NameFilter::Everything => true,
            NameFilter::Nothing => false,
            NameFilter::Packages(packages) => packages.contains(package),
            NameFilter::PackagePrefixes(prefixes) => prefixes.iter().any(|prefix| {
                package == prefix
                    || (package.starts_with(prefix.as_str())
                        && package[prefix.len()..].starts_with('.'))
            }),
            NameFilter::Not(inner) => !inner.matches_package(package),
            NameFilter::AnyOf(filters) => filters.iter().any(|f| f.matches_package(package)),
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, NameFilter::Nothing)
    }
}

impl fmt::Display for NameFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameFilter::Everything => f.write_str("everything"),
            NameFilter::Nothing => f.write_str("nothing"),
            NameFilter::Packages(packages) => {
                let names: Vec<&str> = packages.iter().map(String::as_str).collect();
                write!(f, "packages[{}]", names.join(","))
            }
            NameFilter::PackagePrefixes(prefixes) => {
                write!(f, "prefixes[{}]", prefixes.join(","))
            }
            NameFilter::Not(inner) => write!(f, "not({inner})"),
            NameFilter::AnyOf(filters) => {
                let parts: Vec<String> = filters.iter().map(ToString::to_string).collect();
                write!(f, "any({})", parts.join(","))
            }
        }
    }
}
