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

use crate::error::LoaderError;
use std::fmt;

pub struct ErrorContext<'a> {
    pub error: &'a LoaderError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl<'a> ErrorContext<'a> {
    pub fn new(error: &'a LoaderError) -> Self {
        let (suggestion, details) = match error {
            LoaderError::NotFound { name, blacklisted } => {
                let suggestion = if *blacklisted {
                    Some(
                        "The name was confirmed absent by an earlier lookup. Register a provider \
                         exporting its package to make it resolvable."
                            .to_string(),
                    )
                } else {
                    Some(
                        "Check that a registered provider exports the package or that the \
                         requesting provider imports it."
                            .to_string(),
                    )
                };
                let details = Some(format!("Lookup failed for: {name}"));
                (suggestion, details)
            }
            LoaderError::SplitPackage {
                package,
                owner,
                challenger,
            } => {
                let suggestion = Some(
                    "Declare the export with a 'first' or 'last' split policy, or remove one of \
                     the exporters."
                        .to_string(),
                );
                let details = Some(format!(
                    "Package {package} is owned by {owner}; {challenger} was rolled back."
                ));
                (suggestion, details)
            }
            LoaderError::InconsistentRequirement {
                requirement,
                existing,
                ..
            } => {
                let suggestion = Some(
                    "Align the version ranges so that co-resolving modules accept a common \
                     version."
                        .to_string(),
                );
                let details = Some(format!("{requirement} does not intersect {existing}"));
                (suggestion, details)
            }
            LoaderError::AlreadyRegistered(name) => {
                let suggestion = Some(format!(
                    "Unregister '{name}' from its current domain before registering it again."
                ));
                (suggestion, None)
            }
            LoaderError::NotRegistered(name) => {
                let suggestion = Some(format!(
                    "Register '{name}' with a domain before resolving through it."
                ));
                (suggestion, None)
            }
            LoaderError::LockTimeout {
                provider, attempts, ..
            } => {
                let suggestion = Some(
                    "A provider lock was held past the wait budget. This usually indicates a \
                     deadlock; raise UNITLOADER_LOCK_TIMEOUT only when investigating."
                        .to_string(),
                );
                let details = Some(format!(
                    "Gave up on provider {provider} after {attempts} timed waits."
                ));
                (suggestion, details)
            }
            LoaderError::DomainShutdown(domain) => {
                let suggestion = Some(format!(
                    "Domain '{domain}' no longer accepts requests; create a new domain."
                ));
                (suggestion, None)
            }
            LoaderError::ConfigError(msg) => {
                let suggestion = Some(
                    "Check the configuration file and UNITLOADER_* environment variables."
                        .to_string(),
                );
                let details = Some(msg.clone());
                (suggestion, details)
            }
            _ => (None, None),
        };

        ErrorContext {
            error,
            suggestion,
            details,
        }
    }
}

impl<'a> fmt::Display for ErrorContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\n\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}
