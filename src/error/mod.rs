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

mod context;

pub use context::ErrorContext;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("'{name}' could not be resolved{}", blacklist_suffix(.blacklisted))]
    NotFound { name: String, blacklisted: bool },

    #[error("Package '{package}' is already exported by '{owner}'; '{challenger}' cannot join")]
    SplitPackage {
        package: String,
        owner: String,
        challenger: String,
    },

    #[error(
        "Requirement '{requirement}' of '{module}' is inconsistent with '{existing}' of '{other}'"
    )]
    InconsistentRequirement {
        module: String,
        other: String,
        requirement: String,
        existing: String,
    },

    #[error("Provider '{0}' is already registered with a domain")]
    AlreadyRegistered(String),

    #[error("Provider '{0}' is not registered with a domain")]
    NotRegistered(String),

    #[error("Domain '{0}' has been shut down")]
    DomainShutdown(String),

    #[error("Domain '{0}' already exists")]
    DuplicateDomain(String),

    #[error("Domain '{0}' does not exist")]
    UnknownDomain(String),

    #[error("Timed out after {waited_secs:.1}s waiting for the lock of provider '{provider}'")]
    LockTimeout {
        provider: String,
        waited_secs: f64,
        attempts: usize,
    },

    #[error("Failed to release the lock of provider '{provider}': {details}")]
    LockRelease { provider: String, details: String },

    #[error("Work scheduled on provider '{0}' was abandoned before completing")]
    TaskAbandoned(String),

    #[error("Event handler '{handler}' failed while handling {event}: {details}")]
    HandlerFailure {
        handler: String,
        event: String,
        details: String,
    },

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Artifact source error: {0}")]
    ArtifactSource(String),

    #[error("Transformation failed: {0}")]
    Transform(String),

    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    pub fn not_found(name: impl Into<String>) -> Self {
        LoaderError::NotFound {
            name: name.into(),
            blacklisted: false,
        }
    }

    pub fn blacklisted(name: impl Into<String>) -> Self {
        LoaderError::NotFound {
            name: name.into(),
            blacklisted: true,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LoaderError::NotFound { .. })
    }

    /// Conflicts come out of a resolution space and require the caller to roll back.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            LoaderError::SplitPackage { .. } | LoaderError::InconsistentRequirement { .. }
        )
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            LoaderError::AlreadyRegistered(_)
                | LoaderError::NotRegistered(_)
                | LoaderError::DomainShutdown(_)
                | LoaderError::DuplicateDomain(_)
                | LoaderError::UnknownDomain(_)
                | LoaderError::LockTimeout { .. }
                | LoaderError::LockRelease { .. }
                | LoaderError::TaskAbandoned(_)
                | LoaderError::IllegalState(_)
        )
    }
}

fn blacklist_suffix(blacklisted: &bool) -> &'static str {
    if *blacklisted { " (blacklisted)" } else { "" }
}

pub type Result<T> = std::result::Result<T, LoaderError>;
