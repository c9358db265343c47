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

//! Resolution and registration notifications.
//!
//! Handlers run provider level first, then domain level, then system level.
//! A handler that panics or returns an error is logged and skipped; it never
//! affects the operation that raised the event.

use crate::error::{LoaderError, Result};
use log::warn;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderEvent {
    UnitFound {
        domain: String,
        name: String,
        provider: String,
    },
    UnitNotFound {
        domain: String,
        name: String,
    },
    ProviderRegistered {
        domain: String,
        provider: String,
    },
    ProviderUnregistered {
        domain: String,
        provider: String,
    },
}

impl LoaderEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LoaderEvent::UnitFound { .. } => "unit-found",
            LoaderEvent::UnitNotFound { .. } => "unit-not-found",
            LoaderEvent::ProviderRegistered { .. } => "provider-registered",
            LoaderEvent::ProviderUnregistered { .. } => "provider-unregistered",
        }
    }
}

impl fmt::Display for LoaderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderEvent::UnitFound {
                domain,
                name,
                provider,
            } => write!(f, "{name} found in {provider} ({domain})"),
            LoaderEvent::UnitNotFound { domain, name } => write!(f, "{name} not found ({domain})"),
            LoaderEvent::ProviderRegistered { domain, provider } => {
                write!(f, "{provider} registered with {domain}")
            }
            LoaderEvent::ProviderUnregistered { domain, provider } => {
                write!(f, "{provider} unregistered from {domain}")
            }
        }
    }
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &LoaderEvent) -> Result<()>;

    fn name(&self) -> &str {
        "handler"
    }
}

impl<F> EventHandler for F
where
    F: Fn(&LoaderEvent) -> Result<()> + Send + Sync,
{
    fn handle(&self, event: &LoaderEvent) -> Result<()> {
        self(event)
    }
}

/// Delivers `event` to each handler list in order. Returns how many
/// handlers completed without failing.
pub fn dispatch(levels: &[&[Arc<dyn EventHandler>]], event: &LoaderEvent) -> usize {
    let mut delivered = 0;
    for handler in levels.iter().flat_map(|level| level.iter()) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event)));
        let details = match outcome {
            Ok(Ok(())) => {
                delivered += 1;
                continue;
            }
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        let failure = LoaderError::HandlerFailure {
            handler: handler.name().to_string(),
            event: event.kind().to_string(),
            details,
        };
        warn!("{failure}");
    }
    delivered
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> Arc<dyn EventHandler> {
        let log = Arc::clone(log);
        Arc::new(move |event: &LoaderEvent| -> Result<()> {
            log.lock().push(format!("{label}:{}", event.kind()));
            Ok(())
        })
    }

    fn event() -> LoaderEvent {
        LoaderEvent::UnitNotFound {
            domain: "default".to_string(),
            name: "com.a.Foo".to_string(),
        }
    }

    #[test]
    fn dispatch_runs_levels_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let provider = vec![recorder(&log, "provider")];
        let domain = vec![recorder(&log, "domain")];
        let system = vec![recorder(&log, "system")];

        let delivered = dispatch(&[&provider, &domain, &system], &event());
        assert_eq!(delivered, 3);
        assert_eq!(
            *log.lock(),
            vec![
                "provider:unit-not-found",
                "domain:unit-not-found",
                "system:unit-not-found"
            ]
        );
    }

    #[test]
    fn failing_handlers_do_not_stop_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let erroring: Arc<dyn EventHandler> = Arc::new(|_: &LoaderEvent| -> Result<()> {
            Err(LoaderError::IllegalState("broken handler".to_string()))
        });
        let panicking: Arc<dyn EventHandler> =
            Arc::new(|_: &LoaderEvent| -> Result<()> { panic!("handler exploded") });
        let handlers = vec![erroring, panicking, recorder(&log, "after")];

        let delivered = dispatch(&[&handlers], &event());
        assert_eq!(delivered, 1);
        assert_eq!(*log.lock(), vec!["after:unit-not-found"]);
    }

    #[test]
    fn event_display() {
        assert_eq!(event().to_string(), "com.a.Foo not found (default)");
    }
}
