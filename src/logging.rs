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

use env_logger::{Builder, Env};

fn filter_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "unitloader=warn",
        1 => "unitloader=info",
        2 => "unitloader=debug",
        _ => "unitloader=trace",
    }
}

fn builder(verbose: u8) -> Builder {
    let mut builder = Builder::from_env(Env::default().default_filter_or(filter_for(verbose)));
    builder
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false);
    builder
}

/// Initialize the logger with the specified verbosity level
///
/// # Arguments
/// * `verbose` - Verbosity level (0=warn, 1=info, 2=debug, 3+=trace)
///
/// `RUST_LOG` takes precedence over the verbosity level.
pub fn setup_logger(verbose: u8) {
    builder(verbose).init();
}

/// Like [`setup_logger`] but returns `false` instead of panicking when a
/// logger is already installed.
pub fn try_setup_logger(verbose: u8) -> bool {
    builder(verbose).try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_crate_filter() {
        assert_eq!(filter_for(0), "unitloader=warn");
        assert_eq!(filter_for(2), "unitloader=debug");
        assert_eq!(filter_for(9), "unitloader=trace");
    }

    #[test]
    fn second_install_is_refused() {
        try_setup_logger(1);
        assert!(!try_setup_logger(1));
    }
}
