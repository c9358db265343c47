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

//! Naming conventions shared by every layer: dotted unit names, slash
//! separated resource paths and the package each belongs to.

/// File extension under which a unit's bytes are stored in an artifact source.
pub const UNIT_EXTENSION: &str = "unit";

/// Maps a dotted unit name to the resource path holding its bytes.
///
/// `com.a.Foo` becomes `com/a/Foo.unit`.
pub fn unit_path(name: &str) -> String {
    format!("{}.{UNIT_EXTENSION}", name.replace('.', "/"))
}

/// Returns the package of a dotted unit name, or the empty string for the
/// default package.
pub fn unit_package(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) => &name[..idx],
        None => "",
    }
}

/// Returns the dotted package of a resource path.
pub fn resource_package(path: &str) -> String {
    let path = path.trim_start_matches('/');
    match path.rfind('/') {
        Some(idx) => path[..idx].replace('/', "."),
        None => String::new(),
    }
}

/// Normalises a resource path so lookups and cache keys agree.
pub fn normalize_resource_path(path: &str) -> &str {
    path.trim_start_matches('/')
}
