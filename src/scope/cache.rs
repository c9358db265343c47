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

use std::collections::{HashMap, HashSet};

/// Outcome of a lookup that may have been answered by a negative cache.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    Found(V),
    /// Previously looked at and confirmed absent.
    Blacklisted,
    Missing,
}

impl<V> Lookup<V> {
    pub fn found(self) -> Option<V> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Blacklisted | Lookup::Missing => None,
        }
    }

    pub fn is_blacklisted(&self) -> bool {
        matches!(self, Lookup::Blacklisted)
    }
}

/// Positive and negative answers keyed by name, stamped with a generation.
///
/// Every flush bumps the generation. Writers read the generation before
/// doing the (unlocked) work that produced an answer and hand it back on
/// insert; an insert whose generation is no longer current is dropped, so an
/// answer computed before a flush never lands after it.
#[derive(Debug)]
pub struct LookupCache<V> {
    enabled: bool,
    generation: u64,
    positive: HashMap<String, V>,
    negative: HashSet<String>,
}

impl<V: Clone> LookupCache<V> {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            generation: 0,
            positive: HashMap::new(),
            negative: HashSet::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, name: &str) -> Option<V> {
        self.positive.get(name).cloned()
    }

    pub fn is_negative(&self, name: &str) -> bool {
        self.negative.contains(name)
    }

    pub fn insert(&mut self, generation: u64, name: &str, value: V) -> bool {
        if !self.accepts(generation) {
            return false;
        }
        self.negative.remove(name);
        self.positive.insert(name.to_string(), value);
        true
    }

    pub fn insert_negative(&mut self, generation: u64, name: &str) -> bool {
        if !self.accepts(generation) || self.positive.contains_key(name) {
            return false;
        }
        self.negative.insert(name.to_string());
        true
    }

    fn accepts(&self, generation: u64) -> bool {
        self.enabled && generation == self.generation
    }

    pub fn flush(&mut self) {
        self.positive.clear();
        self.negative.clear();
        self.generation += 1;
    }

    /// Destroys the cache contents and refuses inserts until re-enabled.
    pub fn disable(&mut self) {
        self.flush();
        self.enabled = false;
    }

    /// Starts over with an empty cache.
    pub fn enable(&mut self) {
        self.flush();
        self.enabled = true;
    }

    pub fn len(&self) -> usize {
        self.positive.len()
    }

    pub fn negative_len(&self) -> usize {
        self.negative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }
}
