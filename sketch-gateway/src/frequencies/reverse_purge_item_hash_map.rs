// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Reverse purge hash map keyed by strings.

use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::murmur3_128;

const LOAD_FACTOR: f64 = 0.75;
const DRIFT_LIMIT: usize = 1024;
const MAX_SAMPLE_SIZE: usize = 1024;

/// Linear-probing map from item to count. `states[i]` is the probe distance
/// of slot `i` plus one, or 0 when the slot is free.
#[derive(Debug, Clone)]
pub(super) struct ReversePurgeItemHashMap {
    lg_length: u8,
    load_threshold: usize,
    keys: Vec<Option<String>>,
    values: Vec<i64>,
    states: Vec<u16>,
    num_active: usize,
}

impl ReversePurgeItemHashMap {
    pub fn new(map_size: usize) -> Self {
        debug_assert!(map_size.is_power_of_two(), "map_size must be power of 2");
        let lg_length = map_size.trailing_zeros() as u8;
        let load_threshold = (map_size as f64 * LOAD_FACTOR) as usize;
        Self {
            lg_length,
            load_threshold,
            keys: vec![None; map_size],
            values: vec![0; map_size],
            states: vec![0; map_size],
            num_active: 0,
        }
    }

    pub fn get(&self, key: &str) -> i64 {
        let probe = self.hash_probe(key);
        if self.states[probe] > 0 {
            return self.values[probe];
        }
        0
    }

    pub fn adjust_or_put_value(&mut self, key: &str, adjust_amount: i64) {
        let mask = self.keys.len() - 1;
        let mut probe = (hash_item(key) as usize) & mask;
        let mut drift: usize = 1;
        while self.states[probe] != 0 && self.keys[probe].as_deref() != Some(key) {
            probe = (probe + 1) & mask;
            drift += 1;
            debug_assert!(drift < DRIFT_LIMIT, "drift limit exceeded");
        }
        if self.states[probe] == 0 {
            self.keys[probe] = Some(key.to_owned());
            self.values[probe] = adjust_amount;
            self.states[probe] = drift as u16;
            self.num_active += 1;
        } else {
            self.values[probe] += adjust_amount;
        }
    }

    /// Subtracts the median of a sample of counts from every count and drops
    /// the entries that fall to zero or below. Returns the median.
    pub fn purge(&mut self, sample_size: usize) -> i64 {
        let limit = sample_size.min(self.num_active).min(MAX_SAMPLE_SIZE);
        let mut samples: Vec<i64> = (0..self.values.len())
            .filter(|&i| self.states[i] > 0)
            .take(limit)
            .map(|i| self.values[i])
            .collect();
        if samples.is_empty() {
            return 0;
        }
        let mid = samples.len() / 2;
        let (_, median, _) = samples.select_nth_unstable(mid);
        let median = *median;
        for value in &mut self.values {
            *value -= median;
        }
        self.keep_only_positive_counts();
        median
    }

    pub fn resize(&mut self, new_size: usize) {
        debug_assert!(new_size.is_power_of_two(), "new_size must be power of 2");
        let old_keys = std::mem::take(&mut self.keys);
        let old_values = std::mem::take(&mut self.values);
        let old_states = std::mem::take(&mut self.states);
        *self = Self::new(new_size);
        for ((key, value), state) in old_keys.into_iter().zip(old_values).zip(old_states) {
            if let (true, Some(key)) = (state > 0, key) {
                self.adjust_or_put_value(&key, value);
            }
        }
    }

    pub fn length(&self) -> usize {
        self.keys.len()
    }

    pub fn lg_length(&self) -> u8 {
        self.lg_length
    }

    pub fn capacity(&self) -> usize {
        self.load_threshold
    }

    pub fn num_active(&self) -> usize {
        self.num_active
    }

    /// Active `(key, count)` pairs in slot order.
    pub fn active(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.keys
            .iter()
            .zip(&self.values)
            .zip(&self.states)
            .filter(|(_, state)| **state > 0)
            .filter_map(|((key, value), _)| key.as_deref().map(|key| (key, *value)))
    }

    /// Active pairs visited with a golden-ratio stride, so that replaying them
    /// into another map does not cluster.
    pub fn iter(&self) -> ReversePurgeItemIter<'_> {
        ReversePurgeItemIter::new(self)
    }

    fn keep_only_positive_counts(&mut self) {
        let len = self.keys.len();
        // start after a free slot so that shifted entries are never revisited
        let first_probe = (0..len).rev().find(|&i| self.states[i] == 0).unwrap_or(0);
        for probe in (0..first_probe).rev().chain((first_probe..len).rev()) {
            if self.states[probe] > 0 && self.values[probe] <= 0 {
                self.hash_delete(probe);
                self.num_active -= 1;
            }
        }
    }

    fn hash_probe(&self, key: &str) -> usize {
        let mask = self.keys.len() - 1;
        let mut probe = (hash_item(key) as usize) & mask;
        while self.states[probe] > 0 && self.keys[probe].as_deref() != Some(key) {
            probe = (probe + 1) & mask;
        }
        probe
    }

    fn hash_delete(&mut self, mut delete_probe: usize) {
        self.states[delete_probe] = 0;
        self.keys[delete_probe] = None;
        let mut drift: usize = 1;
        let mask = self.keys.len() - 1;
        let mut probe = (delete_probe + drift) & mask;
        while self.states[probe] != 0 {
            if self.states[probe] as usize > drift {
                self.keys[delete_probe] = self.keys[probe].take();
                self.values[delete_probe] = self.values[probe];
                self.states[delete_probe] = self.states[probe] - drift as u16;
                self.states[probe] = 0;
                drift = 0;
                delete_probe = probe;
            }
            probe = (probe + 1) & mask;
            drift += 1;
            debug_assert!(drift < DRIFT_LIMIT, "drift limit exceeded");
        }
    }
}

pub(super) struct ReversePurgeItemIter<'a> {
    map: &'a ReversePurgeItemHashMap,
    index: usize,
    count: usize,
    stride: usize,
    mask: usize,
}

impl<'a> ReversePurgeItemIter<'a> {
    fn new(map: &'a ReversePurgeItemHashMap) -> Self {
        let size = map.keys.len();
        let stride = ((size as f64 * 0.6180339887498949) as usize) | 1;
        let mask = size - 1;
        let index = 0usize.wrapping_sub(stride);
        Self {
            map,
            index,
            count: 0,
            stride,
            mask,
        }
    }
}

impl<'a> Iterator for ReversePurgeItemIter<'a> {
    type Item = (&'a str, i64);

    fn next(&mut self) -> Option<Self::Item> {
        while self.count < self.map.num_active {
            self.index = self.index.wrapping_add(self.stride) & self.mask;
            if self.map.states[self.index] > 0 {
                self.count += 1;
                if let Some(key) = self.map.keys[self.index].as_deref() {
                    return Some((key, self.map.values[self.index]));
                }
            }
        }
        None
    }
}

#[inline]
fn hash_item(item: &str) -> u64 {
    murmur3_128(item.as_bytes(), DEFAULT_UPDATE_SEED).0
}
