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

use crate::common::ResizeFactor;
use crate::hash::compute_seed_hash;
use crate::hash::murmur3_128;
use crate::theta::MAX_THETA;
use crate::theta::MIN_LG_K;

/// Resize threshold (0.5 = 50% load factor)
const RESIZE_THRESHOLD: f64 = 0.5;

/// Rebuild threshold (15/16 = 93.75% load factor)
pub(crate) const REBUILD_THRESHOLD: f64 = 15.0 / 16.0;

/// Stride hash bits (7 bits for stride calculation)
const STRIDE_HASH_BITS: u8 = 7;

const STRIDE_MASK: u64 = (1 << STRIDE_HASH_BITS) - 1;

/// Open-addressing table of retained hashes, each carrying a summary `S`.
///
/// It grows by `resize_factor` until it reaches 2^(lg_nom_size + 1) slots.
/// From then on, each time the load passes the rebuild threshold, only the
/// 2^lg_nom_size smallest hashes are kept and theta drops to the next one.
/// A hash of 0 marks an empty slot.
#[derive(Debug, Clone)]
pub(crate) struct ThetaHashTable<S> {
    lg_cur_size: u8,
    lg_nom_size: u8,
    lg_max_size: u8,
    resize_factor: ResizeFactor,
    sampling_probability: f32,
    hash_seed: u64,

    // Logical emptiness of the source set. This can be false even when `num_retained` is 0 (e.g.
    // all updates screened by theta).
    is_empty: bool,

    theta: u64,

    entries: Vec<(u64, S)>,

    num_retained: usize,
}

impl<S: Copy + Default> ThetaHashTable<S> {
    pub fn new(
        lg_nom_size: u8,
        resize_factor: ResizeFactor,
        sampling_probability: f32,
        hash_seed: u64,
    ) -> Self {
        let lg_max_size = lg_nom_size + 1;
        let lg_cur_size = starting_sub_multiple(lg_max_size, MIN_LG_K, resize_factor.lg_value());
        Self {
            lg_cur_size,
            lg_nom_size,
            lg_max_size,
            resize_factor,
            sampling_probability,
            hash_seed,
            is_empty: true,
            theta: starting_theta_from_sampling_probability(sampling_probability),
            entries: vec![(0, S::default()); 1 << lg_cur_size],
            num_retained: 0,
        }
    }

    /// Hash raw bytes with the table seed.
    pub fn hash_bytes(&self, data: &[u8]) -> u64 {
        let (h1, _) = murmur3_128(data, self.hash_seed);
        h1 >> 1
    }

    fn find_in_entries(entries: &[(u64, S)], key: u64, lg_size: u8) -> Option<usize> {
        if entries.is_empty() {
            return None;
        }

        let mask = entries.len() - 1;
        let stride = Self::get_stride(key, lg_size);
        let mut index = (key as usize) & mask;
        let loop_index = index;

        loop {
            let probe = entries[index].0;
            if probe == 0 || probe == key {
                return Some(index);
            }
            index = (index + stride) & mask;
            if index == loop_index {
                return None;
            }
        }
    }

    /// Marks the source set non-empty without retaining anything.
    pub fn mark_non_empty(&mut self) {
        self.is_empty = false;
    }

    /// Insert `hash` or update its summary.
    ///
    /// `summarize` receives the current summary when the hash is already
    /// retained and `None` otherwise. Hashes of 0 or at or above theta are
    /// screened. Returns true if a new entry was created.
    pub fn upsert(&mut self, hash: u64, summarize: impl FnOnce(Option<S>) -> S) -> bool {
        self.is_empty = false;

        if hash == 0 || hash >= self.theta {
            return false;
        }

        let Some(index) = Self::find_in_entries(&self.entries, hash, self.lg_cur_size) else {
            unreachable!("resize or rebuild keeps a free slot for every probe");
        };

        if self.entries[index].0 == hash {
            let summary = &mut self.entries[index].1;
            *summary = summarize(Some(*summary));
            return false;
        }

        self.entries[index] = (hash, summarize(None));
        self.num_retained += 1;

        if self.num_retained > self.get_capacity() {
            if self.lg_cur_size <= self.lg_nom_size {
                self.resize();
            } else {
                self.rebuild();
            }
        }
        true
    }

    fn get_capacity(&self) -> usize {
        let fraction = if self.lg_cur_size <= self.lg_nom_size {
            RESIZE_THRESHOLD
        } else {
            REBUILD_THRESHOLD
        };
        (fraction * self.entries.len() as f64) as usize
    }

    fn resize(&mut self) {
        let new_lg_size = std::cmp::min(
            self.lg_cur_size + self.resize_factor.lg_value().max(1),
            self.lg_max_size,
        );
        let mut new_entries = vec![(0u64, S::default()); 1 << new_lg_size];
        for &entry in self.entries.iter().filter(|e| e.0 != 0) {
            if let Some(idx) = Self::find_in_entries(&new_entries, entry.0, new_lg_size) {
                new_entries[idx] = entry;
            }
        }
        self.entries = new_entries;
        self.lg_cur_size = new_lg_size;
    }

    /// Keep only the k smallest hashes; theta becomes the (k+1)-th.
    fn rebuild(&mut self) {
        self.entries.retain(|e| e.0 != 0);
        let k = 1usize << self.lg_nom_size;
        let (lesser, kth, _) = self.entries.select_nth_unstable_by_key(k, |e| e.0);
        self.theta = kth.0;

        let mut new_entries = vec![(0u64, S::default()); 1 << self.lg_cur_size];
        for entry in lesser.iter() {
            if let Some(idx) = Self::find_in_entries(&new_entries, entry.0, self.lg_cur_size) {
                new_entries[idx] = *entry;
            }
        }
        self.num_retained = k;
        self.entries = new_entries;
    }

    /// Trim the table to nominal size k
    pub fn trim(&mut self) {
        if self.num_retained > (1 << self.lg_nom_size) {
            self.rebuild();
        }
    }

    pub fn reset(&mut self) {
        let lg_cur = starting_sub_multiple(
            self.lg_nom_size + 1,
            MIN_LG_K,
            self.resize_factor.lg_value(),
        );
        self.entries = vec![(0, S::default()); 1 << lg_cur];
        self.lg_cur_size = lg_cur;
        self.num_retained = 0;
        self.theta = starting_theta_from_sampling_probability(self.sampling_probability);
        self.is_empty = true;
    }

    pub fn num_retained(&self) -> usize {
        self.num_retained
    }

    pub fn theta(&self) -> u64 {
        self.theta
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, S)> + '_ {
        self.entries.iter().copied().filter(|e| e.0 != 0)
    }

    pub fn lg_nom_size(&self) -> u8 {
        self.lg_nom_size
    }

    pub fn seed(&self) -> u64 {
        self.hash_seed
    }

    pub fn seed_hash(&self) -> u16 {
        compute_seed_hash(self.hash_seed)
    }

    fn get_stride(key: u64, lg_size: u8) -> usize {
        (2 * ((key >> lg_size) & STRIDE_MASK) + 1) as usize
    }
}

/// Most entries a table of nominal size 2^lg_k can hold before a rebuild.
pub(crate) fn max_retained(lg_k: u8) -> usize {
    (REBUILD_THRESHOLD * (1u64 << (lg_k + 1)) as f64) as usize
}

/// Initial lg size so that `lg_target = lg_init + n * lg_resize_factor` with `lg_init >= lg_min`.
fn starting_sub_multiple(lg_target: u8, lg_min: u8, lg_resize_factor: u8) -> u8 {
    if lg_target <= lg_min {
        lg_min
    } else if lg_resize_factor == 0 {
        lg_target
    } else {
        ((lg_target - lg_min) % lg_resize_factor) + lg_min
    }
}

fn starting_theta_from_sampling_probability(sampling_probability: f32) -> u64 {
    if sampling_probability < 1.0 {
        (MAX_THETA as f64 * sampling_probability as f64) as u64
    } else {
        MAX_THETA
    }
}
