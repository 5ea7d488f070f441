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

//! Tuple sketches: theta sketches whose retained hashes carry an `i64`
//! summary aggregated by a [`Policy`].
//!
//! Set operations are the generic ones from [`crate::theta`] instantiated with
//! `i64` summaries.

use std::io;

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::family::Family;
use crate::policy::Policy;
use crate::theta::CompactSketch;
use crate::theta::CompactThetaSketch;
use crate::theta::MAX_THETA;
use crate::theta::Summary;

mod sketch;

pub use sketch::TupleSketch;
pub use sketch::TupleSketchBuilder;

/// A compact tuple sketch.
pub type CompactTupleSketch = CompactSketch<i64>;

/// Sketch type byte of tuple images with a single 64-bit summary.
const SKETCH_TYPE_I64: u8 = 1;

impl Summary for i64 {
    const FAMILY: Family = Family::TUPLE;
    const SKETCH_TYPE: u8 = SKETCH_TYPE_I64;
    const LABEL: &'static str = "Tuple";
    const SIZE_BYTES: usize = 8;

    fn write(&self, bytes: &mut SketchBytes) {
        bytes.write_i64_le(*self);
    }

    fn read(slice: &mut SketchSlice<'_>) -> io::Result<Self> {
        slice.read_i64_le()
    }

    fn merge(self, other: Self, policy: Policy) -> Self {
        policy.fold(self, other)
    }
}

impl CompactSketch<i64> {
    /// Convert a theta sketch, giving every retained hash the summary `value`.
    pub fn from_theta(sketch: &CompactThetaSketch, value: i64) -> Self {
        let entries = sketch.iter().map(|(hash, ())| (*hash, value)).collect();
        CompactSketch::from_parts(
            entries,
            sketch.theta64(),
            sketch.seed_hash(),
            sketch.is_empty(),
            sketch.is_ordered(),
        )
    }

    /// Entries whose summary lies in `low..=high`, at the same theta.
    pub fn filter(&self, low: i64, high: i64) -> Self {
        let entries: Vec<(u64, i64)> = self
            .iter()
            .filter(|(_, summary)| (low..=high).contains(summary))
            .copied()
            .collect();
        let is_empty = self.is_empty() || entries.is_empty() && self.theta64() == MAX_THETA;
        CompactSketch::from_parts(
            entries,
            self.theta64(),
            self.seed_hash(),
            is_empty,
            self.is_ordered(),
        )
    }

    /// Estimated total of the summaries over the whole input.
    pub fn sum_estimate(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let total: f64 = self.iter().map(|(_, summary)| *summary as f64).sum();
        total / self.theta()
    }
}
