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

use log::debug;

use crate::cpc::CpcSketch;
use crate::cpc::MAX_LG_K;
use crate::cpc::MIN_LG_K;
use crate::cpc::sketch::row_cols_of;
use crate::error::Error;
use crate::hash::compute_seed_hash;

/// Union of CPC sketches.
///
/// The union holds one 64-bit column mask per row at the smallest lg_k seen
/// so far; larger operands are folded onto it by dropping the high row bits.
/// The result is a merged sketch estimated with ICON.
#[derive(Debug, Clone)]
pub struct CpcUnion {
    lg_k: u8,
    seed: u64,
    rows: Option<Vec<u64>>,
}

impl CpcUnion {
    /// # Panics
    ///
    /// If lg_k is not in range [4, 26]
    pub fn new(lg_k: u8, seed: u64) -> Self {
        assert!(
            (MIN_LG_K..=MAX_LG_K).contains(&lg_k),
            "lg_k out of range; got {lg_k}",
        );
        Self {
            lg_k,
            seed,
            rows: None,
        }
    }

    pub fn lg_k(&self) -> u8 {
        self.lg_k
    }

    /// Fold one operand into the union.
    ///
    /// # Errors
    ///
    /// `IncompatibleOperands` if the operand was built with another seed. The
    /// union is unchanged in that case.
    pub fn update(&mut self, sketch: &CpcSketch) -> Result<(), Error> {
        if sketch.seed_hash() != compute_seed_hash(self.seed) {
            return Err(Error::incompatible("operands were built with different seeds")
                .with_context("union_seed_hash", compute_seed_hash(self.seed))
                .with_context("operand_seed_hash", sketch.seed_hash()));
        }
        if sketch.is_empty() {
            return Ok(());
        }

        if sketch.lg_k() < self.lg_k {
            debug!(
                "CPC union reduced from lg_k={} to lg_k={}",
                self.lg_k,
                sketch.lg_k()
            );
            self.rows = self.rows.take().map(|rows| fold_rows(&rows, sketch.lg_k()));
            self.lg_k = sketch.lg_k();
        }
        let mask = (1u32 << self.lg_k) - 1;
        let rows = self
            .rows
            .get_or_insert_with(|| vec![0u64; 1 << self.lg_k]);
        for row_col in sketch.row_cols() {
            let row = (row_col >> 6) & mask;
            rows[row as usize] |= 1u64 << (row_col & 63);
        }
        Ok(())
    }

    pub fn result(&self) -> CpcSketch {
        match &self.rows {
            None => CpcSketch::with_seed(self.lg_k, self.seed),
            Some(rows) => CpcSketch::from_row_cols(self.lg_k, self.seed, row_cols_of(rows)),
        }
    }
}

/// Fold rows onto 2^lg_k rows.
fn fold_rows(rows: &[u64], lg_k: u8) -> Vec<u64> {
    let mask = (1usize << lg_k) - 1;
    let mut folded = vec![0u64; 1 << lg_k];
    for (row, bits) in rows.iter().enumerate() {
        folded[row & mask] |= bits;
    }
    folded
}
