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

use std::collections::HashSet;

use crate::error::Error;
use crate::theta::CompactSketch;
use crate::theta::MAX_THETA;
use crate::theta::Summary;

/// Entries of `a` whose keys are not in `b`, at the smaller of the two thetas.
///
/// Summaries are taken from `a` unchanged.
///
/// # Errors
///
/// `IncompatibleOperands` if both operands are non-empty and were built with
/// different seeds.
pub fn a_not_b<S: Summary>(
    a: &CompactSketch<S>,
    b: &CompactSketch<S>,
) -> Result<CompactSketch<S>, Error> {
    if a.is_empty() || a.num_retained() == 0 || b.is_empty() {
        return Ok(a.clone());
    }
    if a.seed_hash() != b.seed_hash() {
        return Err(Error::incompatible("operands were built with different seeds")
            .with_context("a_seed_hash", a.seed_hash())
            .with_context("b_seed_hash", b.seed_hash()));
    }

    let theta = a.theta64().min(b.theta64());
    let excluded: HashSet<u64> = b.iter().map(|e| e.0).filter(|h| *h < theta).collect();
    let entries: Vec<(u64, S)> = a
        .iter()
        .filter(|e| e.0 < theta && !excluded.contains(&e.0))
        .copied()
        .collect();
    let is_empty = entries.is_empty() && theta == MAX_THETA;
    Ok(CompactSketch::from_parts(
        entries,
        theta,
        a.seed_hash(),
        is_empty,
        true,
    ))
}
