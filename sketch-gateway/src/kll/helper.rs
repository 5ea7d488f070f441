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

//! Level capacity arithmetic.

const POWERS_OF_THREE: [u64; 31] = [
    1,
    3,
    9,
    27,
    81,
    243,
    729,
    2187,
    6561,
    19683,
    59049,
    177147,
    531441,
    1594323,
    4782969,
    14348907,
    43046721,
    129140163,
    387420489,
    1162261467,
    3486784401,
    10460353203,
    31381059609,
    94143178827,
    282429536481,
    847288609443,
    2541865828329,
    7625597484987,
    22876792454961,
    68630377364883,
    205891132094649,
];

/// Items a sketch with `num_levels` levels may hold before compacting.
pub(super) fn compute_total_capacity(k: u16, m: u8, num_levels: usize) -> u32 {
    (0..num_levels)
        .map(|level| level_capacity(k, num_levels, level, m))
        .sum()
}

/// Capacity of level `height`; the top level holds k items and every level
/// below it holds about two thirds of the one above, never fewer than `min_wid`.
pub(super) fn level_capacity(k: u16, num_levels: usize, height: usize, min_wid: u8) -> u32 {
    debug_assert!(height < num_levels, "height must be < num_levels");
    let depth = num_levels - height - 1;
    let cap = int_cap_aux(k, depth.min(60) as u8);
    (min_wid as u32).max(cap as u32)
}

fn int_cap_aux(k: u16, depth: u8) -> u16 {
    if depth <= 30 {
        return int_cap_aux_aux(k, depth);
    }
    let half = depth / 2;
    let rest = depth - half;
    let tmp = int_cap_aux_aux(k, half);
    int_cap_aux_aux(tmp, rest)
}

fn int_cap_aux_aux(k: u16, depth: u8) -> u16 {
    let twok = (k as u64) << 1;
    let tmp = (twok << depth) / POWERS_OF_THREE[depth as usize];
    ((tmp + 1) >> 1) as u16
}

/// Total weight represented by levels of the given sizes, or `None` if it
/// does not fit in a u64.
pub(super) fn sum_the_sample_weights(
    level_sizes: impl IntoIterator<Item = usize>,
) -> Option<u64> {
    let mut total = 0u64;
    for (height, size) in level_sizes.into_iter().enumerate() {
        if size == 0 {
            continue;
        }
        let weight = 1u64.checked_shl(u32::try_from(height).ok()?)?;
        total = total.checked_add(weight.checked_mul(size as u64)?)?;
    }
    Some(total)
}

/// Upper bound on the number of levels a sketch of `n` items can reach.
pub(super) fn ub_on_num_levels(n: u64) -> usize {
    if n == 0 {
        1
    } else {
        1 + n.ilog2() as usize
    }
}
