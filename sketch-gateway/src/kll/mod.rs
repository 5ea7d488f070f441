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

//! KLL sketch implementation for estimating quantiles and ranks.
//!
//! KLL is a compact, streaming quantiles sketch with lazy compaction and
//! near-optimal accuracy per retained item. It supports one-pass updates,
//! approximate quantiles, ranks, PMF, and CDF queries. The gateway exposes
//! the `f32` flavor.
//!
//! # Usage
//!
//! ```rust
//! # use sketch_gateway::kll::KllSketch;
//! let mut sketch = KllSketch::<f32>::new(200);
//! sketch.update(1.0);
//! sketch.update(2.0);
//! let q = sketch.quantile(0.5, true).unwrap();
//! assert!(q >= 1.0 && q <= 2.0);
//! ```

mod helper;
mod serialization;
mod sketch;

pub use self::sketch::KllSketch;

/// Default value of parameter k.
pub const DEFAULT_K: u16 = 200;
/// Default value of parameter m.
pub const DEFAULT_M: u8 = 8;
/// Minimum value of parameter k.
pub const MIN_K: u16 = DEFAULT_M as u16;
/// Maximum value of parameter k.
pub const MAX_K: u16 = u16::MAX;

/// Two-sample Kolmogorov-Smirnov test over two KLL sketches.
///
/// Returns `true` when the hypothesis that both streams come from the same
/// distribution is rejected at significance `p_value`. The rank error of both
/// sketches widens the threshold.
pub fn kolmogorov_smirnov(a: &KllSketch<f32>, b: &KllSketch<f32>, p_value: f64) -> bool {
    ks_delta(a, b) > ks_threshold(a, b, p_value)
}

/// Largest vertical distance between the two empirical CDFs.
pub fn ks_delta(a: &KllSketch<f32>, b: &KllSketch<f32>) -> f64 {
    a.sorted_view().max_cdf_distance(&b.sorted_view())
}

/// Distance above which [`kolmogorov_smirnov`] rejects.
pub fn ks_threshold(a: &KllSketch<f32>, b: &KllSketch<f32>, p_value: f64) -> f64 {
    let r1 = a.num_retained() as f64;
    let r2 = b.num_retained() as f64;
    let alpha_factor = (-0.5 * (0.5 * p_value).ln()).sqrt();
    let delta_area_threshold = alpha_factor * ((r1 + r2) / (r1 * r2)).sqrt();
    delta_area_threshold + a.normalized_rank_error(false) + b.normalized_rank_error(false)
}
