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

//! Confidence bounds on a cardinality estimated from `n` samples retained
//! with probability `theta`.
//!
//! The bounds are the continuity-corrected normal approximation of the
//! binomial. The lower bound never drops below the number of samples.

use crate::common::NumStdDev;

fn half_width_terms(n_hat: f64, theta: f64, num_std_dev: NumStdDev) -> (f64, f64) {
    let b = num_std_dev.as_f64() * ((1.0 - theta) / theta).sqrt();
    let d = 0.5 * b * (b * b + 4.0 * n_hat).sqrt();
    (n_hat + 0.5 * b * b, d)
}

pub fn lower_bound(num_samples: u64, theta: f64, num_std_dev: NumStdDev) -> f64 {
    let n = num_samples as f64;
    if theta >= 1.0 || num_samples == 0 {
        return n;
    }
    let n_hat = (n - 0.5) / theta;
    let (center, d) = half_width_terms(n_hat, theta, num_std_dev);
    (center - d).max(n)
}

pub fn upper_bound(num_samples: u64, theta: f64, num_std_dev: NumStdDev, is_empty: bool) -> f64 {
    let n = num_samples as f64;
    if is_empty {
        return 0.0;
    }
    if theta >= 1.0 {
        return n;
    }
    let n_hat = (n + 0.5) / theta;
    let (center, d) = half_width_terms(n_hat, theta, num_std_dev);
    (center + d).max(n / theta)
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn test_exact_mode_is_tight() {
        assert_that!(lower_bound(100, 1.0, NumStdDev::Three), eq(100.0));
        assert_that!(upper_bound(100, 1.0, NumStdDev::Three, false), eq(100.0));
        assert_that!(upper_bound(0, 0.5, NumStdDev::One, true), eq(0.0));
    }

    #[test]
    fn test_bounds_widen_with_std_dev() {
        let (n, theta) = (4096, 0.1);
        let estimate = n as f64 / theta;
        let mut last = (estimate, estimate);
        for nsd in [NumStdDev::One, NumStdDev::Two, NumStdDev::Three] {
            let lb = lower_bound(n, theta, nsd);
            let ub = upper_bound(n, theta, nsd, false);
            assert_that!(lb, le(last.0));
            assert_that!(ub, ge(last.1));
            last = (lb, ub);
        }
        assert_that!(lower_bound(n, theta, NumStdDev::Two), near(estimate, estimate * 0.05));
    }
}
