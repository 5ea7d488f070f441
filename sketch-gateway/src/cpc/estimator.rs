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

//! ICON estimator: the cardinality whose expected coupon count matches the
//! observed one.

/// Expected number of coupons after `n` distinct inputs into 2^lg_k rows.
fn expected_coupons(lg_k: u8, n: f64) -> f64 {
    let k = (1u64 << lg_k) as f64;
    let mut total = 0.0;
    for col in 0..64 {
        // P(col) is 2^-(col+1), with the last column taking the remainder.
        let p = if col < 63 {
            f64::exp2(-(col as f64 + 1.0))
        } else {
            f64::exp2(-63.0)
        };
        total += -(-n * p / k).exp_m1();
    }
    k * total
}

/// Cardinality estimate for a merged sketch holding `num_coupons` coupons.
pub(super) fn icon_estimate(lg_k: u8, num_coupons: u64) -> f64 {
    if num_coupons == 0 {
        return 0.0;
    }
    let target = num_coupons as f64;
    let mut lo = target;
    let mut hi = 2.0 * target;
    while expected_coupons(lg_k, hi) < target {
        lo = hi;
        hi *= 2.0;
        if !hi.is_finite() {
            return lo;
        }
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if expected_coupons(lg_k, mid) < target {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= hi * 1e-12 {
            break;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn test_small_counts_are_nearly_exact() {
        assert_that!(icon_estimate(11, 0), eq(0.0));
        assert_that!(icon_estimate(11, 1), near(1.0, 0.01));
        assert_that!(icon_estimate(11, 10), near(10.0, 0.1));
    }

    #[test]
    fn test_inverts_expected_coupons() {
        for n in [1_000.0, 50_000.0, 1_000_000.0] {
            let coupons = expected_coupons(11, n).round() as u64;
            assert_that!(icon_estimate(11, coupons), near(n, n * 0.01));
        }
    }

    #[test]
    fn test_is_monotonic() {
        let mut previous = 0.0;
        for c in (100..20_000).step_by(997) {
            let est = icon_estimate(10, c);
            assert_that!(est, gt(previous));
            previous = est;
        }
    }
}
