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

//! Bounds on the ratio `|B| / |A|` when B is a subset of A and both were
//! sampled at the same theta.
//!
//! Used for Jaccard similarity, where A is the union and B the intersection.

const NUM_STD_DEVS: f64 = 2.0;

/// Complementary error function, Numerical Recipes `erfcc` (relative error < 1.2e-7).
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * poly.exp();
    if x >= 0.0 { ans } else { 2.0 - ans }
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Abramowitz and Stegun 26.5.22, the normal approximation to the incomplete beta function.
fn abramowitz_stegun_formula_26p5p22(a: f64, b: f64, yp: f64) -> f64 {
    let b2m1 = 2.0 * b - 1.0;
    let a2m1 = 2.0 * a - 1.0;
    let lambda = (yp * yp - 3.0) / 6.0;
    let htmp = 1.0 / a2m1 + 1.0 / b2m1;
    let h = 2.0 / htmp;
    let term1 = (yp * (h + lambda).sqrt()) / h;
    let term2 = 1.0 / b2m1 - 1.0 / a2m1;
    let term3 = (lambda + 5.0 / 6.0) - 2.0 / (3.0 * h);
    let w = term1 - term2 * term3;
    a / (a + b * (2.0 * w).exp())
}

/// Lower confidence bound on the success probability of `n` trials with `k` successes.
fn approximate_lower_bound_on_p(n: u64, k: u64, num_std_devs: f64) -> f64 {
    if n == 0 || k == 0 {
        return 0.0;
    }
    let delta = normal_cdf(-num_std_devs);
    if k == 1 {
        1.0 - (1.0 - delta).powf(1.0 / n as f64)
    } else if k == n {
        delta.powf(1.0 / n as f64)
    } else {
        let x = abramowitz_stegun_formula_26p5p22((n - k) as f64 + 1.0, k as f64, -num_std_devs);
        1.0 - x
    }
}

fn approximate_upper_bound_on_p(n: u64, k: u64, num_std_devs: f64) -> f64 {
    if n == 0 || k == n {
        return 1.0;
    }
    let delta = normal_cdf(-num_std_devs);
    if k == n - 1 {
        (1.0 - delta).powf(1.0 / n as f64)
    } else if k == 0 {
        1.0 - delta.powf(1.0 / n as f64)
    } else {
        let x = abramowitz_stegun_formula_26p5p22((n - k) as f64, k as f64 + 1.0, num_std_devs);
        1.0 - x
    }
}

/// Adjustment of the trial count for sampling at rate `f`.
fn hacky_adjuster(f: f64) -> f64 {
    let tmp = (1.0 - f).sqrt();
    if f <= 0.5 { tmp } else { tmp + 0.01 * (f - 0.5) }
}

pub fn lower_bound_for_b_over_a(a: u64, b: u64, f: f64) -> f64 {
    debug_assert!(a >= b, "a must be >= b");
    if a == 0 {
        return 0.0;
    }
    if f >= 1.0 {
        return b as f64 / a as f64;
    }
    approximate_lower_bound_on_p(a, b, NUM_STD_DEVS * hacky_adjuster(f))
}

pub fn upper_bound_for_b_over_a(a: u64, b: u64, f: f64) -> f64 {
    debug_assert!(a >= b, "a must be >= b");
    if a == 0 {
        return 1.0;
    }
    if f >= 1.0 {
        return b as f64 / a as f64;
    }
    approximate_upper_bound_on_p(a, b, NUM_STD_DEVS * hacky_adjuster(f))
}

pub fn estimate_of_b_over_a(a: u64, b: u64) -> f64 {
    debug_assert!(a >= b, "a must be >= b");
    if a == 0 { 0.5 } else { b as f64 / a as f64 }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn test_erfc_reference_points() {
        assert_that!(erfc(0.0), near(1.0, 1e-6));
        assert_that!(erfc(1.0), near(0.157_299_2, 1e-6));
        assert_that!(erfc(-1.0), near(1.842_700_8, 1e-6));
        assert_that!(normal_cdf(-2.0), near(0.022_750_1, 1e-6));
    }

    #[test]
    fn test_ratio_bounds_bracket_estimate() {
        let (a, b, f) = (1000, 300, 0.25);
        let est = estimate_of_b_over_a(a, b);
        assert_that!(lower_bound_for_b_over_a(a, b, f), le(est));
        assert_that!(upper_bound_for_b_over_a(a, b, f), ge(est));
        assert_that!(lower_bound_for_b_over_a(a, b, f), gt(0.2));
        assert_that!(upper_bound_for_b_over_a(a, b, f), lt(0.4));
    }

    #[test]
    fn test_exact_sampling() {
        assert_that!(lower_bound_for_b_over_a(10, 5, 1.0), eq(0.5));
        assert_that!(upper_bound_for_b_over_a(10, 5, 1.0), eq(0.5));
        assert_that!(lower_bound_for_b_over_a(0, 0, 0.5), eq(0.0));
        assert_that!(upper_bound_for_b_over_a(0, 0, 0.5), eq(1.0));
    }
}
