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

//! HIP estimator with a composite fallback for out-of-order sketches.

/// Estimator state of a sketch in HLL mode.
///
/// Two estimation strategies:
/// - **HIP** (historical inverse probability): accurate for sketches built
///   by sequential updates.
/// - **Composite** (raw HLL blended with linear counting): used once the
///   sketch is out of order, after a union or a deserialization that says so.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HipEstimator {
    hip_accum: f64,
    /// KxQ register for values < 32 (larger inverse powers)
    kxq0: f64,
    /// KxQ register for values >= 32 (tiny inverse powers)
    kxq1: f64,
    out_of_order: bool,
}

impl HipEstimator {
    /// A fresh estimator for 2^lg_k registers, all zero.
    pub fn new(lg_k: u8) -> Self {
        Self {
            hip_accum: 0.0,
            kxq0: (1u64 << lg_k) as f64,
            kxq1: 0.0,
            out_of_order: false,
        }
    }

    /// Rebuild the estimator state from loaded values.
    pub fn from_parts(hip_accum: f64, kxq0: f64, kxq1: f64, out_of_order: bool) -> Self {
        Self {
            hip_accum,
            kxq0,
            kxq1,
            out_of_order,
        }
    }

    /// Estimator whose KxQ registers are summed from `registers` in slot order.
    pub fn out_of_order_from(registers: &[u8]) -> Self {
        let mut kxq0 = 0.0;
        let mut kxq1 = 0.0;
        for &value in registers {
            if value < 32 {
                kxq0 += inv_pow2(value);
            } else {
                kxq1 += inv_pow2(value);
            }
        }
        Self::from_parts(0.0, kxq0, kxq1, true)
    }

    /// Account for a register moving from `old_value` to `new_value`.
    ///
    /// Must run before the register itself is written.
    pub fn update(&mut self, lg_k: u8, old_value: u8, new_value: u8) {
        let k = (1u64 << lg_k) as f64;
        if !self.out_of_order {
            self.hip_accum += k / (self.kxq0 + self.kxq1);
        }
        self.update_kxq(old_value, new_value);
    }

    fn update_kxq(&mut self, old_value: u8, new_value: u8) {
        if old_value < 32 {
            self.kxq0 -= inv_pow2(old_value);
        } else {
            self.kxq1 -= inv_pow2(old_value);
        }
        if new_value < 32 {
            self.kxq0 += inv_pow2(new_value);
        } else {
            self.kxq1 += inv_pow2(new_value);
        }
    }

    /// Current cardinality estimate.
    ///
    /// `num_zeros` is the number of registers still at zero.
    pub fn estimate(&self, lg_k: u8, num_zeros: u32) -> f64 {
        if self.out_of_order {
            self.composite_estimate(lg_k, num_zeros)
        } else {
            self.hip_accum
        }
    }

    /// Raw HLL estimate: correctionFactor * k^2 / (kxq0 + kxq1)
    fn raw_estimate(&self, lg_k: u8) -> f64 {
        let k = (1u64 << lg_k) as f64;
        let correction_factor = match lg_k {
            4 => 0.673,
            5 => 0.697,
            6 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / k),
        };
        (correction_factor * k * k) / (self.kxq0 + self.kxq1)
    }

    /// Linear counting over the unhit registers.
    fn bitmap_estimate(lg_k: u8, num_zeros: u32) -> f64 {
        let k = 1u64 << lg_k;
        if num_zeros == 0 {
            return (k as f64) * (k as f64 / 0.5).ln();
        }
        (k as f64) * (harmonic_number(k) - harmonic_number(u64::from(num_zeros)))
    }

    fn composite_estimate(&self, lg_k: u8, num_zeros: u32) -> f64 {
        let raw_est = self.raw_estimate(lg_k);
        let k = (1u64 << lg_k) as f64;
        if raw_est > 3.0 * k {
            return raw_est;
        }

        let lin_est = Self::bitmap_estimate(lg_k, num_zeros);
        let avg_est = (raw_est + lin_est) / 2.0;
        let crossover = match lg_k {
            4 => 0.718,
            5 => 0.672,
            _ => 0.64,
        };
        if avg_est > crossover * k {
            raw_est
        } else {
            lin_est
        }
    }

    pub fn hip_accum(&self) -> f64 {
        self.hip_accum
    }

    pub fn kxq0(&self) -> f64 {
        self.kxq0
    }

    pub fn kxq1(&self) -> f64 {
        self.kxq1
    }

    pub fn is_out_of_order(&self) -> bool {
        self.out_of_order
    }

    pub fn set_hip_accum(&mut self, value: f64) {
        self.hip_accum = value;
    }
}

/// Compute 1 / 2^value (inverse power of 2)
#[inline]
fn inv_pow2(value: u8) -> f64 {
    if value == 0 {
        1.0
    } else if value <= 63 {
        1.0 / (1u64 << value) as f64
    } else {
        f64::exp2(-(value as f64))
    }
}

/// The n-th harmonic number, exact for small n.
fn harmonic_number(n: u64) -> f64 {
    const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;
    if n < 32 {
        return (1..=n).map(|i| 1.0 / i as f64).sum();
    }
    let x = n as f64;
    x.ln() + EULER_MASCHERONI + 1.0 / (2.0 * x) - 1.0 / (12.0 * x * x)
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn test_estimator_initialization() {
        let est = HipEstimator::new(10);
        assert_that!(est.hip_accum(), eq(0.0));
        assert_that!(est.kxq0(), eq(1024.0));
        assert_that!(est.kxq1(), eq(0.0));
        assert!(!est.is_out_of_order());
    }

    #[test]
    fn test_kxq_split() {
        let mut est = HipEstimator::new(8);
        est.update(8, 0, 10);
        let kxq0_after_10 = est.kxq0();
        assert_that!(kxq0_after_10, lt(256.0));
        assert_that!(est.kxq1(), eq(0.0));

        est.update(8, 10, 50);
        assert_that!(est.kxq0(), lt(kxq0_after_10));
        assert_that!(est.kxq1(), gt(0.0));
    }

    #[test]
    fn test_out_of_order_skips_hip() {
        let mut est = HipEstimator::out_of_order_from(&[0; 16]);
        assert_that!(est.kxq0(), eq(16.0));
        est.update(4, 0, 3);
        assert_that!(est.hip_accum(), eq(0.0));
        assert_that!(est.kxq0(), eq(15.125));
    }

    #[test]
    fn test_harmonic_numbers() {
        assert_that!(harmonic_number(1), eq(1.0));
        assert_that!(harmonic_number(4), near(25.0 / 12.0, 1e-12));
        let exact: f64 = (1..=100).map(|i| 1.0 / i as f64).sum();
        assert_that!(harmonic_number(100), near(exact, 1e-9));
    }

    #[test]
    fn test_composite_uses_linear_counting_when_sparse() {
        let mut registers = vec![0u8; 1024];
        for slot in registers.iter_mut().take(100) {
            *slot = 1;
        }
        let est = HipEstimator::out_of_order_from(&registers);
        let estimate = est.estimate(10, 924);
        assert_that!(estimate, near(1024.0 * (1024.0f64 / 924.0).ln(), 0.5));
    }
}
