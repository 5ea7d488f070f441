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

//! Dense register array of a sketch in HLL mode.

use crate::common::NumStdDev;
use crate::hll::HIP_RSE_FACTOR;
use crate::hll::NON_HIP_RSE_FACTOR;
use crate::hll::estimator::HipEstimator;
use crate::hll::get_slot;
use crate::hll::get_value;

/// One 8-bit register per slot, plus the estimator that tracks them.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Registers {
    lg_k: u8,
    values: Box<[u8]>,
    num_zeros: u32,
    estimator: HipEstimator,
}

impl Registers {
    pub fn new(lg_k: u8) -> Self {
        let k = 1u32 << lg_k;
        Self {
            lg_k,
            values: vec![0u8; k as usize].into_boxed_slice(),
            num_zeros: k,
            estimator: HipEstimator::new(lg_k),
        }
    }

    /// Registers loaded from an image.
    pub fn from_values(lg_k: u8, values: Box<[u8]>, estimator: HipEstimator) -> Self {
        let num_zeros = values.iter().filter(|v| **v == 0).count() as u32;
        Self {
            lg_k,
            values,
            num_zeros,
            estimator,
        }
    }

    /// Promote sparse coupons. The HIP accumulator continues from the
    /// coupon estimate so that sequential sketches keep their accuracy.
    pub fn from_coupons(
        lg_k: u8,
        coupons: impl IntoIterator<Item = u32>,
        coupon_estimate: f64,
    ) -> Self {
        let mut registers = Self::new(lg_k);
        for coupon in coupons {
            registers.update(coupon);
        }
        registers.estimator.set_hip_accum(coupon_estimate);
        registers
    }

    pub fn lg_k(&self) -> u8 {
        self.lg_k
    }

    #[inline]
    pub fn get(&self, slot: u32) -> u8 {
        self.values[slot as usize]
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn estimator(&self) -> &HipEstimator {
        &self.estimator
    }

    pub fn num_zeros(&self) -> u32 {
        self.num_zeros
    }

    /// Smallest register value and how many registers hold it.
    pub fn cur_min(&self) -> (u8, u32) {
        let cur_min = self.values.iter().copied().min().unwrap_or(0);
        let count = self.values.iter().filter(|v| **v == cur_min).count() as u32;
        (cur_min, count)
    }

    /// Update with a coupon
    pub fn update(&mut self, coupon: u32) {
        let mask = (1u32 << self.lg_k) - 1;
        let slot = get_slot(coupon) & mask;
        let new_value = get_value(coupon);
        let old_value = self.get(slot);
        if new_value > old_value {
            self.estimator.update(self.lg_k, old_value, new_value);
            self.values[slot as usize] = new_value;
            if old_value == 0 {
                self.num_zeros -= 1;
            }
        }
    }

    /// Copy of these registers folded down to 2^lg_k slots.
    pub fn downsample(&self, lg_k: u8) -> Self {
        debug_assert!(lg_k <= self.lg_k);
        if lg_k == self.lg_k {
            return self.clone();
        }
        let mut target = Self::new(lg_k);
        target.merge_from(self);
        target
    }

    /// Fold `other` into these registers with a per-slot maximum.
    ///
    /// `other` may have more slots; its slot `i` lands on `i mod 2^lg_k`. The
    /// result is out of order and its KxQ registers are recomputed from the
    /// values, so merge order does not leak into the estimate.
    pub fn merge_from(&mut self, other: &Registers) {
        debug_assert!(other.lg_k >= self.lg_k);
        let mask = (1usize << self.lg_k) - 1;
        for (slot, value) in other.values.iter().enumerate() {
            let target = &mut self.values[slot & mask];
            *target = (*target).max(*value);
        }
        self.num_zeros = self.values.iter().filter(|v| **v == 0).count() as u32;
        self.estimator = HipEstimator::out_of_order_from(&self.values);
    }

    /// Fold a single coupon in, marking the registers out of order.
    pub fn merge_coupon(&mut self, coupon: u32) {
        if !self.estimator.is_out_of_order() {
            self.estimator = HipEstimator::out_of_order_from(&self.values);
        }
        self.update(coupon);
    }

    /// Recompute the estimator from the register values alone.
    pub fn settle_out_of_order(&mut self) {
        self.estimator = HipEstimator::out_of_order_from(&self.values);
    }

    pub fn estimate(&self) -> f64 {
        self.estimator.estimate(self.lg_k, self.num_zeros)
    }

    fn relative_error(&self, num_std_dev: NumStdDev) -> f64 {
        let factor = if self.estimator.is_out_of_order() {
            NON_HIP_RSE_FACTOR
        } else {
            HIP_RSE_FACTOR
        };
        num_std_dev.as_f64() * factor / ((1u64 << self.lg_k) as f64).sqrt()
    }

    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        let num_non_zeros = ((1u64 << self.lg_k) - u64::from(self.num_zeros)) as f64;
        let bound = self.estimate() / (1.0 + self.relative_error(num_std_dev));
        bound.max(num_non_zeros)
    }

    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        let rel = self.relative_error(num_std_dev).min(0.99);
        self.estimate() / (1.0 - rel)
    }
}
