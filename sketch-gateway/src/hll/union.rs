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

//! HLL union operation.
//!
//! The union keeps an internal gadget sketch at `lg_max_k`. Operands still
//! in coupon mode are replayed coupon by coupon; operands in HLL mode are
//! folded register by register, reducing the gadget to the smaller lg_k when
//! needed. The estimate does not depend on the order of the operands; a
//! result still in list mode keeps coupons in the order they arrived.

use log::debug;

use crate::hll::HllSketch;
use crate::hll::HllType;
use crate::hll::registers::Registers;
use crate::hll::sketch::Mode;

/// Stateful HLL union.
///
/// # Examples
///
/// ```
/// # use sketch_gateway::hll::{HllSketch, HllType, HllUnion};
/// let mut a = HllSketch::new(12, HllType::Hll4);
/// let mut b = HllSketch::new(12, HllType::Hll4);
/// a.update_str("x");
/// b.update_str("y");
/// let mut union = HllUnion::new(12);
/// union.update(&a);
/// union.update(&b);
/// assert!((union.result(HllType::Hll8).estimate() - 2.0).abs() < 0.01);
/// ```
#[derive(Debug, Clone)]
pub struct HllUnion {
    lg_max_k: u8,
    gadget: HllSketch,
}

impl HllUnion {
    /// # Panics
    ///
    /// If lg_max_k is not in range [4, 21]
    pub fn new(lg_max_k: u8) -> Self {
        Self {
            lg_max_k,
            gadget: HllSketch::new(lg_max_k, HllType::Hll8),
        }
    }

    pub fn lg_max_k(&self) -> u8 {
        self.lg_max_k
    }

    pub fn is_empty(&self) -> bool {
        self.gadget.is_empty()
    }

    pub fn update(&mut self, sketch: &HllSketch) {
        match sketch.mode() {
            Mode::List(list) => {
                for coupon in list.iter() {
                    self.update_coupon(coupon);
                }
            }
            Mode::Set(set) => {
                for coupon in set.sorted() {
                    self.update_coupon(coupon);
                }
            }
            Mode::Hll(source) => self.update_registers(source),
        }
    }

    fn update_coupon(&mut self, coupon: u32) {
        if let Mode::Hll(registers) = self.gadget.mode_mut() {
            registers.merge_coupon(coupon);
        } else {
            self.gadget.update_coupon(coupon);
        }
    }

    fn update_registers(&mut self, source: &Registers) {
        let lg_k = self.gadget.lg_k().min(source.lg_k());
        let mut registers = match self.gadget.mode() {
            Mode::Hll(current) => current.downsample(lg_k),
            Mode::List(list) => gadget_from_coupons(lg_k, list.iter()),
            Mode::Set(set) => gadget_from_coupons(lg_k, set.sorted()),
        };
        registers.merge_from(source);
        if lg_k < self.gadget.lg_k() {
            debug!("HLL union reduced from lg_k={} to lg_k={lg_k}", self.gadget.lg_k());
        }
        self.gadget = HllSketch::from_mode(lg_k, HllType::Hll8, Mode::Hll(registers));
    }

    /// Result of the union in the requested layout.
    pub fn result(&self, tgt_type: HllType) -> HllSketch {
        let mode = match self.gadget.mode() {
            Mode::List(list) => Mode::List(list.clone()),
            Mode::Set(set) => Mode::Set(set.clone()),
            Mode::Hll(registers) => {
                let mut registers = registers.clone();
                registers.settle_out_of_order();
                Mode::Hll(registers)
            }
        };
        HllSketch::from_mode(self.gadget.lg_k(), tgt_type, mode)
    }

    pub fn reset(&mut self) {
        self.gadget = HllSketch::new(self.lg_max_k, HllType::Hll8);
    }
}

fn gadget_from_coupons(lg_k: u8, coupons: impl IntoIterator<Item = u32>) -> Registers {
    let mut registers = Registers::new(lg_k);
    registers.settle_out_of_order();
    for coupon in coupons {
        registers.update(coupon);
    }
    registers
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    fn sketch(lg_k: u8, range: std::ops::Range<i64>) -> HllSketch {
        let mut sketch = HllSketch::new(lg_k, HllType::Hll4);
        for i in range {
            sketch.update_i64(i);
        }
        sketch
    }

    fn union_of(lg_max_k: u8, operands: &[&HllSketch]) -> HllSketch {
        let mut union = HllUnion::new(lg_max_k);
        for operand in operands {
            union.update(operand);
        }
        union.result(HllType::Hll8)
    }

    #[test]
    fn test_union_is_order_independent() {
        let a = sketch(12, 0..5);
        let b = sketch(11, 0..20_000);
        let c = sketch(12, 10_000..10_300);
        let abc = union_of(12, &[&a, &b, &c]);
        let cba = union_of(12, &[&c, &b, &a]);
        let bac = union_of(12, &[&b, &a, &c]);
        assert_eq!(abc.serialize(), cba.serialize());
        assert_eq!(abc.serialize(), bac.serialize());
        assert_that!(abc.lg_k(), eq(11));
        assert_that!(abc.estimate(), near(20_000.0, 20_000.0 * 0.05));
    }

    #[test]
    fn test_coupon_operands_stay_sparse() {
        let result = union_of(12, &[&sketch(12, 0..3), &sketch(12, 2..6)]);
        assert_that!(result.estimate(), near(6.0, 0.01));
        assert!(!result.is_out_of_order());
    }

    #[test]
    fn test_list_result_keeps_arrival_order() {
        let a = sketch(12, 0..3);
        let b = sketch(12, 2..5);
        let result = union_of(12, &[&a, &b]);
        let (Mode::List(a), Mode::List(b), Mode::List(result)) =
            (a.mode(), b.mode(), result.mode())
        else {
            panic!("operands are small enough to stay in list mode");
        };
        let mut expected: Vec<u32> = a.iter().collect();
        for coupon in b.iter() {
            if !expected.contains(&coupon) {
                expected.push(coupon);
            }
        }
        assert_that!(expected.len(), eq(5));
        assert_eq!(result.iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_self_union_keeps_estimate() {
        let a = sketch(12, 0..50_000);
        let once = union_of(12, &[&a]);
        let twice = union_of(12, &[&a, &a]);
        assert_that!(twice.estimate(), eq(once.estimate()));
        assert_that!(once.estimate(), near(50_000.0, 50_000.0 * 0.05));
    }
}
