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

//! Sparse coupon containers used before a sketch is promoted to registers.

use std::collections::HashSet;

const LG_INIT_LIST_SIZE: u8 = 3;
pub(crate) const LG_INIT_SET_SIZE: u8 = 5;

// Resize at 3/4 = 75% load factor
const RESIZE_NUMER: usize = 3;
const RESIZE_DENOM: usize = 4;

/// Short list of distinct coupons, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct CouponList {
    coupons: Vec<u32>,
}

impl CouponList {
    pub fn capacity() -> usize {
        1 << LG_INIT_LIST_SIZE
    }

    pub fn lg_arr() -> u8 {
        LG_INIT_LIST_SIZE
    }

    pub fn from_coupons(coupons: Vec<u32>) -> Self {
        let mut list = Self::default();
        for coupon in coupons {
            list.update(coupon);
        }
        list
    }

    /// Insert coupon into list, ignoring duplicates
    pub fn update(&mut self, coupon: u32) {
        if !self.coupons.contains(&coupon) {
            self.coupons.push(coupon);
        }
    }

    pub fn is_full(&self) -> bool {
        self.coupons.len() >= Self::capacity()
    }

    pub fn len(&self) -> usize {
        self.coupons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coupons.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.coupons.iter().copied()
    }
}

/// Coupon hash set with a nominal array size of 2^lg_arr.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CouponSet {
    coupons: HashSet<u32>,
    lg_arr: u8,
}

impl Default for CouponSet {
    fn default() -> Self {
        Self {
            coupons: HashSet::new(),
            lg_arr: LG_INIT_SET_SIZE,
        }
    }
}

impl CouponSet {
    pub fn with_lg_arr(lg_arr: u8) -> Self {
        Self {
            coupons: HashSet::with_capacity(1 << lg_arr),
            lg_arr: lg_arr.max(LG_INIT_SET_SIZE),
        }
    }

    /// Insert coupon into set, ignoring duplicates. Returns true when the
    /// load factor now asks for a larger array.
    pub fn update(&mut self, coupon: u32) -> bool {
        self.coupons.insert(coupon);
        self.needs_resize()
    }

    fn needs_resize(&self) -> bool {
        RESIZE_DENOM * self.coupons.len() > RESIZE_NUMER * (1usize << self.lg_arr)
    }

    /// Double the nominal array size.
    pub fn grow(&mut self) {
        self.lg_arr += 1;
    }

    pub fn lg_arr(&self) -> u8 {
        self.lg_arr
    }

    pub fn len(&self) -> usize {
        self.coupons.len()
    }

    /// Coupons in ascending order.
    pub fn sorted(&self) -> Vec<u32> {
        let mut coupons: Vec<u32> = self.coupons.iter().copied().collect();
        coupons.sort_unstable();
        coupons
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn test_list_ignores_duplicates() {
        let mut list = CouponList::default();
        list.update(7);
        list.update(7);
        list.update(9);
        assert_that!(list.len(), eq(2));
        assert!(!list.is_full());
        for coupon in 10..16 {
            list.update(coupon);
        }
        assert!(list.is_full());
    }

    #[test]
    fn test_set_asks_to_grow_past_load_factor() {
        let mut set = CouponSet::default();
        let grow_at = (1 << LG_INIT_SET_SIZE) * RESIZE_NUMER / RESIZE_DENOM;
        for coupon in 1..=grow_at as u32 {
            assert!(!set.update(coupon));
        }
        assert!(set.update(1000));
        set.grow();
        assert_that!(set.lg_arr(), eq(LG_INIT_SET_SIZE + 1));
        assert_eq!(set.sorted()[..3], [1, 2, 3]);
    }
}
