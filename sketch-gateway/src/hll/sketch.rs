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

//! HLL sketch: mode management, estimation and the binary image.

use std::fmt;

use log::debug;

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::family::Family;
use crate::codec::make_error;
use crate::common::NumStdDev;
use crate::common::canonical_double;
use crate::error::Error;
use crate::hll::COUPON_RSE;
use crate::hll::HllType;
use crate::hll::MAX_LG_K;
use crate::hll::MIN_LG_K;
use crate::hll::coupon;
use crate::hll::coupon_estimate;
use crate::hll::coupons::CouponList;
use crate::hll::coupons::CouponSet;
use crate::hll::coupons::LG_INIT_SET_SIZE;
use crate::hll::estimator::HipEstimator;
use crate::hll::registers::Registers;
use crate::hll::serialization::*;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Mode {
    List(CouponList),
    Set(CouponSet),
    Hll(Registers),
}

/// HyperLogLog sketch for distinct counting.
///
/// # Examples
///
/// ```
/// # use sketch_gateway::hll::{HllSketch, HllType};
/// let mut sketch = HllSketch::new(12, HllType::Hll8);
/// for i in 0..100 {
///     sketch.update_i64(i);
/// }
/// assert!((sketch.estimate() - 100.0).abs() < 2.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HllSketch {
    lg_k: u8,
    tgt_type: HllType,
    mode: Mode,
}

impl HllSketch {
    /// # Panics
    ///
    /// If lg_k is not in range [4, 21]
    pub fn new(lg_k: u8, tgt_type: HllType) -> Self {
        assert!(
            (MIN_LG_K..=MAX_LG_K).contains(&lg_k),
            "lg_k must be in [{MIN_LG_K}, {MAX_LG_K}], got {lg_k}"
        );
        Self {
            lg_k,
            tgt_type,
            mode: Mode::List(CouponList::default()),
        }
    }

    pub(crate) fn from_mode(lg_k: u8, tgt_type: HllType, mode: Mode) -> Self {
        Self {
            lg_k,
            tgt_type,
            mode,
        }
    }

    pub(crate) fn mode(&self) -> &Mode {
        &self.mode
    }

    pub(crate) fn mode_mut(&mut self) -> &mut Mode {
        &mut self.mode
    }

    pub fn lg_k(&self) -> u8 {
        self.lg_k
    }

    pub fn target_type(&self) -> HllType {
        self.tgt_type
    }

    /// The same sketch, serialized with another register layout.
    pub fn with_target_type(mut self, tgt_type: HllType) -> Self {
        self.tgt_type = tgt_type;
        self
    }

    pub fn is_empty(&self) -> bool {
        match &self.mode {
            Mode::List(list) => list.is_empty(),
            Mode::Set(set) => set.len() == 0,
            Mode::Hll(_) => false,
        }
    }

    pub fn is_out_of_order(&self) -> bool {
        match &self.mode {
            Mode::Hll(registers) => registers.estimator().is_out_of_order(),
            Mode::List(_) | Mode::Set(_) => false,
        }
    }

    fn mode_name(&self) -> &'static str {
        match &self.mode {
            Mode::List(_) => "LIST",
            Mode::Set(_) => "SET",
            Mode::Hll(_) => "HLL",
        }
    }

    /// Update the sketch with raw bytes. Empty input is ignored.
    pub fn update_bytes(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.update_coupon(coupon(data));
    }

    pub fn update_str(&mut self, value: &str) {
        self.update_bytes(value.as_bytes());
    }

    pub fn update_i64(&mut self, value: i64) {
        self.update_bytes(&value.to_le_bytes());
    }

    pub fn update_u64(&mut self, value: u64) {
        self.update_bytes(&value.to_le_bytes());
    }

    /// `-0.0` and `0.0` count once, as do all NaNs.
    pub fn update_f64(&mut self, value: f64) {
        self.update_bytes(&canonical_double(value).to_le_bytes());
    }

    pub(crate) fn update_coupon(&mut self, coupon: u32) {
        match &mut self.mode {
            Mode::List(list) => {
                list.update(coupon);
                if list.is_full() {
                    self.promote_list();
                }
            }
            Mode::Set(set) => {
                if set.update(coupon) {
                    if set.lg_arr() + 3 >= self.lg_k {
                        self.promote_set();
                    } else {
                        set.grow();
                    }
                }
            }
            Mode::Hll(registers) => registers.update(coupon),
        }
    }

    fn promote_list(&mut self) {
        let Mode::List(list) = &self.mode else {
            return;
        };
        self.mode = if self.lg_k < 8 {
            debug!("promoting HLL list to registers at lg_k={}", self.lg_k);
            Mode::Hll(Registers::from_coupons(
                self.lg_k,
                list.iter(),
                coupon_estimate(list.len()),
            ))
        } else {
            let mut set = CouponSet::with_lg_arr(LG_INIT_SET_SIZE);
            for coupon in list.iter() {
                set.update(coupon);
            }
            Mode::Set(set)
        };
    }

    fn promote_set(&mut self) {
        let Mode::Set(set) = &self.mode else {
            return;
        };
        debug!(
            "promoting HLL set of {} coupons to registers at lg_k={}",
            set.len(),
            self.lg_k
        );
        self.mode = Mode::Hll(Registers::from_coupons(
            self.lg_k,
            set.sorted(),
            coupon_estimate(set.len()),
        ));
    }

    fn coupon_count(&self) -> usize {
        match &self.mode {
            Mode::List(list) => list.len(),
            Mode::Set(set) => set.len(),
            Mode::Hll(_) => 0,
        }
    }

    /// Return cardinality estimate
    pub fn estimate(&self) -> f64 {
        match &self.mode {
            Mode::Hll(registers) => registers.estimate(),
            Mode::List(_) | Mode::Set(_) => coupon_estimate(self.coupon_count()),
        }
    }

    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        match &self.mode {
            Mode::Hll(registers) => registers.lower_bound(num_std_dev),
            Mode::List(_) | Mode::Set(_) => {
                let count = self.coupon_count() as f64;
                let bound = self.estimate() / (1.0 + num_std_dev.as_f64() * COUPON_RSE);
                bound.max(count)
            }
        }
    }

    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        match &self.mode {
            Mode::Hll(registers) => registers.upper_bound(num_std_dev),
            Mode::List(_) | Mode::Set(_) => {
                let count = self.coupon_count() as f64;
                let bound = self.estimate() / (1.0 - num_std_dev.as_f64() * COUPON_RSE);
                bound.max(count)
            }
        }
    }

    /// Largest image a sketch of this shape can serialize to.
    pub fn max_serialized_size(lg_k: u8, tgt_type: HllType) -> usize {
        let set_bytes = HASH_SET_INT_ARR_START + 4 * (3 << lg_k.saturating_sub(3)) / 4;
        max_hll_bytes(lg_k, tgt_type).max(set_bytes)
    }

    /// Serialize in compact form.
    pub fn serialize(&self) -> Vec<u8> {
        match &self.mode {
            Mode::List(list) => {
                let mut bytes = SketchBytes::with_capacity(LIST_INT_ARR_START + 4 * list.len());
                let mut flags = COMPACT_FLAG_MASK;
                if list.is_empty() {
                    flags |= EMPTY_FLAG_MASK;
                }
                self.write_header(&mut bytes, LIST_PREINTS, CouponList::lg_arr(), flags);
                bytes.write_u8(list.len() as u8);
                bytes.write_u8(encode_mode_byte(CUR_MODE_LIST, self.tgt_type));
                for coupon in list.iter() {
                    bytes.write_u32_le(coupon);
                }
                bytes.into_bytes()
            }
            Mode::Set(set) => {
                let mut bytes =
                    SketchBytes::with_capacity(HASH_SET_INT_ARR_START + 4 * set.len());
                self.write_header(&mut bytes, HASH_SET_PREINTS, set.lg_arr(), COMPACT_FLAG_MASK);
                bytes.write_u8(0);
                bytes.write_u8(encode_mode_byte(CUR_MODE_SET, self.tgt_type));
                bytes.write_u32_le(set.len() as u32);
                for coupon in set.sorted() {
                    bytes.write_u32_le(coupon);
                }
                bytes.into_bytes()
            }
            Mode::Hll(registers) => {
                let packed = pack(registers, self.tgt_type);
                let estimator = registers.estimator();
                let mut bytes = SketchBytes::with_capacity(
                    HLL_BYTE_ARR_START + packed.array.len() + 4 * packed.aux.len(),
                );
                let flags = if estimator.is_out_of_order() {
                    OUT_OF_ORDER_FLAG_MASK
                } else {
                    0
                };
                self.write_header(&mut bytes, HLL_PREINTS, 0, flags);
                bytes.write_u8(packed.cur_min);
                bytes.write_u8(encode_mode_byte(CUR_MODE_HLL, self.tgt_type));
                bytes.write_f64_le(estimator.hip_accum());
                bytes.write_f64_le(estimator.kxq0());
                bytes.write_f64_le(estimator.kxq1());
                bytes.write_u32_le(packed.num_at_cur_min);
                bytes.write_u32_le(packed.aux.len() as u32);
                bytes.write(&packed.array);
                for entry in packed.aux {
                    bytes.write_u32_le(entry);
                }
                bytes.into_bytes()
            }
        }
    }

    fn write_header(&self, bytes: &mut SketchBytes, preamble_ints: u8, lg_arr: u8, flags: u8) {
        bytes.write_u8(preamble_ints);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::HLL.id);
        bytes.write_u8(self.lg_k);
        bytes.write_u8(lg_arr);
        bytes.write_u8(flags);
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = SketchSlice::new(bytes);
        let preamble_ints = cursor.read_u8().map_err(make_error("preamble_ints"))?;
        let serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
        let family_id = cursor.read_u8().map_err(make_error("family_id"))?;
        let lg_k = cursor.read_u8().map_err(make_error("lg_k"))?;
        let lg_arr = cursor.read_u8().map_err(make_error("lg_arr"))?;
        let flags = cursor.read_u8().map_err(make_error("flags"))?;
        let count_or_cur_min = cursor.read_u8().map_err(make_error("cur_min"))?;
        let mode_byte = cursor.read_u8().map_err(make_error("mode"))?;

        Family::HLL.validate_id(family_id)?;
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(SERIAL_VERSION, serial_version));
        }
        Family::HLL.validate_pre_longs(preamble_ints)?;
        if !(MIN_LG_K..=MAX_LG_K).contains(&lg_k) {
            return Err(Error::corrupt(format!(
                "invalid lg_k: {lg_k}, must be in [{MIN_LG_K}, {MAX_LG_K}]"
            )));
        }
        let tgt_type = extract_tgt_type(mode_byte)?;
        let cur_mode = extract_cur_mode(mode_byte);
        let expected_preints = match cur_mode {
            CUR_MODE_LIST => LIST_PREINTS,
            CUR_MODE_SET => HASH_SET_PREINTS,
            CUR_MODE_HLL => HLL_PREINTS,
            _ => return Err(Error::corrupt(format!("invalid HLL mode {cur_mode}"))),
        };
        if preamble_ints != expected_preints {
            return Err(Error::corrupt(format!(
                "invalid preamble ints for mode {cur_mode}: expected {expected_preints}, got {preamble_ints}"
            )));
        }
        let compact = flags & COMPACT_FLAG_MASK != 0;
        let empty = flags & EMPTY_FLAG_MASK != 0;

        let mode = match cur_mode {
            CUR_MODE_LIST => {
                let coupons = if empty {
                    vec![]
                } else {
                    read_coupons(&mut cursor, count_or_cur_min as usize, lg_arr, compact)?
                };
                if coupons.len() > CouponList::capacity() {
                    return Err(Error::corrupt("HLL list holds more coupons than it can"));
                }
                Mode::List(CouponList::from_coupons(coupons))
            }
            CUR_MODE_SET => {
                // A set is promoted to registers long before its table reaches k slots.
                if lg_arr > lg_k {
                    return Err(Error::corrupt(format!(
                        "HLL set lg_arr {lg_arr} exceeds lg_k {lg_k}"
                    )));
                }
                let count = cursor.read_u32_le().map_err(make_error("set_count"))? as usize;
                let coupons = read_coupons(&mut cursor, count, lg_arr, compact)?;
                let mut set = CouponSet::with_lg_arr(lg_arr);
                for coupon in coupons {
                    set.update(coupon);
                }
                Mode::Set(set)
            }
            _ => {
                let hip_accum = cursor.read_f64_le().map_err(make_error("hip_accum"))?;
                let kxq0 = cursor.read_f64_le().map_err(make_error("kxq0"))?;
                let kxq1 = cursor.read_f64_le().map_err(make_error("kxq1"))?;
                let _num_at_cur_min = cursor.read_u32_le().map_err(make_error("num_at_cur_min"))?;
                let aux_count = cursor.read_u32_le().map_err(make_error("aux_count"))? as usize;
                let mut array = vec![0u8; array_bytes(lg_k, tgt_type)];
                cursor
                    .read_exact(&mut array)
                    .map_err(make_error("registers"))?;
                let aux = read_coupons(&mut cursor, aux_count, 0, true)?;
                let values = unpack(&array, &aux, lg_k, tgt_type, count_or_cur_min)?;
                let ooo = flags & OUT_OF_ORDER_FLAG_MASK != 0;
                let estimator = HipEstimator::from_parts(hip_accum, kxq0, kxq1, ooo);
                Mode::Hll(Registers::from_values(lg_k, values, estimator))
            }
        };
        Ok(Self {
            lg_k,
            tgt_type,
            mode,
        })
    }
}

/// Read `count` coupons, or a whole 2^lg_arr table when the image is not compact.
fn read_coupons(
    cursor: &mut SketchSlice<'_>,
    count: usize,
    lg_arr: u8,
    compact: bool,
) -> Result<Vec<u32>, Error> {
    let slots = if compact {
        count
    } else {
        if lg_arr > 26 {
            return Err(Error::corrupt(format!("invalid HLL lg_arr {lg_arr}")));
        }
        1usize << lg_arr
    };
    if cursor.remaining() / 4 < slots {
        return Err(Error::insufficient_data("coupons").with_context("count", slots));
    }
    let mut coupons = Vec::with_capacity(count);
    for _ in 0..slots {
        let coupon = cursor.read_u32_le().map_err(make_error("coupon"))?;
        if coupon != 0 {
            coupons.push(coupon);
        }
    }
    Ok(coupons)
}

impl fmt::Display for HllSketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### HLL sketch summary:")?;
        writeln!(f, "  Log Config K   : {}", self.lg_k)?;
        writeln!(f, "  Hll Target     : {}", self.tgt_type)?;
        writeln!(f, "  Current Mode   : {}", self.mode_name())?;
        writeln!(f, "  LB             : {}", self.lower_bound(NumStdDev::One))?;
        writeln!(f, "  Estimate       : {}", self.estimate())?;
        writeln!(f, "  UB             : {}", self.upper_bound(NumStdDev::One))?;
        writeln!(f, "  OutOfOrder flag: {}", self.is_out_of_order())?;
        if let Mode::Hll(registers) = &self.mode {
            let (cur_min, num_at_cur_min) = registers.cur_min();
            let estimator = registers.estimator();
            writeln!(f, "  CurMin       : {cur_min}")?;
            writeln!(f, "  NumAtCurMin  : {num_at_cur_min}")?;
            writeln!(f, "  HipAccum     : {}", estimator.hip_accum())?;
            writeln!(f, "  KxQ0         : {}", estimator.kxq0())?;
            writeln!(f, "  KxQ1         : {}", estimator.kxq1())?;
        } else {
            writeln!(f, "  Coupon count   : {}", self.coupon_count())?;
        }
        writeln!(f, "### End HLL sketch summary")
    }
}
