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

//! Image layout constants and register packing for the HLL family.

use crate::error::Error;
use crate::hll::HllType;
use crate::hll::get_slot;
use crate::hll::get_value;
use crate::hll::pack_coupon;
use crate::hll::registers::Registers;

pub(crate) const SERIAL_VERSION: u8 = 1;

pub(crate) const LIST_PREINTS: u8 = 2;
pub(crate) const HASH_SET_PREINTS: u8 = 3;
pub(crate) const HLL_PREINTS: u8 = 10;

pub(crate) const EMPTY_FLAG_MASK: u8 = 4;
pub(crate) const COMPACT_FLAG_MASK: u8 = 8;
pub(crate) const OUT_OF_ORDER_FLAG_MASK: u8 = 16;

pub(crate) const CUR_MODE_LIST: u8 = 0;
pub(crate) const CUR_MODE_SET: u8 = 1;
pub(crate) const CUR_MODE_HLL: u8 = 2;

pub(crate) const LIST_INT_ARR_START: usize = 8;
pub(crate) const HASH_SET_INT_ARR_START: usize = 12;
pub(crate) const HLL_BYTE_ARR_START: usize = 40;

/// Nibble value marking a register stored in the aux list.
const AUX_TOKEN: u8 = 15;

/// log2 of the aux list capacity by lg_k, used to bound image sizes.
const LG_AUX_ARR_INTS: [u8; 22] = [
    0, 2, 2, 2, 2, 2, 2, 3, 3, 3, 4, 4, 5, 5, 6, 7, 8, 9, 10, 11, 12, 13,
];

pub(crate) fn encode_mode_byte(cur_mode: u8, tgt_type: HllType) -> u8 {
    cur_mode | ((tgt_type as u8) << 2)
}

pub(crate) fn extract_cur_mode(mode_byte: u8) -> u8 {
    mode_byte & 3
}

pub(crate) fn extract_tgt_type(mode_byte: u8) -> Result<HllType, Error> {
    HllType::try_from((mode_byte >> 2) & 3)
        .map_err(|_| Error::corrupt(format!("invalid HLL mode byte {mode_byte:#04x}")))
}

/// Size of the packed register array.
pub(crate) fn array_bytes(lg_k: u8, tgt_type: HllType) -> usize {
    let k = 1usize << lg_k;
    match tgt_type {
        HllType::Hll4 => k / 2,
        HllType::Hll6 => (k * 3 / 4) + 1,
        HllType::Hll8 => k,
    }
}

/// Largest image an HLL mode sketch of this shape serializes to.
pub(crate) fn max_hll_bytes(lg_k: u8, tgt_type: HllType) -> usize {
    let aux = match tgt_type {
        HllType::Hll4 => 4usize << LG_AUX_ARR_INTS[lg_k as usize],
        HllType::Hll6 | HllType::Hll8 => 0,
    };
    HLL_BYTE_ARR_START + array_bytes(lg_k, tgt_type) + aux
}

/// Registers packed in a target layout.
pub(crate) struct PackedRegisters {
    pub array: Vec<u8>,
    pub aux: Vec<u32>,
    pub cur_min: u8,
    pub num_at_cur_min: u32,
}

pub(crate) fn pack(registers: &Registers, tgt_type: HllType) -> PackedRegisters {
    let lg_k = registers.lg_k();
    let mut array = vec![0u8; array_bytes(lg_k, tgt_type)];
    let mut aux = vec![];
    let values = registers.values();
    match tgt_type {
        HllType::Hll4 => {
            let (cur_min, num_at_cur_min) = registers.cur_min();
            for (slot, value) in values.iter().enumerate() {
                let shifted = value - cur_min;
                let nibble = if shifted >= AUX_TOKEN {
                    aux.push(pack_coupon(slot as u32, *value));
                    AUX_TOKEN
                } else {
                    shifted
                };
                let byte = &mut array[slot >> 1];
                if slot & 1 == 0 {
                    *byte |= nibble;
                } else {
                    *byte |= nibble << 4;
                }
            }
            return PackedRegisters {
                array,
                aux,
                cur_min,
                num_at_cur_min,
            };
        }
        HllType::Hll6 => {
            for (slot, value) in values.iter().enumerate() {
                let start_bit = slot * 6;
                let byte_idx = start_bit >> 3;
                let shift = start_bit & 7;
                let two_bytes = u16::from_le_bytes([array[byte_idx], array[byte_idx + 1]])
                    | (u16::from(*value & 0x3F) << shift);
                array[byte_idx..byte_idx + 2].copy_from_slice(&two_bytes.to_le_bytes());
            }
        }
        HllType::Hll8 => array.copy_from_slice(values),
    }
    PackedRegisters {
        array,
        aux,
        cur_min: 0,
        num_at_cur_min: registers.num_zeros(),
    }
}

/// Inverse of [`pack`].
pub(crate) fn unpack(
    array: &[u8],
    aux: &[u32],
    lg_k: u8,
    tgt_type: HllType,
    cur_min: u8,
) -> Result<Box<[u8]>, Error> {
    let k = 1usize << lg_k;
    let mut values = vec![0u8; k];
    match tgt_type {
        HllType::Hll4 => {
            if cur_min > 63 {
                return Err(Error::corrupt(format!("HLL_4 cur_min {cur_min} exceeds 63")));
            }
            for (slot, value) in values.iter_mut().enumerate() {
                let byte = array[slot >> 1];
                let nibble = if slot & 1 == 0 { byte & 15 } else { byte >> 4 };
                *value = if nibble < AUX_TOKEN {
                    nibble + cur_min
                } else {
                    let entry = aux
                        .iter()
                        .find(|c| get_slot(**c) as usize == slot)
                        .ok_or_else(|| {
                            Error::corrupt("HLL_4 register refers to a missing aux entry")
                                .with_context("slot", slot)
                        })?;
                    get_value(*entry)
                };
            }
        }
        HllType::Hll6 => {
            for (slot, value) in values.iter_mut().enumerate() {
                let start_bit = slot * 6;
                let byte_idx = start_bit >> 3;
                let shift = start_bit & 7;
                let two_bytes = u16::from_le_bytes([array[byte_idx], array[byte_idx + 1]]);
                *value = ((two_bytes >> shift) & 0x3F) as u8;
            }
        }
        HllType::Hll8 => values.copy_from_slice(&array[..k]),
    }
    Ok(values.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hll::coupon;

    fn loaded(lg_k: u8, n: u32) -> Registers {
        let mut registers = Registers::new(lg_k);
        for i in 0..n {
            registers.update(coupon(&i.to_le_bytes()));
        }
        registers
    }

    #[test]
    fn test_every_layout_restores_values() {
        let registers = loaded(6, 5000);
        for tgt_type in [HllType::Hll4, HllType::Hll6, HllType::Hll8] {
            let packed = pack(&registers, tgt_type);
            assert_eq!(packed.array.len(), array_bytes(6, tgt_type));
            let values = unpack(&packed.array, &packed.aux, 6, tgt_type, packed.cur_min).unwrap();
            assert_eq!(&values[..], registers.values());
        }
    }

    #[test]
    fn test_hll4_moves_large_values_to_aux() {
        let mut registers = Registers::new(4);
        registers.update(pack_coupon(5, 40));
        let packed = pack(&registers, HllType::Hll4);
        assert_eq!(packed.aux, vec![pack_coupon(5, 40)]);
        assert_eq!(packed.array[2] >> 4, AUX_TOKEN);

        let err = unpack(&packed.array, &[], 4, HllType::Hll4, 0).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CorruptFormat);
    }

    #[test]
    fn test_mode_byte() {
        let byte = encode_mode_byte(CUR_MODE_HLL, HllType::Hll6);
        assert_eq!(extract_cur_mode(byte), CUR_MODE_HLL);
        assert_eq!(extract_tgt_type(byte).unwrap(), HllType::Hll6);
    }
}
