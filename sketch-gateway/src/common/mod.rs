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

//! Pieces shared by several sketch families.

use std::fmt;

use crate::error::Error;

pub mod binomial_bounds;
pub mod bounds_on_ratios;
pub(crate) mod random;
pub(crate) mod sorted_view;

/// Number of standard deviations for confidence bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NumStdDev {
    One = 1,
    Two = 2,
    Three = 3,
}

impl NumStdDev {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn as_f64(self) -> f64 {
        self as u8 as f64
    }
}

impl TryFrom<u8> for NumStdDev {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(NumStdDev::One),
            2 => Ok(NumStdDev::Two),
            3 => Ok(NumStdDev::Three),
            _ => Err(Error::invalid_argument("num_std_dev must be 1, 2 or 3")
                .with_context("num_std_dev", value)),
        }
    }
}

impl fmt::Display for NumStdDev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Growth step of a resizable hash table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeFactor {
    X1,
    X2,
    X4,
    X8,
}

impl ResizeFactor {
    pub const fn lg_value(self) -> u8 {
        match self {
            ResizeFactor::X1 => 0,
            ResizeFactor::X2 => 1,
            ResizeFactor::X4 => 2,
            ResizeFactor::X8 => 3,
        }
    }
}

/// Canonical bit pattern for hashing a double: `-0.0` becomes `0.0` and all NaNs collapse.
pub fn canonical_double(value: f64) -> i64 {
    if value == 0.0 {
        0.0f64.to_bits() as i64
    } else if value.is_nan() {
        0x7ff8000000000000i64
    } else {
        value.to_bits() as i64
    }
}

/// Returns `true` when `value` lies in the half-open probability range `(0, 1]`.
pub(crate) fn is_probability(value: f32) -> bool {
    value > 0.0 && value <= 1.0
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn test_num_std_dev_from_u8() {
        assert_that!(NumStdDev::try_from(2).unwrap(), eq(NumStdDev::Two));
        assert!(NumStdDev::try_from(0).is_err());
        assert!(NumStdDev::try_from(4).is_err());
    }

    #[test]
    fn test_canonical_double() {
        assert_that!(canonical_double(-0.0), eq(canonical_double(0.0)));
        assert_that!(canonical_double(f64::NAN), eq(canonical_double(-f64::NAN)));
    }
}
