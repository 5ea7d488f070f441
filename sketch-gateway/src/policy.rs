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

//! Aggregation policies for tuple summaries.
//!
//! The same [`Policy::fold`] runs when an update hits a key that is already
//! retained and when a union or intersection meets a key present in both
//! operands.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// How the 64-bit summaries of one key are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Policy {
    /// Add the values.
    #[default]
    Sum,
    /// Keep the smallest value.
    Min,
    /// Keep the largest value.
    Max,
    /// Record presence only; the summary becomes 1.
    One,
    /// Keep the summary as first created.
    Nop,
}

impl Policy {
    /// Map a boundary mode name to a policy.
    ///
    /// Names must match exactly. The empty string is the one alias, for `SUM`.
    pub fn resolve(name: &str) -> Result<Self, Error> {
        match name {
            "" | "SUM" => Ok(Policy::Sum),
            "MIN" => Ok(Policy::Min),
            "MAX" => Ok(Policy::Max),
            "ONE" => Ok(Policy::One),
            "NOP" => Ok(Policy::Nop),
            _ => Err(Error::invalid_argument(format!("unrecognized mode {name:?}"))
                .with_context("accepted", "SUM, MIN, MAX, ONE, NOP")),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Policy::Sum => "SUM",
            Policy::Min => "MIN",
            Policy::Max => "MAX",
            Policy::One => "ONE",
            Policy::Nop => "NOP",
        }
    }

    /// Identity element a new entry starts from before its first fold.
    pub const fn create_initial(self) -> i64 {
        match self {
            Policy::Sum => 0,
            Policy::Min => i64::MAX,
            Policy::Max => i64::MIN,
            Policy::One | Policy::Nop => 0,
        }
    }

    pub fn fold(self, existing: i64, incoming: i64) -> i64 {
        match self {
            Policy::Sum => existing.wrapping_add(incoming),
            Policy::Min => existing.min(incoming),
            Policy::Max => existing.max(incoming),
            Policy::One => 1,
            Policy::Nop => existing,
        }
    }
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Policy::resolve(s)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;
    use crate::error::ErrorKind;

    fn fold_all(policy: Policy, values: &[i64]) -> i64 {
        values
            .iter()
            .fold(policy.create_initial(), |acc, v| policy.fold(acc, *v))
    }

    #[test]
    fn test_resolve_exact_names() {
        assert_that!(Policy::resolve("").unwrap(), eq(Policy::Sum));
        assert_that!(Policy::resolve("SUM").unwrap(), eq(Policy::Sum));
        assert_that!("MAX".parse::<Policy>().unwrap(), eq(Policy::Max));
        for bad in ["sum", "Max", " MIN", "AVG"] {
            let err = Policy::resolve(bad).unwrap_err();
            assert_that!(err.kind(), eq(ErrorKind::InvalidArgument));
        }
    }

    #[test]
    fn test_fold_sequence() {
        assert_that!(fold_all(Policy::Max, &[3, 7, 5]), eq(7));
        assert_that!(fold_all(Policy::Min, &[3, 7, 5]), eq(3));
        assert_that!(fold_all(Policy::Sum, &[3, 7, 5]), eq(15));
        assert_that!(fold_all(Policy::One, &[3, 7, 5]), eq(1));
        assert_that!(fold_all(Policy::Nop, &[3, 7, 5]), eq(0));
    }

    #[test]
    fn test_min_max_initial_is_identity() {
        assert_that!(Policy::Min.fold(Policy::Min.create_initial(), -4), eq(-4));
        assert_that!(Policy::Max.fold(Policy::Max.create_initial(), -4), eq(-4));
    }
}
