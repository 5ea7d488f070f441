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

//! Theta sketches and their set operations.
//!
//! The engine is shared with the tuple family: every retained hash carries a
//! [`Summary`], which is `()` for plain theta sketches and an `i64` for
//! tuple sketches. Union, intersection and A-not-B are written once against
//! that trait and fold summaries with a [`Policy`](crate::policy::Policy).

use std::fmt;
use std::io;

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::family::Family;
use crate::policy::Policy;

mod a_not_b;
mod compact;
mod hash_table;
mod intersection;
mod jaccard;
mod serialization;
mod sketch;
mod union;

pub use a_not_b::a_not_b;
pub use compact::CompactSketch;
pub use intersection::Intersection;
pub use jaccard::Similarity;
pub use jaccard::jaccard;
pub use sketch::ThetaSketch;
pub use sketch::ThetaSketchBuilder;
pub use union::Union;

pub(crate) use hash_table::ThetaHashTable;
pub(crate) use hash_table::max_retained;

/// Maximum theta value (signed max for compatibility with Java)
pub const MAX_THETA: u64 = i64::MAX as u64;

/// Minimum log2 of K
pub const MIN_LG_K: u8 = 5;

/// Maximum log2 of K
pub const MAX_LG_K: u8 = 26;

/// Default log2 of K
pub const DEFAULT_LG_K: u8 = 12;

/// A compact theta sketch.
pub type CompactThetaSketch = CompactSketch<()>;

/// Value carried next to every retained hash.
pub trait Summary: Copy + Default + PartialEq + fmt::Debug {
    /// Family written to byte 2 of serialized images.
    const FAMILY: Family;
    /// Byte 3 of serialized images.
    const SKETCH_TYPE: u8;
    /// Name used in debug strings.
    const LABEL: &'static str;
    /// Serialized size in bytes.
    const SIZE_BYTES: usize;

    fn write(&self, bytes: &mut SketchBytes);

    fn read(slice: &mut SketchSlice<'_>) -> io::Result<Self>;

    /// Combine the summaries of one key seen in two operands.
    fn merge(self, other: Self, policy: Policy) -> Self;
}

impl Summary for () {
    const FAMILY: Family = Family::THETA;
    const SKETCH_TYPE: u8 = 0;
    const LABEL: &'static str = "Theta";
    const SIZE_BYTES: usize = 0;

    fn write(&self, _bytes: &mut SketchBytes) {}

    fn read(_slice: &mut SketchSlice<'_>) -> io::Result<Self> {
        Ok(())
    }

    fn merge(self, _other: Self, _policy: Policy) -> Self {}
}
