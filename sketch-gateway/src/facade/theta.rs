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

use log::debug;

use super::CardinalityQuery;
use super::Facade;
use super::check_in_range;
use super::std_dev;
use crate::buffer::ByteSource;
use crate::codec;
use crate::codec::Encoded;
use crate::codec::Encoding;
use crate::codec::family::Family;
use crate::common::is_probability;
use crate::error::Error;
use crate::theta::CompactThetaSketch;
use crate::theta::MAX_LG_K;
use crate::theta::MIN_LG_K;
use crate::theta::ThetaSketch;

pub use crate::hash::DEFAULT_UPDATE_SEED as DEFAULT_SEED;
pub use crate::theta::DEFAULT_LG_K;

/// Mutable theta sketch.
#[derive(Debug, Clone)]
pub struct ThetaFacade {
    sketch: ThetaSketch,
}

impl ThetaFacade {
    /// # Errors
    ///
    /// `InvalidArgument` unless `lg_k` is in `5..=26` and `p` is in `(0, 1]`.
    pub fn new(lg_k: u8, seed: u64, p: f32) -> Result<Self, Error> {
        check_in_range("lg_k", lg_k, MIN_LG_K..=MAX_LG_K)?;
        if !is_probability(p) {
            return Err(Error::invalid_argument("sampling probability must be in (0, 1]")
                .with_context("p", p));
        }
        debug!("creating theta sketch lg_k={lg_k} p={p}");
        let sketch = ThetaSketch::builder()
            .lg_k(lg_k)
            .seed(seed)
            .sampling_probability(p)
            .build();
        Ok(Self { sketch })
    }

    pub fn sketch(&self) -> &ThetaSketch {
        &self.sketch
    }

    pub fn seed(&self) -> u64 {
        self.sketch.seed()
    }

    pub fn is_empty(&self) -> bool {
        self.sketch.is_empty()
    }

    pub fn theta(&self) -> f64 {
        self.sketch.theta()
    }

    pub fn num_retained(&self) -> usize {
        self.sketch.num_retained()
    }

    pub fn update_str(&mut self, value: &str) {
        self.sketch.update_str(value);
    }

    pub fn update_i64(&mut self, value: i64) {
        self.sketch.update_i64(value);
    }

    pub fn update_f64(&mut self, value: f64) {
        self.sketch.update_f64(value);
    }

    pub fn compact(&self) -> CompactThetaFacade {
        CompactThetaFacade {
            sketch: self.sketch.compact(),
            seed: self.sketch.seed(),
        }
    }

    pub fn max_serialized_size(lg_k: u8) -> Result<usize, Error> {
        check_in_range("lg_k", lg_k, MIN_LG_K..=MAX_LG_K)?;
        Ok(CompactThetaSketch::max_serialized_size(lg_k))
    }
}

impl Facade for ThetaFacade {
    const FAMILY: Family = Family::THETA;

    fn to_bytes(&self) -> Vec<u8> {
        self.sketch.serialize()
    }

    fn debug_string(&self) -> String {
        self.sketch.compact().to_string()
    }

    fn serialize(&self, encoding: Encoding) -> Result<Encoded, Error> {
        if encoding.is_compressed() {
            let image = self.sketch.compact().serialize_packed();
            return Ok(codec::encode_unsealed(image, encoding));
        }
        codec::encode(self.to_bytes(), encoding)
    }
}

impl CardinalityQuery for ThetaFacade {
    fn estimate(&self) -> f64 {
        self.sketch.estimate()
    }

    fn lower_bound(&self, num_std_dev: u8) -> Result<f64, Error> {
        Ok(self.sketch.lower_bound(std_dev(num_std_dev)?))
    }

    fn upper_bound(&self, num_std_dev: u8) -> Result<f64, Error> {
        Ok(self.sketch.upper_bound(std_dev(num_std_dev)?))
    }
}

/// Read-only theta sketch, as produced by `compact` or deserialization.
#[derive(Debug, Clone)]
pub struct CompactThetaFacade {
    sketch: CompactThetaSketch,
    seed: u64,
}

impl CompactThetaFacade {
    /// # Errors
    ///
    /// `SeedMismatch` if a non-empty image was built with a seed other than `seed`.
    pub fn deserialize(source: ByteSource<'_>, seed: u64) -> Result<Self, Error> {
        let image = source.resolve_image()?;
        let sketch = CompactThetaSketch::deserialize(&image, seed)?;
        Ok(Self { sketch, seed })
    }

    pub(crate) fn from_parts(sketch: CompactThetaSketch, seed: u64) -> Self {
        Self { sketch, seed }
    }

    pub fn sketch(&self) -> &CompactThetaSketch {
        &self.sketch
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn is_empty(&self) -> bool {
        self.sketch.is_empty()
    }

    pub fn theta(&self) -> f64 {
        self.sketch.theta()
    }

    pub fn num_retained(&self) -> usize {
        self.sketch.num_retained()
    }

    /// Estimate of the image in `source`.
    pub fn estimate_of(source: ByteSource<'_>, seed: u64) -> Result<f64, Error> {
        Ok(Self::deserialize(source, seed)?.estimate())
    }

    /// `(estimate, lower_bound, upper_bound)` of the image in `source`.
    pub fn estimate_and_bounds_of(
        source: ByteSource<'_>,
        num_std_dev: u8,
        seed: u64,
    ) -> Result<(f64, f64, f64), Error> {
        let nsd = std_dev(num_std_dev)?;
        let facade = Self::deserialize(source, seed)?;
        Ok((
            facade.sketch.estimate(),
            facade.sketch.lower_bound(nsd),
            facade.sketch.upper_bound(nsd),
        ))
    }

    /// Debug string of the image in `source`.
    pub fn describe(source: ByteSource<'_>, seed: u64) -> Result<String, Error> {
        Ok(Self::deserialize(source, seed)?.debug_string())
    }

    pub fn theta_of(source: ByteSource<'_>, seed: u64) -> Result<f64, Error> {
        Ok(Self::deserialize(source, seed)?.theta())
    }

    pub fn num_retained_of(source: ByteSource<'_>, seed: u64) -> Result<usize, Error> {
        Ok(Self::deserialize(source, seed)?.num_retained())
    }
}

impl Facade for CompactThetaFacade {
    const FAMILY: Family = Family::THETA;

    fn to_bytes(&self) -> Vec<u8> {
        self.sketch.serialize()
    }

    fn debug_string(&self) -> String {
        self.sketch.to_string()
    }

    /// Compressed encodings carry the bit-packed theta image.
    fn serialize(&self, encoding: Encoding) -> Result<Encoded, Error> {
        if encoding.is_compressed() {
            let image = self.sketch.serialize_packed();
            return Ok(codec::encode_unsealed(image, encoding));
        }
        codec::encode(self.to_bytes(), encoding)
    }
}

impl CardinalityQuery for CompactThetaFacade {
    fn estimate(&self) -> f64 {
        self.sketch.estimate()
    }

    fn lower_bound(&self, num_std_dev: u8) -> Result<f64, Error> {
        Ok(self.sketch.lower_bound(std_dev(num_std_dev)?))
    }

    fn upper_bound(&self, num_std_dev: u8) -> Result<f64, Error> {
        Ok(self.sketch.upper_bound(std_dev(num_std_dev)?))
    }
}
