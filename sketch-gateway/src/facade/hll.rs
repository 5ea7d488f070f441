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
use crate::codec::Encoded;
use crate::codec::Encoding;
use crate::codec::family::Family;
use crate::error::Error;
use crate::hll::HllSketch;
use crate::hll::HllType;
use crate::hll::HllUnion;
use crate::hll::MAX_LG_K;
use crate::hll::MIN_LG_K;

/// HyperLogLog distinct counter.
#[derive(Debug, Clone)]
pub struct HllFacade {
    sketch: HllSketch,
}

impl HllFacade {
    /// # Errors
    ///
    /// `InvalidArgument` unless `lg_k` is in `4..=21`.
    pub fn new(lg_k: u8, hll_type: HllType) -> Result<Self, Error> {
        check_in_range("lg_k", lg_k, MIN_LG_K..=MAX_LG_K)?;
        debug!("creating HLL sketch lg_k={lg_k} type={hll_type}");
        Ok(Self {
            sketch: HllSketch::new(lg_k, hll_type),
        })
    }

    pub fn deserialize(source: ByteSource<'_>) -> Result<Self, Error> {
        let image = source.resolve_image()?;
        let sketch = HllSketch::deserialize(&image)?;
        Ok(Self { sketch })
    }

    pub fn sketch(&self) -> &HllSketch {
        &self.sketch
    }

    pub fn lg_k(&self) -> u8 {
        self.sketch.lg_k()
    }

    pub fn hll_type(&self) -> HllType {
        self.sketch.target_type()
    }

    pub fn is_empty(&self) -> bool {
        self.sketch.is_empty()
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

    /// Largest image a sketch with these parameters serializes to.
    pub fn max_serialized_size(lg_k: u8, hll_type: HllType) -> Result<usize, Error> {
        check_in_range("lg_k", lg_k, MIN_LG_K..=MAX_LG_K)?;
        Ok(HllSketch::max_serialized_size(lg_k, hll_type))
    }
}

impl From<HllSketch> for HllFacade {
    fn from(sketch: HllSketch) -> Self {
        Self { sketch }
    }
}

impl Facade for HllFacade {
    const FAMILY: Family = Family::HLL;

    fn to_bytes(&self) -> Vec<u8> {
        self.sketch.serialize()
    }

    fn debug_string(&self) -> String {
        self.sketch.to_string()
    }
}

impl CardinalityQuery for HllFacade {
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

/// Accumulates HLL sketches of any lg_k and type.
#[derive(Debug, Clone)]
pub struct HllUnionFacade {
    union: HllUnion,
}

impl HllUnionFacade {
    /// # Errors
    ///
    /// `InvalidArgument` unless `lg_max_k` is in `4..=21`.
    pub fn new(lg_max_k: u8) -> Result<Self, Error> {
        check_in_range("lg_max_k", lg_max_k, MIN_LG_K..=MAX_LG_K)?;
        debug!("creating HLL union lg_max_k={lg_max_k}");
        Ok(Self {
            union: HllUnion::new(lg_max_k),
        })
    }

    pub fn lg_max_k(&self) -> u8 {
        self.union.lg_max_k()
    }

    pub fn update_sketch(&mut self, sketch: &HllFacade) {
        self.union.update(&sketch.sketch);
    }

    /// Deserializes `source` and folds it in. The union is unchanged on failure.
    pub fn update_source(&mut self, source: ByteSource<'_>) -> Result<(), Error> {
        let operand = HllFacade::deserialize(source)?;
        self.update_sketch(&operand);
        Ok(())
    }

    pub fn result_sketch(&self, hll_type: HllType) -> HllFacade {
        HllFacade {
            sketch: self.union.result(hll_type),
        }
    }

    pub fn result(&self, hll_type: HllType, encoding: Encoding) -> Result<Encoded, Error> {
        self.result_sketch(hll_type).serialize(encoding)
    }

    /// Writes the binary result image into `out` and returns its length.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if `out` is shorter than the image; `out` is not touched
    /// in that case.
    pub fn write_result_into(&self, out: &mut [u8], hll_type: HllType) -> Result<usize, Error> {
        let image = self.result_sketch(hll_type).to_bytes();
        let Some(target) = out.get_mut(..image.len()) else {
            return Err(Error::out_of_range("output buffer is too small for the union result")
                .with_context("required", image.len())
                .with_context("available", out.len()));
        };
        target.copy_from_slice(&image);
        Ok(image.len())
    }
}

impl CardinalityQuery for HllUnionFacade {
    fn estimate(&self) -> f64 {
        self.union.result(HllType::Hll8).estimate()
    }

    fn lower_bound(&self, num_std_dev: u8) -> Result<f64, Error> {
        Ok(self.union.result(HllType::Hll8).lower_bound(std_dev(num_std_dev)?))
    }

    fn upper_bound(&self, num_std_dev: u8) -> Result<f64, Error> {
        Ok(self.union.result(HllType::Hll8).upper_bound(std_dev(num_std_dev)?))
    }
}
