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
use crate::codec::family::Family;
use crate::cpc::CpcSketch;
use crate::cpc::CpcUnion;
use crate::cpc::MAX_LG_K;
use crate::cpc::MIN_LG_K;
use crate::error::Error;

/// Compressed probabilistic counting sketch.
#[derive(Debug, Clone)]
pub struct CpcFacade {
    sketch: CpcSketch,
}

impl CpcFacade {
    /// # Errors
    ///
    /// `InvalidArgument` unless `lg_k` is in `4..=26`.
    pub fn new(lg_k: u8, seed: u64) -> Result<Self, Error> {
        check_in_range("lg_k", lg_k, MIN_LG_K..=MAX_LG_K)?;
        debug!("creating CPC sketch lg_k={lg_k}");
        Ok(Self {
            sketch: CpcSketch::with_seed(lg_k, seed),
        })
    }

    /// # Errors
    ///
    /// `SeedMismatch` if the image was built with a seed other than `seed`.
    pub fn deserialize(source: ByteSource<'_>, seed: u64) -> Result<Self, Error> {
        let image = source.resolve_image()?;
        let sketch = CpcSketch::deserialize(&image, seed)?;
        Ok(Self { sketch })
    }

    pub fn sketch(&self) -> &CpcSketch {
        &self.sketch
    }

    pub fn lg_k(&self) -> u8 {
        self.sketch.lg_k()
    }

    pub fn seed(&self) -> u64 {
        self.sketch.seed()
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

    pub fn max_serialized_size(lg_k: u8) -> Result<usize, Error> {
        check_in_range("lg_k", lg_k, MIN_LG_K..=MAX_LG_K)?;
        Ok(CpcSketch::max_serialized_bytes(lg_k))
    }
}

impl From<CpcSketch> for CpcFacade {
    fn from(sketch: CpcSketch) -> Self {
        Self { sketch }
    }
}

impl Facade for CpcFacade {
    const FAMILY: Family = Family::CPC;

    fn to_bytes(&self) -> Vec<u8> {
        self.sketch.serialize()
    }

    fn debug_string(&self) -> String {
        self.sketch.to_string()
    }
}

impl CardinalityQuery for CpcFacade {
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

/// Accumulates CPC sketches built with one seed.
#[derive(Debug, Clone)]
pub struct CpcUnionFacade {
    union: CpcUnion,
    seed: u64,
}

impl CpcUnionFacade {
    /// # Errors
    ///
    /// `InvalidArgument` unless `lg_k` is in `4..=26`.
    pub fn new(lg_k: u8, seed: u64) -> Result<Self, Error> {
        check_in_range("lg_k", lg_k, MIN_LG_K..=MAX_LG_K)?;
        debug!("creating CPC union lg_k={lg_k}");
        Ok(Self {
            union: CpcUnion::new(lg_k, seed),
            seed,
        })
    }

    /// # Errors
    ///
    /// `IncompatibleOperands` if `sketch` was built with another seed.
    pub fn update_sketch(&mut self, sketch: &CpcFacade) -> Result<(), Error> {
        self.union.update(&sketch.sketch)
    }

    /// Deserializes `source` with the union's seed and folds it in.
    pub fn update_source(&mut self, source: ByteSource<'_>) -> Result<(), Error> {
        let operand = CpcFacade::deserialize(source, self.seed)?;
        self.update_sketch(&operand)
    }

    pub fn result(&self) -> CpcFacade {
        CpcFacade {
            sketch: self.union.result(),
        }
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;
    use crate::codec::Encoding;
    use crate::error::ErrorKind;
    use crate::hash::DEFAULT_UPDATE_SEED;

    fn filled(lg_k: u8, seed: u64, range: std::ops::Range<i64>) -> CpcFacade {
        let mut facade = CpcFacade::new(lg_k, seed).unwrap();
        for i in range {
            facade.update_i64(i);
        }
        facade
    }

    #[test]
    fn test_empty_queries() {
        let facade = CpcFacade::new(11, DEFAULT_UPDATE_SEED).unwrap();
        assert!(facade.is_empty());
        assert_that!(facade.estimate(), eq(0.0));
        assert_that!(facade.lower_bound(2).unwrap(), eq(0.0));
        assert_that!(facade.upper_bound(2).unwrap(), eq(0.0));
        assert!(CpcFacade::new(27, DEFAULT_UPDATE_SEED).is_err());
    }

    #[test]
    fn test_round_trip_and_seed_check() {
        let facade = filled(10, DEFAULT_UPDATE_SEED, 0..3_000);
        for encoding in Encoding::ALL {
            let encoded = facade.serialize(encoding).unwrap();
            let decoded =
                CpcFacade::deserialize(ByteSource::from(&encoded), DEFAULT_UPDATE_SEED).unwrap();
            assert_eq!(decoded.to_bytes(), facade.to_bytes());
        }

        let err = CpcFacade::deserialize(ByteSource::from(facade.to_bytes()), 123).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::SeedMismatch));
    }

    #[test]
    fn test_union_rejects_foreign_seed() {
        let a = filled(11, DEFAULT_UPDATE_SEED, 0..1_000);
        let b = filled(11, 42, 0..1_000);
        let mut union = CpcUnionFacade::new(11, DEFAULT_UPDATE_SEED).unwrap();
        union.update_sketch(&a).unwrap();
        let err = union.update_sketch(&b).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::IncompatibleOperands));
        assert_that!(union.result().estimate(), near(1_000.0, 50.0));
    }
}
