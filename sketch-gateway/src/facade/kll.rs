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

use super::Facade;
use super::QuantileQuery;
use super::check_in_range;
use super::check_rank;
use super::not_nan;
use crate::buffer::ByteSource;
use crate::codec::family::Family;
use crate::error::Error;
use crate::kll;
use crate::kll::KllSketch;
use crate::kll::MAX_K;
use crate::kll::MIN_K;

/// KLL quantiles sketch over `f32` items.
#[derive(Debug, Clone)]
pub struct KllFacade {
    sketch: KllSketch<f32>,
}

impl KllFacade {
    /// # Errors
    ///
    /// `InvalidArgument` unless `k` is in `8..=65535`.
    pub fn new(k: u16) -> Result<Self, Error> {
        check_in_range("k", k, MIN_K..=MAX_K)?;
        debug!("creating KLL sketch k={k}");
        Ok(Self {
            sketch: KllSketch::new(k),
        })
    }

    pub fn deserialize(source: ByteSource<'_>) -> Result<Self, Error> {
        let image = source.resolve_image()?;
        let sketch = KllSketch::deserialize(&image)?;
        Ok(Self { sketch })
    }

    pub fn sketch(&self) -> &KllSketch<f32> {
        &self.sketch
    }

    pub fn k(&self) -> u16 {
        self.sketch.k()
    }

    pub fn is_empty(&self) -> bool {
        self.sketch.is_empty()
    }

    pub fn is_estimation_mode(&self) -> bool {
        self.sketch.is_estimation_mode()
    }

    /// Adds one item. NaN is ignored.
    pub fn update(&mut self, item: f32) {
        self.sketch.update(item);
    }

    pub fn merge(&mut self, other: &KllFacade) {
        debug!(
            "merging KLL sketch n={} into n={}",
            other.sketch.n(),
            self.sketch.n()
        );
        self.sketch.merge(&other.sketch);
    }

    /// Deserializes `source` and merges it. The sketch is unchanged on failure.
    pub fn merge_source(&mut self, source: ByteSource<'_>) -> Result<(), Error> {
        let other = KllFacade::deserialize(source)?;
        self.merge(&other);
        Ok(())
    }

    /// Normalized rank error, for PMF queries when `pmf` is set.
    pub fn normalized_rank_error(&self, pmf: bool) -> f64 {
        self.sketch.normalized_rank_error(pmf)
    }

    pub fn max_serialized_size(k: u16, n: u64) -> Result<usize, Error> {
        check_in_range("k", k, MIN_K..=MAX_K)?;
        Ok(KllSketch::<f32>::max_serialized_size(k, n))
    }

    /// Whether the two streams differ in distribution at significance `p_value`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless `p_value` is in `(0, 1)`; `EmptySketch` if
    /// either sketch is empty.
    pub fn kolmogorov_smirnov(a: &KllFacade, b: &KllFacade, p_value: f64) -> Result<bool, Error> {
        if !(p_value > 0.0 && p_value < 1.0) {
            return Err(Error::invalid_argument("p_value must be in (0, 1)")
                .with_context("p_value", p_value));
        }
        if a.is_empty() || b.is_empty() {
            return Err(Error::empty_sketch("kolmogorov_smirnov"));
        }
        Ok(kll::kolmogorov_smirnov(&a.sketch, &b.sketch, p_value))
    }

    /// [`KllFacade::kolmogorov_smirnov`] over two serialized sketches.
    pub fn kolmogorov_smirnov_of(
        a: ByteSource<'_>,
        b: ByteSource<'_>,
        p_value: f64,
    ) -> Result<bool, Error> {
        let a = KllFacade::deserialize(a)?;
        let b = KllFacade::deserialize(b)?;
        KllFacade::kolmogorov_smirnov(&a, &b, p_value)
    }
}

impl Facade for KllFacade {
    const FAMILY: Family = Family::KLL;

    fn to_bytes(&self) -> Vec<u8> {
        self.sketch.serialize()
    }

    fn debug_string(&self) -> String {
        self.sketch.to_string()
    }
}

impl QuantileQuery for KllFacade {
    type Item = f32;

    fn rank(&self, item: f32, inclusive: bool) -> Result<f64, Error> {
        not_nan(item as f64)?;
        Ok(self.sketch.rank(&item, inclusive))
    }

    fn quantile(&self, rank: f64, inclusive: bool) -> Result<f32, Error> {
        check_rank(rank)?;
        self.sketch
            .quantile(rank, inclusive)
            .ok_or_else(|| Error::empty_sketch("quantile"))
    }

    fn pmf(&self, split_points: &[f32], inclusive: bool) -> Result<Vec<f64>, Error> {
        self.sketch.pmf(split_points, inclusive)
    }

    fn cdf(&self, split_points: &[f32], inclusive: bool) -> Result<Vec<f64>, Error> {
        self.sketch.cdf(split_points, inclusive)
    }

    fn min_item(&self) -> Result<f32, Error> {
        self.sketch
            .min_item()
            .copied()
            .ok_or_else(|| Error::empty_sketch("min_item"))
    }

    fn max_item(&self) -> Result<f32, Error> {
        self.sketch
            .max_item()
            .copied()
            .ok_or_else(|| Error::empty_sketch("max_item"))
    }

    fn n(&self) -> u64 {
        self.sketch.n()
    }

    fn num_retained(&self) -> usize {
        self.sketch.num_retained()
    }
}
