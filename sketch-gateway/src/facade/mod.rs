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

//! Uniform wrappers over the sketch engines.
//!
//! Every family gets a facade that validates its construction parameters,
//! serializes into any [`Encoding`] and deserializes from any
//! [`ByteSource`](crate::buffer::ByteSource). Cardinality and quantile
//! families additionally share a query trait, so boundary code can treat them
//! alike.
//!
//! Queries on empty sketches follow one convention across families: estimates,
//! bounds and ranks are 0, PMF and CDF are empty, and quantile, min and max
//! fail with [`ErrorKind::EmptySketch`](crate::error::ErrorKind::EmptySketch).

use crate::codec;
use crate::codec::Encoded;
use crate::codec::Encoding;
use crate::codec::family::Family;
use crate::common::NumStdDev;
use crate::error::Error;

pub mod cpc;
pub mod frequencies;
pub mod hll;
pub mod kll;
pub mod req;
pub mod tdigest;
pub mod theta;
pub mod tuple;

pub use self::cpc::CpcFacade;
pub use self::cpc::CpcUnionFacade;
pub use self::frequencies::FrequentStringsFacade;
pub use self::hll::HllFacade;
pub use self::hll::HllUnionFacade;
pub use self::kll::KllFacade;
pub use self::req::ReqFacade;
pub use self::tdigest::TDigestFacade;
pub use self::theta::CompactThetaFacade;
pub use self::theta::ThetaFacade;
pub use self::tuple::CompactTupleFacade;
pub use self::tuple::TupleFacade;

/// Operations every sketch facade supports.
pub trait Facade {
    /// Family of the binary image.
    const FAMILY: Family;

    /// The binary sketch image.
    fn to_bytes(&self) -> Vec<u8>;

    /// Multi-line human readable summary.
    fn debug_string(&self) -> String;

    /// The sketch image in the requested encoding. Nothing is returned on failure.
    fn serialize(&self, encoding: Encoding) -> Result<Encoded, Error> {
        codec::encode(self.to_bytes(), encoding)
    }
}

/// Distinct-count queries.
pub trait CardinalityQuery {
    fn estimate(&self) -> f64;

    /// # Errors
    ///
    /// `InvalidArgument` unless `num_std_dev` is 1, 2 or 3.
    fn lower_bound(&self, num_std_dev: u8) -> Result<f64, Error>;

    /// # Errors
    ///
    /// `InvalidArgument` unless `num_std_dev` is 1, 2 or 3.
    fn upper_bound(&self, num_std_dev: u8) -> Result<f64, Error>;
}

/// Rank and quantile queries over an ordered item type.
pub trait QuantileQuery {
    type Item: Copy;

    /// Normalized rank of `item`, 0 on an empty sketch.
    fn rank(&self, item: Self::Item, inclusive: bool) -> Result<f64, Error>;

    /// # Errors
    ///
    /// `InvalidArgument` if `rank` is outside `[0, 1]`, `EmptySketch` on an
    /// empty sketch.
    fn quantile(&self, rank: f64, inclusive: bool) -> Result<Self::Item, Error>;

    fn pmf(&self, split_points: &[Self::Item], inclusive: bool) -> Result<Vec<f64>, Error>;

    fn cdf(&self, split_points: &[Self::Item], inclusive: bool) -> Result<Vec<f64>, Error>;

    fn min_item(&self) -> Result<Self::Item, Error>;

    fn max_item(&self) -> Result<Self::Item, Error>;

    /// Total weight of the stream.
    fn n(&self) -> u64;

    fn num_retained(&self) -> usize;
}

pub(crate) fn std_dev(num_std_dev: u8) -> Result<NumStdDev, Error> {
    NumStdDev::try_from(num_std_dev)
}

pub(crate) fn check_rank(rank: f64) -> Result<(), Error> {
    if (0.0..=1.0).contains(&rank) {
        Ok(())
    } else {
        Err(Error::invalid_argument("normalized rank must be in [0.0, 1.0]")
            .with_context("rank", rank))
    }
}

pub(crate) fn check_in_range<T>(
    name: &'static str,
    value: T,
    range: std::ops::RangeInclusive<T>,
) -> Result<T, Error>
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(Error::invalid_argument(format!(
            "{name} must be in [{}, {}], got {value}",
            range.start(),
            range.end()
        )))
    }
}

pub(crate) fn not_nan(value: f64) -> Result<(), Error> {
    if value.is_nan() {
        Err(Error::invalid_argument("query item must not be NaN"))
    } else {
        Ok(())
    }
}
