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

//! The closed set of sketch objects a foreign caller can hold.
//!
//! Every boundary operation dispatches here first. Unsupported pairings of
//! operation and family fail with `InvalidArgument`, and operations over two
//! handles of different families fail with `IncompatibleOperands`.

use std::borrow::Cow;

use log::debug;

use crate::buffer::ByteSource;
use crate::codec::Encoded;
use crate::codec::Encoding;
use crate::codec::family::Family;
use crate::error::Error;
use crate::facade::CardinalityQuery;
use crate::facade::CompactThetaFacade;
use crate::facade::CompactTupleFacade;
use crate::facade::CpcFacade;
use crate::facade::Facade;
use crate::facade::FrequentStringsFacade;
use crate::facade::HllFacade;
use crate::facade::KllFacade;
use crate::facade::QuantileQuery;
use crate::facade::ReqFacade;
use crate::facade::TDigestFacade;
use crate::facade::ThetaFacade;
use crate::facade::TupleFacade;
use crate::facade::check_in_range;
use crate::hll::HllType;
use crate::policy::Policy;
use crate::setops;
use crate::theta::Similarity;

/// A sketch owned by the gateway on behalf of a foreign caller.
#[derive(Debug, Clone)]
pub enum SketchHandle {
    Theta(ThetaFacade),
    CompactTheta(CompactThetaFacade),
    Tuple(TupleFacade),
    CompactTuple(CompactTupleFacade),
    Hll(HllFacade),
    Cpc(CpcFacade),
    Kll(KllFacade),
    Req(ReqFacade),
    TDigest(TDigestFacade),
    FrequentStrings(FrequentStringsFacade),
}

macro_rules! each_facade {
    ($handle:expr, $facade:ident => $body:expr) => {
        match $handle {
            SketchHandle::Theta($facade) => $body,
            SketchHandle::CompactTheta($facade) => $body,
            SketchHandle::Tuple($facade) => $body,
            SketchHandle::CompactTuple($facade) => $body,
            SketchHandle::Hll($facade) => $body,
            SketchHandle::Cpc($facade) => $body,
            SketchHandle::Kll($facade) => $body,
            SketchHandle::Req($facade) => $body,
            SketchHandle::TDigest($facade) => $body,
            SketchHandle::FrequentStrings($facade) => $body,
        }
    };
}

fn unsupported(operation: &str, handle: &SketchHandle) -> Error {
    Error::invalid_argument(format!(
        "{operation} is not supported by {} sketches",
        handle.family().name
    ))
}

fn mismatched(operation: &str, a: &SketchHandle, b: &SketchHandle) -> Error {
    Error::incompatible(format!(
        "{operation} needs sketches of one family, got {} and {}",
        a.family().name,
        b.family().name
    ))
}

/// Family of an image as named by its numeric id.
pub fn family_of(id: u8) -> Result<Family, Error> {
    [
        Family::THETA,
        Family::HLL,
        Family::TUPLE,
        Family::FREQUENCY,
        Family::KLL,
        Family::CPC,
        Family::REQ,
        Family::TDIGEST,
    ]
    .into_iter()
    .find(|family| family.id == id)
    .ok_or_else(|| Error::invalid_argument(format!("unknown sketch family id {id}")))
}

impl SketchHandle {
    pub fn family(&self) -> Family {
        match self {
            SketchHandle::Theta(_) | SketchHandle::CompactTheta(_) => Family::THETA,
            SketchHandle::Tuple(_) | SketchHandle::CompactTuple(_) => Family::TUPLE,
            SketchHandle::Hll(_) => Family::HLL,
            SketchHandle::Cpc(_) => Family::CPC,
            SketchHandle::Kll(_) => Family::KLL,
            SketchHandle::Req(_) => Family::REQ,
            SketchHandle::TDigest(_) => Family::TDIGEST,
            SketchHandle::FrequentStrings(_) => Family::FREQUENCY,
        }
    }

    /// Reads an image of the given family. Theta and tuple images become
    /// compact handles.
    pub fn deserialize(family: u8, source: ByteSource<'_>, seed: u64) -> Result<Self, Error> {
        let family = family_of(family)?;
        let handle = match family {
            Family::THETA => {
                SketchHandle::CompactTheta(CompactThetaFacade::deserialize(source, seed)?)
            }
            Family::TUPLE => {
                SketchHandle::CompactTuple(CompactTupleFacade::deserialize(source, seed)?)
            }
            Family::HLL => SketchHandle::Hll(HllFacade::deserialize(source)?),
            Family::CPC => SketchHandle::Cpc(CpcFacade::deserialize(source, seed)?),
            Family::KLL => SketchHandle::Kll(KllFacade::deserialize(source)?),
            Family::REQ => SketchHandle::Req(ReqFacade::deserialize(source)?),
            Family::TDIGEST => SketchHandle::TDigest(TDigestFacade::deserialize(source)?),
            _ => SketchHandle::FrequentStrings(FrequentStringsFacade::deserialize(source)?),
        };
        debug!("deserialized {} sketch", family.name);
        Ok(handle)
    }

    /// Upper bound on the image size for the given configuration.
    ///
    /// `size` is `lg_k` for HLL, CPC, Theta and Tuple and `k` for KLL. `extra`
    /// is the HLL target type (0, 1 or 2) or the KLL stream length, and is
    /// ignored otherwise.
    pub fn max_serialized_size(family: u8, size: u32, extra: u64) -> Result<usize, Error> {
        let family = family_of(family)?;
        let lg_k = || check_in_range("lg_k", size, 0..=u32::from(u8::MAX)).map(|v| v as u8);
        match family {
            Family::HLL => {
                let hll_type = check_in_range("HLL type", extra, 0..=2)?;
                HllFacade::max_serialized_size(lg_k()?, HllType::try_from(hll_type as u8)?)
            }
            Family::CPC => CpcFacade::max_serialized_size(lg_k()?),
            Family::THETA => ThetaFacade::max_serialized_size(lg_k()?),
            Family::TUPLE => TupleFacade::max_serialized_size(lg_k()?),
            Family::KLL => {
                let k = check_in_range("k", size, 0..=u32::from(u16::MAX))?;
                KllFacade::max_serialized_size(k as u16, extra)
            }
            _ => Err(Error::invalid_argument(format!(
                "no size bound is defined for {} sketches",
                family.name
            ))),
        }
    }

    pub fn update_str(&mut self, item: &str) -> Result<(), Error> {
        match self {
            SketchHandle::Theta(theta) => theta.update_str(item),
            SketchHandle::Hll(hll) => hll.update_str(item),
            SketchHandle::Cpc(cpc) => cpc.update_str(item),
            SketchHandle::FrequentStrings(frequent) => frequent.update(item, 1)?,
            other => return Err(unsupported("string update", other)),
        }
        Ok(())
    }

    pub fn update_i64(&mut self, value: i64) -> Result<(), Error> {
        match self {
            SketchHandle::Theta(theta) => theta.update_i64(value),
            SketchHandle::Hll(hll) => hll.update_i64(value),
            SketchHandle::Cpc(cpc) => cpc.update_i64(value),
            other => return Err(unsupported("integer update", other)),
        }
        Ok(())
    }

    /// Floating point update. KLL and REQ items are narrowed to `f32`.
    pub fn update_f64(&mut self, value: f64) -> Result<(), Error> {
        match self {
            SketchHandle::Theta(theta) => theta.update_f64(value),
            SketchHandle::Hll(hll) => hll.update_f64(value),
            SketchHandle::Cpc(cpc) => cpc.update_f64(value),
            SketchHandle::Kll(kll) => kll.update(value as f32),
            SketchHandle::Req(req) => req.update(value as f32),
            SketchHandle::TDigest(digest) => digest.update(value),
            other => return Err(unsupported("floating point update", other)),
        }
        Ok(())
    }

    /// Keyed update: a tuple summary value, or a frequent item weight.
    pub fn update_keyed_str(&mut self, key: &str, value: i64) -> Result<(), Error> {
        match self {
            SketchHandle::Tuple(tuple) => tuple.update_str(key, value),
            SketchHandle::FrequentStrings(frequent) => frequent.update(key, value)?,
            other => return Err(unsupported("keyed update", other)),
        }
        Ok(())
    }

    /// Folds `other` into this sketch. Cardinality families combine through
    /// the union operations instead.
    pub fn merge(&mut self, other: &SketchHandle) -> Result<(), Error> {
        match (&mut *self, other) {
            (SketchHandle::Kll(this), SketchHandle::Kll(that)) => this.merge(that),
            (SketchHandle::Req(this), SketchHandle::Req(that)) => this.merge(that)?,
            (SketchHandle::TDigest(this), SketchHandle::TDigest(that)) => this.merge(that),
            (SketchHandle::FrequentStrings(this), SketchHandle::FrequentStrings(that)) => {
                this.merge(that)
            }
            (this, that) if this.family() != that.family() => {
                return Err(mismatched("merge", this, that));
            }
            (this, _) => return Err(unsupported("merge", this)),
        }
        Ok(())
    }

    pub fn serialize(&self, encoding: Encoding) -> Result<Encoded, Error> {
        each_facade!(self, facade => facade.serialize(encoding))
    }

    pub fn debug_string(&self) -> String {
        each_facade!(self, facade => facade.debug_string())
    }

    fn cardinality(&self) -> Option<&dyn CardinalityQuery> {
        match self {
            SketchHandle::Theta(theta) => Some(theta),
            SketchHandle::CompactTheta(theta) => Some(theta),
            SketchHandle::Tuple(tuple) => Some(tuple),
            SketchHandle::CompactTuple(tuple) => Some(tuple),
            SketchHandle::Hll(hll) => Some(hll),
            SketchHandle::Cpc(cpc) => Some(cpc),
            _ => None,
        }
    }

    pub fn estimate(&self) -> Result<f64, Error> {
        self.cardinality()
            .map(|sketch| sketch.estimate())
            .ok_or_else(|| unsupported("estimate", self))
    }

    pub fn lower_bound(&self, num_std_dev: u8) -> Result<f64, Error> {
        match self.cardinality() {
            Some(sketch) => sketch.lower_bound(num_std_dev),
            None => Err(unsupported("lower bound", self)),
        }
    }

    pub fn upper_bound(&self, num_std_dev: u8) -> Result<f64, Error> {
        match self.cardinality() {
            Some(sketch) => sketch.upper_bound(num_std_dev),
            None => Err(unsupported("upper bound", self)),
        }
    }

    pub fn rank(&self, item: f64, inclusive: bool) -> Result<f64, Error> {
        match self {
            SketchHandle::Kll(kll) => kll.rank(item as f32, inclusive),
            SketchHandle::Req(req) => req.rank(item as f32, inclusive),
            SketchHandle::TDigest(digest) => digest.rank(item, inclusive),
            other => Err(unsupported("rank", other)),
        }
    }

    pub fn quantile(&self, rank: f64, inclusive: bool) -> Result<f64, Error> {
        match self {
            SketchHandle::Kll(kll) => kll.quantile(rank, inclusive).map(f64::from),
            SketchHandle::Req(req) => req.quantile(rank, inclusive).map(f64::from),
            SketchHandle::TDigest(digest) => digest.quantile(rank, inclusive),
            other => Err(unsupported("quantile", other)),
        }
    }

    fn as_compact_theta(&self) -> Option<Cow<'_, CompactThetaFacade>> {
        match self {
            SketchHandle::Theta(theta) => Some(Cow::Owned(theta.compact())),
            SketchHandle::CompactTheta(theta) => Some(Cow::Borrowed(theta)),
            _ => None,
        }
    }

    fn as_compact_tuple(&self) -> Option<Cow<'_, CompactTupleFacade>> {
        match self {
            SketchHandle::Tuple(tuple) => Some(Cow::Owned(tuple.compact())),
            SketchHandle::CompactTuple(tuple) => Some(Cow::Borrowed(tuple)),
            _ => None,
        }
    }
}

fn same_family<'a>(
    operation: &str,
    operands: &[&'a SketchHandle],
) -> Result<&'a SketchHandle, Error> {
    let Some((first, rest)) = operands.split_first() else {
        return Err(Error::invalid_argument(format!(
            "{operation} needs at least one sketch"
        )));
    };
    match rest.iter().find(|other| other.family() != first.family()) {
        Some(other) => Err(mismatched(operation, first, other)),
        None => Ok(first),
    }
}

fn collect<'a, T: Clone + 'a>(
    operands: &[&'a SketchHandle],
    view: impl Fn(&'a SketchHandle) -> Option<Cow<'a, T>>,
) -> Vec<Cow<'a, T>> {
    operands.iter().filter_map(|&handle| view(handle)).collect()
}

/// N-way union. `policy` applies to tuple operands only.
pub fn union(
    operands: &[&SketchHandle],
    lg_k: u8,
    seed: u64,
    policy: Policy,
) -> Result<SketchHandle, Error> {
    let first = same_family("union", operands)?;
    let handle = match first {
        SketchHandle::Theta(_) | SketchHandle::CompactTheta(_) => {
            let sketches = collect(operands, SketchHandle::as_compact_theta);
            let refs: Vec<&CompactThetaFacade> = sketches.iter().map(|s| s.as_ref()).collect();
            SketchHandle::CompactTheta(setops::theta_union(&refs, lg_k, seed)?)
        }
        SketchHandle::Tuple(_) | SketchHandle::CompactTuple(_) => {
            let sketches = collect(operands, SketchHandle::as_compact_tuple);
            let refs: Vec<&CompactTupleFacade> = sketches.iter().map(|s| s.as_ref()).collect();
            SketchHandle::CompactTuple(setops::tuple_union(&refs, lg_k, seed, policy)?)
        }
        SketchHandle::Hll(_) => {
            let refs: Vec<&HllFacade> = operands
                .iter()
                .filter_map(|handle| match handle {
                    SketchHandle::Hll(hll) => Some(hll),
                    _ => None,
                })
                .collect();
            SketchHandle::Hll(setops::hll_union(&refs, lg_k)?)
        }
        SketchHandle::Cpc(_) => {
            let refs: Vec<&CpcFacade> = operands
                .iter()
                .filter_map(|handle| match handle {
                    SketchHandle::Cpc(cpc) => Some(cpc),
                    _ => None,
                })
                .collect();
            SketchHandle::Cpc(setops::cpc_union(&refs, lg_k, seed)?)
        }
        other => return Err(unsupported("union", other)),
    };
    Ok(handle)
}

/// Intersection of two theta or two tuple sketches.
pub fn intersection(
    a: &SketchHandle,
    b: &SketchHandle,
    policy: Policy,
) -> Result<SketchHandle, Error> {
    same_family("intersection", &[a, b])?;
    if let (Some(a), Some(b)) = (a.as_compact_theta(), b.as_compact_theta()) {
        return setops::theta_intersection(&a, &b).map(SketchHandle::CompactTheta);
    }
    if let (Some(a), Some(b)) = (a.as_compact_tuple(), b.as_compact_tuple()) {
        return setops::tuple_intersection(&a, &b, policy).map(SketchHandle::CompactTuple);
    }
    Err(unsupported("intersection", a))
}

/// Entries of `a` whose hashes are absent from `b`.
pub fn a_not_b(a: &SketchHandle, b: &SketchHandle) -> Result<SketchHandle, Error> {
    same_family("set difference", &[a, b])?;
    if let (Some(a), Some(b)) = (a.as_compact_theta(), b.as_compact_theta()) {
        return setops::theta_a_not_b(&a, &b).map(SketchHandle::CompactTheta);
    }
    if let (Some(a), Some(b)) = (a.as_compact_tuple(), b.as_compact_tuple()) {
        return setops::tuple_a_not_b(&a, &b).map(SketchHandle::CompactTuple);
    }
    Err(unsupported("set difference", a))
}

pub fn jaccard(a: &SketchHandle, b: &SketchHandle) -> Result<Similarity, Error> {
    same_family("jaccard similarity", &[a, b])?;
    match (a.as_compact_theta(), b.as_compact_theta()) {
        (Some(a), Some(b)) => setops::theta_jaccard(&a, &b),
        _ => Err(unsupported("jaccard similarity", a)),
    }
}
