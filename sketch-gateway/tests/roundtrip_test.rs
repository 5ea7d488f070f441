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

//! Every family survives every encoding, empty and non-empty.

use googletest::prelude::*;
use sketch_gateway::DEFAULT_SEED;
use sketch_gateway::buffer::ByteSource;
use sketch_gateway::codec::Encoded;
use sketch_gateway::codec::Encoding;
use sketch_gateway::error::Error;
use sketch_gateway::error::ErrorKind;
use sketch_gateway::facade::CompactThetaFacade;
use sketch_gateway::facade::CompactTupleFacade;
use sketch_gateway::facade::CpcFacade;
use sketch_gateway::facade::Facade;
use sketch_gateway::facade::FrequentStringsFacade;
use sketch_gateway::facade::HllFacade;
use sketch_gateway::facade::KllFacade;
use sketch_gateway::facade::ReqFacade;
use sketch_gateway::facade::TDigestFacade;
use sketch_gateway::facade::ThetaFacade;
use sketch_gateway::facade::TupleFacade;
use sketch_gateway::hll::HllType;

fn assert_round_trips<A, B>(original: &A, read: impl Fn(ByteSource<'_>) -> Result<B, Error>)
where
    A: Facade,
    B: Facade,
{
    let image = original.to_bytes();
    for encoding in Encoding::ALL {
        let encoded = original.serialize(encoding).unwrap();
        match &encoded {
            Encoded::Text(_) => assert!(encoding.is_text()),
            Encoded::Bytes(_) => assert!(!encoding.is_text()),
        }
        let copy = read(ByteSource::from(&encoded)).unwrap();
        assert_eq!(copy.to_bytes(), image, "{encoding:?}");
    }
}

#[test]
fn test_theta_and_tuple() {
    for n in [0, 1, 100, 20_000] {
        let mut theta = ThetaFacade::new(12, DEFAULT_SEED, 1.0).unwrap();
        let mut tuple = TupleFacade::new(12, DEFAULT_SEED, 1.0, "SUM").unwrap();
        for i in 0..n {
            theta.update_i64(i);
            tuple.update_i64(i, i % 7);
        }
        assert_round_trips(&theta, |source| CompactThetaFacade::deserialize(source, DEFAULT_SEED));
        assert_round_trips(&tuple, |source| CompactTupleFacade::deserialize(source, DEFAULT_SEED));
    }
}

#[test]
fn test_sampled_theta() {
    let mut theta = ThetaFacade::new(12, DEFAULT_SEED, 0.5).unwrap();
    assert_round_trips(&theta, |source| CompactThetaFacade::deserialize(source, DEFAULT_SEED));
    for i in 0..1000 {
        theta.update_str(&format!("key-{i}"));
    }
    assert_round_trips(&theta, |source| CompactThetaFacade::deserialize(source, DEFAULT_SEED));
}

#[test]
fn test_hll_every_type() {
    for hll_type in [HllType::Hll4, HllType::Hll6, HllType::Hll8] {
        for n in [0, 10, 1000, 50_000] {
            let mut hll = HllFacade::new(12, hll_type).unwrap();
            (0..n).for_each(|i| hll.update_i64(i));
            assert_round_trips(&hll, HllFacade::deserialize);
        }
    }
}

#[test]
fn test_cpc() {
    for n in [0, 1, 100, 5_000, 100_000] {
        let mut cpc = CpcFacade::new(11, DEFAULT_SEED).unwrap();
        (0..n).for_each(|i| cpc.update_i64(i));
        assert_round_trips(&cpc, |source| CpcFacade::deserialize(source, DEFAULT_SEED));
    }
}

#[test]
fn test_quantile_families() {
    for n in [0u32, 1, 100, 10_000] {
        let mut kll = KllFacade::new(200).unwrap();
        let mut req = ReqFacade::new(12, true).unwrap();
        let mut digest = TDigestFacade::new(100).unwrap();
        for i in 0..n {
            kll.update(i as f32);
            req.update(i as f32);
            digest.update(f64::from(i));
        }
        assert_round_trips(&kll, KllFacade::deserialize);
        assert_round_trips(&req, ReqFacade::deserialize);
        assert_round_trips(&digest, TDigestFacade::deserialize);
    }
}

#[test]
fn test_frequent_strings() {
    let empty = FrequentStringsFacade::new(5).unwrap();
    assert_round_trips(&empty, FrequentStringsFacade::deserialize);

    let mut sketch = FrequentStringsFacade::new(5).unwrap();
    for i in 0..200 {
        sketch.update(&format!("item-{}", i % 40), 1 + i % 3).unwrap();
    }
    for encoding in Encoding::ALL {
        let encoded = sketch.serialize(encoding).unwrap();
        let copy = FrequentStringsFacade::deserialize(ByteSource::from(&encoded)).unwrap();
        assert_that!(copy.total_weight(), eq(sketch.total_weight()));
        assert_that!(copy.maximum_error(), eq(sketch.maximum_error()));
        assert_eq!(
            copy.frequent_items("NO_FALSE_NEGATIVES", 0).unwrap(),
            sketch.frequent_items("NO_FALSE_NEGATIVES", 0).unwrap()
        );
    }
}

#[test]
fn test_byte_source_shapes() {
    let mut kll = KllFacade::new(200).unwrap();
    (0..100).for_each(|i| kll.update(i as f32));
    let image = kll.to_bytes();

    let owned = KllFacade::deserialize(ByteSource::from(image.clone())).unwrap();
    assert_eq!(owned.to_bytes(), image);
    let foreign = KllFacade::deserialize(ByteSource::foreign(&image)).unwrap();
    assert_eq!(foreign.to_bytes(), image);
}

#[test]
fn test_rejected_inputs() {
    let mut theta = ThetaFacade::new(12, DEFAULT_SEED, 1.0).unwrap();
    (0..100).for_each(|i| theta.update_i64(i));
    let image = theta.to_bytes();

    let truncated = &image[..image.len() - 3];
    let err = CompactThetaFacade::deserialize(ByteSource::from(truncated), DEFAULT_SEED);
    assert_that!(err.unwrap_err().kind(), eq(ErrorKind::CorruptFormat));

    let err = CompactThetaFacade::deserialize(ByteSource::base64("not base64!"), DEFAULT_SEED);
    assert_that!(err.unwrap_err().kind(), eq(ErrorKind::DecodeError));

    let err = CompactThetaFacade::deserialize(ByteSource::from(&image), DEFAULT_SEED + 1);
    assert_that!(err.unwrap_err().kind(), eq(ErrorKind::SeedMismatch));

    let err = KllFacade::deserialize(ByteSource::from(&image)).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::CorruptFormat));
}
