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

//! Images produced by the reference implementation decode, re-encode byte for
//! byte, and match what this library builds from the same inputs.

use googletest::prelude::*;
use sketch_gateway::DEFAULT_SEED;
use sketch_gateway::buffer::ByteSource;
use sketch_gateway::codec::Encoding;
use sketch_gateway::error::ErrorKind;
use sketch_gateway::facade::CardinalityQuery;
use sketch_gateway::facade::CompactThetaFacade;
use sketch_gateway::facade::CompactTupleFacade;
use sketch_gateway::facade::CpcFacade;
use sketch_gateway::facade::Facade;
use sketch_gateway::facade::HllFacade;
use sketch_gateway::facade::ThetaFacade;
use sketch_gateway::facade::TupleFacade;
use sketch_gateway::hll::HllType;
use sketch_gateway::policy::Policy;
use sketch_gateway::setops;
use test_log::test;

// Tuple sketches of "a", "b", "c" and of "c", "d", "e", each value 1.
const TUPLE_ABC: &str = "AgMJAQAazJMDAAAAAAAAALcMbuWor0AIAQAAAAAAAACFf0C2icflNAEAAAAAAAAAF8EdUoUHAXsBAAAAAAAAAA==";
const TUPLE_CDE: &str = "AgMJAQAazJMDAAAAAAAAALcMbuWor0AIAQAAAAAAAABOPehbCCvBLgEAAAAAAAAA4F817XUdAHMBAAAAAAAAAA==";
const TUPLE_UNION: &str = "AgMJAQAazJMFAAAAAAAAALcMbuWor0AIAgAAAAAAAABOPehbCCvBLgEAAAAAAAAAhX9AtonH5TQBAAAAAAAAAOBfNe11HQBzAQAAAAAAAAAXwR1ShQcBewEAAAAAAAAA";
const TUPLE_INTERSECTION: &str = "AQMJAQAazJO3DG7lqK9ACAIAAAAAAAAA";
const TUPLE_A_NOT_B: &str = "AgMJAQAazJMCAAAAAAAAAIV/QLaJx+U0AQAAAAAAAAAXwR1ShQcBewEAAAAAAAAA";

// Bit-packed (serial version 4) theta sketch of "a", "b", "c".
const THETA_ABC_PACKED: &str = "AQQDPwEazJMDEIFfUcrcGW6ylF+DQ0nLOjDZ/9ze6gyQ";

// HLL_4 sketches at lg_k 12 of "a", "b", "c" and of "c", "d", "e".
const HLL_ABC: &str = "AgEHDAMIAwAvgjsECv+ABG8Z3AY=";
const HLL_CDE: &str = "AgEHDAMIAwBvGdwGwL9qEp160As=";
const HLL_UNION: &str = "AgEHDAMIBQAvgjsECv+ABG8Z3AbAv2oSnXrQCw==";

// CPC sketch at lg_k 11 of "a", "b", "c", with a compressed payload.
const CPC_ABC: &str = "CAEQCwAOzJMDAAAAAgAAAAAAAAAA+p9AiIAEKIABCEC+FRhuAwAAAA==";

fn image(text: &str) -> Vec<u8> {
    ByteSource::base64(text).resolve().unwrap().into_owned()
}

fn binary<F: Facade>(facade: &F) -> Vec<u8> {
    facade.serialize(Encoding::Binary).unwrap().into_bytes()
}

fn tuple(text: &str) -> CompactTupleFacade {
    CompactTupleFacade::deserialize(ByteSource::base64(text), DEFAULT_SEED).unwrap()
}

fn hll(text: &str) -> HllFacade {
    HllFacade::deserialize(ByteSource::base64(text)).unwrap()
}

#[test]
fn test_tuple_images_round_trip() {
    for text in [TUPLE_ABC, TUPLE_CDE, TUPLE_UNION, TUPLE_INTERSECTION, TUPLE_A_NOT_B] {
        assert_eq!(binary(&tuple(text)), image(text));
    }
    assert_that!(tuple(TUPLE_UNION).estimate(), eq(5.0));
    assert_that!(tuple(TUPLE_INTERSECTION).estimate(), eq(1.0));
}

#[test]
fn test_tuple_built_from_keys_matches() {
    for (keys, text) in [(["a", "b", "c"], TUPLE_ABC), (["c", "d", "e"], TUPLE_CDE)] {
        let mut sketch = TupleFacade::new(12, DEFAULT_SEED, 1.0, "SUM").unwrap();
        keys.iter().for_each(|key| sketch.update_str(key, 1));
        assert_eq!(binary(&sketch.compact()), image(text));
    }
}

#[test]
fn test_tuple_set_operations_match() {
    let sources = || [ByteSource::base64(TUPLE_ABC), ByteSource::base64(TUPLE_CDE)];

    let union = setops::tuple_union_sources(sources(), 12, DEFAULT_SEED, Policy::Sum).unwrap();
    assert_eq!(binary(&union), image(TUPLE_UNION));

    let [a, b] = sources();
    let both = setops::tuple_intersection_sources(a, b, DEFAULT_SEED, Policy::Sum).unwrap();
    assert_eq!(binary(&both), image(TUPLE_INTERSECTION));

    let [a, b] = sources();
    let only_a = setops::tuple_a_not_b_sources(a, b, DEFAULT_SEED).unwrap();
    assert_eq!(binary(&only_a), image(TUPLE_A_NOT_B));
}

#[test]
fn test_packed_theta_image() {
    let sketch =
        CompactThetaFacade::deserialize(ByteSource::base64(THETA_ABC_PACKED), DEFAULT_SEED)
            .unwrap();
    assert_that!(sketch.estimate(), eq(3.0));
    assert_that!(sketch.num_retained(), eq(3));

    let mut built = ThetaFacade::new(12, DEFAULT_SEED, 1.0).unwrap();
    ["a", "b", "c"].iter().for_each(|key| built.update_str(key));
    let packed = built.serialize(Encoding::Base64Compressed).unwrap();
    assert_that!(packed.as_text(), some(eq(THETA_ABC_PACKED)));
    let packed = sketch.serialize(Encoding::BinaryCompressed).unwrap();
    assert_eq!(packed.into_bytes(), image(THETA_ABC_PACKED));

    let lifted =
        CompactTupleFacade::from_theta(ByteSource::base64(THETA_ABC_PACKED), 1, DEFAULT_SEED);
    assert_eq!(binary(&lifted.unwrap()), image(TUPLE_ABC));
}

#[test]
fn test_hll_images_round_trip() {
    for text in [HLL_ABC, HLL_CDE, HLL_UNION] {
        assert_eq!(binary(&hll(text)), image(text));
    }
    assert_that!(hll(HLL_UNION).estimate(), near(5.0, 1e-6));
}

#[test]
fn test_hll_built_from_keys_matches() {
    for (keys, text) in [(["a", "b", "c"], HLL_ABC), (["c", "d", "e"], HLL_CDE)] {
        let mut sketch = HllFacade::new(12, HllType::Hll4).unwrap();
        keys.iter().for_each(|key| sketch.update_str(key));
        assert_eq!(binary(&sketch), image(text));
    }
}

#[test]
fn test_hll_union_keeps_coupon_order() {
    let sources = [ByteSource::base64(HLL_ABC), ByteSource::base64(HLL_CDE)];
    let union = setops::hll_union_sources(sources, 12).unwrap();
    assert_eq!(binary(&union), image(HLL_UNION));
}

#[test]
fn test_compressed_cpc_image_is_rejected() {
    let err = CpcFacade::deserialize(ByteSource::base64(CPC_ABC), DEFAULT_SEED).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::CorruptFormat));
    assert_that!(err.to_string().as_str(), contains_substring("compressed CPC"));
}
