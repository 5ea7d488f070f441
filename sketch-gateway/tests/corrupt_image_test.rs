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

//! Damaged images must be rejected or decoded, never panic.

use sketch_gateway::DEFAULT_SEED;
use sketch_gateway::buffer::ByteSource;
use sketch_gateway::codec::Encoding;
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
use test_log::test;

const ROUNDS: usize = 400;
const HEADER_BYTES: usize = 48;

type Decode = fn(&[u8]) -> bool;

/// Deterministic xorshift64 so failures reproduce.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }
}

fn binary<F: Facade>(facade: &F) -> Vec<u8> {
    facade.serialize(Encoding::Binary).unwrap().into_bytes()
}

fn theta(count: i64, lg_k: u8) -> ThetaFacade {
    let mut sketch = ThetaFacade::new(lg_k, DEFAULT_SEED, 1.0).unwrap();
    (0..count).for_each(|i| sketch.update_i64(i));
    sketch
}

fn tuple(count: i64) -> Vec<u8> {
    let mut sketch = TupleFacade::new(5, DEFAULT_SEED, 1.0, "SUM").unwrap();
    (0..count).for_each(|i| sketch.update_i64(i, i % 7));
    binary(&sketch.compact())
}

fn hll(count: i64, hll_type: HllType) -> Vec<u8> {
    let mut sketch = HllFacade::new(8, hll_type).unwrap();
    (0..count).for_each(|i| sketch.update_i64(i));
    binary(&sketch)
}

fn cpc(count: i64) -> Vec<u8> {
    let mut sketch = CpcFacade::new(8, DEFAULT_SEED).unwrap();
    (0..count).for_each(|i| sketch.update_i64(i));
    binary(&sketch)
}

fn kll(count: usize) -> Vec<u8> {
    let mut sketch = KllFacade::new(20).unwrap();
    (0..count).for_each(|i| sketch.update(i as f32));
    binary(&sketch)
}

fn req(count: usize, hra: bool) -> Vec<u8> {
    let mut sketch = ReqFacade::new(12, hra).unwrap();
    (0..count).for_each(|i| sketch.update(i as f32));
    binary(&sketch)
}

fn tdigest(count: usize) -> Vec<u8> {
    let mut sketch = TDigestFacade::new(20).unwrap();
    (0..count).for_each(|i| sketch.update(i as f64));
    binary(&sketch)
}

fn frequencies(count: usize) -> Vec<u8> {
    let mut sketch = FrequentStringsFacade::new(4).unwrap();
    for i in 0..count {
        sketch.update(&format!("item-{}", i % 40), 1 + i as i64 % 3).unwrap();
    }
    binary(&sketch)
}

fn images() -> Vec<(&'static str, Vec<u8>, Decode)> {
    let theta_decode: Decode =
        |b| CompactThetaFacade::deserialize(ByteSource::from(b), DEFAULT_SEED).is_ok();
    let tuple_decode: Decode =
        |b| CompactTupleFacade::deserialize(ByteSource::from(b), DEFAULT_SEED).is_ok();
    let hll_decode: Decode = |b| HllFacade::deserialize(ByteSource::from(b)).is_ok();
    let cpc_decode: Decode = |b| CpcFacade::deserialize(ByteSource::from(b), DEFAULT_SEED).is_ok();
    let kll_decode: Decode = |b| KllFacade::deserialize(ByteSource::from(b)).is_ok();
    let req_decode: Decode = |b| ReqFacade::deserialize(ByteSource::from(b)).is_ok();
    let tdigest_decode: Decode = |b| TDigestFacade::deserialize(ByteSource::from(b)).is_ok();
    let frequencies_decode: Decode =
        |b| FrequentStringsFacade::deserialize(ByteSource::from(b)).is_ok();

    let packed_theta = theta(300, 5).serialize(Encoding::BinaryCompressed).unwrap();
    vec![
        ("theta exact", binary(&theta(20, 5).compact()), theta_decode),
        ("theta estimation", binary(&theta(300, 5).compact()), theta_decode),
        ("theta packed", packed_theta.into_bytes(), theta_decode),
        ("tuple exact", tuple(20), tuple_decode),
        ("tuple estimation", tuple(300), tuple_decode),
        ("hll list", hll(5, HllType::Hll8), hll_decode),
        ("hll set", hll(40, HllType::Hll6), hll_decode),
        ("hll4", hll(3000, HllType::Hll4), hll_decode),
        ("hll6", hll(3000, HllType::Hll6), hll_decode),
        ("hll8", hll(3000, HllType::Hll8), hll_decode),
        ("cpc sparse", cpc(20), cpc_decode),
        ("cpc dense", cpc(2000), cpc_decode),
        ("kll", kll(1000), kll_decode),
        ("req", req(5000, false), req_decode),
        ("req hra", req(300, true), req_decode),
        ("tdigest", tdigest(1000), tdigest_decode),
        ("frequencies", frequencies(500), frequencies_decode),
    ]
}

#[test]
fn test_pristine_images_decode() {
    for (name, image, decode) in images() {
        assert!(decode(&image), "{name} image should decode");
    }
}

#[test]
fn test_truncated_images_never_panic() {
    for (name, image, decode) in images() {
        for len in 0..image.len() {
            // Only the outcome's absence of a panic matters here.
            let _ = decode(&image[..len]);
        }
        log::debug!("{name}: {} truncations survived", image.len());
    }
}

#[test]
fn test_mutated_images_never_panic() {
    let mut rng = Rng(0x9e37_79b9_7f4a_7c15);
    for (name, image, decode) in images() {
        let mut accepted = 0usize;
        for round in 0..ROUNDS {
            let mut bytes = image.clone();
            // Half of the rounds aim at the headers, where lengths and counts live.
            let span = if round % 2 == 0 {
                bytes.len().min(HEADER_BYTES)
            } else {
                bytes.len()
            };
            for _ in 0..1 + rng.below(4) {
                let at = rng.below(span);
                bytes[at] = rng.next() as u8;
            }
            if decode(&bytes) {
                accepted += 1;
            }
        }
        log::debug!("{name}: {accepted} of {ROUNDS} mutations decoded");
    }
}

#[test]
fn test_extreme_header_values_never_panic() {
    for (_, image, decode) in images() {
        for at in 0..image.len().min(HEADER_BYTES) {
            for value in [0x00, 0x01, 0x7f, 0x80, 0xff] {
                let mut bytes = image.clone();
                bytes[at] = value;
                let _ = decode(&bytes);
            }
        }
    }
}
