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

//! Quantile families against images produced by the reference library.

use googletest::prelude::*;
use sketch_gateway::buffer::ByteSource;
use sketch_gateway::codec::Encoding;
use sketch_gateway::error::ErrorKind;
use sketch_gateway::facade::Facade;
use sketch_gateway::facade::KllFacade;
use sketch_gateway::facade::QuantileQuery;
use sketch_gateway::facade::ReqFacade;
use sketch_gateway::facade::TDigestFacade;

// values 1..=10, 11..=20, and the merge of both, k = 200
const KLL_1: &str = "BQEPAMgACAAKAAAAAAAAAMgAAQC+AAAAAACAPwAAIEEAACBBAAAQQQAAAEEAAOBAAADAQAAAoEAAAIBAAABAQAAAAEAAAIA/";
const KLL_2: &str = "BQEPAMgACAAKAAAAAAAAAMgAAQC+AAAAAAAwQQAAoEEAAKBBAACYQQAAkEEAAIhBAACAQQAAcEEAAGBBAABQQQAAQEEAADBB";
const KLL_3: &str = "BQEPAMgACAAUAAAAAAAAAMgAAQC0AAAAAACAPwAAoEEAADBBAABAQQAAUEEAAGBBAABwQQAAgEEAAIhBAACQQQAAmEEAAKBBAACAPwAAAEAAAEBAAACAQAAAoEAAAMBAAADgQAAAAEEAABBBAAAgQQ==";

// values 1..=10 and 11..=20 with k = 12 and high rank accuracy, then merged
const REQ_1: &str = "AgERCAwAAQAAAAAAAAAAAAAAQEEAAwAACgAAAAAAIEEAABBBAAAAQQAA4EAAAMBAAACgQAAAgEAAAEBAAAAAQAAAgD8=";
const REQ_2: &str = "AgERCAwAAQAAAAAAAAAAAAAAQEEAAwAACgAAAAAAoEEAAJhBAACQQQAAiEEAAIBBAABwQQAAYEEAAFBBAABAQQAAMEE=";
const REQ_3: &str = "AgERKAwAAQAAAAAAAAAAAAAAQEEAAwAAFAAAAAAAgD8AAABAAABAQAAAgEAAAKBAAADAQAAA4EAAAABBAAAQQQAAIEEAADBBAABAQQAAUEEAAGBBAABwQQAAgEEAAIhBAACQQQAAmEEAAKBB";
// values 1..=10 with k = 10 and low rank accuracy
const REQ_4: &str = "AgERAAoAAQAAAAAAAAAAAAAAIEEAAwAACgAAAAAAgD8AAABAAABAQAAAgEAAAKBAAADAQAAA4EAAAABBAAAQQQAAIEE=";

// values 1..=10 and 11..=20 with k = 200
const TD_1: &str = "AgEUyAAEAAAKAAAAAAAAAAAAAAAAAPA/AAAAAAAAJEAAAAAAAADwPwEAAAAAAAAAAAAAAAAAAEABAAAAAAAAAAAAAAAAAAhAAQAAAAAAAAAAAAAAAAAQQAEAAAAAAAAAAAAAAAAAFEABAAAAAAAAAAAAAAAAABhAAQAAAAAAAAAAAAAAAAAcQAEAAAAAAAAAAAAAAAAAIEABAAAAAAAAAAAAAAAAACJAAQAAAAAAAAAAAAAAAAAkQAEAAAAAAAAA";
const TD_2: &str = "AgEUyAAEAAAKAAAAAAAAAAAAAAAAACZAAAAAAAAANEAAAAAAAAAmQAEAAAAAAAAAAAAAAAAAKEABAAAAAAAAAAAAAAAAACpAAQAAAAAAAAAAAAAAAAAsQAEAAAAAAAAAAAAAAAAALkABAAAAAAAAAAAAAAAAADBAAQAAAAAAAAAAAAAAAAAxQAEAAAAAAAAAAAAAAAAAMkABAAAAAAAAAAAAAAAAADNAAQAAAAAAAAAAAAAAAAA0QAEAAAAAAAAA";

fn kll(text: &str) -> KllFacade {
    KllFacade::deserialize(ByteSource::base64(text)).unwrap()
}

fn req(text: &str) -> ReqFacade {
    ReqFacade::deserialize(ByteSource::base64(text)).unwrap()
}

fn tdigest(text: &str) -> TDigestFacade {
    TDigestFacade::deserialize(ByteSource::base64(text)).unwrap()
}

#[test]
fn test_kll_reference_queries() {
    let sketch = kll(KLL_3);
    assert_that!(sketch.k(), eq(200));
    assert_that!(sketch.n(), eq(20));
    assert_that!(sketch.num_retained(), eq(20));
    assert_that!(sketch.rank(10.0, true).unwrap(), eq(0.5));
    assert_that!(sketch.quantile(0.5, true).unwrap(), eq(10.0));
    assert_that!(sketch.min_item().unwrap(), eq(1.0));
    assert_that!(sketch.max_item().unwrap(), eq(20.0));
    assert_that!(
        sketch.normalized_rank_error(true),
        near(0.01651561908528982, 1e-12)
    );
    assert_eq!(sketch.pmf(&[10.0], true).unwrap(), vec![0.5, 0.5]);
    assert_eq!(sketch.cdf(&[10.0], true).unwrap(), vec![0.5, 1.0]);
}

#[test]
fn test_kll_reference_summary() {
    let text = kll(KLL_3).debug_string();
    let expected = "### KLL sketch summary:
   K              : 200
   min K          : 200
   M              : 8
   N              : 20
   Epsilon        : 1.33%
   Epsilon PMF    : 1.65%
   Empty          : false
   Estimation mode: false
   Levels         : 1
   Sorted         : false
   Capacity items : 200
   Retained items : 20
   Min item      : 1
   Max item      : 20
### End sketch summary
";
    assert_eq!(text, expected);
}

#[test]
fn test_kll_merge_matches_reference() {
    let mut merged = kll(KLL_1);
    merged.merge_source(ByteSource::base64(KLL_2)).unwrap();
    let reference = kll(KLL_3);
    assert_that!(merged.n(), eq(reference.n()));
    for rank in [0.0, 0.1, 0.25, 0.5, 0.75, 1.0] {
        assert_that!(
            merged.quantile(rank, true).unwrap(),
            eq(reference.quantile(rank, true).unwrap())
        );
    }
}

#[test]
fn test_kll_kolmogorov_smirnov() {
    let (a, b) = (kll(KLL_1), kll(KLL_2));
    assert!(!KllFacade::kolmogorov_smirnov(&a, &a, 0.05).unwrap());
    assert!(KllFacade::kolmogorov_smirnov(&a, &b, 0.05).unwrap());

    let empty = KllFacade::new(200).unwrap();
    let err = KllFacade::kolmogorov_smirnov(&a, &empty, 0.05).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::EmptySketch));
}

#[test]
fn test_req_reference_queries() {
    let sketch = req(REQ_3);
    assert_that!(sketch.k(), eq(12));
    assert!(sketch.is_hra());
    assert_that!(sketch.n(), eq(20));
    assert_that!(sketch.num_retained(), eq(20));
    assert_that!(sketch.rank(10.0, true).unwrap(), eq(0.5));
    assert_that!(sketch.quantile(0.5, true).unwrap(), eq(10.0));
    assert_that!(sketch.min_item().unwrap(), eq(1.0));
    assert_that!(sketch.max_item().unwrap(), eq(20.0));
    assert_eq!(sketch.pmf(&[10.0], true).unwrap(), vec![0.5, 0.5]);
    assert_eq!(sketch.cdf(&[10.0], true).unwrap(), vec![0.5, 1.0]);
    // exact mode bounds collapse onto the rank
    assert_that!(sketch.rank_lower_bound(0.95, 2).unwrap(), eq(0.95));
    assert_that!(sketch.rank_upper_bound(0.95, 2).unwrap(), eq(0.95));

    let text = sketch.debug_string();
    assert_that!(text.as_str(), starts_with("### REQ sketch summary:"));
    assert_that!(text.as_str(), contains_substring("High Rank Acc  : true"));
    assert_that!(text.as_str(), contains_substring("Retained items : 20"));
}

#[test]
fn test_req_merge_and_accuracy_mismatch() {
    let mut merged = req(REQ_1);
    merged.merge_source(ByteSource::base64(REQ_2)).unwrap();
    assert_that!(merged.n(), eq(20));
    assert_that!(merged.quantile(0.5, true).unwrap(), eq(10.0));

    let low_accuracy = req(REQ_4);
    assert!(!low_accuracy.is_hra());
    let err = merged.merge(&low_accuracy).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::IncompatibleOperands));
    assert_that!(merged.n(), eq(20));
}

#[test]
fn test_tdigest_reference_queries() {
    let mut merged = tdigest(TD_1);
    merged.merge_source(ByteSource::base64(TD_2)).unwrap();
    assert_that!(merged.k(), eq(200));
    assert_that!(merged.total_weight(), eq(20));
    assert_that!(merged.rank(10.0, true).unwrap(), near(0.475, 1e-12));
    assert_that!(merged.quantile(0.5, true).unwrap(), eq(11.0));
    assert_that!(merged.min_item().unwrap(), eq(1.0));
    assert_that!(merged.max_item().unwrap(), eq(20.0));

    let text = merged.debug_string();
    assert_that!(text.as_str(), starts_with("### t-Digest summary:"));
    assert_that!(text.as_str(), contains_substring("Total Weight       : 20"));
}

#[test]
fn test_empty_quantile_sketches() {
    let kll = KllFacade::new(200).unwrap();
    assert_that!(kll.rank(1.0, true).unwrap(), eq(0.0));
    assert_that!(kll.quantile(0.5, true).unwrap_err().kind(), eq(ErrorKind::EmptySketch));
    assert!(kll.pmf(&[1.0], true).unwrap().is_empty());

    let req = ReqFacade::new(12, true).unwrap();
    assert_that!(req.min_item().unwrap_err().kind(), eq(ErrorKind::EmptySketch));

    let digest = TDigestFacade::new(200).unwrap();
    assert_that!(digest.max_item().unwrap_err().kind(), eq(ErrorKind::EmptySketch));
    let encoded = digest.serialize(Encoding::Base64).unwrap();
    let copy = TDigestFacade::deserialize(ByteSource::from(&encoded)).unwrap();
    assert!(copy.is_empty());
}
