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

//! Frequent strings against images produced by the reference library.

use googletest::prelude::*;
use sketch_gateway::buffer::ByteSource;
use sketch_gateway::codec::Encoding;
use sketch_gateway::error::ErrorKind;
use sketch_gateway::facade::Facade;
use sketch_gateway::facade::FrequentStringsFacade;
use sketch_gateway::frequencies::Row;

// all with lg_max_map_size 5
// ["a", "b", "c"]
const FI_1: &str = "BAEKBQMAAAADAAAAAAAAAAMAAAAAAAAAAAAAAAAAAAABAAAAAAAAAAEAAAAAAAAAAQAAAAAAAAABAAAAYQEAAABiAQAAAGM=";
// ["a", "b", "a"]
const FI_2: &str = "BAEKBQMAAAACAAAAAAAAAAMAAAAAAAAAAAAAAAAAAAACAAAAAAAAAAEAAAAAAAAAAQAAAGEBAAAAYg==";
// merge of the two above
const FI_3: &str = "BAEKBQMAAAADAAAAAAAAAAYAAAAAAAAAAAAAAAAAAAADAAAAAAAAAAIAAAAAAAAAAQAAAAAAAAABAAAAYQEAAABiAQAAAGM=";
// ["a", "a", "c"]
const FI_BUILD: &str = "BAEKBQMAAAACAAAAAAAAAAMAAAAAAAAAAAAAAAAAAAACAAAAAAAAAAEAAAAAAAAAAQAAAGEBAAAAYw==";

fn frequent(text: &str) -> FrequentStringsFacade {
    FrequentStringsFacade::deserialize(ByteSource::base64(text)).unwrap()
}

fn row(item: &str, count: i64) -> Row {
    Row {
        item: item.to_string(),
        estimate: count,
        lower_bound: count,
        upper_bound: count,
    }
}

#[test]
fn test_reference_image_queries() {
    let sketch = frequent(FI_3);
    assert_that!(sketch.total_weight(), eq(6));
    assert_that!(sketch.num_active_items(), eq(3));
    assert_that!(sketch.estimate("a"), eq(3));
    assert_that!(sketch.estimate("missing"), eq(0));
    assert_that!(sketch.maximum_error(), eq(0));

    let rows = sketch.frequent_items("NO_FALSE_POSITIVES", 0).unwrap();
    assert_eq!(rows, vec![row("a", 3), row("b", 2), row("c", 1)]);
    let rows = sketch.frequent_items("NO_FALSE_NEGATIVES", 2).unwrap();
    assert_eq!(rows, vec![row("a", 3)]);

    let err = sketch.frequent_items("NO_FALSE_GUESSES", 0).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::InvalidArgument));
}

#[test]
fn test_reference_summary() {
    let expected = "### Frequent items sketch summary:
   lg cur map size  : 3
   lg max map size  : 5
   num active items : 3
   total weight     : 6
   max error        : 0
### End sketch summary
";
    assert_eq!(frequent(FI_3).debug_string(), expected);
}

#[test]
fn test_merge_matches_reference() {
    let mut merged = frequent(FI_1);
    merged.merge_source(ByteSource::base64(FI_2)).unwrap();
    let reference = frequent(FI_3);
    assert_that!(merged.total_weight(), eq(reference.total_weight()));
    assert_eq!(
        merged.frequent_items("NO_FALSE_POSITIVES", 0).unwrap(),
        reference.frequent_items("NO_FALSE_POSITIVES", 0).unwrap()
    );
}

#[test]
fn test_build_matches_reference() {
    let mut sketch = FrequentStringsFacade::new(5).unwrap();
    for item in ["a", "a", "c"] {
        sketch.update(item, 1).unwrap();
    }
    let encoded = sketch.serialize(Encoding::Base64).unwrap();
    let copy = FrequentStringsFacade::deserialize(ByteSource::from(&encoded)).unwrap();
    assert_eq!(
        copy.frequent_items("NO_FALSE_POSITIVES", 0).unwrap(),
        vec![row("a", 2), row("c", 1)]
    );
    // the reference image for the same stream carries the same contents
    let reference = frequent(FI_BUILD);
    assert_eq!(
        reference.frequent_items("NO_FALSE_POSITIVES", 0).unwrap(),
        vec![row("a", 2), row("c", 1)]
    );
}

#[test]
fn test_weighted_updates() {
    let mut sketch = FrequentStringsFacade::new(5).unwrap();
    sketch.update("a", 10).unwrap();
    sketch.update("a", 0).unwrap();
    assert_that!(sketch.estimate("a"), eq(10));
    let err = sketch.update("a", -1).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::InvalidArgument));
    assert_that!(sketch.total_weight(), eq(10));
}
