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
use super::check_in_range;
use crate::buffer::ByteSource;
use crate::codec::family::Family;
use crate::error::Error;
use crate::frequencies::ErrorType;
use crate::frequencies::FrequentStringsSketch;
use crate::frequencies::MAX_LG_MAX_MAP_SIZE;
use crate::frequencies::MIN_LG_MAX_MAP_SIZE;
use crate::frequencies::Row;

/// Heavy hitters over weighted string items.
#[derive(Debug, Clone)]
pub struct FrequentStringsFacade {
    sketch: FrequentStringsSketch,
}

impl FrequentStringsFacade {
    /// # Errors
    ///
    /// `InvalidArgument` unless `lg_max_map_size` is in `3..=26`.
    pub fn new(lg_max_map_size: u8) -> Result<Self, Error> {
        check_in_range(
            "lg_max_map_size",
            lg_max_map_size,
            MIN_LG_MAX_MAP_SIZE..=MAX_LG_MAX_MAP_SIZE,
        )?;
        debug!("creating frequent strings sketch lg_max_map_size={lg_max_map_size}");
        Ok(Self {
            sketch: FrequentStringsSketch::new(lg_max_map_size),
        })
    }

    pub fn deserialize(source: ByteSource<'_>) -> Result<Self, Error> {
        let image = source.resolve_image()?;
        let sketch = FrequentStringsSketch::deserialize(&image)?;
        Ok(Self { sketch })
    }

    pub fn sketch(&self) -> &FrequentStringsSketch {
        &self.sketch
    }

    pub fn is_empty(&self) -> bool {
        self.sketch.is_empty()
    }

    /// Adds `weight` occurrences of `item`. A zero weight is ignored.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a negative weight.
    pub fn update(&mut self, item: &str, weight: i64) -> Result<(), Error> {
        if weight < 0 {
            return Err(Error::invalid_argument("weight may not be negative")
                .with_context("weight", weight));
        }
        self.sketch.update_with_count(item, weight);
        Ok(())
    }

    pub fn merge(&mut self, other: &FrequentStringsFacade) {
        debug!(
            "merging frequent strings sketch weight={} into weight={}",
            other.sketch.total_weight(),
            self.sketch.total_weight()
        );
        self.sketch.merge(&other.sketch);
    }

    pub fn merge_source(&mut self, source: ByteSource<'_>) -> Result<(), Error> {
        let other = FrequentStringsFacade::deserialize(source)?;
        self.merge(&other);
        Ok(())
    }

    pub fn estimate(&self, item: &str) -> i64 {
        self.sketch.estimate(item)
    }

    pub fn lower_bound(&self, item: &str) -> i64 {
        self.sketch.lower_bound(item)
    }

    pub fn upper_bound(&self, item: &str) -> i64 {
        self.sketch.upper_bound(item)
    }

    pub fn maximum_error(&self) -> i64 {
        self.sketch.maximum_error()
    }

    pub fn epsilon(&self) -> f64 {
        self.sketch.epsilon()
    }

    pub fn total_weight(&self) -> i64 {
        self.sketch.total_weight()
    }

    pub fn num_active_items(&self) -> usize {
        self.sketch.num_active_items()
    }

    /// Items above `threshold` by the named error type, heaviest first.
    ///
    /// `error_type_name` is `"NO_FALSE_POSITIVES"` or `"NO_FALSE_NEGATIVES"`.
    /// A threshold of 0 means the sketch's maximum error.
    pub fn frequent_items(&self, error_type_name: &str, threshold: i64) -> Result<Vec<Row>, Error> {
        let error_type = ErrorType::from_name(error_type_name)?;
        Ok(self.sketch.frequent_items(error_type, threshold))
    }
}

impl Facade for FrequentStringsFacade {
    const FAMILY: Family = Family::FREQUENCY;

    fn to_bytes(&self) -> Vec<u8> {
        self.sketch.serialize()
    }

    fn debug_string(&self) -> String {
        self.sketch.to_string()
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;
    use crate::codec::Encoding;
    use crate::error::ErrorKind;

    #[test]
    fn test_update_validates_weight() {
        let mut facade = FrequentStringsFacade::new(5).unwrap();
        let err = facade.update("a", -1).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::InvalidArgument));
        facade.update("a", 0).unwrap();
        assert!(facade.is_empty());
        assert!(FrequentStringsFacade::new(2).is_err());
        assert!(FrequentStringsFacade::new(27).is_err());
    }

    #[test]
    fn test_frequent_items_by_name() {
        let mut facade = FrequentStringsFacade::new(5).unwrap();
        facade.update("a", 2).unwrap();
        facade.update("c", 1).unwrap();
        let rows = facade.frequent_items("NO_FALSE_POSITIVES", 0).unwrap();
        let items: Vec<&str> = rows.iter().map(|r| r.item.as_str()).collect();
        assert_eq!(items, vec!["a", "c"]);
        let rows = facade.frequent_items("NO_FALSE_NEGATIVES", 1).unwrap();
        assert_that!(rows.len(), eq(1));
        let err = facade.frequent_items("NO_FALSE", 0).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::InvalidArgument));
    }

    #[test]
    fn test_merge_source_all_encodings() {
        let mut source = FrequentStringsFacade::new(5).unwrap();
        source.update("a", 2).unwrap();
        source.update("c", 1).unwrap();
        for encoding in Encoding::ALL {
            let encoded = source.serialize(encoding).unwrap();
            let mut target = source.clone();
            target.merge_source(ByteSource::from(&encoded)).unwrap();
            assert_that!(target.estimate("a"), eq(4));
            assert_that!(target.estimate("c"), eq(2));
            assert_that!(target.total_weight(), eq(6));
        }
    }
}
