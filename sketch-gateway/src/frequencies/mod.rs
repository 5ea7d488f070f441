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

//! Frequent items sketch over strings.
//!
//! Tracks approximate counts for heavy hitters in a weighted stream. The map
//! holds at most `0.75 * 2^lg_max_map_size` items; when it is full, the median
//! count of a sample is subtracted from every count and non-positive entries
//! are purged. The accumulated subtraction is the sketch's maximum error.
//!
//! # Usage
//!
//! ```rust
//! # use sketch_gateway::frequencies::ErrorType;
//! # use sketch_gateway::frequencies::FrequentStringsSketch;
//! let mut sketch = FrequentStringsSketch::new(5);
//! sketch.update_with_count("apple", 3);
//! sketch.update("pear");
//! assert_eq!(sketch.estimate("apple"), 3);
//! let rows = sketch.frequent_items(ErrorType::NoFalsePositives, 0);
//! assert_eq!(rows[0].item, "apple");
//! ```

mod reverse_purge_item_hash_map;
mod serialization;
mod sketch;

pub use self::sketch::ErrorType;
pub use self::sketch::FrequentStringsSketch;
pub use self::sketch::Row;

/// Smallest accepted `lg_max_map_size`.
pub const MIN_LG_MAX_MAP_SIZE: u8 = 3;
/// Largest accepted `lg_max_map_size`.
pub const MAX_LG_MAX_MAP_SIZE: u8 = 26;
