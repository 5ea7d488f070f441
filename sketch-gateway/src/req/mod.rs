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

//! Relative Error Quantiles (REQ) sketch.
//!
//! REQ bounds the rank error relative to the distance from one end of the
//! rank domain, which makes it suited to tail latencies and other extreme
//! quantiles. Each level is a compactor split into sections; the number of
//! sections doubles as the level is compacted more often.

mod compactor;
mod sketch;

pub use self::sketch::ReqSketch;

/// Default value of parameter k.
pub const DEFAULT_K: u16 = 12;
/// Minimum value of parameter k.
pub const MIN_K: u16 = 4;
/// Maximum value of parameter k.
pub const MAX_K: u16 = 1024;

const INIT_NUM_SECTIONS: u8 = 3;
