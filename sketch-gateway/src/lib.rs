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

//! A byte-oriented gateway to streaming sketches.
//!
//! The gateway lets a host runtime build, update, merge, query and persist
//! probabilistic sketches through an opaque-reference boundary. Sketches cross
//! that boundary only as bytes (binary or base64, optionally compressed) and
//! are rebuilt into full objects on demand.
//!
//! Families:
//!
//! * [`theta`] and [`tuple`] for distinct counting with set operations
//! * [`hll`] and [`cpc`] for compact distinct counting
//! * [`kll`], [`req`] and [`tdigest`] for ranks and quantiles
//! * [`frequencies`] for heavy hitters over strings
//!
//! Rust callers go through [`facade`] and [`setops`]; foreign callers through
//! the `sg_*` functions of [`ffi`].
//!
//! # Example
//!
//! ```
//! use sketch_gateway::buffer::ByteSource;
//! use sketch_gateway::codec::Encoding;
//! use sketch_gateway::facade::CardinalityQuery;
//! use sketch_gateway::facade::CpcFacade;
//! use sketch_gateway::facade::Facade;
//!
//! let mut sketch = CpcFacade::new(11, sketch_gateway::DEFAULT_SEED).unwrap();
//! for i in 0..100 {
//!     sketch.update_str(&format!("user-{i}"));
//! }
//! let encoded = sketch.serialize(Encoding::Base64Compressed).unwrap();
//! let copy = CpcFacade::deserialize(ByteSource::from(&encoded), sketch_gateway::DEFAULT_SEED)
//!     .unwrap();
//! assert_eq!(copy.estimate(), sketch.estimate());
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod buffer;
pub mod codec;
pub mod common;
pub mod cpc;
pub mod error;
pub mod facade;
pub mod ffi;
pub mod frequencies;
pub mod hash;
pub mod hll;
pub mod kll;
pub mod policy;
pub mod req;
pub mod setops;
pub mod tdigest;
pub mod theta;
pub mod tuple;

/// Update seed used when the caller does not pick one.
pub const DEFAULT_SEED: u64 = hash::DEFAULT_UPDATE_SEED;
