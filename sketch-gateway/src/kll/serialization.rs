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

//! Binary layout constants for KLL images.

pub(super) const SERIAL_VERSION_1: u8 = 1;
/// Single-item images drop the level table and min/max.
pub(super) const SERIAL_VERSION_2: u8 = 2;

pub(super) const PREAMBLE_INTS_SHORT: u8 = 2;
pub(super) const PREAMBLE_INTS_FULL: u8 = 5;

pub(super) const FLAG_EMPTY: u8 = 1 << 0;
pub(super) const FLAG_LEVEL_ZERO_SORTED: u8 = 1 << 1;
pub(super) const FLAG_SINGLE_ITEM: u8 = 1 << 2;

pub(super) const EMPTY_SIZE_BYTES: usize = 8;
pub(super) const DATA_START_SINGLE_ITEM: usize = 8;
pub(super) const DATA_START: usize = 20;
