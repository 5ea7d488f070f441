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

//! Seeded MurmurHash3 (x64, 128-bit) and the 16-bit seed fingerprint.

/// Seed used when the caller does not choose one.
pub const DEFAULT_UPDATE_SEED: u64 = 9001;

/// Hash `data` with a 64-bit seed.
///
/// Seeds that fit in 32 bits hash exactly as the reference implementation
/// does; wider seeds fold their high half into the low half.
pub fn murmur3_128(data: &[u8], seed: u64) -> (u64, u64) {
    let folded = (seed ^ (seed >> 32)) as u32;
    mur3::murmurhash3_x64_128(data, folded)
}

/// Fingerprint of a seed stored in serialized images.
///
/// A zero fingerprint is reserved, so it is bumped to one.
pub fn compute_seed_hash(seed: u64) -> u16 {
    let (h1, _) = mur3::murmurhash3_x64_128(&seed.to_le_bytes(), 0);
    match (h1 & 0xFFFF) as u16 {
        0 => 1,
        hash => hash,
    }
}
