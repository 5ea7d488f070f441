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

//! Base64 text form of sketch images (standard alphabet, padded).

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

use crate::error::Error;

/// Number of characters needed to encode `len` bytes.
pub fn encoded_len(len: usize) -> Option<usize> {
    base64::encoded_len(len, true)
}

/// Upper bound on the decoded size of `len` characters.
pub fn decoded_len_estimate(len: usize) -> usize {
    base64::decoded_len_estimate(len)
}

pub fn encode(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(encoded_len(bytes.len()).unwrap_or_default());
    B64.encode_string(bytes, &mut text);
    text
}

pub fn decode(text: &str) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::with_capacity(decoded_len_estimate(text.len()));
    B64.decode_vec(text.trim_end(), &mut bytes).map_err(|err| {
        Error::decode("invalid base64 text")
            .with_context("length", text.len())
            .set_source(err)
    })?;
    Ok(bytes)
}
