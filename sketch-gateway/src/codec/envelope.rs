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

//! Compression envelope for the compressed encodings.
//!
//! A sealed image is a single zstd frame. Sketch images start with a small
//! preamble count followed by a small serial version, so the zstd magic never
//! opens an uncompressed image and deserializers can sniff it.

use crate::error::Error;

/// Little-endian zstd frame magic number.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Hard cap on the decompressed size of a sealed image.
pub const MAX_OPENED_LEN: usize = 1 << 31;

pub fn is_sealed(bytes: &[u8]) -> bool {
    bytes.starts_with(&ZSTD_MAGIC)
}

pub fn seal(image: &[u8]) -> Result<Vec<u8>, Error> {
    zstd::bulk::compress(image, zstd::DEFAULT_COMPRESSION_LEVEL)
        .map_err(|err| Error::invalid_argument("failed to compress sketch image").set_source(err))
}

pub fn open(sealed: &[u8]) -> Result<Vec<u8>, Error> {
    let capacity = match zstd::zstd_safe::get_frame_content_size(sealed) {
        Ok(Some(size)) if size as usize <= MAX_OPENED_LEN => size as usize,
        Ok(Some(size)) => {
            return Err(Error::corrupt("compressed sketch image is implausibly large")
                .with_context("content_size", size));
        }
        _ => return Err(Error::corrupt("compressed sketch image has no content size")),
    };
    zstd::bulk::decompress(sealed, capacity)
        .map_err(|err| Error::corrupt("failed to decompress sketch image").set_source(err))
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_seal_then_open() {
        let image = vec![3u8; 4096];
        let sealed = seal(&image).unwrap();
        assert!(is_sealed(&sealed));
        assert_that!(sealed.len(), lt(image.len()));
        assert_eq!(open(&sealed).unwrap(), image);
    }

    #[test]
    fn test_truncated_frame_is_corrupt() {
        let sealed = seal(&[1u8; 512]).unwrap();
        let err = open(&sealed[..sealed.len() - 3]).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::CorruptFormat));
    }
}
