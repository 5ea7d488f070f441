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

//! Binary codecs shared by every sketch family, plus the boundary encodings.

use std::borrow::Cow;
use std::io;
use std::io::Cursor;
use std::io::Read;

use byteorder::LE;
use byteorder::ReadBytesExt;

use crate::error::Error;

pub mod b64;
pub mod envelope;
pub mod family;

/// Little-endian writer for sketch images.
pub struct SketchBytes {
    bytes: Vec<u8>,
}

impl SketchBytes {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write(&mut self, buf: &[u8]) {
        self.bytes.extend_from_slice(buf);
    }

    pub fn write_u8(&mut self, n: u8) {
        self.bytes.push(n);
    }

    pub fn write_u16_le(&mut self, n: u16) {
        self.write(&n.to_le_bytes());
    }

    pub fn write_u32_le(&mut self, n: u32) {
        self.write(&n.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, n: u64) {
        self.write(&n.to_le_bytes());
    }

    pub fn write_i64_le(&mut self, n: i64) {
        self.write(&n.to_le_bytes());
    }

    pub fn write_f32_le(&mut self, n: f32) {
        self.write(&n.to_le_bytes());
    }

    pub fn write_f64_le(&mut self, n: f64) {
        self.write(&n.to_le_bytes());
    }
}

/// Cursor over a sketch image.
pub struct SketchSlice<'a> {
    slice: Cursor<&'a [u8]>,
}

impl<'a> SketchSlice<'a> {
    pub fn new(slice: &'a [u8]) -> SketchSlice<'a> {
        SketchSlice {
            slice: Cursor::new(slice),
        }
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        let len = self.slice.get_ref().len() as u64;
        len.saturating_sub(self.slice.position()) as usize
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.slice.read_exact(buf)
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        self.slice.read_u8()
    }

    pub fn read_u16_le(&mut self) -> io::Result<u16> {
        self.slice.read_u16::<LE>()
    }

    pub fn read_u32_le(&mut self) -> io::Result<u32> {
        self.slice.read_u32::<LE>()
    }

    pub fn read_u64_le(&mut self) -> io::Result<u64> {
        self.slice.read_u64::<LE>()
    }

    pub fn read_i64_le(&mut self) -> io::Result<i64> {
        self.slice.read_i64::<LE>()
    }

    pub fn read_f32_le(&mut self) -> io::Result<f32> {
        self.slice.read_f32::<LE>()
    }

    pub fn read_f64_le(&mut self) -> io::Result<f64> {
        self.slice.read_f64::<LE>()
    }
}

/// Maps a short read of the named field to a `CorruptFormat` error.
pub(crate) fn make_error(tag: &'static str) -> impl FnOnce(io::Error) -> Error {
    move |_| Error::insufficient_data(tag)
}

/// The four wire forms a sketch can be handed back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Binary,
    BinaryCompressed,
    Base64,
    Base64Compressed,
}

impl Encoding {
    /// All encodings, in declaration order.
    pub const ALL: [Encoding; 4] = [
        Encoding::Binary,
        Encoding::BinaryCompressed,
        Encoding::Base64,
        Encoding::Base64Compressed,
    ];

    /// Resolve a boundary encoding name such as `"base64-compressed"`.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "binary" => Ok(Encoding::Binary),
            "binary-compressed" => Ok(Encoding::BinaryCompressed),
            "base64" => Ok(Encoding::Base64),
            "base64-compressed" => Ok(Encoding::Base64Compressed),
            _ => Err(Error::invalid_argument(format!("unrecognized encoding {name:?}"))),
        }
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, Encoding::BinaryCompressed | Encoding::Base64Compressed)
    }

    pub fn is_text(self) -> bool {
        matches!(self, Encoding::Base64 | Encoding::Base64Compressed)
    }
}

/// A serialized sketch in the form the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoded {
    Bytes(Vec<u8>),
    Text(String),
}

impl Encoded {
    /// The raw payload; base64 text is returned as its ASCII bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Encoded::Bytes(bytes) => bytes,
            Encoded::Text(text) => text.into_bytes(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Encoded::Bytes(_) => None,
            Encoded::Text(text) => Some(text.as_str()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Encoded::Bytes(bytes) => bytes.as_slice(),
            Encoded::Text(text) => text.as_bytes(),
        }
    }
}

/// Wrap a binary sketch image in the requested encoding.
pub fn encode(image: Vec<u8>, encoding: Encoding) -> Result<Encoded, Error> {
    let image = if encoding.is_compressed() {
        envelope::seal(&image)?
    } else {
        image
    };
    Ok(encode_unsealed(image, encoding))
}

/// Wrap an image that its family already packed itself. Compressed encodings
/// skip the zstd envelope.
pub fn encode_unsealed(image: Vec<u8>, encoding: Encoding) -> Encoded {
    if encoding.is_text() {
        Encoded::Text(b64::encode(&image))
    } else {
        Encoded::Bytes(image)
    }
}

/// Strip a compression envelope if present, leaving the binary sketch image.
pub fn open_image(bytes: Cow<'_, [u8]>) -> Result<Cow<'_, [u8]>, Error> {
    if envelope::is_sealed(&bytes) {
        Ok(Cow::Owned(envelope::open(&bytes)?))
    } else {
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn test_slice_reads_little_endian() {
        let mut bytes = SketchBytes::with_capacity(16);
        bytes.write_u8(7);
        bytes.write_u16_le(0x93cc);
        bytes.write_u64_le(u64::MAX - 1);
        let bytes = bytes.into_bytes();

        let mut slice = SketchSlice::new(&bytes);
        assert_that!(slice.read_u8().unwrap(), eq(7));
        assert_that!(slice.read_u16_le().unwrap(), eq(0x93cc));
        assert_that!(slice.remaining(), eq(8));
        assert_that!(slice.read_u64_le().unwrap(), eq(u64::MAX - 1));
        assert!(slice.read_u8().is_err());
    }

    #[test]
    fn test_encoding_names() {
        assert_that!(
            Encoding::from_name("base64-compressed").unwrap(),
            eq(Encoding::Base64Compressed)
        );
        assert!(Encoding::from_name("Binary").is_err());
    }

    #[test]
    fn test_every_encoding_opens_to_the_same_image() {
        let image: Vec<u8> = (0..200u32).map(|i| (i % 7) as u8).collect();
        for encoding in Encoding::ALL {
            let encoded = encode(image.clone(), encoding).unwrap();
            let raw = match &encoded {
                Encoded::Text(text) => b64::decode(text).unwrap(),
                Encoded::Bytes(bytes) => bytes.clone(),
            };
            let opened = open_image(Cow::Owned(raw)).unwrap();
            assert_eq!(opened.as_ref(), image.as_slice());
        }
    }

    #[test]
    fn test_unsealed_encoding_keeps_image() {
        let image = vec![1u8, 4, 3, 63];
        let encoded = encode_unsealed(image.clone(), Encoding::BinaryCompressed);
        assert_eq!(encoded, Encoded::Bytes(image.clone()));
        let encoded = encode_unsealed(image, Encoding::Base64Compressed);
        assert_that!(encoded.as_text(), some(eq("AQQDPw==")));
    }
}
