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

//! Normalizes the byte inputs a boundary call can carry into one read-only span.
//!
//! Four shapes are admitted: bytes the gateway owns or borrows, base64 text,
//! a raw memory region handed over as pointer and length, and a foreign byte
//! container. Everything except base64 resolves without copying.

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

use crate::codec;
use crate::codec::b64;
use crate::error::Error;

/// Largest raw region the resolver accepts.
pub const MAX_REGION_LEN: usize = 1 << 31;

/// Caller-managed memory identified by pointer and length.
///
/// The resolver checks the pointer for null and the length for plausibility.
/// It cannot check that the memory is actually readable.
#[derive(Clone, Copy)]
pub struct RawRegion<'a> {
    ptr: *const u8,
    len: usize,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> RawRegion<'a> {
    /// Describe a caller-owned memory region.
    ///
    /// # Safety
    ///
    /// When `ptr` is non-null and `len` is in `1..=MAX_REGION_LEN`, the caller
    /// guarantees that `len` bytes starting at `ptr` are initialized, readable,
    /// and not mutated for the lifetime `'a`. Null pointers and bad lengths are
    /// rejected by [`ByteSource::resolve`] and need no guarantee.
    #[allow(unsafe_code)]
    pub unsafe fn new(ptr: *const u8, len: usize) -> Self {
        RawRegion {
            ptr,
            len,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[allow(unsafe_code)]
    fn as_slice(&self) -> Result<&'a [u8], Error> {
        if self.ptr.is_null() {
            return Err(Error::out_of_range("memory region pointer is null"));
        }
        if self.len == 0 || self.len > MAX_REGION_LEN {
            return Err(Error::out_of_range("memory region length is zero or implausible")
                .with_context("len", self.len)
                .with_context("max", MAX_REGION_LEN));
        }
        // SAFETY: pointer and length were checked above; readability for 'a is
        // the contract of `RawRegion::new`.
        Ok(unsafe { std::slice::from_raw_parts(self.ptr, self.len) })
    }
}

impl fmt::Debug for RawRegion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRegion")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// Sketch bytes as they arrive at the boundary.
pub enum ByteSource<'a> {
    /// Bytes handed over to the gateway.
    Owned(Vec<u8>),
    /// Bytes borrowed for the duration of the call.
    Borrowed(&'a [u8]),
    /// Base64 text of a sketch image.
    Base64(&'a str),
    /// A caller-managed memory region.
    Raw(RawRegion<'a>),
    /// A byte container owned by the host runtime.
    Foreign(&'a dyn AsRef<[u8]>),
}

impl<'a> ByteSource<'a> {
    pub fn base64(text: &'a str) -> Self {
        ByteSource::Base64(text)
    }

    pub fn foreign(container: &'a dyn AsRef<[u8]>) -> Self {
        ByteSource::Foreign(container)
    }

    /// Produce the canonical byte span for this input.
    pub fn resolve(self) -> Result<Cow<'a, [u8]>, Error> {
        match self {
            ByteSource::Owned(bytes) => Ok(Cow::Owned(bytes)),
            ByteSource::Borrowed(bytes) => Ok(Cow::Borrowed(bytes)),
            ByteSource::Base64(text) => b64::decode(text).map(Cow::Owned),
            ByteSource::Raw(region) => region.as_slice().map(Cow::Borrowed),
            ByteSource::Foreign(container) => Ok(Cow::Borrowed(container.as_ref())),
        }
    }

    /// Resolve and strip any compression envelope, yielding a binary sketch image.
    pub fn resolve_image(self) -> Result<Cow<'a, [u8]>, Error> {
        codec::open_image(self.resolve()?)
    }
}

impl fmt::Debug for ByteSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteSource::Owned(bytes) => write!(f, "Owned({} bytes)", bytes.len()),
            ByteSource::Borrowed(bytes) => write!(f, "Borrowed({} bytes)", bytes.len()),
            ByteSource::Base64(text) => write!(f, "Base64({} chars)", text.len()),
            ByteSource::Raw(region) => write!(f, "{region:?}"),
            ByteSource::Foreign(container) => {
                write!(f, "Foreign({} bytes)", container.as_ref().len())
            }
        }
    }
}

impl From<Vec<u8>> for ByteSource<'_> {
    fn from(bytes: Vec<u8>) -> Self {
        ByteSource::Owned(bytes)
    }
}

impl<'a> From<&'a [u8]> for ByteSource<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        ByteSource::Borrowed(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for ByteSource<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        ByteSource::Borrowed(bytes.as_slice())
    }
}

impl<'a> From<&'a codec::Encoded> for ByteSource<'a> {
    fn from(encoded: &'a codec::Encoded) -> Self {
        match encoded {
            codec::Encoded::Bytes(bytes) => ByteSource::Borrowed(bytes.as_slice()),
            codec::Encoded::Text(text) => ByteSource::Base64(text.as_str()),
        }
    }
}
