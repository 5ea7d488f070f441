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

//! C ABI of the gateway.
//!
//! Sketches are handed out as opaque `SketchHandle` pointers and must be
//! returned to [`sg_sketch_release`]. Buffers and strings produced here have
//! their own release functions. Every entry point returns a status code:
//!
//! | Code | Meaning |
//! |-|-|
//! | 0 | Success |
//! | EINVAL | invalid argument, unsupported operation, or a panic |
//! | EFAULT | a required pointer is null |
//! | EIO | any other failure (corrupt image, seed mismatch, ...) |
//!
//! On failure, a reference to the error is written through `error_out` when
//! it is non-null, and must be released with [`sg_error_release`]. On
//! success `error_out` receives 0. Results are only written on success.

use std::ffi::CStr;
use std::ffi::CString;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::ptr;
use std::ptr::NonNull;

use libc::EFAULT;
use libc::EINVAL;
use libc::EIO;
use libc::c_char;
use libc::c_int;
use libc::size_t;
use ::log::debug;
use ::log::error;

use crate::buffer::ByteSource;
use crate::buffer::RawRegion;
use crate::codec::Encoding;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::facade::CpcFacade;
use crate::facade::FrequentStringsFacade;
use crate::facade::HllFacade;
use crate::facade::KllFacade;
use crate::facade::ReqFacade;
use crate::facade::TDigestFacade;
use crate::facade::ThetaFacade;
use crate::facade::TupleFacade;
use crate::hll::HllType;
use crate::policy::Policy;

pub mod errors;
pub mod handle;
pub mod log;

pub use self::handle::SketchHandle;

/// Bytes owned by the gateway. Release with [`sg_buffer_release`].
#[repr(C)]
#[derive(Debug)]
pub struct SgBuffer {
    pub data: *mut u8,
    pub len: size_t,
}

impl SgBuffer {
    fn from_vec(bytes: Vec<u8>) -> Self {
        let boxed = bytes.into_boxed_slice();
        let len = boxed.len();
        SgBuffer {
            data: Box::into_raw(boxed).cast::<u8>(),
            len,
        }
    }
}

enum Failure {
    Null(&'static str),
    Sketch(Error),
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Failure::Sketch(error)
    }
}

fn status_of(kind: ErrorKind) -> c_int {
    match kind {
        ErrorKind::InvalidArgument => EINVAL,
        _ => EIO,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Runs `body` with logging configured and panics contained, and reports the
/// outcome as a status code and error reference.
#[allow(unsafe_code)]
fn guarded(
    entry: &'static str,
    error_out: *mut u64,
    body: impl FnOnce() -> Result<(), Failure>,
) -> c_int {
    log::maybe_cfg_log();
    let (code, failure) = match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => (0, None),
        Ok(Err(Failure::Null(what))) => {
            error!("{entry}: {what} pointer is null");
            let failure = Error::invalid_argument(format!("{what} pointer is null"))
                .with_context("entry", entry);
            (EFAULT, Some(failure))
        }
        Ok(Err(Failure::Sketch(failure))) => {
            error!("{entry} failed: {failure}");
            (status_of(failure.kind()), Some(failure))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("{entry} panicked: {message}");
            let failure = Error::invalid_argument(format!("panic: {message}"))
                .with_context("entry", entry);
            (EINVAL, Some(failure))
        }
    };
    if !error_out.is_null() {
        let error_ref = failure.map_or(0, errors::register);
        // SAFETY: non-null, and the caller provides a writable u64.
        unsafe { error_out.write(error_ref) };
    }
    code
}

fn out_ptr<T>(ptr: *mut T, what: &'static str) -> Result<NonNull<T>, Failure> {
    NonNull::new(ptr).ok_or(Failure::Null(what))
}

/// # Safety
///
/// `out` must be valid for writes of `T`.
#[allow(unsafe_code)]
unsafe fn publish<T>(out: NonNull<T>, value: T) {
    // SAFETY: guaranteed by the caller.
    unsafe { out.as_ptr().write(value) }
}

/// # Safety
///
/// A non-null `ptr` must come from this module and not be released yet.
#[allow(unsafe_code)]
unsafe fn handle_ref<'a>(ptr: *const SketchHandle) -> Result<&'a SketchHandle, Failure> {
    // SAFETY: guaranteed by the caller.
    unsafe { ptr.as_ref() }.ok_or(Failure::Null("sketch"))
}

/// # Safety
///
/// As [`handle_ref`], and no other reference to the handle may be live.
#[allow(unsafe_code)]
unsafe fn handle_mut<'a>(ptr: *mut SketchHandle) -> Result<&'a mut SketchHandle, Failure> {
    // SAFETY: guaranteed by the caller.
    unsafe { ptr.as_mut() }.ok_or(Failure::Null("sketch"))
}

/// A length-delimited UTF-8 argument. A zero length admits a null pointer.
///
/// # Safety
///
/// A non-null `data` must be readable for `len` bytes.
#[allow(unsafe_code)]
unsafe fn str_arg<'a>(
    data: *const u8,
    len: size_t,
    what: &'static str,
) -> Result<&'a str, Failure> {
    if len == 0 {
        return Ok("");
    }
    if data.is_null() {
        return Err(Failure::Null(what));
    }
    // SAFETY: guaranteed by the caller.
    let bytes = unsafe { std::slice::from_raw_parts(data, len) };
    std::str::from_utf8(bytes).map_err(|err| {
        Failure::Sketch(
            Error::invalid_argument(format!("{what} is not valid UTF-8")).set_source(err),
        )
    })
}

/// A NUL-terminated UTF-8 argument, `None` when the pointer is null.
///
/// # Safety
///
/// A non-null `ptr` must point at a NUL-terminated string.
#[allow(unsafe_code)]
unsafe fn c_str_arg<'a>(
    ptr: *const c_char,
    what: &'static str,
) -> Result<Option<&'a str>, Failure> {
    if ptr.is_null() {
        return Ok(None);
    }
    // SAFETY: guaranteed by the caller.
    let text = unsafe { CStr::from_ptr(ptr) };
    text.to_str().map(Some).map_err(|err| {
        Failure::Sketch(
            Error::invalid_argument(format!("{what} is not valid UTF-8")).set_source(err),
        )
    })
}

fn into_c_string(text: String) -> *mut c_char {
    CString::new(text.replace('\0', ""))
        .unwrap_or_default()
        .into_raw()
}

/// # Safety
///
/// `out` must be valid for writes.
#[allow(unsafe_code)]
unsafe fn publish_handle(out: NonNull<*mut SketchHandle>, handle: SketchHandle) {
    let family = handle.family();
    let raw = Box::into_raw(Box::new(handle));
    debug!("{} sketch allocated @ {raw:p}", family.name);
    // SAFETY: guaranteed by the caller.
    unsafe { publish(out, raw) }
}

#[allow(unsafe_code)]
fn construct(
    entry: &'static str,
    out: *mut *mut SketchHandle,
    error_out: *mut u64,
    build: impl FnOnce() -> Result<SketchHandle, Error>,
) -> c_int {
    guarded(entry, error_out, || {
        let out = out_ptr(out, "out")?;
        let handle = build()?;
        // SAFETY: `out` is non-null and the caller provides a writable slot.
        unsafe { publish_handle(out, handle) };
        Ok(())
    })
}

/// Creates an update theta sketch.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_theta_new(
    lg_k: u8,
    seed: u64,
    sampling_probability: f32,
    out: *mut *mut SketchHandle,
    error_out: *mut u64,
) -> c_int {
    construct("sg_theta_new", out, error_out, || {
        ThetaFacade::new(lg_k, seed, sampling_probability).map(SketchHandle::Theta)
    })
}

/// Creates an update tuple sketch with integer summaries.
///
/// `policy` is a NUL-terminated policy name; null selects `SUM`.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_tuple_new(
    lg_k: u8,
    seed: u64,
    sampling_probability: f32,
    policy: *const c_char,
    out: *mut *mut SketchHandle,
    error_out: *mut u64,
) -> c_int {
    guarded("sg_tuple_new", error_out, || {
        let out = out_ptr(out, "out")?;
        // SAFETY: a non-null policy is a C string by contract.
        let policy = unsafe { c_str_arg(policy, "policy") }?.unwrap_or("");
        let tuple = TupleFacade::new(lg_k, seed, sampling_probability, policy)?;
        // SAFETY: `out` is non-null.
        unsafe { publish_handle(out, SketchHandle::Tuple(tuple)) };
        Ok(())
    })
}

/// Creates an HLL sketch. `hll_type` is 0 (HLL_4), 1 (HLL_6) or 2 (HLL_8).
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_hll_new(
    lg_k: u8,
    hll_type: u8,
    out: *mut *mut SketchHandle,
    error_out: *mut u64,
) -> c_int {
    construct("sg_hll_new", out, error_out, || {
        HllFacade::new(lg_k, HllType::try_from(hll_type)?).map(SketchHandle::Hll)
    })
}

#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_cpc_new(
    lg_k: u8,
    seed: u64,
    out: *mut *mut SketchHandle,
    error_out: *mut u64,
) -> c_int {
    construct("sg_cpc_new", out, error_out, || {
        CpcFacade::new(lg_k, seed).map(SketchHandle::Cpc)
    })
}

#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_kll_new(k: u16, out: *mut *mut SketchHandle, error_out: *mut u64) -> c_int {
    construct("sg_kll_new", out, error_out, || {
        KllFacade::new(k).map(SketchHandle::Kll)
    })
}

/// Creates a REQ sketch. `hra` selects high-rank accuracy.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_req_new(
    k: u16,
    hra: bool,
    out: *mut *mut SketchHandle,
    error_out: *mut u64,
) -> c_int {
    construct("sg_req_new", out, error_out, || {
        ReqFacade::new(k, hra).map(SketchHandle::Req)
    })
}

#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_tdigest_new(
    k: u16,
    out: *mut *mut SketchHandle,
    error_out: *mut u64,
) -> c_int {
    construct("sg_tdigest_new", out, error_out, || {
        TDigestFacade::new(k).map(SketchHandle::TDigest)
    })
}

#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_frequent_strings_new(
    lg_max_map_size: u8,
    out: *mut *mut SketchHandle,
    error_out: *mut u64,
) -> c_int {
    construct("sg_frequent_strings_new", out, error_out, || {
        FrequentStringsFacade::new(lg_max_map_size).map(SketchHandle::FrequentStrings)
    })
}

/// Updates with `len` bytes of UTF-8 text. Frequent strings count the item
/// once.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_update_str(
    sketch: *mut SketchHandle,
    data: *const u8,
    len: size_t,
    error_out: *mut u64,
) -> c_int {
    guarded("sg_update_str", error_out, || {
        // SAFETY: handles and item bytes are valid by contract.
        let (sketch, item) = unsafe { (handle_mut(sketch)?, str_arg(data, len, "item")?) };
        Ok(sketch.update_str(item)?)
    })
}

#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_update_i64(
    sketch: *mut SketchHandle,
    value: i64,
    error_out: *mut u64,
) -> c_int {
    guarded("sg_update_i64", error_out, || {
        // SAFETY: the handle is valid by contract.
        let sketch = unsafe { handle_mut(sketch) }?;
        Ok(sketch.update_i64(value)?)
    })
}

#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_update_f64(
    sketch: *mut SketchHandle,
    value: f64,
    error_out: *mut u64,
) -> c_int {
    guarded("sg_update_f64", error_out, || {
        // SAFETY: the handle is valid by contract.
        let sketch = unsafe { handle_mut(sketch) }?;
        Ok(sketch.update_f64(value)?)
    })
}

/// Keyed update: tuple sketches fold `value` into the key's summary, frequent
/// strings add it as the item's weight.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_update_keyed_str(
    sketch: *mut SketchHandle,
    key: *const u8,
    len: size_t,
    value: i64,
    error_out: *mut u64,
) -> c_int {
    guarded("sg_update_keyed_str", error_out, || {
        // SAFETY: handles and key bytes are valid by contract.
        let (sketch, key) = unsafe { (handle_mut(sketch)?, str_arg(key, len, "key")?) };
        Ok(sketch.update_keyed_str(key, value)?)
    })
}

/// Folds `source` into `target`. Both must be KLL, REQ, TDigest or frequent
/// strings sketches of the same family; `source` is left unchanged.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_merge(
    target: *mut SketchHandle,
    source: *const SketchHandle,
    error_out: *mut u64,
) -> c_int {
    guarded("sg_merge", error_out, || {
        if ptr::eq(target.cast_const(), source) {
            return Err(Error::invalid_argument("a sketch cannot be merged into itself").into());
        }
        // SAFETY: distinct live handles by contract and the check above.
        let (target, source) = unsafe { (handle_mut(target)?, handle_ref(source)?) };
        Ok(target.merge(source)?)
    })
}

/// Serializes into the named encoding (`binary`, `binary-compressed`,
/// `base64` or `base64-compressed`; null selects `binary`). Base64 output is
/// ASCII without a terminator.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_serialize(
    sketch: *const SketchHandle,
    encoding: *const c_char,
    out: *mut SgBuffer,
    error_out: *mut u64,
) -> c_int {
    guarded("sg_serialize", error_out, || {
        let out = out_ptr(out, "out")?;
        // SAFETY: handle and encoding name are valid by contract.
        let (sketch, encoding) =
            unsafe { (handle_ref(sketch)?, c_str_arg(encoding, "encoding")?) };
        let encoding = Encoding::from_name(encoding.unwrap_or("binary"))?;
        let encoded = sketch.serialize(encoding)?;
        // SAFETY: `out` is non-null.
        unsafe { publish(out, SgBuffer::from_vec(encoded.into_bytes())) };
        Ok(())
    })
}

/// Frees a buffer returned by [`sg_serialize`]. A null buffer is ignored.
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_buffer_release(buffer: SgBuffer) {
    if buffer.data.is_null() {
        return;
    }
    let slice = ptr::slice_from_raw_parts_mut(buffer.data, buffer.len);
    // SAFETY: the buffer was produced by `SgBuffer::from_vec`.
    drop(unsafe { Box::from_raw(slice) });
}

/// Reads a binary image (optionally compressed) of the given family id.
/// Theta and tuple images yield compact handles.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_deserialize(
    family: u8,
    bytes: *const u8,
    len: size_t,
    seed: u64,
    out: *mut *mut SketchHandle,
    error_out: *mut u64,
) -> c_int {
    guarded("sg_deserialize", error_out, || {
        let out = out_ptr(out, "out")?;
        if bytes.is_null() {
            return Err(Failure::Null("bytes"));
        }
        // SAFETY: the caller guarantees `len` readable bytes at `bytes`.
        let region = unsafe { RawRegion::new(bytes, len) };
        let handle = SketchHandle::deserialize(family, ByteSource::Raw(region), seed)?;
        // SAFETY: `out` is non-null.
        unsafe { publish_handle(out, handle) };
        Ok(())
    })
}

/// As [`sg_deserialize`], from NUL-terminated base64 text.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_deserialize_b64(
    family: u8,
    text: *const c_char,
    seed: u64,
    out: *mut *mut SketchHandle,
    error_out: *mut u64,
) -> c_int {
    guarded("sg_deserialize_b64", error_out, || {
        let out = out_ptr(out, "out")?;
        // SAFETY: a non-null text is a C string by contract.
        let text = unsafe { c_str_arg(text, "text") }?.ok_or(Failure::Null("text"))?;
        let handle = SketchHandle::deserialize(family, ByteSource::base64(text), seed)?;
        // SAFETY: `out` is non-null.
        unsafe { publish_handle(out, handle) };
        Ok(())
    })
}

/// Upper bound on the binary image size. `size` is `lg_k` (HLL, CPC, Theta,
/// Tuple) or `k` (KLL); `extra` is the HLL type or the KLL stream length.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_max_serialized_size(
    family: u8,
    size: u32,
    extra: u64,
    out: *mut size_t,
    error_out: *mut u64,
) -> c_int {
    guarded("sg_max_serialized_size", error_out, || {
        let out = out_ptr(out, "out")?;
        let bound = SketchHandle::max_serialized_size(family, size, extra)?;
        // SAFETY: `out` is non-null.
        unsafe { publish(out, bound) };
        Ok(())
    })
}

#[allow(unsafe_code)]
fn query(
    entry: &'static str,
    sketch: *const SketchHandle,
    out: *mut f64,
    error_out: *mut u64,
    run: impl FnOnce(&SketchHandle) -> Result<f64, Error>,
) -> c_int {
    guarded(entry, error_out, || {
        let out = out_ptr(out, "out")?;
        // SAFETY: the handle is valid by contract.
        let sketch = unsafe { handle_ref(sketch) }?;
        let value = run(sketch)?;
        // SAFETY: `out` is non-null.
        unsafe { publish(out, value) };
        Ok(())
    })
}

#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_estimate(
    sketch: *const SketchHandle,
    out: *mut f64,
    error_out: *mut u64,
) -> c_int {
    query("sg_estimate", sketch, out, error_out, SketchHandle::estimate)
}

/// Lower bound at 1, 2 or 3 standard deviations.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_lower_bound(
    sketch: *const SketchHandle,
    num_std_dev: u8,
    out: *mut f64,
    error_out: *mut u64,
) -> c_int {
    query("sg_lower_bound", sketch, out, error_out, |s| {
        s.lower_bound(num_std_dev)
    })
}

/// Upper bound at 1, 2 or 3 standard deviations.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_upper_bound(
    sketch: *const SketchHandle,
    num_std_dev: u8,
    out: *mut f64,
    error_out: *mut u64,
) -> c_int {
    query("sg_upper_bound", sketch, out, error_out, |s| {
        s.upper_bound(num_std_dev)
    })
}

#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_rank(
    sketch: *const SketchHandle,
    item: f64,
    inclusive: bool,
    out: *mut f64,
    error_out: *mut u64,
) -> c_int {
    query("sg_rank", sketch, out, error_out, |s| s.rank(item, inclusive))
}

#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_quantile(
    sketch: *const SketchHandle,
    rank: f64,
    inclusive: bool,
    out: *mut f64,
    error_out: *mut u64,
) -> c_int {
    query("sg_quantile", sketch, out, error_out, |s| s.quantile(rank, inclusive))
}

/// Writes a summary string to be released with [`sg_string_release`].
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_debug_string(
    sketch: *const SketchHandle,
    out: *mut *mut c_char,
    error_out: *mut u64,
) -> c_int {
    guarded("sg_debug_string", error_out, || {
        let out = out_ptr(out, "out")?;
        // SAFETY: the handle is valid by contract.
        let sketch = unsafe { handle_ref(sketch) }?;
        let text = into_c_string(sketch.debug_string());
        // SAFETY: `out` is non-null.
        unsafe { publish(out, text) };
        Ok(())
    })
}

/// Frees a string produced by this library. Null is ignored.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_string_release(text: *mut c_char) {
    if !text.is_null() {
        // SAFETY: the string was produced by `CString::into_raw`.
        drop(unsafe { CString::from_raw(text) });
    }
}

/// Unions `count` handles of one family into a new handle.
///
/// `policy` names the tuple summary policy (null selects `SUM`) and is
/// ignored for other families. `seed` is ignored for HLL.
///
/// A tuple handle only remembers its policy while it was built in process.
/// Handles restored by `sg_deserialize` carry none, so mixing policies across
/// them is not detected and their summaries are folded with `policy`.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_union(
    sketches: *const *const SketchHandle,
    count: size_t,
    lg_k: u8,
    seed: u64,
    policy: *const c_char,
    out: *mut *mut SketchHandle,
    error_out: *mut u64,
) -> c_int {
    guarded("sg_union", error_out, || {
        let out = out_ptr(out, "out")?;
        if sketches.is_null() {
            return Err(Failure::Null("sketches"));
        }
        // SAFETY: `count` readable handle pointers by contract.
        let pointers = unsafe { std::slice::from_raw_parts(sketches, count) };
        let operands = pointers
            .iter()
            // SAFETY: each pointer is a live handle by contract.
            .map(|&ptr| unsafe { handle_ref(ptr) })
            .collect::<Result<Vec<_>, _>>()?;
        // SAFETY: a non-null policy is a C string by contract.
        let policy = Policy::resolve(unsafe { c_str_arg(policy, "policy") }?.unwrap_or(""))?;
        let result = handle::union(&operands, lg_k, seed, policy)?;
        // SAFETY: `out` is non-null.
        unsafe { publish_handle(out, result) };
        Ok(())
    })
}

/// Intersection of two theta or two tuple handles. `policy` as in
/// [`sg_union`].
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_intersection(
    a: *const SketchHandle,
    b: *const SketchHandle,
    policy: *const c_char,
    out: *mut *mut SketchHandle,
    error_out: *mut u64,
) -> c_int {
    guarded("sg_intersection", error_out, || {
        let out = out_ptr(out, "out")?;
        // SAFETY: handles and policy are valid by contract.
        let (a, b, policy) =
            unsafe { (handle_ref(a)?, handle_ref(b)?, c_str_arg(policy, "policy")?) };
        let result = handle::intersection(a, b, Policy::resolve(policy.unwrap_or(""))?)?;
        // SAFETY: `out` is non-null.
        unsafe { publish_handle(out, result) };
        Ok(())
    })
}

#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_a_not_b(
    a: *const SketchHandle,
    b: *const SketchHandle,
    out: *mut *mut SketchHandle,
    error_out: *mut u64,
) -> c_int {
    guarded("sg_a_not_b", error_out, || {
        let out = out_ptr(out, "out")?;
        // SAFETY: handles are valid by contract.
        let (a, b) = unsafe { (handle_ref(a)?, handle_ref(b)?) };
        let result = handle::a_not_b(a, b)?;
        // SAFETY: `out` is non-null.
        unsafe { publish_handle(out, result) };
        Ok(())
    })
}

/// Writes `[lower, estimate, upper]` of the Jaccard similarity.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_jaccard(
    a: *const SketchHandle,
    b: *const SketchHandle,
    out: *mut [f64; 3],
    error_out: *mut u64,
) -> c_int {
    guarded("sg_jaccard", error_out, || {
        let out = out_ptr(out, "out")?;
        // SAFETY: handles are valid by contract.
        let (a, b) = unsafe { (handle_ref(a)?, handle_ref(b)?) };
        let similarity = handle::jaccard(a, b)?;
        // SAFETY: `out` is non-null.
        unsafe { publish(out, similarity.to_array()) };
        Ok(())
    })
}

/// Writes the message of an error reference, or "no such error reference".
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_error_message(error_ref: u64, out: *mut *mut c_char) -> c_int {
    if out.is_null() {
        return EFAULT;
    }
    // SAFETY: non-null and writable by contract.
    unsafe { out.write(into_c_string(errors::message(error_ref))) };
    0
}

/// Writes the kind name of an error reference. Unknown references get the
/// "no such error reference" text and `EINVAL`.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_error_kind(error_ref: u64, out: *mut *mut c_char) -> c_int {
    if out.is_null() {
        return EFAULT;
    }
    let (code, text) = match errors::kind(error_ref) {
        Some(kind) => (0, kind.into_static()),
        None => (EINVAL, errors::NO_SUCH_ERROR),
    };
    // SAFETY: non-null and writable by contract.
    unsafe { out.write(into_c_string(text.to_string())) };
    code
}

/// Releases an error reference. Returns `EINVAL` if it was not live.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub extern "C" fn sg_error_release(error_ref: u64) -> c_int {
    if errors::release(error_ref) { 0 } else { EINVAL }
}

/// Frees a handle. Null is ignored.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub extern "C" fn sg_sketch_release(sketch: *mut SketchHandle) {
    log::maybe_cfg_log();
    if !sketch.is_null() {
        debug!("sketch released @ {sketch:p}");
        // SAFETY: the handle came from `Box::into_raw` in this module.
        drop(unsafe { Box::from_raw(sketch) });
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use googletest::prelude::*;
    use test_log::test;

    use super::*;
    use crate::codec::family::Family;
    use crate::hash::DEFAULT_UPDATE_SEED;

    fn new_theta() -> *mut SketchHandle {
        let mut sketch = ptr::null_mut();
        let code = sg_theta_new(12, DEFAULT_UPDATE_SEED, 1.0, &mut sketch, ptr::null_mut());
        assert_that!(code, eq(0));
        sketch
    }

    fn update_all(sketch: *mut SketchHandle, items: impl Iterator<Item = String>) {
        for item in items {
            let code = sg_update_str(sketch, item.as_ptr(), item.len(), ptr::null_mut());
            assert_that!(code, eq(0));
        }
    }

    fn estimate(sketch: *const SketchHandle) -> f64 {
        let mut value = 0.0;
        assert_that!(sg_estimate(sketch, &mut value, ptr::null_mut()), eq(0));
        value
    }

    fn take_string(text: *mut c_char) -> String {
        let owned = unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned();
        sg_string_release(text);
        owned
    }

    fn error_kind(error_ref: u64) -> String {
        let mut text = ptr::null_mut();
        sg_error_kind(error_ref, &mut text);
        take_string(text)
    }

    #[test]
    fn test_theta_lifecycle() {
        let sketch = new_theta();
        update_all(sketch, (0..1000).map(|i| format!("item-{i}")));
        assert_that!(estimate(sketch), eq(1000.0));

        let mut buffer = SgBuffer {
            data: ptr::null_mut(),
            len: 0,
        };
        let encoding = c"binary-compressed".as_ptr();
        let code = sg_serialize(sketch, encoding, &mut buffer, ptr::null_mut());
        assert_that!(code, eq(0));
        assert_that!(buffer.len, gt(0));

        let mut copy = ptr::null_mut();
        let code = sg_deserialize(
            Family::THETA.id,
            buffer.data,
            buffer.len,
            DEFAULT_UPDATE_SEED,
            &mut copy,
            ptr::null_mut(),
        );
        assert_that!(code, eq(0));
        sg_buffer_release(buffer);
        assert_that!(estimate(copy), eq(1000.0));

        let mut text = ptr::null_mut();
        assert_that!(sg_debug_string(copy, &mut text, ptr::null_mut()), eq(0));
        let text = take_string(text);
        assert_that!(text.as_str(), contains_substring("### Theta sketch summary:"));

        sg_sketch_release(copy);
        sg_sketch_release(sketch);
    }

    #[test]
    fn test_failures_report_codes_and_references() {
        let mut sketch = ptr::null_mut();
        let mut error_ref = 0;
        let code = sg_hll_new(30, 0, &mut sketch, &mut error_ref);
        assert_that!(code, eq(EINVAL));
        assert!(sketch.is_null());
        assert_that!(error_kind(error_ref).as_str(), eq("InvalidArgument"));
        let mut text = ptr::null_mut();
        assert_that!(sg_error_message(error_ref, &mut text), eq(0));
        assert_that!(take_string(text).as_str(), contains_substring("lg_k"));
        assert_that!(sg_error_release(error_ref), eq(0));
        assert_that!(sg_error_release(error_ref), eq(EINVAL));

        let code = sg_hll_new(12, 0, ptr::null_mut(), &mut error_ref);
        assert_that!(code, eq(EFAULT));
        assert_that!(error_kind(error_ref).as_str(), eq("InvalidArgument"));
        sg_error_release(error_ref);

        let mut value = 0.0;
        let code = sg_estimate(ptr::null(), &mut value, &mut error_ref);
        assert_that!(code, eq(EFAULT));
        sg_error_release(error_ref);
    }

    #[test]
    fn test_success_clears_error_reference() {
        let mut sketch = ptr::null_mut();
        let mut error_ref = 42;
        assert_that!(sg_kll_new(200, &mut sketch, &mut error_ref), eq(0));
        assert_that!(error_ref, eq(0));
        sg_sketch_release(sketch);
    }

    #[test]
    fn test_unknown_error_reference() {
        let mut text = ptr::null_mut();
        assert_that!(sg_error_kind(u64::MAX, &mut text), eq(EINVAL));
        assert_that!(take_string(text).as_str(), eq(errors::NO_SUCH_ERROR));
        assert_that!(sg_error_message(u64::MAX, &mut text), eq(0));
        assert_that!(take_string(text).as_str(), eq(errors::NO_SUCH_ERROR));
    }

    #[test]
    fn test_seed_mismatch_is_an_io_failure() {
        let sketch = new_theta();
        update_all(sketch, (0..10).map(|i| i.to_string()));
        let mut buffer = SgBuffer {
            data: ptr::null_mut(),
            len: 0,
        };
        assert_that!(sg_serialize(sketch, ptr::null(), &mut buffer, ptr::null_mut()), eq(0));

        let mut copy = ptr::null_mut();
        let mut error_ref = 0;
        let code =
            sg_deserialize(Family::THETA.id, buffer.data, buffer.len, 1, &mut copy, &mut error_ref);
        assert_that!(code, eq(EIO));
        assert!(copy.is_null());
        assert_that!(error_kind(error_ref).as_str(), eq("SeedMismatch"));
        sg_error_release(error_ref);
        sg_buffer_release(buffer);
        sg_sketch_release(sketch);
    }

    #[test]
    fn test_combine_through_handles() {
        let a = new_theta();
        let b = new_theta();
        update_all(a, (0..1000).map(|i| i.to_string()));
        update_all(b, (500..1500).map(|i| i.to_string()));

        let operands = [a.cast_const(), b.cast_const()];
        let mut union = ptr::null_mut();
        let code = sg_union(
            operands.as_ptr(),
            operands.len(),
            12,
            DEFAULT_UPDATE_SEED,
            ptr::null(),
            &mut union,
            ptr::null_mut(),
        );
        assert_that!(code, eq(0));
        assert_that!(estimate(union), eq(1500.0));

        let mut both = ptr::null_mut();
        assert_that!(sg_intersection(a, b, ptr::null(), &mut both, ptr::null_mut()), eq(0));
        assert_that!(estimate(both), eq(500.0));

        let mut only_a = ptr::null_mut();
        assert_that!(sg_a_not_b(a, b, &mut only_a, ptr::null_mut()), eq(0));
        assert_that!(estimate(only_a), eq(500.0));

        let mut similarity = [0.0; 3];
        assert_that!(sg_jaccard(a, a, &mut similarity, ptr::null_mut()), eq(0));
        assert_eq!(similarity, [1.0, 1.0, 1.0]);

        for sketch in [a, b, union, both, only_a] {
            sg_sketch_release(sketch);
        }
    }

    #[test]
    fn test_quantile_handles() {
        let mut sketch = ptr::null_mut();
        assert_that!(sg_kll_new(200, &mut sketch, ptr::null_mut()), eq(0));
        for i in 1..=100 {
            assert_that!(sg_update_f64(sketch, f64::from(i), ptr::null_mut()), eq(0));
        }
        let mut rank = 0.0;
        assert_that!(sg_rank(sketch, 50.0, true, &mut rank, ptr::null_mut()), eq(0));
        assert_that!(rank, eq(0.5));
        let mut quantile = 0.0;
        assert_that!(sg_quantile(sketch, 1.0, true, &mut quantile, ptr::null_mut()), eq(0));
        assert_that!(quantile, eq(100.0));

        let mut error_ref = 0;
        let code = sg_quantile(sketch, 1.5, true, &mut quantile, &mut error_ref);
        assert_that!(code, eq(EINVAL));
        assert_that!(quantile, eq(100.0));
        sg_error_release(error_ref);
        sg_sketch_release(sketch);
    }

    #[test]
    fn test_panics_become_invalid_arguments() {
        let mut error_ref = 0;
        let code = guarded("test", &mut error_ref, || panic!("boom"));
        assert_that!(code, eq(EINVAL));
        assert_that!(error_kind(error_ref).as_str(), eq("InvalidArgument"));
        assert_that!(errors::message(error_ref).as_str(), contains_substring("boom"));
        sg_error_release(error_ref);
    }

    #[test]
    fn test_max_serialized_size() {
        let mut size = 0;
        let code = sg_max_serialized_size(Family::KLL.id, 200, 1 << 20, &mut size, ptr::null_mut());
        assert_that!(code, eq(0));
        assert_that!(size, eq(KllFacade::max_serialized_size(200, 1 << 20).unwrap()));
        let mut error_ref = 0;
        let code = sg_max_serialized_size(Family::REQ.id, 12, 0, &mut size, &mut error_ref);
        assert_that!(code, eq(EINVAL));
        sg_error_release(error_ref);
    }
}
