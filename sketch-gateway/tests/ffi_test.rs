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

//! The C ABI driven the way a host runtime would drive it.

#![allow(unsafe_code)]

use std::ffi::CStr;
use std::ffi::CString;
use std::ptr;

use googletest::prelude::*;
use libc::EFAULT;
use libc::EINVAL;
use libc::EIO;
use libc::c_char;
use sketch_gateway::codec::family::Family;
use sketch_gateway::ffi::*;

const KLL_1: &CStr = c"BQEPAMgACAAKAAAAAAAAAMgAAQC+AAAAAACAPwAAIEEAACBBAAAQQQAAAEEAAOBAAADAQAAAoEAAAIBAAABAQAAAAEAAAIA/";
const KLL_2: &CStr = c"BQEPAMgACAAKAAAAAAAAAMgAAQC+AAAAAAAwQQAAoEEAAKBBAACYQQAAkEEAAIhBAACAQQAAcEEAAGBBAABQQQAAQEEAADBB";

/// Owns a handle for the duration of a test.
struct Handle(*mut SketchHandle);

impl Drop for Handle {
    fn drop(&mut self) {
        sg_sketch_release(self.0);
    }
}

fn check(code: i32) {
    assert_that!(code, eq(0));
}

fn from_b64(family: u8, text: &CStr) -> Handle {
    let mut sketch = ptr::null_mut();
    check(sg_deserialize_b64(family, text.as_ptr(), 0, &mut sketch, ptr::null_mut()));
    Handle(sketch)
}

fn take_string(text: *mut c_char) -> String {
    let owned = unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned();
    sg_string_release(text);
    owned
}

fn error_text(error_ref: u64) -> (String, String) {
    let (mut kind, mut message) = (ptr::null_mut(), ptr::null_mut());
    sg_error_kind(error_ref, &mut kind);
    sg_error_message(error_ref, &mut message);
    sg_error_release(error_ref);
    (take_string(kind), take_string(message))
}

#[test]
fn test_kll_merge_and_query() {
    let target = from_b64(Family::KLL.id, KLL_1);
    let source = from_b64(Family::KLL.id, KLL_2);
    check(sg_merge(target.0, source.0, ptr::null_mut()));

    let mut value = 0.0;
    check(sg_rank(target.0, 10.0, true, &mut value, ptr::null_mut()));
    assert_that!(value, eq(0.5));
    check(sg_quantile(target.0, 0.5, true, &mut value, ptr::null_mut()));
    assert_that!(value, eq(10.0));

    let mut text = ptr::null_mut();
    check(sg_debug_string(target.0, &mut text, ptr::null_mut()));
    let text = take_string(text);
    assert_that!(text.as_str(), contains_substring("N              : 20"));
}

#[test]
fn test_merge_errors() {
    let kll = from_b64(Family::KLL.id, KLL_1);
    let mut error_ref = 0;
    assert_that!(sg_merge(kll.0, kll.0, &mut error_ref), eq(EINVAL));
    error_text(error_ref);

    let mut digest = ptr::null_mut();
    check(sg_tdigest_new(100, &mut digest, ptr::null_mut()));
    let digest = Handle(digest);
    assert_that!(sg_merge(kll.0, digest.0, &mut error_ref), eq(EIO));
    let (kind, message) = error_text(error_ref);
    assert_that!(kind.as_str(), eq("IncompatibleOperands"));
    assert_that!(message.as_str(), contains_substring("KLL"));

    assert_that!(sg_merge(ptr::null_mut(), kll.0, &mut error_ref), eq(EFAULT));
    error_text(error_ref);
}

#[test]
fn test_tuple_keyed_updates_and_policy_union() {
    let policy = CString::new("MAX").unwrap();
    let mut handles = Vec::new();
    for value in [3, 7, 5] {
        let mut sketch = ptr::null_mut();
        check(sg_tuple_new(12, 9001, 1.0, policy.as_ptr(), &mut sketch, ptr::null_mut()));
        check(sg_update_keyed_str(sketch, "x".as_ptr(), 1, value, ptr::null_mut()));
        handles.push(Handle(sketch));
    }
    let operands: Vec<_> = handles.iter().map(|h| h.0.cast_const()).collect();
    let mut union = ptr::null_mut();
    check(sg_union(
        operands.as_ptr(),
        operands.len(),
        12,
        9001,
        policy.as_ptr(),
        &mut union,
        ptr::null_mut(),
    ));
    let union = Handle(union);
    let mut estimate = 0.0;
    check(sg_estimate(union.0, &mut estimate, ptr::null_mut()));
    assert_that!(estimate, eq(1.0));

    let mut error_ref = 0;
    let sum = CString::new("SUM").unwrap();
    let mut rejected: *mut SketchHandle = ptr::null_mut();
    let code = sg_union(
        operands.as_ptr(),
        operands.len(),
        12,
        9001,
        sum.as_ptr(),
        &mut rejected,
        &mut error_ref,
    );
    assert_that!(code, eq(EIO));
    assert_that!(error_text(error_ref).0.as_str(), eq("IncompatibleOperands"));
    assert!(rejected.is_null());
}

#[test]
fn test_frequent_strings_weights() {
    let mut sketch = ptr::null_mut();
    check(sg_frequent_strings_new(5, &mut sketch, ptr::null_mut()));
    let sketch = Handle(sketch);
    check(sg_update_str(sketch.0, "a".as_ptr(), 1, ptr::null_mut()));
    check(sg_update_keyed_str(sketch.0, "a".as_ptr(), 1, 4, ptr::null_mut()));

    let mut error_ref = 0;
    let code = sg_update_keyed_str(sketch.0, "a".as_ptr(), 1, -4, &mut error_ref);
    assert_that!(code, eq(EINVAL));
    error_text(error_ref);
    let code = sg_update_i64(sketch.0, 1, &mut error_ref);
    assert_that!(code, eq(EINVAL));
    error_text(error_ref);

    let mut buffer = SgBuffer {
        data: ptr::null_mut(),
        len: 0,
    };
    check(sg_serialize(sketch.0, c"base64".as_ptr(), &mut buffer, ptr::null_mut()));
    let bytes = unsafe { std::slice::from_raw_parts(buffer.data, buffer.len) }.to_vec();
    sg_buffer_release(buffer);
    let text = CString::new(bytes).unwrap();
    let copy = from_b64(Family::FREQUENCY.id, &text);

    let mut summary = ptr::null_mut();
    check(sg_debug_string(copy.0, &mut summary, ptr::null_mut()));
    let summary = take_string(summary);
    assert_that!(summary.as_str(), contains_substring("total weight     : 5"));
}

#[test]
fn test_invalid_utf8_and_bad_images() {
    let mut sketch = ptr::null_mut();
    check(sg_hll_new(12, 0, &mut sketch, ptr::null_mut()));
    let sketch = Handle(sketch);
    let invalid = [0xFFu8, 0xFE];
    let mut error_ref = 0;
    let code = sg_update_str(sketch.0, invalid.as_ptr(), invalid.len(), &mut error_ref);
    assert_that!(code, eq(EINVAL));
    error_text(error_ref);

    let garbage = [1u8, 2, 3];
    let mut copy = ptr::null_mut();
    let code = sg_deserialize(Family::HLL.id, garbage.as_ptr(), 3, 0, &mut copy, &mut error_ref);
    assert_that!(code, eq(EIO));
    assert_that!(error_text(error_ref).0.as_str(), eq("CorruptFormat"));

    let code = sg_deserialize_b64(Family::HLL.id, c"%%%".as_ptr(), 0, &mut copy, &mut error_ref);
    assert_that!(code, eq(EIO));
    assert_that!(error_text(error_ref).0.as_str(), eq("DecodeError"));
    assert!(copy.is_null());
}
