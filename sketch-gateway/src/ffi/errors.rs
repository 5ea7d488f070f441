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

//! Registry of failures handed across the boundary as opaque references.
//!
//! The registry is the only state shared between calls. Reference 0 is never
//! issued, so callers can use it as "no error".

use std::collections::HashMap;
use std::sync::LazyLock;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::error::Error;
use crate::error::ErrorKind;

/// Text returned for references that were released or never issued.
pub const NO_SUCH_ERROR: &str = "no such error reference";

static REGISTRY: LazyLock<Mutex<ErrorRegistry>> =
    LazyLock::new(|| Mutex::new(ErrorRegistry::default()));

#[derive(Debug, Default)]
struct ErrorRegistry {
    last_ref: u64,
    errors: HashMap<u64, Error>,
}

fn registry() -> MutexGuard<'static, ErrorRegistry> {
    // a panic while holding the lock cannot leave the map half-updated
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stores `error` and returns its reference.
pub fn register(error: Error) -> u64 {
    let mut registry = registry();
    registry.last_ref = registry.last_ref.wrapping_add(1).max(1);
    let error_ref = registry.last_ref;
    registry.errors.insert(error_ref, error);
    error_ref
}

/// Rendered message of the error, or [`NO_SUCH_ERROR`].
pub fn message(error_ref: u64) -> String {
    match registry().errors.get(&error_ref) {
        Some(error) => error.to_string(),
        None => NO_SUCH_ERROR.to_string(),
    }
}

pub fn kind(error_ref: u64) -> Option<ErrorKind> {
    registry().errors.get(&error_ref).map(Error::kind)
}

/// Drops the error. Returns whether the reference was live.
pub fn release(error_ref: u64) -> bool {
    registry().errors.remove(&error_ref).is_some()
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn test_register_and_release() {
        let error_ref = register(Error::invalid_argument("lg_k must be in [4, 21], got 30"));
        assert_that!(error_ref, gt(0));
        assert_that!(kind(error_ref), some(eq(ErrorKind::InvalidArgument)));
        let text = message(error_ref);
        assert_that!(text.as_str(), contains_substring("lg_k must be in [4, 21]"));

        assert!(release(error_ref));
        assert!(!release(error_ref));
        assert_that!(message(error_ref).as_str(), eq(NO_SUCH_ERROR));
        assert_that!(kind(error_ref), none());
    }

    #[test]
    fn test_references_are_distinct() {
        let a = register(Error::corrupt("a"));
        let b = register(Error::corrupt("b"));
        assert_that!(a, not(eq(b)));
        assert_that!(message(u64::MAX - 7).as_str(), eq(NO_SUCH_ERROR));
        release(a);
        release(b);
    }
}
