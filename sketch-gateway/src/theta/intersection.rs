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

use std::collections::HashMap;

use crate::error::Error;
use crate::hash::compute_seed_hash;
use crate::policy::Policy;
use crate::theta::CompactSketch;
use crate::theta::MAX_THETA;
use crate::theta::Summary;

/// Stateful intersection operator.
///
/// The intersection starts from the "universe" set and every update reduces
/// it to the overlapping subset. Summaries of matched keys are folded with
/// the operator's policy. The result is undefined before the first update.
#[derive(Debug, Clone)]
pub struct Intersection<S> {
    // None until the first update.
    entries: Option<HashMap<u64, S>>,
    theta: u64,
    is_empty: bool,
    seed_hash: u16,
    policy: Policy,
}

impl<S: Summary> Intersection<S> {
    pub fn new(seed: u64, policy: Policy) -> Self {
        Self {
            entries: None,
            theta: MAX_THETA,
            is_empty: false,
            seed_hash: compute_seed_hash(seed),
            policy,
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Intersect the current state with `sketch`.
    ///
    /// # Errors
    ///
    /// `IncompatibleOperands` if a non-empty operand was built with another
    /// seed. The state is unchanged in that case.
    pub fn update(&mut self, sketch: &CompactSketch<S>) -> Result<(), Error> {
        if !sketch.is_empty() && sketch.seed_hash() != self.seed_hash {
            return Err(Error::incompatible("operands were built with different seeds")
                .with_context("intersection_seed_hash", self.seed_hash)
                .with_context("operand_seed_hash", sketch.seed_hash()));
        }

        self.is_empty |= sketch.is_empty();
        self.theta = if self.is_empty {
            MAX_THETA
        } else {
            self.theta.min(sketch.theta64())
        };
        let theta = self.theta;

        let next = match self.entries.take() {
            None => sketch
                .iter()
                .filter(|e| e.0 < theta)
                .copied()
                .collect::<HashMap<_, _>>(),
            Some(current) if current.is_empty() => current,
            Some(mut current) => {
                let policy = self.policy;
                let mut matched = HashMap::with_capacity(current.len().min(sketch.num_retained()));
                for &(hash, summary) in sketch.iter() {
                    if hash >= theta {
                        if sketch.is_ordered() {
                            break;
                        }
                        continue;
                    }
                    if let Some(existing) = current.remove(&hash) {
                        matched.insert(hash, existing.merge(summary, policy));
                    }
                }
                matched
            }
        };
        if next.is_empty() && self.theta == MAX_THETA {
            self.is_empty = true;
        }
        self.entries = Some(next);
        Ok(())
    }

    /// Returns whether this operator has received at least one update.
    pub fn has_result(&self) -> bool {
        self.entries.is_some()
    }

    /// Ordered result of the intersection so far.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if called before the first update.
    pub fn result(&self) -> Result<CompactSketch<S>, Error> {
        let Some(entries) = &self.entries else {
            return Err(Error::invalid_argument(
                "intersection result requested before any update",
            ));
        };
        let entries = if self.is_empty {
            vec![]
        } else {
            entries.iter().map(|(hash, summary)| (*hash, *summary)).collect()
        };
        Ok(CompactSketch::from_parts(
            entries,
            self.theta,
            self.seed_hash,
            self.is_empty,
            true,
        ))
    }
}
