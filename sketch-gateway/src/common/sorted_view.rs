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

//! Cumulative-weight view over the retained items of a quantiles sketch.

use std::cmp::Ordering;

use crate::error::Error;

/// Items a quantiles sketch can order.
pub trait QuantileItem: Clone {
    fn cmp(a: &Self, b: &Self) -> Ordering;

    fn is_nan(_value: &Self) -> bool {
        false
    }
}

impl QuantileItem for f32 {
    fn cmp(a: &Self, b: &Self) -> Ordering {
        a.partial_cmp(b).unwrap_or(Ordering::Greater)
    }

    fn is_nan(value: &Self) -> bool {
        value.is_nan()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SortedView<T: QuantileItem> {
    entries: Vec<Entry<T>>,
    total_weight: u64,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    item: T,
    /// Inclusive cumulative weight once the view is built.
    weight: u64,
}

impl<T: QuantileItem> SortedView<T> {
    /// Builds a view from `(item, weight)` pairs in any order.
    pub fn from_weighted(items: impl IntoIterator<Item = (T, u64)>) -> Self {
        let mut entries: Vec<Entry<T>> = items
            .into_iter()
            .map(|(item, weight)| Entry { item, weight })
            .collect();
        entries.sort_by(|a, b| T::cmp(&a.item, &b.item));
        let mut total_weight = 0u64;
        for entry in &mut entries {
            total_weight += entry.weight;
            entry.weight = total_weight;
        }
        Self {
            entries,
            total_weight,
        }
    }

    pub fn rank(&self, item: &T, inclusive: bool) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }

        let idx = if inclusive {
            upper_bound(&self.entries, item)
        } else {
            lower_bound(&self.entries, item)
        };

        if idx == 0 {
            return 0.0;
        }
        self.entries[idx - 1].weight as f64 / self.total_weight as f64
    }

    /// Returns `None` when the view is empty.
    pub fn quantile(&self, rank: f64, inclusive: bool) -> Option<T> {
        let last = self.entries.last()?;
        let weight = if inclusive {
            (rank * self.total_weight as f64).ceil() as u64
        } else {
            (rank * self.total_weight as f64) as u64
        };

        let idx = if inclusive {
            lower_bound_by_weight(&self.entries, weight)
        } else {
            upper_bound_by_weight(&self.entries, weight)
        };

        match self.entries.get(idx) {
            Some(entry) => Some(entry.item.clone()),
            None => Some(last.item.clone()),
        }
    }

    pub fn cdf(&self, split_points: &[T], inclusive: bool) -> Result<Vec<f64>, Error> {
        check_split_points(split_points)?;
        let mut ranks = Vec::with_capacity(split_points.len() + 1);
        for item in split_points {
            ranks.push(self.rank(item, inclusive));
        }
        ranks.push(1.0);
        Ok(ranks)
    }

    pub fn pmf(&self, split_points: &[T], inclusive: bool) -> Result<Vec<f64>, Error> {
        let mut buckets = self.cdf(split_points, inclusive)?;
        for i in (1..buckets.len()).rev() {
            buckets[i] -= buckets[i - 1];
        }
        Ok(buckets)
    }

    /// Normalized weight strictly below entry `idx`; 1 past the end.
    fn exclusive_rank_at(&self, idx: usize) -> f64 {
        match idx {
            0 => 0.0,
            i if i >= self.entries.len() => 1.0,
            i => self.entries[i - 1].weight as f64 / self.total_weight as f64,
        }
    }

    /// Largest distance between the empirical CDFs of two views.
    pub fn max_cdf_distance(&self, other: &SortedView<T>) -> f64 {
        let (mut i, mut j) = (0usize, 0usize);
        let mut max = 0.0f64;
        while i < self.entries.len() && j < other.entries.len() {
            let x1 = &self.entries[i].item;
            let x2 = &other.entries[j].item;
            match T::cmp(x1, x2) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
            let delta = (self.exclusive_rank_at(i) - other.exclusive_rank_at(j)).abs();
            max = max.max(delta);
        }
        max
    }
}

fn check_split_points<T: QuantileItem>(split_points: &[T]) -> Result<(), Error> {
    if split_points.iter().any(T::is_nan) {
        return Err(Error::invalid_argument("split points must not contain NaN"));
    }
    for pair in split_points.windows(2) {
        if T::cmp(&pair[0], &pair[1]) != Ordering::Less {
            return Err(Error::invalid_argument(
                "split points must be unique and monotonically increasing",
            ));
        }
    }
    Ok(())
}

fn lower_bound<T: QuantileItem>(entries: &[Entry<T>], item: &T) -> usize {
    entries.partition_point(|entry| T::cmp(&entry.item, item) == Ordering::Less)
}

fn upper_bound<T: QuantileItem>(entries: &[Entry<T>], item: &T) -> usize {
    entries.partition_point(|entry| T::cmp(&entry.item, item) != Ordering::Greater)
}

fn lower_bound_by_weight<T>(entries: &[Entry<T>], weight: u64) -> usize {
    entries.partition_point(|entry| entry.weight < weight)
}

fn upper_bound_by_weight<T>(entries: &[Entry<T>], weight: u64) -> usize {
    entries.partition_point(|entry| entry.weight <= weight)
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    fn view_of(items: &[f32]) -> SortedView<f32> {
        SortedView::from_weighted(items.iter().map(|&item| (item, 1)))
    }

    #[test]
    fn test_rank_inclusive_and_exclusive() {
        let view = view_of(&[3.0, 1.0, 2.0, 2.0]);
        assert_that!(view.rank(&2.0, true), near(0.75, 1e-12));
        assert_that!(view.rank(&2.0, false), near(0.25, 1e-12));
        assert_that!(view.rank(&0.5, true), eq(0.0));
        assert_that!(view.total_weight, eq(4));
    }

    #[test]
    fn test_quantile_edges() {
        let view = view_of(&[1.0, 2.0, 3.0, 4.0]);
        assert_that!(view.quantile(0.0, true), some(eq(1.0)));
        assert_that!(view.quantile(0.5, true), some(eq(2.0)));
        assert_that!(view.quantile(0.5, false), some(eq(3.0)));
        assert_that!(view.quantile(1.0, false), some(eq(4.0)));
        assert_that!(view_of(&[]).quantile(0.5, true), none());
    }

    #[test]
    fn test_pmf_sums_to_one() {
        let view = view_of(&[1.0, 2.0, 3.0, 4.0]);
        let pmf = view.pmf(&[2.0, 3.0], true).unwrap();
        assert_eq!(pmf, vec![0.5, 0.25, 0.25]);
    }

    #[test]
    fn test_split_points_are_validated() {
        let view = view_of(&[1.0]);
        assert!(view.cdf(&[2.0, 1.0], true).is_err());
        assert!(view.cdf(&[f32::NAN], true).is_err());
        assert!(view.cdf(&[1.0, 1.0], true).is_err());
    }

    #[test]
    fn test_cdf_distance() {
        let a = view_of(&[1.0, 2.0, 3.0, 4.0]);
        assert_that!(a.max_cdf_distance(&a), eq(0.0));
        let b = view_of(&[10.0, 11.0, 12.0, 13.0]);
        assert_that!(a.max_cdf_distance(&b), near(1.0, 1e-12));
    }
}
