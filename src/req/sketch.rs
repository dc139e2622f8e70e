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

use std::cmp::Ordering;

use super::DEFAULT_K;
use super::INIT_NUM_SECTIONS;
use super::MAX_EPS;
use super::MAX_K;
use super::MIN_K;
use super::compactor::ReqCompactor;
use super::compactor::Schedule;
use super::compactor::compact;
use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::common::RandomSource;
use crate::common::XorShift64;
use crate::error::Error;

/// Trait implemented by item types supported by [`ReqSketch`].
pub(crate) trait ReqItem: Clone {
    /// Compare two items.
    fn cmp(a: &Self, b: &Self) -> Ordering;

    /// Serialized size in bytes.
    fn serialized_size(value: &Self) -> usize;

    /// Serialize a single item into the buffer.
    fn serialize(value: &Self, bytes: &mut SketchBytes);

    /// Deserialize a single item from the input.
    fn deserialize(input: &mut SketchSlice<'_>) -> Result<Self, Error>;
}

/// Relative-error quantiles sketch.
///
/// See the [req module level documentation](crate::req) for more.
#[allow(private_bounds)]
#[derive(Debug, Clone, PartialEq)]
pub struct ReqSketch<T: ReqItem, R: RandomSource = XorShift64> {
    k: u32,
    schedule: Schedule,
    compactors: Vec<ReqCompactor<T>>,
    size: u64,
    n: u64,
    max_nom_size: u64,
    rng: R,
}

impl<T: ReqItem, R: RandomSource + Default> Default for ReqSketch<T, R> {
    fn default() -> Self {
        Self::new(DEFAULT_K)
    }
}

#[allow(private_bounds)]
impl<T: ReqItem, R: RandomSource + Default> ReqSketch<T, R> {
    /// Creates a new sketch with the given value of k and the
    /// deterministic compaction schedule.
    ///
    /// # Panics
    ///
    /// Panics if `k` is not in `[MIN_K, MAX_K]`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sketchtower::req::ReqSketch;
    /// let sketch = ReqSketch::<f64>::new(50);
    /// assert_eq!(sketch.k(), 50);
    /// ```
    pub fn new(k: u32) -> Self {
        assert!(
            (MIN_K..=MAX_K).contains(&k),
            "k must be in [{MIN_K}, {MAX_K}], got {k}"
        );
        Self::make(k, Schedule::Deterministic, R::default())
    }

    /// Creates a new sketch with the given k and compaction schedule.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ErrorKind::InvalidParameter`] if `k` is out
    /// of range.
    pub fn with_schedule(k: u32, schedule: Schedule) -> Result<Self, Error> {
        Self::with_schedule_and_rng(k, schedule, R::default())
    }

    /// Creates a new sketch sized for a target rank error `eps`, with the
    /// deterministic compaction schedule.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ErrorKind::InvalidParameter`] if `eps` is
    /// not in `(0.0, MAX_EPS]`.
    pub fn with_eps(eps: f64) -> Result<Self, Error> {
        if !(eps > 0.0 && eps <= MAX_EPS) {
            return Err(Error::invalid_param(format!(
                "eps must be in (0.0, {MAX_EPS}], got {eps}"
            )));
        }
        let k = ((DEFAULT_K as f64 * 0.01) / eps).ceil() as u32;
        let k = k.clamp(MIN_K, MAX_K);
        Ok(Self::make(k, Schedule::Deterministic, R::default()))
    }
}

#[allow(private_bounds)]
impl<T: ReqItem, R: RandomSource> ReqSketch<T, R> {
    /// Creates a new sketch with the given k, compaction schedule, and
    /// explicit random source.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ErrorKind::InvalidParameter`] if `k` is out
    /// of range.
    pub fn with_schedule_and_rng(k: u32, schedule: Schedule, rng: R) -> Result<Self, Error> {
        if !(MIN_K..=MAX_K).contains(&k) {
            return Err(Error::invalid_param(format!(
                "k must be in [{MIN_K}, {MAX_K}], got {k}"
            )));
        }
        Ok(Self::make(k, schedule, rng))
    }

    fn make(k: u32, schedule: Schedule, rng: R) -> Self {
        let mut sketch = Self {
            k,
            schedule,
            compactors: Vec::new(),
            size: 0,
            n: 0,
            max_nom_size: 0,
            rng,
        };
        sketch.grow();
        sketch
    }

    /// Returns parameter k used to configure this sketch.
    pub fn k(&self) -> u32 {
        self.k
    }

    /// Returns the configured compaction schedule.
    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Returns the number of compactor heights currently allocated.
    pub fn height(&self) -> u32 {
        self.compactors.len() as u32
    }

    /// Returns the total weight of the stream.
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Returns true if the sketch has not seen any data.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Returns the number of retained items.
    pub fn num_retained(&self) -> u64 {
        self.size
    }

    /// Updates the sketch with a new item.
    pub fn update(&mut self, item: T) {
        self.compactors[0].push(item);
        self.size += 1;
        self.n += 1;
        if self.size >= self.max_nom_size {
            self.compress(true);
        }
        debug_assert!(
            self.size < self.max_nom_size,
            "size must stay below maxNomSize"
        );
    }

    /// Merges another sketch into this one.
    pub fn merge(&mut self, other: &ReqSketch<T, R>) {
        if other.is_empty() {
            return;
        }
        while self.height() < other.height() {
            self.grow();
        }
        for (h, other_compactor) in other.compactors.iter().enumerate() {
            self.compactors[h].merge_from(other_compactor);
        }
        self.n += other.n;
        self.recompute_size();
        while self.size >= self.max_nom_size {
            self.compress(false);
        }
    }

    /// Returns the estimated rank of `value`: the number of items in the
    /// observed stream less than (or, if `inclusive`, less than or equal
    /// to) `value`.
    pub fn rank(&self, value: &T, inclusive: bool) -> u64 {
        self.compactors
            .iter()
            .enumerate()
            .map(|(h, c)| c.rank(value, inclusive) * (1u64 << h))
            .sum()
    }

    /// Returns an upper bound on `rank(value, true)` at `z` standard
    /// deviations of confidence.
    pub fn rank_upper_bound(&self, value: &T, z: f64) -> u64 {
        let rank = self.rank(value, true);
        if rank as f64 <= self.k as f64 * INIT_NUM_SECTIONS as f64 {
            rank
        } else {
            ((1.0 + z * self.max_relative_standard_error()) * rank as f64).ceil() as u64
        }
    }

    /// Returns a lower bound on `rank(value, true)` at `z` standard
    /// deviations of confidence.
    pub fn rank_lower_bound(&self, value: &T, z: f64) -> u64 {
        let rank = self.rank(value, true);
        if rank as f64 <= self.k as f64 * INIT_NUM_SECTIONS as f64 {
            rank
        } else {
            ((1.0 - z * self.max_relative_standard_error()) * rank as f64).floor() as u64
        }
    }

    /// Returns an a priori estimate of relative standard error, as a
    /// fraction in `[0, 1]`, independent of rank or `n`.
    pub fn max_relative_standard_error(&self) -> f64 {
        (8.0 / INIT_NUM_SECTIONS as f64).sqrt() / self.k as f64
    }

    /// Flattens every compactor into `(item, weight)` pairs, sorted
    /// ascending by item, where `weight = 2^h`.
    pub fn items_with_weights(&self) -> Vec<(T, u64)> {
        let mut items_and_weights: Vec<(T, u64)> = self
            .compactors
            .iter()
            .enumerate()
            .flat_map(|(h, c)| c.items().iter().cloned().map(move |item| (item, 1u64 << h)))
            .collect();
        items_and_weights.sort_by(|a, b| T::cmp(&a.0, &b.0));
        items_and_weights
    }

    /// Returns `(item, cumulative_weight)` pairs sorted ascending by item.
    pub fn ranks(&self) -> Vec<(T, u64)> {
        let mut cum_weight = 0u64;
        self.items_with_weights()
            .into_iter()
            .map(|(item, weight)| {
                cum_weight += weight;
                (item, cum_weight)
            })
            .collect()
    }

    /// Returns `(item, cumulative_weight / total_weight)` pairs sorted
    /// ascending by item.
    pub fn cdf(&self) -> Vec<(T, f64)> {
        let items_and_weights = self.items_with_weights();
        let total_weight: u64 = items_and_weights.iter().map(|(_, w)| w).sum();
        let mut cum_weight = 0u64;
        items_and_weights
            .into_iter()
            .map(|(item, weight)| {
                cum_weight += weight;
                (item, cum_weight as f64 / total_weight as f64)
            })
            .collect()
    }

    /// Returns the input item whose rank is approximately `q · N`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ErrorKind::InvalidParameter`] if `q` is not
    /// in `[0.0, 1.0]`, and [`crate::error::ErrorKind::EmptySketch`] if
    /// the sketch has not observed any items.
    pub fn quantile(&self, q: f64) -> Result<T, Error> {
        if self.is_empty() {
            return Err(Error::empty_sketch("quantile"));
        }
        if !(0.0..=1.0).contains(&q) {
            return Err(Error::invalid_param(format!(
                "q must be in [0.0, 1.0], got {q}"
            )));
        }
        let desired_rank = q * self.n as f64;
        let ranks = self.ranks();
        let mut lo = 0usize;
        let mut hi = ranks.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if desired_rank > ranks[mid].1 as f64 {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(ranks[lo].0.clone())
    }

    /// Serializes the sketch to bytes.
    pub fn serialize(&self) -> Vec<u8> {
        super::serialization::serialize(self)
    }

    fn grow(&mut self) {
        let height = self.compactors.len() as u32;
        self.compactors.push(ReqCompactor::new(self.k, height));
        self.update_max_nom_size();
    }

    fn update_max_nom_size(&mut self) {
        self.max_nom_size = self
            .compactors
            .iter()
            .map(|c| c.nom_capacity() as u64)
            .sum();
    }

    fn recompute_size(&mut self) {
        self.size = self.compactors.iter().map(|c| c.len() as u64).sum();
    }

    fn compress(&mut self, lazy: bool) {
        self.update_max_nom_size();
        if self.size < self.max_nom_size {
            return;
        }
        let mut h = 0;
        while h < self.compactors.len() {
            if self.compactors[h].len() as u32 >= self.compactors[h].nom_capacity() {
                if h + 1 >= self.compactors.len() {
                    self.grow();
                }
                let (left, right) = self.compactors.split_at_mut(h + 1);
                let promoted = compact(&mut left[h], self.schedule, &mut self.rng);
                right[0].extend(promoted);
                self.recompute_size();
                if lazy && self.size < self.max_nom_size {
                    break;
                }
            }
            h += 1;
        }
    }

    pub(crate) fn compactors(&self) -> &[ReqCompactor<T>] {
        &self.compactors
    }
}

impl<T: ReqItem> ReqSketch<T, XorShift64> {
    /// Rebuilds a sketch from its raw serialized fields.
    pub(crate) fn from_raw_parts(
        k: u32,
        schedule: Schedule,
        compactors: Vec<ReqCompactor<T>>,
        n: u64,
    ) -> Self {
        let mut sketch = Self {
            k,
            schedule,
            compactors,
            size: 0,
            n,
            max_nom_size: 0,
            rng: XorShift64::default(),
        };
        sketch.recompute_size();
        sketch.update_max_nom_size();
        sketch
    }
}

impl<T: ReqItem> ReqSketch<T, XorShift64> {
    /// Deserializes a sketch from bytes.
    ///
    /// Deserialized sketches always use a fresh [`XorShift64`] source,
    /// since the binary format does not carry RNG state.
    pub fn deserialize(bytes: &[u8]) -> Result<ReqSketch<T, XorShift64>, Error> {
        super::serialization::deserialize(bytes)
    }
}

impl ReqItem for f32 {
    fn cmp(a: &Self, b: &Self) -> Ordering {
        a.partial_cmp(b).unwrap_or(Ordering::Greater)
    }

    fn serialized_size(_value: &Self) -> usize {
        4
    }

    fn serialize(value: &Self, bytes: &mut SketchBytes) {
        bytes.write_f32_le(*value);
    }

    fn deserialize(input: &mut SketchSlice<'_>) -> Result<Self, Error> {
        input
            .read_f32_le()
            .map_err(|_| Error::insufficient_data("f32"))
    }
}

impl ReqItem for f64 {
    fn cmp(a: &Self, b: &Self) -> Ordering {
        a.partial_cmp(b).unwrap_or(Ordering::Greater)
    }

    fn serialized_size(_value: &Self) -> usize {
        8
    }

    fn serialize(value: &Self, bytes: &mut SketchBytes) {
        bytes.write_f64_le(*value);
    }

    fn deserialize(input: &mut SketchSlice<'_>) -> Result<Self, Error> {
        input
            .read_f64_le()
            .map_err(|_| Error::insufficient_data("f64"))
    }
}

impl ReqItem for i64 {
    fn cmp(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }

    fn serialized_size(_value: &Self) -> usize {
        8
    }

    fn serialize(value: &Self, bytes: &mut SketchBytes) {
        bytes.write_i64_le(*value);
    }

    fn deserialize(input: &mut SketchSlice<'_>) -> Result<Self, Error> {
        input
            .read_i64_le()
            .map_err(|_| Error::insufficient_data("i64"))
    }
}

impl ReqItem for String {
    fn cmp(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }

    fn serialized_size(value: &Self) -> usize {
        4 + value.len()
    }

    fn serialize(value: &Self, bytes: &mut SketchBytes) {
        bytes.write_u32_le(value.len() as u32);
        bytes.write(value.as_bytes());
    }

    fn deserialize(input: &mut SketchSlice<'_>) -> Result<Self, Error> {
        let len = input
            .read_u32_le()
            .map_err(|_| Error::insufficient_data("string_len"))? as usize;
        let mut buf = vec![0u8; len];
        input
            .read_exact(&mut buf)
            .map_err(|_| Error::insufficient_data("string_bytes"))?;
        String::from_utf8(buf).map_err(|_| Error::deserial("invalid utf-8 string"))
    }
}
