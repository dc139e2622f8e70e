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

use super::INIT_NUM_SECTIONS;
use super::MIN_SECTION_SIZE;
use super::sketch::ReqItem;
use crate::common::RandomSource;
use crate::common::coin;
use crate::common::geometric;
use crate::common::uniform_int;

/// Selects how many trailing sections a [`ReqCompactor`] thins on each
/// call to `compact`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// `t = trailing_ones(schedState) + 1`. Deterministic and the default;
    /// merging two compactors preserves the invariant by OR-ing schedState.
    Deterministic,
    /// Draw coins until a success, capped at `numSections`.
    Randomized,
    /// Pick `t` uniformly from `[1, numSections]`.
    RandomizedLinear,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReqCompactor<T> {
    items: Vec<T>,
    num_compactions: u64,
    sched_state: u64,
    offset: u32,
    section_size: u32,
    section_size_f: f64,
    num_sections: u32,
    height: u32,
}

impl<T> ReqCompactor<T> {
    pub(crate) fn new(section_size: u32, height: u32) -> Self {
        Self {
            items: Vec::new(),
            num_compactions: 0,
            sched_state: 0,
            offset: 0,
            section_size,
            section_size_f: section_size as f64,
            num_sections: INIT_NUM_SECTIONS,
            height,
        }
    }

    /// Rebuilds a compactor from its raw serialized fields.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        items: Vec<T>,
        num_compactions: u64,
        sched_state: u64,
        offset: u32,
        section_size: u32,
        section_size_f: f64,
        num_sections: u32,
        height: u32,
    ) -> Self {
        Self {
            items,
            num_compactions,
            sched_state,
            offset,
            section_size,
            section_size_f,
            num_sections,
            height,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn items(&self) -> &[T] {
        &self.items
    }

    pub(crate) fn height(&self) -> u32 {
        self.height
    }

    pub(crate) fn num_compactions(&self) -> u64 {
        self.num_compactions
    }

    pub(crate) fn sched_state(&self) -> u64 {
        self.sched_state
    }

    pub(crate) fn offset(&self) -> u32 {
        self.offset
    }

    pub(crate) fn section_size(&self) -> u32 {
        self.section_size
    }

    pub(crate) fn section_size_f(&self) -> f64 {
        self.section_size_f
    }

    pub(crate) fn num_sections(&self) -> u32 {
        self.num_sections
    }

    pub(crate) fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub(crate) fn extend(&mut self, items: Vec<T>) {
        self.items.extend(items);
    }

    pub(crate) fn nom_capacity(&self) -> u32 {
        let cap = 2 * self.num_sections * self.section_size;
        assert!(cap > 1, "capacity must be > 1");
        cap
    }

    /// Merges `other`'s buffer and schedule state into this compactor.
    ///
    /// The schedule states are combined with bitwise OR, not sum or XOR:
    /// OR-ing preserves the deterministic schedule's invariant that a
    /// compaction after a merge continues to descend into the already
    /// thinned suffix of the buffer.
    pub(crate) fn merge_from(&mut self, other: &ReqCompactor<T>)
    where
        T: Clone,
    {
        self.sched_state |= other.sched_state;
        self.num_compactions += other.num_compactions;
        ensure_enough_sections(self);
        self.items.extend(other.items.iter().cloned());
    }
}

impl<T: ReqItem> ReqCompactor<T> {
    pub(crate) fn rank(&self, value: &T, inclusive: bool) -> u64 {
        self.items
            .iter()
            .filter(|v| {
                let ord = T::cmp(v, value);
                if inclusive {
                    ord != Ordering::Greater
                } else {
                    ord == Ordering::Less
                }
            })
            .count() as u64
    }
}

/// Compacts `compactor`, returning the items promoted to the next height.
///
/// Mirrors the reference implementation's `RelativeCompactor.compact`:
/// sorts the buffer, picks a deterministic or randomized count of
/// trailing sections to thin, and emits every other item from that
/// suffix starting at an alternating (or coin-flipped) offset.
pub(crate) fn compact<T: ReqItem, R: RandomSource>(
    compactor: &mut ReqCompactor<T>,
    schedule: Schedule,
    rng: &mut R,
) -> Vec<T> {
    let cap = compactor.nom_capacity() as usize;
    assert!(
        compactor.items.len() >= cap,
        "compact called below capacity"
    );

    compactor.items.sort_by(T::cmp);
    let len = compactor.items.len();
    let half = cap / 2;

    let mut s = if compactor.section_size < MIN_SECTION_SIZE {
        half
    } else {
        let t = sections_to_compact(schedule, compactor, rng) as usize;
        half + (compactor.num_sections as usize - t) * compactor.section_size as usize
    };
    if (len - s) % 2 == 1 {
        if s > 0 {
            s -= 1;
        } else {
            s += 1;
        }
    }
    debug_assert!(s < len, "compaction must leave at least one item to emit");
    debug_assert!(
        s + 1 >= half,
        "lower half of the buffer must remain unaffected by compaction"
    );

    if compactor.num_compactions % 2 == 1 {
        compactor.offset = 1 - compactor.offset;
    } else {
        compactor.offset = coin(rng);
    }

    let mut emitted = Vec::new();
    let mut i = s + compactor.offset as usize;
    while i < len {
        emitted.push(compactor.items[i].clone());
        i += 2;
    }
    compactor.items.truncate(s);

    compactor.num_compactions += 1;
    compactor.sched_state += 1;
    ensure_enough_sections(compactor);

    emitted
}

fn sections_to_compact<T, R: RandomSource>(
    schedule: Schedule,
    compactor: &ReqCompactor<T>,
    rng: &mut R,
) -> u32 {
    match schedule {
        Schedule::Deterministic => compactor.sched_state.trailing_ones() + 1,
        Schedule::Randomized => (geometric(rng, 0.5) + 1).min(compactor.num_sections),
        Schedule::RandomizedLinear => uniform_int(rng, 1, compactor.num_sections),
    }
}

/// Doubles `numSections` and shrinks `sectionSize` by `√2` once enough
/// compactions have accumulated, keeping capacity growth proportional to
/// `√log(numCompactions)`.
fn ensure_enough_sections<T>(compactor: &mut ReqCompactor<T>) {
    if compactor.num_compactions >= 1u64 << (compactor.num_sections - 1) {
        compactor.num_sections *= 2;
        compactor.section_size_f /= std::f64::consts::SQRT_2;
        compactor.section_size = compactor.section_size_f as u32;
    }
}
