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

//! Shared random utilities for sketches.

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Random number source for sketches.
pub trait RandomSource {
    /// Returns the next random 64-bit value.
    fn next_u64(&mut self) -> u64;

    /// Returns a random boolean value.
    fn next_bool(&mut self) -> bool {
        (self.next_u64() & 1) != 0
    }
}

/// Xorshift-based random generator for sketch operations.
#[derive(Debug, Clone, Copy)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// Creates a new generator using the provided seed.
    pub fn seeded(seed: u64) -> Self {
        let state = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state }
    }
}

impl Default for XorShift64 {
    fn default() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let mut seed = nanos as u64 ^ (std::process::id() as u64);
        if seed == 0 {
            seed = 0x9e3779b97f4a7c15;
        }
        Self::seeded(seed)
    }
}

impl RandomSource for XorShift64 {
    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

/// Draws a fair coin: 0 or 1 with probability 1/2 each.
pub fn coin<R: RandomSource>(rng: &mut R) -> u32 {
    (rng.next_u64() & 1) as u32
}

/// Draws a uniform integer in the closed range `[lo, hi]`.
///
/// # Panics
///
/// Panics if `lo > hi`.
pub fn uniform_int<R: RandomSource>(rng: &mut R, lo: u32, hi: u32) -> u32 {
    assert!(lo <= hi, "lo must be <= hi, got lo={lo} hi={hi}");
    let span = (hi - lo) as u64 + 1;
    lo + (rng.next_u64() % span) as u32
}

/// Draws from a geometric distribution over non-negative integers: the number of
/// failed coin flips (each succeeding with probability `p`) before the first success.
///
/// # Panics
///
/// Panics if `p` is not in `(0.0, 1.0]`.
pub fn geometric<R: RandomSource>(rng: &mut R, p: f64) -> u32 {
    assert!(p > 0.0 && p <= 1.0, "p must be in (0.0, 1.0], got {p}");
    let mut count = 0u32;
    loop {
        let draw = (rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
        if draw < p {
            return count;
        }
        count += 1;
    }
}
