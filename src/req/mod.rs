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

//! Relative-error quantiles sketch: for any value *v* with true rank *r*,
//! the returned rank is within ±ε·r, using a multi-section compactor
//! buffer with a deterministic (or randomized) compaction schedule.
//!
//! This implementation follows the algorithm described in Karnin, Lang,
//! and Liberty's "Relative Error Streaming Quantiles" and the reference
//! proof-of-concept implementation, adapted to the same compactor-tower
//! architecture and binary serialization convention used by
//! [`crate::kll`].
//!
//! # Usage
//!
//! ```rust
//! # use sketchtower::req::ReqSketch;
//! let mut sketch = ReqSketch::<f64>::new(50);
//! sketch.update(1.0);
//! sketch.update(2.0);
//! let q = sketch.quantile(0.5).unwrap();
//! assert!(q == 1.0 || q == 2.0);
//! ```

mod compactor;
mod serialization;
mod sketch;

pub use self::compactor::Schedule;
pub use self::sketch::ReqSketch;

/// Default value of parameter k, corresponding to roughly a 1% relative
/// error guarantee with constant probability.
pub const DEFAULT_K: u32 = 50;
/// Minimum value of parameter k.
pub const MIN_K: u32 = 1;
/// Maximum value of parameter k.
pub const MAX_K: u32 = u32::MAX / 4;
/// Maximum allowed rank error for the `with_eps` constructor.
pub const MAX_EPS: f64 = 0.1;
/// Initial upper bound on log2(number of compactions) + 1.
pub const INIT_NUM_SECTIONS: u32 = 3;
/// Below this section size, compaction falls back to halving the buffer.
pub const MIN_SECTION_SIZE: u32 = 4;
