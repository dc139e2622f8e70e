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

//! Mergeable streaming quantile sketches and a companion kernel-density
//! sketch, built on a shared compactor-tower architecture: a tower of
//! height-indexed buffers that compress weighted samples by halving their
//! count while doubling their implicit weight.
//!
//! - [`kll`] — additive-error quantile sketch.
//! - [`req`] — relative-error quantile sketch (ReqSketch), with a
//!   multi-section compactor buffer and a deterministic or randomized
//!   compaction schedule.
//! - [`density`] — Gaussian Density Estimator (GDE), the compactor idea
//!   generalized from ordered items to vectors, producing a weighted
//!   coreset that approximates a Gaussian-kernel density.
//!
//! Every sketch owns its own [`common::RandomSource`], so merging two
//! sketches never ties their random streams together.

mod codec;

pub mod common;
pub mod density;
pub mod error;
pub mod kll;
pub mod req;
