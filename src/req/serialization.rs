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

//! Binary serialization format for relative-error quantiles sketches.
//!
//! Layout follows the same preamble convention as [`crate::kll`]'s
//! serialization: a short preamble for empty sketches, a longer one
//! carrying `k`, the compaction schedule, `n`, and one section per
//! compactor height.

use super::compactor::ReqCompactor;
use super::compactor::Schedule;
use super::sketch::ReqItem;
use super::sketch::ReqSketch;
use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::assert::ensure_preamble_longs_in;
use crate::codec::assert::ensure_serial_version_is;
use crate::codec::family::Family;
use crate::common::RandomSource;
use crate::common::XorShift64;
use crate::error::Error;

const PREAMBLE_INTS_SHORT: u8 = 2;
const PREAMBLE_INTS_FULL: u8 = 4;
const SERIAL_VERSION: u8 = 1;

const FLAG_EMPTY: u8 = 1 << 0;

fn schedule_to_byte(schedule: Schedule) -> u8 {
    match schedule {
        Schedule::Deterministic => 0,
        Schedule::Randomized => 1,
        Schedule::RandomizedLinear => 2,
    }
}

fn byte_to_schedule(byte: u8) -> Result<Schedule, Error> {
    match byte {
        0 => Ok(Schedule::Deterministic),
        1 => Ok(Schedule::Randomized),
        2 => Ok(Schedule::RandomizedLinear),
        other => Err(Error::deserial(format!("unknown schedule tag: {other}"))),
    }
}

pub(super) fn serialize<T: ReqItem, R: RandomSource>(sketch: &ReqSketch<T, R>) -> Vec<u8> {
    let is_empty = sketch.is_empty();
    let preamble_ints = if is_empty {
        PREAMBLE_INTS_SHORT
    } else {
        PREAMBLE_INTS_FULL
    };

    let mut bytes = SketchBytes::with_capacity(64);
    bytes.write_u8(preamble_ints);
    bytes.write_u8(SERIAL_VERSION);
    bytes.write_u8(Family::REQ.id);
    let flags = if is_empty { FLAG_EMPTY } else { 0 };
    bytes.write_u8(flags);
    bytes.write_u32_le(sketch.k());
    bytes.write_u8(schedule_to_byte(sketch.schedule()));

    if is_empty {
        return bytes.into_bytes();
    }

    bytes.write_u64_le(sketch.n());
    bytes.write_u32_le(sketch.compactors().len() as u32);
    for compactor in sketch.compactors() {
        bytes.write_u64_le(compactor.num_compactions());
        bytes.write_u64_le(compactor.sched_state());
        bytes.write_u32_le(compactor.offset());
        bytes.write_u32_le(compactor.section_size());
        bytes.write_f64_le(compactor.section_size_f());
        bytes.write_u32_le(compactor.num_sections());
        bytes.write_u32_le(compactor.height());
        bytes.write_u32_le(compactor.items().len() as u32);
        for item in compactor.items() {
            T::serialize(item, &mut bytes);
        }
    }
    bytes.into_bytes()
}

pub(super) fn deserialize<T: ReqItem>(bytes: &[u8]) -> Result<ReqSketch<T, XorShift64>, Error> {
    fn make_error(tag: &'static str) -> impl FnOnce(std::io::Error) -> Error {
        move |_| Error::insufficient_data(tag)
    }

    let mut cursor = SketchSlice::new(bytes);
    let preamble_ints = cursor.read_u8().map_err(make_error("preamble_ints"))?;
    let serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
    let family_id = cursor.read_u8().map_err(make_error("family_id"))?;
    let flags = cursor.read_u8().map_err(make_error("flags"))?;
    let k = cursor.read_u32_le().map_err(make_error("k"))?;
    let schedule_byte = cursor.read_u8().map_err(make_error("schedule"))?;

    Family::REQ.validate_id(family_id)?;
    ensure_serial_version_is(SERIAL_VERSION, serial_version)?;
    let schedule = byte_to_schedule(schedule_byte)?;

    let is_empty = (flags & FLAG_EMPTY) != 0;
    let expected_preamble = if is_empty {
        PREAMBLE_INTS_SHORT
    } else {
        PREAMBLE_INTS_FULL
    };
    ensure_preamble_longs_in(&[expected_preamble], preamble_ints)?;

    if is_empty {
        return Ok(ReqSketch::from_raw_parts(k, schedule, Vec::new(), 0));
    }

    let n = cursor.read_u64_le().map_err(make_error("n"))?;
    let num_compactors = cursor.read_u32_le().map_err(make_error("num_compactors"))?;

    let mut compactors = Vec::with_capacity(num_compactors as usize);
    for _ in 0..num_compactors {
        let num_compactions = cursor
            .read_u64_le()
            .map_err(make_error("num_compactions"))?;
        let sched_state = cursor.read_u64_le().map_err(make_error("sched_state"))?;
        let offset = cursor.read_u32_le().map_err(make_error("offset"))?;
        let section_size = cursor.read_u32_le().map_err(make_error("section_size"))?;
        let section_size_f = cursor.read_f64_le().map_err(make_error("section_size_f"))?;
        let num_sections = cursor.read_u32_le().map_err(make_error("num_sections"))?;
        let height = cursor.read_u32_le().map_err(make_error("height"))?;
        let num_items = cursor.read_u32_le().map_err(make_error("num_items"))?;
        let mut items = Vec::with_capacity(num_items as usize);
        for _ in 0..num_items {
            items.push(T::deserialize(&mut cursor)?);
        }
        compactors.push(ReqCompactor::from_parts(
            items,
            num_compactions,
            sched_state,
            offset,
            section_size,
            section_size_f,
            num_sections,
            height,
        ));
    }

    Ok(ReqSketch::from_raw_parts(k, schedule, compactors, n))
}
