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

use sketchtower::error::ErrorKind;
use sketchtower::req::DEFAULT_K;
use sketchtower::req::MAX_EPS;
use sketchtower::req::ReqSketch;
use sketchtower::req::Schedule;

#[test]
fn test_empty() {
    let sketch = ReqSketch::<f64>::new(DEFAULT_K);
    assert!(sketch.is_empty());
    assert_eq!(sketch.n(), 0);
    assert_eq!(sketch.num_retained(), 0);
    assert_eq!(
        sketch.quantile(0.5).unwrap_err().kind(),
        ErrorKind::EmptySketch
    );
}

#[test]
fn test_with_eps_rejects_out_of_range() {
    assert_eq!(
        ReqSketch::<f64>::with_eps(0.0).unwrap_err().kind(),
        ErrorKind::InvalidParameter
    );
    assert_eq!(
        ReqSketch::<f64>::with_eps(MAX_EPS + 0.01)
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidParameter
    );
    assert!(ReqSketch::<f64>::with_eps(0.05).is_ok());
}

#[test]
fn test_one_item() {
    let mut sketch = ReqSketch::<f64>::new(DEFAULT_K);
    sketch.update(1.0);
    assert!(!sketch.is_empty());
    assert_eq!(sketch.n(), 1);
    assert_eq!(sketch.rank(&1.0, true), 1);
    assert_eq!(sketch.rank(&1.0, false), 0);
    assert_eq!(sketch.rank(&2.0, false), 1);
    assert_eq!(sketch.quantile(0.5).unwrap(), 1.0);
}

#[test]
fn test_quantile_out_of_range_is_invalid_parameter() {
    let mut sketch = ReqSketch::<f64>::new(DEFAULT_K);
    sketch.update(0.0);
    assert_eq!(
        sketch.quantile(-0.1).unwrap_err().kind(),
        ErrorKind::InvalidParameter
    );
    assert_eq!(
        sketch.quantile(1.1).unwrap_err().kind(),
        ErrorKind::InvalidParameter
    );
}

#[test]
fn test_ten_items_quantiles() {
    let mut sketch = ReqSketch::<f64>::new(DEFAULT_K);
    for i in 1..=10 {
        sketch.update(i as f64);
    }
    assert_eq!(sketch.quantile(0.0).unwrap(), 1.0);
    assert_eq!(sketch.quantile(1.0).unwrap(), 10.0);
    assert_eq!(sketch.n(), 10);
}

#[test]
fn test_many_items_reversed_stream_rank_error() {
    let mut sketch = ReqSketch::<f64>::new(50);
    let n = 10_000;
    for i in 0..n {
        sketch.update((n - i) as f64);
    }
    assert_eq!(sketch.n(), n as u64);

    for q in [0.01, 0.1, 0.5] {
        let item = sketch.quantile(q).unwrap();
        let rank = sketch.rank(&item, true) as f64 / n as f64;
        let relative_error = (rank - q).abs() / q;
        assert!(
            relative_error <= 0.05,
            "q={q} got relative rank {rank}, relative error {relative_error}"
        );
    }
}

#[test]
fn test_size_bound_under_load() {
    let mut sketch = ReqSketch::<f64>::new(100);
    let n = 1_000_000u64;
    for i in 0..n {
        sketch.update(i as f64);
    }
    let bound = 16.0 * sketch.k() as f64 * (n as f64 / sketch.k() as f64).log2();
    assert!(
        (sketch.num_retained() as f64) <= bound,
        "retained {} exceeds bound {bound}",
        sketch.num_retained()
    );
}

#[test]
fn test_merge() {
    let mut sketch1 = ReqSketch::<f64>::new(50);
    let mut sketch2 = ReqSketch::<f64>::new(50);
    let n = 10_000;
    for i in 0..n {
        sketch1.update(i as f64);
        sketch2.update((2 * n - i - 1) as f64);
    }

    sketch1.merge(&sketch2);

    assert!(!sketch1.is_empty());
    assert_eq!(sketch1.n(), (2 * n) as u64);
    let median = sketch1.quantile(0.5).unwrap();
    let rank = sketch1.rank(&median, true) as f64 / sketch1.n() as f64;
    assert!((rank - 0.5).abs() < 0.05, "got rank {rank}");
}

#[test]
fn test_merge_empty_is_noop() {
    let mut sketch1 = ReqSketch::<f64>::new(DEFAULT_K);
    sketch1.update(1.0);
    sketch1.update(2.0);
    let sketch2 = ReqSketch::<f64>::new(DEFAULT_K);
    sketch1.merge(&sketch2);
    assert_eq!(sketch1.n(), 2);
}

#[test]
fn test_randomized_schedules() {
    for schedule in [Schedule::Randomized, Schedule::RandomizedLinear] {
        let mut sketch = ReqSketch::<f64>::with_schedule(50, schedule).unwrap();
        for i in 0..5_000 {
            sketch.update(i as f64);
        }
        assert_eq!(sketch.n(), 5_000);
        assert_eq!(sketch.schedule(), schedule);
        let median = sketch.quantile(0.5).unwrap();
        let rank = sketch.rank(&median, true) as f64 / sketch.n() as f64;
        assert!((rank - 0.5).abs() < 0.1, "got rank {rank}");
    }
}

#[test]
fn test_serialize_roundtrip() {
    let mut sketch = ReqSketch::<f64>::new(DEFAULT_K);
    for i in 0..5_000 {
        sketch.update(i as f64);
    }
    let bytes = sketch.serialize();
    let restored = ReqSketch::<f64>::deserialize(&bytes).unwrap();
    assert_eq!(restored.n(), sketch.n());
    assert_eq!(restored.k(), sketch.k());
    assert_eq!(
        restored.quantile(0.5).unwrap(),
        sketch.quantile(0.5).unwrap()
    );
}

#[test]
fn test_serialize_empty() {
    let sketch = ReqSketch::<f64>::new(DEFAULT_K);
    let bytes = sketch.serialize();
    let restored = ReqSketch::<f64>::deserialize(&bytes).unwrap();
    assert!(restored.is_empty());
    assert_eq!(restored.k(), DEFAULT_K);
}

#[test]
fn test_serialize_string_items() {
    let mut sketch = ReqSketch::<String>::new(DEFAULT_K);
    for i in 0..200 {
        sketch.update(format!("item-{i:04}"));
    }
    let bytes = sketch.serialize();
    let restored = ReqSketch::<String>::deserialize(&bytes).unwrap();
    assert_eq!(restored.n(), sketch.n());
    assert_eq!(
        restored.quantile(0.5).unwrap(),
        sketch.quantile(0.5).unwrap()
    );
}
