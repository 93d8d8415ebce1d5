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
//! Process-wide configuration is initialized once, so these checks live in their own test binary.

use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::DataType;

use grouping_agg::{AggError, AggKind, Chunk, MemTracker, create_grouping_aggregator};
use grouping_agg::{grouping_config, grouping_logging};

#[test]
fn test_aggregation_section_sizes_and_limits_grouping_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grouping_agg.toml");
    std::fs::write(
        &path,
        r#"
log_level = "debug"

[aggregation]
initial_group_capacity = 4
state_mem_limit_bytes = 256

[debug]
log_add_input = true
"#,
    )
    .unwrap();
    let cfg = grouping_config::init_from_path(&path).unwrap();
    grouping_logging::init_from_config(cfg);
    assert_eq!(cfg.aggregation.initial_group_capacity, 4);

    let query = MemTracker::new_root("query");
    let kind = AggKind::from_name("sum", &DataType::Int64, &[]).unwrap();
    let mut agg = create_grouping_aggregator(&kind, vec![0, 1], &query).unwrap();

    // Pre-sized state is charged up front.
    assert!(query.current() > 0);
    let children = query.children();
    let state_tracker = &children[0];
    assert_eq!(state_tracker.label(), "GroupingState");
    assert_eq!(state_tracker.limit(), 256);

    let page = Chunk::try_from_columns(vec![Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef])
        .unwrap();
    let mut input = agg.prepare_process_page(&page).unwrap();
    input.add_vector(0, &Int64Array::from(vec![0, 3])).unwrap();
    let err = input
        .add_vector(0, &Int64Array::from(vec![1000, 1000]))
        .unwrap_err();
    assert!(matches!(err, AggError::MemoryLimitExceeded(_)), "err={}", err);
    assert!(err.to_string().contains("tracker=GroupingState"), "err={}", err);
    drop(input);

    agg.close();
    assert_eq!(query.current(), 0);
}
