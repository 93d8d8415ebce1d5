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
//! Common utilities and helpers for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, ListArray};
use arrow::datatypes::{ArrowPrimitiveType, DataType};

use grouping_agg::{
    AggKind, Chunk, GroupIdBlock, GroupingAggregatorFunction, MemTracker,
    create_grouping_aggregator,
};

pub fn chunk(columns: Vec<ArrayRef>) -> Chunk {
    Chunk::try_from_columns(columns).unwrap()
}

pub fn kind(name: &str, input: DataType, params: &[f64]) -> AggKind {
    AggKind::from_name(name, &input, params).unwrap()
}

/// Aggregator reading its raw input from channel 0, charging a fresh root tracker.
pub fn new_agg(name: &str, input: DataType, params: &[f64]) -> Box<dyn GroupingAggregatorFunction> {
    new_agg_with_tracker(name, input, params, &MemTracker::new_root("test"))
}

pub fn new_agg_with_tracker(
    name: &str,
    input: DataType,
    params: &[f64],
    tracker: &Arc<MemTracker>,
) -> Box<dyn GroupingAggregatorFunction> {
    let kind = kind(name, input, params);
    let channels = (0..intermediate_width(&kind)).collect();
    create_grouping_aggregator(&kind, channels, tracker).unwrap()
}

/// Raw input uses channel 0; intermediate input uses one channel per state column.
fn intermediate_width(kind: &AggKind) -> usize {
    match kind {
        AggKind::Percentile { .. } => 1,
        AggKind::Count { .. } | AggKind::Sum { .. } => 2,
    }
}

pub fn add_vector(agg: &mut dyn GroupingAggregatorFunction, values: ArrayRef, groups: &[i64]) {
    let page = chunk(vec![values]);
    agg.prepare_process_page(&page)
        .unwrap()
        .add_vector(0, &Int64Array::from(groups.to_vec()))
        .unwrap();
}

pub fn add_block(agg: &mut dyn GroupingAggregatorFunction, values: ArrayRef, groups: &ArrayRef) {
    let page = chunk(vec![values]);
    let groups = GroupIdBlock::try_new(groups.as_ref()).unwrap();
    agg.prepare_process_page(&page)
        .unwrap()
        .add_block(0, &groups)
        .unwrap();
}

pub fn final_column(agg: &mut dyn GroupingAggregatorFunction, selected: &[u32]) -> ArrayRef {
    let mut blocks = vec![None];
    agg.evaluate_final(&mut blocks, 0, selected).unwrap();
    let out = blocks.pop().flatten().unwrap();
    assert_eq!(out.len(), selected.len());
    out
}

/// Serialized state of `selected` as a chunk whose columns line up with the descriptor.
pub fn intermediate_page(agg: &dyn GroupingAggregatorFunction, selected: &[u32]) -> Chunk {
    let mut blocks = vec![None; agg.intermediate_block_count()];
    agg.evaluate_intermediate(&mut blocks, 0, selected).unwrap();
    chunk(blocks.into_iter().map(Option::unwrap).collect())
}

pub fn list<T: ArrowPrimitiveType>(rows: Vec<Option<Vec<Option<T::Native>>>>) -> ArrayRef {
    Arc::new(ListArray::from_iter_primitive::<T, _, _>(rows))
}
