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
use std::marker::PhantomData;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Int64Array};
use arrow::datatypes::{DataType, Int64Type};

use crate::common::error::AggError;
use crate::exec::agg::kernel::GroupingAggregateFunction;
use crate::exec::agg::spec::{AggKind, IntermediateStateDesc};
use crate::exec::agg::state_types::{GroupArray, GroupingState, check_output_slots};
use crate::runtime::mem_tracker::MemTracker;

use super::{NumericInput, intermediate_boolean, intermediate_primitive};

/// Number of non-null values per group; 0 for groups without values.
pub struct CountAgg<T> {
    _input: PhantomData<fn() -> T>,
}

impl<T: NumericInput> CountAgg<T> {
    pub fn new() -> Self {
        Self {
            _input: PhantomData,
        }
    }
}

impl<T: NumericInput> Default for CountAgg<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct CountState {
    counts: GroupArray<i64>,
}

impl CountState {
    pub fn count(&self, group_id: usize) -> Option<i64> {
        self.counts.value(group_id).copied()
    }

    pub fn has_null(&self, group_id: usize) -> bool {
        self.counts.has_null(group_id)
    }

    fn add(&mut self, group_id: usize, count: i64) -> Result<(), AggError> {
        let slot = self.counts.value_mut(group_id)?;
        *slot = slot
            .checked_add(count)
            .ok_or_else(|| AggError::Overflow(format!("count overflow in group {}", group_id)))?;
        Ok(())
    }
}

impl GroupingState for CountState {
    fn put_null(&mut self, group_id: usize) -> Result<(), AggError> {
        self.counts.put_null(group_id)
    }

    fn to_intermediate(
        &self,
        blocks: &mut [Option<ArrayRef>],
        offset: usize,
        selected: &[u32],
    ) -> Result<(), AggError> {
        check_output_slots(blocks, offset, 2)?;
        let counts = Int64Array::from_iter_values(
            selected
                .iter()
                .map(|&g| self.count(g as usize).unwrap_or(0)),
        );
        let seen = selected
            .iter()
            .map(|&g| Some(self.counts.has_value(g as usize)))
            .collect::<BooleanArray>();
        blocks[offset] = Some(Arc::new(counts));
        blocks[offset + 1] = Some(Arc::new(seen));
        Ok(())
    }

    fn close(&mut self) {
        self.counts.release();
    }
}

pub struct CountView<'a> {
    counts: &'a Int64Array,
    seen: &'a BooleanArray,
}

impl<T: NumericInput> GroupingAggregateFunction for CountAgg<T> {
    type Input = T;
    type State = CountState;
    type IntermediateView<'a> = CountView<'a>;

    fn kind(&self) -> AggKind {
        AggKind::Count {
            input: T::INPUT_TYPE,
        }
    }

    fn intermediate_state_desc(&self) -> Vec<IntermediateStateDesc> {
        vec![
            IntermediateStateDesc::new("count", DataType::Int64),
            IntermediateStateDesc::new("seen", DataType::Boolean),
        ]
    }

    fn init_grouping(
        &self,
        mem_tracker: Arc<MemTracker>,
        initial_capacity: usize,
    ) -> Result<CountState, AggError> {
        Ok(CountState {
            counts: GroupArray::new(mem_tracker, initial_capacity)?,
        })
    }

    fn combine(
        &self,
        state: &mut CountState,
        group_id: usize,
        _value: T::Native,
    ) -> Result<(), AggError> {
        state.add(group_id, 1)
    }

    fn intermediate_view<'a>(&self, blocks: &[&'a ArrayRef]) -> Result<CountView<'a>, AggError> {
        Ok(CountView {
            counts: intermediate_primitive::<Int64Type>(blocks, 0, "count")?,
            seen: intermediate_boolean(blocks, 1, "seen")?,
        })
    }

    fn combine_intermediate(
        &self,
        state: &mut CountState,
        group_id: usize,
        view: &CountView<'_>,
        position: usize,
    ) -> Result<(), AggError> {
        if view.seen.is_valid(position) && view.seen.value(position) {
            state.add(group_id, view.counts.value(position))?;
        }
        Ok(())
    }

    fn combine_states(
        &self,
        state: &mut CountState,
        group_id: usize,
        other: &CountState,
        other_position: usize,
    ) -> Result<(), AggError> {
        if other.has_null(other_position) {
            state.put_null(group_id)?;
        }
        if let Some(count) = other.count(other_position) {
            state.add(group_id, count)?;
        }
        Ok(())
    }

    fn evaluate_final(&self, state: &CountState, selected: &[u32]) -> Result<ArrayRef, AggError> {
        Ok(Arc::new(Int64Array::from_iter_values(
            selected
                .iter()
                .map(|&g| state.count(g as usize).unwrap_or(0)),
        )))
    }
}
