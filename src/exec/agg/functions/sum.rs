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

use arrow::array::{Array, ArrayRef, BooleanArray, PrimitiveArray, PrimitiveBuilder};
use arrow::datatypes::{ArrowPrimitiveType, DataType};

use crate::common::error::AggError;
use crate::exec::agg::kernel::GroupingAggregateFunction;
use crate::exec::agg::spec::{AggKind, IntermediateStateDesc};
use crate::exec::agg::state_types::{GroupArray, GroupingState, check_output_slots};
use crate::runtime::mem_tracker::MemTracker;

use super::{NumericInput, SumAccumulator, intermediate_boolean, intermediate_primitive};

/// Sum of non-null values per group. Integer inputs sum into i64 and fail on overflow;
/// groups without values evaluate to null.
pub struct SumAgg<T> {
    _input: PhantomData<fn() -> T>,
}

impl<T: NumericInput> SumAgg<T> {
    pub fn new() -> Self {
        Self {
            _input: PhantomData,
        }
    }
}

impl<T: NumericInput> Default for SumAgg<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct SumState<A: SumAccumulator> {
    sums: GroupArray<A::Native>,
}

impl<A: SumAccumulator> SumState<A> {
    pub fn sum(&self, group_id: usize) -> Option<A::Native> {
        self.sums.value(group_id).copied()
    }

    pub fn has_null(&self, group_id: usize) -> bool {
        self.sums.has_null(group_id)
    }

    fn add(&mut self, group_id: usize, value: A::Native) -> Result<(), AggError> {
        let next = A::add(self.sum(group_id).unwrap_or_default(), value)?;
        *self.sums.value_mut(group_id)? = next;
        Ok(())
    }
}

impl<A: SumAccumulator> GroupingState for SumState<A> {
    fn put_null(&mut self, group_id: usize) -> Result<(), AggError> {
        self.sums.put_null(group_id)
    }

    fn to_intermediate(
        &self,
        blocks: &mut [Option<ArrayRef>],
        offset: usize,
        selected: &[u32],
    ) -> Result<(), AggError> {
        check_output_slots(blocks, offset, 2)?;
        let mut sums = PrimitiveBuilder::<A>::with_capacity(selected.len());
        let mut seen = Vec::with_capacity(selected.len());
        for &g in selected {
            let g = g as usize;
            sums.append_value(self.sum(g).unwrap_or_default());
            seen.push(self.sums.has_value(g));
        }
        blocks[offset] = Some(Arc::new(sums.finish()));
        blocks[offset + 1] = Some(Arc::new(BooleanArray::from(seen)));
        Ok(())
    }

    fn close(&mut self) {
        self.sums.release();
    }
}

pub struct SumView<'a, A: ArrowPrimitiveType> {
    sums: &'a PrimitiveArray<A>,
    seen: &'a BooleanArray,
}

impl<T: NumericInput> GroupingAggregateFunction for SumAgg<T> {
    type Input = T;
    type State = SumState<T::SumType>;
    type IntermediateView<'a> = SumView<'a, T::SumType>;

    fn kind(&self) -> AggKind {
        AggKind::Sum {
            input: T::INPUT_TYPE,
        }
    }

    fn intermediate_state_desc(&self) -> Vec<IntermediateStateDesc> {
        vec![
            IntermediateStateDesc::new("sum", T::SumType::DATA_TYPE),
            IntermediateStateDesc::new("seen", DataType::Boolean),
        ]
    }

    fn init_grouping(
        &self,
        mem_tracker: Arc<MemTracker>,
        initial_capacity: usize,
    ) -> Result<Self::State, AggError> {
        Ok(SumState {
            sums: GroupArray::new(mem_tracker, initial_capacity)?,
        })
    }

    fn combine(
        &self,
        state: &mut Self::State,
        group_id: usize,
        value: T::Native,
    ) -> Result<(), AggError> {
        state.add(group_id, T::to_sum(value))
    }

    fn intermediate_view<'a>(
        &self,
        blocks: &[&'a ArrayRef],
    ) -> Result<Self::IntermediateView<'a>, AggError> {
        Ok(SumView {
            sums: intermediate_primitive::<T::SumType>(blocks, 0, "sum")?,
            seen: intermediate_boolean(blocks, 1, "seen")?,
        })
    }

    fn combine_intermediate(
        &self,
        state: &mut Self::State,
        group_id: usize,
        view: &Self::IntermediateView<'_>,
        position: usize,
    ) -> Result<(), AggError> {
        if view.seen.is_valid(position) && view.seen.value(position) {
            state.add(group_id, view.sums.value(position))?;
        }
        Ok(())
    }

    fn combine_states(
        &self,
        state: &mut Self::State,
        group_id: usize,
        other: &Self::State,
        other_position: usize,
    ) -> Result<(), AggError> {
        if other.has_null(other_position) {
            state.put_null(group_id)?;
        }
        if let Some(sum) = other.sum(other_position) {
            state.add(group_id, sum)?;
        }
        Ok(())
    }

    fn evaluate_final(&self, state: &Self::State, selected: &[u32]) -> Result<ArrayRef, AggError> {
        let mut out = PrimitiveBuilder::<T::SumType>::with_capacity(selected.len());
        for &g in selected {
            out.append_option(state.sum(g as usize));
        }
        Ok(Arc::new(out.finish()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{AsArray, Float64Array, Int32Array, Int64Array};
    use arrow::datatypes::{Float64Type, Int32Type, Int64Type};

    use crate::exec::agg::kernel::{GroupingAggregator, GroupingAggregatorFunction};
    use crate::exec::chunk::Chunk;

    fn aggregator<T: NumericInput>() -> GroupingAggregator<SumAgg<T>> {
        GroupingAggregator::create_with_tracker(
            SumAgg::new(),
            vec![0],
            MemTracker::new_root("test"),
            0,
        )
        .expect("aggregator")
    }

    fn add(agg: &mut dyn GroupingAggregatorFunction, values: ArrayRef, groups: Vec<i64>) {
        let chunk = Chunk::try_from_columns(vec![values]).expect("chunk");
        agg.prepare_process_page(&chunk)
            .expect("prepare")
            .add_vector(0, &Int64Array::from(groups))
            .expect("add");
    }

    #[test]
    fn test_int32_input_sums_into_int64() {
        let mut agg = aggregator::<Int32Type>();
        add(
            &mut agg,
            Arc::new(Int32Array::from(vec![Some(i32::MAX), Some(i32::MAX), None])),
            vec![0, 0, 1],
        );
        let mut blocks = vec![None];
        agg.evaluate_final(&mut blocks, 0, &[0, 1]).expect("final");
        let out = blocks[0].as_ref().expect("output").as_primitive::<Int64Type>();
        assert_eq!(out.value(0), 2 * i64::from(i32::MAX));
        assert!(out.is_null(1));
        assert!(agg.state().has_null(1));
    }

    #[test]
    fn test_int64_overflow_is_an_error_and_keeps_previous_sum() {
        let mut agg = aggregator::<Int64Type>();
        add(&mut agg, Arc::new(Int64Array::from(vec![i64::MAX])), vec![0]);
        let chunk =
            Chunk::try_from_columns(vec![Arc::new(Int64Array::from(vec![1])) as ArrayRef])
                .expect("chunk");
        let err = agg
            .prepare_process_page(&chunk)
            .expect("prepare")
            .add_vector(0, &Int64Array::from(vec![0]))
            .expect_err("overflow");
        assert!(matches!(err, AggError::Overflow(_)), "err={}", err);
        assert_eq!(agg.state().sum(0), Some(i64::MAX));
    }

    #[test]
    fn test_intermediate_merge_ignores_unseen_rows() {
        let mut source = aggregator::<Float64Type>();
        add(
            &mut source,
            Arc::new(Float64Array::from(vec![Some(1.5), None, Some(2.0)])),
            vec![0, 1, 0],
        );
        let mut blocks = vec![None, None];
        source
            .evaluate_intermediate(&mut blocks, 0, &[0, 1])
            .expect("intermediate");
        let columns = blocks.into_iter().map(|b| b.expect("column")).collect();
        let page = Chunk::try_from_columns(columns).expect("page");

        let mut target = GroupingAggregator::create_with_tracker(
            SumAgg::<Float64Type>::new(),
            vec![0, 1],
            MemTracker::new_root("target"),
            0,
        )
        .expect("target");
        target
            .add_intermediate_input(&Int64Array::from(vec![3, 4]), &page)
            .expect("merge");
        assert_eq!(target.state().sum(3), Some(3.5));
        assert_eq!(target.state().sum(4), None);
    }
}
