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

use arrow::array::{Array, ArrayRef, BinaryArray, BinaryBuilder, Float64Builder};
use arrow::datatypes::DataType;

use crate::common::error::AggError;
use crate::exec::agg::kernel::GroupingAggregateFunction;
use crate::exec::agg::spec::{AggKind, IntermediateStateDesc};
use crate::exec::agg::state_types::{GroupArray, GroupingState, check_output_slots};
use crate::runtime::mem_tracker::MemTracker;

use super::{NumericInput, intermediate_binary};

const VALUE_BYTES: usize = std::mem::size_of::<f64>();

/// Exact percentile over the non-null values of each group, linearly interpolated between the
/// two closest ranks. Values are kept per group; the intermediate form is a single `quart`
/// binary column of little-endian f64 values.
pub struct PercentileAgg<T> {
    percentile: f64,
    _input: PhantomData<fn() -> T>,
}

impl<T: NumericInput> PercentileAgg<T> {
    /// `percentile` must be finite and within `[0, 100]`.
    pub fn try_new(percentile: f64) -> Result<Self, AggError> {
        let out = Self {
            percentile,
            _input: PhantomData,
        };
        out.kind().validate()?;
        Ok(out)
    }

    pub fn percentile(&self) -> f64 {
        self.percentile
    }
}

#[derive(Debug)]
pub struct PercentileState {
    values: GroupArray<Vec<f64>>,
}

impl PercentileState {
    pub fn values(&self, group_id: usize) -> Option<&[f64]> {
        self.values.value(group_id).map(Vec::as_slice)
    }

    pub fn has_null(&self, group_id: usize) -> bool {
        self.values.has_null(group_id)
    }

    fn extend(&mut self, group_id: usize, values: &[f64]) -> Result<(), AggError> {
        if values.is_empty() {
            return Ok(());
        }
        // Slot growth first: a refused growth must leave no payload bytes charged.
        self.values.ensure_group(group_id)?;
        self.values.charge(values.len().saturating_mul(VALUE_BYTES))?;
        self.values.value_mut(group_id)?.extend_from_slice(values);
        Ok(())
    }
}

impl GroupingState for PercentileState {
    fn put_null(&mut self, group_id: usize) -> Result<(), AggError> {
        self.values.put_null(group_id)
    }

    fn to_intermediate(
        &self,
        blocks: &mut [Option<ArrayRef>],
        offset: usize,
        selected: &[u32],
    ) -> Result<(), AggError> {
        check_output_slots(blocks, offset, 1)?;
        let mut out = BinaryBuilder::with_capacity(selected.len(), 0);
        let mut buf = Vec::new();
        for &g in selected {
            buf.clear();
            for v in self.values(g as usize).unwrap_or_default() {
                buf.extend_from_slice(&v.to_le_bytes());
            }
            out.append_value(&buf);
        }
        blocks[offset] = Some(Arc::new(out.finish()));
        Ok(())
    }

    fn close(&mut self) {
        self.values.release();
    }
}

fn decode_values(bytes: &[u8]) -> Result<Vec<f64>, AggError> {
    if bytes.len() % VALUE_BYTES != 0 {
        return Err(AggError::invalid(format!(
            "percentile state of {} bytes is not a whole number of f64 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(VALUE_BYTES)
        .map(|chunk| {
            let mut raw = [0u8; VALUE_BYTES];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect())
}

/// Linear interpolation between the closest ranks of `sorted`, which must be non-empty.
fn interpolate(sorted: &[f64], percentile: f64) -> f64 {
    let last = sorted.len() - 1;
    let rank = percentile / 100.0 * last as f64;
    let lower = (rank.floor() as usize).min(last);
    let upper = (rank.ceil() as usize).min(last);
    if lower == upper {
        return sorted[lower];
    }
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

impl<T: NumericInput> GroupingAggregateFunction for PercentileAgg<T> {
    type Input = T;
    type State = PercentileState;
    type IntermediateView<'a> = &'a BinaryArray;

    fn kind(&self) -> AggKind {
        AggKind::Percentile {
            input: T::INPUT_TYPE,
            percentile: self.percentile,
        }
    }

    fn intermediate_state_desc(&self) -> Vec<IntermediateStateDesc> {
        vec![IntermediateStateDesc::new("quart", DataType::Binary)]
    }

    fn init_grouping(
        &self,
        mem_tracker: Arc<MemTracker>,
        initial_capacity: usize,
    ) -> Result<PercentileState, AggError> {
        Ok(PercentileState {
            values: GroupArray::new(mem_tracker, initial_capacity)?,
        })
    }

    fn combine(
        &self,
        state: &mut PercentileState,
        group_id: usize,
        value: T::Native,
    ) -> Result<(), AggError> {
        state.extend(group_id, &[T::to_f64(value)])
    }

    fn intermediate_view<'a>(&self, blocks: &[&'a ArrayRef]) -> Result<&'a BinaryArray, AggError> {
        intermediate_binary(blocks, 0, "quart")
    }

    fn combine_intermediate(
        &self,
        state: &mut PercentileState,
        group_id: usize,
        view: &&BinaryArray,
        position: usize,
    ) -> Result<(), AggError> {
        if view.is_null(position) {
            return Ok(());
        }
        state.extend(group_id, &decode_values(view.value(position))?)
    }

    fn combine_states(
        &self,
        state: &mut PercentileState,
        group_id: usize,
        other: &PercentileState,
        other_position: usize,
    ) -> Result<(), AggError> {
        if other.has_null(other_position) {
            state.put_null(group_id)?;
        }
        if let Some(values) = other.values(other_position) {
            state.extend(group_id, values)?;
        }
        Ok(())
    }

    fn evaluate_final(
        &self,
        state: &PercentileState,
        selected: &[u32],
    ) -> Result<ArrayRef, AggError> {
        let mut out = Float64Builder::with_capacity(selected.len());
        let mut sorted = Vec::new();
        for &g in selected {
            match state.values(g as usize) {
                Some(values) if !values.is_empty() => {
                    sorted.clear();
                    sorted.extend_from_slice(values);
                    sorted.sort_unstable_by(f64::total_cmp);
                    out.append_value(interpolate(&sorted, self.percentile));
                }
                _ => out.append_null(),
            }
        }
        Ok(Arc::new(out.finish()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{AsArray, Int64Array};
    use arrow::datatypes::{Float64Type, Int64Type};

    use crate::exec::agg::kernel::{GroupingAggregator, GroupingAggregatorFunction};
    use crate::exec::chunk::Chunk;

    fn aggregator(percentile: f64) -> GroupingAggregator<PercentileAgg<Int64Type>> {
        GroupingAggregator::create_with_tracker(
            PercentileAgg::try_new(percentile).expect("percentile"),
            vec![0],
            MemTracker::new_root("test"),
            0,
        )
        .expect("aggregator")
    }

    #[test]
    fn test_interpolates_between_closest_ranks() {
        assert_eq!(interpolate(&[1.0, 2.0, 3.0, 4.0], 50.0), 2.5);
        assert_eq!(interpolate(&[1.0, 2.0, 3.0, 4.0], 0.0), 1.0);
        assert_eq!(interpolate(&[1.0, 2.0, 3.0, 4.0], 100.0), 4.0);
        assert_eq!(interpolate(&[7.0], 90.0), 7.0);
        assert_eq!(interpolate(&[0.0, 10.0], 25.0), 2.5);
    }

    #[test]
    fn test_rejects_out_of_range_percentile() {
        assert!(PercentileAgg::<Int64Type>::try_new(-1.0).is_err());
        assert!(PercentileAgg::<Int64Type>::try_new(100.5).is_err());
        assert!(PercentileAgg::<Int64Type>::try_new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_final_is_independent_of_input_order() {
        let values = Int64Array::from(vec![Some(40), Some(10), None, Some(30), Some(20)]);
        let chunk = Chunk::try_from_columns(vec![Arc::new(values) as ArrayRef]).expect("chunk");
        let mut agg = aggregator(50.0);
        agg.prepare_process_page(&chunk)
            .expect("prepare")
            .add_vector(0, &Int64Array::from(vec![0, 0, 1, 0, 0]))
            .expect("add");

        let mut blocks = vec![None];
        agg.evaluate_final(&mut blocks, 0, &[0, 1, 2]).expect("final");
        let out = blocks[0].as_ref().expect("output").as_primitive::<Float64Type>();
        assert_eq!(out.value(0), 25.0);
        assert!(out.is_null(1));
        assert!(out.is_null(2));
    }

    #[test]
    fn test_quart_column_round_trips_values() {
        let chunk = Chunk::try_from_columns(vec![
            Arc::new(Int64Array::from(vec![3, 1, 2])) as ArrayRef
        ])
        .expect("chunk");
        let mut source = aggregator(50.0);
        source
            .prepare_process_page(&chunk)
            .expect("prepare")
            .add_vector(0, &Int64Array::from(vec![0, 0, 0]))
            .expect("add");

        let mut blocks = vec![None];
        source
            .evaluate_intermediate(&mut blocks, 0, &[0, 5])
            .expect("intermediate");
        let quart = blocks[0].take().expect("quart");
        assert_eq!(quart.as_binary::<i32>().value(0).len(), 3 * VALUE_BYTES);
        assert!(quart.as_binary::<i32>().value(1).is_empty());

        let page = Chunk::try_from_columns(vec![quart]).expect("page");
        let mut target = aggregator(50.0);
        target
            .add_intermediate_input(&Int64Array::from(vec![1, 2]), &page)
            .expect("merge");
        assert_eq!(target.state().values(1), Some(&[3.0, 1.0, 2.0][..]));
        assert_eq!(target.state().values(2), None);
    }

    #[test]
    fn test_refused_growth_charges_nothing() {
        let tracker = MemTracker::new_root_with_limit("query", 1024);
        let mut agg = GroupingAggregator::create_with_tracker(
            PercentileAgg::<Int64Type>::try_new(50.0).expect("percentile"),
            vec![0],
            Arc::clone(&tracker),
            0,
        )
        .expect("aggregator");
        let page = Chunk::try_from_columns(vec![Arc::new(Int64Array::from(vec![7])) as ArrayRef])
            .expect("page");
        agg.prepare_process_page(&page)
            .expect("prepare")
            .add_vector(0, &Int64Array::from(vec![0]))
            .expect("add");
        let charged = tracker.current();

        for _ in 0..3 {
            let err = agg
                .prepare_process_page(&page)
                .expect("prepare")
                .add_vector(0, &Int64Array::from(vec![100]))
                .expect_err("over limit");
            assert!(matches!(err, AggError::MemoryLimitExceeded(_)), "err={}", err);
            assert_eq!(tracker.current(), charged);
        }
        assert_eq!(agg.state().values(100), None);
        assert_eq!(agg.state().values(0), Some(&[7.0][..]));
    }

    #[test]
    fn test_malformed_quart_is_rejected() {
        let mut bad = BinaryBuilder::new();
        bad.append_value([0u8; 5]);
        let page = Chunk::try_from_columns(vec![Arc::new(bad.finish()) as ArrayRef]).expect("page");
        let mut agg = aggregator(50.0);
        let err = agg
            .add_intermediate_input(&Int64Array::from(vec![0]), &page)
            .expect_err("malformed");
        assert!(matches!(err, AggError::InvalidInput(_)), "err={}", err);
    }
}
