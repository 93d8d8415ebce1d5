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
use std::sync::Arc;

use arrow::array::{ArrayRef, AsArray, BinaryArray, BooleanArray, PrimitiveArray};
use arrow::datatypes::{ArrowPrimitiveType, Float64Type, Int32Type, Int64Type};

use crate::common::error::AggError;
use crate::runtime::mem_tracker::MemTracker;

use super::kernel::{GroupingAggregator, GroupingAggregatorFunction};
use super::spec::{AggInputType, AggKind};

mod count;
mod percentile;
mod sum;

pub use count::{CountAgg, CountState};
pub use percentile::{PercentileAgg, PercentileState};
pub use sum::{SumAgg, SumState};

/// Raw input element types the reference aggregates accept.
pub trait NumericInput: ArrowPrimitiveType {
    const INPUT_TYPE: AggInputType;
    type SumType: SumAccumulator;

    fn to_sum(value: Self::Native) -> <Self::SumType as ArrowPrimitiveType>::Native;
    fn to_f64(value: Self::Native) -> f64;
}

impl NumericInput for Int32Type {
    const INPUT_TYPE: AggInputType = AggInputType::Int32;
    type SumType = Int64Type;

    fn to_sum(value: i32) -> i64 {
        i64::from(value)
    }

    fn to_f64(value: i32) -> f64 {
        f64::from(value)
    }
}

impl NumericInput for Int64Type {
    const INPUT_TYPE: AggInputType = AggInputType::Int64;
    type SumType = Int64Type;

    fn to_sum(value: i64) -> i64 {
        value
    }

    fn to_f64(value: i64) -> f64 {
        value as f64
    }
}

impl NumericInput for Float64Type {
    const INPUT_TYPE: AggInputType = AggInputType::Float64;
    type SumType = Float64Type;

    fn to_sum(value: f64) -> f64 {
        value
    }

    fn to_f64(value: f64) -> f64 {
        value
    }
}

pub trait SumAccumulator: ArrowPrimitiveType {
    fn add(acc: Self::Native, value: Self::Native) -> Result<Self::Native, AggError>;
}

impl SumAccumulator for Int64Type {
    fn add(acc: i64, value: i64) -> Result<i64, AggError> {
        acc.checked_add(value)
            .ok_or_else(|| AggError::Overflow(format!("sum overflow: {} + {}", acc, value)))
    }
}

impl SumAccumulator for Float64Type {
    fn add(acc: f64, value: f64) -> Result<f64, AggError> {
        Ok(acc + value)
    }
}

/// Typed intermediate column `idx`, checked against the expected arrow type.
pub(super) fn intermediate_primitive<'a, T: ArrowPrimitiveType>(
    blocks: &[&'a ArrayRef],
    idx: usize,
    name: &str,
) -> Result<&'a PrimitiveArray<T>, AggError> {
    let block: &'a ArrayRef = blocks
        .get(idx)
        .copied()
        .ok_or_else(|| AggError::invalid(format!("intermediate column {} missing", name)))?;
    block.as_primitive_opt::<T>().ok_or_else(|| {
        AggError::invalid(format!(
            "intermediate column {} expected {:?}, got {:?}",
            name,
            T::DATA_TYPE,
            block.data_type()
        ))
    })
}

pub(super) fn intermediate_boolean<'a>(
    blocks: &[&'a ArrayRef],
    idx: usize,
    name: &str,
) -> Result<&'a BooleanArray, AggError> {
    let block: &'a ArrayRef = blocks
        .get(idx)
        .copied()
        .ok_or_else(|| AggError::invalid(format!("intermediate column {} missing", name)))?;
    block.as_boolean_opt().ok_or_else(|| {
        AggError::invalid(format!(
            "intermediate column {} expected Boolean, got {:?}",
            name,
            block.data_type()
        ))
    })
}

pub(super) fn intermediate_binary<'a>(
    blocks: &[&'a ArrayRef],
    idx: usize,
    name: &str,
) -> Result<&'a BinaryArray, AggError> {
    let block: &'a ArrayRef = blocks
        .get(idx)
        .copied()
        .ok_or_else(|| AggError::invalid(format!("intermediate column {} missing", name)))?;
    block.as_binary_opt::<i32>().ok_or_else(|| {
        AggError::invalid(format!(
            "intermediate column {} expected Binary, got {:?}",
            name,
            block.data_type()
        ))
    })
}

fn boxed<F>(
    function: F,
    channels: Vec<usize>,
    mem_tracker: &Arc<MemTracker>,
) -> Result<Box<dyn GroupingAggregatorFunction>, AggError>
where
    F: super::kernel::GroupingAggregateFunction,
{
    Ok(Box::new(GroupingAggregator::create(
        function,
        channels,
        mem_tracker,
    )?))
}

/// Instantiates the generic aggregator matching `kind` and its input type.
pub fn create_grouping_aggregator(
    kind: &AggKind,
    channels: Vec<usize>,
    mem_tracker: &Arc<MemTracker>,
) -> Result<Box<dyn GroupingAggregatorFunction>, AggError> {
    kind.validate()?;
    match (kind, kind.input_type()) {
        (AggKind::Count { .. }, AggInputType::Int32) => {
            boxed(CountAgg::<Int32Type>::new(), channels, mem_tracker)
        }
        (AggKind::Count { .. }, AggInputType::Int64) => {
            boxed(CountAgg::<Int64Type>::new(), channels, mem_tracker)
        }
        (AggKind::Count { .. }, AggInputType::Float64) => {
            boxed(CountAgg::<Float64Type>::new(), channels, mem_tracker)
        }
        (AggKind::Sum { .. }, AggInputType::Int32) => {
            boxed(SumAgg::<Int32Type>::new(), channels, mem_tracker)
        }
        (AggKind::Sum { .. }, AggInputType::Int64) => {
            boxed(SumAgg::<Int64Type>::new(), channels, mem_tracker)
        }
        (AggKind::Sum { .. }, AggInputType::Float64) => {
            boxed(SumAgg::<Float64Type>::new(), channels, mem_tracker)
        }
        (AggKind::Percentile { percentile, .. }, AggInputType::Int32) => boxed(
            PercentileAgg::<Int32Type>::try_new(*percentile)?,
            channels,
            mem_tracker,
        ),
        (AggKind::Percentile { percentile, .. }, AggInputType::Int64) => boxed(
            PercentileAgg::<Int64Type>::try_new(*percentile)?,
            channels,
            mem_tracker,
        ),
        (AggKind::Percentile { percentile, .. }, AggInputType::Float64) => boxed(
            PercentileAgg::<Float64Type>::try_new(*percentile)?,
            channels,
            mem_tracker,
        ),
    }
}
