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
//! Column views consumed by the grouping aggregator.
//!
//! A column position holds zero or more values addressed as `(first_value_index, value_count)`.
//! Three arrow layouts are accepted:
//! - `Vector`: primitive array without nulls, one value per position (the fast path).
//! - `Nullable`: primitive array with nulls, one value per non-null position.
//! - `MultiValue`: `List<primitive>`; a null list is a null position, an empty list has no values.
//!
//! Null elements inside a list are not values; callers skip them via [`ValueBlock::is_value_null`].

use arrow::array::{Array, ArrayRef, AsArray, ListArray, PrimitiveArray};
use arrow::datatypes::{ArrowPrimitiveType, DataType, Int64Type};

use crate::common::error::AggError;

pub enum ValueBlock<'a, T: ArrowPrimitiveType> {
    Vector(&'a PrimitiveArray<T>),
    Nullable(&'a PrimitiveArray<T>),
    MultiValue {
        list: &'a ListArray,
        values: &'a PrimitiveArray<T>,
    },
}

/// Group ids as delivered by the grouping stage: nullable and/or multi-valued `Int64`.
pub type GroupIdBlock<'a> = ValueBlock<'a, Int64Type>;

impl<T: ArrowPrimitiveType> Clone for ValueBlock<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ArrowPrimitiveType> Copy for ValueBlock<'_, T> {}

impl<T: ArrowPrimitiveType> std::fmt::Debug for ValueBlock<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let layout = match self {
            ValueBlock::Vector(_) => "Vector",
            ValueBlock::Nullable(_) => "Nullable",
            ValueBlock::MultiValue { .. } => "MultiValue",
        };
        write!(
            f,
            "ValueBlock::{}<{:?}>(positions={})",
            layout,
            T::DATA_TYPE,
            self.position_count()
        )
    }
}

impl<'a, T: ArrowPrimitiveType> ValueBlock<'a, T> {
    pub fn try_new(array: &'a dyn Array) -> Result<Self, AggError> {
        if let DataType::List(_) = array.data_type() {
            let list = array
                .as_list_opt::<i32>()
                .ok_or_else(|| AggError::invalid("failed to downcast to ListArray"))?;
            let values = list.values().as_primitive_opt::<T>().ok_or_else(|| {
                AggError::invalid(format!(
                    "expected List<{:?}> column, got {:?}",
                    T::DATA_TYPE,
                    array.data_type()
                ))
            })?;
            return Ok(Self::MultiValue { list, values });
        }
        let values = array.as_primitive_opt::<T>().ok_or_else(|| {
            AggError::invalid(format!(
                "expected {:?} column, got {:?}",
                T::DATA_TYPE,
                array.data_type()
            ))
        })?;
        if values.null_count() == 0 {
            Ok(Self::Vector(values))
        } else {
            Ok(Self::Nullable(values))
        }
    }

    pub fn from_array_ref(array: &'a ArrayRef) -> Result<Self, AggError> {
        Self::try_new(array.as_ref())
    }

    pub fn position_count(&self) -> usize {
        match self {
            ValueBlock::Vector(arr) | ValueBlock::Nullable(arr) => arr.len(),
            ValueBlock::MultiValue { list, .. } => list.len(),
        }
    }

    pub fn is_null(&self, position: usize) -> bool {
        match self {
            ValueBlock::Vector(_) => false,
            ValueBlock::Nullable(arr) => arr.is_null(position),
            ValueBlock::MultiValue { list, .. } => list.is_null(position),
        }
    }

    pub fn first_value_index(&self, position: usize) -> usize {
        match self {
            ValueBlock::Vector(_) | ValueBlock::Nullable(_) => position,
            ValueBlock::MultiValue { list, .. } => list.value_offsets()[position] as usize,
        }
    }

    pub fn value_count(&self, position: usize) -> usize {
        match self {
            ValueBlock::Vector(_) => 1,
            ValueBlock::Nullable(arr) => usize::from(arr.is_valid(position)),
            ValueBlock::MultiValue { list, .. } => {
                if list.is_null(position) {
                    0
                } else {
                    list.value_length(position) as usize
                }
            }
        }
    }

    /// Value at an index produced by `first_value_index`/`value_count`.
    pub fn value(&self, index: usize) -> T::Native {
        match self {
            ValueBlock::Vector(arr) | ValueBlock::Nullable(arr) => arr.value(index),
            ValueBlock::MultiValue { values, .. } => values.value(index),
        }
    }

    pub fn is_value_null(&self, index: usize) -> bool {
        match self {
            ValueBlock::Vector(_) | ValueBlock::Nullable(_) => false,
            ValueBlock::MultiValue { values, .. } => values.is_null(index),
        }
    }

    /// The dense view, when every position holds exactly one non-null value in a flat array.
    pub fn as_vector(&self) -> Option<&'a PrimitiveArray<T>> {
        match self {
            ValueBlock::Vector(arr) => Some(*arr),
            _ => None,
        }
    }
}

/// True when no position of `array` carries a value, including the arrow `Null` type.
pub fn are_all_values_null(array: &dyn Array) -> bool {
    matches!(array.data_type(), DataType::Null) || array.null_count() == array.len()
}
