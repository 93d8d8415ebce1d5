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
use std::fmt;

use arrow::datatypes::DataType;

use crate::common::error::AggError;

/// One serialized column of a grouping state: name plus arrow element type.
///
/// Producer (`evaluate_intermediate`) and consumer (`add_intermediate_input`) of the same
/// [`AggKind`] share the exact same list; mismatches are not detected at runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntermediateStateDesc {
    pub name: &'static str,
    pub element_type: DataType,
}

impl IntermediateStateDesc {
    pub fn new(name: &'static str, element_type: DataType) -> Self {
        Self { name, element_type }
    }
}

impl fmt::Display for IntermediateStateDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.name, self.element_type)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggInputType {
    Int32,
    Int64,
    Float64,
}

impl AggInputType {
    pub fn data_type(&self) -> DataType {
        match self {
            AggInputType::Int32 => DataType::Int32,
            AggInputType::Int64 => DataType::Int64,
            AggInputType::Float64 => DataType::Float64,
        }
    }

    /// Resolves the element type of a raw input column; `List<T>` resolves to `T`.
    pub fn from_data_type(data_type: &DataType) -> Result<Self, AggError> {
        match data_type {
            DataType::Int32 => Ok(AggInputType::Int32),
            DataType::Int64 => Ok(AggInputType::Int64),
            DataType::Float64 => Ok(AggInputType::Float64),
            DataType::List(field) => Self::from_data_type(field.data_type()),
            other => Err(AggError::invalid(format!(
                "unsupported aggregate input type: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for AggInputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggInputType::Int32 => "int32",
            AggInputType::Int64 => "int64",
            AggInputType::Float64 => "float64",
        };
        f.write_str(name)
    }
}

/// Aggregate kind plus its configuration. Two aggregators may exchange live state only when
/// their tags compare equal.
#[derive(Clone, Debug, PartialEq)]
pub enum AggKind {
    Count { input: AggInputType },
    Sum { input: AggInputType },
    Percentile { input: AggInputType, percentile: f64 },
}

impl AggKind {
    /// Resolves a lowercase function name, e.g. `percentile` with `params = [50.0]`.
    pub fn from_name(name: &str, input_type: &DataType, params: &[f64]) -> Result<Self, AggError> {
        let input = AggInputType::from_data_type(input_type)?;
        let kind = match name {
            "count" => AggKind::Count { input },
            "sum" => AggKind::Sum { input },
            "percentile" => {
                let percentile = *params.first().ok_or_else(|| {
                    AggError::invalid("percentile requires a percentile parameter")
                })?;
                AggKind::Percentile { input, percentile }
            }
            other => {
                return Err(AggError::invalid(format!(
                    "unsupported grouping aggregate function: {}",
                    other
                )));
            }
        };
        kind.validate()?;
        Ok(kind)
    }

    pub fn input_type(&self) -> AggInputType {
        match self {
            AggKind::Count { input } | AggKind::Sum { input } => *input,
            AggKind::Percentile { input, .. } => *input,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggKind::Count { .. } => "count",
            AggKind::Sum { .. } => "sum",
            AggKind::Percentile { .. } => "percentile",
        }
    }

    pub fn validate(&self) -> Result<(), AggError> {
        if let AggKind::Percentile { percentile, .. } = self {
            if !percentile.is_finite() || !(0.0..=100.0).contains(percentile) {
                return Err(AggError::invalid(format!(
                    "percentile must be in [0, 100], got {}",
                    percentile
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for AggKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggKind::Percentile { input, percentile } => {
                write!(f, "percentile({}, {})", input, percentile)
            }
            other => write!(f, "{}({})", other.name(), other.input_type()),
        }
    }
}
