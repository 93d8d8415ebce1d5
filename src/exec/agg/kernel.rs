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
//! Grouping aggregator: drives one aggregate function over streamed chunks and per-row group ids.
//!
//! Raw input is dispatched once per chunk on the value column layout (all-null, dense vector,
//! nullable/multi-value block) and once per call on the group id layout (dense vector or block).
//! Every combination is the same generic loop, monomorphized; the paths only differ in speed.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, PrimitiveArray};
use arrow::datatypes::{ArrowPrimitiveType, DataType};

use crate::common::config;
use crate::common::error::{AggError, to_group_id};
use crate::exec::chunk::Chunk;
use crate::grouping_logging::{debug, warn};
use crate::runtime::mem_tracker::MemTracker;

use super::spec::{AggKind, IntermediateStateDesc};
use super::state_types::{GroupingState, check_output_slots};
use super::views::{GroupIdBlock, ValueBlock, are_all_values_null};

/// Algorithm-specific half of a grouping aggregate: how values fold into a [`GroupingState`].
pub trait GroupingAggregateFunction: Send + 'static {
    type Input: ArrowPrimitiveType;
    type State: GroupingState + 'static;
    /// Typed access to the intermediate columns of one chunk.
    type IntermediateView<'a>;

    /// Kind and configuration tag, compared before live states are merged.
    fn kind(&self) -> AggKind;

    fn intermediate_state_desc(&self) -> Vec<IntermediateStateDesc>;

    fn init_grouping(
        &self,
        mem_tracker: Arc<MemTracker>,
        initial_capacity: usize,
    ) -> Result<Self::State, AggError>;

    fn combine(
        &self,
        state: &mut Self::State,
        group_id: usize,
        value: <Self::Input as ArrowPrimitiveType>::Native,
    ) -> Result<(), AggError>;

    /// `blocks` holds one column per intermediate descriptor entry, in descriptor order.
    fn intermediate_view<'a>(
        &self,
        blocks: &[&'a ArrayRef],
    ) -> Result<Self::IntermediateView<'a>, AggError>;

    fn combine_intermediate(
        &self,
        state: &mut Self::State,
        group_id: usize,
        view: &Self::IntermediateView<'_>,
        position: usize,
    ) -> Result<(), AggError>;

    fn combine_states(
        &self,
        state: &mut Self::State,
        group_id: usize,
        other: &Self::State,
        other_position: usize,
    ) -> Result<(), AggError>;

    /// One row per selected group; groups without contributions yield the function default.
    fn evaluate_final(&self, state: &Self::State, selected: &[u32]) -> Result<ArrayRef, AggError>;
}

/// Raw-input entry points specialized for one chunk's value column.
pub trait AddInput {
    /// Group ids from a nullable and/or multi-valued column.
    fn add_block(
        &mut self,
        position_offset: usize,
        group_ids: &GroupIdBlock<'_>,
    ) -> Result<(), AggError>;

    /// One non-null group id per row.
    fn add_vector(&mut self, position_offset: usize, group_ids: &Int64Array)
    -> Result<(), AggError>;
}

/// Object-safe surface of a grouping aggregator, independent of input type and algorithm.
pub trait GroupingAggregatorFunction: fmt::Display + Send {
    fn kind(&self) -> &AggKind;

    fn channels(&self) -> &[usize];

    fn intermediate_state_desc(&self) -> &[IntermediateStateDesc];

    fn intermediate_block_count(&self) -> usize {
        self.intermediate_state_desc().len()
    }

    /// Inspects the raw input column of `page` once and returns the matching add paths.
    fn prepare_process_page<'a>(
        &'a mut self,
        page: &'a Chunk,
    ) -> Result<Box<dyn AddInput + 'a>, AggError>;

    /// Merges serialized state produced by a peer's `evaluate_intermediate`. Row `i` of
    /// `group_ids` belongs to row `i` of the intermediate columns.
    fn add_intermediate_input(&mut self, group_ids: &Int64Array, page: &Chunk)
    -> Result<(), AggError>;

    /// Merges group `position` of a live peer of the identical kind into `group_id`.
    fn add_intermediate_row_input(
        &mut self,
        group_id: u32,
        input: &dyn GroupingAggregatorFunction,
        position: u32,
    ) -> Result<(), AggError>;

    fn evaluate_intermediate(
        &self,
        blocks: &mut [Option<ArrayRef>],
        offset: usize,
        selected: &[u32],
    ) -> Result<(), AggError>;

    fn evaluate_final(
        &mut self,
        blocks: &mut [Option<ArrayRef>],
        offset: usize,
        selected: &[u32],
    ) -> Result<(), AggError>;

    /// Releases the grouping state. Idempotent; also runs on drop.
    fn close(&mut self);

    fn is_closed(&self) -> bool;

    fn as_any(&self) -> &dyn Any;
}

pub struct GroupingAggregator<F: GroupingAggregateFunction> {
    function: F,
    kind: AggKind,
    intermediate_desc: Vec<IntermediateStateDesc>,
    channels: Vec<usize>,
    state: F::State,
    finalized: bool,
    closed: bool,
    log_add_input: bool,
}

impl<F: GroupingAggregateFunction> GroupingAggregator<F> {
    /// Builds an aggregator whose state charges a `GroupingState` child of `mem_tracker`, sized
    /// and limited by the `[aggregation]` configuration.
    pub fn create(
        function: F,
        channels: Vec<usize>,
        mem_tracker: &Arc<MemTracker>,
    ) -> Result<Self, AggError> {
        let state_tracker = MemTracker::new_child_with_limit(
            "GroupingState",
            mem_tracker,
            config::state_mem_limit_bytes(),
        );
        let mut out = Self::create_with_tracker(
            function,
            channels,
            state_tracker,
            config::initial_group_capacity(),
        )?;
        out.log_add_input = config::debug_log_add_input();
        Ok(out)
    }

    pub fn create_with_tracker(
        function: F,
        channels: Vec<usize>,
        state_tracker: Arc<MemTracker>,
        initial_capacity: usize,
    ) -> Result<Self, AggError> {
        let kind = function.kind();
        kind.validate()?;
        let intermediate_desc = function.intermediate_state_desc();
        let state = function.init_grouping(state_tracker, initial_capacity)?;
        let out = Self {
            function,
            kind,
            intermediate_desc,
            channels,
            state,
            finalized: false,
            closed: false,
            log_add_input: false,
        };
        debug!("created {}", out);
        Ok(out)
    }

    pub fn function(&self) -> &F {
        &self.function
    }

    pub fn state(&self) -> &F::State {
        &self.state
    }

    fn ensure_open(&self) -> Result<(), AggError> {
        if self.closed {
            return Err(AggError::Closed(self.to_string()));
        }
        Ok(())
    }

    fn ensure_accumulating(&self) -> Result<(), AggError> {
        self.ensure_open()?;
        if self.finalized {
            return Err(AggError::Finalized(self.to_string()));
        }
        Ok(())
    }

    fn kind_mismatch(&self, actual: &AggKind) -> AggError {
        warn!("{} refused live state of kind {}", self, actual);
        AggError::KindMismatch {
            expected: self.kind.to_string(),
            actual: actual.to_string(),
        }
    }

    fn add_raw_input<G, V>(
        &mut self,
        position_offset: usize,
        groups: &G,
        values: &V,
    ) -> Result<(), AggError>
    where
        G: GroupIds,
        V: ValueSource<F::Input>,
    {
        let Self {
            function, state, ..
        } = self;
        for group_position in 0..groups.position_count() {
            let value_position = group_position + position_offset;
            groups.for_each_group(group_position, |group_id| {
                values.add_row(function, state, group_id, value_position)
            })?;
        }
        Ok(())
    }
}

impl<F: GroupingAggregateFunction> GroupingAggregatorFunction for GroupingAggregator<F> {
    fn kind(&self) -> &AggKind {
        &self.kind
    }

    fn channels(&self) -> &[usize] {
        &self.channels
    }

    fn intermediate_state_desc(&self) -> &[IntermediateStateDesc] {
        &self.intermediate_desc
    }

    fn prepare_process_page<'a>(
        &'a mut self,
        page: &'a Chunk,
    ) -> Result<Box<dyn AddInput + 'a>, AggError> {
        self.ensure_accumulating()?;
        let channel = *self
            .channels
            .first()
            .ok_or_else(|| AggError::invalid("grouping aggregator has no input channel"))?;
        let block = page.block(channel)?.as_ref();
        // The element type is checked before the all-null shortcut so every path accepts the
        // same columns.
        let values = if matches!(block.data_type(), DataType::Null) {
            PreparedValues::AllNull(block)
        } else {
            let typed = ValueBlock::<F::Input>::try_new(block)?;
            if are_all_values_null(block) {
                PreparedValues::AllNull(block)
            } else {
                match typed.as_vector() {
                    Some(vector) => PreparedValues::Vector(vector),
                    None => PreparedValues::Block(typed),
                }
            }
        };
        if self.log_add_input {
            debug!(
                "{} processing {} rows with {} values",
                self,
                page.len(),
                values.layout()
            );
        }
        Ok(Box::new(GroupingAddInput {
            aggregator: self,
            values,
            value_count: block.len(),
        }))
    }

    fn add_intermediate_input(
        &mut self,
        group_ids: &Int64Array,
        page: &Chunk,
    ) -> Result<(), AggError> {
        self.ensure_accumulating()?;
        check_dense_group_ids(group_ids)?;
        let block_count = self.intermediate_desc.len();
        if self.channels.len() < block_count {
            return Err(AggError::invalid(format!(
                "{} expects {} intermediate channels, got {:?}",
                self, block_count, self.channels
            )));
        }
        let mut blocks = Vec::with_capacity(block_count);
        for &channel in &self.channels[..block_count] {
            let block = page.block(channel)?;
            if block.len() < group_ids.len() {
                return Err(AggError::invalid(format!(
                    "intermediate channel {} has {} rows, expected at least {}",
                    channel,
                    block.len(),
                    group_ids.len()
                )));
            }
            blocks.push(block);
        }
        let view = self.function.intermediate_view(&blocks)?;
        for (position, &raw) in group_ids.values().iter().enumerate() {
            let group_id = to_group_id(raw)?;
            self.function
                .combine_intermediate(&mut self.state, group_id, &view, position)?;
        }
        Ok(())
    }

    fn add_intermediate_row_input(
        &mut self,
        group_id: u32,
        input: &dyn GroupingAggregatorFunction,
        position: u32,
    ) -> Result<(), AggError> {
        self.ensure_accumulating()?;
        if input.kind() != &self.kind {
            return Err(self.kind_mismatch(input.kind()));
        }
        let Some(peer) = input.as_any().downcast_ref::<Self>() else {
            return Err(self.kind_mismatch(input.kind()));
        };
        peer.ensure_open()?;
        let group_id = to_group_id(i64::from(group_id))?;
        self.function
            .combine_states(&mut self.state, group_id, &peer.state, position as usize)
    }

    fn evaluate_intermediate(
        &self,
        blocks: &mut [Option<ArrayRef>],
        offset: usize,
        selected: &[u32],
    ) -> Result<(), AggError> {
        self.ensure_open()?;
        check_output_slots(blocks, offset, self.intermediate_desc.len())?;
        self.state.to_intermediate(blocks, offset, selected)
    }

    fn evaluate_final(
        &mut self,
        blocks: &mut [Option<ArrayRef>],
        offset: usize,
        selected: &[u32],
    ) -> Result<(), AggError> {
        self.ensure_open()?;
        check_output_slots(blocks, offset, 1)?;
        blocks[offset] = Some(self.function.evaluate_final(&self.state, selected)?);
        self.finalized = true;
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.state.close();
        self.closed = true;
        debug!("closed {}", self);
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<F: GroupingAggregateFunction> Drop for GroupingAggregator<F> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<F: GroupingAggregateFunction> fmt::Display for GroupingAggregator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GroupingAggregator[kind={}, channels={:?}]",
            self.kind, self.channels
        )
    }
}

fn check_dense_group_ids(group_ids: &Int64Array) -> Result<(), AggError> {
    if group_ids.null_count() != 0 {
        return Err(AggError::invalid(format!(
            "dense group ids contain {} nulls",
            group_ids.null_count()
        )));
    }
    Ok(())
}

/// Value column layout chosen by `prepare_process_page`.
enum PreparedValues<'a, T: ArrowPrimitiveType> {
    AllNull(&'a dyn Array),
    Vector(&'a PrimitiveArray<T>),
    Block(ValueBlock<'a, T>),
}

impl<T: ArrowPrimitiveType> PreparedValues<'_, T> {
    fn layout(&self) -> &'static str {
        match self {
            PreparedValues::AllNull(_) => "all-null",
            PreparedValues::Vector(_) => "dense",
            PreparedValues::Block(_) => "nullable/multi-value",
        }
    }
}

struct GroupingAddInput<'a, F: GroupingAggregateFunction> {
    aggregator: &'a mut GroupingAggregator<F>,
    values: PreparedValues<'a, F::Input>,
    value_count: usize,
}

impl<F: GroupingAggregateFunction> GroupingAddInput<'_, F> {
    fn check_span(&self, position_offset: usize, group_positions: usize) -> Result<(), AggError> {
        if position_offset.saturating_add(group_positions) > self.value_count {
            return Err(AggError::invalid(format!(
                "group positions [{}, {}) exceed value column of {} rows",
                position_offset,
                position_offset.saturating_add(group_positions),
                self.value_count
            )));
        }
        Ok(())
    }

    fn dispatch<G: GroupIds>(&mut self, position_offset: usize, groups: &G) -> Result<(), AggError> {
        self.check_span(position_offset, groups.position_count())?;
        match &self.values {
            PreparedValues::AllNull(values) => {
                self.aggregator
                    .add_raw_input(position_offset, groups, &AllNulls(*values))
            }
            PreparedValues::Vector(values) => {
                self.aggregator
                    .add_raw_input(position_offset, groups, &DenseValues(*values))
            }
            PreparedValues::Block(values) => {
                self.aggregator.add_raw_input(position_offset, groups, values)
            }
        }
    }
}

impl<F: GroupingAggregateFunction> AddInput for GroupingAddInput<'_, F> {
    fn add_block(
        &mut self,
        position_offset: usize,
        group_ids: &GroupIdBlock<'_>,
    ) -> Result<(), AggError> {
        self.dispatch(position_offset, group_ids)
    }

    fn add_vector(
        &mut self,
        position_offset: usize,
        group_ids: &Int64Array,
    ) -> Result<(), AggError> {
        check_dense_group_ids(group_ids)?;
        self.dispatch(position_offset, group_ids)
    }
}

/// Resolves the zero or more group ids of one group column position.
trait GroupIds {
    fn position_count(&self) -> usize;

    fn for_each_group<E>(&self, position: usize, f: E) -> Result<(), AggError>
    where
        E: FnMut(usize) -> Result<(), AggError>;
}

impl GroupIds for Int64Array {
    fn position_count(&self) -> usize {
        self.len()
    }

    #[inline]
    fn for_each_group<E>(&self, position: usize, mut f: E) -> Result<(), AggError>
    where
        E: FnMut(usize) -> Result<(), AggError>,
    {
        f(to_group_id(self.value(position))?)
    }
}

impl GroupIds for GroupIdBlock<'_> {
    fn position_count(&self) -> usize {
        ValueBlock::position_count(self)
    }

    #[inline]
    fn for_each_group<E>(&self, position: usize, mut f: E) -> Result<(), AggError>
    where
        E: FnMut(usize) -> Result<(), AggError>,
    {
        // A null group contributes to no group.
        if self.is_null(position) {
            return Ok(());
        }
        let start = self.first_value_index(position);
        for g in start..start + self.value_count(position) {
            if self.is_value_null(g) {
                continue;
            }
            f(to_group_id(self.value(g))?)?;
        }
        Ok(())
    }
}

/// Feeds one value column position into one group.
trait ValueSource<T: ArrowPrimitiveType> {
    fn add_row<F>(
        &self,
        function: &F,
        state: &mut F::State,
        group_id: usize,
        position: usize,
    ) -> Result<(), AggError>
    where
        F: GroupingAggregateFunction<Input = T>;
}

struct AllNulls<'a>(&'a dyn Array);

struct DenseValues<'a, T: ArrowPrimitiveType>(&'a PrimitiveArray<T>);

impl<T: ArrowPrimitiveType> ValueSource<T> for AllNulls<'_> {
    #[inline]
    fn add_row<F>(
        &self,
        _function: &F,
        state: &mut F::State,
        group_id: usize,
        position: usize,
    ) -> Result<(), AggError>
    where
        F: GroupingAggregateFunction<Input = T>,
    {
        debug_assert!(matches!(self.0.data_type(), DataType::Null) || self.0.is_null(position));
        state.put_null(group_id)
    }
}

impl<T: ArrowPrimitiveType> ValueSource<T> for DenseValues<'_, T> {
    #[inline]
    fn add_row<F>(
        &self,
        function: &F,
        state: &mut F::State,
        group_id: usize,
        position: usize,
    ) -> Result<(), AggError>
    where
        F: GroupingAggregateFunction<Input = T>,
    {
        function.combine(state, group_id, self.0.value(position))
    }
}

impl<T: ArrowPrimitiveType> ValueSource<T> for ValueBlock<'_, T> {
    #[inline]
    fn add_row<F>(
        &self,
        function: &F,
        state: &mut F::State,
        group_id: usize,
        position: usize,
    ) -> Result<(), AggError>
    where
        F: GroupingAggregateFunction<Input = T>,
    {
        if self.is_null(position) {
            return state.put_null(group_id);
        }
        let start = self.first_value_index(position);
        for v in start..start + self.value_count(position) {
            if self.is_value_null(v) {
                continue;
            }
            function.combine(state, group_id, self.value(v))?;
        }
        Ok(())
    }
}
