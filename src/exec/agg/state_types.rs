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

use arrow::array::{ArrayRef, BooleanBufferBuilder};

use crate::common::error::AggError;
use crate::grouping_logging::trace;
use crate::runtime::mem_tracker::MemTracker;

const MIN_GROW_CAPACITY: usize = 16;

/// Group-id-indexed partial aggregate storage owned by exactly one aggregator.
///
/// Value-level accumulation lives with the aggregate function; the state only has to know how
/// to record a null contribution, serialize itself and release its memory.
pub trait GroupingState: Send {
    /// Records that `group_id` received a null value. Idempotent; later non-null contributions
    /// are still accepted.
    fn put_null(&mut self, group_id: usize) -> Result<(), AggError>;

    /// Writes one column per intermediate descriptor entry into `blocks[offset..]`, one row per
    /// selected group in order.
    fn to_intermediate(
        &self,
        blocks: &mut [Option<ArrayRef>],
        offset: usize,
        selected: &[u32],
    ) -> Result<(), AggError>;

    fn close(&mut self);
}

/// Contiguous growable array indexed by group id, with `seen` (non-null contribution) and
/// `nulls` (null marker) bitsets.
///
/// Backing storage is charged to a [`MemTracker`] before it is allocated and released exactly
/// once, on `release` or drop.
#[derive(Debug)]
pub struct GroupArray<V> {
    values: Vec<V>,
    seen: BooleanBufferBuilder,
    nulls: BooleanBufferBuilder,
    mem_tracker: Arc<MemTracker>,
    accounted_bytes: i64,
}

impl<V: Default> GroupArray<V> {
    pub fn new(mem_tracker: Arc<MemTracker>, initial_capacity: usize) -> Result<Self, AggError> {
        let mut out = Self {
            values: Vec::new(),
            seen: BooleanBufferBuilder::new(0),
            nulls: BooleanBufferBuilder::new(0),
            mem_tracker,
            accounted_bytes: 0,
        };
        out.reserve_slots(initial_capacity)?;
        Ok(out)
    }

    fn slot_bytes(slots: usize) -> usize {
        slots
            .saturating_mul(std::mem::size_of::<V>())
            .saturating_add(slots.div_ceil(8).saturating_mul(2))
    }

    fn reserve_slots(&mut self, capacity: usize) -> Result<(), AggError> {
        let current = self.values.capacity();
        if capacity <= current {
            return Ok(());
        }
        self.charge(Self::slot_bytes(capacity - current))?;
        self.values.reserve_exact(capacity - self.values.len());
        self.seen.reserve(capacity - self.seen.len());
        self.nulls.reserve(capacity - self.nulls.len());
        trace!(
            "grouping state grown: capacity {} -> {}, accounted_bytes={}",
            current, capacity, self.accounted_bytes
        );
        Ok(())
    }

    /// Makes `group_id` addressable, doubling capacity when it is exceeded. The group is not
    /// marked seen or null.
    pub fn ensure_group(&mut self, group_id: usize) -> Result<(), AggError> {
        let len = self.values.len();
        if group_id < len {
            return Ok(());
        }
        let needed = group_id + 1;
        if needed > self.values.capacity() {
            let grown = self
                .values
                .capacity()
                .saturating_mul(2)
                .max(MIN_GROW_CAPACITY)
                .max(needed);
            self.reserve_slots(grown)?;
        }
        self.values.resize_with(needed, V::default);
        self.seen.append_n(needed - len, false);
        self.nulls.append_n(needed - len, false);
        Ok(())
    }

    pub fn put_null(&mut self, group_id: usize) -> Result<(), AggError> {
        self.ensure_group(group_id)?;
        self.nulls.set_bit(group_id, true);
        Ok(())
    }

    /// Slot for a non-null contribution to `group_id`; the group counts as seen afterwards.
    pub fn value_mut(&mut self, group_id: usize) -> Result<&mut V, AggError> {
        self.ensure_group(group_id)?;
        self.seen.set_bit(group_id, true);
        Ok(&mut self.values[group_id])
    }
}

impl<V> GroupArray<V> {
    /// Number of addressable slots: one past the largest group id touched so far.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, group_id: usize) -> Option<&V> {
        if self.has_value(group_id) {
            self.values.get(group_id)
        } else {
            None
        }
    }

    pub fn has_value(&self, group_id: usize) -> bool {
        group_id < self.seen.len() && self.seen.get_bit(group_id)
    }

    pub fn has_null(&self, group_id: usize) -> bool {
        group_id < self.nulls.len() && self.nulls.get_bit(group_id)
    }

    pub fn accounted_bytes(&self) -> i64 {
        self.accounted_bytes
    }

    /// Charges payload bytes held outside the slot array (e.g. per-group buffers).
    pub fn charge(&mut self, bytes: usize) -> Result<(), AggError> {
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        self.mem_tracker
            .try_consume(bytes)
            .map_err(AggError::MemoryLimitExceeded)?;
        self.accounted_bytes = self.accounted_bytes.saturating_add(bytes);
        Ok(())
    }

    pub fn release(&mut self) {
        self.values = Vec::new();
        self.seen = BooleanBufferBuilder::new(0);
        self.nulls = BooleanBufferBuilder::new(0);
        self.mem_tracker.release(self.accounted_bytes);
        self.accounted_bytes = 0;
    }
}

impl<V> Drop for GroupArray<V> {
    fn drop(&mut self) {
        self.mem_tracker.release(self.accounted_bytes);
    }
}

/// Checks that `blocks` can take `count` columns starting at `offset`.
pub(crate) fn check_output_slots(
    blocks: &[Option<ArrayRef>],
    offset: usize,
    count: usize,
) -> Result<(), AggError> {
    if offset.saturating_add(count) > blocks.len() {
        return Err(AggError::invalid(format!(
            "output blocks too short: offset={} columns={} len={}",
            offset,
            count,
            blocks.len()
        )));
    }
    Ok(())
}
