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
use thiserror::Error;

/// Largest group id accepted by the grouping layer. Group ids travel as `Int64` columns but must
/// fit a 32-bit signed index.
pub const MAX_GROUP_ID: i64 = i32::MAX as i64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggError {
    #[error("group id {group_id} out of range [0, {max}]", max = MAX_GROUP_ID)]
    GroupIdOutOfRange { group_id: i64 },
    #[error("aggregate kind mismatch: expected {expected}; got {actual}")]
    KindMismatch { expected: String, actual: String },
    #[error("memory limit exceeded: {0}")]
    MemoryLimitExceeded(String),
    #[error("invalid aggregate input: {0}")]
    InvalidInput(String),
    #[error("arithmetic overflow: {0}")]
    Overflow(String),
    #[error("{0} is closed")]
    Closed(String),
    #[error("{0} already produced its final result")]
    Finalized(String),
}

impl AggError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        AggError::InvalidInput(msg.into())
    }
}

/// Narrows a raw `Int64` group id to a state index, rejecting negative and oversized ids.
pub fn to_group_id(raw: i64) -> Result<usize, AggError> {
    if !(0..=MAX_GROUP_ID).contains(&raw) {
        return Err(AggError::GroupIdOutOfRange { group_id: raw });
    }
    Ok(raw as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_group_id_is_accepted() {
        assert_eq!(to_group_id(MAX_GROUP_ID), Ok(i32::MAX as usize));
        assert_eq!(to_group_id(0), Ok(0));
    }

    #[test]
    fn out_of_range_group_id_is_rejected() {
        let err = to_group_id(MAX_GROUP_ID + 1).expect_err("expected range error");
        assert_eq!(
            err,
            AggError::GroupIdOutOfRange {
                group_id: MAX_GROUP_ID + 1
            }
        );
        assert!(err.to_string().contains("2147483648"), "err={}", err);
        assert!(matches!(
            to_group_id(-1),
            Err(AggError::GroupIdOutOfRange { group_id: -1 })
        ));
    }
}
