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
use crate::grouping_config::config as grouping_app_config;

pub(crate) fn initial_group_capacity() -> usize {
    grouping_app_config()
        .ok()
        .map(|c| c.aggregation.initial_group_capacity)
        .unwrap_or(0)
}

pub(crate) fn state_mem_limit_bytes() -> i64 {
    grouping_app_config()
        .ok()
        .map(|c| c.aggregation.state_mem_limit_bytes)
        .unwrap_or(-1)
}

pub(crate) fn debug_log_add_input() -> bool {
    grouping_app_config()
        .ok()
        .map(|c| c.debug.log_add_input)
        .unwrap_or(false)
}
