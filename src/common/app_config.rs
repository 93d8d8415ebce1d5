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
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static CONFIG: OnceLock<GroupingAggConfig> = OnceLock::new();

pub const CONFIG_ENV: &str = "GROUPING_AGG_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "grouping_agg.toml";

fn default_log_level() -> String {
    "info".to_string()
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static GroupingAggConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let cfg = GroupingAggConfig::load_from_file(path.as_ref())?;
    Ok(CONFIG.get_or_init(|| cfg))
}

pub fn init_from_env_or_default() -> Result<&'static GroupingAggConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = config_path_from_env_or_default()?;
    let cfg = GroupingAggConfig::load_from_file(&path)?;
    Ok(CONFIG.get_or_init(|| cfg))
}

pub fn config() -> Result<&'static GroupingAggConfig> {
    init_from_env_or_default()
}

fn config_path_from_env_or_default() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(CONFIG_ENV) {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p));
        }
    }

    let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(anyhow!(
        "missing config file: set ${} or create ./{}",
        CONFIG_ENV,
        DEFAULT_CONFIG_FILE
    ))
}

#[derive(Clone, Debug, Deserialize)]
pub struct GroupingAggConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    /// Example: "grouping_agg=trace"
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub debug: DebugConfig,
}

impl GroupingAggConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let cfg: GroupingAggConfig =
            toml::from_str(&s).with_context(|| format!("parse toml: {}", path.display()))?;
        cfg.aggregation.validate()?;
        Ok(cfg)
    }

    /// The filter handed to `logging::init_with_level`.
    pub fn effective_log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(&self.log_level)
    }
}

impl Default for GroupingAggConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            aggregation: AggregationConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AggregationConfig {
    /// Group slots reserved up front by every grouping state.
    #[serde(default = "default_initial_group_capacity")]
    pub initial_group_capacity: usize,
    /// Byte limit applied to each grouping state's own tracker. Negative means unlimited.
    #[serde(default = "default_state_mem_limit_bytes")]
    pub state_mem_limit_bytes: i64,
}

fn default_initial_group_capacity() -> usize {
    0
}

fn default_state_mem_limit_bytes() -> i64 {
    -1
}

impl AggregationConfig {
    fn validate(&self) -> Result<()> {
        if self.initial_group_capacity > super::error::MAX_GROUP_ID as usize + 1 {
            return Err(anyhow!(
                "aggregation.initial_group_capacity {} exceeds the group id range",
                self.initial_group_capacity
            ));
        }
        Ok(())
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            initial_group_capacity: default_initial_group_capacity(),
            state_mem_limit_bytes: default_state_mem_limit_bytes(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DebugConfig {
    /// Log the representation picked by `prepare_process_page` for every batch.
    #[serde(default)]
    pub log_add_input: bool,
}
