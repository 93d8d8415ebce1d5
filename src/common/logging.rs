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
//! glog-style event formatting for the grouping layer.
//!
//! Events go to stderr unless `GROUPING_AGG_LOG_FILE` (a file) or `GROUPING_AGG_LOG_DIR`
//! (a directory receiving `grouping_agg.log`) is set.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use chrono::Local;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

use super::app_config::GroupingAggConfig;

static INIT: OnceLock<()> = OnceLock::new();

pub const LOG_FILE_ENV: &str = "GROUPING_AGG_LOG_FILE";
pub const LOG_DIR_ENV: &str = "GROUPING_AGG_LOG_DIR";
const LOG_FILE_NAME: &str = "grouping_agg.log";

/// `Lyyyymmdd hh:mm:ss.uuuuuu tid target file:line] message`
struct GlogFormatter;

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// An explicit file wins over a directory.
fn log_file_path(file: Option<String>, dir: Option<String>) -> Option<PathBuf> {
    file.map(PathBuf::from)
        .or_else(|| dir.map(|d| Path::new(&d).join(LOG_FILE_NAME)))
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(err) = fs::create_dir_all(parent)
    {
        eprintln!("cannot create log dir {}: {}; logging to stderr", parent.display(), err);
        return None;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| eprintln!("cannot open log file {}: {}; logging to stderr", path.display(), err))
        .ok()
}

fn level_char(level: &tracing::Level) -> char {
    match *level {
        tracing::Level::ERROR => 'E',
        tracing::Level::WARN => 'W',
        tracing::Level::INFO => 'I',
        tracing::Level::DEBUG => 'D',
        tracing::Level::TRACE => 'T',
    }
}

fn thread_number() -> u64 {
    let id = format!("{:?}", std::thread::current().id());
    id.trim_start_matches("ThreadId(")
        .trim_end_matches(')')
        .parse()
        .unwrap_or(0)
}

impl<S, N> FormatEvent<S, N> for GlogFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "{}{} {} {} {}:{}] ",
            level_char(meta.level()),
            Local::now().format("%Y%m%d %H:%M:%S%.6f"),
            thread_number(),
            meta.target(),
            meta.file().unwrap_or("unknown"),
            meta.line().unwrap_or(0)
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs the global subscriber once; later calls are no-ops.
pub fn init_with_level(level: &str) {
    INIT.get_or_init(|| {
        let env_filter = EnvFilter::new(level);
        let file = log_file_path(env_value(LOG_FILE_ENV), env_value(LOG_DIR_ENV))
            .and_then(|path| open_log_file(&path));
        // `with_ansi` exists only until `event_format` replaces the default format.
        let _ = match file {
            Some(file) => tracing_fmt()
                .with_env_filter(env_filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .event_format(GlogFormatter)
                .try_init(),
            None => tracing_fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_ansi(atty::is(atty::Stream::Stderr))
                .event_format(GlogFormatter)
                .try_init(),
        };
    });
}

pub fn init_from_config(cfg: &GroupingAggConfig) {
    init_with_level(cfg.effective_log_filter());
}

pub fn init() {
    init_with_level("info");
}

pub use tracing::{debug, error, info, trace, warn};
