use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::config::Config;

pub const APP_LOG_BASE_NAME: &str = "nanatwin.log";
const TIMING_TARGET: &str = "nanatwin.timing";

pub struct LoggingGuards {
    _file_guard: WorkerGuard,
    _timing_guard: WorkerGuard,
    _json_file_guard: WorkerGuard,
    _json_timing_guard: WorkerGuard,
}

#[derive(Debug, Clone)]
pub struct LogTail {
    pub path: PathBuf,
    pub lines: Vec<String>,
}

fn parse_log_level(value: &str) -> LevelFilter {
    match value.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

fn app_filter(level: LevelFilter) -> Targets {
    Targets::new()
        .with_default(level)
        .with_target(TIMING_TARGET, LevelFilter::OFF)
        .with_target("hyper", LevelFilter::WARN)
        .with_target("hyper_util", LevelFilter::WARN)
        .with_target("hyper_util::client::legacy::pool", LevelFilter::WARN)
        .with_target("reqwest", LevelFilter::WARN)
        .with_target("rustls", LevelFilter::WARN)
}

pub fn init_logging(config: &Config) -> LoggingGuards {
    let logs_dir = config.logs_dir.as_path();
    if let Err(err) = fs::create_dir_all(logs_dir) {
        eprintln!("Failed to create logs directory {}: {err}", logs_dir.display());
    }

    let file_appender = tracing_appender::rolling::daily(logs_dir, APP_LOG_BASE_NAME);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let timing_appender = tracing_appender::rolling::daily(logs_dir, "timing.log");
    let (timing_writer, timing_guard) = tracing_appender::non_blocking(timing_appender);

    let json_file_appender = tracing_appender::rolling::daily(logs_dir, "nanatwin.jsonl");
    let (json_file_writer, json_file_guard) = tracing_appender::non_blocking(json_file_appender);

    let json_timing_appender = tracing_appender::rolling::daily(logs_dir, "timing.jsonl");
    let (json_timing_writer, json_timing_guard) =
        tracing_appender::non_blocking(json_timing_appender);

    let general_filter = app_filter(parse_log_level(&config.log_level));
    // The console shares the terminal with the wizard, so it stays quieter.
    let console_filter = app_filter(parse_log_level(&config.console_log_level));
    let timing_filter = Targets::new()
        .with_default(LevelFilter::OFF)
        .with_target(TIMING_TARGET, LevelFilter::INFO);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(general_filter.clone());
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);
    let timing_layer = tracing_subscriber::fmt::layer()
        .with_writer(timing_writer)
        .with_ansi(false)
        .with_filter(timing_filter.clone());
    let json_file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(json_file_writer)
        .with_filter(general_filter);
    let json_timing_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(json_timing_writer)
        .with_filter(timing_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(timing_layer)
        .with(json_file_layer)
        .with(json_timing_layer)
        .init();

    LoggingGuards {
        _file_guard: file_guard,
        _timing_guard: timing_guard,
        _json_file_guard: json_file_guard,
        _json_timing_guard: json_timing_guard,
    }
}

/// Returns the last `max_lines` lines of the newest log file whose name
/// starts with `base_name`, or `None` when there is nothing to show.
pub fn read_recent_log_lines(
    logs_dir: &Path,
    base_name: &str,
    max_lines: usize,
) -> io::Result<Option<LogTail>> {
    if max_lines == 0 || !logs_dir.is_dir() {
        return Ok(None);
    }

    match newest_rotation(logs_dir, base_name)? {
        Some(path) => {
            let lines = last_lines(&path, max_lines)?;
            Ok(Some(LogTail { path, lines }))
        }
        None => Ok(None),
    }
}

/// Daily rotation appends a date suffix, so every file sharing the prefix is
/// a candidate; the most recently modified one wins.
fn newest_rotation(logs_dir: &Path, base_name: &str) -> io::Result<Option<PathBuf>> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(logs_dir)? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with(base_name) {
            continue;
        }
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            candidates.push((modified, entry.path()));
        }
    }

    Ok(candidates
        .into_iter()
        .max_by(|(left, _), (right, _)| left.cmp(right))
        .map(|(_, path)| path))
}

fn last_lines(path: &Path, max_lines: usize) -> io::Result<Vec<String>> {
    let mut window = VecDeque::with_capacity(max_lines + 1);
    for line in BufReader::new(File::open(path)?).lines() {
        window.push_back(line?);
        if window.len() > max_lines {
            window.pop_front();
        }
    }
    Ok(window.into())
}
