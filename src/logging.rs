//! Structured logging for the bias engine.
//!
//! Every record is a single JSON line carrying a run id, a sequence number,
//! a level and a domain. Records go to stderr (stdout belongs to the
//! driver's output) and, when `LOG_DIR` is set, to per-run files:
//! `events.jsonl` for info and above, `trace.jsonl` for trace/debug.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Factor,     // Reading updates, rejections, evictions
    Composite,  // Composite reads
    Conviction, // Volatility regime changes
    Breaker,    // Circuit breaker transitions
    Config,     // Registry and settings validation
    System,     // Startup, shutdown
    Profile,    // Timing
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Factor => "factor",
            Domain::Composite => "composite",
            Domain::Conviction => "conviction",
            Domain::Breaker => "breaker",
            Domain::Config => "config",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    files: Option<RunFiles>,
}

#[derive(Debug)]
struct RunFiles {
    events: Mutex<BufWriter<File>>,
    trace: Mutex<BufWriter<File>>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let files = std::env::var("LOG_DIR")
            .ok()
            .and_then(|base| open_run_files(PathBuf::from(base).join(&run_id), &run_id));
        RunContext { run_id, files }
    })
}

fn open_run_files(run_dir: PathBuf, run_id: &str) -> Option<RunFiles> {
    if let Err(err) = create_dir_all(&run_dir) {
        eprintln!("[log] failed to create run dir: {}", err);
        return None;
    }
    let _ = std::fs::write(
        run_dir.join("manifest.json"),
        json!({
            "run_id": run_id,
            "ts": ts_now(),
            "pid": process::id(),
            "log_dir": run_dir.to_string_lossy(),
        })
        .to_string(),
    );
    let events = File::create(run_dir.join("events.jsonl"))
        .map_err(|err| eprintln!("[log] failed to create events log: {}", err))
        .ok()?;
    let trace = File::create(run_dir.join("trace.jsonl"))
        .map_err(|err| eprintln!("[log] failed to create trace log: {}", err))
        .ok()?;
    Some(RunFiles {
        events: Mutex::new(BufWriter::new(events)),
        trace: Mutex::new(BufWriter::new(trace)),
    })
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["factor_id", "category", "trigger_id", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain.as_str(), event, fields);
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    if let Some(files) = &ctx.files {
        match level {
            Level::Trace | Level::Debug => write_line(&files.trace, &line),
            _ => write_line(&files.events, &line),
        }
    }
    eprintln!("{}", line);
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_factor_update(factor_id: &str, value: Option<f64>, ts: &str) {
    log(
        Level::Trace,
        Domain::Factor,
        "factor_update",
        obj(&[
            ("factor_id", v_str(factor_id)),
            ("value", value.map(v_num).unwrap_or(Value::Null)),
            ("reading_ts", v_str(ts)),
        ]),
    );
}

pub fn log_factor_rejected(factor_id: &str, reason: &str, raw: Option<f64>) {
    log(
        Level::Warn,
        Domain::Factor,
        "factor_rejected",
        obj(&[
            ("factor_id", v_str(factor_id)),
            ("reason", v_str(reason)),
            ("raw", raw.map(v_num).unwrap_or(Value::Null)),
        ]),
    );
}

pub fn log_eviction(factor_id: &str, age_secs: i64, ttl_secs: i64) {
    log(
        Level::Info,
        Domain::Factor,
        "factor_evicted",
        obj(&[
            ("factor_id", v_str(factor_id)),
            ("age_secs", json!(age_secs)),
            ("ttl_secs", json!(ttl_secs)),
        ]),
    );
}

pub fn log_composite(
    base: Option<f64>,
    final_value: Option<f64>,
    level: &str,
    contributors: usize,
    excluded: usize,
    fingerprint: &str,
) {
    log(
        Level::Debug,
        Domain::Composite,
        "composite_read",
        obj(&[
            ("base", base.map(v_num).unwrap_or(Value::Null)),
            ("final", final_value.map(v_num).unwrap_or(Value::Null)),
            ("level", v_str(level)),
            ("contributors", json!(contributors)),
            ("excluded", json!(excluded)),
            ("fingerprint", v_str(fingerprint)),
        ]),
    );
}

pub fn log_conviction_change(active: bool, reading: f64, threshold: f64) {
    log(
        Level::Info,
        Domain::Conviction,
        if active { "conviction_activated" } else { "conviction_deactivated" },
        obj(&[("reading", v_num(reading)), ("threshold", v_num(threshold))]),
    );
}

pub fn log_transition(category: &str, from: &str, to: &str, trigger_id: Option<&str>, reason: &str) {
    log(
        Level::Warn,
        Domain::Breaker,
        "breaker_transition",
        obj(&[
            ("category", v_str(category)),
            ("from", v_str(from)),
            ("to", v_str(to)),
            ("trigger_id", trigger_id.map(v_str).unwrap_or(Value::Null)),
            ("reason", v_str(reason)),
        ]),
    );
}

pub fn log_transition_dropped(category: &str, reason: &str, detail: &str) {
    log(
        Level::Info,
        Domain::Breaker,
        "breaker_transition_dropped",
        obj(&[
            ("category", v_str(category)),
            ("reason", v_str(reason)),
            ("msg", v_str(detail)),
        ]),
    );
}

pub fn log_config_error(stage: &str, err: &str) {
    log(
        Level::Fatal,
        Domain::Config,
        "config_error",
        obj(&[("stage", v_str(stage)), ("msg", v_str(err))]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Profiling scope that emits structured timing on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
    enabled: bool,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            context: None,
            started: Instant::now(),
            enabled: Self::should_sample(),
        }
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        let enabled = Self::should_sample();
        Self {
            label,
            context: if enabled { Some(obj(fields)) } else { None },
            started: Instant::now(),
            enabled,
        }
    }

    fn should_sample() -> bool {
        std::env::var("PROFILE_SAMPLE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .map(|p| {
                if p >= 1.0 {
                    true
                } else if p <= 0.0 {
                    false
                } else {
                    let seq = PROFILE_SEQ.fetch_add(1, Ordering::SeqCst);
                    let bucket = (seq % 10_000) as f64 / 10_000.0;
                    bucket < p
                }
            })
            .unwrap_or(true)
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Tests
// =============================================================================
