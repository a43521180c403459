use std::sync::Arc;

use anyhow::Result;
use biasengine::breaker::condition::ConditionBoard;
use biasengine::breaker::notify::{ChannelSink, FanoutSink, NotificationSink};
use biasengine::config::EngineConfig;
use biasengine::driver::{handle, parse_command};
use biasengine::engine::BiasEngine;
use biasengine::logging::{log, log_config_error, obj, v_num, v_str, Domain, Level};
use biasengine::storage::TransitionJournal;
use chrono::Utc;
use serde_json::json;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio::time::{interval, Duration};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = match EngineConfig::from_env().and_then(|cfg| cfg.validate().map(|_| cfg)) {
        Ok(cfg) => cfg,
        Err(err) => {
            log_config_error("env", &err.to_string());
            return Err(err.into());
        }
    };

    let conditions = Arc::new(ConditionBoard::new(cfg.condition_max_age));
    let (channel, mut notices) = ChannelSink::new(256);
    let mut sink = FanoutSink::new().with(Arc::new(channel));
    if let Some(path) = &cfg.journal_path {
        sink = sink.with(Arc::new(TransitionJournal::open(path)?));
    }
    let sink: Arc<dyn NotificationSink> = Arc::new(sink);
    let engine = match BiasEngine::from_config(&cfg, conditions.clone(), sink) {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            log_config_error("boot", &format!("{:#}", err));
            return Err(err);
        }
    };

    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("poll_secs", v_num(cfg.poll_secs as f64)),
            ("journal", cfg.journal_path.as_deref().map(v_str).unwrap_or(serde_json::Value::Null)),
        ]),
    );

    // Transition notices are printed alongside command replies
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            println!("{}", json!({ "type": "notice", "notice": notice }));
        }
    });

    let mut lines = BufReader::new(stdin()).lines();
    let mut ticker = interval(Duration::from_secs(cfg.poll_secs));
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                let reply = match parse_command(trimmed) {
                    Ok(cmd) => handle(&engine, &conditions, cmd, Utc::now()),
                    Err(err) => json!({ "result": "error", "reason": err.to_string() }),
                };
                println!("{}", reply);
            }
            _ = ticker.tick() => {
                let now = Utc::now();
                engine.poll_breakers(now);
                engine.evict_stale(now);
            }
        }
    }

    log(Level::Info, Domain::System, "shutdown", obj(&[]));
    Ok(())
}
