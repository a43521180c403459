//! Engine shared across threads: independent factor writers, concurrent
//! readers, racing breaker triggers, and async notice delivery.

use std::sync::Arc;
use std::thread;

use biasengine::breaker::notify::{ChannelSink, MemorySink};
use biasengine::breaker::policy::BreakerPolicy;
use biasengine::breaker::{Category, Status};
use biasengine::composite::Composite;
use biasengine::config::EngineConfig;
use biasengine::engine::BiasEngine;
use biasengine::factor::registry::FactorRegistry;
use biasengine::factor::{Factor, Horizon, Score};
use chrono::{DateTime, Duration, TimeZone, Utc};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap()
}

fn engine_with(sink: Arc<dyn biasengine::breaker::notify::NotificationSink>) -> BiasEngine {
    let registry = FactorRegistry::from_factors(
        vec![
            Factor::new("a", Horizon::Short, 0.5, Duration::hours(4)),
            Factor::new("b", Horizon::Medium, 0.3, Duration::hours(48)),
            Factor::new("c", Horizon::Long, 0.2, Duration::hours(1080)),
        ],
        1e-6,
    )
    .unwrap();
    let never = |_: &str, _: Category, _: DateTime<Utc>| -> Option<bool> { Some(false) };
    BiasEngine::new(&EngineConfig::default(), registry, BreakerPolicy::default(), Arc::new(never), sink).unwrap()
}

#[test]
fn writers_on_different_factors_do_not_interfere() {
    let engine = Arc::new(engine_with(Arc::new(MemorySink::new(16))));
    let mut handles = Vec::new();

    for (id, sign) in [("a", 1.0), ("b", -1.0), ("c", 1.0)] {
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            for i in 0..500 {
                let value = sign * (i % 10) as f64 / 10.0;
                engine.update_factor(id, Score::Value(value), t0() + Duration::seconds(i));
            }
            // final value: 0.5 magnitude
            engine.update_factor(id, Score::Value(sign * 0.5), t0() + Duration::seconds(600));
        }));
    }

    for _ in 0..2 {
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                let r = engine.read_composite(t0() + Duration::seconds(300));
                if let Composite::Value { value, contributors } = &r.base {
                    assert!((-1.0..=1.0).contains(value));
                    assert!(contributors.len() <= 3);
                }
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    let r = engine.read_composite(t0() + Duration::seconds(600));
    // (0.5·0.5 − 0.5·0.3 + 0.5·0.2) / 1.0
    let value = r.base.value().unwrap();
    assert!((value - 0.2).abs() < 1e-9, "composite {}", value);
    assert_eq!(r.base.contributors().len(), 3);
}

#[test]
fn racing_triggers_settle_on_highest_severity() {
    let sink = Arc::new(MemorySink::new(64));
    let engine = Arc::new(engine_with(sink.clone()));

    let handles: Vec<_> = [1u8, 3, 2, 1, 3, 2]
        .into_iter()
        .enumerate()
        .map(|(i, severity)| {
            let engine = engine.clone();
            thread::spawn(move || {
                engine.trigger("downside", severity, &format!("t{}_{}", i, severity), t0());
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let status = engine.breaker_status(t0());
    assert_eq!(status[0].status, Status::Active);
    assert_eq!(status[0].event.as_ref().unwrap().severity, 3);

    // Every applied transition raised severity
    let severities: Vec<u8> = sink.notices().iter().filter_map(|n| n.event.as_ref().map(|e| e.severity)).collect();
    assert!(!severities.is_empty());
    assert!(severities.windows(2).all(|w| w[0] < w[1]), "severities {:?}", severities);
}

#[tokio::test]
async fn channel_sink_delivers_notices() {
    let (channel, mut rx) = ChannelSink::new(8);
    let engine = engine_with(Arc::new(channel));

    engine.trigger("volatility", 2, "vol_spike_major", t0());

    let notice = rx.recv().await.unwrap();
    assert_eq!(notice.category, Category::Volatility);
    assert_eq!(notice.from, Status::Inactive);
    assert_eq!(notice.to, Status::Active);
    assert_eq!(notice.event.unwrap().trigger_id, "vol_spike_major");
}
