use crate::collectors::bandwidth;
use crate::collectors::SnapshotSource;
use crate::config::{Config, ExhaustedPolicy};
use crate::delivery::{DeliveryClient, DeliveryOutcome, Sink};
use crate::evaluate::evaluate;
use crate::format;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("alert delivery exhausted after {attempts} attempts")]
    DeliveryExhausted { attempts: u32 },
}

/// The tick loop: sample, evaluate, maybe deliver, sleep the remainder of
/// the interval. Runs until shutdown is signalled, or until delivery
/// exhaustion under the `stop` policy.
///
/// One logical thread of control: everything within a tick runs
/// sequentially, and nothing mutable is shared across ticks.
pub async fn run<S, K>(
    cfg: &Config,
    source: &mut S,
    sink: Option<&K>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), MonitorError>
where
    S: SnapshotSource,
    K: Sink,
{
    let interval = Duration::from_secs(cfg.interval_secs);
    let thresholds = cfg.parsed_thresholds();
    let client = DeliveryClient::new(
        cfg.delivery.max_attempts,
        Duration::from_secs(cfg.delivery.retry_delay_secs),
    );

    if sink.is_none() {
        info!("no sink endpoint configured; snapshots will only be logged");
    }

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let tick_started = Instant::now();
        let snapshot = source.sample(bandwidth::SAMPLE_WINDOW).await;
        debug!(
            hostname = %snapshot.hostname,
            cpu_usage = snapshot.cpu_usage,
            memory_used_percent = snapshot.memory_used_percent,
            root_drive_used_percent = snapshot.root_drive_used_percent,
            network_down = snapshot.network_down,
            network_up = snapshot.network_up,
            "snapshot collected"
        );

        let payload = if thresholds.is_empty() {
            Some(format::routine_payload(&snapshot))
        } else {
            let breaches = evaluate(&snapshot, &thresholds);
            if breaches.is_empty() {
                None
            } else {
                info!(
                    breached = ?breaches.iter().map(|f| f.as_str()).collect::<Vec<_>>(),
                    "thresholds breached"
                );
                Some(format::breach_payload(&snapshot, &breaches))
            }
        };

        if let (Some(sink), Some(payload)) = (sink, &payload) {
            match client.deliver(sink, payload, &mut shutdown).await {
                DeliveryOutcome::Delivered { attempts } => {
                    debug!(attempts, "tick delivery finished");
                }
                DeliveryOutcome::Cancelled => {
                    info!("shutdown observed during delivery");
                    return Ok(());
                }
                DeliveryOutcome::Exhausted { attempts } => match cfg.delivery.on_exhausted {
                    ExhaustedPolicy::Stop => {
                        return Err(MonitorError::DeliveryExhausted { attempts });
                    }
                    ExhaustedPolicy::Continue => {
                        warn!(
                            attempts,
                            title = %payload.title,
                            "alert dropped after exhausting delivery attempts"
                        );
                    }
                },
            }
        }

        // The bandwidth window (and any delivery waits) already consumed
        // part of the interval; never sleep a negative remainder.
        let sleep_for = interval.saturating_sub(tick_started.elapsed());
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeliveryConfig;
    use crate::delivery::{SinkError, SinkResponse};
    use crate::format::AlertPayload;
    use crate::snapshot::{testutil, MachineSnapshot};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Scripted source: returns the canned snapshot and, when given a
    /// sender, signals shutdown from its first sample so the loop ends
    /// after one full tick.
    struct ScriptedSource {
        snapshot: MachineSnapshot,
        shutdown_tx: Option<watch::Sender<bool>>,
        samples: AtomicU32,
    }

    impl SnapshotSource for ScriptedSource {
        async fn sample(&mut self, _bandwidth_window: Duration) -> MachineSnapshot {
            self.samples.fetch_add(1, Ordering::SeqCst);
            if let Some(tx) = &self.shutdown_tx {
                let _ = tx.send(true);
            }
            self.snapshot.clone()
        }
    }

    struct RecordingSink {
        status: u16,
        posts: Mutex<Vec<AlertPayload>>,
        /// Signal shutdown once this many posts have been seen.
        stop_after: Option<(watch::Sender<bool>, usize)>,
    }

    impl RecordingSink {
        fn new(status: u16) -> Self {
            Self {
                status,
                posts: Mutex::new(Vec::new()),
                stop_after: None,
            }
        }

        fn posts(&self) -> Vec<AlertPayload> {
            self.posts.lock().expect("no poisoned lock in tests").clone()
        }
    }

    impl Sink for RecordingSink {
        async fn post(&self, payload: &AlertPayload) -> Result<SinkResponse, SinkError> {
            let count = {
                let mut posts = self.posts.lock().expect("no poisoned lock in tests");
                posts.push(payload.clone());
                posts.len()
            };
            if let Some((tx, after)) = &self.stop_after {
                if count >= *after {
                    let _ = tx.send(true);
                }
            }
            Ok(SinkResponse {
                status: self.status,
                body: String::new(),
            })
        }
    }

    fn config_with_thresholds(pairs: &[(&str, f64)]) -> Config {
        let mut cfg = Config {
            interval_secs: 1,
            ..Config::default()
        };
        for (key, limit) in pairs {
            cfg.thresholds.insert(key.to_string(), *limit);
        }
        cfg
    }

    /// Source that stops the loop itself after its first sample. The tick
    /// still runs to completion before the loop observes the signal.
    fn one_tick(snapshot: MachineSnapshot) -> (ScriptedSource, watch::Receiver<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            ScriptedSource {
                snapshot,
                shutdown_tx: Some(shutdown_tx),
                samples: AtomicU32::new(0),
            },
            shutdown_rx,
        )
    }

    fn silent_source(snapshot: MachineSnapshot) -> ScriptedSource {
        ScriptedSource {
            snapshot,
            shutdown_tx: None,
            samples: AtomicU32::new(0),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn breached_threshold_delivers_one_filtered_alert() {
        // cpu_usage 95 vs limit 90; memory stays below its limit.
        let cfg = config_with_thresholds(&[("cpu_usage", 90.0), ("memory_used_percent", 85.0)]);
        let (mut source, shutdown) = one_tick(testutil::snapshot());
        let sink = RecordingSink::new(200);

        run(&cfg, &mut source, Some(&sink), shutdown)
            .await
            .expect("loop must stop cleanly");

        let posts = sink.posts();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].title.contains("cpu_usage"));
        assert!(!posts[0].title.contains("memory_used_percent"));
        assert!(posts[0].body.contains("*cpu_usage* : `95`"));
        assert!(!posts[0].body.contains("*drives*"));
    }

    #[tokio::test(start_paused = true)]
    async fn unbreached_thresholds_deliver_nothing() {
        let cfg = config_with_thresholds(&[("cpu_usage", 99.0)]);
        let (mut source, shutdown) = one_tick(testutil::snapshot());
        let sink = RecordingSink::new(200);

        run(&cfg, &mut source, Some(&sink), shutdown)
            .await
            .expect("loop must stop cleanly");

        assert!(sink.posts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn no_thresholds_and_no_sink_is_a_valid_silent_mode() {
        let cfg = config_with_thresholds(&[]);
        let (mut source, shutdown) = one_tick(testutil::snapshot());

        run(&cfg, &mut source, Option::<&RecordingSink>::None, shutdown)
            .await
            .expect("passive mode must run without error");

        assert_eq!(source.samples.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_thresholds_with_sink_sends_a_routine_update_every_tick() {
        let cfg = config_with_thresholds(&[]);
        let (mut source, shutdown) = one_tick(testutil::snapshot());
        let sink = RecordingSink::new(200);

        run(&cfg, &mut source, Some(&sink), shutdown)
            .await
            .expect("loop must stop cleanly");

        let posts = sink.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Server Monitor Update");
        assert!(posts[0].body.contains("*network_cards*"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_under_stop_policy_ends_the_loop_with_an_error() {
        let mut cfg = config_with_thresholds(&[("cpu_usage", 90.0)]);
        cfg.delivery = DeliveryConfig {
            max_attempts: 3,
            retry_delay_secs: 1,
            on_exhausted: ExhaustedPolicy::Stop,
        };
        // The loop ends through the policy, not through shutdown.
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let mut source = silent_source(testutil::snapshot());
        let sink = RecordingSink::new(500);

        let err = run(&cfg, &mut source, Some(&sink), shutdown)
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::DeliveryExhausted { attempts: 3 }));
        assert_eq!(sink.posts().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_under_continue_policy_moves_on() {
        let mut cfg = config_with_thresholds(&[("cpu_usage", 90.0)]);
        cfg.delivery = DeliveryConfig {
            max_attempts: 2,
            retry_delay_secs: 1,
            on_exhausted: ExhaustedPolicy::Continue,
        };
        // Shutdown arrives once the attempt budget of the first alert has
        // been spent, so the loop survives the exhaustion and then stops.
        let (shutdown_tx, shutdown) = watch::channel(false);
        let mut source = silent_source(testutil::snapshot());
        let mut sink = RecordingSink::new(500);
        sink.stop_after = Some((shutdown_tx, 2));

        run(&cfg, &mut source, Some(&sink), shutdown)
            .await
            .expect("continue policy must not end the loop");

        assert_eq!(sink.posts().len(), 2);
    }
}
