//! 单台 PLC 的轮询循环。

use crate::entry::PlcEntry;
use crate::session::Session;
use crate::supervisor::Supervisor;
use crate::write_lock;
use domain::{PlcEventKind, now_epoch_ms};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 顺序执行轮询周期，直到被取消或连续失败达到阈值。
///
/// 取消只在周期之间检查；单个周期内的驱动调用由会话超时约束。
pub(crate) async fn run(
    supervisor: Supervisor,
    entry: Arc<PlcEntry>,
    session: Arc<Session>,
    cancel: CancellationToken,
) {
    let rate = entry.config.load().poll_rate();
    let threshold = supervisor.settings().failure_threshold.max(1);
    let mut ticker = interval(rate);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let config = entry.config.load_full();
        let names = config.polled_tags();
        if names.is_empty() {
            continue;
        }

        match session.read(&names, config.timeout()).await {
            Ok(values) => {
                let ts_ms = now_epoch_ms();
                let tags = names.len() as u64;
                let changes = entry.cache.apply(&names, values, ts_ms);
                {
                    let mut stats = write_lock(&entry.stats);
                    stats.tags_polled += tags;
                    stats.changes_found += changes;
                    stats.poll_cycles += 1;
                    stats.consecutive_failures = 0;
                    stats.last_poll_ms = Some(ts_ms);
                }
                supervisor.metrics().record_poll_cycle(tags, changes);
                let generation = entry.generation.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    target: "plcgw.supervisor",
                    plc = %entry.name,
                    tags = tags,
                    changes = changes,
                    generation = generation,
                    "poll_cycle"
                );
                supervisor.emit(&entry.name, PlcEventKind::Refreshed { generation });
            }
            Err(err) => {
                let message = err.to_string();
                let failures = {
                    let mut stats = write_lock(&entry.stats);
                    stats.consecutive_failures += 1;
                    stats.last_error = Some(message.clone());
                    stats.consecutive_failures
                };
                supervisor.metrics().record_poll_failure();
                supervisor.record_error(&entry, message.clone());
                warn!(
                    target: "plcgw.supervisor",
                    plc = %entry.name,
                    failures = failures,
                    threshold = threshold,
                    error = %message,
                    "poll_cycle_failed"
                );
                supervisor.log().warn(
                    &entry.name,
                    format!("poll failed ({}/{}): {}", failures, threshold, message),
                );
                if failures >= threshold {
                    supervisor.demote(&entry, message);
                    break;
                }
            }
        }
    }
}
