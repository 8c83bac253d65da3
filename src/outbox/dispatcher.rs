/// 아웃박스 디스패처
/// 일정 주기로 미발행 레코드를 버스에 발행하고, 전송이 확인된 레코드만 발행 완료로 표시한다.
/// 실패한 레코드는 남겨두었다가 백오프 후 다시 시도한다. (at-least-once)
// region:    --- Imports
use super::{retry_backoff, Outbox};
use crate::error::{PublishError, StoreError};
use crate::message_broker::EventBus;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Dispatcher Config
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub interval: Duration,
    pub batch_size: i64,
    pub publish_timeout: Duration,
    pub max_backoff: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            batch_size: 100,
            publish_timeout: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// 한 사이클 처리 결과
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub published: usize,
    pub failed: usize,
    /// 같은 경매의 앞선 레코드가 실패해서 이번 사이클에 보류된 수
    pub held_back: usize,
}

impl DispatchReport {
    pub fn is_empty(&self) -> bool {
        self.published == 0 && self.failed == 0 && self.held_back == 0
    }
}
// endregion: --- Dispatcher Config

// region:    --- Outbox Dispatcher
pub struct OutboxDispatcher {
    outbox: Arc<dyn Outbox>,
    bus: Arc<dyn EventBus>,
    config: DispatcherConfig,
}

impl OutboxDispatcher {
    pub fn new(outbox: Arc<dyn Outbox>, bus: Arc<dyn EventBus>, config: DispatcherConfig) -> Self {
        Self {
            outbox,
            bus,
            config,
        }
    }

    /// 디스패처 시작
    /// 취소되어도 진행 중인 사이클은 끝까지 처리한 뒤 멈춘다.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            "{:<12} --> 디스패처 시작: interval={:?}",
            "Outbox", self.config.interval
        );
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.dispatch_pending(Utc::now()).await {
                        Ok(report) if report.is_empty() => {
                            debug!("{:<12} --> 발행할 레코드 없음", "Outbox");
                        }
                        Ok(report) => info!(
                            "{:<12} --> 발행 {}건, 실패 {}건, 보류 {}건",
                            "Outbox", report.published, report.failed, report.held_back
                        ),
                        Err(e) => error!("{:<12} --> 아웃박스 조회 오류: {:?}", "Outbox", e),
                    }
                }
            }
        }

        info!("{:<12} --> 디스패처 종료", "Outbox");
    }

    /// 미발행 레코드 한 묶음 발행
    pub async fn dispatch_pending(&self, now: DateTime<Utc>) -> Result<DispatchReport, StoreError> {
        let entries = self.outbox.pending(now, self.config.batch_size).await?;
        let mut report = DispatchReport::default();
        let mut blocked = HashSet::new();

        for entry in entries {
            if blocked.contains(&entry.aggregate_id) {
                report.held_back += 1;
                continue;
            }

            let envelope = entry.to_envelope();
            let sent = match timeout(self.config.publish_timeout, self.bus.publish(&envelope)).await
            {
                Ok(result) => result,
                Err(_) => Err(PublishError::Timeout(entry.topic.clone())),
            };

            match sent {
                Ok(()) => {
                    self.outbox.mark_dispatched(entry.id, Utc::now()).await?;
                    report.published += 1;
                }
                Err(e) => {
                    let attempts = entry.attempts + 1;
                    let delay = retry_backoff(attempts, self.config.interval, self.config.max_backoff);
                    warn!(
                        "{:<12} --> 발행 실패: id={}, topic={}, attempts={}, 다음 시도까지 {:?}: {}",
                        "Outbox", entry.id, entry.topic, attempts, delay, e
                    );
                    self.outbox
                        .record_failure(entry.id, after(now, delay), &e.to_string())
                        .await?;
                    blocked.insert(entry.aggregate_id);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now)
}
// endregion: --- Outbox Dispatcher
