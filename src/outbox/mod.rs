/// 트랜잭셔널 아웃박스
/// 저장소 변경과 이벤트 레코드를 하나의 트랜잭션으로 기록하고,
/// 디스패처가 주기적으로 미발행 레코드를 버스로 발행한다.
// region:    --- Imports
use crate::auction::events::{AuctionEvent, AuctionFinished, EventEnvelope};
use crate::auction::model::Auction;
use crate::bidding::model::Bid;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub mod dispatcher;

// endregion: --- Imports

// region:    --- Mutation
/// 아웃박스 레코드와 함께 원자적으로 적용되는 저장소 변경
#[derive(Debug, Clone)]
pub enum Mutation {
    CreateAuction(Auction),
    /// 차량 정보와 updated_at 만 반영 (Open 상태에서만)
    UpdateAuction(Auction),
    DeleteAuction { id: Uuid },
    /// 최고 입찰이 expected_highest 그대로일 때만 추가 (낙관적 재검증)
    AppendBid {
        bid: Bid,
        expected_highest: Option<Uuid>,
    },
    /// Finalizing 상태이고 claimed_at 이 그대로일 때만 종료 처리
    FinalizeAuction {
        claimed_at: DateTime<Utc>,
        outcome: AuctionFinished,
    },
}
// endregion: --- Mutation

// region:    --- Outbox Entry
/// 아웃박스 레코드
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub topic: String,
    pub event: AuctionEvent,
    pub created_at: DateTime<Utc>,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// 새 레코드 생성 (즉시 발행 대상)
    pub fn new(event: AuctionEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: event.auction_id(),
            topic: event.topic().to_string(),
            event,
            created_at: now,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
            dispatched_at: None,
        }
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched_at.is_some()
    }

    pub fn to_envelope(&self) -> EventEnvelope {
        EventEnvelope {
            id: self.id,
            aggregate_id: self.aggregate_id,
            timestamp: self.created_at,
            event: self.event.clone(),
        }
    }
}
// endregion: --- Outbox Entry

// region:    --- Outbox Trait
/// 아웃박스 트레이트
#[async_trait]
pub trait Outbox: Send + Sync {
    /// 변경과 이벤트 레코드를 함께 커밋. 실패하면 둘 다 남지 않는다.
    async fn commit(
        &self,
        mutation: Mutation,
        event: AuctionEvent,
    ) -> Result<OutboxEntry, StoreError>;

    /// 발행 시각이 된 미발행 레코드 (생성 순)
    async fn pending(&self, now: DateTime<Utc>, limit: i64)
        -> Result<Vec<OutboxEntry>, StoreError>;

    async fn mark_dispatched(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// 발행 실패 기록: attempts 증가, 다음 시도 시각 갱신
    async fn record_failure(
        &self,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError>;
}
// endregion: --- Outbox Trait

// region:    --- Backoff
/// 실패 횟수에 따른 재시도 지연 (base * 2^(attempts-1), 최대 max)
pub fn retry_backoff(attempts: i32, base: Duration, max: Duration) -> Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 16) as u32;
    base.checked_mul(1u32 << exponent)
        .map_or(max, |delay| delay.min(max))
}
// endregion: --- Backoff
