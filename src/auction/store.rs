use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::model::{Auction, AuctionSummary};
use crate::error::StoreError;

/// 경매 저장소 트레이트 (경매 레코드의 단일 소유자)
#[async_trait]
pub trait AuctionStore: Send + Sync {
    async fn get_auction(&self, id: Uuid) -> Result<Option<Auction>, StoreError>;

    /// 종료 시각이 지났고 아직 종료 처리되지 않은 경매 id 목록
    /// stale_before 이전에 Finalizing 으로 바뀐 채 멈춘 경매도 포함한다.
    async fn auctions_due(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError>;

    /// Open(또는 오래된 Finalizing) -> Finalizing 전이, finalizing_since = now
    /// 다른 인스턴스가 이미 잡고 있으면 None
    async fn try_begin_finalizing(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Auction>, StoreError>;
}

/// 입찰 서비스가 사용하는 경매 조회 인터페이스
#[async_trait]
pub trait AuctionDirectory: Send + Sync {
    async fn auction_summary(&self, id: Uuid) -> Result<Option<AuctionSummary>, StoreError>;
}
