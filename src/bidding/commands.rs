/// 입찰 관련 커맨드 처리
/// 1. 입찰
// region:    --- Imports
use super::evaluator::evaluate;
use super::locks::AuctionLocks;
use super::model::{Bid, BidStatus};
use super::store::BidStore;
use crate::auction::events::{AuctionEvent, BidPlaced};
use crate::auction::store::AuctionDirectory;
use crate::error::{BidError, StoreError};
use crate::outbox::{Mutation, Outbox};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Commands
/// 입찰 명령 (입찰자는 요청 사용자)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaceBidCommand {
    pub auction_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Clone)]
pub struct BiddingConfig {
    /// 경매별 락 대기 시간
    pub lock_timeout: Duration,
    /// 낙관적 재검증 실패 시 최대 재시도 횟수
    pub max_retries: u32,
}

impl Default for BiddingConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(500),
            max_retries: 100,
        }
    }
}

/// 입찰 서비스
pub struct BiddingService {
    directory: Arc<dyn AuctionDirectory>,
    bids: Arc<dyn BidStore>,
    outbox: Arc<dyn Outbox>,
    locks: AuctionLocks,
    config: BiddingConfig,
}

impl BiddingService {
    pub fn new(
        directory: Arc<dyn AuctionDirectory>,
        bids: Arc<dyn BidStore>,
        outbox: Arc<dyn Outbox>,
        config: BiddingConfig,
    ) -> Self {
        Self {
            directory,
            bids,
            outbox,
            locks: AuctionLocks::new(),
            config,
        }
    }

    /// 1. 입찰
    /// 같은 경매의 입찰은 락으로 직렬화하고, 커밋 시점에 최고 입찰이 바뀌었으면 다시 판정한다.
    /// 커밋 전에 종료 처리가 시작됐으면 Finished 로 기록한다.
    pub async fn place_bid(&self, bidder: &str, cmd: PlaceBidCommand) -> Result<Bid, BidError> {
        info!(
            "{:<12} --> 입찰 요청 처리 시작: bidder={}, {:?}",
            "Command", bidder, cmd
        );

        if cmd.amount <= 0 {
            return Err(BidError::InvalidAmount(cmd.amount));
        }

        let summary = self
            .directory
            .auction_summary(cmd.auction_id)
            .await?
            .ok_or(BidError::AuctionNotFound(cmd.auction_id))?;

        if summary.seller == bidder {
            return Err(BidError::SelfBid);
        }

        let _guard = self
            .locks
            .acquire(cmd.auction_id, self.config.lock_timeout)
            .await
            .ok_or(BidError::Busy)?;

        let mut retries = 0;
        let mut closed = false;
        while retries < self.config.max_retries {
            let highest = self.bids.highest_bid(cmd.auction_id).await?;
            let mut bid = evaluate(&summary, highest.as_ref(), bidder, cmd.amount, Utc::now());
            if closed {
                bid.status = BidStatus::Finished;
            }

            let event = AuctionEvent::BidPlaced(BidPlaced::from(&bid));
            let mutation = Mutation::AppendBid {
                bid: bid.clone(),
                expected_highest: highest.map(|b| b.id),
            };

            match self.outbox.commit(mutation, event).await {
                Ok(_) => {
                    info!(
                        "{:<12} --> 입찰 저장 완료: auction={}, amount={}, status={}",
                        "Command", bid.auction_id, bid.amount, bid.status
                    );
                    return Ok(bid);
                }
                Err(StoreError::Conflict(reason)) => {
                    warn!(
                        "{:<12} --> 최고 입찰 변경으로 재판정: {}",
                        "Command", reason
                    );
                    retries += 1;
                }
                Err(StoreError::AuctionClosed(auction_id)) => {
                    warn!(
                        "{:<12} --> 종료 처리가 시작된 경매, Finished 로 기록: {}",
                        "Command", auction_id
                    );
                    closed = true;
                    retries += 1;
                }
                Err(StoreError::LockTimeout(_)) => return Err(BidError::Busy),
                Err(e) => return Err(e.into()),
            }
        }

        Err(BidError::Busy)
    }

    /// 입찰 이력 조회
    pub async fn bids_for_auction(&self, auction_id: Uuid) -> Result<Vec<Bid>, BidError> {
        Ok(self.bids.bids_for_auction(auction_id).await?)
    }
}
// endregion: --- Commands
