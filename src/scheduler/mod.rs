/// 경매 종료 처리 스케줄러
/// 종료 시각이 지난 경매를 주기적으로 찾아 낙찰 여부를 계산하고,
/// 상태 전환과 AuctionFinished 이벤트를 아웃박스로 함께 커밋한다.
/// Open -> Finalizing -> Finalized
// region:    --- Imports
use crate::auction::events::{AuctionEvent, AuctionFinished};
use crate::auction::model::Auction;
use crate::auction::store::AuctionStore;
use crate::bidding::model::{Bid, BidStatus};
use crate::bidding::store::BidStore;
use crate::error::StoreError;
use crate::outbox::{Mutation, Outbox};
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// endregion: --- Imports

// region:    --- Outcome
/// 낙찰 결과 계산
/// 같은 (경매, 최고 입찰) 에 대해서는 항상 같은 결과를 낸다.
pub fn compute_outcome(auction: &Auction, highest: Option<&Bid>) -> AuctionFinished {
    let item_sold = highest.is_some_and(|bid| bid.status == BidStatus::Accepted);

    AuctionFinished {
        item_sold,
        auction_id: auction.id,
        winner: highest
            .filter(|_| item_sold)
            .map(|bid| bid.bidder.clone()),
        seller: auction.seller.clone(),
        amount: highest.map(|bid| bid.amount),
        finished_at: auction.auction_end,
    }
}
// endregion: --- Outcome

// region:    --- Finalizer Config
#[derive(Debug, Clone)]
pub struct FinalizerConfig {
    pub interval: Duration,
    /// Finalizing 상태로 이 시간 이상 멈춰 있으면 다시 처리
    pub grace_period: Duration,
    pub batch_size: i64,
    pub lock_timeout: Duration,
}

impl Default for FinalizerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            grace_period: Duration::from_secs(30),
            batch_size: 50,
            lock_timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeReport {
    pub finalized: usize,
    pub skipped: usize,
}
// endregion: --- Finalizer Config

// region:    --- Auction Scheduler
/// 경매 종료 스케줄러
pub struct AuctionScheduler {
    auctions: Arc<dyn AuctionStore>,
    bids: Arc<dyn BidStore>,
    outbox: Arc<dyn Outbox>,
    config: FinalizerConfig,
}

impl AuctionScheduler {
    pub fn new(
        auctions: Arc<dyn AuctionStore>,
        bids: Arc<dyn BidStore>,
        outbox: Arc<dyn Outbox>,
        config: FinalizerConfig,
    ) -> Self {
        Self {
            auctions,
            bids,
            outbox,
            config,
        }
    }

    /// 스케줄러 시작
    /// 취소되어도 진행 중인 사이클은 끝까지 처리한 뒤 멈춘다.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            "{:<12} --> 경매 종료 스케줄러 시작: interval={:?}",
            "Scheduler", self.config.interval
        );
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.run_cycle(Utc::now()).await {
                        Ok(report) if report.finalized == 0 && report.skipped == 0 => {
                            debug!("{:<12} --> 종료 대상 경매 없음", "Scheduler");
                        }
                        Ok(report) => info!(
                            "{:<12} --> 경매 종료 {}건, 건너뜀 {}건",
                            "Scheduler", report.finalized, report.skipped
                        ),
                        Err(e) => error!(
                            "{:<12} --> 경매 종료 처리 중 오류 발생: {:?}",
                            "Scheduler", e
                        ),
                    }
                }
            }
        }

        info!("{:<12} --> 경매 종료 스케줄러 종료", "Scheduler");
    }

    /// 종료 대상 경매 한 묶음 처리
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<FinalizeReport, StoreError> {
        // 저장소 정밀도(마이크로초)에 맞춰 락 소유 시각을 비교할 수 있게 한다.
        let now = now.trunc_subsecs(6);
        let stale_before = chrono::Duration::from_std(self.config.grace_period)
            .ok()
            .and_then(|grace| now.checked_sub_signed(grace))
            .unwrap_or(now);

        let due = self
            .auctions
            .auctions_due(now, stale_before, self.config.batch_size)
            .await?;

        let mut report = FinalizeReport::default();
        for auction_id in due {
            match self.finalize_auction(auction_id, now, stale_before).await {
                Ok(true) => report.finalized += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    error!(
                        "{:<12} --> 경매 종료 실패, 다음 주기에 재시도: id={}, {:?}",
                        "Scheduler", auction_id, e
                    );
                    report.skipped += 1;
                }
            }
        }

        Ok(report)
    }

    /// 경매 하나 종료 처리. 다른 인스턴스가 처리 중이면 false
    async fn finalize_auction(
        &self,
        auction_id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let claim = timeout(
            self.config.lock_timeout,
            self.auctions
                .try_begin_finalizing(auction_id, now, stale_before),
        )
        .await;

        let auction = match claim {
            Ok(Ok(Some(auction))) => auction,
            Ok(Ok(None)) => {
                debug!(
                    "{:<12} --> 다른 인스턴스가 처리 중: id={}",
                    "Scheduler", auction_id
                );
                return Ok(false);
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!(
                    "{:<12} --> 락 획득 시간 초과: id={}",
                    "Scheduler", auction_id
                );
                return Ok(false);
            }
        };

        let highest = self.bids.highest_bid(auction_id).await?;
        let outcome = compute_outcome(&auction, highest.as_ref());

        let mutation = Mutation::FinalizeAuction {
            claimed_at: now,
            outcome: outcome.clone(),
        };

        match self
            .outbox
            .commit(mutation, AuctionEvent::AuctionFinished(outcome.clone()))
            .await
        {
            Ok(_) => {
                info!(
                    "{:<12} --> 경매 종료: id={}, sold={}, amount={:?}",
                    "Scheduler", auction_id, outcome.item_sold, outcome.amount
                );
                Ok(true)
            }
            Err(StoreError::Conflict(reason)) => {
                warn!(
                    "{:<12} --> 락을 잃어 종료 커밋 취소: id={}, {}",
                    "Scheduler", auction_id, reason
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
// endregion: --- Auction Scheduler
