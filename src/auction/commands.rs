/// 경매 관련 커맨드 처리 (판매자)
/// 1. 경매 생성
/// 2. 경매 수정
/// 3. 경매 삭제
// region:    --- Imports
use super::events::{AuctionCreated, AuctionDeleted, AuctionEvent, AuctionUpdated};
use super::model::{Auction, AuctionStatus, FinalizationState, Item};
use super::store::AuctionStore;
use crate::error::AuctionError;
use crate::outbox::{Mutation, Outbox};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Commands
/// 경매 생성 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateAuctionCommand {
    pub reserve_price: i64,
    pub auction_end: DateTime<Utc>,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: i32,
    pub image_url: String,
}

/// 경매 수정 명령 (없는 필드는 기존 값 유지)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct UpdateAuctionCommand {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub color: Option<String>,
    pub mileage: Option<i32>,
}

impl UpdateAuctionCommand {
    /// 수정 규칙 적용
    /// 주행거리가 1 이하이거나 연식이 기존보다 낮으면 기존 값을 유지한다.
    pub fn apply_to(&self, item: &mut Item) {
        if let Some(make) = &self.make {
            item.make = make.clone();
        }
        if let Some(model) = &self.model {
            item.model = model.clone();
        }
        if let Some(color) = &self.color {
            item.color = color.clone();
        }
        if let Some(mileage) = self.mileage.filter(|m| *m > 1) {
            item.mileage = mileage;
        }
        if let Some(year) = self.year.filter(|y| *y >= item.year) {
            item.year = year;
        }
    }
}

pub struct AuctionService {
    auctions: Arc<dyn AuctionStore>,
    outbox: Arc<dyn Outbox>,
}

impl AuctionService {
    pub fn new(auctions: Arc<dyn AuctionStore>, outbox: Arc<dyn Outbox>) -> Self {
        Self { auctions, outbox }
    }

    /// 1. 경매 생성
    pub async fn create_auction(
        &self,
        seller: &str,
        cmd: CreateAuctionCommand,
    ) -> Result<Auction, AuctionError> {
        info!("{:<12} --> 경매 생성 요청: seller={}", "Command", seller);
        let now = Utc::now();

        if cmd.reserve_price < 0 {
            return Err(AuctionError::Invalid("reserve_price 는 0 이상이어야 합니다.".into()));
        }
        if cmd.auction_end <= now {
            return Err(AuctionError::Invalid("auction_end 는 현재 이후여야 합니다.".into()));
        }

        let auction = Auction {
            id: Uuid::new_v4(),
            seller: seller.to_string(),
            winner: None,
            reserve_price: cmd.reserve_price,
            sold_amount: None,
            current_high_bid: None,
            auction_end: cmd.auction_end,
            status: AuctionStatus::Live,
            finalization: FinalizationState::Open,
            finalizing_since: None,
            item: Item {
                make: cmd.make,
                model: cmd.model,
                year: cmd.year,
                color: cmd.color,
                mileage: cmd.mileage,
                image_url: cmd.image_url,
            },
            created_at: now,
            updated_at: now,
        };

        let event = AuctionEvent::AuctionCreated(AuctionCreated::from(&auction));
        self.outbox
            .commit(Mutation::CreateAuction(auction.clone()), event)
            .await?;

        info!("{:<12} --> 경매 생성 완료: id={}", "Command", auction.id);
        Ok(auction)
    }

    /// 2. 경매 수정 (판매자만, 종료 전만)
    pub async fn update_auction(
        &self,
        id: Uuid,
        user: &str,
        cmd: UpdateAuctionCommand,
    ) -> Result<Auction, AuctionError> {
        info!("{:<12} --> 경매 수정 요청: id={}", "Command", id);
        let now = Utc::now();
        let mut auction = self.owned_open_auction(id, user, now).await?;

        cmd.apply_to(&mut auction.item);
        auction.updated_at = now;

        let event = AuctionEvent::AuctionUpdated(AuctionUpdated::from(&auction));
        self.outbox
            .commit(Mutation::UpdateAuction(auction.clone()), event)
            .await?;

        Ok(auction)
    }

    /// 3. 경매 삭제 (판매자만, 종료 전만)
    pub async fn delete_auction(&self, id: Uuid, user: &str) -> Result<(), AuctionError> {
        info!("{:<12} --> 경매 삭제 요청: id={}", "Command", id);
        let now = Utc::now();
        self.owned_open_auction(id, user, now).await?;

        let event = AuctionEvent::AuctionDeleted(AuctionDeleted { id, deleted_at: now });
        self.outbox
            .commit(Mutation::DeleteAuction { id }, event)
            .await?;

        Ok(())
    }

    async fn owned_open_auction(
        &self,
        id: Uuid,
        user: &str,
        now: DateTime<Utc>,
    ) -> Result<Auction, AuctionError> {
        let auction = self
            .auctions
            .get_auction(id)
            .await?
            .ok_or(AuctionError::NotFound(id))?;

        if auction.seller != user {
            return Err(AuctionError::NotSeller);
        }
        if auction.has_ended(now) || auction.finalization != FinalizationState::Open {
            return Err(AuctionError::AuctionEnded);
        }

        Ok(auction)
    }
}
// endregion: --- Commands
