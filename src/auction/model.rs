use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::StoreError;

// region:    --- Status
/// 경매 결과 상태
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum AuctionStatus {
    Live,
    /// 낙찰
    Finished,
    /// 유찰 (입찰 없음 또는 최저가 미달)
    ReserveNotMet,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Live => "Live",
            AuctionStatus::Finished => "Finished",
            AuctionStatus::ReserveNotMet => "ReserveNotMet",
        }
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuctionStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Live" => Ok(AuctionStatus::Live),
            "Finished" => Ok(AuctionStatus::Finished),
            "ReserveNotMet" => Ok(AuctionStatus::ReserveNotMet),
            other => Err(StoreError::Corrupt(format!("auction status {other}"))),
        }
    }
}

/// 종료 처리 상태: Open -> Finalizing -> Finalized
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum FinalizationState {
    Open,
    Finalizing,
    Finalized,
}

impl FinalizationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalizationState::Open => "OPEN",
            FinalizationState::Finalizing => "FINALIZING",
            FinalizationState::Finalized => "FINALIZED",
        }
    }
}

impl FromStr for FinalizationState {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(FinalizationState::Open),
            "FINALIZING" => Ok(FinalizationState::Finalizing),
            "FINALIZED" => Ok(FinalizationState::Finalized),
            other => Err(StoreError::Corrupt(format!("finalization state {other}"))),
        }
    }
}
// endregion: --- Status

// region:    --- Auction
/// 경매 대상 차량 정보
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Item {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: i32,
    pub image_url: String,
}

/// 경매 모델 (판매자 소유, 종료 관련 필드는 종료 루프만 수정)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Auction {
    pub id: Uuid,
    pub seller: String,
    pub winner: Option<String>,
    /// 0 이면 최저가 없음
    pub reserve_price: i64,
    pub sold_amount: Option<i64>,
    pub current_high_bid: Option<i64>,
    pub auction_end: DateTime<Utc>,
    pub status: AuctionStatus,
    pub finalization: FinalizationState,
    pub finalizing_since: Option<DateTime<Utc>>,
    pub item: Item,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Auction {
    pub fn has_reserve_price(&self) -> bool {
        self.reserve_price > 0
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.auction_end < now
    }

    /// 종료 처리가 아직 시작되지 않았는지
    pub fn is_open(&self) -> bool {
        self.finalization == FinalizationState::Open
    }

    pub fn summary(&self) -> AuctionSummary {
        AuctionSummary {
            auction_id: self.id,
            seller: self.seller.clone(),
            reserve_price: self.reserve_price,
            auction_end: self.auction_end,
        }
    }
}

/// 입찰 판정에 필요한 경매 요약 정보
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AuctionSummary {
    pub auction_id: Uuid,
    pub seller: String,
    pub reserve_price: i64,
    pub auction_end: DateTime<Utc>,
}
// endregion: --- Auction
