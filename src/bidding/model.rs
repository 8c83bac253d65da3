use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::StoreError;

// 입찰 상태
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum BidStatus {
    Accepted,
    AcceptedBelowReserve,
    TooLow,
    Finished,
}

impl BidStatus {
    /// 최고 입찰가를 갱신하는 상태인지 여부
    pub fn is_accepted(&self) -> bool {
        matches!(self, BidStatus::Accepted | BidStatus::AcceptedBelowReserve)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BidStatus::Accepted => "Accepted",
            BidStatus::AcceptedBelowReserve => "AcceptedBelowReserve",
            BidStatus::TooLow => "TooLow",
            BidStatus::Finished => "Finished",
        }
    }
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BidStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Accepted" => Ok(BidStatus::Accepted),
            "AcceptedBelowReserve" => Ok(BidStatus::AcceptedBelowReserve),
            "TooLow" => Ok(BidStatus::TooLow),
            "Finished" => Ok(BidStatus::Finished),
            other => Err(StoreError::Corrupt(format!("bid status {other}"))),
        }
    }
}

// 입찰 모델 (저장 후 변경되지 않음)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Bid {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub bidder: String,
    pub amount: i64,
    pub bid_time: DateTime<Utc>,
    pub status: BidStatus,
}
