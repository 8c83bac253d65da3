/// 입찰 판정
/// (경매 요약, 현재 최고 입찰, 새 입찰) -> 입찰 상태. 상태를 갖지 않는 순수 함수.
use super::model::{Bid, BidStatus};
use crate::auction::model::AuctionSummary;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// 입찰 상태 판정
///
/// - 종료 시각이 지났으면 금액과 무관하게 `Finished`
/// - 최고 입찰 이하(같은 금액 포함)면 `TooLow`
/// - 그 외에는 최저가 초과 여부에 따라 `Accepted` / `AcceptedBelowReserve`
pub fn bid_status(
    summary: &AuctionSummary,
    highest_amount: Option<i64>,
    amount: i64,
    now: DateTime<Utc>,
) -> BidStatus {
    if summary.auction_end < now {
        return BidStatus::Finished;
    }

    match highest_amount {
        Some(highest) if amount <= highest => BidStatus::TooLow,
        _ if amount > summary.reserve_price => BidStatus::Accepted,
        _ => BidStatus::AcceptedBelowReserve,
    }
}

/// 새 입찰 생성
pub fn evaluate(
    summary: &AuctionSummary,
    highest: Option<&Bid>,
    bidder: &str,
    amount: i64,
    now: DateTime<Utc>,
) -> Bid {
    Bid {
        id: Uuid::new_v4(),
        auction_id: summary.auction_id,
        bidder: bidder.to_string(),
        amount,
        bid_time: now,
        status: bid_status(summary, highest.map(|b| b.amount), amount, now),
    }
}
