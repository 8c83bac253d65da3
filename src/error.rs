/// 서비스 공통 에러 정의
/// 1. 저장소 에러
/// 2. 메시지 발행 에러
/// 3. 입찰 에러
/// 4. 경매 커맨드 에러
/// 5. 컨슈머 에러
// region:    --- Imports
use thiserror::Error;
use uuid::Uuid;

// endregion: --- Imports

// region:    --- Store Error
/// 1. 저장소 에러
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("데이터베이스 오류: {0}")]
    Database(#[from] sqlx::Error),

    #[error("직렬화 오류: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("대상을 찾을 수 없습니다: {0}")]
    NotFound(Uuid),

    /// 낙관적 재검증 또는 락 재확인 실패
    #[error("버전 충돌: {0}")]
    Conflict(String),

    #[error("저장된 값을 해석할 수 없습니다: {0}")]
    Corrupt(String),

    /// 종료 처리가 시작된 경매에는 유효 입찰을 더할 수 없다
    #[error("종료 처리 중인 경매입니다: {0}")]
    AuctionClosed(Uuid),

    /// 경매별 락 대기 시간 초과
    #[error("락 대기 시간 초과: {0}")]
    LockTimeout(Uuid),
}
// endregion: --- Store Error

// region:    --- Publish Error
/// 2. 메시지 발행 에러 (항상 재시도 대상)
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("전송 실패(topic={topic}): {reason}")]
    Transport { topic: String, reason: String },

    #[error("전송 시간 초과(topic={0})")]
    Timeout(String),

    #[error("직렬화 오류: {0}")]
    Serialization(#[from] serde_json::Error),
}
// endregion: --- Publish Error

// region:    --- Bid Error
/// 3. 입찰 에러
#[derive(Debug, Error)]
pub enum BidError {
    #[error("자신의 경매에는 입찰할 수 없습니다.")]
    SelfBid,

    #[error("경매를 찾을 수 없습니다: {0}")]
    AuctionNotFound(Uuid),

    #[error("입찰 금액은 0보다 커야 합니다: {0}")]
    InvalidAmount(i64),

    /// 같은 경매에 대한 입찰이 처리 중 (락 획득 시간 초과)
    #[error("다른 입찰을 처리 중입니다. 잠시 후 다시 시도하세요.")]
    Busy,

    #[error("일시적인 저장소 오류: {0}")]
    Unavailable(#[from] StoreError),
}

impl BidError {
    /// 재시도로 해결될 수 있는 에러인지 여부
    pub fn is_retryable(&self) -> bool {
        matches!(self, BidError::Busy | BidError::Unavailable(_))
    }

    /// 응답용 에러 코드
    pub fn code(&self) -> &'static str {
        match self {
            BidError::SelfBid => "SELF_BID",
            BidError::AuctionNotFound(_) => "AUCTION_NOT_FOUND",
            BidError::InvalidAmount(_) => "INVALID_AMOUNT",
            BidError::Busy => "BUSY",
            BidError::Unavailable(_) => "UNAVAILABLE",
        }
    }
}
// endregion: --- Bid Error

// region:    --- Auction Error
/// 4. 경매 커맨드 에러
#[derive(Debug, Error)]
pub enum AuctionError {
    #[error("경매를 찾을 수 없습니다: {0}")]
    NotFound(Uuid),

    #[error("판매자만 경매를 수정할 수 있습니다.")]
    NotSeller,

    #[error("경매가 이미 종료되었습니다.")]
    AuctionEnded,

    #[error("잘못된 요청입니다: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuctionError {
    /// 응답용 에러 코드
    pub fn code(&self) -> &'static str {
        match self {
            AuctionError::NotFound(_) => "AUCTION_NOT_FOUND",
            AuctionError::NotSeller => "NOT_SELLER",
            AuctionError::AuctionEnded => "ALREADY_ENDED",
            AuctionError::Invalid(_) => "INVALID_REQUEST",
            AuctionError::Store(_) => "UNAVAILABLE",
        }
    }
}
// endregion: --- Auction Error

// region:    --- Consumer Error
/// 5. 컨슈머 에러
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("프로젝션 저장 실패: {0}")]
    Store(#[from] StoreError),

    #[error("이벤트 직렬화 오류: {0}")]
    Serialization(#[from] serde_json::Error),
}
// endregion: --- Consumer Error
