// region:    --- Auctions
/// 경매 컬럼 목록
const AUCTION_COLUMNS: &str = "id, seller, winner, reserve_price, sold_amount, current_high_bid, auction_end, status, finalization, finalizing_since, make, model, year, color, mileage, image_url, created_at, updated_at";

/// 경매 생성
pub const INSERT_AUCTION: &str = r#"
    INSERT INTO auctions (id, seller, winner, reserve_price, sold_amount, current_high_bid,
        auction_end, status, finalization, finalizing_since, make, model, year, color,
        mileage, image_url, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
"#;

/// 경매 조회
pub fn select_auction() -> String {
    format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE id = $1")
}

/// 입찰 판정용 경매 요약 조회
pub const SELECT_AUCTION_SUMMARY: &str =
    "SELECT id, seller, reserve_price, auction_end FROM auctions WHERE id = $1";

/// 경매 존재 여부
pub const AUCTION_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM auctions WHERE id = $1)";

/// 차량 정보 수정 (Open 상태에서만)
pub const UPDATE_AUCTION_ITEM: &str = r#"
    UPDATE auctions
    SET make = $2, model = $3, year = $4, color = $5, mileage = $6, updated_at = $7
    WHERE id = $1 AND finalization = 'OPEN'
"#;

/// 경매 삭제 (Open 상태에서만)
pub const DELETE_AUCTION: &str = "DELETE FROM auctions WHERE id = $1 AND finalization = 'OPEN'";

/// 종료 대상 경매 조회
pub const SELECT_AUCTIONS_DUE: &str = r#"
    SELECT id FROM auctions
    WHERE auction_end < $1
      AND (finalization = 'OPEN'
           OR (finalization = 'FINALIZING' AND finalizing_since < $2))
    ORDER BY auction_end
    LIMIT $3
"#;

/// 종료 처리 선점 (compare-and-set)
pub fn claim_auction() -> String {
    format!(
        r#"
    UPDATE auctions
    SET finalization = 'FINALIZING', finalizing_since = $2
    WHERE id = $1
      AND auction_end < $2
      AND (finalization = 'OPEN'
           OR (finalization = 'FINALIZING' AND finalizing_since < $3))
    RETURNING {AUCTION_COLUMNS}
"#
    )
}

/// 종료 결과 반영 (선점 시각이 그대로일 때만)
pub const FINALIZE_AUCTION: &str = r#"
    UPDATE auctions
    SET finalization = 'FINALIZED',
        finalizing_since = NULL,
        status = $3,
        winner = $4,
        sold_amount = $5,
        current_high_bid = COALESCE($6, current_high_bid)
    WHERE id = $1 AND finalization = 'FINALIZING' AND finalizing_since = $2
"#;

/// 최고 입찰가 캐시 갱신 (더 큰 금액일 때만)
pub const RAISE_CURRENT_HIGH_BID: &str = r#"
    UPDATE auctions
    SET current_high_bid = $2
    WHERE id = $1 AND (current_high_bid IS NULL OR current_high_bid < $2)
"#;
// endregion: --- Auctions

// region:    --- Bids
/// 트랜잭션 안에서만 유효한 락 대기 시간 설정 (SET LOCAL 과 같음)
pub const SET_LOCAL_LOCK_TIMEOUT: &str = "SELECT set_config('lock_timeout', $1, true)";

/// 입찰 직렬화용 경매 행 락
pub const LOCK_AUCTION_FOR_BID: &str =
    "SELECT finalization FROM auctions WHERE id = $1 FOR UPDATE";

/// 최고 입찰 조회
pub const SELECT_HIGHEST_BID: &str = r#"
    SELECT id, auction_id, bidder, amount, bid_time, status
    FROM bids
    WHERE auction_id = $1 AND status IN ('Accepted', 'AcceptedBelowReserve')
    ORDER BY amount DESC, bid_time ASC
    LIMIT 1
"#;

/// 입찰 이력 조회
pub const SELECT_BIDS_FOR_AUCTION: &str = r#"
    SELECT id, auction_id, bidder, amount, bid_time, status
    FROM bids
    WHERE auction_id = $1
    ORDER BY bid_time DESC
"#;

/// 입찰 추가
pub const INSERT_BID: &str = r#"
    INSERT INTO bids (id, auction_id, bidder, amount, bid_time, status)
    VALUES ($1, $2, $3, $4, $5, $6)
"#;
// endregion: --- Bids

// region:    --- Outbox
/// 아웃박스 레코드 추가
pub const INSERT_OUTBOX: &str = r#"
    INSERT INTO outbox (id, aggregate_id, topic, payload, created_at, attempts, next_attempt_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
"#;

/// 발행 대상 레코드 조회 (생성 순)
pub const SELECT_PENDING_OUTBOX: &str = r#"
    SELECT id, aggregate_id, topic, payload, created_at, attempts, next_attempt_at,
        last_error, dispatched_at
    FROM outbox
    WHERE dispatched_at IS NULL AND next_attempt_at <= $1
    ORDER BY seq
    LIMIT $2
"#;

/// 발행 완료 표시
pub const MARK_OUTBOX_DISPATCHED: &str = "UPDATE outbox SET dispatched_at = $2 WHERE id = $1";

/// 발행 실패 기록
pub const RECORD_OUTBOX_FAILURE: &str = r#"
    UPDATE outbox
    SET attempts = attempts + 1, next_attempt_at = $2, last_error = $3
    WHERE id = $1
"#;
// endregion: --- Outbox

// region:    --- Search Items
/// 검색 프로젝션 컬럼 목록
pub const SEARCH_ITEM_COLUMNS: &str = "id, seller, winner, reserve_price, sold_amount, current_high_bid, auction_end, status, make, model, year, color, mileage, image_url, created_at, updated_at, deleted_at";

/// 검색 프로젝션 조회
pub fn select_search_item() -> String {
    format!("SELECT {SEARCH_ITEM_COLUMNS} FROM search_items WHERE id = $1")
}

/// 검색 프로젝션 저장
pub const UPSERT_SEARCH_ITEM: &str = r#"
    INSERT INTO search_items (id, seller, winner, reserve_price, sold_amount, current_high_bid,
        auction_end, status, make, model, year, color, mileage, image_url, created_at,
        updated_at, deleted_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
    ON CONFLICT (id) DO UPDATE SET
        seller = EXCLUDED.seller,
        winner = EXCLUDED.winner,
        reserve_price = EXCLUDED.reserve_price,
        sold_amount = EXCLUDED.sold_amount,
        current_high_bid = EXCLUDED.current_high_bid,
        auction_end = EXCLUDED.auction_end,
        status = EXCLUDED.status,
        make = EXCLUDED.make,
        model = EXCLUDED.model,
        year = EXCLUDED.year,
        color = EXCLUDED.color,
        mileage = EXCLUDED.mileage,
        image_url = EXCLUDED.image_url,
        created_at = EXCLUDED.created_at,
        updated_at = EXCLUDED.updated_at,
        deleted_at = EXCLUDED.deleted_at
"#;
// endregion: --- Search Items
