// region:    --- Imports
use crate::auction::commands::{AuctionService, CreateAuctionCommand, UpdateAuctionCommand};
use crate::bidding::commands::{BiddingService, PlaceBidCommand};
use crate::error::{AuctionError, BidError, StoreError};
use crate::read_model::notification::{LiveMessage, NotificationHub};
use crate::read_model::search::{SearchIndex, SearchParams};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// endregion: --- Imports

// region:    --- App State
/// 요청 사용자 식별 헤더 (인증은 앞단 게이트웨이가 처리)
pub const USER_HEADER: &str = "x-user";

#[derive(Clone)]
pub struct AppState {
    pub auctions: Arc<AuctionService>,
    pub bidding: Arc<BiddingService>,
    pub search: Arc<dyn SearchIndex>,
    pub hub: NotificationHub,
}

/// 라우터 설정
pub fn router(state: AppState) -> Router {
    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/auctions", post(handle_create_auction))
        .route(
            "/auctions/:id",
            put(handle_update_auction).delete(handle_delete_auction),
        )
        .route("/bids", post(handle_place_bid))
        .route("/bids/:auction_id", get(handle_get_bid_history))
        .route("/search", get(handle_search))
        .route("/notifications", get(handle_notifications))
        .layer(cors)
        .with_state(state)
}
// endregion: --- App State

// region:    --- Error Responses
fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": message,
            "code": code
        })),
    )
        .into_response()
}

impl IntoResponse for BidError {
    fn into_response(self) -> Response {
        let status = match &self {
            BidError::SelfBid | BidError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            BidError::AuctionNotFound(_) => StatusCode::NOT_FOUND,
            BidError::Busy | BidError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        error_response(status, self.code(), self.to_string())
    }
}

impl IntoResponse for AuctionError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuctionError::NotFound(_) | AuctionError::Store(StoreError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            AuctionError::NotSeller => StatusCode::FORBIDDEN,
            AuctionError::AuctionEnded | AuctionError::Invalid(_) => StatusCode::BAD_REQUEST,
            AuctionError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            AuctionError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        error_response(status, self.code(), self.to_string())
    }
}

/// 요청 사용자 확인
fn current_user(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|user| !user.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            error_response(
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                format!("{USER_HEADER} 헤더가 필요합니다."),
            )
        })
}
// endregion: --- Error Responses

// region:    --- Command Handlers

/// 경매 생성
pub async fn handle_create_auction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(cmd): Json<CreateAuctionCommand>,
) -> Response {
    let seller = match current_user(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.auctions.create_auction(&seller, cmd).await {
        Ok(auction) => (StatusCode::CREATED, Json(auction)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 경매 수정
pub async fn handle_update_auction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(cmd): Json<UpdateAuctionCommand>,
) -> Response {
    let user = match current_user(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.auctions.update_auction(id, &user, cmd).await {
        Ok(auction) => Json(auction).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 경매 삭제
pub async fn handle_delete_auction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    let user = match current_user(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.auctions.delete_auction(id, &user).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// 입찰 요청 처리 (입찰자는 요청 사용자)
pub async fn handle_place_bid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(cmd): Json<PlaceBidCommand>,
) -> Response {
    let bidder = match current_user(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.bidding.place_bid(&bidder, cmd).await {
        Ok(bid) => Json(bid).into_response(),
        Err(e) => {
            if e.is_retryable() {
                warn!("{:<12} --> 입찰 일시 실패: {}", "Handler", e);
            }
            e.into_response()
        }
    }
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

/// 입찰 이력 조회
pub async fn handle_get_bid_history(
    State(state): State<AppState>,
    Path(auction_id): Path<Uuid>,
) -> Response {
    info!(
        "{:<12} --> 입찰 이력 조회 id: {}",
        "HandlerQuery", auction_id
    );
    match state.bidding.bids_for_auction(auction_id).await {
        Ok(history) => Json(history).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 경매 검색
pub async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    debug!("{:<12} --> 경매 검색: {:?}", "HandlerQuery", params);
    match state.search.search(&params, Utc::now()).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => {
            error!("{:<12} --> 검색 실패: {:?}", "HandlerQuery", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", e.to_string())
        }
    }
}

// endregion: --- Query Handlers

// region:    --- Notifications

/// 실시간 알림 구독 (websocket)
pub async fn handle_notifications(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let receiver = state.hub.subscribe();
    info!(
        "{:<12} --> 알림 구독 요청: 접속자 {}명",
        "Notify",
        state.hub.receiver_count()
    );
    ws.on_upgrade(move |socket| relay_notifications(socket, receiver))
}

/// 연결이 끊길 때까지 허브 메시지를 전달
async fn relay_notifications(
    mut socket: WebSocket,
    mut receiver: broadcast::Receiver<LiveMessage>,
) {
    info!("{:<12} --> 알림 구독 시작", "Notify");

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Ok(message) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("{:<12} --> 알림 직렬화 실패: {:?}", "Notify", e);
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("{:<12} --> 느린 클라이언트, {}건 건너뜀", "Notify", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!("{:<12} --> 알림 구독 종료", "Notify");
}

// endregion: --- Notifications
