// region:    --- Imports
use auction_marketplace::auction::commands::AuctionService;
use auction_marketplace::auction::events::ALL_TOPICS;
use auction_marketplace::bidding::commands::{BiddingConfig, BiddingService};
use auction_marketplace::config::AppConfig;
use auction_marketplace::database::{DatabaseManager, PgSearchIndex, PgStore};
use auction_marketplace::handlers::{self, AppState};
use auction_marketplace::message_broker::KafkaManager;
use auction_marketplace::outbox::dispatcher::{DispatcherConfig, OutboxDispatcher};
use auction_marketplace::read_model::notification::{NotificationHub, NotificationRelay};
use auction_marketplace::read_model::search::{SearchIndex, SearchIndexer};
use auction_marketplace::read_model::{run_kafka_consumer, EventHandler};
use auction_marketplace::scheduler::{AuctionScheduler, FinalizerConfig};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    // DatabaseManager 생성
    let db_manager = Arc::new(
        DatabaseManager::connect(&config.database_url, config.database_max_connections).await?,
    );

    // 데이터베이스 초기화
    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");

    // Kafka 매니저 생성 및 토픽 생성
    let kafka_manager = KafkaManager::new(&config.kafka_brokers, config.publish_timeout)?;
    if let Err(e) = kafka_manager.create_topics(&ALL_TOPICS, 5, 1).await {
        error!("{:<12} --> Kafka 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> Kafka 초기화 성공", "Main");

    let store = Arc::new(
        PgStore::new(Arc::clone(&db_manager)).with_lock_timeout(config.lock_timeout),
    );
    let search_index: Arc<dyn SearchIndex> = Arc::new(PgSearchIndex::new(Arc::clone(&db_manager)));
    let hub = NotificationHub::default();

    let shutdown = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // 아웃박스 디스패처
    let dispatcher = OutboxDispatcher::new(
        store.clone(),
        kafka_manager.get_producer(),
        DispatcherConfig {
            interval: config.outbox_interval,
            batch_size: config.outbox_batch_size,
            publish_timeout: config.publish_timeout,
            max_backoff: config.outbox_max_backoff,
        },
    );
    tasks.push(tokio::spawn(dispatcher.run(shutdown.child_token())));

    // 경매 종료 스케줄러
    let scheduler = AuctionScheduler::new(
        store.clone(),
        store.clone(),
        store.clone(),
        FinalizerConfig {
            interval: config.finalize_interval,
            grace_period: config.finalize_grace,
            batch_size: config.finalize_batch_size,
            lock_timeout: config.lock_timeout,
        },
    );
    tasks.push(tokio::spawn(scheduler.run(shutdown.child_token())));

    // 읽기 모델 컨슈머 (컨슈머 그룹별)
    let consumers: [Arc<dyn EventHandler>; 2] = [
        Arc::new(SearchIndexer::new(Arc::clone(&search_index))),
        Arc::new(NotificationRelay::new(hub.clone())),
    ];
    for handler in consumers {
        let group_id = format!("{}-{}", config.kafka_group_prefix, handler.name());
        let consumer = kafka_manager.consumer(&group_id)?;
        let token = shutdown.child_token();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = run_kafka_consumer(handler, consumer, token).await {
                error!("{:<12} --> 컨슈머 종료 오류: {:?}", "Main", e);
            }
        }));
    }

    let state = AppState {
        auctions: Arc::new(AuctionService::new(store.clone(), store.clone())),
        bidding: Arc::new(BiddingService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            BiddingConfig {
                lock_timeout: config.lock_timeout,
                ..BiddingConfig::default()
            },
        )),
        search: search_index,
        hub,
    };

    let listener = TcpListener::bind(config.http_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, handlers::router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("{:<12} --> Server error: {}", "Main", err);
    }

    // 백그라운드 작업 정리
    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            error!("{:<12} --> 작업 종료 오류: {:?}", "Main", e);
        }
    }
    info!("{:<12} --> 종료 완료", "Main");

    Ok(())
}

/// Ctrl-C 또는 SIGTERM 대기
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("{:<12} --> Ctrl-C 핸들러 설치 실패: {:?}", "Main", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("{:<12} --> SIGTERM 핸들러 설치 실패: {:?}", "Main", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("{:<12} --> 종료 신호 수신", "Main");
}
// endregion: --- Main
