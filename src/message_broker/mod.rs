// region:    --- Imports
use crate::auction::events::EventEnvelope;
use crate::error::{ConsumerError, PublishError};
use crate::outbox::retry_backoff;
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod memory;

pub use memory::InMemoryBus;

// endregion: --- Imports

// region:    --- Event Bus Trait
/// 이벤트 버스 트레이트 (at-least-once 전송)
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError>;
}
// endregion: --- Event Bus Trait

// region:    --- Kafka Producer
#[derive(Clone)]
pub struct KafkaProducer {
    producer: Arc<FutureProducer>,
    send_timeout: Duration,
}

/// KafkaProducer 구현
impl KafkaProducer {
    pub fn new(brokers: &str, send_timeout: Duration) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", send_timeout.as_millis().to_string())
            .set("enable.idempotence", "true")
            .create()?;

        Ok(KafkaProducer {
            producer: Arc::new(producer),
            send_timeout,
        })
    }

    /// 메시지 전송
    pub async fn send_message(&self, topic: &str, key: &str, value: &str) -> Result<(), PublishError> {
        debug!(
            "{:<12} --> Kafka 메시지 전송: topic={}, key={}",
            "Producer", topic, key
        );
        let record = FutureRecord::to(topic).key(key).payload(value);

        self.producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map_err(|(e, _)| PublishError::Transport {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

#[async_trait]
impl EventBus for KafkaProducer {
    /// 같은 경매의 이벤트는 같은 파티션으로 가도록 경매 id 를 키로 사용
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError> {
        let payload = serde_json::to_string(envelope)?;
        self.send_message(
            envelope.topic(),
            &envelope.aggregate_id.to_string(),
            &payload,
        )
        .await
    }
}
// endregion: --- Kafka Producer

// region:    --- Kafka Consumer
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
    backoff: HandlerBackoff,
}

/// KafkaConsumer 구현
impl KafkaConsumer {
    pub fn new(brokers: &str, group_id: &str) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            // 핸들러 처리 후에만 오프셋 저장
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("fetch.max.bytes", "5242880")
            .set("allow.auto.create.topics", "true")
            .create()?;

        Ok(KafkaConsumer {
            consumer: Arc::new(consumer),
            backoff: HandlerBackoff::default(),
        })
    }

    /// 이벤트 소비
    /// 핸들러가 성공한 메시지만 오프셋을 저장한다.
    /// 취소 신호를 받으면 처리 중이던 메시지는 오프셋 없이 남겨 두고 반환한다.
    pub async fn consume_events<F, Fut>(
        &self,
        topics: &[&str],
        handler: F,
        shutdown: CancellationToken,
    ) -> Result<(), KafkaError>
    where
        F: Fn(EventEnvelope) -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<(), ConsumerError>> + Send,
    {
        info!(
            "{:<12} --> Kafka 이벤트 소비 시작: topics={:?}",
            "Consumer", topics
        );
        self.consumer.subscribe(topics)?;

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.consumer.recv() => received,
            };

            let message = match received {
                Ok(message) => message,
                Err(e) => {
                    error!("{:<12} --> 메시지 수신 오류: {:?}", "Consumer", e);
                    continue;
                }
            };

            debug!(
                "{:<12} --> 메시지 수신: topic={}, partition={}, offset={}",
                "Consumer",
                message.topic(),
                message.partition(),
                message.offset()
            );

            let envelope = match message.payload().map(serde_json::from_slice::<EventEnvelope>) {
                Some(Ok(envelope)) => Some(envelope),
                Some(Err(e)) => {
                    error!("{:<12} --> deserialize 오류: {:?}", "Consumer", e);
                    None
                }
                None => {
                    warn!("{:<12} --> 빈 페이로드 수신", "Consumer");
                    None
                }
            };

            if let Some(envelope) = envelope {
                if !handle_until_success(&handler, &envelope, self.backoff, &shutdown).await {
                    break;
                }
            }

            if let Err(e) = self.consumer.store_offset_from_message(&message) {
                warn!("{:<12} --> 오프셋 저장 실패: {:?}", "Consumer", e);
            }
        }

        info!("{:<12} --> Kafka 이벤트 소비 종료", "Consumer");
        Ok(())
    }
}

/// 핸들러 재시도 간격 (base 에서 두 배씩, 최대 max)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for HandlerBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// 핸들러가 성공할 때까지 재시도
/// 성공하면 true, 성공 전에 종료 신호를 받으면 false
pub async fn handle_until_success<F, Fut>(
    handler: &F,
    envelope: &EventEnvelope,
    backoff: HandlerBackoff,
    shutdown: &CancellationToken,
) -> bool
where
    F: Fn(EventEnvelope) -> Fut,
    Fut: std::future::Future<Output = Result<(), ConsumerError>>,
{
    let mut attempts: i32 = 0;
    loop {
        let e = match handler(envelope.clone()).await {
            Ok(()) => return true,
            Err(e) => e,
        };

        attempts = attempts.saturating_add(1);
        let delay = retry_backoff(attempts, backoff.base, backoff.max);
        warn!(
            "{:<12} --> 이벤트 처리 실패, {:?} 후 재시도 ({}회): id={}, {:?}",
            "Consumer", delay, attempts, envelope.id, e
        );

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                error!(
                    "{:<12} --> 종료 신호로 처리 중단, 재시작 후 다시 수신: id={}",
                    "Consumer", envelope.id
                );
                return false;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
// endregion: --- Kafka Consumer

// region:    --- Kafka Manager
pub struct KafkaManager {
    producer: Arc<KafkaProducer>,
    brokers: String,
}

/// KafkaManager 구현
impl KafkaManager {
    pub fn new(brokers: &str, send_timeout: Duration) -> Result<Self, KafkaError> {
        let producer = Arc::new(KafkaProducer::new(brokers, send_timeout)?);

        Ok(KafkaManager {
            producer,
            brokers: brokers.to_string(),
        })
    }

    /// 프로듀서 반환
    pub fn get_producer(&self) -> Arc<KafkaProducer> {
        Arc::clone(&self.producer)
    }

    /// 컨슈머 그룹별 컨슈머 생성
    pub fn consumer(&self, group_id: &str) -> Result<KafkaConsumer, KafkaError> {
        KafkaConsumer::new(&self.brokers, group_id)
    }

    /// 토픽 생성 (이미 있으면 무시)
    pub async fn create_topics(
        &self,
        topic_names: &[&str],
        num_partitions: i32,
        replication_factor: i32,
    ) -> Result<(), KafkaError> {
        info!("{:<12} --> Kafka 토픽 생성 시작: {:?}", "Manager", topic_names);

        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()?;

        let new_topics: Vec<NewTopic> = topic_names
            .iter()
            .map(|name| {
                NewTopic::new(
                    name,
                    num_partitions,
                    TopicReplication::Fixed(replication_factor),
                )
            })
            .collect();

        let results = admin_client
            .create_topics(&new_topics, &AdminOptions::new())
            .await?;

        for result in results {
            match result {
                Ok(topic) => info!("{:<12} --> Kafka 토픽 생성 성공: {}", "Manager", topic),
                Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!("{:<12} --> Kafka 토픽 이미 존재: {}", "Manager", topic)
                }
                Err((topic, code)) => {
                    error!("{:<12} --> Kafka 토픽 생성 실패: {} {:?}", "Manager", topic, code);
                    return Err(KafkaError::AdminOp(code));
                }
            }
        }

        Ok(())
    }
}

// endregion: --- Kafka Manager
