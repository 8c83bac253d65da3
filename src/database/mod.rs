/// 데이터베이스 연결과 스키마 관리
// region:    --- Imports
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::pin::Pin;
use tracing::{info, warn};

pub mod memory;
pub mod postgres;

pub use memory::{MemorySearchIndex, MemoryStore};
pub use postgres::{PgSearchIndex, PgStore};

// endregion: --- Imports

// region:    --- Database Manager
const SCHEMA_SQL: &str = include_str!("../../sql/01-create-schema.sql");

pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// 데이터베이스 매니저 생성
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(
            "{:<12} --> 데이터베이스 연결: max_connections={}",
            "Database", max_connections
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 트랜잭션 실행
    /// 클로저가 에러를 돌려주면 롤백한다.
    pub async fn transaction<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: for<'c> FnOnce(
            &'c mut sqlx::Transaction<'_, sqlx::Postgres>,
        ) -> Pin<Box<dyn Future<Output = Result<R, E>> + Send + 'c>>,
        E: From<sqlx::Error>,
    {
        let mut tx = self.pool.begin().await?;
        let result = f(&mut tx).await;
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                // 원래 에러를 돌려준다. 롤백 실패는 로그로만 남긴다.
                if let Err(rollback) = tx.rollback().await {
                    warn!("{:<12} --> 롤백 실패: {:?}", "Database", rollback);
                }
                Err(e)
            }
        }
    }

    /// 스키마 생성 (이미 있으면 그대로 둔다)
    pub async fn initialize_database(&self) -> Result<(), sqlx::Error> {
        let statements = SCHEMA_SQL
            .split(';')
            .map(str::trim)
            .filter(|statement| !statement.is_empty());

        let mut applied = 0;
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
            applied += 1;
        }
        info!("{:<12} --> 스키마 적용: {}개 구문", "Database", applied);
        Ok(())
    }
}
// endregion: --- Database Manager
