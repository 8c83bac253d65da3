/// Postgres 저장소에서 쓰는 SQL
pub mod queries;
