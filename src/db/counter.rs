//! Contract counters in Postgres.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{CounterStore, StoreError};

#[derive(Debug, Clone)]
pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn increment(&self, contract_type: &str) -> Result<i64, StoreError> {
        // Increment and read are one statement; the row lock orders callers.
        let number: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO contract_counters (contract_type, current_number)
            VALUES ($1, 1)
            ON CONFLICT (contract_type)
            DO UPDATE SET current_number = contract_counters.current_number + 1
            RETURNING current_number
            "#,
        )
        .bind(contract_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(number)
    }
}
