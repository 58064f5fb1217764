//! Expense repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use tally_core::{Error, Expense, ExpenseRepository, Result};

/// PostgreSQL implementation of ExpenseRepository.
pub struct PgExpenseRepository {
    pool: Pool<Postgres>,
}

impl PgExpenseRepository {
    /// Create a new PgExpenseRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse an expense row into an Expense struct.
    fn parse_expense_row(row: sqlx::postgres::PgRow) -> Expense {
        Expense {
            id: row.get("id"),
            merchant_name: row.get("merchant_name"),
            description: row.get("description"),
            user_id: row.get("user_id"),
            category: row.get("category"),
            occurred_at: row.get("occurred_at"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl ExpenseRepository for PgExpenseRepository {
    async fn get(&self, expense_id: Uuid) -> Result<Option<Expense>> {
        let row = sqlx::query(
            "SELECT id, merchant_name, description, user_id, category, occurred_at, created_at
             FROM expense
             WHERE id = $1",
        )
        .bind(expense_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_expense_row))
    }

    async fn set_category(&self, expense_id: Uuid, category: &str) -> Result<()> {
        let result = sqlx::query("UPDATE expense SET category = $2 WHERE id = $1")
            .bind(expense_id)
            .bind(category)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::ExpenseNotFound(expense_id));
        }
        Ok(())
    }

    async fn list_uncategorized(&self, limit: i64) -> Result<Vec<Expense>> {
        let rows = sqlx::query(
            "SELECT id, merchant_name, description, user_id, category, occurred_at, created_at
             FROM expense
             WHERE category IS NULL
             ORDER BY created_at ASC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_expense_row).collect())
    }

    async fn category_distribution(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT category, COUNT(*) AS count
             FROM expense
             WHERE category IS NOT NULL
             GROUP BY category
             ORDER BY count DESC, category ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get("category"), r.get("count")))
            .collect())
    }
}
