//! Mapping repository implementation: global (crowd) and personal caches.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use tally_core::{
    CategorizedRecord, Confidence, Error, GlobalMapping, MappingRepository, MerchantKey,
    PersonalMapping, Result,
};

/// PostgreSQL implementation of MappingRepository.
pub struct PgMappingRepository {
    pool: Pool<Postgres>,
}

impl PgMappingRepository {
    /// Create a new PgMappingRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Convert Confidence to string for database.
    fn confidence_to_str(confidence: Confidence) -> &'static str {
        match confidence {
            Confidence::Ai => "ai",
            Confidence::User => "user",
            Confidence::Consensus => "consensus",
        }
    }

    /// Convert string from database to Confidence.
    fn str_to_confidence(s: &str) -> Confidence {
        match s {
            "ai" => Confidence::Ai,
            "user" => Confidence::User,
            "consensus" => Confidence::Consensus,
            _ => Confidence::Ai, // fallback
        }
    }

    /// Parse a global_mapping row into a GlobalMapping struct.
    fn parse_global_row(row: sqlx::postgres::PgRow) -> GlobalMapping {
        let votes: Option<JsonValue> = row.get("category_votes");
        let category_votes = votes.and_then(|v| serde_json::from_value(v).ok());

        GlobalMapping {
            merchant_key: MerchantKey(row.get("merchant_key")),
            category: row.get("category"),
            confidence: Self::str_to_confidence(row.get("confidence")),
            vote_count: row.get("vote_count"),
            category_votes,
            ai_suggestion: row.get("ai_suggestion"),
            last_updated: row.get("last_updated"),
        }
    }
}

#[async_trait]
impl MappingRepository for PgMappingRepository {
    async fn get_personal(
        &self,
        user_id: Uuid,
        key: &MerchantKey,
    ) -> Result<Option<PersonalMapping>> {
        let row = sqlx::query(
            "SELECT user_id, merchant_key, category, created_at
             FROM personal_mapping
             WHERE user_id = $1 AND merchant_key = $2",
        )
        .bind(user_id)
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| PersonalMapping {
            user_id: r.get("user_id"),
            merchant_key: MerchantKey(r.get("merchant_key")),
            category: r.get("category"),
            created_at: r.get("created_at"),
        }))
    }

    async fn get_global(&self, key: &MerchantKey) -> Result<Option<GlobalMapping>> {
        let row = sqlx::query(
            "SELECT merchant_key, category, confidence, vote_count, category_votes,
                    ai_suggestion, last_updated
             FROM global_mapping
             WHERE merchant_key = $1",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_global_row))
    }

    async fn upsert_global(
        &self,
        key: &MerchantKey,
        category: &str,
        confidence: Confidence,
        ai_suggestion: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        // AI-sourced mappings carry no endorsement yet; anything a human
        // touched starts with one vote.
        let initial_votes: i64 = match confidence {
            Confidence::Ai => 0,
            _ => 1,
        };

        sqlx::query(
            "INSERT INTO global_mapping
                 (merchant_key, category, confidence, vote_count, ai_suggestion, last_updated)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (merchant_key) DO UPDATE SET
                 category = EXCLUDED.category,
                 confidence = EXCLUDED.confidence,
                 ai_suggestion = EXCLUDED.ai_suggestion,
                 last_updated = EXCLUDED.last_updated",
        )
        .bind(key.as_str())
        .bind(category)
        .bind(Self::confidence_to_str(confidence))
        .bind(initial_votes)
        .bind(ai_suggestion)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn upsert_personal(
        &self,
        user_id: Uuid,
        key: &MerchantKey,
        category: &str,
    ) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO personal_mapping (user_id, merchant_key, category, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, merchant_key) DO UPDATE SET
                 category = EXCLUDED.category",
        )
        .bind(user_id)
        .bind(key.as_str())
        .bind(category)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn vote(&self, key: &MerchantKey, category: &str) -> Result<GlobalMapping> {
        let now = Utc::now();

        // Most-recent-vote-wins: the voted category replaces the current one
        // and the count increments. Consensus is rebuilt separately.
        let row = sqlx::query(
            "INSERT INTO global_mapping
                 (merchant_key, category, confidence, vote_count, last_updated)
             VALUES ($1, $2, 'user', 1, $3)
             ON CONFLICT (merchant_key) DO UPDATE SET
                 category = EXCLUDED.category,
                 confidence = 'user',
                 vote_count = global_mapping.vote_count + 1,
                 last_updated = EXCLUDED.last_updated
             RETURNING merchant_key, category, confidence, vote_count, category_votes,
                       ai_suggestion, last_updated",
        )
        .bind(key.as_str())
        .bind(category)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_global_row(row))
    }

    async fn rebuild_from_history(&self, records: &[CategorizedRecord]) -> Result<u64> {
        let now = Utc::now();

        // Tally in memory; the history set is small (one row per categorized
        // expense) and the plurality pick needs deterministic ordering.
        let mut tallies: HashMap<&str, HashMap<&str, i64>> = HashMap::new();
        for record in records {
            *tallies
                .entry(record.merchant_key.as_str())
                .or_default()
                .entry(record.category.as_str())
                .or_insert(0) += 1;
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let mut written = 0u64;

        for (merchant_key, votes) in &tallies {
            // Plurality winner; ties break to the lexicographically smaller
            // category so rebuilds are reproducible.
            let Some((winner, _)) = votes
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            else {
                continue;
            };
            let total: i64 = votes.values().sum();
            let votes_json = serde_json::to_value(votes)?;

            sqlx::query(
                "INSERT INTO global_mapping
                     (merchant_key, category, confidence, vote_count, category_votes, last_updated)
                 VALUES ($1, $2, 'consensus', $3, $4, $5)
                 ON CONFLICT (merchant_key) DO UPDATE SET
                     category = EXCLUDED.category,
                     confidence = 'consensus',
                     vote_count = EXCLUDED.vote_count,
                     category_votes = EXCLUDED.category_votes,
                     last_updated = EXCLUDED.last_updated",
            )
            .bind(merchant_key)
            .bind(winner)
            .bind(total)
            .bind(votes_json)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

            written += 1;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_round_trip() {
        for confidence in [Confidence::Ai, Confidence::User, Confidence::Consensus] {
            let s = PgMappingRepository::confidence_to_str(confidence);
            assert_eq!(PgMappingRepository::str_to_confidence(s), confidence);
        }
    }

    #[test]
    fn test_unknown_confidence_falls_back_to_ai() {
        assert_eq!(
            PgMappingRepository::str_to_confidence("mystery"),
            Confidence::Ai
        );
    }
}
