use crate::analytics::anomaly::Anomaly;
use crate::domain::recommendation::{Recommendation, StoredRecommendation};
use crate::storage::RecommendationStore;
use crate::time::week::WeekId;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct PgRecommendationStore {
    pool: sqlx::PgPool,
}

impl PgRecommendationStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

type StoredRow = (
    uuid::Uuid,
    String,
    String,
    NaiveDate,
    String,
    Value,
    Value,
    DateTime<Utc>,
);

fn from_row(row: StoredRow) -> anyhow::Result<StoredRecommendation> {
    let (id, brand_id, campaign_id, week_id, source, recommendation, anomalies, generated_at) = row;
    Ok(StoredRecommendation {
        id,
        brand_id,
        campaign_id,
        week_id: WeekId::try_from(week_id)?,
        source: source.parse()?,
        recommendation: serde_json::from_value::<Recommendation>(recommendation)
            .context("stored recommendation JSON does not match schema")?,
        anomalies: serde_json::from_value::<Vec<Anomaly>>(anomalies)
            .context("stored anomalies JSON does not match schema")?,
        generated_at,
    })
}

#[async_trait::async_trait]
impl RecommendationStore for PgRecommendationStore {
    async fn find(
        &self,
        brand_id: &str,
        campaign_id: &str,
        week: WeekId,
    ) -> anyhow::Result<Option<StoredRecommendation>> {
        let row: Option<StoredRow> = sqlx::query_as(
            "SELECT id, brand_id, campaign_id, week_id, source, recommendation, anomalies, generated_at \
             FROM weekly_recommendations \
             WHERE brand_id = $1 AND campaign_id = $2 AND week_id = $3",
        )
        .bind(brand_id)
        .bind(campaign_id)
        .bind(week.monday())
        .fetch_optional(&self.pool)
        .await
        .context("select weekly_recommendations failed")?;

        row.map(from_row).transpose()
    }

    async fn insert_if_absent(&self, rec: &StoredRecommendation) -> anyhow::Result<bool> {
        let recommendation =
            serde_json::to_value(&rec.recommendation).context("serialize recommendation failed")?;
        let anomalies = serde_json::to_value(&rec.anomalies).context("serialize anomalies failed")?;

        let mut tx = self.pool.begin().await.context("begin transaction failed")?;

        let res = sqlx::query(
            "INSERT INTO weekly_recommendations \
               (id, brand_id, campaign_id, week_id, source, recommendation, anomalies, generated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (brand_id, campaign_id, week_id) DO NOTHING",
        )
        .bind(rec.id)
        .bind(&rec.brand_id)
        .bind(&rec.campaign_id)
        .bind(rec.week_id.monday())
        .bind(rec.source.as_str())
        .bind(recommendation)
        .bind(anomalies)
        .bind(rec.generated_at)
        .execute(&mut *tx)
        .await
        .context("insert weekly_recommendations failed")?;

        tx.commit().await.context("commit transaction failed")?;
        Ok(res.rows_affected() == 1)
    }
}
