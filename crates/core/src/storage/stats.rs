use crate::domain::records::{ActionValue, CampaignRecord, DailyRecord, EntityLevel, StorefrontOrder};
use crate::storage::StatsSource;
use crate::time::calendar::DateRange;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct PgStatsSource {
    pool: sqlx::PgPool,
}

impl PgStatsSource {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

type DailyRow = (
    NaiveDate,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<f64>,
    i64,
    i64,
    i64,
    f64,
    Option<Value>,
    Option<Value>,
);

fn parse_level(s: Option<&str>) -> Option<EntityLevel> {
    let s = s?.trim().to_ascii_lowercase();
    serde_json::from_value(Value::String(s)).ok()
}

fn parse_actions(v: Option<Value>, column: &str) -> Vec<ActionValue> {
    match v {
        None | Some(Value::Null) => Vec::new(),
        Some(v) => serde_json::from_value(v).unwrap_or_else(|err| {
            tracing::warn!(column, error = %err, "ignoring malformed action list");
            Vec::new()
        }),
    }
}

fn into_record(row: DailyRow) -> DailyRecord {
    let (
        date,
        campaign_id,
        entity_id,
        entity_name,
        level,
        spend,
        impressions,
        clicks,
        reach,
        conversions,
        actions,
        action_values,
    ) = row;
    DailyRecord {
        date,
        entity_id,
        entity_name,
        campaign_id,
        level: parse_level(level.as_deref()),
        spend,
        impressions: impressions.max(0) as u64,
        clicks: clicks.max(0) as u64,
        reach: reach.max(0) as u64,
        conversions,
        actions: parse_actions(actions, "actions"),
        action_values: parse_actions(action_values, "action_values"),
        ..DailyRecord::default()
    }
}

#[async_trait::async_trait]
impl StatsSource for PgStatsSource {
    async fn daily_records(
        &self,
        brand_id: &str,
        range: DateRange,
        campaign_id: Option<&str>,
    ) -> anyhow::Result<Vec<DailyRecord>> {
        let rows: Vec<DailyRow> = sqlx::query_as(
            "SELECT date, campaign_id, entity_id, entity_name, level, spend, \
                    impressions, clicks, reach, conversions, actions, action_values \
             FROM meta_daily_stats \
             WHERE brand_id = $1 AND date BETWEEN $2 AND $3 \
               AND ($4::text IS NULL OR campaign_id = $4) \
             ORDER BY date",
        )
        .bind(brand_id)
        .bind(range.from)
        .bind(range.to)
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("select meta_daily_stats failed (brand_id={brand_id}, range={range})"))?;

        Ok(rows.into_iter().map(into_record).collect())
    }

    async fn campaign_daily_records(
        &self,
        brand_id: &str,
        range: DateRange,
        campaign_id: Option<&str>,
    ) -> anyhow::Result<Vec<DailyRecord>> {
        let rows: Vec<DailyRow> = sqlx::query_as(
            "SELECT date, campaign_id, campaign_id, campaign_name, 'campaign', spend, \
                    impressions, clicks, reach, conversions, actions, action_values \
             FROM meta_campaign_daily_stats \
             WHERE brand_id = $1 AND date BETWEEN $2 AND $3 \
               AND ($4::text IS NULL OR campaign_id = $4) \
             ORDER BY date",
        )
        .bind(brand_id)
        .bind(range.from)
        .bind(range.to)
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| {
            format!("select meta_campaign_daily_stats failed (brand_id={brand_id}, range={range})")
        })?;

        Ok(rows.into_iter().map(into_record).collect())
    }

    async fn campaigns(&self, brand_id: &str) -> anyhow::Result<Vec<CampaignRecord>> {
        let rows: Vec<(String, String, String, f64, f64, Option<String>)> = sqlx::query_as(
            "SELECT id, name, status, budget, spent, objective \
             FROM campaigns WHERE brand_id = $1 ORDER BY spent DESC",
        )
        .bind(brand_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("select campaigns failed (brand_id={brand_id})"))?;

        Ok(rows
            .into_iter()
            .map(|(id, name, status, budget, spent, objective)| CampaignRecord {
                id,
                name,
                status,
                budget,
                spent,
                objective,
            })
            .collect())
    }

    async fn storefront_orders(
        &self,
        brand_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Option<Vec<StorefrontOrder>>> {
        let connected: (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM storefront_connections WHERE brand_id = $1 AND active)",
        )
        .bind(brand_id)
        .fetch_one(&self.pool)
        .await
        .context("select storefront_connections failed")?;
        if !connected.0 {
            return Ok(None);
        }

        let rows: Vec<(String, DateTime<Utc>, f64, Option<String>, Option<DateTime<Utc>>)> =
            sqlx::query_as(
                "SELECT id, created_at, total_price, financial_status, cancelled_at \
                 FROM storefront_orders \
                 WHERE brand_id = $1 AND created_at >= $2 AND created_at < $3",
            )
            .bind(brand_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("select storefront_orders failed (brand_id={brand_id})"))?;

        Ok(Some(
            rows.into_iter()
                .map(
                    |(id, created_at, total_price, financial_status, cancelled_at)| StorefrontOrder {
                        id,
                        created_at,
                        total_price,
                        financial_status,
                        cancelled_at,
                    },
                )
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_conversion_is_lenient() {
        let row: DailyRow = (
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            Some("c1".into()),
            Some("ad_9".into()),
            None,
            Some("AD".into()),
            None,
            -5,
            12,
            0,
            1.0,
            Some(json!([{"action_type": "purchase", "value": "2"}])),
            Some(json!({"not": "a list"})),
        );
        let r = into_record(row);
        assert_eq!(r.level, Some(EntityLevel::Ad));
        assert_eq!(r.spend, None);
        assert_eq!(r.impressions, 0);
        assert_eq!(r.actions[0].value, 2.0);
        assert!(r.action_values.is_empty());
        assert_eq!(parse_level(Some("unknown")), None);
    }
}
