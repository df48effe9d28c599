use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Granularity of a Meta daily stats row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityLevel {
    Account,
    Campaign,
    #[serde(alias = "ad_set")]
    Adset,
    Ad,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionValue {
    pub action_type: String,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub value: f64,
}

/// One row of ad performance for a single calendar date and entity.
///
/// Numeric fields accept numbers or numeric strings. `spend` keeps `None` apart from `0.0`:
/// a missing value means the row has not been synced yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    #[serde(deserialize_with = "lenient::calendar_date")]
    pub date: NaiveDate,
    #[serde(default, alias = "entityId", alias = "ad_id")]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub entity_name: Option<String>,
    #[serde(default, alias = "campaignId")]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub level: Option<EntityLevel>,
    #[serde(default, alias = "spent", deserialize_with = "lenient::opt_f64")]
    pub spend: Option<f64>,
    #[serde(default, deserialize_with = "lenient::u64_or_zero")]
    pub impressions: u64,
    #[serde(default, deserialize_with = "lenient::u64_or_zero")]
    pub clicks: u64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub conversions: f64,
    #[serde(default, deserialize_with = "lenient::u64_or_zero")]
    pub reach: u64,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub ctr: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub cpc: Option<f64>,
    #[serde(default, deserialize_with = "lenient::null_as_empty")]
    pub actions: Vec<ActionValue>,
    #[serde(default, alias = "actionValues", deserialize_with = "lenient::null_as_empty")]
    pub action_values: Vec<ActionValue>,
}

impl DailyRecord {
    pub fn new(date: NaiveDate, entity_id: impl Into<String>) -> Self {
        Self {
            date,
            entity_id: Some(entity_id.into()),
            ..Self::default()
        }
    }

    /// Synthetic ad-account-wide rows. Without an explicit level, a missing id or a Meta
    /// ad account id (`act_…`) marks the row as account-level.
    pub fn is_account_level(&self) -> bool {
        match self.level {
            Some(level) => level == EntityLevel::Account,
            None => match self.entity_id.as_deref().map(str::trim) {
                None | Some("") => true,
                Some(id) => id.starts_with("act_"),
            },
        }
    }

    pub fn spend_or_zero(&self) -> f64 {
        self.spend.unwrap_or(0.0)
    }
}

/// Campaign / ad set / ad master row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub budget: f64,
    #[serde(default, alias = "spend", deserialize_with = "lenient::f64_or_zero")]
    pub spent: f64,
    #[serde(default)]
    pub objective: Option<String>,
}

impl CampaignRecord {
    pub fn is_active(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("active")
    }
}

/// Shopify order as stored by the storefront sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorefrontOrder {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub total_price: f64,
    #[serde(default)]
    pub financial_status: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl StorefrontOrder {
    pub fn counts_as_revenue(&self) -> bool {
        if self.cancelled_at.is_some() {
            return false;
        }
        !matches!(
            self.financial_status
                .as_deref()
                .map(|s| s.trim().to_ascii_lowercase())
                .as_deref(),
            Some("voided" | "refunded")
        )
    }
}

pub(crate) mod lenient {
    use super::*;
    use serde_json::Value;

    fn value_to_f64(v: &Value) -> Option<f64> {
        match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|n| n.is_finite())
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(v.as_ref().and_then(value_to_f64))
    }

    pub fn f64_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(opt_f64(d)?.unwrap_or(0.0))
    }

    pub fn u64_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let n = opt_f64(d)?.unwrap_or(0.0);
        Ok(if n > 0.0 { n.round() as u64 } else { 0 })
    }

    pub fn null_as_empty<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
    }

    /// Accepts `YYYY-MM-DD` or any string starting with it (e.g. an ISO timestamp).
    pub fn calendar_date<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(d)?;
        let head = s.trim().get(..10).unwrap_or(s.trim());
        NaiveDate::parse_from_str(head, "%Y-%m-%d").map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_numbers_and_spent_alias() {
        let r: DailyRecord = serde_json::from_value(json!({
            "date": "2024-03-02T00:00:00+00:00",
            "entityId": "ad_1",
            "spent": "12.50",
            "impressions": "1000",
            "clicks": 20,
            "conversions": 1.5,
            "actions": null
        }))
        .unwrap();

        assert_eq!(r.date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(r.entity_id.as_deref(), Some("ad_1"));
        assert_eq!(r.spend, Some(12.5));
        assert_eq!(r.impressions, 1000);
        assert_eq!(r.clicks, 20);
        assert!(r.actions.is_empty());
    }

    #[test]
    fn null_spend_is_not_zero_spend() {
        let missing: DailyRecord =
            serde_json::from_value(json!({"date": "2024-03-02", "spend": null})).unwrap();
        let zero: DailyRecord =
            serde_json::from_value(json!({"date": "2024-03-02", "spend": "0"})).unwrap();
        assert_eq!(missing.spend, None);
        assert_eq!(zero.spend, Some(0.0));
    }

    #[test]
    fn account_level_detection() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(DailyRecord::new(d, "act_123").is_account_level());
        assert!(!DailyRecord::new(d, "238490").is_account_level());

        let mut no_id = DailyRecord::new(d, "x");
        no_id.entity_id = None;
        assert!(no_id.is_account_level());

        let mut explicit = DailyRecord::new(d, "act_123");
        explicit.level = Some(EntityLevel::Campaign);
        assert!(!explicit.is_account_level());
    }

    #[test]
    fn cancelled_and_refunded_orders_do_not_count() {
        let base = StorefrontOrder {
            id: "1".into(),
            created_at: Utc::now(),
            total_price: 10.0,
            financial_status: Some("paid".into()),
            cancelled_at: None,
        };
        assert!(base.counts_as_revenue());

        let refunded = StorefrontOrder {
            financial_status: Some("Refunded".into()),
            ..base.clone()
        };
        assert!(!refunded.counts_as_revenue());

        let cancelled = StorefrontOrder {
            cancelled_at: Some(Utc::now()),
            ..base
        };
        assert!(!cancelled.counts_as_revenue());
    }
}
