use crate::domain::records::StorefrontOrder;
use crate::time::calendar::CalendarZone;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StorefrontDay {
    pub orders: u64,
    pub revenue: f64,
}

/// Shopify revenue per calendar day of the user's timezone.
pub fn daily_revenue(
    orders: &[StorefrontOrder],
    tz: &CalendarZone,
) -> BTreeMap<NaiveDate, StorefrontDay> {
    let mut out: BTreeMap<NaiveDate, StorefrontDay> = BTreeMap::new();
    for order in orders.iter().filter(|o| o.counts_as_revenue()) {
        let day = out.entry(tz.local_date(order.created_at)).or_default();
        day.orders += 1;
        day.revenue += order.total_price.max(0.0);
    }
    out
}

pub fn total_revenue(days: &BTreeMap<NaiveDate, StorefrontDay>) -> f64 {
    days.values().map(|d| d.revenue).sum()
}
