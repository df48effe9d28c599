use crate::time::week::WeekId;
use anyhow::Context;
use chrono::Datelike;

// Advisory locks are scoped to the Postgres session. Used to keep two weekly batch runs for the
// same brand from generating at once.
const LOCK_NAMESPACE: i64 = 0x4144_4C45_4E53; // "ADLENS"

/// FNV-1a, stable across processes and releases.
fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn lock_key(brand_id: &str, week: WeekId) -> i64 {
    let days = week.monday().num_days_from_ce() as i64;
    LOCK_NAMESPACE ^ (fnv1a(brand_id) as i64).wrapping_shl(20) ^ days
}

pub async fn try_acquire_week_lock(
    pool: &sqlx::PgPool,
    brand_id: &str,
    week: WeekId,
) -> anyhow::Result<bool> {
    let key = lock_key(brand_id, week);
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;
    Ok(acquired.0)
}

pub async fn release_week_lock(
    pool: &sqlx::PgPool,
    brand_id: &str,
    week: WeekId,
) -> anyhow::Result<()> {
    let key = lock_key(brand_id, week);
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(key)
        .execute(pool)
        .await
        .with_context(|| format!("failed to release advisory lock (key={key})"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_differ_by_brand_and_week() {
        let w1: WeekId = "2024-05-13".parse().unwrap();
        let w2 = w1.next();
        assert_eq!(lock_key("brand-a", w1), lock_key("brand-a", w1));
        assert_ne!(lock_key("brand-a", w1), lock_key("brand-b", w1));
        assert_ne!(lock_key("brand-a", w1), lock_key("brand-a", w2));
    }
}
