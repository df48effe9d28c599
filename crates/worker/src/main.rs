use adlens_core::advisor::Advisor;
use adlens_core::analytics::rules::{RuleEngine, RuleThresholds};
use adlens_core::cache::SystemClock;
use adlens_core::service::AnalyticsService;
use adlens_core::storage::recommendations::PgRecommendationStore;
use adlens_core::storage::stats::PgStatsSource;
use adlens_core::time::calendar::DateRange;
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod campaigns;

#[derive(Debug, Parser)]
#[command(name = "adlens_worker")]
struct Args {
    /// Brand whose campaigns get this week's recommendation.
    #[arg(long)]
    brand_id: String,

    /// Compute with the rule engine and log; nothing is written.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = adlens_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let selection = campaigns::CampaignSelection::from_env();

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    let service = if args.dry_run {
        let rules =
            RuleEngine::standard(RuleThresholds::default().with_target_roas(settings.target_roas));
        AnalyticsService::new(
            &settings,
            Arc::new(PgStatsSource::new(pool.clone())),
            Arc::new(PgRecommendationStore::new(pool.clone())),
            Advisor::rules_only(rules),
            Arc::new(SystemClock),
        )
    } else {
        adlens_core::storage::migrate(&pool).await?;
        AnalyticsService::postgres(&settings, pool.clone())
    };

    let brand_id = args.brand_id.as_str();
    let week = service.current_week();
    let lookback = DateRange::last_days(
        service.server_zone().today(service.now()),
        selection.lookback_days,
    );

    let spend = service.campaign_spend(brand_id, lookback).await?;
    let selected = campaigns::select_campaigns(service.campaigns(brand_id).await?, &spend, &selection);
    tracing::info!(
        brand_id,
        week_id = %week,
        selected = selected.len(),
        dry_run = args.dry_run,
        "campaigns selected for weekly recommendations"
    );

    if args.dry_run {
        for (campaign, spend) in &selected {
            match service.preview(brand_id, campaign).await {
                Ok(generated) => tracing::info!(
                    brand_id,
                    campaign_id = %campaign.id,
                    spend,
                    action = %generated.recommendation.action,
                    confidence = generated.recommendation.confidence,
                    anomalies = generated.anomalies.len(),
                    "dry-run recommendation"
                ),
                Err(err) => {
                    tracing::error!(brand_id, campaign_id = %campaign.id, error = %err, "dry-run failed")
                }
            }
        }
        return Ok(());
    }

    let acquired = adlens_core::storage::lock::try_acquire_week_lock(&pool, brand_id, week).await?;
    if !acquired {
        tracing::warn!(brand_id, week_id = %week, "week lock not acquired; another run in progress");
        return Ok(());
    }

    let mut generated = 0usize;
    let mut blocked = 0usize;
    let mut failed = 0usize;
    for (campaign, _) in &selected {
        match service.generate_weekly(brand_id, &campaign.id).await {
            Ok(outcome) if outcome.blocked => blocked += 1,
            Ok(outcome) => {
                generated += 1;
                tracing::info!(
                    brand_id,
                    campaign_id = %campaign.id,
                    recommendation_id = %outcome.recommendation.id,
                    source = outcome.recommendation.source.as_str(),
                    "persisted weekly recommendation"
                );
            }
            Err(err) => {
                failed += 1;
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(brand_id, campaign_id = %campaign.id, error = %err, "weekly recommendation failed");
            }
        }
    }

    tracing::info!(brand_id, week_id = %week, generated, blocked, failed, "weekly run finished");

    if let Err(err) = adlens_core::storage::lock::release_week_lock(&pool, brand_id, week).await {
        tracing::warn!(brand_id, week_id = %week, error = %err, "failed to release week lock");
    }
    Ok(())
}

fn init_sentry(settings: &adlens_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
