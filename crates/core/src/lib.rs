pub mod advisor;
pub mod analytics;
pub mod cache;
pub mod domain;
pub mod llm;
pub mod service;
pub mod storage;
pub mod time;

pub mod config {
    use crate::analytics::aggregate::ConversionActions;
    use crate::analytics::campaign::Benchmarks;
    use crate::time::calendar::CalendarZone;
    use anyhow::Context;
    use std::str::FromStr;
    use std::time::Duration;

    const DEFAULT_LLM_TIMEOUT_SECS: u64 = 25;
    const DEFAULT_METRICS_CACHE_TTL_SECS: u64 = 300;
    const DEFAULT_TARGET_ROAS: f64 = 2.5;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        /// Zone that defines the Monday–Sunday recommendation week.
        pub server_timezone: CalendarZone,
        pub llm_timeout: Duration,
        pub metrics_cache_ttl: Duration,
        pub conversion_actions: ConversionActions,
        pub target_roas: f64,
        pub benchmarks: Benchmarks,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                database_url: None,
                anthropic_api_key: None,
                sentry_dsn: None,
                server_timezone: CalendarZone::ServerLocal,
                llm_timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
                metrics_cache_ttl: Duration::from_secs(DEFAULT_METRICS_CACHE_TTL_SECS),
                conversion_actions: ConversionActions::default(),
                target_roas: DEFAULT_TARGET_ROAS,
                benchmarks: Benchmarks::default(),
            }
        }
    }

    fn env_or<T: FromStr>(key: &str, default: T) -> T {
        std::env::var(key)
            .ok()
            .and_then(|s| s.trim().parse::<T>().ok())
            .unwrap_or(default)
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let defaults = Self::default();
            let server_timezone = match std::env::var("SERVER_TIMEZONE").ok() {
                Some(name) => name
                    .parse()
                    .with_context(|| format!("SERVER_TIMEZONE is not a valid timezone: {name}"))?,
                None => CalendarZone::ServerLocal,
            };

            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                server_timezone,
                llm_timeout: Duration::from_secs(env_or(
                    "LLM_TIMEOUT_SECS",
                    DEFAULT_LLM_TIMEOUT_SECS,
                )),
                metrics_cache_ttl: Duration::from_secs(env_or(
                    "METRICS_CACHE_TTL_SECS",
                    DEFAULT_METRICS_CACHE_TTL_SECS,
                )),
                conversion_actions: ConversionActions::from_list(
                    std::env::var("CONVERSION_ACTION_TYPES").ok().as_deref(),
                ),
                target_roas: env_or("TARGET_ROAS", defaults.target_roas),
                benchmarks: Benchmarks {
                    ctr: env_or("BENCHMARK_CTR", defaults.benchmarks.ctr),
                    cpc: env_or("BENCHMARK_CPC", defaults.benchmarks.cpc),
                    roas: env_or("BENCHMARK_ROAS", defaults.benchmarks.roas),
                },
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }
    }
}
