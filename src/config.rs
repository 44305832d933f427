use crate::processor::danger::{
    ScoringConfig, CLIENT_FALLOFF_RADIUS_M, DEFAULT_FALLBACK_SEVERITY, SERVER_FALLOFF_RADIUS_M,
};
use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const DEFAULT_FEED_URL: &str =
    "https://www.gdacs.org/gdacsapi/api/events/geteventlist/EVENTS4APP";
const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: String,
    pub feed_url: String,
    pub fcm_endpoint: String,
    pub fcm_credentials_file: String,
    pub fcm_project_id: Option<String>,
    pub dispatch_interval_secs: u64,
    pub run_once: bool,
    pub scan_page_size: i64,
    pub push_max_in_flight: usize,
    pub push_timeout_secs: u64,
    pub server_falloff_radius_m: f64,
    pub client_falloff_radius_m: f64,
    pub fallback_severity: u8,
    pub ingest_max_failures: u32,
    pub ingest_cooldown_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
        let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
        let db_name = env::var("DB_DATABASE").unwrap_or_else(|_| "disaster_alerts".to_string());
        let db_user = env::var("DB_USER").unwrap_or_else(|_| "alerts".to_string());
        let db_pwd = env::var("DB_PWD").unwrap_or_else(|_| "alerts".to_string());

        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            db_user, db_pwd, db_host, db_port, db_name
        );

        Ok(Self {
            database_url,
            db_max_connections: parsed_or("DB_MAX_CONNECTIONS", 10),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            feed_url: env::var("DISASTER_FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.to_string()),
            fcm_endpoint: env::var("FCM_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_FCM_ENDPOINT.to_string()),
            fcm_credentials_file: env::var("GOOGLE_APPLICATION_CREDENTIALS")
                .unwrap_or_else(|_| "service-account.json".to_string()),
            fcm_project_id: env::var("FCM_PROJECT_ID").ok().filter(|p| !p.trim().is_empty()),
            dispatch_interval_secs: parsed_or("DISPATCH_INTERVAL_SECS", 3600),
            run_once: parsed_or("RUN_ONCE", false),
            scan_page_size: parsed_or("SCAN_PAGE_SIZE", 100),
            push_max_in_flight: parsed_or("PUSH_MAX_IN_FLIGHT", 16),
            push_timeout_secs: parsed_or("PUSH_TIMEOUT_SECS", 10),
            server_falloff_radius_m: positive_or("SERVER_FALLOFF_RADIUS_M", SERVER_FALLOFF_RADIUS_M),
            client_falloff_radius_m: positive_or("CLIENT_FALLOFF_RADIUS_M", CLIENT_FALLOFF_RADIUS_M),
            fallback_severity: parsed_or("FALLBACK_SEVERITY", DEFAULT_FALLBACK_SEVERITY),
            ingest_max_failures: parsed_or("INGEST_MAX_FAILURES", 5),
            ingest_cooldown_secs: parsed_or("INGEST_COOLDOWN_SECS", 300),
        })
    }

    /// Scoring parameters for the push fan-out.
    pub fn server_scoring(&self) -> ScoringConfig {
        ScoringConfig {
            falloff_radius_m: self.server_falloff_radius_m,
            fallback_severity: self.fallback_severity,
        }
    }

    /// Scoring parameters the mobile client uses for on-device re-ranking.
    pub fn client_scoring(&self) -> ScoringConfig {
        ScoringConfig {
            falloff_radius_m: self.client_falloff_radius_m,
            fallback_severity: self.fallback_severity,
        }
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch_interval_secs.max(1))
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }
}

/// Reads `key` and parses it, keeping `default` when unset or malformed.
fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

/// Like `parsed_or`, but a radius must be a finite number above zero. Anything
/// else would zero every score, so it is refused and the default kept.
fn positive_or(key: &str, default: f64) -> f64 {
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v,
        _ => {
            warn!("{}={:?} is not a positive distance, using {}", key, raw, default);
            default
        }
    }
}
