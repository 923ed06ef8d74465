use std::env;

use anyhow::anyhow;
use chrono::FixedOffset;

/// America/Sao_Paulo has no DST since 2019, so a fixed -03:00 covers it.
const DEFAULT_UTC_OFFSET_MINUTES: i32 = -180;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub clinic_zone: FixedOffset,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(10);

        let offset_minutes = match env::var("CLINIC_UTC_OFFSET_MINUTES") {
            Ok(raw) => raw
                .trim()
                .parse::<i32>()
                .map_err(|e| anyhow!("CLINIC_UTC_OFFSET_MINUTES must be an integer: {e}"))?,
            Err(_) => DEFAULT_UTC_OFFSET_MINUTES,
        };

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections,
            clinic_zone: zone_from_minutes(offset_minutes)?,
        })
    }
}

fn zone_from_minutes(minutes: i32) -> anyhow::Result<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| anyhow!("CLINIC_UTC_OFFSET_MINUTES out of range: {minutes}"))
}
