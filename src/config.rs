use anyhow::{Context, Result};
use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Calculation-engine version embedded in every cache key. Bumping it is the
/// only sanctioned way to invalidate cached estimates after a logic change.
pub const ENGINE_VERSION: &str = "estimator-v3";

/// Which UTC offset to use for the repeated wall-clock hour at DST fall-back
/// when a timestamp arrives without an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbiguousDstPolicy {
    Earlier,
    Later,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// IANA zone naive meter timestamps are interpreted in.
    pub timezone: String,
    /// Reject offset-bearing timestamps whose offset disagrees with the
    /// configured zone at that instant.
    pub strict_timezone_parsing: bool,
    pub ambiguous_dst_policy: AmbiguousDstPolicy,
    /// Fixed meter interval length; Smart Meter Texas exports 15-minute data.
    pub interval_minutes: u32,
    pub engine_version: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            timezone: "America/Chicago".to_string(),
            strict_timezone_parsing: false,
            ambiguous_dst_policy: AmbiguousDstPolicy::Earlier,
            interval_minutes: 15,
            engine_version: ENGINE_VERSION.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("RPE__").split("__"));
        let cfg: EngineConfig = figment.extract()?;
        anyhow::ensure!(
            cfg.interval_minutes > 0,
            "interval_minutes must be positive"
        );
        Ok(cfg)
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!(e))
            .with_context(|| format!("unknown IANA timezone: {}", self.timezone))
    }
}
