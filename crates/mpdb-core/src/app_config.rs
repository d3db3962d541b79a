use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};

use crate::entity::SourceLayout;
use crate::CoreError;

pub const DEFAULT_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_DECIMAL_SCALE: u32 = 6;
pub const DEFAULT_END_DATE_HORIZON_DAYS: u32 = 30;
pub const DEFAULT_MAX_FAILURE_REASONS: usize = 5;
pub const DEFAULT_BATCH_RETRIES: u32 = 1;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

/// Backend the batch loader writes documents into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// One JSON array file per collection under the output directory.
    File,
    /// Process-local collections; nothing survives the run.
    Memory,
    /// `documents` table in Postgres (JSONB bodies).
    Postgres,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::File => write!(f, "file"),
            StoreKind::Memory => write!(f, "memory"),
            StoreKind::Postgres => write!(f, "postgres"),
        }
    }
}

impl FromStr for StoreKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Ok(StoreKind::File),
            "memory" | "mem" => Ok(StoreKind::Memory),
            "postgres" | "pg" => Ok(StoreKind::Postgres),
            other => Err(CoreError::UnknownStoreKind(other.to_string())),
        }
    }
}

/// Rounding applied when normalizing financial fields to the configured scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingRule {
    /// Midpoint rounds away from zero (`2.5 -> 3`, `-2.5 -> -3`).
    HalfUp,
    /// Banker's rounding.
    HalfEven,
    /// Drop digits past the scale.
    Truncate,
}

impl RoundingRule {
    #[must_use]
    pub fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingRule::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingRule::HalfEven => RoundingStrategy::MidpointNearestEven,
            RoundingRule::Truncate => RoundingStrategy::ToZero,
        }
    }
}

impl std::fmt::Display for RoundingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundingRule::HalfUp => write!(f, "half_up"),
            RoundingRule::HalfEven => write!(f, "half_even"),
            RoundingRule::Truncate => write!(f, "truncate"),
        }
    }
}

impl FromStr for RoundingRule {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "half_up" => Ok(RoundingRule::HalfUp),
            "half_even" | "bankers" => Ok(RoundingRule::HalfEven),
            "truncate" | "down" => Ok(RoundingRule::Truncate),
            other => Err(CoreError::UnknownRoundingRule(other.to_string())),
        }
    }
}

#[derive(Clone)]
pub struct PipelineConfig {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Prefix that scopes every target collection (file directory, table namespace).
    pub namespace: String,
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub batch_size: usize,
    pub decimal_scale: u32,
    pub rounding: RoundingRule,
    /// Days added to a start date when the source row has no end date.
    pub end_date_horizon_days: u32,
    pub max_failure_reasons: usize,
    /// Extra attempts for a batch the store rejected as a whole.
    pub batch_retries: u32,
    pub retry_backoff_ms: u64,
    pub log_level: String,
    pub layout: SourceLayout,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("./export"),
            output_dir: PathBuf::from("./out"),
            namespace: "mpdb".to_string(),
            store: StoreKind::File,
            database_url: None,
            batch_size: DEFAULT_BATCH_SIZE,
            decimal_scale: DEFAULT_DECIMAL_SCALE,
            rounding: RoundingRule::HalfUp,
            end_date_horizon_days: DEFAULT_END_DATE_HORIZON_DAYS,
            max_failure_reasons: DEFAULT_MAX_FAILURE_REASONS,
            batch_retries: DEFAULT_BATCH_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            log_level: "info".to_string(),
            layout: SourceLayout::default(),
        }
    }
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("source_dir", &self.source_dir)
            .field("output_dir", &self.output_dir)
            .field("namespace", &self.namespace)
            .field("store", &self.store)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("batch_size", &self.batch_size)
            .field("decimal_scale", &self.decimal_scale)
            .field("rounding", &self.rounding)
            .field("end_date_horizon_days", &self.end_date_horizon_days)
            .field("max_failure_reasons", &self.max_failure_reasons)
            .field("batch_retries", &self.batch_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("log_level", &self.log_level)
            .field("layout", &self.layout)
            .finish()
    }
}
