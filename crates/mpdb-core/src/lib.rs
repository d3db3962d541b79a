pub mod app_config;
pub mod config;
pub mod entity;
pub mod records;
pub mod status;

pub use app_config::{PipelineConfig, RoundingRule, StoreKind};
pub use config::{build_pipeline_config, load_pipeline_config, load_pipeline_config_from_env};
pub use entity::{EntityKind, SourceLayout, SourceSet};
pub use records::{
    AccountMetrics, AccountRecord, CampaignMetrics, CampaignRecord, Contact, DateRange,
    DeliveryTotals, DocumentKey, EntityRef, FinancialTerms, LineItemDetails, LineItemKind,
    LineItemRecord, MediaBuyRecord, MediaMix, Price, StrategyRecord, Team, TeamMember,
    UserRecord,
};
pub use status::{DisplayStatus, LifecycleStatus, MediaBuyStatus};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read source layout {path}: {source}")]
    LayoutFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse source layout: {0}")]
    LayoutFileParse(#[from] serde_yaml::Error),

    #[error("source layout validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),

    #[error("unknown store kind: {0}")]
    UnknownStoreKind(String),

    #[error("unknown rounding rule: {0}")]
    UnknownRoundingRule(String),
}
