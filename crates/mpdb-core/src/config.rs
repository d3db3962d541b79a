use std::path::{Path, PathBuf};

use crate::app_config::{
    PipelineConfig, RoundingRule, StoreKind, DEFAULT_BATCH_RETRIES, DEFAULT_BATCH_SIZE,
    DEFAULT_DECIMAL_SCALE, DEFAULT_END_DATE_HORIZON_DAYS, DEFAULT_MAX_FAILURE_REASONS,
    DEFAULT_RETRY_BACKOFF_MS,
};
use crate::entity::SourceLayout;
use crate::ConfigError;

/// `rust_decimal` cannot represent more fractional digits than this.
const MAX_DECIMAL_SCALE: u32 = 28;

/// Load pipeline configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is invalid or the layout file cannot be loaded.
pub fn load_pipeline_config() -> Result<PipelineConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_pipeline_config_from_env()
}

/// Load pipeline configuration from environment variables already in the process.
///
/// # Errors
///
/// Returns `ConfigError` if a value is invalid or the layout file cannot be loaded.
pub fn load_pipeline_config_from_env() -> Result<PipelineConfig, ConfigError> {
    build_pipeline_config(|key| std::env::var(key))
}

/// Build pipeline configuration using the provided env-var lookup function.
///
/// Every variable is optional except `DATABASE_URL` when `MPDB_STORE=postgres`.
///
/// # Errors
///
/// Returns `ConfigError` if a value fails to parse or validate.
pub fn build_pipeline_config<F>(lookup: F) -> Result<PipelineConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: u32| -> Result<u32, ConfigError> {
        match lookup(var) {
            Ok(raw) => raw.trim().parse::<u32>().map_err(|e| invalid(var, e.to_string())),
            Err(_) => Ok(default),
        }
    };

    let parse_u64 = |var: &str, default: u64| -> Result<u64, ConfigError> {
        match lookup(var) {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|e| invalid(var, e.to_string())),
            Err(_) => Ok(default),
        }
    };

    let parse_usize = |var: &str, default: usize| -> Result<usize, ConfigError> {
        match lookup(var) {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|e| invalid(var, e.to_string())),
            Err(_) => Ok(default),
        }
    };

    let source_dir = PathBuf::from(or_default("MPDB_SOURCE_DIR", "./export"));
    let output_dir = PathBuf::from(or_default("MPDB_OUTPUT_DIR", "./out"));
    let namespace = or_default("MPDB_NAMESPACE", "mpdb");
    if namespace.trim().is_empty() {
        return Err(invalid("MPDB_NAMESPACE", "must be non-empty".to_string()));
    }

    let store = or_default("MPDB_STORE", "file")
        .parse::<StoreKind>()
        .map_err(|e| invalid("MPDB_STORE", e.to_string()))?;
    let database_url = lookup("DATABASE_URL").ok();
    if store == StoreKind::Postgres && database_url.is_none() {
        return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
    }

    let batch_size = parse_usize("MPDB_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
    if batch_size == 0 {
        return Err(invalid("MPDB_BATCH_SIZE", "must be greater than zero".to_string()));
    }

    let decimal_scale = parse_u32("MPDB_DECIMAL_SCALE", DEFAULT_DECIMAL_SCALE)?;
    if decimal_scale > MAX_DECIMAL_SCALE {
        return Err(invalid(
            "MPDB_DECIMAL_SCALE",
            format!("must be at most {MAX_DECIMAL_SCALE}"),
        ));
    }

    let rounding = or_default("MPDB_ROUNDING", "half_up")
        .parse::<RoundingRule>()
        .map_err(|e| invalid("MPDB_ROUNDING", e.to_string()))?;

    let end_date_horizon_days =
        parse_u32("MPDB_END_DATE_HORIZON_DAYS", DEFAULT_END_DATE_HORIZON_DAYS)?;
    let max_failure_reasons =
        parse_usize("MPDB_MAX_FAILURE_REASONS", DEFAULT_MAX_FAILURE_REASONS)?;
    let batch_retries = parse_u32("MPDB_BATCH_RETRIES", DEFAULT_BATCH_RETRIES)?;
    let retry_backoff_ms = parse_u64("MPDB_RETRY_BACKOFF_MS", DEFAULT_RETRY_BACKOFF_MS)?;
    let log_level = or_default("MPDB_LOG_LEVEL", "info");

    let layout = match lookup("MPDB_LAYOUT_PATH") {
        Ok(path) => load_source_layout(Path::new(&path))?,
        Err(_) => SourceLayout::default(),
    };

    Ok(PipelineConfig {
        source_dir,
        output_dir,
        namespace,
        store,
        database_url,
        batch_size,
        decimal_scale,
        rounding,
        end_date_horizon_days,
        max_failure_reasons,
        batch_retries,
        retry_backoff_ms,
        log_level,
        layout,
    })
}

/// Load and validate a YAML source layout file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_source_layout(path: &Path) -> Result<SourceLayout, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LayoutFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let layout: SourceLayout = serde_yaml::from_str(&content)?;
    layout.validate()?;
    Ok(layout)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
