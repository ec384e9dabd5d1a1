// Configuration source loading.
//
// Priority order:
// 1. Environment variables (CSV2LAKE_* prefix, raw AWS_* fallbacks for S3)
// 2. Config file path from CSV2LAKE_CONFIG
// 3. Inline config content from CSV2LAKE_CONFIG_CONTENT
// 4. Default config files (./csv2lake.toml, ./.csv2lake.toml)
// 5. Built-in defaults

use crate::*;
use anyhow::{Context, Result};
use std::env;

/// Load configuration from env/file sources, failing if no file is found
/// where one was explicitly requested.
pub(crate) fn load_config() -> Result<RuntimeConfig> {
    let mut config = load_from_file()?.unwrap_or_default();
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a specific file path (for CLI --config flag).
/// Returns an error if the file doesn't exist or can't be parsed.
pub(crate) fn load_from_file_path(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config: RuntimeConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration with graceful fallback to defaults.
/// Tries standard config file locations, returns defaults if none found.
pub(crate) fn load_or_default() -> Result<RuntimeConfig> {
    let mut config = match load_from_file() {
        Ok(Some(file_config)) => file_config,
        _ => RuntimeConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file() -> Result<Option<RuntimeConfig>> {
    if let Ok(path) = env::var("CSV2LAKE_CONFIG") {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: RuntimeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        return Ok(Some(config));
    }

    if let Ok(content) = env::var("CSV2LAKE_CONFIG_CONTENT") {
        let config: RuntimeConfig = toml::from_str(&content)
            .context("Failed to parse inline config from CSV2LAKE_CONFIG_CONTENT")?;
        return Ok(Some(config));
    }

    for path in &["./csv2lake.toml", "./.csv2lake.toml"] {
        if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path))?;
            let config: RuntimeConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path))?;
            return Ok(Some(config));
        }
    }

    Ok(None)
}

fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<()> {
    if let Ok(v) = env::var("CSV2LAKE_STORAGE_BACKEND") {
        config.storage.backend = v
            .parse()
            .context("Invalid CSV2LAKE_STORAGE_BACKEND value")?;
    }
    if let Ok(v) = env::var("CSV2LAKE_STORAGE_PREFIX") {
        config.storage.prefix = v;
    }
    if let Ok(v) = env::var("CSV2LAKE_FS_PATH") {
        config.storage.fs.get_or_insert_with(Default::default).path = v;
    }

    // S3 settings: CSV2LAKE_* vars win, raw AWS_* vars fill the gaps so the
    // standard credential environment keeps working against MinIO.
    if let Ok(v) = env::var("CSV2LAKE_S3_BUCKET") {
        s3_config(config).bucket = v;
    }
    if let Ok(v) = env::var("CSV2LAKE_S3_ENDPOINT") {
        s3_config(config).endpoint = Some(v);
    }
    if let Some(v) = first_env(&["CSV2LAKE_S3_REGION", "AWS_REGION"]) {
        s3_config(config).region = v;
    }
    if let Some(v) = first_env(&["CSV2LAKE_S3_ACCESS_KEY_ID", "AWS_ACCESS_KEY_ID"]) {
        s3_config(config).access_key_id = Some(v);
    }
    if let Some(v) = first_env(&["CSV2LAKE_S3_SECRET_ACCESS_KEY", "AWS_SECRET_ACCESS_KEY"]) {
        s3_config(config).secret_access_key = Some(v);
    }
    if let Some(v) = first_env(&["CSV2LAKE_S3_ALLOW_HTTP", "AWS_ALLOW_HTTP"]) {
        s3_config(config).allow_http = matches!(v.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    Ok(())
}

fn s3_config(config: &mut RuntimeConfig) -> &mut S3Config {
    config.storage.s3.get_or_insert_with(Default::default)
}

fn first_env(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| env::var(key).ok())
}
