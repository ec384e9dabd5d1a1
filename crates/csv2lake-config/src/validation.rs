// Configuration validation
//
// Validates that required fields are present and values are sensible.
// Runs once at startup; a bad config is fatal before any table I/O happens.

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

pub(crate) fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_storage_config(&config.storage)?;
    validate_ingest_config(&config.ingest)?;
    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    if config.parquet_row_group_size == 0 {
        bail!("storage.parquet_row_group_size must be greater than 0");
    }

    match config.backend {
        StorageBackend::Fs => {
            let fs = config
                .fs
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("fs storage backend requires 'fs' configuration"))?;

            if fs.path.is_empty() {
                bail!("storage.fs.path must not be empty");
            }
        }
        StorageBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("s3 storage backend requires 's3' configuration"))?;

            if s3.bucket.is_empty() {
                bail!("storage.s3.bucket is required for S3 backend");
            }

            if s3.region.is_empty() {
                bail!("storage.s3.region is required for S3 backend");
            }

            if let Some(endpoint) = &s3.endpoint {
                if endpoint.starts_with("http://") && !s3.allow_http {
                    bail!(
                        "storage.s3.endpoint '{}' uses plain http; set storage.s3.allow_http = true to permit it",
                        endpoint
                    );
                }
            }
        }
    }

    Ok(())
}

fn validate_ingest_config(config: &IngestConfig) -> Result<()> {
    if config.max_payload_bytes == 0 {
        bail!("ingest.max_payload_bytes must be greater than 0");
    }

    if config.max_payload_bytes > 100 * 1024 * 1024 {
        // 100 MB
        warn!(
            max_payload_bytes = config.max_payload_bytes,
            "ingest.max_payload_bytes is very large; may cause memory issues"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_storage_config() {
        let valid_s3 = StorageConfig {
            backend: StorageBackend::S3,
            prefix: String::new(),
            parquet_row_group_size: default_parquet_row_group_size(),
            fs: None,
            s3: Some(S3Config {
                bucket: "test-bucket".to_string(),
                region: "us-east-1".to_string(),
                ..Default::default()
            }),
        };
        assert!(validate_storage_config(&valid_s3).is_ok());

        let missing_bucket = StorageConfig {
            s3: Some(S3Config {
                region: "us-east-1".to_string(),
                ..Default::default()
            }),
            ..valid_s3.clone()
        };
        assert!(validate_storage_config(&missing_bucket).is_err());

        let missing_section = StorageConfig {
            s3: None,
            ..valid_s3.clone()
        };
        assert!(validate_storage_config(&missing_section).is_err());
    }

    #[test]
    fn test_http_endpoint_requires_allow_http() {
        let mut config = StorageConfig {
            backend: StorageBackend::S3,
            prefix: String::new(),
            parquet_row_group_size: default_parquet_row_group_size(),
            fs: None,
            s3: Some(S3Config {
                bucket: "datalake".to_string(),
                region: "us-east-1".to_string(),
                endpoint: Some("http://localhost:9000".to_string()),
                allow_http: false,
                ..Default::default()
            }),
        };
        assert!(validate_storage_config(&config).is_err());

        config.s3.as_mut().unwrap().allow_http = true;
        assert!(validate_storage_config(&config).is_ok());
    }

    #[test]
    fn test_validate_fs_config() {
        let empty_path = StorageConfig {
            backend: StorageBackend::Fs,
            prefix: String::new(),
            parquet_row_group_size: default_parquet_row_group_size(),
            fs: Some(FsConfig {
                path: String::new(),
            }),
            s3: None,
        };
        assert!(validate_storage_config(&empty_path).is_err());
    }

    #[test]
    fn test_validate_ingest_config() {
        assert!(validate_ingest_config(&IngestConfig::default()).is_ok());
        assert!(validate_ingest_config(&IngestConfig {
            max_payload_bytes: 0
        })
        .is_err());
    }
}
