// Storage operator construction
//
// Builds an OpenDAL operator from the immutable StorageConfig. The operator
// is cheap to clone; writers and readers hold their own handle instead of
// sharing hidden global state.

use csv2lake_config::{StorageBackend, StorageConfig};
use opendal::Operator;

use crate::error::{LakeError, Result};

/// Build an OpenDAL operator for the configured storage backend.
pub fn build_operator(config: &StorageConfig) -> Result<Operator> {
    match config.backend {
        StorageBackend::Fs => {
            let fs = config
                .fs
                .as_ref()
                .ok_or_else(|| LakeError::Config("fs backend requires [storage.fs]".to_string()))?;

            let builder = opendal::services::Fs::default().root(&fs.path);
            Ok(Operator::new(builder)?.finish())
        }
        StorageBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .ok_or_else(|| LakeError::Config("s3 backend requires [storage.s3]".to_string()))?;

            let mut builder = opendal::services::S3::default()
                .bucket(&s3.bucket)
                .region(&s3.region);

            if let Some(endpoint) = &s3.endpoint {
                builder = builder.endpoint(endpoint);
            }

            if let Some(key) = &s3.access_key_id {
                builder = builder.access_key_id(key);
            }

            if let Some(secret) = &s3.secret_access_key {
                builder = builder.secret_access_key(secret);
            }

            Ok(Operator::new(builder)?.finish())
        }
    }
}
