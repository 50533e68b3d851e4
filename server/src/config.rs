//! Storage backend selection and connection settings (§6 "Environment
//! variables consumed"). Everything pool- and execution-tuning related is
//! already owned by `cellbox-pool`'s and `cellbox-exec`'s own `from_env`;
//! this is only the handful of knobs specific to standing the server up.

use cellbox_common::{env_opt, env_or, required_env, EnvVarError};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory each sandbox's private data directory is created under.
    pub sandboxes_root: String,
    /// `redis://` connection string for the hot key-value store.
    pub redis_url: String,
    /// S3 (or S3-compatible) bucket backing the cold blob store.
    pub s3_bucket: String,
    /// Optional non-AWS endpoint, for MinIO or another S3-compatible service.
    pub s3_endpoint: Option<String>,
}

impl ServerConfig {
    /// Every field here is either required (there is no sane default for a
    /// bucket name or a Redis host) or has a fixed local-dev fallback.
    pub fn from_env() -> Result<Self, EnvVarError> {
        Ok(Self {
            sandboxes_root: env_or("CELLBOX_SANDBOXES_ROOT", "/app/sandboxes".to_string()),
            redis_url: env_or("CELLBOX_REDIS_URL", "redis://127.0.0.1:6379".to_string()),
            s3_bucket: required_env("CELLBOX_S3_BUCKET")?,
            s3_endpoint: env_opt("CELLBOX_S3_ENDPOINT"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_reports_the_missing_bucket_name() {
        // SAFETY: test-only, single-threaded access to this specific var.
        unsafe {
            std::env::remove_var("CELLBOX_S3_BUCKET_TEST_DOES_NOT_EXIST");
        }
        let err = required_env("CELLBOX_S3_BUCKET_TEST_DOES_NOT_EXIST").unwrap_err();
        assert_eq!(err.var, "CELLBOX_S3_BUCKET_TEST_DOES_NOT_EXIST");
    }

    #[test]
    fn sandboxes_root_falls_back_to_the_documented_default() {
        // SAFETY: test-only, single-threaded access to this specific var.
        unsafe {
            std::env::remove_var("CELLBOX_SANDBOXES_ROOT");
        }
        let root: String = env_or("CELLBOX_SANDBOXES_ROOT", "/app/sandboxes".to_string());
        assert_eq!(root, "/app/sandboxes");
    }
}
