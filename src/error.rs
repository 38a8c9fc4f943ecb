use thiserror::Error;

use crate::remote::WaitError;

#[derive(Debug, Error)]
pub enum JobyardError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("No tokio runtime available: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),

    #[error("Remote wait failed: {0}")]
    Wait(#[from] WaitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::SourceError;

    #[test]
    fn wait_error_converts() {
        let err: JobyardError = WaitError::Communication {
            path: "Task[1]".into(),
            attempts: 5,
            source: SourceError::Communication("timed out".into()),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Remote wait failed: gave up polling Task[1] after 5 failed attempts: communication failure: timed out"
        );
    }

    #[test]
    fn config_error_display() {
        let err = JobyardError::Config("max pool size must be at least 1".into());
        assert_eq!(err.to_string(), "Config error: max pool size must be at least 1");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<JobyardError>();
    }
}
