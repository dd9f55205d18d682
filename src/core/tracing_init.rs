use crate::core::config::LoggingConfig;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_tracing(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    // An unwritable log file is not an error; stdout still gets everything
    let log_file = config.path.as_deref().and_then(open_log_file);

    if config.format == "json" {
        let file_layer = log_file.map(|file| fmt::layer().json().with_writer(Arc::new(file)));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .with(file_layer)
            .init();
    } else {
        let file_layer = log_file.map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Arc::new(file))
        });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_level(true))
            .with(file_layer)
            .init();
    }
}

fn open_log_file(path: &Path) -> Option<File> {
    OpenOptions::new().create(true).append(true).open(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.log");

        assert!(open_log_file(&path).is_some());
        assert!(path.exists());
    }

    #[test]
    fn test_open_log_file_unwritable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("guard.log");

        assert!(open_log_file(&path).is_none());
    }
}
