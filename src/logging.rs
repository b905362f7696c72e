//! Logger initialization.
//!
//! The crate itself only uses the `log` facade. Applications that do not bring their own logger
//! can call [`init`] once, early in `main`.

use std::{path::PathBuf, str::FromStr};

use log::LevelFilter;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("a logger is already installed")]
    AlreadyInitialized(#[from] log::SetLoggerError),
}

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: LevelFilter,
    /// Log file appended to in addition to stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Takes the level from `RUST_LOG`, falling back to `info` when unset or unparsable.
    pub fn from_env() -> Self {
        let level = std::env::var("RUST_LOG")
            .ok()
            .and_then(|s| parse_level(&s))
            .unwrap_or(LevelFilter::Info);
        Self { level, file: None }
    }
}

/// Parses a level such as `"debug"`. Only the global level of a filter string like
/// `"warn,my_crate=debug"` is used.
pub fn parse_level(s: &str) -> Option<LevelFilter> {
    s.split(',')
        .map(str::trim)
        .filter(|directive| !directive.contains('='))
        .find_map(|directive| LevelFilter::from_str(directive).ok())
}

/// Installs the global logger. Fails if any logger, from here or elsewhere, is already installed.
pub fn init(config: LoggingConfig) -> Result<(), LoggingError> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {:<5} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(config.level)
        .chain(std::io::stderr());

    if let Some(path) = &config.file {
        let file = fern::log_file(path).map_err(|source| LoggingError::Io {
            path: path.clone(),
            source,
        })?;
        dispatch = dispatch.chain(file);
    }

    dispatch.apply()?;
    log::debug!("logging initialized at {}", config.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(LevelFilter::Debug));
        assert_eq!(parse_level("WARN"), Some(LevelFilter::Warn));
        assert_eq!(
            parse_level("gl_utilities=trace, error"),
            Some(LevelFilter::Error)
        );
        assert_eq!(parse_level("gl_utilities=trace"), None);
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_missing_log_directory() {
        let config = LoggingConfig {
            file: Some(PathBuf::from("/no/such/dir/gl.log")),
            ..LoggingConfig::default()
        };
        assert!(matches!(init(config), Err(LoggingError::Io { .. })));
    }

    #[test]
    fn test_init_is_one_shot() {
        let path = std::env::temp_dir().join(format!("gl-utilities-{}.log", std::process::id()));
        let config = LoggingConfig {
            level: LevelFilter::Debug,
            file: Some(path.clone()),
        };
        init(config.clone()).unwrap();
        log::info!("first line");
        assert!(matches!(
            init(config),
            Err(LoggingError::AlreadyInitialized(_))
        ));

        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(written.contains("first line"));
    }
}
