use colorful::Colorful;
use indenter::indented;

use std::fmt::Write;
use std::{fs::create_dir_all, path::PathBuf};
use tracing_subscriber::layer::SubscriberExt;

/// Terminal plus rolling-file tracing subscriber.
///
/// Terminal output goes to stderr so that anything a binary prints to stdout
/// (an emitted command line, for instance) stays clean. `RUST_LOG` overrides
/// `level`.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: tracing::Level,
    pub logging_enabled: bool,
    pub logger_name: String,
    /// Directory for hourly rotated log files. `None` disables the file layer.
    pub log_dir: Option<PathBuf>,
    pub _tracing_guard: Option<std::sync::Arc<tracing::subscriber::DefaultGuard>>,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Default::default()
    }

    /// `<data_local_dir>/<logger_name>/logs`, when the platform has one.
    pub fn default_log_dir(logger_name: &str) -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", logger_name)
            .map(|dirs| dirs.data_local_dir().join("logs"))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            logging_enabled: true,
            logger_name: "llm_tuner".to_string(),
            log_dir: Self::default_log_dir("llm_tuner"),
            _tracing_guard: None,
        }
    }
}

impl LoggingConfig {
    pub fn load_logger(&mut self) -> crate::Result<()> {
        self._tracing_guard = if self.logging_enabled {
            Some(std::sync::Arc::new(self.create_logger()?))
        } else {
            None
        };
        if self.logging_enabled && self.level >= tracing::Level::DEBUG {
            eprintln!(
                "{}",
                format!("Starting {} Logger", self.logger_name)
                    .color(colorful::RGB::new(0, 139, 248))
                    .bold()
            );
        }
        Ok(())
    }

    fn create_logger(&mut self) -> crate::Result<tracing::subscriber::DefaultGuard> {
        let filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(self.level.into())
            .from_env_lossy();

        let file_layer = match &self.log_dir {
            Some(log_dir) => {
                create_dir_all(log_dir).map_err(|e| {
                    crate::anyhow!("Failed to create log directory {}: {e}", log_dir.display())
                })?;
                let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
                    .rotation(tracing_appender::rolling::Rotation::HOURLY)
                    .max_log_files(6)
                    .filename_prefix(&self.logger_name)
                    .filename_suffix("log")
                    .build(log_dir)?;
                Some(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_ansi(false)
                        .with_writer(file_appender),
                )
            }
            None => None,
        };

        let terminal_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(false)
            .with_writer(std::io::stderr);

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(terminal_layer);

        Ok(tracing::subscriber::set_default(subscriber))
    }
}

impl LoggingConfigTrait for LoggingConfig {
    fn logging_config_mut(&mut self) -> &mut LoggingConfig {
        self
    }
}

pub trait LoggingConfigTrait {
    fn logging_config_mut(&mut self) -> &mut LoggingConfig;

    fn logging_enabled(mut self, enabled: bool) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().logging_enabled = enabled;
        self
    }

    fn logger_name<S: Into<String>>(mut self, logger_name: S) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().logger_name = logger_name.into();
        self
    }

    fn log_dir(mut self, log_dir: Option<PathBuf>) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().log_dir = log_dir;
        self
    }

    /// Sets the log level to DEBUG.
    ///
    /// Use DEBUG to log variables or decisions: which probe answered, which
    /// fallback table supplied a value, which context size the ladder settled on.
    fn log_level_debug(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::DEBUG;
        self
    }

    /// Sets the log level to INFO.
    fn log_level_info(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::INFO;
        self
    }

    /// Sets the log level to WARN.
    ///
    /// WARN is for recovered problems: a model that could not be optimized,
    /// a context size that only fits as a last resort.
    fn log_level_warn(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::WARN;
        self
    }
}

pub fn i_ln(f: &mut std::fmt::Formatter<'_>, arg: std::fmt::Arguments<'_>) -> std::fmt::Result {
    write!(indented(f), "{}", arg)?;
    Ok(())
}

pub fn i_nln(f: &mut std::fmt::Formatter<'_>, arg: std::fmt::Arguments<'_>) -> std::fmt::Result {
    writeln!(indented(f), "{}", arg)?;
    Ok(())
}

pub fn i_lns(
    f: &mut std::fmt::Formatter<'_>,
    args: &[std::fmt::Arguments<'_>],
) -> std::fmt::Result {
    for arg in args {
        write!(indented(f), "{}", arg)?;
    }
    Ok(())
}

pub fn i_nlns(
    f: &mut std::fmt::Formatter<'_>,
    args: &[std::fmt::Arguments<'_>],
) -> std::fmt::Result {
    for arg in args {
        writeln!(indented(f), "{}", arg)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_apply() {
        let config = LoggingConfig::new()
            .logger_name("tuner_test")
            .log_dir(None)
            .log_level_debug();
        assert_eq!(config.logger_name, "tuner_test");
        assert_eq!(config.level, tracing::Level::DEBUG);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn logger_without_file_layer_loads() {
        let mut config = LoggingConfig::new().log_dir(None).log_level_warn();
        config.load_logger().unwrap();
        assert!(config._tracing_guard.is_some());
    }
}
