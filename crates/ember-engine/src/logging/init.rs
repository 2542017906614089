use std::sync::Once;

use log::LevelFilter;

/// Logger configuration.
///
/// `env_filter` uses `env_logger` syntax (e.g. "ember_engine=trace,wgpu=warn")
/// and wins over `RUST_LOG`. Without either, `level` applies to everything and
/// the wgpu backend crates are capped at `gpu_backend_level`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub level: LevelFilter,
    pub gpu_backend_level: LevelFilter,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            level: LevelFilter::Info,
            gpu_backend_level: LevelFilter::Warn,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

const GPU_BACKEND_CRATES: [&str; 3] = ["wgpu_core", "wgpu_hal", "naga"];

impl LoggingConfig {
    /// Filter used when neither `env_filter` nor `RUST_LOG` is set.
    fn default_filter(&self) -> String {
        let backend = self.gpu_backend_level.min(self.level);
        let mut filter = self.level.to_string().to_lowercase();
        for krate in GPU_BACKEND_CRATES {
            filter.push_str(&format!(",{krate}={}", backend.to_string().to_lowercase()));
        }
        filter
    }
}

static INIT: Once = Once::new();

/// Installs the global logger. Later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = config
            .env_filter
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| config.default_filter());

        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&filter);
        builder.write_style(config.write_style);
        if builder.try_init().is_err() {
            log::warn!("a logger was already installed, keeping it");
            return;
        }

        log::debug!("logging initialized ({filter})");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_quiets_backend() {
        let config = LoggingConfig::default();
        assert_eq!(config.default_filter(), "info,wgpu_core=warn,wgpu_hal=warn,naga=warn");
    }

    #[test]
    fn backend_never_louder_than_global_level() {
        let config = LoggingConfig {
            level: LevelFilter::Error,
            ..LoggingConfig::default()
        };
        assert_eq!(config.default_filter(), "error,wgpu_core=error,wgpu_hal=error,naga=error");
    }
}
