use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "GEOCAD_CONFIG";

/// 应用配置的根结构。转换结果只由请求中的转换选项决定，与这里无关。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 按顺序查找配置：显式路径、环境变量 `GEOCAD_CONFIG`、`./config/default.toml`。
    /// 都不存在时返回默认配置。
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.server.socket_addr()?;
        if self.server.progress_poll_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "server.progress_poll_ms",
                message: "必须大于 0".to_string(),
            });
        }
        if self.jobs.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "jobs.sweep_interval_secs",
                message: "必须大于 0".to_string(),
            });
        }
        Ok(())
    }
}

/// 日志配置，`level` 为 `EnvFilter` 语法。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_bind")]
    pub bind: String,
    #[serde(default = "ServerConfig::default_body_limit_mb")]
    pub body_limit_mb: usize,
    #[serde(default = "ServerConfig::default_progress_poll_ms")]
    pub progress_poll_ms: u64,
}

impl ServerConfig {
    fn default_bind() -> String {
        "127.0.0.1:3000".to_string()
    }

    fn default_body_limit_mb() -> usize {
        50
    }

    fn default_progress_poll_ms() -> u64 {
        500
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind.parse().map_err(|_| ConfigError::Invalid {
            field: "server.bind",
            message: format!("无法解析监听地址 `{}`", self.bind),
        })
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_mb.saturating_mul(1024 * 1024)
    }

    pub fn progress_poll(&self) -> Duration {
        Duration::from_millis(self.progress_poll_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
            body_limit_mb: Self::default_body_limit_mb(),
            progress_poll_ms: Self::default_progress_poll_ms(),
        }
    }
}

/// 任务保留与清理周期。
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "JobsConfig::default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "JobsConfig::default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl JobsConfig {
    fn default_retention_secs() -> u64 {
        15 * 60
    }

    fn default_sweep_interval_secs() -> u64 {
        60
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: Self::default_retention_secs(),
            sweep_interval_secs: Self::default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置项 {field} 无效: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.server.bind, "127.0.0.1:3000");
        assert_eq!(cfg.server.body_limit_bytes(), 50 * 1024 * 1024);
        assert_eq!(cfg.server.progress_poll(), Duration::from_millis(500));
        assert_eq!(cfg.jobs.retention(), Duration::from_secs(900));
        assert_eq!(cfg.jobs.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn explicit_path_wins_during_discovery() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [server]
            bind = "0.0.0.0:8080"
            body_limit_mb = 10

            [jobs]
            retention_secs = 120
            "#
        )
        .expect("写入临时配置");

        let cfg = AppConfig::discover(Some(file.path())).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(
            cfg.server.socket_addr().expect("地址合法").port(),
            8080
        );
        assert_eq!(cfg.server.body_limit_mb, 10);
        assert_eq!(cfg.server.progress_poll_ms, 500, "缺省字段取默认值");
        assert_eq!(cfg.jobs.retention(), Duration::from_secs(120));
        assert_eq!(cfg.jobs.sweep_interval_secs, 60);
    }

    #[test]
    fn partial_file_uses_defaults_for_missing_sections() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[logging]\nlevel = \"warn\"").expect("写入临时配置");
        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "warn");
        assert_eq!(cfg.jobs.retention_secs, 900);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[server]\nbind = \"not an address\"").expect("写入临时配置");
        let err = AppConfig::from_file(file.path()).expect_err("非法地址应报错");
        assert!(matches!(err, ConfigError::Invalid { field: "server.bind", .. }));

        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[jobs]\nsweep_interval_secs = 0").expect("写入临时配置");
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::Invalid { field: "jobs.sweep_interval_secs", .. })
        ));
    }

    #[test]
    fn malformed_toml_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[server\nbind = 1").expect("写入临时配置");
        let err = AppConfig::from_file(file.path()).expect_err("语法错误");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("解析配置文件"));
    }

    #[test]
    fn missing_explicit_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("临时目录");
        let missing = dir.path().join("absent.toml");
        let err = AppConfig::discover(Some(&missing)).expect_err("文件不存在");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
