//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// 日志级别（trace/debug/info/warn/error）
    pub log_level: String,
    /// 是否以 JSON 格式输出日志
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// 规则引擎配置
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// 是否记录每条检查的评估明细
    pub trace_checks: bool,
    /// 加载规则时是否将创作期警告写入日志
    pub log_authoring_warnings: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trace_checks: false,
            log_authoring_warnings: true,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    pub service_name: Option<String>,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl AppConfig {
    /// 加载配置
    ///
    /// 依次合并：默认值 -> config/{service_name}.toml（可选）-> ARENA_ 前缀环境变量。
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.toml", service_name);

        let mut builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("observability.log_level", "info")?
            .set_default("observability.json_logs", false)?
            .set_default("engine.trace_checks", false)?
            .set_default("engine.log_authoring_warnings", true)?;

        if Path::new(&config_path).exists() {
            builder = builder.add_source(File::with_name(&config_path));
        }

        builder = builder.add_source(
            Environment::with_prefix("ARENA")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.observability.log_level, "info");
        assert!(!config.observability.json_logs);
        assert!(!config.engine.trace_checks);
        assert!(config.engine.log_authoring_warnings);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load("nonexistent-service").unwrap();
        assert_eq!(config.service_name.as_deref(), Some("nonexistent-service"));
        assert_eq!(config.observability.log_level, "info");
    }
}
