// velo_client/src/config.rs

//! `velo-client` 的配置管理模块。
//!
//! 配置以 JSON 文件保存，所有字段都有默认值，因此文件中只需写出需要覆盖的部分。
//! 环境变量 `VELO_TELEMETRY_URL` 优先于文件中的服务端地址。

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::backoff::BackoffPolicy;
use crate::channel::ConnectOptions;

/// 默认配置文件名，相对于当前工作目录。
pub const DEFAULT_CONFIG_FILE: &str = "velo_client_config.json";
/// 覆盖遥测服务端地址的环境变量。
pub const TELEMETRY_URL_ENV: &str = "VELO_TELEMETRY_URL";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
    pub jitter: f64,
    /// 连续失败次数上限，缺省表示不限。
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            factor: 2.0,
            jitter: 0.5,
            max_attempts: None,
        }
    }
}

impl BackoffConfig {
    pub fn to_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            factor: self.factor,
            jitter: self.jitter,
            max_attempts: self.max_attempts,
        }
    }
}

/// 遥测通道配置。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// 遥测服务地址，例如 `"https://fleet.example.com"`。
    pub endpoint: String,
    pub path: String,
    pub transports: Vec<String>,
    pub reconnection: bool,
    pub backoff: BackoffConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let options = ConnectOptions::default();
        Self {
            endpoint: "http://127.0.0.1:3000".to_string(),
            path: options.path,
            transports: options.transports,
            reconnection: options.reconnection,
            backoff: BackoffConfig::default(),
        }
    }
}

impl TelemetryConfig {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            path: self.path.clone(),
            transports: self.transports.clone(),
            reconnection: self.reconnection,
            backoff: self.backoff.to_policy(),
        }
    }
}

/// 会话凭证来源配置。
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// 保存 cookie 串的文件；缺省时客户端以无凭证状态运行。
    pub cookie_file: Option<PathBuf>,
}

/// 应用的主配置结构体。
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub telemetry: TelemetryConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    /// 从指定文件加载配置，并应用环境变量覆盖。
    ///
    /// # Errors
    /// 文件无法读取或内容不是有效的配置 JSON 时返回带上下文的错误。
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件 '{}'", path.display()))?;
        let mut config: AppConfig = serde_json::from_str(&content).with_context(|| {
            format!(
                "解析配置文件 '{}' 失败，请确认内容是符合 {} 结构的 JSON",
                path.display(),
                std::any::type_name::<AppConfig>()
            )
        })?;
        info!("[VeloClient] 已从 '{}' 加载配置", path.display());
        config.apply_env_overrides();
        Ok(config)
    }

    /// 文件存在时同 [`AppConfig::load_from`]；文件不存在时使用默认配置。
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load_from(path);
        }
        info!("[VeloClient] 配置文件 '{}' 不存在，使用默认配置", path.display());
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_endpoint_override(std::env::var(TELEMETRY_URL_ENV).ok());
    }

    fn apply_endpoint_override(&mut self, endpoint: Option<String>) {
        if let Some(endpoint) = endpoint.filter(|value| !value.trim().is_empty()) {
            info!("[VeloClient] 环境变量 {} 覆盖遥测服务地址: {}", TELEMETRY_URL_ENV, endpoint);
            self.telemetry.endpoint = endpoint;
        }
    }
}
