use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

const CONFIG_FILE_NAME: &str = "config.json";
const PLACEHOLDER_KEY_PREFIX: &str = "your_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    DeepSeek,
    SiliconFlow,
    Aliyun,
    GitHub,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        Self::DeepSeek,
        Self::SiliconFlow,
        Self::Aliyun,
        Self::GitHub,
    ];

    pub fn default_api_url(self) -> &'static str {
        match self {
            Self::DeepSeek => "https://api.deepseek.com/chat/completions",
            Self::SiliconFlow => "https://api.siliconflow.cn/v1/chat/completions",
            Self::Aliyun => {
                "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
            }
            Self::GitHub => "https://models.inference.ai.azure.com/chat/completions",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek-chat",
            Self::SiliconFlow => "deepseek-ai/DeepSeek-V3",
            Self::Aliyun => "qwen-plus",
            Self::GitHub => "gpt-4o",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeepSeek => write!(f, "deepseek"),
            Self::SiliconFlow => write!(f, "siliconflow"),
            Self::Aliyun => write!(f, "aliyun"),
            Self::GitHub => write!(f, "github"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deepseek" => Ok(Self::DeepSeek),
            "siliconflow" => Ok(Self::SiliconFlow),
            "aliyun" => Ok(Self::Aliyun),
            "github" => Ok(Self::GitHub),
            other => Err(AppError::Config(format!("unsupported provider: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_secret: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub default_provider: String,
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let providers = ProviderKind::ALL
            .into_iter()
            .map(|kind| {
                let mut config = ProviderConfig {
                    api_key: format!("{PLACEHOLDER_KEY_PREFIX}{kind}_api_key_here"),
                    ..Default::default()
                };
                match kind {
                    ProviderKind::Aliyun => {
                        config.api_secret =
                            format!("{PLACEHOLDER_KEY_PREFIX}{kind}_api_secret_here");
                    }
                    ProviderKind::GitHub => {
                        config.api_url = kind.default_api_url().to_string();
                        config.model_name = kind.default_model().to_string();
                    }
                    ProviderKind::DeepSeek | ProviderKind::SiliconFlow => {}
                }
                (kind.to_string(), config)
            })
            .collect();

        Self {
            default_provider: ProviderKind::DeepSeek.to_string(),
            providers,
        }
    }
}

/// Endpoint, credentials and model for one provider, with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub kind: ProviderKind,
    pub api_url: String,
    pub api_key: String,
    pub model_name: String,
}

impl AppConfig {
    /// Looks up a provider by name. An empty or missing name selects
    /// `default_provider`.
    pub fn provider(&self, name: Option<&str>) -> Result<ResolvedProvider, AppError> {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(self.default_provider.as_str());
        let kind: ProviderKind = name.parse()?;
        let config = self
            .providers
            .get(name)
            .or_else(|| self.providers.get(&kind.to_string()))
            .ok_or_else(|| AppError::Config(format!("unsupported provider: {name}")))?;

        let api_key = config.api_key.trim();
        if api_key.is_empty() || api_key.starts_with(PLACEHOLDER_KEY_PREFIX) {
            return Err(AppError::Config(format!(
                "no API key configured for provider {kind}"
            )));
        }

        let or_default = |value: &str, default: &str| {
            let value = value.trim();
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };

        Ok(ResolvedProvider {
            kind,
            api_url: or_default(&config.api_url, kind.default_api_url()),
            api_key: api_key.to_string(),
            model_name: or_default(&config.model_name, kind.default_model()),
        })
    }
}

pub fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "filesort")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

pub fn save_config(config: &AppConfig, path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    config.serialize(&mut serializer)?;
    fs::write(path, buf)?;
    Ok(())
}

/// Reads the config at `path`, writing the defaults there first if the file
/// does not exist yet.
pub fn load_or_init_config(path: &Path) -> Result<AppConfig, AppError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            let config = AppConfig::default();
            save_config(&config, path).map_err(|e| {
                AppError::Config(format!(
                    "failed to create default config at {}: {e}",
                    path.display()
                ))
            })?;
            tracing::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }
        Err(err) => {
            return Err(AppError::Config(format!(
                "failed to read {}: {err}",
                path.display()
            )))
        }
    };

    serde_json::from_str(&data)
        .map_err(|e| AppError::Config(format!("failed to parse {}: {e}", path.display())))
}
