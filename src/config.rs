// src/config.rs
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageProviderKind {
    Placeholder,
    Replicate { api_token: String, model: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationProviderKind {
    Keywords,
    OpenAI { api_key: String, model: String },
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub assets_dir: PathBuf,
    pub output_dir: PathBuf,
    pub metrics_dir: PathBuf,
    pub worker_pool_size: usize,
    pub image_provider: ImageProviderKind,
    pub moderation_provider: ModerationProviderKind,
    pub api_timeout: Duration,
    pub download_timeout: Duration,
    pub max_upload_bytes: usize,
}

/// Raw settings as read from the environment, one field per variable.
#[derive(Debug, Deserialize)]
struct Settings {
    #[serde(default = "default_bind_addr")]
    bind_addr: String,
    #[serde(default = "default_assets_dir")]
    assets_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
    #[serde(default = "default_metrics_dir")]
    metrics_dir: PathBuf,
    #[serde(default = "default_worker_pool_size")]
    worker_pool_size: usize,
    #[serde(default = "default_image_provider")]
    image_provider: String,
    #[serde(default)]
    replicate_api_token: Option<String>,
    #[serde(default = "default_replicate_model")]
    replicate_model: String,
    #[serde(default = "default_moderation_provider")]
    moderation_provider: String,
    #[serde(default)]
    openai_api_key: Option<String>,
    #[serde(default = "default_openai_model")]
    openai_model: String,
    #[serde(default = "default_api_timeout_secs")]
    api_timeout_secs: u64,
    #[serde(default = "default_download_timeout_secs")]
    download_timeout_secs: u64,
    #[serde(default = "default_max_upload_bytes")]
    max_upload_bytes: usize,
}

fn default_bind_addr() -> String { "0.0.0.0:8080".to_string() }
fn default_assets_dir() -> PathBuf { PathBuf::from("assets") }
fn default_output_dir() -> PathBuf { PathBuf::from("output") }
fn default_metrics_dir() -> PathBuf { PathBuf::from("metrics") }
fn default_worker_pool_size() -> usize { 2 }
fn default_image_provider() -> String { "placeholder".to_string() }
fn default_replicate_model() -> String { "black-forest-labs/flux-dev".to_string() }
fn default_moderation_provider() -> String { "keywords".to_string() }
fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
fn default_api_timeout_secs() -> u64 { 30 }
fn default_download_timeout_secs() -> u64 { 60 }
fn default_max_upload_bytes() -> usize { 20 * 1024 * 1024 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            assets_dir: default_assets_dir(),
            output_dir: default_output_dir(),
            metrics_dir: default_metrics_dir(),
            worker_pool_size: default_worker_pool_size(),
            image_provider: ImageProviderKind::Placeholder,
            moderation_provider: ModerationProviderKind::Keywords,
            api_timeout: Duration::from_secs(default_api_timeout_secs()),
            download_timeout: Duration::from_secs(default_download_timeout_secs()),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::load(config::Environment::default())
    }

    fn load(environment: config::Environment) -> Result<Self, PipelineError> {
        let settings: Settings = config::Config::builder()
            .add_source(environment.try_parsing(true))
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        Self::from_settings(settings)
    }

    fn from_settings(settings: Settings) -> Result<Self, PipelineError> {
        let image_provider = match settings.image_provider.as_str() {
            "placeholder" => ImageProviderKind::Placeholder,
            "replicate" => ImageProviderKind::Replicate {
                api_token: settings.replicate_api_token.ok_or_else(|| {
                    PipelineError::Config(
                        "REPLICATE_API_TOKEN must be set when IMAGE_PROVIDER=replicate".to_string(),
                    )
                })?,
                model: settings.replicate_model,
            },
            other => {
                return Err(PipelineError::Config(format!(
                    "Unknown IMAGE_PROVIDER: {}",
                    other
                )));
            }
        };

        let moderation_provider = match settings.moderation_provider.as_str() {
            "keywords" => ModerationProviderKind::Keywords,
            "openai" => ModerationProviderKind::OpenAI {
                api_key: settings.openai_api_key.ok_or_else(|| {
                    PipelineError::Config(
                        "OPENAI_API_KEY must be set when MODERATION_PROVIDER=openai".to_string(),
                    )
                })?,
                model: settings.openai_model,
            },
            other => {
                return Err(PipelineError::Config(format!(
                    "Unknown MODERATION_PROVIDER: {}",
                    other
                )));
            }
        };

        if settings.worker_pool_size == 0 {
            return Err(PipelineError::Config(
                "WORKER_POOL_SIZE must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_addr: settings.bind_addr,
            assets_dir: settings.assets_dir,
            output_dir: settings.output_dir,
            metrics_dir: settings.metrics_dir,
            worker_pool_size: settings.worker_pool_size,
            image_provider,
            moderation_provider,
            api_timeout: Duration::from_secs(settings.api_timeout_secs),
            download_timeout: Duration::from_secs(settings.download_timeout_secs),
            max_upload_bytes: settings.max_upload_bytes,
        })
    }
}
