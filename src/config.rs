//! Runtime configuration, read from the environment with `.env` fallback for the API key

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_OUTPUT: &str = "output-vega-lite-dashboard.html";
pub const DEFAULT_TITLE: &str = "Vega-Lite Visualizations Dashboard";
const API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            temperature: 0.3,
            max_tokens: 2000,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_path: PathBuf,
    pub title: String,
    pub model: ModelConfig,
    /// Extra attempts after a failed artifact write
    pub write_retries: u32,
    pub retry_backoff_ms: u64,
    pub sample_rows: usize,
    pub port: u16,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            title: DEFAULT_TITLE.to_string(),
            model: ModelConfig::default(),
            write_retries: 3,
            retry_backoff_ms: 200,
            sample_rows: 5,
            port: 8082,
        }
    }
}

impl PipelineConfig {
    /// Load from process environment; the API key may also come from `./.env`
    pub fn from_env() -> Result<Self> {
        let dotenv = read_dotenv(Path::new(".env"))?;
        Self::from_lookup(|name| std::env::var(name).ok(), dotenv.as_deref())
    }

    /// Build from an arbitrary variable lookup plus optional `.env` contents
    pub fn from_lookup<F>(lookup: F, dotenv: Option<&str>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let api_key = lookup(API_KEY_VAR)
            .filter(|k| !k.trim().is_empty())
            .or_else(|| dotenv.and_then(|text| dotenv_value(text, API_KEY_VAR)));

        Ok(Self {
            output_path: lookup("CHARTFORGE_OUTPUT")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_path),
            title: lookup("CHARTFORGE_TITLE").unwrap_or(defaults.title),
            model: ModelConfig {
                base_url: lookup("CHARTFORGE_MODEL_URL").unwrap_or(defaults.model.base_url),
                api_key,
                model: lookup("CHARTFORGE_MODEL").unwrap_or(defaults.model.model),
                temperature: parse_var(&lookup, "CHARTFORGE_TEMPERATURE", defaults.model.temperature)?,
                max_tokens: parse_var(&lookup, "CHARTFORGE_MAX_TOKENS", defaults.model.max_tokens)?,
                timeout_secs: parse_var(&lookup, "CHARTFORGE_TIMEOUT_SECS", defaults.model.timeout_secs)?,
            },
            write_retries: parse_var(&lookup, "CHARTFORGE_WRITE_RETRIES", defaults.write_retries)?,
            retry_backoff_ms: parse_var(&lookup, "CHARTFORGE_RETRY_BACKOFF_MS", defaults.retry_backoff_ms)?,
            sample_rows: parse_var(&lookup, "CHARTFORGE_SAMPLE_ROWS", defaults.sample_rows)?,
            port: parse_var(&lookup, "CHARTFORGE_PORT", defaults.port)?,
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", name, raw)),
        None => Ok(default),
    }
}

fn read_dotenv(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Value of the first `NAME=value` line
fn dotenv_value(text: &str, name: &str) -> Option<String> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix(name)?.strip_prefix('='))
        .map(|v| v.trim().trim_matches('"').to_string())
        .find(|v| !v.is_empty())
}
