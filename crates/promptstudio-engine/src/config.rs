use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_SIMULATED_DELAY_MS: u64 = 2000;
pub const MAX_IMAGE_RETRIES: u8 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GenerationMode {
    #[default]
    Simulated,
    Live,
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GenerationMode::Simulated => "simulated",
            GenerationMode::Live => "live",
        })
    }
}

impl FromStr for GenerationMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "simulated" | "simulate" | "sim" => Ok(GenerationMode::Simulated),
            "live" | "real" => Ok(GenerationMode::Live),
            other => Err(anyhow!(
                "unknown generation mode '{other}' (expected simulated or live)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioConfig {
    pub generation: GenerationMode,
    pub api_key: Option<String>,
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub simulated_delay: Duration,
    pub image_retries: u8,
    /// `None` leaves requests without a deadline.
    pub request_timeout: Option<Duration>,
    pub events_path: Option<PathBuf>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            generation: GenerationMode::Simulated,
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            simulated_delay: Duration::from_millis(DEFAULT_SIMULATED_DELAY_MS),
            image_retries: MAX_IMAGE_RETRIES,
            request_timeout: None,
            events_path: None,
        }
    }
}

impl StudioConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads settings through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(raw) = read("PROMPTSTUDIO_GENERATION") {
            config.generation = raw.parse::<GenerationMode>().context("PROMPTSTUDIO_GENERATION")?;
        }
        config.api_key = read("GEMINI_API_KEY").or_else(|| read("GOOGLE_API_KEY"));
        if let Some(base) = read("GEMINI_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = read("PROMPTSTUDIO_TEXT_MODEL") {
            config.text_model = model;
        }
        if let Some(model) = read("PROMPTSTUDIO_IMAGE_MODEL") {
            config.image_model = model;
        }
        if let Some(raw) = read("PROMPTSTUDIO_SIMULATED_DELAY_MS") {
            let millis = raw
                .parse::<u64>()
                .with_context(|| format!("PROMPTSTUDIO_SIMULATED_DELAY_MS='{raw}'"))?;
            config.simulated_delay = Duration::from_millis(millis);
        }
        if let Some(raw) = read("PROMPTSTUDIO_IMAGE_RETRIES") {
            let retries = raw
                .parse::<u8>()
                .with_context(|| format!("PROMPTSTUDIO_IMAGE_RETRIES='{raw}'"))?;
            config.image_retries = retries.min(MAX_IMAGE_RETRIES);
        }
        if let Some(raw) = read("PROMPTSTUDIO_REQUEST_TIMEOUT_S") {
            let seconds = raw
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite() && *value > 0.0)
                .ok_or_else(|| anyhow!("PROMPTSTUDIO_REQUEST_TIMEOUT_S='{raw}' must be a positive number"))?;
            config.request_timeout = Some(Duration::from_secs_f64(seconds));
        }
        config.events_path = read("PROMPTSTUDIO_EVENTS").map(PathBuf::from);
        Ok(config)
    }

    pub fn with_generation(mut self, generation: GenerationMode) -> Self {
        self.generation = generation;
        self
    }
}
