use crate::evaluation::{
    Evaluator, FixtureEvaluator, GeminiEvaluator, DEFAULT_GEMINI_ENDPOINT, DEFAULT_GEMINI_MODEL,
};
use crate::imaging::{NormalizeOptions, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_WIDTH};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for graderd
#[derive(Parser, Debug, Clone)]
#[command(name = "graderd")]
#[command(about = "Handwriting grading sidecar: classes, students, evaluations and backups over stdio")]
#[command(version)]
pub struct Args {
    /// Workspace directory to open at startup
    #[arg(long, env = "GRADERD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// API key for the Gemini evaluation service
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GRADERD_GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    pub gemini_model: String,

    #[arg(long, env = "GRADERD_GEMINI_ENDPOINT", default_value = DEFAULT_GEMINI_ENDPOINT)]
    pub gemini_endpoint: String,

    /// Timeout for one evaluation call
    #[arg(long, env = "GRADERD_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Work images wider than this are scaled down
    #[arg(long, env = "GRADERD_IMAGE_MAX_WIDTH", default_value_t = DEFAULT_MAX_WIDTH)]
    pub image_max_width: u32,

    /// JPEG quality for stored work images (1-100)
    #[arg(long, env = "GRADERD_IMAGE_QUALITY", default_value_t = DEFAULT_JPEG_QUALITY,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    pub image_quality: u8,

    /// Serve evaluations from this JSON file instead of calling Gemini
    #[arg(long, env = "GRADERD_EVALUATION_FIXTURE")]
    pub evaluation_fixture: Option<PathBuf>,
}

impl Args {
    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            max_width: self.image_max_width.max(1),
            quality: self.image_quality,
        }
    }

    /// Fixture takes precedence over the API key. `None` when neither is set.
    pub fn build_evaluator(&self) -> anyhow::Result<Option<Box<dyn Evaluator>>> {
        if let Some(path) = &self.evaluation_fixture {
            return Ok(Some(Box::new(FixtureEvaluator::new(path.clone()))));
        }
        let Some(key) = self.gemini_api_key.as_ref().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        let gemini = GeminiEvaluator::new(
            self.gemini_endpoint.clone(),
            self.gemini_model.clone(),
            key.trim(),
            Duration::from_secs(self.request_timeout_secs),
        )?;
        Ok(Some(Box::new(gemini)))
    }
}
