//! Configuration types for figure extraction.
//!
//! All behaviour is controlled through [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. The output directory is part of the config
//! and is handed explicitly to every stage that writes; there is no global
//! upload folder.

use crate::error::FigureError;
use crate::pipeline::llm::InferenceCollaborator;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for one extraction run.
///
/// # Example
/// ```rust
/// use arxiv_figures::{ExtractionConfig, SampleStrategy};
///
/// let config = ExtractionConfig::builder()
///     .output_dir("figures")
///     .model("gemini-2.0-flash")
///     .sample_strategy(SampleStrategy::Figures)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM model identifier, e.g. "gemini-2.0-flash". If None, uses the
    /// provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "anthropic", "openai").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed collaborator. Takes precedence over every provider
    /// setting; used to plug in a non-LLM backend or a test double.
    pub collaborator: Option<Arc<dyn InferenceCollaborator>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Both calls ask for verbatim transcription into JSON; anything creative
    /// is a defect.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per call. Default: 8192.
    ///
    /// A survey paper can carry 40+ figures with multi-sentence captions.
    pub max_tokens: usize,

    /// Custom caption instruction. If None, uses the built-in one.
    pub caption_prompt: Option<String>,

    /// Characters of LaTeX sent to the matching call. Default: 1000.
    pub source_sample_chars: usize,

    /// How the LaTeX sample is chosen. Default: [`SampleStrategy::Prefix`].
    pub sample_strategy: SampleStrategy,

    /// File-name suffixes treated as LaTeX source. Default: `[".tex"]`.
    pub source_suffixes: Vec<String>,

    /// Directory receiving images and metadata. Default: `uploads`.
    pub output_dir: PathBuf,

    /// Base URL of the arXiv mirror. Default: `https://arxiv.org`.
    pub arxiv_base_url: String,

    /// Download timeout for the source archive and PDF, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per collaborator call timeout in seconds. Default: 120.
    ///
    /// The caption call uploads a whole PDF; small models answer in ~10 s,
    /// large ones can take a minute on a long paper.
    pub api_timeout_secs: u64,

    /// Optional progress callback for stage and per-figure events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            collaborator: None,
            temperature: 0.1,
            max_tokens: 8192,
            caption_prompt: None,
            source_sample_chars: 1000,
            sample_strategy: SampleStrategy::default(),
            source_suffixes: vec![".tex".to_string()],
            output_dir: PathBuf::from("uploads"),
            arxiv_base_url: "https://arxiv.org".to_string(),
            download_timeout_secs: 120,
            api_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "collaborator",
                &self.collaborator.as_ref().map(|_| "<dyn InferenceCollaborator>"),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("source_sample_chars", &self.source_sample_chars)
            .field("sample_strategy", &self.sample_strategy)
            .field("source_suffixes", &self.source_suffixes)
            .field("output_dir", &self.output_dir)
            .field("arxiv_base_url", &self.arxiv_base_url)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn collaborator(mut self, collaborator: Arc<dyn InferenceCollaborator>) -> Self {
        self.config.collaborator = Some(collaborator);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn caption_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.caption_prompt = Some(prompt.into());
        self
    }

    pub fn source_sample_chars(mut self, n: usize) -> Self {
        self.config.source_sample_chars = n;
        self
    }

    pub fn sample_strategy(mut self, strategy: SampleStrategy) -> Self {
        self.config.sample_strategy = strategy;
        self
    }

    /// Replace the recognised source suffixes. Suffixes are matched
    /// case-sensitively against the full entry name.
    pub fn source_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.source_suffixes = suffixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn arxiv_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.arxiv_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, FigureError> {
        let c = &self.config;
        if c.source_sample_chars == 0 {
            return Err(FigureError::InvalidConfig(
                "Source sample must be at least 1 character".into(),
            ));
        }
        if c.source_suffixes.is_empty() || c.source_suffixes.iter().any(|s| s.is_empty()) {
            return Err(FigureError::InvalidConfig(
                "At least one non-empty source suffix is required".into(),
            ));
        }
        if c.download_timeout_secs == 0 || c.api_timeout_secs == 0 {
            return Err(FigureError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.output_dir.as_os_str().is_empty() {
            return Err(FigureError::InvalidConfig("Output directory is empty".into()));
        }
        if let Err(e) = reqwest::Url::parse(&c.arxiv_base_url) {
            return Err(FigureError::InvalidConfig(format!(
                "arXiv base URL '{}' is not a valid URL: {}",
                c.arxiv_base_url, e
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the LaTeX excerpt for the matching call is chosen.
///
/// | Strategy | Excerpt |
/// |----------|---------|
/// | `Prefix` | first N characters of the concatenated source (default) |
/// | `Figures` | figure environments and `\includegraphics` lines first, topped up with the prefix |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStrategy {
    #[default]
    Prefix,
    Figures,
}
