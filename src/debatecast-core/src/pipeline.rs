//! Stage wiring for the HTTP endpoints and CLI commands.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;

use crate::analyzer::{DebateAnalysis, DebateAnalyzer, parse_analysis};
use crate::audio::{
    AudioRenderer, AudioSegment, ElevenLabsClient, SkippedLine, SpeechSynthesizer,
    clear_audio_files,
};
use crate::categorizer::{Categorization, Categorizer};
use crate::config::{Config, NewsConfig, StorageConfig};
use crate::error::{PipelineError, Result};
use crate::llm::{CompletionModel, OpenRouterClient};
use crate::news::{Article, NewsFetcher, format_for_categorization};
use crate::results::{save_result_json, write_json};
use crate::script::{ScriptGenerator, parse_script, save_script};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendingTopics {
    pub topics: Vec<String>,
}

/// Body of a successful `POST /api/analyze`.
///
/// With structured analysis it carries the script fields. Without it,
/// `data` holds the raw response envelope and `error` says why.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debate_data: Option<DebateAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub saved_to: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_files: Option<Vec<AudioSegment>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_audio: Vec<SkippedLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalyzeResponse {
    fn unstructured(raw: Value, saved_to: PathBuf, error: String) -> Self {
        Self {
            success: true,
            script: None,
            script_path: None,
            debate_data: None,
            data: Some(raw),
            saved_to,
            audio_files: None,
            skipped_audio: Vec::new(),
            error: Some(error),
        }
    }
}

/// One article as written to the categorization report.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleSummary {
    pub title: String,
    pub source: String,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<String>,
    pub url: String,
    pub description: String,
}

impl From<&Article> for ArticleSummary {
    fn from(article: &Article) -> Self {
        Self {
            title: article.title.clone(),
            source: article.source.clone(),
            published_at: article.published_at.clone(),
            url: article.url.clone(),
            description: article.description.clone(),
        }
    }
}

/// Output of a full categorization run.
#[derive(Debug, Clone)]
pub struct CategorizationRun {
    pub generated_at: DateTime<Local>,
    pub categorization: Categorization,
    pub saved_to: PathBuf,
}

#[derive(Serialize)]
struct CategorizationFile {
    generated_at: String,
    categories: BTreeMap<String, Vec<ArticleSummary>>,
    filtered_out: Vec<ArticleSummary>,
}

/// Every stage, built once from the configuration.
pub struct Pipeline {
    news: NewsFetcher,
    categorizer: Categorizer,
    analyzer: DebateAnalyzer,
    scripts: ScriptGenerator,
    audio: AudioRenderer,
    news_config: NewsConfig,
    storage: StorageConfig,
}

impl Pipeline {
    /// Build the pipeline against the real services.
    ///
    /// Missing API keys are not checked here; each stage reports its own
    /// missing key when invoked.
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.endpoints.timeout_secs);
        let llm = Arc::new(OpenRouterClient::new(
            config.keys.openrouter.clone(),
            &config.endpoints.openrouter,
            timeout,
        )?);
        let speech = Arc::new(ElevenLabsClient::new(
            config.keys.elevenlabs.clone(),
            &config.endpoints.elevenlabs,
            &config.voices,
            timeout,
        )?);
        Self::with_clients(config, llm, speech)
    }

    /// Build the pipeline with the given model and speech backends.
    pub fn with_clients(
        config: &Config,
        llm: Arc<dyn CompletionModel>,
        speech: Arc<dyn SpeechSynthesizer>,
    ) -> Result<Self> {
        let news = NewsFetcher::new(
            config.keys.news_api.clone(),
            &config.endpoints.news_api,
            Duration::from_secs(config.endpoints.timeout_secs),
        )?
        .with_limits(config.news.days_back, config.news.max_articles);

        Ok(Self {
            news,
            categorizer: Categorizer::new(llm.clone(), &config.models.categorization),
            analyzer: DebateAnalyzer::new(llm.clone(), &config.models.analysis),
            scripts: ScriptGenerator::new(llm, &config.models.script),
            audio: AudioRenderer::new(speech, config.voices.clone(), &config.storage.audio_dir),
            news_config: config.news.clone(),
            storage: config.storage.clone(),
        })
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// Trending topic labels from recent news, or the fallback list when
    /// anything goes wrong.
    pub async fn trending_topics(&self) -> TrendingTopics {
        let fallback = || TrendingTopics {
            topics: self.news_config.fallback_topics.clone(),
        };

        let articles = match self.news.fetch_recent(None).await {
            Ok(articles) if !articles.is_empty() => articles,
            Ok(_) => {
                tracing::info!("no articles found, using fallback topics");
                return fallback();
            }
            Err(e) => {
                tracing::warn!(error = %e, "news fetch failed, using fallback topics");
                return fallback();
            }
        };

        let summaries: Vec<String> = articles
            .iter()
            .take(self.news_config.summary_articles)
            .map(format_for_categorization)
            .collect();
        let labels = self
            .categorizer
            .generate_categories(&summaries, Some(self.news_config.num_categories))
            .await;

        if labels.labels.is_empty() {
            if let Some(error) = labels.error {
                tracing::warn!(%error, "topic generation failed, using fallback topics");
            }
            return fallback();
        }
        TrendingTopics {
            topics: labels.labels,
        }
    }

    /// Analyze a topic, write the script and render its audio.
    ///
    /// Errors are an empty topic (`Validation`), a failed analysis call, or
    /// a failure to save the raw analysis. Later stage failures are reported
    /// inside the response.
    pub async fn analyze(&self, topic: &str) -> Result<AnalyzeResponse> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PipelineError::Validation("Topic is required".to_string()));
        }

        let completion = self.analyzer.request(topic).await?;
        let saved_to = save_result_json(&self.storage.results_dir, topic, &completion.raw)?;

        let (analysis, script, script_path) = match self.write_script(&completion.content).await {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(error = %e, "script generation failed, returning raw analysis");
                return Ok(AnalyzeResponse::unstructured(
                    completion.raw,
                    saved_to,
                    format!("Script generation failed: {}", e),
                ));
            }
        };

        let mut response = AnalyzeResponse {
            success: true,
            script: Some(script.clone()),
            script_path: Some(script_path),
            debate_data: Some(analysis),
            data: None,
            saved_to,
            audio_files: None,
            skipped_audio: Vec::new(),
            error: None,
        };

        if self.storage.synthesize_audio {
            match self.synthesize(&script).await {
                Ok((segments, skipped)) => {
                    response.audio_files = Some(segments);
                    response.skipped_audio = skipped;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "audio synthesis failed");
                    response.error = Some(format!("Audio synthesis failed: {}", e));
                }
            }
        }

        Ok(response)
    }

    async fn write_script(
        &self,
        content: &str,
    ) -> std::result::Result<(DebateAnalysis, String, PathBuf), String> {
        let analysis = parse_analysis(content)?;
        let script = self
            .scripts
            .generate(&analysis)
            .await
            .map_err(|e| e.to_string())?;
        let path = save_script(&self.storage.script_file, &script).map_err(|e| e.to_string())?;
        Ok((analysis, script, path))
    }

    async fn synthesize(&self, script: &str) -> Result<(Vec<AudioSegment>, Vec<SkippedLine>)> {
        let parsed = parse_script(script);
        if parsed.is_empty() {
            return Err(PipelineError::Validation(
                "script contains no CARNEGIE or MELLON lines".to_string(),
            ));
        }
        self.audio.ready()?;
        let removed = clear_audio_files(self.audio.output_dir())?;
        if removed > 0 {
            tracing::debug!(removed, "cleared previous audio files");
        }
        let report = self.audio.render(&parsed.lines).await?;
        Ok((report.segments, report.skipped))
    }

    /// Fetch, label, categorize and refine recent news, then save the
    /// report to the results directory.
    pub async fn categorize_news(&self) -> Result<CategorizationRun> {
        let articles = self.news.fetch_recent(None).await?;
        if articles.is_empty() {
            return Err(PipelineError::Validation("No articles found".to_string()));
        }

        let summaries: Vec<String> = articles.iter().map(format_for_categorization).collect();
        let labels = self
            .categorizer
            .generate_categories(&summaries, Some(self.news_config.num_categories))
            .await;
        if labels.labels.is_empty() {
            return Err(PipelineError::Validation(
                labels
                    .error
                    .unwrap_or_else(|| "No categories generated".to_string()),
            ));
        }

        let categorization = self.categorizer.categorize(articles, &labels.labels).await?;
        let categorization = self.categorizer.refine(categorization).await;

        let generated_at = Local::now();
        let filename = format!(
            "categorized_articles_{}.json",
            generated_at.format("%Y%m%d_%H%M%S")
        );
        let saved_to = write_json(
            &self.storage.results_dir,
            &filename,
            &categorization_file(&categorization, generated_at),
        )?;

        Ok(CategorizationRun {
            generated_at,
            categorization,
            saved_to,
        })
    }
}

fn categorization_file(
    categorization: &Categorization,
    generated_at: DateTime<Local>,
) -> CategorizationFile {
    // Same-named categories share one key.
    let mut categories: BTreeMap<String, Vec<ArticleSummary>> = BTreeMap::new();
    for category in categorization.categories.iter().filter(|c| !c.articles.is_empty()) {
        categories
            .entry(category.name.clone())
            .or_default()
            .extend(category.articles.iter().map(ArticleSummary::from));
    }

    CategorizationFile {
        generated_at: generated_at.to_rfc3339(),
        categories,
        filtered_out: categorization
            .filtered_out
            .iter()
            .map(ArticleSummary::from)
            .collect(),
    }
}
