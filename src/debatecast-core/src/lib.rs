//! Debatecast Core Library
//!
//! News fetching, topic categorization, two-sided debate analysis, dialogue
//! script generation and speech synthesis for the debatecast service.

pub mod analyzer;
pub mod audio;
pub mod categorizer;
pub mod config;
pub mod error;
pub mod llm;
pub mod news;
pub mod persona;
pub mod pipeline;
pub mod results;
pub mod script;

#[cfg(test)]
mod testing;

pub use analyzer::{DebateAnalysis, DebateAnalyzer, DebateSide, parse_analysis};
pub use audio::{
    AudioEvent, AudioFileEntry, AudioRenderer, AudioReport, AudioSegment, ElevenLabsClient,
    FailurePolicy, SpeechSynthesizer, Voice, audio_content_type, list_audio_files,
};
pub use categorizer::{Categorization, Category, CategoryLabels, Categorizer};
pub use config::{Config, default_config};
pub use error::PipelineError;
pub use llm::{Completion, CompletionModel, CompletionRequest, OpenRouterClient};
pub use news::{Article, NewsFetcher};
pub use persona::Persona;
pub use pipeline::{AnalyzeResponse, CategorizationRun, Pipeline, TrendingTopics};
pub use script::{ParsedScript, ScriptGenerator, ScriptLine, parse_script};
