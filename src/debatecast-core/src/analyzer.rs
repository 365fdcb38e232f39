//! Two-sided debate analysis through a search-augmented model.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::{Completion, CompletionModel, CompletionRequest, parse_json_reply};
use crate::persona::Persona;

/// One side of the debate as returned by the analysis model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateSide {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateAnalysis {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub sides: Vec<DebateSide>,
}

impl DebateAnalysis {
    /// The side a persona argues, matched by label substring.
    pub fn side_for(&self, persona: Persona) -> Option<&DebateSide> {
        let wanted = persona.side_label();
        self.sides
            .iter()
            .find(|s| s.label.to_lowercase().contains(wanted))
    }

    /// All cited sources, liberal side first, without duplicates.
    pub fn sources(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for persona in Persona::ALL {
            if let Some(side) = self.side_for(persona) {
                for source in &side.sources {
                    if !out.contains(&source.as_str()) {
                        out.push(source);
                    }
                }
            }
        }
        out
    }
}

pub struct DebateAnalyzer {
    model: Arc<dyn CompletionModel>,
    model_name: String,
}

impl DebateAnalyzer {
    pub fn new(model: Arc<dyn CompletionModel>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
        }
    }

    /// Ask the search model for both sides of `topic`.
    pub async fn request(&self, topic: &str) -> Result<Completion> {
        let request = CompletionRequest::new(&self.model_name, analysis_prompt(topic))
            .with_temperature(0.0);
        tracing::info!(topic, model = %self.model_name, "requesting debate analysis");
        self.model.complete(request).await
    }
}

fn analysis_prompt(topic: &str) -> String {
    let topic_json = serde_json::to_string(topic).unwrap_or_else(|_| format!("\"{}\"", topic));
    format!(
        r#"Explain the current debate between liberals and conservatives on the topic: {topic_json}. Don't be afraid to be opinionated.
Return **only valid JSON** describing both sides of the issue, with explicit stance labels. Use this schema exactly:
{{
  "topic": {topic_json},
  "sides": [
    {{
      "id": "A",
      "label": "liberal",
      "arguments": ["arguments for a liberal side", ...],
      "sources": ["url1", "url2", ...]
    }},
    {{
      "id": "B",
      "label": "conservative",
      "arguments": ["arguments for a conservative side", ...],
      "sources": ["url1", "url2", ...]
    }}
  ]
}}
Make sure all arguments are concise and supported by citations from RECENT sources."#
    )
}

/// Best-effort parse of the analysis reply.
///
/// Fails when the text holds no JSON object of the expected shape or when
/// the object has no sides at all.
pub fn parse_analysis(text: &str) -> std::result::Result<DebateAnalysis, String> {
    let analysis: DebateAnalysis =
        parse_json_reply(text, '{', '}').map_err(|e| format!("invalid analysis JSON: {}", e))?;
    if analysis.sides.is_empty() {
        return Err("analysis contains no sides".to_string());
    }
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    const ANALYSIS: &str = r#"{
        "topic": "Government shutdown",
        "sides": [
            {"id": "A", "label": "liberal", "arguments": ["Protect federal workers"], "sources": ["https://a.example", "https://shared.example"]},
            {"id": "B", "label": "Conservative", "arguments": ["Cut spending"], "sources": ["https://shared.example", "https://b.example"]}
        ]
    }"#;

    #[test]
    fn test_parse_fenced_analysis() {
        let reply = format!("```json\n{}\n```", ANALYSIS);
        let analysis = parse_analysis(&reply).unwrap();

        assert_eq!(analysis.topic, "Government shutdown");
        assert_eq!(
            analysis.side_for(Persona::Mellon).unwrap().arguments,
            vec!["Cut spending"]
        );
        assert_eq!(
            analysis.sources(),
            vec!["https://a.example", "https://shared.example", "https://b.example"]
        );
    }

    #[test]
    fn test_parse_analysis_with_citation_markers_around_json() {
        let reply = format!("Here is the analysis [1][2]:\n{}\nSources follow.", ANALYSIS);
        assert!(parse_analysis(&reply).is_ok());
    }

    #[test]
    fn test_parse_analysis_rejects_prose() {
        let err = parse_analysis("Liberals think X, conservatives think Y.").unwrap_err();
        assert!(err.contains("invalid analysis JSON"));
    }

    #[test]
    fn test_parse_analysis_without_topic() {
        let reply = r#"{"sides": [{"id": "A", "label": "liberal", "arguments": ["Fund it"], "sources": []}]}"#;
        let analysis = parse_analysis(reply).unwrap();

        assert_eq!(analysis.topic, "");
        assert_eq!(analysis.sides.len(), 1);
    }

    #[test]
    fn test_parse_analysis_rejects_missing_sides() {
        let err = parse_analysis(r#"{"topic": "x", "sides": []}"#).unwrap_err();
        assert_eq!(err, "analysis contains no sides");
    }

    #[tokio::test]
    async fn test_request_uses_search_model_at_zero_temperature() {
        let model = Arc::new(ScriptedModel::new().reply(ANALYSIS));
        let analyzer = DebateAnalyzer::new(model.clone(), "perplexity/sonar-pro-search");

        let completion = analyzer.request("Government \"shutdown\"").await.unwrap();

        assert_eq!(completion.content, ANALYSIS);
        let request = &model.requests()[0];
        assert_eq!(request.model, "perplexity/sonar-pro-search");
        assert_eq!(request.temperature, 0.0);
        assert!(request.prompt.contains(r#""topic": "Government \"shutdown\"""#));
    }
}
