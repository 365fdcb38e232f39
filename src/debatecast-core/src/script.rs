//! Dialogue script generation and speaker-tag parsing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analyzer::DebateAnalysis;
use crate::error::Result;
use crate::llm::{CompletionModel, CompletionRequest, strip_reasoning};
use crate::persona::Persona;

const SCRIPT_SYSTEM_PROMPT: &str = "You are a news content creator who likes to present information on how two sides of the political spectrum view a topic in the world. There are two sides, Carnegie and Mellon where Mellon represents a conservative side and Carnegie represents the liberal side. Create a transcript that mimics a conversation between Carnegie and Mellon debating this topic from the file inputted in the previous step. Make the points snappy and short, easy to digest for general audiences.";

/// `CARNEGIE:`, `Carnegie:`, `**Carnegie:**` and `**Carnegie**:` at line start.
const SPEAKER_TAG: &str =
    r"(?i)^(?:\*\*)?\s*(carnegie|mellon)\s*(?:\*\*)?\s*:\s*(?:\*\*)?\s*(.*)$";

/// One spoken turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptLine {
    pub speaker: Persona,
    pub text: String,
}

/// Why a piece of script text did not become a [`ScriptLine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Text before the first speaker tag.
    NoSpeaker,
    /// A speaker tag with nothing said after it.
    EmptyTurn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedLine {
    /// 1-based line number in the script text.
    pub line_number: usize,
    pub content: String,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedScript {
    pub lines: Vec<ScriptLine>,
    pub dropped: Vec<DroppedLine>,
}

impl ParsedScript {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn count_for(&self, persona: Persona) -> usize {
        self.lines.iter().filter(|l| l.speaker == persona).count()
    }
}

/// Parse script text into speaker turns.
///
/// Untagged lines continue the current turn. Nothing is dropped silently:
/// text before the first tag and tags with no words are listed in
/// [`ParsedScript::dropped`].
pub fn parse_script(script_text: &str) -> ParsedScript {
    struct Turn {
        speaker: Persona,
        line_number: usize,
        tag_line: String,
        words: Vec<String>,
    }

    let mut parsed = ParsedScript::default();
    let mut current: Option<Turn> = None;
    let tag_re = match Regex::new(SPEAKER_TAG) {
        Ok(re) => re,
        Err(e) => {
            tracing::error!(error = %e, "speaker tag pattern failed to compile");
            return parsed;
        }
    };

    let finish = |turn: Turn, parsed: &mut ParsedScript| {
        if turn.words.is_empty() {
            parsed.dropped.push(DroppedLine {
                line_number: turn.line_number,
                content: turn.tag_line,
                reason: DropReason::EmptyTurn,
            });
        } else {
            parsed.lines.push(ScriptLine {
                speaker: turn.speaker,
                text: turn.words.join(" "),
            });
        }
    };

    for (idx, raw_line) in script_text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = tag_re.captures(line) {
            if let Some(turn) = current.take() {
                finish(turn, &mut parsed);
            }
            let speaker = Persona::from_tag(&caps[1]).unwrap_or(Persona::Carnegie);
            let text = clean_text(&caps[2]);
            current = Some(Turn {
                speaker,
                line_number: idx + 1,
                tag_line: line.to_string(),
                words: if text.is_empty() { Vec::new() } else { vec![text] },
            });
            continue;
        }

        match current.as_mut() {
            Some(turn) => {
                let text = clean_text(line);
                if !text.is_empty() {
                    turn.words.push(text);
                }
            }
            None => parsed.dropped.push(DroppedLine {
                line_number: idx + 1,
                content: line.to_string(),
                reason: DropReason::NoSpeaker,
            }),
        }
    }

    if let Some(turn) = current.take() {
        finish(turn, &mut parsed);
    }

    if !parsed.dropped.is_empty() {
        tracing::debug!(dropped = parsed.dropped.len(), "script lines without a speaker turn");
    }
    parsed
}

fn clean_text(text: &str) -> String {
    text.replace("**", "").trim().to_string()
}

pub struct ScriptGenerator {
    model: Arc<dyn CompletionModel>,
    model_name: String,
}

impl ScriptGenerator {
    pub fn new(model: Arc<dyn CompletionModel>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
        }
    }

    /// Write a Carnegie/Mellon dialogue from the analysis.
    pub async fn generate(&self, analysis: &DebateAnalysis) -> Result<String> {
        let request = CompletionRequest::new(&self.model_name, script_prompt(analysis))
            .with_system(SCRIPT_SYSTEM_PROMPT)
            .with_temperature(0.7);

        tracing::info!(topic = %analysis.topic, "generating debate script");
        let completion = self.model.complete(request).await?;
        Ok(strip_reasoning(&completion.content))
    }
}

fn script_prompt(analysis: &DebateAnalysis) -> String {
    let arguments = |persona: Persona| {
        analysis
            .side_for(persona)
            .map(|side| {
                side.arguments
                    .iter()
                    .map(|a| format!("- {}", a))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    };
    let topic = if analysis.topic.trim().is_empty() {
        "political topic"
    } else {
        analysis.topic.as_str()
    };

    format!(
        "{SCRIPT_SYSTEM_PROMPT}

Topic: {topic}

Liberal (Carnegie) Arguments:
{liberal}

Conservative (Mellon) Arguments:
{conservative}

Create a natural, engaging conversation transcript between Carnegie and Mellon. Format it clearly with speaker labels. Make it conversational, with back-and-forth exchanges. Keep each point concise and easy to understand.",
        liberal = arguments(Persona::Carnegie),
        conservative = arguments(Persona::Mellon),
    )
}

/// Write the script text, creating parent directories as needed.
pub fn save_script<P: AsRef<Path>>(path: P, script: &str) -> Result<PathBuf> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, script)?;
    tracing::info!(path = %path.display(), "saved script");
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::DebateSide;
    use crate::testing::ScriptedModel;

    #[test]
    fn test_alternating_plain_tags() {
        let text = "CARNEGIE: We need to fund the government.\n\
                    MELLON:   Not without spending cuts.  \n\
                    CARNEGIE: Workers shouldn't pay the price.\n\
                    MELLON: Taxpayers already do.";

        let parsed = parse_script(text);

        assert!(parsed.dropped.is_empty());
        assert_eq!(parsed.lines.len(), 4);
        for (i, line) in parsed.lines.iter().enumerate() {
            let expected = if i % 2 == 0 { Persona::Carnegie } else { Persona::Mellon };
            assert_eq!(line.speaker, expected);
        }
        assert_eq!(parsed.lines[1].text, "Not without spending cuts.");
        assert_eq!(parsed.lines[3].text, "Taxpayers already do.");
    }

    #[test]
    fn test_markdown_tag_variants() {
        let text = "**Carnegie:** Opening point.\n\
                    **Mellon**: Counterpoint.\n\
                    carnegie: lower-case works too.";

        let parsed = parse_script(text);

        assert_eq!(
            parsed.lines,
            vec![
                ScriptLine { speaker: Persona::Carnegie, text: "Opening point.".to_string() },
                ScriptLine { speaker: Persona::Mellon, text: "Counterpoint.".to_string() },
                ScriptLine { speaker: Persona::Carnegie, text: "lower-case works too.".to_string() },
            ]
        );
    }

    #[test]
    fn test_continuation_lines_join_current_turn() {
        let text = "**Carnegie:**\nFirst thought.\nSecond **bold** thought.\n\nMELLON: Reply.";

        let parsed = parse_script(text);

        assert_eq!(parsed.lines[0].text, "First thought. Second bold thought.");
        assert_eq!(parsed.lines[1].text, "Reply.");
        assert!(parsed.dropped.is_empty());
    }

    #[test]
    fn test_dropped_lines_are_reported() {
        let text = "# Debate: Shutdown\nIntro narration.\nCARNEGIE:\nMELLON: Only I speak.";

        let parsed = parse_script(text);

        assert_eq!(parsed.lines.len(), 1);
        assert_eq!(parsed.count_for(Persona::Mellon), 1);
        assert_eq!(parsed.count_for(Persona::Carnegie), 0);
        assert_eq!(
            parsed.dropped.iter().map(|d| (d.line_number, d.reason.clone())).collect::<Vec<_>>(),
            vec![
                (1, DropReason::NoSpeaker),
                (2, DropReason::NoSpeaker),
                (3, DropReason::EmptyTurn),
            ]
        );
    }

    #[test]
    fn test_unbalanced_turns_are_kept() {
        let parsed = parse_script("MELLON: One.\nMELLON: Two.");
        assert_eq!(parsed.count_for(Persona::Mellon), 2);
    }

    #[test]
    fn test_other_speakers_are_not_tags() {
        let parsed = parse_script("MODERATOR: Welcome.\nCARNEGIE: Thanks.");
        assert_eq!(parsed.lines.len(), 1);
        assert_eq!(parsed.dropped[0].reason, DropReason::NoSpeaker);
    }

    #[tokio::test]
    async fn test_generate_builds_prompt_from_sides() {
        let model = Arc::new(
            ScriptedModel::new().reply("<think>plan</think>CARNEGIE: Hi.\nMELLON: Hello."),
        );
        let generator = ScriptGenerator::new(model.clone(), "openai/gpt-4o");
        let analysis = DebateAnalysis {
            topic: "Tariffs".to_string(),
            sides: vec![DebateSide {
                id: "B".to_string(),
                label: "conservative".to_string(),
                arguments: vec!["Protect industry".to_string()],
                sources: vec![],
            }],
        };

        let script = generator.generate(&analysis).await.unwrap();

        assert_eq!(script, "CARNEGIE: Hi.\nMELLON: Hello.");
        let request = &model.requests()[0];
        assert_eq!(request.system.as_deref(), Some(SCRIPT_SYSTEM_PROMPT));
        assert!(request.prompt.contains("Topic: Tariffs"));
        assert!(request.prompt.contains("Conservative (Mellon) Arguments:\n- Protect industry"));
        assert!(request.prompt.contains("Liberal (Carnegie) Arguments:\n\n"));
    }

    #[tokio::test]
    async fn test_generate_without_topic_uses_generic_one() {
        let model = Arc::new(ScriptedModel::new().reply("CARNEGIE: Hi.\nMELLON: Hello."));
        let generator = ScriptGenerator::new(model.clone(), "openai/gpt-4o");
        let analysis = crate::analyzer::parse_analysis(
            r#"{"sides": [{"label": "liberal", "arguments": ["Fund it"]}]}"#,
        )
        .unwrap();

        generator.generate(&analysis).await.unwrap();

        let request = &model.requests()[0];
        assert!(request.prompt.contains("Topic: political topic"));
        assert!(request.prompt.contains("Liberal (Carnegie) Arguments:\n- Fund it"));
    }

    #[test]
    fn test_save_script_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scripts/new_script.txt");

        let saved = save_script(&path, "CARNEGIE: Hi.").unwrap();

        assert_eq!(saved, path);
        assert_eq!(std::fs::read_to_string(path).unwrap(), "CARNEGIE: Hi.");
    }
}
