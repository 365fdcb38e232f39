//! Dynamic topic categorization of news articles.
//!
//! Labels are generated by the LLM from article summaries, then articles are
//! assigned to them in batches. Every input article ends up in exactly one
//! place: one category's list or `filtered_out`.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};
use crate::llm::{CompletionModel, CompletionRequest, parse_json_reply};
use crate::news::{Article, truncate_chars};

const ASSIGN_BATCH: usize = 10;
const REVIEW_BATCH: usize = 5;
const MAX_SUMMARIES: usize = 20;
const FILTER_OUT: &str = "FILTER_OUT";

const LABELS_SYSTEM: &str = "You are a helpful assistant that analyzes news articles and creates logical categories. Always respond with valid JSON arrays.";
const ASSIGN_SYSTEM: &str = "You are a helpful assistant that categorizes news articles. Always respond with valid JSON objects.";
const RELEVANCE_SYSTEM: &str = "You are a helpful assistant that analyzes article-category relevance. Always respond with only a valid JSON array of booleans.";
const REASSIGN_SYSTEM: &str = "You are a helpful assistant that categorizes news articles. Always respond with only a valid JSON array.";
const RENAME_SYSTEM: &str = "You are a helpful assistant that renames categories to better match their content. Always respond with only a valid JSON object.";

/// Result of label generation. Empty `labels` always comes with `error`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryLabels {
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CategoryLabels {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            labels: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub name: String,
    pub articles: Vec<Article>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Categorization {
    pub categories: Vec<Category>,
    /// Articles flagged as out of scope or left without a fitting category.
    pub filtered_out: Vec<Article>,
}

impl Categorization {
    pub fn article_count(&self) -> usize {
        self.categories.iter().map(|c| c.articles.len()).sum::<usize>() + self.filtered_out.len()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.categories
            .iter()
            .position(|c| c.name == name)
            .or_else(|| {
                self.categories
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name.trim()))
            })
    }
}

pub struct Categorizer {
    model: Arc<dyn CompletionModel>,
    model_name: String,
}

impl Categorizer {
    pub fn new(model: Arc<dyn CompletionModel>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
        }
    }

    async fn ask(&self, system: &str, prompt: String, temperature: f32) -> Result<String> {
        let request = CompletionRequest::new(&self.model_name, prompt)
            .with_system(system)
            .with_temperature(temperature);
        Ok(self.model.complete(request).await?.content)
    }

    /// Ask for about `num_categories` labels describing the summarized articles.
    pub async fn generate_categories(
        &self,
        summaries: &[String],
        num_categories: Option<usize>,
    ) -> CategoryLabels {
        if summaries.is_empty() {
            return CategoryLabels::failed("No articles to categorize");
        }

        let articles_text = summaries
            .iter()
            .take(MAX_SUMMARIES)
            .enumerate()
            .map(|(i, s)| format!("Article {}:\n{}", i + 1, s))
            .collect::<Vec<_>>()
            .join("\n\n");
        let count = match num_categories {
            Some(n) => format!("Generate approximately {} categories", n),
            None => "Generate an appropriate number of categories".to_string(),
        };

        let prompt = format!(
            r#"You are analyzing recent politics-related news articles. Based on the following articles, {count} that best organize these articles.

Articles:
{articles_text}

Please:
1. Identify the main themes and topics
2. Create clear, SPECIFIC category names (e.g., "Trump Tariffs", "Decreasing Housing Cost", "SNAP Payments")
3. It is encouraged to include relevant names of people, organizations, or policies, but make sure to be specific.
4. Return ONLY a JSON array of category names, nothing else

Example format: ["Category 1", "Category 2", "Category 3"]"#
        );

        let reply = match self.ask(LABELS_SYSTEM, prompt, 0.5).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "category generation request failed");
                return CategoryLabels::failed(format!("Category generation failed: {}", e));
            }
        };

        match parse_json_reply::<Vec<Value>>(&reply, '[', ']') {
            Ok(values) => {
                let labels = unique_labels(values.iter().map(label_text));
                if labels.is_empty() {
                    CategoryLabels::failed("Model returned no category labels")
                } else {
                    tracing::info!(count = labels.len(), "generated categories");
                    CategoryLabels {
                        labels,
                        error: None,
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not parse category labels");
                CategoryLabels::failed(format!("Malformed category response: {}", e))
            }
        }
    }

    /// Assign every article to one of `labels`.
    ///
    /// Missing or unknown assignments, and batches whose reply cannot be used,
    /// fall back to the first label. `FILTER_OUT` moves the article to
    /// [`Categorization::filtered_out`].
    pub async fn categorize(
        &self,
        articles: Vec<Article>,
        labels: &[String],
    ) -> Result<Categorization> {
        let labels = unique_labels(labels.iter().cloned());
        if labels.is_empty() {
            return Err(PipelineError::Validation(
                "At least one category label is required".to_string(),
            ));
        }

        let mut result = Categorization {
            categories: labels
                .iter()
                .map(|name| Category {
                    name: name.clone(),
                    articles: Vec::new(),
                })
                .collect(),
            filtered_out: Vec::new(),
        };

        let mut batches = articles.into_iter().peekable();
        let mut batch_no = 0;
        while batches.peek().is_some() {
            batch_no += 1;
            let batch: Vec<Article> = batches.by_ref().take(ASSIGN_BATCH).collect();
            let assignments = match self.assign_batch(&batch, &labels).await {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(batch = batch_no, error = %e, "categorizing batch failed");
                    Map::new()
                }
            };

            for (j, article) in batch.into_iter().enumerate() {
                let assigned = assignments
                    .get(&(j + 1).to_string())
                    .and_then(Value::as_str)
                    .map(str::trim);
                match assigned {
                    Some(name) if name.eq_ignore_ascii_case(FILTER_OUT) => {
                        result.filtered_out.push(article)
                    }
                    Some(name) => {
                        let idx = result.position(name).unwrap_or(0);
                        result.categories[idx].articles.push(article);
                    }
                    None => result.categories[0].articles.push(article),
                }
            }
        }

        if !result.filtered_out.is_empty() {
            tracing::info!(
                count = result.filtered_out.len(),
                "filtered out foreign local politics articles"
            );
        }
        Ok(result)
    }

    async fn assign_batch(&self, batch: &[Article], labels: &[String]) -> Result<Map<String, Value>> {
        let prompt = format!(
            r#"You are categorizing politics news articles. For each article below, assign it to ONE of these categories:

Categories: {categories}

IMPORTANT FILTERING RULE:
- If an article is about LOCAL POLITICS in a FOREIGN COUNTRY that is NOT directly related to international affairs or US politics, assign it to "FILTER_OUT" instead of a category.
- Examples to FILTER_OUT: Local elections in foreign countries, local opposition movements in foreign countries, municipal or regional politics in foreign countries.
- Examples to KEEP: International relations, US foreign policy, global political events, US politics, major international conflicts, trade agreements.

Articles:
{articles}

For each article, return a JSON object mapping article numbers to category names (or "FILTER_OUT").
Example format: {{"1": "Category Name", "2": "FILTER_OUT", "3": "Category Name"}}

Return ONLY the JSON object, nothing else."#,
            categories = labels.join(", "),
            articles = numbered_articles(batch, 300),
        );

        let reply = self.ask(ASSIGN_SYSTEM, prompt, 0.3).await?;
        Ok(parse_json_reply(&reply, '{', '}')?)
    }

    /// Validate and tidy a categorization.
    ///
    /// Drops categories with fewer than two articles or whose articles the
    /// model judges off-topic, re-places their articles into the surviving
    /// categories, then renames the survivors to fit their contents.
    pub async fn refine(&self, categorization: Categorization) -> Categorization {
        let Categorization {
            categories,
            mut filtered_out,
        } = categorization;

        let (sized, small): (Vec<Category>, Vec<Category>) =
            categories.into_iter().partition(|c| c.articles.len() >= 2);
        let mut orphans: Vec<Article> = Vec::new();
        for category in small {
            tracing::info!(category = %category.name, count = category.articles.len(), "removed small category");
            orphans.extend(category.articles);
        }

        let mut kept = Vec::new();
        let mut sized = sized.into_iter().peekable();
        while sized.peek().is_some() {
            let batch: Vec<Category> = sized.by_ref().take(REVIEW_BATCH).collect();
            let verdicts = self.check_relevance(&batch).await;
            for (category, relevant) in batch.into_iter().zip(verdicts) {
                if relevant {
                    kept.push(category);
                } else {
                    tracing::info!(category = %category.name, "removed off-topic category");
                    orphans.extend(category.articles);
                }
            }
        }

        let mut refined = Categorization {
            categories: kept,
            filtered_out: Vec::new(),
        };

        if !orphans.is_empty() {
            if refined.categories.is_empty() {
                filtered_out.extend(orphans);
            } else {
                tracing::info!(count = orphans.len(), "recategorizing orphaned articles");
                let names: Vec<String> =
                    refined.categories.iter().map(|c| c.name.clone()).collect();
                let mut orphans = orphans.into_iter().peekable();
                while orphans.peek().is_some() {
                    let batch: Vec<Article> = orphans.by_ref().take(REVIEW_BATCH).collect();
                    let targets = self.reassign_batch(&batch, &names).await;
                    for (article, target) in batch.into_iter().zip(targets) {
                        match target.and_then(|name| refined.position(&name)) {
                            Some(idx) => refined.categories[idx].articles.push(article),
                            None => filtered_out.push(article),
                        }
                    }
                }
            }
        }

        if !refined.categories.is_empty() {
            refined.categories = self.rename(refined.categories).await;
        }
        refined.filtered_out = filtered_out;
        refined
    }

    /// One verdict per category. Any unusable reply keeps every category.
    async fn check_relevance(&self, batch: &[Category]) -> Vec<bool> {
        let categories_text = batch
            .iter()
            .map(|c| {
                let titles = c
                    .articles
                    .iter()
                    .take(5)
                    .map(|a| format!("  - {}", truncate_chars(&a.title, 100)))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("Category: {}\nArticles ({}):\n{}", c.name, c.articles.len(), titles)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            r#"You are analyzing whether articles are actually on-topic for their assigned categories.

Categories and their articles:
{categories_text}

For each category above, determine if the articles are actually relevant and on-topic for that category.
Return "true" if at least 2 articles are clearly relevant to the category.
Return "false" if the articles are not relevant, too niche, or the category doesn't make sense for these articles.

Return a JSON array of booleans, one for each category in order (true = relevant, false = not relevant).
Example format: [true, false, true]

Return ONLY the JSON array, nothing else."#
        );

        let keep_all = vec![true; batch.len()];
        let reply = match self.ask(RELEVANCE_SYSTEM, prompt, 0.3).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "relevance check failed, keeping categories");
                return keep_all;
            }
        };
        match parse_json_reply::<Vec<bool>>(&reply, '[', ']') {
            Ok(verdicts) if verdicts.len() == batch.len() => verdicts,
            _ => {
                tracing::warn!("unexpected relevance reply, keeping categories");
                keep_all
            }
        }
    }

    /// One target per article; `None` means no good fit.
    async fn reassign_batch(&self, batch: &[Article], names: &[String]) -> Vec<Option<String>> {
        let prompt = format!(
            r#"You are categorizing news articles. For each article below, assign it to ONE of these existing categories:

Categories: {categories}

Articles:
{articles}

For each article, if it fits well into one of these categories, return the category name exactly as shown.
If an article does NOT fit well into any category, return "NONE".

Return a JSON array with one category name (or "NONE") for each article in order.
Example format: ["Category Name", "NONE", "Category Name"]

Return ONLY the JSON array, nothing else."#,
            categories = names.join(", "),
            articles = numbered_articles(batch, 300),
        );

        let unplaced = vec![None; batch.len()];
        let reply = match self.ask(REASSIGN_SYSTEM, prompt, 0.3).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "recategorization failed");
                return unplaced;
            }
        };
        match parse_json_reply::<Vec<Value>>(&reply, '[', ']') {
            Ok(values) if values.len() == batch.len() => values
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::trim)
                        .filter(|s| !s.eq_ignore_ascii_case("NONE") && !s.is_empty())
                        .map(str::to_string)
                })
                .collect(),
            _ => {
                tracing::warn!("unexpected recategorization reply");
                unplaced
            }
        }
    }

    /// Rename categories to fit their articles. Keeps old names on failure
    /// and when a new name would collide with another category.
    async fn rename(&self, mut categories: Vec<Category>) -> Vec<Category> {
        let categories_text = categories
            .iter()
            .map(|c| {
                let titles = c
                    .articles
                    .iter()
                    .take(10)
                    .map(|a| format!("  - {}", truncate_chars(&a.title, 150)))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "Current Category Name: {}\nArticles ({}):\n{}",
                    c.name,
                    c.articles.len(),
                    titles
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            r#"You are renaming categories to better match the articles they contain.

Categories and their articles:
{categories_text}

For each category above, suggest a better, more specific category name that accurately describes the articles in that category. The new name should:
- Be specific and descriptive
- Accurately reflect the common theme of the articles
- Be concise (preferably 2-5 words)
- Include relevant names, organizations, or policies if appropriate

Return a JSON object mapping old category names to new category names.
Example format: {{"Old Category 1": "New Category 1", "Old Category 2": "New Category 2"}}
If a category name is already good and doesn't need changing, keep it the same in the mapping.

Return ONLY the JSON object, nothing else."#
        );

        let mapping: Map<String, Value> = match self.ask(RENAME_SYSTEM, prompt, 0.3).await {
            Ok(reply) => match parse_json_reply(&reply, '{', '}') {
                Ok(mapping) => mapping,
                Err(e) => {
                    tracing::warn!(error = %e, "could not parse category renames");
                    return categories;
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "category rename failed");
                return categories;
            }
        };

        // Names held by every category, including ones not yet renamed.
        let mut taken: HashSet<String> = categories.iter().map(|c| c.name.clone()).collect();
        for category in &mut categories {
            let proposed = mapping
                .get(&category.name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|n| !n.is_empty() && !n.eq_ignore_ascii_case(FILTER_OUT));
            let Some(new_name) = proposed else {
                continue;
            };
            if new_name == category.name {
                continue;
            }
            if taken.contains(new_name) {
                tracing::warn!(from = %category.name, to = %new_name, "rename collides with another category, keeping old name");
                continue;
            }
            tracing::info!(from = %category.name, to = %new_name, "renamed category");
            taken.remove(&category.name);
            taken.insert(new_name.to_string());
            category.name = new_name.to_string();
        }
        categories
    }
}

fn label_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn unique_labels(labels: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    labels
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case(FILTER_OUT) && seen.insert(l.clone()))
        .collect()
}

fn numbered_articles(batch: &[Article], description_chars: usize) -> String {
    batch
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let description = if a.description.is_empty() {
                "No description"
            } else {
                truncate_chars(&a.description, description_chars)
            };
            format!("Article {}:\nTitle: {}\nDescription: {}", i + 1, a.title, description)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
