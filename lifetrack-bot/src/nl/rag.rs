//! Retrieval over schema fragments and example queries.
//!
//! Documents are embedded once and kept in a JSON index next to the bot's
//! data. Search is a brute-force scan ranked by squared L2 distance, so a
//! lower score is a closer match.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use super::embed::Embedder;

/// Candidates fetched before splitting into examples and schema parts
const SEARCH_K: usize = 15;
/// Examples scoring above this are only used when too few pass
const RELEVANCE_THRESHOLD: f32 = 1.5;
const MAX_SCHEMA_PARTS: usize = 3;
pub const DEFAULT_MAX_EXAMPLES: usize = 3;

const QUERY_ROOT_SUMMARY: &str = "GraphQL ROOT QUERIES (top-level fields in Query type):
- me: User! - Get current user info
- skills: [Skill!]! - List all user's skills
- skill(id: UUID!): Skill - Get specific skill by ID
- activities(filter, limit, offset): ActivityConnection! - List activities with filters
- activity(id: UUID!): Activity - Get specific activity
- activeSession: Activity - Get currently active session (if any)
- events(startDate: Date!, endDate: Date!, type): [Event!]! - List events in date range
- event(id: UUID!): Event - Get specific event
- upcomingEvents(limit: Int): [Event!]! - Get upcoming events
- learningPlans: [LearningPlan!]! - List all learning plans
- learningPlan(id: UUID!): LearningPlan - Get specific learning plan
- notes(filter, limit, offset): NoteConnection! - List notes with filters
- note(id: UUID!): Note - Get specific note
- searchNotes(query: String!): [Note!]! - Full-text search in notes
- activityStats(startDate: Date!, endDate: Date!): ActivityStats! - Calculate statistics

IMPORTANT: These are the ONLY fields available at query root level.
Schedule is NOT a root query - it's a nested field inside LearningPlan.";

const MUTATION_ROOT_SUMMARY: &str = "GraphQL ROOT MUTATIONS (top-level fields in Mutation type):
- register, login - Authentication
- createSkill, updateSkill, deleteSkill - Skill management
- createActivity, updateActivity, deleteActivity - Activity management
- startSession, pauseSession, resumeSession, stopSession - Session control
- createEvent, updateEvent, deleteEvent - Event/calendar management
- createLearningPlan, updateLearningPlan, deleteLearningPlan, generateSchedule - Learning plan management
- createNote, updateNote, deleteNote - Note management

IMPORTANT: These are the ONLY mutations available at root level.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Schema,
    Example,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagDocument {
    pub text: String,
    pub kind: DocumentKind,
    pub category: String,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryExample {
    pub intent: String,
    pub query: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "general".to_string()
}

#[derive(Debug, Deserialize)]
struct ExamplesFile {
    #[serde(default)]
    examples: Vec<QueryExample>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: RagDocument,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct RagContext {
    pub examples: Vec<ScoredDocument>,
    pub schema_parts: Vec<ScoredDocument>,
}

impl RagContext {
    pub fn example_scores(&self) -> Vec<f32> {
        self.examples.iter().map(|e| e.score).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RagIndex {
    documents: Vec<RagDocument>,
    embeddings: Vec<Vec<f32>>,
}

pub struct RagStore {
    index: RagIndex,
    embedder: Arc<dyn Embedder>,
}

impl RagStore {
    /// Load the index at `index_path`, or build it from the schema and
    /// examples and write it there when missing or unreadable.
    pub async fn open(
        schema_path: &Path,
        examples_path: &Path,
        index_path: &Path,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, String> {
        if index_path.exists() {
            match load_index(index_path) {
                Ok(index) => {
                    log::info!(
                        "[RAG] Index loaded from {} with {} documents",
                        index_path.display(),
                        index.documents.len()
                    );
                    return Ok(Self { index, embedder });
                }
                Err(e) => log::warn!("[RAG] {}, rebuilding", e),
            }
        }

        let schema = std::fs::read_to_string(schema_path)
            .map_err(|e| format!("Failed to read schema {}: {}", schema_path.display(), e))?;
        let examples = std::fs::read_to_string(examples_path)
            .map_err(|e| format!("Failed to read examples {}: {}", examples_path.display(), e))?;

        let store = Self::build(&schema, &examples, embedder).await?;
        store.save(index_path)?;
        Ok(store)
    }

    pub async fn build(schema_sdl: &str, examples_yaml: &str, embedder: Arc<dyn Embedder>) -> Result<Self, String> {
        let mut documents = schema_documents(schema_sdl);
        documents.extend(example_documents(&parse_examples(examples_yaml)?));

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        log::info!("[RAG] Creating embeddings for {} documents...", texts.len());
        let embeddings = embedder.embed_batch(&texts).await?;
        if embeddings.len() != documents.len() {
            return Err(format!(
                "Embedder returned {} vectors for {} documents",
                embeddings.len(),
                documents.len()
            ));
        }

        Ok(Self {
            index: RagIndex { documents, embeddings },
            embedder,
        })
    }

    pub fn save(&self, index_path: &Path) -> Result<(), String> {
        if let Some(parent) = index_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }
        let json = serde_json::to_string(&self.index)
            .map_err(|e| format!("Failed to serialize index: {}", e))?;
        std::fs::write(index_path, json)
            .map_err(|e| format!("Failed to write index {}: {}", index_path.display(), e))?;
        log::info!("[RAG] Index saved to {}", index_path.display());
        Ok(())
    }

    pub fn documents(&self) -> &[RagDocument] {
        &self.index.documents
    }

    /// The `k` nearest documents to `query`, closest first
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>, String> {
        let query_vector = self.embedder.embed(query).await?;

        let mut scored: Vec<(usize, f32)> = self
            .index
            .embeddings
            .iter()
            .enumerate()
            .filter(|(_, v)| v.len() == query_vector.len())
            .map(|(i, v)| (i, squared_l2(&query_vector, v)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredDocument {
                document: self.index.documents[i].clone(),
                score,
            })
            .collect())
    }

    /// Examples and schema fragments to put in a generation prompt
    pub async fn relevant_context(&self, query: &str, max_examples: usize) -> Result<RagContext, String> {
        let search_query = preprocess_query(query);
        log::info!("[RAG] Query preprocessing: '{}' -> '{}'", query, search_query);

        let results = self.search(&search_query, SEARCH_K).await?;
        let (all_examples, all_schema): (Vec<_>, Vec<_>) = results
            .into_iter()
            .partition(|r| r.document.kind == DocumentKind::Example);

        let mut examples: Vec<ScoredDocument> = Vec::new();
        let mut rest: Vec<ScoredDocument> = Vec::new();
        for example in all_examples {
            if examples.len() < max_examples && example.score < RELEVANCE_THRESHOLD {
                examples.push(example);
            } else {
                rest.push(example);
            }
        }

        if examples.len() < max_examples {
            log::warn!(
                "[RAG] Only {} examples below threshold, including lower-quality matches",
                examples.len()
            );
            let missing = max_examples - examples.len();
            examples.extend(rest.into_iter().take(missing));
            examples.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
        }

        Ok(RagContext {
            examples,
            schema_parts: all_schema.into_iter().take(MAX_SCHEMA_PARTS).collect(),
        })
    }
}

fn load_index(path: &Path) -> Result<RagIndex, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read index {}: {}", path.display(), e))?;
    let index: RagIndex = serde_json::from_str(&raw)
        .map_err(|e| format!("Failed to parse index {}: {}", path.display(), e))?;
    if index.documents.len() != index.embeddings.len() {
        return Err(format!("Index {} is inconsistent", path.display()));
    }
    Ok(index)
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// One document per `type`, `input` and `enum` block, plus summaries of
/// the root Query and Mutation fields.
pub fn schema_documents(sdl: &str) -> Vec<RagDocument> {
    fn block_document(lines: &[&str], name: &str) -> RagDocument {
        RagDocument {
            text: lines.join("\n"),
            kind: DocumentKind::Schema,
            category: name.to_string(),
            intent: None,
            query: None,
            source: "schema".to_string(),
        }
    }

    let mut docs = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    let mut current: Option<String> = None;

    for line in sdl.lines() {
        let stripped = line.trim();
        let starts_block = ["type ", "input ", "enum "]
            .iter()
            .any(|prefix| stripped.starts_with(prefix));

        if starts_block {
            if let Some(name) = current.take() {
                docs.push(block_document(&block, &name));
            }
            current = stripped
                .split_whitespace()
                .nth(1)
                .map(|n| n.replace('{', "").trim().to_string());
            block = vec![line];
        } else if stripped.starts_with('}') {
            if !block.is_empty() {
                block.push(line);
                if let Some(name) = current.take() {
                    docs.push(block_document(&block, &name));
                }
                block.clear();
            }
        } else if !block.is_empty() {
            block.push(line);
        }
    }

    for (text, category) in [(QUERY_ROOT_SUMMARY, "Query"), (MUTATION_ROOT_SUMMARY, "Mutation")] {
        docs.push(RagDocument {
            text: text.to_string(),
            kind: DocumentKind::Schema,
            category: category.to_string(),
            intent: None,
            query: None,
            source: "schema_summary".to_string(),
        });
    }

    docs
}

pub fn parse_examples(yaml: &str) -> Result<Vec<QueryExample>, String> {
    serde_yaml::from_str::<ExamplesFile>(yaml)
        .map(|f| f.examples)
        .map_err(|e| format!("Failed to parse examples: {}", e))
}

pub fn example_documents(examples: &[QueryExample]) -> Vec<RagDocument> {
    examples
        .iter()
        .map(|ex| RagDocument {
            text: format!("{}\n\nGraphQL Query:\n{}", ex.intent, ex.query),
            kind: DocumentKind::Example,
            category: ex.category.clone(),
            intent: Some(ex.intent.clone()),
            query: Some(ex.query.clone()),
            source: "examples".to_string(),
        })
        .collect()
}

/// Append domain terms to ambiguous requests so they land near the right
/// examples.
pub fn preprocess_query(query: &str) -> String {
    let lower = query.to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has_any(&["start", "begin", "stop", "end", "pause", "resume", "session", "practice", "activity"]) {
        // "learning session" is an activity, not a learning plan
        if lower.contains("learning") && !lower.contains("plan") {
            return format!("{} coding practice activity session startSession", query);
        }
        return format!("{} activity session practice startSession stopSession", query);
    }

    if has_any(&["schedule", "calendar"]) && !lower.contains("learning plan") {
        return format!("{} calendar events today tomorrow week", query);
    }

    if has_any(&["stats", "statistics", "report", "summary", "hours", "time spent"]) {
        return format!("{} statistics activityStats hours breakdown", query);
    }

    if has_any(&["note", "notes", "memo", "remember"]) {
        return format!("{} notes createNote searchNotes", query);
    }

    query.to_string()
}
