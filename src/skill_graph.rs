//! Skill graph construction.
//!
//! Builds a directed graph of skills from the content catalog. Skill tagging
//! in catalog content is sparse: some lessons tag their questions with
//! explicit skill ids, most do not. Untagged lessons get exactly one
//! synthesized fallback skill so every lesson is represented in the graph,
//! and a fallback node is promoted permanently the moment any lesson tags
//! the same id explicitly.
//!
//! Two edge kinds:
//! - `lesson_sequence`: skills of lesson N precede skills of lesson N+1
//!   within the same module (implied teaching order);
//! - `explicit_prerequisite`: declared in lesson metadata.
//!
//! Output ordering is exact and stable so identical catalogs always produce
//! identical graphs.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sanitize::round1;
use crate::types::{Lesson, LearningModule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillGraphEdgeKind {
    ExplicitPrerequisite,
    LessonSequence,
}

impl SkillGraphEdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplicitPrerequisite => "explicit_prerequisite",
            Self::LessonSequence => "lesson_sequence",
        }
    }
}

/// Directed relation between two skills, attributed to the lesson and module
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillGraphEdge {
    pub from_skill_id: String,
    pub to_skill_id: String,
    pub kind: SkillGraphEdgeKind,
    pub module_id: String,
    pub lesson_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillGraphNode {
    pub id: String,
    pub label: String,
    pub module_id: String,
    pub module_title: String,
    pub subject: String,
    pub lesson_ids: Vec<String>,
    pub question_count: i64,
    pub is_fallback: bool,
    pub prerequisite_skill_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSkillSummary {
    pub module_id: String,
    pub module_title: String,
    pub subject: String,
    pub skill_ids: Vec<String>,
    pub lesson_ids: Vec<String>,
    pub explicit_skill_count: i64,
    pub fallback_skill_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillGraphCoverage {
    pub total_modules: i64,
    pub modules_with_any_skills: i64,
    pub modules_with_explicit_skills: i64,
    pub lessons_with_any_skills: i64,
    pub lessons_with_explicit_skills: i64,
    pub module_explicit_skill_coverage_percent: f64,
}

/// The builder's output. Read-only to consumers; built fresh on demand from
/// a catalog snapshot and never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillGraph {
    pub generated_at: DateTime<Utc>,
    pub module_count: i64,
    pub lesson_count: i64,
    pub skill_count: i64,
    pub edge_count: i64,
    pub coverage: SkillGraphCoverage,
    pub nodes: Vec<SkillGraphNode>,
    pub edges: Vec<SkillGraphEdge>,
    pub modules: Vec<ModuleSkillSummary>,
}

struct NodeState {
    label: String,
    module_id: String,
    module_title: String,
    subject: String,
    lesson_ids: BTreeSet<String>,
    question_count: i64,
    is_fallback: bool,
    prerequisite_skill_ids: BTreeSet<String>,
}

fn slugify(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Turn a skill id into a display label: take the tail segment after the
/// last `:` or `/`, strip a leading `skill-`/`skill_` prefix, convert
/// dash/underscore runs to spaces and title-case each word. Ids that yield
/// nothing fall back to the supplied label.
fn humanize_skill_label(skill_id: &str, fallback_label: &str) -> String {
    let normalized = skill_id.trim();
    if normalized.is_empty() {
        return fallback_label.to_string();
    }

    let tail = normalized
        .rsplit(|c| c == ':' || c == '/')
        .next()
        .unwrap_or(normalized);

    let mut stripped = tail;
    if stripped.len() >= 5 && stripped[..5].eq_ignore_ascii_case("skill") {
        stripped = &stripped[5..];
        if let Some(rest) = stripped.strip_prefix(|c| c == '-' || c == '_') {
            stripped = rest;
        }
    }

    let spaced: String = stripped
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect();

    let words: Vec<String> = spaced
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();

    if words.is_empty() {
        fallback_label.to_string()
    } else {
        words.join(" ")
    }
}

/// Recursively flatten a free-form metadata value into skill id strings.
/// Strings are split on commas, lists are flattened, anything else yields
/// nothing. Entries are trimmed; empties dropped.
fn flatten_skill_refs(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Array(entries) => {
            for entry in entries {
                flatten_skill_refs(entry, out);
            }
        }
        serde_json::Value::String(text) => {
            for part in text.split(',') {
                let trimmed = part.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            }
        }
        _ => {}
    }
}

/// Distinct non-empty skill tags attached to a lesson's questions, in first
/// occurrence order.
fn extract_explicit_skill_ids(lesson: &Lesson) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for question in &lesson.questions {
        let Some(tag) = question.skill_id.as_deref() else {
            continue;
        };
        let normalized = tag.trim();
        if normalized.is_empty() {
            continue;
        }
        if seen.insert(normalized.to_string()) {
            out.push(normalized.to_string());
        }
    }
    out
}

const PREREQUISITE_KEYS: &[&str] = &["prerequisites", "prerequisiteSkills", "requiredSkills"];
const EXTERNAL_PREREQUISITE_KEYS: &[&str] = &["prerequisites", "prerequisiteSkills"];

/// Prerequisite skill ids declared in lesson metadata/external blobs.
fn extract_prerequisite_skill_ids(lesson: &Lesson) -> Vec<String> {
    let mut raw = Vec::new();

    if let Some(serde_json::Value::Object(metadata)) = &lesson.metadata {
        for key in PREREQUISITE_KEYS {
            if let Some(value) = metadata.get(*key) {
                flatten_skill_refs(value, &mut raw);
            }
        }
    }
    if let Some(serde_json::Value::Object(external)) = &lesson.external {
        for key in EXTERNAL_PREREQUISITE_KEYS {
            if let Some(value) = external.get(*key) {
                flatten_skill_refs(value, &mut raw);
            }
        }
    }

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for entry in raw {
        let normalized = entry.trim().to_string();
        if normalized.is_empty() {
            continue;
        }
        if seen.insert(normalized.clone()) {
            out.push(normalized);
        }
    }
    out
}

fn fallback_skill_id(module_id: &str, lesson: &Lesson) -> String {
    let mut token = slugify(&lesson.title);
    if token.is_empty() {
        token = slugify(&lesson.id);
    }
    if token.is_empty() {
        token = "lesson".to_string();
    }
    format!("{module_id}:lesson:{token}")
}

fn coverage_percent(count: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round1(count as f64 / total as f64 * 100.0)
}

/// Build the skill graph, stamping the current time as `generated_at`.
pub fn build_skill_graph(modules: &[LearningModule]) -> SkillGraph {
    build_skill_graph_at(modules, Utc::now())
}

/// Build the skill graph with an explicit generation timestamp.
///
/// Total and deterministic: the same catalog snapshot and timestamp always
/// produce an identical graph. Malformed or missing fields degrade rather
/// than fail.
pub fn build_skill_graph_at(
    modules: &[LearningModule],
    generated_at: DateTime<Utc>,
) -> SkillGraph {
    let mut nodes_by_id: BTreeMap<String, NodeState> = BTreeMap::new();
    let mut edges: Vec<SkillGraphEdge> = Vec::new();
    let mut edge_keys: BTreeSet<(SkillGraphEdgeKind, String, String, String, String)> =
        BTreeSet::new();
    let mut module_summaries: Vec<ModuleSkillSummary> = Vec::new();

    let mut lesson_count: i64 = 0;
    let mut lessons_with_any_skills: i64 = 0;
    let mut lessons_with_explicit_skills: i64 = 0;
    let mut modules_with_any_skills: i64 = 0;
    let mut modules_with_explicit_skills: i64 = 0;

    for module in modules {
        lesson_count += module.lessons.len() as i64;

        let mut module_skill_ids: BTreeSet<String> = BTreeSet::new();
        let mut module_lesson_ids: BTreeSet<String> = BTreeSet::new();
        let mut explicit_skill_count: i64 = 0;
        let mut fallback_skill_count: i64 = 0;
        let mut previous_lesson_skill_ids: Vec<String> = Vec::new();

        for lesson in &module.lessons {
            module_lesson_ids.insert(lesson.id.clone());

            let explicit_skill_ids = extract_explicit_skill_ids(lesson);
            let is_fallback = explicit_skill_ids.is_empty();
            let lesson_skill_ids = if is_fallback {
                vec![fallback_skill_id(&module.id, lesson)]
            } else {
                explicit_skill_ids.clone()
            };

            if !lesson_skill_ids.is_empty() {
                lessons_with_any_skills += 1;
            }
            if !explicit_skill_ids.is_empty() {
                lessons_with_explicit_skills += 1;
                explicit_skill_count += explicit_skill_ids.len() as i64;
            } else {
                fallback_skill_count += 1;
            }

            for skill_id in &lesson_skill_ids {
                let normalized = skill_id.trim();
                if normalized.is_empty() {
                    continue;
                }

                let question_count = if is_fallback {
                    lesson.questions.len() as i64
                } else {
                    lesson
                        .questions
                        .iter()
                        .filter(|q| q.skill_id.as_deref().map(str::trim) == Some(normalized))
                        .count() as i64
                };

                match nodes_by_id.entry(normalized.to_string()) {
                    Entry::Occupied(entry) => {
                        let node = entry.into_mut();
                        node.lesson_ids.insert(lesson.id.clone());
                        node.question_count += question_count;
                        if !is_fallback {
                            // Permanent promotion: one explicit tag anywhere
                            // makes the node non-fallback for good.
                            node.is_fallback = false;
                        }
                    }
                    Entry::Vacant(entry) => {
                        let fallback_label = format!("{} Fundamentals", lesson.title);
                        entry.insert(NodeState {
                            label: humanize_skill_label(normalized, &fallback_label),
                            module_id: module.id.clone(),
                            module_title: module.title.clone(),
                            subject: module.subject.clone(),
                            lesson_ids: BTreeSet::from([lesson.id.clone()]),
                            question_count,
                            is_fallback,
                            prerequisite_skill_ids: BTreeSet::new(),
                        });
                    }
                }

                module_skill_ids.insert(normalized.to_string());
            }

            for previous_skill_id in &previous_lesson_skill_ids {
                for current_skill_id in &lesson_skill_ids {
                    add_edge(
                        &mut edges,
                        &mut edge_keys,
                        &mut nodes_by_id,
                        SkillGraphEdge {
                            from_skill_id: previous_skill_id.clone(),
                            to_skill_id: current_skill_id.clone(),
                            kind: SkillGraphEdgeKind::LessonSequence,
                            module_id: module.id.clone(),
                            lesson_id: lesson.id.clone(),
                        },
                    );
                }
            }
            previous_lesson_skill_ids = lesson_skill_ids.clone();

            for prerequisite_skill_id in extract_prerequisite_skill_ids(lesson) {
                for lesson_skill_id in &lesson_skill_ids {
                    add_edge(
                        &mut edges,
                        &mut edge_keys,
                        &mut nodes_by_id,
                        SkillGraphEdge {
                            from_skill_id: prerequisite_skill_id.clone(),
                            to_skill_id: lesson_skill_id.clone(),
                            kind: SkillGraphEdgeKind::ExplicitPrerequisite,
                            module_id: module.id.clone(),
                            lesson_id: lesson.id.clone(),
                        },
                    );
                }
            }
        }

        if !module_skill_ids.is_empty() {
            modules_with_any_skills += 1;
        }
        if explicit_skill_count > 0 {
            modules_with_explicit_skills += 1;
        }

        module_summaries.push(ModuleSkillSummary {
            module_id: module.id.clone(),
            module_title: module.title.clone(),
            subject: module.subject.clone(),
            skill_ids: module_skill_ids.into_iter().collect(),
            lesson_ids: module_lesson_ids.into_iter().collect(),
            explicit_skill_count,
            fallback_skill_count,
        });
    }

    let nodes: Vec<SkillGraphNode> = nodes_by_id
        .into_iter()
        .map(|(id, state)| SkillGraphNode {
            id,
            label: state.label,
            module_id: state.module_id,
            module_title: state.module_title,
            subject: state.subject,
            lesson_ids: state.lesson_ids.into_iter().collect(),
            question_count: state.question_count,
            is_fallback: state.is_fallback,
            prerequisite_skill_ids: state.prerequisite_skill_ids.into_iter().collect(),
        })
        .collect();

    edges.sort_by(|left, right| {
        left.to_skill_id
            .cmp(&right.to_skill_id)
            .then_with(|| left.from_skill_id.cmp(&right.from_skill_id))
            .then_with(|| left.kind.as_str().cmp(right.kind.as_str()))
            .then_with(|| left.module_id.cmp(&right.module_id))
            .then_with(|| left.lesson_id.cmp(&right.lesson_id))
    });

    module_summaries.sort_by(|left, right| left.module_id.cmp(&right.module_id));

    let graph = SkillGraph {
        generated_at,
        module_count: modules.len() as i64,
        lesson_count,
        skill_count: nodes.len() as i64,
        edge_count: edges.len() as i64,
        coverage: SkillGraphCoverage {
            total_modules: modules.len() as i64,
            modules_with_any_skills,
            modules_with_explicit_skills,
            lessons_with_any_skills,
            lessons_with_explicit_skills,
            module_explicit_skill_coverage_percent: coverage_percent(
                modules_with_explicit_skills,
                modules.len() as i64,
            ),
        },
        nodes,
        edges,
        modules: module_summaries,
    };

    tracing::debug!(
        modules = graph.module_count,
        lessons = graph.lesson_count,
        skills = graph.skill_count,
        edges = graph.edge_count,
        "skill graph built"
    );

    graph
}

fn add_edge(
    edges: &mut Vec<SkillGraphEdge>,
    edge_keys: &mut BTreeSet<(SkillGraphEdgeKind, String, String, String, String)>,
    nodes_by_id: &mut BTreeMap<String, NodeState>,
    edge: SkillGraphEdge,
) {
    if edge.from_skill_id.is_empty() || edge.to_skill_id.is_empty() {
        return;
    }
    if edge.from_skill_id == edge.to_skill_id {
        return;
    }

    let key = (
        edge.kind,
        edge.from_skill_id.clone(),
        edge.to_skill_id.clone(),
        edge.module_id.clone(),
        edge.lesson_id.clone(),
    );
    if !edge_keys.insert(key) {
        return;
    }

    // Only declared prerequisites feed a node's prerequisite set; implied
    // sequence edges do not gate the scheduler.
    if edge.kind == SkillGraphEdgeKind::ExplicitPrerequisite {
        if let Some(target) = nodes_by_id.get_mut(&edge.to_skill_id) {
            target
                .prerequisite_skill_ids
                .insert(edge.from_skill_id.clone());
        }
    }

    edges.push(edge);
}
