//! Daily review queue scheduling.
//!
//! Consumes the skill graph plus one learner's spaced-repetition progress
//! and per-skill mastery snapshots, and produces a bounded, ordered list of
//! lessons due for review. Each item carries confidence, decay, blocking
//! state and a short human-readable reason.
//!
//! Pure and total: deterministic given `now`, never fails. Rows pointing at
//! lessons missing from the catalog are skipped (they still count toward
//! `due_lesson_count`); malformed numerics are coerced to safe defaults.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sanitize::{clamp, clamp_unit, round2};
use crate::skill_graph::SkillGraph;
use crate::types::{LearningModule, ReviewMasteryRow, ReviewProgressRow};

/// Confidence assigned when a lesson's skills have no mastery rows at all.
const DEFAULT_CONFIDENCE: f64 = 0.55;
/// Mastery below this marks a prerequisite skill as missing.
const MIN_PREREQUISITE_MASTERY: f64 = 0.6;
/// Decay accrued per overdue day before repetition protection.
const DAILY_DECAY_RATE: f64 = 0.035;
/// Hard ceiling on decay; confidence never fully evaporates.
const MAX_DECAY_PERCENT: f64 = 0.85;
/// Repetition protection saturates here: high-rep lessons decay slower but
/// never stop decaying.
const MAX_REPETITION_PROTECTION: f64 = 0.55;

const DEFAULT_MAX_ITEMS: usize = 24;
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQueueOptions {
    /// Queue length cap, clamped to [1, 100].
    pub max_items: usize,
    /// When false, lessons blocked by unmet prerequisites are dropped
    /// entirely before ordering.
    pub include_blocked: bool,
}

impl Default for ReviewQueueOptions {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            include_blocked: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQueueItem {
    pub lesson_id: String,
    pub lesson_title: String,
    pub module_id: String,
    pub module_title: String,
    pub subject: String,
    pub due_at: Option<DateTime<Utc>>,
    pub overdue_days: i64,
    pub repetitions: i64,
    pub interval_days: i64,
    pub easiness_factor: f64,
    pub raw_confidence: f64,
    pub decayed_confidence: f64,
    pub decay_percent: f64,
    pub priority_score: f64,
    pub blocked_by_prerequisites: bool,
    pub prerequisite_skill_ids: Vec<String>,
    pub missing_prerequisite_skill_ids: Vec<String>,
    pub suggested_prerequisite_lesson_ids: Vec<String>,
    pub lesson_skill_ids: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopOverdueLesson {
    pub lesson_id: String,
    pub overdue_days: i64,
    pub priority_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQueueSummary {
    /// Count of all due rows before any filtering or truncation.
    pub due_lesson_count: i64,
    pub queue_length: i64,
    pub blocked_lesson_count: i64,
    pub average_decay_percent: f64,
    pub average_confidence: f64,
    pub average_decayed_confidence: f64,
    pub top_overdue_lessons: Vec<TopOverdueLesson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQueueResult {
    pub queue: Vec<ReviewQueueItem>,
    pub summary: ReviewQueueSummary,
}

struct LessonContext {
    lesson_title: String,
    module_id: String,
    module_title: String,
    subject: String,
}

/// Per-lesson view derived from the skill graph: the skills a lesson
/// teaches, every prerequisite skill those skills require, and the lessons
/// that teach those prerequisites.
struct LessonSkillIndex {
    skills_by_lesson: BTreeMap<String, BTreeSet<String>>,
    prerequisites_by_lesson: BTreeMap<String, BTreeSet<String>>,
    prerequisite_lessons_by_lesson: BTreeMap<String, BTreeSet<String>>,
}

fn build_lesson_context_map(modules: &[LearningModule]) -> HashMap<String, LessonContext> {
    let mut contexts = HashMap::new();
    for module in modules {
        for lesson in &module.lessons {
            contexts.insert(
                lesson.id.clone(),
                LessonContext {
                    lesson_title: lesson.title.clone(),
                    module_id: module.id.clone(),
                    module_title: module.title.clone(),
                    subject: module.subject.clone(),
                },
            );
        }
    }
    contexts
}

fn build_lesson_skill_index(skill_graph: &SkillGraph) -> LessonSkillIndex {
    let mut skills_by_lesson: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut lessons_by_skill: HashMap<&str, &[String]> = HashMap::new();
    let mut prerequisites_by_skill: HashMap<&str, &[String]> = HashMap::new();

    for node in &skill_graph.nodes {
        lessons_by_skill.insert(node.id.as_str(), &node.lesson_ids);
        prerequisites_by_skill.insert(node.id.as_str(), &node.prerequisite_skill_ids);
        for lesson_id in &node.lesson_ids {
            skills_by_lesson
                .entry(lesson_id.clone())
                .or_default()
                .insert(node.id.clone());
        }
    }

    let mut prerequisites_by_lesson: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut prerequisite_lessons_by_lesson: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for (lesson_id, skill_ids) in &skills_by_lesson {
        let mut prerequisites: BTreeSet<String> = BTreeSet::new();
        let mut prerequisite_lessons: BTreeSet<String> = BTreeSet::new();

        for skill_id in skill_ids {
            let Some(prereq_ids) = prerequisites_by_skill.get(skill_id.as_str()) else {
                continue;
            };
            for prerequisite_skill_id in prereq_ids.iter() {
                prerequisites.insert(prerequisite_skill_id.clone());
                if let Some(teaching_lessons) =
                    lessons_by_skill.get(prerequisite_skill_id.as_str())
                {
                    for teaching_lesson_id in teaching_lessons.iter() {
                        if teaching_lesson_id != lesson_id {
                            prerequisite_lessons.insert(teaching_lesson_id.clone());
                        }
                    }
                }
            }
        }

        prerequisites_by_lesson.insert(lesson_id.clone(), prerequisites);
        prerequisite_lessons_by_lesson.insert(lesson_id.clone(), prerequisite_lessons);
    }

    LessonSkillIndex {
        skills_by_lesson,
        prerequisites_by_lesson,
        prerequisite_lessons_by_lesson,
    }
}

fn is_review_due(next_review_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(next_review_at, Some(due) if due <= now)
}

fn overdue_days(next_review_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    let Some(due) = next_review_at else {
        return 0;
    };
    if due >= now {
        return 0;
    }
    ((now - due).num_seconds() / SECONDS_PER_DAY).max(0)
}

/// Confidence that the learner still knows the lesson, before decay.
///
/// Lessons that teach skills use the mean of those skills' mastery values,
/// defaulting to [`DEFAULT_CONFIDENCE`] when no mastery rows exist for any
/// of them. Lessons with zero taught skills (defensive: the fallback skill
/// mechanism should prevent this) derive confidence from ease and
/// repetitions instead.
fn compute_raw_confidence(
    lesson_skill_ids: &BTreeSet<String>,
    mastery_by_skill: &HashMap<String, f64>,
    easiness_factor: f64,
    repetitions: i64,
) -> f64 {
    if lesson_skill_ids.is_empty() {
        let easiness_signal = clamp_unit((easiness_factor - 1.3) / 2.4);
        let repetition_signal = clamp_unit(repetitions as f64 / 8.0);
        return round2(easiness_signal * 0.65 + repetition_signal * 0.35);
    }

    let mastery_scores: Vec<f64> = lesson_skill_ids
        .iter()
        .filter_map(|skill_id| mastery_by_skill.get(skill_id).copied())
        .collect();

    if mastery_scores.is_empty() {
        return DEFAULT_CONFIDENCE;
    }
    let mean = mastery_scores.iter().sum::<f64>() / mastery_scores.len() as f64;
    round2(clamp_unit(mean))
}

/// Confidence decay from being overdue. Repetition counts grant partial
/// protection that saturates at [`MAX_REPETITION_PROTECTION`].
fn compute_decay_percent(overdue_days: i64, repetitions: i64) -> f64 {
    if overdue_days <= 0 {
        return 0.0;
    }
    let repetition_protection = clamp(repetitions as f64 / 12.0, 0.0, MAX_REPETITION_PROTECTION);
    let adjusted = overdue_days as f64 * DAILY_DECAY_RATE * (1.0 - repetition_protection);
    round2(clamp(adjusted, 0.0, MAX_DECAY_PERCENT))
}

/// Priority score, higher = more urgent. Overdue pressure caps at 40; low
/// decayed and raw confidence add urgency; fresh lessons (repetitions < 2)
/// get a small bonus; blocked lessons are pushed down.
fn compute_priority_score(
    overdue_days: i64,
    raw_confidence: f64,
    decayed_confidence: f64,
    repetitions: i64,
    blocked_by_prerequisites: bool,
) -> f64 {
    let mut score = (overdue_days as f64 * 2.5).min(40.0);
    score += (1.0 - decayed_confidence) * 35.0;
    score += (1.0 - raw_confidence) * 15.0;

    if repetitions < 2 {
        score += 4.0;
    }
    if blocked_by_prerequisites {
        score -= 8.0;
    }

    round2(score.max(0.0))
}

fn build_reason(overdue_days: i64, decay_percent: f64, missing_prerequisites: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    if overdue_days > 0 {
        let plural = if overdue_days == 1 { "" } else { "s" };
        parts.push(format!("overdue {overdue_days} day{plural}"));
    }
    if decay_percent > 0.0 {
        parts.push(format!(
            "confidence decay {}%",
            (decay_percent * 100.0).round() as i64
        ));
    }
    if missing_prerequisites > 0 {
        let plural = if missing_prerequisites == 1 { "" } else { "s" };
        parts.push(format!(
            "{missing_prerequisites} missing prerequisite skill{plural}"
        ));
    }
    if parts.is_empty() {
        parts.push("due for scheduled review".to_string());
    }
    parts.join("; ")
}

/// Order the candidate list. A one-hop "B suggests A as a prerequisite
/// lesson" relation takes precedence over everything else; then non-blocked
/// before blocked, then priority descending, then title. The prerequisite
/// relation is deliberately pairwise, not a topological sort — multi-hop
/// chains keep the limited semantics callers already observe.
fn dependency_aware_sort(queue: &mut [ReviewQueueItem]) {
    fn depends_on(left: &ReviewQueueItem, right: &ReviewQueueItem) -> bool {
        left.lesson_id != right.lesson_id
            && left
                .suggested_prerequisite_lesson_ids
                .iter()
                .any(|id| id == &right.lesson_id)
    }

    queue.sort_by(|left, right| {
        use std::cmp::Ordering;
        if depends_on(left, right) {
            return Ordering::Greater;
        }
        if depends_on(right, left) {
            return Ordering::Less;
        }
        if left.blocked_by_prerequisites != right.blocked_by_prerequisites {
            return left
                .blocked_by_prerequisites
                .cmp(&right.blocked_by_prerequisites);
        }
        right
            .priority_score
            .total_cmp(&left.priority_score)
            .then_with(|| left.lesson_title.cmp(&right.lesson_title))
    });
}

fn average_of(queue: &[ReviewQueueItem], field: impl Fn(&ReviewQueueItem) -> f64) -> f64 {
    if queue.is_empty() {
        return 0.0;
    }
    round2(queue.iter().map(field).sum::<f64>() / queue.len() as f64)
}

/// Build the learner's review queue for `now`.
///
/// Only progress rows with a non-null `next_review_at` at or before `now`
/// are considered. The result is ordered by the dependency-aware comparator
/// and truncated to `options.max_items`.
pub fn build_daily_review_queue(
    modules: &[LearningModule],
    skill_graph: &SkillGraph,
    progress_rows: &[ReviewProgressRow],
    mastery_rows: &[ReviewMasteryRow],
    options: &ReviewQueueOptions,
    now: DateTime<Utc>,
) -> ReviewQueueResult {
    let lesson_contexts = build_lesson_context_map(modules);
    let skill_index = build_lesson_skill_index(skill_graph);

    let mastery_by_skill: HashMap<String, f64> = mastery_rows
        .iter()
        .map(|row| {
            (
                row.skill_id.clone(),
                clamp_unit(row.mastery_level.unwrap_or(0.0)),
            )
        })
        .collect();

    let due_rows: Vec<&ReviewProgressRow> = progress_rows
        .iter()
        .filter(|row| is_review_due(row.next_review_at, now))
        .collect();
    let due_lesson_count = due_rows.len() as i64;

    let empty_skills = BTreeSet::new();
    let mut candidates: Vec<ReviewQueueItem> = Vec::new();

    for row in due_rows {
        let Some(context) = lesson_contexts.get(&row.lesson_id) else {
            // No lesson context, nothing to schedule.
            continue;
        };

        let lesson_skills = skill_index
            .skills_by_lesson
            .get(&row.lesson_id)
            .unwrap_or(&empty_skills);
        let prerequisite_skills = skill_index
            .prerequisites_by_lesson
            .get(&row.lesson_id)
            .unwrap_or(&empty_skills);
        let prerequisite_lessons = skill_index
            .prerequisite_lessons_by_lesson
            .get(&row.lesson_id)
            .unwrap_or(&empty_skills);

        let missing_prerequisites: Vec<String> = prerequisite_skills
            .iter()
            .filter(|skill_id| {
                mastery_by_skill.get(*skill_id).copied().unwrap_or(0.0)
                    < MIN_PREREQUISITE_MASTERY
            })
            .cloned()
            .collect();
        let blocked_by_prerequisites = !missing_prerequisites.is_empty();

        if !options.include_blocked && blocked_by_prerequisites {
            continue;
        }

        let repetitions = row.repetitions.unwrap_or(0).max(0);
        let interval_days = row.interval.unwrap_or(0).max(0);
        let easiness_factor = clamp(row.easiness_factor.unwrap_or(2.5), 1.3, 3.5);

        let overdue = overdue_days(row.next_review_at, now);
        let raw_confidence =
            compute_raw_confidence(lesson_skills, &mastery_by_skill, easiness_factor, repetitions);
        let decay_percent = compute_decay_percent(overdue, repetitions);
        let decayed_confidence = round2(raw_confidence * (1.0 - decay_percent));
        let priority_score = compute_priority_score(
            overdue,
            raw_confidence,
            decayed_confidence,
            repetitions,
            blocked_by_prerequisites,
        );
        let reason = build_reason(overdue, decay_percent, missing_prerequisites.len());

        candidates.push(ReviewQueueItem {
            lesson_id: row.lesson_id.clone(),
            lesson_title: context.lesson_title.clone(),
            module_id: context.module_id.clone(),
            module_title: context.module_title.clone(),
            subject: context.subject.clone(),
            due_at: row.next_review_at,
            overdue_days: overdue,
            repetitions,
            interval_days,
            easiness_factor: round2(easiness_factor),
            raw_confidence,
            decayed_confidence,
            decay_percent,
            priority_score,
            blocked_by_prerequisites,
            prerequisite_skill_ids: prerequisite_skills.iter().cloned().collect(),
            missing_prerequisite_skill_ids: missing_prerequisites,
            suggested_prerequisite_lesson_ids: prerequisite_lessons.iter().cloned().collect(),
            lesson_skill_ids: lesson_skills.iter().cloned().collect(),
            reason,
        });
    }

    dependency_aware_sort(&mut candidates);
    let max_items = options.max_items.clamp(1, 100);
    candidates.truncate(max_items);
    let queue = candidates;

    let blocked_lesson_count = queue
        .iter()
        .filter(|item| item.blocked_by_prerequisites)
        .count() as i64;

    let mut top_overdue: Vec<&ReviewQueueItem> = queue.iter().collect();
    top_overdue.sort_by(|left, right| {
        right
            .overdue_days
            .cmp(&left.overdue_days)
            .then_with(|| right.priority_score.total_cmp(&left.priority_score))
    });
    let top_overdue_lessons: Vec<TopOverdueLesson> = top_overdue
        .into_iter()
        .take(5)
        .map(|item| TopOverdueLesson {
            lesson_id: item.lesson_id.clone(),
            overdue_days: item.overdue_days,
            priority_score: item.priority_score,
        })
        .collect();

    let summary = ReviewQueueSummary {
        due_lesson_count,
        queue_length: queue.len() as i64,
        blocked_lesson_count,
        average_decay_percent: average_of(&queue, |item| item.decay_percent),
        average_confidence: average_of(&queue, |item| item.raw_confidence),
        average_decayed_confidence: average_of(&queue, |item| item.decayed_confidence),
        top_overdue_lessons,
    };

    tracing::debug!(
        due = summary.due_lesson_count,
        queued = summary.queue_length,
        blocked = summary.blocked_lesson_count,
        "review queue built"
    );

    ReviewQueueResult { queue, summary }
}
