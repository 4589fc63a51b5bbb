//! External input types.
//!
//! The catalog types mirror the content loader's shape and the snapshot rows
//! mirror the persistence layer's row shape. Everything here is read-only
//! input: the core never mutates or writes these back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single assessment question inside a lesson.
///
/// `skill_id` is the optional explicit skill tag; most catalog content ships
/// without one and relies on the fallback skill synthesized per lesson.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonQuestion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
}

/// A lesson as supplied by the catalog loader.
///
/// `metadata` and `external` are free-form blobs. Prerequisite skill
/// references may appear under `prerequisites`, `prerequisiteSkills` or
/// `requiredSkills` as strings, comma-separated strings, or nested lists;
/// anything else is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub questions: Vec<LessonQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<serde_json::Value>,
}

/// A content module: an ordered list of lessons under one subject.
///
/// Lesson order is significant — it drives `lesson_sequence` edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningModule {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

/// Per-lesson spaced-repetition progress row for one learner.
///
/// Field names match the storage layer's columns. All numeric fields are
/// nullable upstream and coerced to safe defaults here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewProgressRow {
    pub lesson_id: String,
    #[serde(default)]
    pub next_review_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repetitions: Option<i64>,
    #[serde(default)]
    pub interval: Option<i64>,
    #[serde(default)]
    pub easiness_factor: Option<f64>,
}

/// Per-skill mastery row for one learner. `mastery_level` is expected in
/// [0, 1]; null or out-of-range values are coerced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewMasteryRow {
    pub skill_id: String,
    #[serde(default)]
    pub mastery_level: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lesson_deserializes_with_missing_fields() {
        let lesson: Lesson = serde_json::from_str(r#"{"id":"l1"}"#).unwrap();
        assert_eq!(lesson.id, "l1");
        assert_eq!(lesson.title, "");
        assert!(lesson.questions.is_empty());
        assert!(lesson.metadata.is_none());
    }

    #[test]
    fn test_question_skill_tag_optional() {
        let q: LessonQuestion =
            serde_json::from_str(r#"{"id":"q1","prompt":"2+2?","skillId":"math:add"}"#).unwrap();
        assert_eq!(q.skill_id.as_deref(), Some("math:add"));

        let untagged: LessonQuestion = serde_json::from_str(r#"{"id":"q2"}"#).unwrap();
        assert!(untagged.skill_id.is_none());
    }

    #[test]
    fn test_progress_row_nullable_numerics() {
        let row: ReviewProgressRow =
            serde_json::from_str(r#"{"lesson_id":"l1","next_review_at":null}"#).unwrap();
        assert!(row.next_review_at.is_none());
        assert!(row.repetitions.is_none());
        assert!(row.easiness_factor.is_none());
    }

    #[test]
    fn test_mastery_row_null_level() {
        let row: ReviewMasteryRow =
            serde_json::from_str(r#"{"skill_id":"math:add","mastery_level":null}"#).unwrap();
        assert!(row.mastery_level.is_none());
    }
}
