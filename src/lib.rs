//! # mastery-core
//!
//! Pure computation core for mastery tracking: builds a dependency graph of
//! skills from the content catalog and schedules a learner's daily review
//! queue from spaced-repetition progress and per-skill mastery snapshots.
//!
//! Data flows one direction: catalog → skill graph → (with progress and
//! mastery snapshots) → review queue. Both operations are total,
//! synchronous, side-effect-free functions over in-memory collections; the
//! same inputs always produce identical outputs given the same timestamp,
//! so results are safe to cache or memoize. Fetching the inputs and
//! serializing the outputs belong to the embedding application.
//!
//! ## Modules
//!
//! - [`types`] - external input types (catalog, progress and mastery rows)
//! - [`skill_graph`] - skill graph construction from the catalog
//! - [`review_queue`] - daily review queue scheduling
//! - [`sanitize`] - numeric coercion helpers
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use mastery_core::{build_skill_graph, build_daily_review_queue, ReviewQueueOptions};
//!
//! let modules = vec![];
//! let graph = build_skill_graph(&modules);
//! let result = build_daily_review_queue(
//!     &modules,
//!     &graph,
//!     &[],
//!     &[],
//!     &ReviewQueueOptions::default(),
//!     Utc::now(),
//! );
//! assert_eq!(result.summary.due_lesson_count, 0);
//! ```

pub mod review_queue;
pub mod sanitize;
pub mod skill_graph;
pub mod types;

pub use types::{Lesson, LessonQuestion, LearningModule, ReviewMasteryRow, ReviewProgressRow};

pub use skill_graph::{
    build_skill_graph, build_skill_graph_at, ModuleSkillSummary, SkillGraph, SkillGraphCoverage,
    SkillGraphEdge, SkillGraphEdgeKind, SkillGraphNode,
};

pub use review_queue::{
    build_daily_review_queue, ReviewQueueItem, ReviewQueueOptions, ReviewQueueResult,
    ReviewQueueSummary, TopOverdueLesson,
};
