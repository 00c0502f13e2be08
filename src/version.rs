//! Format versioning constants for content and persisted progress.

/// Current schema version for JSON chapter packs.
pub const CONTENT_SCHEMA_VERSION: &str = "1.0";

/// Default prefix for per-chapter progress keys (`<namespace>_<chapterId>`).
pub const DEFAULT_PROGRESS_NAMESPACE: &str = "story_progress";

/// Default key holding the JSON array of unlocked chapter ids.
pub const DEFAULT_UNLOCK_KEY: &str = "unlocked_chapters";
