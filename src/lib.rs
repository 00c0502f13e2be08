//! Story viewer core: chapter content, reading progress persistence, and the
//! dialogue playback state machine that drives a story viewer.

mod config;
mod content;
mod engine;
mod error;
mod policy;
mod resource;
mod state;
mod store;
mod timer;
mod ui;
mod version;

pub use config::{AutoAdvanceDelay, ViewerConfig};
pub use content::{
    Chapter, ChapterKind, ChapterRaw, ChapterSummary, ChoiceOption, ContentRepository,
    DialogueLine, Emotion, Speaker, SpeakerProfile,
};
pub use engine::PlaybackEngine;
pub use error::{StoryError, StoryResult};
pub use policy::{ContentPolicy, ContentReport, ContentWarning};
pub use resource::ResourceLimiter;
pub use state::{resume_index, AutoAdvance, PlaybackEvent, PlaybackPhase, PlaybackState};
pub use store::{
    ChangeListener, FileStore, KeyValueStore, MemoryStore, ProgressChange, ProgressStore,
    StoreChange, StoreError, StoreResult, SubscriptionId,
};
pub use timer::{Millis, TimerHandle, TimerSlot};
pub use ui::{catalog, CatalogEntry, PlaybackView};
pub use version::{CONTENT_SCHEMA_VERSION, DEFAULT_PROGRESS_NAMESPACE, DEFAULT_UNLOCK_KEY};
