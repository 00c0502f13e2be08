//! Immutable chapter content and the repository that serves it.
//!
//! Chapters are authored as JSON ([`ChapterRaw`]) and compiled once at load
//! time into [`Chapter`], which carries a precomputed line id lookup used for
//! branch resolution.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{json_deserialize_error, StoryError, StoryResult};
use crate::policy::{ContentPolicy, ContentReport};
use crate::resource::ResourceLimiter;
use crate::version::CONTENT_SCHEMA_VERSION;

const BUILTIN_CHAPTERS: &str = include_str!("../assets/chapters.json");

/// Who is speaking a line.
///
/// Serialized as a plain string; `"narrator"` is reserved for narration and
/// every other value names a character.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Speaker {
    Narrator,
    Character(String),
}

impl Speaker {
    pub const NARRATOR_ID: &'static str = "narrator";

    pub fn id(&self) -> &str {
        match self {
            Speaker::Narrator => Self::NARRATOR_ID,
            Speaker::Character(id) => id,
        }
    }

    pub fn is_narrator(&self) -> bool {
        matches!(self, Speaker::Narrator)
    }
}

impl From<String> for Speaker {
    fn from(value: String) -> Self {
        if value == Self::NARRATOR_ID {
            Speaker::Narrator
        } else {
            Speaker::Character(value)
        }
    }
}

impl From<&str> for Speaker {
    fn from(value: &str) -> Self {
        Speaker::from(value.to_string())
    }
}

impl From<Speaker> for String {
    fn from(value: Speaker) -> Self {
        match value {
            Speaker::Narrator => Speaker::NARRATOR_ID.to_string(),
            Speaker::Character(id) => id,
        }
    }
}

/// Display-only mood hint attached to a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Scared,
    Thinking,
}

/// One option on a branching line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub text: String,
    pub target_line_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub id: String,
    pub speaker: Speaker,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ChoiceOption>,
}

impl DialogueLine {
    /// Playback halts on this line until a choice is made.
    pub fn is_branch_point(&self) -> bool {
        !self.choices.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterKind {
    #[default]
    Main,
    Side,
}

/// Chapter as authored in JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRaw {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: ChapterKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i32>,
    pub lines: Vec<DialogueLine>,
}

impl ChapterRaw {
    /// Builds the runtime chapter with its line lookup.
    ///
    /// Line ids must be unique; the first occurrence wins if they are not,
    /// which validation reports before this point.
    pub fn compile(&self) -> Chapter {
        let mut line_lookup = HashMap::with_capacity(self.lines.len());
        for (index, line) in self.lines.iter().enumerate() {
            line_lookup.entry(line.id.clone()).or_insert(index);
        }
        Chapter {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            kind: self.kind,
            sort_order: self.sort_order,
            lines: self.lines.clone(),
            line_lookup,
        }
    }
}

/// Runtime chapter. Only produced by [`ChapterRaw::compile`], so `lines` is
/// non-empty once it has gone through the repository.
#[derive(Clone, Debug)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: ChapterKind,
    pub sort_order: Option<i32>,
    pub lines: Vec<DialogueLine>,
    line_lookup: HashMap<String, usize>,
}

impl Chapter {
    pub fn line(&self, index: usize) -> Option<&DialogueLine> {
        self.lines.get(index)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn last_index(&self) -> usize {
        self.lines.len().saturating_sub(1)
    }

    /// Resolves a line id to its playback index.
    pub fn line_index(&self, line_id: &str) -> Option<usize> {
        self.line_lookup.get(line_id).copied()
    }

    pub fn summary(&self) -> ChapterSummary {
        ChapterSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            kind: self.kind,
            line_count: self.lines.len(),
        }
    }
}

/// Catalog row for browse views.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChapterSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: ChapterKind,
    pub line_count: usize,
}

/// Known character with a display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerProfile {
    pub id: String,
    pub display_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ContentEnvelope {
    #[serde(default)]
    content_schema_version: Option<String>,
    #[serde(default)]
    speakers: Vec<SpeakerProfile>,
    chapters: Vec<ChapterRaw>,
}

/// Read-only collection of chapters, loaded once.
#[derive(Clone, Debug, Default)]
pub struct ContentRepository {
    chapters: Vec<Arc<Chapter>>,
    by_id: HashMap<String, usize>,
    speakers: HashMap<String, SpeakerProfile>,
    report: ContentReport,
}

impl ContentRepository {
    /// Loads the chapter pack embedded in the crate.
    pub fn builtin() -> StoryResult<Self> {
        Self::from_json(BUILTIN_CHAPTERS)
    }

    pub fn load_from(path: &Path) -> StoryResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            StoryError::InvalidContent(format!("cannot read '{}': {err}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(input: &str) -> StoryResult<Self> {
        Self::from_json_with(input, &ContentPolicy::default(), ResourceLimiter::default())
    }

    pub fn from_json_with(
        input: &str,
        policy: &ContentPolicy,
        limits: ResourceLimiter,
    ) -> StoryResult<Self> {
        if input.len() > limits.max_content_bytes {
            return Err(StoryError::ResourceLimit("content size".to_string()));
        }
        let envelope: ContentEnvelope =
            serde_json::from_str(input).map_err(|err| json_deserialize_error(input, &err))?;
        match envelope.content_schema_version.as_deref() {
            Some(version) if version != CONTENT_SCHEMA_VERSION => {
                return Err(StoryError::InvalidContent(format!(
                    "schema incompatible: found {version}, expected {CONTENT_SCHEMA_VERSION}"
                )));
            }
            Some(_) => {}
            // Legacy packs predate the version field.
            None => debug!("loading content without schema version"),
        }
        Self::from_parts(envelope.chapters, envelope.speakers, policy, limits)
    }

    pub fn from_chapters(chapters: Vec<ChapterRaw>) -> StoryResult<Self> {
        Self::from_parts(
            chapters,
            Vec::new(),
            &ContentPolicy::default(),
            ResourceLimiter::default(),
        )
    }

    pub fn from_parts(
        chapters: Vec<ChapterRaw>,
        speakers: Vec<SpeakerProfile>,
        policy: &ContentPolicy,
        limits: ResourceLimiter,
    ) -> StoryResult<Self> {
        let speakers: HashMap<String, SpeakerProfile> = speakers
            .into_iter()
            .map(|profile| (profile.id.clone(), profile))
            .collect();
        let report = policy.validate(&chapters, &speakers, limits)?;
        for warning in &report.warnings {
            warn!(%warning, "content warning");
        }

        let mut by_id = HashMap::with_capacity(chapters.len());
        let compiled = chapters
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                by_id.insert(raw.id.clone(), index);
                Arc::new(raw.compile())
            })
            .collect();

        Ok(Self {
            chapters: compiled,
            by_id,
            speakers,
            report,
        })
    }

    pub fn get_chapter(&self, id: &str) -> Option<Arc<Chapter>> {
        self.by_id
            .get(id)
            .and_then(|index| self.chapters.get(*index))
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Chapter summaries ordered by `sort_order`, then authoring order.
    pub fn list_chapters(&self) -> Vec<ChapterSummary> {
        let mut ordered: Vec<(usize, &Arc<Chapter>)> = self.chapters.iter().enumerate().collect();
        ordered.sort_by_key(|(index, chapter)| (chapter.sort_order.unwrap_or(i32::MAX), *index));
        ordered
            .into_iter()
            .map(|(_, chapter)| chapter.summary())
            .collect()
    }

    pub fn speaker(&self, id: &str) -> Option<&SpeakerProfile> {
        self.speakers.get(id)
    }

    /// Label the shell shows for a speaker. Narration has none; unknown
    /// characters fall back to their raw id.
    pub fn speaker_label(&self, speaker: &Speaker) -> Option<String> {
        match speaker {
            Speaker::Narrator => None,
            Speaker::Character(id) => Some(
                self.speakers
                    .get(id)
                    .map(|profile| profile.display_name.clone())
                    .unwrap_or_else(|| id.clone()),
            ),
        }
    }

    pub fn report(&self) -> &ContentReport {
        &self.report
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/content_tests.rs"]
mod tests;
