//! View models consumed by presentation shells.

use serde::Serialize;

use crate::content::{Chapter, ChapterSummary, ContentRepository, DialogueLine, Emotion};
use crate::state::{percent_through, resume_index, PlaybackPhase};
use crate::store::{KeyValueStore, ProgressStore};

/// Everything a shell needs to draw the current line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlaybackView {
    pub chapter_id: String,
    pub chapter_title: String,
    pub line_id: String,
    /// `None` for narration.
    pub speaker_label: Option<String>,
    pub emotion: Option<Emotion>,
    pub typed_text: String,
    pub choices: Vec<String>,
    pub phase: PlaybackPhase,
    pub progress_percent: u8,
    /// 1-based position for "line n of m" displays.
    pub line_number: usize,
    pub line_count: usize,
}

impl PlaybackView {
    pub(crate) fn build(
        content: &ContentRepository,
        chapter: &Chapter,
        line: &DialogueLine,
        typed_text: &str,
        phase: PlaybackPhase,
        progress_percent: u8,
        line_index: usize,
    ) -> Self {
        // Choices stay hidden until the line has finished typing.
        let choices = if phase == PlaybackPhase::AwaitingChoice {
            line.choices.iter().map(|choice| choice.text.clone()).collect()
        } else {
            Vec::new()
        };
        Self {
            chapter_id: chapter.id.clone(),
            chapter_title: chapter.title.clone(),
            line_id: line.id.clone(),
            speaker_label: content.speaker_label(&line.speaker),
            emotion: line.emotion,
            typed_text: typed_text.to_string(),
            choices,
            phase,
            progress_percent,
            line_number: line_index + 1,
            line_count: chapter.line_count(),
        }
    }
}

/// Browse-view row: chapter summary plus persisted reading state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub summary: ChapterSummary,
    pub unlocked: bool,
    pub percent_complete: u8,
}

/// Builds the chapter catalog from content and the progress store.
///
/// Chapters with no usable progress show 0%.
pub fn catalog<S: KeyValueStore>(
    content: &ContentRepository,
    store: &ProgressStore<S>,
) -> Vec<CatalogEntry> {
    let unlocked = store.unlocked_chapters();
    content
        .list_chapters()
        .into_iter()
        .map(|summary| {
            let stored = store.get(&summary.id);
            let index = resume_index(stored, summary.line_count);
            let percent_complete = match stored {
                Some(value) if value == index as i64 => {
                    percent_through(index, summary.line_count)
                }
                _ => 0,
            };
            CatalogEntry {
                unlocked: unlocked.iter().any(|id| *id == summary.id),
                percent_complete,
                summary,
            }
        })
        .collect()
}
