//! Playback state owned by the engine.

use serde::Serialize;

use crate::config::AutoAdvanceDelay;

/// Where the engine is in the current line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    /// No chapter open.
    Closed,
    /// Line fully shown, ready to advance.
    Idle,
    /// Reveal timer running.
    Typing,
    /// Line fully shown, waiting for a choice.
    AwaitingChoice,
    /// Last line fully shown with no choices.
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AutoAdvance {
    pub enabled: bool,
    pub delay: AutoAdvanceDelay,
}

impl Default for AutoAdvance {
    fn default() -> Self {
        Self {
            enabled: false,
            delay: AutoAdvanceDelay::Normal,
        }
    }
}

/// Per-session state for the open chapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlaybackState {
    pub line_index: usize,
    /// Byte length of the revealed prefix of the current line's text.
    pub revealed_bytes: usize,
    pub phase: PlaybackPhase,
}

impl PlaybackState {
    pub fn new(line_index: usize) -> Self {
        Self {
            line_index,
            revealed_bytes: 0,
            phase: PlaybackPhase::Typing,
        }
    }
}

/// Notifications drained by the shell after each transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    LineStarted { chapter_id: String, line_index: usize },
    LineRevealed { chapter_id: String, line_index: usize },
    ChoicePresented { chapter_id: String, line_index: usize },
    ChapterCompleted { chapter_id: String },
}

/// Where a chapter resumes given its stored progress. Anything outside
/// `[0, line_count)` restarts at the first line.
pub fn resume_index(stored: Option<i64>, line_count: usize) -> usize {
    match stored {
        Some(index) if index >= 0 && (index as u64) < line_count as u64 => index as usize,
        _ => 0,
    }
}

/// Percentage through a chapter when `line_index` is the current line.
pub fn percent_through(line_index: usize, line_count: usize) -> u8 {
    if line_count == 0 {
        return 0;
    }
    let reached = (line_index + 1).min(line_count);
    (reached * 100 / line_count) as u8
}
