//! Load-time validation for authored chapters.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::content::{ChapterRaw, Speaker, SpeakerProfile};
use crate::error::{StoryError, StoryResult};
use crate::resource::ResourceLimiter;

/// Policy used to validate chapter content before it is served.
///
/// Structural problems (empty chapters, duplicate ids, oversized text) are
/// errors. Problems playback can survive are reported as warnings.
#[derive(Clone, Debug)]
pub struct ContentPolicy {
    pub allow_empty_text: bool,
    pub report_unknown_speakers: bool,
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self {
            allow_empty_text: false,
            report_unknown_speakers: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentWarning {
    DanglingChoiceTarget {
        chapter_id: String,
        line_id: String,
        target_line_id: String,
    },
    UnknownSpeaker {
        chapter_id: String,
        line_id: String,
        speaker: String,
    },
}

impl fmt::Display for ContentWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentWarning::DanglingChoiceTarget {
                chapter_id,
                line_id,
                target_line_id,
            } => write!(
                f,
                "{chapter_id}/{line_id}: choice target '{target_line_id}' not found"
            ),
            ContentWarning::UnknownSpeaker {
                chapter_id,
                line_id,
                speaker,
            } => write!(f, "{chapter_id}/{line_id}: unknown speaker '{speaker}'"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentReport {
    pub warnings: Vec<ContentWarning>,
}

impl ContentReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

impl ContentPolicy {
    pub fn validate(
        &self,
        chapters: &[ChapterRaw],
        speakers: &HashMap<String, SpeakerProfile>,
        limits: ResourceLimiter,
    ) -> StoryResult<ContentReport> {
        if chapters.len() > limits.max_chapters {
            return Err(StoryError::ResourceLimit("chapter count".to_string()));
        }

        let mut report = ContentReport::default();
        let mut chapter_ids = HashSet::with_capacity(chapters.len());
        for chapter in chapters {
            check_id(&chapter.id, "chapter id", limits)?;
            if !chapter_ids.insert(chapter.id.as_str()) {
                return Err(StoryError::InvalidContent(format!(
                    "duplicate chapter id '{}'",
                    chapter.id
                )));
            }
            self.validate_chapter(chapter, speakers, limits, &mut report)?;
        }
        Ok(report)
    }

    fn validate_chapter(
        &self,
        chapter: &ChapterRaw,
        speakers: &HashMap<String, SpeakerProfile>,
        limits: ResourceLimiter,
        report: &mut ContentReport,
    ) -> StoryResult<()> {
        if chapter.lines.is_empty() {
            return Err(StoryError::InvalidContent(format!(
                "chapter '{}' has no lines",
                chapter.id
            )));
        }
        if chapter.lines.len() > limits.max_lines_per_chapter {
            return Err(StoryError::ResourceLimit(format!(
                "line count in chapter '{}'",
                chapter.id
            )));
        }

        let mut line_ids = HashSet::with_capacity(chapter.lines.len());
        for line in &chapter.lines {
            check_id(&line.id, "line id", limits)?;
            if !line_ids.insert(line.id.as_str()) {
                return Err(StoryError::InvalidContent(format!(
                    "duplicate line id '{}' in chapter '{}'",
                    line.id, chapter.id
                )));
            }
            if !self.allow_empty_text && line.text.trim().is_empty() {
                return Err(StoryError::InvalidContent(format!(
                    "line '{}' in chapter '{}' has no text",
                    line.id, chapter.id
                )));
            }
            if line.text.len() > limits.max_text_length {
                return Err(StoryError::ResourceLimit("dialogue text".to_string()));
            }
            if line.choices.len() > limits.max_choices {
                return Err(StoryError::ResourceLimit("choice count".to_string()));
            }
            for choice in &line.choices {
                if choice.text.len() > limits.max_text_length {
                    return Err(StoryError::ResourceLimit("choice text".to_string()));
                }
            }
            if let Speaker::Character(id) = &line.speaker {
                if self.report_unknown_speakers && !speakers.is_empty() && !speakers.contains_key(id)
                {
                    report.warnings.push(ContentWarning::UnknownSpeaker {
                        chapter_id: chapter.id.clone(),
                        line_id: line.id.clone(),
                        speaker: id.clone(),
                    });
                }
            }
        }

        // Targets can point forward, so check once every id is known.
        for line in &chapter.lines {
            for choice in &line.choices {
                if !line_ids.contains(choice.target_line_id.as_str()) {
                    report.warnings.push(ContentWarning::DanglingChoiceTarget {
                        chapter_id: chapter.id.clone(),
                        line_id: line.id.clone(),
                        target_line_id: choice.target_line_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn check_id(id: &str, what: &str, limits: ResourceLimiter) -> StoryResult<()> {
    if id.trim().is_empty() {
        return Err(StoryError::InvalidContent(format!("{what} cannot be empty")));
    }
    if id.len() > limits.max_id_length {
        return Err(StoryError::ResourceLimit(format!("{what} '{id}' too long")));
    }
    Ok(())
}
