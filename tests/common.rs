#![allow(dead_code)]

use std::sync::Arc;

use story_viewer::{
    ChapterRaw, ChoiceOption, ContentRepository, DialogueLine, MemoryStore, PlaybackEngine,
    ProgressStore, Speaker, ViewerConfig,
};

pub fn line(id: &str, speaker: &str, text: &str) -> DialogueLine {
    DialogueLine {
        id: id.to_string(),
        speaker: Speaker::from(speaker),
        text: text.to_string(),
        emotion: None,
        choices: Vec::new(),
    }
}

pub fn branching_line(id: &str, text: &str, choices: &[(&str, &str)]) -> DialogueLine {
    DialogueLine {
        choices: choices
            .iter()
            .map(|(text, target)| ChoiceOption {
                text: text.to_string(),
                target_line_id: target.to_string(),
            })
            .collect(),
        ..line(id, "mara", text)
    }
}

pub fn chapter(id: &str, lines: Vec<DialogueLine>) -> ChapterRaw {
    ChapterRaw {
        id: id.to_string(),
        title: format!("Chapter {id}"),
        description: String::new(),
        kind: Default::default(),
        sort_order: None,
        lines,
    }
}

/// Three lines; the second offers a choice back to the first or on to the
/// third.
pub fn fork_chapter() -> ChapterRaw {
    chapter(
        "fork",
        vec![
            line("l1", "narrator", "Fog."),
            branching_line("l2", "Which way?", &[("Back", "l1"), ("On", "l3")]),
            line("l3", "mara", "Onward."),
        ],
    )
}

pub fn dangling_chapter() -> ChapterRaw {
    chapter(
        "dangling",
        vec![
            branching_line("d1", "Pick.", &[("Nowhere", "missing_line")]),
            line("d2", "narrator", "Linear."),
            line("d3", "narrator", "End."),
        ],
    )
}

pub fn content() -> Arc<ContentRepository> {
    Arc::new(
        ContentRepository::from_chapters(vec![fork_chapter(), dangling_chapter()])
            .expect("test content"),
    )
}

/// Engine over a fresh shared store; the returned handle is another session
/// onto the same entries.
pub fn engine() -> (PlaybackEngine<MemoryStore>, MemoryStore) {
    let raw = MemoryStore::new();
    let observer = raw.session();
    let engine = PlaybackEngine::new(
        content(),
        ProgressStore::new(raw),
        &ViewerConfig::default(),
    );
    (engine, observer)
}

pub fn engine_with_store(raw: MemoryStore) -> PlaybackEngine<MemoryStore> {
    PlaybackEngine::new(content(), ProgressStore::new(raw), &ViewerConfig::default())
}
