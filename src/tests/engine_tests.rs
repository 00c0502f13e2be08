use super::*;
use crate::content::{ChapterRaw, Speaker};
use crate::store::MemoryStore;

fn line(id: &str, text: &str) -> DialogueLine {
    DialogueLine {
        id: id.to_string(),
        speaker: Speaker::Narrator,
        text: text.to_string(),
        emotion: None,
        choices: Vec::new(),
    }
}

fn chapter(id: &str, lines: Vec<DialogueLine>) -> ChapterRaw {
    ChapterRaw {
        id: id.to_string(),
        title: id.to_uppercase(),
        description: String::new(),
        kind: Default::default(),
        sort_order: None,
        lines,
    }
}

fn engine_with(chapters: Vec<ChapterRaw>, config: &ViewerConfig) -> PlaybackEngine<MemoryStore> {
    let content = ContentRepository::from_chapters(chapters).expect("content");
    PlaybackEngine::new(
        Arc::new(content),
        ProgressStore::new(MemoryStore::new()),
        config,
    )
}

fn linear_engine() -> PlaybackEngine<MemoryStore> {
    engine_with(
        vec![
            chapter("a", vec![line("a1", "Hi"), line("a2", "Yo"), line("a3", "Bye")]),
            chapter("b", vec![line("b1", "Other")]),
        ],
        &ViewerConfig::default(),
    )
}

#[test]
fn reveal_timer_types_one_character_per_interval() {
    let mut engine = linear_engine();
    engine.open_chapter("a").expect("open");
    assert_eq!(engine.typed_text(), "");
    assert_eq!(engine.next_deadline(), Some(30));

    engine.advance_time(29);
    assert_eq!(engine.typed_text(), "");
    engine.advance_time(1);
    assert_eq!(engine.typed_text(), "H");
    engine.advance_time(30);
    assert_eq!(engine.typed_text(), "Hi");
    assert_eq!(engine.phase(), PlaybackPhase::Idle);
    assert_eq!(engine.live_timer_count(), 0);
}

#[test]
fn typing_handles_multibyte_text() {
    let mut engine = engine_with(
        vec![chapter("a", vec![line("a1", "héllo"), line("a2", "x")])],
        &ViewerConfig::default(),
    );
    engine.open_chapter("a").expect("open");
    engine.tick();
    engine.tick();
    assert_eq!(engine.typed_text(), "hé");
    engine.advance_time(30 * 3);
    assert_eq!(engine.typed_text(), "héllo");
}

#[test]
fn auto_advance_moves_on_after_the_delay() {
    let config = ViewerConfig {
        auto_advance: true,
        auto_advance_delay: AutoAdvanceDelay::Fast,
        ..ViewerConfig::default()
    };
    let mut engine = engine_with(
        vec![chapter("a", vec![line("a1", "Hi"), line("a2", "Yo")])],
        &config,
    );
    engine.open_chapter("a").expect("open");
    engine.advance_time(60);
    assert_eq!(engine.phase(), PlaybackPhase::Idle);
    assert_eq!(engine.next_deadline(), Some(60 + 1_500));

    engine.advance_time(1_499);
    assert_eq!(engine.current_index(), Some(0));
    engine.advance_time(1);
    assert_eq!(engine.current_index(), Some(1));
    assert!(engine.is_typing());

    engine.advance_time(60);
    assert!(engine.is_complete());
    assert_eq!(engine.live_timer_count(), 0);
}

#[test]
fn skipping_typing_arms_auto_advance_from_the_click() {
    let mut engine = linear_engine();
    engine.set_auto_advance(true, AutoAdvanceDelay::Normal);
    engine.open_chapter("a").expect("open");
    engine.advance_time(10);
    engine.advance();
    assert_eq!(engine.phase(), PlaybackPhase::Idle);
    assert_eq!(engine.next_deadline(), Some(10 + 3_000));
}

#[test]
fn auto_advance_settings_apply_on_next_idle_entry() {
    let mut engine = linear_engine();
    engine.open_chapter("a").expect("open");
    engine.advance();
    assert_eq!(engine.live_timer_count(), 0);

    engine.set_auto_advance(true, AutoAdvanceDelay::Fast);
    assert_eq!(engine.live_timer_count(), 0);

    engine.advance();
    engine.advance();
    assert_eq!(engine.phase(), PlaybackPhase::Idle);
    assert_eq!(engine.live_timer_count(), 1);
}

#[test]
fn manual_advance_cancels_pending_auto_advance() {
    let mut engine = linear_engine();
    engine.set_auto_advance(true, AutoAdvanceDelay::Fast);
    engine.open_chapter("a").expect("open");
    engine.advance();
    assert_eq!(engine.live_timer_count(), 1);

    engine.advance();
    assert_eq!(engine.current_index(), Some(1));
    assert_eq!(engine.live_timer_count(), 1);
    assert_eq!(engine.next_deadline(), Some(30));
}

#[test]
fn switch_chapter_flushes_and_resets_timers() {
    let mut engine = linear_engine();
    engine.open_chapter("a").expect("open");
    engine.jump_to(2);
    engine.switch_chapter("b").expect("switch");

    assert_eq!(engine.store().get("a"), Some(2));
    assert_eq!(engine.current_chapter().map(|c| c.id.as_str()), Some("b"));
    assert_eq!(engine.current_index(), Some(0));
    assert_eq!(engine.live_timer_count(), 1);
}

#[test]
fn failed_switch_leaves_the_session_untouched() {
    let mut engine = linear_engine();
    engine.open_chapter("a").expect("open");
    engine.advance_time(30);
    let before = engine.state().cloned();

    let err = engine.switch_chapter("missing").expect_err("unknown chapter");
    assert!(matches!(err, StoryError::ChapterNotFound { ref chapter_id } if chapter_id == "missing"));
    assert_eq!(engine.state().cloned(), before);
    assert_eq!(engine.live_timer_count(), 1);
}

#[test]
fn close_cancels_timers_and_flushes() {
    let mut engine = linear_engine();
    engine.set_auto_advance(true, AutoAdvanceDelay::Fast);
    engine.open_chapter("a").expect("open");
    engine.advance();
    engine.close();

    assert_eq!(engine.phase(), PlaybackPhase::Closed);
    assert_eq!(engine.live_timer_count(), 0);
    assert_eq!(engine.store().get("a"), Some(0));
    engine.advance_time(10_000);
    assert_eq!(engine.phase(), PlaybackPhase::Closed);
}

#[test]
fn storage_failure_does_not_stop_playback() {
    let raw = MemoryStore::new();
    raw.set_read_only(true);
    let content =
        ContentRepository::from_chapters(vec![chapter("a", vec![line("a1", "Hi"), line("a2", "Yo")])])
            .expect("content");
    let mut engine = PlaybackEngine::new(
        Arc::new(content),
        ProgressStore::new(raw),
        &ViewerConfig::default(),
    );
    engine.open_chapter("a").expect("open");
    engine.advance();
    engine.advance();
    assert_eq!(engine.current_index(), Some(1));
    assert_eq!(engine.store().get("a"), None);
}

#[test]
fn previous_and_next_line_clamp_to_the_chapter() {
    let mut engine = linear_engine();
    engine.open_chapter("a").expect("open");
    engine.previous_line();
    assert_eq!(engine.current_index(), Some(0));
    engine.next_line();
    engine.next_line();
    engine.next_line();
    assert_eq!(engine.current_index(), Some(2));
    assert_eq!(engine.typed_text(), "");
    assert_eq!(engine.store().get("a"), Some(2));
}

#[test]
fn events_report_line_lifecycle() {
    let mut engine = engine_with(
        vec![chapter("a", vec![line("a1", "Hi")])],
        &ViewerConfig::default(),
    );
    engine.open_chapter("a").expect("open");
    engine.advance();
    let events = engine.drain_events();
    assert_eq!(
        events,
        vec![
            PlaybackEvent::LineStarted {
                chapter_id: "a".to_string(),
                line_index: 0
            },
            PlaybackEvent::LineRevealed {
                chapter_id: "a".to_string(),
                line_index: 0
            },
            PlaybackEvent::ChapterCompleted {
                chapter_id: "a".to_string()
            },
        ]
    );
    assert!(engine.drain_events().is_empty());
    assert_eq!(engine.progress_percent(), 100);
}

#[test]
fn operations_on_a_closed_engine_are_inert() {
    let mut engine = linear_engine();
    assert_eq!(engine.advance(), PlaybackPhase::Closed);
    assert_eq!(engine.jump_to(3), PlaybackPhase::Closed);
    assert_eq!(engine.choose_branch("a2"), PlaybackPhase::Closed);
    assert_eq!(engine.typed_text(), "");
    assert!(engine.view().is_none());
    assert_eq!(engine.progress_percent(), 0);
}
