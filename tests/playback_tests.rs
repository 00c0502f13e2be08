mod common;

use story_viewer::{
    AutoAdvanceDelay, KeyValueStore, MemoryStore, PlaybackPhase, ProgressStore, StoryError,
};

use common::{engine, engine_with_store};

#[test]
fn typing_grows_monotonically_and_finishes_once() {
    let (mut engine, _) = engine();
    engine.open_chapter("fork").expect("open");
    let full = "Fog.";

    let mut last_len = engine.typed_text().len();
    let mut finished = 0;
    for _ in 0..full.len() {
        let was_typing = engine.is_typing();
        engine.tick();
        let len = engine.typed_text().len();
        assert!(len > last_len, "typed text must grow on every tick");
        last_len = len;
        if was_typing && !engine.is_typing() {
            finished += 1;
        }
    }
    assert_eq!(engine.typed_text(), full);
    assert_eq!(finished, 1);

    engine.tick();
    assert_eq!(engine.typed_text(), full);
    assert!(!engine.is_typing());
}

#[test]
fn skip_reveals_the_full_line_from_any_point() {
    for revealed in 0..4 {
        let (mut engine, _) = engine();
        engine.open_chapter("fork").expect("open");
        for _ in 0..revealed {
            engine.tick();
        }
        engine.advance();
        assert_eq!(engine.typed_text(), "Fog.");
        assert!(!engine.is_typing());
        assert_eq!(engine.current_index(), Some(0));
    }
}

#[test]
fn advance_never_passes_a_branch_point() {
    let (mut engine, _) = engine();
    engine.open_chapter("fork").expect("open");
    engine.advance();
    engine.advance();
    engine.advance();
    assert!(engine.is_awaiting_choice());

    for _ in 0..5 {
        assert_eq!(engine.advance(), PlaybackPhase::AwaitingChoice);
        assert_eq!(engine.current_index(), Some(1));
    }
    engine.advance_time(60_000);
    assert_eq!(engine.current_index(), Some(1));
}

#[test]
fn every_index_change_is_readable_from_the_store() {
    let (mut engine, observer) = engine();
    let observer = ProgressStore::new(observer);
    engine.open_chapter("fork").expect("open");

    engine.advance();
    engine.advance();
    assert_eq!(observer.get("fork"), Some(1));

    engine.advance();
    engine.choose_branch("l1");
    assert_eq!(observer.get("fork"), Some(0));

    engine.jump_to(2);
    assert_eq!(observer.get("fork"), Some(2));
}

#[test]
fn opening_resumes_from_saved_progress() {
    let mut raw = MemoryStore::new();
    raw.set("story_progress_fork", "2").expect("seed");
    let mut engine = engine_with_store(raw);
    engine.open_chapter("fork").expect("open");
    assert_eq!(engine.current_index(), Some(2));
    assert!(engine.is_typing());
}

#[test]
fn out_of_range_saved_progress_restarts_the_chapter() {
    for stored in ["3", "-1", "99999999999999999999"] {
        let mut raw = MemoryStore::new();
        raw.set("story_progress_fork", stored).expect("seed");
        let mut engine = engine_with_store(raw);
        engine.open_chapter("fork").expect("open");
        assert_eq!(engine.current_index(), Some(0), "stored value {stored}");
    }
}

#[test]
fn branching_scenario_lands_on_the_chosen_line() {
    let (mut engine, observer) = engine();
    let observer = ProgressStore::new(observer);

    engine.open_chapter("fork").expect("open");
    engine.advance();
    assert_eq!(engine.phase(), PlaybackPhase::Idle);
    engine.advance();
    assert_eq!(engine.phase(), PlaybackPhase::Typing);
    assert_eq!(engine.current_index(), Some(1));
    engine.advance();
    assert_eq!(engine.phase(), PlaybackPhase::AwaitingChoice);

    let target = engine.choices()[1].target_line_id.clone();
    engine.choose_branch(&target);
    assert_eq!(engine.phase(), PlaybackPhase::Typing);
    assert_eq!(engine.current_index(), Some(2));
    assert_eq!(observer.get("fork"), Some(2));
}

#[test]
fn malformed_saved_progress_starts_at_the_first_line() {
    let mut raw = MemoryStore::new();
    raw.set("story_progress_fork", "abc").expect("seed");
    let mut engine = engine_with_store(raw);
    engine
        .open_chapter("fork")
        .expect("malformed progress is not an error");
    assert_eq!(engine.current_index(), Some(0));
}

#[test]
fn dangling_branch_target_advances_linearly() {
    let (mut engine, _) = engine();
    engine.open_chapter("dangling").expect("open");
    engine.advance();
    assert!(engine.is_awaiting_choice());

    engine.choose(0);
    assert_eq!(engine.current_index(), Some(1));
    assert!(engine.is_typing());
}

#[test]
fn dangling_branch_on_the_last_line_completes_the_chapter() {
    use common::{branching_line, chapter, line};
    use std::sync::Arc;
    use story_viewer::{ContentRepository, PlaybackEngine, ViewerConfig};

    let content = ContentRepository::from_chapters(vec![chapter(
        "tail",
        vec![
            line("t1", "narrator", "Start."),
            branching_line("t2", "Last.", &[("Gone", "nowhere")]),
        ],
    )])
    .expect("content");
    let mut engine = PlaybackEngine::new(
        Arc::new(content),
        ProgressStore::new(MemoryStore::new()),
        &ViewerConfig::default(),
    );
    engine.open_chapter("tail").expect("open");
    engine.jump_to(1);
    engine.advance();
    engine.choose(0);
    assert!(engine.is_complete());
    assert_eq!(engine.current_index(), Some(1));
}

#[test]
fn unknown_chapter_is_reported_without_side_effects() {
    let (mut engine, observer) = engine();
    let err = engine.open_chapter("nope").expect_err("missing chapter");
    assert!(matches!(err, StoryError::ChapterNotFound { .. }));
    assert_eq!(engine.phase(), PlaybackPhase::Closed);
    assert!(observer.is_empty());
}

#[test]
fn timers_stay_exclusive_across_any_operation_sequence() {
    let (mut engine, _) = engine();
    engine.set_auto_advance(true, AutoAdvanceDelay::Fast);
    engine.open_chapter("fork").expect("open");

    // Deterministic pseudo-random walk over every engine operation.
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    for _ in 0..2_000 {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        match seed % 9 {
            0 | 1 => {
                engine.advance();
            }
            2 => engine.tick(),
            3 => engine.advance_time(seed % 200),
            4 => engine.advance_time(1_500),
            5 => {
                engine.choose((seed % 3) as usize);
            }
            6 => {
                engine.jump_to((seed % 4) as usize);
            }
            7 => {
                let target = if seed % 2 == 0 { "fork" } else { "dangling" };
                engine.switch_chapter(target).expect("switch");
            }
            _ => engine.set_auto_advance(seed % 2 == 0, AutoAdvanceDelay::Fast),
        }
        assert!(engine.live_timer_count() <= 1);
        match engine.phase() {
            PlaybackPhase::Typing => assert_eq!(engine.live_timer_count(), 1),
            PlaybackPhase::AwaitingChoice => {
                assert!(!engine.choices().is_empty());
                assert_eq!(engine.live_timer_count(), 0);
            }
            PlaybackPhase::Complete | PlaybackPhase::Closed => {
                assert_eq!(engine.live_timer_count(), 0)
            }
            PlaybackPhase::Idle => {}
        }
    }
}
