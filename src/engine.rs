//! Dialogue playback engine.
//!
//! Sequences a chapter's lines with a typewriter reveal, halts on branch
//! points, optionally auto-advances, and writes the line index to the
//! progress store on every change.
//!
//! # Contracts
//! - **Invariant**: at most one live reveal timer and one live auto-advance
//!   timer. Every transition that supersedes a timer cancels it first.
//! - **Invariant**: `advance` never moves past a line with choices.
//! - **Invariant**: `ChapterNotFound` is returned before any state changes.
//! - Storage failures are logged and absorbed; playback continues.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::config::{AutoAdvanceDelay, ViewerConfig};
use crate::content::{Chapter, ChoiceOption, ContentRepository, DialogueLine};
use crate::error::{StoryError, StoryResult};
use crate::state::{
    percent_through, resume_index, AutoAdvance, PlaybackEvent, PlaybackPhase, PlaybackState,
};
use crate::store::{KeyValueStore, ProgressChange, ProgressStore, SubscriptionId};
use crate::timer::{Millis, TimerSlot};
use crate::ui::PlaybackView;

#[derive(Clone, Debug)]
struct Session {
    chapter: Arc<Chapter>,
    state: PlaybackState,
}

/// Playback state machine for one viewer.
#[derive(Debug)]
pub struct PlaybackEngine<S: KeyValueStore> {
    content: Arc<ContentRepository>,
    store: ProgressStore<S>,
    session: Option<Session>,
    reveal_timer: TimerSlot,
    auto_timer: TimerSlot,
    reveal_interval: Millis,
    auto_advance: AutoAdvance,
    now: Millis,
    events: Vec<PlaybackEvent>,
}

impl<S: KeyValueStore> PlaybackEngine<S> {
    pub fn new(
        content: Arc<ContentRepository>,
        store: ProgressStore<S>,
        config: &ViewerConfig,
    ) -> Self {
        Self {
            content,
            store,
            session: None,
            reveal_timer: TimerSlot::new(),
            auto_timer: TimerSlot::new(),
            reveal_interval: config.reveal_interval(),
            auto_advance: AutoAdvance {
                enabled: config.auto_advance,
                delay: config.auto_advance_delay,
            },
            now: 0,
            events: Vec::new(),
        }
    }

    /// Opens a chapter at its saved line, or the first line when nothing
    /// usable is saved.
    #[instrument(skip(self))]
    pub fn open_chapter(&mut self, chapter_id: &str) -> StoryResult<()> {
        let chapter = self
            .content
            .get_chapter(chapter_id)
            .ok_or_else(|| StoryError::chapter_not_found(chapter_id))?;
        self.cancel_timers();

        let stored = self.store.get(&chapter.id);
        let line_index = resume_index(stored, chapter.line_count());
        if let Some(value) = stored {
            if value != line_index as i64 {
                warn!(value, "saved progress out of range, starting from the first line");
            }
        }
        info!(line_index, lines = chapter.line_count(), "chapter opened");

        self.session = Some(Session {
            chapter,
            state: PlaybackState::new(line_index),
        });
        self.start_line();
        Ok(())
    }

    /// Flushes the current chapter, then opens another one.
    #[instrument(skip(self))]
    pub fn switch_chapter(&mut self, chapter_id: &str) -> StoryResult<()> {
        if !self.content.contains(chapter_id) {
            return Err(StoryError::chapter_not_found(chapter_id));
        }
        self.cancel_timers();
        self.flush();
        self.open_chapter(chapter_id)
    }

    /// Ends the session. Timers are cancelled before the final flush.
    pub fn close(&mut self) {
        self.cancel_timers();
        self.flush();
        if let Some(session) = self.session.take() {
            info!(chapter_id = %session.chapter.id, "chapter closed");
        }
    }

    /// Skips the reveal when typing, otherwise moves to the next line.
    /// Does nothing while a choice is pending or the chapter is complete.
    pub fn advance(&mut self) -> PlaybackPhase {
        match self.phase() {
            PlaybackPhase::Typing => self.finish_reveal(),
            PlaybackPhase::Idle => {
                if let Some(session) = &self.session {
                    let next = session.state.line_index + 1;
                    if next <= session.chapter.last_index() {
                        self.move_to(next);
                    }
                }
            }
            PlaybackPhase::AwaitingChoice => debug!("advance ignored, choice pending"),
            PlaybackPhase::Complete | PlaybackPhase::Closed => {}
        }
        self.phase()
    }

    /// Reveals one more character of the current line.
    pub fn tick(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state.phase != PlaybackPhase::Typing {
            return;
        }
        let chapter = Arc::clone(&session.chapter);
        let Some(line) = chapter.line(session.state.line_index) else {
            return;
        };
        if let Some(next) = line.text[session.state.revealed_bytes..].chars().next() {
            session.state.revealed_bytes += next.len_utf8();
        }
        if session.state.revealed_bytes >= line.text.len() {
            self.finish_reveal();
        }
    }

    /// Follows a choice to its target line. A target missing from the
    /// chapter falls back to the next line.
    #[instrument(skip(self))]
    pub fn choose_branch(&mut self, target_line_id: &str) -> PlaybackPhase {
        if self.phase() != PlaybackPhase::AwaitingChoice {
            debug!("no choice pending");
            return self.phase();
        }
        let Some(session) = &self.session else {
            return PlaybackPhase::Closed;
        };
        let chapter = Arc::clone(&session.chapter);
        let current = session.state.line_index;

        let target = match chapter.line_index(target_line_id) {
            Some(index) => index,
            None => {
                warn!(current, "branch target missing, continuing linearly");
                current + 1
            }
        };
        if target > chapter.last_index() {
            warn!(current, "branch ran past the last line, completing chapter");
            self.complete_chapter();
        } else {
            self.move_to(target);
        }
        self.phase()
    }

    /// Picks a choice on the current line by position.
    pub fn choose(&mut self, option_index: usize) -> PlaybackPhase {
        let target = self
            .choices()
            .get(option_index)
            .map(|option| option.target_line_id.clone());
        match target {
            Some(target) => self.choose_branch(&target),
            None => {
                debug!(option_index, "choice index out of range");
                self.phase()
            }
        }
    }

    /// Jumps to a line, clamped to the chapter, and starts typing it.
    #[instrument(skip(self))]
    pub fn jump_to(&mut self, line_index: usize) -> PlaybackPhase {
        let Some(session) = &self.session else {
            return PlaybackPhase::Closed;
        };
        let clamped = line_index.min(session.chapter.last_index());
        self.move_to(clamped);
        self.phase()
    }

    pub fn previous_line(&mut self) -> PlaybackPhase {
        match self.current_index() {
            Some(index) => self.jump_to(index.saturating_sub(1)),
            None => PlaybackPhase::Closed,
        }
    }

    pub fn next_line(&mut self) -> PlaybackPhase {
        match self.current_index() {
            Some(index) => self.jump_to(index + 1),
            None => PlaybackPhase::Closed,
        }
    }

    /// Updates auto-advance settings. They apply from the next idle line.
    pub fn set_auto_advance(&mut self, enabled: bool, delay: AutoAdvanceDelay) {
        debug!(enabled, delay_ms = delay.as_millis(), "auto-advance configured");
        self.auto_advance = AutoAdvance { enabled, delay };
    }

    /// Moves the virtual clock forward and fires due timers in deadline
    /// order. The reveal timer wins ties.
    pub fn advance_time(&mut self, elapsed: Millis) {
        let target = self.now.saturating_add(elapsed);
        loop {
            let reveal = self.reveal_timer.deadline().filter(|due| *due <= target);
            let auto = self.auto_timer.deadline().filter(|due| *due <= target);
            let fire_reveal = match (reveal, auto) {
                (None, None) => break,
                (Some(reveal), Some(auto)) => reveal <= auto,
                (Some(_), None) => true,
                (None, Some(_)) => false,
            };
            if fire_reveal {
                if let Some(due) = reveal {
                    self.now = self.now.max(due);
                }
                if self.reveal_timer.take_due(self.now).is_some() {
                    self.on_reveal_timer();
                }
            } else {
                if let Some(due) = auto {
                    self.now = self.now.max(due);
                }
                if self.auto_timer.take_due(self.now).is_some() {
                    self.on_auto_advance_timer();
                }
            }
        }
        self.now = target;
    }

    /// Earliest pending timer deadline, for shells that sleep in real time.
    pub fn next_deadline(&self) -> Option<Millis> {
        match (self.reveal_timer.deadline(), self.auto_timer.deadline()) {
            (Some(reveal), Some(auto)) => Some(reveal.min(auto)),
            (reveal, auto) => reveal.or(auto),
        }
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    pub fn live_timer_count(&self) -> usize {
        usize::from(self.reveal_timer.is_live()) + usize::from(self.auto_timer.is_live())
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.session
            .as_ref()
            .map(|session| session.state.phase)
            .unwrap_or(PlaybackPhase::Closed)
    }

    pub fn state(&self) -> Option<&PlaybackState> {
        self.session.as_ref().map(|session| &session.state)
    }

    pub fn current_chapter(&self) -> Option<&Arc<Chapter>> {
        self.session.as_ref().map(|session| &session.chapter)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.session.as_ref().map(|session| session.state.line_index)
    }

    pub fn current_line(&self) -> Option<&DialogueLine> {
        let session = self.session.as_ref()?;
        session.chapter.line(session.state.line_index)
    }

    /// Revealed prefix of the current line.
    pub fn typed_text(&self) -> &str {
        match (&self.session, self.current_line()) {
            (Some(session), Some(line)) => &line.text[..session.state.revealed_bytes],
            _ => "",
        }
    }

    pub fn choices(&self) -> &[ChoiceOption] {
        self.current_line()
            .map(|line| line.choices.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_typing(&self) -> bool {
        self.phase() == PlaybackPhase::Typing
    }

    pub fn is_awaiting_choice(&self) -> bool {
        self.phase() == PlaybackPhase::AwaitingChoice
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == PlaybackPhase::Complete
    }

    pub fn progress_percent(&self) -> u8 {
        match &self.session {
            None => 0,
            Some(session) if session.state.phase == PlaybackPhase::Complete => 100,
            Some(session) => {
                percent_through(session.state.line_index, session.chapter.line_count())
            }
        }
    }

    pub fn auto_advance(&self) -> AutoAdvance {
        self.auto_advance
    }

    pub fn content(&self) -> &Arc<ContentRepository> {
        &self.content
    }

    pub fn store(&self) -> &ProgressStore<S> {
        &self.store
    }

    /// Listens for progress written by other sessions. The engine itself
    /// does not react to these.
    pub fn subscribe_progress<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&ProgressChange) + 'static,
    {
        self.store.subscribe(listener)
    }

    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn view(&self) -> Option<PlaybackView> {
        let session = self.session.as_ref()?;
        let line = session.chapter.line(session.state.line_index)?;
        Some(PlaybackView::build(
            &self.content,
            &session.chapter,
            line,
            self.typed_text(),
            self.phase(),
            self.progress_percent(),
            session.state.line_index,
        ))
    }

    fn move_to(&mut self, line_index: usize) {
        self.cancel_timers();
        if let Some(session) = self.session.as_mut() {
            session.state.line_index = line_index;
        }
        self.persist();
        self.start_line();
    }

    fn start_line(&mut self) {
        self.cancel_timers();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.state.revealed_bytes = 0;
        session.state.phase = PlaybackPhase::Typing;
        let line_index = session.state.line_index;
        let empty = session
            .chapter
            .line(line_index)
            .map_or(true, |line| line.text.is_empty());
        self.events.push(PlaybackEvent::LineStarted {
            chapter_id: session.chapter.id.clone(),
            line_index,
        });
        debug!(line_index, "typing");

        if empty {
            self.finish_reveal();
        } else {
            self.reveal_timer.arm(self.now, self.reveal_interval);
        }
    }

    fn finish_reveal(&mut self) {
        self.reveal_timer.cancel();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let chapter = Arc::clone(&session.chapter);
        let line_index = session.state.line_index;
        let Some(line) = chapter.line(line_index) else {
            return;
        };
        session.state.revealed_bytes = line.text.len();
        self.events.push(PlaybackEvent::LineRevealed {
            chapter_id: chapter.id.clone(),
            line_index,
        });

        if line.is_branch_point() {
            session.state.phase = PlaybackPhase::AwaitingChoice;
            self.events.push(PlaybackEvent::ChoicePresented {
                chapter_id: chapter.id.clone(),
                line_index,
            });
        } else if line_index >= chapter.last_index() {
            self.complete_chapter();
        } else {
            session.state.phase = PlaybackPhase::Idle;
            self.enter_idle();
        }
    }

    fn enter_idle(&mut self) {
        self.auto_timer.cancel();
        if self.auto_advance.enabled {
            self.auto_timer
                .arm(self.now, self.auto_advance.delay.as_millis());
        }
    }

    fn complete_chapter(&mut self) {
        self.cancel_timers();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.state.phase = PlaybackPhase::Complete;
        info!(chapter_id = %session.chapter.id, "chapter complete");
        self.events.push(PlaybackEvent::ChapterCompleted {
            chapter_id: session.chapter.id.clone(),
        });
    }

    fn on_reveal_timer(&mut self) {
        self.tick();
        if self.phase() == PlaybackPhase::Typing {
            self.reveal_timer.arm(self.now, self.reveal_interval);
        }
    }

    fn on_auto_advance_timer(&mut self) {
        if self.phase() == PlaybackPhase::Idle {
            self.advance();
        } else {
            debug!(phase = ?self.phase(), "auto-advance fired outside idle");
        }
    }

    fn cancel_timers(&mut self) {
        self.reveal_timer.cancel();
        self.auto_timer.cancel();
    }

    fn persist(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        if let Err(err) = self
            .store
            .set(&session.chapter.id, session.state.line_index)
        {
            warn!(
                chapter_id = %session.chapter.id,
                error = %err,
                "progress write failed, continuing without persistence"
            );
        }
    }

    fn flush(&mut self) {
        self.persist();
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
