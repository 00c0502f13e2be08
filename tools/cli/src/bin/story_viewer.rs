use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use story_viewer::{
    catalog, AutoAdvanceDelay, ContentRepository, FileStore, PlaybackEngine, PlaybackPhase,
    ProgressStore, ViewerConfig,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Terminal story viewer")]
struct Cli {
    /// Progress file shared by every viewer on this machine.
    #[arg(long, global = true, default_value = "story_progress.json")]
    store: PathBuf,
    #[arg(long, global = true, default_value = "story_viewer.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List chapters with unlock state and reading progress.
    List {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Read a chapter interactively.
    Play {
        chapter: String,
        /// Advance automatically once a line has been shown.
        #[arg(long, default_value_t = false)]
        auto: bool,
        /// Auto-advance pacing: fast, normal or slow.
        #[arg(long)]
        delay: Option<String>,
        /// Show whole lines instead of typing them out.
        #[arg(long, default_value_t = false)]
        instant: bool,
    },
    /// Mark a chapter as unlocked.
    Unlock { chapter: String },
    /// Forget the reading position of a chapter.
    Reset { chapter: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "story_viewer=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ViewerConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    let content = Arc::new(load_content(&config)?);
    let raw = FileStore::open(&cli.store)
        .with_context(|| format!("failed to open progress store {}", cli.store.display()))?;
    let mut store = ProgressStore::from_config(raw, &config);
    debug!(store = %cli.store.display(), chapters = content.len(), "viewer ready");

    match cli.command {
        Command::List { json } => {
            let entries = catalog(&content, &store);
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in entries {
                    let lock = if entry.unlocked { " " } else { "*" };
                    println!(
                        "{lock} {:<14} {:>3}%  {}",
                        entry.summary.id, entry.percent_complete, entry.summary.title
                    );
                }
            }
        }
        Command::Play {
            chapter,
            auto,
            delay,
            instant,
        } => {
            let delay = match delay.as_deref() {
                Some(name) => AutoAdvanceDelay::parse(name)
                    .with_context(|| format!("unknown delay preset '{name}'"))?,
                None => config.auto_advance_delay,
            };
            let mut engine = PlaybackEngine::new(content, store, &config);
            engine.set_auto_advance(auto || config.auto_advance, delay);
            engine
                .open_chapter(&chapter)
                .with_context(|| format!("cannot open chapter '{chapter}'"))?;
            play(&mut engine, instant)?;
        }
        Command::Unlock { chapter } => {
            if !content.contains(&chapter) {
                bail!("unknown chapter '{chapter}'");
            }
            if store.unlock(&chapter)? {
                println!("unlocked {chapter}");
            } else {
                println!("{chapter} was already unlocked");
            }
        }
        Command::Reset { chapter } => {
            store.clear(&chapter)?;
            println!("reset {chapter}");
        }
    }
    Ok(())
}

fn load_content(config: &ViewerConfig) -> Result<ContentRepository> {
    let loaded = match &config.content_path {
        Some(path) => ContentRepository::load_from(path),
        None => ContentRepository::builtin(),
    };
    // Render through miette so JSON errors point at the offending span.
    loaded.map_err(|err| anyhow!("{:?}", miette::Report::new(err)))
}

fn play(engine: &mut PlaybackEngine<FileStore>, instant: bool) -> Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut stdout = io::stdout();

    loop {
        show_line(engine, instant, &mut stdout)?;

        match engine.phase() {
            PlaybackPhase::Complete => {
                writeln!(stdout, "\n-- chapter complete --")?;
                break;
            }
            PlaybackPhase::AwaitingChoice => {
                for (index, choice) in engine.choices().iter().enumerate() {
                    writeln!(stdout, "  [{}] {}", index + 1, choice.text)?;
                }
            }
            PlaybackPhase::Idle if engine.next_deadline().is_some() => {
                wait_for_timers(engine);
                continue;
            }
            _ => {}
        }

        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut command = String::new();
        if input.read_line(&mut command)? == 0 {
            break;
        }
        match command.trim() {
            "q" => break,
            "p" => {
                engine.previous_line();
            }
            "n" => {
                engine.next_line();
            }
            "" => {
                engine.advance();
            }
            other => match other.parse::<usize>() {
                Ok(number) if number > 0 => {
                    engine.choose(number - 1);
                }
                _ => writeln!(stdout, "enter, a choice number, p, n or q")?,
            },
        }
    }

    engine.close();
    Ok(())
}

/// Types the current line out in real time, or reveals it at once.
fn show_line(
    engine: &mut PlaybackEngine<FileStore>,
    instant: bool,
    stdout: &mut io::Stdout,
) -> Result<()> {
    if !engine.is_typing() {
        return Ok(());
    }
    if let Some(view) = engine.view() {
        let speaker = view.speaker_label.unwrap_or_else(|| "~".to_string());
        write!(
            stdout,
            "\n[{}/{}] {speaker}: ",
            view.line_number, view.line_count
        )?;
    }
    if instant {
        engine.advance();
        write!(stdout, "{}", engine.typed_text())?;
    } else {
        let mut printed = 0;
        while engine.is_typing() {
            wait_for_timers(engine);
            let typed = engine.typed_text();
            write!(stdout, "{}", &typed[printed..])?;
            printed = typed.len();
            stdout.flush()?;
        }
    }
    writeln!(stdout)?;
    Ok(())
}

/// Sleeps until the next engine timer is due and fires it.
fn wait_for_timers(engine: &mut PlaybackEngine<FileStore>) {
    if let Some(deadline) = engine.next_deadline() {
        let wait = deadline.saturating_sub(engine.now());
        thread::sleep(Duration::from_millis(wait));
        engine.advance_time(wait);
    }
}
