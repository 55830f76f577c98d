use anyhow::{Context, Result};
use clap::Parser;
use deskmate::animations::{builtin_table, AnimationTable};
use deskmate::config::{Args, FileSettings, Settings};
use deskmate::scheduler::FRAME_TICK;
use deskmate::Pet;
use log::{debug, info, warn};
use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::MissedTickBehavior;

// ============================================================================
// Directive File Watcher
// ============================================================================

/// Watches the directory holding the directive file and raises `dirty` when
/// the file itself changes. Polling still works if this fails.
fn watch_directive(path: &Path, dirty: Arc<AtomicBool>) -> Option<Debouncer<RecommendedWatcher>> {
    let target: PathBuf = path.to_path_buf();
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty())?.to_path_buf();

    let handler = move |res: DebounceEventResult| match res {
        Ok(events) => {
            if events.iter().any(|e| e.path.file_name() == target.file_name()) {
                dirty.store(true, Ordering::SeqCst);
            }
        }
        Err(e) => debug!("directive watcher error: {:?}", e),
    };

    let mut debouncer = match new_debouncer(Duration::from_millis(50), handler) {
        Ok(d) => d,
        Err(e) => {
            warn!("failed to create directive watcher: {}", e);
            return None;
        }
    };
    if let Err(e) = debouncer.watcher().watch(&dir, RecursiveMode::NonRecursive) {
        warn!("failed to watch {}: {}", dir.display(), e);
        return None;
    }
    debug!("watching {}", dir.display());
    Some(debouncer)
}

// ============================================================================
// Application Entry
// ============================================================================

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_secs()
        .try_init();
}

fn load_table(settings: &Settings) -> Result<AnimationTable> {
    let table = match &settings.animations {
        Some(path) => AnimationTable::load(path)
            .with_context(|| format!("loading animation table {}", path.display()))?,
        None => builtin_table(),
    };
    table.validate().context("animation table failed validation")?;
    Ok(table)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let file = match &args.config {
        Some(path) => FileSettings::load(path)?,
        None => FileSettings::load_default()?,
    };
    let settings = Settings::resolve(args, file);
    fs::create_dir_all(&settings.runtime_dir)
        .with_context(|| format!("creating runtime dir {}", settings.runtime_dir.display()))?;
    let table = load_table(&settings)?;

    let mut pet = Pet::new(&settings, table, SystemTime::now(), rand::random());
    let dirty = Arc::new(AtomicBool::new(false));
    let _watcher = watch_directive(&settings.state_file, dirty.clone());

    let mut ticker = tokio::time::interval(FRAME_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if dirty.swap(false, Ordering::SeqCst) {
                    pet.bridge_mut().mark_dirty();
                }
                let frame = pet.tick(SystemTime::now());
                if settings.emit_frames {
                    serde_json::to_writer(&mut out, &frame)?;
                    writeln!(out)?;
                }
                if pet.is_terminated() {
                    break;
                }
            }
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!("ctrl-c handler failed: {}", e);
                }
                info!("interrupted");
                break;
            }
        }
    }

    pet.shutdown();
    Ok(())
}
