//! The directory drain: one file at a time from the input directory,
//! through a gate, a backoff and an end-of-batch summary.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use sluice_sdk::{AcceptOnce, BoxedSource, FileByFileSource, PollSource, PollSourceExt};
use sluice_types::SourceState;
use tracing::{debug, info, warn};

use crate::duration::format_duration;
use crate::settings::{Disposition, Settings};

/// Outcome of a single poll of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing was available, or polling is paused or backing off.
    Idle,
    /// A file was taken and handled.
    Handled { name: String, ok: bool },
}

#[derive(Debug, Default)]
struct Counters {
    handled: AtomicU64,
    failed: AtomicU64,
    in_batch: AtomicU64,
    batches: AtomicU64,
}

/// Running totals since start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainStats {
    pub handled: u64,
    pub failed: u64,
    pub batches: u64,
}

pub struct Drain {
    files: Arc<FileByFileSource>,
    seen: Arc<AcceptOnce>,
    pipeline: BoxedSource<PathBuf>,
    disposition: Disposition,
    command: Option<Vec<String>>,
    counters: Arc<Counters>,
    stopping: AtomicBool,
}

impl Drain {
    /// Build the pipeline described by `settings`, creating directories as
    /// needed.
    pub fn new(settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let seen = Arc::new(AcceptOnce::new());
        let mut builder = FileByFileSource::builder(&settings.input_dir)
            .order(settings.order.into())
            .ignore_hidden(settings.ignore_hidden)
            .filter_shared(seen.clone());
        if let Some(dir) = &settings.archive_dir {
            builder = builder.target_dir(dir);
        }
        if let Some(max) = settings.max_listed {
            builder = builder.max_listed(max);
        }
        let files = Arc::new(builder.build().with_context(|| {
            format!("Failed to open input directory {}", settings.input_dir.display())
        })?);

        let counters = Arc::new(Counters::default());
        let summary = {
            let counters = Arc::clone(&counters);
            move || {
                let count = counters.in_batch.swap(0, Ordering::SeqCst);
                let batch = counters.batches.fetch_add(1, Ordering::SeqCst) + 1;
                info!(batch, files = count, "batch complete");
            }
        };

        let mut pipeline = Arc::clone(&files)
            .after_batch(summary, settings.batch_action.into())
            .boxed();
        let backoff = settings.backoff()?;
        if !backoff.is_zero() {
            pipeline = pipeline.inactivity_backoff(backoff).boxed();
        }
        if let Some(pause) = settings.pause_file.clone() {
            pipeline = pipeline.gate(move || !pause.exists()).boxed();
        }

        info!(
            input = %settings.input_dir.display(),
            disposition = ?settings.disposition,
            backoff = %format_duration(backoff),
            "drain ready"
        );

        Ok(Self {
            files,
            seen,
            pipeline,
            disposition: settings.disposition,
            command: settings.command.clone(),
            counters,
            stopping: AtomicBool::new(false),
        })
    }

    /// Poll the pipeline once and handle whatever it returns.
    pub fn step(&self) -> Step {
        let Some((path, name)) = self.pipeline.poll().into_option() else {
            return Step::Idle;
        };

        let ok = match self.handle(&path, &name) {
            Ok(()) => self.resolve(&path, &name),
            Err(e) => {
                warn!(file = %name, "handling failed, skipping until restart: {:#}", e);
                self.files.release();
                false
            }
        };

        self.counters.in_batch.fetch_add(1, Ordering::SeqCst);
        if ok {
            self.counters.handled.fetch_add(1, Ordering::SeqCst);
        } else {
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
        }
        Step::Handled { name, ok }
    }

    /// Step until the pipeline reports idle or [`stop`](Self::stop) is
    /// called. Returns the number of files taken.
    pub fn run_until_idle(&self) -> usize {
        let mut taken = 0;
        while !self.is_stopping() {
            match self.step() {
                Step::Idle => break,
                Step::Handled { .. } => taken += 1,
            }
        }
        taken
    }

    /// Ask a running [`run_until_idle`](Self::run_until_idle) to return
    /// after the file it is handling.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SourceState {
        self.files.snapshot()
    }

    pub fn stats(&self) -> DrainStats {
        DrainStats {
            handled: self.counters.handled.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            batches: self.counters.batches.load(Ordering::SeqCst),
        }
    }

    fn handle(&self, path: &Path, name: &str) -> Result<()> {
        let Some(argv) = &self.command else {
            info!(file = %name, "received");
            return Ok(());
        };

        let (program, args) = argv
            .split_first()
            .context("command must not be blank")?;
        let status = Command::new(program)
            .args(args)
            .arg(path)
            .status()
            .with_context(|| format!("Failed to run {}", program))?;
        if !status.success() {
            bail!("{} exited with {}", program, status);
        }
        info!(file = %name, "handled");
        Ok(())
    }

    fn resolve(&self, path: &Path, name: &str) -> bool {
        let resolved = match self.disposition {
            Disposition::Delete => self.files.consume(),
            Disposition::Archive => self.files.relocate(),
        };
        match resolved {
            Ok(()) => {
                // Gone from the input directory; a new file by this name is new work
                self.seen.forget(path);
                debug!(file = %name, "resolved");
                true
            }
            Err(e) => {
                warn!(file = %name, "unable to resolve, skipping until restart: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn settings_for(dir: &Path) -> Settings {
        Settings {
            input_dir: dir.join("in"),
            backoff: "0s".to_string(),
            ..Default::default()
        }
    }

    fn put(settings: &Settings, names: &[&str]) {
        fs::create_dir_all(&settings.input_dir).unwrap();
        for name in names {
            fs::write(settings.input_dir.join(name), name.as_bytes()).unwrap();
        }
    }

    #[test]
    fn test_drains_and_deletes_in_order() {
        let tmp = TempDir::new().unwrap();
        let settings = settings_for(tmp.path());
        put(&settings, &["b.txt", "a.txt", ".hidden"]);
        let drain = Drain::new(&settings).unwrap();

        assert_eq!(
            drain.step(),
            Step::Handled {
                name: "a.txt".to_string(),
                ok: true
            }
        );
        assert!(!settings.input_dir.join("a.txt").exists());
        assert_eq!(drain.run_until_idle(), 1);

        assert!(settings.input_dir.join(".hidden").exists());
        let stats = drain.stats();
        assert_eq!(stats.handled, 2);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.batches, 1);
    }

    #[test]
    fn test_archive_disposition_moves_files() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings {
            archive_dir: Some(tmp.path().join("done")),
            disposition: Disposition::Archive,
            ..settings_for(tmp.path())
        };
        put(&settings, &["a.txt"]);
        let drain = Drain::new(&settings).unwrap();

        assert_eq!(drain.run_until_idle(), 1);
        assert!(tmp.path().join("done").join("a.txt").exists());
        assert!(!settings.input_dir.join("a.txt").exists());
    }

    #[test]
    fn test_pause_file_suspends_polling() {
        let tmp = TempDir::new().unwrap();
        let pause = tmp.path().join("paused");
        let settings = Settings {
            pause_file: Some(pause.clone()),
            ..settings_for(tmp.path())
        };
        put(&settings, &["a.txt"]);
        let drain = Drain::new(&settings).unwrap();

        fs::write(&pause, "").unwrap();
        assert_eq!(drain.step(), Step::Idle);
        assert!(settings.input_dir.join("a.txt").exists());

        fs::remove_file(&pause).unwrap();
        assert_eq!(drain.run_until_idle(), 1);
    }

    #[test]
    fn test_backoff_holds_after_idle_poll() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings {
            backoff: "1m".to_string(),
            ..settings_for(tmp.path())
        };
        let drain = Drain::new(&settings).unwrap();

        assert_eq!(drain.step(), Step::Idle);
        put(&settings, &["late.txt"]);
        assert_eq!(drain.step(), Step::Idle);
        assert!(settings.input_dir.join("late.txt").exists());
    }

    #[test]
    fn test_status_reports_pending_files() {
        let tmp = TempDir::new().unwrap();
        let settings = settings_for(tmp.path());
        put(&settings, &["a.txt", "b.txt"]);
        let drain = Drain::new(&settings).unwrap();

        let state = drain.state();
        assert!(!state.processing);
        assert_eq!(state.pending_items, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_stop_interrupts_drain_between_files() {
        let tmp = TempDir::new().unwrap();
        let settings = settings_for(tmp.path());
        put(&settings, &["a.txt", "b.txt", "c.txt"]);
        let drain = Drain::new(&settings).unwrap();

        assert!(matches!(drain.step(), Step::Handled { .. }));
        drain.stop();
        assert_eq!(drain.run_until_idle(), 0);
        assert!(drain.is_stopping());
        assert!(settings.input_dir.join("b.txt").exists());
        assert!(settings.input_dir.join("c.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_from_another_thread_ends_long_drain() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings {
            command: Some(vec!["sleep".to_string(), "0.2".to_string()]),
            ..settings_for(tmp.path())
        };
        let names: Vec<String> = (0..20).map(|i| format!("f{i:02}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        put(&settings, &refs);
        let drain = Arc::new(Drain::new(&settings).unwrap());

        let worker = {
            let drain = Arc::clone(&drain);
            std::thread::spawn(move || drain.run_until_idle())
        };
        std::thread::sleep(std::time::Duration::from_millis(300));
        drain.stop();

        let taken = worker.join().unwrap();
        assert!(taken >= 1 && taken < 20, "took {taken}");
    }

    #[test]
    fn test_invalid_settings_fail_fast() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings {
            disposition: Disposition::Archive,
            ..settings_for(tmp.path())
        };
        assert!(Drain::new(&settings).is_err());
        assert!(!settings.input_dir.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_failure_releases_and_skips() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings {
            command: Some(vec!["false".to_string()]),
            ..settings_for(tmp.path())
        };
        put(&settings, &["a.txt", "b.txt"]);
        let drain = Drain::new(&settings).unwrap();

        assert_eq!(drain.run_until_idle(), 2);
        assert!(settings.input_dir.join("a.txt").exists());
        assert!(settings.input_dir.join("b.txt").exists());
        assert!(!drain.state().processing);
        assert_eq!(drain.stats().failed, 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_arguments_keep_spaces() {
        let tmp = TempDir::new().unwrap();
        let scripts = tmp.path().join("my scripts");
        fs::create_dir(&scripts).unwrap();
        let out = tmp.path().join("out.txt");
        let script = scripts.join("record.sh");
        fs::write(
            &script,
            format!("printf '%s|%s' \"$1\" \"$(cat \"$2\")\" > '{}'\n", out.display()),
        )
        .unwrap();
        let settings = Settings {
            command: Some(vec![
                "sh".to_string(),
                script.display().to_string(),
                "two words".to_string(),
            ]),
            ..settings_for(tmp.path())
        };
        put(&settings, &["a.txt"]);
        let drain = Drain::new(&settings).unwrap();

        assert_eq!(drain.run_until_idle(), 1);
        assert_eq!(fs::read_to_string(&out).unwrap(), "two words|a.txt");
        assert!(!settings.input_dir.join("a.txt").exists());
    }
}
