use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context as _;

use crate::config::Config;
use crate::foundation::error::{OneoffError, OneoffResult};
use crate::job::render::{RenderJob, batch_output_path, run_job};

/// Audio extensions picked up by batch discovery, matched case-insensitively.
pub const AUDIO_EXTENSIONS: [&str; 7] = ["mp3", "wav", "flac", "m4a", "aac", "ogg", "wma"];

/// Outcome counts of one batch run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// `(audio file, error message)` per failure.
    pub failures: Vec<(PathBuf, String)>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

/// Audio files in `dir`, deduplicated and sorted.
pub fn discover_audio(dir: &Path) -> OneoffResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(OneoffError::missing("batch input directory", dir));
    }
    let mut found = BTreeSet::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("read batch input directory '{}'", dir.display()))?
    {
        let path = entry
            .with_context(|| format!("read entry in '{}'", dir.display()))?
            .path();
        let is_audio = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if is_audio && path.is_file() {
            found.insert(path);
        }
    }
    Ok(found.into_iter().collect())
}

/// Planned work for one audio file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchItem {
    pub audio: PathBuf,
    pub output: PathBuf,
    /// Output exists and overwriting is off.
    pub skip: bool,
}

pub fn plan_batch(cfg: &Config) -> OneoffResult<Vec<BatchItem>> {
    let batch = &cfg.batch_settings;
    Ok(discover_audio(&batch.input_dir)?
        .into_iter()
        .map(|audio| {
            let output = batch_output_path(&cfg.output.directory, &audio);
            let skip = output.exists() && !batch.overwrite_existing;
            BatchItem {
                audio,
                output,
                skip,
            }
        })
        .collect())
}

/// Render every discovered audio file, one at a time, each with a fresh render context.
///
/// A failing file is logged and counted; the batch moves on.
pub fn run_batch(cfg: &Config) -> OneoffResult<BatchReport> {
    let started = Instant::now();
    let items = plan_batch(cfg)?;
    tracing::info!(
        dir = %cfg.batch_settings.input_dir.display(),
        files = items.len(),
        "batch started"
    );

    let mut report = BatchReport::default();
    for (i, item) in items.iter().enumerate() {
        let _span =
            tracing::info_span!("batch_item", n = i + 1, of = items.len(), audio = %item.audio.display())
                .entered();
        if item.skip {
            tracing::info!(out = %item.output.display(), "output exists; skipped");
            report.skipped += 1;
            continue;
        }
        let mut job = RenderJob::from_config(cfg);
        job.audio = item.audio.clone();
        job.output = item.output.clone();
        match run_job(cfg, &job) {
            Ok(stats) => {
                tracing::info!(frames = stats.frames, "batch item done");
                report.succeeded += 1;
            }
            Err(err) => {
                tracing::error!(error = %err, "batch item failed");
                report.failed += 1;
                report.failures.push((item.audio.clone(), err.to_string()));
            }
        }
    }

    report.elapsed = started.elapsed();
    tracing::info!(
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        elapsed_secs = report.elapsed.as_secs_f64(),
        "batch finished"
    );
    Ok(report)
}
