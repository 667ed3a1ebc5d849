//! Directory-to-directory cleaning runs.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use rayon::prelude::*;

use crate::clean::{CleanOptions, DocumentCleaner};
use crate::error::{Error, Result};
use crate::model::{FileReport, FileStatus, RunSummary};

use super::scanner::{DirectoryScanner, ScanEntry};

/// Callback invoked once per finished file, possibly from worker threads.
pub type Observer<'a> = &'a (dyn Fn(&FileReport) + Sync);

/// Cleans every PDF of an input directory into an output directory.
///
/// Each output keeps its input's file name and is written through a
/// temporary file in the output directory, so an interrupted run never
/// leaves a truncated PDF behind.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    cleaner: DocumentCleaner,
}

impl BatchRunner {
    pub fn new(options: CleanOptions) -> Result<Self> {
        Ok(Self {
            cleaner: DocumentCleaner::new(options)?,
        })
    }

    pub fn options(&self) -> &CleanOptions {
        self.cleaner.options()
    }

    /// Run without progress reporting.
    pub fn run<P: AsRef<Path>, Q: AsRef<Path>>(&self, input_dir: P, output_dir: Q) -> Result<RunSummary> {
        self.run_with(input_dir.as_ref(), output_dir.as_ref(), &|_: &FileReport| {})
    }

    /// Run, calling `observer` after each file.
    ///
    /// Returns an error only for failures that stop the whole run: a missing
    /// input directory, no PDFs to process, or an output that cannot be
    /// written. Per-file problems end up in the summary.
    pub fn run_with(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        observer: Observer<'_>,
    ) -> Result<RunSummary> {
        let started_at = Utc::now();
        let scanner = DirectoryScanner::new(input_dir)?;
        let entries = scanner.entries()?;
        if entries.len() == 0 {
            return Err(Error::NoDocuments(input_dir.to_path_buf()));
        }

        fs::create_dir_all(output_dir).map_err(|e| Error::write(output_dir, e))?;
        log::info!(
            "cleaning {} files from {} into {}",
            entries.len(),
            input_dir.display(),
            output_dir.display()
        );

        let process = |entry: ScanEntry| -> Result<FileReport> {
            let report = self.process_entry(entry, output_dir)?;
            observer(&report);
            Ok(report)
        };

        let options = self.options();
        let files = if options.parallel {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(worker_count(options.jobs))
                .build()
                .map_err(|e| Error::Config(format!("cannot start worker pool: {}", e)))?;
            let entries: Vec<ScanEntry> = entries.collect();
            pool.install(|| {
                entries
                    .into_par_iter()
                    .map(process)
                    .collect::<Result<Vec<_>>>()
            })?
        } else {
            entries.map(process).collect::<Result<Vec<_>>>()?
        };

        let summary = RunSummary {
            input_dir: input_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            started_at,
            finished_at: Utc::now(),
            files,
        };
        log::info!(
            "{} succeeded, {} failed, {} skipped, {} watermarks removed",
            summary.succeeded(),
            summary.failed(),
            summary.skipped(),
            summary.watermarks_removed()
        );
        Ok(summary)
    }

    fn process_entry(&self, entry: ScanEntry, output_dir: &Path) -> Result<FileReport> {
        let path = match entry {
            ScanEntry::Document(path) => path,
            ScanEntry::Skipped { path, reason } => {
                let mut report = FileReport::new(path, FileStatus::Skipped);
                report.error = Some(reason);
                return Ok(report);
            }
        };

        let mut report = FileReport::new(path.clone(), FileStatus::Failed);
        let target = output_dir.join(&report.name);

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("{}: cannot read: {}", report.name, e);
                report.error = Some(format!("cannot read: {}", e));
                return Ok(report);
            }
        };

        match self.cleaner.clean_bytes(&data) {
            Ok(outcome) => {
                let document = outcome.report;
                report.status = if document.is_partial() {
                    FileStatus::Partial
                } else if document.is_modified() {
                    FileStatus::Cleaned
                } else {
                    FileStatus::Unchanged
                };
                write_atomic(&target, &outcome.bytes)?;
                log::info!(
                    "{}: {} ({} of {} watermarks removed)",
                    report.name,
                    report.status,
                    document.removed(),
                    document.detected()
                );
                report.output = Some(target);
                report.document = Some(document);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::warn!("{}: {}", report.name, e);
                report.error = Some(e.to_string());
                if self.options().copy_on_failure {
                    write_atomic(&target, &data)?;
                    report.output = Some(target);
                }
            }
        }
        Ok(report)
    }
}

/// Workers for a parallel run: `jobs`, or every CPU when 0, never more than
/// the CPUs available.
fn worker_count(jobs: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    match jobs {
        0 => cpus,
        n => n.min(cpus),
    }
}

/// Write `bytes` to `target` through a temporary file in the same directory.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".unmark-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| Error::write(target, e))?;
    tmp.write_all(bytes).map_err(|e| Error::write(target, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::write(target, e))?;
    tmp.persist(target)
        .map_err(|e| Error::write(target, e.error))?;
    Ok(())
}

/// Save a run summary as pretty-printed JSON.
pub fn write_report<P: AsRef<Path>>(summary: &RunSummary, path: P) -> Result<()> {
    let path: PathBuf = path.as_ref().to_path_buf();
    let json = serde_json::to_vec_pretty(summary)
        .map_err(|e| Error::write(&path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
    write_atomic(&path, &json)
}
