//! unmark CLI - batch PDF watermark removal

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use unmark::{
    write_report, BatchRunner, CleanOptions, DirectoryScanner, DocumentCleaner, FileReport,
    FileStatus, RunSummary,
};

#[derive(Parser)]
#[command(name = "unmark")]
#[command(version)]
#[command(about = "Remove watermarks from every PDF in a directory", long_about = None)]
struct Cli {
    /// Directory containing the PDFs to clean
    #[arg(long, value_name = "DIR", default_value = "pdf_data")]
    input_dir: PathBuf,

    /// Directory the cleaned PDFs are written to
    #[arg(long, value_name = "DIR", default_value = "clean_pdf_data")]
    output_dir: PathBuf,

    /// Process files on N worker threads (0 = one per CPU)
    #[arg(long, value_name = "N")]
    jobs: Option<usize>,

    /// Copy the original file to the output directory when cleaning fails
    #[arg(long)]
    copy_on_failure: bool,

    /// Write a JSON run summary to FILE
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(flatten)]
    detection: DetectionArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct DetectionArgs {
    /// Text that marks a watermark (repeatable; prefix with "re:" for a regex)
    #[arg(long = "watermark-pattern", value_name = "PATTERN", global = true)]
    patterns: Vec<String>,

    /// Text fainter than this opacity is treated as a watermark
    #[arg(long, value_name = "ALPHA", global = true)]
    opacity_threshold: Option<f32>,

    /// JSON file with cleaning options; flags override its values
    #[arg(long, value_name = "FILE", env = "UNMARK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Disable the repeated-on-most-pages rules
    #[arg(long, global = true)]
    no_repetition: bool,

    /// Leave /Watermark annotations in place
    #[arg(long, global = true)]
    keep_annotations: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the watermarks detected in a PDF without writing anything
    Inspect {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Print the candidates as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "error" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let result = match cli.command {
        Some(Commands::Inspect { ref input, json }) => cmd_inspect(input, &cli.detection, json),
        Some(Commands::Version) => {
            cmd_version();
            Ok(())
        }
        None => cmd_clean(&cli),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Config file first, then flags on top.
fn build_options(args: &DetectionArgs) -> Result<CleanOptions, Box<dyn std::error::Error>> {
    let mut options = match args.config {
        Some(ref path) => CleanOptions::from_json_file(path)?,
        None => CleanOptions::new(),
    };
    if !args.patterns.is_empty() {
        options.patterns = args.patterns.clone();
    }
    if let Some(threshold) = args.opacity_threshold {
        options = options.with_opacity_threshold(threshold);
    }
    if args.no_repetition {
        options = options.without_repetition();
    }
    if args.keep_annotations {
        options = options.keep_annotations();
    }
    options.validate()?;
    log::debug!("options: {:?}", options);
    Ok(options)
}

fn cmd_clean(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = build_options(&cli.detection)?;
    if let Some(jobs) = cli.jobs {
        options = options.with_jobs(jobs);
    }
    if cli.copy_on_failure {
        options = options.with_copy_on_failure(true);
    }
    let runner = BatchRunner::new(options)?;

    let total = DirectoryScanner::new(&cli.input_dir)
        .and_then(|scanner| scanner.entries())
        .map(|entries| entries.len())
        .unwrap_or(0);
    let pb = if cli.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let observer = |report: &FileReport| {
        pb.set_message(report.name.clone());
        if report.status == FileStatus::Failed || report.status == FileStatus::Skipped {
            pb.println(format!(
                "{} {}: {}",
                status_label(report.status),
                report.name,
                report.error.as_deref().unwrap_or("unknown error")
            ));
        }
        pb.inc(1);
    };
    let result = runner.run_with(&cli.input_dir, &cli.output_dir, &observer);
    pb.finish_and_clear();
    let summary = result?;

    if let Some(ref path) = cli.report {
        write_report(&summary, path)?;
    }
    if !cli.quiet {
        print_summary(&summary, cli.report.as_deref());
    }
    Ok(())
}

fn status_label(status: FileStatus) -> colored::ColoredString {
    let label = format!("{:>9}", status.to_string());
    match status {
        FileStatus::Cleaned => label.green(),
        FileStatus::Unchanged => label.dimmed(),
        FileStatus::Partial => label.yellow(),
        FileStatus::Failed => label.red(),
        FileStatus::Skipped => label.yellow().dimmed(),
    }
}

fn print_summary(summary: &RunSummary, report: Option<&Path>) {
    println!("{}", "Run Summary".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    for file in &summary.files {
        let removed = file.document.as_ref().map_or(0, |d| d.removed());
        println!("{} {} ({} removed)", status_label(file.status), file.name, removed);
    }

    println!();
    println!("{}: {}", "Input".bold(), summary.input_dir.display());
    println!("{}: {}", "Output".bold(), summary.output_dir.display());
    println!("{}: {}", "Succeeded".bold(), summary.succeeded());
    println!("{}: {}", "Failed".bold(), summary.failed());
    println!("{}: {}", "Skipped".bold(), summary.skipped());
    println!("{}: {}", "Watermarks removed".bold(), summary.watermarks_removed());
    let elapsed = summary.finished_at - summary.started_at;
    println!("{}: {} ms", "Elapsed".bold(), elapsed.num_milliseconds());

    let warnings = summary.warnings();
    if !warnings.is_empty() {
        println!();
        println!("{} ({})", "Warnings".yellow().bold(), warnings.len());
        for warning in &warnings {
            println!("  {} {}", "-".dimmed(), warning);
        }
    }

    if let Some(path) = report {
        println!();
        println!("{} {}", "Report saved to".green(), path.display());
    }
}

fn cmd_inspect(
    input: &Path,
    args: &DetectionArgs,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let cleaner = DocumentCleaner::new(build_options(args)?)?;
    let inspection = cleaner.inspect_file(input)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
        return Ok(());
    }

    println!("{}", "Watermark Candidates".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "File".bold(), input.display());
    println!("{}: {}", "Pages".bold(), inspection.page_count);
    println!("{}: {}", "Candidates".bold(), inspection.candidate_count());

    for page in inspection.pages.iter().filter(|p| !p.candidates.is_empty()) {
        println!();
        println!("{} {}", "Page".bold(), page.number);
        for (i, candidate) in page.candidates.iter().enumerate() {
            let branch = if i + 1 == page.candidates.len() {
                "└─"
            } else {
                "├─"
            };
            println!(
                "  {} {} {}",
                branch.dimmed(),
                candidate.label,
                format!("({})", candidate.describe()).dimmed()
            );
        }
    }

    Ok(())
}

fn cmd_version() {
    println!("{} {}", "unmark".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("Batch PDF watermark removal tool");
    println!();
    println!("License: MIT");
}
