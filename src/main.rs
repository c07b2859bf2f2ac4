//! epubimg - Batch image fixups for EPUB archives

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use epubimg::batch::{self, ArchiveStatus, BatchReport};
use epubimg::{LinkPolicy, Mode, RewriteOptions, Rewriter};

#[derive(Parser)]
#[command(name = "epubimg")]
#[command(version, about = "Batch image fixups for EPUB archives", long_about = None)]
#[command(after_help = "EXAMPLES:
    epubimg library/            Unwrap SVG figures and add responsive styles
    epubimg -m svg book.epub    Only unwrap SVG figures
    epubimg -l library/         List the archives that would be processed")]
struct Cli {
    /// An .epub file or a directory of .epub files
    #[arg(value_name = "TARGET")]
    target: PathBuf,

    /// Which fixups to apply
    #[arg(short, long, value_enum, default_value_t = CliMode::All)]
    mode: CliMode,

    /// Do not ask for confirmation
    #[arg(short, long)]
    yes: bool,

    /// List the archives TARGET resolves to and exit
    #[arg(short, long)]
    list: bool,

    /// Documents that link a newly created stylesheet
    #[arg(long, value_enum, default_value_t = CliLinkPolicy::All)]
    link_policy: CliLinkPolicy,

    /// Element wrapping decorative SVG images
    #[arg(long, value_name = "TAG", default_value = "figure")]
    container: String,

    /// Class the wrapper must carry (empty accepts any)
    #[arg(long, value_name = "CLASS", default_value = "illust")]
    container_class: String,

    /// Print the batch report as JSON
    #[arg(long)]
    json: bool,

    /// Log every replaced part
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliMode {
    /// Replace SVG image wrappers with <img>
    Svg,
    /// Strip fixed image sizes and add responsive CSS
    Resize,
    /// Both, in one rewrite
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliLinkPolicy {
    All,
    Modified,
}

impl Cli {
    fn options(&self) -> RewriteOptions {
        RewriteOptions {
            mode: match self.mode {
                CliMode::Svg => Mode::Svg,
                CliMode::Resize => Mode::Resize,
                CliMode::All => Mode::All,
            },
            link_policy: match self.link_policy {
                CliLinkPolicy::All => LinkPolicy::AllDocuments,
                CliLinkPolicy::Modified => LinkPolicy::ModifiedDocuments,
            },
            container: self.container.clone(),
            container_class: Some(self.container_class.clone()).filter(|c| !c.is_empty()),
        }
    }

    fn log_filter(&self) -> EnvFilter {
        let level = if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli.log_filter())
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let archives = match batch::discover(&cli.target) {
        Ok(archives) => archives,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.list {
        list(&cli.target, &archives);
        return ExitCode::SUCCESS;
    }
    if archives.is_empty() {
        eprintln!("no .epub files in {}", cli.target.display());
        return ExitCode::SUCCESS;
    }
    if !cli.yes {
        list(&cli.target, &archives);
        match confirm() {
            Ok(true) => {}
            Ok(false) => {
                eprintln!("aborted");
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let rewriter = Rewriter::from_options(&cli.options());
    let report = batch::run_archives(&archives, &rewriter);

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_report(&report);
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn list(target: &Path, archives: &[PathBuf]) {
    println!("{} archive(s) in {}:", archives.len(), target.display());
    for path in archives {
        println!("  {}", path.display());
    }
}

fn confirm() -> io::Result<bool> {
    print!("Proceed? [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_report(report: &BatchReport) {
    for archive in &report.archives {
        let marker = match &archive.status {
            ArchiveStatus::Failed { .. } => "FAIL",
            _ => "ok",
        };
        println!("{marker:>4}  {}: {}", archive.path.display(), archive.status);
    }
    println!(
        "{} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );
}
