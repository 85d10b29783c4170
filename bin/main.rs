//! Check every MuASM file in a directory for speculative non-interference.
//!
//! ```bash
//! sni programs/ --trace-mode single-path --speculation-mode stack-guard --policy policy.json
//! ```

use clap::Parser;
use log::{LevelFilter, Metadata, Record};
use sni::analysis::{self, AnalysisResult, AnalyzeOptionsBuilder, Policy, TraceMode, Verdict};
use sni::vcfg::{BuildMode, BuildOptionsBuilder, SpeculationMode};
use sni::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

struct StdoutLogger;

impl log::Log for StdoutLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{} - {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StdoutLogger = StdoutLogger;

#[derive(Parser)]
#[command(name = "sni")]
#[command(about = "Static speculative non-interference checking for MuASM", long_about = None)]
struct Cli {
    /// Directory of MuASM source files
    dir: PathBuf,

    /// Order the worklist is drained in (bfs, single-path)
    #[arg(long, default_value = "bfs")]
    trace_mode: TraceMode,

    /// Speculation window, used by both the graph builder and the analysis
    #[arg(long, default_value = "8")]
    window_size: i64,

    /// Speculative graph layout (light, meta)
    #[arg(long, default_value = "light")]
    mode: BuildMode,

    /// What happens at the end of a mispredicted path (discard, stack-guard)
    #[arg(long, default_value = "discard")]
    speculation_mode: SpeculationMode,

    /// JSON security policy, {"regs": {...}, "mem": {...}}
    #[arg(long)]
    policy: Option<PathBuf>,

    /// File extension of source files
    #[arg(long, default_value = "muasm")]
    extension: String,

    /// Print each full result as JSON
    #[arg(long)]
    json: bool,

    /// Write a graphviz rendering of each graph into this directory
    #[arg(long)]
    dot: Option<PathBuf>,

    /// Log more, repeat for more still
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn source_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |e| e == extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn report(path: &Path, result: &AnalysisResult) {
    let name = path.display();
    if let Some(error) = result.error() {
        println!("{}: {}: {}", name, error.error_type(), error.message());
        return;
    }

    println!("{}: {} ({} steps)", name, result.verdict(), result.trace().len());
    if result.verdict() == Verdict::SniViolation {
        if let Some(step) = result.violation() {
            println!(
                "    at {} (pc {}, {}): {}",
                step.node_id(),
                step.pc(),
                step.execution_mode(),
                step.description().unwrap_or("")
            );
            for (channel, observation, value) in step.state().violations() {
                println!("    {} {} = {}", channel, observation, value);
            }
        }
    }
    for warning in result.warnings() {
        if let Some(detail) = warning.detail() {
            println!("    warning: {:?} {}", warning.warning_type(), detail);
        }
    }
}

fn run(cli: &Cli) -> Result<bool, Error> {
    let policy = match cli.policy {
        Some(ref path) => Policy::from_json(&fs::read_to_string(path)?)?,
        None => Policy::new(),
    };

    let build_options = BuildOptionsBuilder::new()
        .window_size(cli.window_size)
        .mode(cli.mode)
        .speculation_mode(cli.speculation_mode)
        .build();
    let options = AnalyzeOptionsBuilder::new()
        .policy(policy)
        .trace_mode(cli.trace_mode)
        .speculation_mode(cli.speculation_mode)
        .spec_window(cli.window_size)
        .build();

    if let Some(ref dot) = cli.dot {
        fs::create_dir_all(dot)?;
    }

    let mut failed = false;
    for path in source_files(&cli.dir, &cli.extension)? {
        let source = fs::read_to_string(&path)?;
        let result = analysis::analyze_source(&source, &build_options, &options);
        failed |= result.error().is_some();

        if cli.json {
            println!("{}", result.to_json()?);
        } else {
            report(&path, &result);
        }

        if let (Some(dot), Some(stem)) = (&cli.dot, path.file_stem()) {
            let mut target = dot.join(stem);
            target.set_extension("dot");
            fs::write(target, result.graph().dot_graph())?;
        }
    }
    Ok(!failed)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
    log::debug!("log level {}", level);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("error: {}", error);
            ExitCode::FAILURE
        }
    }
}
