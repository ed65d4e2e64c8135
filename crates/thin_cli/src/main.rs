//! Thin submission store CLI.
//!
//! # Commands
//!
//! - `submit` - Store a new XML submission
//! - `update` - Replace the payload of a stored submission
//! - `show` - Print one submission as JSON
//! - `sample` - Print up to 1000 submissions of a form as JSON
//! - `page` - Print one page of numeric fields as JSON
//! - `counts` - Print submission counts grouped by age
//! - `export` - Stream a form's submissions as CSV

use clap::{Parser, Subcommand};
use log::error;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thin_core::config::DATABASE_URL_VAR;
use thin_core::{
    default_log_level, for_api_all, init_logging, ApiRepresentable, ConnectionPool, StoreConfig,
    SubmissionService,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Form submission store.
#[derive(Parser)]
#[command(name = "thin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQLite database path; overrides DATABASE_URL
    #[arg(global = true, short, long)]
    database: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(global = true, long)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logs go to stderr when unset
    #[arg(global = true, long)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new XML submission
    Submit {
        /// Payload file, or `-` for stdin
        #[arg(default_value = "-")]
        file: PathBuf,
    },

    /// Replace the payload of a stored submission
    Update {
        form_id: String,
        instance_id: String,

        /// Payload file, or `-` for stdin
        #[arg(default_value = "-")]
        file: PathBuf,
    },

    /// Print one submission as JSON
    Show {
        form_id: String,
        instance_id: String,
    },

    /// Print up to 1000 submissions of a form as JSON
    Sample { form_id: String },

    /// Print one page of age/kilograms/year fields as JSON
    Page {
        form_id: String,

        /// Sort key (id, age, kilograms, year)
        #[arg(short, long)]
        sort: Option<String>,

        /// Rows per page
        #[arg(long, default_value = "20", allow_negative_numbers = true)]
        per_page: i64,

        /// 1-based page number
        #[arg(short, long, default_value = "1", allow_negative_numbers = true)]
        page: i64,
    },

    /// Print submission counts grouped by age
    Counts { form_id: String },

    /// Stream a form's submissions as CSV
    Export {
        form_id: String,

        /// Output file; stdout when unset
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| default_log_level().to_string());
    if let Err(err) = init_logging(&level, cli.log_dir.as_deref()) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_command module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let database = cli
        .database
        .map(|path| path.to_string_lossy().into_owned());
    let config = StoreConfig::from_lookup(|var| match (var, &database) {
        (DATABASE_URL_VAR, Some(path)) => Some(path.clone()),
        _ => std::env::var(var).ok(),
    })?;
    let pool = ConnectionPool::open(&config)?;
    let service = SubmissionService::new(pool.clone());

    let result = dispatch(&service, cli.command);
    pool.shutdown();
    result
}

fn dispatch(service: &SubmissionService, command: Commands) -> CliResult<()> {
    match command {
        Commands::Submit { file } => {
            let submission = service.create(read_payload(&file)?)?;
            print_json(&submission.for_api())
        }
        Commands::Update {
            form_id,
            instance_id,
            file,
        } => {
            let submission = service.update(&form_id, &instance_id, read_payload(&file)?)?;
            print_json(&submission.for_api())
        }
        Commands::Show {
            form_id,
            instance_id,
        } => {
            let submission = service
                .get(&form_id, &instance_id)?
                .ok_or_else(|| format!("submission not found: {form_id}/{instance_id}"))?;
            print_json(&submission.for_api())
        }
        Commands::Sample { form_id } => print_json(&for_api_all(&service.sample(&form_id)?)),
        Commands::Page {
            form_id,
            sort,
            per_page,
            page,
        } => print_json(&service.page(&form_id, sort.as_deref(), per_page, page)?),
        Commands::Counts { form_id } => print_json(&service.counts_by_age(&form_id)?),
        Commands::Export { form_id, output } => {
            match output {
                Some(path) => {
                    let mut out = BufWriter::new(File::create(path)?);
                    service.export_csv(&form_id, &mut out)?;
                    out.flush()?;
                }
                None => {
                    let mut out = io::stdout().lock();
                    service.export_csv(&form_id, &mut out)?;
                }
            }
            Ok(())
        }
    }
}

fn read_payload(file: &Path) -> CliResult<String> {
    if file == Path::new("-") {
        let mut raw = String::new();
        io::stdin().read_to_string(&mut raw)?;
        return Ok(raw);
    }
    Ok(std::fs::read_to_string(file)?)
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
