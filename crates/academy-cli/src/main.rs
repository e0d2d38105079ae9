mod commands;

use academy_core::{install_signal_handler, Academy, JournalAudit};
use academy_schema::parse_config_file;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::CommandError;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(
    name = "academy",
    version,
    about = "Course lifecycle and enrollment capacity engine"
)]
struct Cli {
    /// Path to the Academy store directory.
    #[arg(long, default_value = "~/.local/share/academy", global = true)]
    store: String,

    /// Configuration file (defaults to <store>/academy.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create, edit, move through the lifecycle, and inspect courses.
    #[command(subcommand)]
    Course(CourseCommand),
    /// Request, confirm, cancel, reject, and list enrollments.
    #[command(subcommand)]
    Enroll(EnrollCommand),
    /// Summarize one person's enrollments and teaching.
    Person {
        /// Person ID.
        person_id: String,
    },
    /// Check stored capacity figures and record integrity.
    Verify,
    /// Rewrite a course's capacity figures from its confirmed enrollments.
    Recompute {
        /// Course ID or code.
        course: String,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
enum CourseCommand {
    /// Create a course in the draft state.
    Create {
        /// Course code; trimmed and uppercased.
        code: String,
        /// Human-readable name.
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Person ID of the instructor.
        #[arg(long)]
        instructor: Option<String>,
        /// Duration in hours.
        #[arg(long)]
        hours: Option<f64>,
        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<NaiveDate>,
        /// End date (YYYY-MM-DD), not before the start date.
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Seat capacity (defaults to course.default_max_students).
        #[arg(long, allow_negative_numbers = true)]
        max_students: Option<i64>,
    },
    /// Edit course fields.
    Update {
        /// Course ID or code.
        course: String,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        instructor: Option<String>,
        #[arg(long)]
        hours: Option<f64>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long, allow_negative_numbers = true)]
        max_students: Option<i64>,
        /// Clear an optional field (description, category, instructor, hours, start, end).
        #[arg(long, value_name = "FIELD")]
        clear: Vec<String>,
    },
    /// Publish draft courses.
    Publish {
        #[arg(required = true)]
        courses: Vec<String>,
    },
    /// Start published courses.
    Start {
        #[arg(required = true)]
        courses: Vec<String>,
    },
    /// Complete in-progress courses.
    Complete {
        #[arg(required = true)]
        courses: Vec<String>,
    },
    /// Cancel courses that are not done.
    Cancel {
        #[arg(required = true)]
        courses: Vec<String>,
    },
    /// Move cancelled courses back to draft.
    Reset {
        #[arg(required = true)]
        courses: Vec<String>,
    },
    /// Show one course.
    Show {
        /// Course ID or code.
        course: String,
    },
    /// List courses.
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        instructor: Option<String>,
    },
    /// List courses by their current full status.
    Full {
        /// Comparison operator: = or !=.
        #[arg(long, default_value = "=")]
        op: String,
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        value: bool,
    },
}

#[derive(Debug, Subcommand)]
enum EnrollCommand {
    /// Request a seat for a person.
    Request {
        /// Course ID or code.
        course: String,
        /// Person ID.
        person: String,
    },
    /// Confirm a requested enrollment if a seat is free.
    Confirm { enrollment_id: String },
    /// Cancel an enrollment (no-op if already cancelled or rejected).
    Cancel { enrollment_id: String },
    /// Reject a requested enrollment.
    Reject { enrollment_id: String },
    /// Delete an enrollment record.
    Remove { enrollment_id: String },
    /// List enrollments for a course or a person.
    List {
        #[arg(long, conflicts_with = "person", required_unless_present = "person")]
        course: Option<String>,
        #[arg(long)]
        person: Option<String>,
    },
}

fn open_academy(cli: &Cli) -> Result<Academy, CommandError> {
    let store_path = expand_tilde(&cli.store);
    tracing::debug!("opening store at {}", store_path.display());
    let mut academy = Academy::open(&store_path)?;
    if let Some(path) = &cli.config {
        let config = parse_config_file(path)
            .map_err(|e| CommandError::validation(format!("{}: {e}", path.display())))?;
        academy = academy.with_config(config)?;
    }
    let journal = JournalAudit::new(academy.layout().audit_log());
    Ok(academy.with_audit(Arc::new(journal)))
}

fn run(cli: &Cli) -> Result<u8, CommandError> {
    if let Commands::Completions { shell } = &cli.command {
        return commands::completions::run::<Cli>(*shell);
    }

    let academy = open_academy(cli)?;
    let json = cli.json;
    match &cli.command {
        Commands::Course(cmd) => commands::course::run(&academy, cmd, json),
        Commands::Enroll(cmd) => commands::enroll::run(&academy, cmd, json),
        Commands::Person { person_id } => commands::person::run(&academy, person_id, json),
        Commands::Verify => commands::verify::run(&academy, json),
        Commands::Recompute { course } => commands::recompute::run(&academy, course, json),
        Commands::Completions { .. } => Ok(commands::EXIT_SUCCESS),
    }
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("ACADEMY_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {}", err.message);
            ExitCode::from(err.code)
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
