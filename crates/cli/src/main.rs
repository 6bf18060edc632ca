mod commands;
mod config;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use mapwright_core::CollisionPolicy;
use mapwright_eval::{ErrorMode, StreamInputKind};
use tracing_subscriber::EnvFilter;

use config::Config;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    Overwrite,
    KeepFirst,
    Error,
}

impl From<PolicyArg> for CollisionPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Overwrite => CollisionPolicy::Overwrite,
            PolicyArg::KeepFirst => CollisionPolicy::KeepFirst,
            PolicyArg::Error => CollisionPolicy::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StreamKindArg {
    JsonArray,
    Ndjson,
    QueryLines,
    XmlElements,
}

impl From<StreamKindArg> for StreamInputKind {
    fn from(arg: StreamKindArg) -> Self {
        match arg {
            StreamKindArg::JsonArray => StreamInputKind::JsonArray,
            StreamKindArg::Ndjson => StreamInputKind::Ndjson,
            StreamKindArg::QueryLines => StreamInputKind::QueryLines,
            StreamKindArg::XmlElements => StreamInputKind::XmlElements,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ErrorModeArg {
    FailFast,
    Continue,
}

impl From<ErrorModeArg> for ErrorMode {
    fn from(arg: ErrorModeArg) -> Self {
        match arg {
            ErrorModeArg::FailFast => ErrorMode::FailFast,
            ErrorModeArg::Continue => ErrorMode::ContinueWithReport,
        }
    }
}

/// Mapwright payload conversion engine.
#[derive(Parser)]
#[command(name = "mapwright", version, about = "Rule-driven JSON, XML and query-string conversion")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Debug logging for the engine crates (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Config file (default: ./mapwright.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one payload with a rules document
    Convert {
        /// Rules document (includes are resolved)
        rules: PathBuf,
        /// Input payload; stdin when omitted or "-"
        input: Option<PathBuf>,
        /// Pretty-print the converted payload
        #[arg(long)]
        pretty: bool,
        /// What a second write to the same output path does
        #[arg(long, value_enum)]
        collision_policy: Option<PolicyArg>,
    },

    /// Report static problems in a rules document
    Lint {
        /// Rules document
        rules: PathBuf,
    },

    /// Lint a rules document and run it against a sample payload
    Doctor {
        /// Rules document
        rules: PathBuf,
        /// Sample payload in the rules' input format
        #[arg(long)]
        sample: Option<PathBuf>,
        #[arg(long, value_enum)]
        collision_policy: Option<PolicyArg>,
    },

    /// Check a rules document's schemaVersion against a runtime version
    Compat {
        /// Rules document
        rules: PathBuf,
        /// Runtime schema version (default: this build's schema version)
        #[arg(long)]
        target: Option<String>,
    },

    /// Resolve includes and print one self-contained rules document
    Bundle {
        /// Root rules document
        rules: PathBuf,
        #[arg(long)]
        pretty: bool,
    },

    /// Convert a stream of payloads, one result per item
    Stream {
        /// Rules document
        rules: PathBuf,
        /// Input stream; stdin when omitted or "-"
        input: Option<PathBuf>,
        /// How the stream is split into items
        #[arg(long, value_enum, default_value = "json-array")]
        kind: StreamKindArg,
        /// Stop at the first failing item, or report it and continue
        #[arg(long, value_enum, default_value = "fail-fast")]
        error_mode: ErrorModeArg,
        /// Dotted element path of each item (xml-elements only)
        #[arg(long)]
        item_path: Option<String>,
        /// Input encoding (only utf-8 is supported)
        #[arg(long, default_value = "utf-8")]
        encoding: String,
        #[arg(long, value_enum)]
        collision_policy: Option<PolicyArg>,
    },

    /// Time repeated conversions of one payload
    Profile {
        /// Rules document
        rules: PathBuf,
        /// Input payload
        input: PathBuf,
        /// Number of timed conversions
        #[arg(long, default_value_t = 100)]
        iterations: usize,
        #[arg(long, value_enum)]
        collision_policy: Option<PolicyArg>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(msg) => {
            report_error(&msg, cli.output, cli.quiet);
            process::exit(1);
        }
    };
    let policy = |flag: Option<PolicyArg>| config.collision_policy(flag.map(CollisionPolicy::from));

    match cli.command {
        Commands::Convert {
            rules,
            input,
            pretty,
            collision_policy,
        } => {
            commands::convert::cmd_convert(
                &rules,
                input.as_deref(),
                config.pretty(pretty),
                policy(collision_policy),
                cli.output,
                cli.quiet,
            );
        }
        Commands::Lint { rules } => {
            commands::lint::cmd_lint(&rules, cli.output, cli.quiet);
        }
        Commands::Doctor {
            rules,
            sample,
            collision_policy,
        } => {
            commands::doctor::cmd_doctor(
                &rules,
                sample.as_deref(),
                policy(collision_policy),
                cli.output,
                cli.quiet,
            );
        }
        Commands::Compat { rules, target } => {
            let target = config.target_schema_version(target.as_deref());
            commands::compat::cmd_compat(&rules, &target, cli.output, cli.quiet);
        }
        Commands::Bundle { rules, pretty } => {
            commands::bundle::cmd_bundle(&rules, config.pretty(pretty), cli.output, cli.quiet);
        }
        Commands::Stream {
            rules,
            input,
            kind,
            error_mode,
            item_path,
            encoding,
            collision_policy,
        } => {
            let mut stream = mapwright_eval::StreamOptions::new(kind.into()).error_mode(error_mode.into());
            stream.encoding = encoding;
            if let Some(path) = item_path {
                stream = stream.xml_item_path(path);
            }
            commands::stream::cmd_stream(
                &rules,
                input.as_deref(),
                &stream,
                policy(collision_policy),
                cli.output,
                cli.quiet,
            );
        }
        Commands::Profile {
            rules,
            input,
            iterations,
            collision_policy,
        } => {
            commands::profile::cmd_profile(
                &rules,
                &input,
                iterations,
                policy(collision_policy),
                cli.output,
                cli.quiet,
            );
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "warn,mapwright_core=debug,mapwright_eval=debug,mapwright_analyze=debug"
        } else {
            "warn"
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Report an error to stderr, as plain text or a JSON object.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => eprintln!("{}", serde_json::json!({ "error": msg })),
    }
}
