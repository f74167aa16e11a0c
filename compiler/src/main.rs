use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use dfgc::ir::Program;
use dfgc::pipeline::{compute_provenance, lower_program, LowerOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    /// Human-readable node listing
    Graph,
    /// Graphviz DOT
    Dot,
    /// Graphs and diagnostics as JSON
    Json,
    /// Provenance metadata
    BuildInfo,
}

#[derive(Parser, Debug)]
#[command(
    name = "dfgc",
    version,
    about = "Dataflow graph compiler: lowers structured IR functions to dataflow graphs"
)]
struct Cli {
    /// Input IR program (JSON)
    source: PathBuf,

    /// Output file path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Graph)]
    emit: EmitStage,

    /// Maximum nesting of statements and expressions
    #[arg(long, default_value_t = LowerOptions::default().max_depth)]
    max_depth: u32,

    /// Do not emit separation markers for `skip`
    #[arg(long)]
    no_separations: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Exit with status 1 when any notice is reported
    #[arg(long)]
    fail_on_notice: bool,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // ── Read and decode source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("dfgc: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    if cli.emit == EmitStage::BuildInfo {
        match compute_provenance(&source).to_json() {
            Ok(json) => write_output(&cli, &json),
            Err(e) => {
                eprintln!("dfgc: error: cannot serialize build info: {}", e);
                std::process::exit(2);
            }
        }
        return;
    }

    let program: Program = match serde_json::from_str(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("dfgc: error: {}: invalid IR: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };
    tracing::info!(functions = program.functions.len(), "decoded program");

    // ── Lower ──
    let options = LowerOptions {
        max_depth: cli.max_depth,
        emit_separations: !cli.no_separations,
    };
    let result = lower_program(&program, &options);

    for diag in &result.diagnostics {
        eprintln!("dfgc: {}", diag);
    }

    // ── Emit ──
    let text = match cli.emit {
        EmitStage::Graph => result
            .graphs
            .values()
            .map(|g| g.to_string())
            .collect::<Vec<_>>()
            .join("\n"),
        EmitStage::Dot => dfgc::dot::emit_dot(&result.graphs),
        EmitStage::Json => match serde_json::to_string_pretty(&result) {
            Ok(mut json) => {
                json.push('\n');
                json
            }
            Err(e) => {
                eprintln!("dfgc: error: cannot serialize graphs: {}", e);
                std::process::exit(2);
            }
        },
        EmitStage::BuildInfo => unreachable!("handled before lowering"),
    };
    write_output(&cli, &text);

    if result.has_errors() || (cli.fail_on_notice && result.notice_count() > 0) {
        std::process::exit(1);
    }
}

fn write_output(cli: &Cli, text: &str) {
    let written = match &cli.output {
        Some(path) => std::fs::write(path, text),
        None => std::io::stdout().lock().write_all(text.as_bytes()),
    };
    if let Err(e) = written {
        let target = cli
            .output
            .as_ref()
            .map_or_else(|| "<stdout>".to_string(), |p| p.display().to_string());
        eprintln!("dfgc: error: {}: {}", target, e);
        std::process::exit(2);
    }
}
