// main.rs — schemgraph command-line driver
//
// Loads a JSON design description, builds the layout graph, runs the
// canonicalization pipeline and emits the result.
//
// Exit codes: 0 success; 1 pipeline failure or (with --strict) any build
// diagnostic; 2 unreadable or invalid input, or an output write failure.

use clap::Parser;
use std::path::PathBuf;
use std::process::exit;

use schemgraph::pass::{PassId, DEFAULT_PASSES};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, clap::ValueEnum)]
enum EmitStage {
    /// ELK JSON document
    Elk,
    /// Graphviz DOT
    Dot,
    /// Indented text dump and per-pass statistics
    Summary,
    /// Input hash and ELK document fingerprint
    Fingerprint,
}

#[derive(Parser, Debug)]
#[command(
    name = "schemgraph",
    version,
    about = "Builds canonical, layout-ready schematic graphs from JSON design descriptions"
)]
struct Cli {
    /// Input design description (.json)
    design: PathBuf,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = EmitStage::Elk)]
    emit: EmitStage,

    /// Comma-separated passes to run, in order
    #[arg(long, value_delimiter = ',', conflicts_with = "no_opt")]
    passes: Option<Vec<PassId>>,

    /// Skip canonicalization
    #[arg(long)]
    no_opt: bool,

    /// Fail on any build diagnostic (unresolved net, out-of-range index)
    #[arg(long)]
    strict: bool,

    /// Log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // ── Load design ──
    let source = match std::fs::read_to_string(&cli.design) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("schemgraph: error: {}: {}", cli.design.display(), e);
            exit(2);
        }
    };
    let doc = match schemgraph::design::parse_design(&source) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("schemgraph: error: {}: {}", cli.design.display(), e);
            exit(2);
        }
    };
    let built = match schemgraph::design::build_graph(&doc) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("schemgraph: error: {}", e);
            exit(2);
        }
    };
    let mut graph = built.graph;
    let root = built.root;

    for diag in &built.diagnostics {
        eprintln!("schemgraph: {}", diag);
    }
    if cli.strict && !built.diagnostics.is_empty() {
        eprintln!(
            "schemgraph: {} build diagnostic(s) with --strict",
            built.diagnostics.len()
        );
        exit(1);
    }

    // ── Canonicalize ──
    let passes: Vec<PassId> = if cli.no_opt {
        Vec::new()
    } else {
        cli.passes.clone().unwrap_or_else(|| DEFAULT_PASSES.to_vec())
    };
    let result = match schemgraph::pipeline::run_optimizations(&mut graph, root, &passes) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("schemgraph: {}", e.to_diagnostic());
            exit(1);
        }
    };
    for diag in &result.diagnostics {
        eprintln!("schemgraph: {}", diag);
    }

    // ── Emit ──
    let text = match cli.emit {
        EmitStage::Dot => schemgraph::dot::emit_dot(&graph, root),
        EmitStage::Summary => {
            let mut s = graph.dump(root);
            for outcome in &result.outcomes {
                s.push_str(&format!(
                    "# {}: {} rewrite(s)\n",
                    outcome.pass, outcome.rewrites
                ));
            }
            s
        }
        EmitStage::Elk | EmitStage::Fingerprint => {
            let doc = match schemgraph::elk::to_elk(&mut graph, root) {
                Ok(d) => d,
                Err(e) => {
                    eprintln!("schemgraph: error: {}", e);
                    exit(1);
                }
            };
            let pretty = matches!(cli.emit, EmitStage::Elk);
            let json = match schemgraph::elk::to_json(&doc, pretty) {
                Ok(j) => j,
                Err(e) => {
                    eprintln!("schemgraph: error: {}", e);
                    exit(1);
                }
            };
            if pretty {
                json + "\n"
            } else {
                schemgraph::pipeline::compute_provenance(&source, &json).to_json()
            }
        }
    };

    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                eprintln!("schemgraph: error: {}: {}", path.display(), e);
                exit(2);
            }
        }
        None => print!("{}", text),
    }
}
