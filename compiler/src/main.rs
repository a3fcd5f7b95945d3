use clap::Parser;
use std::path::PathBuf;

use beacon::codegen::CodegenOptions;
use beacon::diag::Diagnostic;
use beacon::pass::PassId;
use beacon::pipeline::{compute_provenance, run_pipeline, CompilationState};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum EmitStage {
    /// Pixelblaze program
    Code,
    /// Parsed term forest
    Terms,
    /// Analyzed node tree
    Nodes,
    /// Analyzed node table as JSON
    Json,
    /// Node graph for Graphviz
    Dot,
    /// Source and registry hashes
    BuildInfo,
}

#[derive(Parser, Debug)]
#[command(
    name = "beacon",
    version,
    about = "Beacon pattern compiler: .pbb light-pattern definitions to Pixelblaze code"
)]
struct Cli {
    /// Input .pbb source file
    source: PathBuf,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Code)]
    emit: EmitStage,

    /// Echo the source as comments at the top of the generated code
    #[arg(long = "source")]
    echo_source: bool,

    /// Print compiler phases and timing
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "beacon=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn report(diags: &[Diagnostic], source: &str) {
    for diag in diags {
        eprintln!("beacon: {}", diag.render(source));
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    tracing::debug!(source = %cli.source.display(), emit = ?cli.emit, "starting");

    // ── Read and parse source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("beacon: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    if let EmitStage::BuildInfo = cli.emit {
        let registry = beacon::registry::Registry::new();
        emit(&cli, &compute_provenance(&source, &registry).to_json());
        return;
    }

    let parsed = beacon::parser::parse(&source);
    if !parsed.is_ok() {
        report(&parsed.errors, &source);
        std::process::exit(1);
    }
    tracing::debug!(terms = parsed.forest.len(), lines = parsed.lines.len(), "parsed");

    if let EmitStage::Terms = cli.emit {
        emit(&cli, &beacon::parser::dump_terms(&parsed.forest));
        return;
    }

    // ── Bind, analyze, generate ──
    let terminal = match cli.emit {
        EmitStage::Code => PassId::Codegen,
        _ => PassId::Analyze,
    };
    let options = CodegenOptions {
        header: cli
            .source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        source_lines: cli
            .echo_source
            .then(|| source.lines().map(str::to_string).collect()),
    };
    let mut state = CompilationState::new(parsed.forest);
    if run_pipeline(&mut state, terminal, &options, |_, diags| report(diags, &source)).is_err() {
        std::process::exit(1);
    }

    let text = match (cli.emit, &state.program, &state.generated) {
        (EmitStage::Code, _, Some(code)) => code.clone(),
        (EmitStage::Nodes, Some(program), _) => program.dump(),
        (EmitStage::Dot, Some(program), _) => beacon::dot::emit_dot(program),
        (EmitStage::Json, Some(program), _) => {
            match serde_json::to_string_pretty(&program.report()) {
                Ok(json) => json + "\n",
                Err(e) => {
                    eprintln!("beacon: error: {e}");
                    std::process::exit(1);
                }
            }
        }
        _ => {
            eprintln!("beacon: error: pipeline produced no output");
            std::process::exit(1);
        }
    };
    emit(&cli, &text);
}

fn emit(cli: &Cli, text: &str) {
    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                eprintln!("beacon: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
            tracing::debug!(output = %path.display(), bytes = text.len(), "written");
        }
        None => print!("{text}"),
    }
}
