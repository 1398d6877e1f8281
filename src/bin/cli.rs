use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;

use ball_sequencer::dispatcher::{Dispatcher, RawCall, ToolResponse};
use ball_sequencer::model::Project;
use ball_sequencer::registry::{catalog, reference, Registry};
use ball_sequencer::state::AppState;
use ball_sequencer::{paths, project, settings};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ballseq-cli", about = "Ball sequencer agent tools, headless", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show file to load (a blank show is used when absent or missing)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Audio analysis JSON (beats, downbeats, tempo, sections)
    #[arg(long, global = true)]
    analysis: Option<PathBuf>,

    /// Aligned lyrics JSON
    #[arg(long, global = true)]
    lyrics: Option<PathBuf>,

    /// Settings file override
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Script time limit in seconds, overriding the settings
    #[arg(long, global = true)]
    timeout: Option<f64>,

    /// Write the show back to --project when the command finishes
    #[arg(long, global = true)]
    save: bool,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List every tool
    Tools,
    /// Tool help: categories, a category's tools, or one tool's parameters
    Help { topic: Option<String> },
    /// Print the script language reference
    Reference,
    /// Call one tool directly
    Call {
        name: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Run a script file ("-" for stdin)
    Run { file: String },
    /// Dispatch raw agent output from a file ("-" for stdin)
    Dispatch { file: String },
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "127.0.0.1:7878")]
        addr: SocketAddr,
    },
}

// ── State initialization ─────────────────────────────────────────

fn initialize_state(cli: &Cli) -> anyhow::Result<Arc<AppState>> {
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| paths::settings_path(&paths::default_config_dir()));
    let mut loaded = settings::load_settings(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path.display()))?;
    if let Some(timeout) = cli.timeout {
        loaded.sandbox.max_execution_seconds = timeout;
        loaded.sandbox.validate()?;
    }

    let show = match &cli.project {
        Some(path) if path.exists() => project::load_project(path)
            .with_context(|| format!("loading project {}", path.display()))?,
        _ => {
            log::info!("starting from a blank show with {} balls", loaded.default_ball_count);
            Project::with_balls(loaded.default_ball_count)
        }
    };
    let analysis = cli
        .analysis
        .as_deref()
        .map(|p| project::load_analysis(p).with_context(|| format!("loading analysis {}", p.display())))
        .transpose()?;
    let lyrics = cli
        .lyrics
        .as_deref()
        .map(|p| project::load_lyrics(p).with_context(|| format!("loading lyrics {}", p.display())))
        .transpose()?;

    Ok(Arc::new(
        AppState::new(show, loaded)
            .with_analysis_data(analysis)
            .with_lyrics_data(lyrics),
    ))
}

fn read_input(file: &str) -> anyhow::Result<String> {
    if file == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text).context("reading stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(file).with_context(|| format!("reading {file}"))
    }
}

fn save_if_requested(cli: &Cli, state: &AppState, response: &ToolResponse) -> anyhow::Result<()> {
    if !cli.save {
        return Ok(());
    }
    let Some(path) = cli.project.as_deref() else {
        bail!("--save needs --project");
    };
    // Mutations before a failure persist in memory; they are saved either way.
    if !response.success {
        log::warn!("saving a show changed by a failed call");
    }
    save_show(state, path)
}

fn save_show(state: &AppState, path: &Path) -> anyhow::Result<()> {
    let show = state.with_project(Clone::clone);
    project::save_project(&show, path).with_context(|| format!("saving {}", path.display()))?;
    log::info!("saved {}", path.display());
    Ok(())
}

// ── Output formatting ────────────────────────────────────────────

fn print_response(response: &ToolResponse, raw_json: bool) {
    let json = response.to_json();
    if raw_json {
        println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        return;
    }

    match &response.error {
        None => println!("ok"),
        Some(error) => eprintln!("Error: {error}"),
    }
    if let Some(logs) = response.fields.get("logs").and_then(Value::as_array) {
        for line in logs.iter().filter_map(Value::as_str) {
            println!("log: {line}");
        }
    }
    let rest: serde_json::Map<String, Value> = response
        .fields
        .iter()
        .filter(|(k, _)| k.as_str() != "logs")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !rest.is_empty() {
        println!("{}", serde_json::to_string_pretty(&rest).unwrap_or_default());
    }
}

fn print_tools(registry: &Registry, raw_json: bool) {
    if raw_json {
        let tools = catalog::to_json_schema(registry);
        println!("{}", serde_json::to_string_pretty(&tools).unwrap_or_default());
        return;
    }
    for entry in catalog::capability_entries(registry) {
        let marker = if entry.mutates { "*" } else { " " };
        println!("{marker} {}\n    {}", entry.signature, entry.description);
    }
    println!("* run_script(code)\n    {}", catalog::RUN_SCRIPT_DESCRIPTION);
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match run(&cli).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(2);
        }
    }
}

/// Returns whether the command succeeded.
async fn run(cli: &Cli) -> anyhow::Result<bool> {
    let registry = Arc::new(Registry::standard());

    match &cli.command {
        Commands::Tools => {
            print_tools(&registry, cli.json);
            return Ok(true);
        }
        Commands::Help { topic } => {
            println!("{}", catalog::help_text(&registry, topic.as_deref()));
            return Ok(true);
        }
        Commands::Reference => {
            println!("{}", reference::script_reference(&registry));
            return Ok(true);
        }
        _ => {}
    }

    let state = initialize_state(cli)?;
    let dispatcher = Dispatcher::new(registry, Arc::clone(&state))?;

    let response = match &cli.command {
        Commands::Call { name, args } => {
            let arguments: Value = serde_json::from_str(args).unwrap_or_else(|_| Value::String(args.clone()));
            dispatcher.dispatch_raw(RawCall {
                name: name.clone(),
                arguments,
            })
        }
        Commands::Run { file } => {
            let code = read_input(file)?;
            dispatcher.dispatch_raw(RawCall {
                name: ball_sequencer::dispatcher::RUN_SCRIPT.to_string(),
                arguments: serde_json::json!({ "code": code }),
            })
        }
        Commands::Dispatch { file } => dispatcher.dispatch_text(&read_input(file)?),
        #[cfg(feature = "http-api")]
        Commands::Serve { addr } => {
            let (bound, handle) = ball_sequencer::api::start_api_server(Arc::new(dispatcher), *addr)
                .await
                .map_err(anyhow::Error::msg)?;
            eprintln!("Serving on http://{bound} (Ctrl-C to stop)");
            tokio::select! {
                _ = handle => {}
                _ = tokio::signal::ctrl_c() => {}
            }
            if cli.save {
                if let Some(path) = cli.project.as_deref() {
                    save_show(&state, path)?;
                }
            }
            return Ok(true);
        }
        #[cfg(not(feature = "http-api"))]
        Commands::Serve { .. } => bail!("this build has no HTTP API; rebuild with --features http-api"),
        Commands::Tools | Commands::Help { .. } | Commands::Reference => return Ok(true),
    };

    print_response(&response, cli.json);
    save_if_requested(cli, &state, &response)?;
    Ok(response.success)
}
