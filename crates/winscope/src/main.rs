//! winscope CLI
//!
//! Thin wrapper over `winscope-core`: loads configuration, initializes
//! logging, and prints results as plain text or JSON.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use winscope_core::client_window::{ClientWindowConfig, ClientWindowRenderMode};
use winscope_core::config::{
    Config, ConfigResolver, MAX_WINDOW_COUNT_KEY, MapPropertySource, ProjectStage,
};
use winscope_core::container::StandaloneContainer;
use winscope_core::contextual::{Contextual, FnBean};
use winscope_core::error::format_error_with_remediation;
use winscope_core::extension::WindowScopeExtension;
use winscope_core::logging::init_logging;
use winscope_core::propagation::PropagationPlan;
use winscope_core::request::{HttpRequest, NO_SCRIPT_COOKIE, RequestContext, WINDOW_ID_PARAMETER};
use winscope_core::{SessionId, WindowId};

/// Session id used by `simulate`.
const SIMULATED_SESSION: &str = "simulated-session";

#[derive(Parser, Debug)]
#[command(
    name = "winscope",
    version = env!("CARGO_PKG_VERSION"),
    about = "Inspect window scope configuration, render modes and eviction behaviour"
)]
struct Cli {
    /// Path to a winscope.toml configuration file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Plain)]
    format: OutputFormat,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the resolved configuration
    Config,

    /// Show the render mode chosen for a client
    RenderMode {
        /// User-Agent header of the client
        #[arg(long, value_name = "UA")]
        user_agent: String,

        /// Client reported that scripts are disabled
        #[arg(long)]
        no_script: bool,

        /// Project stage override
        #[arg(long, value_name = "STAGE")]
        stage: Option<String>,
    },

    /// Replay window actions against one session and report evictions
    Simulate {
        /// Maximum windows per session
        #[arg(long, value_name = "N")]
        max_count: Option<String>,

        /// Actions: open:<window-id>, close:<window-id>, end
        #[arg(value_name = "ACTION", required = true)]
        actions: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<winscope_core::Error>() {
                Some(core) => eprintln!("{}", format_error_with_remediation(core)),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let overrides = match &cli.command {
        Commands::Simulate {
            max_count: Some(max),
            ..
        } => MapPropertySource::new("command line").with(MAX_WINDOW_COUNT_KEY, max.clone()),
        _ => MapPropertySource::new("command line"),
    };
    let config = load_config(cli.config.as_ref(), overrides)?;

    let mut log_config = config.logging.clone();
    if let Some(level) = &cli.log_level {
        log_config.level = level.clone();
    }
    init_logging(&log_config).context("failed to initialize logging")?;

    match &cli.command {
        Commands::Config => show_config(&config, cli.format),
        Commands::RenderMode {
            user_agent,
            no_script,
            stage,
        } => show_render_mode(&config, cli.format, user_agent, *no_script, stage.as_deref()),
        Commands::Simulate { actions, .. } => simulate(config, cli.format, actions),
    }
}

fn load_config(path: Option<&PathBuf>, overrides: MapPropertySource) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path).map_err(winscope_core::Error::from)?,
        None => Config::default(),
    };
    let resolver = ConfigResolver::new()
        .with_source(overrides)
        .with_source(winscope_core::config::EnvPropertySource);
    Ok(config
        .apply_properties(&resolver)
        .map_err(winscope_core::Error::from)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// config
// =============================================================================

fn show_config(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(config),
        OutputFormat::Plain => {
            let text = config.to_toml_string().map_err(winscope_core::Error::from)?;
            print!("{text}");
            Ok(())
        }
    }
}

// =============================================================================
// render-mode
// =============================================================================

#[derive(Debug, Serialize)]
struct RenderModeReport {
    user_agent: String,
    javascript_enabled: bool,
    project_stage: ProjectStage,
    render_mode: ClientWindowRenderMode,
    plan: PropagationPlan,
}

fn show_render_mode(
    config: &Config,
    format: OutputFormat,
    user_agent: &str,
    no_script: bool,
    stage: Option<&str>,
) -> Result<()> {
    let project_stage = match stage {
        Some(raw) => raw
            .parse::<ProjectStage>()
            .map_err(|reason| anyhow::anyhow!(reason))?,
        None => config.project_stage,
    };

    let mut request = HttpRequest::new().with_user_agent(user_agent);
    if no_script {
        request = request.with_cookie(NO_SCRIPT_COOKIE, "false");
    }
    let client = ClientWindowConfig::new(
        config.client_window.clone(),
        project_stage,
        config.window.max_count,
    );
    let render_mode = client.render_mode(&request);
    let report = RenderModeReport {
        user_agent: user_agent.to_string(),
        javascript_enabled: client.is_javascript_enabled(&request),
        project_stage,
        render_mode,
        plan: PropagationPlan::for_mode(render_mode),
    };

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Plain => {
            println!("render mode: {}", report.render_mode);
            println!("javascript:  {}", if report.javascript_enabled { "enabled" } else { "disabled" });
            println!("stage:       {}", report.project_stage);
            let plan = report.plan;
            println!(
                "channels:    url={} hidden-field={} script={} handler-page={}",
                plan.url_parameter, plan.hidden_field, plan.script, plan.handler_page
            );
            Ok(())
        }
    }
}

// =============================================================================
// simulate
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Open(WindowId),
    Close(WindowId),
    End,
}

fn parse_action(raw: &str) -> Result<Action> {
    if raw == "end" {
        return Ok(Action::End);
    }
    let Some((verb, id)) = raw.split_once(':') else {
        bail!("invalid action {raw:?}: expected open:<id>, close:<id> or end");
    };
    let window_id = WindowId::parse(id)
        .with_context(|| format!("invalid window id {id:?} in action {raw:?}"))?;
    match verb {
        "open" => Ok(Action::Open(window_id)),
        "close" => Ok(Action::Close(window_id)),
        _ => bail!("unknown action {verb:?}: expected open, close or end"),
    }
}

#[derive(Debug, Serialize)]
struct StepReport {
    action: String,
    /// Windows whose instances were destroyed by this step
    destroyed: Vec<String>,
    active: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    max_count: usize,
    steps: Vec<StepReport>,
}

fn simulate(config: Config, format: OutputFormat, raw_actions: &[String]) -> Result<()> {
    let actions = raw_actions
        .iter()
        .map(|raw| parse_action(raw))
        .collect::<Result<Vec<_>>>()?;

    let max_count = config.window.max_count;
    let mut container = StandaloneContainer::new(config)?;
    let mut extension = WindowScopeExtension::new();
    container.deploy(&mut [&mut extension])?;
    let context = extension
        .window_context()
        .context("window scope extension did not register its context")?;

    // Each window gets one labelled instance; destroying it logs the label.
    let destroyed_log = Arc::new(Mutex::new(Vec::<String>::new()));
    let log = Arc::clone(&destroyed_log);
    let page_state: Arc<dyn Contextual> = Arc::new(
        FnBean::new("page-state", |_| Ok(Mutex::new(String::new()))).on_destroy(
            move |label: &Mutex<String>| {
                let label = label.lock().unwrap_or_else(|e| e.into_inner()).clone();
                log.lock().unwrap_or_else(|e| e.into_inner()).push(label);
            },
        ),
    );

    let session = SessionId::new(SIMULATED_SESSION);
    let mut steps = Vec::with_capacity(actions.len());
    for (raw, action) in raw_actions.iter().zip(&actions) {
        match action {
            Action::Open(window_id) => {
                let request = HttpRequest::new().with_parameter(WINDOW_ID_PARAMETER, window_id.as_str());
                let request_context = RequestContext::new(session.clone(), &request);
                let label = context.get_or_create_typed::<Mutex<String>>(&request_context, &page_state)?;
                *label.lock().unwrap_or_else(|e| e.into_inner()) = window_id.to_string();
            }
            Action::Close(window_id) => {
                context.close_window(&session, window_id)?;
            }
            Action::End => {
                container.end_session(&session);
            }
        }

        let destroyed = std::mem::take(&mut *destroyed_log.lock().unwrap_or_else(|e| e.into_inner()));
        let active = context
            .active_window_ids(&session)?
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        steps.push(StepReport {
            action: raw.clone(),
            destroyed,
            active,
        });
    }

    let report = SimulationReport { max_count, steps };
    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Plain => {
            println!("max windows per session: {}", report.max_count);
            for step in &report.steps {
                println!("{:<20} active: [{}]", step.action, step.active.join(", "));
                if !step.destroyed.is_empty() {
                    println!("{:<20} destroyed: {}", "", step.destroyed.join(", "));
                }
            }
            Ok(())
        }
    }
}
