use capstan::{AgentConfig, AgentSession, OpenAiBackend, PermissiveGate};
use clap::Parser;
use std::env;
use std::error::Error;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const API_KEY_VAR: &str = "ZHIPUAI_API_KEY";
const BASE_URL_VAR: &str = "GLM_BASE_URL";
const DEFAULT_BASE_URL: &str = "https://api.z.ai/api/coding/paas/v4";

#[derive(Parser, Debug)]
#[command(
    name = "capstan",
    version,
    about = "Agent client with local tools and MCP tool servers"
)]
struct Cli {
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    system: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    prompt_file: Option<String>,
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let cli = Cli::parse();
    debug!(config = ?cli.config, model = ?cli.model, "CLI arguments parsed");

    let cwd = env::current_dir()?;
    let config_path = cli.config.as_deref().map(Path::new);
    let mut config = AgentConfig::load(config_path, cwd)?;
    if let Some(model) = cli.model.clone() {
        config.model = model;
    }
    if let Some(system) = cli.system.clone() {
        config.system_prompt = Some(system);
    }

    let api_key = env::var(API_KEY_VAR)
        .map_err(|_| format!("{API_KEY_VAR} environment variable required"))?;
    let base_url = env::var(BASE_URL_VAR).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let backend = Arc::new(OpenAiBackend::new(base_url, api_key));

    let prompt = load_prompt(&cli)?;
    info!(model = %config.model, servers = config.servers.len(), "starting session");

    let mut session = AgentSession::new(config, backend, Some(Arc::new(PermissiveGate)));
    session.start().await;

    let termination = session
        .run(prompt, |event| match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(error = %err, "failed to serialize event"),
        })
        .await?;
    debug!(?termination, "session finished");
    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init();
    });
}

fn load_prompt(cli: &Cli) -> Result<String, Box<dyn Error>> {
    if let Some(path) = &cli.prompt_file {
        info!(path = %path, "loading prompt from file");
        let content = fs::read_to_string(PathBuf::from(path))?;
        return Ok(normalize_prompt(content));
    }

    if !cli.prompt.is_empty() {
        let joined = cli.prompt.join(" ");
        return Ok(normalize_prompt(joined));
    }

    if atty::isnt(atty::Stream::Stdin) {
        info!("reading prompt from standard input");
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        return Ok(normalize_prompt(buffer));
    }

    warn!("prompt not provided via arguments, file, or stdin");
    Err("prompt required via arguments, file, or stdin".into())
}

fn normalize_prompt(prompt: String) -> String {
    prompt.trim().to_string()
}
