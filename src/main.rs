//! VoxBridge - Voice Commands for Conversational Agents
//!
//! Command line front end for the voice session and the tool gateway.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voxbridge::audio::Microphone;
use voxbridge::error::log_errors;
use voxbridge::gateway::RpcReply;
use voxbridge::handler::DispatchHandler;
use voxbridge::listener::Listener;
use voxbridge::tts::{self, Speaker, VoiceSettings};
use voxbridge::{CommandInterpreter, Config, ToolDispatcher, ToolRegistry, ToolServerGateway, VoiceSession};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Alternate config file
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the voice session (default)
    Listen {
        /// Audio input device index
        #[arg(short, long)]
        device: Option<usize>,

        /// Skip the wake word and start in active mode
        #[arg(long)]
        active: bool,
    },
    /// Interpret a transcript and print the command as JSON
    Parse { text: Vec<String> },
    /// List the configured tool servers
    Servers {
        /// Also ask every server for its tools
        #[arg(long)]
        tools: bool,
    },
    /// Call one tool on one server
    Call {
        server: String,
        tool: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Run the tool calls embedded in model output read from stdin
    Dispatch,
    /// Speak text through the configured engine
    Say { text: Vec<String> },
}

fn init_logging(verbose: bool, fallback: &str) {
    let default = if verbose { "debug" } else { fallback };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    init_logging(args.verbose, &config.log_level);

    match args.command.unwrap_or(Cmd::Listen {
        device: None,
        active: false,
    }) {
        Cmd::Listen { device, active } => listen(config, device, active).await,
        Cmd::Parse { text } => {
            let command = CommandInterpreter::new().parse(&text.join(" "));
            println!("{}", serde_json::to_string_pretty(&command)?);
            Ok(())
        }
        Cmd::Servers { tools } => servers(&config, tools).await,
        Cmd::Call {
            server,
            tool,
            args,
            timeout,
        } => call(&config, &server, &tool, &args, timeout).await,
        Cmd::Dispatch => dispatch(&config).await,
        Cmd::Say { text } => say(&config, &text.join(" ")).await,
    }
}

fn build_registry(config: &Config, gateway: &Arc<ToolServerGateway>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let routed = registry.register_routes(gateway, &config.tool_routes);
    info!("🧰 {} voice routes registered", routed);
    registry
}

async fn make_speaker(config: &Config) -> Result<Arc<Speaker>> {
    let engine = tts::create_engine(config).await?;
    let speaker = Speaker::new(engine, VoiceSettings::from_config(config), log_errors())?;
    Ok(Arc::new(speaker))
}

async fn listen(config: Config, device: Option<usize>, active: bool) -> Result<()> {
    info!("🎤 VoxBridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let device = device.or(config.input_device);
    let microphone = Microphone::open(
        device,
        config.energy_threshold,
        Duration::from_secs_f32(config.phrase_limit_secs.max(0.5)),
    )
    .context("Failed to open microphone")?;
    let recognizer = voxbridge::asr::create_recognizer(&config)?;
    let listener = Listener::new(
        Arc::new(microphone),
        recognizer,
        config.transcription_order,
        log_errors(),
    )?;
    let speaker = make_speaker(&config).await?;

    let gateway = Arc::new(ToolServerGateway::from_config(&config));
    let registry = build_registry(&config, &gateway);
    let handler = DispatchHandler::new(ToolDispatcher::new(Arc::new(registry)));

    let session = VoiceSession::new(listener, speaker, &config, log_errors());
    session.set_handler(Arc::new(handler));
    if active {
        session.toggle_mode();
    }
    session.start()?;

    if session.is_wake_word_mode() {
        info!("✅ Ready - say '{}' followed by a command", config.wake_word);
    } else {
        info!("✅ Ready - speak a command");
    }

    tokio::signal::ctrl_c().await?;
    info!("👋 Shutting down");
    session.shutdown().await;
    Ok(())
}

async fn servers(config: &Config, list_tools: bool) -> Result<()> {
    let gateway = ToolServerGateway::from_config(config);
    if gateway.servers().is_empty() {
        warn!("⚠️ No tool servers configured");
    }
    for name in gateway.servers() {
        let Some(descriptor) = gateway.descriptor(&name) else {
            continue;
        };
        println!("{}: {}", name, descriptor.command.join(" "));
        if list_tools {
            match gateway.list_tools(&name, None).await {
                Ok(tools) => {
                    for tool in tools {
                        println!("  - {}: {}", tool.name, tool.description);
                    }
                }
                Err(e) => println!("  ! {}", e),
            }
        }
    }
    Ok(())
}

async fn call(
    config: &Config,
    server: &str,
    tool: &str,
    args: &str,
    timeout: Option<u64>,
) -> Result<()> {
    let arguments: Value = serde_json::from_str(args).context("--args must be JSON")?;
    let gateway = ToolServerGateway::from_config(config);
    let reply = gateway
        .call(server, tool, arguments, timeout.map(Duration::from_secs))
        .await?;

    println!("{}", serde_json::to_string_pretty(&reply)?);
    if let RpcReply::Error(_) = reply {
        std::process::exit(1);
    }
    Ok(())
}

async fn dispatch(config: &Config) -> Result<()> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read stdin")?;

    let gateway = Arc::new(ToolServerGateway::from_config(config));
    let mut registry = build_registry(config, &gateway);
    registry.discover(&gateway).await;

    let dispatcher = ToolDispatcher::new(Arc::new(registry));
    let report = dispatcher.process_text(&text).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn say(config: &Config, text: &str) -> Result<()> {
    let speaker = make_speaker(config).await?;
    if !speaker.speak(text, false) {
        anyhow::bail!("Nothing to say");
    }
    speaker.wait_until_done(Duration::from_secs(60)).await;
    speaker.shutdown().await;
    Ok(())
}
