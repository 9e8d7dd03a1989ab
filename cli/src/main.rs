//! CLI entrypoint for tooldesk
//!
//! This is the main binary that wires together all layers using
//! dependency injection. `serve` runs the router; every other subcommand
//! is a one-shot client of a running router.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tooldesk_application::{
    EndpointRegistry, MicrophoneBridge, RunCompletionUseCase, SessionRegistry, ToolDispatcher,
};
use tooldesk_domain::Uid;
use tooldesk_infrastructure::{
    AppCorpus, CommandAudioCapture, ConfigLoader, FileConfig, FsFileStore, JsonlConversationLogger,
    OpenAiGateway, ProcessLauncher, RouterClient, RouterServer, RouterState, SecretStore,
    ToolClient,
};
use tooldesk_presentation::{
    Cli, Command, JsonFormatter, OutputFormat, SecretsAction, SimpleTray, TrayReporter, TrayView,
    formatter_for,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// File in `data_dir` holding the port of the running router.
const PORT_FILE: &str = "router.port";

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.show_config {
        ConfigLoader::print_config_sources();
        return Ok(());
    }

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref()).context("Failed to load configuration")?
    };
    let issues = config.validate();
    if !issues.is_empty() {
        for issue in &issues {
            eprintln!("config: {}", issue);
        }
        bail!("{} configuration error(s)", issues.len());
    }

    let _log_guard = init_logging(cli.verbose, config.logging.directory.as_deref());

    match cli.command() {
        Command::Serve => serve(&config).await,
        Command::Secrets { action } => secrets(&config, action),
        command => run_client(&cli, &config, command).await,
    }
}

/// Install the stderr subscriber plus, when configured, a daily rolling
/// log file. The returned guard flushes the file writer on drop.
fn init_logging(verbose: u8, directory: Option<&Path>) -> Option<WorkerGuard> {
    let filter = match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tooldesk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}

fn open_secrets(config: &FileConfig) -> Result<SecretStore> {
    SecretStore::from_env(config.secrets_path(), &config.secrets.passphrase_env)
        .context("Failed to open the secret store")
}

async fn serve(config: &FileConfig) -> Result<()> {
    info!("Starting tooldesk router");
    let router = &config.router;
    std::fs::create_dir_all(&router.data_dir)
        .with_context(|| format!("Failed to create {}", router.data_dir.display()))?;

    // === Dependency Injection ===
    let secrets = match open_secrets(config) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, "Secret store unavailable; providers without a key stay unauthenticated");
            None
        }
    };
    let gateway = Arc::new(OpenAiGateway::from_config(config, secrets.as_ref()));

    let sessions = SessionRegistry::new();
    let dispatcher = Arc::new(ToolDispatcher::new(
        Arc::new(EndpointRegistry::new()),
        sessions.clone(),
        Arc::new(ToolClient::new()),
        Arc::new(ProcessLauncher::new(&router.apps_dir)),
        Arc::new(AppCorpus::open(&router.apps_dir)),
        config.dispatch_params(),
    ));

    let mut engine =
        RunCompletionUseCase::new(gateway, dispatcher.clone(), config.completion_params());
    if let Some(path) = &config.logging.conversation_log {
        match JsonlConversationLogger::new(path) {
            Some(logger) => engine = engine.with_conversation_logger(Arc::new(logger)),
            None => warn!(path = %path.display(), "Conversation log disabled"),
        }
    }

    let mic = &config.microphone;
    let capture = CommandAudioCapture::new(&mic.record_command, mic.sample_rate, &mic.mp3_command);
    let microphone = Arc::new(MicrophoneBridge::new(Arc::new(capture), sessions));

    let files = Arc::new(FsFileStore::new(&router.data_dir));
    let state = Arc::new(RouterState::new(dispatcher, Arc::new(engine), microphone, files));

    let server = RouterServer::bind(router.port, state)
        .await
        .with_context(|| format!("Failed to bind router port {}", router.port))?;
    let port_file = router.data_dir.join(PORT_FILE);
    std::fs::write(&port_file, server.port().to_string())
        .with_context(|| format!("Failed to write {}", port_file.display()))?;
    println!("tooldesk router listening on 127.0.0.1:{}", server.port());

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    server.serve(shutdown).await;

    let _ = std::fs::remove_file(&port_file);
    Ok(())
}

/// `--port`, then the configured port, then the port file of a running
/// router.
fn router_port(cli: &Cli, config: &FileConfig) -> Result<u16> {
    if let Some(port) = cli.port {
        return Ok(port);
    }
    if config.router.port != 0 {
        return Ok(config.router.port);
    }
    let path: PathBuf = config.router.data_dir.join(PORT_FILE);
    let text = std::fs::read_to_string(&path).with_context(|| {
        format!("No running router found ({} missing); pass --port", path.display())
    })?;
    text.trim()
        .parse()
        .with_context(|| format!("Invalid port in {}", path.display()))
}

fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

async fn run_client(cli: &Cli, config: &FileConfig, command: Command) -> Result<()> {
    let client = RouterClient::new(router_port(cli, config)?);
    let formatter = formatter_for(cli.output);

    match command {
        Command::Call {
            tool,
            function,
            params,
            ui_uid,
        } => {
            serde_json::from_str::<serde_json::Value>(&params)
                .context("Parameters must be a JSON document")?;
            let reply = client.build(&tool, Uid(ui_uid), &function, &params).await?;
            println!("{}", formatter.format_reply(&reply));
        }
        Command::Msgs { watch, interval_ms } => {
            if watch {
                watch_msgs(&client, cli.output, Duration::from_millis(interval_ms)).await?;
            } else {
                let msgs = client.get_msgs().await?;
                println!("{}", formatter.format_msgs(&msgs, unix_now()));
            }
        }
        Command::Stop { target } => {
            client.stop_msg_name(&target).await?;
            if cli.output == OutputFormat::Text {
                println!("Stop requested for {}", target);
            }
        }
        Command::Schemas { app } => {
            let schemas = client.get_tools_schemas(app.as_deref().unwrap_or("")).await?;
            println!("{}", formatter.format_schemas(&schemas));
        }
        Command::GenerateApp { name } => {
            client.generate_app(&name).await?;
            println!("Created app {}", name);
        }
        Command::RenameApp { old, new } => {
            client.rename_app(&old, &new).await?;
            println!("Renamed app {} to {}", old, new);
        }
        other => bail!("{:?} is not a client command", other),
    }
    Ok(())
}

async fn watch_msgs(client: &RouterClient, output: OutputFormat, interval: Duration) -> Result<()> {
    let tray: Box<dyn TrayView> = match output {
        OutputFormat::Text => Box::new(TrayReporter::new()),
        OutputFormat::Json => Box::new(SimpleTray::with_formatter(Box::new(JsonFormatter))),
    };
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let msgs = client.get_msgs().await?;
                tray.show(&msgs, unix_now());
            }
        }
    }
    tray.finish();
    Ok(())
}

fn secrets(config: &FileConfig, action: SecretsAction) -> Result<()> {
    let store = open_secrets(config)?;
    match action {
        SecretsAction::Set { alias, value } => {
            let value = match value {
                Some(v) => v,
                None => {
                    let mut line = String::new();
                    std::io::stdin()
                        .lock()
                        .read_line(&mut line)
                        .context("Failed to read the secret from stdin")?;
                    line.trim_end_matches(['\r', '\n']).to_string()
                }
            };
            store.set(&alias, &value)?;
            println!("Stored {}", alias);
        }
        SecretsAction::Get { alias } => match store.get(&alias)? {
            Some(value) => println!("{}", value),
            None => bail!("No secret named {}", alias),
        },
        SecretsAction::List => {
            for alias in store.list()? {
                println!("{}", alias);
            }
        }
        SecretsAction::Remove { alias } => {
            if !store.remove(&alias)? {
                bail!("No secret named {}", alias);
            }
            println!("Removed {}", alias);
        }
    }
    Ok(())
}
