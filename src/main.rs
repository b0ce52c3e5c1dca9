#![allow(missing_docs)]

//! SentryAI — autonomous security-assessment core.
//!
//! `serve` runs the control API, observer channel, event bridge, and
//! mission manager. `document-tool` and `tools` are offline registry
//! maintenance commands.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use sentryai::config::Config;
use sentryai::context::{CoreContext, InitError};
use sentryai::server::{router, AppState};
use sentryai::tools::documenter::AutoDocumenter;
use sentryai::tools::ToolRegistry;

#[derive(Debug, Parser)]
#[command(name = "sentryai", about = "Autonomous security-assessment core")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the control API and mission workers (default).
    Serve,
    /// Generate and register a tool schema from a binary's help output.
    DocumentTool {
        /// Tool name (binary resolved on PATH unless --path is given).
        name: String,
        /// Explicit binary path.
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// List registered tool schemas.
    Tools,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::DocumentTool { name, path } => {
            sentryai::logging::init_cli();
            document_tool(&name, path).await
        }
        Command::Tools => {
            sentryai::logging::init_cli();
            list_tools()
        }
    }
}

/// Run the core: exit 0 on clean shutdown, 1 for configuration errors,
/// 2 for backend connection failures.
async fn serve() -> ExitCode {
    let _logging_guard = match sentryai::logging::init_production(&PathBuf::from("logs")) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialise logging: {e}");
            return ExitCode::from(1);
        }
    };

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(1);
        }
    };

    let bind_addr = config.server.bind_addr.clone();
    let context = match CoreContext::init(config).await {
        Ok(context) => context,
        Err(InitError::Config(message)) => {
            error!(error = %message, "configuration error");
            return ExitCode::from(1);
        }
        Err(InitError::Backend(message)) => {
            error!(error = %message, "backend connection failed");
            return ExitCode::from(2);
        }
    };

    let state = AppState {
        manager: context.manager.clone(),
        fabric: context.fabric.clone(),
        tenant_id: context.config.tenant.tenant_id.clone(),
    };

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %bind_addr, error = %e, "failed to bind control API");
            return ExitCode::from(1);
        }
    };

    info!(addr = %bind_addr, "control API listening");
    if let Err(e) = axum::serve(listener, router(state)).await {
        error!(error = %e, "server error");
        return ExitCode::from(2);
    }

    ExitCode::SUCCESS
}

/// Document one tool offline and persist its schema to the registry.
async fn document_tool(name: &str, path: Option<PathBuf>) -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(1);
        }
    };

    let registry = match ToolRegistry::new_without_watcher(config.tools.dir.clone().into()) {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "failed to open tool registry");
            return ExitCode::from(1);
        }
    };

    let documenter = AutoDocumenter {
        tools_dir: Some(PathBuf::from(&config.tools.dir)),
    };

    match documenter.document_tool(name, path).await {
        Ok(schema) => match registry.register(&schema) {
            Ok(registered) => {
                println!("registered tool schema: {registered}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "failed to persist schema");
                ExitCode::from(1)
            }
        },
        Err(e) => {
            error!(tool = %name, error = %e, "documentation failed");
            ExitCode::from(1)
        }
    }
}

/// Print the registered tool names.
fn list_tools() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(1);
        }
    };

    match ToolRegistry::new_without_watcher(config.tools.dir.clone().into()) {
        Ok(registry) => {
            for name in registry.names() {
                println!("{name}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "failed to open tool registry");
            ExitCode::from(1)
        }
    }
}
