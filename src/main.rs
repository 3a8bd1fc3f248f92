use clap::{Parser, Subcommand};

use owasp_lab::{
    app::{build_app, serve},
    config::AppConfig,
    state::{connect_store, AppState},
    telemetry::{self, RecentLogs},
    users::Role,
};

/// OWASP Top 10 teaching backend
#[derive(Parser, Debug)]
#[command(name = "owasp-lab", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Give an existing account the admin role
    GrantAdmin {
        /// Account username
        username: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let recent_logs = RecentLogs::default();
    telemetry::init(recent_logs.clone());

    let config = AppConfig::from_env()?;
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!(
                environment = ?config.environment,
                frontend = %config.frontend_url,
                "starting"
            );
            let (host, port) = (config.host.clone(), config.port);
            let state = AppState::init(config, recent_logs).await?;
            let app = build_app(state.clone())?;
            let served = serve(app, &host, port).await;
            state.shutdown().await;
            served
        }
        Command::GrantAdmin { username } => {
            let users = connect_store(&config.database_url).await?;
            let updated = users.set_role(&username, Role::Admin).await;
            users.close().await;
            if !updated? {
                anyhow::bail!("no account named {username:?}");
            }
            tracing::info!(%username, "admin role granted");
            Ok(())
        }
    }
}
