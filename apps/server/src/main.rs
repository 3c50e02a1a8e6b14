use anyhow::Context;
use clap::{Parser, Subcommand};
use parlor_chats::{AttachmentStorage, ChatStore};
use parlor_config::load as load_config;
use parlor_gateway::{create_router, GatewayState};
use parlor_runtime::{shutdown_signal, telemetry, BackendServices};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "parlor")]
#[command(about = "Parlor realtime messaging backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server (default)
    Serve,
    /// Print a bearer token for a user id, signed with the configured secret
    IssueToken {
        #[arg(long)]
        user: String,
    },
    /// Print a user's chats with their unread counters
    DumpChats {
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server().await,
        Commands::IssueToken { user } => issue_token(&user),
        Commands::DumpChats { user } => dump_chats(&user).await,
    }
}

async fn run_server() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    info!("starting Parlor backend");

    let config = load_config().context("failed to load configuration")?;

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let state = GatewayState::new(
        services.engine.clone(),
        services.verifier.clone(),
        config.realtime.clone(),
        AttachmentStorage::new(&config.uploads.root),
    );
    let app = create_router(state);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    info!(
        open_sessions = services.registry.session_count().await,
        "backend shut down"
    );
    Ok(())
}

fn issue_token(user: &str) -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    let verifier = parlor_auth::JwtVerifier::from_config(&config.auth);
    let token = verifier
        .issue(user)
        .context("failed to issue token")?;

    println!("{token}");
    Ok(())
}

async fn dump_chats(user: &str) -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let chats = services
        .store
        .list_chats(user)
        .await
        .context("failed to list chats")?;

    if chats.is_empty() {
        println!("No chats found for {user}");
        return Ok(());
    }

    println!(
        "{:<26} {:<30} {:<8} {:<26}",
        "Chat", "With", "Unread", "Updated At"
    );
    println!("{}", "-".repeat(92));

    for chat in chats {
        let others: Vec<&str> = chat.others(user).map(String::as_str).collect();
        println!(
            "{:<26} {:<30} {:<8} {:<26}",
            chat.id,
            others.join(", "),
            chat.unread_for(user),
            chat.updated_at.to_rfc3339()
        );
    }

    Ok(())
}
