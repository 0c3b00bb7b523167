use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use intake_gateway::api::ApiServerBuilder;
use intake_gateway::channels::{MediaSource, Messenger, WhatsAppChannel};
use intake_gateway::db::{self, DocumentRepo, UserRepo, UserStatus};
use intake_gateway::drive::{DriveClient, GoogleDrive};
use intake_gateway::engine::ConversationEngine;
use intake_gateway::session::SessionStore;
use intake_gateway::Config;

/// Intake - WhatsApp document intake bot backed by Google Drive
#[derive(Parser)]
#[command(name = "intake", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook server (default)
    Serve,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserCommand,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Register a phone number
    Add {
        /// Phone number as WhatsApp reports it (digits, country code first)
        #[arg(long)]
        phone: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
    /// Activate or deactivate a user
    Status {
        #[arg(long)]
        phone: String,
        status: StatusArg,
    },
    /// Show a user's account and document counts
    Show {
        #[arg(long)]
        phone: String,
    },
    /// List registered users
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Active,
    Inactive,
}

impl From<StatusArg> for UserStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Active => Self::Active,
            StatusArg::Inactive => Self::Inactive,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,intake_gateway=info",
        1 => "info,intake_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Some(Command::User { action }) => user_command(&config, action),
        Some(Command::Serve) | None => serve(config, cli.port).await,
    }
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let db_path = config.db_path();
    let access_token = config
        .whatsapp
        .access_token
        .context("WHATSAPP_ACCESS_TOKEN is required to serve")?;
    let phone_number_id = config
        .whatsapp
        .phone_number_id
        .context("WHATSAPP_PHONE_NUMBER_ID is required to serve")?;
    if config.google.client_id.is_none() || config.google.client_secret.is_none() {
        tracing::warn!("Google OAuth client not configured; expired Drive tokens cannot be refreshed");
    }
    if config.whatsapp.verify_token.is_none() {
        tracing::warn!("VERIFY_TOKEN not set; webhook verification will be rejected");
    }

    let pool = db::init(&db_path)?;
    tracing::info!(path = %db_path.display(), "database ready");

    let whatsapp = Arc::new(WhatsAppChannel::new(
        access_token,
        phone_number_id,
        config.whatsapp.api_version,
    ));
    let messenger: Arc<dyn Messenger> = whatsapp.clone();
    let media: Arc<dyn MediaSource> = whatsapp;
    let drive: Arc<dyn DriveClient> = Arc::new(GoogleDrive::new(
        UserRepo::new(pool.clone()),
        config.google.client_id,
        config.google.client_secret,
    ));

    let engine = Arc::new(ConversationEngine::new(
        pool.clone(),
        messenger,
        media,
        drive,
        SessionStore::new(config.session.ttl),
    ));

    let port = port.unwrap_or(config.api_server.port);
    tracing::info!(port, "starting intake gateway");

    ApiServerBuilder::new(pool, engine, port)
        .verify_token(config.whatsapp.verify_token)
        .dedup_capacity(config.session.dedup_capacity)
        .build()
        .run()
        .await?;

    Ok(())
}

fn user_command(config: &Config, action: UserCommand) -> anyhow::Result<()> {
    let pool = db::init(config.db_path())?;
    let users = UserRepo::new(pool.clone());

    match action {
        UserCommand::Add { phone, name } => {
            let user = users.create(&phone, name.as_deref())?;
            println!("Created user {} for {}", user.id, user.phone_number);
        }
        UserCommand::Status { phone, status } => {
            let status = UserStatus::from(status);
            users.set_status(&phone, status)?;
            println!("User {phone} is now {}", status.as_str());
        }
        UserCommand::Show { phone } => match users.find_by_phone(&phone)? {
            Some(user) => {
                let documents = DocumentRepo::new(pool).count(&phone)?;
                println!("User:      {}", user.id);
                println!("Phone:     {}", user.phone_number);
                println!("Name:      {}", user.user_name.as_deref().unwrap_or("-"));
                println!("Status:    {}", user.status.as_str());
                println!("Drive:     {}", if user.is_drive_linked() { "linked" } else { "not linked" });
                println!("Default:   {}", user.default_folder_id.as_deref().unwrap_or("-"));
                println!("Folders:   {}", user.folders.len());
                println!("Documents: {documents}");
            }
            None => println!("No user with phone {phone}"),
        },
        UserCommand::List => {
            for user in users.list_all()? {
                println!(
                    "{}  {:<8}  {:<10}  {}",
                    user.phone_number,
                    user.status.as_str(),
                    if user.is_drive_linked() { "linked" } else { "unlinked" },
                    user.user_name.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}
