use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use lims_client::auth;
use lims_client::client::ApiClient;
use lims_client::config::ClientConfig;
use lims_client::routing::ServiceRouter;
use lims_client::session::SessionStore;

#[derive(Parser)]
#[command(name = "lims-client", version, about = "LIMS platform API client")]
struct AppCli {
    /// Config file path; falls back to environment-driven defaults
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the service routing table, or resolve a single path
    Routes {
        /// Path to resolve instead of dumping the whole table
        path: Option<String>,
    },
    /// Verify credentials against the auth service
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Issue an authenticated GET and print the response body
    Get {
        path: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
}

fn load_config(path: Option<&str>) -> Result<ClientConfig> {
    match path {
        Some(path) => ClientConfig::from_file(path).context("loading config file"),
        None => ClientConfig::from_env().context("loading config from environment"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    lims_client::utils::logging::init();

    let args = AppCli::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Commands::Routes { path } => {
            let router = ServiceRouter::new(&config);
            match path {
                Some(path) => println!("{} -> {}", path, router.target_url(&path)),
                None => {
                    for route in &config.routes {
                        println!("{:<14} -> {}", route.prefix, route.base_url);
                    }
                    println!("{:<14} -> {}", "(default)", config.default_base_url);
                }
            }
        }
        Commands::Login { email, password } => {
            let client = ApiClient::new(config, SessionStore::new())?;
            let profile = auth::login(&client, &email, &password)
                .await
                .context("login failed")?;
            info!(email = %profile.email, role = %profile.role, "login ok");
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Commands::Get {
            path,
            email,
            password,
        } => {
            let client = ApiClient::new(config, SessionStore::new())?;
            if let (Some(email), Some(password)) = (email.as_deref(), password.as_deref()) {
                auth::login(&client, email, password)
                    .await
                    .context("login failed")?;
            }
            let response = client.get(&path).await.context("request failed")?;
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            info!(status = %status, "request finished");
            println!("{body}");
        }
    }

    Ok(())
}
