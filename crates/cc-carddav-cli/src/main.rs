//! cc-carddav: command line client for CardDAV address books
//!
//! Usage:
//!   cc-carddav books                                - List address books
//!   cc-carddav cards <book-url>                     - List the cards of an address book
//!   cc-carddav create <book-url> <file> [filename]  - Upload a new card
//!   cc-carddav update <card-url> <etag> <file>      - Replace a card
//!   cc-carddav delete <card-url> <etag>             - Delete a card

mod commands;

use cc_carddav::{CardDavClient, CardDavConfig};
use tracing_subscriber::EnvFilter;

use crate::commands::Command;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    match command {
        Command::Help => {
            print_help();
            return Ok(());
        }
        Command::Version => {
            println!("cc-carddav {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = CardDavConfig::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;
    tracing::info!("Using CardDAV server {}", config.server_url);

    let client = CardDavClient::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to create CardDAV client: {}", e))?;

    let output = commands::run(&client, &config, command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Print help message
fn print_help() {
    println!("cc-carddav - CardDAV address book client");
    println!();
    println!("Usage:");
    println!("  cc-carddav books                                List address books");
    println!("  cc-carddav cards <book-url>                     List cards in an address book");
    println!("  cc-carddav create <book-url> <file> [filename]  Upload a new card");
    println!("  cc-carddav update <card-url> <etag> <file>      Replace a card");
    println!("  cc-carddav delete <card-url> <etag>             Delete a card");
    println!("  cc-carddav --help                               Show this help message");
    println!("  cc-carddav --version                            Show version");
    println!();
    println!("Configuration is read from ./cc-carddav.toml, or from the environment:");
    println!("  CARDDAV_SERVER_URL          Server URL (required)");
    println!("  CARDDAV_USERNAME            Basic auth user");
    println!("  CARDDAV_PASSWORD            Basic auth password");
    println!("  CARDDAV_HOME_URL            Address book home set (required for books)");
    println!("  CARDDAV_ROOT_URL            Base for server hrefs (required for books)");
    println!("  CARDDAV_TIMEOUT_SECS        Request timeout (default: 30)");
    println!("  CARDDAV_REPORT_CONCURRENCY  Parallel report lookups (default: 8)");
}
