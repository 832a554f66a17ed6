//! Command parsing and execution

use anyhow::{Context, bail};
use cc_carddav::reqwest::Response;
use cc_carddav::{
    AddressBook, CardDavClient, CardDavConfig, CreateVCard, FetchAddressBooks, FetchVCards,
    ModifyVCard, RequestParams, VCard,
};
use serde_json::{Value, json};

/// A parsed command line
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Books,
    Cards {
        book_url: String,
    },
    Create {
        book_url: String,
        file: String,
        filename: Option<String>,
    },
    Update {
        card_url: String,
        etag: String,
        file: String,
    },
    Delete {
        card_url: String,
        etag: String,
    },
    Help,
    Version,
}

impl Command {
    /// Parse the arguments following the program name
    pub fn parse(args: &[String]) -> anyhow::Result<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        if args.iter().any(|a| matches!(*a, "--help" | "-h")) {
            return Ok(Command::Help);
        }
        if args.iter().any(|a| matches!(*a, "--version" | "-v")) {
            return Ok(Command::Version);
        }

        let command = match args.as_slice() {
            [] => Command::Help,
            ["books"] => Command::Books,
            ["cards", book_url] => Command::Cards {
                book_url: book_url.to_string(),
            },
            ["create", book_url, file] => Command::Create {
                book_url: book_url.to_string(),
                file: file.to_string(),
                filename: None,
            },
            ["create", book_url, file, filename] => Command::Create {
                book_url: book_url.to_string(),
                file: file.to_string(),
                filename: Some(filename.to_string()),
            },
            ["update", card_url, etag, file] => Command::Update {
                card_url: card_url.to_string(),
                etag: etag.to_string(),
                file: file.to_string(),
            },
            ["delete", card_url, etag] => Command::Delete {
                card_url: card_url.to_string(),
                etag: etag.to_string(),
            },
            [name, ..] => bail!("invalid arguments for '{}'; see --help", name),
        };
        Ok(command)
    }
}

/// Name for a new card when none is given
fn new_filename() -> String {
    format!("{}.vcf", uuid::Uuid::new_v4())
}

async fn read_card(file: &str) -> anyhow::Result<String> {
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file))
}

fn response_json(response: &Response) -> Value {
    json!({
        "url": response.url().as_str(),
        "status": response.status().as_u16(),
        "etag": response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok()),
    })
}

/// Execute a command and return its JSON output
pub async fn run(
    client: &CardDavClient,
    config: &CardDavConfig,
    command: Command,
) -> anyhow::Result<Value> {
    let output = match command {
        Command::Books => {
            let books = client
                .fetch_address_books(FetchAddressBooks::new(config.account()))
                .await?;
            tracing::info!("Found {} address books", books.len());
            serde_json::to_value(books)?
        }
        Command::Cards { book_url } => {
            let cards = client
                .fetch_vcards(FetchVCards::new(AddressBook::new(book_url)))
                .await?;
            tracing::info!("Fetched {} cards", cards.len());
            serde_json::to_value(cards)?
        }
        Command::Create {
            book_url,
            file,
            filename,
        } => {
            let response = client
                .create_vcard(CreateVCard {
                    address_book: AddressBook::new(book_url),
                    vcard_string: read_card(&file).await?,
                    filename: filename.unwrap_or_else(new_filename),
                    request: RequestParams::default(),
                })
                .await?;
            response_json(&response)
        }
        Command::Update {
            card_url,
            etag,
            file,
        } => {
            let vcard = VCard::new(card_url, read_card(&file).await?).with_etag(etag);
            let response = client.update_vcard(ModifyVCard::new(vcard)).await?;
            response_json(&response)
        }
        Command::Delete { card_url, etag } => {
            let vcard = VCard::new(card_url, "").with_etag(etag);
            let response = client.delete_vcard(ModifyVCard::new(vcard)).await?;
            response_json(&response)
        }
        Command::Help | Command::Version => Value::Null,
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse(&args(&["books"])).unwrap(), Command::Books);
        assert_eq!(
            Command::parse(&args(&["cards", "https://dav.example.com/contacts/"])).unwrap(),
            Command::Cards {
                book_url: "https://dav.example.com/contacts/".to_string()
            }
        );
        assert_eq!(
            Command::parse(&args(&["delete", "https://dav.example.com/c.vcf", "\"abc\""])).unwrap(),
            Command::Delete {
                card_url: "https://dav.example.com/c.vcf".to_string(),
                etag: "\"abc\"".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_create_filename_is_optional() {
        let parsed = Command::parse(&args(&["create", "https://dav.example.com/contacts/", "a.vcf"]))
            .unwrap();
        assert!(matches!(parsed, Command::Create { filename: None, .. }));

        let parsed = Command::parse(&args(&[
            "create",
            "https://dav.example.com/contacts/",
            "a.vcf",
            "card1.vcf",
        ]))
        .unwrap();
        assert!(matches!(parsed, Command::Create { filename: Some(ref f), .. } if f == "card1.vcf"));
    }

    #[test]
    fn test_parse_flags_and_errors() {
        assert_eq!(Command::parse(&[]).unwrap(), Command::Help);
        assert_eq!(Command::parse(&args(&["books", "--help"])).unwrap(), Command::Help);
        assert_eq!(Command::parse(&args(&["-v"])).unwrap(), Command::Version);
        assert!(Command::parse(&args(&["cards"])).is_err());
        assert!(Command::parse(&args(&["rename", "x"])).is_err());
    }

    #[test]
    fn test_new_filename() {
        let name = new_filename();
        assert!(name.ends_with(".vcf"));
        assert_eq!(name.len(), 36 + 4);
    }
}
