//! cc-carddav: CardDAV address book client
//!
//! This crate builds and interprets the WebDAV documents needed to work with
//! contacts on a CardDAV server.
//!
//! ## Features
//!
//! - Address book discovery with supported report sets
//! - Card listing via `addressbook-query` / `addressbook-multiget`
//! - Conditional create (`If-None-Match: *`), update and delete (`If-Match`)
//! - Per-call header overrides and exclusions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cc_carddav::{CardDavClient, CardDavConfig, FetchAddressBooks, FetchVCards};
//!
//! let config = CardDavConfig::load()?;
//! let client = CardDavClient::from_config(&config)?;
//!
//! let books = client
//!     .fetch_address_books(FetchAddressBooks::new(config.account()))
//!     .await?;
//! for book in books {
//!     let cards = client.fetch_vcards(FetchVCards::new(book)).await?;
//!     println!("{} cards", cards.len());
//! }
//! ```

pub mod address_book;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod transport;
pub mod xml;

pub use reqwest;

pub use address_book::{
    AddressBookMultiGet, AddressBookQuery, CardDavClient, CreateVCard, FetchAddressBooks,
    FetchVCards, ModifyVCard,
};
pub use client::HttpTransport;
pub use config::CardDavConfig;
pub use error::{CardDavError, Result};
pub use models::{Account, AddressBook, DavResponse, Depth, PropValue, VCard};
pub use transport::{DavTransport, FetchOptions, RequestParams};
pub use xml::{Namespace, PropName, XmlElement};

/// Re-export the common types for easy use
pub mod prelude {
    pub use super::{
        AddressBook, CardDavClient, CardDavConfig, FetchAddressBooks, FetchVCards, ModifyVCard,
        VCard,
    };
}
