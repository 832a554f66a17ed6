//! Data models for CardDAV address books and contact cards

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Server principal as seen by this crate.
///
/// Both URLs are filled in by account bootstrap, which lives outside this
/// crate; operations that need them fail with a validation error when either
/// is missing.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Account {
    /// Address book home set; collections are discovered beneath it
    #[serde(default)]
    pub home_url: Option<String>,
    /// Base used to resolve hrefs returned by the server
    #[serde(default)]
    pub root_url: Option<String>,
}

impl Account {
    /// Create an account with both URLs known
    pub fn new(home_url: impl Into<String>, root_url: impl Into<String>) -> Self {
        Self {
            home_url: Some(home_url.into()),
            root_url: Some(root_url.into()),
        }
    }
}

/// A contact collection on the server
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AddressBook {
    /// Absolute URL of the collection
    pub url: String,
    /// Collection change tag
    #[serde(default)]
    pub ctag: Option<String>,
    /// Display name, empty when the server reports none
    #[serde(default)]
    pub display_name: String,
    /// Resource types reported for the collection (e.g. `collection`, `addressbook`)
    #[serde(default)]
    pub resource_types: Vec<String>,
    /// Collection-level sync token
    #[serde(default)]
    pub sync_token: Option<String>,
    /// Reports the server supports on this collection
    #[serde(default)]
    pub reports: Vec<String>,
}

impl AddressBook {
    /// Create an address book reference from its URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// A single contact resource
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct VCard {
    /// Absolute URL of the resource
    pub url: String,
    /// Entity tag of the version this record was read at
    #[serde(default)]
    pub etag: Option<String>,
    /// Raw vCard text
    #[serde(default)]
    pub data: String,
}

impl VCard {
    /// Create a card from its URL and vCard text
    pub fn new(url: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            etag: None,
            data: data.into(),
        }
    }

    /// Set the entity tag
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// WebDAV traversal depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    /// Value of the `Depth` request header
    pub fn as_str(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        }
    }
}

/// Decoded value of a single WebDAV property.
///
/// Text and CDATA content both decode to `Text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    Empty,
    Text(String),
    Children(Vec<(String, PropValue)>),
}

impl PropValue {
    /// Text content, if this value is flat text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Child elements in document order
    pub fn children(&self) -> &[(String, PropValue)] {
        match self {
            PropValue::Children(children) => children,
            _ => &[],
        }
    }

    /// Local names of the child elements
    pub fn child_names(&self) -> Vec<&str> {
        self.children().iter().map(|(name, _)| name.as_str()).collect()
    }

    /// First child element with the given local name
    pub fn child(&self, name: &str) -> Option<&PropValue> {
        self.children()
            .iter()
            .find(|(child, _)| child == name)
            .map(|(_, value)| value)
    }
}

/// One `<response>` element of a multi-status document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavResponse {
    /// Href as sent by the server, possibly relative
    pub href: String,
    /// Response-level status code, when the server sent one
    pub status: Option<u16>,
    /// Whether the resource was reported successfully
    pub ok: bool,
    /// Properties from successful propstats, keyed by local name
    pub props: BTreeMap<String, PropValue>,
}

impl DavResponse {
    /// Property by local name
    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.props.get(name)
    }

    /// Text value of a property by local name
    pub fn text(&self, name: &str) -> Option<&str> {
        self.prop(name).and_then(PropValue::as_text)
    }
}
