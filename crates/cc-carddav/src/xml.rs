//! WebDAV XML documents: property names, request bodies and multi-status decoding

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{CardDavError, Result};
use crate::models::{DavResponse, PropValue};

/// XML namespaces used in CardDAV documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Dav,
    CardDav,
    CalDav,
    CalendarServer,
    CalDavApple,
}

impl Namespace {
    /// Namespace URI
    pub fn uri(self) -> &'static str {
        match self {
            Namespace::Dav => "DAV:",
            Namespace::CardDav => "urn:ietf:params:xml:ns:carddav",
            Namespace::CalDav => "urn:ietf:params:xml:ns:caldav",
            Namespace::CalendarServer => "http://calendarserver.org/ns/",
            Namespace::CalDavApple => "http://apple.com/ns/ical/",
        }
    }

    /// Prefix bound to the namespace in request documents
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Dav => "d",
            Namespace::CardDav => "card",
            Namespace::CalDav => "c",
            Namespace::CalendarServer => "cs",
            Namespace::CalDavApple => "ca",
        }
    }
}

/// A namespace-qualified element or property name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropName {
    pub namespace: Namespace,
    pub name: Cow<'static, str>,
}

impl PropName {
    pub const fn new(namespace: Namespace, name: &'static str) -> Self {
        Self {
            namespace,
            name: Cow::Borrowed(name),
        }
    }

    /// Name built at runtime, e.g. a server-specific property
    pub fn custom(namespace: Namespace, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: Cow::Owned(name.into()),
        }
    }

    /// Prefixed name as written into request documents
    pub fn qualified(&self) -> String {
        format!("{}:{}", self.namespace.prefix(), self.name)
    }
}

pub const DISPLAY_NAME: PropName = PropName::new(Namespace::Dav, "displayname");
pub const GETETAG: PropName = PropName::new(Namespace::Dav, "getetag");
pub const RESOURCE_TYPE: PropName = PropName::new(Namespace::Dav, "resourcetype");
pub const SYNC_TOKEN: PropName = PropName::new(Namespace::Dav, "sync-token");
pub const SUPPORTED_REPORT_SET: PropName = PropName::new(Namespace::Dav, "supported-report-set");
pub const PROP: PropName = PropName::new(Namespace::Dav, "prop");
pub const PROPFIND: PropName = PropName::new(Namespace::Dav, "propfind");
pub const HREF: PropName = PropName::new(Namespace::Dav, "href");
pub const GETCTAG: PropName = PropName::new(Namespace::CalendarServer, "getctag");
pub const ADDRESS_DATA: PropName = PropName::new(Namespace::CardDav, "address-data");
pub const ADDRESSBOOK_QUERY: PropName = PropName::new(Namespace::CardDav, "addressbook-query");
pub const ADDRESSBOOK_MULTIGET: PropName =
    PropName::new(Namespace::CardDav, "addressbook-multiget");
pub const FILTER: PropName = PropName::new(Namespace::CardDav, "filter");
pub const PROP_FILTER: PropName = PropName::new(Namespace::CardDav, "prop-filter");

/// Element of a request document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: PropName,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    pub fn new(name: PropName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// `<d:prop>` listing the given properties as empty elements
    pub fn prop(props: &[PropName]) -> Self {
        Self::new(PROP).with_children(props.iter().cloned().map(XmlElement::new))
    }

    /// `<d:propfind><d:prop>...</d:prop></d:propfind>`
    pub fn propfind(props: &[PropName]) -> Self {
        Self::new(PROPFIND).with_child(Self::prop(props))
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = XmlElement>) -> Self {
        self.children
            .extend(children.into_iter().map(XmlNode::Element));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Serialize into a complete document.
    ///
    /// Every namespace used anywhere in the tree is declared on the root.
    pub fn to_xml(&self) -> Result<String> {
        let mut namespaces = BTreeSet::new();
        self.collect_namespaces(&mut namespaces);

        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(write_error)?;
        self.write(&mut writer, &namespaces)?;

        String::from_utf8(writer.into_inner()).map_err(write_error)
    }

    fn collect_namespaces(&self, out: &mut BTreeSet<Namespace>) {
        out.insert(self.name.namespace);
        for child in &self.children {
            if let XmlNode::Element(element) = child {
                element.collect_namespaces(out);
            }
        }
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>, declare: &BTreeSet<Namespace>) -> Result<()> {
        let name = self.name.qualified();
        let mut start = BytesStart::new(name.as_str());
        let declarations: Vec<(String, &str)> = declare
            .iter()
            .map(|ns| (format!("xmlns:{}", ns.prefix()), ns.uri()))
            .collect();
        for (key, uri) in &declarations {
            start.push_attribute((key.as_str(), *uri));
        }
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(write_error);
        }

        writer.write_event(Event::Start(start)).map_err(write_error)?;
        let nested = BTreeSet::new();
        for child in &self.children {
            match child {
                XmlNode::Element(element) => element.write(writer, &nested)?,
                XmlNode::Text(text) => writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .map_err(write_error)?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(name.as_str())))
            .map_err(write_error)
    }
}

fn write_error(e: impl std::fmt::Display) -> CardDavError {
    CardDavError::XmlWrite(e.to_string())
}

/// Parsed element, namespace prefixes dropped
struct Node {
    name: String,
    children: Vec<Node>,
    text: String,
}

impl Node {
    fn new(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            children: Vec::new(),
            text: String::new(),
        }
    }

    fn into_value(self) -> PropValue {
        if !self.children.is_empty() {
            PropValue::Children(
                self.children
                    .into_iter()
                    .map(|child| (child.name.clone(), child.into_value()))
                    .collect(),
            )
        } else {
            let text = self.text.trim();
            if text.is_empty() {
                PropValue::Empty
            } else {
                PropValue::Text(text.to_string())
            }
        }
    }
}

fn parse_tree(body: &str) -> Result<Option<Node>> {
    let mut reader = Reader::from_str(body);
    let mut stack: Vec<Node> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Node::new(e.local_name().as_ref())),
            Ok(Event::Empty(e)) => attach(&mut stack, &mut root, Node::new(e.local_name().as_ref())),
            Ok(Event::End(_)) => {
                if let Some(node) = stack.pop() {
                    attach(&mut stack, &mut root, node);
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(top) = stack.last_mut() {
                    let text = e
                        .unescape()
                        .map_err(|e| CardDavError::XmlParse(e.to_string()))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(CardDavError::XmlParse(format!(
                    "error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(root)
}

fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

fn parse_status(line: &str) -> Option<u16> {
    line.split_whitespace().nth(1)?.parse().ok()
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Decode a `207 Multi-Status` body into one entry per `<response>`.
pub fn parse_multistatus(body: &str) -> Result<Vec<DavResponse>> {
    let Some(root) = parse_tree(body)? else {
        return Ok(Vec::new());
    };

    Ok(root
        .children
        .into_iter()
        .filter(|node| node.name == "response")
        .map(decode_response)
        .collect())
}

fn decode_response(node: Node) -> DavResponse {
    let mut href = String::new();
    let mut status = None;
    let mut props = BTreeMap::new();
    let mut any_ok_propstat = false;

    for child in node.children {
        match child.name.as_str() {
            "href" if href.is_empty() => href = child.text.trim().to_string(),
            "status" => status = parse_status(&child.text),
            "propstat" => {
                let propstat_status = child
                    .children
                    .iter()
                    .find(|c| c.name == "status")
                    .and_then(|c| parse_status(&c.text));
                if !propstat_status.is_none_or(is_success) {
                    continue;
                }
                any_ok_propstat = true;
                for prop in child.children.into_iter().filter(|c| c.name == "prop") {
                    for value in prop.children {
                        props.insert(value.name.clone(), value.into_value());
                    }
                }
            }
            _ => {}
        }
    }

    let ok = match status {
        Some(code) => is_success(code),
        None => any_ok_propstat,
    };

    DavResponse {
        href,
        status,
        ok,
        props,
    }
}
