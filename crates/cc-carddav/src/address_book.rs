//! Address book discovery, card enumeration and conditional writes

use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Response;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, IF_MATCH, IF_NONE_MATCH};
use tracing::{debug, warn};
use url::Url;

use crate::client::HttpTransport;
use crate::config::{CardDavConfig, DEFAULT_REPORT_CONCURRENCY};
use crate::error::{CardDavError, Result};
use crate::models::{Account, AddressBook, DavResponse, Depth, VCard};
use crate::transport::{DavTransport, RequestParams, header_value};
use crate::xml::{
    ADDRESS_DATA, ADDRESSBOOK_MULTIGET, ADDRESSBOOK_QUERY, DISPLAY_NAME, FILTER, GETCTAG,
    GETETAG, HREF, PROP_FILTER, PropName, RESOURCE_TYPE, SYNC_TOKEN, XmlElement,
};

const VCARD_CONTENT_TYPE: &str = "text/vcard; charset=utf-8";

/// Predicate applied to candidate card URLs in [`CardDavClient::fetch_vcards`]
pub type UrlFilter = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Parameters for [`CardDavClient::fetch_address_books`]
#[derive(Debug, Clone, Default)]
pub struct FetchAddressBooks {
    pub account: Account,
    /// Replaces the default displayname/getctag/resourcetype/sync-token set
    pub props: Option<Vec<PropName>>,
    pub request: RequestParams,
}

impl FetchAddressBooks {
    pub fn new(account: Account) -> Self {
        Self {
            account,
            ..Default::default()
        }
    }

    pub fn with_props(mut self, props: Vec<PropName>) -> Self {
        self.props = Some(props);
        self
    }

    pub fn with_request(mut self, request: RequestParams) -> Self {
        self.request = request;
        self
    }
}

/// Parameters for [`CardDavClient::fetch_vcards`]
pub struct FetchVCards {
    pub address_book: AddressBook,
    /// Fetch exactly these cards instead of listing the collection
    pub object_urls: Option<Vec<String>>,
    /// Keeps a candidate URL when it returns true
    pub url_filter: Option<UrlFilter>,
    /// One addressbook-multiget naming the cards, or one broad addressbook-query
    pub use_multi_get: bool,
    pub request: RequestParams,
}

impl FetchVCards {
    pub fn new(address_book: AddressBook) -> Self {
        Self {
            address_book,
            object_urls: None,
            url_filter: None,
            use_multi_get: true,
            request: RequestParams::default(),
        }
    }

    pub fn with_object_urls(mut self, urls: Vec<String>) -> Self {
        self.object_urls = Some(urls);
        self
    }

    pub fn with_url_filter(mut self, filter: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.url_filter = Some(Box::new(filter));
        self
    }

    pub fn with_multi_get(mut self, use_multi_get: bool) -> Self {
        self.use_multi_get = use_multi_get;
        self
    }

    pub fn with_request(mut self, request: RequestParams) -> Self {
        self.request = request;
        self
    }
}

/// Parameters for [`CardDavClient::address_book_query`]
#[derive(Debug, Clone)]
pub struct AddressBookQuery {
    pub url: String,
    pub props: Vec<PropName>,
    /// Content of `<card:filter>`; defaults to `<card:prop-filter name="FN"/>`
    pub filter: Option<XmlElement>,
    pub depth: Depth,
    pub request: RequestParams,
}

impl AddressBookQuery {
    pub fn new(url: impl Into<String>, props: Vec<PropName>) -> Self {
        Self {
            url: url.into(),
            props,
            filter: None,
            depth: Depth::One,
            request: RequestParams::default(),
        }
    }

    pub fn with_filter(mut self, filter: XmlElement) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Parameters for [`CardDavClient::address_book_multi_get`]
#[derive(Debug, Clone)]
pub struct AddressBookMultiGet {
    pub url: String,
    pub props: Vec<PropName>,
    /// Server-relative paths of the cards to fetch
    pub object_urls: Vec<String>,
    pub depth: Depth,
    pub request: RequestParams,
}

impl AddressBookMultiGet {
    pub fn new(url: impl Into<String>, props: Vec<PropName>, object_urls: Vec<String>) -> Self {
        Self {
            url: url.into(),
            props,
            object_urls,
            depth: Depth::One,
            request: RequestParams::default(),
        }
    }
}

/// Parameters for [`CardDavClient::create_vcard`]
#[derive(Debug, Clone)]
pub struct CreateVCard {
    pub address_book: AddressBook,
    pub vcard_string: String,
    /// Resource name, resolved against the address book URL
    pub filename: String,
    pub request: RequestParams,
}

/// Parameters for [`CardDavClient::update_vcard`] and [`CardDavClient::delete_vcard`]
#[derive(Debug, Clone)]
pub struct ModifyVCard {
    /// Card as last read; its etag becomes the `If-Match` precondition
    pub vcard: VCard,
    pub request: RequestParams,
}

impl ModifyVCard {
    pub fn new(vcard: VCard) -> Self {
        Self {
            vcard,
            request: RequestParams::default(),
        }
    }
}

/// CardDAV client for address book operations
pub struct CardDavClient<T = HttpTransport> {
    transport: T,
    report_concurrency: usize,
}

impl CardDavClient<HttpTransport> {
    /// Create a client talking HTTP to the configured server
    pub fn from_config(config: &CardDavConfig) -> Result<Self> {
        Ok(Self::new(HttpTransport::new(config)?)
            .with_report_concurrency(config.report_concurrency))
    }
}

impl<T: DavTransport> CardDavClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            report_concurrency: DEFAULT_REPORT_CONCURRENCY,
        }
    }

    /// Bound on concurrent supported-report lookups during discovery
    pub fn with_report_concurrency(mut self, limit: usize) -> Self {
        self.report_concurrency = limit.max(1);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Discover the address books under the account's home set.
    ///
    /// Each returned book carries its supported report set; the lookups run
    /// concurrently but the result keeps discovery order.
    pub async fn fetch_address_books(&self, params: FetchAddressBooks) -> Result<Vec<AddressBook>> {
        let FetchAddressBooks {
            account,
            props,
            request,
        } = params;

        let home_url = present(account.home_url.as_deref());
        let root_url = present(account.root_url.as_deref());
        let (Some(home_url), Some(root_url)) = (home_url, root_url) else {
            return Err(missing_fields(
                "account",
                &[("home_url", home_url.is_some()), ("root_url", root_url.is_some())],
                "fetch_address_books",
            ));
        };
        let root = parse_url(root_url)?;

        let props = props.unwrap_or_else(|| vec![DISPLAY_NAME, GETCTAG, RESOURCE_TYPE, SYNC_TOKEN]);
        let responses = self
            .transport
            .propfind(
                home_url,
                &props,
                Depth::One,
                request.final_headers(),
                &request.fetch_options,
            )
            .await?;

        let books = responses
            .iter()
            .filter(|r| is_address_book(r))
            .map(|r| address_book_from_response(r, &root))
            .collect::<Result<Vec<_>>>()?;

        let request = &request;
        stream::iter(books)
            .map(move |mut book| async move {
                book.reports = self
                    .transport
                    .supported_report_set(&book.url, request.final_headers(), &request.fetch_options)
                    .await?;
                Ok::<_, CardDavError>(book)
            })
            .buffered(self.report_concurrency)
            .try_collect()
            .await
    }

    /// Fetch the cards of an address book.
    ///
    /// Without explicit `object_urls` the collection is listed first. An
    /// empty candidate set returns early without a fetch request.
    pub async fn fetch_vcards(&self, params: FetchVCards) -> Result<Vec<VCard>> {
        let FetchVCards {
            address_book,
            object_urls,
            url_filter,
            use_multi_get,
            request,
        } = params;

        debug!("Fetching vcards from {}", address_book.url);
        if present(Some(address_book.url.as_str())).is_none() {
            return Err(missing_fields("address_book", &[("url", false)], "fetch_vcards"));
        }
        let base = parse_url(&address_book.url)?;

        let candidates = match object_urls {
            Some(urls) => urls,
            None => self
                .address_book_query(AddressBookQuery {
                    request: request.clone(),
                    ..AddressBookQuery::new(address_book.url.clone(), vec![GETETAG])
                })
                .await?
                .into_iter()
                .filter(|r| r.ok && !r.href.is_empty())
                .map(|r| r.href)
                .collect(),
        };

        let mut object_paths = Vec::new();
        for candidate in candidates {
            if candidate.is_empty() {
                warn!("Skipping empty card URL in {}", address_book.url);
                continue;
            }
            let absolute = if candidate.starts_with("http") {
                candidate
            } else {
                resolve(&base, &candidate)?.to_string()
            };
            if let Some(filter) = &url_filter {
                if !filter(absolute.as_str()) {
                    continue;
                }
            }
            object_paths.push(parse_url(&absolute)?.path().to_string());
        }

        if object_paths.is_empty() {
            return Ok(Vec::new());
        }

        let props = vec![GETETAG, ADDRESS_DATA];
        let responses = if use_multi_get {
            self.address_book_multi_get(AddressBookMultiGet {
                url: address_book.url.clone(),
                props,
                object_urls: object_paths,
                depth: Depth::One,
                request,
            })
            .await?
        } else {
            self.address_book_query(AddressBookQuery {
                request,
                ..AddressBookQuery::new(address_book.url.clone(), props)
            })
            .await?
        };

        responses
            .iter()
            .map(|r| {
                Ok(VCard {
                    url: resolve(&base, &r.href)?.to_string(),
                    etag: r.text(&GETETAG.name).map(str::to_string),
                    data: r.text(&ADDRESS_DATA.name).unwrap_or_default().to_string(),
                })
            })
            .collect()
    }

    /// REPORT `addressbook-query` on a collection
    pub async fn address_book_query(&self, params: AddressBookQuery) -> Result<Vec<DavResponse>> {
        let AddressBookQuery {
            url,
            props,
            filter,
            depth,
            request,
        } = params;

        let filter =
            filter.unwrap_or_else(|| XmlElement::new(PROP_FILTER).with_attribute("name", "FN"));
        let body = XmlElement::new(ADDRESSBOOK_QUERY)
            .with_child(XmlElement::prop(&props))
            .with_child(XmlElement::new(FILTER).with_child(filter));

        self.transport
            .collection_query(&url, &body, depth, request.final_headers(), &request.fetch_options)
            .await
    }

    /// REPORT `addressbook-multiget` naming each card by href
    pub async fn address_book_multi_get(
        &self,
        params: AddressBookMultiGet,
    ) -> Result<Vec<DavResponse>> {
        let AddressBookMultiGet {
            url,
            props,
            object_urls,
            depth,
            request,
        } = params;

        let body = XmlElement::new(ADDRESSBOOK_MULTIGET)
            .with_child(XmlElement::prop(&props))
            .with_children(
                object_urls
                    .into_iter()
                    .map(|href| XmlElement::new(HREF).with_text(href)),
            );

        self.transport
            .collection_query(&url, &body, depth, request.final_headers(), &request.fetch_options)
            .await
    }

    /// PUT a new card with `If-None-Match: *`.
    ///
    /// The server's answer is returned as-is; an existing resource shows up
    /// as a 412 response, not an error.
    pub async fn create_vcard(&self, params: CreateVCard) -> Result<Response> {
        let CreateVCard {
            address_book,
            vcard_string,
            filename,
            request,
        } = params;

        if present(Some(address_book.url.as_str())).is_none() {
            return Err(missing_fields("address_book", &[("url", false)], "create_vcard"));
        }
        let url = resolve(&parse_url(&address_book.url)?, &filename)?;

        let mut defaults = HeaderMap::new();
        defaults.insert(CONTENT_TYPE, HeaderValue::from_static(VCARD_CONTENT_TYPE));
        defaults.insert(IF_NONE_MATCH, HeaderValue::from_static("*"));

        self.transport
            .create_object(
                url.as_str(),
                &vcard_string,
                request.headers_with(defaults),
                &request.fetch_options,
            )
            .await
    }

    /// PUT new card data guarded by `If-Match` on the card's etag
    pub async fn update_vcard(&self, params: ModifyVCard) -> Result<Response> {
        let ModifyVCard { vcard, request } = params;
        let etag = require_card(&vcard, "update_vcard")?;

        let mut defaults = HeaderMap::new();
        defaults.insert(CONTENT_TYPE, HeaderValue::from_static(VCARD_CONTENT_TYPE));
        defaults.insert(IF_MATCH, header_value("If-Match", etag)?);

        self.transport
            .update_object(
                &vcard.url,
                &vcard.data,
                request.headers_with(defaults),
                &request.fetch_options,
            )
            .await
    }

    /// DELETE a card guarded by `If-Match` on the card's etag
    pub async fn delete_vcard(&self, params: ModifyVCard) -> Result<Response> {
        let ModifyVCard { vcard, request } = params;
        let etag = require_card(&vcard, "delete_vcard")?;

        let mut defaults = HeaderMap::new();
        defaults.insert(IF_MATCH, header_value("If-Match", etag)?);

        self.transport
            .delete_object(&vcard.url, request.headers_with(defaults), &request.fetch_options)
            .await
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn missing_fields(
    subject: &'static str,
    fields: &[(&'static str, bool)],
    operation: &'static str,
) -> CardDavError {
    CardDavError::MissingFields {
        subject,
        fields: fields
            .iter()
            .filter(|(_, is_present)| !is_present)
            .map(|(name, _)| *name)
            .collect(),
        operation,
    }
}

/// The card's etag, once url and etag are both known to be present
fn require_card<'a>(vcard: &'a VCard, operation: &'static str) -> Result<&'a str> {
    let url = present(Some(vcard.url.as_str()));
    let etag = present(vcard.etag.as_deref());
    match (url, etag) {
        (Some(_), Some(etag)) => Ok(etag),
        _ => Err(missing_fields(
            "vcard",
            &[("url", url.is_some()), ("etag", etag.is_some())],
            operation,
        )),
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| CardDavError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn resolve(base: &Url, reference: &str) -> Result<Url> {
    base.join(reference).map_err(|e| CardDavError::InvalidUrl {
        url: reference.to_string(),
        reason: e.to_string(),
    })
}

fn is_address_book(response: &DavResponse) -> bool {
    response
        .prop(&RESOURCE_TYPE.name)
        .is_some_and(|types| types.child("addressbook").is_some())
}

fn address_book_from_response(response: &DavResponse, root: &Url) -> Result<AddressBook> {
    let display_name = response.text(&DISPLAY_NAME.name).unwrap_or_default();
    debug!(
        "Found address book named {}, props: {:?}",
        display_name, response.props
    );

    Ok(AddressBook {
        url: resolve(root, &response.href)?.to_string(),
        ctag: response.text(&GETCTAG.name).map(str::to_string),
        display_name: display_name.to_string(),
        resource_types: response
            .prop(&RESOURCE_TYPE.name)
            .map(|types| types.child_names().into_iter().map(str::to_string).collect())
            .unwrap_or_default(),
        sync_token: response.text(&SYNC_TOKEN.name).map(str::to_string),
        reports: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use reqwest::header::{HeaderMap, HeaderValue};

    use super::*;
    use crate::models::PropValue;
    use crate::transport::FetchOptions;

    const HOME: &str = "https://dav.example.com/addressbooks/alice/";
    const ROOT: &str = "https://dav.example.com/";
    const BOOK: &str = "https://dav.example.com/addressbooks/alice/contacts/";

    #[derive(Debug, Clone)]
    struct Call {
        method: &'static str,
        url: String,
        depth: Option<Depth>,
        body: String,
        headers: HeaderMap,
    }

    /// Records every request and answers from canned responses
    #[derive(Default)]
    struct MockTransport {
        calls: Mutex<Vec<Call>>,
        propfinds: HashMap<String, Vec<DavResponse>>,
        reports: Mutex<VecDeque<Vec<DavResponse>>>,
    }

    impl MockTransport {
        fn with_propfind(mut self, url: &str, responses: Vec<DavResponse>) -> Self {
            self.propfinds.insert(url.to_string(), responses);
            self
        }

        fn with_report(self, responses: Vec<DavResponse>) -> Self {
            self.reports.lock().unwrap().push_back(responses);
            self
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, method: &'static str, url: &str, depth: Option<Depth>, body: String, headers: HeaderMap) {
            self.calls.lock().unwrap().push(Call {
                method,
                url: url.to_string(),
                depth,
                body,
                headers,
            });
        }

        fn reply(status: u16) -> Response {
            Response::from(
                http::Response::builder()
                    .status(status)
                    .body(String::new())
                    .unwrap(),
            )
        }
    }

    #[async_trait]
    impl DavTransport for MockTransport {
        async fn collection_query(
            &self,
            url: &str,
            body: &XmlElement,
            depth: Depth,
            headers: HeaderMap,
            _options: &FetchOptions,
        ) -> Result<Vec<DavResponse>> {
            self.record("REPORT", url, Some(depth), body.to_xml()?, headers);
            Ok(self.reports.lock().unwrap().pop_front().unwrap_or_default())
        }

        async fn propfind(
            &self,
            url: &str,
            props: &[PropName],
            depth: Depth,
            headers: HeaderMap,
            _options: &FetchOptions,
        ) -> Result<Vec<DavResponse>> {
            let body = props.iter().map(PropName::qualified).collect::<Vec<_>>().join(" ");
            self.record("PROPFIND", url, Some(depth), body, headers);
            self.propfinds.get(url).cloned().ok_or(CardDavError::Status {
                status: 404,
                body: String::new(),
            })
        }

        async fn create_object(
            &self,
            url: &str,
            data: &str,
            headers: HeaderMap,
            _options: &FetchOptions,
        ) -> Result<Response> {
            self.record("PUT", url, None, data.to_string(), headers);
            Ok(Self::reply(201))
        }

        async fn update_object(
            &self,
            url: &str,
            data: &str,
            headers: HeaderMap,
            _options: &FetchOptions,
        ) -> Result<Response> {
            self.record("PUT", url, None, data.to_string(), headers);
            Ok(Self::reply(204))
        }

        async fn delete_object(
            &self,
            url: &str,
            headers: HeaderMap,
            _options: &FetchOptions,
        ) -> Result<Response> {
            self.record("DELETE", url, None, String::new(), headers);
            Ok(Self::reply(204))
        }
    }

    fn text(value: &str) -> PropValue {
        PropValue::Text(value.to_string())
    }

    fn names(names: &[&str]) -> PropValue {
        PropValue::Children(
            names
                .iter()
                .map(|name| (name.to_string(), PropValue::Empty))
                .collect(),
        )
    }

    fn response(href: &str, props: Vec<(&str, PropValue)>) -> DavResponse {
        DavResponse {
            href: href.to_string(),
            status: None,
            ok: true,
            props: props
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    fn report_set(reports: &[&str]) -> Vec<DavResponse> {
        let supported = reports
            .iter()
            .map(|report| {
                (
                    "supported-report".to_string(),
                    PropValue::Children(vec![("report".to_string(), names(&[report]))]),
                )
            })
            .collect();
        vec![response(
            "",
            vec![("supported-report-set", PropValue::Children(supported))],
        )]
    }

    fn card(href: &str, etag: &str, data: &str) -> DavResponse {
        response(href, vec![("getetag", text(etag)), ("address-data", text(data))])
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn book() -> AddressBook {
        AddressBook::new(BOOK)
    }

    #[tokio::test]
    async fn test_fetch_address_books_requires_account_urls() {
        let client = CardDavClient::new(MockTransport::default());

        let err = client
            .fetch_address_books(FetchAddressBooks::new(Account::default()))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "account must have home_url, root_url before fetch_address_books"
        );

        let account = Account {
            home_url: Some(HOME.to_string()),
            root_url: Some("  ".to_string()),
        };
        match client.fetch_address_books(FetchAddressBooks::new(account)).await {
            Err(CardDavError::MissingFields { fields, .. }) => assert_eq!(fields, vec!["root_url"]),
            other => panic!("unexpected result: {other:?}"),
        }

        assert!(client.transport().calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_address_books_keeps_only_address_books() {
        let transport = MockTransport::default()
            .with_propfind(
                HOME,
                vec![
                    response("/addressbooks/alice/", vec![("resourcetype", names(&["collection"]))]),
                    response(
                        "/addressbooks/alice/contacts/",
                        vec![
                            ("resourcetype", names(&["collection", "addressbook"])),
                            ("displayname", text("Contacts")),
                            ("getctag", text("ctag-1")),
                            ("sync-token", text("http://example.com/sync/1")),
                        ],
                    ),
                    response(
                        "/addressbooks/alice/calendar/",
                        vec![("resourcetype", names(&["collection", "calendar"]))],
                    ),
                ],
            )
            .with_propfind(BOOK, report_set(&["addressbook-multiget", "addressbook-query"]));
        let client = CardDavClient::new(transport);

        let books = client
            .fetch_address_books(FetchAddressBooks::new(Account::new(HOME, ROOT)))
            .await
            .unwrap();

        assert_eq!(
            books,
            vec![AddressBook {
                url: BOOK.to_string(),
                ctag: Some("ctag-1".to_string()),
                display_name: "Contacts".to_string(),
                resource_types: vec!["collection".to_string(), "addressbook".to_string()],
                sync_token: Some("http://example.com/sync/1".to_string()),
                reports: vec![
                    "addressbook-multiget".to_string(),
                    "addressbook-query".to_string()
                ],
            }]
        );

        let calls = client.transport().calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].url, HOME);
        assert_eq!(calls[0].depth, Some(Depth::One));
        assert_eq!(calls[0].body, "d:displayname cs:getctag d:resourcetype d:sync-token");
        assert_eq!(calls[1].url, BOOK);
        assert_eq!(calls[1].depth, Some(Depth::Zero));
        assert_eq!(calls[1].body, "d:supported-report-set");
    }

    #[tokio::test]
    async fn test_fetch_address_books_preserves_order() {
        let second = "https://dav.example.com/addressbooks/alice/work/";
        let transport = MockTransport::default()
            .with_propfind(
                HOME,
                vec![
                    response(
                        "/addressbooks/alice/contacts/",
                        vec![("resourcetype", names(&["collection", "addressbook"]))],
                    ),
                    response(
                        "/addressbooks/alice/work/",
                        vec![("resourcetype", names(&["collection", "addressbook"]))],
                    ),
                ],
            )
            .with_propfind(BOOK, report_set(&["addressbook-query"]))
            .with_propfind(second, report_set(&["sync-collection"]));

        for limit in [1, 4] {
            let client = CardDavClient::new(MockTransport {
                calls: Mutex::default(),
                propfinds: transport.propfinds.clone(),
                reports: Mutex::default(),
            })
            .with_report_concurrency(limit);

            let books = client
                .fetch_address_books(FetchAddressBooks::new(Account::new(HOME, ROOT)))
                .await
                .unwrap();
            let urls: Vec<_> = books.iter().map(|b| b.url.as_str()).collect();
            assert_eq!(urls, vec![BOOK, second]);
            assert_eq!(books[0].reports, vec!["addressbook-query".to_string()]);
            assert_eq!(books[1].reports, vec!["sync-collection".to_string()]);
            assert!(books.iter().all(|b| b.display_name.is_empty() && b.ctag.is_none()));
        }
    }

    #[tokio::test]
    async fn test_fetch_address_books_fails_when_report_lookup_fails() {
        let transport = MockTransport::default().with_propfind(
            HOME,
            vec![response(
                "/addressbooks/alice/contacts/",
                vec![("resourcetype", names(&["collection", "addressbook"]))],
            )],
        );
        let client = CardDavClient::new(transport);

        let err = client
            .fetch_address_books(FetchAddressBooks::new(Account::new(HOME, ROOT)))
            .await
            .unwrap_err();
        assert!(matches!(err, CardDavError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_address_books_custom_props_and_headers() {
        let transport = MockTransport::default().with_propfind(HOME, Vec::new());
        let client = CardDavClient::new(transport);

        let params = FetchAddressBooks::new(Account::new(HOME, ROOT))
            .with_props(vec![DISPLAY_NAME])
            .with_request(RequestParams {
                headers: headers(&[("x-request-id", "42")]),
                ..Default::default()
            });
        let books = client.fetch_address_books(params).await.unwrap();
        assert!(books.is_empty());

        let calls = client.transport().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].body, "d:displayname");
        assert_eq!(calls[0].headers.get("x-request-id").unwrap(), "42");
    }

    #[tokio::test]
    async fn test_fetch_vcards_requires_url() {
        let client = CardDavClient::new(MockTransport::default());

        let err = client
            .fetch_vcards(FetchVCards::new(AddressBook::default()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "address_book must have url before fetch_vcards");
        assert!(client.transport().calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_vcards_lists_then_multi_gets() {
        let transport = MockTransport::default()
            .with_report(vec![
                response("/addressbooks/alice/contacts/a.vcf", vec![("getetag", text("\"1\""))]),
                response("b.vcf", vec![("getetag", text("\"2\""))]),
                DavResponse {
                    ok: false,
                    ..response("/addressbooks/alice/contacts/gone.vcf", Vec::new())
                },
                response("", Vec::new()),
            ])
            .with_report(vec![
                card("/addressbooks/alice/contacts/a.vcf", "\"1\"", "BEGIN:VCARD\nFN:A\nEND:VCARD"),
                card("/addressbooks/alice/contacts/b.vcf", "\"2\"", "BEGIN:VCARD\nFN:B\nEND:VCARD"),
            ]);
        let client = CardDavClient::new(transport);

        let cards = client.fetch_vcards(FetchVCards::new(book())).await.unwrap();
        assert_eq!(
            cards,
            vec![
                VCard::new(format!("{BOOK}a.vcf"), "BEGIN:VCARD\nFN:A\nEND:VCARD").with_etag("\"1\""),
                VCard::new(format!("{BOOK}b.vcf"), "BEGIN:VCARD\nFN:B\nEND:VCARD").with_etag("\"2\""),
            ]
        );

        let calls = client.transport().calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.method == "REPORT" && c.url == BOOK));
        assert!(calls[0].body.contains("<card:addressbook-query"));
        assert!(calls[0].body.contains("<d:prop><d:getetag/></d:prop>"));
        assert!(calls[0].body.contains("<card:filter><card:prop-filter name=\"FN\"/></card:filter>"));
        assert!(calls[1].body.contains("<card:addressbook-multiget"));
        assert!(calls[1].body.contains("<d:prop><d:getetag/><card:address-data/></d:prop>"));
        assert!(calls[1].body.contains(
            "<d:href>/addressbooks/alice/contacts/a.vcf</d:href>\
             <d:href>/addressbooks/alice/contacts/b.vcf</d:href>"
        ));
        assert!(!calls[1].body.contains("gone.vcf"));
    }

    #[tokio::test]
    async fn test_fetch_vcards_with_object_urls_skips_listing() {
        let transport = MockTransport::default().with_report(vec![card(
            "/addressbooks/alice/contacts/a.vcf",
            "\"1\"",
            "BEGIN:VCARD\nEND:VCARD",
        )]);
        let client = CardDavClient::new(transport);

        let params = FetchVCards::new(book()).with_object_urls(vec![
            "https://dav.example.com/addressbooks/alice/contacts/a.vcf".to_string(),
            "/addressbooks/alice/contacts/b.vcf".to_string(),
            String::new(),
        ]);
        let cards = client.fetch_vcards(params).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].url, format!("{BOOK}a.vcf"));

        let calls = client.transport().calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].body.contains("<card:addressbook-multiget"));
        assert!(calls[0].body.contains("<d:href>/addressbooks/alice/contacts/a.vcf</d:href>"));
        assert!(calls[0].body.contains("<d:href>/addressbooks/alice/contacts/b.vcf</d:href>"));
    }

    #[tokio::test]
    async fn test_fetch_vcards_applies_url_filter_to_absolute_urls() {
        let transport = MockTransport::default().with_report(Vec::new());
        let client = CardDavClient::new(transport);

        let params = FetchVCards::new(book())
            .with_object_urls(vec!["a.vcf".to_string(), "b.vcf".to_string()])
            .with_url_filter(|url| url == "https://dav.example.com/addressbooks/alice/contacts/b.vcf");
        client.fetch_vcards(params).await.unwrap();

        let calls = client.transport().calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].body.contains("a.vcf"));
        assert!(calls[0].body.contains("<d:href>/addressbooks/alice/contacts/b.vcf</d:href>"));
    }

    #[tokio::test]
    async fn test_fetch_vcards_empty_candidates_sends_nothing() {
        let client = CardDavClient::new(MockTransport::default());

        let cards = client
            .fetch_vcards(FetchVCards::new(book()).with_object_urls(Vec::new()))
            .await
            .unwrap();
        assert!(cards.is_empty());
        assert!(client.transport().calls().is_empty());

        let cards = client
            .fetch_vcards(
                FetchVCards::new(book())
                    .with_object_urls(vec!["a.vcf".to_string()])
                    .with_url_filter(|_| false),
            )
            .await
            .unwrap();
        assert!(cards.is_empty());
        assert!(client.transport().calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_vcards_without_multi_get_queries_collection() {
        let transport = MockTransport::default().with_report(vec![card(
            "/addressbooks/alice/contacts/a.vcf",
            "\"1\"",
            "BEGIN:VCARD\nEND:VCARD",
        )]);
        let client = CardDavClient::new(transport);

        let params = FetchVCards::new(book())
            .with_object_urls(vec!["a.vcf".to_string()])
            .with_multi_get(false);
        let cards = client.fetch_vcards(params).await.unwrap();
        assert_eq!(cards.len(), 1);

        let calls = client.transport().calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].body.contains("<card:addressbook-query"));
        assert!(calls[0].body.contains("<card:address-data/>"));
        assert!(!calls[0].body.contains("<d:href>"));
    }

    #[tokio::test]
    async fn test_fetch_vcards_missing_props_default_to_empty() {
        let transport = MockTransport::default()
            .with_report(vec![response("/addressbooks/alice/contacts/a.vcf", Vec::new())]);
        let client = CardDavClient::new(transport);

        let cards = client
            .fetch_vcards(FetchVCards::new(book()).with_object_urls(vec!["a.vcf".to_string()]))
            .await
            .unwrap();
        assert_eq!(cards, vec![VCard::new(format!("{BOOK}a.vcf"), "")]);
    }

    #[tokio::test]
    async fn test_address_book_query_custom_filter() {
        let client = CardDavClient::new(MockTransport::default());

        let filter = XmlElement::new(PROP_FILTER).with_attribute("name", "EMAIL");
        client
            .address_book_query(AddressBookQuery::new(BOOK, vec![GETETAG]).with_filter(filter))
            .await
            .unwrap();

        let calls = client.transport().calls();
        assert!(calls[0].body.contains("<card:prop-filter name=\"EMAIL\"/>"));
        assert_eq!(calls[0].depth, Some(Depth::One));
    }

    #[tokio::test]
    async fn test_create_vcard() {
        let client = CardDavClient::new(MockTransport::default());

        let response = client
            .create_vcard(CreateVCard {
                address_book: AddressBook::new("https://dav.example.com/contacts/"),
                vcard_string: "BEGIN:VCARD\nFN:A\nEND:VCARD".to_string(),
                filename: "card1.vcf".to_string(),
                request: RequestParams::default(),
            })
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);

        let calls = client.transport().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, "PUT");
        assert_eq!(calls[0].url, "https://dav.example.com/contacts/card1.vcf");
        assert_eq!(calls[0].body, "BEGIN:VCARD\nFN:A\nEND:VCARD");
        assert_eq!(calls[0].headers.get(IF_NONE_MATCH).unwrap(), "*");
        assert_eq!(
            calls[0].headers.get(CONTENT_TYPE).unwrap(),
            "text/vcard; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_create_vcard_header_override_and_exclusion() {
        let client = CardDavClient::new(MockTransport::default());

        client
            .create_vcard(CreateVCard {
                address_book: AddressBook::new("https://dav.example.com/contacts/"),
                vcard_string: String::new(),
                filename: "card1.vcf".to_string(),
                request: RequestParams {
                    headers: headers(&[("content-type", "text/x-vcard"), ("if-none-match", "\"x\"")]),
                    headers_to_exclude: vec!["If-None-Match".to_string()],
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        let calls = client.transport().calls();
        assert_eq!(calls[0].headers.get(CONTENT_TYPE).unwrap(), "text/x-vcard");
        assert!(calls[0].headers.get(IF_NONE_MATCH).is_none());
    }

    #[tokio::test]
    async fn test_create_vcard_requires_url() {
        let client = CardDavClient::new(MockTransport::default());

        let err = client
            .create_vcard(CreateVCard {
                address_book: AddressBook::default(),
                vcard_string: String::new(),
                filename: "card1.vcf".to_string(),
                request: RequestParams::default(),
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(client.transport().calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_vcard() {
        let client = CardDavClient::new(MockTransport::default());
        let vcard = VCard::new("https://dav.example.com/contacts/card1.vcf", "BEGIN:VCARD\nEND:VCARD")
            .with_etag("\"abc\"");

        let response = client.update_vcard(ModifyVCard::new(vcard)).await.unwrap();
        assert_eq!(response.status().as_u16(), 204);

        let calls = client.transport().calls();
        assert_eq!(calls[0].method, "PUT");
        assert_eq!(calls[0].url, "https://dav.example.com/contacts/card1.vcf");
        assert_eq!(calls[0].body, "BEGIN:VCARD\nEND:VCARD");
        assert_eq!(calls[0].headers.get(IF_MATCH).unwrap(), "\"abc\"");
        assert_eq!(
            calls[0].headers.get(CONTENT_TYPE).unwrap(),
            "text/vcard; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_update_vcard_requires_etag() {
        let client = CardDavClient::new(MockTransport::default());

        let err = client
            .update_vcard(ModifyVCard::new(VCard::new(
                "https://dav.example.com/contacts/card1.vcf",
                "",
            )))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "vcard must have etag before update_vcard");
        assert!(client.transport().calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_vcard() {
        let client = CardDavClient::new(MockTransport::default());
        let vcard = VCard::new("https://dav.example.com/contacts/card1.vcf", "ignored")
            .with_etag("\"abc\"");

        client.delete_vcard(ModifyVCard::new(vcard)).await.unwrap();

        let calls = client.transport().calls();
        assert_eq!(calls[0].method, "DELETE");
        assert_eq!(calls[0].headers.get(IF_MATCH).unwrap(), "\"abc\"");
        assert!(calls[0].headers.get(CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn test_delete_vcard_exclusion_wins() {
        let client = CardDavClient::new(MockTransport::default());
        let vcard = VCard::new("https://dav.example.com/contacts/card1.vcf", "").with_etag("\"abc\"");

        client
            .delete_vcard(ModifyVCard {
                vcard,
                request: RequestParams {
                    headers: headers(&[("if-match", "\"other\"")]),
                    headers_to_exclude: vec!["if-match".to_string()],
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        let calls = client.transport().calls();
        assert!(calls[0].headers.get(IF_MATCH).is_none());
    }

    #[tokio::test]
    async fn test_delete_vcard_requires_url_and_etag() {
        let client = CardDavClient::new(MockTransport::default());

        match client.delete_vcard(ModifyVCard::new(VCard::default())).await {
            Err(CardDavError::MissingFields { fields, operation, .. }) => {
                assert_eq!(fields, vec!["url", "etag"]);
                assert_eq!(operation, "delete_vcard");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(client.transport().calls().is_empty());
    }
}
