//! Client handshake: request context, resume-id extraction, and the response
//! headers every event stream carries.

use std::collections::HashMap;

use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, ORIGIN};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use relay_common::EventId;

/// Standard resume header sent by reconnecting `EventSource` clients.
pub const LAST_EVENT_ID: &str = "last-event-id";

/// Query-string fallbacks used by polyfills that cannot set headers, in
/// precedence order.
pub const RESUME_QUERY_ALIASES: [&str; 2] = ["evs_last_event_id", "lastEventId"];

/// Query flag requesting the padding block.
pub const PADDING_QUERY: &str = "evs_preamble";

/// Response header exposing the connection id for targeted publishes.
pub const CONNECTION_ID_HEADER: &str = "x-connection-id";

/// What the channel sees of a connecting client.
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
}

impl HandshakeRequest {
    pub fn new(method: Method, headers: HeaderMap, query: HashMap<String, String>) -> Self {
        Self {
            method,
            headers,
            query,
        }
    }

    /// A bare `GET` with no headers or query, handy for embedding and tests.
    pub fn get() -> Self {
        Self::new(Method::GET, HeaderMap::new(), HashMap::new())
    }

    /// Add a header. Names are case-insensitive; an invalid name or value is
    /// skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::from_str(value)) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn origin(&self) -> Option<&str> {
        self.headers.get(ORIGIN).and_then(|v| v.to_str().ok())
    }

    /// The id the client last saw: the `Last-Event-ID` header, else the
    /// first query alias present. Empty values count as absent.
    pub fn resume_id(&self) -> Option<EventId> {
        let header = self
            .headers
            .get(LAST_EVENT_ID)
            .and_then(|v| v.to_str().ok());

        std::iter::once(header)
            .chain(
                RESUME_QUERY_ALIASES
                    .iter()
                    .map(|alias| self.query.get(*alias).map(String::as_str)),
            )
            .flatten()
            .find(|raw| !raw.is_empty())
            .map(EventId::parse)
    }

    pub fn wants_padding(&self) -> bool {
        self.query.contains_key(PADDING_QUERY)
    }
}

/// Headers identifying a long-lived, uncached event stream.
pub fn stream_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_resume_when_nothing_present() {
        assert_eq!(HandshakeRequest::get().resume_id(), None);
    }

    #[test]
    fn header_wins_over_query_aliases() {
        let req = HandshakeRequest::get()
            .with_header(LAST_EVENT_ID, "7")
            .with_query("evs_last_event_id", "3")
            .with_query("lastEventId", "1");
        assert_eq!(req.resume_id(), Some(EventId::Numeric(7)));
    }

    #[test]
    fn query_aliases_in_order() {
        let req = HandshakeRequest::get()
            .with_query("lastEventId", "1")
            .with_query("evs_last_event_id", "3");
        assert_eq!(req.resume_id(), Some(EventId::Numeric(3)));

        let req = HandshakeRequest::get().with_query("lastEventId", "abc");
        assert_eq!(req.resume_id(), Some(EventId::Token("abc".to_string())));
    }

    #[test]
    fn empty_values_fall_through() {
        let req = HandshakeRequest::get()
            .with_header(LAST_EVENT_ID, "")
            .with_query("evs_last_event_id", "")
            .with_query("lastEventId", "4");
        assert_eq!(req.resume_id(), Some(EventId::Numeric(4)));
    }

    #[test]
    fn explicit_zero_is_a_resume_request() {
        let req = HandshakeRequest::get().with_header(LAST_EVENT_ID, "0");
        assert_eq!(req.resume_id(), Some(EventId::Numeric(0)));
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let req = HandshakeRequest::get()
            .with_header("Last-Event-ID", "9")
            .with_header("Origin", "https://app.example");
        assert_eq!(req.resume_id(), Some(EventId::Numeric(9)));
        assert_eq!(req.origin(), Some("https://app.example"));
    }

    #[test]
    fn invalid_header_names_are_skipped() {
        let req = HandshakeRequest::get().with_header("bad name", "1");
        assert!(req.headers.is_empty());
    }

    #[test]
    fn padding_flag() {
        assert!(!HandshakeRequest::get().wants_padding());
        assert!(HandshakeRequest::get()
            .with_query(PADDING_QUERY, "1")
            .wants_padding());
    }

    #[test]
    fn stream_headers_are_event_stream() {
        let headers = stream_headers();
        assert_eq!(headers[CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[CACHE_CONTROL], "no-cache");
        assert_eq!(headers[CONNECTION], "keep-alive");
    }
}
