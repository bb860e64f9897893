//! Cross-origin gate consulted before a client may join a channel.

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, VARY,
};
use axum::http::{HeaderMap, HeaderValue, Method};

use super::handshake::{HandshakeRequest, CONNECTION_ID_HEADER};

/// Decides whether a handshake may proceed and which headers the response
/// should carry.
pub trait AccessControl: Send + Sync {
    fn allows(&self, request: &HandshakeRequest) -> bool;

    fn response_headers(&self, _request: &HandshakeRequest) -> HeaderMap {
        HeaderMap::new()
    }
}

/// No cross-origin restrictions and no CORS headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unrestricted;

impl AccessControl for Unrestricted {
    fn allows(&self, _request: &HandshakeRequest) -> bool {
        true
    }
}

/// Origin allow-list with the methods and headers advertised to browsers.
///
/// `Last-Event-ID` is always part of the allowed headers, otherwise
/// cross-origin clients could never resume.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origins: Vec<String>,
    methods: Vec<Method>,
    headers: Vec<String>,
}

impl CorsPolicy {
    pub fn new(origins: Vec<String>, methods: Vec<Method>, mut headers: Vec<String>) -> Self {
        if !headers
            .iter()
            .any(|h| h.eq_ignore_ascii_case("last-event-id"))
        {
            headers.push("Last-Event-ID".to_string());
        }
        Self {
            origins,
            methods,
            headers,
        }
    }

    /// Allow `origins` with the default `GET, HEAD` methods.
    pub fn with_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            origins.into_iter().map(Into::into).collect(),
            vec![Method::GET, Method::HEAD],
            Vec::new(),
        )
    }

    fn origin_allowed(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == "*" || o == origin)
    }

    fn method_allowed(&self, request: &HandshakeRequest) -> bool {
        let method = if request.method == Method::OPTIONS {
            match request
                .headers
                .get(ACCESS_CONTROL_REQUEST_METHOD)
                .and_then(|v| v.to_str().ok())
            {
                Some(requested) => match requested.parse::<Method>() {
                    Ok(m) => m,
                    Err(_) => return false,
                },
                None => return true,
            }
        } else {
            request.method.clone()
        };
        self.methods.contains(&method)
    }

    fn joined_methods(&self) -> String {
        self.methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl AccessControl for CorsPolicy {
    fn allows(&self, request: &HandshakeRequest) -> bool {
        match request.origin() {
            // Same-origin and non-browser clients send no Origin.
            None => true,
            Some(origin) => self.origin_allowed(origin) && self.method_allowed(request),
        }
    }

    fn response_headers(&self, request: &HandshakeRequest) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let Some(origin) = request.origin() else {
            return headers;
        };
        if !self.origin_allowed(origin) {
            return headers;
        }

        if let Ok(value) = HeaderValue::from_str(origin) {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
            headers.insert(VARY, HeaderValue::from_static("origin"));
        }
        if let Ok(value) = HeaderValue::from_str(&self.joined_methods()) {
            headers.insert(ACCESS_CONTROL_ALLOW_METHODS, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.headers.join(", ")) {
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, value);
        }
        headers.insert(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(CONNECTION_ID_HEADER),
        );
        headers
    }
}
