//! The HTTP request an invocation travels in.

use url::Url;

/// An outgoing or received HTTP request, reduced to the parts invocation
/// signatures cover.
///
/// Header names are stored lowercase and looked up case-insensitively. Each
/// name holds at most one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    method: String,
    url: Url,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl InvocationRequest {
    /// A request with the given method and no headers or body.
    pub fn new(method: impl AsRef<str>, url: Url) -> Self {
        Self {
            method: method.as_ref().to_ascii_uppercase(),
            url,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A `GET` request.
    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    /// A `POST` request.
    pub fn post(url: Url) -> Self {
        Self::new("POST", url)
    }

    /// Replace the method.
    pub fn with_method(mut self, method: impl AsRef<str>) -> Self {
        self.method = method.as_ref().to_ascii_uppercase();
        self
    }

    /// Replace the URL.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = url;
        self
    }

    /// Set a header, replacing any previous value.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        match self.headers.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// The value of header `name`, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Uppercase HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Request body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Host derived from the URL, including the port when it is not the
    /// scheme's default.
    pub fn host(&self) -> Option<String> {
        let hostname = self.url.host_str()?;
        Some(match self.url.port() {
            Some(port) => format!("{hostname}:{port}"),
            None => hostname.to_string(),
        })
    }

    /// The `(request-target)` pseudo header: lowercase method, path and
    /// query.
    pub fn request_target(&self) -> String {
        let mut target = format!(
            "{} {}",
            self.method.to_ascii_lowercase(),
            self.url.path()
        );
        if let Some(query) = self.url.query() {
            target.push('?');
            target.push_str(query);
        }
        target
    }
}
