// The logical unit handed from producer to consumer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One request the native driver should issue.
///
/// Immutable once built: fields are private and only readable through
/// accessors. Maps are ordered so a given descriptor always encodes to the
/// same bytes.
///
/// `#[serde(default)]` keeps decoding tolerant of payloads from older
/// producers that lack newer fields; unknown fields from newer producers are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDescriptor {
    label: String,
    absolute_url: String,
    host: String,
    port: i32,
    method: String,
    path: String,
    /// Response predicates applied downstream: a response whose status is not
    /// listed fails the request.
    valid_status_codes: Vec<i32>,
    max_response_time_sla_micros: Option<u64>,
    insecure: bool,
    headers: Option<BTreeMap<String, String>>,
    query_params: Option<BTreeMap<String, String>>,
    body: Option<String>,
}

impl RequestDescriptor {
    pub fn builder(label: impl Into<String>, absolute_url: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            inner: RequestDescriptor {
                label: label.into(),
                absolute_url: absolute_url.into(),
                method: "GET".to_string(),
                path: "/".to_string(),
                ..Default::default()
            },
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn absolute_url(&self) -> &str {
        &self.absolute_url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> i32 {
        self.port
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn valid_status_codes(&self) -> &[i32] {
        &self.valid_status_codes
    }

    pub fn max_response_time_sla_micros(&self) -> Option<u64> {
        self.max_response_time_sla_micros
    }

    pub fn insecure(&self) -> bool {
        self.insecure
    }

    pub fn headers(&self) -> Option<&BTreeMap<String, String>> {
        self.headers.as_ref()
    }

    pub fn query_params(&self) -> Option<&BTreeMap<String, String>> {
        self.query_params.as_ref()
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

/// Builder for [`RequestDescriptor`]. Method defaults to `GET`, path to `/`.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    inner: RequestDescriptor,
}

impl RequestBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.inner.host = host.into();
        self
    }

    pub fn port(mut self, port: i32) -> Self {
        self.inner.port = port;
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.inner.method = method.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.inner.path = path.into();
        self
    }

    pub fn valid_status_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.inner.valid_status_codes = codes.into_iter().collect();
        self
    }

    pub fn max_response_time_sla_micros(mut self, micros: u64) -> Self {
        self.inner.max_response_time_sla_micros = Some(micros);
        self
    }

    pub fn insecure(mut self, insecure: bool) -> Self {
        self.inner.insecure = insecure;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner
            .headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner
            .query_params
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.inner.body = Some(body.into());
        self
    }

    pub fn build(self) -> RequestDescriptor {
        self.inner
    }
}

/// The request every connection supplies unless another source is configured.
pub fn default_request() -> RequestDescriptor {
    RequestDescriptor::builder("default", "https://jsonplaceholder.typicode.com/todos/1")
        .host("jsonplaceholder.typicode.com")
        .port(443)
        .method("GET")
        .path("/todos/1")
        .valid_status_codes([200])
        .max_response_time_sla_micros(1000)
        .insecure(true)
        .body("")
        .build()
}

/// Representative descriptor used to warm a codec context before serving.
/// Populates every optional field so all encode paths are exercised.
pub fn warmup_request() -> RequestDescriptor {
    RequestDescriptor::builder("warmup", "http://test.com/")
        .host("test.com")
        .port(80)
        .valid_status_codes([200])
        .max_response_time_sla_micros(1000)
        .insecure(true)
        .header("test", "value")
        .query_param("test", "value")
        .body("empty body")
        .build()
}
