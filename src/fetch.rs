use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// HTTP method of a fetch descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Request body of a POST descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestBody {
    Text(String),
    Form(Vec<(String, String)>),
}

/// Source-agnostic request value produced by an adapter and executed by the
/// network collaborator. A value object, not itself a network call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchDescriptor {
    pub url: String,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub body: Option<RequestBody>,
}

impl FetchDescriptor {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Post,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Builder pattern: add one header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Builder pattern: merge a header map (existing keys win)
    pub fn with_headers(mut self, headers: &HashMap<String, String>) -> Self {
        for (name, value) in headers {
            self.headers
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    /// Builder pattern: set a raw text body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    /// Builder pattern: set a form-encoded body
    pub fn with_form(mut self, form: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(form));
        self
    }
}

/// Raw result of executing a descriptor.
#[derive(Debug, Clone)]
pub struct FetchPayload {
    pub status: u16,
    pub body: String,
    /// URL after redirects; adapters use it to resolve relative references
    pub final_url: String,
}

/// The network collaborator boundary. Implementations own all timeout and
/// retry policy; the core never sleeps.
#[async_trait]
pub trait FetchExecutor: Send + Sync {
    async fn execute(&self, descriptor: &FetchDescriptor) -> Result<FetchPayload>;
}
