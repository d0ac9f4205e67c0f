//! Contract for the remote management API client.
//!
//! The engine never talks HTTP itself. Migrations receive a `ManagementClient`
//! and the client is expected to retry transient transport errors on its own.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::errors::ValidationIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single call against the management API, relative to the environment root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Transport-level detail of a failed call, kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportDetail {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Value>,
    pub status: Option<u16>,
    pub message: String,
}

/// Structured failure reported by the remote service.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    pub error_code: Option<i64>,
    pub validation_errors: Vec<ValidationIssue>,
    pub transport: Option<TransportDetail>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_code: None,
            validation_errors: Vec::new(),
            transport: None,
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.error_code = Some(code);
        self
    }

    pub fn with_validation_errors(mut self, issues: Vec<ValidationIssue>) -> Self {
        self.validation_errors = issues;
        self
    }

    pub fn with_transport(mut self, transport: TransportDetail) -> Self {
        self.transport = Some(transport);
        self
    }
}

/// Capability handed to migrations for talking to one environment.
#[async_trait]
pub trait ManagementClient: Send + Sync {
    /// Execute a request and return the decoded JSON response (or `Null` for empty bodies).
    async fn execute(&self, request: &ApiRequest) -> Result<Value, ApiError>;
}
