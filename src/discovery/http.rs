//! Default HTTP driver for RPC-style provider APIs.
//!
//! Executes a [`PageRequest`] as a plain HTTP call: `Action` and
//! `Version` travel in the query string next to the caller's parameters,
//! the body comes back raw for the envelope parser. No credential
//! handling lives here; callers that need signed requests wrap this
//! driver (or bring their own) and add the signature parameters before
//! the call goes out.

use async_trait::async_trait;

use crate::error::DriverError;

use super::request::{DriverResponse, PageRequest, RequestDriver};

pub struct HttpDriver {
    client: reqwest::Client,
}

impl HttpDriver {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Reuse an existing client, e.g. one with provider-specific TLS or
    /// proxy settings.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestDriver for HttpDriver {
    async fn execute(&self, request: &PageRequest) -> Result<DriverResponse, DriverError> {
        let url = format!("{}://{}/", request.scheme, request.domain);

        let mut query: Vec<(&str, &str)> = Vec::with_capacity(request.query_params.len() + 2);
        query.push(("Action", request.operation.as_str()));
        query.push(("Version", request.version.as_str()));
        for (key, value) in &request.query_params {
            query.push((key.as_str(), value.as_str()));
        }

        let builder = match request.method.to_ascii_uppercase().as_str() {
            "POST" => self.client.post(&url).query(&query),
            _ => self.client.get(&url).query(&query),
        };

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        Ok(DriverResponse { status, body })
    }
}
