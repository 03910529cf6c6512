//! Request contracts between the discovery tool and provider plumbing.
//!
//! A plugin hands the tool one [`DiscoveryRequest`] per region (the
//! protocol metadata of the provider's "describe" operation) and one
//! [`RequestDriver`] able to execute a fully-built page request. The tool
//! owns pagination; the driver owns the wire.

use std::collections::HashMap;

use async_trait::async_trait;
use http::StatusCode;

use crate::error::DriverError;

/// Protocol metadata of one provider list/describe operation.
///
/// Implementations expose these fields directly instead of embedding a
/// well-known protocol value for the tool to dig out, which makes a
/// malformed request a compile-time concern.
pub trait DiscoveryRequest: Send + Sync {
    /// HTTP method, e.g. `GET` or `POST`.
    fn method(&self) -> &str;
    /// URL scheme, normally `https`.
    fn scheme(&self) -> &str;
    /// Provider endpoint host for the region.
    fn domain(&self) -> &str;
    /// API version string, e.g. `2014-05-26`.
    fn version(&self) -> &str;
    /// Operation name, e.g. `DescribeInstances`.
    fn operation(&self) -> &str;
    /// Base query parameters, before pagination is applied.
    fn query_params(&self) -> HashMap<String, String>;
}

/// Plain-struct [`DiscoveryRequest`] for callers that don't carry their
/// own request types.
#[derive(Debug, Clone)]
pub struct GenericDiscoveryRequest {
    pub method: String,
    pub scheme: String,
    pub domain: String,
    pub version: String,
    pub operation: String,
    pub query_params: HashMap<String, String>,
}

impl DiscoveryRequest for GenericDiscoveryRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn operation(&self) -> &str {
        &self.operation
    }

    fn query_params(&self) -> HashMap<String, String> {
        self.query_params.clone()
    }
}

/// One fully-built page call: the request metadata plus the `PageSize`
/// and `PageNumber` parameters for this iteration of the loop.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub method: String,
    pub scheme: String,
    pub domain: String,
    pub version: String,
    pub operation: String,
    pub query_params: HashMap<String, String>,
}

impl PageRequest {
    pub(crate) fn build(
        request: &dyn DiscoveryRequest,
        page_size: usize,
        page_number: usize,
    ) -> Self {
        let mut query_params = request.query_params();
        query_params.insert("PageSize".to_string(), page_size.to_string());
        query_params.insert("PageNumber".to_string(), page_number.to_string());

        Self {
            method: request.method().to_string(),
            scheme: request.scheme().to_string(),
            domain: request.domain().to_string(),
            version: request.version().to_string(),
            operation: request.operation().to_string(),
            query_params,
        }
    }
}

/// Raw result of executing a [`PageRequest`].
#[derive(Debug, Clone)]
pub struct DriverResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Executes page requests against a provider. One driver per region;
/// sharing a single driver across regions is fine when the endpoint host
/// in the request already selects the region.
#[async_trait]
pub trait RequestDriver: Send + Sync {
    async fn execute(&self, request: &PageRequest) -> Result<DriverResponse, DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generic_request() -> GenericDiscoveryRequest {
        GenericDiscoveryRequest {
            method: "GET".to_string(),
            scheme: "https".to_string(),
            domain: "ecs.cn-hongkong.example.com".to_string(),
            version: "2014-05-26".to_string(),
            operation: "DescribeInstances".to_string(),
            query_params: HashMap::from([("RegionId".to_string(), "cn-hongkong".to_string())]),
        }
    }

    #[test]
    fn page_request_applies_pagination_params() {
        let request = generic_request();
        let page = PageRequest::build(&request, 20, 3);

        assert_eq!(page.operation, "DescribeInstances");
        assert_eq!(page.query_params.get("PageSize").map(String::as_str), Some("20"));
        assert_eq!(page.query_params.get("PageNumber").map(String::as_str), Some("3"));
        // Base parameters survive.
        assert_eq!(
            page.query_params.get("RegionId").map(String::as_str),
            Some("cn-hongkong")
        );
    }
}
