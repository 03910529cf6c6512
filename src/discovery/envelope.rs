//! Generic pagination envelope parsing.
//!
//! Providers wrap a page of discovered objects in a response of the form
//!
//! ```json
//! {
//!     "LoadBalancers": {
//!         "LoadBalancer": [ { "LoadBalancerId": "lb-1", ... }, ... ]
//!     },
//!     "TotalCount": 25,
//!     "PageSize": 10,
//!     "PageNumber": 1
//! }
//! ```
//!
//! The root key is configured per object type; the item array is the
//! single array nested directly under it. Pagination counters appear
//! under a few spellings depending on the API family, all accepted here.

use serde_json::{Map, Value};

use crate::error::DiscoveryError;

// Counter spellings seen across provider API families.
const TOTAL_COUNT_KEYS: &[&str] = &["TotalCount", "TotalRecordCount"];
const PAGE_SIZE_KEYS: &[&str] = &["PageSize", "PageRecordCount"];
const PAGE_NUMBER_KEYS: &[&str] = &["PageNumber"];

/// Decoded form of one response page.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    /// The raw discovered objects on this page.
    pub items: Vec<Value>,
    /// Provider-reported total object count across all pages.
    pub total_count: usize,
    pub page_size: usize,
    pub page_number: usize,
}

/// Parse one page body. Fails if the body is empty or not a JSON object,
/// if the root key is absent, if its value is not an object, or if no
/// array is found among that object's direct values.
pub fn parse_page(body: &[u8], root_key: &str) -> Result<ParsedPage, DiscoveryError> {
    if body.is_empty() {
        return Err(DiscoveryError::Schema(
            "no data in response to be parsed".to_string(),
        ));
    }

    let envelope: Map<String, Value> = serde_json::from_slice(body)
        .map_err(|e| DiscoveryError::Schema(format!("response is not a JSON object: {}", e)))?;

    let root = envelope.get(root_key).ok_or_else(|| {
        DiscoveryError::Schema(format!("didn't find root key {:?} in response", root_key))
    })?;

    let container = root.as_object().ok_or_else(|| {
        DiscoveryError::Schema(format!("content of root key {:?} is not an object", root_key))
    })?;

    let items = container
        .values()
        .find_map(Value::as_array)
        .cloned()
        .ok_or_else(|| {
            DiscoveryError::Schema(format!("didn't find item array under root key {:?}", root_key))
        })?;

    Ok(ParsedPage {
        items,
        total_count: read_counter(&envelope, TOTAL_COUNT_KEYS),
        page_size: read_counter(&envelope, PAGE_SIZE_KEYS),
        page_number: read_counter(&envelope, PAGE_NUMBER_KEYS),
    })
}

/// First matching counter field, or 0 when absent. Some APIs report
/// counters as floats, so both integer and float JSON numbers are taken.
fn read_counter(envelope: &Map<String, Value>, names: &[&str]) -> usize {
    names
        .iter()
        .find_map(|name| envelope.get(*name))
        .and_then(|value| value.as_u64().or_else(|| value.as_f64().map(|f| f as u64)))
        .unwrap_or(0) as usize
}
