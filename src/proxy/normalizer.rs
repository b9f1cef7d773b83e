//! Turns the raw pieces of an inbound request into a [`NormalizedRequest`].
//! Nothing here touches the network; the gateway handler extracts the method,
//! content type and body bytes and the proxy service calls [`normalize`].

use serde_json::Value;

use super::xml::parse_xml;
use crate::core::error::{ProxyError, ProxyResult};
use crate::core::types::{ContentKind, HttpMethod, NormalizedRequest};

/// Build the normalized view of one request.
///
/// GET never carries a body. JSON and XML bodies are parsed (an empty body is
/// `null`); any other content type is forwarded without a body.
pub fn normalize(
    method: &str,
    url: String,
    content_type: Option<&str>,
    body: &[u8],
) -> ProxyResult<NormalizedRequest> {
    let method: HttpMethod = method.parse()?;
    let content_type = ContentKind::from_header(content_type);

    let body = if method == HttpMethod::Get || is_blank(body) {
        Value::Null
    } else {
        match content_type {
            ContentKind::Json => serde_json::from_slice(body)
                .map_err(|e| ProxyError::malformed_body("json", e.to_string()))?,
            ContentKind::Xml => {
                let text = std::str::from_utf8(body)
                    .map_err(|e| ProxyError::malformed_body("xml", e.to_string()))?;
                parse_xml(text)?
            }
            ContentKind::Other | ContentKind::None => Value::Null,
        }
    };

    Ok(NormalizedRequest {
        method,
        url,
        body,
        content_type,
    })
}

/// Append an inbound query string to a partner URL
pub fn append_query(url: String, query: Option<&str>) -> String {
    match query.filter(|q| !q.is_empty()) {
        None => url,
        Some(query) if url.contains('?') => format!("{}&{}", url, query),
        Some(query) => format!("{}?{}", url, query),
    }
}

fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}
