use axum::body::Bytes;
use axum::extract::Query;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Method, Uri};

/// Transport-level view of an inbound request, as integrations see it when
/// asked to identify their installation.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
        }
    }

    /// Header value, if present and valid UTF-8. Names are case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decoded query pairs in request order. Malformed query strings read as empty.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        Query::<Vec<(String, String)>>::try_from_uri(&self.uri)
            .map(|Query(pairs)| pairs)
            .unwrap_or_default()
    }

    /// First non-empty value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(k, v)| k == name && !v.is_empty())
            .map(|(_, v)| v)
    }

    pub fn bearer_token(&self) -> Option<&str> {
        extract_bearer(&self.headers)
    }
}

/// `Authorization: Bearer <token>`; `None` for any other scheme or an empty token.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = auth.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || parts.next().is_some() {
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn request(uri: &str, headers: &[(&'static str, &str)]) -> InboundRequest {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        InboundRequest::new(Method::GET, uri.parse().unwrap(), map, Bytes::new())
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(
            request("/", &[("authorization", "Bearer abc")]).bearer_token(),
            Some("abc")
        );
        assert_eq!(
            request("/", &[("authorization", "bearer abc")]).bearer_token(),
            Some("abc")
        );
        assert_eq!(request("/", &[("authorization", "Basic abc")]).bearer_token(), None);
        assert_eq!(request("/", &[("authorization", "Bearer")]).bearer_token(), None);
        assert_eq!(request("/", &[]).bearer_token(), None);
    }

    #[test]
    fn query_params_are_decoded() {
        let req = request("/proxy?shop=a.myshopify.com&path_prefix=%2Fapps%2Fx&empty=", &[]);
        assert_eq!(req.query_param("shop").as_deref(), Some("a.myshopify.com"));
        assert_eq!(req.query_param("path_prefix").as_deref(), Some("/apps/x"));
        assert_eq!(req.query_param("empty"), None);
        assert_eq!(req.query_pairs().len(), 3);
    }

    #[test]
    fn headers_are_case_insensitive() {
        let req = request("/", &[("x-shopify-shop-domain", "a.myshopify.com")]);
        assert_eq!(req.header("X-Shopify-Shop-Domain"), Some("a.myshopify.com"));
    }
}
