// src/rule/matcher.rs
use hyper::{Method, Uri};
use std::fmt;

/// Strip query and matrix-parameter suffix from a request URI, leaving the
/// bare path used for matching and telemetry keys.
pub fn path_of(uri: &Uri) -> &str {
    let path = uri.path();
    match path.find(';') {
        Some(p) => &path[..p],
        None => path,
    }
}

/// A pure predicate over the request head: optional method plus path prefix.
///
/// Host matching is not part of this rule set; path matching is
/// case-sensitive and prefix-based, no regex, so one evaluation is O(n) in
/// the path length. Stateless and shared read-only across concurrent
/// requests.
#[derive(Debug, Clone)]
pub struct MatchRule {
    method: Option<Method>,
    path_prefix: String,
}

impl MatchRule {
    pub fn new(method: Option<Method>, path_prefix: impl Into<String>) -> Self {
        Self {
            method,
            path_prefix: path_prefix.into(),
        }
    }

    pub fn matches(&self, method: &Method, uri: &Uri) -> bool {
        if let Some(expected) = &self.method {
            if expected != method {
                return false;
            }
        }
        path_of(uri).starts_with(&self.path_prefix)
    }

    pub fn path_pattern(&self) -> &str {
        &self.path_prefix
    }

    /// Human-readable pattern used as a telemetry key, e.g. `GET:/api`.
    pub fn summary(&self) -> String {
        match &self.method {
            Some(method) => format!("{}:{}", method, self.path_prefix),
            None => format!("*:{}", self.path_prefix),
        }
    }

    /// The matched prefix for a URI, if any.
    pub fn matched_path(&self, uri: &Uri) -> Option<&str> {
        path_of(uri)
            .starts_with(&self.path_prefix)
            .then_some(self.path_prefix.as_str())
    }

    /// Operation name for spans and per-operation metrics.
    pub fn operation_name(&self, uri: &Uri) -> &str {
        self.matched_path(uri).unwrap_or("httpin")
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Method + path of one forwarded request, used to label business outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingInfo {
    pub method: String,
    pub path: String,
}

impl RoutingInfo {
    pub fn of(method: &Method, uri: &Uri) -> Self {
        Self {
            method: method.to_string(),
            path: path_of(uri).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_of_strips_query_and_matrix_params() {
        let uri: Uri = "http://example.com/api/v1;sid=42?x=1".parse().unwrap();
        assert_eq!(path_of(&uri), "/api/v1");

        let plain: Uri = "/api/v1".parse().unwrap();
        assert_eq!(path_of(&plain), "/api/v1");
    }

    #[test]
    fn test_prefix_matching() {
        let rule = MatchRule::new(None, "/api");
        assert!(rule.matches(&Method::GET, &"/api/v1".parse().unwrap()));
        assert!(rule.matches(&Method::POST, &"/api".parse().unwrap()));
        assert!(!rule.matches(&Method::GET, &"/images".parse().unwrap()));
    }

    #[test]
    fn test_method_constraint() {
        let rule = MatchRule::new(Some(Method::GET), "/api");
        assert!(rule.matches(&Method::GET, &"/api/v1".parse().unwrap()));
        assert!(!rule.matches(&Method::POST, &"/api/v1".parse().unwrap()));
    }

    #[test]
    fn test_operation_name_falls_back() {
        let rule = MatchRule::new(None, "/api");
        assert_eq!(rule.operation_name(&"/api/v1".parse().unwrap()), "/api");
        assert_eq!(rule.operation_name(&"/other".parse().unwrap()), "httpin");
    }

    #[test]
    fn test_summary() {
        assert_eq!(MatchRule::new(Some(Method::GET), "/api").summary(), "GET:/api");
        assert_eq!(MatchRule::new(None, "/api").summary(), "*:/api");
    }

    #[test]
    fn test_routing_info_of() {
        let info = RoutingInfo::of(&Method::PUT, &"/api/v1?q=2".parse().unwrap());
        assert_eq!(info.method, "PUT");
        assert_eq!(info.path, "/api/v1");
    }
}
