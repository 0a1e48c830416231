// src/routing/table.rs
use std::collections::BTreeMap;
use tracing::warn;
use url::Url;

/// Descriptor record attached to a route key: which requests the keyed
/// upstream claims to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub method: Option<String>,
    pub path: String,
}

impl RouteDescriptor {
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            method: None,
            path: path.into(),
        }
    }

    pub fn with_method(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            path: path.into(),
        }
    }

    pub fn matches_path(&self, path: &str) -> bool {
        path.starts_with(&self.path)
    }
}

/// One priority level of the routing table: route key (candidate upstream
/// URI) to its ordered descriptor records.
///
/// A published level is never mutated in place; `clone()` yields a fully
/// independent deep copy, and equality is structural over the key map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    priority: i32,
    rules: BTreeMap<String, Vec<RouteDescriptor>>,
}

impl Level {
    pub fn new(priority: i32) -> Self {
        Self {
            priority,
            rules: BTreeMap::new(),
        }
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Insert or overwrite the mapping from `key` to `descriptors`.
    pub fn add_or_update_rule(&mut self, key: impl Into<String>, descriptors: Vec<RouteDescriptor>) {
        self.rules.insert(key.into(), descriptors);
    }

    fn resolve(&self, path: &str) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|(_, descriptors)| {
                descriptors.iter().any(|d| d.matches_path(path))
            })
            .map(|(key, _)| key.as_str())
            .collect()
    }
}

/// The whole routing snapshot: priority levels composed into one value
/// object. Built off the critical path and installed atomically via
/// [`super::RouteStore`]; lookups are pure reads against one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    levels: BTreeMap<i32, Level>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_or_update_rule(
        &mut self,
        priority: i32,
        key: impl Into<String>,
        descriptors: Vec<RouteDescriptor>,
    ) {
        self.levels
            .entry(priority)
            .or_insert_with(|| Level::new(priority))
            .add_or_update_rule(key, descriptors);
    }

    /// Candidate upstream URIs for a path: levels are scanned in priority
    /// order and the first level with any match wins, candidates in stable
    /// key order.
    pub fn resolve(&self, path: &str) -> Vec<Url> {
        for level in self.levels.values() {
            let keys = level.resolve(path);
            if keys.is_empty() {
                continue;
            }
            return keys
                .into_iter()
                .filter_map(|key| match Url::parse(key) {
                    Ok(url) => Some(url),
                    Err(err) => {
                        warn!(%key, %err, "skipping unparsable route key");
                        None
                    }
                })
                .collect();
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_clone_is_equal_then_diverges() {
        let mut l1 = Level::new(1);
        l1.add_or_update_rule("http://127.0.0.1", vec![RouteDescriptor::path("/")]);

        let mut l2 = l1.clone();
        assert_eq!(l1, l2);

        l2.add_or_update_rule("http://www.sina.com", vec![RouteDescriptor::path("/")]);
        assert_ne!(l1, l2);
        // mutating the clone never leaks into the source
        assert!(l1.resolve("/").len() == 1);
    }

    #[test]
    fn test_table_clone_is_equal_then_diverges() {
        let mut r1 = RouteTable::new();
        r1.add_or_update_rule(1, "http://127.0.0.1", vec![RouteDescriptor::path("/")]);

        let mut r2 = r1.clone();
        assert_eq!(r1, r2);

        r2.add_or_update_rule(2, "http://www.sina.com", vec![RouteDescriptor::path("/")]);
        assert_ne!(r1, r2);
        assert_eq!(r1.resolve("/").len(), 1);
    }

    #[test]
    fn test_higher_priority_level_wins() {
        let mut table = RouteTable::new();
        table.add_or_update_rule(1, "http://primary:8080", vec![RouteDescriptor::path("/api")]);
        table.add_or_update_rule(2, "http://fallback:8080", vec![RouteDescriptor::path("/")]);

        let apis = table.resolve("/api/v1");
        assert_eq!(apis.len(), 1);
        assert_eq!(apis[0].host_str(), Some("primary"));

        let rest = table.resolve("/static/logo.png");
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].host_str(), Some("fallback"));
    }

    #[test]
    fn test_candidates_come_back_in_stable_order() {
        let mut table = RouteTable::new();
        table.add_or_update_rule(1, "http://b:8080", vec![RouteDescriptor::path("/api")]);
        table.add_or_update_rule(1, "http://a:8080", vec![RouteDescriptor::path("/api")]);

        let hosts: Vec<_> = table
            .resolve("/api")
            .into_iter()
            .map(|u| u.host_str().unwrap().to_string())
            .collect();
        assert_eq!(hosts, vec!["a", "b"]);
    }

    #[test]
    fn test_overwrite_replaces_descriptors() {
        let mut table = RouteTable::new();
        table.add_or_update_rule(1, "http://a:8080", vec![RouteDescriptor::path("/api")]);
        table.add_or_update_rule(1, "http://a:8080", vec![RouteDescriptor::path("/other")]);

        assert!(table.resolve("/api").is_empty());
        assert_eq!(table.resolve("/other").len(), 1);
    }

    #[test]
    fn test_no_match_yields_empty() {
        let mut table = RouteTable::new();
        table.add_or_update_rule(1, "http://a:8080", vec![RouteDescriptor::path("/api")]);
        assert!(table.resolve("/nope").is_empty());
    }
}
