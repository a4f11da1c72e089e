//! Prefix-to-service route table.

use crate::config::RouteConfig;
use crate::error::{GatewayError, Result};

/// Immutable route table, built once at startup from configuration.
pub struct RouteTable {
    routes: Vec<RouteConfig>,
}

impl RouteTable {
    pub fn new(routes: Vec<RouteConfig>) -> Self {
        Self { routes }
    }

    /// Longest-prefix match over the configured routes. Equal-length
    /// prefixes resolve to the one declared first. A prefix only matches
    /// at a path-segment boundary, so `/api/v1/auth` does not capture
    /// `/api/v1/auth2/...`.
    pub fn resolve(&self, path: &str) -> Result<&RouteConfig> {
        let mut best: Option<&RouteConfig> = None;
        for route in &self.routes {
            if !prefix_matches(path, &route.prefix) {
                continue;
            }
            match best {
                Some(current) if current.prefix.len() >= route.prefix.len() => {}
                _ => best = Some(route),
            }
        }
        best.ok_or(GatewayError::RouteNotFound)
    }
}

fn prefix_matches(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(prefix: &str, service: &str) -> RouteConfig {
        RouteConfig {
            prefix: prefix.to_string(),
            service: service.to_string(),
            protected: false,
            required_scopes: vec![],
            strip_prefix: false,
        }
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = RouteTable::new(vec![
            route("/api/v1", "fallback"),
            route("/api/v1/content", "content"),
        ]);

        assert_eq!(table.resolve("/api/v1/content/42").unwrap().service, "content");
        assert_eq!(table.resolve("/api/v1/other").unwrap().service, "fallback");
    }

    #[test]
    fn test_equal_length_ties_break_by_declaration_order() {
        let table = RouteTable::new(vec![
            route("/api/v1/aa", "first"),
            route("/api/v1/aa", "second"),
        ]);
        assert_eq!(table.resolve("/api/v1/aa/x").unwrap().service, "first");
    }

    #[test]
    fn test_match_only_at_segment_boundaries() {
        let table = RouteTable::new(vec![route("/api/v1/auth", "auth")]);

        assert!(table.resolve("/api/v1/auth").is_ok());
        assert!(table.resolve("/api/v1/auth/login").is_ok());
        assert!(matches!(
            table.resolve("/api/v1/authentic"),
            Err(GatewayError::RouteNotFound)
        ));
    }

    #[test]
    fn test_unmatched_path_is_route_not_found() {
        let table = RouteTable::new(vec![route("/api/v1/content", "content")]);
        assert!(matches!(
            table.resolve("/metrics"),
            Err(GatewayError::RouteNotFound)
        ));
    }
}
