//! The mount table: sorted, immutable for the server's lifetime (§3, §4.E
//! step 5).
//!
//! Grounded on the reference server's `mount_points` list (sorted by prefix
//! length, descending, reversed) and its linear "startswith" scan.

use crate::gateway::GatewayApp;
use std::sync::Arc;

/// One `(prefix, application)` binding.
pub struct Mount {
    pub prefix: String,
    pub app: Arc<dyn GatewayApp>,
}

/// Immutable, longest-prefix-first routing table.
///
/// `prefix == "*"` is never stored in `entries`; a path of exactly `"*"`
/// is special-cased in [`MountTable::match_path`] to route to the
/// shortest (catch-all) mount, matching the reference server's handling
/// of the `OPTIONS *` request form.
pub struct MountTable {
    entries: Vec<Mount>,
}

impl MountTable {
    /// Builds a table from `(prefix, app)` pairs, sorting by prefix length
    /// descending so the first matching entry is always the longest one.
    pub fn new(mut mounts: Vec<(String, Arc<dyn GatewayApp>)>) -> Self {
        mounts.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        let entries = mounts
            .into_iter()
            .map(|(prefix, app)| Mount { prefix, app })
            .collect();
        MountTable { entries }
    }

    /// A table with a single application mounted at the empty prefix
    /// (the common case: one gateway app, no sub-mounts).
    pub fn single(app: Arc<dyn GatewayApp>) -> Self {
        MountTable::new(vec![(String::new(), app)])
    }

    /// Longest-prefix match against `path` (§4.E step 5, §8 P6).
    ///
    /// Returns the matched mount's prefix (`SCRIPT_NAME`) and a reference
    /// to its application, or `None` if no mount matches (⇒ caller
    /// synthesizes a 404).
    pub fn match_path<'a>(&'a self, path: &str) -> Option<(&'a str, &'a Arc<dyn GatewayApp>)> {
        if path == "*" {
            // The shortest registered mount always wins for the
            // request-target form `*` (e.g. `OPTIONS * HTTP/1.1`).
            return self
                .entries
                .iter()
                .min_by_key(|m| m.prefix.len())
                .map(|m| (m.prefix.as_str(), &m.app));
        }
        for mount in &self.entries {
            if path == mount.prefix || path.starts_with(&format!("{}/", mount.prefix)) {
                return Some((mount.prefix.as_str(), &mount.app));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environ::Environ;
    use crate::gateway::{Body, StartResponse};
    use std::io::Read;

    struct Stub;
    impl GatewayApp for Stub {
        fn call(
            &self,
            _environ: &Environ,
            _input: &mut dyn Read,
            _start_response: &mut StartResponse,
        ) -> Box<dyn Body> {
            Box::new(std::iter::empty())
        }
    }

    fn table() -> MountTable {
        MountTable::new(vec![
            (String::new(), Arc::new(Stub) as Arc<dyn GatewayApp>),
            ("/a".to_string(), Arc::new(Stub)),
            ("/a/b".to_string(), Arc::new(Stub)),
        ])
    }

    #[test]
    fn longest_prefix_wins() {
        let t = table();
        assert_eq!(t.match_path("/a/b/c").unwrap().0, "/a/b");
        assert_eq!(t.match_path("/a/x").unwrap().0, "/a");
        assert_eq!(t.match_path("/z").unwrap().0, "");
        assert_eq!(t.match_path("/a/b").unwrap().0, "/a/b");
        assert_eq!(t.match_path("/a").unwrap().0, "/a");
    }

    #[test]
    fn star_routes_to_shortest() {
        let t = table();
        assert_eq!(t.match_path("*").unwrap().0, "");
    }

    #[test]
    fn empty_mount_is_catch_all() {
        let t = MountTable::single(Arc::new(Stub));
        assert_eq!(t.match_path("/anything/at/all").unwrap().0, "");
        assert_eq!(t.match_path("").unwrap().0, "");
    }
}
