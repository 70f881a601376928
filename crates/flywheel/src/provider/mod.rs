//! override providers: "what should the arguments of this directive be?"
//!
//! A provider answers per directive occurrence, identified by the directive name and the file it
//! was parsed from. Backends derive a lookup key from both via [KeyRule].
mod map;
mod redis;

pub use self::map::{MapLoadError, MapProvider};
pub use self::redis::{RedisProvider, RedisSettings};

use crate::cancel::{Cancellation, Cancelled};
use crate::payload::Directive;
use std::path::Path;

pub const DEFAULT_STRIP_PREFIX: &str = "/etc";
pub const DEFAULT_NEW_MARKER: &str = "NEW";

pub trait OverrideProvider {
    /// Replacement arguments for `directive` in the file at `path`
    ///
    /// An empty result means "keep the existing arguments".
    fn override_args(
        &mut self,
        directive: &str,
        path: &Path,
        cancel: &Cancellation,
    ) -> Result<Vec<String>, ProviderError>;

    /// Releases backend resources, calling it again is a no-op
    fn close(&mut self) -> Result<(), ProviderError>;
}

/// Source of directives that do not exist in the configuration yet
///
/// Keys below `prefix` starting with the configured marker become new directives, named after
/// the remainder of the key.
pub trait DirectiveSource {
    fn new_directives(
        &mut self,
        prefix: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<Directive>, ProviderError>;
}

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("lookup cancelled")]
    Cancelled(#[from] Cancelled),
    #[error("provider is closed")]
    Closed,
    #[error("No endpoints configured")]
    NoEndpoints,
    #[error("Unable to connect to any endpoint of {endpoints:?}")]
    Connect {
        endpoints: Vec<String>,
        #[source]
        source: ::redis::RedisError,
    },
    #[error("Lookup of key {key:?} failed")]
    Backend {
        key: String,
        #[source]
        source: ::redis::RedisError,
    },
    #[error("Key {key:?} holds a {kind}, expected a string or a list")]
    UnsupportedType { key: String, kind: String },
}

/// Derives lookup keys from file paths
///
/// `/etc/nginx/nginx.conf` with strip prefix `/etc` and directive `listen` becomes
/// `/nginx/nginx/listen`. Purely textual: the filesystem is never consulted.
#[derive(Debug, Clone, PartialEq, derive_new::new)]
pub struct KeyRule {
    pub strip_prefix: String,
}

impl Default for KeyRule {
    fn default() -> Self {
        Self::new(DEFAULT_STRIP_PREFIX.into())
    }
}

impl KeyRule {
    /// Key of `directive` in the file at `path`
    pub fn directive_key(&self, directive: &str, path: &Path) -> String {
        format!("{}/{}", self.file_key(path), directive)
    }

    /// Key prefix shared by all directives of the file at `path`
    ///
    /// The extension is removed, the path cleaned and the strip prefix removed if present.
    pub fn file_key(&self, path: &Path) -> String {
        let path = path.to_string_lossy();
        let cleaned = clean(strip_extension(&path));
        match cleaned.strip_prefix(self.strip_prefix.as_str()) {
            Some(stripped) => stripped.to_string(),
            None => cleaned,
        }
    }
}

fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        // a leading dot names a hidden file, it does not start an extension
        Some(0) | None => path,
        Some(dot) => &path[..name_start + dot],
    }
}

/// Lexical path cleanup: collapses repeated separators, `.` and `..` elements
fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut elements: Vec<&str> = vec![];

    for element in path.split('/') {
        match element {
            "" | "." => {}
            ".." => match elements.last() {
                Some(&last) if last != ".." => {
                    elements.pop();
                }
                _ if rooted => {}
                _ => elements.push(".."),
            },
            element => elements.push(element),
        }
    }

    let joined = elements.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Ensures a scan prefix ends in a separator
pub(crate) fn scan_prefix(prefix: &str, marker: &str) -> String {
    if prefix.ends_with('/') {
        format!("{prefix}{marker}")
    } else {
        format!("{prefix}/{marker}")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn directive_key() {
        let rule = KeyRule::new("/etc".into());
        let path = Path::new("/etc/nginx/nginx.conf");

        assert_eq!(rule.directive_key("listen", path), "/nginx/nginx/listen");
        // pure function
        assert_eq!(
            rule.directive_key("listen", path),
            rule.directive_key("listen", path)
        );
    }

    #[test]
    fn longer_strip_prefix() {
        let rule = KeyRule::new("/etc/nginx".into());
        assert_eq!(
            rule.directive_key("listen", Path::new("/etc/nginx/nginx.conf")),
            "/nginx/listen"
        );
    }

    #[test]
    fn absent_prefix_keeps_path() {
        let rule = KeyRule::new("/etc".into());
        assert_eq!(
            rule.directive_key("root", Path::new("/opt/nginx/sites/default.conf")),
            "/opt/nginx/sites/default/root"
        );
    }

    #[test]
    fn path_is_cleaned_before_stripping() {
        let rule = KeyRule::new("/etc".into());
        assert_eq!(
            rule.directive_key("user", Path::new("/etc//nginx/./conf.d/../nginx.conf")),
            "/nginx/nginx/user"
        );
    }

    #[test]
    fn extension_handling() {
        assert_eq!(strip_extension("/etc/nginx/mime.types"), "/etc/nginx/mime");
        assert_eq!(strip_extension("/etc/nginx/nginx"), "/etc/nginx/nginx");
        assert_eq!(strip_extension("/etc/nginx.d/site"), "/etc/nginx.d/site");
        assert_eq!(strip_extension("/etc/nginx/.hidden"), "/etc/nginx/.hidden");
        assert_eq!(strip_extension("a.tar.gz"), "a.tar");
    }

    #[test]
    fn hidden_file_keeps_its_name() {
        let rule = KeyRule::new("/etc".into());

        // a leading dot does not start an extension, `.local` is kept as the file name
        assert_eq!(
            rule.directive_key("listen", Path::new("/etc/nginx/.local")),
            "/nginx/.local/listen"
        );
        assert_eq!(
            rule.directive_key("listen", Path::new("/etc/nginx/.local.conf")),
            "/nginx/.local/listen"
        );
    }

    #[test]
    fn cleaning() {
        assert_eq!(clean("/a/b/../../.."), "/");
        assert_eq!(clean("../a/./b/"), "../a/b");
        assert_eq!(clean("a/.."), ".");
    }

    #[test]
    fn scan_prefix_adds_separator() {
        assert_eq!(scan_prefix("/nginx/nginx", "NEW"), "/nginx/nginx/NEW");
        assert_eq!(scan_prefix("/nginx/nginx/", "NEW"), "/nginx/nginx/NEW");
    }
}
