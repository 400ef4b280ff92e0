//! Reversible capability renaming
//!
//! Tools and prompts from upstream `github` become `github__search` and so
//! on; resources carry a `namespace` query parameter instead, because URIs
//! already have structure worth preserving. Names that would exceed the
//! configured length threshold collapse to a 12-hex-char SHA-256 prefix,
//! with the original pair kept in a per-process side table so the rename
//! stays reversible.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use url::Url;

/// Separator between namespace and original name.
pub const NAMESPACE_SEPARATOR: &str = "__";

/// Query parameter carrying the namespace on resource URIs.
pub const NAMESPACE_PARAM: &str = "namespace";

/// Default length threshold above which names are hashed.
pub const DEFAULT_NAME_THRESHOLD: usize = 64;

/// Algorithm tag recorded in capability metadata for hashed names.
pub const HASH_ALGORITHM: &str = "sha256-12";

/// Number of hex characters kept from the name digest (48 bits).
const HASH_NAME_LEN: usize = 12;

static NAMESPACE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("static pattern"));

/// Errors raised by the namespace resolver
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamespaceError {
    /// A public name had no `__` separator and no side-table entry
    #[error("name '{0}' carries no namespace separator")]
    MissingSeparator(String),

    /// A namespace failed the schema check
    #[error("invalid namespace '{namespace}': {reason}")]
    InvalidNamespace { namespace: String, reason: String },
}

/// When to replace a joined name with its hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashMode {
    /// Never hash; overlong names pass through verbatim
    Never,
    /// Hash only names longer than the threshold
    #[default]
    Threshold,
    /// Hash every name
    Always,
}

/// Result of renaming a tool or prompt name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedName {
    /// The name exposed to clients
    pub public: String,
    /// Whether the public name is a hash (original recorded in metadata)
    pub hashed: bool,
}

/// Validate a namespace against the schema: 1-64 chars, leading
/// alphanumeric, `[A-Za-z0-9_.-]` body, and no `__` anywhere (it would be
/// ambiguous against the separator).
pub fn validate_namespace(namespace: &str) -> Result<(), NamespaceError> {
    let invalid = |reason: &str| NamespaceError::InvalidNamespace {
        namespace: namespace.to_string(),
        reason: reason.to_string(),
    };

    if namespace.is_empty() || namespace.len() > 64 {
        return Err(invalid("length must be 1-64 characters"));
    }
    if namespace.contains(NAMESPACE_SEPARATOR) {
        return Err(invalid("must not contain '__'"));
    }
    if !NAMESPACE_PATTERN.is_match(namespace) {
        return Err(invalid(
            "must start alphanumeric and contain only [A-Za-z0-9_.-]",
        ));
    }
    Ok(())
}

/// Renames capabilities into a shared namespace and reverses the mapping.
///
/// One resolver instance is shared per process; the hash side table grows
/// monotonically and is only cleared on mode change. Collision space
/// (48 bits) is large relative to realistic catalog sizes, so collisions
/// are logged and the newest mapping wins.
pub struct NamespaceResolver {
    mode: RwLock<HashMode>,
    threshold: usize,
    /// public hashed name -> (namespace, original name)
    hashed: RwLock<HashMap<String, (String, String)>>,
}

impl Default for NamespaceResolver {
    fn default() -> Self {
        Self::new(HashMode::default(), DEFAULT_NAME_THRESHOLD)
    }
}

impl NamespaceResolver {
    pub fn new(mode: HashMode, threshold: usize) -> Self {
        Self {
            mode: RwLock::new(mode),
            threshold,
            hashed: RwLock::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> HashMode {
        *self.mode.read().expect("mode lock poisoned")
    }

    /// Switch hash modes. Clears the side table: public names minted under
    /// the old mode stop resolving, which is why this only happens through
    /// configuration reload.
    pub fn set_mode(&self, mode: HashMode) {
        let mut current = self.mode.write().expect("mode lock poisoned");
        *current = mode;
        self.hashed.write().expect("side table lock poisoned").clear();
    }

    /// Produce the public name for `(namespace, name)`.
    pub fn rename_name(&self, namespace: &str, name: &str) -> RenamedName {
        let joined = format!("{}{}{}", namespace, NAMESPACE_SEPARATOR, name);
        let hash_applies = match self.mode() {
            HashMode::Never => false,
            HashMode::Always => true,
            HashMode::Threshold => joined.len() > self.threshold,
        };

        if !hash_applies {
            return RenamedName {
                public: joined,
                hashed: false,
            };
        }

        let digest = Sha256::digest(joined.as_bytes());
        let public = hex::encode(digest)[..HASH_NAME_LEN].to_string();

        let mut table = self.hashed.write().expect("side table lock poisoned");
        if let Some((other_ns, other_name)) = table.get(&public) {
            if other_ns != namespace || other_name != name {
                tracing::warn!(
                    public = %public,
                    existing = %format!("{}{}{}", other_ns, NAMESPACE_SEPARATOR, other_name),
                    incoming = %joined,
                    "hash prefix collision; newest mapping wins"
                );
            }
        }
        table.insert(public.clone(), (namespace.to_string(), name.to_string()));

        RenamedName {
            public,
            hashed: true,
        }
    }

    /// Append `namespace=<ns>` to a resource URI, preserving existing query
    /// parameters. Unparseable URIs get the raw string form, which only the
    /// reverse function consumes.
    pub fn rename_uri(&self, namespace: &str, uri: &str) -> String {
        match Url::parse(uri) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair(NAMESPACE_PARAM, namespace);
                url.to_string()
            }
            Err(_) => format!("{}?{}={}", uri, NAMESPACE_PARAM, namespace),
        }
    }

    /// Recover `(namespace, original name)` from a public name.
    pub fn extract_from_name(&self, public: &str) -> Result<(String, String), NamespaceError> {
        if let Some((namespace, name)) = self
            .hashed
            .read()
            .expect("side table lock poisoned")
            .get(public)
        {
            return Ok((namespace.clone(), name.clone()));
        }

        // Split on the FIRST separator; the original name may itself
        // contain further `__` runs.
        match public.split_once(NAMESPACE_SEPARATOR) {
            Some((namespace, name)) if !namespace.is_empty() => {
                Ok((namespace.to_string(), name.to_string()))
            }
            _ => Err(NamespaceError::MissingSeparator(public.to_string())),
        }
    }

    /// Recover `(namespace, original uri)` from a public URI. URIs without
    /// a namespace parameter (or that never parsed) come back unchanged
    /// with `None`.
    pub fn extract_from_uri(&self, uri: &str) -> (Option<String>, String) {
        match Url::parse(uri) {
            Ok(url) => {
                let mut namespace = None;
                let remaining: Vec<(String, String)> = url
                    .query_pairs()
                    .filter_map(|(key, value)| {
                        if key == NAMESPACE_PARAM && namespace.is_none() {
                            namespace = Some(value.into_owned());
                            None
                        } else {
                            Some((key.into_owned(), value.into_owned()))
                        }
                    })
                    .collect();

                if namespace.is_none() {
                    return (None, uri.to_string());
                }

                let mut stripped = url.clone();
                stripped.set_query(None);
                if !remaining.is_empty() {
                    let mut pairs = stripped.query_pairs_mut();
                    for (key, value) in &remaining {
                        pairs.append_pair(key, value);
                    }
                }
                (namespace, stripped.to_string())
            }
            Err(_) => {
                // Reverse of the raw-concatenation fallback in rename_uri.
                match uri.rsplit_once(&format!("?{}=", NAMESPACE_PARAM)) {
                    Some((original, namespace)) if !namespace.contains('&') => {
                        (Some(namespace.to_string()), original.to_string())
                    }
                    _ => (None, uri.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_validation() {
        assert!(validate_namespace("github").is_ok());
        assert!(validate_namespace("integrations.customer-extranet.v2").is_ok());
        assert!(validate_namespace("a").is_ok());

        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("has__separator").is_err());
        assert!(validate_namespace("-leading-dash").is_err());
        assert!(validate_namespace("white space").is_err());
        assert!(validate_namespace(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_rename_round_trip_plain() {
        let resolver = NamespaceResolver::default();
        let renamed = resolver.rename_name("github", "search");
        assert_eq!(renamed.public, "github__search");
        assert!(!renamed.hashed);

        let (namespace, name) = resolver.extract_from_name(&renamed.public).unwrap();
        assert_eq!(namespace, "github");
        assert_eq!(name, "search");
    }

    #[test]
    fn test_extract_keeps_inner_separators() {
        let resolver = NamespaceResolver::new(HashMode::Never, DEFAULT_NAME_THRESHOLD);
        let renamed = resolver.rename_name("fs", "read__recursive__all");
        let (namespace, name) = resolver.extract_from_name(&renamed.public).unwrap();
        assert_eq!(namespace, "fs");
        assert_eq!(name, "read__recursive__all");
    }

    #[test]
    fn test_overlong_name_hashes_under_threshold_mode() {
        let resolver = NamespaceResolver::default();
        let long_name = "n".repeat(80);
        let renamed = resolver.rename_name("integrations.customer-extranet.v2", &long_name);

        assert!(renamed.hashed);
        assert_eq!(renamed.public.len(), 12);
        assert!(renamed.public.bytes().all(|b| b.is_ascii_hexdigit()));

        let (namespace, name) = resolver.extract_from_name(&renamed.public).unwrap();
        assert_eq!(namespace, "integrations.customer-extranet.v2");
        assert_eq!(name, long_name);
    }

    #[test]
    fn test_always_mode_hashes_everything() {
        let resolver = NamespaceResolver::new(HashMode::Always, DEFAULT_NAME_THRESHOLD);
        let renamed = resolver.rename_name("github", "search");
        assert!(renamed.hashed);
        assert_eq!(
            resolver.extract_from_name(&renamed.public).unwrap(),
            ("github".to_string(), "search".to_string())
        );
    }

    #[test]
    fn test_never_mode_passes_overlong_names() {
        let resolver = NamespaceResolver::new(HashMode::Never, DEFAULT_NAME_THRESHOLD);
        let long_name = "n".repeat(80);
        let renamed = resolver.rename_name("github", &long_name);
        assert!(!renamed.hashed);
        assert_eq!(renamed.public.len(), "github".len() + 2 + 80);
    }

    #[test]
    fn test_mode_change_clears_side_table() {
        let resolver = NamespaceResolver::new(HashMode::Always, DEFAULT_NAME_THRESHOLD);
        let renamed = resolver.rename_name("github", "search");
        assert!(resolver.extract_from_name(&renamed.public).is_ok());

        resolver.set_mode(HashMode::Never);
        // 12 hex chars carry no separator, so without the table the lookup fails
        assert!(matches!(
            resolver.extract_from_name(&renamed.public),
            Err(NamespaceError::MissingSeparator(_))
        ));
    }

    #[test]
    fn test_extract_without_separator_fails() {
        let resolver = NamespaceResolver::default();
        assert!(resolver.extract_from_name("plainname").is_err());
        assert!(resolver.extract_from_name("__leading").is_err());
    }

    #[test]
    fn test_uri_round_trip_preserves_params() {
        let resolver = NamespaceResolver::default();
        let uri = "file:///srv/data/report.csv?rev=3&raw=true";
        let renamed = resolver.rename_uri("fs", uri);
        assert!(renamed.contains("namespace=fs"));

        let (namespace, stripped) = resolver.extract_from_uri(&renamed);
        assert_eq!(namespace.as_deref(), Some("fs"));
        assert!(stripped.contains("rev=3"));
        assert!(stripped.contains("raw=true"));
        assert!(!stripped.contains("namespace"));
    }

    #[test]
    fn test_uri_without_namespace_param() {
        let resolver = NamespaceResolver::default();
        let (namespace, original) = resolver.extract_from_uri("https://example.com/a?b=1");
        assert_eq!(namespace, None);
        assert_eq!(original, "https://example.com/a?b=1");
    }

    #[test]
    fn test_unparseable_uri_fallback_round_trip() {
        let resolver = NamespaceResolver::default();
        let odd = "not a uri at all";
        let renamed = resolver.rename_uri("docs", odd);
        assert_eq!(renamed, "not a uri at all?namespace=docs");

        let (namespace, original) = resolver.extract_from_uri(&renamed);
        assert_eq!(namespace.as_deref(), Some("docs"));
        assert_eq!(original, odd);
    }
}
