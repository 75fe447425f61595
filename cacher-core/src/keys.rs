//! Key namespacing for the remote store.
//!
//! Every key written by the engine has the shape
//! `{prefix}_{environment}_{sanitized}` where the sanitized part never
//! contains `=` or `&`. Each concern (object by id, object by secondary
//! index, token, counter, bucket) owns a fixed leading segment, so two
//! concerns can never produce the same key and invalidating one view never
//! touches another.

use std::fmt;

use crate::config::CacheConfig;

/// Characters that collide with the store's query-string-like encoding.
const RESERVED: [char; 2] = ['=', '&'];

/// Replace reserved characters with `_`.
pub fn sanitize(value: &str) -> String {
    value.replace(RESERVED, "_")
}

/// The concern a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// A full object addressed by its primary id.
    ObjectById,
    /// A pointer from a secondary index (email, slug, client id) to an object.
    ObjectByIndex,
    /// A record addressed by an opaque token value.
    Token,
    /// A counter addressed by action and identity.
    Counter,
    /// A hash bucket of multi-valued results addressed by a query fingerprint.
    Bucket,
}

impl KeyKind {
    /// Leading segment reserved for this concern.
    pub fn segment(&self) -> &'static str {
        match self {
            KeyKind::ObjectById => "object",
            KeyKind::ObjectByIndex => "index",
            KeyKind::Token => "token",
            KeyKind::Counter => "counter",
            KeyKind::Bucket => "bucket",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Deterministic key builder bound to one prefix and environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyNamespace {
    prefix: String,
    environment: String,
}

impl KeyNamespace {
    pub fn new(prefix: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            environment: environment.into(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.key_prefix.clone(), config.environment.clone())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Namespace an arbitrary raw value.
    pub fn key(&self, raw: &str) -> String {
        format!("{}_{}_{}", self.prefix, self.environment, sanitize(raw))
    }

    /// `object:{entity}:id:{id}`
    pub fn object_by_id(&self, entity: &str, id: impl fmt::Display) -> String {
        self.key(&format!("{}:{}:id:{}", KeyKind::ObjectById, entity, id))
    }

    /// `index:{entity}:{field}:{value}`
    pub fn object_by_index(&self, entity: &str, field: &str, value: impl fmt::Display) -> String {
        self.key(&format!(
            "{}:{}:{}:{}",
            KeyKind::ObjectByIndex,
            entity,
            field,
            value
        ))
    }

    /// `token:{kind}:{token}`
    pub fn token(&self, kind: &str, token: &str) -> String {
        self.key(&format!("{}:{}:{}", KeyKind::Token, kind, token))
    }

    /// `counter:{action}:{identity}`
    pub fn counter(&self, action: &str, identity: &str) -> String {
        self.key(&format!("{}:{}:{}", KeyKind::Counter, action, identity))
    }

    /// `bucket:{entity}:{fingerprint}`
    pub fn bucket(&self, entity: &str, fingerprint: &QueryFingerprint) -> String {
        self.key(&format!("{}:{}:{}", KeyKind::Bucket, entity, fingerprint))
    }
}

/// Ordered query parameters identifying one variant of a multi-valued result.
///
/// ```ignore
/// let fp = QueryFingerprint::new().with("page", 1).with("size", 10).with("query", "foo");
/// assert_eq!(fp.to_string(), "page:1:size:10:query:foo");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryFingerprint {
    parts: Vec<(String, String)>,
}

impl QueryFingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter. Order is significant.
    pub fn with(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.parts.push((name.into(), value.to_string()));
        self
    }

    /// Append a parameter only when the value is present.
    pub fn with_opt<V: fmt::Display>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with(name, value),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{}:{}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> KeyNamespace {
        KeyNamespace::new("cacher", "test")
    }

    #[test]
    fn test_key_shape() {
        assert_eq!(ns().key("plain"), "cacher_test_plain");
    }

    #[test]
    fn test_sanitize_strips_reserved_characters() {
        assert_eq!(sanitize("q=foo&page=1"), "q_foo_page_1");
        assert_eq!(ns().key("a=b&c"), "cacher_test_a_b_c");
    }

    #[test]
    fn test_object_by_id() {
        assert_eq!(
            ns().object_by_id("product", 42),
            "cacher_test_object:product:id:42"
        );
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        let ns = ns();
        let keys = [
            ns.object_by_id("user", "x"),
            ns.object_by_index("user", "id", "x"),
            ns.token("user", "x"),
            ns.counter("user", "x"),
            ns.bucket("user", &QueryFingerprint::new().with("id", "x")),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_environment_separates_keys() {
        let prod = KeyNamespace::new("cacher", "production");
        assert_ne!(prod.object_by_id("user", 1), ns().object_by_id("user", 1));
    }

    #[test]
    fn test_fingerprint_is_ordered_and_optional() {
        let fp = QueryFingerprint::new()
            .with("page", 1)
            .with("size", 10)
            .with_opt::<&str>("query", None)
            .with_opt("sort", Some("created_at_desc"));
        assert_eq!(fp.to_string(), "page:1:size:10:sort:created_at_desc");
        assert!(QueryFingerprint::new().is_empty());
    }

    #[test]
    fn test_bucket_key_is_sanitized() {
        let fp = QueryFingerprint::new().with("query", "a=b&c");
        assert_eq!(
            ns().bucket("product", &fp),
            "cacher_test_bucket:product:query:a_b_c"
        );
    }

    #[test]
    fn test_from_config() {
        let config = CacheConfig::new().with_key_prefix("pos").with_environment("prod");
        assert_eq!(KeyNamespace::from_config(&config).key("k"), "pos_prod_k");
    }
}
