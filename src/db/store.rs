/// Raw key-value store abstraction
///
/// Every cache in the service talks to one of these. Values are plain strings;
/// JSON handling and failure tolerance live one level up in [`super::Cache`].
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Store operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() {
            StoreError::Connection(e.to_string())
        } else if e.is_timeout() {
            StoreError::Backend(format!("redis timeout: {}", e))
        } else {
            StoreError::Backend(e.to_string())
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Operations the cache layer needs from a key-value backend
///
/// Modeled on the redis command set: `ttl` follows redis semantics and returns
/// `-2` for a missing key and `-1` for a key without expiry.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> StoreResult<()>;

    /// Deletes the given keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool>;

    async fn ttl(&self, key: &str) -> StoreResult<i64>;

    /// Lists every key matching a glob pattern
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Incremental iteration over keys matching a glob pattern
    ///
    /// Returns the next cursor and a page of keys. A returned cursor of `0`
    /// means the iteration is complete.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<(u64, Vec<String>)>;

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    async fn hset(&self, key: &str, field: &str, value: String) -> StoreResult<()>;

    async fn ping(&self) -> StoreResult<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Escapes glob metacharacters so an id can be embedded in a match pattern
pub fn escape_pattern(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Redis-style glob matching (`*`, `?`, backslash escapes)
///
/// Character classes are not supported; `[` and `]` only match literally when
/// escaped, which is all [`escape_pattern`] produces.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '\\' if pi + 1 < p.len() && p[pi + 1] == t[ti] => {
                    pi += 2;
                    ti += 1;
                    continue;
                }
                c if c != '\\' && c == t[ti] => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                _ => {}
            }
        }

        // Mismatch: backtrack to the last star and let it swallow one more char
        match star {
            Some((star_pi, star_ti)) => {
                pi = star_pi + 1;
                ti = star_ti + 1;
                star = Some((star_pi, star_ti + 1));
            }
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }

    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match_star() {
        assert!(glob_match("product:US:*", "product:US:sku-1"));
        assert!(glob_match("*:US:*", "recs:US:user-1:abcd"));
        assert!(!glob_match("*:US:*", "recs:ES:user-1:abcd"));
        assert!(!glob_match("product:US:*", "recs:US:sku-1"));
    }

    #[test]
    fn test_glob_match_question_mark() {
        assert!(glob_match("product:??:sku", "product:US:sku"));
        assert!(!glob_match("product:??:sku", "product:USA:sku"));
    }

    #[test]
    fn test_glob_match_exact() {
        assert!(glob_match("market_config:US", "market_config:US"));
        assert!(!glob_match("market_config:US", "market_config:USX"));
    }

    #[test]
    fn test_escaped_id_matches_literally() {
        let pattern = format!("product:*:{}", escape_pattern("sku*1"));
        assert!(glob_match(&pattern, "product:US:sku*1"));
        assert!(!glob_match(&pattern, "product:US:sku-other-1"));
    }

    #[test]
    fn test_escape_pattern() {
        assert_eq!(escape_pattern("plain-id"), "plain-id");
        assert_eq!(escape_pattern("a*b?c"), "a\\*b\\?c");
        assert_eq!(escape_pattern("[x]"), "\\[x\\]");
    }
}
