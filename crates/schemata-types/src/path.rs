//! JSON-pointer paths (RFC 6901) into data and schemas.

use std::fmt;

/// One step from a container to a child value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSeg {
    /// Object property.
    Key(String),
    /// Array element.
    Index(usize),
}

impl fmt::Display for PathSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSeg::Key(key) => f.write_str(&escape_token(key)),
            PathSeg::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Escape one reference token: `~` → `~0`, `/` → `~1`.
pub fn escape_token(token: &str) -> String {
    if !token.contains(['~', '/']) {
        return token.to_string();
    }
    token.replace('~', "~0").replace('/', "~1")
}

/// Undo [`escape_token`].
pub fn unescape_token(token: &str) -> String {
    if !token.contains('~') {
        return token.to_string();
    }
    token.replace("~1", "/").replace("~0", "~")
}

/// Render segments as a JSON pointer (`""` for the root).
pub fn pointer<'a>(segments: impl IntoIterator<Item = &'a PathSeg>) -> String {
    let mut out = String::new();
    for seg in segments {
        out.push('/');
        out.push_str(&seg.to_string());
    }
    out
}

/// Split a JSON pointer into unescaped tokens. `""` yields no tokens.
///
/// Returns `None` when the pointer is non-empty and does not start with `/`.
pub fn split_pointer(pointer: &str) -> Option<Vec<String>> {
    if pointer.is_empty() {
        return Some(Vec::new());
    }
    let rest = pointer.strip_prefix('/')?;
    Some(rest.split('/').map(unescape_token).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_round_trip() {
        assert_eq!(escape_token("a/b~c"), "a~1b~0c");
        assert_eq!(unescape_token("a~1b~0c"), "a/b~c");
        assert_eq!(unescape_token("~01"), "~1");
    }

    #[test]
    fn renders_pointer() {
        let segs = vec![PathSeg::Key("a/b".into()), PathSeg::Index(3)];
        assert_eq!(pointer(&segs), "/a~1b/3");
        assert_eq!(pointer(&[]), "");
    }

    #[test]
    fn splits_pointer() {
        assert_eq!(split_pointer(""), Some(vec![]));
        assert_eq!(
            split_pointer("/definitions/a~1b"),
            Some(vec!["definitions".to_string(), "a/b".to_string()])
        );
        assert_eq!(split_pointer("definitions"), None);
    }
}
