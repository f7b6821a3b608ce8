//! Identifier handling: canonical form, relative resolution, fragments.
//!
//! Identifiers are URI references. Absolute ones resolve with the `url`
//! crate; relative ones (`"A"`, `"defs.json"`, `""`) resolve the same way
//! against a placeholder authority that is stripped again afterwards, so a
//! set of schemas that only ever uses relative identifiers still gets
//! RFC 3986 semantics.

use url::Url;

/// Placeholder base for relative identifiers.
const RELATIVE_ROOT: &str = "schemata-relative://root";

/// Canonical form of an identifier: a trailing `#` or `#/` is dropped.
pub fn normalize_id(id: &str) -> String {
    let id = id.strip_suffix("#/").unwrap_or(id);
    let id = id.strip_suffix('#').unwrap_or(id);
    id.to_string()
}

/// Resolve `reference` against `base` and normalize the result.
pub fn resolve(base: &str, reference: &str) -> String {
    normalize_id(&resolve_raw(base, reference))
}

fn resolve_raw(base: &str, reference: &str) -> String {
    if reference.is_empty() {
        return base.to_string();
    }
    if Url::parse(reference).is_ok() {
        return reference.to_string();
    }
    if let Ok(base_url) = Url::parse(base) {
        return match base_url.join(reference) {
            Ok(joined) => joined.to_string(),
            Err(_) => reference.to_string(),
        };
    }

    // Relative base: resolve under the placeholder authority.
    let rooted = base.starts_with('/');
    let fake_base = format!("{RELATIVE_ROOT}/{}", base.trim_start_matches('/'));
    let joined = Url::parse(&fake_base).and_then(|b| b.join(reference));
    match joined {
        Ok(url) => {
            let text = url.to_string();
            let rest = text.strip_prefix(RELATIVE_ROOT).unwrap_or(&text);
            if rooted {
                rest.to_string()
            } else {
                rest.strip_prefix('/').unwrap_or(rest).to_string()
            }
        }
        Err(_) => reference.to_string(),
    }
}

/// Split `uri` into the document part and the fragment (without `#`).
pub fn split_fragment(uri: &str) -> (&str, &str) {
    match uri.split_once('#') {
        Some((doc, fragment)) => (doc, fragment),
        None => (uri, ""),
    }
}

/// Whether a fragment is a JSON pointer (as opposed to a plain-name anchor).
pub fn is_pointer_fragment(fragment: &str) -> bool {
    fragment.is_empty() || fragment.starts_with('/')
}

/// Decode `%XX` escapes in a URI fragment.
pub fn percent_decode(input: &str) -> String {
    if !input.contains('%') {
        return input.to_string();
    }
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
