//! Deterministic escaping of member names that are illegal as JVM
//! identifiers.

use super::defs::{CONSTRUCTOR_METHOD_NAME, STATIC_INITIALIZER_METHOD_NAME};

/// Replace characters illegal in JVM field/method names with fixed
/// escape sequences. The special names `<init>` and `<clinit>` pass
/// through unchanged.
pub fn munge(name: &str) -> String {
    if name == CONSTRUCTOR_METHOD_NAME || name == STATIC_INITIALIZER_METHOD_NAME {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '.' => out.push_str("_DOT_"),
            ';' => out.push_str("_SEMI_"),
            '[' => out.push_str("_LBRACK_"),
            '/' => out.push_str("_SLASH_"),
            '<' => out.push_str("_LT_"),
            '>' => out.push_str("_GT_"),
            _ => out.push(c),
        }
    }
    out
}
