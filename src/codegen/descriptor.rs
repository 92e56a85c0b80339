//! Utilities to build and take apart method descriptors.

use crate::ast::Type;

/// Build a method descriptor from parameter and return types.
pub fn method_descriptor(params: &[Type], ret: &Type) -> String {
    let mut d = String::new();
    d.push('(');
    for p in params {
        d.push_str(&p.descriptor());
    }
    d.push(')');
    d.push_str(&ret.descriptor());
    d
}

/// Split a method descriptor into its raw parameter descriptors and the
/// return descriptor. Input is trusted to be well-formed.
pub fn split_method_descriptor(desc: &str) -> (Vec<String>, String) {
    let inner = &desc[1..desc.find(')').unwrap_or(desc.len() - 1)];
    let ret = desc[desc.find(')').map(|i| i + 1).unwrap_or(desc.len())..].to_string();
    let mut params = Vec::new();
    let bytes = inner.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        while bytes[i] == b'[' {
            i += 1;
        }
        if bytes[i] == b'L' {
            while bytes[i] != b';' {
                i += 1;
            }
        }
        i += 1;
        params.push(inner[start..i].to_string());
    }
    (params, ret)
}

/// Number of local/stack slots a field descriptor occupies.
pub fn descriptor_width(desc: &str) -> u16 {
    match desc.as_bytes().first() {
        Some(b'J') | Some(b'D') => 2,
        Some(b'V') => 0,
        _ => 1,
    }
}
