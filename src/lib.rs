//! classgen — a Java class-file emitter driven by a typed AST
//!
//! Given a resolved class node — fields, constructors, methods, static
//! initializer, annotations, and per-method bodies of typed expression
//! nodes — classgen produces a binary class file (major version 52)
//! ready to be loaded by any compliant JVM.
//!
//! ## Architecture
//!
//! - **ast**: the typed input tree (classes, members, expression nodes)
//! - **codegen**: instruction tables, the raw class-writer facade
//!   (constant pool, attributes, stack-map frame computation), the
//!   expression emitter, and the class emitter
//!
//! ## Emission flow
//!
//! ```text
//! ClassNode → emit_class → ClassWriter ── fields / <clinit> / <init> / methods
//!                              ↓                     ↓
//!                          ClassFile ← MethodWriter ← expression emitter
//! ```
//!
//! Symbol resolution, overload selection, and conversion insertion are
//! the parser's job; the tree arrives with explicit boxing, unboxing,
//! widening and narrowing nodes and with local slots already assigned.

pub mod ast;
pub mod common;
pub mod codegen;

pub use common::{Config, Error, Result};
pub use codegen::emit_class;

/// Emit a class node and write the result into `output_dir` as
/// `<simple name>.class`, creating the directory if needed.
pub fn emit_class_to_file(
    class: &ast::ClassNode,
    output_dir: &std::path::Path,
    config: &Config,
) -> Result<std::path::PathBuf> {
    let bytes = emit_class(class, config)?;
    std::fs::create_dir_all(output_dir)?;
    let simple = class.name.rsplit('/').next().unwrap_or(&class.name);
    let path = output_dir.join(format!("{}.class", simple));
    std::fs::write(&path, bytes)?;
    Ok(path)
}
