//! Code generation: instruction tables, the raw class-writer facade,
//! the expression emitter, and the class emitter that orchestrates a
//! whole class node into a byte snapshot.

pub mod annotation;
pub mod attribute;
pub mod class;
pub mod class_writer;
pub mod constpool;
pub mod defs;
pub mod descriptor;
pub mod field;
pub mod flag;
pub mod frame;
pub mod gen;
mod gen_cond;
pub mod instr;
pub mod method;
pub mod method_writer;
pub mod munge;
pub mod opcodes;
pub mod writer;

use annotation::{annotation_attributes, parameter_annotation_attributes};
use attribute::{make_constant_value_attribute, make_exceptions_attribute};
use class_writer::ClassWriter;
use constpool::ConstantPool;
use descriptor::method_descriptor;
use flag::{access_flags::ACC_STATIC, access_mask};
use gen::Gen;
use method::MethodInfo;
use munge::munge;

use crate::ast::{ClassNode, FieldNode, Lit, MethodKind, MethodNode, Type};
use crate::common::{Config, Error, Result};

/// Emit a resolved class node as a class file byte snapshot.
pub fn emit_class(class: &ClassNode, config: &Config) -> Result<Vec<u8>> {
    log::debug!("emit class {}", class.name);
    let mut cw = ClassWriter::begin(
        access_mask(&class.access),
        &class.name,
        &class.super_name,
        &class.interfaces,
    )?;
    for attr in annotation_attributes(cw.pool(), &class.annotations)? {
        cw.add_class_attribute(attr);
    }
    if let Some(source_file) = &class.source_file {
        cw.set_source_file(source_file)?;
    }
    for f in &class.fields {
        emit_field(&mut cw, f)?;
    }
    if let Some(static_init) = &class.static_init {
        emit_method(&mut cw, static_init, config)?;
    }
    for ctor in &class.constructors {
        emit_method(&mut cw, ctor, config)?;
    }
    for m in &class.methods {
        emit_method(&mut cw, m, config)?;
    }
    Ok(cw.finish())
}

fn emit_field(cw: &mut ClassWriter, f: &FieldNode) -> Result<()> {
    let mut attrs = Vec::new();
    if let Some(value) = &f.value {
        let idx = constant_value_index(cw.pool(), &f.ty, value)?;
        attrs.push(make_constant_value_attribute(cw.pool(), idx)?);
    }
    attrs.extend(annotation_attributes(cw.pool(), &f.annotations)?);
    cw.add_field(access_mask(&f.access), &munge(&f.name), &f.ty.descriptor(), attrs)
}

/// Coerce a field initializer to the declared primitive width and
/// intern it. Truncation is two's-complement, floating narrowing is
/// IEEE-754 rounding.
fn constant_value_index(pool: &mut ConstantPool, ty: &Type, value: &Lit) -> Result<u16> {
    let as_int = |v: &Lit| -> Result<i64> {
        match v {
            Lit::Int(i) => Ok(*i),
            Lit::Bool(b) => Ok(*b as i64),
            Lit::Float(f) => Ok(*f as i64),
            other => Err(Error::invariant(format!("numeric initializer expected, got {:?}", other))),
        }
    };
    let as_float = |v: &Lit| -> Result<f64> {
        match v {
            Lit::Int(i) => Ok(*i as f64),
            Lit::Float(f) => Ok(*f),
            other => Err(Error::invariant(format!("numeric initializer expected, got {:?}", other))),
        }
    };
    Ok(match ty {
        Type::Boolean => pool.add_integer((as_int(value)? != 0) as i32)?,
        Type::Byte => pool.add_integer(as_int(value)? as i8 as i32)?,
        Type::Short => pool.add_integer(as_int(value)? as i16 as i32)?,
        Type::Char => pool.add_integer(as_int(value)? as u16 as i32)?,
        Type::Int => pool.add_integer(as_int(value)? as i32)?,
        Type::Long => pool.add_long(as_int(value)?)?,
        Type::Float => pool.add_float(as_float(value)? as f32)?,
        Type::Double => pool.add_double(as_float(value)?)?,
        _ => match value {
            Lit::Str(s) => pool.add_string(s)?,
            other => {
                return Err(Error::invariant(format!(
                    "unsupported constant initializer {:?} for {:?}",
                    other, ty
                )))
            }
        },
    })
}

fn emit_method(cw: &mut ClassWriter, m: &MethodNode, config: &Config) -> Result<()> {
    let (name, is_constructor) = match m.kind {
        MethodKind::Normal => (munge(&m.name), false),
        MethodKind::Constructor => (defs::CONSTRUCTOR_METHOD_NAME.to_string(), true),
        MethodKind::StaticInit => (defs::STATIC_INITIALIZER_METHOD_NAME.to_string(), false),
    };
    let ret = match m.kind {
        MethodKind::Normal => m.ret.clone(),
        _ => Type::Void,
    };
    let mut access = access_mask(&m.access);
    if m.kind == MethodKind::StaticInit {
        access |= ACC_STATIC;
    }
    let param_types: Vec<Type> = m.params.iter().map(|p| p.ty.clone()).collect();
    let descriptor = method_descriptor(&param_types, &ret);

    let mut info = match &m.body {
        Some(body) => {
            let mut mw = cw.method_writer(access, &name, &descriptor, is_constructor);
            let param_scope = if config.debug && !m.params.is_empty() {
                let start = mw.new_label();
                mw.place(start)?;
                Some(start)
            } else {
                None
            };
            Gen::new(&mut mw, config.debug).emit(body)?;
            if let Some(start) = param_scope {
                let end = mw.new_label();
                mw.place(end)?;
                for p in &m.params {
                    mw.local_var(&p.name, &p.ty.descriptor(), start, end, p.slot);
                }
            }
            mw.finish()?
        }
        None => {
            // Abstract methods carry no Code attribute.
            let name_index = cw.pool().add_utf8(&name)?;
            let descriptor_index = cw.pool().add_utf8(&descriptor)?;
            MethodInfo::new(access, name_index, descriptor_index)
        }
    };

    if !m.throws.is_empty() {
        let mut indices = Vec::with_capacity(m.throws.len());
        for t in &m.throws {
            indices.push(cw.pool().add_class(&t.internal_name())?);
        }
        info.attributes.push(make_exceptions_attribute(cw.pool(), &indices)?);
    }
    info.attributes.extend(annotation_attributes(cw.pool(), &m.annotations)?);
    info.attributes.extend(parameter_annotation_attributes(cw.pool(), &m.params)?);
    cw.add_method(info);
    Ok(())
}
