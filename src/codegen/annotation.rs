//! Annotation attribute emission.
//!
//! Runtime-retention annotations go to RuntimeVisibleAnnotations,
//! class-retention ones to RuntimeInvisibleAnnotations, and source
//! retention is dropped. Values recurse through arrays and nested
//! annotations.

use super::attribute::{make_attribute, AttributeInfo};
use super::constpool::ConstantPool;
use crate::ast::{AnnotationNode, AnnotationValue, Param, Retention};
use crate::common::Result;

/// Build the (visible, invisible) annotation attributes for a class,
/// field, or method. Returns no attribute for an empty group.
pub fn annotation_attributes(
    pool: &mut ConstantPool,
    annotations: &[AnnotationNode],
) -> Result<Vec<AttributeInfo>> {
    let mut out = Vec::new();
    for (retention, attr_name) in [
        (Retention::Runtime, "RuntimeVisibleAnnotations"),
        (Retention::Class, "RuntimeInvisibleAnnotations"),
    ] {
        let group: Vec<&AnnotationNode> =
            annotations.iter().filter(|a| a.retention == retention).collect();
        if group.is_empty() {
            continue;
        }
        let mut info = Vec::new();
        info.extend_from_slice(&(group.len() as u16).to_be_bytes());
        for ann in group {
            encode_annotation(pool, ann, &mut info)?;
        }
        out.push(make_attribute(pool, attr_name, info)?);
    }
    Ok(out)
}

/// Build parameter-annotation attributes, indexed by parameter
/// position. Emitted only when some parameter actually carries an
/// annotation of the matching retention.
pub fn parameter_annotation_attributes(
    pool: &mut ConstantPool,
    params: &[Param],
) -> Result<Vec<AttributeInfo>> {
    let mut out = Vec::new();
    for (retention, attr_name) in [
        (Retention::Runtime, "RuntimeVisibleParameterAnnotations"),
        (Retention::Class, "RuntimeInvisibleParameterAnnotations"),
    ] {
        if !params
            .iter()
            .any(|p| p.annotations.iter().any(|a| a.retention == retention))
        {
            continue;
        }
        let mut info = Vec::new();
        info.push(params.len() as u8);
        for p in params {
            let group: Vec<&AnnotationNode> =
                p.annotations.iter().filter(|a| a.retention == retention).collect();
            info.extend_from_slice(&(group.len() as u16).to_be_bytes());
            for ann in group {
                encode_annotation(pool, ann, &mut info)?;
            }
        }
        out.push(make_attribute(pool, attr_name, info)?);
    }
    Ok(out)
}

fn encode_annotation(
    pool: &mut ConstantPool,
    ann: &AnnotationNode,
    out: &mut Vec<u8>,
) -> Result<()> {
    let type_index = pool.add_utf8(&ann.ty.descriptor())?;
    out.extend_from_slice(&type_index.to_be_bytes());
    out.extend_from_slice(&(ann.values.len() as u16).to_be_bytes());
    for (name, value) in &ann.values {
        let name_index = pool.add_utf8(name)?;
        out.extend_from_slice(&name_index.to_be_bytes());
        encode_value(pool, value, out)?;
    }
    Ok(())
}

fn encode_value(pool: &mut ConstantPool, value: &AnnotationValue, out: &mut Vec<u8>) -> Result<()> {
    match value {
        AnnotationValue::Bool(v) => {
            out.push(b'Z');
            let idx = pool.add_integer(*v as i32)?;
            out.extend_from_slice(&idx.to_be_bytes());
        }
        AnnotationValue::Byte(v) => {
            out.push(b'B');
            let idx = pool.add_integer(*v as i32)?;
            out.extend_from_slice(&idx.to_be_bytes());
        }
        AnnotationValue::Char(v) => {
            out.push(b'C');
            let idx = pool.add_integer(*v as i32)?;
            out.extend_from_slice(&idx.to_be_bytes());
        }
        AnnotationValue::Short(v) => {
            out.push(b'S');
            let idx = pool.add_integer(*v as i32)?;
            out.extend_from_slice(&idx.to_be_bytes());
        }
        AnnotationValue::Int(v) => {
            out.push(b'I');
            let idx = pool.add_integer(*v)?;
            out.extend_from_slice(&idx.to_be_bytes());
        }
        AnnotationValue::Long(v) => {
            out.push(b'J');
            let idx = pool.add_long(*v)?;
            out.extend_from_slice(&idx.to_be_bytes());
        }
        AnnotationValue::Float(v) => {
            out.push(b'F');
            let idx = pool.add_float(*v)?;
            out.extend_from_slice(&idx.to_be_bytes());
        }
        AnnotationValue::Double(v) => {
            out.push(b'D');
            let idx = pool.add_double(*v)?;
            out.extend_from_slice(&idx.to_be_bytes());
        }
        AnnotationValue::Str(v) => {
            // The 's' tag points at a raw Utf8 entry, not a String.
            out.push(b's');
            let idx = pool.add_utf8(v)?;
            out.extend_from_slice(&idx.to_be_bytes());
        }
        AnnotationValue::Nested(ann) => {
            out.push(b'@');
            encode_annotation(pool, ann, out)?;
        }
        AnnotationValue::Array(values) => {
            out.push(b'[');
            out.extend_from_slice(&(values.len() as u16).to_be_bytes());
            for v in values {
                encode_value(pool, v, out)?;
            }
        }
    }
    Ok(())
}
