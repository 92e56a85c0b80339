//! Constant pool and constants for Java class files

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConstPoolError {
    #[error("Constant pool size limit exceeded: current={current}, adding={adding}")]
    SizeLimitExceeded { current: usize, adding: usize },
}

impl From<ConstPoolError> for crate::common::Error {
    fn from(e: ConstPoolError) -> Self {
        crate::common::Error::backend(e.to_string())
    }
}

mod constant_tags {
    pub const CONSTANT_UTF8: u8 = 1;
    pub const CONSTANT_INTEGER: u8 = 3;
    pub const CONSTANT_FLOAT: u8 = 4;
    pub const CONSTANT_LONG: u8 = 5;
    pub const CONSTANT_DOUBLE: u8 = 6;
    pub const CONSTANT_CLASS: u8 = 7;
    pub const CONSTANT_STRING: u8 = 8;
    pub const CONSTANT_FIELDREF: u8 = 9;
    pub const CONSTANT_METHODREF: u8 = 10;
    pub const CONSTANT_INTERFACEMETHODREF: u8 = 11;
    pub const CONSTANT_NAMEANDTYPE: u8 = 12;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    /// Phantom slot following a Long or Double entry (JVMS 4.4.5); not
    /// serialized.
    Gap,
}

impl Constant {
    pub fn to_bytes(&self) -> Vec<u8> {
        use constant_tags::*;
        let mut bytes = Vec::new();
        match self {
            Constant::Utf8(value) => {
                bytes.push(CONSTANT_UTF8);
                let utf8_bytes = value.as_bytes();
                bytes.extend_from_slice(&(utf8_bytes.len() as u16).to_be_bytes());
                bytes.extend_from_slice(utf8_bytes);
            }
            Constant::Integer(value) => {
                bytes.push(CONSTANT_INTEGER);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Float(value) => {
                bytes.push(CONSTANT_FLOAT);
                bytes.extend_from_slice(&value.to_bits().to_be_bytes());
            }
            Constant::Long(value) => {
                bytes.push(CONSTANT_LONG);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Double(value) => {
                bytes.push(CONSTANT_DOUBLE);
                bytes.extend_from_slice(&value.to_bits().to_be_bytes());
            }
            Constant::Class(name_index) => {
                bytes.push(CONSTANT_CLASS);
                bytes.extend_from_slice(&name_index.to_be_bytes());
            }
            Constant::String(string_index) => {
                bytes.push(CONSTANT_STRING);
                bytes.extend_from_slice(&string_index.to_be_bytes());
            }
            Constant::FieldRef(class_index, name_and_type_index) => {
                bytes.push(CONSTANT_FIELDREF);
                bytes.extend_from_slice(&class_index.to_be_bytes());
                bytes.extend_from_slice(&name_and_type_index.to_be_bytes());
            }
            Constant::MethodRef(class_index, name_and_type_index) => {
                bytes.push(CONSTANT_METHODREF);
                bytes.extend_from_slice(&class_index.to_be_bytes());
                bytes.extend_from_slice(&name_and_type_index.to_be_bytes());
            }
            Constant::InterfaceMethodRef(class_index, name_and_type_index) => {
                bytes.push(CONSTANT_INTERFACEMETHODREF);
                bytes.extend_from_slice(&class_index.to_be_bytes());
                bytes.extend_from_slice(&name_and_type_index.to_be_bytes());
            }
            Constant::NameAndType(name_index, descriptor_index) => {
                bytes.push(CONSTANT_NAMEANDTYPE);
                bytes.extend_from_slice(&name_index.to_be_bytes());
                bytes.extend_from_slice(&descriptor_index.to_be_bytes());
            }
            Constant::Gap => {}
        }
        bytes
    }
}

/// Deduplicating constant pool. Indices start at 1; Long and Double
/// entries consume two slots.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    pub(crate) constants: Vec<Constant>,
    utf8_map: HashMap<String, u16>,
    class_map: HashMap<String, u16>,
    string_map: HashMap<String, u16>,
    nat_map: HashMap<(String, String), u16>,
    fieldref_map: HashMap<(String, String, String), u16>,
    methodref_map: HashMap<(String, String, String), u16>,
    interfaceref_map: HashMap<(String, String, String), u16>,
    int_map: HashMap<i32, u16>,
    long_map: HashMap<i64, u16>,
    float_map: HashMap<u32, u16>,
    double_map: HashMap<u64, u16>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots (constant_pool_count is this plus one).
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    fn ensure_space(&self, adding: usize) -> Result<(), ConstPoolError> {
        // constant_pool_count is u16 and equals constants.len() + 1
        if self.constants.len() + adding + 1 > u16::MAX as usize {
            return Err(ConstPoolError::SizeLimitExceeded {
                current: self.constants.len(),
                adding,
            });
        }
        Ok(())
    }

    fn push(&mut self, c: Constant) -> u16 {
        self.constants.push(c);
        self.constants.len() as u16
    }

    pub fn add_utf8(&mut self, value: &str) -> Result<u16, ConstPoolError> {
        if let Some(idx) = self.utf8_map.get(value) {
            return Ok(*idx);
        }
        self.ensure_space(1)?;
        let idx = self.push(Constant::Utf8(value.to_string()));
        self.utf8_map.insert(value.to_string(), idx);
        Ok(idx)
    }

    pub fn add_class(&mut self, name: &str) -> Result<u16, ConstPoolError> {
        if let Some(idx) = self.class_map.get(name) {
            return Ok(*idx);
        }
        self.ensure_space(2)?;
        let name_utf8 = self.add_utf8(name)?;
        let idx = self.push(Constant::Class(name_utf8));
        self.class_map.insert(name.to_string(), idx);
        Ok(idx)
    }

    pub fn add_string(&mut self, value: &str) -> Result<u16, ConstPoolError> {
        if let Some(idx) = self.string_map.get(value) {
            return Ok(*idx);
        }
        self.ensure_space(2)?;
        let utf8 = self.add_utf8(value)?;
        let idx = self.push(Constant::String(utf8));
        self.string_map.insert(value.to_string(), idx);
        Ok(idx)
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, ConstPoolError> {
        let key = (name.to_string(), descriptor.to_string());
        if let Some(idx) = self.nat_map.get(&key) {
            return Ok(*idx);
        }
        self.ensure_space(3)?;
        let name_index = self.add_utf8(name)?;
        let desc_index = self.add_utf8(descriptor)?;
        let idx = self.push(Constant::NameAndType(name_index, desc_index));
        self.nat_map.insert(key, idx);
        Ok(idx)
    }

    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16, ConstPoolError> {
        let key = (class.to_string(), name.to_string(), descriptor.to_string());
        if let Some(idx) = self.fieldref_map.get(&key) {
            return Ok(*idx);
        }
        self.ensure_space(6)?;
        let class_index = self.add_class(class)?;
        let nat_index = self.add_name_and_type(name, descriptor)?;
        let idx = self.push(Constant::FieldRef(class_index, nat_index));
        self.fieldref_map.insert(key, idx);
        Ok(idx)
    }

    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16, ConstPoolError> {
        let key = (class.to_string(), name.to_string(), descriptor.to_string());
        if let Some(idx) = self.methodref_map.get(&key) {
            return Ok(*idx);
        }
        self.ensure_space(6)?;
        let class_index = self.add_class(class)?;
        let nat_index = self.add_name_and_type(name, descriptor)?;
        let idx = self.push(Constant::MethodRef(class_index, nat_index));
        self.methodref_map.insert(key, idx);
        Ok(idx)
    }

    pub fn add_interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16, ConstPoolError> {
        let key = (class.to_string(), name.to_string(), descriptor.to_string());
        if let Some(idx) = self.interfaceref_map.get(&key) {
            return Ok(*idx);
        }
        self.ensure_space(6)?;
        let class_index = self.add_class(class)?;
        let nat_index = self.add_name_and_type(name, descriptor)?;
        let idx = self.push(Constant::InterfaceMethodRef(class_index, nat_index));
        self.interfaceref_map.insert(key, idx);
        Ok(idx)
    }

    pub fn add_integer(&mut self, value: i32) -> Result<u16, ConstPoolError> {
        if let Some(idx) = self.int_map.get(&value) {
            return Ok(*idx);
        }
        self.ensure_space(1)?;
        let idx = self.push(Constant::Integer(value));
        self.int_map.insert(value, idx);
        Ok(idx)
    }

    pub fn add_float(&mut self, value: f32) -> Result<u16, ConstPoolError> {
        if let Some(idx) = self.float_map.get(&value.to_bits()) {
            return Ok(*idx);
        }
        self.ensure_space(1)?;
        let idx = self.push(Constant::Float(value));
        self.float_map.insert(value.to_bits(), idx);
        Ok(idx)
    }

    pub fn add_long(&mut self, value: i64) -> Result<u16, ConstPoolError> {
        if let Some(idx) = self.long_map.get(&value) {
            return Ok(*idx);
        }
        self.ensure_space(2)?;
        let idx = self.push(Constant::Long(value));
        self.push(Constant::Gap);
        self.long_map.insert(value, idx);
        Ok(idx)
    }

    pub fn add_double(&mut self, value: f64) -> Result<u16, ConstPoolError> {
        if let Some(idx) = self.double_map.get(&value.to_bits()) {
            return Ok(*idx);
        }
        self.ensure_space(2)?;
        let idx = self.push(Constant::Double(value));
        self.push(Constant::Gap);
        self.double_map.insert(value.to_bits(), idx);
        Ok(idx)
    }

    pub fn get(&self, idx: u16) -> Option<&Constant> {
        if idx == 0 {
            return None;
        }
        self.constants.get((idx - 1) as usize)
    }

    pub fn utf8_at(&self, idx: u16) -> Option<&str> {
        match self.get(idx) {
            Some(Constant::Utf8(s)) => Some(s),
            _ => None,
        }
    }

    /// Resolve a CONSTANT_Class entry to its internal name.
    pub fn class_name_at(&self, idx: u16) -> Option<&str> {
        match self.get(idx) {
            Some(Constant::Class(name_idx)) => self.utf8_at(*name_idx),
            _ => None,
        }
    }

    /// Resolve a field/method/interface-method ref to (owner, name,
    /// descriptor).
    pub fn member_at(&self, idx: u16) -> Option<(&str, &str, &str)> {
        let (class_idx, nat_idx) = match self.get(idx) {
            Some(Constant::FieldRef(c, n))
            | Some(Constant::MethodRef(c, n))
            | Some(Constant::InterfaceMethodRef(c, n)) => (*c, *n),
            _ => return None,
        };
        let owner = self.class_name_at(class_idx)?;
        let (name_idx, desc_idx) = match self.get(nat_idx) {
            Some(Constant::NameAndType(n, d)) => (*n, *d),
            _ => return None,
        };
        Some((owner, self.utf8_at(name_idx)?, self.utf8_at(desc_idx)?))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let count = (self.constants.len() + 1) as u16;
        let mut bytes: Vec<u8> = Vec::new();
        bytes.extend_from_slice(&count.to_be_bytes());
        for constant in &self.constants {
            bytes.extend_from_slice(&constant.to_bytes());
        }
        bytes
    }
}
