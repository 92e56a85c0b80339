//! Attributes and exception table structures for Java class files

use super::constpool::{ConstPoolError, ConstantPool};

#[derive(Debug)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl AttributeInfo {
    pub fn new(name_index: u16, info: Vec<u8>) -> Self {
        Self { name_index, info }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.name_index.to_be_bytes());
        bytes.extend_from_slice(&(self.info.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.info);
        bytes
    }
}

#[derive(Debug, Default)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        Self { max_stack, max_locals, code, exception_table: Vec::new(), attributes: Vec::new() }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.max_stack.to_be_bytes());
        bytes.extend_from_slice(&self.max_locals.to_be_bytes());
        bytes.extend_from_slice(&(self.code.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.code);
        bytes.extend_from_slice(&(self.exception_table.len() as u16).to_be_bytes());
        for entry in &self.exception_table {
            bytes.extend_from_slice(&entry.to_bytes());
        }
        bytes.extend_from_slice(&(self.attributes.len() as u16).to_be_bytes());
        for attribute in &self.attributes {
            bytes.extend_from_slice(&attribute.to_bytes());
        }
        bytes
    }
}

/// One row of the Code attribute's exception table. Rows are consulted
/// top to bottom at runtime, so insertion order is source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// CONSTANT_Class index of the caught type; 0 catches everything.
    pub catch_type: u16,
}

impl ExceptionTableEntry {
    pub fn new(start_pc: u16, end_pc: u16, handler_pc: u16, catch_type: u16) -> Self {
        Self { start_pc, end_pc, handler_pc, catch_type }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.start_pc.to_be_bytes());
        bytes.extend_from_slice(&self.end_pc.to_be_bytes());
        bytes.extend_from_slice(&self.handler_pc.to_be_bytes());
        bytes.extend_from_slice(&self.catch_type.to_be_bytes());
        bytes
    }
}

#[derive(Debug, Default)]
pub struct LineNumberTableAttribute {
    pub entries: Vec<(u16, u16)>,
}

impl LineNumberTableAttribute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, start_pc: u16, line_number: u16) {
        self.entries.push((start_pc, line_number));
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        for (start_pc, line) in &self.entries {
            bytes.extend_from_slice(&start_pc.to_be_bytes());
            bytes.extend_from_slice(&line.to_be_bytes());
        }
        bytes
    }
}

#[derive(Debug, Default)]
pub struct LocalVariableTableAttribute {
    pub entries: Vec<LocalVariableEntry>,
}

impl LocalVariableTableAttribute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        for e in &self.entries {
            bytes.extend_from_slice(&e.to_bytes());
        }
        bytes
    }
}

#[derive(Debug)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

impl LocalVariableEntry {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.start_pc.to_be_bytes());
        bytes.extend_from_slice(&self.length.to_be_bytes());
        bytes.extend_from_slice(&self.name_index.to_be_bytes());
        bytes.extend_from_slice(&self.descriptor_index.to_be_bytes());
        bytes.extend_from_slice(&self.index.to_be_bytes());
        bytes
    }
}

/// Build a named attribute whose payload is already serialized.
pub fn make_attribute(
    constant_pool: &mut ConstantPool,
    name: &str,
    info: Vec<u8>,
) -> Result<AttributeInfo, ConstPoolError> {
    let name_index = constant_pool.add_utf8(name)?;
    Ok(AttributeInfo::new(name_index, info))
}

/// Build a SourceFile attribute.
pub fn make_source_file_attribute(
    constant_pool: &mut ConstantPool,
    source_file: &str,
) -> Result<AttributeInfo, ConstPoolError> {
    let value_index = constant_pool.add_utf8(source_file)?;
    make_attribute(constant_pool, "SourceFile", value_index.to_be_bytes().to_vec())
}

/// Build a ConstantValue attribute from an already-added pool index.
pub fn make_constant_value_attribute(
    constant_pool: &mut ConstantPool,
    value_index: u16,
) -> Result<AttributeInfo, ConstPoolError> {
    make_attribute(constant_pool, "ConstantValue", value_index.to_be_bytes().to_vec())
}

/// Build an Exceptions attribute from CONSTANT_Class indices.
pub fn make_exceptions_attribute(
    constant_pool: &mut ConstantPool,
    exception_indices: &[u16],
) -> Result<AttributeInfo, ConstPoolError> {
    let mut info = Vec::new();
    info.extend_from_slice(&(exception_indices.len() as u16).to_be_bytes());
    for idx in exception_indices {
        info.extend_from_slice(&idx.to_be_bytes());
    }
    make_attribute(constant_pool, "Exceptions", info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_layout() {
        let attr = AttributeInfo::new(7, vec![1, 2, 3]);
        let bytes = attr.to_bytes();
        assert_eq!(bytes, vec![0, 7, 0, 0, 0, 3, 1, 2, 3]);
    }

    #[test]
    fn code_attribute_layout() {
        let mut code = CodeAttribute::new(2, 3, vec![0x03, 0xac]);
        code.exception_table.push(ExceptionTableEntry::new(0, 1, 1, 0));
        let bytes = code.to_bytes();
        assert_eq!(&bytes[0..4], &[0, 2, 0, 3]);
        assert_eq!(u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 2);
        // exception_table_length follows the code bytes
        assert_eq!(u16::from_be_bytes([bytes[10], bytes[11]]), 1);
    }
}
