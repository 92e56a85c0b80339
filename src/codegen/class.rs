//! Core classfile structures: ClassFile and its serialization header

use super::attribute::AttributeInfo;
use super::constpool::ConstantPool;
use super::defs::{JAVA_1_8, MAGIC};
use super::field::FieldInfo;
use super::method::MethodInfo;

#[derive(Debug, Default)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    pub fn new() -> Self {
        Self {
            minor_version: 0,
            major_version: JAVA_1_8,
            constant_pool: ConstantPool::new(),
            ..Default::default()
        }
    }

    pub fn magic(&self) -> u32 {
        MAGIC
    }
}
