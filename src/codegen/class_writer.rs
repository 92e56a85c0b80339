//! Class-level builder: begin/end class, declare fields and methods,
//! class attributes. Frame computation and code assembly live in the
//! method writer this facade hands out.

use super::attribute::{make_source_file_attribute, AttributeInfo};
use super::class::ClassFile;
use super::constpool::ConstantPool;
use super::field::FieldInfo;
use super::flag::access_flags::ACC_SUPER;
use super::method::MethodInfo;
use super::method_writer::MethodWriter;
use super::writer::class_file_to_bytes;
use crate::common::Result;

pub struct ClassWriter {
    class_file: ClassFile,
    class_name: String,
}

impl ClassWriter {
    /// Begin a class: version 52, ACC_SUPER always set.
    pub fn begin(
        access_flags: u16,
        name: &str,
        super_name: &str,
        interfaces: &[String],
    ) -> Result<Self> {
        let mut class_file = ClassFile::new();
        class_file.access_flags = access_flags | ACC_SUPER;
        class_file.this_class = class_file.constant_pool.add_class(name)?;
        class_file.super_class = class_file.constant_pool.add_class(super_name)?;
        for iface in interfaces {
            let idx = class_file.constant_pool.add_class(iface)?;
            class_file.interfaces.push(idx);
        }
        Ok(Self { class_file, class_name: name.to_string() })
    }

    pub fn pool(&mut self) -> &mut ConstantPool {
        &mut self.class_file.constant_pool
    }

    pub fn set_source_file(&mut self, source_file: &str) -> Result<()> {
        let attr = make_source_file_attribute(&mut self.class_file.constant_pool, source_file)?;
        self.class_file.attributes.push(attr);
        Ok(())
    }

    pub fn add_class_attribute(&mut self, attr: AttributeInfo) {
        self.class_file.attributes.push(attr);
    }

    /// Declare a field; attributes (ConstantValue, annotations) are
    /// prepared by the caller.
    pub fn add_field(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        attributes: Vec<AttributeInfo>,
    ) -> Result<()> {
        let name_index = self.class_file.constant_pool.add_utf8(name)?;
        let descriptor_index = self.class_file.constant_pool.add_utf8(descriptor)?;
        let mut info = FieldInfo::new(access_flags, name_index, descriptor_index);
        info.attributes = attributes;
        self.class_file.fields.push(info);
        Ok(())
    }

    /// Open a method writer against this class's constant pool.
    pub fn method_writer(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        is_constructor: bool,
    ) -> MethodWriter<'_> {
        MethodWriter::new(
            &mut self.class_file.constant_pool,
            &self.class_name,
            access_flags,
            name,
            descriptor,
            is_constructor,
        )
    }

    pub fn add_method(&mut self, info: MethodInfo) {
        self.class_file.methods.push(info);
    }

    /// Close the class and return the byte snapshot.
    pub fn finish(self) -> Vec<u8> {
        class_file_to_bytes(&self.class_file)
    }
}
