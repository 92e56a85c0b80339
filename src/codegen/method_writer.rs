//! Per-method code builder: instruction encoding, labels and branch
//! fixups, exception table registration, line numbers, local-variable
//! debug entries, and final Code-attribute assembly (frames and
//! max-stack/max-locals included).

use super::attribute::{
    make_attribute, CodeAttribute, ExceptionTableEntry, LineNumberTableAttribute,
    LocalVariableEntry, LocalVariableTableAttribute,
};
use super::constpool::ConstantPool;
use super::descriptor::{descriptor_width, split_method_descriptor};
use super::flag::access_flags::ACC_STATIC;
use super::frame::{compute_frames, HandlerInfo};
use super::instr;
use super::method::MethodInfo;
use super::opcodes;
use crate::ast::Type;
use crate::common::{Error, Result};

/// An abstract position in the instruction stream. Allocated lazily,
/// identity-compared, placed exactly once; resolved during finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

#[derive(Debug)]
struct Fixup {
    /// Offset of the branch operand within the code buffer.
    at: usize,
    /// Offset of the instruction the branch offset is relative to.
    base: usize,
    label: Label,
    /// 4-byte operand (switch entries) instead of 2.
    wide: bool,
}

/// Builder for one method body. Owns its labels and bookkeeping; the
/// constant pool is borrowed from the enclosing class writer.
pub struct MethodWriter<'a> {
    pool: &'a mut ConstantPool,
    class_name: String,
    access_flags: u16,
    name: String,
    descriptor: String,
    is_constructor: bool,
    code: Vec<u8>,
    labels: Vec<Option<u16>>,
    fixups: Vec<Fixup>,
    exceptions: Vec<(Label, Label, Label, Option<String>)>,
    lines: Vec<(u16, u16)>,
    last_line: Option<u16>,
    local_vars: Vec<LocalVarRecord>,
    max_locals: u16,
}

#[derive(Debug)]
struct LocalVarRecord {
    name: String,
    descriptor: String,
    start: Label,
    end: Label,
    slot: u16,
}

impl<'a> MethodWriter<'a> {
    pub fn new(
        pool: &'a mut ConstantPool,
        class_name: &str,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        is_constructor: bool,
    ) -> Self {
        let is_static = access_flags & ACC_STATIC != 0;
        let (params, _) = split_method_descriptor(descriptor);
        let mut max_locals: u16 = if is_static { 0 } else { 1 };
        for p in &params {
            max_locals += descriptor_width(p).max(1);
        }
        log::debug!("begin method {}.{}{}", class_name, name, descriptor);
        Self {
            pool,
            class_name: class_name.to_string(),
            access_flags,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_constructor,
            code: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            exceptions: Vec::new(),
            lines: Vec::new(),
            last_line: None,
            local_vars: Vec::new(),
            max_locals,
        }
    }

    pub fn pool(&mut self) -> &mut ConstantPool {
        self.pool
    }

    pub fn pc(&self) -> usize {
        self.code.len()
    }

    /// Emit a bare one-byte instruction.
    pub fn op(&mut self, opcode: u8) {
        self.code.push(opcode);
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    /// Place a label at the current position. Placing twice is an
    /// invariant violation.
    pub fn place(&mut self, label: Label) -> Result<()> {
        let slot = &mut self.labels[label.0 as usize];
        if slot.is_some() {
            return Err(Error::invariant(format!("label {:?} placed twice", label)));
        }
        *slot = Some(self.code.len() as u16);
        Ok(())
    }

    /// Emit a 2-byte-offset branch to `label`.
    pub fn branch(&mut self, opcode: u8, label: Label) {
        let base = self.code.len();
        self.code.push(opcode);
        self.fixups.push(Fixup { at: base + 1, base, label, wide: false });
        self.code.extend_from_slice(&[0, 0]);
    }

    pub fn goto_(&mut self, label: Label) {
        self.branch(opcodes::GOTO, label);
    }

    fn note_local(&mut self, slot: u16, width: u16) {
        self.max_locals = self.max_locals.max(slot + width.max(1));
    }

    /// Type-specialized local load, shortest encoding.
    pub fn load(&mut self, ty: &Type, slot: u16) {
        self.note_local(slot, ty.category());
        self.slot_op(instr::load_op(ty), opcodes::ILOAD_0, slot);
    }

    /// Type-specialized local store, shortest encoding.
    pub fn store(&mut self, ty: &Type, slot: u16) {
        self.note_local(slot, ty.category());
        self.slot_op(instr::store_op(ty), opcodes::ISTORE_0, slot);
    }

    fn slot_op(&mut self, base: u8, base_0: u8, slot: u16) {
        // Families are laid out i/l/f/d/a in both the wide and the
        // short-form opcode ranges.
        let family = base - if base_0 == opcodes::ISTORE_0 { opcodes::ISTORE } else { opcodes::ILOAD };
        if slot <= 3 {
            self.code.push(base_0 + family * 4 + slot as u8);
        } else if slot <= u8::MAX as u16 {
            self.code.push(base);
            self.code.push(slot as u8);
        } else {
            self.code.push(opcodes::WIDE);
            self.code.push(base);
            self.code.extend_from_slice(&slot.to_be_bytes());
        }
    }

    pub fn iinc(&mut self, slot: u16, by: i16) {
        self.note_local(slot, 1);
        if slot <= u8::MAX as u16 && (i8::MIN as i16..=i8::MAX as i16).contains(&by) {
            self.code.push(opcodes::IINC);
            self.code.push(slot as u8);
            self.code.push(by as i8 as u8);
        } else {
            self.code.push(opcodes::WIDE);
            self.code.push(opcodes::IINC);
            self.code.extend_from_slice(&slot.to_be_bytes());
            self.code.extend_from_slice(&by.to_be_bytes());
        }
    }

    /// Push an int constant with the shortest encoding.
    pub fn push_int(&mut self, value: i32) -> Result<()> {
        match value {
            -1..=5 => self.code.push((opcodes::ICONST_0 as i32 + value) as u8),
            v if (i8::MIN as i32..=i8::MAX as i32).contains(&v) => {
                self.code.push(opcodes::BIPUSH);
                self.code.push(v as i8 as u8);
            }
            v if (i16::MIN as i32..=i16::MAX as i32).contains(&v) => {
                self.code.push(opcodes::SIPUSH);
                self.code.extend_from_slice(&(v as i16).to_be_bytes());
            }
            v => {
                let idx = self.pool.add_integer(v)?;
                self.ldc(idx);
            }
        }
        Ok(())
    }

    pub fn push_long(&mut self, value: i64) -> Result<()> {
        match value {
            0 => self.code.push(opcodes::LCONST_0),
            1 => self.code.push(opcodes::LCONST_1),
            v => {
                let idx = self.pool.add_long(v)?;
                self.ldc2_w(idx);
            }
        }
        Ok(())
    }

    /// Bit-exact canonical check so `-0.0f` goes through the pool.
    pub fn push_float(&mut self, value: f32) -> Result<()> {
        if value.to_bits() == 0f32.to_bits() {
            self.code.push(opcodes::FCONST_0);
        } else if value.to_bits() == 1f32.to_bits() {
            self.code.push(opcodes::FCONST_1);
        } else if value.to_bits() == 2f32.to_bits() {
            self.code.push(opcodes::FCONST_2);
        } else {
            let idx = self.pool.add_float(value)?;
            self.ldc(idx);
        }
        Ok(())
    }

    pub fn push_double(&mut self, value: f64) -> Result<()> {
        if value.to_bits() == 0f64.to_bits() {
            self.code.push(opcodes::DCONST_0);
        } else if value.to_bits() == 1f64.to_bits() {
            self.code.push(opcodes::DCONST_1);
        } else {
            let idx = self.pool.add_double(value)?;
            self.ldc2_w(idx);
        }
        Ok(())
    }

    pub fn push_string(&mut self, value: &str) -> Result<()> {
        let idx = self.pool.add_string(value)?;
        self.ldc(idx);
        Ok(())
    }

    /// Push a `Class` constant for a reference or array type.
    pub fn push_class_constant(&mut self, internal_name: &str) -> Result<()> {
        let idx = self.pool.add_class(internal_name)?;
        self.ldc(idx);
        Ok(())
    }

    fn ldc(&mut self, idx: u16) {
        if idx <= u8::MAX as u16 {
            self.code.push(opcodes::LDC);
            self.code.push(idx as u8);
        } else {
            self.code.push(opcodes::LDC_W);
            self.code.extend_from_slice(&idx.to_be_bytes());
        }
    }

    fn ldc2_w(&mut self, idx: u16) {
        self.code.push(opcodes::LDC2_W);
        self.code.extend_from_slice(&idx.to_be_bytes());
    }

    /// GETFIELD / PUTFIELD / GETSTATIC / PUTSTATIC.
    pub fn field(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        let idx = self.pool.add_field_ref(owner, name, descriptor)?;
        self.code.push(opcode);
        self.code.extend_from_slice(&idx.to_be_bytes());
        Ok(())
    }

    /// Any invoke opcode; `interface_owner` selects the constant kind
    /// and drives the INVOKEINTERFACE count operand.
    pub fn invoke(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface_owner: bool,
    ) -> Result<()> {
        let idx = if interface_owner {
            self.pool.add_interface_method_ref(owner, name, descriptor)?
        } else {
            self.pool.add_method_ref(owner, name, descriptor)?
        };
        self.code.push(opcode);
        self.code.extend_from_slice(&idx.to_be_bytes());
        if opcode == opcodes::INVOKEINTERFACE {
            let (params, _) = split_method_descriptor(descriptor);
            let count: u16 = 1 + params.iter().map(|p| descriptor_width(p)).sum::<u16>();
            self.code.push(count as u8);
            self.code.push(0);
        }
        Ok(())
    }

    /// NEW / ANEWARRAY / CHECKCAST / INSTANCEOF.
    pub fn type_op(&mut self, opcode: u8, internal_name: &str) -> Result<()> {
        let idx = self.pool.add_class(internal_name)?;
        self.code.push(opcode);
        self.code.extend_from_slice(&idx.to_be_bytes());
        Ok(())
    }

    pub fn newarray(&mut self, tag: u8) {
        self.code.push(opcodes::NEWARRAY);
        self.code.push(tag);
    }

    pub fn multianewarray(&mut self, descriptor: &str, dims: u8) -> Result<()> {
        let idx = self.pool.add_class(descriptor)?;
        self.code.push(opcodes::MULTIANEWARRAY);
        self.code.extend_from_slice(&idx.to_be_bytes());
        self.code.push(dims);
        Ok(())
    }

    pub fn table_switch(&mut self, low: i32, high: i32, default: Label, targets: &[Label]) {
        let base = self.code.len();
        self.code.push(opcodes::TABLESWITCH);
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
        self.fixups.push(Fixup { at: self.code.len(), base, label: default, wide: true });
        self.code.extend_from_slice(&[0; 4]);
        self.code.extend_from_slice(&low.to_be_bytes());
        self.code.extend_from_slice(&high.to_be_bytes());
        for t in targets {
            self.fixups.push(Fixup { at: self.code.len(), base, label: *t, wide: true });
            self.code.extend_from_slice(&[0; 4]);
        }
    }

    pub fn lookup_switch(&mut self, default: Label, pairs: &[(i32, Label)]) {
        let base = self.code.len();
        self.code.push(opcodes::LOOKUPSWITCH);
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
        self.fixups.push(Fixup { at: self.code.len(), base, label: default, wide: true });
        self.code.extend_from_slice(&[0; 4]);
        self.code.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
        for (key, t) in pairs {
            self.code.extend_from_slice(&key.to_be_bytes());
            self.fixups.push(Fixup { at: self.code.len(), base, label: *t, wide: true });
            self.code.extend_from_slice(&[0; 4]);
        }
    }

    /// Record a source line for the current position; consecutive
    /// duplicates are dropped.
    pub fn line(&mut self, line: u16) {
        if self.last_line == Some(line) {
            return;
        }
        self.last_line = Some(line);
        self.lines.push((self.code.len() as u16, line));
    }

    /// Register an exception-table row. Rows are emitted in
    /// registration order, which is source order.
    pub fn exception(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_class: Option<String>,
    ) {
        self.exceptions.push((start, end, handler, catch_class));
    }

    /// Record a LocalVariableTable entry (emitted only when the class
    /// emitter runs with the debug flag on).
    pub fn local_var(&mut self, name: &str, descriptor: &str, start: Label, end: Label, slot: u16) {
        self.note_local(slot, descriptor_width(descriptor));
        self.local_vars.push(LocalVarRecord {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            start,
            end,
            slot,
        });
    }

    fn label_pos(&self, label: Label) -> Result<u16> {
        self.labels[label.0 as usize]
            .ok_or_else(|| Error::backend(format!("label {:?} referenced but never placed", label)))
    }

    /// Patch branches, compute frames and limits, and assemble the
    /// MethodInfo with its Code attribute.
    pub fn finish(mut self) -> Result<MethodInfo> {
        if self.code.len() > u16::MAX as usize {
            return Err(Error::backend(format!(
                "method {} exceeds the 65535-byte code limit",
                self.name
            )));
        }
        for fixup in &self.fixups {
            let target = self.labels[fixup.label.0 as usize].ok_or_else(|| {
                Error::backend(format!("label {:?} referenced but never placed", fixup.label))
            })?;
            let offset = target as i64 - fixup.base as i64;
            if fixup.wide {
                self.code[fixup.at..fixup.at + 4]
                    .copy_from_slice(&(offset as i32).to_be_bytes());
            } else {
                if !(i16::MIN as i64..=i16::MAX as i64).contains(&offset) {
                    return Err(Error::backend(format!(
                        "branch offset {} out of 16-bit range in {}",
                        offset, self.name
                    )));
                }
                self.code[fixup.at..fixup.at + 2]
                    .copy_from_slice(&(offset as i16).to_be_bytes());
            }
        }

        let mut handlers = Vec::with_capacity(self.exceptions.len());
        for (start, end, handler, catch_class) in &self.exceptions {
            handlers.push(HandlerInfo {
                start_pc: self.label_pos(*start)?,
                end_pc: self.label_pos(*end)?,
                handler_pc: self.label_pos(*handler)?,
                catch_class: catch_class.clone(),
            });
        }

        let is_static = self.access_flags & ACC_STATIC != 0;
        let frames = compute_frames(
            &mut self.code,
            &handlers,
            is_static,
            self.is_constructor,
            &self.class_name,
            &self.descriptor,
            self.pool,
        )?;
        log::debug!(
            "finish method {}.{}: {} bytes, {} frames, max_stack {}, max_locals {}",
            self.class_name,
            self.name,
            self.code.len(),
            frames.table.frames.len(),
            frames.max_stack,
            self.max_locals
        );

        let mut code_attr = CodeAttribute::new(frames.max_stack, self.max_locals, self.code.clone());
        for h in &handlers {
            let catch_type = match &h.catch_class {
                Some(name) => self.pool.add_class(name)?,
                None => 0,
            };
            code_attr.exception_table.push(ExceptionTableEntry::new(
                h.start_pc, h.end_pc, h.handler_pc, catch_type,
            ));
        }
        if !self.lines.is_empty() {
            let mut table = LineNumberTableAttribute::new();
            for (pc, line) in &self.lines {
                table.add(*pc, *line);
            }
            code_attr
                .attributes
                .push(make_attribute(self.pool, "LineNumberTable", table.to_bytes())?);
        }
        if !self.local_vars.is_empty() {
            let mut table = LocalVariableTableAttribute::new();
            for v in &self.local_vars {
                let start_pc = self.label_pos(v.start)?;
                let end_pc = self.label_pos(v.end)?;
                table.entries.push(LocalVariableEntry {
                    start_pc,
                    length: end_pc - start_pc,
                    name_index: self.pool.add_utf8(&v.name)?,
                    descriptor_index: self.pool.add_utf8(&v.descriptor)?,
                    index: v.slot,
                });
            }
            code_attr
                .attributes
                .push(make_attribute(self.pool, "LocalVariableTable", table.to_bytes())?);
        }
        if !frames.table.frames.is_empty() {
            code_attr
                .attributes
                .push(make_attribute(self.pool, "StackMapTable", frames.table.to_bytes())?);
        }

        let name_index = self.pool.add_utf8(&self.name)?;
        let descriptor_index = self.pool.add_utf8(&self.descriptor)?;
        let mut info = MethodInfo::new(self.access_flags, name_index, descriptor_index);
        info.attributes.push(make_attribute(self.pool, "Code", code_attr.to_bytes())?);
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer(pool: &mut ConstantPool) -> MethodWriter<'_> {
        MethodWriter::new(pool, "p/Q", ACC_STATIC, "m", "()I", false)
    }

    #[test]
    fn short_form_loads() {
        let mut pool = ConstantPool::new();
        let mut mw = writer(&mut pool);
        mw.load(&Type::Int, 0);
        mw.load(&Type::Long, 2);
        mw.load(&Type::reference("p/Q"), 4);
        mw.load(&Type::Double, 300);
        assert_eq!(
            mw.code,
            vec![
                0x1a, // iload_0
                0x20, // lload_2
                opcodes::ALOAD,
                4,
                opcodes::WIDE,
                opcodes::DLOAD,
                0x01,
                0x2c,
            ]
        );
    }

    #[test]
    fn short_form_stores() {
        let mut pool = ConstantPool::new();
        let mut mw = writer(&mut pool);
        mw.store(&Type::Int, 1);
        mw.store(&Type::Float, 3);
        assert_eq!(mw.code, vec![0x3c /* istore_1 */, 0x46 /* fstore_3 */]);
    }

    #[test]
    fn int_push_encodings() {
        let mut pool = ConstantPool::new();
        let mut mw = writer(&mut pool);
        mw.push_int(-1).unwrap();
        mw.push_int(5).unwrap();
        mw.push_int(6).unwrap();
        mw.push_int(-129).unwrap();
        mw.push_int(40000).unwrap();
        assert_eq!(mw.code[0], opcodes::ICONST_M1);
        assert_eq!(mw.code[1], opcodes::ICONST_5);
        assert_eq!(&mw.code[2..4], &[opcodes::BIPUSH, 6]);
        assert_eq!(&mw.code[4..7], &[opcodes::SIPUSH, 0xff, 0x7f]);
        assert_eq!(mw.code[7], opcodes::LDC);
    }

    #[test]
    fn branch_fixup_resolves() {
        let mut pool = ConstantPool::new();
        let mut mw = writer(&mut pool);
        let end = mw.new_label();
        mw.push_int(0).unwrap();
        mw.branch(opcodes::IFEQ, end);
        mw.push_int(1).unwrap();
        mw.op(opcodes::IRETURN);
        mw.place(end).unwrap();
        mw.push_int(0).unwrap();
        mw.op(opcodes::IRETURN);
        let info = mw.finish().unwrap();
        assert_eq!(info.access_flags, ACC_STATIC);
    }

    #[test]
    fn placing_twice_is_an_invariant_violation() {
        let mut pool = ConstantPool::new();
        let mut mw = writer(&mut pool);
        let l = mw.new_label();
        mw.place(l).unwrap();
        assert!(matches!(mw.place(l), Err(Error::Invariant { .. })));
    }

    #[test]
    fn unplaced_label_is_a_backend_failure() {
        let mut pool = ConstantPool::new();
        let mut mw = writer(&mut pool);
        let l = mw.new_label();
        mw.push_int(0).unwrap();
        mw.branch(opcodes::IFEQ, l);
        mw.push_int(0).unwrap();
        mw.op(opcodes::IRETURN);
        assert!(matches!(mw.finish(), Err(Error::Backend { .. })));
    }

    #[test]
    fn minus_zero_float_goes_through_the_pool() {
        let mut pool = ConstantPool::new();
        let mut mw = writer(&mut pool);
        mw.push_float(0.0).unwrap();
        mw.push_float(-0.0).unwrap();
        assert_eq!(mw.code[0], opcodes::FCONST_0);
        assert_eq!(mw.code[1], opcodes::LDC);
    }
}
