//! StackMapTable frames and frame computation.
//!
//! The method writer hands the finished code bytes here; a worklist
//! dataflow over basic blocks reconstructs the verification-type state
//! at every branch target and exception handler, merges at join points
//! with a minimal type lattice, and emits compressed frames. Max stack
//! falls out of the same simulation.
//!
//! Unreachable regions (code after a finally handler that returns, dead
//! GOTOs) are rewritten to `NOP … ATHROW` and covered by a full frame
//! with stack `[java/lang/Throwable]`, the same convention ASM's
//! COMPUTE_FRAMES uses.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::constpool::{Constant, ConstantPool};
use super::opcodes;
use crate::common::{Error, Result};

/// VerificationTypeInfo as defined in JVMS 4.7.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(u16),        // cpool index to CONSTANT_Class
    Uninitialized(u16), // offset of the NEW instruction
}

impl VerificationType {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        match self {
            VerificationType::Top => bytes.push(0),
            VerificationType::Integer => bytes.push(1),
            VerificationType::Float => bytes.push(2),
            VerificationType::Double => bytes.push(3),
            VerificationType::Long => bytes.push(4),
            VerificationType::Null => bytes.push(5),
            VerificationType::UninitializedThis => bytes.push(6),
            VerificationType::Object(cp_index) => {
                bytes.push(7);
                bytes.extend_from_slice(&cp_index.to_be_bytes());
            }
            VerificationType::Uninitialized(offset) => {
                bytes.push(8);
                bytes.extend_from_slice(&offset.to_be_bytes());
            }
        }
        bytes
    }

    /// Stack slots this type occupies.
    fn width(&self) -> u16 {
        match self {
            VerificationType::Long | VerificationType::Double => 2,
            _ => 1,
        }
    }
}

/// StackMapFrame variants as defined in JVMS 4.7.4
#[derive(Debug, Clone)]
pub enum StackMapFrame {
    Same { offset_delta: u16 },
    SameLocals1StackItem { offset_delta: u16, stack: VerificationType },
    Chop { k: u8, offset_delta: u16 },
    Append { k: u8, offset_delta: u16, locals: Vec<VerificationType> },
    Full { offset_delta: u16, locals: Vec<VerificationType>, stack: Vec<VerificationType> },
}

impl StackMapFrame {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        match self {
            StackMapFrame::Same { offset_delta } => {
                if *offset_delta <= 63 {
                    bytes.push(*offset_delta as u8);
                } else {
                    bytes.push(251); // same_frame_extended
                    bytes.extend_from_slice(&offset_delta.to_be_bytes());
                }
            }
            StackMapFrame::SameLocals1StackItem { offset_delta, stack } => {
                if *offset_delta <= 63 {
                    bytes.push(64 + *offset_delta as u8);
                } else {
                    bytes.push(247); // ..._extended
                    bytes.extend_from_slice(&offset_delta.to_be_bytes());
                }
                bytes.extend_from_slice(&stack.to_bytes());
            }
            StackMapFrame::Chop { k, offset_delta } => {
                bytes.push(251 - k);
                bytes.extend_from_slice(&offset_delta.to_be_bytes());
            }
            StackMapFrame::Append { k, offset_delta, locals } => {
                bytes.push(251 + k);
                bytes.extend_from_slice(&offset_delta.to_be_bytes());
                for l in locals {
                    bytes.extend_from_slice(&l.to_bytes());
                }
            }
            StackMapFrame::Full { offset_delta, locals, stack } => {
                bytes.push(255);
                bytes.extend_from_slice(&offset_delta.to_be_bytes());
                bytes.extend_from_slice(&(locals.len() as u16).to_be_bytes());
                for l in locals {
                    bytes.extend_from_slice(&l.to_bytes());
                }
                bytes.extend_from_slice(&(stack.len() as u16).to_be_bytes());
                for s in stack {
                    bytes.extend_from_slice(&s.to_bytes());
                }
            }
        }
        bytes
    }
}

#[derive(Debug, Default, Clone)]
pub struct StackMapTable {
    pub frames: Vec<StackMapFrame>,
}

impl StackMapTable {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.frames.len() as u16).to_be_bytes());
        for f in &self.frames {
            bytes.extend_from_slice(&f.to_bytes());
        }
        bytes
    }
}

/// Exception handler row with the catch type still by name.
#[derive(Debug, Clone)]
pub struct HandlerInfo {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_class: Option<String>,
}

/// Per-offset frame state during simulation. Locals are slot-indexed
/// (a Long at slot i is followed by an explicit Top at i+1); stack
/// entries are one per value.
#[derive(Debug, Clone, PartialEq, Default)]
struct FrameState {
    locals: Vec<VerificationType>,
    stack: Vec<VerificationType>,
}

impl FrameState {
    fn stack_width(&self) -> u16 {
        self.stack.iter().map(|t| t.width()).sum()
    }
}

/// Merge two verification types to their least upper bound in the
/// minimal lattice: equal types meet themselves, Null meets any object,
/// distinct objects meet at java/lang/Object, everything else at Top.
fn merge_type(
    a: &VerificationType,
    b: &VerificationType,
    cp: &mut ConstantPool,
) -> Result<VerificationType> {
    use VerificationType::*;
    if a == b {
        return Ok(a.clone());
    }
    Ok(match (a, b) {
        (Null, Object(c)) | (Object(c), Null) => Object(*c),
        (Object(_), Object(_)) => Object(cp.add_class("java/lang/Object")?),
        _ => Top,
    })
}

fn merge_locals(
    a: &[VerificationType],
    b: &[VerificationType],
    cp: &mut ConstantPool,
) -> Result<Vec<VerificationType>> {
    let max_len = a.len().max(b.len());
    let mut out = Vec::with_capacity(max_len);
    for i in 0..max_len {
        let ta = a.get(i).cloned().unwrap_or(VerificationType::Top);
        let tb = b.get(i).cloned().unwrap_or(VerificationType::Top);
        out.push(merge_type(&ta, &tb, cp)?);
    }
    Ok(out)
}

/// Result of frame computation: the table and the max operand stack
/// depth observed by the simulation.
pub struct FrameResult {
    pub table: StackMapTable,
    pub max_stack: u16,
}

/// Compute the StackMapTable and max_stack for finished code.
///
/// `code` may be rewritten in place where unreachable regions are
/// replaced by `NOP … ATHROW`.
pub fn compute_frames(
    code: &mut [u8],
    handlers: &[HandlerInfo],
    is_static: bool,
    is_constructor: bool,
    class_name: &str,
    descriptor: &str,
    cp: &mut ConstantPool,
) -> Result<FrameResult> {
    if code.is_empty() {
        return Err(Error::backend("method has no code"));
    }
    let leaders = collect_leaders(code, handlers)?;
    let entry = entry_state(is_static, is_constructor, class_name, descriptor, cp)?;

    let mut in_states: BTreeMap<u16, FrameState> = BTreeMap::new();
    in_states.insert(0, entry.clone());
    let mut worklist: VecDeque<u16> = VecDeque::new();
    worklist.push_back(0);
    let mut max_stack: u16 = 0;

    while let Some(leader) = worklist.pop_front() {
        let mut state = match in_states.get(&leader) {
            Some(s) => s.clone(),
            None => continue,
        };
        let block_end = leaders
            .range((leader + 1)..)
            .next()
            .copied()
            .unwrap_or(code.len() as u16) as usize;
        let mut pc = leader as usize;
        let mut fell_through = true;
        max_stack = max_stack.max(state.stack_width());
        while pc < block_end {
            // Every instruction covered by a protected region feeds the
            // handler's entry state.
            for h in handlers {
                if (pc as u16) >= h.start_pc && (pc as u16) < h.end_pc {
                    let vt = handler_type(h, cp)?;
                    let handler_state =
                        FrameState { locals: state.locals.clone(), stack: vec![vt] };
                    merge_into(h.handler_pc, handler_state, &mut in_states, &mut worklist, cp)?;
                }
            }
            let op = code[pc];
            let len = instruction_length(code, pc)?;
            let mut terminated = false;
            match op {
                opcodes::GOTO => {
                    let tgt = branch_target(code, pc);
                    merge_into(tgt, state.clone(), &mut in_states, &mut worklist, cp)?;
                    terminated = true;
                }
                opcodes::GOTO_W => {
                    let off = read_i32(code, pc + 1);
                    let tgt = (pc as i32 + off) as u16;
                    merge_into(tgt, state.clone(), &mut in_states, &mut worklist, cp)?;
                    terminated = true;
                }
                opcodes::IFEQ..=opcodes::IF_ACMPNE | opcodes::IFNULL | opcodes::IFNONNULL => {
                    simulate(op, code, pc, &mut state, class_name, cp)?;
                    let tgt = branch_target(code, pc);
                    merge_into(tgt, state.clone(), &mut in_states, &mut worklist, cp)?;
                }
                opcodes::TABLESWITCH | opcodes::LOOKUPSWITCH => {
                    simulate(op, code, pc, &mut state, class_name, cp)?;
                    for tgt in switch_targets(code, pc)? {
                        merge_into(tgt, state.clone(), &mut in_states, &mut worklist, cp)?;
                    }
                    terminated = true;
                }
                opcodes::IRETURN..=opcodes::RETURN | opcodes::ATHROW => {
                    terminated = true;
                }
                _ => {
                    simulate(op, code, pc, &mut state, class_name, cp)?;
                }
            }
            max_stack = max_stack.max(state.stack_width());
            if terminated {
                fell_through = false;
                break;
            }
            pc += len;
        }
        if fell_through && block_end < code.len() {
            merge_into(block_end as u16, state, &mut in_states, &mut worklist, cp)?;
        }
    }

    // Emit frames for every leader except the method entry. Unreachable
    // leaders get the dead-code rewrite.
    let throwable = cp.add_class("java/lang/Throwable")?;
    let mut frames = Vec::new();
    let mut prev_offset: i32 = -1;
    let mut prev_locals = compress_locals(&entry.locals);
    let mut any_dead = false;
    let leader_list: Vec<u16> = leaders.iter().copied().filter(|&o| o != 0 && (o as usize) < code.len()).collect();
    for (i, &leader) in leader_list.iter().enumerate() {
        let delta = (leader as i32 - prev_offset - 1) as u16;
        let frame = match in_states.get(&leader) {
            Some(state) => {
                let locals = compress_locals(&state.locals);
                let stack = compress_stack(&state.stack);
                let f = compress_frame(delta, &prev_locals, &locals, &stack);
                prev_locals = locals;
                f
            }
            None => {
                // Dead region: NOPs capped with ATHROW, typed as a bare
                // Throwable on the stack.
                any_dead = true;
                let end = leader_list
                    .get(i + 1)
                    .map(|&n| n as usize)
                    .unwrap_or(code.len());
                for b in code[leader as usize..end].iter_mut() {
                    *b = opcodes::NOP;
                }
                code[end - 1] = opcodes::ATHROW;
                log::debug!("rewrote unreachable code at {}..{} to nop/athrow", leader, end);
                prev_locals = Vec::new();
                StackMapFrame::Full {
                    offset_delta: delta,
                    locals: Vec::new(),
                    stack: vec![VerificationType::Object(throwable)],
                }
            }
        };
        prev_offset = leader as i32;
        frames.push(frame);
    }
    if any_dead {
        max_stack = max_stack.max(1);
    }

    Ok(FrameResult { table: StackMapTable { frames }, max_stack })
}

fn handler_type(h: &HandlerInfo, cp: &mut ConstantPool) -> Result<VerificationType> {
    let name = h.catch_class.as_deref().unwrap_or("java/lang/Throwable");
    Ok(VerificationType::Object(cp.add_class(name)?))
}

fn merge_into(
    target: u16,
    state: FrameState,
    in_states: &mut BTreeMap<u16, FrameState>,
    worklist: &mut VecDeque<u16>,
    cp: &mut ConstantPool,
) -> Result<()> {
    let merged = match in_states.get(&target) {
        None => state,
        Some(existing) => {
            if existing.stack.len() != state.stack.len() {
                return Err(Error::backend(format!(
                    "inconsistent stack depth at branch target {}: {} vs {}",
                    target,
                    existing.stack.len(),
                    state.stack.len()
                )));
            }
            let locals = merge_locals(&existing.locals, &state.locals, cp)?;
            let mut stack = Vec::with_capacity(state.stack.len());
            for (a, b) in existing.stack.iter().zip(state.stack.iter()) {
                stack.push(merge_type(a, b, cp)?);
            }
            let merged = FrameState { locals, stack };
            if &merged == existing {
                return Ok(());
            }
            merged
        }
    };
    in_states.insert(target, merged);
    worklist.push_back(target);
    Ok(())
}

/// Basic-block leaders: branch/switch targets, exception handler
/// starts, and the offsets following unconditional transfers.
fn collect_leaders(code: &[u8], handlers: &[HandlerInfo]) -> Result<BTreeSet<u16>> {
    let mut leaders = BTreeSet::new();
    leaders.insert(0u16);
    for h in handlers {
        leaders.insert(h.handler_pc);
    }
    let mut pc = 0usize;
    while pc < code.len() {
        let op = code[pc];
        let len = instruction_length(code, pc)?;
        match op {
            opcodes::IFEQ..=opcodes::GOTO | opcodes::IFNULL | opcodes::IFNONNULL => {
                leaders.insert(branch_target(code, pc));
                if op == opcodes::GOTO {
                    leaders.insert((pc + len) as u16);
                }
            }
            opcodes::GOTO_W => {
                let off = read_i32(code, pc + 1);
                leaders.insert((pc as i32 + off) as u16);
                leaders.insert((pc + len) as u16);
            }
            opcodes::TABLESWITCH | opcodes::LOOKUPSWITCH => {
                for t in switch_targets(code, pc)? {
                    leaders.insert(t);
                }
                leaders.insert((pc + len) as u16);
            }
            opcodes::IRETURN..=opcodes::RETURN | opcodes::ATHROW => {
                leaders.insert((pc + len) as u16);
            }
            _ => {}
        }
        pc += len;
    }
    Ok(leaders)
}

fn branch_target(code: &[u8], pc: usize) -> u16 {
    let off = i16::from_be_bytes([code[pc + 1], code[pc + 2]]) as i32;
    (pc as i32 + off) as u16
}

fn read_u16(code: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([code[at], code[at + 1]])
}

fn read_i32(code: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
}

fn switch_targets(code: &[u8], pc: usize) -> Result<Vec<u16>> {
    let pad = (4 - ((pc + 1) % 4)) % 4;
    let mut idx = pc + 1 + pad;
    let mut targets = Vec::new();
    let default_off = read_i32(code, idx);
    targets.push((pc as i32 + default_off) as u16);
    idx += 4;
    if code[pc] == opcodes::TABLESWITCH {
        let low = read_i32(code, idx);
        let high = read_i32(code, idx + 4);
        idx += 8;
        for _ in low..=high {
            targets.push((pc as i32 + read_i32(code, idx)) as u16);
            idx += 4;
        }
    } else {
        let npairs = read_i32(code, idx) as usize;
        idx += 4;
        for _ in 0..npairs {
            targets.push((pc as i32 + read_i32(code, idx + 4)) as u16);
            idx += 8;
        }
    }
    Ok(targets)
}

/// Byte length of the instruction at `pc`.
fn instruction_length(code: &[u8], pc: usize) -> Result<usize> {
    use opcodes::*;
    let op = code[pc];
    Ok(match op {
        BIPUSH | LDC | NEWARRAY | ILOAD | LLOAD | FLOAD | DLOAD | ALOAD | ISTORE | LSTORE
        | FSTORE | DSTORE | ASTORE => 2,
        SIPUSH | LDC_W | LDC2_W | IINC | GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD
        | INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST
        | INSTANCEOF | IFNULL | IFNONNULL => 3,
        IFEQ..=GOTO => 3,
        MULTIANEWARRAY => 4,
        INVOKEINTERFACE | GOTO_W => 5,
        WIDE => {
            if code[pc + 1] == IINC {
                6
            } else {
                4
            }
        }
        TABLESWITCH => {
            let pad = (4 - ((pc + 1) % 4)) % 4;
            let base = pc + 1 + pad;
            let low = read_i32(code, base + 4);
            let high = read_i32(code, base + 8);
            1 + pad + 12 + ((high - low + 1) as usize) * 4
        }
        LOOKUPSWITCH => {
            let pad = (4 - ((pc + 1) % 4)) % 4;
            let base = pc + 1 + pad;
            let npairs = read_i32(code, base + 4) as usize;
            1 + pad + 8 + npairs * 8
        }
        _ => 1,
    })
}

/// Entry-frame locals from the receiver and the method descriptor.
fn entry_state(
    is_static: bool,
    is_constructor: bool,
    class_name: &str,
    descriptor: &str,
    cp: &mut ConstantPool,
) -> Result<FrameState> {
    let mut locals = Vec::new();
    if !is_static {
        if is_constructor {
            locals.push(VerificationType::UninitializedThis);
        } else {
            locals.push(VerificationType::Object(cp.add_class(class_name)?));
        }
    }
    let (params, _) = super::descriptor::split_method_descriptor(descriptor);
    for p in &params {
        let vt = vt_of_descriptor(p, cp)?;
        let wide = vt.width() == 2;
        locals.push(vt);
        if wide {
            locals.push(VerificationType::Top);
        }
    }
    Ok(FrameState { locals, stack: Vec::new() })
}

/// Verification type for a field descriptor.
fn vt_of_descriptor(desc: &str, cp: &mut ConstantPool) -> Result<VerificationType> {
    Ok(match desc.as_bytes()[0] {
        b'Z' | b'B' | b'C' | b'S' | b'I' => VerificationType::Integer,
        b'J' => VerificationType::Long,
        b'F' => VerificationType::Float,
        b'D' => VerificationType::Double,
        b'L' => VerificationType::Object(cp.add_class(&desc[1..desc.len() - 1])?),
        b'[' => VerificationType::Object(cp.add_class(desc)?),
        other => {
            return Err(Error::backend(format!("bad descriptor start: {}", other as char)));
        }
    })
}

/// Element verification type of an array class name (`[I`, `[Lp/Q;`).
fn element_vt(array_name: &str, cp: &mut ConstantPool) -> Result<VerificationType> {
    vt_of_descriptor(&array_name[1..], cp)
}

fn set_local(locals: &mut Vec<VerificationType>, slot: usize, vt: VerificationType) {
    let wide = vt.width() == 2;
    let needed = slot + if wide { 2 } else { 1 };
    while locals.len() < needed {
        locals.push(VerificationType::Top);
    }
    // Storing over the second half of a category-2 value kills it.
    if slot > 0
        && matches!(locals[slot - 1], VerificationType::Long | VerificationType::Double)
    {
        locals[slot - 1] = VerificationType::Top;
    }
    locals[slot] = vt;
    if wide {
        locals[slot + 1] = VerificationType::Top;
    }
}

fn pop(stack: &mut Vec<VerificationType>, pc: usize) -> Result<VerificationType> {
    stack
        .pop()
        .ok_or_else(|| Error::backend(format!("stack underflow at pc {}", pc)))
}

/// Simulate one non-control-transfer instruction.
fn simulate(
    op: u8,
    code: &[u8],
    pc: usize,
    state: &mut FrameState,
    class_name: &str,
    cp: &mut ConstantPool,
) -> Result<()> {
    use opcodes::*;
    use VerificationType::*;
    match op {
        NOP => {}
        ACONST_NULL => state.stack.push(Null),
        ICONST_M1..=ICONST_5 | BIPUSH | SIPUSH => state.stack.push(Integer),
        LCONST_0 | LCONST_1 => state.stack.push(Long),
        FCONST_0..=FCONST_2 => state.stack.push(Float),
        DCONST_0 | DCONST_1 => state.stack.push(Double),
        LDC | LDC_W => {
            let idx = if op == LDC {
                code[pc + 1] as u16
            } else {
                read_u16(code, pc + 1)
            };
            let vt = match cp.get(idx) {
                Some(Constant::Integer(_)) => Integer,
                Some(Constant::Float(_)) => Float,
                Some(Constant::String(_)) => Object(cp.add_class("java/lang/String")?),
                Some(Constant::Class(_)) => Object(cp.add_class("java/lang/Class")?),
                other => {
                    return Err(Error::backend(format!("ldc of unsupported constant {:?}", other)))
                }
            };
            state.stack.push(vt);
        }
        LDC2_W => {
            let idx = read_u16(code, pc + 1);
            match cp.get(idx) {
                Some(Constant::Long(_)) => state.stack.push(Long),
                Some(Constant::Double(_)) => state.stack.push(Double),
                other => {
                    return Err(Error::backend(format!("ldc2_w of unsupported constant {:?}", other)))
                }
            }
        }
        ILOAD | LLOAD | FLOAD | DLOAD | ALOAD => {
            let slot = code[pc + 1] as usize;
            load_from_slot(op, slot, state, pc)?;
        }
        0x1a..=0x2d => {
            // iload_0 .. aload_3
            let rel = op - 0x1a;
            let slot = (rel % 4) as usize;
            let base = [ILOAD, LLOAD, FLOAD, DLOAD, ALOAD][(rel / 4) as usize];
            load_from_slot(base, slot, state, pc)?;
        }
        IALOAD | BALOAD | CALOAD | SALOAD => {
            pop(&mut state.stack, pc)?;
            pop(&mut state.stack, pc)?;
            state.stack.push(Integer);
        }
        LALOAD => {
            pop(&mut state.stack, pc)?;
            pop(&mut state.stack, pc)?;
            state.stack.push(Long);
        }
        FALOAD => {
            pop(&mut state.stack, pc)?;
            pop(&mut state.stack, pc)?;
            state.stack.push(Float);
        }
        DALOAD => {
            pop(&mut state.stack, pc)?;
            pop(&mut state.stack, pc)?;
            state.stack.push(Double);
        }
        AALOAD => {
            pop(&mut state.stack, pc)?;
            let arr = pop(&mut state.stack, pc)?;
            let elem = match arr {
                Object(idx) => {
                    let name = cp
                        .class_name_at(idx)
                        .ok_or_else(|| Error::backend("aaload owner not a class"))?
                        .to_string();
                    element_vt(&name, cp)?
                }
                Null => Null,
                other => {
                    return Err(Error::backend(format!("aaload on non-array {:?}", other)))
                }
            };
            state.stack.push(elem);
        }
        ISTORE | LSTORE | FSTORE | DSTORE | ASTORE => {
            let slot = code[pc + 1] as usize;
            let v = pop(&mut state.stack, pc)?;
            set_local(&mut state.locals, slot, v);
        }
        0x3b..=0x4e => {
            // istore_0 .. astore_3
            let rel = op - 0x3b;
            let slot = (rel % 4) as usize;
            let v = pop(&mut state.stack, pc)?;
            set_local(&mut state.locals, slot, v);
        }
        IASTORE..=SASTORE => {
            pop(&mut state.stack, pc)?;
            pop(&mut state.stack, pc)?;
            pop(&mut state.stack, pc)?;
        }
        POP => {
            pop(&mut state.stack, pc)?;
        }
        POP2 => {
            let v = pop(&mut state.stack, pc)?;
            if v.width() == 1 {
                pop(&mut state.stack, pc)?;
            }
        }
        DUP => {
            let v = pop(&mut state.stack, pc)?;
            state.stack.push(v.clone());
            state.stack.push(v);
        }
        DUP_X1 => {
            let v1 = pop(&mut state.stack, pc)?;
            let v2 = pop(&mut state.stack, pc)?;
            state.stack.push(v1.clone());
            state.stack.push(v2);
            state.stack.push(v1);
        }
        DUP_X2 => {
            let v1 = pop(&mut state.stack, pc)?;
            let v2 = pop(&mut state.stack, pc)?;
            if v2.width() == 2 {
                state.stack.push(v1.clone());
                state.stack.push(v2);
                state.stack.push(v1);
            } else {
                let v3 = pop(&mut state.stack, pc)?;
                state.stack.push(v1.clone());
                state.stack.push(v3);
                state.stack.push(v2);
                state.stack.push(v1);
            }
        }
        DUP2 => {
            let v1 = pop(&mut state.stack, pc)?;
            if v1.width() == 2 {
                state.stack.push(v1.clone());
                state.stack.push(v1);
            } else {
                let v2 = pop(&mut state.stack, pc)?;
                state.stack.push(v2.clone());
                state.stack.push(v1.clone());
                state.stack.push(v2);
                state.stack.push(v1);
            }
        }
        DUP2_X1 => {
            let v1 = pop(&mut state.stack, pc)?;
            if v1.width() == 2 {
                let v2 = pop(&mut state.stack, pc)?;
                state.stack.push(v1.clone());
                state.stack.push(v2);
                state.stack.push(v1);
            } else {
                let v2 = pop(&mut state.stack, pc)?;
                let v3 = pop(&mut state.stack, pc)?;
                state.stack.push(v2.clone());
                state.stack.push(v1.clone());
                state.stack.push(v3);
                state.stack.push(v2);
                state.stack.push(v1);
            }
        }
        DUP2_X2 => {
            let v1 = pop(&mut state.stack, pc)?;
            if v1.width() == 2 {
                let v2 = pop(&mut state.stack, pc)?;
                if v2.width() == 2 {
                    state.stack.push(v1.clone());
                    state.stack.push(v2);
                    state.stack.push(v1);
                } else {
                    let v3 = pop(&mut state.stack, pc)?;
                    state.stack.push(v1.clone());
                    state.stack.push(v3);
                    state.stack.push(v2);
                    state.stack.push(v1);
                }
            } else {
                let v2 = pop(&mut state.stack, pc)?;
                let v3 = pop(&mut state.stack, pc)?;
                if v3.width() == 2 {
                    state.stack.push(v2.clone());
                    state.stack.push(v1.clone());
                    state.stack.push(v3);
                    state.stack.push(v2);
                    state.stack.push(v1);
                } else {
                    let v4 = pop(&mut state.stack, pc)?;
                    state.stack.push(v2.clone());
                    state.stack.push(v1.clone());
                    state.stack.push(v4);
                    state.stack.push(v3);
                    state.stack.push(v2);
                    state.stack.push(v1);
                }
            }
        }
        SWAP => {
            let v1 = pop(&mut state.stack, pc)?;
            let v2 = pop(&mut state.stack, pc)?;
            state.stack.push(v1);
            state.stack.push(v2);
        }
        IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IUSHR | IAND | IOR | IXOR => {
            pop(&mut state.stack, pc)?;
            pop(&mut state.stack, pc)?;
            state.stack.push(Integer);
        }
        LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR => {
            pop(&mut state.stack, pc)?;
            pop(&mut state.stack, pc)?;
            state.stack.push(Long);
        }
        LSHL | LSHR | LUSHR => {
            pop(&mut state.stack, pc)?; // shift amount (int)
        }
        FADD | FSUB | FMUL | FDIV | FREM => {
            pop(&mut state.stack, pc)?;
            pop(&mut state.stack, pc)?;
            state.stack.push(Float);
        }
        DADD | DSUB | DMUL | DDIV | DREM => {
            pop(&mut state.stack, pc)?;
            pop(&mut state.stack, pc)?;
            state.stack.push(Double);
        }
        INEG | LNEG | FNEG | DNEG => {}
        IINC => {}
        I2L | F2L | D2L => {
            pop(&mut state.stack, pc)?;
            state.stack.push(Long);
        }
        I2F | L2F | D2F => {
            pop(&mut state.stack, pc)?;
            state.stack.push(Float);
        }
        I2D | L2D | F2D => {
            pop(&mut state.stack, pc)?;
            state.stack.push(Double);
        }
        L2I | F2I | D2I | I2B | I2C | I2S => {
            pop(&mut state.stack, pc)?;
            state.stack.push(Integer);
        }
        LCMP | FCMPL | FCMPG | DCMPL | DCMPG => {
            pop(&mut state.stack, pc)?;
            pop(&mut state.stack, pc)?;
            state.stack.push(Integer);
        }
        IFEQ..=IFLE | IFNULL | IFNONNULL => {
            pop(&mut state.stack, pc)?;
        }
        IF_ICMPEQ..=IF_ACMPNE => {
            pop(&mut state.stack, pc)?;
            pop(&mut state.stack, pc)?;
        }
        TABLESWITCH | LOOKUPSWITCH => {
            pop(&mut state.stack, pc)?;
        }
        GETSTATIC => {
            let (_, _, desc) = member_parts(cp, read_u16(code, pc + 1))?;
            let vt = vt_of_descriptor(&desc, cp)?;
            state.stack.push(vt);
        }
        PUTSTATIC => {
            pop(&mut state.stack, pc)?;
        }
        GETFIELD => {
            let (_, _, desc) = member_parts(cp, read_u16(code, pc + 1))?;
            pop(&mut state.stack, pc)?;
            let vt = vt_of_descriptor(&desc, cp)?;
            state.stack.push(vt);
        }
        PUTFIELD => {
            pop(&mut state.stack, pc)?;
            pop(&mut state.stack, pc)?;
        }
        INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE => {
            let (_, name, desc) = member_parts(cp, read_u16(code, pc + 1))?;
            let (params, ret) = super::descriptor::split_method_descriptor(&desc);
            for _ in 0..params.len() {
                pop(&mut state.stack, pc)?;
            }
            if op != INVOKESTATIC {
                let recv = pop(&mut state.stack, pc)?;
                if op == INVOKESPECIAL && name == "<init>" {
                    initialize(state, &recv, class_name, code, cp)?;
                }
            }
            if ret != "V" {
                let vt = vt_of_descriptor(&ret, cp)?;
                state.stack.push(vt);
            }
        }
        NEW => {
            state.stack.push(Uninitialized(pc as u16));
        }
        NEWARRAY => {
            pop(&mut state.stack, pc)?;
            let name = match code[pc + 1] {
                array_type::T_BOOLEAN => "[Z",
                array_type::T_CHAR => "[C",
                array_type::T_FLOAT => "[F",
                array_type::T_DOUBLE => "[D",
                array_type::T_BYTE => "[B",
                array_type::T_SHORT => "[S",
                array_type::T_INT => "[I",
                array_type::T_LONG => "[J",
                tag => return Err(Error::backend(format!("bad newarray tag {}", tag))),
            };
            let idx = cp.add_class(name)?;
            state.stack.push(Object(idx));
        }
        ANEWARRAY => {
            pop(&mut state.stack, pc)?;
            let elem = cp
                .class_name_at(read_u16(code, pc + 1))
                .ok_or_else(|| Error::backend("anewarray of non-class"))?
                .to_string();
            let name = if elem.starts_with('[') {
                format!("[{}", elem)
            } else {
                format!("[L{};", elem)
            };
            let idx = cp.add_class(&name)?;
            state.stack.push(Object(idx));
        }
        ARRAYLENGTH => {
            pop(&mut state.stack, pc)?;
            state.stack.push(Integer);
        }
        CHECKCAST => {
            pop(&mut state.stack, pc)?;
            state.stack.push(Object(read_u16(code, pc + 1)));
        }
        INSTANCEOF => {
            pop(&mut state.stack, pc)?;
            state.stack.push(Integer);
        }
        MULTIANEWARRAY => {
            let dims = code[pc + 3] as usize;
            for _ in 0..dims {
                pop(&mut state.stack, pc)?;
            }
            state.stack.push(Object(read_u16(code, pc + 1)));
        }
        WIDE => {
            let inner = code[pc + 1];
            let slot = read_u16(code, pc + 2) as usize;
            match inner {
                ILOAD | LLOAD | FLOAD | DLOAD | ALOAD => load_from_slot(inner, slot, state, pc)?,
                ISTORE | LSTORE | FSTORE | DSTORE | ASTORE => {
                    let v = pop(&mut state.stack, pc)?;
                    set_local(&mut state.locals, slot, v);
                }
                IINC => {}
                other => {
                    return Err(Error::backend(format!("wide of unsupported opcode {:#x}", other)))
                }
            }
        }
        other => {
            return Err(Error::backend(format!(
                "unsupported opcode {:#x} at pc {}",
                other, pc
            )));
        }
    }
    Ok(())
}

fn load_from_slot(base_op: u8, slot: usize, state: &mut FrameState, pc: usize) -> Result<()> {
    use VerificationType::*;
    let vt = match base_op {
        opcodes::ILOAD => Integer,
        opcodes::LLOAD => Long,
        opcodes::FLOAD => Float,
        opcodes::DLOAD => Double,
        _ => state
            .locals
            .get(slot)
            .cloned()
            .ok_or_else(|| Error::backend(format!("aload of unset slot {} at pc {}", slot, pc)))?,
    };
    state.stack.push(vt);
    Ok(())
}

/// Constructor call on an uninitialized reference: every copy of that
/// reference (stack and locals) becomes the initialized class.
/// `UninitializedThis` initializes to the class being emitted; a NEW
/// result initializes to the class named by the NEW operand.
fn initialize(
    state: &mut FrameState,
    recv: &VerificationType,
    class_name: &str,
    code: &[u8],
    cp: &mut ConstantPool,
) -> Result<()> {
    use VerificationType::*;
    let replacement = match recv {
        UninitializedThis => Object(cp.add_class(class_name)?),
        Uninitialized(new_pc) => {
            // The NEW instruction's operand names the created class.
            let class_idx = read_u16(code, *new_pc as usize + 1);
            Object(class_idx)
        }
        // Already-initialized receiver (e.g. super() on a plain object
        // reference never happens; <init> via invokespecial on an
        // initialized value is a chained constructor on `this`).
        _ => return Ok(()),
    };
    for t in state.stack.iter_mut().chain(state.locals.iter_mut()) {
        if t == recv {
            *t = replacement.clone();
        }
    }
    Ok(())
}

fn member_parts(cp: &ConstantPool, idx: u16) -> Result<(String, String, String)> {
    cp.member_at(idx)
        .map(|(o, n, d)| (o.to_string(), n.to_string(), d.to_string()))
        .ok_or_else(|| Error::backend(format!("constant {} is not a member ref", idx)))
}

/// Collapse slot-indexed locals into frame form: a category-2 entry
/// swallows its trailing Top, and trailing Tops are trimmed.
fn compress_locals(locals: &[VerificationType]) -> Vec<VerificationType> {
    use VerificationType::*;
    let mut out = Vec::new();
    let mut i = 0;
    while i < locals.len() {
        let t = locals[i].clone();
        let wide = matches!(t, Long | Double);
        out.push(t);
        i += if wide { 2 } else { 1 };
    }
    while matches!(out.last(), Some(Top)) {
        out.pop();
    }
    out
}

fn compress_stack(stack: &[VerificationType]) -> Vec<VerificationType> {
    stack.to_vec()
}

/// Choose the most compact frame encoding relative to the previous
/// frame's locals.
fn compress_frame(
    offset_delta: u16,
    prev_locals: &[VerificationType],
    locals: &[VerificationType],
    stack: &[VerificationType],
) -> StackMapFrame {
    let same_locals = prev_locals == locals;
    if stack.is_empty() && same_locals {
        return StackMapFrame::Same { offset_delta };
    }
    if stack.len() == 1 && same_locals {
        return StackMapFrame::SameLocals1StackItem { offset_delta, stack: stack[0].clone() };
    }
    if stack.is_empty() && locals.len() > prev_locals.len() {
        let extra = locals.len() - prev_locals.len();
        if extra <= 3 && locals[..prev_locals.len()] == *prev_locals {
            return StackMapFrame::Append {
                k: extra as u8,
                offset_delta,
                locals: locals[prev_locals.len()..].to_vec(),
            };
        }
    }
    if stack.is_empty() && locals.len() < prev_locals.len() {
        let chopped = prev_locals.len() - locals.len();
        if chopped <= 3 && prev_locals[..locals.len()] == *locals {
            return StackMapFrame::Chop { k: chopped as u8, offset_delta };
        }
    }
    StackMapFrame::Full {
        offset_delta,
        locals: locals.to_vec(),
        stack: stack.to_vec(),
    }
}
