//! Static instruction tables: (operand type × operator) → opcode.
//!
//! These mappings are pure; everything that needs the constant pool or
//! the code buffer lives in the method writer.

use super::opcodes::{self, array_type};
use crate::ast::{BinOp, CmpOp, Type};

/// Type-specialized load opcode (`ILOAD` family).
pub fn load_op(ty: &Type) -> u8 {
    match ty {
        Type::Long => opcodes::LLOAD,
        Type::Float => opcodes::FLOAD,
        Type::Double => opcodes::DLOAD,
        Type::Reference(_) | Type::Array { .. } => opcodes::ALOAD,
        _ => opcodes::ILOAD,
    }
}

/// Type-specialized store opcode (`ISTORE` family).
pub fn store_op(ty: &Type) -> u8 {
    match ty {
        Type::Long => opcodes::LSTORE,
        Type::Float => opcodes::FSTORE,
        Type::Double => opcodes::DSTORE,
        Type::Reference(_) | Type::Array { .. } => opcodes::ASTORE,
        _ => opcodes::ISTORE,
    }
}

/// Type-specialized return opcode (`IRETURN` family; `RETURN` for void).
pub fn return_op(ty: &Type) -> u8 {
    match ty {
        Type::Void => opcodes::RETURN,
        Type::Long => opcodes::LRETURN,
        Type::Float => opcodes::FRETURN,
        Type::Double => opcodes::DRETURN,
        Type::Reference(_) | Type::Array { .. } => opcodes::ARETURN,
        _ => opcodes::IRETURN,
    }
}

/// Array element load opcode (`IALOAD` family).
pub fn array_load_op(elem: &Type) -> u8 {
    match elem {
        Type::Boolean | Type::Byte => opcodes::BALOAD,
        Type::Char => opcodes::CALOAD,
        Type::Short => opcodes::SALOAD,
        Type::Long => opcodes::LALOAD,
        Type::Float => opcodes::FALOAD,
        Type::Double => opcodes::DALOAD,
        Type::Reference(_) | Type::Array { .. } => opcodes::AALOAD,
        _ => opcodes::IALOAD,
    }
}

/// Array element store opcode (`IASTORE` family).
pub fn array_store_op(elem: &Type) -> u8 {
    match elem {
        Type::Boolean | Type::Byte => opcodes::BASTORE,
        Type::Char => opcodes::CASTORE,
        Type::Short => opcodes::SASTORE,
        Type::Long => opcodes::LASTORE,
        Type::Float => opcodes::FASTORE,
        Type::Double => opcodes::DASTORE,
        Type::Reference(_) | Type::Array { .. } => opcodes::AASTORE,
        _ => opcodes::IASTORE,
    }
}

/// NEWARRAY element tag for a primitive type.
pub fn newarray_tag(elem: &Type) -> Option<u8> {
    Some(match elem {
        Type::Boolean => array_type::T_BOOLEAN,
        Type::Char => array_type::T_CHAR,
        Type::Float => array_type::T_FLOAT,
        Type::Double => array_type::T_DOUBLE,
        Type::Byte => array_type::T_BYTE,
        Type::Short => array_type::T_SHORT,
        Type::Int => array_type::T_INT,
        Type::Long => array_type::T_LONG,
        _ => return None,
    })
}

/// Arithmetic / bitwise / shift opcode for an operand type. Bitwise and
/// shift operators exist only for the int and long families.
pub fn binary_op(op: BinOp, ty: &Type) -> Option<u8> {
    let table: [u8; 4] = match op {
        BinOp::Add => [opcodes::IADD, opcodes::LADD, opcodes::FADD, opcodes::DADD],
        BinOp::Sub => [opcodes::ISUB, opcodes::LSUB, opcodes::FSUB, opcodes::DSUB],
        BinOp::Mul => [opcodes::IMUL, opcodes::LMUL, opcodes::FMUL, opcodes::DMUL],
        BinOp::Div => [opcodes::IDIV, opcodes::LDIV, opcodes::FDIV, opcodes::DDIV],
        BinOp::Rem => [opcodes::IREM, opcodes::LREM, opcodes::FREM, opcodes::DREM],
        BinOp::And => [opcodes::IAND, opcodes::LAND, 0, 0],
        BinOp::Or => [opcodes::IOR, opcodes::LOR, 0, 0],
        BinOp::Xor => [opcodes::IXOR, opcodes::LXOR, 0, 0],
        BinOp::Shl => [opcodes::ISHL, opcodes::LSHL, 0, 0],
        BinOp::Shr => [opcodes::ISHR, opcodes::LSHR, 0, 0],
        BinOp::Ushr => [opcodes::IUSHR, opcodes::LUSHR, 0, 0],
    };
    let opcode = match ty {
        Type::Long => table[1],
        Type::Float => table[2],
        Type::Double => table[3],
        t if t.is_int_like() => table[0],
        _ => 0,
    };
    if opcode == 0 { None } else { Some(opcode) }
}

/// Negation opcode for an operand type.
pub fn neg_op(ty: &Type) -> Option<u8> {
    Some(match ty {
        Type::Long => opcodes::LNEG,
        Type::Float => opcodes::FNEG,
        Type::Double => opcodes::DNEG,
        t if t.is_int_like() => opcodes::INEG,
        _ => return None,
    })
}

/// Widening primitive conversion opcode. `None` when the stack
/// representation does not change (e.g. byte → int).
pub fn widen_op(from: &Type, to: &Type) -> Option<u8> {
    match (from, to) {
        (f, Type::Long) if f.is_int_like() => Some(opcodes::I2L),
        (f, Type::Float) if f.is_int_like() => Some(opcodes::I2F),
        (f, Type::Double) if f.is_int_like() => Some(opcodes::I2D),
        (Type::Long, Type::Float) => Some(opcodes::L2F),
        (Type::Long, Type::Double) => Some(opcodes::L2D),
        (Type::Float, Type::Double) => Some(opcodes::F2D),
        _ => None,
    }
}

/// Narrowing primitive conversion opcode sequence. Narrowing to byte,
/// char, or short passes through int first when the source is wider
/// than int.
pub fn narrow_ops(from: &Type, to: &Type) -> Vec<u8> {
    let to_int: Option<u8> = match from {
        Type::Long => Some(opcodes::L2I),
        Type::Float => Some(opcodes::F2I),
        Type::Double => Some(opcodes::D2I),
        _ => None,
    };
    match to {
        Type::Byte => to_int.into_iter().chain([opcodes::I2B]).collect(),
        Type::Char => to_int.into_iter().chain([opcodes::I2C]).collect(),
        Type::Short => to_int.into_iter().chain([opcodes::I2S]).collect(),
        Type::Int | Type::Boolean => to_int.into_iter().collect(),
        Type::Long => match from {
            Type::Float => vec![opcodes::F2L],
            Type::Double => vec![opcodes::D2L],
            _ => vec![],
        },
        Type::Float => match from {
            Type::Double => vec![opcodes::D2F],
            _ => vec![],
        },
        _ => vec![],
    }
}

/// Zero/null comparison branch opcode (`IFEQ` family).
pub fn if_op(rel: CmpOp) -> u8 {
    match rel {
        CmpOp::Eq => opcodes::IFEQ,
        CmpOp::Ne => opcodes::IFNE,
        CmpOp::Lt => opcodes::IFLT,
        CmpOp::Ge => opcodes::IFGE,
        CmpOp::Gt => opcodes::IFGT,
        CmpOp::Le => opcodes::IFLE,
    }
}

/// Two-int comparison branch opcode (`IF_ICMP*` family).
pub fn if_icmp_op(rel: CmpOp) -> u8 {
    match rel {
        CmpOp::Eq => opcodes::IF_ICMPEQ,
        CmpOp::Ne => opcodes::IF_ICMPNE,
        CmpOp::Lt => opcodes::IF_ICMPLT,
        CmpOp::Ge => opcodes::IF_ICMPGE,
        CmpOp::Gt => opcodes::IF_ICMPGT,
        CmpOp::Le => opcodes::IF_ICMPLE,
    }
}

/// Complement of a comparison relation. Branching on the negated
/// relation jumps exactly when the original condition is false.
pub fn negate_cmp(rel: CmpOp) -> CmpOp {
    match rel {
        CmpOp::Eq => CmpOp::Ne,
        CmpOp::Ne => CmpOp::Eq,
        CmpOp::Lt => CmpOp::Ge,
        CmpOp::Ge => CmpOp::Lt,
        CmpOp::Gt => CmpOp::Le,
        CmpOp::Le => CmpOp::Gt,
    }
}

/// Floating comparison opcode. `<` and `<=` use the G variant so NaN
/// drives the comparison false; `>`, `>=`, and the equality forms use
/// the L variant. Keyed on the un-negated relation.
pub fn fp_cmp_op(rel: CmpOp, double: bool) -> u8 {
    let greater = matches!(rel, CmpOp::Lt | CmpOp::Le);
    match (double, greater) {
        (false, true) => opcodes::FCMPG,
        (false, false) => opcodes::FCMPL,
        (true, true) => opcodes::DCMPG,
        (true, false) => opcodes::DCMPL,
    }
}
