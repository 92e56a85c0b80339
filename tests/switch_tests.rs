//! Switch lowering: density selection, guards, the string-switch shape.

mod common;

use classgen::ast::*;
use classgen::codegen::opcodes;
use common::*;

fn assign(slot: u16, value: Expr) -> Expr {
    stmt(ExprKind::Assign { slot, value: Box::new(value) }, Type::Int)
}

fn int_switch(keysets: &[&[i32]], guards: Option<Vec<Option<Expr>>>) -> Expr {
    let mut guards = guards.unwrap_or_else(|| keysets.iter().map(|_| None).collect());
    let clauses = keysets
        .iter()
        .enumerate()
        .map(|(i, keys)| SwitchClause {
            keys: keys.to_vec(),
            guard: guards[i].take(),
            body: assign(1, int_lit((i as i64 + 1) * 10)),
        })
        .collect();
    stmt(
        ExprKind::Switch {
            test: Box::new(load(0, Type::Int)),
            clauses,
            default: Some(Box::new(assign(1, int_lit(-1)))),
        },
        Type::Void,
    )
}

fn switch_method(sw: Expr) -> ClassNode {
    let body = seq(vec![
        assign(1, int_lit(0)),
        sw,
        ret(load(1, Type::Int)),
    ]);
    simple_class("p/Sw", vec![static_method("f", &[Type::Int], Type::Int, body)])
}

/// Locate the switch opcode and decode its header.
fn decode_switch(code: &[u8]) -> (u8, usize) {
    let pc = code
        .iter()
        .position(|&b| b == opcodes::TABLESWITCH || b == opcodes::LOOKUPSWITCH)
        .expect("no switch instruction");
    (code[pc], pc)
}

fn read_i32(code: &[u8], at: usize) -> i32 {
    i32::from_be_bytes(code[at..at + 4].try_into().unwrap())
}

/// S5: contiguous keys 1..=5 select TABLESWITCH with min=1, max=5.
#[test]
fn contiguous_keys_select_tableswitch() {
    let class = switch_method(int_switch(&[&[1], &[2], &[3], &[4], &[5]], None));
    let raw = parse_class(&emit(&class));
    let code = &raw.code("f").bytes;
    let (op, pc) = decode_switch(code);
    assert_eq!(op, opcodes::TABLESWITCH);
    let pad = (4 - ((pc + 1) % 4)) % 4;
    let base = pc + 1 + pad;
    assert_eq!(read_i32(code, base + 4), 1, "low");
    assert_eq!(read_i32(code, base + 8), 5, "high");
}

#[test]
fn sparse_keys_select_lookupswitch_with_sorted_keys() {
    let class = switch_method(int_switch(&[&[100], &[1], &[5]], None));
    let raw = parse_class(&emit(&class));
    let code = &raw.code("f").bytes;
    let (op, pc) = decode_switch(code);
    assert_eq!(op, opcodes::LOOKUPSWITCH);
    let pad = (4 - ((pc + 1) % 4)) % 4;
    let base = pc + 1 + pad;
    assert_eq!(read_i32(code, base + 4), 3, "npairs");
    let keys: Vec<i32> = (0..3).map(|i| read_i32(code, base + 8 + i * 8)).collect();
    assert_eq!(keys, vec![1, 5, 100], "keys are sorted");
}

#[test]
fn multiple_keys_in_one_clause_share_a_target() {
    let class = switch_method(int_switch(&[&[1, 2, 3]], None));
    let raw = parse_class(&emit(&class));
    let code = &raw.code("f").bytes;
    let (op, pc) = decode_switch(code);
    assert_eq!(op, opcodes::TABLESWITCH);
    let pad = (4 - ((pc + 1) % 4)) % 4;
    let base = pc + 1 + pad;
    let t1 = read_i32(code, base + 12);
    let t2 = read_i32(code, base + 16);
    let t3 = read_i32(code, base + 20);
    assert_eq!(t1, t2);
    assert_eq!(t2, t3);
}

#[test]
fn guard_failure_falls_to_the_default() {
    let obj = Type::reference("java/lang/Object");
    let guard = exp(
        ExprKind::Invoke {
            method: MethodRef {
                owner: obj.clone(),
                name: "check".to_string(),
                params: vec![],
                ret: Type::Boolean,
                is_static: true,
                is_interface: false,
                is_private: false,
                via_super: false,
            },
            target: None,
            args: vec![],
        },
        Type::Boolean,
    );
    let class = switch_method(int_switch(&[&[1]], Some(vec![Some(guard)])));
    let raw = parse_class(&emit(&class));
    let code = &raw.code("f").bytes;
    // the guard value is tested with IFEQ against the default label
    let invoke_pc = code.iter().position(|&b| b == opcodes::INVOKESTATIC).unwrap();
    assert_eq!(code[invoke_pc + 3], opcodes::IFEQ);
}

/// S4: a string switch arrives rewritten as a hashCode switch with
/// equality guards. "a"/"b"/"c" hash to the contiguous 97..99.
#[test]
fn string_switch_shape() {
    let string = Type::reference("java/lang/String");
    let hash = exp(
        ExprKind::Invoke {
            method: MethodRef {
                owner: string.clone(),
                name: "hashCode".to_string(),
                params: vec![],
                ret: Type::Int,
                is_static: false,
                is_interface: false,
                is_private: false,
                via_super: false,
            },
            target: Some(Box::new(load(0, string.clone()))),
            args: vec![],
        },
        Type::Int,
    );
    let equals_guard = |key: &str| {
        exp(
            ExprKind::Invoke {
                method: MethodRef {
                    owner: string.clone(),
                    name: "equals".to_string(),
                    params: vec![Type::reference("java/lang/Object")],
                    ret: Type::Boolean,
                    is_static: false,
                    is_interface: false,
                    is_private: false,
                    via_super: false,
                },
                target: Some(Box::new(load(0, string.clone()))),
                args: vec![str_lit(key)],
            },
            Type::Boolean,
        )
    };
    let clauses = vec![
        SwitchClause { keys: vec!['a' as i32], guard: Some(equals_guard("a")), body: assign(1, int_lit(1)) },
        SwitchClause { keys: vec!['b' as i32], guard: Some(equals_guard("b")), body: assign(1, int_lit(2)) },
        SwitchClause { keys: vec!['c' as i32], guard: Some(equals_guard("c")), body: assign(1, int_lit(3)) },
    ];
    let sw = stmt(
        ExprKind::Switch { test: Box::new(hash), clauses, default: Some(Box::new(assign(1, int_lit(0)))) },
        Type::Void,
    );
    let body = seq(vec![assign(1, int_lit(0)), sw, ret(load(1, Type::Int))]);
    let class = simple_class("p/StrSw", vec![static_method("f", &[string], Type::Int, body)]);
    let raw = parse_class(&emit(&class));
    let code = &raw.code("f").bytes;
    let (op, _) = decode_switch(code);
    assert_eq!(op, opcodes::TABLESWITCH, "contiguous hash keys densify");
    assert!(raw.has_utf8("hashCode"));
    assert!(raw.has_utf8("equals"));
    assert!(code.iter().filter(|&&b| b == opcodes::IFEQ).count() >= 3, "one guard per clause");
}

#[test]
fn switch_without_default_falls_through_to_the_end() {
    let sw = stmt(
        ExprKind::Switch {
            test: Box::new(load(0, Type::Int)),
            clauses: vec![SwitchClause { keys: vec![7], guard: None, body: assign(1, int_lit(1)) }],
            default: None,
        },
        Type::Void,
    );
    let body = seq(vec![assign(1, int_lit(0)), sw, ret(load(1, Type::Int))]);
    let class = simple_class("p/NoDef", vec![static_method("f", &[Type::Int], Type::Int, body)]);
    let raw = parse_class(&emit(&class));
    assert_eq!(*raw.code("f").bytes.last().unwrap(), opcodes::IRETURN);
}
