//! Structured exception handling: catch tables, finally inlining,
//! handler ordering.

mod common;

use classgen::ast::*;
use classgen::codegen::opcodes;
use common::*;

fn catch_clause(ty: Option<&str>, slot: u16, body: Expr) -> CatchClause {
    CatchClause {
        ty: ty.map(Type::reference),
        name: "e".to_string(),
        slot,
        body,
    }
}

#[test]
fn try_catch_registers_one_row_and_bridges_to_the_end() {
    let try_expr = ret(Expr::new(
        ExprKind::Try {
            body: Box::new(int_lit(1)),
            catches: vec![catch_clause(Some("java/lang/Exception"), 0, int_lit(0))],
            finally: None,
        },
        Type::Int,
        Ctx::EXPRESSION,
    ));
    let class = simple_class("p/TC", vec![static_method("f", &[], Type::Int, try_expr)]);
    let raw = parse_class(&emit(&class));
    let code = raw.code("f");
    assert_eq!(
        code.bytes,
        vec![
            opcodes::ICONST_1,
            opcodes::GOTO, 0, 5,
            0x4b, // astore_0
            opcodes::ICONST_0,
            opcodes::IRETURN,
        ]
    );
    assert_eq!(code.exceptions.len(), 1);
    let (start, end, handler, catch_type) = code.exceptions[0];
    assert_eq!((start, end, handler), (0, 1, 4));
    assert_eq!(raw.class_name(catch_type), "java/lang/Exception");
    assert!(code.attr_names.iter().any(|n| n == "StackMapTable"));
}

/// S3: `try { return 1; } finally { return 2; }` — the finally body is
/// inlined on the normal path and its return wins.
#[test]
fn finally_return_wins() {
    let try_expr = ret(Expr::new(
        ExprKind::Try {
            body: Box::new(int_lit(1)),
            catches: vec![],
            finally: Some(Box::new(ret(int_lit(2)))),
        },
        Type::Int,
        Ctx::EXPRESSION,
    ));
    let class = simple_class("p/S3", vec![static_method("g", &[], Type::Int, try_expr)]);
    let raw = parse_class(&emit(&class));
    let code = raw.code("g");
    // normal path: value, then the inlined finally returns 2
    assert_eq!(code.bytes[0], opcodes::ICONST_1);
    assert_eq!(code.bytes[1], opcodes::ICONST_2);
    assert_eq!(code.bytes[2], opcodes::IRETURN);
    // default handler: finally again, then rethrow
    assert_eq!(code.bytes[3], opcodes::ICONST_2);
    assert_eq!(code.bytes[4], opcodes::IRETURN);
    assert_eq!(code.bytes[5], opcodes::ATHROW);
    // catch-all row covering the body
    assert_eq!(code.exceptions.len(), 1);
    let (start, end, handler, catch_type) = code.exceptions[0];
    assert_eq!((start, end, handler), (0, 1, 3));
    assert_eq!(catch_type, 0, "finally rows catch everything");
}

#[test]
fn catch_rows_precede_finally_rows_in_source_order() {
    let incr = stmt(ExprKind::Incr { slot: 1, by: 1 }, Type::Int);
    let try_expr = ret(Expr::new(
        ExprKind::Try {
            body: Box::new(int_lit(1)),
            catches: vec![catch_clause(Some("java/lang/Exception"), 0, int_lit(2))],
            finally: Some(Box::new(incr)),
        },
        Type::Int,
        Ctx::EXPRESSION,
    ));
    let class = simple_class("p/Rows", vec![static_method("f", &[], Type::Int, try_expr)]);
    let raw = parse_class(&emit(&class));
    let code = raw.code("f");
    assert_eq!(code.exceptions.len(), 3);
    // catch row first
    assert_eq!(raw.class_name(code.exceptions[0].3), "java/lang/Exception");
    // then body → default handler, then catch range → default handler
    assert_eq!(code.exceptions[1].3, 0);
    assert_eq!(code.exceptions[2].3, 0);
    let (body_start, body_end, _, _) = code.exceptions[0];
    assert_eq!((code.exceptions[1].0, code.exceptions[1].1), (body_start, body_end));
    let handler = code.exceptions[0].2;
    assert_eq!(code.exceptions[2].0, handler, "finally guards the catch body too");
}

#[test]
fn finally_is_inlined_into_every_exit_path() {
    // finally { v1 += 1 } shows up once per path: normal, catch, rethrow
    let fin = stmt(ExprKind::Incr { slot: 1, by: 1 }, Type::Int);
    let try_expr = ret(Expr::new(
        ExprKind::Try {
            body: Box::new(int_lit(1)),
            catches: vec![catch_clause(Some("java/lang/Exception"), 0, int_lit(2))],
            finally: Some(Box::new(fin)),
        },
        Type::Int,
        Ctx::EXPRESSION,
    ));
    let class = simple_class("p/Inl", vec![static_method("f", &[], Type::Int, try_expr)]);
    let raw = parse_class(&emit(&class));
    let code = &raw.code("f").bytes;
    let iincs = code
        .iter()
        .enumerate()
        .filter(|&(i, &b)| b == opcodes::IINC && code.get(i + 1) == Some(&1))
        .count();
    assert_eq!(iincs, 3, "normal, catch, and default-handler copies");
    assert_eq!(*code.last().unwrap(), opcodes::IRETURN);
    assert!(code.contains(&opcodes::ATHROW));
}

#[test]
fn multiple_catches_emit_rows_in_source_order() {
    let try_expr = ret(Expr::new(
        ExprKind::Try {
            body: Box::new(int_lit(1)),
            catches: vec![
                catch_clause(Some("java/lang/IllegalStateException"), 0, int_lit(2)),
                catch_clause(Some("java/lang/Exception"), 0, int_lit(3)),
            ],
            finally: None,
        },
        Type::Int,
        Ctx::EXPRESSION,
    ));
    let class = simple_class("p/Multi", vec![static_method("f", &[], Type::Int, try_expr)]);
    let raw = parse_class(&emit(&class));
    let code = raw.code("f");
    assert_eq!(code.exceptions.len(), 2);
    assert_eq!(raw.class_name(code.exceptions[0].3), "java/lang/IllegalStateException");
    assert_eq!(raw.class_name(code.exceptions[1].3), "java/lang/Exception");
    // both rows protect the same body span
    assert_eq!(
        (code.exceptions[0].0, code.exceptions[0].1),
        (code.exceptions[1].0, code.exceptions[1].1)
    );
    assert!(code.exceptions[0].2 < code.exceptions[1].2, "handlers laid out in order");
}

#[test]
fn untyped_catch_stores_a_throwable() {
    let try_expr = ret(Expr::new(
        ExprKind::Try {
            body: Box::new(int_lit(1)),
            catches: vec![catch_clause(None, 0, int_lit(0))],
            finally: None,
        },
        Type::Int,
        Ctx::EXPRESSION,
    ));
    let class = simple_class("p/CatchAll", vec![static_method("f", &[], Type::Int, try_expr)]);
    let raw = parse_class(&emit(&class));
    let code = raw.code("f");
    assert_eq!(raw.class_name(code.exceptions[0].3), "java/lang/Throwable");
}

#[test]
fn throw_emits_athrow() {
    let exc = Type::reference("java/lang/RuntimeException");
    let body = Expr::new(
        ExprKind::Throw(Box::new(exp(
            ExprKind::New { params: vec![], args: vec![] },
            exc.clone(),
        ))),
        Type::Void,
        Ctx::STATEMENT.with(Ctx::TAIL),
    );
    let class = simple_class("p/Th", vec![static_method("f", &[], Type::Void, body)]);
    let raw = parse_class(&emit(&class));
    let code = &raw.code("f").bytes;
    assert_eq!(code[0], opcodes::NEW);
    assert_eq!(code[3], opcodes::DUP);
    assert_eq!(code[4], opcodes::INVOKESPECIAL);
    assert_eq!(code[7], opcodes::ATHROW);
}
