//! Class-level output: header, fields and constant values, members,
//! attributes, annotations, and the debug switch.

mod common;

use classgen::ast::*;
use classgen::codegen::flag::access_flags;
use classgen::codegen::opcodes;
use classgen::Config;
use common::*;

fn field(name: &str, ty: Type, value: Option<Lit>) -> FieldNode {
    FieldNode {
        access: vec![Modifier::Public, Modifier::Static, Modifier::Final],
        name: name.to_string(),
        annotations: vec![],
        ty,
        value,
    }
}

#[test]
fn header_version_and_access() {
    let class = simple_class("p/Hdr", vec![]);
    let bytes = emit(&class);
    let raw = parse_class(&bytes);
    assert_eq!(raw.major_version, 52);
    assert_eq!(raw.access & access_flags::ACC_PUBLIC, access_flags::ACC_PUBLIC);
    assert_eq!(raw.access & access_flags::ACC_SUPER, access_flags::ACC_SUPER, "ACC_SUPER always set");
}

#[test]
fn source_file_attribute() {
    let mut class = simple_class("p/Src", vec![]);
    class.source_file = Some("Src.java".to_string());
    let raw = parse_class(&emit(&class));
    assert!(raw.class_attr_names.iter().any(|n| n == "SourceFile"));
    assert!(raw.has_utf8("Src.java"));
}

#[test]
fn constant_values_are_coerced_to_the_declared_width() {
    let mut class = simple_class("p/Cv", vec![]);
    class.fields = vec![
        field("s", Type::Short, Some(Lit::Int(70000))),
        field("b", Type::Boolean, Some(Lit::Int(2))),
        field("l", Type::Long, Some(Lit::Int(7))),
        field("f", Type::Float, Some(Lit::Float(1.5))),
        field("t", Type::reference("java/lang/String"), Some(Lit::Str("txt".to_string()))),
    ];
    let raw = parse_class(&emit(&class));
    for f in &raw.fields {
        assert!(f.attr_names.iter().any(|n| n == "ConstantValue"), "{} has no ConstantValue", f.name);
    }
    // 70000 wraps to 4464 as a short
    assert!(raw.cp.iter().any(|e| matches!(e, CpEntry::Int(4464))));
    // boolean truthiness collapses to 1
    assert!(raw.cp.iter().any(|e| matches!(e, CpEntry::Int(1))));
    assert!(raw.cp.iter().any(|e| matches!(e, CpEntry::Long(7))));
    assert!(raw.cp.iter().any(|e| matches!(e, CpEntry::Float(v) if *v == 1.5)));
    assert!(raw.has_utf8("txt"));
}

#[test]
fn field_names_are_munged() {
    let mut class = simple_class("p/Mg", vec![]);
    class.fields = vec![field("a.b", Type::Int, None)];
    let raw = parse_class(&emit(&class));
    assert_eq!(raw.fields[0].name, "a_DOT_b");
}

#[test]
fn constructor_and_static_initializer_names() {
    let ctor_body = seq(vec![
        stmt(
            ExprKind::CtorCall {
                owner: Type::reference("java/lang/Object"),
                params: vec![],
                args: vec![],
            },
            Type::Void,
        ),
        ret_void(seq(vec![])),
    ]);
    let mut class = simple_class("p/Ctor", vec![]);
    class.constructors = vec![MethodNode {
        access: vec![Modifier::Public],
        kind: MethodKind::Constructor,
        name: String::new(),
        ret: Type::Void,
        params: vec![],
        throws: vec![],
        annotations: vec![],
        body: Some(ctor_body),
    }];
    class.static_init = Some(MethodNode {
        access: vec![],
        kind: MethodKind::StaticInit,
        name: String::new(),
        ret: Type::Void,
        params: vec![],
        throws: vec![],
        annotations: vec![],
        body: Some(ret_void(seq(vec![]))),
    });
    let raw = parse_class(&emit(&class));
    let ctor = raw.method("<init>");
    let code = &ctor.code.as_ref().unwrap().bytes;
    assert_eq!(code[0], 0x2a, "aload_0");
    assert_eq!(code[1], opcodes::INVOKESPECIAL);
    assert_eq!(*code.last().unwrap(), opcodes::RETURN);
    let clinit = raw.method("<clinit>");
    assert_eq!(clinit.access & access_flags::ACC_STATIC, access_flags::ACC_STATIC);
}

#[test]
fn throws_become_an_exceptions_attribute() {
    let mut m = static_method("f", &[], Type::Void, ret_void(seq(vec![])));
    m.throws = vec![Type::reference("java/io/IOException")];
    let class = simple_class("p/Thr", vec![m]);
    let raw = parse_class(&emit(&class));
    assert!(raw.method("f").attr_names.iter().any(|n| n == "Exceptions"));
    assert!(raw.has_utf8("java/io/IOException"));
}

#[test]
fn abstract_methods_have_no_code() {
    let m = MethodNode {
        access: vec![Modifier::Public, Modifier::Abstract],
        kind: MethodKind::Normal,
        name: "todo".to_string(),
        ret: Type::Int,
        params: vec![],
        throws: vec![],
        annotations: vec![],
        body: None,
    };
    let mut class = simple_class("p/Abs", vec![m]);
    class.access.push(Modifier::Abstract);
    let raw = parse_class(&emit(&class));
    assert!(raw.method("todo").code.is_none());
}

#[test]
fn class_annotations_split_by_retention_and_drop_source() {
    let ann = |retention| AnnotationNode {
        ty: Type::reference("p/Mark"),
        retention,
        values: vec![("value".to_string(), AnnotationValue::Str("x".to_string()))],
    };
    let mut class = simple_class("p/Ann", vec![]);
    class.annotations = vec![
        ann(Retention::Runtime),
        ann(Retention::Class),
        ann(Retention::Source),
    ];
    let raw = parse_class(&emit(&class));
    assert!(raw.class_attr_names.iter().any(|n| n == "RuntimeVisibleAnnotations"));
    assert!(raw.class_attr_names.iter().any(|n| n == "RuntimeInvisibleAnnotations"));
    assert_eq!(raw.class_attr_names.len(), 2, "source retention dropped");
}

#[test]
fn parameter_annotations_index_by_position() {
    let mut m = static_method("f", &[Type::Int, Type::Int], Type::Void, ret_void(seq(vec![])));
    m.params[1].annotations.push(AnnotationNode {
        ty: Type::reference("p/Tag"),
        retention: Retention::Runtime,
        values: vec![],
    });
    let class = simple_class("p/PAnn", vec![m]);
    let raw = parse_class(&emit(&class));
    assert!(raw
        .method("f")
        .attr_names
        .iter()
        .any(|n| n == "RuntimeVisibleParameterAnnotations"));
}

#[test]
fn debug_switch_gates_local_variable_tables() {
    let let_expr = Expr::new(
        ExprKind::Let {
            bindings: vec![Binding {
                name: "x".to_string(),
                ty: Type::Int,
                slot: 1,
                init: int_lit(7),
            }],
            body: Box::new(ret(load(1, Type::Int))),
        },
        Type::Int,
        Ctx::EXPRESSION,
    );
    let class = simple_class("p/Dbg", vec![static_method("f", &[Type::Int], Type::Int, let_expr)]);

    let plain = parse_class(&emit(&class));
    assert!(!plain.code("f").attr_names.iter().any(|n| n == "LocalVariableTable"));

    let debug = parse_class(&emit_debug(&class));
    assert!(debug.code("f").attr_names.iter().any(|n| n == "LocalVariableTable"));
    assert!(debug.has_utf8("x"), "binding name recorded");
    assert!(debug.has_utf8("p0"), "parameter name recorded");
}

#[test]
fn line_numbers_are_recorded_once_per_line() {
    let body = seq(vec![
        stmt(ExprKind::Assign { slot: 0, value: Box::new(int_lit(1)) }, Type::Int).at_line(3),
        stmt(ExprKind::Assign { slot: 0, value: Box::new(int_lit(2)) }, Type::Int).at_line(3),
        ret(load(0, Type::Int)).at_line(4),
    ]);
    let class = simple_class("p/Ln", vec![static_method("f", &[], Type::Int, body)]);
    let raw = parse_class(&emit(&class));
    assert!(raw.code("f").attr_names.iter().any(|n| n == "LineNumberTable"));
}

#[test]
fn emit_class_to_file_writes_a_loadable_snapshot() {
    let class = simple_class(
        "p/OnDisk",
        vec![static_method("f", &[], Type::Int, ret(int_lit(41)))],
    );
    let dir = tempfile::tempdir().unwrap();
    let path = classgen::emit_class_to_file(&class, dir.path(), &Config::new()).unwrap();
    assert_eq!(path.file_name().unwrap(), "OnDisk.class");
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[0..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
    let raw = parse_class(&bytes);
    assert_eq!(raw.code("f").bytes, vec![opcodes::BIPUSH, 41, opcodes::IRETURN]);
}

#[test]
fn interfaces_are_listed() {
    let mut class = simple_class("p/Impl", vec![]);
    class.interfaces = vec!["java/lang/Runnable".to_string()];
    let raw = parse_class(&emit(&class));
    assert!(raw.has_utf8("java/lang/Runnable"));
}
