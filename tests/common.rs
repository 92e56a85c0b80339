//! Common test utilities: tree builders and a minimal class-file
//! reader used to pick apart emitted bytes for assertions.

#![allow(dead_code)]

use classgen::ast::*;
use classgen::Config;

pub fn emit(class: &ClassNode) -> Vec<u8> {
    classgen::emit_class(class, &Config::new()).expect("emit_class failed")
}

pub fn emit_debug(class: &ClassNode) -> Vec<u8> {
    classgen::emit_class(class, &Config::new().with_debug(true)).expect("emit_class failed")
}

// ---- tree builders ----------------------------------------------------

pub fn exp(kind: ExprKind, ty: Type) -> Expr {
    Expr::new(kind, ty, Ctx::EXPRESSION)
}

pub fn stmt(kind: ExprKind, ty: Type) -> Expr {
    Expr::new(kind, ty, Ctx::STATEMENT)
}

/// Mark a value-producing node as the method's returned expression.
pub fn ret(mut e: Expr) -> Expr {
    e.ctx = Ctx::EXPRESSION.with(Ctx::RETURN).with(Ctx::TAIL);
    e
}

/// A trailing statement in a void method; emits the bare RETURN.
pub fn ret_void(mut e: Expr) -> Expr {
    e.ctx = Ctx::STATEMENT.with(Ctx::RETURN).with(Ctx::TAIL);
    e
}

pub fn int_lit(v: i64) -> Expr {
    exp(ExprKind::Literal(Lit::Int(v)), Type::Int)
}

pub fn long_lit(v: i64) -> Expr {
    exp(ExprKind::Literal(Lit::Int(v)), Type::Long)
}

pub fn str_lit(s: &str) -> Expr {
    exp(ExprKind::Literal(Lit::Str(s.to_string())), Type::reference("java/lang/String"))
}

pub fn load(slot: u16, ty: Type) -> Expr {
    exp(ExprKind::Local { name: format!("v{}", slot), slot }, ty)
}

/// Sequence node; type and disposition follow the last child. The
/// RETURN bit stays on the leaf that produces the value — only the
/// disposition and tail bits propagate up.
pub fn seq(children: Vec<Expr>) -> Expr {
    let ty = children.last().map(|c| c.ty.clone()).unwrap_or(Type::Void);
    let last_ctx = children.last().map(|c| c.ctx).unwrap_or(Ctx::STATEMENT);
    let mut ctx = if last_ctx.contains(Ctx::EXPRESSION) { Ctx::EXPRESSION } else { Ctx::STATEMENT };
    if last_ctx.contains(Ctx::TAIL) {
        ctx = ctx.with(Ctx::TAIL);
    }
    Expr::new(ExprKind::Do(children), ty, ctx)
}

pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    let ty = lhs.ty.clone();
    exp(ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }, ty)
}

pub fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(
        ExprKind::Cmp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
        Type::Boolean,
        Ctx::EXPRESSION.with(Ctx::CONDITIONAL),
    )
}

// ---- class scaffolding ------------------------------------------------

pub fn param(name: &str, ty: Type, slot: u16) -> Param {
    Param { name: name.to_string(), ty, access: vec![], annotations: vec![], slot }
}

pub fn static_method(name: &str, params: &[Type], ret_ty: Type, body: Expr) -> MethodNode {
    let mut slot = 0u16;
    let params = params
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let p = param(&format!("p{}", i), t.clone(), slot);
            slot += t.category().max(1);
            p
        })
        .collect();
    MethodNode {
        access: vec![Modifier::Public, Modifier::Static],
        kind: MethodKind::Normal,
        name: name.to_string(),
        ret: ret_ty,
        params,
        throws: vec![],
        annotations: vec![],
        body: Some(body),
    }
}

pub fn simple_class(name: &str, methods: Vec<MethodNode>) -> ClassNode {
    ClassNode {
        source_file: None,
        name: name.to_string(),
        access: vec![Modifier::Public],
        annotations: vec![],
        super_name: "java/lang/Object".to_string(),
        interfaces: vec![],
        static_init: None,
        constructors: vec![],
        fields: vec![],
        methods,
    }
}

// ---- minimal class-file reader ---------------------------------------

#[derive(Debug, Clone)]
pub enum CpEntry {
    Utf8(String),
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    Str(u16),
    Member(u16, u16),
    NameAndType(u16, u16),
    Gap,
}

#[derive(Debug)]
pub struct RawCode {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytes: Vec<u8>,
    /// (start_pc, end_pc, handler_pc, catch_type)
    pub exceptions: Vec<(u16, u16, u16, u16)>,
    pub attr_names: Vec<String>,
}

#[derive(Debug)]
pub struct RawMethod {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub attr_names: Vec<String>,
    pub code: Option<RawCode>,
}

#[derive(Debug)]
pub struct RawField {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub attr_names: Vec<String>,
}

#[derive(Debug)]
pub struct RawClass {
    pub major_version: u16,
    pub access: u16,
    pub cp: Vec<CpEntry>,
    pub fields: Vec<RawField>,
    pub methods: Vec<RawMethod>,
    pub class_attr_names: Vec<String>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> u8 {
        let v = self.bytes[self.at];
        self.at += 1;
        v
    }
    fn u16(&mut self) -> u16 {
        let v = u16::from_be_bytes([self.bytes[self.at], self.bytes[self.at + 1]]);
        self.at += 2;
        v
    }
    fn u32(&mut self) -> u32 {
        let v = u32::from_be_bytes(self.bytes[self.at..self.at + 4].try_into().unwrap());
        self.at += 4;
        v
    }
    fn take(&mut self, n: usize) -> &'a [u8] {
        let s = &self.bytes[self.at..self.at + n];
        self.at += n;
        s
    }
}

impl RawClass {
    pub fn utf8(&self, idx: u16) -> &str {
        match &self.cp[(idx - 1) as usize] {
            CpEntry::Utf8(s) => s,
            other => panic!("cp entry {} is {:?}, not utf8", idx, other),
        }
    }

    pub fn class_name(&self, idx: u16) -> &str {
        match &self.cp[(idx - 1) as usize] {
            CpEntry::Class(name) => self.utf8(*name),
            other => panic!("cp entry {} is {:?}, not a class", idx, other),
        }
    }

    pub fn method(&self, name: &str) -> &RawMethod {
        self.methods
            .iter()
            .find(|m| m.name == name)
            .unwrap_or_else(|| panic!("no method named {}", name))
    }

    pub fn code(&self, name: &str) -> &RawCode {
        self.method(name).code.as_ref().expect("method has no Code attribute")
    }

    /// True if some Utf8 entry equals `s` (handy for checking which
    /// member refs were interned).
    pub fn has_utf8(&self, s: &str) -> bool {
        self.cp.iter().any(|e| matches!(e, CpEntry::Utf8(v) if v == s))
    }
}

pub fn parse_class(bytes: &[u8]) -> RawClass {
    let mut r = Reader { bytes, at: 0 };
    assert_eq!(r.u32(), 0xCAFE_BABE, "bad magic");
    let _minor = r.u16();
    let major_version = r.u16();

    let cp_count = r.u16();
    let mut cp = Vec::with_capacity(cp_count as usize);
    let mut i = 1;
    while i < cp_count {
        let tag = r.u8();
        let entry = match tag {
            1 => {
                let len = r.u16() as usize;
                CpEntry::Utf8(String::from_utf8(r.take(len).to_vec()).unwrap())
            }
            3 => CpEntry::Int(r.u32() as i32),
            4 => CpEntry::Float(f32::from_bits(r.u32())),
            5 => CpEntry::Long(((r.u32() as u64) << 32 | r.u32() as u64) as i64),
            6 => CpEntry::Double(f64::from_bits((r.u32() as u64) << 32 | r.u32() as u64)),
            7 => CpEntry::Class(r.u16()),
            8 => CpEntry::Str(r.u16()),
            9 | 10 | 11 => CpEntry::Member(r.u16(), r.u16()),
            12 => CpEntry::NameAndType(r.u16(), r.u16()),
            other => panic!("unexpected constant tag {}", other),
        };
        let wide = matches!(entry, CpEntry::Long(_) | CpEntry::Double(_));
        cp.push(entry);
        i += 1;
        if wide {
            cp.push(CpEntry::Gap);
            i += 1;
        }
    }

    let access = r.u16();
    let _this = r.u16();
    let _super = r.u16();
    let iface_count = r.u16();
    for _ in 0..iface_count {
        r.u16();
    }

    let utf8_of = |cp: &[CpEntry], idx: u16| -> String {
        match &cp[(idx - 1) as usize] {
            CpEntry::Utf8(s) => s.clone(),
            other => panic!("cp entry {} is {:?}, not utf8", idx, other),
        }
    };

    let field_count = r.u16();
    let mut fields = Vec::new();
    for _ in 0..field_count {
        let access = r.u16();
        let name = utf8_of(&cp, r.u16());
        let descriptor = utf8_of(&cp, r.u16());
        let attr_count = r.u16();
        let mut attr_names = Vec::new();
        for _ in 0..attr_count {
            attr_names.push(utf8_of(&cp, r.u16()));
            let len = r.u32() as usize;
            r.take(len);
        }
        fields.push(RawField { access, name, descriptor, attr_names });
    }

    let method_count = r.u16();
    let mut methods = Vec::new();
    for _ in 0..method_count {
        let access = r.u16();
        let name = utf8_of(&cp, r.u16());
        let descriptor = utf8_of(&cp, r.u16());
        let attr_count = r.u16();
        let mut attr_names = Vec::new();
        let mut code = None;
        for _ in 0..attr_count {
            let attr_name = utf8_of(&cp, r.u16());
            let len = r.u32() as usize;
            if attr_name == "Code" {
                let mut cr = Reader { bytes: r.take(len), at: 0 };
                let max_stack = cr.u16();
                let max_locals = cr.u16();
                let code_len = cr.u32() as usize;
                let bytes = cr.take(code_len).to_vec();
                let exc_count = cr.u16();
                let mut exceptions = Vec::new();
                for _ in 0..exc_count {
                    exceptions.push((cr.u16(), cr.u16(), cr.u16(), cr.u16()));
                }
                let code_attr_count = cr.u16();
                let mut code_attr_names = Vec::new();
                for _ in 0..code_attr_count {
                    code_attr_names.push(utf8_of(&cp, cr.u16()));
                    let alen = cr.u32() as usize;
                    cr.take(alen);
                }
                code = Some(RawCode {
                    max_stack,
                    max_locals,
                    bytes,
                    exceptions,
                    attr_names: code_attr_names,
                });
            } else {
                r.take(len);
            }
            attr_names.push(attr_name);
        }
        methods.push(RawMethod { access, name, descriptor, attr_names, code });
    }

    let class_attr_count = r.u16();
    let mut class_attr_names = Vec::new();
    for _ in 0..class_attr_count {
        class_attr_names.push(utf8_of(&cp, r.u16()));
        let len = r.u32() as usize;
        r.take(len);
    }
    assert_eq!(r.at, bytes.len(), "trailing bytes after class file");

    RawClass { major_version, access, cp, fields, methods, class_attr_names }
}
