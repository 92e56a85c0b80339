//! Class, member, annotation and expression nodes.

use super::types::{Modifier, Type};

/// Evaluation-context bits attached to every expression node by the
/// parser. At most one of `STATEMENT`/`EXPRESSION` is meaningful as the
/// value disposition; `RETURN` and `TAIL` are orthogonal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ctx(u8);

impl Ctx {
    /// The produced value is discarded.
    pub const STATEMENT: Ctx = Ctx(0x01);
    /// The produced value is consumed.
    pub const EXPRESSION: Ctx = Ctx(0x02);
    /// A return opcode must follow the value (or a bare RETURN if void).
    pub const RETURN: Ctx = Ctx(0x04);
    /// Tail position within the enclosing construct; unreachable GOTOs
    /// are elided.
    pub const TAIL: Ctx = Ctx(0x08);
    /// Evaluated for branch control only.
    pub const CONDITIONAL: Ctx = Ctx(0x10);

    pub fn with(self, other: Ctx) -> Ctx {
        Ctx(self.0 | other.0)
    }

    pub fn contains(self, other: Ctx) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_statement(self) -> bool {
        self.contains(Ctx::STATEMENT)
    }
}

/// A literal constant as delivered by the parser. Integral values come
/// in at full `i64` width and floating values at `f64`; the node's
/// declared type narrows them at the emission site.
#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A class literal (`Foo.class`, `int.class`).
    Class(Type),
}

/// Annotation retention policy. `Source` annotations are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Source,
    Class,
    Runtime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    Bool(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Nested(AnnotationNode),
    Array(Vec<AnnotationValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationNode {
    pub ty: Type,
    pub retention: Retention,
    pub values: Vec<(String, AnnotationValue)>,
}

#[derive(Debug, Clone)]
pub struct FieldNode {
    pub access: Vec<Modifier>,
    pub name: String,
    pub annotations: Vec<AnnotationNode>,
    pub ty: Type,
    /// Constant initializer emitted as a ConstantValue attribute,
    /// coerced to the declared primitive width.
    pub value: Option<Lit>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub access: Vec<Modifier>,
    pub annotations: Vec<AnnotationNode>,
    /// Parser-assigned local slot (category-2 parameters consume two).
    pub slot: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Normal,
    Constructor,
    StaticInit,
}

#[derive(Debug, Clone)]
pub struct MethodNode {
    pub access: Vec<Modifier>,
    pub kind: MethodKind,
    /// Ignored for constructors and static initializers.
    pub name: String,
    pub ret: Type,
    pub params: Vec<Param>,
    pub throws: Vec<Type>,
    pub annotations: Vec<AnnotationNode>,
    pub body: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct ClassNode {
    pub source_file: Option<String>,
    /// Internal name (`com/example/Foo`).
    pub name: String,
    pub access: Vec<Modifier>,
    pub annotations: Vec<AnnotationNode>,
    pub super_name: String,
    pub interfaces: Vec<String>,
    pub static_init: Option<MethodNode>,
    pub constructors: Vec<MethodNode>,
    pub fields: Vec<FieldNode>,
    pub methods: Vec<MethodNode>,
}

/// A resolved method target. The parser picks the overload; the emitter
/// only chooses the invoke opcode from these flags.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRef {
    pub owner: Type,
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    pub is_static: bool,
    /// Declared on an interface.
    pub is_interface: bool,
    pub is_private: bool,
    /// Qualified through `super`.
    pub via_super: bool,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub ty: Type,
    pub slot: u16,
    pub init: Expr,
}

#[derive(Debug, Clone)]
pub struct SwitchClause {
    pub keys: Vec<i32>,
    pub guard: Option<Expr>,
    pub body: Expr,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    /// Declared exception type; `None` catches everything as Throwable.
    pub ty: Option<Type>,
    pub name: String,
    pub slot: u16,
    pub body: Expr,
}

/// Binary arithmetic / bitwise / shift operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

/// Comparison relations used in conditional position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

/// A typed expression node. `ty` is the type of the produced value,
/// `ctx` the evaluation context, `line` an optional source line for the
/// LineNumberTable.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub ctx: Ctx,
    pub line: Option<u16>,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Sequence; type and disposition follow the last child.
    Do(Vec<Expr>),
    Null,
    Literal(Lit),
    /// Local variable load.
    Local { name: String, slot: u16 },
    /// `this` viewed as the parent type (slot 0).
    Super,
    /// Local variable store.
    Assign { slot: u16, value: Box<Expr> },
    /// `IINC`-style increment; loads the post-increment value in
    /// expression position.
    Incr { slot: u16, by: i16 },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Neg(Box<Expr>),
    /// Widening primitive conversion to the node type.
    WidenPrimitive(Box<Expr>),
    /// Narrowing primitive conversion to the node type.
    NarrowPrimitive(Box<Expr>),
    /// Rewritten to `Boxed.valueOf(prim)`.
    Box_(Box<Expr>),
    /// Rewritten to `boxed.<prim>Value()`.
    Unbox(Box<Expr>),
    WidenReference(Box<Expr>),
    /// `CHECKCAST` to the node type.
    NarrowReference(Box<Expr>),
    InstanceOf { value: Box<Expr>, target: Type },
    Let { bindings: Vec<Binding>, body: Box<Expr> },
    /// Labeled block; `break <label>` targets the end.
    Labeled { label: String, body: Box<Expr> },
    If { test: Box<Expr>, then: Box<Expr>, els: Option<Box<Expr>> },
    Switch {
        test: Box<Expr>,
        clauses: Vec<SwitchClause>,
        default: Option<Box<Expr>>,
    },
    While { label: Option<String>, test: Box<Expr>, body: Box<Expr> },
    For {
        label: Option<String>,
        test: Box<Expr>,
        body: Box<Expr>,
        step: Box<Expr>,
    },
    Try {
        body: Box<Expr>,
        catches: Vec<CatchClause>,
        finally: Option<Box<Expr>>,
    },
    Continue { label: Option<String> },
    Break { label: Option<String> },
    /// Value emission only; the return opcode itself comes from the
    /// `RETURN` context bit.
    Return(Option<Box<Expr>>),
    Throw(Box<Expr>),
    New { params: Vec<Type>, args: Vec<Expr> },
    FieldGet {
        owner: Type,
        name: String,
        is_static: bool,
        target: Option<Box<Expr>>,
    },
    FieldPut {
        owner: Type,
        name: String,
        is_static: bool,
        target: Option<Box<Expr>>,
        value: Box<Expr>,
    },
    /// `this(...)` / `super(...)` delegation inside a constructor.
    CtorCall { owner: Type, params: Vec<Type>, args: Vec<Expr> },
    Invoke {
        method: MethodRef,
        target: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    NewArray { dims: Vec<Expr>, init: Option<Vec<Expr>> },
    ArrayLength(Box<Expr>),
    ArrayLoad { array: Box<Expr>, index: Box<Expr> },
    ArrayStore { array: Box<Expr>, index: Box<Expr>, value: Box<Expr> },
    /// Two-operand comparison; conditional position only.
    Cmp { op: CmpOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// Comparison against zero (int family) or null (references);
    /// conditional position only.
    CmpZero { op: CmpOp, operand: Box<Expr> },
    /// Short-circuit conjunction; conditional position only.
    And(Vec<Expr>),
    /// Short-circuit disjunction; conditional position only.
    Or(Vec<Expr>),
    /// Logical negation; conditional position only.
    Not(Box<Expr>),
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type, ctx: Ctx) -> Expr {
        Expr { kind, ty, ctx, line: None }
    }

    pub fn at_line(mut self, line: u16) -> Expr {
        self.line = Some(line);
        self
    }

    /// Short name of the node kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::Do(_) => "do",
            ExprKind::Null => "null",
            ExprKind::Literal(_) => "literal",
            ExprKind::Local { .. } => "local",
            ExprKind::Super => "super",
            ExprKind::Assign { .. } => "assignment",
            ExprKind::Incr { .. } => "increment",
            ExprKind::Binary { .. } => "binary",
            ExprKind::Neg(_) => "neg",
            ExprKind::WidenPrimitive(_) => "widening-primitive",
            ExprKind::NarrowPrimitive(_) => "narrowing-primitive",
            ExprKind::Box_(_) => "boxing",
            ExprKind::Unbox(_) => "unboxing",
            ExprKind::WidenReference(_) => "widening-reference",
            ExprKind::NarrowReference(_) => "narrowing-reference",
            ExprKind::InstanceOf { .. } => "instance?",
            ExprKind::Let { .. } => "let",
            ExprKind::Labeled { .. } => "labeled",
            ExprKind::If { .. } => "if",
            ExprKind::Switch { .. } => "switch",
            ExprKind::While { .. } => "while",
            ExprKind::For { .. } => "for",
            ExprKind::Try { .. } => "try",
            ExprKind::Continue { .. } => "continue",
            ExprKind::Break { .. } => "break",
            ExprKind::Return(_) => "return",
            ExprKind::Throw(_) => "throw",
            ExprKind::New { .. } => "new",
            ExprKind::FieldGet { .. } => "field-access",
            ExprKind::FieldPut { .. } => "field-update",
            ExprKind::CtorCall { .. } => "ctor-invocation",
            ExprKind::Invoke { .. } => "method-invocation",
            ExprKind::NewArray { .. } => "new-array",
            ExprKind::ArrayLength(_) => "array-length",
            ExprKind::ArrayLoad { .. } => "array-access",
            ExprKind::ArrayStore { .. } => "array-update",
            ExprKind::Cmp { .. } => "comparison",
            ExprKind::CmpZero { .. } => "zero-comparison",
            ExprKind::And(_) => "and",
            ExprKind::Or(_) => "or",
            ExprKind::Not(_) => "not",
        }
    }
}
