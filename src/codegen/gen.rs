//! Expression-to-bytecode lowering.
//!
//! A recursive walk over the typed tree drives the method writer. Every
//! node obeys the stack discipline: after emission the operand stack
//! has grown by the node type's category, or not at all in statement
//! context. The return opcode is emitted centrally from the `RETURN`
//! context bit, so individual node kinds never emit returns themselves.

use std::collections::HashMap;

use super::descriptor::method_descriptor;
use super::instr;
use super::method_writer::{Label, MethodWriter};
use super::opcodes;
use crate::ast::{Binding, CatchClause, Ctx, Expr, ExprKind, Lit, MethodRef, SwitchClause, Type};
use crate::common::{Error, Result};

/// Continue/break targets of the innermost or a named loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopLabels {
    pub cont: Option<Label>,
    pub brk: Label,
}

/// Emitter context for one method body: the method writer, the active
/// loop labels, the named-label map, and the debug flag. Label scoping
/// is save/restore around the recursive calls.
pub struct Gen<'a, 'p> {
    pub(crate) mw: &'a mut MethodWriter<'p>,
    pub(crate) debug: bool,
    pub(crate) loop_labels: Option<LoopLabels>,
    pub(crate) named: HashMap<String, LoopLabels>,
}

impl<'a, 'p> Gen<'a, 'p> {
    pub fn new(mw: &'a mut MethodWriter<'p>, debug: bool) -> Self {
        Self { mw, debug, loop_labels: None, named: HashMap::new() }
    }

    /// Emit a method body.
    pub fn emit(&mut self, body: &Expr) -> Result<()> {
        self.expr(body)
    }

    /// Dispatch one node, then handle the centralized return tail.
    pub(crate) fn expr(&mut self, e: &Expr) -> Result<()> {
        if let Some(line) = e.line {
            self.mw.line(line);
        }
        match &e.kind {
            ExprKind::Do(children) => {
                for c in children {
                    self.expr(c)?;
                }
            }
            ExprKind::Null => {
                if !e.ctx.is_statement() {
                    self.mw.op(opcodes::ACONST_NULL);
                }
            }
            ExprKind::Literal(lit) => {
                if !e.ctx.is_statement() {
                    self.push_literal(lit, &e.ty)?;
                }
            }
            ExprKind::Local { slot, .. } => {
                if !e.ctx.is_statement() {
                    self.mw.load(&e.ty, *slot);
                }
            }
            ExprKind::Super => {
                self.mw.load(&e.ty, 0);
            }
            ExprKind::Assign { slot, value } => {
                self.expr(value)?;
                if !e.ctx.is_statement() {
                    self.dup(&e.ty);
                }
                self.mw.store(&e.ty, *slot);
            }
            ExprKind::Incr { slot, by } => {
                self.mw.iinc(*slot, *by);
                if !e.ctx.is_statement() {
                    self.mw.load(&Type::Int, *slot);
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                let opcode = instr::binary_op(*op, &e.ty).ok_or_else(|| {
                    Error::invariant(format!("no {:?} for operand type {:?}", op, e.ty))
                })?;
                self.mw.op(opcode);
                self.discard_if_statement(e);
            }
            ExprKind::Neg(operand) => {
                self.expr(operand)?;
                let opcode = instr::neg_op(&e.ty)
                    .ok_or_else(|| Error::invariant(format!("no negate for {:?}", e.ty)))?;
                self.mw.op(opcode);
                self.discard_if_statement(e);
            }
            ExprKind::WidenPrimitive(value) => {
                // Re-emitting a literal at the wider type beats the
                // conversion opcode on encoding size.
                if let (ExprKind::Literal(lit), Type::Long | Type::Double) = (&value.kind, &e.ty) {
                    if !e.ctx.is_statement() {
                        self.push_literal(lit, &e.ty)?;
                    }
                } else {
                    self.expr(value)?;
                    if let Some(opcode) = instr::widen_op(&value.ty, &e.ty) {
                        self.mw.op(opcode);
                    }
                    self.discard_if_statement(e);
                }
            }
            ExprKind::NarrowPrimitive(value) => {
                if let (ExprKind::Literal(lit), Type::Byte | Type::Short | Type::Char | Type::Float) =
                    (&value.kind, &e.ty)
                {
                    if !e.ctx.is_statement() {
                        self.push_literal(lit, &e.ty)?;
                    }
                } else {
                    self.expr(value)?;
                    for opcode in instr::narrow_ops(&value.ty, &e.ty) {
                        self.mw.op(opcode);
                    }
                    self.discard_if_statement(e);
                }
            }
            ExprKind::Box_(value) => {
                let boxed = e.ty.internal_name();
                let desc = method_descriptor(std::slice::from_ref(&value.ty), &e.ty);
                self.expr(value)?;
                self.mw.invoke(opcodes::INVOKESTATIC, &boxed, "valueOf", &desc, false)?;
                self.discard_if_statement(e);
            }
            ExprKind::Unbox(value) => {
                let prim = e.ty.primitive_name().ok_or_else(|| {
                    Error::invariant(format!("unboxing to non-primitive {:?}", e.ty))
                })?;
                let owner = value.ty.internal_name();
                let desc = method_descriptor(&[], &e.ty);
                self.expr(value)?;
                self.mw
                    .invoke(opcodes::INVOKEVIRTUAL, &owner, &format!("{}Value", prim), &desc, false)?;
                self.discard_if_statement(e);
            }
            ExprKind::WidenReference(value) => {
                self.expr(value)?;
            }
            ExprKind::NarrowReference(value) => {
                self.expr(value)?;
                self.mw.type_op(opcodes::CHECKCAST, &e.ty.internal_name())?;
                self.discard_if_statement(e);
            }
            ExprKind::InstanceOf { value, target } => {
                self.expr(value)?;
                self.mw.type_op(opcodes::INSTANCEOF, &target.internal_name())?;
                self.discard_if_statement(e);
            }
            ExprKind::Let { bindings, body } => {
                self.let_bindings(bindings, body)?;
            }
            ExprKind::Labeled { label, body } => {
                let brk = self.mw.new_label();
                let saved = self.named.insert(label.clone(), LoopLabels { cont: None, brk });
                self.expr(body)?;
                self.mw.place(brk)?;
                self.unbind(label, saved);
            }
            ExprKind::If { test, then, els } => {
                self.if_(test, then, els.as_deref())?;
            }
            ExprKind::Switch { test, clauses, default } => {
                self.switch(test, clauses, default.as_deref())?;
            }
            ExprKind::While { label, test, body } => {
                self.loop_(label.as_deref(), test, body, None, e.ctx)?;
            }
            ExprKind::For { label, test, body, step } => {
                self.loop_(label.as_deref(), test, body, Some(step.as_ref()), e.ctx)?;
            }
            ExprKind::Try { body, catches, finally } => {
                self.try_(body, catches, finally.as_deref())?;
            }
            ExprKind::Continue { label } => {
                let target = self.jump_target(label.as_deref(), true)?;
                self.mw.goto_(target);
            }
            ExprKind::Break { label } => {
                let target = self.jump_target(label.as_deref(), false)?;
                self.mw.goto_(target);
            }
            ExprKind::Return(value) => {
                // The return opcode itself comes from the context tail.
                if let Some(value) = value {
                    self.expr(value)?;
                }
            }
            ExprKind::Throw(value) => {
                self.expr(value)?;
                self.mw.op(opcodes::ATHROW);
            }
            ExprKind::New { params, args } => {
                let owner = e.ty.internal_name();
                self.mw.type_op(opcodes::NEW, &owner)?;
                if !e.ctx.is_statement() {
                    self.mw.op(opcodes::DUP);
                }
                for a in args {
                    self.expr(a)?;
                }
                let desc = method_descriptor(params, &Type::Void);
                self.mw.invoke(opcodes::INVOKESPECIAL, &owner, "<init>", &desc, false)?;
            }
            ExprKind::FieldGet { owner, name, is_static, target } => {
                let opcode = if *is_static {
                    opcodes::GETSTATIC
                } else {
                    let target = target
                        .as_ref()
                        .ok_or_else(|| Error::invariant("instance field access without target"))?;
                    self.expr(target)?;
                    opcodes::GETFIELD
                };
                self.mw.field(opcode, &owner.internal_name(), name, &e.ty.descriptor())?;
                self.discard_if_statement(e);
            }
            ExprKind::FieldPut { owner, name, is_static, target, value } => {
                if !*is_static {
                    let target = target
                        .as_ref()
                        .ok_or_else(|| Error::invariant("instance field update without target"))?;
                    self.expr(target)?;
                }
                self.expr(value)?;
                if !e.ctx.is_statement() {
                    // Tuck the value under the target reference so it
                    // survives the store.
                    let opcode = match (*is_static, e.ty.category()) {
                        (true, 2) => opcodes::DUP2,
                        (true, _) => opcodes::DUP,
                        (false, 2) => opcodes::DUP2_X1,
                        (false, _) => opcodes::DUP_X1,
                    };
                    self.mw.op(opcode);
                }
                let opcode = if *is_static { opcodes::PUTSTATIC } else { opcodes::PUTFIELD };
                self.mw.field(opcode, &owner.internal_name(), name, &e.ty.descriptor())?;
            }
            ExprKind::CtorCall { owner, params, args } => {
                self.mw.load(owner, 0);
                for a in args {
                    self.expr(a)?;
                }
                let desc = method_descriptor(params, &Type::Void);
                self.mw.invoke(opcodes::INVOKESPECIAL, &owner.internal_name(), "<init>", &desc, false)?;
            }
            ExprKind::Invoke { method, target, args } => {
                self.invoke(e, method, target.as_deref(), args)?;
            }
            ExprKind::NewArray { dims, init } => {
                self.new_array(e, dims, init.as_deref())?;
            }
            ExprKind::ArrayLength(array) => {
                self.expr(array)?;
                self.mw.op(opcodes::ARRAYLENGTH);
                self.discard_if_statement(e);
            }
            ExprKind::ArrayLoad { array, index } => {
                self.expr(array)?;
                self.expr(index)?;
                self.mw.op(instr::array_load_op(&e.ty));
                self.discard_if_statement(e);
            }
            ExprKind::ArrayStore { array, index, value } => {
                self.expr(array)?;
                self.expr(index)?;
                self.expr(value)?;
                if !e.ctx.is_statement() {
                    let opcode =
                        if e.ty.category() == 2 { opcodes::DUP2_X2 } else { opcodes::DUP_X2 };
                    self.mw.op(opcode);
                }
                self.mw.op(instr::array_store_op(&e.ty));
            }
            ExprKind::Cmp { .. }
            | ExprKind::CmpZero { .. }
            | ExprKind::And(_)
            | ExprKind::Or(_)
            | ExprKind::Not(_) => {
                // The parser rewrites comparisons outside conditional
                // position; reaching one here is version skew.
                return Err(Error::unknown_node(format!(
                    "conditional-only node '{}' in value position",
                    e.kind_name()
                )));
            }
        }
        if e.ctx.contains(Ctx::RETURN) {
            if e.ctx.contains(Ctx::EXPRESSION) {
                self.mw.op(instr::return_op(&e.ty));
            } else {
                self.mw.op(opcodes::RETURN);
            }
        }
        Ok(())
    }

    /// Push a literal at the given type, coercing the parser-delivered
    /// int/double value to the precise width at the emission site.
    fn push_literal(&mut self, lit: &Lit, ty: &Type) -> Result<()> {
        match lit {
            Lit::Bool(b) => self.mw.push_int(*b as i32)?,
            Lit::Str(s) => self.mw.push_string(s)?,
            Lit::Class(t) => {
                if let Some(boxed) = t.boxed_class() {
                    self.mw.field(
                        opcodes::GETSTATIC,
                        boxed,
                        "TYPE",
                        "Ljava/lang/Class;",
                    )?;
                } else {
                    self.mw.push_class_constant(&t.internal_name())?;
                }
            }
            Lit::Int(i) => match ty {
                Type::Byte => self.mw.push_int(*i as i8 as i32)?,
                Type::Short => self.mw.push_int(*i as i16 as i32)?,
                Type::Char => self.mw.push_int(*i as u16 as i32)?,
                Type::Long => self.mw.push_long(*i)?,
                Type::Float => self.mw.push_float(*i as f32)?,
                Type::Double => self.mw.push_double(*i as f64)?,
                _ => self.mw.push_int(*i as i32)?,
            },
            Lit::Float(f) => match ty {
                Type::Float => self.mw.push_float(*f as f32)?,
                Type::Long => self.mw.push_long(*f as i64)?,
                t if t.is_int_like() => self.mw.push_int(*f as i32)?,
                _ => self.mw.push_double(*f)?,
            },
        }
        Ok(())
    }

    fn dup(&mut self, ty: &Type) {
        self.mw.op(if ty.category() == 2 { opcodes::DUP2 } else { opcodes::DUP });
    }

    fn discard_if_statement(&mut self, e: &Expr) {
        if e.ctx.is_statement() {
            match e.ty.category() {
                0 => {}
                2 => self.mw.op(opcodes::POP2),
                _ => self.mw.op(opcodes::POP),
            }
        }
    }

    /// GOTO unless the just-emitted expression already left via a
    /// return or jump (tail position).
    fn goto_unless_tail(&mut self, last: &Expr, target: Label) {
        if !last.ctx.contains(Ctx::TAIL) {
            self.mw.goto_(target);
        }
    }

    fn jump_target(&self, label: Option<&str>, want_continue: bool) -> Result<Label> {
        let labels = match label {
            Some(name) => self
                .named
                .get(name)
                .ok_or_else(|| Error::invariant(format!("jump to unknown label '{}'", name)))?,
            None => self
                .loop_labels
                .as_ref()
                .ok_or_else(|| Error::invariant("break/continue outside a loop"))?,
        };
        if want_continue {
            labels
                .cont
                .ok_or_else(|| Error::invariant("continue target is not a loop"))
        } else {
            Ok(labels.brk)
        }
    }

    fn unbind(&mut self, label: &str, saved: Option<LoopLabels>) {
        match saved {
            Some(prev) => {
                self.named.insert(label.to_string(), prev);
            }
            None => {
                self.named.remove(label);
            }
        }
    }

    fn let_bindings(&mut self, bindings: &[Binding], body: &Expr) -> Result<()> {
        let mut scope_starts = Vec::with_capacity(bindings.len());
        for b in bindings {
            self.expr(&b.init)?;
            self.mw.store(&b.ty, b.slot);
            let start = self.mw.new_label();
            self.mw.place(start)?;
            scope_starts.push(start);
        }
        self.expr(body)?;
        let end = self.mw.new_label();
        self.mw.place(end)?;
        if self.debug {
            for (b, start) in bindings.iter().zip(scope_starts) {
                self.mw.local_var(&b.name, &b.ty.descriptor(), start, end, b.slot);
            }
        }
        Ok(())
    }

    fn if_(&mut self, test: &Expr, then: &Expr, els: Option<&Expr>) -> Result<()> {
        let end = self.mw.new_label();
        let else_label = if els.is_some() { self.mw.new_label() } else { end };
        self.cond(test, else_label)?;
        self.expr(then)?;
        if let Some(els) = els {
            self.goto_unless_tail(then, end);
            self.mw.place(else_label)?;
            self.expr(els)?;
        }
        self.mw.place(end)?;
        Ok(())
    }

    fn switch(
        &mut self,
        test: &Expr,
        clauses: &[SwitchClause],
        default: Option<&Expr>,
    ) -> Result<()> {
        self.expr(test)?;
        let end = self.mw.new_label();
        let default_label = if default.is_some() { self.mw.new_label() } else { end };

        // One label per distinct key set, reused across clauses that
        // share it.
        let mut clause_labels: Vec<Label> = Vec::with_capacity(clauses.len());
        let mut first_use: Vec<bool> = Vec::with_capacity(clauses.len());
        for (i, c) in clauses.iter().enumerate() {
            match clauses[..i].iter().position(|p| p.keys == c.keys) {
                Some(j) => {
                    clause_labels.push(clause_labels[j]);
                    first_use.push(false);
                }
                None => {
                    clause_labels.push(self.mw.new_label());
                    first_use.push(true);
                }
            }
        }

        let mut pairs: Vec<(i32, Label)> = clauses
            .iter()
            .zip(&clause_labels)
            .flat_map(|(c, l)| c.keys.iter().map(move |k| (*k, *l)))
            .collect();
        pairs.sort_by_key(|(k, _)| *k);

        let contiguous = !pairs.is_empty()
            && pairs.last().unwrap().0 as i64 - pairs[0].0 as i64 == pairs.len() as i64 - 1;
        if contiguous {
            let low = pairs[0].0;
            let high = pairs.last().unwrap().0;
            let targets: Vec<Label> = pairs.iter().map(|(_, l)| *l).collect();
            self.mw.table_switch(low, high, default_label, &targets);
        } else {
            self.mw.lookup_switch(default_label, &pairs);
        }

        for (i, c) in clauses.iter().enumerate() {
            if first_use[i] {
                self.mw.place(clause_labels[i])?;
            }
            if let Some(guard) = &c.guard {
                self.cond(guard, default_label)?;
            }
            self.expr(&c.body)?;
            self.goto_unless_tail(&c.body, end);
        }
        if let Some(default) = default {
            self.mw.place(default_label)?;
            self.expr(default)?;
        }
        self.mw.place(end)?;
        Ok(())
    }

    fn loop_(
        &mut self,
        label: Option<&str>,
        test: &Expr,
        body: &Expr,
        step: Option<&Expr>,
        ctx: Ctx,
    ) -> Result<()> {
        let start = self.mw.new_label();
        let end = self.mw.new_label();
        let cont = if step.is_some() { self.mw.new_label() } else { start };
        let labels = LoopLabels { cont: Some(cont), brk: end };

        let saved_loop = self.loop_labels.replace(labels);
        let saved_named = label.map(|n| self.named.insert(n.to_string(), labels));

        self.mw.place(start)?;
        if !matches!(test.kind, ExprKind::Literal(Lit::Bool(true))) {
            self.cond(test, end)?;
        }
        self.expr(body)?;
        if let Some(step) = step {
            self.mw.place(cont)?;
            self.expr(step)?;
        }
        self.mw.goto_(start);
        self.mw.place(end)?;

        self.loop_labels = saved_loop;
        if let Some(name) = label {
            self.unbind(name, saved_named.flatten());
        }
        // Loops are statement-typed but may appear in expression
        // position in tail-free contexts.
        if !ctx.is_statement() {
            self.mw.op(opcodes::ACONST_NULL);
        }
        Ok(())
    }

    fn try_(
        &mut self,
        body: &Expr,
        catches: &[CatchClause],
        finally: Option<&Expr>,
    ) -> Result<()> {
        let body_start = self.mw.new_label();
        let body_end = self.mw.new_label();
        let try_end = self.mw.new_label();

        self.mw.place(body_start)?;
        self.expr(body)?;
        self.mw.place(body_end)?;
        if let Some(fin) = finally {
            self.expr(fin)?;
            self.goto_unless_tail(fin, try_end);
        } else {
            self.goto_unless_tail(body, try_end);
        }

        let mut handler_spans = Vec::with_capacity(catches.len());
        for (i, c) in catches.iter().enumerate() {
            let catch_start = self.mw.new_label();
            self.mw.place(catch_start)?;
            let caught = c.ty.clone().unwrap_or_else(|| Type::reference("java/lang/Throwable"));
            self.mw.store(&caught, c.slot);
            let scope_start = self.mw.new_label();
            self.mw.place(scope_start)?;
            self.expr(&c.body)?;
            let catch_end = self.mw.new_label();
            self.mw.place(catch_end)?;
            if self.debug {
                self.mw.local_var(&c.name, &caught.descriptor(), scope_start, catch_end, c.slot);
            }
            if let Some(fin) = finally {
                self.expr(fin)?;
                self.goto_unless_tail(fin, try_end);
            } else if i + 1 < catches.len() {
                self.goto_unless_tail(&c.body, try_end);
            }
            handler_spans.push((catch_start, catch_end));
        }

        let default_handler = if let Some(fin) = finally {
            let handler = self.mw.new_label();
            self.mw.place(handler)?;
            // The in-flight exception rides the stack across the
            // inlined finally body, then rethrows.
            self.expr(fin)?;
            self.mw.op(opcodes::ATHROW);
            Some(handler)
        } else {
            None
        };
        self.mw.place(try_end)?;

        for (c, (catch_start, _)) in catches.iter().zip(&handler_spans) {
            let name = c
                .ty
                .as_ref()
                .map(|t| t.internal_name())
                .unwrap_or_else(|| "java/lang/Throwable".to_string());
            self.mw.exception(body_start, body_end, *catch_start, Some(name));
        }
        if let Some(handler) = default_handler {
            self.mw.exception(body_start, body_end, handler, None);
            for (catch_start, catch_end) in &handler_spans {
                self.mw.exception(*catch_start, *catch_end, handler, None);
            }
        }
        Ok(())
    }

    fn invoke(
        &mut self,
        e: &Expr,
        method: &MethodRef,
        target: Option<&Expr>,
        args: &[Expr],
    ) -> Result<()> {
        if !method.is_static {
            let target =
                target.ok_or_else(|| Error::invariant("instance invocation without target"))?;
            self.expr(target)?;
        }
        for a in args {
            self.expr(a)?;
        }
        let opcode = if method.is_static {
            opcodes::INVOKESTATIC
        } else if method.is_interface {
            opcodes::INVOKEINTERFACE
        } else if method.is_private || method.via_super {
            opcodes::INVOKESPECIAL
        } else {
            opcodes::INVOKEVIRTUAL
        };
        let desc = method_descriptor(&method.params, &method.ret);
        self.mw.invoke(
            opcode,
            &method.owner.internal_name(),
            &method.name,
            &desc,
            method.is_interface,
        )?;
        if e.ctx.is_statement() {
            match method.ret.category() {
                0 => {}
                2 => self.mw.op(opcodes::POP2),
                _ => self.mw.op(opcodes::POP),
            }
        } else if method.ret == Type::Void {
            // Void calls in expression position still supply a value.
            self.mw.op(opcodes::ACONST_NULL);
        }
        Ok(())
    }

    fn new_array(&mut self, e: &Expr, dims: &[Expr], init: Option<&[Expr]>) -> Result<()> {
        let (elem, total_dims) = match &e.ty {
            Type::Array { elem, dims } => (elem.as_ref().clone(), *dims),
            other => {
                return Err(Error::invariant(format!("new-array of non-array type {:?}", other)))
            }
        };
        let inner = if total_dims > 1 { Type::array(elem.clone(), total_dims - 1) } else { elem };
        if dims.len() == 1 {
            self.expr(&dims[0])?;
            match instr::newarray_tag(&inner) {
                Some(tag) => self.mw.newarray(tag),
                None => self.mw.type_op(opcodes::ANEWARRAY, &inner.internal_name())?,
            }
            if let Some(init) = init {
                let store = instr::array_store_op(&inner);
                for (i, element) in init.iter().enumerate() {
                    self.mw.op(opcodes::DUP);
                    self.mw.push_int(i as i32)?;
                    self.expr(element)?;
                    self.mw.op(store);
                }
            }
        } else {
            for d in dims {
                self.expr(d)?;
            }
            self.mw.multianewarray(&e.ty.descriptor(), dims.len() as u8)?;
        }
        self.discard_if_statement(e);
        Ok(())
    }
}
