//! Conditional lowering: comparisons, short-circuit combinators, and
//! negation, branching directly on `IF*` opcodes without materializing
//! a 0/1 boolean.

use super::gen::Gen;
use super::instr;
use super::method_writer::Label;
use super::opcodes;
use crate::ast::{CmpOp, Expr, ExprKind, Lit, Type};
use crate::common::{Error, Result};

impl Gen<'_, '_> {
    /// Emit `node` for branch control: jump to `false_target` exactly
    /// when the condition is false, fall through otherwise.
    pub(crate) fn cond(&mut self, node: &Expr, false_target: Label) -> Result<()> {
        self.cond_branch(node, false_target, false)
    }

    /// The worker: `jump_if_true` flips the branch sense, which is how
    /// negation and the true-targets of `or` chains are expressed.
    fn cond_branch(&mut self, node: &Expr, target: Label, jump_if_true: bool) -> Result<()> {
        match &node.kind {
            ExprKind::Cmp { op, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                let rel = if jump_if_true { *op } else { instr::negate_cmp(*op) };
                match &lhs.ty {
                    Type::Long => {
                        self.mw.op(opcodes::LCMP);
                        self.mw.branch(instr::if_op(rel), target);
                    }
                    Type::Float => {
                        self.mw.op(instr::fp_cmp_op(*op, false));
                        self.mw.branch(instr::if_op(rel), target);
                    }
                    Type::Double => {
                        self.mw.op(instr::fp_cmp_op(*op, true));
                        self.mw.branch(instr::if_op(rel), target);
                    }
                    t if t.is_reference() => {
                        let opcode = match rel {
                            CmpOp::Eq => opcodes::IF_ACMPEQ,
                            CmpOp::Ne => opcodes::IF_ACMPNE,
                            other => {
                                return Err(Error::invariant(format!(
                                    "ordered comparison {:?} on references",
                                    other
                                )))
                            }
                        };
                        self.mw.branch(opcode, target);
                    }
                    _ => {
                        self.mw.branch(instr::if_icmp_op(rel), target);
                    }
                }
            }
            ExprKind::CmpZero { op, operand } => {
                self.expr(operand)?;
                let rel = if jump_if_true { *op } else { instr::negate_cmp(*op) };
                if operand.ty.is_reference() {
                    let opcode = match rel {
                        CmpOp::Eq => opcodes::IFNULL,
                        CmpOp::Ne => opcodes::IFNONNULL,
                        other => {
                            return Err(Error::invariant(format!(
                                "ordered null comparison {:?}",
                                other
                            )))
                        }
                    };
                    self.mw.branch(opcode, target);
                } else {
                    self.mw.branch(instr::if_op(rel), target);
                }
            }
            ExprKind::And(exprs) => {
                if jump_if_true {
                    // Jump only when every operand holds: fail label
                    // short-circuits the rest.
                    let fail = self.mw.new_label();
                    let (last, init) = exprs
                        .split_last()
                        .ok_or_else(|| Error::invariant("empty 'and'"))?;
                    for e in init {
                        self.cond_branch(e, fail, false)?;
                    }
                    self.cond_branch(last, target, true)?;
                    self.mw.place(fail)?;
                } else {
                    for e in exprs {
                        self.cond_branch(e, target, false)?;
                    }
                }
            }
            ExprKind::Or(exprs) => {
                if jump_if_true {
                    for e in exprs {
                        self.cond_branch(e, target, true)?;
                    }
                } else {
                    let then_label = self.mw.new_label();
                    let (last, init) = exprs
                        .split_last()
                        .ok_or_else(|| Error::invariant("empty 'or'"))?;
                    for e in init {
                        self.cond_branch(e, then_label, true)?;
                    }
                    self.cond_branch(last, target, false)?;
                    self.mw.place(then_label)?;
                }
            }
            ExprKind::Not(inner) => {
                self.cond_branch(inner, target, !jump_if_true)?;
            }
            ExprKind::Literal(Lit::Bool(value)) => {
                if *value == jump_if_true {
                    self.mw.goto_(target);
                }
            }
            _ => {
                // Anything else materializes a 0/1 boolean.
                self.expr(node)?;
                let opcode = if jump_if_true { opcodes::IFNE } else { opcodes::IFEQ };
                self.mw.branch(opcode, target);
            }
        }
        Ok(())
    }
}
