//! The IR data model: functions, code blocks, variables, instructions.
//!
//! An [`IrFunction`] is the sole owner of everything it contains. Blocks,
//! variables, and instructions live in slot vectors indexed by [`CodeId`],
//! [`VarId`], and [`InsnId`]; every cross-reference (operands, use sets,
//! assignment lists, predecessor/successor sets) is an id, never a second
//! owner. Ids are handed out in allocation order and never reused, so the
//! `BTreeSet`s used for the relation sets iterate deterministically.
//!
//! Builder operations validate their arguments and keep the
//! cross-references consistent; a malformed request is a caller bug and
//! goes to the diagnostic sink.

use std::collections::BTreeSet;

use smallvec::SmallVec;

use crate::bug;

use super::types::{BinaryOp, Const, Prim, UnaryOp};

/// Handle to a variable owned by an [`IrFunction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub(crate) u32);

/// Handle to a code block owned by an [`IrFunction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CodeId(pub(crate) u32);

/// Handle to an instruction owned by an [`IrFunction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InsnId(pub(crate) u32);

/// An expression operand: a constant or a reference to a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Const(Const),
    Var(VarId),
}

impl Operand {
    pub fn is_const(self) -> bool {
        matches!(self, Operand::Const(_))
    }

    pub fn as_var(self) -> Option<VarId> {
        match self {
            Operand::Var(v) => Some(v),
            Operand::Const(_) => None,
        }
    }
}

/// One incoming edge of a combinator: the value `bind` flows in when
/// control arrives from block `prev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombinatorEntry {
    pub prev: CodeId,
    pub bind: Operand,
}

/// Expression payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    /// Phi: selects one bind per predecessor block.
    Combinator(SmallVec<[CombinatorEntry; 2]>),
    Unary { op: UnaryOp, value: Operand },
    Binary { op: BinaryOp, lhs: Operand, rhs: Operand },
    /// Marks the destination as having an unspecified value.
    Undefined,
}

/// An expression: computes a value into a destination variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub dest: VarId,
    pub kind: ExprKind,
}

/// Control flow payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Jump {
        target: CodeId,
    },
    /// Two-way conditional: `then_target` when the condition is true,
    /// `else_target` otherwise.
    Branch {
        cond: Operand,
        then_target: CodeId,
        else_target: CodeId,
    },
    CallDirect {
        label: String,
        args: SmallVec<[Operand; 4]>,
    },
    CallPtr {
        addr: Operand,
        args: SmallVec<[Operand; 4]>,
    },
    Return {
        value: Option<Operand>,
    },
}

/// An instruction: either an expression or a control flow transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsnKind {
    Expr(Expr),
    Flow(Flow),
}

/// An instruction record, owned by its parent block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insn {
    pub parent: CodeId,
    pub kind: InsnKind,
}

impl Insn {
    pub fn is_expr(&self) -> bool {
        matches!(self.kind, InsnKind::Expr(_))
    }

    pub fn as_expr(&self) -> Option<&Expr> {
        match &self.kind {
            InsnKind::Expr(e) => Some(e),
            InsnKind::Flow(_) => None,
        }
    }
}

/// A variable. Parameters are variables with an empty assignment list.
#[derive(Debug, Clone)]
pub struct Var {
    pub(crate) name: String,
    pub(crate) prim: Prim,
    /// Instructions that read this variable in any operand position.
    pub(crate) uses: BTreeSet<InsnId>,
    /// Expressions whose destination is this variable, in append order.
    pub(crate) assignments: Vec<InsnId>,
}

impl Var {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prim(&self) -> Prim {
        self.prim
    }

    pub fn uses(&self) -> &BTreeSet<InsnId> {
        &self.uses
    }

    pub fn assignments(&self) -> &[InsnId] {
        &self.assignments
    }
}

/// A code block: a named, ordered list of instructions plus the CFG
/// edge sets.
#[derive(Debug, Clone)]
pub struct CodeBlock {
    pub(crate) name: String,
    pub(crate) insns: Vec<InsnId>,
    pub(crate) preds: BTreeSet<CodeId>,
    pub(crate) succs: BTreeSet<CodeId>,
}

impl CodeBlock {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insns(&self) -> &[InsnId] {
        &self.insns
    }

    pub fn preds(&self) -> &BTreeSet<CodeId> {
        &self.preds
    }

    pub fn succs(&self) -> &BTreeSet<CodeId> {
        &self.succs
    }
}

/// A function: the owner of all of its variables, blocks, and
/// instructions.
#[derive(Debug, Clone)]
pub struct IrFunction {
    pub(crate) name: String,
    pub(crate) args: Vec<VarId>,
    pub(crate) entry: CodeId,
    pub(crate) vars: Vec<Option<Var>>,
    pub(crate) codes: Vec<Option<CodeBlock>>,
    pub(crate) insns: Vec<Option<Insn>>,
    pub(crate) enforce_ssa: bool,
}

impl IrFunction {
    /// Create a function with one parameter per element of `arg_names`
    /// (typed `S32`) and an empty entry block.
    pub fn new(name: &str, entry_name: &str, arg_names: &[&str]) -> Self {
        let mut func = IrFunction {
            name: name.to_string(),
            args: Vec::new(),
            entry: CodeId(0),
            vars: Vec::new(),
            codes: Vec::new(),
            insns: Vec::new(),
            enforce_ssa: false,
        };
        for arg in arg_names {
            let var = func.create_var(Prim::S32, Some(arg));
            func.args.push(var);
        }
        func.entry = func.create_code(Some(entry_name));
        func
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[VarId] {
        &self.args
    }

    pub fn entry(&self) -> CodeId {
        self.entry
    }

    /// Whether SSA form is being enforced (set by SSA conversion).
    pub fn enforce_ssa(&self) -> bool {
        self.enforce_ssa
    }

    /// Create a new variable. An omitted name is replaced by the current
    /// live variable count in decimal, so avoid explicit names that are
    /// plain decimal numbers.
    pub fn create_var(&mut self, prim: Prim, name: Option<&str>) -> VarId {
        let name = match name {
            Some(n) => n.to_string(),
            None => self.vars().count().to_string(),
        };
        let id = VarId(self.vars.len() as u32);
        self.vars.push(Some(Var {
            name,
            prim,
            uses: BTreeSet::new(),
            assignments: Vec::new(),
        }));
        id
    }

    /// Create a new code block. Unnamed blocks get the current live block
    /// count in decimal, like [`IrFunction::create_var`].
    pub fn create_code(&mut self, name: Option<&str>) -> CodeId {
        let name = match name {
            Some(n) => n.to_string(),
            None => self.codes().count().to_string(),
        };
        let id = CodeId(self.codes.len() as u32);
        self.codes.push(Some(CodeBlock {
            name,
            insns: Vec::new(),
            preds: BTreeSet::new(),
            succs: BTreeSet::new(),
        }));
        id
    }

    pub fn var(&self, id: VarId) -> &Var {
        match self.vars.get(id.0 as usize).and_then(|slot| slot.as_ref()) {
            Some(var) => var,
            None => bug!("IR variable id {} is stale", id.0),
        }
    }

    pub fn code(&self, id: CodeId) -> &CodeBlock {
        match self.codes.get(id.0 as usize).and_then(|slot| slot.as_ref()) {
            Some(code) => code,
            None => bug!("IR code block id {} is stale", id.0),
        }
    }

    pub fn insn(&self, id: InsnId) -> &Insn {
        match self.insns.get(id.0 as usize).and_then(|slot| slot.as_ref()) {
            Some(insn) => insn,
            None => bug!("IR instruction id {} is stale", id.0),
        }
    }

    /// Live variables in allocation order.
    pub fn vars(&self) -> impl Iterator<Item = (VarId, &Var)> {
        self.vars
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (VarId(i as u32), v)))
    }

    /// Live code blocks in allocation order.
    pub fn codes(&self) -> impl Iterator<Item = (CodeId, &CodeBlock)> {
        self.codes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|c| (CodeId(i as u32), c)))
    }

    /// The type of an operand.
    pub fn operand_prim(&self, operand: Operand) -> Prim {
        match operand {
            Operand::Const(c) => c.prim,
            Operand::Var(v) => self.var(v).prim,
        }
    }

    pub(crate) fn var_mut(&mut self, id: VarId) -> &mut Var {
        match self.vars.get_mut(id.0 as usize).and_then(|slot| slot.as_mut()) {
            Some(var) => var,
            None => bug!("IR variable id {} is stale", id.0),
        }
    }

    pub(crate) fn code_mut(&mut self, id: CodeId) -> &mut CodeBlock {
        match self.codes.get_mut(id.0 as usize).and_then(|slot| slot.as_mut()) {
            Some(code) => code,
            None => bug!("IR code block id {} is stale", id.0),
        }
    }

    pub(crate) fn insn_mut(&mut self, id: InsnId) -> &mut Insn {
        match self.insns.get_mut(id.0 as usize).and_then(|slot| slot.as_mut()) {
            Some(insn) => insn,
            None => bug!("IR instruction id {} is stale", id.0),
        }
    }

    pub(crate) fn is_live_code(&self, id: CodeId) -> bool {
        self.codes
            .get(id.0 as usize)
            .is_some_and(|slot| slot.is_some())
    }

    pub(crate) fn is_live_insn(&self, id: InsnId) -> bool {
        self.insns
            .get(id.0 as usize)
            .is_some_and(|slot| slot.is_some())
    }

    pub(crate) fn is_live_var(&self, id: VarId) -> bool {
        self.vars
            .get(id.0 as usize)
            .is_some_and(|slot| slot.is_some())
    }

    // Allocate an instruction slot without attaching it to its block's
    // instruction list; the caller decides the position.
    pub(crate) fn alloc_insn(&mut self, parent: CodeId, kind: InsnKind) -> InsnId {
        let id = InsnId(self.insns.len() as u32);
        self.insns.push(Some(Insn { parent, kind }));
        id
    }

    fn add_use(&mut self, operand: Operand, insn: InsnId) {
        if let Operand::Var(v) = operand {
            self.var_mut(v).uses.insert(insn);
        }
    }

    fn remove_use(&mut self, operand: Operand, insn: InsnId) {
        if let Operand::Var(v) = operand {
            if let Some(var) = self.vars.get_mut(v.0 as usize).and_then(|s| s.as_mut()) {
                var.uses.remove(&insn);
            }
        }
    }

    // Terminator ordering: nothing but another flow transfer may follow a
    // jump or branch.
    fn check_open(&self, code: CodeId, what: &str) {
        if let Some(&last) = self.code(code).insns.last() {
            if let InsnKind::Flow(Flow::Jump { .. } | Flow::Branch { .. }) = self.insn(last).kind {
                bug!("Cannot have {} after jump or branch", what);
            }
        }
    }

    fn check_ssa_assign(&self, dest: VarId) {
        if self.enforce_ssa && !self.var(dest).assignments.is_empty() {
            bug!("SSA IR variable %{} assigned twice", self.var(dest).name);
        }
    }

    /// Append a unary expression.
    pub fn add_unary(&mut self, code: CodeId, dest: VarId, op: UnaryOp, value: Operand) {
        self.check_open(code, "expr");
        match op {
            UnaryOp::Seqz | UnaryOp::Snez => {
                if self.var(dest).prim != Prim::Bool {
                    bug!("IR {} must return a boolean", op.name());
                }
            }
            UnaryOp::Mov => {}
            _ => {
                if self.operand_prim(value) != self.var(dest).prim {
                    bug!("IR expr1 has conflicting operand and return types");
                }
            }
        }
        self.check_ssa_assign(dest);
        let id = self.alloc_insn(
            code,
            InsnKind::Expr(Expr {
                dest,
                kind: ExprKind::Unary { op, value },
            }),
        );
        self.add_use(value, id);
        self.var_mut(dest).assignments.push(id);
        self.code_mut(code).insns.push(id);
    }

    /// Append a binary expression.
    pub fn add_binary(
        &mut self,
        code: CodeId,
        dest: VarId,
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
    ) {
        self.check_open(code, "expr");
        if self.operand_prim(lhs) != self.var(dest).prim
            || self.operand_prim(rhs) != self.var(dest).prim
        {
            bug!("IR expr2 has conflicting operand and return types");
        }
        self.check_ssa_assign(dest);
        let id = self.alloc_insn(
            code,
            InsnKind::Expr(Expr {
                dest,
                kind: ExprKind::Binary { op, lhs, rhs },
            }),
        );
        self.add_use(lhs, id);
        self.add_use(rhs, id);
        self.var_mut(dest).assignments.push(id);
        self.code_mut(code).insns.push(id);
    }

    /// Append an expression marking `dest` as undefined.
    pub fn add_undefined(&mut self, code: CodeId, dest: VarId) {
        self.check_open(code, "expr");
        self.check_ssa_assign(dest);
        let id = self.alloc_insn(
            code,
            InsnKind::Expr(Expr {
                dest,
                kind: ExprKind::Undefined,
            }),
        );
        self.var_mut(dest).assignments.push(id);
        self.code_mut(code).insns.push(id);
    }

    /// Append a combinator. There must be exactly one entry per
    /// predecessor of `code`, each naming a distinct predecessor.
    pub fn add_combinator(&mut self, code: CodeId, dest: VarId, entries: Vec<CombinatorEntry>) {
        self.check_open(code, "expr");
        self.check_ssa_assign(dest);
        {
            let preds = &self.code(code).preds;
            if entries.len() != preds.len() {
                bug!(
                    "IR phi arity does not match predecessors of <{}>",
                    self.code(code).name
                );
            }
            let mut seen = BTreeSet::new();
            for entry in &entries {
                if !preds.contains(&entry.prev) || !seen.insert(entry.prev) {
                    bug!(
                        "IR phi binds a block that is not a distinct predecessor of <{}>",
                        self.code(code).name
                    );
                }
            }
        }
        for entry in &entries {
            if self.operand_prim(entry.bind) != self.var(dest).prim {
                bug!("IR phi has conflicting bind and return types");
            }
        }
        let id = self.alloc_insn(
            code,
            InsnKind::Expr(Expr {
                dest,
                kind: ExprKind::Combinator(entries.iter().copied().collect()),
            }),
        );
        for entry in entries {
            self.add_use(entry.bind, id);
        }
        self.var_mut(dest).assignments.push(id);
        self.code_mut(code).insns.push(id);
    }

    /// Append an unconditional jump, maintaining both edge sets.
    pub fn add_jump(&mut self, from: CodeId, to: CodeId) {
        let id = self.alloc_insn(from, InsnKind::Flow(Flow::Jump { target: to }));
        self.code_mut(from).succs.insert(to);
        self.code_mut(to).preds.insert(from);
        self.code_mut(from).insns.push(id);
    }

    /// Append a two-way conditional branch, maintaining both edge sets.
    pub fn add_branch(
        &mut self,
        from: CodeId,
        cond: Operand,
        then_target: CodeId,
        else_target: CodeId,
    ) {
        if self.operand_prim(cond) != Prim::Bool {
            bug!("IR branch requires a boolean condition");
        }
        let id = self.alloc_insn(
            from,
            InsnKind::Flow(Flow::Branch {
                cond,
                then_target,
                else_target,
            }),
        );
        self.add_use(cond, id);
        self.code_mut(from).succs.insert(then_target);
        self.code_mut(then_target).preds.insert(from);
        self.code_mut(from).succs.insert(else_target);
        self.code_mut(else_target).preds.insert(from);
        self.code_mut(from).insns.push(id);
    }

    /// Append a direct (by label) function call.
    pub fn add_call_direct(&mut self, code: CodeId, label: &str, args: &[Operand]) {
        self.check_open(code, "call");
        let id = self.alloc_insn(
            code,
            InsnKind::Flow(Flow::CallDirect {
                label: label.to_string(),
                args: args.iter().copied().collect(),
            }),
        );
        for &arg in args {
            self.add_use(arg, id);
        }
        self.code_mut(code).insns.push(id);
    }

    /// Append an indirect (by pointer) function call.
    pub fn add_call_ptr(&mut self, code: CodeId, addr: Operand, args: &[Operand]) {
        self.check_open(code, "call");
        let id = self.alloc_insn(
            code,
            InsnKind::Flow(Flow::CallPtr {
                addr,
                args: args.iter().copied().collect(),
            }),
        );
        self.add_use(addr, id);
        for &arg in args {
            self.add_use(arg, id);
        }
        self.code_mut(code).insns.push(id);
    }

    /// Append a return without a value.
    pub fn add_return0(&mut self, code: CodeId) {
        self.check_open(code, "return");
        let id = self.alloc_insn(code, InsnKind::Flow(Flow::Return { value: None }));
        self.code_mut(code).insns.push(id);
    }

    /// Append a return with a value.
    pub fn add_return1(&mut self, code: CodeId, value: Operand) {
        self.check_open(code, "return");
        let id = self.alloc_insn(code, InsnKind::Flow(Flow::Return { value: Some(value) }));
        self.add_use(value, id);
        self.code_mut(code).insns.push(id);
    }

    /// Delete an instruction, unregistering it from its block's
    /// instruction list, its operands' use sets, and (for expressions)
    /// its destination's assignment list. The block's edge sets are left
    /// alone; that is the job of [`IrFunction::delete_code`] and
    /// [`IrFunction::recalc_flow`].
    pub fn delete_insn(&mut self, id: InsnId) {
        let insn = match self.insns.get_mut(id.0 as usize).and_then(|slot| slot.take()) {
            Some(insn) => insn,
            None => bug!("IR instruction id {} is stale", id.0),
        };
        if self.is_live_code(insn.parent) {
            self.code_mut(insn.parent).insns.retain(|&i| i != id);
        }
        match insn.kind {
            InsnKind::Expr(expr) => {
                if self.is_live_var(expr.dest) {
                    self.var_mut(expr.dest).assignments.retain(|&e| e != id);
                }
                match expr.kind {
                    ExprKind::Combinator(entries) => {
                        for entry in entries {
                            self.remove_use(entry.bind, id);
                        }
                    }
                    ExprKind::Unary { value, .. } => self.remove_use(value, id),
                    ExprKind::Binary { lhs, rhs, .. } => {
                        self.remove_use(lhs, id);
                        self.remove_use(rhs, id);
                    }
                    ExprKind::Undefined => {}
                }
            }
            InsnKind::Flow(flow) => match flow {
                Flow::Jump { .. } => {}
                Flow::Branch { cond, .. } => self.remove_use(cond, id),
                Flow::CallDirect { args, .. } => {
                    for arg in args {
                        self.remove_use(arg, id);
                    }
                }
                Flow::CallPtr { addr, args } => {
                    self.remove_use(addr, id);
                    for arg in args {
                        self.remove_use(arg, id);
                    }
                }
                Flow::Return { value } => {
                    if let Some(value) = value {
                        self.remove_use(value, id);
                    }
                }
            },
        }
    }

    /// Delete a variable along with every instruction that reads or
    /// assigns it.
    pub fn delete_var(&mut self, id: VarId) {
        let mut doomed: BTreeSet<InsnId> = self.var(id).uses.iter().copied().collect();
        doomed.extend(self.var(id).assignments.iter().copied());
        for insn in doomed {
            self.delete_insn(insn);
        }
        self.args.retain(|&a| a != id);
        self.vars[id.0 as usize] = None;
    }

    /// Rewrite every read of `var` to `value`. Assignments are not
    /// rewritten and the variable itself is not deleted.
    pub fn replace_var(&mut self, var: VarId, value: Operand) {
        if value == Operand::Var(var) {
            bug!(
                "IR variable %{} asked to be replaced with itself",
                self.var(var).name
            );
        }
        let uses: Vec<InsnId> = self.var(var).uses.iter().copied().collect();
        for insn_id in uses {
            let mut replaced = false;
            let mut rewrite = |operand: &mut Operand| {
                if *operand == Operand::Var(var) {
                    *operand = value;
                    replaced = true;
                }
            };
            match &mut self.insn_mut(insn_id).kind {
                InsnKind::Expr(expr) => match &mut expr.kind {
                    ExprKind::Combinator(entries) => {
                        for entry in entries {
                            rewrite(&mut entry.bind);
                        }
                    }
                    ExprKind::Unary { value, .. } => rewrite(value),
                    ExprKind::Binary { lhs, rhs, .. } => {
                        rewrite(lhs);
                        rewrite(rhs);
                    }
                    ExprKind::Undefined => {}
                },
                InsnKind::Flow(flow) => match flow {
                    Flow::Jump { .. } => {}
                    Flow::Branch { cond, .. } => rewrite(cond),
                    Flow::CallDirect { args, .. } => {
                        for arg in args {
                            rewrite(arg);
                        }
                    }
                    Flow::CallPtr { addr, args } => {
                        rewrite(addr);
                        for arg in args {
                            rewrite(arg);
                        }
                    }
                    Flow::Return { value } => {
                        if let Some(value) = value {
                            rewrite(value);
                        }
                    }
                },
            }
            if replaced {
                if let Operand::Var(to) = value {
                    self.var_mut(to).uses.insert(insn_id);
                }
            }
        }
        self.var_mut(var).uses.clear();
    }

    // Whether any operand position of `insn` still references `var`.
    fn insn_references(&self, insn: InsnId, var: VarId) -> bool {
        let hit = |operand: &Operand| *operand == Operand::Var(var);
        match &self.insn(insn).kind {
            InsnKind::Expr(expr) => match &expr.kind {
                ExprKind::Combinator(entries) => entries.iter().any(|e| hit(&e.bind)),
                ExprKind::Unary { value, .. } => hit(value),
                ExprKind::Binary { lhs, rhs, .. } => hit(lhs) || hit(rhs),
                ExprKind::Undefined => false,
            },
            InsnKind::Flow(flow) => match flow {
                Flow::Jump { .. } => false,
                Flow::Branch { cond, .. } => hit(cond),
                Flow::CallDirect { args, .. } => args.iter().any(hit),
                Flow::CallPtr { addr, args } => hit(addr) || args.iter().any(hit),
                Flow::Return { value } => value.as_ref().map_or(false, hit),
            },
        }
    }

    // Drop the use-set entry of `var` for `insn` unless another operand
    // position still references it.
    pub(crate) fn remove_use_if_unreferenced(&mut self, insn: InsnId, var: VarId) {
        if self.is_live_var(var) && !self.insn_references(insn, var) {
            self.var_mut(var).uses.remove(&insn);
        }
    }

    // Turn a branch into an unconditional jump to `target`, dropping the
    // condition's use entry. The caller maintains the edge sets.
    pub(crate) fn rewrite_branch_to_jump(&mut self, insn: InsnId, target: CodeId) {
        let cond = match &self.insn(insn).kind {
            InsnKind::Flow(Flow::Branch { cond, .. }) => *cond,
            _ => bug!("IR instruction id {} is not a branch", insn.0),
        };
        self.insn_mut(insn).kind = InsnKind::Flow(Flow::Jump { target });
        if let Operand::Var(v) = cond {
            self.remove_use_if_unreferenced(insn, v);
        }
    }

    // Drop the combinator entry arriving from `pred`. A combinator left
    // with a single entry selects nothing: its destination is replaced by
    // the sole bind and the combinator deleted. A self-referential sole
    // bind means the value is undefined; the combinator is deleted with
    // no replacement.
    pub(crate) fn remove_combinator_path(&mut self, insn: InsnId, pred: CodeId) {
        let (dest, removed_bind, remaining) = {
            let expr = match &mut self.insn_mut(insn).kind {
                InsnKind::Expr(expr) => expr,
                InsnKind::Flow(_) => bug!("IR instruction id {} is not a combinator", insn.0),
            };
            let dest = expr.dest;
            let entries = match &mut expr.kind {
                ExprKind::Combinator(entries) => entries,
                _ => bug!("IR instruction id {} is not a combinator", insn.0),
            };
            let removed_bind = entries
                .iter()
                .position(|e| e.prev == pred)
                .map(|pos| entries.remove(pos).bind);
            (dest, removed_bind, entries.len())
        };
        if let Some(Operand::Var(v)) = removed_bind {
            self.remove_use_if_unreferenced(insn, v);
        }
        if remaining == 1 {
            let sole = match &self.insn(insn).kind {
                InsnKind::Expr(Expr {
                    kind: ExprKind::Combinator(entries),
                    ..
                }) => entries[0].bind,
                _ => unreachable!(),
            };
            if sole == Operand::Var(dest) {
                self.delete_insn(insn);
            } else {
                self.replace_var(dest, sole);
                self.delete_insn(insn);
            }
        }
    }

    /// Delete a code block and every instruction in it. Terminators in
    /// predecessors that target the block are deleted (or, for a branch
    /// with one surviving side, rewritten to a jump); combinators in
    /// successors drop the corresponding entry.
    pub fn delete_code(&mut self, id: CodeId) {
        let preds: Vec<CodeId> = self.code(id).preds.iter().copied().collect();
        for pred in preds {
            self.code_mut(pred).succs.remove(&id);
            let insns = self.code(pred).insns.clone();
            for insn in insns {
                if !self.is_live_insn(insn) {
                    continue;
                }
                match &self.insn(insn).kind {
                    InsnKind::Flow(Flow::Jump { target }) if *target == id => {
                        self.delete_insn(insn);
                    }
                    InsnKind::Flow(Flow::Branch {
                        then_target,
                        else_target,
                        ..
                    }) => {
                        let (then_target, else_target) = (*then_target, *else_target);
                        if then_target == id && else_target == id {
                            self.delete_insn(insn);
                        } else if then_target == id {
                            self.rewrite_branch_to_jump(insn, else_target);
                        } else if else_target == id {
                            self.rewrite_branch_to_jump(insn, then_target);
                        }
                    }
                    _ => {}
                }
            }
        }
        let succs: Vec<CodeId> = self.code(id).succs.iter().copied().collect();
        for succ in succs {
            if !self.is_live_code(succ) {
                continue;
            }
            self.code_mut(succ).preds.remove(&id);
            let insns = self.code(succ).insns.clone();
            for insn in insns {
                if !self.is_live_insn(insn) {
                    continue;
                }
                if matches!(
                    self.insn(insn).kind,
                    InsnKind::Expr(Expr {
                        kind: ExprKind::Combinator(_),
                        ..
                    })
                ) {
                    self.remove_combinator_path(insn, id);
                }
            }
        }
        let insns = self.code(id).insns.clone();
        for insn in insns {
            if self.is_live_insn(insn) {
                self.delete_insn(insn);
            }
        }
        self.codes[id.0 as usize] = None;
    }

    /// Rebuild every block's predecessor and successor sets from the jump
    /// and branch instructions. Used by passes that rewrite terminators
    /// without maintaining the edge sets incrementally.
    pub fn recalc_flow(&mut self) {
        let ids: Vec<CodeId> = self.codes().map(|(id, _)| id).collect();
        for &id in &ids {
            let code = self.code_mut(id);
            code.preds.clear();
            code.succs.clear();
        }
        for &id in &ids {
            let insns = self.code(id).insns.clone();
            for insn in insns {
                let mut targets: SmallVec<[CodeId; 2]> = SmallVec::new();
                match &self.insn(insn).kind {
                    InsnKind::Flow(Flow::Jump { target }) => targets.push(*target),
                    InsnKind::Flow(Flow::Branch {
                        then_target,
                        else_target,
                        ..
                    }) => {
                        targets.push(*then_target);
                        targets.push(*else_target);
                    }
                    _ => {}
                }
                for target in targets {
                    self.code_mut(id).succs.insert(target);
                    self.code_mut(target).preds.insert(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::diag;

    #[test]
    fn unnamed_vars_and_codes_get_decimal_names() {
        let mut func = IrFunction::new("f", "entry", &["a"]);
        let v = func.create_var(Prim::S32, None);
        assert_eq!(func.var(v).name(), "1");
        let c = func.create_code(None);
        assert_eq!(func.code(c).name(), "1");
    }

    #[test]
    fn builders_maintain_use_and_assignment_sets() {
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let a = func.create_var(Prim::S32, Some("a"));
        let b = func.create_var(Prim::S32, Some("b"));
        func.add_unary(entry, a, UnaryOp::Mov, Operand::Const(Const::int(Prim::S32, 7)));
        func.add_binary(entry, b, BinaryOp::Add, Operand::Var(a), Operand::Var(a));
        func.add_return1(entry, Operand::Var(b));

        assert_eq!(func.var(a).assignments().len(), 1);
        assert_eq!(func.var(a).uses().len(), 1);
        assert_eq!(func.var(b).assignments().len(), 1);
        assert_eq!(func.var(b).uses().len(), 1);
    }

    #[test]
    fn jump_and_branch_maintain_edge_symmetry() {
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let yes = func.create_code(Some("yes"));
        let no = func.create_code(Some("no"));
        let cond = func.create_var(Prim::Bool, Some("c"));
        func.add_undefined(entry, cond);
        func.add_branch(entry, Operand::Var(cond), yes, no);

        assert!(func.code(entry).succs().contains(&yes));
        assert!(func.code(entry).succs().contains(&no));
        assert!(func.code(yes).preds().contains(&entry));
        assert!(func.code(no).preds().contains(&entry));

        func.add_jump(yes, no);
        assert!(func.code(yes).succs().contains(&no));
        assert!(func.code(no).preds().contains(&yes));
    }

    #[test]
    fn recalc_flow_is_idempotent() {
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let next = func.create_code(Some("next"));
        func.add_jump(entry, next);
        func.add_return0(next);

        func.recalc_flow();
        let preds: Vec<_> = func.code(next).preds().iter().copied().collect();
        let succs: Vec<_> = func.code(entry).succs().iter().copied().collect();
        func.recalc_flow();
        assert_eq!(
            preds,
            func.code(next).preds().iter().copied().collect::<Vec<_>>()
        );
        assert_eq!(
            succs,
            func.code(entry).succs().iter().copied().collect::<Vec<_>>()
        );
    }

    #[test]
    fn replace_var_rewrites_reads_but_not_assignments() {
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let a = func.create_var(Prim::S32, Some("a"));
        let b = func.create_var(Prim::S32, Some("b"));
        let seven = Operand::Const(Const::int(Prim::S32, 7));
        func.add_unary(entry, a, UnaryOp::Mov, seven);
        func.add_binary(entry, b, BinaryOp::Add, Operand::Var(a), Operand::Var(a));
        func.add_return1(entry, Operand::Var(b));

        func.replace_var(a, seven);
        assert!(func.var(a).uses().is_empty());
        assert_eq!(func.var(a).assignments().len(), 1);
        // a survives in the variable list: replacement rewrites reads only.
        assert!(func.vars().any(|(id, _)| id == a));
        let add = func.var(b).assignments()[0];
        match &func.insn(add).kind {
            InsnKind::Expr(Expr {
                kind: ExprKind::Binary { lhs, rhs, .. },
                ..
            }) => {
                assert_eq!(*lhs, seven);
                assert_eq!(*rhs, seven);
            }
            other => panic!("expected binary expression, got {other:?}"),
        }
        assert!(func
            .to_string()
            .contains("add %b, s32'0x00000007, s32'0x00000007"));
    }

    #[test]
    fn replace_var_only_touches_matching_call_args() {
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let a = func.create_var(Prim::S32, Some("a"));
        let b = func.create_var(Prim::S32, Some("b"));
        func.add_undefined(entry, a);
        func.add_undefined(entry, b);
        func.add_call_direct(entry, "callee", &[Operand::Var(a), Operand::Var(b)]);

        func.replace_var(a, Operand::Const(Const::int(Prim::S32, 1)));
        let call = *func.var(b).uses().iter().next().expect("b still used");
        match &func.insn(call).kind {
            InsnKind::Flow(Flow::CallDirect { args, .. }) => {
                assert_eq!(args[0], Operand::Const(Const::int(Prim::S32, 1)));
                assert_eq!(args[1], Operand::Var(b));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn delete_var_cascades_to_reading_instructions() {
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let a = func.create_var(Prim::S32, Some("a"));
        let b = func.create_var(Prim::S32, Some("b"));
        func.add_unary(entry, a, UnaryOp::Mov, Operand::Const(Const::int(Prim::S32, 1)));
        func.add_binary(entry, b, BinaryOp::Add, Operand::Var(a), Operand::Var(a));
        func.add_return0(entry);

        func.delete_var(a);
        // Both the assignment of a and the read of a are gone; b's
        // assignment list emptied out along the way.
        assert_eq!(func.code(entry).insns().len(), 1);
        assert!(func.var(b).assignments().is_empty());
    }

    #[test]
    fn delete_var_leaves_no_references_behind() {
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let v = func.create_var(Prim::S32, Some("victim"));
        let w = func.create_var(Prim::S32, Some("w"));
        func.add_unary(entry, v, UnaryOp::Mov, Operand::Const(Const::int(Prim::S32, 1)));
        func.add_binary(
            entry,
            w,
            BinaryOp::Add,
            Operand::Var(v),
            Operand::Const(Const::int(Prim::S32, 1)),
        );
        func.add_call_direct(entry, "sink", &[Operand::Var(v), Operand::Var(w)]);
        func.add_return0(entry);

        func.delete_var(v);
        assert!(!func.to_string().contains("%victim"));
        assert!(func.var(w).uses().is_empty());
        assert!(func.var(w).assignments().is_empty());
    }

    #[test]
    fn delete_code_rewrites_one_sided_branches() {
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let yes = func.create_code(Some("yes"));
        let no = func.create_code(Some("no"));
        let cond = func.create_var(Prim::Bool, Some("c"));
        func.add_undefined(entry, cond);
        func.add_branch(entry, Operand::Var(cond), yes, no);
        func.add_return0(yes);
        func.add_return0(no);

        func.delete_code(yes);
        let last = *func.code(entry).insns().last().expect("terminator");
        assert_eq!(
            func.insn(last).kind,
            InsnKind::Flow(Flow::Jump { target: no }),
        );
        // The condition is no longer read anywhere.
        assert!(func.var(cond).uses().is_empty());
        assert!(!func.code(entry).succs().contains(&yes));
    }

    #[test]
    fn arity_one_combinator_collapses_on_block_deletion() {
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let a = func.create_code(Some("a"));
        let b = func.create_code(Some("b"));
        let join = func.create_code(Some("join"));
        let cond = func.create_var(Prim::Bool, Some("c"));
        let v1 = func.create_var(Prim::S32, Some("v1"));
        let v2 = func.create_var(Prim::S32, Some("v2"));
        let x = func.create_var(Prim::S32, Some("x"));
        func.add_undefined(entry, cond);
        func.add_branch(entry, Operand::Var(cond), a, b);
        func.add_undefined(a, v1);
        func.add_jump(a, join);
        func.add_undefined(b, v2);
        func.add_jump(b, join);
        func.add_combinator(
            join,
            x,
            vec![
                CombinatorEntry { prev: a, bind: Operand::Var(v1) },
                CombinatorEntry { prev: b, bind: Operand::Var(v2) },
            ],
        );
        func.add_return1(join, Operand::Var(x));

        func.delete_code(b);
        // The combinator collapsed; the return now reads v1 directly.
        assert!(func.var(x).assignments().is_empty());
        assert!(func.var(x).uses().is_empty());
        let ret = *func.code(join).insns().last().expect("return");
        assert_eq!(
            func.insn(ret).kind,
            InsnKind::Flow(Flow::Return { value: Some(Operand::Var(v1)) })
        );
    }

    #[test]
    #[should_panic(expected = "[BUG]")]
    fn type_mismatch_is_a_bug() {
        diag::panic_on_bug(true);
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let dest = func.create_var(Prim::S32, Some("d"));
        func.add_binary(
            entry,
            dest,
            BinaryOp::Add,
            Operand::Const(Const::int(Prim::S64, 1)),
            Operand::Const(Const::int(Prim::S32, 1)),
        );
    }

    #[test]
    #[should_panic(expected = "[BUG]")]
    fn expr_after_terminator_is_a_bug() {
        diag::panic_on_bug(true);
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let next = func.create_code(Some("next"));
        func.add_jump(entry, next);
        let dest = func.create_var(Prim::S32, Some("d"));
        func.add_undefined(entry, dest);
    }

    #[test]
    #[should_panic(expected = "[BUG]")]
    fn branch_condition_must_be_boolean() {
        diag::panic_on_bug(true);
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let next = func.create_code(Some("next"));
        func.add_branch(
            entry,
            Operand::Const(Const::int(Prim::S32, 1)),
            next,
            next,
        );
    }

    #[test]
    #[should_panic(expected = "[BUG]")]
    fn self_replacement_is_a_bug() {
        diag::panic_on_bug(true);
        let mut func = IrFunction::new("f", "entry", &[]);
        let v = func.create_var(Prim::S32, Some("v"));
        func.replace_var(v, Operand::Var(v));
    }

    #[test]
    #[should_panic(expected = "[BUG]")]
    fn double_assignment_under_ssa_is_a_bug() {
        diag::panic_on_bug(true);
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let v = func.create_var(Prim::S32, Some("v"));
        func.add_undefined(entry, v);
        func.enforce_ssa = true;
        func.add_undefined(entry, v);
    }
}
