//! Dominator tree construction and dominance frontiers.
//!
//! Implements the simple form of the Lengauer–Tarjan algorithm with path
//! compression. Blocks are addressed by their DFS preorder index; only
//! blocks reachable from the entry participate, so unreachable blocks
//! never receive combinators during SSA conversion.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use super::func::{CodeId, IrFunction};

/// Sentinel preorder index for "no node".
pub const UNDEF: usize = usize::MAX;

/// Dominance information over the blocks reachable from the entry.
pub struct DomTree {
    /// Reachable blocks in DFS preorder; index 0 is the entry.
    pub order: Vec<CodeId>,
    /// Preorder index per reachable block.
    pub index: FxHashMap<CodeId, usize>,
    /// Immediate dominator per preorder index; [`UNDEF`] for the entry.
    pub idom: Vec<usize>,
    /// Dominance frontier per preorder index.
    pub frontier: Vec<BTreeSet<usize>>,
}

fn preorder_dfs(
    func: &IrFunction,
    code: CodeId,
    order: &mut Vec<CodeId>,
    index: &mut FxHashMap<CodeId, usize>,
    parent: &mut Vec<usize>,
    from: usize,
) {
    if index.contains_key(&code) {
        return;
    }
    let i = order.len();
    index.insert(code, i);
    order.push(code);
    parent.push(from);
    for &succ in func.code(code).succs() {
        preorder_dfs(func, succ, order, index, parent, i);
    }
}

// Path compression: point `best[v]` at the minimum-semidominator node on
// the ancestor chain and splice the chain.
fn compress(ancestor: &mut [usize], best: &mut [usize], semi: &[usize], v: usize) {
    let a = ancestor[v];
    if a == UNDEF {
        return;
    }
    compress(ancestor, best, semi, a);
    if semi[best[v]] > semi[best[a]] {
        best[v] = best[a];
    }
    ancestor[v] = ancestor[a];
}

fn eval(ancestor: &mut [usize], best: &mut [usize], semi: &[usize], v: usize) -> usize {
    if ancestor[v] == UNDEF {
        v
    } else {
        compress(ancestor, best, semi, v);
        best[v]
    }
}

impl DomTree {
    /// Compute immediate dominators and dominance frontiers for the
    /// blocks reachable from `func`'s entry.
    pub fn compute(func: &IrFunction) -> DomTree {
        let mut order = Vec::new();
        let mut index = FxHashMap::default();
        let mut parent = Vec::new();
        preorder_dfs(func, func.entry(), &mut order, &mut index, &mut parent, UNDEF);
        let n = order.len();

        let mut semi: Vec<usize> = (0..n).collect();
        let mut best: Vec<usize> = (0..n).collect();
        let mut ancestor = vec![UNDEF; n];
        let mut bucket: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut idom = vec![UNDEF; n];

        for w in (1..n).rev() {
            let p = parent[w];
            for &pred in func.code(order[w]).preds() {
                let Some(&v) = index.get(&pred) else { continue };
                let u = eval(&mut ancestor, &mut best, &semi, v);
                if semi[u] < semi[w] {
                    semi[w] = semi[u];
                }
            }
            bucket[semi[w]].push(w);
            ancestor[w] = p;
            for v in std::mem::take(&mut bucket[p]) {
                let u = eval(&mut ancestor, &mut best, &semi, v);
                idom[v] = if semi[u] < semi[v] { u } else { p };
            }
        }
        for w in 1..n {
            if idom[w] != semi[w] {
                idom[w] = idom[idom[w]];
            }
        }
        if n > 0 {
            idom[0] = UNDEF;
        }

        // A block with several predecessors is in the frontier of every
        // dominator of a predecessor up to (not including) its own
        // immediate dominator.
        let mut frontier: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        for i in 1..n {
            if func.code(order[i]).preds().len() < 2 {
                continue;
            }
            for &pred in func.code(order[i]).preds() {
                let Some(&p) = index.get(&pred) else { continue };
                let mut runner = p;
                while runner != idom[i] && runner != UNDEF {
                    frontier[runner].insert(i);
                    runner = idom[runner];
                }
            }
        }

        DomTree {
            order,
            index,
            idom,
            frontier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::func::Operand;
    use crate::ir::types::Prim;

    // entry -> {a, b} -> join
    fn diamond() -> (IrFunction, CodeId, CodeId, CodeId, CodeId) {
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let a = func.create_code(Some("a"));
        let b = func.create_code(Some("b"));
        let join = func.create_code(Some("join"));
        let cond = func.create_var(Prim::Bool, Some("c"));
        func.add_undefined(entry, cond);
        func.add_branch(entry, Operand::Var(cond), a, b);
        func.add_jump(a, join);
        func.add_jump(b, join);
        func.add_return0(join);
        (func, entry, a, b, join)
    }

    #[test]
    fn diamond_idoms_and_frontiers() {
        let (func, entry, a, b, join) = diamond();
        let dom = DomTree::compute(&func);
        assert_eq!(dom.order[0], entry);

        let ei = dom.index[&entry];
        let ai = dom.index[&a];
        let bi = dom.index[&b];
        let ji = dom.index[&join];
        assert_eq!(dom.idom[ei], UNDEF);
        assert_eq!(dom.idom[ai], ei);
        assert_eq!(dom.idom[bi], ei);
        // The join point is dominated by the entry, not by either arm.
        assert_eq!(dom.idom[ji], ei);
        // Each arm has the join in its frontier; the entry does not.
        assert!(dom.frontier[ai].contains(&ji));
        assert!(dom.frontier[bi].contains(&ji));
        assert!(!dom.frontier[ei].contains(&ji));
    }

    #[test]
    fn loop_header_is_its_own_frontier() {
        // entry -> head; head -> head (backedge) and head -> exit.
        let mut func = IrFunction::new("f", "entry", &[]);
        let entry = func.entry();
        let head = func.create_code(Some("head"));
        let exit = func.create_code(Some("exit"));
        let cond = func.create_var(Prim::Bool, Some("c"));
        func.add_undefined(entry, cond);
        func.add_jump(entry, head);
        func.add_branch(head, Operand::Var(cond), head, exit);
        func.add_return0(exit);

        let dom = DomTree::compute(&func);
        let hi = dom.index[&head];
        let xi = dom.index[&exit];
        assert_eq!(dom.idom[hi], dom.index[&entry]);
        assert_eq!(dom.idom[xi], hi);
        assert!(dom.frontier[hi].contains(&hi));
    }

    #[test]
    fn unreachable_blocks_are_excluded() {
        let (mut func, ..) = diamond();
        let orphan = func.create_code(Some("orphan"));
        func.add_return0(orphan);

        let dom = DomTree::compute(&func);
        assert_eq!(dom.order.len(), 4);
        assert!(!dom.index.contains_key(&orphan));
    }
}
