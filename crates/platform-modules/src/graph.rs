//! Pure dependency-graph algorithms over catalog edges
//!
//! Conflict edges never take part in the graph. Cycle checks consider every
//! dependency edge (required or optional); install ordering follows required
//! edges only.

use std::collections::HashMap;
use uuid::Uuid;

use crate::module::ModuleDependency;

/// A dependency cycle, as a path that starts and ends on the same module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle(pub Vec<Uuid>);

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

type Adjacency = HashMap<Uuid, Vec<Uuid>>;

fn adjacency<'a, F>(edges: impl IntoIterator<Item = &'a ModuleDependency>, keep: F) -> Adjacency
where
    F: Fn(&ModuleDependency) -> bool,
{
    let mut adj: Adjacency = HashMap::new();
    for edge in edges.into_iter().filter(|e| keep(*e)) {
        adj.entry(edge.module_id).or_default().push(edge.depends_on_id);
    }
    adj
}

/// Depth-first post-order walk. Dependencies land in `order` before their
/// dependents.
fn visit(
    node: Uuid,
    adj: &Adjacency,
    marks: &mut HashMap<Uuid, Mark>,
    path: &mut Vec<Uuid>,
    order: &mut Vec<Uuid>,
) -> Result<(), Cycle> {
    match marks.get(&node) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|n| *n == node).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(node);
            return Err(Cycle(cycle));
        }
        None => {}
    }

    marks.insert(node, Mark::Visiting);
    path.push(node);
    for next in adj.get(&node).map(Vec::as_slice).unwrap_or_default() {
        visit(*next, adj, marks, path, order)?;
    }
    path.pop();
    marks.insert(node, Mark::Done);
    order.push(node);
    Ok(())
}

/// Find any cycle among the dependency edges.
pub fn find_cycle(edges: &[ModuleDependency]) -> Option<Cycle> {
    let adj = adjacency(edges, ModuleDependency::is_dependency);
    let mut marks = HashMap::new();
    let mut order = Vec::new();

    for edge in edges.iter().filter(|e| e.is_dependency()) {
        let mut path = Vec::new();
        if let Err(cycle) = visit(edge.module_id, &adj, &mut marks, &mut path, &mut order) {
            return Some(cycle);
        }
    }
    None
}

/// The cycle that `candidate` would close if added to `edges`, if any.
pub fn cycle_with(edges: &[ModuleDependency], candidate: &ModuleDependency) -> Option<Cycle> {
    if !candidate.is_dependency() {
        return None;
    }
    let mut all = edges.to_vec();
    all.push(candidate.clone());
    find_cycle(&all)
}

/// Topological order of `root`'s required-dependency closure.
///
/// Dependencies come first and `root` is last, so installing in this order
/// never trips a missing-dependency check.
pub fn install_order(root: Uuid, edges: &[ModuleDependency]) -> Result<Vec<Uuid>, Cycle> {
    let adj = adjacency(edges, ModuleDependency::is_hard_dependency);
    let mut marks = HashMap::new();
    let mut path = Vec::new();
    let mut order = Vec::new();
    visit(root, &adj, &mut marks, &mut path, &mut order)?;
    Ok(order)
}
