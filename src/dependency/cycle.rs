//! Tarjan's strongly-connected-components algorithm over the dependency
//! graph accumulated during `enqueueChangesAhead` (spec §4.3). Only SCCs of
//! size >= 2 are treated as cycles — a lone node trivially "depends on
//! itself" under Tarjan's definition but isn't a cycle for our purposes.

use std::collections::HashMap;

use crate::model::ChangeKey;

struct TarjanState {
    index_counter: usize,
    index: HashMap<ChangeKey, usize>,
    lowlink: HashMap<ChangeKey, usize>,
    on_stack: HashMap<ChangeKey, bool>,
    stack: Vec<ChangeKey>,
    sccs: Vec<Vec<ChangeKey>>,
}

/// Find all strongly-connected components of size >= 2 in `edges`
/// (`change -> its declared dependencies`). Each change participates in at
/// most one such SCC (spec §4.3).
pub fn find_cycles(edges: &HashMap<ChangeKey, Vec<ChangeKey>>) -> Vec<Vec<ChangeKey>> {
    let mut state = TarjanState {
        index_counter: 0,
        index: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: HashMap::new(),
        stack: Vec::new(),
        sccs: Vec::new(),
    };

    for node in edges.keys() {
        if !state.index.contains_key(node) {
            strongconnect(node, edges, &mut state);
        }
    }

    state.sccs.into_iter().filter(|scc| scc.len() >= 2).collect()
}

/// The cycle (if any) that contains `change`, per the edges accumulated so
/// far. Used by `addChange` to decide whether to form/extend a `Bundle`.
pub fn cycle_containing<'a>(
    change: &ChangeKey,
    edges: &HashMap<ChangeKey, Vec<ChangeKey>>,
) -> Option<Vec<ChangeKey>> {
    find_cycles(edges).into_iter().find(|scc| scc.contains(change))
}

fn strongconnect(
    node: &ChangeKey,
    edges: &HashMap<ChangeKey, Vec<ChangeKey>>,
    state: &mut TarjanState,
) {
    state.index.insert(node.clone(), state.index_counter);
    state.lowlink.insert(node.clone(), state.index_counter);
    state.index_counter += 1;
    state.stack.push(node.clone());
    state.on_stack.insert(node.clone(), true);

    if let Some(deps) = edges.get(node) {
        for dep in deps {
            if !state.index.contains_key(dep) {
                strongconnect(dep, edges, state);
                let dep_low = state.lowlink[dep];
                let node_low = state.lowlink[node];
                state.lowlink.insert(node.clone(), node_low.min(dep_low));
            } else if *state.on_stack.get(dep).unwrap_or(&false) {
                let dep_idx = state.index[dep];
                let node_low = state.lowlink[node];
                state.lowlink.insert(node.clone(), node_low.min(dep_idx));
            }
        }
    }

    if state.lowlink[node] == state.index[node] {
        let mut component = Vec::new();
        loop {
            let w = state.stack.pop().expect("SCC root must be on stack");
            state.on_stack.insert(w.clone(), false);
            let is_root = w == *node;
            component.push(w);
            if is_root {
                break;
            }
        }
        state.sccs.push(component);
    }
}
