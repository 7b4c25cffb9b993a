//! Dependency graph for spreadsheet recalculation.
//!
//! Edges run between [`CellKey`]s. A cell's precedents are the cells its
//! formula reads; its dependents are the formula cells that read it. Keys may
//! name sheets or cells that do not exist yet, so a formula pointing at a
//! missing sheet is picked up again once that sheet appears.

use sheetcalc_primitives::CellKey;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Result of planning a recalculation from a set of changed cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecalcPlan {
    /// Every cell reachable from the roots, precedents before dependents.
    pub order: Vec<CellKey>,
    /// Cells that sit on a dependency cycle.
    pub circular: HashSet<CellKey>,
}

impl RecalcPlan {
    pub fn is_circular(&self, key: &CellKey) -> bool {
        self.circular.contains(key)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    precedents: HashMap<CellKey, BTreeSet<CellKey>>,
    dependents: HashMap<CellKey, BTreeSet<CellKey>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the outgoing edges of `cell` with `precedents`.
    pub fn set_precedents<I>(&mut self, cell: &CellKey, precedents: I)
    where
        I: IntoIterator<Item = CellKey>,
    {
        self.clear_precedents(cell);
        let inputs: BTreeSet<CellKey> = precedents.into_iter().collect();
        if inputs.is_empty() {
            return;
        }
        for input in &inputs {
            self.dependents
                .entry(input.clone())
                .or_default()
                .insert(cell.clone());
        }
        self.precedents.insert(cell.clone(), inputs);
    }

    pub fn clear_precedents(&mut self, cell: &CellKey) {
        let Some(old) = self.precedents.remove(cell) else {
            return;
        };
        for input in old {
            self.detach_dependent(&input, cell);
        }
    }

    pub fn precedents(&self, cell: &CellKey) -> impl Iterator<Item = &CellKey> {
        self.precedents.get(cell).into_iter().flatten()
    }

    pub fn dependents(&self, cell: &CellKey) -> impl Iterator<Item = &CellKey> {
        self.dependents.get(cell).into_iter().flatten()
    }

    pub fn has_precedents(&self, cell: &CellKey) -> bool {
        self.precedents.contains_key(cell)
    }

    /// Number of precedence edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.precedents.values().map(BTreeSet::len).sum()
    }

    /// Formula cells that read any cell on `sheet` (a lower-cased sheet key).
    pub fn dependents_on_sheet(&self, sheet: &str) -> Vec<CellKey> {
        let mut found: BTreeSet<CellKey> = BTreeSet::new();
        for (input, readers) in &self.dependents {
            if input.sheet == sheet {
                found.extend(readers.iter().cloned());
            }
        }
        found.into_iter().collect()
    }

    /// Drop the outgoing edges of every cell on `sheet`.
    ///
    /// Edges pointing into the sheet are kept, so dependents on other sheets
    /// remain waiting for a sheet of that name.
    pub fn remove_sheet(&mut self, sheet: &str) {
        let owned: Vec<CellKey> = self
            .precedents
            .keys()
            .filter(|key| key.sheet == sheet)
            .cloned()
            .collect();
        for key in owned {
            self.clear_precedents(&key);
        }
    }

    /// Re-key every node on sheet `old` to sheet `new` (both lower-cased),
    /// merging with any edges already recorded under `new`.
    pub fn rename_sheet(&mut self, old: &str, new: &str) {
        if old == new {
            return;
        }
        let rekey = |key: &CellKey| -> CellKey {
            if key.sheet == old {
                CellKey {
                    sheet: new.to_string(),
                    location: key.location,
                }
            } else {
                key.clone()
            }
        };
        self.precedents = rekey_map(std::mem::take(&mut self.precedents), &rekey);
        self.dependents = rekey_map(std::mem::take(&mut self.dependents), &rekey);
        tracing::debug!(old, new, "re-keyed dependency graph");
    }

    /// Order the roots and everything downstream of them for recalculation.
    ///
    /// Runs Tarjan's strongly-connected-components algorithm over dependent
    /// edges, iteratively so deep chains cannot overflow the stack. SCCs come
    /// out sinks first; reversing them yields precedents before dependents.
    /// Components with more than one member, or a single member that depends
    /// on itself, are reported as circular.
    pub fn plan_recalculation<'a, I>(&self, roots: I) -> RecalcPlan
    where
        I: IntoIterator<Item = &'a CellKey>,
    {
        let mut state = TarjanState::default();
        let mut components: Vec<Vec<CellKey>> = Vec::new();
        let mut circular: HashSet<CellKey> = HashSet::new();

        for root in roots {
            if state.ids.contains_key(root) {
                continue;
            }
            let root_id = state.visit(root.clone());
            let mut dfs_stack = vec![DfsFrame {
                node: root_id,
                neighbours: self.sorted_dependents(root),
                next_idx: 0,
            }];

            while let Some(frame) = dfs_stack.last_mut() {
                if frame.next_idx < frame.neighbours.len() {
                    let next = frame.neighbours[frame.next_idx].clone();
                    frame.next_idx += 1;
                    let current = frame.node;

                    match state.ids.get(&next).copied() {
                        None => {
                            let neighbours = self.sorted_dependents(&next);
                            let id = state.visit(next);
                            dfs_stack.push(DfsFrame {
                                node: id,
                                neighbours,
                                next_idx: 0,
                            });
                        }
                        Some(id) if state.nodes[id].on_stack => {
                            let index = state.nodes[id].index;
                            let low = &mut state.nodes[current].lowlink;
                            *low = (*low).min(index);
                        }
                        Some(_) => {}
                    }
                    continue;
                }

                let finished = frame.node;
                dfs_stack.pop();
                let low = state.nodes[finished].lowlink;
                if let Some(parent) = dfs_stack.last() {
                    let parent_low = &mut state.nodes[parent.node].lowlink;
                    *parent_low = (*parent_low).min(low);
                }
                if low != state.nodes[finished].index {
                    continue;
                }

                let mut component = Vec::new();
                while let Some(member) = state.stack.pop() {
                    state.nodes[member].on_stack = false;
                    component.push(state.nodes[member].key.clone());
                    if member == finished {
                        break;
                    }
                }
                if component.len() > 1 || self.is_self_loop(&component[0]) {
                    circular.extend(component.iter().cloned());
                }
                components.push(component);
            }
        }

        let order: Vec<CellKey> = components.into_iter().rev().flatten().collect();
        if !circular.is_empty() {
            tracing::debug!(cells = circular.len(), "circular references detected");
        }
        RecalcPlan { order, circular }
    }

    fn sorted_dependents(&self, cell: &CellKey) -> Vec<CellKey> {
        self.dependents(cell).cloned().collect()
    }

    fn is_self_loop(&self, cell: &CellKey) -> bool {
        self.precedents
            .get(cell)
            .is_some_and(|inputs| inputs.contains(cell))
    }

    fn detach_dependent(&mut self, input: &CellKey, reader: &CellKey) {
        if let Some(readers) = self.dependents.get_mut(input) {
            readers.remove(reader);
            if readers.is_empty() {
                self.dependents.remove(input);
            }
        }
    }
}

fn rekey_map<F>(
    map: HashMap<CellKey, BTreeSet<CellKey>>,
    rekey: &F,
) -> HashMap<CellKey, BTreeSet<CellKey>>
where
    F: Fn(&CellKey) -> CellKey,
{
    let mut out: HashMap<CellKey, BTreeSet<CellKey>> = HashMap::with_capacity(map.len());
    for (key, set) in map {
        out.entry(rekey(&key))
            .or_default()
            .extend(set.iter().map(rekey));
    }
    out
}

struct TarjanNode {
    key: CellKey,
    index: usize,
    lowlink: usize,
    on_stack: bool,
}

#[derive(Default)]
struct TarjanState {
    ids: HashMap<CellKey, usize>,
    nodes: Vec<TarjanNode>,
    stack: Vec<usize>,
}

impl TarjanState {
    fn visit(&mut self, key: CellKey) -> usize {
        let id = self.nodes.len();
        self.ids.insert(key.clone(), id);
        self.nodes.push(TarjanNode {
            key,
            index: id,
            lowlink: id,
            on_stack: true,
        });
        self.stack.push(id);
        id
    }
}

struct DfsFrame {
    node: usize,
    neighbours: Vec<CellKey>,
    next_idx: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetcalc_primitives::CellLocation;

    fn key(sheet: &str, col: u32, row: u32) -> CellKey {
        CellKey::new(sheet, CellLocation::new(col, row))
    }

    #[test]
    fn test_set_precedents_replaces_edges() {
        let mut graph = DependencyGraph::new();
        let a1 = key("s", 1, 1);
        let b1 = key("s", 2, 1);
        let c1 = key("s", 3, 1);

        graph.set_precedents(&c1, [a1.clone()]);
        graph.set_precedents(&c1, [b1.clone()]);

        assert_eq!(graph.dependents(&a1).count(), 0);
        assert_eq!(graph.dependents(&b1).collect::<Vec<_>>(), vec![&c1]);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_plan_orders_precedents_first() {
        let mut graph = DependencyGraph::new();
        let a1 = key("s", 1, 1);
        let b1 = key("s", 2, 1);
        let c1 = key("s", 3, 1);
        graph.set_precedents(&b1, [a1.clone()]);
        graph.set_precedents(&c1, [a1.clone(), b1.clone()]);

        let plan = graph.plan_recalculation([&a1]);
        assert_eq!(plan.order, vec![a1, b1, c1]);
        assert!(plan.circular.is_empty());
    }

    #[test]
    fn test_self_loop_is_circular() {
        let mut graph = DependencyGraph::new();
        let a1 = key("s", 1, 1);
        graph.set_precedents(&a1, [a1.clone()]);

        let plan = graph.plan_recalculation([&a1]);
        assert!(plan.is_circular(&a1));
        assert_eq!(plan.order.len(), 1);
    }

    #[test]
    fn test_rename_sheet_merges_waiting_edges() {
        let mut graph = DependencyGraph::new();
        let reader = key("main", 1, 1);
        graph.set_precedents(&reader, [key("old", 1, 1)]);
        graph.rename_sheet("old", "new");

        assert_eq!(graph.dependents_on_sheet("new"), vec![reader.clone()]);
        assert!(graph.dependents_on_sheet("old").is_empty());
        assert_eq!(
            graph.precedents(&reader).collect::<Vec<_>>(),
            vec![&key("new", 1, 1)]
        );
    }
}
