//! Cell arena and reachability-based reclamation.
//!
//! Cells are arena slots indexed by opaque handles. Each cell owns one
//! entity and carries explicit parent/child edge lists: "A is reachable from
//! B" is stored as "A is a child of B". Cells are not reference-counted;
//! liveness is reachability from a cell of kind *internal* (scope roots).
//! Removing an edge never frees anything immediately — reclamation is
//! batched: scope teardown hands the detached children to
//! [`Heap::sweep_detached`], which probes each candidate's ancestry and
//! destroys the subgraph that no root can reach. Cycles are reclaimed like
//! anything else.

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;

use crate::{
    error::{RunError, RunResult},
    value::Entity,
};

/// Opaque handle of a heap cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u32);

impl CellId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct Cell {
    entity: Entity,
    parents: SmallVec<[CellId; 4]>,
    children: SmallVec<[CellId; 4]>,
}

/// The arena of cells.
#[derive(Debug)]
pub struct Heap {
    cells: Vec<Option<Cell>>,
    free: Vec<u32>,
    live: usize,
    /// Cell budget; exceeding it raises a `RangeError`.
    limit: usize,
}

impl Heap {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            cells: Vec::new(),
            free: Vec::new(),
            live: 0,
            limit,
        }
    }

    pub(crate) fn live_count(&self) -> usize {
        self.live
    }

    /// Allocates a cell owning `entity`. The new cell has no edges; callers
    /// pin it (usually under a scope root) before anything can collect it.
    pub(crate) fn alloc(&mut self, entity: Entity) -> RunResult<CellId> {
        if self.live >= self.limit {
            return Err(RunError::range_error("heap cell budget exceeded"));
        }
        self.live += 1;
        let mut edges = Vec::new();
        entity.edges(&mut edges);
        let cell = Cell {
            entity,
            parents: SmallVec::new(),
            children: SmallVec::new(),
        };
        let id = if let Some(index) = self.free.pop() {
            self.cells[index as usize] = Some(cell);
            CellId(index)
        } else {
            self.cells.push(Some(cell));
            CellId(self.cells.len() as u32 - 1)
        };
        for edge in edges {
            self.link(id, edge);
        }
        Ok(id)
    }

    fn cell(&self, id: CellId) -> &Cell {
        self.cells[id.index()].as_ref().expect("cell is live")
    }

    fn cell_mut(&mut self, id: CellId) -> &mut Cell {
        self.cells[id.index()].as_mut().expect("cell is live")
    }

    pub(crate) fn entity(&self, id: CellId) -> &Entity {
        &self.cell(id).entity
    }

    /// Mutable access to a cell's entity. Callers that add or remove cell
    /// references through this must maintain the edges themselves via
    /// [`Heap::link`] / [`Heap::unlink`].
    pub(crate) fn entity_mut(&mut self, id: CellId) -> &mut Entity {
        &mut self.cell_mut(id).entity
    }

    /// Replaces the whole entity of a cell, rebuilding its outgoing edges.
    /// This is the assignment primitive: a variable cell keeps its identity
    /// while its payload changes, so closures sharing the cell observe the
    /// new value.
    pub(crate) fn set_entity(&mut self, id: CellId, entity: Entity) {
        let old_children: SmallVec<[CellId; 4]> = std::mem::take(&mut self.cell_mut(id).children);
        for child in old_children {
            let parents = &mut self.cell_mut(child).parents;
            if let Some(at) = parents.iter().position(|&p| p == id) {
                parents.swap_remove(at);
            }
        }
        let mut edges = Vec::new();
        entity.edges(&mut edges);
        self.cell_mut(id).entity = entity;
        for edge in edges {
            self.link(id, edge);
        }
    }

    /// Resolves a reference cell to the identity cell it points at.
    pub(crate) fn resolve(&self, id: CellId) -> CellId {
        match self.entity(id) {
            Entity::Ref(target) => *target,
            _ => id,
        }
    }

    /// A shareable copy of the value held by `id`: primitives clone their
    /// payload, identity kinds become a reference to the identity cell.
    pub(crate) fn share(&self, id: CellId) -> Entity {
        match self.entity(id) {
            Entity::Undefined => Entity::Undefined,
            Entity::Null => Entity::Null,
            Entity::Uninitialized => Entity::Uninitialized,
            Entity::Boolean(value) => Entity::Boolean(*value),
            Entity::Number(value) => Entity::Number(*value),
            Entity::NaN => Entity::NaN,
            Entity::Infinity { negative } => Entity::Infinity { negative: *negative },
            Entity::String(value) => Entity::String(value.clone()),
            Entity::BigInt(value) => Entity::BigInt(value.clone()),
            Entity::Ref(target) => Entity::Ref(*target),
            Entity::Internal => Entity::Undefined,
            _ => Entity::Ref(id),
        }
    }

    /// Records the liveness edge "child is reachable from parent".
    pub(crate) fn link(&mut self, parent: CellId, child: CellId) {
        self.cell_mut(parent).children.push(child);
        self.cell_mut(child).parents.push(parent);
    }

    /// Removes one occurrence of the edge. The child is not freed even if
    /// this was its last incoming edge; reclamation is batched.
    pub(crate) fn unlink(&mut self, parent: CellId, child: CellId) {
        let children = &mut self.cell_mut(parent).children;
        if let Some(at) = children.iter().position(|&c| c == child) {
            children.remove(at);
        }
        let parents = &mut self.cell_mut(child).parents;
        if let Some(at) = parents.iter().position(|&p| p == parent) {
            parents.remove(at);
        }
    }

    /// Detaches every child edge of `root` and returns the children, ready
    /// for [`Heap::sweep_detached`]. Used by scope teardown.
    pub(crate) fn detach_children(&mut self, root: CellId) -> Vec<CellId> {
        let children: Vec<CellId> = std::mem::take(&mut self.cell_mut(root).children).into_vec();
        for &child in &children {
            let parents = &mut self.cell_mut(child).parents;
            while let Some(at) = parents.iter().position(|&p| p == root) {
                parents.swap_remove(at);
            }
        }
        children
    }

    /// Probe: walks parent edges upward looking for an internal-kind root.
    fn is_alive(&self, start: CellId, cache: &mut AHashMap<CellId, bool>) -> bool {
        if let Some(&known) = cache.get(&start) {
            return known;
        }
        let mut visited = AHashSet::new();
        let mut work = vec![start];
        while let Some(id) = work.pop() {
            if !visited.insert(id) {
                continue;
            }
            match cache.get(&id) {
                Some(true) => return true,
                Some(false) => continue,
                None => {}
            }
            let Some(cell) = self.cells.get(id.index()).and_then(Option::as_ref) else {
                continue;
            };
            if matches!(cell.entity, Entity::Internal) {
                return true;
            }
            work.extend(cell.parents.iter().copied());
        }
        false
    }

    /// Reachability sweep over the subgraph hanging off `detached`: each
    /// candidate is probed against the remaining roots, and candidates that
    /// fail the probe are destroyed in reverse-reachability order.
    pub(crate) fn sweep_detached(&mut self, detached: Vec<CellId>) {
        let mut cache: AHashMap<CellId, bool> = AHashMap::new();
        let mut seen: AHashSet<CellId> = AHashSet::new();
        let mut dead: Vec<CellId> = Vec::new();
        let mut work = detached;
        while let Some(id) = work.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(cell) = self.cells.get(id.index()).and_then(Option::as_ref) else {
                continue;
            };
            let children: Vec<CellId> = cell.children.to_vec();
            let alive = self.is_alive(id, &mut cache);
            cache.insert(id, alive);
            if !alive {
                dead.push(id);
            }
            work.extend(children);
        }
        for id in dead.into_iter().rev() {
            self.destroy(id);
        }
    }

    /// Frees one cell, severing its remaining edges.
    pub(crate) fn destroy(&mut self, id: CellId) {
        let Some(cell) = self.cells[id.index()].take() else {
            return;
        };
        self.live -= 1;
        for child in cell.children {
            if let Some(other) = self.cells.get_mut(child.index()).and_then(Option::as_mut)
                && let Some(at) = other.parents.iter().position(|&p| p == id)
            {
                other.parents.swap_remove(at);
            }
        }
        for parent in cell.parents {
            if let Some(other) = self.cells.get_mut(parent.index()).and_then(Option::as_mut)
                && let Some(at) = other.children.iter().position(|&c| c == id)
            {
                other.children.swap_remove(at);
            }
        }
        self.free.push(id.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Heap {
        Heap::new(1 << 20)
    }

    #[test]
    fn alloc_links_entity_edges() {
        let mut heap = heap();
        let target = heap.alloc(Entity::Number(1.0)).unwrap();
        let reference = heap.alloc(Entity::Ref(target)).unwrap();
        assert_eq!(heap.resolve(reference), target);
        assert_eq!(heap.resolve(target), target);
    }

    #[test]
    fn sweep_frees_unreachable_subgraph_but_keeps_rooted_cells() {
        let mut heap = heap();
        let root = heap.alloc(Entity::Internal).unwrap();
        let kept = heap.alloc(Entity::Number(1.0)).unwrap();
        let dropped = heap.alloc(Entity::Number(2.0)).unwrap();
        let nested = heap.alloc(Entity::Number(3.0)).unwrap();

        let other_root = heap.alloc(Entity::Internal).unwrap();
        heap.link(other_root, kept);

        heap.link(root, kept);
        heap.link(root, dropped);
        heap.link(dropped, nested);

        let detached = heap.detach_children(root);
        heap.destroy(root);
        let before = heap.live_count();
        heap.sweep_detached(detached);
        // `dropped` and `nested` die; `kept` survives through the other root.
        assert_eq!(heap.live_count(), before - 2);
        assert!(matches!(heap.entity(kept), Entity::Number(v) if *v == 1.0));
    }

    #[test]
    fn cycles_are_reclaimed() {
        let mut heap = heap();
        let root = heap.alloc(Entity::Internal).unwrap();
        let a = heap.alloc(Entity::Number(1.0)).unwrap();
        let b = heap.alloc(Entity::Number(2.0)).unwrap();
        heap.link(root, a);
        heap.link(a, b);
        heap.link(b, a);

        let detached = heap.detach_children(root);
        heap.destroy(root);
        let before = heap.live_count();
        heap.sweep_detached(detached);
        assert_eq!(heap.live_count(), before - 2);
    }

    #[test]
    fn set_entity_rebuilds_edges_in_place() {
        let mut heap = heap();
        let root = heap.alloc(Entity::Internal).unwrap();
        let variable = heap.alloc(Entity::Number(0.0)).unwrap();
        let object = heap.alloc(Entity::Object(crate::value::ObjectData::with_prototype(None))).unwrap();
        heap.link(root, variable);
        heap.link(root, object);

        // Assignment shares the identity cell through a reference.
        let shared = heap.share(object);
        heap.set_entity(variable, shared);
        assert_eq!(heap.resolve(variable), object);

        // Re-assigning a primitive drops the edge again.
        heap.set_entity(variable, Entity::Number(5.0));
        assert_eq!(heap.resolve(variable), variable);
    }

    #[test]
    fn budget_is_enforced() {
        let mut heap = Heap::new(2);
        heap.alloc(Entity::Undefined).unwrap();
        heap.alloc(Entity::Undefined).unwrap();
        assert!(heap.alloc(Entity::Undefined).is_err());
    }
}
