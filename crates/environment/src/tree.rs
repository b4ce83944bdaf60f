use glam::DVec3;
use mission_common::{CoreError, CoreResult, Extent};
use serde::{Deserialize, Serialize};

/// Largest accepted per-axis split factor (8 → 512 children).
pub const MAX_REFINE_FACTOR: u32 = 8;

/// Generational handle to a node in an [`EnvironmentTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// One cell of the decomposition.
#[derive(Debug, Clone)]
pub struct Node {
    extent: Extent,
    depth: u32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    /// Refinement depth; the root is 0.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Immediate children in split order. Empty for a leaf.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_refined(&self) -> bool {
        !self.children.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena-backed refinement tree rooted at a single extent.
///
/// Released slots are recycled through a free list; their generation is
/// bumped on release so stale [`NodeId`]s fail with `NotFound`.
#[derive(Debug, Clone)]
pub struct EnvironmentTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    live: usize,
}

impl EnvironmentTree {
    /// Create a tree holding a single root leaf.
    pub fn new(extent: Extent) -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            live: 0,
        };
        tree.root = tree.alloc(Node {
            extent,
            depth: 0,
            parent: None,
            children: Vec::new(),
        });
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Never true: the root always exists.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Whether `id` still refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    /// Like [`get`](Self::get) but fails with `NotFound` for stale handles.
    pub fn node(&self, id: NodeId) -> CoreResult<&Node> {
        self.get(id)
            .ok_or_else(|| CoreError::NotFound(format!("environment node {id:?}")))
    }

    pub fn is_refined(&self, id: NodeId) -> CoreResult<bool> {
        Ok(self.node(id)?.is_refined())
    }

    /// Immediate children of `id`. Callers recurse themselves for a full view.
    pub fn refinements(&self, id: NodeId) -> CoreResult<&[NodeId]> {
        Ok(self.node(id)?.children())
    }

    pub fn extent(&self, id: NodeId) -> CoreResult<Extent> {
        Ok(self.node(id)?.extent)
    }

    /// Split the leaf `id` into `factor` parts per axis (`factor³` children).
    ///
    /// Returns the new children in split order.
    pub fn refine(&mut self, id: NodeId, factor: u32) -> CoreResult<Vec<NodeId>> {
        if !(2..=MAX_REFINE_FACTOR).contains(&factor) {
            return Err(CoreError::Validation(format!(
                "refine factor {factor} outside 2..={MAX_REFINE_FACTOR}"
            )));
        }
        let node = self.node(id)?;
        if node.is_refined() {
            return Err(CoreError::InvalidState(format!(
                "environment node {id:?} is already refined"
            )));
        }
        let depth = node.depth + 1;
        let cells = node.extent.split(factor);

        let children: Vec<NodeId> = cells
            .into_iter()
            .map(|extent| {
                self.alloc(Node {
                    extent,
                    depth,
                    parent: Some(id),
                    children: Vec::new(),
                })
            })
            .collect();

        if let Some(node) = self.node_mut(id) {
            node.children = children.clone();
        }
        tracing::debug!(?id, factor, children = children.len(), depth, "refined");
        Ok(children)
    }

    /// Collapse the refined node `id` back to a leaf, releasing every
    /// descendant. Returns how many nodes were released.
    pub fn coarsen(&mut self, id: NodeId) -> CoreResult<usize> {
        let node = self.node(id)?;
        if !node.is_refined() {
            return Err(CoreError::InvalidState(format!(
                "environment node {id:?} is a leaf"
            )));
        }

        let mut pending = match self.node_mut(id) {
            Some(node) => std::mem::take(&mut node.children),
            None => Vec::new(),
        };
        let mut released = 0;
        while let Some(child) = pending.pop() {
            if let Some(node) = self.release(child) {
                pending.extend(node.children);
                released += 1;
            }
        }
        tracing::debug!(?id, released, "coarsened");
        Ok(released)
    }

    /// All leaves, depth-first in split order.
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else { continue };
            if node.is_refined() {
                stack.extend(node.children.iter().rev());
            } else {
                leaves.push(id);
            }
        }
        leaves
    }

    /// Depth of the deepest live node.
    pub fn max_depth(&self) -> u32 {
        self.slots
            .iter()
            .filter_map(|slot| slot.node.as_ref())
            .map(|node| node.depth)
            .max()
            .unwrap_or(0)
    }

    /// Deepest leaf whose extent contains `point`, if the root does.
    pub fn locate(&self, point: DVec3) -> Option<NodeId> {
        let mut current = self.root;
        if !self.get(current)?.extent.contains(point) {
            return None;
        }
        loop {
            let node = self.get(current)?;
            match node
                .children
                .iter()
                .copied()
                .find(|c| self.get(*c).is_some_and(|n| n.extent.contains(point)))
            {
                Some(child) => current = child,
                None => return Some(current),
            }
        }
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn release(&mut self, id: NodeId) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(node)
    }
}

impl Default for EnvironmentTree {
    fn default() -> Self {
        Self::new(Extent::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tree() -> EnvironmentTree {
        EnvironmentTree::new(Extent::new(DVec3::ZERO, DVec3::splat(8.0)))
    }

    /// Walk every reachable node and check the structural invariants.
    fn assert_well_formed(tree: &EnvironmentTree) {
        let mut reachable = 0;
        let mut stack = vec![tree.root()];
        while let Some(id) = stack.pop() {
            let node = tree.node(id).unwrap();
            reachable += 1;
            assert_eq!(tree.is_refined(id).unwrap(), !node.children().is_empty());
            for child in node.children() {
                let c = tree.node(*child).unwrap();
                assert_eq!(c.parent(), Some(id));
                assert_eq!(c.depth(), node.depth() + 1);
                stack.push(*child);
            }
        }
        assert_eq!(reachable, tree.len());
    }

    #[test]
    fn new_tree_is_a_single_leaf() {
        let tree = unit_tree();
        assert_eq!(tree.len(), 1);
        assert!(!tree.is_refined(tree.root()).unwrap());
        assert!(tree.refinements(tree.root()).unwrap().is_empty());
        assert_well_formed(&tree);
    }

    #[test]
    fn refine_by_two_yields_eight_leaves() {
        let mut tree = unit_tree();
        let root = tree.root();
        let children = tree.refine(root, 2).unwrap();

        assert_eq!(children.len(), 8);
        assert_eq!(tree.refinements(root).unwrap(), children.as_slice());
        for child in &children {
            assert!(!tree.is_refined(*child).unwrap());
            assert_eq!(tree.node(*child).unwrap().depth(), 1);
        }
        assert_eq!(tree.extent(children[0]).unwrap().max, DVec3::splat(4.0));
        assert_well_formed(&tree);
    }

    #[test]
    fn refine_twice_fails_and_leaves_tree_unchanged() {
        let mut tree = unit_tree();
        let root = tree.root();
        let children = tree.refine(root, 2).unwrap();

        let err = tree.refine(root, 2).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        assert_eq!(tree.refinements(root).unwrap(), children.as_slice());
        assert_eq!(tree.len(), 9);
    }

    #[test]
    fn coarsen_leaf_fails_and_leaves_tree_unchanged() {
        let mut tree = unit_tree();
        let err = tree.coarsen(tree.root()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn refine_rejects_bad_factors() {
        let mut tree = unit_tree();
        let root = tree.root();
        for factor in [0, 1, MAX_REFINE_FACTOR + 1] {
            assert!(matches!(
                tree.refine(root, factor),
                Err(CoreError::Validation(_))
            ));
        }
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn refine_by_three_yields_27() {
        let mut tree = unit_tree();
        let root = tree.root();
        assert_eq!(tree.refine(root, 3).unwrap().len(), 27);
    }

    #[test]
    fn coarsen_releases_whole_subtree() {
        let mut tree = unit_tree();
        let root = tree.root();
        let children = tree.refine(root, 2).unwrap();
        let grandchildren = tree.refine(children[3], 2).unwrap();
        tree.refine(grandchildren[0], 2).unwrap();
        assert_eq!(tree.len(), 1 + 8 + 8 + 8);
        assert_eq!(tree.max_depth(), 3);

        let released = tree.coarsen(root).unwrap();
        assert_eq!(released, 24);
        assert_eq!(tree.len(), 1);
        assert!(!tree.is_refined(root).unwrap());
        for id in children.iter().chain(grandchildren.iter()) {
            assert!(!tree.contains(*id));
        }
        assert_well_formed(&tree);
    }

    #[test]
    fn stale_handles_do_not_alias_recycled_slots() {
        let mut tree = unit_tree();
        let root = tree.root();
        let first = tree.refine(root, 2).unwrap();
        tree.coarsen(root).unwrap();
        let second = tree.refine(root, 2).unwrap();

        // Slots are reused but generations differ.
        assert!(first.iter().all(|id| !tree.contains(*id)));
        assert!(second.iter().all(|id| tree.contains(*id)));
        assert!(matches!(tree.node(first[0]), Err(CoreError::NotFound(_))));
        assert!(matches!(
            tree.refine(first[0], 2),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn refinement_is_reproducible() {
        let mut a = unit_tree();
        let mut b = unit_tree();
        let ca = a.refine(a.root(), 2).unwrap();
        let cb = b.refine(b.root(), 2).unwrap();
        let ea: Vec<Extent> = ca.iter().map(|id| a.extent(*id).unwrap()).collect();
        let eb: Vec<Extent> = cb.iter().map(|id| b.extent(*id).unwrap()).collect();
        assert_eq!(ea, eb);
    }

    #[test]
    fn leaves_follow_split_order() {
        let mut tree = unit_tree();
        let root = tree.root();
        let children = tree.refine(root, 2).unwrap();
        let inner = tree.refine(children[0], 2).unwrap();

        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 15);
        assert_eq!(&leaves[..8], inner.as_slice());
        assert_eq!(&leaves[8..], &children[1..]);
    }

    #[test]
    fn locate_finds_deepest_leaf() {
        let mut tree = unit_tree();
        let root = tree.root();
        let children = tree.refine(root, 2).unwrap();
        let inner = tree.refine(children[7], 2).unwrap();

        let hit = tree.locate(DVec3::splat(7.5)).unwrap();
        assert_eq!(hit, inner[7]);
        assert_eq!(tree.locate(DVec3::splat(1.0)), Some(children[0]));
        assert_eq!(tree.locate(DVec3::splat(-1.0)), None);
    }

    #[test]
    fn random_refine_coarsen_sequence_keeps_invariants() {
        let mut tree = unit_tree();
        // Deterministic pseudo-random walk over the leaves and refined nodes.
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        for _ in 0..200 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let leaves = tree.leaves();
            if state % 3 == 0 && tree.is_refined(tree.root()).unwrap() {
                let refined: Vec<NodeId> = (0..tree.slots.len())
                    .filter_map(|i| {
                        let slot = &tree.slots[i];
                        slot.node.as_ref().filter(|n| n.is_refined()).map(|_| NodeId {
                            index: i as u32,
                            generation: slot.generation,
                        })
                    })
                    .collect();
                let pick = refined[(state >> 33) as usize % refined.len()];
                tree.coarsen(pick).unwrap();
            } else if tree.max_depth() < 3 {
                let pick = leaves[(state >> 33) as usize % leaves.len()];
                if tree.node(pick).unwrap().depth() < 3 {
                    tree.refine(pick, 2).unwrap();
                }
            }
            assert_well_formed(&tree);
        }
    }
}
