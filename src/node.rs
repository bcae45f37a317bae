//! Node arena backing the context tree.
//!
//! Every [`TreeNode`] lives in a [`NodeArena`] slot addressed by a
//! [`NodeId`]. A node binds exactly one [`LayerId`] and owns a child map
//! keyed by the children's layer ids, so one parent never holds two
//! children bound to the same layer.
//!
//! Relocation is expressed through a handful of explicit operations:
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | [`attach`](NodeArena::attach) | link a detached node under a parent, merging on layer collision |
//! | [`detach`](NodeArena::detach) | unlink a node (and its subtree) from its parent |
//! | [`splice`](NodeArena::splice) | unlink a node and promote its children to its former parent |
//! | [`deep_clone`](NodeArena::deep_clone) | duplicate a subtree into fresh slots |
//! | [`free_subtree`](NodeArena::free_subtree) | release a detached subtree's slots |

use std::collections::BTreeMap;

use crate::models::LayerId;

/// Handle to a slot in a [`NodeArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    #[cfg(test)]
    fn index(&self) -> usize {
        self.0
    }
}

/// A node bound to one layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeNode {
    id: LayerId,
    parent: Option<NodeId>,
    children: BTreeMap<LayerId, NodeId>,
}

impl TreeNode {
    fn new(id: LayerId) -> Self {
        Self {
            id,
            parent: None,
            children: BTreeMap::new(),
        }
    }

    /// The bound layer id.
    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn child(&self, layer: &LayerId) -> Option<NodeId> {
        self.children.get(layer).copied()
    }

    pub fn has_child(&self, layer: &LayerId) -> bool {
        self.children.contains_key(layer)
    }

    /// Child handles, ordered by layer id.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.values().copied()
    }
}

#[derive(Clone, Debug, Default)]
pub struct NodeArena {
    slots: Vec<Option<TreeNode>>,
    free: Vec<usize>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocates a detached node bound to `layer`.
    pub fn alloc(&mut self, layer: LayerId) -> NodeId {
        let node = TreeNode::new(layer);
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn node(&self, id: NodeId) -> &TreeNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale node handle {:?}", id),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
        match self.slots.get_mut(id.0).and_then(Option::as_mut) {
            Some(node) => node,
            None => panic!("stale node handle {:?}", id),
        }
    }

    /// Returns the child of `parent` bound to `layer`, allocating it if needed.
    pub fn ensure_child(&mut self, parent: NodeId, layer: LayerId) -> NodeId {
        if let Some(existing) = self.node(parent).child(&layer) {
            return existing;
        }
        let child = self.alloc(layer);
        self.link(parent, child);
        child
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        let layer = self.node(child).id;
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.insert(layer, child);
    }

    /// Links the detached node `child` under `parent`.
    ///
    /// If `parent` already has a child bound to the same layer, `child`'s
    /// children are merged into it recursively and `child`'s slot is freed.
    /// Returns the handle that ends up linked under `parent`.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> NodeId {
        debug_assert!(self.node(child).parent.is_none(), "attach of a linked node");
        let layer = self.node(child).id;
        match self.node(parent).child(&layer) {
            None => {
                self.link(parent, child);
                child
            }
            Some(existing) if existing == child => child,
            Some(existing) => {
                let grandchildren: Vec<NodeId> = self.node(child).children().collect();
                for grandchild in grandchildren {
                    self.node_mut(grandchild).parent = None;
                    self.attach(existing, grandchild);
                }
                self.release(child);
                existing
            }
        }
    }

    /// Unlinks `id` from its parent. Its subtree stays intact.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.node(id).parent else {
            return;
        };
        let layer = self.node(id).id;
        self.node_mut(parent).children.remove(&layer);
        self.node_mut(id).parent = None;
    }

    /// Unlinks `id`, promotes its children onto its former parent and frees it.
    ///
    /// Returns the former parent, or `None` if `id` was already detached
    /// (in which case nothing changes).
    pub fn splice(&mut self, id: NodeId) -> Option<NodeId> {
        let parent = self.node(id).parent?;
        self.detach(id);
        let children: Vec<NodeId> = self.node(id).children().collect();
        for child in children {
            self.node_mut(child).parent = None;
            self.attach(parent, child);
        }
        self.node_mut(id).children.clear();
        self.release(id);
        Some(parent)
    }

    /// Duplicates the subtree at `id` into fresh, detached slots.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let layer = self.node(id).id;
        let children: Vec<NodeId> = self.node(id).children().collect();
        let copy = self.alloc(layer);
        for child in children {
            let child_copy = self.deep_clone(child);
            self.link(copy, child_copy);
        }
        copy
    }

    /// Frees a detached subtree.
    pub fn free_subtree(&mut self, id: NodeId) {
        let children: Vec<NodeId> = self.node(id).children().collect();
        for child in children {
            self.free_subtree(child);
        }
        self.release(id);
    }

    fn release(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            if slot.take().is_some() {
                self.free.push(id.0);
            }
        }
    }

    /// True if `ancestor` is `id` or lies on `id`'s parent chain.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.node(node).parent;
        }
        false
    }

    /// Layer ids from the root down to `id`, inclusive.
    pub fn layer_chain(&self, id: NodeId) -> Vec<LayerId> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            let n = self.node(node);
            chain.push(n.id);
            current = n.parent;
        }
        chain.reverse();
        chain
    }

    /// Layer ids on the way from `ancestor` (exclusive) down to `id`
    /// (inclusive), or `None` if `id` is not in `ancestor`'s subtree.
    pub fn layers_below(&self, ancestor: NodeId, id: NodeId) -> Option<Vec<LayerId>> {
        let mut layers = Vec::new();
        let mut current = id;
        while current != ancestor {
            let node = self.node(current);
            layers.push(node.id);
            current = node.parent?;
        }
        layers.reverse();
        Some(layers)
    }

    #[cfg(test)]
    fn subtree_len(&self, id: NodeId) -> usize {
        1 + self
            .node(id)
            .children()
            .map(|child| self.subtree_len(child))
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layers(n: usize) -> Vec<LayerId> {
        (0..n).map(|_| LayerId::new()).collect()
    }

    #[test]
    fn test_ensure_child_is_idempotent() {
        let l = layers(2);
        let mut arena = NodeArena::new();
        let root = arena.alloc(l[0]);
        let a = arena.ensure_child(root, l[1]);
        assert_eq!(arena.ensure_child(root, l[1]), a);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a).unwrap().parent(), Some(root));
    }

    #[test]
    fn test_splice_promotes_children() {
        let l = layers(4);
        let mut arena = NodeArena::new();
        let root = arena.alloc(l[0]);
        let a = arena.ensure_child(root, l[1]);
        let b = arena.ensure_child(a, l[2]);
        let c = arena.ensure_child(b, l[3]);

        assert_eq!(arena.splice(a), Some(root));
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(root).unwrap().child(&l[2]), Some(b));
        assert_eq!(arena.get(b).unwrap().parent(), Some(root));
        assert_eq!(arena.get(b).unwrap().child(&l[3]), Some(c));
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn test_attach_merges_same_layer() {
        let l = layers(4);
        let mut arena = NodeArena::new();
        let root = arena.alloc(l[0]);
        let a = arena.ensure_child(root, l[1]);
        arena.ensure_child(a, l[2]);

        let other = arena.alloc(l[1]);
        arena.ensure_child(other, l[2]);
        arena.ensure_child(other, l[3]);

        let linked = arena.attach(root, other);
        assert_eq!(linked, a);
        assert!(arena.get(other).is_none());
        let a_node = arena.get(a).unwrap();
        assert!(a_node.has_child(&l[2]));
        assert!(a_node.has_child(&l[3]));
        assert_eq!(arena.subtree_len(root), 4);
    }

    #[test]
    fn test_deep_clone_and_free() {
        let l = layers(3);
        let mut arena = NodeArena::new();
        let root = arena.alloc(l[0]);
        let a = arena.ensure_child(root, l[1]);
        arena.ensure_child(a, l[2]);

        let copy = arena.deep_clone(a);
        assert_ne!(copy, a);
        assert!(arena.get(copy).unwrap().parent().is_none());
        assert_eq!(arena.subtree_len(copy), 2);
        assert_eq!(arena.len(), 5);

        arena.free_subtree(copy);
        assert_eq!(arena.len(), 3);
        let reused = arena.alloc(l[2]);
        assert!(reused.index() < 5);
    }

    #[test]
    fn test_ancestry() {
        let l = layers(3);
        let mut arena = NodeArena::new();
        let root = arena.alloc(l[0]);
        let a = arena.ensure_child(root, l[1]);
        let b = arena.ensure_child(a, l[2]);
        assert!(arena.is_ancestor_or_self(a, b));
        assert!(arena.is_ancestor_or_self(b, b));
        assert!(!arena.is_ancestor_or_self(b, a));
        assert_eq!(arena.layer_chain(b), l);
    }

    #[test]
    fn test_layers_below() {
        let l = layers(3);
        let mut arena = NodeArena::new();
        let root = arena.alloc(l[0]);
        let a = arena.ensure_child(root, l[1]);
        let b = arena.ensure_child(a, l[2]);
        assert_eq!(arena.layers_below(root, b), Some(vec![l[1], l[2]]));
        assert_eq!(arena.layers_below(a, a), Some(vec![]));
        assert_eq!(arena.layers_below(b, a), None);
    }
}
