//! Dynamic bounding volume tree.
//!
//! A binary AABB tree that supports incremental insert, remove and refit,
//! used by [`DbvtBroadphase`](crate::DbvtBroadphase) and as the query
//! accelerator of [`AxisSweep`](crate::AxisSweep).
//!
//! # Layout
//!
//! All nodes live in one arena (`Vec<Node>`); children and parents are
//! [`NodeId`] indices into it. Freed nodes are recycled through a free list,
//! so a steady-state tree stops allocating.
//!
//! # Algorithm
//!
//! - **Insert** descends from the root, at each step choosing the child whose
//!   center is closer (L1) to the new volume, then splices a new parent above
//!   the reached leaf and refits ancestors until one already contains the new
//!   volume.
//! - **Remove** replaces the leaf's parent with its sibling and refits
//!   ancestors while their volume keeps changing.
//! - **Incremental optimization** walks from the root along the bits of a
//!   rolling path counter, rotating a node above its parent whenever the
//!   parent sits at a larger arena index, and reinserts the leaf it reaches.
//!   A few passes per frame keep the tree balanced without a rebuild.
//! - **Top-down optimization** rebuilds the tree by splitting on the axis
//!   that best halves the leaf centers, switching to greedy bottom-up merging
//!   for small subsets.

use nalgebra::{Point3, Vector3};

use crate::aabb::{Aabb, RaySlab};

/// Index of a node in a [`Dbvt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(u32);

impl NodeId {
    #[allow(clippy::cast_possible_truncation)]
    fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    const fn idx(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum NodeKind<T> {
    Leaf(T),
    Internal([NodeId; 2]),
    Free,
}

#[derive(Debug, Clone)]
struct Node<T> {
    volume: Aabb,
    parent: Option<NodeId>,
    kind: NodeKind<T>,
}

/// Dynamic AABB tree storing one `T` per leaf.
#[derive(Debug, Clone)]
pub struct Dbvt<T> {
    nodes: Vec<Node<T>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    leaves: usize,
    opath: u32,
    lookahead: Option<usize>,
}

impl<T: Copy> Default for Dbvt<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> Dbvt<T> {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            leaves: 0,
            opath: 0,
            lookahead: None,
        }
    }

    /// Limit how far above the old position a refit restarts its descent.
    ///
    /// `None` (the default) always restarts from the root.
    #[must_use]
    pub fn with_lookahead(mut self, lookahead: Option<usize>) -> Self {
        self.lookahead = lookahead;
        self
    }

    /// Root node, if the tree is not empty.
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Volume of the root, if the tree is not empty.
    #[must_use]
    pub fn root_volume(&self) -> Option<Aabb> {
        self.root.map(|r| self.node(r).volume)
    }

    /// Number of leaves.
    #[must_use]
    pub fn leaves(&self) -> usize {
        self.leaves
    }

    /// Whether the tree has no leaves.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Volume stored in `node`.
    #[must_use]
    pub fn volume(&self, node: NodeId) -> Option<Aabb> {
        match self.nodes.get(node.idx()) {
            Some(n) if !matches!(n.kind, NodeKind::Free) => Some(n.volume),
            _ => None,
        }
    }

    /// Payload of a leaf node.
    #[must_use]
    pub fn data(&self, leaf: NodeId) -> Option<T> {
        match self.nodes.get(leaf.idx()).map(|n| n.kind) {
            Some(NodeKind::Leaf(data)) => Some(data),
            _ => None,
        }
    }

    /// Remove every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
        self.leaves = 0;
        self.opath = 0;
    }

    // ========================================================================
    // Node arena
    // ========================================================================

    fn node(&self, id: NodeId) -> &Node<T> {
        &self.nodes[id.idx()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        &mut self.nodes[id.idx()]
    }

    fn create_node(&mut self, parent: Option<NodeId>, volume: Aabb, kind: NodeKind<T>) -> NodeId {
        let node = Node {
            volume,
            parent,
            kind,
        };
        if let Some(id) = self.free.pop() {
            *self.node_mut(id) = node;
            id
        } else {
            self.nodes.push(node);
            NodeId::from_index(self.nodes.len() - 1)
        }
    }

    fn delete_node(&mut self, id: NodeId) {
        self.node_mut(id).kind = NodeKind::Free;
        self.free.push(id);
    }

    fn children(&self, id: NodeId) -> Option<[NodeId; 2]> {
        match self.node(id).kind {
            NodeKind::Internal(children) => Some(children),
            _ => None,
        }
    }

    /// Which child slot of its parent `id` occupies.
    fn child_slot(&self, parent: NodeId, id: NodeId) -> usize {
        usize::from(self.children(parent).is_some_and(|c| c[1] == id))
    }

    fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        let slot = self.child_slot(parent, old);
        if let NodeKind::Internal(children) = &mut self.node_mut(parent).kind {
            children[slot] = new;
        }
    }

    fn refit(&mut self, id: NodeId) {
        if let Some([c0, c1]) = self.children(id) {
            let merged = self.node(c0).volume.merged(&self.node(c1).volume);
            self.node_mut(id).volume = merged;
        }
    }

    // ========================================================================
    // Leaf insertion and removal
    // ========================================================================

    fn insert_leaf(&mut self, start: Option<NodeId>, leaf: NodeId) {
        let Some(root) = self.root else {
            self.root = Some(leaf);
            self.node_mut(leaf).parent = None;
            return;
        };

        let volume = self.node(leaf).volume;
        let mut target = start.unwrap_or(root);
        while let Some([c0, c1]) = self.children(target) {
            let d0 = volume.proximity(&self.node(c0).volume);
            let d1 = volume.proximity(&self.node(c1).volume);
            target = if d0 < d1 { c0 } else { c1 };
        }

        let prev = self.node(target).parent;
        let merged = volume.merged(&self.node(target).volume);
        let node = self.create_node(prev, merged, NodeKind::Internal([target, leaf]));
        self.node_mut(target).parent = Some(node);
        self.node_mut(leaf).parent = Some(node);

        match prev {
            Some(prev) => {
                self.replace_child(prev, target, node);
                let mut child = node;
                let mut ancestor = Some(prev);
                while let Some(a) = ancestor {
                    if self.node(a).volume.contains(&self.node(child).volume) {
                        break;
                    }
                    self.refit(a);
                    child = a;
                    ancestor = self.node(a).parent;
                }
            }
            None => self.root = Some(node),
        }
    }

    /// Detach `leaf`, returning the node from which a reinsertion should
    /// start descending.
    fn remove_leaf(&mut self, leaf: NodeId) -> Option<NodeId> {
        if self.root == Some(leaf) {
            self.root = None;
            return None;
        }
        let parent = self.node(leaf).parent?;
        let prev = self.node(parent).parent;
        let [c0, c1] = self.children(parent)?;
        let sibling = if c0 == leaf { c1 } else { c0 };

        match prev {
            Some(prev) => {
                self.replace_child(prev, parent, sibling);
                self.node_mut(sibling).parent = Some(prev);
                self.delete_node(parent);

                let mut cursor = Some(prev);
                while let Some(n) = cursor {
                    let before = self.node(n).volume;
                    self.refit(n);
                    if before == self.node(n).volume {
                        break;
                    }
                    cursor = self.node(n).parent;
                }
                cursor.or(self.root)
            }
            None => {
                self.root = Some(sibling);
                self.node_mut(sibling).parent = None;
                self.delete_node(parent);
                self.root
            }
        }
    }

    fn reinsert_start(&self, from: Option<NodeId>) -> Option<NodeId> {
        let mut start = from?;
        match self.lookahead {
            Some(steps) => {
                for _ in 0..steps {
                    match self.node(start).parent {
                        Some(p) => start = p,
                        None => break,
                    }
                }
                Some(start)
            }
            None => self.root,
        }
    }

    /// Insert a leaf carrying `data` with the given volume.
    pub fn insert(&mut self, volume: Aabb, data: T) -> NodeId {
        let leaf = self.create_node(None, volume, NodeKind::Leaf(data));
        self.insert_leaf(self.root, leaf);
        self.leaves += 1;
        leaf
    }

    /// Remove a leaf, returning its payload.
    pub fn remove(&mut self, leaf: NodeId) -> Option<T> {
        let data = self.data(leaf)?;
        self.remove_leaf(leaf);
        self.delete_node(leaf);
        self.leaves -= 1;
        Some(data)
    }

    /// Reinsert a leaf without changing its volume.
    pub fn update(&mut self, leaf: NodeId) {
        debug_assert!(self.data(leaf).is_some(), "update on a non-leaf node");
        let start = self.remove_leaf(leaf);
        let start = self.reinsert_start(start);
        self.insert_leaf(start, leaf);
    }

    /// Replace a leaf's volume and reinsert it.
    pub fn update_volume(&mut self, leaf: NodeId, volume: Aabb) {
        debug_assert!(self.data(leaf).is_some(), "update on a non-leaf node");
        let start = self.remove_leaf(leaf);
        let start = self.reinsert_start(start);
        self.node_mut(leaf).volume = volume;
        self.insert_leaf(start, leaf);
    }

    /// Refit a leaf only if `volume` escapes its current volume.
    ///
    /// The stored volume is `volume` grown by `margin` and stretched along
    /// `velocity`, so small motions in the same direction stay inside it.
    /// Returns `false` when nothing had to change.
    pub fn update_with_velocity(
        &mut self,
        leaf: NodeId,
        volume: Aabb,
        velocity: &Vector3<f64>,
        margin: f64,
    ) -> bool {
        if self.node(leaf).volume.contains(&volume) {
            return false;
        }
        let fattened = volume.expanded(margin).signed_expanded(velocity);
        self.update_volume(leaf, fattened);
        true
    }

    // ========================================================================
    // Optimization
    // ========================================================================

    /// Rotate `n` above its parent when the parent has the larger index.
    /// Returns the node now occupying `n`'s old position.
    fn sort(&mut self, n: NodeId) -> NodeId {
        let Some(p) = self.node(n).parent else {
            return n;
        };
        if p <= n {
            return n;
        }
        let (Some(p_children), Some(n_children)) = (self.children(p), self.children(n)) else {
            return n;
        };

        let i = self.child_slot(p, n);
        let j = 1 - i;
        let sibling = p_children[j];
        let grandparent = self.node(p).parent;

        match grandparent {
            Some(q) => self.replace_child(q, p, n),
            None => self.root = Some(n),
        }
        self.node_mut(sibling).parent = Some(n);
        self.node_mut(p).parent = Some(n);
        self.node_mut(n).parent = grandparent;

        self.node_mut(p).kind = NodeKind::Internal(n_children);
        self.node_mut(n_children[0]).parent = Some(p);
        self.node_mut(n_children[1]).parent = Some(p);

        let mut new_children = [sibling; 2];
        new_children[i] = p;
        new_children[j] = sibling;
        self.node_mut(n).kind = NodeKind::Internal(new_children);

        let pv = self.node(p).volume;
        let nv = self.node(n).volume;
        self.node_mut(p).volume = nv;
        self.node_mut(n).volume = pv;
        p
    }

    /// Run `passes` incremental optimization steps.
    pub fn optimize_incremental(&mut self, passes: usize) {
        if self.root.is_none() {
            return;
        }
        for _ in 0..passes {
            let Some(mut node) = self.root else {
                return;
            };
            let mut bit = 0u32;
            while self.children(node).is_some() {
                let sorted = self.sort(node);
                let Some(children) = self.children(sorted) else {
                    break;
                };
                node = children[((self.opath >> bit) & 1) as usize];
                bit = (bit + 1) & (u32::BITS - 1);
            }
            self.update(node);
            self.opath = self.opath.wrapping_add(1);
        }
    }

    /// Rebuild the whole tree top-down, merging subsets of at most
    /// `bottom_up_threshold` leaves greedily.
    pub fn optimize_top_down(&mut self, bottom_up_threshold: usize) {
        let Some(root) = self.root else {
            return;
        };
        let mut leaves = Vec::with_capacity(self.leaves);
        self.fetch_leaves(root, &mut leaves);
        let new_root = self.top_down(leaves, bottom_up_threshold.max(2));
        self.node_mut(new_root).parent = None;
        self.root = Some(new_root);
    }

    /// Collect the leaves below `root`, freeing every internal node.
    fn fetch_leaves(&mut self, root: NodeId, leaves: &mut Vec<NodeId>) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            match self.children(id) {
                Some([c0, c1]) => {
                    stack.push(c0);
                    stack.push(c1);
                    self.delete_node(id);
                }
                None => leaves.push(id),
            }
        }
    }

    fn bounds(&self, leaves: &[NodeId]) -> Aabb {
        leaves
            .iter()
            .map(|&l| self.node(l).volume)
            .reduce(|a, b| a.merged(&b))
            .unwrap_or_default()
    }

    fn top_down(&mut self, leaves: Vec<NodeId>, threshold: usize) -> NodeId {
        if leaves.len() <= threshold {
            return self.bottom_up(leaves);
        }

        let volume = self.bounds(&leaves);
        let origin = volume.center();
        let axes = [Vector3::x(), Vector3::y(), Vector3::z()];
        let side = |tree: &Self, leaf: NodeId, axis: &Vector3<f64>| -> usize {
            usize::from((tree.node(leaf).volume.center() - origin).dot(axis) > 0.0)
        };

        let mut split_count = [[0usize; 2]; 3];
        for &leaf in &leaves {
            for (count, axis) in split_count.iter_mut().zip(&axes) {
                count[side(self, leaf, axis)] += 1;
            }
        }

        let mut best_axis = None;
        let mut best_midp = leaves.len();
        for (i, count) in split_count.iter().enumerate() {
            if count[0] > 0 && count[1] > 0 {
                let midp = count[0].abs_diff(count[1]);
                if midp < best_midp {
                    best_axis = Some(i);
                    best_midp = midp;
                }
            }
        }

        let (left, right): (Vec<NodeId>, Vec<NodeId>) = match best_axis {
            Some(axis) => leaves
                .iter()
                .partition(|&&leaf| side(self, leaf, &axes[axis]) == 0),
            None => {
                let mid = leaves.len() / 2;
                (leaves[..mid].to_vec(), leaves[mid..].to_vec())
            }
        };

        let c0 = self.top_down(left, threshold);
        let c1 = self.top_down(right, threshold);
        let node = self.create_node(None, volume, NodeKind::Internal([c0, c1]));
        self.node_mut(c0).parent = Some(node);
        self.node_mut(c1).parent = Some(node);
        node
    }

    fn bottom_up(&mut self, mut leaves: Vec<NodeId>) -> NodeId {
        fn cost(a: &Aabb) -> f64 {
            let d = a.max - a.min;
            d.x * d.y * d.z + d.x + d.y + d.z
        }

        while leaves.len() > 1 {
            let mut best = (f64::INFINITY, 0, 1);
            for i in 0..leaves.len() {
                for j in (i + 1)..leaves.len() {
                    let merged = self
                        .node(leaves[i])
                        .volume
                        .merged(&self.node(leaves[j]).volume);
                    let c = cost(&merged);
                    if c < best.0 {
                        best = (c, i, j);
                    }
                }
            }
            let (_, i, j) = best;
            let (a, b) = (leaves[i], leaves[j]);
            let volume = self.node(a).volume.merged(&self.node(b).volume);
            let parent = self.create_node(None, volume, NodeKind::Internal([a, b]));
            self.node_mut(a).parent = Some(parent);
            self.node_mut(b).parent = Some(parent);
            leaves[i] = parent;
            leaves.swap_remove(j);
        }
        leaves[0]
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Report every pair of overlapping leaves, one below `a` in this tree
    /// and one below `b` in `other`.
    ///
    /// When `other` is this tree, pairs are reported once and a leaf is never
    /// paired with itself.
    pub fn collide_tree_tree(
        &self,
        a: Option<NodeId>,
        other: &Self,
        b: Option<NodeId>,
        mut on_pair: impl FnMut(T, T),
    ) {
        let (Some(a), Some(b)) = (a, b) else {
            return;
        };
        let same_tree = std::ptr::eq(self, other);
        let mut stack = vec![(a, b)];

        while let Some((na, nb)) = stack.pop() {
            let (node_a, node_b) = (self.node(na), other.node(nb));
            if same_tree && na == nb {
                if let NodeKind::Internal([c0, c1]) = node_a.kind {
                    stack.push((c0, c0));
                    stack.push((c1, c1));
                    stack.push((c0, c1));
                }
                continue;
            }
            if !node_a.volume.overlaps(&node_b.volume) {
                continue;
            }
            match (node_a.kind, node_b.kind) {
                (NodeKind::Internal([a0, a1]), NodeKind::Internal([b0, b1])) => {
                    stack.push((a0, b0));
                    stack.push((a1, b0));
                    stack.push((a0, b1));
                    stack.push((a1, b1));
                }
                (NodeKind::Internal([a0, a1]), NodeKind::Leaf(_)) => {
                    stack.push((a0, nb));
                    stack.push((a1, nb));
                }
                (NodeKind::Leaf(_), NodeKind::Internal([b0, b1])) => {
                    stack.push((na, b0));
                    stack.push((na, b1));
                }
                (NodeKind::Leaf(x), NodeKind::Leaf(y)) => on_pair(x, y),
                _ => {}
            }
        }
    }

    /// Report every leaf below `root` whose volume overlaps `volume`.
    pub fn collide_tree_volume(
        &self,
        root: Option<NodeId>,
        volume: &Aabb,
        mut on_leaf: impl FnMut(T),
    ) {
        let Some(root) = root else {
            return;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if !node.volume.overlaps(volume) {
                continue;
            }
            match node.kind {
                NodeKind::Internal([c0, c1]) => {
                    stack.push(c0);
                    stack.push(c1);
                }
                NodeKind::Leaf(data) => on_leaf(data),
                NodeKind::Free => {}
            }
        }
    }

    /// Report every leaf whose volume is crossed by the segment `from → to`.
    pub fn ray_test(&self, from: Point3<f64>, to: Point3<f64>, mut on_leaf: impl FnMut(T)) {
        let Some(root) = self.root else {
            return;
        };
        let ray = RaySlab::new(from, to);
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if !node.volume.intersects_ray(&ray, 0.0, ray.lambda_max) {
                continue;
            }
            match node.kind {
                NodeKind::Internal([c0, c1]) => {
                    stack.push(c0);
                    stack.push(c1);
                }
                NodeKind::Leaf(data) => on_leaf(data),
                NodeKind::Free => {}
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_box(x: f64, y: f64, z: f64) -> Aabb {
        Aabb::new(Point3::new(x, y, z), Point3::new(x + 1.0, y + 1.0, z + 1.0))
    }

    /// Walk the whole tree checking links, containment and the leaf count.
    fn assert_consistent<T: Copy>(tree: &Dbvt<T>) {
        let Some(root) = tree.root else {
            assert_eq!(tree.leaves, 0);
            return;
        };
        assert!(tree.node(root).parent.is_none());
        let mut leaves = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = tree.node(id);
            match node.kind {
                NodeKind::Internal([c0, c1]) => {
                    for c in [c0, c1] {
                        assert_eq!(tree.node(c).parent, Some(id));
                        assert!(node.volume.contains(&tree.node(c).volume));
                        stack.push(c);
                    }
                }
                NodeKind::Leaf(_) => leaves += 1,
                NodeKind::Free => panic!("reachable free node"),
            }
        }
        assert_eq!(leaves, tree.leaves);
    }

    fn grid_tree(n: usize) -> (Dbvt<usize>, Vec<NodeId>) {
        let mut tree = Dbvt::new();
        let ids = (0..n)
            .map(|i| {
                let (x, y) = ((i % 8) as f64 * 0.8, (i / 8) as f64 * 0.8);
                tree.insert(unit_box(x, y, 0.0), i)
            })
            .collect();
        (tree, ids)
    }

    fn self_pairs(tree: &Dbvt<usize>) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        tree.collide_tree_tree(tree.root(), tree, tree.root(), |a, b| {
            pairs.push((a.min(b), a.max(b)));
        });
        pairs.sort_unstable();
        pairs
    }

    #[test]
    fn test_insert_and_remove() {
        let (mut tree, ids) = grid_tree(20);
        assert_eq!(tree.leaves(), 20);
        assert_consistent(&tree);

        for &id in ids.iter().step_by(2) {
            assert!(tree.remove(id).is_some());
        }
        assert_eq!(tree.leaves(), 10);
        assert_consistent(&tree);
        assert!(tree.remove(ids[0]).is_none());

        for &id in ids.iter().skip(1).step_by(2) {
            tree.remove(id);
        }
        assert!(tree.is_empty());
        assert_consistent(&tree);
    }

    #[test]
    fn test_nodes_are_recycled() {
        let (mut tree, ids) = grid_tree(16);
        let allocated = tree.nodes.len();
        for id in ids {
            tree.remove(id);
        }
        for i in 0..16 {
            tree.insert(unit_box(i as f64, 0.0, 0.0), i);
        }
        assert_eq!(tree.nodes.len(), allocated);
    }

    #[test]
    fn test_collide_self_matches_brute_force() {
        let mut tree = Dbvt::new();
        let boxes: Vec<Aabb> = (0..30)
            .map(|i| {
                let t = i as f64;
                unit_box((t * 0.7) % 5.0, (t * 1.3) % 4.0, (t * 0.4) % 3.0)
            })
            .collect();
        for (i, b) in boxes.iter().enumerate() {
            tree.insert(*b, i);
        }

        let mut expected = Vec::new();
        for i in 0..boxes.len() {
            for j in (i + 1)..boxes.len() {
                if boxes[i].overlaps(&boxes[j]) {
                    expected.push((i, j));
                }
            }
        }
        assert_eq!(self_pairs(&tree), expected);
    }

    #[test]
    fn test_collide_two_trees() {
        let mut a = Dbvt::new();
        let mut b = Dbvt::new();
        a.insert(unit_box(0.0, 0.0, 0.0), 1usize);
        a.insert(unit_box(10.0, 0.0, 0.0), 2);
        b.insert(unit_box(0.5, 0.5, 0.5), 3usize);
        b.insert(unit_box(20.0, 0.0, 0.0), 4);

        let mut pairs = Vec::new();
        a.collide_tree_tree(a.root(), &b, b.root(), |x, y| pairs.push((x, y)));
        assert_eq!(pairs, vec![(1, 3)]);
    }

    #[test]
    fn test_update_with_velocity_skips_contained_motion() {
        let mut tree = Dbvt::new();
        let leaf = tree.insert(unit_box(0.0, 0.0, 0.0).expanded(0.5), 0usize);
        let moved = unit_box(0.1, 0.0, 0.0);
        assert!(!tree.update_with_velocity(leaf, moved, &Vector3::zeros(), 0.05));

        let moved = unit_box(2.0, 0.0, 0.0);
        let velocity = Vector3::new(0.5, 0.0, 0.0);
        assert!(tree.update_with_velocity(leaf, moved, &velocity, 0.05));
        let volume = tree.volume(leaf).unwrap();
        assert!(volume.contains(&moved));
        assert_relative_eq!(volume.max.x, 3.0 + 0.05 + 0.5);
        assert_relative_eq!(volume.min.x, 2.0 - 0.05);
    }

    #[test]
    fn test_update_keeps_tree_consistent() {
        let (mut tree, ids) = grid_tree(32);
        for (k, &id) in ids.iter().enumerate() {
            let x = (k % 5) as f64 * 3.0;
            tree.update_volume(id, unit_box(x, -(k as f64), 2.0));
            assert_consistent(&tree);
        }
        assert_eq!(tree.leaves(), 32);
    }

    #[test]
    fn test_incremental_optimization_preserves_pairs() {
        let (mut tree, _) = grid_tree(40);
        let before = self_pairs(&tree);
        tree.optimize_incremental(200);
        assert_consistent(&tree);
        assert_eq!(self_pairs(&tree), before);
    }

    #[test]
    fn test_top_down_rebuild_preserves_pairs() {
        let (mut tree, ids) = grid_tree(64);
        let before = self_pairs(&tree);
        tree.optimize_top_down(4);
        assert_consistent(&tree);
        assert_eq!(self_pairs(&tree), before);
        // Leaf ids survive a rebuild.
        assert_eq!(tree.data(ids[10]), Some(10));
    }

    #[test]
    fn test_volume_query_and_ray() {
        let (tree, _) = grid_tree(16);
        let mut hits = Vec::new();
        tree.collide_tree_volume(tree.root(), &unit_box(0.2, 0.2, 0.2), |d| hits.push(d));
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1, 8, 9]);

        let mut hits = Vec::new();
        tree.ray_test(Point3::new(-5.0, 0.5, 0.5), Point3::new(50.0, 0.5, 0.5), |d| {
            hits.push(d);
        });
        hits.sort_unstable();
        assert_eq!(hits, (0..8).collect::<Vec<_>>());

        let mut hits = Vec::new();
        tree.ray_test(Point3::new(-5.0, 0.5, 0.5), Point3::new(-1.0, 0.5, 0.5), |d| {
            hits.push(d);
        });
        assert!(hits.is_empty());
    }

    #[test]
    fn test_lookahead_reinsertion() {
        let mut tree = Dbvt::new().with_lookahead(Some(1));
        let ids: Vec<_> = (0..12)
            .map(|i| tree.insert(unit_box(i as f64 * 2.0, 0.0, 0.0), i))
            .collect();
        tree.update_volume(ids[3], unit_box(100.0, 0.0, 0.0));
        assert_consistent(&tree);
        assert!(tree.root_volume().unwrap().max.x >= 101.0);
    }
}
