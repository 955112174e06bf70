//! Arena-backed octree
//!
//! Nodes live in a flat `Vec` and refer to each other by [`NodeId`]. A node is
//! either a leaf (`children == None`) or internal with exactly 8 children.
//!
//! Inserted objects start *unplaced* at the deepest existing node that can
//! hold them. [`Octree::propagate`] subdivides crowded leaves and pushes
//! unplaced objects down; an object that cannot move further is marked
//! placed. Removals merge children back into their parent once the combined
//! content fits in one cell.
//!
//! Octant `i` of a node takes the upper half in x when bit 0 is set, in z for
//! bit 1 and in y for bit 2.

use super::{Primitive, RangeQuery};
use crate::bounds::BoundingRegion;
use glam::Vec3;

/// Index of a node in the octree arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Entry<P, U> {
    primitive: P,
    userdata: U,
    placed: bool,
}

#[derive(Debug)]
struct Node<P, U> {
    parent: Option<NodeId>,
    children: Option<[NodeId; 8]>,
    depth: u32,
    region: BoundingRegion,
    content: Vec<Entry<P, U>>,
}

/// Summary of one node handed to [`Octree::traverse_nodes`]
#[derive(Debug, Clone, Copy)]
pub struct NodeInfo {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub depth: u32,
    pub region: BoundingRegion,
    pub is_leaf: bool,
    pub len: usize,
    pub unplaced: usize,
}

/// Octant of `region` that `point` falls into
pub fn best_fit_octant(region: &BoundingRegion, point: Vec3) -> usize {
    let c = region.center();
    (point.x > c.x) as usize + 2 * (point.z > c.z) as usize + 4 * (point.y > c.y) as usize
}

/// Sub-region of `region` for `octant`, matching [`best_fit_octant`]
pub fn octant_region(region: &BoundingRegion, octant: usize) -> BoundingRegion {
    let c = region.center();
    let pick = |bit: usize, min: f32, mid: f32, max: f32| {
        if octant & bit != 0 {
            (mid, max)
        } else {
            (min, mid)
        }
    };
    let (x0, x1) = pick(1, region.min.x, c.x, region.max.x);
    let (z0, z1) = pick(2, region.min.z, c.z, region.max.z);
    let (y0, y1) = pick(4, region.min.y, c.y, region.max.y);
    BoundingRegion::new(Vec3::new(x0, y0, z0), Vec3::new(x1, y1, z1))
}

/// Spatial index over `P` primitives carrying `U` payloads.
///
/// A leaf splits once it holds more than `MAX_CELL_COUNT` objects and its depth
/// is below `MAX_DEPTH - 1`. Leaves at the depth limit hold any number of objects.
#[derive(Debug)]
pub struct Octree<P, U, const MAX_CELL_COUNT: usize = 8, const MAX_DEPTH: u32 = 8> {
    nodes: Vec<Node<P, U>>,
    free: Vec<usize>,
    root: NodeId,
    len: usize,
}

impl<P, U, const MAX_CELL_COUNT: usize, const MAX_DEPTH: u32> Octree<P, U, MAX_CELL_COUNT, MAX_DEPTH>
where
    P: Primitive,
{
    pub fn new(region: BoundingRegion) -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: None,
                depth: 0,
                region,
                content: Vec::new(),
            }],
            free: Vec::new(),
            root: NodeId(0),
            len: 0,
        }
    }

    /// Seed the root with a bulk list and propagate once
    pub fn with_content(region: BoundingRegion, items: impl IntoIterator<Item = (P, U)>) -> Self {
        let mut tree = Self::new(region);
        for (primitive, userdata) in items {
            tree.node_mut(tree.root).content.push(Entry {
                primitive,
                userdata,
                placed: false,
            });
            tree.len += 1;
        }
        tree.propagate();
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn region(&self) -> &BoundingRegion {
        &self.node(self.root).region
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of live nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.node(id).children.is_none()
    }

    /// Drop all content and children, keeping the root region
    pub fn clear(&mut self) {
        let region = self.node(self.root).region;
        *self = Self::new(region);
    }

    fn node(&self, id: NodeId) -> &Node<P, U> {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<P, U> {
        &mut self.nodes[id.0]
    }

    fn allocate(&mut self, node: Node<P, U>) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                NodeId(index)
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn release(&mut self, id: NodeId) -> Vec<Entry<P, U>> {
        let node = self.node_mut(id);
        node.parent = None;
        node.children = None;
        self.free.push(id.0);
        std::mem::take(&mut self.nodes[id.0].content)
    }

    /// Append an unplaced object at the deepest existing node that can hold it.
    ///
    /// Objects outside the root region stay at the root.
    pub fn insert(&mut self, primitive: P, userdata: U) {
        let mut current = self.root;
        while let Some(children) = self.node(current).children {
            let octant = best_fit_octant(&self.node(current).region, primitive.anchor());
            let child = children[octant];
            if !primitive.is_inside(&self.node(child).region) {
                break;
            }
            current = child;
        }

        self.node_mut(current).content.push(Entry {
            primitive,
            userdata,
            placed: false,
        });
        self.len += 1;
    }

    /// Subdivide crowded leaves and move unplaced objects as deep as they fit.
    pub fn propagate(&mut self) {
        self.propagate_node(self.root);
    }

    fn propagate_node(&mut self, id: NodeId) {
        let needs_split = {
            let node = self.node(id);
            node.children.is_none()
                && node.content.len() > MAX_CELL_COUNT
                && node.depth + 1 < MAX_DEPTH
        };

        if needs_split {
            for entry in &mut self.node_mut(id).content {
                entry.placed = false;
            }
            self.subdivide(id);
        }

        let Some(children) = self.node(id).children else {
            for entry in &mut self.node_mut(id).content {
                entry.placed = true;
            }
            return;
        };

        let region = self.node(id).region;
        let content = std::mem::take(&mut self.node_mut(id).content);
        let mut kept = Vec::with_capacity(content.len());
        for mut entry in content {
            if entry.placed {
                kept.push(entry);
                continue;
            }
            let child = children[best_fit_octant(&region, entry.primitive.anchor())];
            if entry.primitive.is_inside(&self.node(child).region) {
                self.node_mut(child).content.push(entry);
            } else {
                entry.placed = true;
                kept.push(entry);
            }
        }
        self.node_mut(id).content = kept;

        for child in children {
            self.propagate_node(child);
        }
    }

    fn subdivide(&mut self, id: NodeId) {
        let (region, depth) = {
            let node = self.node(id);
            (node.region, node.depth)
        };
        let mut children = [NodeId(0); 8];
        for (octant, child) in children.iter_mut().enumerate() {
            *child = self.allocate(Node {
                parent: Some(id),
                children: None,
                depth: depth + 1,
                region: octant_region(&region, octant),
                content: Vec::new(),
            });
        }
        self.node_mut(id).children = Some(children);
    }

    /// Remove the first object whose payload equals `userdata`.
    pub fn remove(&mut self, userdata: &U) -> Option<(P, U)>
    where
        U: PartialEq,
    {
        let entry = self.remove_from(self.root, userdata)?;
        self.len -= 1;
        Some((entry.primitive, entry.userdata))
    }

    fn remove_from(&mut self, id: NodeId, userdata: &U) -> Option<Entry<P, U>>
    where
        U: PartialEq,
    {
        let node = self.node_mut(id);
        if let Some(index) = node.content.iter().position(|e| e.userdata == *userdata) {
            let entry = node.content.remove(index);
            self.try_merge(id);
            return Some(entry);
        }

        let children = node.children?;
        for child in children {
            if let Some(entry) = self.remove_from(child, userdata) {
                self.try_merge(id);
                return Some(entry);
            }
        }
        None
    }

    /// Collapse 8 leaf children into `id` when everything fits in one cell
    fn try_merge(&mut self, id: NodeId) {
        let Some(children) = self.node(id).children else {
            return;
        };
        if children.iter().any(|c| !self.is_leaf(*c)) {
            return;
        }

        let total = self.node(id).content.len()
            + children
                .iter()
                .map(|c| self.node(*c).content.len())
                .sum::<usize>();
        if total > MAX_CELL_COUNT {
            return;
        }

        let mut merged = Vec::with_capacity(total);
        for child in children {
            merged.extend(self.release(child).into_iter().map(|mut e| {
                e.placed = true;
                e
            }));
        }

        let node = self.node_mut(id);
        node.children = None;
        node.content.extend(merged);
    }

    /// Visit every object whose primitive intersects `query`, pruning whole
    /// subtrees whose region misses it.
    pub fn traverse_range<Q, F>(&self, query: &Q, mut visitor: F)
    where
        Q: RangeQuery<P> + ?Sized,
        F: FnMut(&P, &U),
    {
        self.traverse_range_node(self.root, query, &mut visitor);
    }

    fn traverse_range_node<Q, F>(&self, id: NodeId, query: &Q, visitor: &mut F)
    where
        Q: RangeQuery<P> + ?Sized,
        F: FnMut(&P, &U),
    {
        let node = self.node(id);
        if !query.intersects_region(&node.region) {
            return;
        }

        for entry in &node.content {
            if query.intersects(&entry.primitive) {
                visitor(&entry.primitive, &entry.userdata);
            }
        }

        if let Some(children) = node.children {
            for child in children {
                self.traverse_range_node(child, query, visitor);
            }
        }
    }

    /// Visit every object held by a leaf
    pub fn traverse_leaves<F>(&self, mut visitor: F)
    where
        F: FnMut(&P, &U),
    {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            match node.children {
                Some(children) => stack.extend(children),
                None => {
                    for entry in &node.content {
                        visitor(&entry.primitive, &entry.userdata);
                    }
                }
            }
        }
    }

    /// Visit every object regardless of where it lives
    pub fn traverse_all<F>(&self, mut visitor: F)
    where
        F: FnMut(&P, &U),
    {
        self.traverse_nodes_with_content(|node| {
            for entry in &node.content {
                visitor(&entry.primitive, &entry.userdata);
            }
        });
    }

    /// Visit a summary of each live node, parents before children
    pub fn traverse_nodes<F>(&self, mut visitor: F)
    where
        F: FnMut(NodeInfo),
    {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            visitor(NodeInfo {
                id,
                parent: node.parent,
                depth: node.depth,
                region: node.region,
                is_leaf: node.children.is_none(),
                len: node.content.len(),
                unplaced: node.content.iter().filter(|e| !e.placed).count(),
            });
            if let Some(children) = node.children {
                stack.extend(children.iter().rev());
            }
        }
    }

    fn traverse_nodes_with_content<F>(&self, mut visitor: F)
    where
        F: FnMut(&Node<P, U>),
    {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            visitor(node);
            if let Some(children) = node.children {
                stack.extend(children);
            }
        }
    }

    /// Deepest level currently in use
    pub fn max_depth(&self) -> u32 {
        let mut depth = 0;
        self.traverse_nodes(|info| depth = depth.max(info.depth));
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type PointTree = Octree<Vec3, u32, 8, 6>;

    /// xorshift32, enough for reproducible point clouds
    struct Rng(u32);

    impl Rng {
        fn next_f32(&mut self) -> f32 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 17;
            self.0 ^= self.0 << 5;
            (self.0 >> 8) as f32 / (1u32 << 24) as f32
        }

        fn point_in(&mut self, region: &BoundingRegion) -> Vec3 {
            let t = Vec3::new(self.next_f32(), self.next_f32(), self.next_f32());
            region.min + t * region.size()
        }
    }

    fn world() -> BoundingRegion {
        BoundingRegion::new(Vec3::splat(-100.0), Vec3::splat(100.0))
    }

    fn count_everywhere(tree: &PointTree) -> (usize, usize) {
        let mut at_leaves = 0;
        tree.traverse_leaves(|_, _| at_leaves += 1);
        let mut at_internal = 0;
        tree.traverse_nodes(|info| {
            if !info.is_leaf {
                at_internal += info.len;
            }
        });
        let mut total = 0;
        tree.traverse_all(|_, _| total += 1);
        assert_eq!(total, at_leaves + at_internal);
        (at_leaves, at_internal)
    }

    #[test]
    fn test_octant_convention_agrees() {
        let region = world();
        for octant in 0..8 {
            let sub = octant_region(&region, octant);
            assert_eq!(best_fit_octant(&region, sub.center()), octant);
        }
        assert_eq!(best_fit_octant(&region, Vec3::new(1.0, 0.0, 0.0)), 1);
        assert_eq!(best_fit_octant(&region, Vec3::new(0.0, 0.0, 1.0)), 2);
        assert_eq!(best_fit_octant(&region, Vec3::new(0.0, 1.0, 0.0)), 4);
    }

    #[test]
    fn test_ten_thousand_points_are_conserved() {
        let mut rng = Rng(0x1234_5678);
        let mut tree = PointTree::new(world());
        for i in 0..10_000 {
            tree.insert(rng.point_in(&world()), i);
        }
        tree.propagate();

        let (at_leaves, at_internal) = count_everywhere(&tree);
        assert_eq!(at_leaves + at_internal, 10_000);
        assert_eq!(tree.len(), 10_000);

        let mut unplaced = 0;
        tree.traverse_nodes(|info| unplaced += info.unplaced);
        assert_eq!(unplaced, 0);
        assert!(tree.max_depth() <= 5);
    }

    #[test]
    fn test_conserved_through_removals() {
        let mut rng = Rng(42);
        let mut tree = PointTree::new(world());
        for i in 0..2_000 {
            tree.insert(rng.point_in(&world()), i);
        }
        tree.propagate();
        for i in (0..2_000).step_by(3) {
            assert!(tree.remove(&i).is_some());
        }
        tree.propagate();

        let (at_leaves, at_internal) = count_everywhere(&tree);
        assert_eq!(at_leaves + at_internal, 2_000 - 667);
        assert!(tree.remove(&0).is_none());
    }

    #[test]
    fn test_subdivide_then_merge_round_trip() {
        let mut tree = PointTree::new(world());
        let corners = [
            Vec3::new(-50.0, -50.0, -50.0),
            Vec3::new(50.0, -50.0, -50.0),
            Vec3::new(-50.0, -50.0, 50.0),
            Vec3::new(50.0, -50.0, 50.0),
            Vec3::new(-50.0, 50.0, -50.0),
            Vec3::new(50.0, 50.0, -50.0),
            Vec3::new(-50.0, 50.0, 50.0),
            Vec3::new(50.0, 50.0, 50.0),
            Vec3::new(10.0, 10.0, 10.0),
        ];
        for (i, p) in corners.iter().enumerate() {
            tree.insert(*p, i as u32);
        }
        tree.propagate();
        assert!(!tree.is_leaf(tree.root()));
        assert_eq!(tree.node_count(), 9);

        tree.remove(&0);
        tree.remove(&8);

        assert!(tree.is_leaf(tree.root()));
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.len(), 7);
        let mut seen = 0;
        tree.traverse_leaves(|_, _| seen += 1);
        assert_eq!(seen, 7);
    }

    #[test]
    fn test_merge_skips_grandchildren() {
        let mut tree = PointTree::new(world());
        // Nine points in one octant force two levels of subdivision.
        for i in 0..9 {
            tree.insert(Vec3::new(60.0 + i as f32, 60.0, 60.0), i);
        }
        tree.insert(Vec3::new(-60.0, -60.0, -60.0), 9);
        tree.propagate();
        assert!(tree.max_depth() >= 2);

        // Root children are not all leaves, so removing at the root level's
        // subtree must not collapse the root in one pass.
        tree.remove(&9);
        assert!(!tree.is_leaf(tree.root()));
    }

    #[test]
    fn test_depth_limit_holds_unbounded_leaf() {
        let mut tree = Octree::<Vec3, u32, 2, 3>::new(world());
        for i in 0..50 {
            tree.insert(Vec3::splat(1.0 + i as f32 * 1e-3), i);
        }
        tree.propagate();
        assert_eq!(tree.max_depth(), 2);
        assert_eq!(tree.len(), 50);
    }

    #[test]
    fn test_range_queries() {
        let mut rng = Rng(7);
        let mut tree = PointTree::new(world());
        let mut points = Vec::new();
        for i in 0..1_000 {
            let p = rng.point_in(&world());
            points.push(p);
            tree.insert(p, i);
        }
        tree.propagate();

        let query = BoundingRegion::new(Vec3::new(-20.0, -30.0, 0.0), Vec3::new(40.0, 10.0, 25.0));
        let mut found = Vec::new();
        tree.traverse_range(&query, |_, id| found.push(*id));
        found.sort_unstable();
        let expected: Vec<u32> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| query.contains_point(**p))
            .map(|(i, _)| i as u32)
            .collect();
        assert_eq!(found, expected);

        let sphere = crate::bounds::Sphere::new(Vec3::new(10.0, 0.0, -10.0), 35.0);
        let mut hits = 0;
        tree.traverse_range(&sphere, |p, _| {
            assert!(sphere.contains_point(*p));
            hits += 1;
        });
        let expected = points.iter().filter(|p| sphere.contains_point(**p)).count();
        assert_eq!(hits, expected);
    }

    #[test]
    fn test_regions_stay_at_straddling_node() {
        let mut tree = Octree::<BoundingRegion, u32, 1, 4>::new(world());
        tree.insert(BoundingRegion::new(Vec3::splat(-1.0), Vec3::splat(1.0)), 0);
        tree.insert(BoundingRegion::new(Vec3::splat(10.0), Vec3::splat(20.0)), 1);
        tree.propagate();

        let mut root_len = 0;
        tree.traverse_nodes(|info| {
            if info.parent.is_none() {
                root_len = info.len;
            }
        });
        assert_eq!(root_len, 1);
        assert_eq!(tree.remove(&0).map(|(_, id)| id), Some(0));
    }

    #[test]
    fn test_straddling_removal_merges_node() {
        let mut tree = Octree::<BoundingRegion, u32, 2, 4>::new(world());
        for i in 0..3 {
            let half = 1.0 + i as f32;
            tree.insert(BoundingRegion::new(Vec3::splat(-half), Vec3::splat(half)), i);
        }
        tree.propagate();
        assert!(!tree.is_leaf(tree.root()));
        assert_eq!(tree.node_count(), 9);

        tree.remove(&0);
        tree.remove(&1);

        assert!(tree.is_leaf(tree.root()));
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.len(), 1);
        let mut remaining = Vec::new();
        tree.traverse_all(|_, id| remaining.push(*id));
        assert_eq!(remaining, vec![2]);
    }

    #[test]
    fn test_merge_cascades_upward() {
        let mut tree = Octree::<BoundingRegion, u32, 2, 4>::new(world());
        let small = |c: Vec3, id: u32| (BoundingRegion::new(c - 1.0, c + 1.0), id);
        // Three boxes crowd octant 7, one of them straddling its midpoint
        for (region, id) in [
            small(Vec3::splat(50.0), 0),
            small(Vec3::splat(30.0), 1),
            small(Vec3::splat(70.0), 2),
        ] {
            tree.insert(region, id);
        }
        tree.propagate();
        assert_eq!(tree.max_depth(), 2);

        // One removal collapses octant 7, then the root
        tree.remove(&0);

        assert!(tree.is_leaf(tree.root()));
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.len(), 2);
    }
}
