use std::cmp::Ordering;

use crate::math::Aabb;

/// One BVH node as the raytrace shader reads it. 64 bytes, node 0 is the
/// root, leaves carry `left == right == -1` plus the instance index.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TlasNode {
    pub aabb_min: [f32; 3],
    _pad0: f32,
    pub aabb_max: [f32; 3],
    _pad1: f32,
    pub left: i32,
    pub right: i32,
    pub leaf_first: i32,
    pub leaf_count: i32,
    _pad2: [u32; 4],
}

impl TlasNode {
    fn leaf(aabb: &Aabb, instance: usize) -> Self {
        Self {
            aabb_min: aabb.min.to_array(),
            aabb_max: aabb.max.to_array(),
            left: -1,
            right: -1,
            leaf_first: instance as i32,
            leaf_count: 1,
            ..Default::default()
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left == -1 && self.right == -1
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.aabb_min.into(), self.aabb_max.into())
    }
}

/// Median-split BVH over instance world AABBs. Deterministic for a given
/// input order; N items produce exactly 2N-1 nodes, zero items a single
/// zeroed node.
pub fn build_tlas(aabbs: &[Aabb]) -> Vec<TlasNode> {
    if aabbs.is_empty() {
        return vec![TlasNode::default()];
    }
    let mut indices: Vec<usize> = (0..aabbs.len()).collect();
    let mut nodes = Vec::with_capacity(2 * aabbs.len() - 1);
    build_node(aabbs, &mut indices, &mut nodes);
    nodes
}

fn build_node(aabbs: &[Aabb], indices: &mut [usize], nodes: &mut Vec<TlasNode>) -> usize {
    let slot = nodes.len();
    nodes.push(TlasNode::default());

    if indices.len() == 1 {
        let instance = indices[0];
        nodes[slot] = TlasNode::leaf(&aabbs[instance], instance);
        return slot;
    }

    // Split along the widest axis of the enclosing box; extent ties promote
    // the later axis (Y over X, Z over either).
    let mut enclosing = Aabb::empty();
    for &i in indices.iter() {
        enclosing = enclosing.union(&aabbs[i]);
    }
    let extent = enclosing.extent();
    let mut axis = 0;
    if extent.y >= extent.x {
        axis = 1;
    }
    if extent.z >= extent[axis] {
        axis = 2;
    }

    indices.sort_by(|&a, &b| {
        let ca = aabbs[a].center()[axis];
        let cb = aabbs[b].center()[axis];
        ca.partial_cmp(&cb).unwrap_or(Ordering::Equal)
    });

    let mid = indices.len() / 2;
    let (lower, upper) = indices.split_at_mut(mid);
    let left = build_node(aabbs, lower, nodes);
    let right = build_node(aabbs, upper, nodes);

    let bounds = nodes[left].aabb().union(&nodes[right].aabb());
    nodes[slot] = TlasNode {
        aabb_min: bounds.min.to_array(),
        aabb_max: bounds.max.to_array(),
        left: left as i32,
        right: right as i32,
        leaf_first: -1,
        leaf_count: 0,
        ..Default::default()
    };
    slot
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn check_subtree(nodes: &[TlasNode], aabbs: &[Aabb], index: usize) {
        let node = &nodes[index];
        if node.is_leaf() {
            assert_eq!(node.leaf_count, 1);
            let expected = aabbs[node.leaf_first as usize];
            assert_eq!(node.aabb_min, expected.min.to_array());
            assert_eq!(node.aabb_max, expected.max.to_array());
            return;
        }
        for child in [node.left, node.right] {
            let child = child as usize;
            let parent = node.aabb();
            let inner = nodes[child].aabb();
            assert!(
                parent.min.cmple(inner.min).all() && parent.max.cmpge(inner.max).all(),
                "node {index} does not enclose child {child}"
            );
            check_subtree(nodes, aabbs, child);
        }
    }

    #[test]
    fn splits_two_far_boxes() {
        // S1: two unit-ish boxes far apart on x.
        let aabbs = [
            Aabb::new(Vec3::new(-100.0, -1.0, -1.0), Vec3::new(-98.0, 1.0, 1.0)),
            Aabb::new(Vec3::new(100.0, -1.0, -1.0), Vec3::new(102.0, 1.0, 1.0)),
        ];
        let nodes = build_tlas(&aabbs);

        assert_eq!(nodes.len(), 3);
        let bytes: &[u8] = bytemuck::cast_slice(&nodes);
        assert_eq!(bytes.len(), 192);

        let root = &nodes[0];
        assert!(!root.is_leaf());
        assert!(root.aabb_min[0] <= -100.0);
        assert!(root.aabb_max[0] >= 102.0);
        assert!(nodes[root.left as usize].is_leaf());
        assert!(nodes[root.right as usize].is_leaf());
    }

    #[test]
    fn node_record_is_64_bytes() {
        assert_eq!(std::mem::size_of::<TlasNode>(), 64);
    }

    #[test]
    fn tree_has_2n_minus_1_nodes_and_encloses_children() {
        let aabbs: Vec<Aabb> = (0..7)
            .map(|i| {
                let base = Vec3::new(i as f32 * 3.0, (i % 2) as f32, (i % 3) as f32 * -2.0);
                Aabb::new(base, base + Vec3::ONE)
            })
            .collect();

        let nodes = build_tlas(&aabbs);
        assert_eq!(nodes.len(), 2 * aabbs.len() - 1);
        check_subtree(&nodes, &aabbs, 0);

        // Every instance appears in exactly one leaf.
        let mut seen: Vec<i32> = nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| n.leaf_first)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn empty_input_yields_single_zero_node() {
        let nodes = build_tlas(&[]);
        assert_eq!(nodes.len(), 1);
        assert_eq!(bytemuck::bytes_of(&nodes[0]), &[0u8; 64]);
    }
}
