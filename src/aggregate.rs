//! Bottom-up recomputation of inner node colors and label distributions.
//!
//! Inner nodes are only consistent with their children right after a pass;
//! fusing observations into leaves leaves the ancestors stale until the next
//! [`aggregate`] call.

use arrayvec::ArrayVec;
use crate::{
    node::{ OctreeNode, SemanticPayload, CHILD_COUNT },
    LabelColorMap,
    VoxelColor,
    VoxelSemantics,
};

/// Node counts touched by one aggregation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AggregateStats {
    pub inner_nodes: usize,
    pub leaves: usize,
    /// Nodes whose most likely label had no entry in the label color map.
    /// They keep their previous color.
    pub unmapped_labels: usize,
}

/// Runs the aggregation pass over the subtree rooted at `root`, which sits at
/// depth 0. Nodes at `max_depth` still aggregate from their children but
/// those children are not recursed into.
pub fn aggregate<N>(root: &mut N, max_depth: u8, label_map: &LabelColorMap) -> AggregateStats
where
    N: OctreeNode + SemanticPayload,
{
    let mut stats = AggregateStats::default();
    aggregate_recurs(root, 0, max_depth, label_map, &mut stats);
    if stats.unmapped_labels > 0 {
        log::warn!(
            "{} nodes have a most likely label missing from the label color map",
            stats.unmapped_labels,
        );
    }
    stats
}

fn aggregate_recurs<N>(
    node: &mut N,
    depth: u8,
    max_depth: u8,
    label_map: &LabelColorMap,
    stats: &mut AggregateStats,
) where
    N: OctreeNode + SemanticPayload,
{
    if !node.has_children() {
        // No children to average, so a leaf only changes color through the map
        if !label_map.is_empty() && node.semantics().is_set() {
            match label_map.color_for(node.semantics()) {
                Some(color) => node.set_color(color),
                None => stats.unmapped_labels += 1,
            }
        }
        stats.leaves += 1;
        return;
    }

    // Children first
    if depth < max_depth {
        for index in 0..CHILD_COUNT {
            if let Some(child) = node.child_mut(index) {
                aggregate_recurs(child, depth + 1, max_depth, label_map, stats);
            }
        }
    }

    node.update_occupancy_children();

    let (semantics, average_color) = {
        let children: ArrayVec<&N, CHILD_COUNT> = (0..CHILD_COUNT)
            .filter_map(|index| node.child(index))
            .collect();

        let semantics = VoxelSemantics::average(children.iter().map(|child| child.semantics()));
        let average_color = if label_map.is_empty() {
            VoxelColor::average(children.iter().map(|child| child.color()))
        } else {
            None
        };
        (semantics, average_color)
    };

    let color = if label_map.is_empty() {
        average_color.unwrap_or(VoxelColor::UNSET)
    } else if semantics.is_set() {
        // Children's colors are ignored entirely when a map is present
        label_map.color_for(&semantics).unwrap_or_else(|| {
            stats.unmapped_labels += 1;
            node.color()
        })
    } else {
        VoxelColor::UNSET
    };

    node.set_semantics(semantics);
    node.set_color(color);
    stats.inner_nodes += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SemanticVoxel;

    fn leaf(color: VoxelColor, label: &[f32]) -> SemanticVoxel {
        let mut voxel = SemanticVoxel::new();
        voxel.color = color;
        if !label.is_empty() {
            voxel.semantics = VoxelSemantics::from_label(label.to_vec());
        }
        voxel
    }

    fn parent_of(children: &[(usize, SemanticVoxel)]) -> SemanticVoxel {
        let mut parent = SemanticVoxel::new();
        for (index, child) in children {
            *parent.create_child(*index).unwrap() = child.clone();
        }
        parent
    }

    fn two_class_map() -> LabelColorMap {
        [(0, VoxelColor::new(200, 0, 0)), (1, VoxelColor::new(0, 0, 200))]
            .into_iter()
            .collect()
    }

    fn assert_dist_eq(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} != {expected:?}");
        actual.iter().zip(expected.iter()).for_each(|(a, e)| {
            assert!((a - e).abs() < 1e-6, "{actual:?} != {expected:?}");
        });
    }

    #[test]
    fn unobserved_children_reset_parent() {
        let mut root = parent_of(&[(0, SemanticVoxel::new()), (4, SemanticVoxel::new())]);
        root.color = VoxelColor::new(1, 2, 3);
        root.semantics = VoxelSemantics::uniform(3);

        let stats = aggregate(&mut root, 16, &LabelColorMap::new());

        assert_eq!(stats, AggregateStats { inner_nodes: 1, leaves: 2, unmapped_labels: 0 });
        assert_eq!(root.color, VoxelColor::UNSET);
        assert!(!root.semantics.is_set());
    }

    #[test]
    fn parent_color_is_truncated_average_of_set_children() {
        let mut root = parent_of(&[
            (0, leaf(VoxelColor::new(10, 10, 0), &[])),
            (3, leaf(VoxelColor::new(11, 12, 1), &[])),
            (7, leaf(VoxelColor::UNSET, &[])),
        ]);

        aggregate(&mut root, 16, &LabelColorMap::new());
        assert_eq!(root.color, VoxelColor::new(10, 11, 0));
    }

    #[test]
    fn parent_semantics_average_pads_shorter_children() {
        let mut root = parent_of(&[
            (1, leaf(VoxelColor::UNSET, &[1.0, 0.0])),
            (2, leaf(VoxelColor::UNSET, &[0.0, 0.0, 1.0])),
            (5, leaf(VoxelColor::UNSET, &[])),
        ]);

        aggregate(&mut root, 16, &LabelColorMap::new());
        assert_dist_eq(&root.semantics.label, &[0.5, 0.0, 0.5]);
        assert_eq!(root.semantics.count, 1);
    }

    #[test]
    fn label_map_overrides_child_colors() {
        let mut root = parent_of(&[
            (0, leaf(VoxelColor::new(0, 255, 0), &[0.1, 0.9])),
            (1, leaf(VoxelColor::new(10, 10, 10), &[0.3, 0.7])),
            (2, leaf(VoxelColor::new(90, 90, 90), &[0.8, 0.2])),
        ]);

        aggregate(&mut root, 16, &two_class_map());

        assert_dist_eq(&root.semantics.label, &[0.4, 0.6]);
        assert_eq!(root.color, VoxelColor::new(0, 0, 200));
        // Leaves are recolored from their own most likely class
        assert_eq!(root.child(0).unwrap().color, VoxelColor::new(0, 0, 200));
        assert_eq!(root.child(2).unwrap().color, VoxelColor::new(200, 0, 0));
    }

    #[test]
    fn label_map_with_unset_semantics() {
        let mut root = parent_of(&[(0, leaf(VoxelColor::new(5, 5, 5), &[]))]);
        root.color = VoxelColor::new(7, 7, 7);

        aggregate(&mut root, 16, &two_class_map());

        // The leaf has nothing to look up and keeps its color
        assert_eq!(root.child(0).unwrap().color, VoxelColor::new(5, 5, 5));
        assert_eq!(root.color, VoxelColor::UNSET);
    }

    #[test]
    fn leaves_keep_color_without_label_map() {
        let mut root = leaf(VoxelColor::new(3, 4, 5), &[0.0, 1.0]);
        let stats = aggregate(&mut root, 16, &LabelColorMap::new());

        assert_eq!(stats, AggregateStats { inner_nodes: 0, leaves: 1, unmapped_labels: 0 });
        assert_eq!(root.color, VoxelColor::new(3, 4, 5));
        assert_dist_eq(&root.semantics.label, &[0.0, 1.0]);
    }

    #[test]
    fn missing_map_entry_keeps_color() {
        let map: LabelColorMap = [(0, VoxelColor::new(1, 1, 1))].into_iter().collect();
        let mut root = parent_of(&[(0, leaf(VoxelColor::new(9, 9, 9), &[0.0, 1.0]))]);
        root.color = VoxelColor::new(4, 4, 4);

        let stats = aggregate(&mut root, 16, &map);

        assert_eq!(root.child(0).unwrap().color, VoxelColor::new(9, 9, 9));
        assert_eq!(root.color, VoxelColor::new(4, 4, 4));
        // One miss for the leaf and one for the parent, reported once per pass
        assert_eq!(stats.unmapped_labels, 2);
    }

    #[test]
    fn children_are_finalized_before_parent() {
        let inner = parent_of(&[
            (0, leaf(VoxelColor::new(100, 0, 0), &[1.0, 0.0])),
            (1, leaf(VoxelColor::new(0, 100, 0), &[1.0, 0.0])),
        ]);
        let mut root = parent_of(&[
            (0, inner),
            (1, leaf(VoxelColor::new(0, 0, 100), &[0.0, 1.0])),
        ]);

        let stats = aggregate(&mut root, 16, &LabelColorMap::new());

        assert_eq!(stats, AggregateStats { inner_nodes: 2, leaves: 3, unmapped_labels: 0 });
        let inner = root.child(0).unwrap();
        assert_eq!(inner.color, VoxelColor::new(50, 50, 0));
        assert_dist_eq(&inner.semantics.label, &[1.0, 0.0]);
        // The root sees the freshly aggregated inner node, not a stale one
        assert_eq!(root.color, VoxelColor::new(25, 25, 50));
        assert_dist_eq(&root.semantics.label, &[0.5, 0.5]);
    }

    #[test]
    fn max_depth_reads_but_does_not_recurse() {
        let mut grandchild = leaf(VoxelColor::new(10, 10, 10), &[0.0, 1.0]);
        grandchild.occupancy = 2.0;
        let mut child = parent_of(&[(0, grandchild)]);
        child.occupancy = -1.0;
        let mut root = parent_of(&[(2, child)]);

        let stats = aggregate(&mut root, 1, &two_class_map());

        // The leaf below the cutoff is never visited, so it is not recolored
        assert_eq!(stats, AggregateStats { inner_nodes: 2, leaves: 0, unmapped_labels: 0 });
        let child = root.child(2).unwrap();
        assert_eq!(child.child(0).unwrap().color, VoxelColor::new(10, 10, 10));

        // ...but the node at the cutoff still aggregates from it
        assert_eq!(child.color, VoxelColor::new(0, 0, 200));
        assert_dist_eq(&child.semantics.label, &[0.0, 1.0]);
        assert_eq!(child.occupancy, 2.0);
        assert_eq!(root.occupancy, 2.0);
    }

    #[test]
    fn occupancy_is_delegated_to_the_node() {
        let mut a = SemanticVoxel::with_occupancy(-3.0);
        a.color = VoxelColor::new(1, 1, 1);
        let b = SemanticVoxel::with_occupancy(0.7);
        let mut root = parent_of(&[(0, a), (6, b)]);

        aggregate(&mut root, 16, &LabelColorMap::new());
        assert_eq!(root.occupancy, 0.7);
    }

    #[test]
    fn repeated_passes_are_stable() {
        let mut root = parent_of(&[
            (0, leaf(VoxelColor::new(7, 8, 9), &[0.2, 0.8])),
            (1, leaf(VoxelColor::new(8, 9, 10), &[0.6, 0.4])),
        ]);

        aggregate(&mut root, 16, &LabelColorMap::new());
        let first = root.clone();
        aggregate(&mut root, 16, &LabelColorMap::new());
        assert_eq!(root, first);
    }

    // Sibling order only changes floating point summation order. Results
    // must agree within tolerance, not bit for bit.
    #[test]
    fn sibling_order_only_affects_rounding() {
        let labels: [&[f32]; 3] = [&[0.1, 0.2, 0.7], &[0.33, 0.33, 0.34], &[0.9, 0.05, 0.05]];
        let colors = [
            VoxelColor::new(13, 200, 7),
            VoxelColor::new(99, 1, 250),
            VoxelColor::new(40, 41, 42),
        ];

        let forward: Vec<_> = (0..3).map(|i| (i, leaf(colors[i], labels[i]))).collect();
        let reversed: Vec<_> = (0..3).map(|i| (i, leaf(colors[2 - i], labels[2 - i]))).collect();

        let mut a = parent_of(&forward);
        let mut b = parent_of(&reversed);
        aggregate(&mut a, 16, &LabelColorMap::new());
        aggregate(&mut b, 16, &LabelColorMap::new());

        assert_eq!(a.color, b.color);
        assert_dist_eq(&a.semantics.label, &b.semantics.label);
    }
}
