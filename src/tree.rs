use glam::Vec3;
use crate::{
    aggregate::{ self, AggregateStats },
    node::{ OctreeNode, SemanticPayload, CHILD_COUNT },
    Error,
    LabelColorMap,
    OctantKey,
    Result,
    SemanticVoxel,
    VoxelColor,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctreeConfig {
    /// Edge length of a leaf voxel at full depth, in meters.
    pub resolution: f64,
    /// Depth of the finest leaves; the aggregation pass stops recursing here.
    pub max_depth: u8,
    /// Number of semantic classes observations are expected to carry.
    /// Zero when unknown.
    pub num_classes: usize,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            resolution: 0.1,
            max_depth: 16,
            num_classes: 0,
        }
    }
}

/// Sparse octree whose voxels fuse color and semantic observations.
#[derive(Debug, Clone)]
pub struct SemanticOctree {
    root: Option<SemanticVoxel>,
    config: OctreeConfig,
    label_map: LabelColorMap,
}

impl SemanticOctree {
    pub const TREE_TYPE: &'static str = "SemanticOcTree";

    pub fn new(resolution: f64) -> Self {
        Self::with_config(
            OctreeConfig {
                resolution,
                ..Default::default()
            },
            LabelColorMap::new(),
        )
    }

    pub fn with_classes(resolution: f64, num_classes: usize, label_map: LabelColorMap) -> Self {
        Self::with_config(
            OctreeConfig {
                resolution,
                num_classes,
                ..Default::default()
            },
            label_map,
        )
    }

    /// `config.max_depth` is clamped to what an [`OctantKey`] can address.
    pub fn with_config(mut config: OctreeConfig, label_map: LabelColorMap) -> Self {
        if config.max_depth > OctantKey::MAX_DEPTH {
            log::warn!(
                "max_depth {} is deeper than an OctantKey can address, clamping to {}",
                config.max_depth,
                OctantKey::MAX_DEPTH,
            );
            config.max_depth = OctantKey::MAX_DEPTH;
        }
        Self {
            root: None,
            config,
            label_map,
        }
    }

    #[inline]
    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    #[inline]
    pub fn resolution(&self) -> f64 {
        self.config.resolution
    }

    #[inline]
    pub fn max_depth(&self) -> u8 {
        self.config.max_depth
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    pub fn label_map(&self) -> &LabelColorMap {
        &self.label_map
    }

    /// Replaces the label color map. Existing colors are left as they are
    /// until the next [`SemanticOctree::aggregate`].
    pub fn add_color_map(&mut self, label_map: LabelColorMap) {
        self.label_map = label_map;
    }

    pub fn root(&self) -> Option<&SemanticVoxel> {
        self.root.as_ref()
    }

    pub fn root_mut(&mut self) -> Option<&mut SemanticVoxel> {
        self.root.as_mut()
    }

    pub fn clear(&mut self) {
        self.root = None;
    }

    pub fn node(&self, key: &OctantKey) -> Option<&SemanticVoxel> {
        key.iter().try_fold(self.root.as_ref()?, |node, index| node.child(index as usize))
    }

    pub fn node_mut(&mut self, key: &OctantKey) -> Option<&mut SemanticVoxel> {
        key.iter().try_fold(self.root.as_mut()?, |node, index| node.child_mut(index as usize))
    }

    /// Returns the node at `key`, creating it and every missing ancestor.
    pub fn create_node(&mut self, key: &OctantKey) -> Result<&mut SemanticVoxel> {
        let max_depth = self.config.max_depth;
        if key.depth() > max_depth {
            return Err(Error::DepthExceeded {
                depth: key.depth(),
                max_depth,
            });
        }

        let mut node = self.root.get_or_insert_with(SemanticVoxel::new);
        for index in key.iter() {
            node = node.create_child(index as usize)?;
        }
        Ok(node)
    }

    /// Removes the node at `key` together with its subtree.
    pub fn delete_node(&mut self, key: &OctantKey) -> Option<SemanticVoxel> {
        match key.parent() {
            None => self.root.take(),
            Some(parent) => {
                let index = key.get_index(key.depth());
                self.node_mut(&parent)?.delete_child(index as usize)
            }
        }
    }

    /// Blends an observed color into the node at `key`.
    pub fn fuse_color(&mut self, key: &OctantKey, r: u8, g: u8, b: u8) -> Result<&mut SemanticVoxel> {
        let node = self.node_mut(key).ok_or(Error::NodeNotFound(*key))?;
        node.fuse_color(VoxelColor::new(r, g, b));
        Ok(node)
    }

    /// Fuses an observed label distribution into the node at `key`.
    pub fn fuse_semantics(&mut self, key: &OctantKey, label: &[f32]) -> Result<&mut SemanticVoxel> {
        let num_classes = self.config.num_classes;
        if num_classes != 0 && label.len() != num_classes {
            log::debug!("observation at {key} carries {} classes, tree expects {num_classes}", label.len());
        }
        let node = self.node_mut(key).ok_or(Error::NodeNotFound(*key))?;
        node.fuse_semantics(label);
        Ok(node)
    }

    /// Recomputes occupancy, semantics and color of every inner node from
    /// its children, bottom-up.
    pub fn aggregate(&mut self) -> AggregateStats {
        let Some(root) = self.root.as_mut() else {
            return AggregateStats::default();
        };

        log::debug!(
            "aggregating semantic octree (max depth {}, {} mapped labels)",
            self.config.max_depth,
            self.label_map.len(),
        );
        let stats = aggregate::aggregate(root, self.config.max_depth, &self.label_map);
        log::debug!(
            "aggregated {} inner nodes over {} leaves",
            stats.inner_nodes,
            stats.leaves,
        );
        stats
    }

    /// Edge length of the root cell, in meters.
    pub fn root_size(&self) -> f64 {
        self.config.resolution * (1u64 << self.config.max_depth) as f64
    }

    /// Metric centre of the cell addressed by `key`, with the root cell
    /// centred on the origin.
    pub fn cell_center(&self, key: &OctantKey) -> Vec3 {
        let root_size = self.root_size() as f32;
        key.cell_center(root_size) - Vec3::splat(root_size * 0.5)
    }

    /// Every leaf with its key and metric cell centre, depth first in child
    /// slot order.
    pub fn leaves(&self) -> Vec<(OctantKey, Vec3, &SemanticVoxel)> {
        let mut leaves = Vec::new();
        let Some(root) = self.root.as_ref() else {
            return leaves;
        };

        let mut stack = vec![(OctantKey::ROOT, root)];
        while let Some((key, node)) = stack.pop() {
            if node.is_leaf() {
                leaves.push((key, self.cell_center(&key), node));
                continue;
            }
            // Reverse so the lowest slot is popped first
            for index in (0..CHILD_COUNT).rev() {
                if let Some(child) = node.child(index) {
                    stack.push((key.child(index as u8), child));
                }
            }
        }
        leaves
    }

    pub fn num_nodes(&self) -> usize {
        fn count(node: &SemanticVoxel) -> usize {
            1 + node.children().map(|(_, child)| count(child)).sum::<usize>()
        }
        self.root.as_ref().map_or(0, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VoxelSemantics;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn create_and_find_nodes() {
        let mut tree = SemanticOctree::new(0.05);
        assert_eq!(tree.num_nodes(), 0);
        assert!(tree.node(&OctantKey::ROOT).is_none());

        let key = OctantKey::from_path([3, 1]);
        tree.create_node(&key).unwrap().occupancy = 0.4;
        assert_eq!(tree.num_nodes(), 3);
        assert_eq!(tree.node(&key).map(|n| n.occupancy), Some(0.4));
        assert!(tree.node(&OctantKey::from_path([3, 2])).is_none());
        assert!(tree.node(&OctantKey::from_path([3])).is_some());

        assert!(tree.delete_node(&OctantKey::from_path([3])).is_some());
        assert_eq!(tree.num_nodes(), 1);
        assert!(tree.root().unwrap().is_leaf());
    }

    #[test]
    fn create_node_respects_max_depth() {
        let config = OctreeConfig {
            max_depth: 2,
            ..Default::default()
        };
        let mut tree = SemanticOctree::with_config(config, LabelColorMap::new());
        assert!(tree.create_node(&OctantKey::from_path([0, 0])).is_ok());

        let err = tree.create_node(&OctantKey::from_path([0, 0, 0])).unwrap_err();
        assert!(matches!(err, Error::DepthExceeded { depth: 3, max_depth: 2 }));
    }

    #[test]
    fn fusion_updates_the_node_in_the_tree() {
        init_logger();
        let mut tree = SemanticOctree::with_classes(0.1, 2, LabelColorMap::new());
        let key = OctantKey::from_path([5]);
        tree.create_node(&key).unwrap();

        tree.fuse_color(&key, 10, 20, 30).unwrap();
        tree.fuse_color(&key, 20, 20, 20).unwrap();
        assert_eq!(tree.node(&key).unwrap().color, VoxelColor::new(15, 20, 25));

        tree.fuse_semantics(&key, &[0.0, 2.0]).unwrap();
        assert_eq!(
            tree.node(&key).unwrap().semantics,
            VoxelSemantics { label: vec![0.0, 1.0], count: 1 },
        );

        let fused = tree.fuse_semantics(&key, &[1.0, 0.0]).unwrap();
        assert_eq!(fused.semantics.count, 2);
        let label = &tree.node(&key).unwrap().semantics.label;
        assert!((label[0] - 0.5).abs() < 1e-6);
        assert!((label[1] - 0.5).abs() < 1e-6);

        // Siblings and ancestors are untouched until the next aggregate
        assert_eq!(tree.root().unwrap().color, VoxelColor::UNSET);
        assert!(!tree.root().unwrap().semantics.is_set());

        let missing = OctantKey::from_path([4]);
        assert!(matches!(tree.fuse_color(&missing, 1, 1, 1), Err(Error::NodeNotFound(k)) if k == missing));
        assert!(matches!(tree.fuse_semantics(&missing, &[1.0]), Err(Error::NodeNotFound(_))));
    }

    #[test]
    fn too_deep_config_is_clamped() {
        let config = OctreeConfig {
            max_depth: 40,
            ..Default::default()
        };
        let mut tree = SemanticOctree::with_config(config, LabelColorMap::new());
        assert_eq!(tree.max_depth(), OctantKey::MAX_DEPTH);

        let deepest = OctantKey::from_path(std::iter::repeat(3).take(OctantKey::MAX_DEPTH as usize));
        assert!(tree.create_node(&deepest).is_ok());
        assert_eq!(tree.num_nodes(), OctantKey::MAX_DEPTH as usize + 1);
    }

    #[test]
    fn aggregate_whole_tree() {
        init_logger();
        let mut tree = SemanticOctree::new(0.1);
        assert_eq!(tree.aggregate(), AggregateStats::default());

        for (path, color, label) in [
            ([0, 0], (100, 0, 0), [1.0, 0.0]),
            ([0, 1], (0, 100, 0), [1.0, 0.0]),
            ([7, 7], (0, 0, 100), [0.0, 1.0]),
        ] {
            let key = OctantKey::from_path(path);
            tree.create_node(&key).unwrap();
            let (r, g, b) = color;
            tree.fuse_color(&key, r, g, b).unwrap();
            tree.fuse_semantics(&key, &label).unwrap();
        }

        let stats = tree.aggregate();
        assert_eq!(stats.inner_nodes, 3);
        assert_eq!(stats.leaves, 3);

        let root = tree.root().unwrap();
        assert_eq!(tree.node(&OctantKey::from_path([0])).unwrap().color, VoxelColor::new(50, 50, 0));
        assert_eq!(root.color, VoxelColor::new(25, 25, 50));
        assert_eq!(root.semantics.argmax_label(), Some(0));
    }

    #[test]
    fn color_map_change_needs_aggregate() {
        let mut tree = SemanticOctree::new(0.1);
        let key = OctantKey::from_path([2]);
        tree.create_node(&key).unwrap();
        tree.fuse_color(&key, 1, 2, 3).unwrap();
        tree.fuse_semantics(&key, &[0.1, 0.9]).unwrap();
        tree.aggregate();
        assert_eq!(tree.root().unwrap().color, VoxelColor::new(1, 2, 3));

        tree.add_color_map([(1, VoxelColor::new(0, 0, 255))].into_iter().collect());
        assert_eq!(tree.root().unwrap().color, VoxelColor::new(1, 2, 3));

        tree.aggregate();
        assert_eq!(tree.root().unwrap().color, VoxelColor::new(0, 0, 255));
        assert_eq!(tree.node(&key).unwrap().color, VoxelColor::new(0, 0, 255));
    }

    #[test]
    fn leaves_in_slot_order() {
        let mut tree = SemanticOctree::new(1.0);
        for path in [[6, 1], [0, 3], [6, 0]] {
            tree.create_node(&OctantKey::from_path(path)).unwrap();
        }

        let keys: Vec<String> = tree.leaves().into_iter().map(|(key, _, _)| key.to_string()).collect();
        assert_eq!(keys, ["/0/3", "/6/0", "/6/1"]);
    }

    #[test]
    fn leaf_centers_are_metric() {
        let config = OctreeConfig {
            resolution: 0.5,
            max_depth: 2,
            ..Default::default()
        };
        let mut tree = SemanticOctree::with_config(config, LabelColorMap::new());
        // Root cell is 0.5 * 2^2 = 2m across, centred on the origin
        assert_eq!(tree.cell_center(&OctantKey::ROOT), Vec3::ZERO);

        tree.create_node(&OctantKey::from_path([0, 0])).unwrap();
        tree.create_node(&OctantKey::from_path([7, 1])).unwrap();

        let centers: Vec<Vec3> = tree.leaves().into_iter().map(|(_, center, _)| center).collect();
        assert_eq!(centers, vec![Vec3::splat(-0.75), glam::vec3(0.75, 0.25, 0.25)]);
    }
}
