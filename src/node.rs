use crate::{ Error, Result, VoxelColor, VoxelSemantics };

/// Number of child slots per node.
pub const CHILD_COUNT: usize = 8;

/// What the aggregation pass needs from the host tree's nodes.
///
/// Child slots are indexed 0-7; out of range indices are simply absent.
pub trait OctreeNode {
    fn child(&self, index: usize) -> Option<&Self>;
    fn child_mut(&mut self, index: usize) -> Option<&mut Self>;

    fn has_child(&self, index: usize) -> bool {
        self.child(index).is_some()
    }

    fn has_children(&self) -> bool {
        (0..CHILD_COUNT).any(|index| self.has_child(index))
    }

    /// Recomputes this node's occupancy from its children. Opaque to the
    /// semantic layer.
    fn update_occupancy_children(&mut self);
}

/// Color and semantic state carried by a node, plus per-observation fusion.
pub trait SemanticPayload {
    fn color(&self) -> VoxelColor;
    fn set_color(&mut self, color: VoxelColor);
    fn semantics(&self) -> &VoxelSemantics;
    fn set_semantics(&mut self, semantics: VoxelSemantics);

    fn fuse_color(&mut self, observed: VoxelColor) {
        let fused = VoxelColor::blend(self.color(), observed);
        log::trace!("fuse color {} + {} -> {}", self.color(), observed, fused);
        self.set_color(fused);
    }

    fn fuse_semantics(&mut self, observed: &[f32]) {
        let fused = VoxelSemantics::fuse(self.semantics(), observed);
        log::trace!("fuse semantics (count {}) -> {}", fused.count, fused);
        self.set_semantics(fused);
    }
}

/// Octree node holding an occupancy value, a fused color and a fused label
/// distribution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SemanticVoxel {
    /// Occupancy in log-odds. Maintained by the host tree, never interpreted
    /// here beyond taking the children's maximum for inner nodes.
    pub occupancy: f32,
    pub color: VoxelColor,
    pub semantics: VoxelSemantics,
    children: Option<Box<[Option<SemanticVoxel>; CHILD_COUNT]>>,
}

impl SemanticVoxel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_occupancy(occupancy: f32) -> Self {
        Self {
            occupancy,
            ..Default::default()
        }
    }

    pub fn is_leaf(&self) -> bool {
        !self.has_children()
    }

    /// Returns the child at `index`, creating a blank one if needed.
    pub fn create_child(&mut self, index: usize) -> Result<&mut SemanticVoxel> {
        if index >= CHILD_COUNT {
            return Err(Error::InvalidChildIndex(index));
        }

        let children = self.children.get_or_insert_with(Default::default);
        Ok(children[index].get_or_insert_with(SemanticVoxel::new))
    }

    /// Detaches the child at `index`. Dropping the last child turns this
    /// node back into a leaf.
    pub fn delete_child(&mut self, index: usize) -> Option<SemanticVoxel> {
        let children = self.children.as_mut()?;
        let removed = children.get_mut(index)?.take();
        if children.iter().all(Option::is_none) {
            self.children = None;
        }
        removed
    }

    /// Present children with their slot index, in slot order.
    pub fn children(&self) -> impl Iterator<Item = (usize, &SemanticVoxel)> + '_ {
        self.children.iter()
            .flat_map(|children| children.iter().enumerate())
            .filter_map(|(index, child)| child.as_ref().map(|child| (index, child)))
    }

    pub fn fuse_color_rgb(&mut self, r: u8, g: u8, b: u8) {
        self.fuse_color(VoxelColor::new(r, g, b));
    }
}

impl OctreeNode for SemanticVoxel {
    fn child(&self, index: usize) -> Option<&Self> {
        self.children.as_ref()?.get(index)?.as_ref()
    }

    fn child_mut(&mut self, index: usize) -> Option<&mut Self> {
        self.children.as_mut()?.get_mut(index)?.as_mut()
    }

    fn has_children(&self) -> bool {
        self.children().next().is_some()
    }

    fn update_occupancy_children(&mut self) {
        let max = self.children()
            .map(|(_, child)| child.occupancy)
            .fold(None, |max: Option<f32>, occ| Some(max.map_or(occ, |m| m.max(occ))));
        if let Some(max) = max {
            self.occupancy = max;
        }
    }
}

impl SemanticPayload for SemanticVoxel {
    #[inline]
    fn color(&self) -> VoxelColor {
        self.color
    }

    #[inline]
    fn set_color(&mut self, color: VoxelColor) {
        self.color = color;
    }

    #[inline]
    fn semantics(&self) -> &VoxelSemantics {
        &self.semantics
    }

    #[inline]
    fn set_semantics(&mut self, semantics: VoxelSemantics) {
        self.semantics = semantics;
    }
}

#[test]
fn voxel_child_access_is_bounds_checked() {
    let mut voxel = SemanticVoxel::new();
    assert!(voxel.is_leaf());
    assert!(voxel.child(0).is_none());
    assert!(voxel.child(42).is_none());

    voxel.create_child(3).unwrap().occupancy = 0.5;
    assert!(!voxel.is_leaf());
    assert!(voxel.has_child(3));
    assert!(!voxel.has_child(2));
    assert!(voxel.child(8).is_none());
    assert!(voxel.child_mut(8).is_none());
    assert_eq!(voxel.child(3).map(|c| c.occupancy), Some(0.5));

    assert!(matches!(voxel.create_child(8), Err(Error::InvalidChildIndex(8))));
}

#[test]
fn voxel_delete_last_child_makes_leaf() {
    let mut voxel = SemanticVoxel::new();
    voxel.create_child(1).unwrap();
    voxel.create_child(6).unwrap();
    assert_eq!(voxel.children().map(|(i, _)| i).collect::<Vec<_>>(), vec![1, 6]);

    assert!(voxel.delete_child(1).is_some());
    assert!(voxel.delete_child(1).is_none());
    assert!(!voxel.is_leaf());
    assert!(voxel.delete_child(6).is_some());
    assert!(voxel.is_leaf());
    assert!(voxel.delete_child(9).is_none());
}

#[test]
fn voxel_occupancy_takes_child_max() {
    let mut voxel = SemanticVoxel::with_occupancy(9.0);
    voxel.update_occupancy_children();
    assert_eq!(voxel.occupancy, 9.0, "leaves keep their own occupancy");

    voxel.create_child(0).unwrap().occupancy = -2.0;
    voxel.create_child(5).unwrap().occupancy = 1.5;
    voxel.update_occupancy_children();
    assert_eq!(voxel.occupancy, 1.5);
}

#[test]
fn voxel_fusion() {
    let mut voxel = SemanticVoxel::new();
    voxel.fuse_color_rgb(10, 20, 30);
    voxel.fuse_color(VoxelColor::new(20, 20, 20));
    assert_eq!(voxel.color, VoxelColor::new(15, 20, 25));

    voxel.fuse_semantics(&[0.5, 0.5]);
    assert_eq!(voxel.semantics.count, 1);
    voxel.fuse_semantics(&[1.0, 0.0]);
    assert_eq!(voxel.semantics.count, 2);
    assert!((voxel.semantics.label[0] - 0.75).abs() < 1e-6);
    assert!((voxel.semantics.label[1] - 0.25).abs() < 1e-6);
}

#[test]
fn voxel_clone_copies_payload() {
    let mut voxel = SemanticVoxel::new();
    voxel.fuse_color_rgb(1, 2, 3);
    voxel.fuse_semantics(&[1.0]);

    let mut copy = voxel.clone();
    copy.fuse_color_rgb(101, 102, 103);
    copy.fuse_semantics(&[0.0, 1.0]);

    assert_eq!(voxel.color, VoxelColor::new(1, 2, 3));
    assert_eq!(voxel.semantics.label, vec![1.0]);
    assert_ne!(copy, voxel);
}

#[test]
fn voxel_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SemanticVoxel>();
}
