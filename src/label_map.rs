use ahash::AHashMap;
use crate::{ VoxelColor, VoxelSemantics };

/// Fixed display color per semantic class.
///
/// When non-empty, the map is authoritative: aggregated colors come from
/// the most likely class instead of from averaging observed colors. It must
/// cover every class index the fused distributions can produce.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelColorMap {
    colors: AHashMap<usize, VoxelColor>,
}

impl LabelColorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: usize, color: VoxelColor) -> Option<VoxelColor> {
        self.colors.insert(label, color)
    }

    pub fn get(&self, label: usize) -> Option<VoxelColor> {
        self.colors.get(&label).copied()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Color of the most likely class in `semantics`.
    ///
    /// `None` for unset semantics, or when the class is missing from the map.
    pub fn color_for(&self, semantics: &VoxelSemantics) -> Option<VoxelColor> {
        self.get(semantics.argmax_label()?)
    }
}

impl<C: Into<VoxelColor>> FromIterator<(usize, C)> for LabelColorMap {
    fn from_iter<I: IntoIterator<Item = (usize, C)>>(iter: I) -> Self {
        Self {
            colors: iter.into_iter().map(|(label, color)| (label, color.into())).collect(),
        }
    }
}

#[test]
fn label_map_lookup() {
    let map: LabelColorMap = [(0, VoxelColor::new(255, 0, 0)), (1, VoxelColor::new(0, 255, 0))]
        .into_iter()
        .collect();
    assert_eq!(map.len(), 2);
    assert!(!map.is_empty());
    assert_eq!(map.get(1), Some(VoxelColor::new(0, 255, 0)));
    assert_eq!(map.get(2), None);

    let semantics = VoxelSemantics::from_label(vec![0.2, 0.8]);
    assert_eq!(map.color_for(&semantics), Some(VoxelColor::new(0, 255, 0)));
    assert_eq!(map.color_for(&VoxelSemantics::new()), None);
}

#[test]
fn label_map_missing_class() {
    let mut map = LabelColorMap::new();
    assert!(map.is_empty());
    assert_eq!(map.insert(0, VoxelColor::new(1, 2, 3)), None);

    let semantics = VoxelSemantics::from_label(vec![0.0, 0.0, 1.0]);
    assert_eq!(map.color_for(&semantics), None);
}
