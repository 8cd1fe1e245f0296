use bitvec::prelude::*;
use glam::Vec3;
use std::{ fmt, ops::Range };

/// Child-index path from the root to a node, packed into 64 bits.
/// ```text
/// Bit layout
/// 00101 00 000 000 ... 000 000 001 101 100 000 001
///   |    |  19  18      7   6   5   4   3   2   1
///   |    |  |   |       |   |   |   |   |   |   |
///   |    |  |   |       |   |   -----------------Child indices
///   |    |  -----------------(Zero past the depth)
///   |    ---------Unused, always 0
///   --Depth
///
/// Bits 0-2, 3-5, ..., 54-56: Child indices
/// 3-bit child slot (0-7) to descend into at each level.
/// Slots past the depth MUST be 000.
///
/// Bits 57-58: Unused
///
/// Bits 59-63: Depth
/// Number of valid child indices; 0 addresses the root.
/// ```
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OctantKey(u64);

#[allow(dead_code)]
impl OctantKey {
    pub const MAX_DEPTH: u8 = 19;

    const DEPTH_BITS_RANGE: Range<usize> = 59..64;
    const UNUSED_BITS_RANGE: Range<usize> = 57..59;
    const CELL_INDICES_RANGE: Range<usize> = 0..57;
    const CELL_INDEX_RANGE: Range<usize> = 0..3;
    const CELL_INDEX_SIZE: usize = 3;

    pub const ROOT: Self = Self(0);

    /// Builds a key by descending through `path` from the root.
    pub fn from_path<I: IntoIterator<Item = u8>>(path: I) -> Self {
        let mut key = Self::ROOT;
        path.into_iter().for_each(|index| key.push(index));
        key
    }

    fn _sanity_check(&self) {
        let bits = self.0.view_bits::<LocalBits>();

        let depth: u64 = bits[Self::DEPTH_BITS_RANGE].load();
        assert!(depth <= Self::MAX_DEPTH as u64);

        bits[Self::CELL_INDICES_RANGE]
            .chunks(Self::CELL_INDEX_SIZE)
            .enumerate()
            .for_each(|(level, bits)| {
                let level = level as u64 + 1;
                assert!(bits.not_any() || level <= depth);
            });

        assert!(bits[Self::UNUSED_BITS_RANGE].not_any());
    }

    pub fn depth(&self) -> u8 {
        self.0.view_bits::<LocalBits>()[Self::DEPTH_BITS_RANGE].load()
    }

    #[inline(always)]
    pub fn is_root(&self) -> bool {
        self.depth() == 0
    }

    #[inline(always)]
    pub fn at_max_depth(&self) -> bool {
        self.depth() == Self::MAX_DEPTH
    }

    fn set_depth(&mut self, new_depth: u8) {
        assert!(new_depth <= Self::MAX_DEPTH);

        let old_depth = self.depth();
        let bits = self.0.view_bits_mut::<LocalBits>();
        bits[Self::DEPTH_BITS_RANGE].store(new_depth);

        if new_depth < old_depth {
            bits[Self::CELL_INDICES_RANGE]
                [Self::CELL_INDEX_SIZE * new_depth as usize..]
                .fill(false);
        }
    }

    /// Child slot taken at `depth` (1-based; depth 1 is a child of the root).
    pub fn get_index(&self, depth: u8) -> u8 {
        assert!(depth > 0 && depth <= self.depth());

        self.0.view_bits::<LocalBits>()
            [Self::CELL_INDICES_RANGE]
            [Self::CELL_INDEX_SIZE * (depth - 1) as usize..]
            [Self::CELL_INDEX_RANGE]
            .load()
    }

    pub fn push(&mut self, index: u8) {
        assert!(!self.at_max_depth(), "OctantKey overflow");
        assert!(index < 8, "child index {index} out of range");

        let depth = self.depth() + 1;
        self.set_depth(depth);

        self.0.view_bits_mut::<LocalBits>()
            [Self::CELL_INDICES_RANGE]
            [Self::CELL_INDEX_SIZE * (depth as usize - 1)..]
            [Self::CELL_INDEX_RANGE]
            .store(index);
    }

    pub fn pop(&mut self) -> u8 {
        assert!(!self.is_root(), "pop on root OctantKey");
        let depth = self.depth();
        let index = self.get_index(depth);
        self.set_depth(depth - 1);
        index
    }

    pub fn child(mut self, index: u8) -> Self {
        self.push(index);
        self
    }

    pub fn parent(mut self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        self.pop();
        Some(self)
    }

    /// Child slots from the root down to this key.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.view_bits::<LocalBits>()
            [Self::CELL_INDICES_RANGE]
            [..self.depth() as usize * Self::CELL_INDEX_SIZE]
            .chunks_exact(Self::CELL_INDEX_SIZE)
            .map(|bits| bits.load())
    }

    /// Centre of this key's cell inside a cube of `root_size` anchored at the
    /// origin. Child slot bits are X (bit 0), Y (bit 1), Z (bit 2).
    pub fn cell_center(&self, root_size: f32) -> Vec3 {
        let mut start = Vec3::ZERO;
        let mut size = root_size;
        self.iter().for_each(|index| {
            size *= 0.5;
            let offset = Vec3::new(
                (index & 1) as f32,
                ((index >> 1) & 1) as f32,
                ((index >> 2) & 1) as f32,
            );
            start += offset * size;
        });
        start + Vec3::splat(size * 0.5)
    }
}

impl fmt::Debug for OctantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl fmt::Display for OctantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        for (level, index) in self.iter().enumerate() {
            if level > 0 {
                write!(f, "/")?;
            }
            write!(f, "{index}")?;
        }
        Ok(())
    }
}

#[test]
fn octant_key_push_pop() {
    let mut key = OctantKey::default();
    key._sanity_check();
    assert!(key.is_root());

    key.push(4);
    key._sanity_check();
    assert_eq!(key.0, 0b0000100000000000000000000000000000000000000000000000000000000100);

    key.push(7);
    key._sanity_check();
    assert_eq!(key.depth(), 2);
    assert_eq!(key.0, 0b0001000000000000000000000000000000000000000000000000000000111100);

    assert_eq!(key.pop(), 7);
    key._sanity_check();
    assert_eq!(key.get_index(1), 4);
    assert_eq!(key.0, 0b0000100000000000000000000000000000000000000000000000000000000100);
}

#[test]
fn octant_key_path() {
    let key = OctantKey::from_path([1, 0, 6]);
    key._sanity_check();
    assert_eq!(key.iter().collect::<Vec<_>>(), vec![1, 0, 6]);
    assert_eq!(key.to_string(), "/1/0/6");
    assert_eq!(OctantKey::ROOT.to_string(), "/");

    let parent = key.parent().unwrap();
    assert_eq!(parent, OctantKey::from_path([1, 0]));
    assert_eq!(parent.child(6), key);
    assert_eq!(OctantKey::ROOT.parent(), None);
}

#[test]
fn octant_key_max_depth() {
    let key = OctantKey::from_path(std::iter::repeat(7).take(OctantKey::MAX_DEPTH as usize));
    key._sanity_check();
    assert!(key.at_max_depth());
    assert!(key.iter().all(|index| index == 7));
}

#[test]
fn octant_key_cell_center() {
    use glam::vec3;

    assert_eq!(OctantKey::ROOT.cell_center(2.0), Vec3::ONE);
    assert_eq!(OctantKey::from_path([0]).cell_center(2.0), Vec3::splat(0.5));
    assert_eq!(OctantKey::from_path([7]).cell_center(2.0), Vec3::splat(1.5));
    assert_eq!(OctantKey::from_path([1, 2]).cell_center(4.0), vec3(2.5, 1.5, 0.5));
}
