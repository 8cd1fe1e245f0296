use std::fmt;

/// 8-bit RGB color of a voxel.
///
/// Pure white `(255, 255, 255)` doubles as the "never observed" sentinel,
/// so a genuinely white observation reads back as unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoxelColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Default for VoxelColor {
    #[inline(always)]
    fn default() -> Self {
        Self::UNSET
    }
}

impl From<(u8, u8, u8)> for VoxelColor {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self { r, g, b }
    }
}

impl VoxelColor {
    pub const UNSET: Self = Self { r: 255, g: 255, b: 255 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        *self != Self::UNSET
    }

    /// Unweighted running average: the first observation is taken as-is,
    /// every later one is averaged channel-wise with the stored color.
    pub fn blend(existing: VoxelColor, observed: VoxelColor) -> VoxelColor {
        if !existing.is_set() {
            return observed;
        }

        let mid = |a: u8, b: u8| ((a as u16 + b as u16) / 2) as u8;
        VoxelColor {
            r: mid(existing.r, observed.r),
            g: mid(existing.g, observed.g),
            b: mid(existing.b, observed.b),
        }
    }

    /// Channel-wise truncated mean of every set color in `colors`.
    ///
    /// Returns `None` when none of them is set.
    pub fn average<I>(colors: I) -> Option<VoxelColor>
    where
        I: IntoIterator<Item = VoxelColor>,
    {
        let (mut r, mut g, mut b, mut count) = (0u32, 0u32, 0u32, 0u32);
        colors.into_iter().filter(|c| c.is_set()).for_each(|c| {
            r += c.r as u32;
            g += c.g as u32;
            b += c.b as u32;
            count += 1;
        });

        if count == 0 {
            return None;
        }

        Some(VoxelColor {
            r: (r / count) as u8,
            g: (g / count) as u8,
            b: (b / count) as u8,
        })
    }
}

impl fmt::Display for VoxelColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.r, self.g, self.b)
    }
}

#[test]
fn color_default_is_unset() {
    let color = VoxelColor::default();
    assert_eq!(color, VoxelColor::new(255, 255, 255));
    assert!(!color.is_set());
    assert!(VoxelColor::new(255, 255, 254).is_set());
    assert!(VoxelColor::new(0, 255, 255).is_set());
}

#[test]
fn color_blend_first_observation_wins() {
    let observed = VoxelColor::new(10, 20, 30);
    assert_eq!(VoxelColor::blend(VoxelColor::UNSET, observed), observed);
}

#[test]
fn color_blend_averages() {
    let blended = VoxelColor::blend(VoxelColor::new(10, 20, 30), VoxelColor::new(20, 20, 20));
    assert_eq!(blended, VoxelColor::new(15, 20, 25));

    // Truncates, and does not overflow on bright channels
    let blended = VoxelColor::blend(VoxelColor::new(255, 0, 3), VoxelColor::new(254, 1, 0));
    assert_eq!(blended, VoxelColor::new(254, 0, 1));
}

#[test]
fn color_blend_white_observation_looks_unset() {
    let blended = VoxelColor::blend(VoxelColor::new(100, 100, 100), VoxelColor::UNSET);
    assert_eq!(blended, VoxelColor::new(177, 177, 177));

    // A white-on-white blend stays "unset"
    let blended = VoxelColor::blend(VoxelColor::UNSET, VoxelColor::UNSET);
    assert!(!blended.is_set());
}

#[test]
fn color_average_skips_unset() {
    let colors = [
        VoxelColor::new(10, 0, 100),
        VoxelColor::UNSET,
        VoxelColor::new(21, 3, 50),
    ];
    assert_eq!(VoxelColor::average(colors), Some(VoxelColor::new(15, 1, 75)));
    assert_eq!(VoxelColor::average([VoxelColor::UNSET]), None);
    assert_eq!(VoxelColor::average(std::iter::empty()), None);
}

#[test]
fn color_display() {
    assert_eq!(VoxelColor::new(1, 22, 255).to_string(), "(1 22 255)");
}
