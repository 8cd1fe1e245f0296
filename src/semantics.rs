use std::fmt;

/// Probability-like distribution over semantic classes, plus how many
/// observations have been fused into it.
///
/// An empty `label` means the voxel has never been labelled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoxelSemantics {
    pub label: Vec<f32>,
    pub count: u32,
}

impl VoxelSemantics {
    /// Unset semantics with a zero count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uniform distribution over `num_classes` classes, counted as one
    /// observation.
    pub fn uniform(num_classes: usize) -> Self {
        Self {
            label: vec![1.0 / num_classes as f32; num_classes],
            count: 1,
        }
    }

    /// Adopts `label` verbatim as a single observation. Not normalized.
    pub fn from_label(label: Vec<f32>) -> Self {
        Self { label, count: 1 }
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        !self.label.is_empty()
    }

    #[inline]
    pub fn add_count(&mut self) {
        self.count += 1;
    }

    #[inline]
    pub fn reset_count(&mut self) {
        self.count = 1;
    }

    pub fn normalize(&mut self) {
        normalize(&mut self.label);
    }

    /// Most likely class, or `None` when unset.
    pub fn argmax_label(&self) -> Option<usize> {
        argmax_label(&self.label)
    }

    /// Count-weighted running average of `observed` into `existing`.
    ///
    /// A set `existing` is zero-padded up to the observed length, every
    /// observed class is blended as
    /// `(old * count + observed) / (count + 1)`, then the whole distribution
    /// is normalized and the count bumped. An unset `existing` is replaced by
    /// the normalized observation with a count of one.
    pub fn fuse(existing: &VoxelSemantics, observed: &[f32]) -> VoxelSemantics {
        if !existing.is_set() {
            let mut fused = VoxelSemantics::from_label(observed.to_vec());
            fused.normalize();
            return fused;
        }

        let mut fused = existing.clone();
        if fused.label.len() < observed.len() {
            fused.label.resize(observed.len(), 0.0);
        }

        let weight = existing.count as f32;
        fused.label.iter_mut()
            .zip(observed.iter())
            .for_each(|(prev, obs)| {
                *prev = (*prev * weight + obs) / (weight + 1.0);
            });

        fused.normalize();
        fused.add_count();
        fused
    }

    /// Element-wise mean of every set distribution in `children`, normalized.
    ///
    /// Shorter distributions contribute zeros for their missing classes.
    /// The result is unset when no child is set.
    pub fn average<'a, I>(children: I) -> VoxelSemantics
    where
        I: IntoIterator<Item = &'a VoxelSemantics>,
    {
        let mut sum: Vec<f32> = Vec::new();
        let mut contributors = 0u32;

        for child in children.into_iter().filter(|s| s.is_set()) {
            if sum.len() < child.label.len() {
                sum.resize(child.label.len(), 0.0);
            }
            sum.iter_mut()
                .zip(child.label.iter())
                .for_each(|(acc, p)| *acc += p);
            contributors += 1;
        }

        if contributors == 0 {
            return VoxelSemantics::new();
        }

        sum.iter_mut().for_each(|p| *p /= contributors as f32);
        normalize(&mut sum);
        VoxelSemantics::from_label(sum)
    }
}

/// Scales `dist` so it sums to one. A non-positive sum falls back to the
/// uniform distribution; an empty slice is left alone.
pub fn normalize(dist: &mut [f32]) {
    if dist.is_empty() {
        return;
    }

    let sum: f32 = dist.iter().sum();
    if sum > 0.0 {
        dist.iter_mut().for_each(|p| *p /= sum);
    } else {
        let uniform = 1.0 / dist.len() as f32;
        dist.iter_mut().for_each(|p| *p = uniform);
    }
}

/// Index of the largest entry. Ties resolve to the lowest index.
pub fn argmax_label(dist: &[f32]) -> Option<usize> {
    let mut iter = dist.iter().enumerate();
    let (mut best, mut best_value) = iter.next().map(|(i, p)| (i, *p))?;
    for (i, p) in iter {
        if *p > best_value {
            best = i;
            best_value = *p;
        }
    }
    Some(best)
}

impl fmt::Display for VoxelSemantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in self.label.iter() {
            write!(f, "{} ", p)?;
        }
        Ok(())
    }
}

#[cfg(test)]
fn assert_dist_eq(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} != {expected:?}");
    actual.iter().zip(expected.iter()).for_each(|(a, e)| {
        assert!((a - e).abs() < 1e-6, "{actual:?} != {expected:?}");
    });
}

#[test]
fn semantics_constructors() {
    let unset = VoxelSemantics::new();
    assert!(!unset.is_set());
    assert_eq!(unset.count, 0);

    let uniform = VoxelSemantics::uniform(4);
    assert!(uniform.is_set());
    assert_eq!(uniform.count, 1);
    assert_dist_eq(&uniform.label, &[0.25, 0.25, 0.25, 0.25]);

    let raw = VoxelSemantics::from_label(vec![2.0, 2.0]);
    assert_eq!(raw.count, 1);
    assert_dist_eq(&raw.label, &[2.0, 2.0]);

    let mut counted = VoxelSemantics::uniform(2);
    counted.add_count();
    counted.add_count();
    assert_eq!(counted.count, 3);
    counted.reset_count();
    assert_eq!(counted.count, 1);
}

#[test]
fn normalize_positive_sum() {
    let mut dist = [1.0, 3.0, 4.0];
    normalize(&mut dist);
    assert_dist_eq(&dist, &[0.125, 0.375, 0.5]);
    assert!((dist.iter().sum::<f32>() - 1.0).abs() < 1e-6);
}

#[test]
fn normalize_degenerate_falls_back_to_uniform() {
    let mut zeros = [0.0; 4];
    normalize(&mut zeros);
    assert_dist_eq(&zeros, &[0.25; 4]);

    let mut cancelling = [1.0, -1.0];
    normalize(&mut cancelling);
    assert_dist_eq(&cancelling, &[0.5, 0.5]);

    let mut empty: [f32; 0] = [];
    normalize(&mut empty);
}

#[test]
fn fuse_into_unset_resets() {
    let mut stale = VoxelSemantics::new();
    stale.count = 7;
    let fused = VoxelSemantics::fuse(&stale, &[1.0, 3.0]);
    assert_eq!(fused.count, 1);
    assert_dist_eq(&fused.label, &[0.25, 0.75]);
}

#[test]
fn fuse_running_update() {
    let existing = VoxelSemantics {
        label: vec![0.5, 0.5],
        count: 1,
    };
    let fused = VoxelSemantics::fuse(&existing, &[1.0, 0.0]);
    assert_eq!(fused.count, 2);
    assert_dist_eq(&fused.label, &[0.75, 0.25]);

    let fused = VoxelSemantics::fuse(&fused, &[0.0, 1.0]);
    assert_eq!(fused.count, 3);
    assert_dist_eq(&fused.label, &[0.5, 0.5]);
}

#[test]
fn fuse_grows_shorter_distribution() {
    let existing = VoxelSemantics {
        label: vec![1.0],
        count: 1,
    };
    let fused = VoxelSemantics::fuse(&existing, &[0.0, 1.0]);
    assert_eq!(fused.count, 2);
    assert_dist_eq(&fused.label, &[0.5, 0.5]);
}

#[test]
fn fuse_keeps_classes_beyond_observation() {
    let existing = VoxelSemantics {
        label: vec![0.2, 0.2, 0.6],
        count: 1,
    };
    // Only the first two classes are observed; the third is carried over
    let fused = VoxelSemantics::fuse(&existing, &[1.0, 0.0]);
    let expected = [0.6 / 1.3, 0.1 / 1.3, 0.6 / 1.3];
    assert_dist_eq(&fused.label, &expected);
}

#[test]
fn argmax_ties_pick_lowest_index() {
    assert_eq!(argmax_label(&[0.4, 0.4, 0.2]), Some(0));
    assert_eq!(argmax_label(&[0.1, 0.3, 0.6]), Some(2));
    assert_eq!(argmax_label(&[0.0, 0.0]), Some(0));
    assert_eq!(argmax_label(&[]), None);
    assert_eq!(VoxelSemantics::new().argmax_label(), None);
}

#[test]
fn average_pads_and_normalizes() {
    let a = VoxelSemantics::from_label(vec![1.0, 0.0]);
    let b = VoxelSemantics::from_label(vec![0.0, 0.0, 1.0]);
    let unset = VoxelSemantics::new();

    let avg = VoxelSemantics::average([&a, &unset, &b]);
    assert_eq!(avg.count, 1);
    assert_dist_eq(&avg.label, &[0.5, 0.0, 0.5]);

    let none = VoxelSemantics::average([&unset]);
    assert!(!none.is_set());
}

#[test]
fn semantics_display() {
    let semantics = VoxelSemantics::from_label(vec![0.25, 0.75]);
    assert_eq!(semantics.to_string(), "0.25 0.75 ");
    assert_eq!(VoxelSemantics::new().to_string(), "");
}
