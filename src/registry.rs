//! Tree types that can be created by name, e.g. when a file header names the
//! type it was written from. Registration is an explicit call made during
//! startup.

use ahash::AHashMap;
use crate::{ aggregate::AggregateStats, Error, Result, SemanticOctree };

/// Operations available on any registered tree type.
pub trait AbstractOctree: std::fmt::Debug {
    fn tree_type(&self) -> &'static str;
    fn resolution(&self) -> f64;
    fn num_nodes(&self) -> usize;
    fn aggregate(&mut self) -> AggregateStats;
}

pub type TreeFactory = fn(resolution: f64) -> Box<dyn AbstractOctree>;

#[derive(Debug, Default)]
pub struct TreeRegistry {
    factories: AHashMap<&'static str, TreeFactory>,
}

impl TreeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `tree_type`, returning any factory it
    /// replaced.
    pub fn register(&mut self, tree_type: &'static str, factory: TreeFactory) -> Option<TreeFactory> {
        log::debug!("registering tree type {tree_type}");
        self.factories.insert(tree_type, factory)
    }

    pub fn is_registered(&self, tree_type: &str) -> bool {
        self.factories.contains_key(tree_type)
    }

    pub fn create(&self, tree_type: &str, resolution: f64) -> Result<Box<dyn AbstractOctree>> {
        let factory = self.factories
            .get(tree_type)
            .ok_or_else(|| Error::UnknownTreeType(tree_type.to_owned()))?;
        Ok(factory(resolution))
    }
}

impl AbstractOctree for SemanticOctree {
    fn tree_type(&self) -> &'static str {
        Self::TREE_TYPE
    }

    fn resolution(&self) -> f64 {
        SemanticOctree::resolution(self)
    }

    fn num_nodes(&self) -> usize {
        SemanticOctree::num_nodes(self)
    }

    fn aggregate(&mut self) -> AggregateStats {
        SemanticOctree::aggregate(self)
    }
}

pub fn register_semantic_octree(registry: &mut TreeRegistry) {
    registry.register(SemanticOctree::TREE_TYPE, |resolution| Box::new(SemanticOctree::new(resolution)));
}

#[test]
fn registry_creates_registered_types() {
    let mut registry = TreeRegistry::new();
    assert!(!registry.is_registered(SemanticOctree::TREE_TYPE));
    assert!(matches!(
        registry.create(SemanticOctree::TREE_TYPE, 0.2),
        Err(Error::UnknownTreeType(name)) if name == "SemanticOcTree"
    ));

    register_semantic_octree(&mut registry);
    assert!(registry.is_registered("SemanticOcTree"));

    let mut tree = registry.create("SemanticOcTree", 0.2).unwrap();
    assert_eq!(tree.tree_type(), "SemanticOcTree");
    assert_eq!(tree.resolution(), 0.2);
    assert_eq!(tree.num_nodes(), 0);
    assert_eq!(tree.aggregate(), AggregateStats::default());
}

#[test]
fn registering_twice_replaces() {
    let mut registry = TreeRegistry::new();
    register_semantic_octree(&mut registry);
    let previous = registry.register(SemanticOctree::TREE_TYPE, |r| Box::new(SemanticOctree::new(r * 2.0)));
    assert!(previous.is_some());

    let tree = registry.create(SemanticOctree::TREE_TYPE, 0.1).unwrap();
    assert_eq!(tree.resolution(), 0.2);
}
