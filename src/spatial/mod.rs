pub mod octree;

pub use octree::{EntityKind, EntityRef, Octree};
