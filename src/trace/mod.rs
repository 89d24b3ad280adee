pub mod bvh;

pub use bvh::{Hit, Material, TaggedTriangle, WorldBvh};
