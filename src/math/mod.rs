pub mod aabb;
pub mod ray;

pub use aabb::AxisAlignedBoundingBox;
pub use ray::Ray;
pub use nalgebra::{UnitQuaternion, Vector3};
