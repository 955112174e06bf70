//! Bounding volumes and intersection tests
//!
//! All volumes are plain values. The owner of a transform recomputes its
//! volumes through [`Aabb::compute`] / [`Obb::compute`]; nothing here keeps a
//! reference back to a model.

mod aabb;
mod frustum;
mod obb;
mod ray;
mod region;
mod sphere;

pub use aabb::*;
pub use frustum::*;
pub use obb::*;
pub use ray::*;
pub use region::*;
pub use sphere::*;

use glam::Vec3;

/// A convex volume described by eight world-space corners
pub trait Corners {
    fn corners(&self) -> [Vec3; 8];
}
