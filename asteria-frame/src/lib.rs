//! Core data model for Asteria: camera frames, `f64` image products, clips,
//! and their on-disk Netpbm representation (§3).

mod clip;
mod field_order;
mod frame;
mod image_f64;
mod location;
pub mod netpbm;

pub use clip::{Clip, ClipError};
pub use field_order::FieldOrder;
pub use frame::Frame;
pub use image_f64::ImageF64;
pub use location::{BoundingBox, LocationMeasurement};
