pub mod bounds;
pub mod culling;
pub mod geometry;
pub mod interaction;
pub mod session;
pub mod shortcuts;
pub mod spatial_index;
pub mod transform;

pub use bounds::Bounds;
pub use session::CanvasSession;
pub use transform::CanvasTransform;
