pub mod builtin;
pub mod registry;
pub mod traits;

pub use registry::TransformRegistry;
pub use traits::Transform;
