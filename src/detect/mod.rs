mod adapter;
mod backend;
mod backends;
mod registry;
mod result;

pub use adapter::DetectionAdapter;
pub use backend::DetectorBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use backends::{load_labels, StubBackend};
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection};
