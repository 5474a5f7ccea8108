mod adapter;
mod backend;
mod backends;
mod registry;
mod result;

pub use adapter::{AdapterConfig, DetectorAdapter, DEFAULT_DETECT_TIMEOUT, DEFAULT_MIN_FACE_PX};
pub use backend::{DetectionCapability, DetectorBackend};
pub use backends::{FnBackend, StubBackend, UnavailableBackend};
pub use registry::BackendRegistry;
pub use result::{DetectionOutcome, DetectionResult};
