pub mod callback;
pub mod stub;
pub mod unavailable;

pub use callback::FnBackend;
pub use stub::StubBackend;
pub use unavailable::UnavailableBackend;
