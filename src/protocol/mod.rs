pub mod v5;
pub mod version;

pub use version::ProtocolVersion;
