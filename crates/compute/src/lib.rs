/// Wire-format types for the compute API
pub mod api;

/// HTTP client for the compute API
pub mod client;

/// Instance descriptor resolution and gateway
pub mod instance;

/// Parameter normalization helpers
pub mod normalize;

/// Stable summary views of remote instances
pub mod project;
