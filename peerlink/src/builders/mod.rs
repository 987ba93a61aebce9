mod discovery;
mod session;

pub use discovery::DiscoveryConfigBuilder;
pub use session::SessionConfigBuilder;
