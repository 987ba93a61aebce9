pub mod constants;
pub mod description;
pub mod discovery;

pub use description::{SdpType, SessionDescription};
pub use discovery::{Decoded, DiscoveryMessage};
