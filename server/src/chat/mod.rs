//! Connection registry, message routing and presence broadcast.

pub mod presence;
pub mod registry;
pub mod relay;
pub mod router;
