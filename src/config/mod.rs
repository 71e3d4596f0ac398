pub mod schema;

pub use schema::{Config, ConsoleConfig, PortalConfig};
