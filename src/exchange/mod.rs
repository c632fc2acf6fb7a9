// =============================================================================
// Exchange connectivity: tick source stream and symbol discovery
// =============================================================================

pub mod discovery;
pub mod stream;

pub use discovery::{StaticSymbolDiscovery, SymbolDiscovery, VolumeFilter};
pub use stream::{partition_symbols, run_connection_group, ConnectionState};
