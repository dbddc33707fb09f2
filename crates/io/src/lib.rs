// Mapping file codec + session store

pub mod mappings;
pub mod store;

/// Store schema version
/// Increment when the schema changes in a way old versions can't read
pub const STORE_SCHEMA_VERSION: u32 = 1;
