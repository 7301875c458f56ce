//! Crate-wide constants.

/// Application name, used for directory names and environment variable prefixes.
pub const APP_NAME: &str = "kettle";

/// Length of the truncated hash used for environment fingerprints in paths.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Manifest format version accepted by the loader.
pub const MANIFEST_FORMAT_VERSION: &str = "1";

/// Version of the persisted provider cache entry format.
pub const CACHE_ENTRY_VERSION: u32 = 2;

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "KETTLE_CACHE_DIR";

/// Environment variable overriding the build output prefix.
pub const BUILD_PREFIX_ENV: &str = "KETTLE_BUILD_PREFIX";
