//! Shared constants.

/// Extension appended to the artifact path for a separate source map.
pub const SOURCE_MAP_EXTENSION: &str = "map";

/// Default quiet period before a batch of file changes triggers a rebuild.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Extensions tried, in order, when a relative specifier has none.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".jsx", ".ts", ".tsx", ".mjs"];

/// Default configuration file name.
pub const CONFIG_FILENAME: &str = "knit.toml";
