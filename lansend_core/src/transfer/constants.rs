/// Suffix of the staging file that holds a partially received file
pub const STAGING_SUFFIX: &str = ".part";

/// Maximum filename length in bytes
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Read buffer for hashing completed files (1MB)
pub const BUFFER_SIZE: usize = 1024 * 1024;

/// MIME hint recorded when the manifest doesn't carry one
pub const DEFAULT_FILE_TYPE: &str = "generic";
