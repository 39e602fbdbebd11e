//! API constants

/// API base path prefix
pub const API_PREFIX: &str = "/api";

/// Separation endpoint, registered with and without the trailing slash
pub const SEPARATE_PATH: &str = "/api/separate";

/// Download proxy prefix; the stored object URL or key follows
pub const DOWNLOAD_STEM_PATH: &str = "/api/download_stem";

/// OpenAPI document path
pub const OPENAPI_PATH: &str = "/api/openapi.json";

/// Message returned with every successful separation
pub const SEPARATION_COMPLETE_MESSAGE: &str = "Separation complete";

/// Content type of downloaded stems
pub const STEM_DOWNLOAD_CONTENT_TYPE: &str = "audio/mpeg";
