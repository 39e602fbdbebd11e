pub mod ssrf_validation;
pub mod upload;
