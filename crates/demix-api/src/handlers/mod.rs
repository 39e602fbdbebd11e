pub mod download_stem;
pub mod health;
pub mod separate;
