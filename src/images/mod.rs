pub mod sanitizer;
pub mod services;

pub use sanitizer::{UploadCandidate, UploadSanitizer};
