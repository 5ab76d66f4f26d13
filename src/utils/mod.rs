pub mod base64;
pub mod matcher;
pub mod merge;

// Re-export common utilities
pub use matcher::{smart_regex, TagMatcher};
pub use merge::{deep_assign, deep_assign_map};
