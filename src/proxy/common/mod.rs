// Shared gateway plumbing
pub mod error;
