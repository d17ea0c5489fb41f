mod repository;

pub use repository::*;

/// SQL migration for members and the savings/loan ledgers
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// SQL migration for the local identity provider
pub const MIGRATION_002_IDENTITY: &str = include_str!("migrations/002_identity.sql");
