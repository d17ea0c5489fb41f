// Application layer: use cases, authorization and error mapping.
// Clients (the CLI, tests) talk to `LedgerService` only.

pub mod error;
mod service;
mod session;
mod views;

pub use error::*;
pub use service::*;
pub use session::*;
pub use views::*;
