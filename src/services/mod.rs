//! Business operations behind the HTTP handlers.
//!
//! Services own the database invariants (role checks, status transitions,
//! balances). Handlers validate request shape and map `ServiceError` onto
//! HTTP responses.

pub mod accounts;
pub mod admin;
pub mod documents;
pub mod error;
pub mod rides;
pub mod wallets;

pub use admin::AdminService;
pub use documents::{DocumentStore, UploadResponse};
pub use error::{ServiceError, ServiceResult};
pub use rides::RideService;
pub use wallets::WalletService;
