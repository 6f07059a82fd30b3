//! HTTP host for the authorizer

pub mod auth;
pub mod handlers;
mod router;
mod server;

pub use auth::auth_middleware;
pub use handlers::{Company, CompanyRepository};
pub use router::{AppState, create_router};
pub use server::Gateway;
