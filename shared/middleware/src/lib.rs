pub mod auth;
pub mod rate_limiting;
pub mod token;

pub use auth::*;
pub use rate_limiting::*;
pub use token::*;
