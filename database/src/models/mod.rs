//! Row types for the Postgres backend and their conversions into domain types.

pub mod account;
pub mod alert;
pub mod event;

pub use account::AccountRow;
pub use alert::AlertRow;
pub use event::EventRow;
