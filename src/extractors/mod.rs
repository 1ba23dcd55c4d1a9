pub mod auth;

pub use auth::{AuthorToken, Authorized, GuestDevice};
