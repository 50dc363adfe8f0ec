//! Concrete entity types

pub mod user;

pub use user::{User, UserRepository};
