pub mod access;
pub mod capability;
pub mod context;
pub mod error;
pub mod mail;
pub mod server;
pub mod store;
pub mod token;
pub mod verification;
