//! System-of-record stores for identities, verification records and files.
//! Each store supports atomic read-then-write per record under its own lock.

pub mod files;
pub mod users;
pub mod verifications;
