pub mod directory;
#[cfg(test)]
pub mod memory;
pub mod model;
pub mod role;

pub use directory::{DirectoryError, PgUserDirectory, UserDirectory};
pub use model::{NewUser, User};
pub use role::Role;
