mod memory;
mod postgres;
pub mod repo;
pub mod repo_types;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;
pub use repo::{StoreError, UserStore};
pub use repo_types::{Credentials, Identifier, NewUser, Role, User, UserStats};
