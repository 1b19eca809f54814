//! SQLite persistence for the gateway's users.
//!
//! Holds the single `users` table the HTTP facade reads and the device
//! registration updates write to.
//!
//! - [`Database`] - connection pool with embedded migrations
//! - [`UserRepository`] / [`SqliteUserRepository`] - user data access
//!
//! # Example
//!
//! ```no_run
//! use gatehouse_core::{RegistrationKind, RegistrationUpdate, Uid};
//! use gatehouse_storage::{Database, DatabaseConfig, NewUser, UserRepository};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("gatehouse.db")).await?;
//! let users = db.users();
//!
//! let uid = Uid::new(12)?;
//! users.create(&NewUser::new("Ana", "ana@example.com").zkteco_uid(uid)).await?;
//!
//! let update = RegistrationUpdate {
//!     uid,
//!     kind: RegistrationKind::Card,
//!     registered: true,
//!     card_number: Some("0012345".to_string()),
//! };
//! let user = users.apply_registration(&update).await?;
//! assert!(user.card_registered);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{NewUser, User};
pub use repositories::{SqliteUserRepository, UserRepository};
