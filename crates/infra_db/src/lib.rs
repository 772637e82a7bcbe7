//! Infrastructure Database Layer
//!
//! PostgreSQL adapter for the credit ledger: connection pooling, embedded
//! schema migrations, and the row-locked unit-of-work implementation of
//! the ledger and billing store ports.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PgStore};
//!
//! let pool = create_pool(&DatabaseConfig::new(database_url)).await?;
//! run_migrations(&pool).await?;
//! let store = PgStore::new(pool);
//! let ledger = CreditLedger::new(store.clone(), LedgerConfig::default());
//! ```

pub mod error;
pub mod pool;
mod rows;
pub mod store;

pub use error::DatabaseError;
pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use store::{PgStore, PgUnitOfWork};
