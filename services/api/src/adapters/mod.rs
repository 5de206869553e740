pub mod db;
pub mod memory;

pub use db::{PgCatalog, PgEnrollment, PgStore};
pub use memory::{MemoryCatalog, MemoryEnrollment, MemoryStore};
