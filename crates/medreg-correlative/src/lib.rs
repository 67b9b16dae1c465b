//! Correlative number allocation.
//!
//! A correlative code is a prefix followed by a zero-padded sequence value
//! (`CP000001`). Each prefix has one durable counter row holding the last
//! value issued. [`CorrelativeAllocator`] turns "give me the next `CP`" into
//! a lock / increment / write against that row, inside a transaction the
//! caller owns, so a number is either committed together with the record
//! that uses it or never visible at all.
//!
//! ```ignore
//! let allocator = CorrelativeAllocator::new(AllocatorConfig::default())?;
//! let mut tx = storage.begin_transaction().await?;
//! let code = allocator.allocate("CP", &mut *tx).await?;
//! tx.commit().await?;
//! ```

mod allocator;
mod config;
mod error;

pub use allocator::{CorrelativeAllocator, ResolvedPrefix};
pub use config::{AllocatorConfig, DEFAULT_PADDING_WIDTH, PrefixConfig, UnknownPrefixPolicy};
pub use error::AllocationError;
