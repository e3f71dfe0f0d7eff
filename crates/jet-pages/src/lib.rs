#![forbid(unsafe_code)]

//! Page-level structures for Jet/ACE database files.
//!
//! The crate provides two things:
//!
//! - [`PageChannel`], the seam through which fixed-size pages are read and
//!   written. The database file itself (open/close, caching, encryption) is
//!   owned elsewhere; everything here works against the trait.
//! - [`UsageMap`], the per-table (or free-space) bitmap recording which
//!   pages belong to a table. A usage map starts out *inline* in its
//!   declaration row and promotes itself to a paged *reference* form once
//!   its page range can no longer be covered by the inline bitmap.
//!
//! All mutation is synchronous: a bit flip edits the backing buffer and
//! flushes the affected page through the channel before returning. There is
//! no internal locking; callers serialize access to the owning database.

mod channel;
mod error;
mod page_set;
mod usage_map;

pub use channel::PageChannel;
pub use error::{PageError, Result};
pub use usage_map::{PageCursor, UsageMap, MAP_TYPE_INLINE, MAP_TYPE_REFERENCE};
