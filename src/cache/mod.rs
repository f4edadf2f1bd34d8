//! Cache Core
//!
//! Persisted, in-memory-buffered caches of serializable items.
//!
//! # Components
//!
//! - **Context** (`context.rs`) - Shared collaborators and name registration
//! - **Buffered cache** (`buffered.rs`) - Load, mutate and commit one cache
//! - **Asynchronous commit** (`commit.rs`) - Background commit with callback
//! - **Expiration** (`expiration.rs`) - Absolute and relative expiration
//! - **Limiter** (`limiter.rs`) - Item-count policies applied before writes
//! - **Codec** (`codec.rs`) - Record encoding of the backing file
//!
//! # Usage
//!
//! ```ignore
//! use persistcache::cache::{CacheContext, ExpiresIn, LimiterPolicy};
//!
//! let context = CacheContext::in_memory();
//! let feed = context.open::<String>("feed")?;
//! feed.set_limiter(Some(LimiterPolicy::keep_last(100)?))?;
//! feed.set_expiration_in(ExpiresIn::days(1))?;
//!
//! feed.load();
//! feed.push("hello".to_string())?;
//! feed.commit()?;
//! ```

mod buffered;
pub mod codec;
mod commit;
mod context;
pub mod expiration;
pub mod limiter;

pub use buffered::Cache;
pub use codec::{decode_records, encode_records, encode_to_vec, write_encoded, DecodeOutcome};
pub use commit::CommitHandle;
pub use context::{validate_name, CacheContext, CacheContextBuilder};
pub use expiration::ExpiresIn;
pub use limiter::LimiterPolicy;
