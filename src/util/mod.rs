//! Shared helpers for identifier generation and timestamp handling.
//!
//! Everything here is deliberately small and dependency-light:
//!
//! - **Identifiers**: UUID-shaped article ids from a non-cryptographic RNG
//! - **Timestamps**: canonical ISO-8601 "now", lenient parsing for ordering,
//!   and the relative formatting used by status output
//!
//! # Examples
//!
//! ```
//! use daybook::util::{generate_id, now_iso, parse_when};
//!
//! let id = generate_id();
//! assert_eq!(id.len(), 36);
//!
//! // Timestamps round-trip through the lenient parser
//! let stamp = now_iso();
//! assert!(parse_when(&stamp).timestamp() > 0);
//! ```

mod id;
mod time;

pub use id::generate_id;
pub use time::{date_stamp, now_iso, parse_when, relative_from_now};
