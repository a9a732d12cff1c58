//! Globally unique, monotonic 64-bit identifiers.
//!
//! Every id is a packed word: a *high segment* leased from an external,
//! atomically incremented counter (a database row, a Redis key, a callback)
//! and a *low segment* advanced by a single lock-free `fetch_add` per call.
//!
//! ```text
//!  Bit Index:  63   62    60 59         36 35            0
//!              +---+--------+-------------+---------------+
//!  Field:      | 0 | section|  high (24)  |   low (36)    |   (sectioned)
//!              +---+--------+-------------+---------------+
//!              | 0 |       high (27)      |   low (36)    |   (monolithic)
//!              +---+----------------------+---------------+
//! ```
//!
//! When the low segment reaches 80% of its space, the generator renews its
//! high segment on a background thread. If it reaches 96% before a renewal
//! lands, [`Wuid::try_next`] returns [`Error::Exhausted`] for good.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use wuid::{Lease, Wuid};
//!
//! static COUNTER: AtomicI64 = AtomicI64::new(0);
//!
//! let generator = Wuid::new("alpha");
//! generator
//!     .load_with(|| Ok(Lease::new(COUNTER.fetch_add(1, Ordering::SeqCst) + 1)))
//!     .unwrap();
//!
//! let a = generator.try_next().unwrap();
//! let b = generator.try_next().unwrap();
//! assert!(a < b);
//! assert_eq!(a >> 36, 1);
//! ```

mod config;
mod error;
mod generator;
mod layout;
mod mutex;
mod provider;
mod stats;

pub use crate::config::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::layout::*;
pub use crate::provider::*;
pub use crate::stats::*;
