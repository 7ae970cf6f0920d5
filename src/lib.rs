#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::cast_possible_truncation)]
#![warn(clippy::cast_possible_wrap)]
#![cfg_attr(
    feature = "cargo-clippy",
    allow(
        clippy::unreadable_literal,
        clippy::cognitive_complexity,
        clippy::float_cmp,
        clippy::match_like_matches_macro,
        clippy::derive_partial_eq_without_eq
    )
)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod connector;
pub mod error;
pub mod event;
mod lease;
pub mod options;
mod pool;
pub(crate) mod runtime;
pub mod selector;
mod slot;
mod waiter;

pub use error::{Error, ErrorKind, Result};
pub use lease::Lease;
pub use options::PoolOptions;
pub use pool::Pool;
pub use slot::{Affinity, Kind};
pub use waiter::{WaiterId, WaiterListener};
