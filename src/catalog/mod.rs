//! Static machine/product/alert catalogs, preloaded from a flat-file
//! machine index and per-model XML descriptions. The session resolves an
//! advertised article number to a [`Joe`] at connect time.
//!
//! Catalog loading failures are fatal at process start:
//! [`MachineCatalog::load`] and [`load_joe`] both return [`crate::Error::Catalog`].

mod joe;
mod machine;

pub use joe::{load_joe, Alert, ItemsOption, MinMaxOption, OptionItem, Product};
pub use machine::{Machine, MachineCatalog};

pub use joe::Joe;
