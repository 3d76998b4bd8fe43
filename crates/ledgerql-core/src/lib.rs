//! Ledger data model for ledgerql.
//!
//! This crate provides the booked-ledger types the query engine runs over:
//!
//! - [`Amount`] - A decimal number with a currency
//! - [`Cost`] - Acquisition cost of a lot
//! - [`Position`] - Units held at an optional cost
//! - [`Inventory`] - A collection of positions merged by lot
//! - [`Directive`] - Transactions and the other dated entries
//! - [`Options`] - Ledger-wide options
//!
//! # Example
//!
//! ```
//! use ledgerql_core::{Amount, Cost, Inventory, Position};
//! use rust_decimal_macros::dec;
//!
//! let mut inv = Inventory::new();
//! inv.add(Position::with_cost(
//!     Amount::new(dec!(10), "HOOL"),
//!     Cost::new(dec!(500.00), "USD"),
//! ));
//! assert_eq!(inv.units("HOOL"), dec!(10));
//! assert_eq!(inv.at_cost().units("USD"), dec!(5000.00));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod amount;
pub mod directive;
pub mod format;
pub mod inventory;
pub mod options;
pub mod position;

pub use amount::Amount;
pub use directive::{
    sort_directives, Balance, Close, Commodity, Directive, DirectivePriority, Event, MetaValue,
    Metadata, Note, Open, Posting, Price, Transaction,
};
pub use format::{format_directive, format_meta_value, write_directive, FormatConfig};
pub use inventory::Inventory;
pub use options::{OptionError, Options};
pub use position::{Cost, Position};

// Re-export commonly used external types
pub use chrono::NaiveDate;
pub use rust_decimal::Decimal;
