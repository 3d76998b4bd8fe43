//! Directive types of a booked ledger.
//!
//! The query engine reads these as an immutable, date-ordered stream:
//!
//! - [`Transaction`] - transfers between accounts, the source of posting rows
//! - [`Open`] / [`Close`] - account lifetime
//! - [`Commodity`] - commodity declaration
//! - [`Balance`] - balance assertion
//! - [`Note`] / [`Event`] - free-form annotations
//! - [`Price`] - a price observation

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Amount, Cost};

/// Metadata value types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaValue {
    /// String value
    String(String),
    /// Account reference
    Account(String),
    /// Currency code
    Currency(String),
    /// Tag reference
    Tag(String),
    /// Date value
    Date(NaiveDate),
    /// Numeric value
    Number(Decimal),
    /// Boolean value
    Bool(bool),
    /// Amount value
    Amount(Amount),
    /// Explicitly empty value
    None,
}

/// Metadata is a key-value map attached to directives and postings.
pub type Metadata = BTreeMap<String, MetaValue>;

/// A posting within a transaction.
///
/// Postings in the query input are fully booked: units are always known
/// and costs are resolved to concrete lots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// The account for this posting
    pub account: String,
    /// The units moved
    pub units: Amount,
    /// Lot cost of the units
    pub cost: Option<Cost>,
    /// Per-unit price annotation (`@`)
    pub price: Option<Amount>,
    /// Posting flag
    pub flag: Option<char>,
    /// Posting metadata
    pub meta: Metadata,
}

impl Posting {
    /// Create a new posting with the given account and units.
    #[must_use]
    pub fn new(account: impl Into<String>, units: Amount) -> Self {
        Self {
            account: account.into(),
            units,
            cost: None,
            price: None,
            flag: None,
            meta: Metadata::new(),
        }
    }

    /// Add a lot cost.
    #[must_use]
    pub fn with_cost(mut self, cost: Cost) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Add a per-unit price.
    #[must_use]
    pub fn with_price(mut self, price: Amount) -> Self {
        self.price = Some(price);
        self
    }

    /// Add a flag.
    #[must_use]
    pub const fn with_flag(mut self, flag: char) -> Self {
        self.flag = Some(flag);
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: MetaValue) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// The amount this posting contributes to the transaction balance.
    ///
    /// Cost takes precedence over price; a posting with neither weighs its units.
    #[must_use]
    pub fn weight(&self) -> Amount {
        if let Some(cost) = &self.cost {
            cost.total(self.units.number)
        } else if let Some(price) = &self.price {
            Amount::new(self.units.number * price.number, price.currency.clone())
        } else {
            self.units.clone()
        }
    }
}

/// Sorting priority of directives sharing a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DirectivePriority {
    /// Accounts open before anything else happens on a date
    Open = 0,
    /// Commodity declarations
    Commodity = 1,
    /// Balance assertions apply at the start of the day
    Balance = 2,
    /// Transactions
    Transaction = 3,
    /// Notes
    Note = 4,
    /// Events
    Event = 5,
    /// Prices
    Price = 6,
    /// Accounts close after all activity
    Close = 7,
}

/// All directive types the query engine understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Directive {
    /// Transaction directive
    Transaction(Transaction),
    /// Open account
    Open(Open),
    /// Close account
    Close(Close),
    /// Commodity declaration
    Commodity(Commodity),
    /// Balance assertion
    Balance(Balance),
    /// Account note
    Note(Note),
    /// Life event
    Event(Event),
    /// Price observation
    Price(Price),
}

impl Directive {
    /// Get the date of this directive.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        match self {
            Self::Transaction(t) => t.date,
            Self::Open(o) => o.date,
            Self::Close(c) => c.date,
            Self::Commodity(c) => c.date,
            Self::Balance(b) => b.date,
            Self::Note(n) => n.date,
            Self::Event(e) => e.date,
            Self::Price(p) => p.date,
        }
    }

    /// Get the metadata of this directive.
    #[must_use]
    pub const fn meta(&self) -> &Metadata {
        match self {
            Self::Transaction(t) => &t.meta,
            Self::Open(o) => &o.meta,
            Self::Close(c) => &c.meta,
            Self::Commodity(c) => &c.meta,
            Self::Balance(b) => &b.meta,
            Self::Note(n) => &n.meta,
            Self::Event(e) => &e.meta,
            Self::Price(p) => &p.meta,
        }
    }

    /// Get as a transaction, if this is one.
    #[must_use]
    pub const fn as_transaction(&self) -> Option<&Transaction> {
        match self {
            Self::Transaction(t) => Some(t),
            _ => None,
        }
    }

    /// Lower-case directive type name, as exposed by the `type` column.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Transaction(_) => "transaction",
            Self::Open(_) => "open",
            Self::Close(_) => "close",
            Self::Commodity(_) => "commodity",
            Self::Balance(_) => "balance",
            Self::Note(_) => "note",
            Self::Event(_) => "event",
            Self::Price(_) => "price",
        }
    }

    /// Get the sorting priority for this directive.
    #[must_use]
    pub const fn priority(&self) -> DirectivePriority {
        match self {
            Self::Open(_) => DirectivePriority::Open,
            Self::Commodity(_) => DirectivePriority::Commodity,
            Self::Balance(_) => DirectivePriority::Balance,
            Self::Transaction(_) => DirectivePriority::Transaction,
            Self::Note(_) => DirectivePriority::Note,
            Self::Event(_) => DirectivePriority::Event,
            Self::Price(_) => DirectivePriority::Price,
            Self::Close(_) => DirectivePriority::Close,
        }
    }
}

/// Sort directives by date, then by type priority.
///
/// The sort is stable, so same-day directives of one type keep their order.
pub fn sort_directives(directives: &mut [Directive]) {
    directives.sort_by(|a, b| {
        a.date()
            .cmp(&b.date())
            .then_with(|| a.priority().cmp(&b.priority()))
    });
}

/// A transaction directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction date
    pub date: NaiveDate,
    /// Transaction flag (`*`, `!`, or a synthetic flag such as `S`)
    pub flag: char,
    /// Payee (optional)
    pub payee: Option<String>,
    /// Narration (description)
    pub narration: String,
    /// Tags attached to this transaction
    pub tags: Vec<String>,
    /// Links attached to this transaction
    pub links: Vec<String>,
    /// Transaction metadata
    pub meta: Metadata,
    /// Postings (account entries)
    pub postings: Vec<Posting>,
}

impl Transaction {
    /// Create a new transaction.
    #[must_use]
    pub fn new(date: NaiveDate, narration: impl Into<String>) -> Self {
        Self {
            date,
            flag: '*',
            payee: None,
            narration: narration.into(),
            tags: Vec::new(),
            links: Vec::new(),
            meta: Metadata::new(),
            postings: Vec::new(),
        }
    }

    /// Set the flag.
    #[must_use]
    pub const fn with_flag(mut self, flag: char) -> Self {
        self.flag = flag;
        self
    }

    /// Set the payee.
    #[must_use]
    pub fn with_payee(mut self, payee: impl Into<String>) -> Self {
        self.payee = Some(payee.into());
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: MetaValue) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Add a posting.
    #[must_use]
    pub fn with_posting(mut self, posting: Posting) -> Self {
        self.postings.push(posting);
        self
    }
}

/// Account opening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Open {
    /// Date
    pub date: NaiveDate,
    /// Account opened
    pub account: String,
    /// Allowed currencies
    pub currencies: Vec<String>,
    /// Metadata
    pub meta: Metadata,
}

impl Open {
    /// Create a new open directive.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<String>) -> Self {
        Self {
            date,
            account: account.into(),
            currencies: Vec::new(),
            meta: Metadata::new(),
        }
    }
}

/// Account closing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Close {
    /// Date
    pub date: NaiveDate,
    /// Account closed
    pub account: String,
    /// Metadata
    pub meta: Metadata,
}

impl Close {
    /// Create a new close directive.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<String>) -> Self {
        Self {
            date,
            account: account.into(),
            meta: Metadata::new(),
        }
    }
}

/// Commodity declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commodity {
    /// Date
    pub date: NaiveDate,
    /// Commodity code
    pub currency: String,
    /// Metadata
    pub meta: Metadata,
}

impl Commodity {
    /// Create a new commodity directive.
    #[must_use]
    pub fn new(date: NaiveDate, currency: impl Into<String>) -> Self {
        Self {
            date,
            currency: currency.into(),
            meta: Metadata::new(),
        }
    }
}

/// Balance assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Date
    pub date: NaiveDate,
    /// Account checked
    pub account: String,
    /// Expected amount
    pub amount: Amount,
    /// Metadata
    pub meta: Metadata,
}

impl Balance {
    /// Create a new balance assertion.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<String>, amount: Amount) -> Self {
        Self {
            date,
            account: account.into(),
            amount,
            meta: Metadata::new(),
        }
    }
}

/// Note attached to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Date
    pub date: NaiveDate,
    /// Account
    pub account: String,
    /// Note text
    pub comment: String,
    /// Metadata
    pub meta: Metadata,
}

impl Note {
    /// Create a new note.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            date,
            account: account.into(),
            comment: comment.into(),
            meta: Metadata::new(),
        }
    }
}

/// Event directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Date
    pub date: NaiveDate,
    /// Event type
    pub event_type: String,
    /// Event value
    pub value: String,
    /// Metadata
    pub meta: Metadata,
}

impl Event {
    /// Create a new event.
    #[must_use]
    pub fn new(date: NaiveDate, event_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            date,
            event_type: event_type.into(),
            value: value.into(),
            meta: Metadata::new(),
        }
    }
}

/// Price of a commodity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Date
    pub date: NaiveDate,
    /// Commodity priced
    pub currency: String,
    /// Price per unit
    pub amount: Amount,
    /// Metadata
    pub meta: Metadata,
}

impl Price {
    /// Create a new price directive.
    #[must_use]
    pub fn new(date: NaiveDate, currency: impl Into<String>, amount: Amount) -> Self {
        Self {
            date,
            currency: currency.into(),
            amount,
            meta: Metadata::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_posting_weight() {
        let plain = Posting::new("Assets:Cash", Amount::new(dec!(10.00), "USD"));
        assert_eq!(plain.weight(), Amount::new(dec!(10.00), "USD"));

        let priced = Posting::new("Assets:Cash", Amount::new(dec!(100.00), "CAD"))
            .with_price(Amount::new(dec!(0.75), "USD"));
        assert_eq!(priced.weight(), Amount::new(dec!(75.0000), "USD"));

        let held = Posting::new("Assets:Invest", Amount::new(dec!(2), "HOOL"))
            .with_cost(Cost::new(dec!(500), "USD"))
            .with_price(Amount::new(dec!(600), "USD"));
        assert_eq!(held.weight(), Amount::new(dec!(1000), "USD"));
    }

    #[test]
    fn test_sort_directives() {
        let mut directives = vec![
            Directive::Close(Close::new(date(2024, 1, 1), "Assets:Cash")),
            Directive::Transaction(Transaction::new(date(2024, 1, 1), "x")),
            Directive::Open(Open::new(date(2024, 1, 1), "Assets:Cash")),
            Directive::Note(Note::new(date(2023, 12, 31), "Assets:Cash", "early")),
        ];
        sort_directives(&mut directives);
        let types: Vec<_> = directives.iter().map(Directive::type_name).collect();
        assert_eq!(types, vec!["note", "open", "transaction", "close"]);
    }
}
