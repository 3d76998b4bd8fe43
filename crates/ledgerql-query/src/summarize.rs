//! Entry pre-processing for the FROM clause.
//!
//! `OPEN ON`, `CLOSE` and `CLEAR` rewrite the entry stream before any row
//! is produced. Original entries are passed through borrowed; only the
//! synthesized summarization, conversion and transfer transactions are
//! owned.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

use rust_decimal::Decimal;

use ledgerql_core::{
    Amount, Directive, Inventory, NaiveDate, Options, Position, Posting, Transaction,
};

use crate::ast::CloseSpec;
use crate::catalog::position_of;
use crate::context::{Allocator, Row};
use crate::error::ArithmeticError;
use crate::statement::CompiledFrom;

/// Flag of transactions created by `OPEN ON`.
pub const FLAG_SUMMARIZE: char = 'S';
/// Flag of the transaction created by `CLOSE`.
pub const FLAG_CONVERSIONS: char = 'C';
/// Flag of transactions created by `CLEAR`.
pub const FLAG_TRANSFER: char = 'T';

/// Apply a compiled FROM clause to a date-ordered entry list.
///
/// `OPEN`, `CLOSE` and `CLEAR` run in that order, then the FROM predicate
/// keeps the entries for which it is truthy. Without a FROM clause every
/// entry passes through unchanged.
pub fn filter_entries<'a>(
    from: Option<&CompiledFrom>,
    entries: &'a [Directive],
    options: &Options,
) -> Result<Vec<Cow<'a, Directive>>, ArithmeticError> {
    let mut working: Vec<Cow<'a, Directive>> = entries.iter().map(Cow::Borrowed).collect();
    let Some(from) = from else {
        return Ok(working);
    };

    if let Some(date) = from.open {
        working = open(working, date, options);
    }
    if let Some(spec) = from.close {
        working = close(working, spec, options);
    }
    if from.clear {
        working = clear(working, options);
    }

    if let Some(filter) = &from.filter {
        let ctx = Allocator::new().create_store();
        let mut kept = Vec::with_capacity(working.len());
        for entry in working {
            if filter.evaluate(&Row::entry(&entry, options), &ctx)?.truthy() {
                kept.push(entry);
            }
        }
        working = kept;
    }

    tracing::debug!("FROM clause kept {} of {} entries", working.len(), entries.len());
    Ok(working)
}

/// Per-account balances of the transactions in `entries`.
fn account_balances<'e>(
    entries: impl IntoIterator<Item = &'e Directive>,
) -> BTreeMap<String, Inventory> {
    let mut balances: BTreeMap<String, Inventory> = BTreeMap::new();
    for txn in entries.into_iter().filter_map(Directive::as_transaction) {
        for posting in &txn.postings {
            balances
                .entry(posting.account.clone())
                .or_default()
                .add(position_of(posting));
        }
    }
    balances
}

/// Sum of all balances valued at cost; non-zero only when prices converted
/// between currencies.
fn conversion_residual(balances: &BTreeMap<String, Inventory>) -> Inventory {
    balances
        .values()
        .flat_map(Inventory::positions)
        .map(Position::at_cost)
        .collect()
}

fn posting_for(account: &str, position: &Position) -> Posting {
    let posting = Posting::new(account, position.units.clone());
    match &position.cost {
        Some(cost) => posting.with_cost(cost.clone()),
        None => posting,
    }
}

fn last_date(entries: &[Cow<'_, Directive>]) -> Option<NaiveDate> {
    entries.last().map(|entry| entry.date())
}

/// Replace everything before `date` by one opening transaction per account.
fn open<'a>(
    entries: Vec<Cow<'a, Directive>>,
    date: NaiveDate,
    options: &Options,
) -> Vec<Cow<'a, Directive>> {
    let split = entries.partition_point(|entry| entry.date() < date);
    let mut before = entries;
    let after = before.split_off(split);

    let mut balances = account_balances(before.iter().map(|entry| &**entry));
    let residual = conversion_residual(&balances);
    if !residual.is_empty() {
        balances
            .entry(options.account_previous_conversions.clone())
            .or_default()
            .merge(&residual.neg());
    }

    let mut earnings = Inventory::new();
    balances.retain(|account, balance| {
        if options.is_income_statement_account(account) {
            earnings.merge(&balance.at_cost());
            false
        } else {
            true
        }
    });
    if !earnings.is_empty() {
        balances
            .entry(options.account_previous_earnings.clone())
            .or_default()
            .merge(&earnings);
    }

    let closed: HashSet<&str> = before
        .iter()
        .filter_map(|entry| match &**entry {
            Directive::Close(close) => Some(close.account.as_str()),
            _ => None,
        })
        .collect();
    let opens: Vec<Cow<'a, Directive>> = before
        .iter()
        .filter(|entry| match &***entry {
            Directive::Open(open) => !closed.contains(open.account.as_str()),
            _ => false,
        })
        .cloned()
        .collect();

    let summary_date = date.pred_opt().unwrap_or(date);
    let summaries = balances
        .iter()
        .filter(|(_, balance)| !balance.is_empty())
        .map(|(account, balance)| {
            let mut txn = Transaction::new(
                summary_date,
                format!("Opening balance for '{account}' (Summarization)"),
            )
            .with_flag(FLAG_SUMMARIZE);
            for position in balance.positions() {
                txn = txn
                    .with_posting(posting_for(account, position))
                    .with_posting(Posting::new(
                        options.account_previous_balances.as_str(),
                        -&position.at_cost(),
                    ));
            }
            Cow::Owned(Directive::Transaction(txn))
        });

    tracing::trace!("summarized {} entries before {}", before.len(), date);
    opens.into_iter().chain(summaries).chain(after).collect()
}

/// Drop entries on or after the close date and book the conversion residual.
fn close<'a>(
    mut entries: Vec<Cow<'a, Directive>>,
    spec: CloseSpec,
    options: &Options,
) -> Vec<Cow<'a, Directive>> {
    let conversion_date = match spec {
        CloseSpec::On(date) => {
            let split = entries.partition_point(|entry| entry.date() < date);
            entries.truncate(split);
            Some(date.pred_opt().unwrap_or(date))
        }
        CloseSpec::Undated => last_date(&entries),
    };
    let Some(conversion_date) = conversion_date else {
        return entries;
    };

    let residual = conversion_residual(&account_balances(entries.iter().map(|entry| &**entry)));
    if residual.is_empty() {
        return entries;
    }
    let price = Amount::new(Decimal::ZERO, options.conversion_currency.as_str());
    let mut txn = Transaction::new(conversion_date, format!("Conversion for ({residual})"))
        .with_flag(FLAG_CONVERSIONS);
    for position in residual.positions() {
        txn = txn.with_posting(
            Posting::new(options.account_current_conversions.as_str(), -&position.units)
                .with_price(price.clone()),
        );
    }
    entries.push(Cow::Owned(Directive::Transaction(txn)));
    entries
}

/// Move every income and expense balance to current earnings.
fn clear<'a>(mut entries: Vec<Cow<'a, Directive>>, options: &Options) -> Vec<Cow<'a, Directive>> {
    let Some(date) = last_date(&entries) else {
        return entries;
    };
    let balances = account_balances(entries.iter().map(|entry| &**entry));
    let transfers: Vec<Cow<'a, Directive>> = balances
        .iter()
        .filter(|(account, balance)| {
            options.is_income_statement_account(account) && !balance.is_empty()
        })
        .map(|(account, balance)| {
            let mut txn = Transaction::new(
                date,
                format!("Transfer balance for '{account}' (Transfer balance)"),
            )
            .with_flag(FLAG_TRANSFER);
            for position in balance.positions() {
                txn = txn
                    .with_posting(posting_for(account, &position.neg()))
                    .with_posting(Posting::new(
                        options.account_current_earnings.as_str(),
                        position.at_cost(),
                    ));
            }
            Cow::Owned(Directive::Transaction(txn))
        })
        .collect();
    entries.extend(transfers);
    entries
}
