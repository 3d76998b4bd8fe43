//! Native text rendering of directives.
//!
//! This is the form `PRINT` emits: one directive per block, postings
//! indented with their amounts aligned on a configurable column.

use std::fmt::{self, Write};

use crate::{Amount, Directive, MetaValue, Metadata, Posting, Transaction};

/// Formatter configuration.
#[derive(Debug, Clone)]
pub struct FormatConfig {
    /// Column at which posting amounts end their number part (default: 60).
    pub amount_column: usize,
    /// Indentation for postings and entry metadata.
    pub indent: String,
    /// Indentation for posting metadata.
    pub meta_indent: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            amount_column: 60,
            indent: "  ".to_string(),
            meta_indent: "    ".to_string(),
        }
    }
}

/// Format a directive to a string.
pub fn format_directive(directive: &Directive, config: &FormatConfig) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_directive(&mut out, directive, config);
    out
}

/// Write a directive in its native text form, terminated by a newline.
pub fn write_directive(
    out: &mut impl Write,
    directive: &Directive,
    config: &FormatConfig,
) -> fmt::Result {
    match directive {
        Directive::Transaction(txn) => write_transaction(out, txn, config),
        Directive::Open(open) => {
            write!(out, "{} open {}", open.date, open.account)?;
            if !open.currencies.is_empty() {
                write!(out, " {}", open.currencies.join(","))?;
            }
            writeln!(out)?;
            write_meta(out, &open.meta, &config.indent)
        }
        Directive::Close(close) => {
            writeln!(out, "{} close {}", close.date, close.account)?;
            write_meta(out, &close.meta, &config.indent)
        }
        Directive::Commodity(comm) => {
            writeln!(out, "{} commodity {}", comm.date, comm.currency)?;
            write_meta(out, &comm.meta, &config.indent)
        }
        Directive::Balance(bal) => {
            writeln!(out, "{} balance {}  {}", bal.date, bal.account, bal.amount)?;
            write_meta(out, &bal.meta, &config.indent)
        }
        Directive::Note(note) => {
            writeln!(
                out,
                "{} note {} \"{}\"",
                note.date,
                note.account,
                escape_string(&note.comment)
            )?;
            write_meta(out, &note.meta, &config.indent)
        }
        Directive::Event(event) => {
            writeln!(
                out,
                "{} event \"{}\" \"{}\"",
                event.date,
                escape_string(&event.event_type),
                escape_string(&event.value)
            )?;
            write_meta(out, &event.meta, &config.indent)
        }
        Directive::Price(price) => {
            writeln!(out, "{} price {} {}", price.date, price.currency, price.amount)?;
            write_meta(out, &price.meta, &config.indent)
        }
    }
}

fn write_transaction(
    out: &mut impl Write,
    txn: &Transaction,
    config: &FormatConfig,
) -> fmt::Result {
    write!(out, "{} {}", txn.date, txn.flag)?;
    if let Some(payee) = &txn.payee {
        write!(out, " \"{}\"", escape_string(payee))?;
    }
    write!(out, " \"{}\"", escape_string(&txn.narration))?;
    for tag in &txn.tags {
        write!(out, " #{tag}")?;
    }
    for link in &txn.links {
        write!(out, " ^{link}")?;
    }
    writeln!(out)?;
    write_meta(out, &txn.meta, &config.indent)?;
    for posting in &txn.postings {
        writeln!(out, "{}", format_posting(posting, config))?;
        write_meta(out, &posting.meta, &config.meta_indent)?;
    }
    Ok(())
}

/// Format a posting line with its number aligned on the amount column.
fn format_posting(posting: &Posting, config: &FormatConfig) -> String {
    let mut line = config.indent.clone();
    if let Some(flag) = posting.flag {
        line.push(flag);
        line.push(' ');
    }
    line.push_str(&posting.account);

    let number = posting.units.number.to_string();
    let target = config.amount_column.saturating_sub(number.len());
    if line.len() + 2 <= target {
        line.push_str(&" ".repeat(target - line.len()));
    } else {
        line.push_str("  ");
    }
    line.push_str(&format_amount(&posting.units));

    if let Some(cost) = &posting.cost {
        line.push(' ');
        line.push_str(&cost.to_string());
    }
    if let Some(price) = &posting.price {
        line.push_str(" @ ");
        line.push_str(&format_amount(price));
    }
    line
}

fn write_meta(out: &mut impl Write, meta: &Metadata, indent: &str) -> fmt::Result {
    for (key, value) in meta {
        writeln!(out, "{indent}{key}: {}", format_meta_value(value))?;
    }
    Ok(())
}

fn format_amount(amount: &Amount) -> String {
    format!("{} {}", amount.number, amount.currency)
}

/// Format a metadata value the way it is written in a ledger file.
pub fn format_meta_value(value: &MetaValue) -> String {
    match value {
        MetaValue::String(s) => format!("\"{}\"", escape_string(s)),
        MetaValue::Account(a) | MetaValue::Currency(a) => a.clone(),
        MetaValue::Tag(t) => format!("#{t}"),
        MetaValue::Date(d) => d.to_string(),
        MetaValue::Number(n) => n.to_string(),
        MetaValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        MetaValue::Amount(a) => format_amount(a),
        MetaValue::None => String::new(),
    }
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
