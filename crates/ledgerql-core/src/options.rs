//! Ledger-wide options that influence query execution.
//!
//! Only the options the query engine reads are modelled: the account-type
//! roots and the equity accounts that receive synthesized entries when a
//! query opens, closes or clears a period.

use thiserror::Error;

/// Error returned by [`Options::set`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
    /// The option name is not one the engine knows.
    #[error("unknown option \"{0}\"")]
    Unknown(String),
    /// The value is empty.
    #[error("empty value for option \"{0}\"")]
    EmptyValue(String),
}

/// Ledger options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Operating currencies, in declaration order.
    pub operating_currency: Vec<String>,
    /// Root of asset accounts.
    pub name_assets: String,
    /// Root of liability accounts.
    pub name_liabilities: String,
    /// Root of equity accounts.
    pub name_equity: String,
    /// Root of income accounts.
    pub name_income: String,
    /// Root of expense accounts.
    pub name_expenses: String,
    /// Receives balance-sheet balances summarized by `OPEN ON`.
    pub account_previous_balances: String,
    /// Receives income and expenses summarized by `OPEN ON`.
    pub account_previous_earnings: String,
    /// Receives conversions summarized by `OPEN ON`.
    pub account_previous_conversions: String,
    /// Receives income and expenses transferred by `CLEAR`.
    pub account_current_earnings: String,
    /// Receives the conversion residual booked by `CLOSE`.
    pub account_current_conversions: String,
    /// Currency used to price conversion entries.
    pub conversion_currency: String,
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl Options {
    /// Create options with the standard defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            operating_currency: Vec::new(),
            name_assets: "Assets".to_string(),
            name_liabilities: "Liabilities".to_string(),
            name_equity: "Equity".to_string(),
            name_income: "Income".to_string(),
            name_expenses: "Expenses".to_string(),
            account_previous_balances: "Equity:Opening-Balances".to_string(),
            account_previous_earnings: "Equity:Earnings:Previous".to_string(),
            account_previous_conversions: "Equity:Conversions:Previous".to_string(),
            account_current_earnings: "Equity:Earnings:Current".to_string(),
            account_current_conversions: "Equity:Conversions:Current".to_string(),
            conversion_currency: "NOTHING".to_string(),
        }
    }

    /// Set an option from its textual form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), OptionError> {
        if value.is_empty() {
            return Err(OptionError::EmptyValue(key.to_string()));
        }
        let value = value.to_string();
        match key {
            "operating_currency" => self.operating_currency.push(value),
            "name_assets" => self.name_assets = value,
            "name_liabilities" => self.name_liabilities = value,
            "name_equity" => self.name_equity = value,
            "name_income" => self.name_income = value,
            "name_expenses" => self.name_expenses = value,
            "account_previous_balances" => self.account_previous_balances = value,
            "account_previous_earnings" => self.account_previous_earnings = value,
            "account_previous_conversions" => self.account_previous_conversions = value,
            "account_current_earnings" => self.account_current_earnings = value,
            "account_current_conversions" => self.account_current_conversions = value,
            "conversion_currency" => self.conversion_currency = value,
            _ => return Err(OptionError::Unknown(key.to_string())),
        }
        Ok(())
    }

    /// Whether the account belongs to the income or expenses roots.
    #[must_use]
    pub fn is_income_statement_account(&self, account: &str) -> bool {
        is_under(account, &self.name_income) || is_under(account, &self.name_expenses)
    }
}

fn is_under(account: &str, root: &str) -> bool {
    account == root
        || account
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with(':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::new();
        assert_eq!(opts.name_assets, "Assets");
        assert_eq!(opts.account_current_earnings, "Equity:Earnings:Current");
        assert!(opts.operating_currency.is_empty());
    }

    #[test]
    fn test_set_options() {
        let mut opts = Options::new();
        opts.set("operating_currency", "USD").unwrap();
        opts.set("operating_currency", "EUR").unwrap();
        opts.set("name_income", "Revenue").unwrap();
        assert_eq!(opts.operating_currency, vec!["USD", "EUR"]);
        assert!(opts.is_income_statement_account("Revenue:Salary"));
        assert!(!opts.is_income_statement_account("Income:Salary"));
    }

    #[test]
    fn test_set_errors() {
        let mut opts = Options::new();
        assert_eq!(
            opts.set("title", "x"),
            Err(OptionError::Unknown("title".to_string()))
        );
        assert!(matches!(
            opts.set("name_assets", ""),
            Err(OptionError::EmptyValue(_))
        ));
    }

    #[test]
    fn test_root_boundary() {
        let opts = Options::new();
        assert!(opts.is_income_statement_account("Expenses"));
        assert!(!opts.is_income_statement_account("ExpensesX:Food"));
    }
}
