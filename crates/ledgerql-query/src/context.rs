//! Row contexts and the slot allocator.
//!
//! The statement compiler hands out [`Slot`]s from an [`Allocator`]; the
//! engine creates one [`RowContext`] per output row (or per group) sized by
//! that allocator. Compiled nodes address their storage by slot and never by
//! name.

use ledgerql_core::{Directive, Inventory, Options, Posting};

use crate::aggregate::{Accumulator, AggregateKind};
use crate::error::ArithmeticError;
use crate::types::{DataType, Value};

/// Index of one storage cell in a [`RowContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(usize);

impl Slot {
    /// Position of the slot in the context.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Hands out contiguous slot ids for one compiled statement.
#[derive(Debug, Clone, Default)]
pub struct Allocator {
    size: usize,
}

impl Allocator {
    /// Create an allocator with no slots.
    pub const fn new() -> Self {
        Self { size: 0 }
    }

    /// Reserve a new slot. Ids are never reused.
    pub fn allocate(&mut self) -> Slot {
        let slot = Slot(self.size);
        self.size += 1;
        slot
    }

    /// Number of slots handed out so far.
    pub const fn len(&self) -> usize {
        self.size
    }

    /// Whether no slot has been handed out.
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// A fresh context with every slot empty.
    pub fn create_store(&self) -> RowContext {
        RowContext {
            slots: vec![SlotState::Empty; self.size],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SlotState {
    Empty,
    Value(Value),
    Accumulator(Accumulator),
}

/// Per-row (or per-group) scratch storage addressed by [`Slot`].
#[derive(Debug, Clone, PartialEq)]
pub struct RowContext {
    slots: Vec<SlotState>,
}

impl RowContext {
    /// The value stored in `slot`, if any.
    pub fn get(&self, slot: Slot) -> Option<&Value> {
        match self.slots.get(slot.0) {
            Some(SlotState::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// The value stored in `slot`, or null.
    pub fn value(&self, slot: Slot) -> Value {
        self.get(slot).cloned().unwrap_or(Value::Null)
    }

    /// Store a value, replacing whatever the slot held.
    pub fn set(&mut self, slot: Slot, value: Value) {
        if let Some(state) = self.slots.get_mut(slot.0) {
            *state = SlotState::Value(value);
        }
    }

    /// Feed one operand value to the accumulator in `slot`, creating it on
    /// first use.
    pub fn update(
        &mut self,
        slot: Slot,
        kind: AggregateKind,
        operand_type: DataType,
        value: Value,
        expr: &str,
    ) -> Result<(), ArithmeticError> {
        let Some(state) = self.slots.get_mut(slot.0) else {
            return Ok(());
        };
        if !matches!(state, SlotState::Accumulator(_)) {
            *state = SlotState::Accumulator(Accumulator::new(kind, operand_type));
        }
        match state {
            SlotState::Accumulator(acc) => acc.update(value, expr),
            _ => Ok(()),
        }
    }

    /// Ensure `slot` holds an accumulator even if no row reached it.
    pub fn prepare(&mut self, slot: Slot, kind: AggregateKind, operand_type: DataType) {
        if let Some(state) = self.slots.get_mut(slot.0) {
            if !matches!(state, SlotState::Accumulator(_)) {
                *state = SlotState::Accumulator(Accumulator::new(kind, operand_type));
            }
        }
    }

    /// Replace every accumulator by its finished value.
    pub fn finalize(&mut self) {
        for state in &mut self.slots {
            if !matches!(state, SlotState::Accumulator(_)) {
                continue;
            }
            if let SlotState::Accumulator(acc) = std::mem::replace(state, SlotState::Empty) {
                *state = SlotState::Value(acc.finish());
            }
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the context has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// The data one row of a query reads: an entry, optionally one of its
/// postings, and the running balance of the posting's account.
#[derive(Debug, Clone)]
pub struct Row<'a> {
    /// Entry the row belongs to.
    pub entry: Option<&'a Directive>,
    /// Posting, for posting-level rows.
    pub posting: Option<&'a Posting>,
    /// Running balance after this posting, when the query reads it.
    pub balance: Option<Inventory>,
    /// Ledger options.
    pub options: &'a Options,
}

impl<'a> Row<'a> {
    /// A posting-level row.
    pub const fn posting(entry: &'a Directive, posting: &'a Posting, options: &'a Options) -> Self {
        Self {
            entry: Some(entry),
            posting: Some(posting),
            balance: None,
            options,
        }
    }

    /// An entry-level row.
    pub const fn entry(entry: &'a Directive, options: &'a Options) -> Self {
        Self {
            entry: Some(entry),
            posting: None,
            balance: None,
            options,
        }
    }

    /// A row with no data; every column reads as null.
    pub const fn empty(options: &'a Options) -> Self {
        Self {
            entry: None,
            posting: None,
            balance: None,
            options,
        }
    }

    /// Attach the running balance.
    #[must_use]
    pub fn with_balance(mut self, balance: Inventory) -> Self {
        self.balance = Some(balance);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_hands_out_contiguous_ids() {
        let mut allocator = Allocator::new();
        assert!(allocator.is_empty());
        let ids: Vec<usize> = (0..4).map(|_| allocator.allocate().index()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(allocator.len(), 4);
    }

    #[test]
    fn test_fresh_store_is_empty() {
        let mut allocator = Allocator::new();
        let a = allocator.allocate();
        let b = allocator.allocate();
        let store = allocator.create_store();
        assert_eq!(store.len(), 2);
        assert!(store.get(a).is_none());
        assert_eq!(store.value(b), Value::Null);
    }

    #[test]
    fn test_set_and_get() {
        let mut allocator = Allocator::new();
        let slot = allocator.allocate();
        let mut store = allocator.create_store();
        store.set(slot, Value::Integer(7));
        assert_eq!(store.get(slot), Some(&Value::Integer(7)));
    }

    #[test]
    fn test_accumulators_finalize() {
        let mut allocator = Allocator::new();
        let sum = allocator.allocate();
        let count = allocator.allocate();
        let plain = allocator.allocate();
        let mut store = allocator.create_store();
        for n in [1, 2, 3] {
            store
                .update(sum, AggregateKind::Sum, DataType::Int, Value::Integer(n), "sum(x)")
                .unwrap();
        }
        store.prepare(count, AggregateKind::Count, DataType::Int);
        store.set(plain, Value::String("kept".to_string()));
        assert!(store.get(sum).is_none());

        store.finalize();
        assert_eq!(store.value(sum), Value::Integer(6));
        assert_eq!(store.value(count), Value::Integer(0));
        assert_eq!(store.value(plain), Value::String("kept".to_string()));
    }

    #[test]
    fn test_stores_do_not_share_state() {
        let mut allocator = Allocator::new();
        let slot = allocator.allocate();
        let mut first = allocator.create_store();
        let second = allocator.create_store();
        first.set(slot, Value::Boolean(true));
        assert!(second.get(slot).is_none());
    }
}
