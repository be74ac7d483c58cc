// In-process store. Clones share the same state, so one handle can be given
// to a component while another stays behind for inspection.

use super::{AppendLog, KeyValueStore, StoreError};
use crate::ledger::{LedgerEntry, LedgerEvent};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, String>,
    log: Vec<LedgerEntry>,
    events: Vec<LedgerEvent>,
    fail_reads: bool,
    fail_writes: bool,
    fail_appends: bool,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Rc<RefCell<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a broken backing store for reads
    pub fn fail_reads(&self, fail: bool) {
        self.inner.borrow_mut().fail_reads = fail;
    }

    /// Simulate a broken backing store for writes
    pub fn fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }

    /// Fail only `AppendLog::append`, leaving every other write working
    pub fn fail_appends(&self, fail: bool) {
        self.inner.borrow_mut().fail_appends = fail;
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.inner.borrow().values.get(key).cloned()
    }

    pub fn log_entries(&self) -> Vec<LedgerEntry> {
        self.inner.borrow().log.clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.inner
            .borrow()
            .events
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.inner.borrow().fail_reads {
            return Err(StoreError::Unavailable("memory store read disabled".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.inner.borrow().fail_writes {
            return Err(StoreError::Unavailable("memory store write disabled".into()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_read()?;
        Ok(self.value(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner
            .borrow_mut()
            .values
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl AppendLog for MemoryStore {
    fn append(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.check_write()?;
        if self.inner.borrow().fail_appends {
            return Err(StoreError::Unavailable("memory store append disabled".into()));
        }
        self.inner.borrow_mut().log.push(entry.clone());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        self.check_read()?;
        Ok(self.log_entries())
    }

    fn overwrite_all(&mut self, entries: &[LedgerEntry]) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.borrow_mut().log = entries.to_vec();
        Ok(())
    }

    fn record_event(&mut self, event: &LedgerEvent) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.borrow_mut().events.push(event.clone());
        Ok(())
    }
}
