// 🔍 Change Detector - has this meal's menu changed since we last posted it?
// One SHA-256 fingerprint per meal type, overwritten only after a successful send

use crate::menu::{MealType, MenuSnapshot};
use crate::store::{KeyValueStore, StoreError};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, warn};

/// Hex digest of a snapshot's canonical text. Compared, never displayed as menu.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(snapshot: &MenuSnapshot) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(snapshot.canonical_text().as_bytes());
        Fingerprint(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, enough for log lines
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct ChangeDetector {
    store: Box<dyn KeyValueStore>,
}

impl ChangeDetector {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        ChangeDetector { store }
    }

    /// Last committed fingerprint. A store failure reads as "none" so the
    /// caller republishes instead of going quiet.
    pub fn last_committed(&self, meal: MealType) -> Option<Fingerprint> {
        match self.store.get(meal.as_key()) {
            Ok(value) => value.map(Fingerprint),
            Err(e) => {
                warn!(meal = %meal, error = %e, "Fingerprint store unreadable, treating as changed");
                None
            }
        }
    }

    /// Pure comparison against the stored fingerprint
    pub fn has_changed(&self, meal: MealType, snapshot: &MenuSnapshot) -> bool {
        let current = Fingerprint::of(snapshot);
        let changed = self.last_committed(meal).as_ref() != Some(&current);
        debug!(meal = %meal, fingerprint = current.short(), changed, "Compared fingerprints");
        changed
    }

    /// Remember `snapshot` as published. Call only after the send succeeded.
    pub fn commit(&mut self, meal: MealType, snapshot: &MenuSnapshot) -> Result<Fingerprint, StoreError> {
        let fingerprint = Fingerprint::of(snapshot);
        self.store.set(meal.as_key(), fingerprint.as_str())?;
        Ok(fingerprint)
    }
}
