// 📒 Message Ledger - which posted message represents each meal type
//
// The append log is the source of truth. "Current per meal type" is a view
// derived from append order every time the log is loaded; history is only
// rewritten by full compaction (retire_previous) or purge (purge_all).

use crate::channel::{Channel, MessageId};
use crate::menu::MealType;
use crate::store::{AppendLog, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

// ============================================================================
// RECORDS
// ============================================================================

/// One line of the append log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub message_id: MessageId,
    pub meal_type: MealType,
}

impl LedgerEntry {
    pub fn new(message_id: MessageId, meal_type: MealType) -> Self {
        LedgerEntry { message_id, meal_type }
    }
}

/// A log entry together with its position in append order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedMessageRecord {
    /// Position in the log (0 = oldest)
    pub seq: usize,
    pub message_id: MessageId,
    pub meal_type: MealType,
}

impl PublishedMessageRecord {
    fn entry(&self) -> LedgerEntry {
        LedgerEntry::new(self.message_id.clone(), self.meal_type)
    }
}

/// Audit trail entry (stored only by backends that keep one)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub meal_type: MealType,
    pub message_id: MessageId,
    pub data: serde_json::Value,
}

impl LedgerEvent {
    pub fn new(
        event_type: &str,
        meal_type: MealType,
        message_id: &MessageId,
        data: serde_json::Value,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            meal_type,
            message_id: message_id.clone(),
            data,
        }
    }
}

/// Outcome of retiring the previous message of a meal type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retirement {
    pub message_id: MessageId,
    /// False when the channel refused or errored; the record is dropped anyway
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub attempted: usize,
    pub deleted: usize,
    pub failed: usize,
}

// ============================================================================
// DERIVED VIEW
// ============================================================================

/// Ordered history plus the derived "latest per meal type" index
#[derive(Debug, Clone, Default)]
pub struct LedgerView {
    pub records: Vec<PublishedMessageRecord>,
    latest: BTreeMap<MealType, usize>,
}

impl LedgerView {
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        let records: Vec<PublishedMessageRecord> = entries
            .into_iter()
            .enumerate()
            .map(|(seq, entry)| PublishedMessageRecord {
                seq,
                message_id: entry.message_id,
                meal_type: entry.meal_type,
            })
            .collect();

        // Later records overwrite earlier ones: append order decides
        let mut latest = BTreeMap::new();
        for record in &records {
            latest.insert(record.meal_type, record.seq);
        }

        LedgerView { records, latest }
    }

    pub fn latest(&self, meal: MealType) -> Option<&PublishedMessageRecord> {
        self.latest.get(&meal).map(|&seq| &self.records[seq])
    }

    /// Current records, one per meal type, in append order
    pub fn current(&self) -> Vec<&PublishedMessageRecord> {
        let mut current: Vec<&PublishedMessageRecord> =
            self.latest.values().map(|&seq| &self.records[seq]).collect();
        current.sort_by_key(|r| r.seq);
        current
    }

    /// Scan backward for the most recent record of `meal` that is not `current`
    pub fn previous(&self, meal: MealType, current: &MessageId) -> Option<&PublishedMessageRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.meal_type == meal && &r.message_id != current)
    }

    /// Entries that survive compaction
    pub fn compacted(&self) -> Vec<LedgerEntry> {
        self.current().into_iter().map(|r| r.entry()).collect()
    }

    pub fn is_current(&self, record: &PublishedMessageRecord) -> bool {
        self.latest.get(&record.meal_type) == Some(&record.seq)
    }
}

// ============================================================================
// LEDGER
// ============================================================================

pub struct MessageLedger {
    log: Box<dyn AppendLog>,
}

impl MessageLedger {
    pub fn new(log: Box<dyn AppendLog>) -> Self {
        MessageLedger { log }
    }

    pub fn load(&self) -> Result<LedgerView, StoreError> {
        Ok(LedgerView::from_entries(self.log.read_all()?))
    }

    pub fn current(&self) -> Result<Vec<PublishedMessageRecord>, StoreError> {
        let view = self.load()?;
        Ok(view.current().into_iter().cloned().collect())
    }

    /// Append a freshly published message. Deletes nothing.
    pub fn record_published(&mut self, meal: MealType, message_id: &MessageId) -> Result<(), StoreError> {
        self.log.append(&LedgerEntry::new(message_id.clone(), meal))?;
        self.note(LedgerEvent::new("published", meal, message_id, serde_json::json!({})));
        Ok(())
    }

    /// Delete the message that `current` superseded, then compact.
    ///
    /// The immediately preceding record of `meal` is the retirement target.
    /// Older leftovers (a crash between append and compaction) get a best
    /// effort delete before compaction drops them. Compaction runs whether
    /// or not any delete succeeded.
    pub fn retire_previous(
        &mut self,
        meal: MealType,
        current: &MessageId,
        channel: &dyn Channel,
    ) -> Result<Option<Retirement>, StoreError> {
        let view = self.load()?;

        let retirement = match view.previous(meal, current) {
            Some(previous) => {
                let deleted = match channel.delete(&previous.message_id) {
                    Ok(()) => {
                        info!(meal = %meal, message_id = %previous.message_id, "Previous message deleted");
                        true
                    }
                    Err(e) => {
                        warn!(meal = %meal, message_id = %previous.message_id, error = %e,
                            "Failed to delete previous message, dropping it from the ledger anyway");
                        false
                    }
                };
                self.note(LedgerEvent::new(
                    if deleted { "retired" } else { "retire_failed" },
                    meal,
                    &previous.message_id,
                    serde_json::json!({ "superseded_by": current.as_str() }),
                ));
                Some(Retirement {
                    message_id: previous.message_id.clone(),
                    deleted,
                })
            }
            None => None,
        };

        let target = retirement.as_ref().map(|r| &r.message_id);
        let mut swept = Vec::new();
        for record in view
            .records
            .iter()
            .filter(|r| !view.is_current(r) && Some(&r.message_id) != target)
        {
            let deleted = match channel.delete(&record.message_id) {
                Ok(()) => true,
                Err(e) => {
                    warn!(meal = %record.meal_type, message_id = %record.message_id, error = %e,
                        "Failed to delete orphaned message");
                    false
                }
            };
            warn!(meal = %record.meal_type, message_id = %record.message_id, deleted,
                "Sweeping orphaned ledger record");
            swept.push((record, deleted));
        }

        self.log.overwrite_all(&view.compacted())?;

        for (record, deleted) in swept {
            self.note(LedgerEvent::new(
                "swept",
                record.meal_type,
                &record.message_id,
                serde_json::json!({ "deleted": deleted }),
            ));
        }

        Ok(retirement)
    }

    /// Delete every tracked message (best effort) and clear the log
    pub fn purge_all(&mut self, channel: &dyn Channel) -> Result<PurgeReport, StoreError> {
        let view = self.load()?;
        let mut report = PurgeReport::default();

        for record in &view.records {
            report.attempted += 1;
            match channel.delete(&record.message_id) {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(meal = %record.meal_type, message_id = %record.message_id, error = %e,
                        "Failed to delete message during purge");
                }
            }
        }

        self.log.overwrite_all(&[])?;

        for record in &view.records {
            self.note(LedgerEvent::new("purged", record.meal_type, &record.message_id, serde_json::json!({})));
        }

        info!(
            attempted = report.attempted,
            deleted = report.deleted,
            failed = report.failed,
            "Ledger purged"
        );
        Ok(report)
    }

    fn note(&mut self, event: LedgerEvent) {
        if let Err(e) = self.log.record_event(&event) {
            warn!(event = %event.event_type, error = %e, "Failed to record ledger event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::fake::RecordingChannel;
    use crate::store::MemoryStore;

    fn id(n: i64) -> MessageId {
        MessageId::from(n)
    }

    fn ledger_with(store: &MemoryStore, entries: &[(i64, MealType)]) -> MessageLedger {
        let mut ledger = MessageLedger::new(Box::new(store.clone()));
        for (n, meal) in entries {
            ledger.record_published(*meal, &id(*n)).unwrap();
        }
        ledger
    }

    #[test]
    fn test_retire_previous_deletes_only_predecessor() {
        let store = MemoryStore::new();
        let channel = RecordingChannel::new();
        let mut ledger = ledger_with(&store, &[(1, MealType::Lunch), (2, MealType::Lunch)]);

        let retired = ledger.retire_previous(MealType::Lunch, &id(2), &channel).unwrap();

        assert_eq!(channel.deleted(), vec![id(1)]);
        assert_eq!(retired, Some(Retirement { message_id: id(1), deleted: true }));
        assert_eq!(
            store.log_entries(),
            vec![LedgerEntry::new(id(2), MealType::Lunch)]
        );

        println!("✅ Retire previous test PASSED");
    }

    #[test]
    fn test_retire_previous_ignores_other_meal() {
        let store = MemoryStore::new();
        let channel = RecordingChannel::new();
        let mut ledger = ledger_with(&store, &[(1, MealType::Dinner), (2, MealType::Lunch)]);

        let retired = ledger.retire_previous(MealType::Lunch, &id(2), &channel).unwrap();

        assert_eq!(retired, None);
        assert!(channel.deleted().is_empty());
        assert_eq!(store.log_entries().len(), 2, "both are current for their meal");
    }

    #[test]
    fn test_retire_previous_compacts_even_when_delete_fails() {
        let store = MemoryStore::new();
        let channel = RecordingChannel::new();
        channel.fail_delete_of(&id(1));
        let mut ledger = ledger_with(&store, &[(1, MealType::Lunch), (2, MealType::Lunch)]);

        let retired = ledger.retire_previous(MealType::Lunch, &id(2), &channel).unwrap();

        assert_eq!(retired, Some(Retirement { message_id: id(1), deleted: false }));
        assert_eq!(store.log_entries(), vec![LedgerEntry::new(id(2), MealType::Lunch)]);
    }

    #[test]
    fn test_retire_previous_with_crash_backlog() {
        // 1 and 2 left behind by a crash before compaction
        let store = MemoryStore::new();
        let channel = RecordingChannel::new();
        let mut ledger = ledger_with(
            &store,
            &[
                (1, MealType::Lunch),
                (5, MealType::Dinner),
                (2, MealType::Lunch),
                (3, MealType::Lunch),
            ],
        );

        let retired = ledger.retire_previous(MealType::Lunch, &id(3), &channel).unwrap();

        // Append order, not id value, decides "most recent"; 1 is swept after
        assert_eq!(channel.deleted(), vec![id(2), id(1)]);
        assert_eq!(retired.unwrap().message_id, id(2));
        assert_eq!(
            store.log_entries(),
            vec![
                LedgerEntry::new(id(5), MealType::Dinner),
                LedgerEntry::new(id(3), MealType::Lunch),
            ]
        );
        let events = store.event_types();
        assert!(events.contains(&"swept".to_string()));

        // Nothing left for the purge except the current messages
        ledger.purge_all(&channel).unwrap();
        assert_eq!(channel.deleted(), vec![id(2), id(1), id(5), id(3)]);
    }

    #[test]
    fn test_sweep_compacts_even_when_orphan_delete_fails() {
        let store = MemoryStore::new();
        let channel = RecordingChannel::new();
        channel.fail_delete_of(&id(1));
        let mut ledger = ledger_with(
            &store,
            &[(1, MealType::Lunch), (2, MealType::Lunch), (3, MealType::Lunch)],
        );

        let retired = ledger.retire_previous(MealType::Lunch, &id(3), &channel).unwrap();

        assert_eq!(retired, Some(Retirement { message_id: id(2), deleted: true }));
        assert_eq!(channel.deleted(), vec![id(2), id(1)], "1 was attempted");
        assert_eq!(store.log_entries(), vec![LedgerEntry::new(id(3), MealType::Lunch)]);
        assert_eq!(store.event_types(), vec!["published", "published", "published", "retired", "swept"]);
    }

    #[test]
    fn test_purge_all_deletes_everything_and_clears() {
        let store = MemoryStore::new();
        let channel = RecordingChannel::new();
        channel.fail_delete_of(&id(1));
        let mut ledger = ledger_with(&store, &[(1, MealType::Lunch), (2, MealType::Dinner)]);

        let report = ledger.purge_all(&channel).unwrap();

        assert_eq!(channel.deleted(), vec![id(1), id(2)]);
        assert_eq!(report, PurgeReport { attempted: 2, deleted: 1, failed: 1 });
        assert!(store.log_entries().is_empty());
        assert!(ledger.current().unwrap().is_empty());

        println!("✅ Purge test PASSED");
    }

    #[test]
    fn test_purge_all_on_empty_ledger() {
        let store = MemoryStore::new();
        let channel = RecordingChannel::new();
        let mut ledger = MessageLedger::new(Box::new(store.clone()));

        let report = ledger.purge_all(&channel).unwrap();

        assert_eq!(report, PurgeReport::default());
        assert!(channel.deleted().is_empty());
    }

    #[test]
    fn test_view_current_is_latest_per_meal() {
        let view = LedgerView::from_entries(vec![
            LedgerEntry::new(id(1), MealType::Lunch),
            LedgerEntry::new(id(2), MealType::Dinner),
            LedgerEntry::new(id(3), MealType::Lunch),
        ]);

        let current: Vec<MessageId> = view.current().iter().map(|r| r.message_id.clone()).collect();
        assert_eq!(current, vec![id(2), id(3)]);
        assert_eq!(view.latest(MealType::Lunch).unwrap().seq, 2);
        assert_eq!(view.previous(MealType::Lunch, &id(3)).unwrap().message_id, id(1));
        assert!(view.previous(MealType::Dinner, &id(2)).is_none());
    }

    #[test]
    fn test_persistence_failure_surfaces() {
        let store = MemoryStore::new();
        let channel = RecordingChannel::new();
        let mut ledger = ledger_with(&store, &[(1, MealType::Lunch), (2, MealType::Lunch)]);
        store.fail_writes(true);

        let result = ledger.retire_previous(MealType::Lunch, &id(2), &channel);

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        // Delete was attempted before the log write failed
        assert_eq!(channel.deleted(), vec![id(1)]);
        assert_eq!(store.log_entries().len(), 2);
    }
}
