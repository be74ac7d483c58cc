// 🚦 Publication Controller - fetch → normalize → compare → send → record → commit → retire
//
// Every failure except a ledger write is absorbed here and reported as a
// TickOutcome; ledger failures come back as PublishError for the scheduler
// to log. Nothing is committed unless the send succeeded.

use crate::change_detector::ChangeDetector;
use crate::channel::{Channel, MessageId};
use crate::format::format_message;
use crate::ledger::{MessageLedger, PurgeReport, Retirement};
use crate::menu::MealType;
use crate::normalizer::{normalize, NormalizeRules};
use crate::source::MenuSource;
use crate::store::StoreError;
use chrono::{NaiveDateTime, Timelike};
use tracing::{error, info, warn};

/// Default hour at which the active meal switches from lunch to dinner
pub const DEFAULT_CUTOVER_HOUR: u32 = 14;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Ledger persistence failed: {0}")]
    Ledger(#[from] StoreError),
}

/// What a tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Fetch failed or the source had nothing for this meal
    SourceUnavailable(MealType),

    /// Payload normalized to nothing renderable
    NoUsableContent(MealType),

    /// Same fingerprint as the last published message
    Unchanged(MealType),

    /// Channel refused; nothing committed, next tick retries
    SendFailed(MealType),

    Published {
        meal: MealType,
        message_id: MessageId,
        retired: Option<Retirement>,
    },
}

pub struct Publisher {
    source: Box<dyn MenuSource>,
    channel: Box<dyn Channel>,
    detector: ChangeDetector,
    ledger: MessageLedger,
    rules: NormalizeRules,
    cutover_hour: u32,
}

impl Publisher {
    pub fn new(
        source: Box<dyn MenuSource>,
        channel: Box<dyn Channel>,
        detector: ChangeDetector,
        ledger: MessageLedger,
    ) -> Self {
        Publisher {
            source,
            channel,
            detector,
            ledger,
            rules: NormalizeRules::default(),
            cutover_hour: DEFAULT_CUTOVER_HOUR,
        }
    }

    pub fn with_rules(mut self, rules: NormalizeRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_cutover_hour(mut self, hour: u32) -> Self {
        self.cutover_hour = hour;
        self
    }

    pub fn ledger(&self) -> &MessageLedger {
        &self.ledger
    }

    pub fn active_meal(&self, now: NaiveDateTime) -> MealType {
        MealType::for_hour(now.hour(), self.cutover_hour)
    }

    /// One fetch→compare→publish cycle for the meal active at `now`
    pub fn tick(&mut self, now: NaiveDateTime) -> Result<TickOutcome, PublishError> {
        let meal = self.active_meal(now);
        let today = now.date();
        info!(meal = %meal, date = %today, "Checking menu");

        let payload = match self.source.fetch_today(meal, today) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                info!(meal = %meal, "No menu published for this meal");
                return Ok(TickOutcome::SourceUnavailable(meal));
            }
            Err(e) => {
                error!(meal = %meal, error = %e, "Failed to fetch menu");
                return Ok(TickOutcome::SourceUnavailable(meal));
            }
        };

        let snapshot = normalize(&payload, &self.rules).with_service_date(today);

        let Some(text) = format_message(meal, today, &snapshot) else {
            info!(meal = %meal, "Menu has no usable content");
            return Ok(TickOutcome::NoUsableContent(meal));
        };

        if !self.detector.has_changed(meal, &snapshot) {
            info!(meal = %meal, "No change detected");
            return Ok(TickOutcome::Unchanged(meal));
        }

        info!(meal = %meal, "Menu changed, sending");
        let message_id = match self.channel.send(&text) {
            Ok(id) => id,
            Err(e) => {
                error!(meal = %meal, error = %e, "Failed to send message, will retry next tick");
                return Ok(TickOutcome::SendFailed(meal));
            }
        };

        if let Err(e) = self.ledger.record_published(meal, &message_id) {
            // An untracked message could never be retired or purged
            match self.channel.delete(&message_id) {
                Ok(()) => warn!(meal = %meal, message_id = %message_id, error = %e,
                    "Ledger append failed, sent message withdrawn"),
                Err(delete_err) => error!(meal = %meal, message_id = %message_id, error = %e,
                    delete_error = %delete_err, "Ledger append failed and sent message could not be withdrawn"),
            }
            return Err(e.into());
        }

        match self.detector.commit(meal, &snapshot) {
            Ok(fingerprint) => info!(meal = %meal, message_id = %message_id,
                fingerprint = fingerprint.short(), "Message sent"),
            Err(e) => warn!(meal = %meal, message_id = %message_id, error = %e,
                "Message sent but fingerprint not saved; next tick will resend"),
        }

        let retired = self
            .ledger
            .retire_previous(meal, &message_id, self.channel.as_ref())?;

        Ok(TickOutcome::Published {
            meal,
            message_id,
            retired,
        })
    }

    /// End-of-day purge of every tracked message
    pub fn daily_purge(&mut self) -> Result<PurgeReport, PublishError> {
        info!("Purging all tracked messages");
        Ok(self.ledger.purge_all(self.channel.as_ref())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::fake::RecordingChannel;
    use crate::ledger::LedgerEntry;
    use crate::menu::MenuPayload;
    use crate::source::SourceError;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Serves whatever the test puts in `menu`, for any meal
    #[derive(Clone, Default)]
    struct ScriptedSource {
        menu: Rc<RefCell<Option<Result<String, String>>>>,
        requested: Rc<RefCell<Vec<MealType>>>,
    }

    impl ScriptedSource {
        fn serve(&self, text: &str) {
            *self.menu.borrow_mut() = Some(Ok(text.to_string()));
        }

        fn fail(&self) {
            *self.menu.borrow_mut() = Some(Err("site down".into()));
        }
    }

    impl MenuSource for ScriptedSource {
        fn fetch_today(&self, meal: MealType, _date: NaiveDate) -> Result<Option<MenuPayload>, SourceError> {
            self.requested.borrow_mut().push(meal);
            match self.menu.borrow().clone() {
                Some(Ok(text)) => Ok(Some(MenuPayload::Raw(text))),
                Some(Err(e)) => Err(SourceError::Network(e)),
                None => Ok(None),
            }
        }
    }

    struct Harness {
        publisher: Publisher,
        source: ScriptedSource,
        channel: RecordingChannel,
        fingerprints: MemoryStore,
        log: MemoryStore,
    }

    fn harness() -> Harness {
        let source = ScriptedSource::default();
        let channel = RecordingChannel::new();
        let fingerprints = MemoryStore::new();
        let log = MemoryStore::new();
        let publisher = Publisher::new(
            Box::new(source.clone()),
            Box::new(channel.clone()),
            ChangeDetector::new(Box::new(fingerprints.clone())),
            MessageLedger::new(Box::new(log.clone())),
        );
        Harness { publisher, source, channel, fingerprints, log }
    }

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, 15)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    const LUNCH: &str = "Prato Principal\nFeijoada\nSobremesa\nLaranja";

    #[test]
    fn test_unchanged_content_sends_once() {
        let mut h = harness();
        h.source.serve(LUNCH);

        let first = h.publisher.tick(at(10, 0)).unwrap();
        let second = h.publisher.tick(at(10, 6)).unwrap();

        assert!(matches!(first, TickOutcome::Published { meal: MealType::Lunch, .. }));
        assert_eq!(second, TickOutcome::Unchanged(MealType::Lunch));
        assert_eq!(h.channel.sent().len(), 1);

        println!("✅ Send-once test PASSED");
    }

    #[test]
    fn test_failed_send_is_retried_with_same_text() {
        let mut h = harness();
        h.source.serve(LUNCH);
        h.channel.fail_next_sends(1);

        let first = h.publisher.tick(at(11, 0)).unwrap();
        assert_eq!(first, TickOutcome::SendFailed(MealType::Lunch));
        assert_eq!(h.fingerprints.value("lunch"), None);
        assert!(h.log.log_entries().is_empty());

        let second = h.publisher.tick(at(11, 6)).unwrap();
        assert!(matches!(second, TickOutcome::Published { .. }));

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
    }

    #[test]
    fn test_changed_menu_replaces_previous_message() {
        let mut h = harness();
        h.source.serve(LUNCH);
        let first_id = match h.publisher.tick(at(10, 0)).unwrap() {
            TickOutcome::Published { message_id, .. } => message_id,
            other => panic!("expected publish, got {:?}", other),
        };

        h.source.serve("Prato Principal\nFeijoada\nSobremesa\nMelancia");
        let second = h.publisher.tick(at(10, 6)).unwrap();

        match second {
            TickOutcome::Published { message_id, retired, .. } => {
                assert_eq!(
                    retired,
                    Some(Retirement { message_id: first_id.clone(), deleted: true })
                );
                assert_eq!(
                    h.log.log_entries(),
                    vec![LedgerEntry::new(message_id, MealType::Lunch)]
                );
            }
            other => panic!("expected publish, got {:?}", other),
        }
        assert_eq!(h.channel.deleted(), vec![first_id]);
    }

    #[test]
    fn test_cutover_selects_dinner() {
        let mut h = harness();
        h.source.serve("Prato Principal\nSopa");

        let outcome = h.publisher.tick(at(14, 0)).unwrap();

        assert!(matches!(outcome, TickOutcome::Published { meal: MealType::Dinner, .. }));
        assert_eq!(*h.source.requested.borrow(), vec![MealType::Dinner]);
        assert!(h.channel.sent()[0].contains("Jantar do dia 15/04/2024"));
        assert!(h.fingerprints.value("dinner").is_some());
        assert_eq!(h.fingerprints.value("lunch"), None);
    }

    #[test]
    fn test_custom_cutover_hour() {
        let h = harness();
        let publisher = h.publisher.with_cutover_hour(16);

        assert_eq!(publisher.active_meal(at(15, 59)), MealType::Lunch);
        assert_eq!(publisher.active_meal(at(16, 0)), MealType::Dinner);
    }

    #[test]
    fn test_source_unavailable_touches_nothing() {
        let mut h = harness();

        assert_eq!(
            h.publisher.tick(at(9, 0)).unwrap(),
            TickOutcome::SourceUnavailable(MealType::Lunch)
        );

        h.source.fail();
        assert_eq!(
            h.publisher.tick(at(9, 6)).unwrap(),
            TickOutcome::SourceUnavailable(MealType::Lunch)
        );

        assert!(h.channel.sent().is_empty());
        assert_eq!(h.fingerprints.value("lunch"), None);
        assert!(h.log.log_entries().is_empty());
    }

    #[test]
    fn test_empty_menu_is_not_sent() {
        let mut h = harness();
        h.source.serve("CARDÁPIO SUJEITO A ALTERAÇÕES");

        let outcome = h.publisher.tick(at(9, 0)).unwrap();

        assert_eq!(outcome, TickOutcome::NoUsableContent(MealType::Lunch));
        assert!(h.channel.sent().is_empty());
    }

    #[test]
    fn test_fingerprint_write_failure_still_records_message() {
        let mut h = harness();
        h.source.serve(LUNCH);
        h.fingerprints.fail_writes(true);

        let outcome = h.publisher.tick(at(10, 0)).unwrap();

        assert!(matches!(outcome, TickOutcome::Published { .. }));
        assert_eq!(h.log.log_entries().len(), 1);
    }

    #[test]
    fn test_ledger_append_failure_withdraws_message() {
        let mut h = harness();
        h.source.serve(LUNCH);
        h.log.fail_appends(true);

        let first = h.publisher.tick(at(10, 0));

        assert!(matches!(first, Err(PublishError::Ledger(_))));
        assert_eq!(h.channel.deleted(), vec![MessageId::from(101)]);
        assert_eq!(h.fingerprints.value("lunch"), None, "fingerprint stays uncommitted");

        // Store back up: the same menu goes out again and is tracked
        h.log.fail_appends(false);
        let second = h.publisher.tick(at(10, 6)).unwrap();
        assert!(matches!(second, TickOutcome::Published { .. }));
        assert_eq!(h.channel.sent().len(), 2);

        h.publisher.daily_purge().unwrap();
        assert_eq!(
            h.channel.deleted(),
            vec![MessageId::from(101), MessageId::from(102)]
        );

        println!("✅ Ledger append failure test PASSED");
    }

    #[test]
    fn test_daily_purge_clears_both_meals() {
        let mut h = harness();
        h.source.serve(LUNCH);
        h.publisher.tick(at(10, 0)).unwrap();
        h.source.serve("Prato Principal\nSopa");
        h.publisher.tick(at(18, 0)).unwrap();

        let report = h.publisher.daily_purge().unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(h.channel.deleted().len(), 2);
        assert!(h.publisher.ledger().current().unwrap().is_empty());
    }
}
