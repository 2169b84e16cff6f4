//! Ordered, duplicate-free, bounded view over recent mail, fed by a one-shot
//! snapshot and by pushed batches.

use std::collections::HashSet;

use log::debug;

use crate::api::error::ApiError;
use crate::domain::mail::{MailId, MailRecord};

/// Maximum number of records kept in the view.
pub const FEED_CAPACITY: usize = 50;

/// Anything that can produce the current snapshot of recent mail.
pub trait SnapshotSource {
    fn latest_mail_records(&self) -> Result<Vec<MailRecord>, ApiError>;
}

#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Replaces the view wholesale.
    Snapshot(Vec<MailRecord>),
    /// Merged in front of the current view.
    Batch(Vec<MailRecord>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub added_count: usize,
    /// First record of the incoming batch, whether or not it was new.
    pub first: Option<MailRecord>,
    /// First record that was actually inserted.
    pub first_added: Option<MailRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct MailFeedMerger {
    records: Vec<MailRecord>,
}

impl MailFeedMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only projection of the view, newest first.
    pub fn records(&self) -> &[MailRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: MailId) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    /// Fetches the snapshot and replaces the view with it. On failure the
    /// current view is left untouched and the error is returned; no retry.
    pub fn load_initial<S>(&mut self, source: &S) -> Result<&[MailRecord], ApiError>
    where
        S: SnapshotSource + ?Sized,
    {
        let snapshot = source.latest_mail_records()?;
        self.apply(FeedEvent::Snapshot(snapshot));
        Ok(&self.records)
    }

    /// Single entry point for both event kinds. Only a batch yields an outcome.
    pub fn apply(&mut self, event: FeedEvent) -> Option<MergeOutcome> {
        match event {
            FeedEvent::Snapshot(records) => {
                self.replace(records);
                None
            }
            FeedEvent::Batch(batch) => Some(self.merge(batch)),
        }
    }

    /// Prepends every record whose id is not yet present, keeping batch order,
    /// then drops the oldest entries beyond [`FEED_CAPACITY`].
    pub fn merge(&mut self, batch: Vec<MailRecord>) -> MergeOutcome {
        let first = batch.first().cloned();
        let mut seen: HashSet<MailId> = self.records.iter().map(|r| r.id).collect();

        let fresh: Vec<MailRecord> = batch
            .into_iter()
            .filter(|r| seen.insert(r.id))
            .collect();

        let added_count = fresh.len();
        let first_added = fresh.first().cloned();

        if added_count > 0 {
            self.records.splice(0..0, fresh);
            self.records.truncate(FEED_CAPACITY);
        }
        debug!(
            "merged batch: {added_count} new, view holds {}",
            self.records.len()
        );

        MergeOutcome {
            added_count,
            first,
            first_added,
        }
    }

    fn replace(&mut self, records: Vec<MailRecord>) {
        let mut seen = HashSet::new();
        self.records = records
            .into_iter()
            .filter(|r| seen.insert(r.id))
            .take(FEED_CAPACITY)
            .collect();
    }
}

/// One notification per batch: the record itself when a single mail arrived,
/// a count otherwise.
pub fn describe(outcome: &MergeOutcome) -> Option<Notification> {
    let body = match outcome.added_count {
        0 => return None,
        1 => {
            let r = outcome.first_added.as_ref().or(outcome.first.as_ref())?;
            format!("{}: {}", r.sender, r.display_subject())
        }
        n => format!("received {n} new mail(s)"),
    };
    Some(Notification {
        title: "New mail".to_string(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mail::MailContent;

    fn rec(id: MailId) -> MailRecord {
        MailRecord {
            id,
            email_id: None,
            recipient_email: "box@example.com".into(),
            sender: format!("sender{id}@example.com"),
            subject: Some(format!("subject {id}")),
            content: MailContent::PlainText(String::new()),
            has_attachments: false,
            received_time: None,
        }
    }

    fn ids(m: &MailFeedMerger) -> Vec<MailId> {
        m.records().iter().map(|r| r.id).collect()
    }

    struct Fixed(Result<Vec<MailRecord>, u16>);

    impl SnapshotSource for Fixed {
        fn latest_mail_records(&self) -> Result<Vec<MailRecord>, ApiError> {
            match &self.0 {
                Ok(v) => Ok(v.clone()),
                Err(status) => Err(ApiError::Status {
                    status: *status,
                    message: "boom".into(),
                }),
            }
        }
    }

    #[test]
    fn batch_goes_in_front_of_snapshot() {
        let mut m = MailFeedMerger::new();
        m.load_initial(&Fixed(Ok(vec![rec(1), rec(2)]))).unwrap();

        let out = m.merge(vec![rec(3)]);
        assert_eq!(ids(&m), vec![3, 1, 2]);
        assert_eq!(out.added_count, 1);
    }

    #[test]
    fn failed_snapshot_keeps_existing_view() {
        let mut m = MailFeedMerger::new();
        m.merge(vec![rec(9), rec(8)]);
        assert!(m.load_initial(&Fixed(Err(500))).is_err());
        assert_eq!(ids(&m), vec![9, 8]);
    }

    #[test]
    fn replaying_a_batch_is_a_no_op() {
        let mut m = MailFeedMerger::new();
        m.load_initial(&Fixed(Ok(vec![rec(1)]))).unwrap();
        let batch = vec![rec(4), rec(3), rec(2)];

        let first = m.merge(batch.clone());
        let after_first = ids(&m);
        let second = m.merge(batch);

        assert_eq!(first.added_count, 3);
        assert_eq!(second.added_count, 0);
        assert_eq!(ids(&m), after_first);
        assert_eq!(ids(&m), vec![4, 3, 2, 1]);
    }

    #[test]
    fn counts_only_new_ids() {
        let mut m = MailFeedMerger::new();
        m.merge(vec![rec(1), rec(2)]);
        let out = m.merge(vec![rec(2), rec(5), rec(1), rec(6)]);
        assert_eq!(out.added_count, 2);
        assert_eq!(out.first.unwrap().id, 2);
        assert_eq!(out.first_added.unwrap().id, 5);
        assert_eq!(ids(&m), vec![5, 6, 1, 2]);
    }

    #[test]
    fn duplicate_within_batch_inserted_once() {
        let mut m = MailFeedMerger::new();
        let out = m.merge(vec![rec(3), rec(3)]);
        assert_eq!(out.added_count, 1);
        assert_eq!(ids(&m), vec![3]);
    }

    #[test]
    fn full_view_drops_oldest() {
        let mut m = MailFeedMerger::new();
        let snapshot: Vec<_> = (1..=50).rev().map(rec).collect();
        m.load_initial(&Fixed(Ok(snapshot))).unwrap();
        assert_eq!(m.len(), 50);

        m.merge(vec![rec(51)]);
        assert_eq!(m.len(), 50);
        assert_eq!(m.records()[0].id, 51);
        assert!(!m.contains(1));
        assert!(m.contains(2));
    }

    #[test]
    fn view_never_exceeds_capacity_and_keeps_latest() {
        let mut m = MailFeedMerger::new();
        for chunk in (1..=130).collect::<Vec<_>>().chunks(7) {
            m.merge(chunk.iter().rev().map(|&i| rec(i)).collect());
            assert!(m.len() <= FEED_CAPACITY);
        }
        let expected: Vec<MailId> = (81..=130).rev().collect();
        assert_eq!(ids(&m), expected);
    }

    #[test]
    fn oversized_batch_keeps_its_newest_records() {
        let mut m = MailFeedMerger::new();
        m.merge(vec![rec(1000)]);
        let out = m.merge((1..=60).rev().map(rec).collect());
        assert_eq!(out.added_count, 60);
        assert_eq!(m.len(), FEED_CAPACITY);
        assert_eq!(m.records()[0].id, 60);
        assert!(!m.contains(1000));
    }

    #[test]
    fn snapshot_is_deduplicated_and_bounded() {
        let mut m = MailFeedMerger::new();
        let mut snapshot: Vec<_> = (1..=60).map(rec).collect();
        snapshot.insert(1, rec(1));
        m.apply(FeedEvent::Snapshot(snapshot));
        assert_eq!(m.len(), 50);
        assert_eq!(&ids(&m)[..3], &[1, 2, 3]);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut m = MailFeedMerger::new();
        m.merge(vec![rec(1)]);
        let out = m.apply(FeedEvent::Batch(vec![])).unwrap();
        assert_eq!(out.added_count, 0);
        assert!(out.first.is_none());
        assert_eq!(describe(&out), None);
        assert_eq!(ids(&m), vec![1]);
    }

    #[test]
    fn describe_collapses_bursts() {
        let mut m = MailFeedMerger::new();
        let one = m.merge(vec![rec(1)]);
        assert_eq!(
            describe(&one).unwrap().body,
            "sender1@example.com: subject 1"
        );

        let many = m.merge(vec![rec(2), rec(3), rec(4)]);
        assert_eq!(describe(&many).unwrap().body, "received 3 new mail(s)");

        let none = m.merge(vec![rec(2)]);
        assert!(describe(&none).is_none());
    }

    #[test]
    fn describe_uses_placeholder_for_missing_subject() {
        let mut r = rec(8);
        r.subject = None;
        let out = MailFeedMerger::new().merge(vec![r]);
        assert_eq!(
            describe(&out).unwrap().body,
            "sender8@example.com: (no subject)"
        );
    }
}
