use log::warn;
use ratatui::widgets::TableState;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use crate::domain::mail::MailRecord;
use crate::feed::{FeedEvent, MailFeedMerger, SnapshotSource, describe};
use crate::push::PushEvent;
use crate::push::state::ChannelState;
use crate::store::repo::KeyValueStore;
use crate::terminal::columns::{ColumnWidths, FEED_COLUMNS, LATEST_MAIL_COLUMNS_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Table,
    Body,
}

pub struct AppState {
    pub feed: MailFeedMerger,
    pub table_state: TableState,
    pub columns: ColumnWidths,
    pub selected_column: usize,

    pub focus: Focus,
    pub body_scroll: u16,

    pub channel: ChannelState,
    pub loading: bool,
    /// Last notification or mutation result shown in the footer.
    pub status: Option<String>,

    store: Arc<dyn KeyValueStore>,
}

impl AppState {
    /// Column widths are read from `store` here, once, at mount.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let columns = ColumnWidths::load(store.as_ref(), LATEST_MAIL_COLUMNS_KEY, &FEED_COLUMNS);
        Self {
            feed: MailFeedMerger::new(),
            table_state: TableState::default(),
            columns,
            selected_column: 1,
            focus: Focus::Table,
            body_scroll: 0,
            channel: ChannelState::Disconnected,
            loading: false,
            status: None,
            store,
        }
    }

    pub fn records(&self) -> &[MailRecord] {
        self.feed.records()
    }

    /// Replaces the feed from `source`. A failed load keeps the current rows;
    /// only the loading indicator changes.
    pub fn reload(&mut self, source: &dyn SnapshotSource) {
        self.loading = true;
        let keep = self.selected_id();
        if let Err(e) = self.feed.load_initial(source) {
            warn!("loading latest mail failed: {e}");
        }
        self.loading = false;
        self.reselect(keep);
    }

    pub fn on_push(&mut self, event: PushEvent) {
        match event {
            PushEvent::State(s) => self.channel = s,
            PushEvent::Batch(batch) => {
                let keep = self.selected_id();
                if let Some(n) = self
                    .feed
                    .apply(FeedEvent::Batch(batch))
                    .as_ref()
                    .and_then(describe)
                {
                    self.status = Some(n.body);
                }
                self.reselect(keep);
            }
        }
    }

    /// Applies every event already queued by the push channel. Batches that
    /// arrived while a reload was in flight land in front of its snapshot.
    pub fn drain_push(&mut self, rx: &Receiver<PushEvent>) {
        while let Ok(ev) = rx.try_recv() {
            self.on_push(ev);
        }
    }

    pub fn selected_id(&self) -> Option<i64> {
        self.selected().map(|r| r.id)
    }

    pub fn selected(&self) -> Option<&MailRecord> {
        let idx = self.table_state.selected()?;
        self.records().get(idx)
    }

    /// Keeps the cursor on the same record after the list shifts.
    fn reselect(&mut self, id: Option<i64>) {
        let pos = id.and_then(|id| self.records().iter().position(|r| r.id == id));
        match pos {
            Some(p) => self.table_state.select(Some(p)),
            None if self.records().is_empty() => self.table_state.select(None),
            None => {
                self.table_state.select(Some(0));
                self.body_scroll = 0;
            }
        }
    }

    pub fn move_selection(&mut self, delta: i32) {
        if self.records().is_empty() {
            self.table_state.select(None);
            return;
        }
        let cur = self.table_state.selected().unwrap_or(0) as i32;
        let len = self.records().len() as i32;
        let next = (cur + delta).clamp(0, len - 1) as usize;
        if Some(next) != self.table_state.selected() {
            self.body_scroll = 0;
        }
        self.table_state.select(Some(next));
    }

    pub fn select_column(&mut self, delta: i32) {
        let n = self.columns.columns().len() as i32;
        self.selected_column = (self.selected_column as i32 + delta).rem_euclid(n) as usize;
    }

    /// Resizes the selected column and persists all widths immediately.
    pub fn resize_selected_column(&mut self, delta: i16) {
        if self.columns.resize(self.selected_column, delta).is_none() {
            return;
        }
        if let Err(e) = self.columns.save(self.store.as_ref(), LATEST_MAIL_COLUMNS_KEY) {
            warn!("could not save column widths: {e}");
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Table => Focus::Body,
            Focus::Body => Focus::Table,
        };
    }

    pub fn scroll_body(&mut self, delta: i32) {
        if delta < 0 {
            self.body_scroll = self.body_scroll.saturating_sub((-delta) as u16);
        } else {
            self.body_scroll = self.body_scroll.saturating_add(delta as u16);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::domain::mail::MailContent;
    use crate::store::repo::MemoryStore;

    fn rec(id: i64) -> MailRecord {
        MailRecord {
            id,
            email_id: None,
            recipient_email: "r@x.com".into(),
            sender: "s@x.com".into(),
            subject: Some(format!("m{id}")),
            content: MailContent::default(),
            has_attachments: false,
            received_time: None,
        }
    }

    struct Down;

    impl SnapshotSource for Down {
        fn latest_mail_records(&self) -> Result<Vec<MailRecord>, ApiError> {
            Err(ApiError::Status {
                status: 503,
                message: "unavailable".into(),
            })
        }
    }

    struct Up(Vec<MailRecord>);

    impl SnapshotSource for Up {
        fn latest_mail_records(&self) -> Result<Vec<MailRecord>, ApiError> {
            Ok(self.0.clone())
        }
    }

    fn state() -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        (AppState::new(store.clone()), store)
    }

    #[test]
    fn selection_follows_record_when_batch_arrives() {
        let (mut s, _) = state();
        s.reload(&Up(vec![rec(1), rec(2)]));
        s.move_selection(1);
        assert_eq!(s.selected_id(), Some(2));

        s.on_push(PushEvent::Batch(vec![rec(3)]));
        assert_eq!(s.selected_id(), Some(2));
        assert_eq!(s.status.as_deref(), Some("s@x.com: m3"));
    }

    #[test]
    fn batch_queued_during_reload_lands_in_front_of_snapshot() {
        let (mut s, _) = state();
        let (tx, rx) = std::sync::mpsc::channel();
        tx.send(PushEvent::Batch(vec![rec(9), rec(2)])).unwrap();

        s.reload(&Up(vec![rec(2), rec(1)]));
        assert_eq!(s.records().len(), 2);

        s.drain_push(&rx);
        let ids: Vec<i64> = s.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![9, 2, 1]);
        assert_eq!(s.status.as_deref(), Some("s@x.com: m9"));
    }

    #[test]
    fn failed_reload_keeps_rows_and_clears_loading() {
        let (mut s, _) = state();
        s.reload(&Up(vec![rec(1)]));
        s.reload(&Down);
        assert!(!s.loading);
        assert_eq!(s.records().len(), 1);
        assert!(s.status.is_none());
    }

    #[test]
    fn each_resize_is_persisted() {
        let (mut s, store) = state();
        s.select_column(1);
        s.resize_selected_column(5);
        let saved = store.get(LATEST_MAIL_COLUMNS_KEY).unwrap().unwrap();
        assert!(saved.contains(r#""subject":45"#));

        s.resize_selected_column(-2);
        let saved = store.get(LATEST_MAIL_COLUMNS_KEY).unwrap().unwrap();
        assert!(saved.contains(r#""subject":43"#));

        let again = AppState::new(store);
        assert_eq!(again.columns.width("subject"), 43);
    }

    #[test]
    fn channel_state_is_tracked() {
        let (mut s, _) = state();
        s.on_push(PushEvent::State(ChannelState::Connected));
        assert_eq!(s.channel, ChannelState::Connected);
    }

    #[test]
    fn column_selection_wraps() {
        let (mut s, _) = state();
        s.select_column(-2);
        assert_eq!(s.selected_column, 4);
        s.select_column(1);
        assert_eq!(s.selected_column, 0);
    }
}
