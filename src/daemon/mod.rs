pub mod notifier;

use anyhow::Result;
use log::{info, warn};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    sync::mpsc::{self, RecvTimeoutError},
    time::Duration,
};
use url::Url;

use crate::api::ApiClient;
use crate::daemon::notifier::Notifier;
use crate::domain::mail::MailRecord;
use crate::feed::{FeedEvent, MailFeedMerger, Notification, describe};
use crate::push::{PushChannel, PushEvent};

pub struct WatchConfig {
    pub ws_url: Url,
    pub token: String,
    pub desktop_notifications: bool,
}

/// Loads the snapshot, then follows the push channel until Ctrl-C, raising
/// one notification per batch.
pub fn run_watch(api: &ApiClient, cfg: WatchConfig) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r2 = running.clone();
    ctrlc::set_handler(move || {
        r2.store(false, Ordering::SeqCst);
    })?;

    let notifier = Notifier::new(cfg.desktop_notifications);
    let (tx, rx) = mpsc::channel();
    let push = PushChannel::spawn(cfg.ws_url, cfg.token, tx)?;

    let mut feed = MailFeedMerger::new();
    match feed.load_initial(api) {
        Ok(records) => {
            info!("loaded {} recent mail(s)", records.len());
            for r in records.iter().rev() {
                println!("{}", format_line(r));
            }
        }
        Err(e) => warn!("initial load failed: {e}"),
    }

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(event) => {
                let printed = |r: &MailRecord| println!("{}", format_line(r));
                if let Some(n) = handle_event(&mut feed, event, printed) {
                    notifier.notify(&n)?;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    push.shutdown();
    Ok(())
}

/// Applies one push event to the feed and returns the notification it warrants.
/// `on_added` sees each newly inserted record, oldest first.
pub fn handle_event<F>(
    feed: &mut MailFeedMerger,
    event: PushEvent,
    mut on_added: F,
) -> Option<Notification>
where
    F: FnMut(&MailRecord),
{
    match event {
        PushEvent::State(state) => {
            info!("push channel: {state:?}");
            None
        }
        PushEvent::Batch(batch) => {
            let outcome = feed.apply(FeedEvent::Batch(batch))?;
            let shown = outcome.added_count.min(feed.len());
            for r in feed.records()[..shown].iter().rev() {
                on_added(r);
            }
            describe(&outcome)
        }
    }
}

pub fn format_line(r: &MailRecord) -> String {
    let when = r
        .received_at()
        .map(|t| t.format("%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "--".to_string());
    let clip = if r.has_attachments { " [att]" } else { "" };
    format!(
        "{when}  {} -> {}  {}{clip}",
        r.sender,
        r.recipient_email,
        r.display_subject()
    )
}
