use anyhow::Result;
use log::{info, warn};
use notify_rust::{Hint, Notification as Desktop};

use crate::feed::Notification;

pub struct Notifier {
    desktop: bool,
}

impl Notifier {
    pub fn new(desktop: bool) -> Self {
        Self { desktop }
    }

    /// Shows one desktop notification; failures to reach the notification
    /// server are logged, never fatal.
    pub fn notify(&self, n: &Notification) -> Result<()> {
        info!("{}: {}", n.title, n.body);
        if !self.desktop {
            return Ok(());
        }

        let mut d = Desktop::new();
        d.appname("mail_console")
            .summary(&n.title)
            .body(&n.body)
            .icon("mail-message-new")
            .hint(Hint::Category("email.arrived".to_string()));

        if let Err(e) = d.show() {
            warn!("Notification error: {e}");
        }
        Ok(())
    }
}
