use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info};

/// Fixed delay between a closure and the next connection attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    Start,
    Opened,
    Closed(Instant),
    Failed(Instant),
    Tick(Instant),
    Teardown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Connect,
    Authenticate,
    Close,
}

/// Shared flag that suppresses every reconnect once set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Connection lifecycle of the push channel. Reconnects unconditionally
/// [`RECONNECT_DELAY`] after every closure until torn down.
#[derive(Debug)]
pub struct ChannelMachine {
    state: ChannelState,
    reconnect_at: Option<Instant>,
    cancel: CancelToken,
    attempts: u64,
}

impl ChannelMachine {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            state: ChannelState::Disconnected,
            reconnect_at: None,
            cancel,
            attempts: 0,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Connection attempts made after the first one.
    pub fn reconnects(&self) -> u64 {
        self.attempts
    }

    pub fn handle(&mut self, event: ChannelEvent) -> Action {
        if self.cancel.is_cancelled() && event != ChannelEvent::Teardown {
            return self.teardown();
        }

        match event {
            ChannelEvent::Start => {
                if self.state == ChannelState::Disconnected && self.reconnect_at.is_none() {
                    self.state = ChannelState::Connecting;
                    Action::Connect
                } else {
                    Action::None
                }
            }
            ChannelEvent::Opened => {
                if self.state != ChannelState::Connecting {
                    return Action::None;
                }
                self.state = ChannelState::Connected;
                Action::Authenticate
            }
            ChannelEvent::Closed(now) | ChannelEvent::Failed(now) => {
                self.state = ChannelState::Disconnected;
                let at = now + RECONNECT_DELAY;
                self.reconnect_at = Some(at);
                info!("push channel down, reconnecting in {}s", RECONNECT_DELAY.as_secs());
                Action::None
            }
            ChannelEvent::Tick(now) => match self.reconnect_at {
                Some(at) if self.state == ChannelState::Disconnected && now >= at => {
                    self.reconnect_at = None;
                    self.state = ChannelState::Connecting;
                    self.attempts += 1;
                    debug!("push channel reconnect attempt {}", self.attempts);
                    Action::Connect
                }
                _ => Action::None,
            },
            ChannelEvent::Teardown => self.teardown(),
        }
    }

    fn teardown(&mut self) -> Action {
        self.cancel.cancel();
        self.reconnect_at = None;
        let was = std::mem::replace(&mut self.state, ChannelState::Disconnected);
        if was == ChannelState::Disconnected {
            Action::None
        } else {
            Action::Close
        }
    }
}
