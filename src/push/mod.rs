//! Live push channel: one WebSocket per session, authenticated on open,
//! delivering `new_mails` batches. Reconnects forever until shut down.

pub mod state;

use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tungstenite::HandshakeError;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

use crate::domain::mail::MailRecord;
use crate::push::state::{Action, CancelToken, ChannelEvent, ChannelMachine, ChannelState};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
const READ_TIMEOUT: Duration = Duration::from_millis(500);
const TICK: Duration = Duration::from_millis(200);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage<'a> {
    Authenticate { token: &'a str },
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    NewMails { data: Vec<MailRecord> },
    #[serde(other)]
    Unknown,
}

/// What the channel reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    State(ChannelState),
    Batch(Vec<MailRecord>),
}

pub fn parse_server_message(text: &str) -> serde_json::Result<ServerMessage> {
    serde_json::from_str(text)
}

pub struct PushChannel;

impl PushChannel {
    /// Starts the channel on a background thread. Events go to `tx` until the
    /// returned handle is shut down or dropped.
    pub fn spawn(url: Url, token: String, tx: Sender<PushEvent>) -> Result<PushHandle> {
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let join = thread::Builder::new()
            .name("push-channel".into())
            .spawn(move || run(url, token, tx, worker_cancel))?;
        Ok(PushHandle {
            cancel,
            join: Some(join),
        })
    }
}

/// Owning handle; tearing it down closes the socket and stops reconnects.
/// Every blocking step of the worker is bounded by a timeout, so the join
/// in `stop` returns within a few seconds.
pub struct PushHandle {
    cancel: CancelToken,
    join: Option<JoinHandle<()>>,
}

impl PushHandle {
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("push channel thread panicked");
            }
        }
    }
}

impl Drop for PushHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(url: Url, token: String, tx: Sender<PushEvent>, cancel: CancelToken) {
    let mut machine = ChannelMachine::new(cancel.clone());
    let mut action = machine.handle(ChannelEvent::Start);

    loop {
        if cancel.is_cancelled() {
            machine.handle(ChannelEvent::Teardown);
            break;
        }

        match action {
            Action::Connect => {
                let _ = tx.send(PushEvent::State(ChannelState::Connecting));
                match connect(&url) {
                    Ok(mut socket) => {
                        if machine.handle(ChannelEvent::Opened) == Action::Authenticate {
                            info!(
                                "push channel connected to {url} ({} reconnect(s) so far)",
                                machine.reconnects()
                            );
                            let _ = tx.send(PushEvent::State(ChannelState::Connected));
                            session(&mut socket, &token, &tx, &cancel);
                        }
                        action = machine.handle(ChannelEvent::Closed(Instant::now()));
                        if action == Action::Close {
                            let _ = socket.close(None);
                            let _ = socket.flush();
                        }
                    }
                    Err(e) => {
                        warn!("push channel connect to {url} failed: {e}");
                        action = machine.handle(ChannelEvent::Failed(Instant::now()));
                    }
                }
                if !cancel.is_cancelled() {
                    let _ = tx.send(PushEvent::State(ChannelState::Disconnected));
                }
            }
            _ => {
                thread::sleep(TICK);
                action = machine.handle(ChannelEvent::Tick(Instant::now()));
            }
        }
    }
    info!("push channel stopped");
}

fn open_stream(url: &Url) -> Result<TcpStream> {
    let mut last_err = None;
    for addr in url.socket_addrs(|| None)? {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(match last_err {
        Some(e) => e.into(),
        None => anyhow!("{url} resolved to no address"),
    })
}

/// TCP connect, TLS and the upgrade all run under timeouts; a peer that
/// accepts but never answers fails the attempt instead of hanging it.
fn connect(url: &Url) -> Result<Socket> {
    let stream = open_stream(url)?;
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    stream.set_write_timeout(Some(HANDSHAKE_TIMEOUT))?;

    let (mut socket, _resp) =
        tungstenite::client_tls(url.as_str(), stream).map_err(|e| match e {
            HandshakeError::Failure(e) => anyhow::Error::from(e),
            HandshakeError::Interrupted(_) => anyhow!(
                "no upgrade response within {}s",
                HANDSHAKE_TIMEOUT.as_secs()
            ),
        })?;
    match socket.get_mut() {
        MaybeTlsStream::Plain(s) => s.set_read_timeout(Some(READ_TIMEOUT))?,
        MaybeTlsStream::Rustls(s) => s.sock.set_read_timeout(Some(READ_TIMEOUT))?,
        _ => {}
    }
    Ok(socket)
}

/// Authenticates and pumps frames until the peer closes or the token is
/// cancelled. Closing a cancelled socket is left to the caller.
fn session(socket: &mut Socket, token: &str, tx: &Sender<PushEvent>, cancel: &CancelToken) {
    let auth = match serde_json::to_string(&ClientMessage::Authenticate { token }) {
        Ok(s) => s,
        Err(e) => {
            warn!("could not encode authenticate message: {e}");
            return;
        }
    };
    if let Err(e) = socket.send(Message::Text(auth)) {
        warn!("push channel authenticate failed: {e}");
        return;
    }

    loop {
        if cancel.is_cancelled() {
            return;
        }

        match socket.read() {
            Ok(Message::Text(text)) => match parse_server_message(&text) {
                Ok(ServerMessage::NewMails { data }) => {
                    debug!("push batch of {} record(s)", data.len());
                    if tx.send(PushEvent::Batch(data)).is_err() {
                        // nobody is listening any more
                        cancel.cancel();
                    }
                }
                Ok(ServerMessage::Unknown) => {}
                Err(e) => warn!("dropping malformed push message: {e}"),
            },
            Ok(Message::Close(frame)) => {
                info!("push channel closed by server: {frame:?}");
                return;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                return;
            }
            Err(e) => {
                warn!("push channel read error: {e}");
                return;
            }
        }
    }
}
