pub mod columns;
pub mod events;
pub mod state;
pub mod ui;

use anyhow::Result;
use ratatui::DefaultTerminal;
use ratatui::crossterm::event::{self, Event, KeyEventKind};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;
use url::Url;

use crate::api::ApiClient;
use crate::push::{PushChannel, PushEvent};
use crate::store::repo::KeyValueStore;
use crate::terminal::state::AppState;

const FRAME_POLL: Duration = Duration::from_millis(200);

/// Runs the live feed view. The push channel lives exactly as long as the view.
pub fn run_tui(
    api: &ApiClient,
    ws_url: Url,
    token: String,
    store: Arc<dyn KeyValueStore>,
) -> Result<()> {
    let mut state = AppState::new(store);

    let (tx, rx) = mpsc::channel();
    let push = PushChannel::spawn(ws_url, token, tx)?;

    let terminal = ratatui::init();
    state.loading = true;
    let result = run(terminal, &mut state, api, &rx);
    ratatui::restore();

    push.shutdown();
    result
}

fn run(
    mut terminal: DefaultTerminal,
    state: &mut AppState,
    api: &ApiClient,
    rx: &Receiver<PushEvent>,
) -> Result<()> {
    // draw the loading indicator before the first fetch blocks
    terminal.draw(|f| ui::render(f, state))?;
    state.reload(api);

    loop {
        state.drain_push(rx);

        terminal.draw(|f| ui::render(f, state))?;

        if !event::poll(FRAME_POLL)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if key.code == event::KeyCode::Char('r') {
                state.loading = true;
                terminal.draw(|f| ui::render(f, state))?;
            }
            if events::handle_key(key, state, api) {
                break;
            }
        }
    }
    Ok(())
}
