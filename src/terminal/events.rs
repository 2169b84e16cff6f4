use ratatui::crossterm::event::{KeyCode, KeyEvent};

use crate::feed::SnapshotSource;
use crate::terminal::state::{AppState, Focus};

/// Returns `true` when the view should close.
pub fn handle_key(key: KeyEvent, state: &mut AppState, source: &dyn SnapshotSource) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return true,

        KeyCode::Tab => {
            state.toggle_focus();
            return false;
        }

        KeyCode::Char('r') => {
            state.reload(source);
            return false;
        }

        KeyCode::Char('h') | KeyCode::Left => {
            state.select_column(-1);
            return false;
        }
        KeyCode::Char('l') | KeyCode::Right => {
            state.select_column(1);
            return false;
        }
        KeyCode::Char('<') | KeyCode::Char('-') => {
            state.resize_selected_column(-2);
            return false;
        }
        KeyCode::Char('>') | KeyCode::Char('+') => {
            state.resize_selected_column(2);
            return false;
        }

        _ => {}
    }

    match state.focus {
        Focus::Table => handle_table_keys(key, state),
        Focus::Body => handle_body_keys(key, state),
    }
    false
}

fn handle_table_keys(key: KeyEvent, state: &mut AppState) {
    match key.code {
        KeyCode::Down | KeyCode::Char('j') => state.move_selection(1),
        KeyCode::Up | KeyCode::Char('k') => state.move_selection(-1),
        KeyCode::Home => state.move_selection(i32::MIN / 2),
        KeyCode::End => state.move_selection(i32::MAX / 2),
        _ => {}
    }
}

fn handle_body_keys(key: KeyEvent, state: &mut AppState) {
    match key.code {
        KeyCode::Down | KeyCode::Char('j') => state.scroll_body(1),
        KeyCode::Up | KeyCode::Char('k') => state.scroll_body(-1),
        KeyCode::PageDown => state.scroll_body(10),
        KeyCode::PageUp => state.scroll_body(-10),
        KeyCode::Home => state.body_scroll = 0,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::domain::mail::{MailContent, MailRecord};
    use crate::store::repo::MemoryStore;
    use ratatui::crossterm::event::KeyModifiers;
    use std::sync::Arc;

    struct Snapshot(Vec<i64>);

    impl SnapshotSource for Snapshot {
        fn latest_mail_records(&self) -> Result<Vec<MailRecord>, ApiError> {
            Ok(self
                .0
                .iter()
                .map(|&id| MailRecord {
                    id,
                    email_id: None,
                    recipient_email: String::new(),
                    sender: String::new(),
                    subject: None,
                    content: MailContent::default(),
                    has_attachments: false,
                    received_time: None,
                })
                .collect())
        }
    }

    fn press(c: KeyCode) -> KeyEvent {
        KeyEvent::new(c, KeyModifiers::NONE)
    }

    #[test]
    fn navigation_and_reload() {
        let src = Snapshot(vec![5, 4, 3]);
        let mut s = AppState::new(Arc::new(MemoryStore::default()));

        assert!(!handle_key(press(KeyCode::Char('r')), &mut s, &src));
        assert_eq!(s.selected_id(), Some(5));

        handle_key(press(KeyCode::End), &mut s, &src);
        assert_eq!(s.selected_id(), Some(3));
        handle_key(press(KeyCode::Char('k')), &mut s, &src);
        assert_eq!(s.selected_id(), Some(4));
        handle_key(press(KeyCode::Home), &mut s, &src);
        assert_eq!(s.selected_id(), Some(5));

        assert!(handle_key(press(KeyCode::Char('q')), &mut s, &src));
    }

    #[test]
    fn body_focus_scrolls_instead_of_moving() {
        let src = Snapshot(vec![2, 1]);
        let mut s = AppState::new(Arc::new(MemoryStore::default()));
        handle_key(press(KeyCode::Char('r')), &mut s, &src);
        handle_key(press(KeyCode::Tab), &mut s, &src);
        handle_key(press(KeyCode::Char('j')), &mut s, &src);

        assert_eq!(s.selected_id(), Some(2));
        assert_eq!(s.body_scroll, 1);
    }

    #[test]
    fn width_keys_resize_selected_column() {
        let src = Snapshot(vec![]);
        let mut s = AppState::new(Arc::new(MemoryStore::default()));
        let before = s.columns.width("sender");
        handle_key(press(KeyCode::Char('>')), &mut s, &src);
        assert_eq!(s.columns.width("sender"), before + 2);
    }
}
