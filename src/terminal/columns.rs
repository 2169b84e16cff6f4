use anyhow::Result;
use log::warn;
use std::collections::BTreeMap;

use crate::store::repo::KeyValueStore;

/// Store key for the live feed table's column widths.
pub const LATEST_MAIL_COLUMNS_KEY: &str = "columns.latest_mail";

pub const MIN_WIDTH: u16 = 3;
pub const MAX_WIDTH: u16 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub title: &'static str,
    pub default_width: u16,
}

pub const FEED_COLUMNS: [Column; 5] = [
    Column {
        name: "received",
        title: "Received",
        default_width: 12,
    },
    Column {
        name: "sender",
        title: "Sender",
        default_width: 28,
    },
    Column {
        name: "subject",
        title: "Subject",
        default_width: 40,
    },
    Column {
        name: "recipient",
        title: "Recipient",
        default_width: 28,
    },
    Column {
        name: "attachments",
        title: "Att",
        default_width: 3,
    },
];

/// Per-column widths, persisted as a JSON object mapping column name to width.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnWidths {
    columns: &'static [Column],
    widths: BTreeMap<&'static str, u16>,
}

impl ColumnWidths {
    pub fn defaults(columns: &'static [Column]) -> Self {
        Self {
            columns,
            widths: columns.iter().map(|c| (c.name, c.default_width)).collect(),
        }
    }

    /// Loads saved widths; unreadable or unknown entries fall back to defaults.
    pub fn load(store: &dyn KeyValueStore, key: &str, columns: &'static [Column]) -> Self {
        let mut out = Self::defaults(columns);
        let saved = match store.get(key) {
            Ok(Some(s)) => s,
            Ok(None) => return out,
            Err(e) => {
                warn!("could not read column widths: {e}");
                return out;
            }
        };
        match serde_json::from_str::<BTreeMap<String, u16>>(&saved) {
            Ok(map) => {
                for c in columns {
                    if let Some(w) = map.get(c.name) {
                        out.widths.insert(c.name, (*w).clamp(MIN_WIDTH, MAX_WIDTH));
                    }
                }
            }
            Err(e) => warn!("ignoring saved column widths: {e}"),
        }
        out
    }

    pub fn save(&self, store: &dyn KeyValueStore, key: &str) -> Result<()> {
        store.set(key, &serde_json::to_string(&self.widths)?)
    }

    pub fn columns(&self) -> &'static [Column] {
        self.columns
    }

    pub fn width(&self, name: &str) -> u16 {
        self.widths.get(name).copied().unwrap_or(MIN_WIDTH)
    }

    pub fn widths(&self) -> Vec<u16> {
        self.columns.iter().map(|c| self.width(c.name)).collect()
    }

    /// Grows or shrinks one column, returning its new width.
    pub fn resize(&mut self, index: usize, delta: i16) -> Option<u16> {
        let col = self.columns.get(index)?;
        let w = self.width(col.name).saturating_add_signed(delta);
        let w = w.clamp(MIN_WIDTH, MAX_WIDTH);
        self.widths.insert(col.name, w);
        Some(w)
    }
}
