//! Append-only session journal
//!
//! Ordered record of every decision, rejection, trade, and system event.
//! The rendered document doubles as the model context: whatever was
//! appended is exactly what the model sees on the next cycle.
//!
//! Single writer (the orchestrator), so no locking. Appends are durable
//! before the loop proceeds.

use crate::config::{JournalConfig, TradingConstraints};
use crate::error::{AgentError, Result};
use crate::models::{EntryKind, JournalEntry};
use crate::state::SessionState;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct Journal {
    path: PathBuf,
    file: File,
    header: String,
    entries: Vec<JournalEntry>,
}

impl Journal {
    /// Create the session journal file and write its header: session
    /// metadata plus the five safety limits, so the model always sees
    /// the envelope it operates under.
    pub fn create(
        config: &JournalConfig,
        state: &SessionState,
        constraints: &TradingConstraints,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.directory).map_err(|e| {
            AgentError::Journal(format!(
                "cannot create journal directory {}: {}",
                config.directory.display(),
                e
            ))
        })?;

        let filename = format!(
            "{}_{}{}",
            config.prefix,
            Utc::now().format("%Y%m%dT%H%M%SZ"),
            config.extension
        );
        let path = config.directory.join(filename);

        let header = render_header(state, constraints);

        let mut file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                AgentError::Journal(format!("cannot create journal {}: {}", path.display(), e))
            })?;
        file.write_all(header.as_bytes())?;
        file.sync_data()?;

        debug!(path = %path.display(), "Journal created");

        Ok(Self {
            path,
            file,
            header,
            entries: Vec::new(),
        })
    }

    /// Append an entry, assigning the next sequence number. The write is
    /// flushed to disk before returning so the next context render always
    /// observes it.
    pub fn append(&mut self, kind: EntryKind, payload: impl Into<String>) -> Result<u64> {
        let entry = JournalEntry {
            sequence: self.entries.len() as u64 + 1,
            kind,
            payload: payload.into(),
            recorded_at: Utc::now(),
        };

        let block = render_entry(&entry);
        self.file.write_all(block.as_bytes())?;
        self.file.sync_data()?;

        debug!(
            sequence = entry.sequence,
            kind = %entry.kind,
            "Journal entry appended"
        );

        let sequence = entry.sequence;
        self.entries.push(entry);
        Ok(sequence)
    }

    /// Serialize the full journal in sequence order. This exact text is
    /// the context handed to the decision provider.
    pub fn render_context(&self) -> String {
        let mut out = String::with_capacity(
            self.header.len() + self.entries.iter().map(|e| e.payload.len() + 64).sum::<usize>(),
        );
        out.push_str(&self.header);
        for entry in &self.entries {
            out.push_str(&render_entry(entry));
        }
        out
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn render_header(state: &SessionState, constraints: &TradingConstraints) -> String {
    format!(
        "# Trading Journal - {}\n\n\
         Start Time: {}\n\
         Deadline: {}\n\
         Max Runtime (hours): {}\n\
         Profit Target (USDC): {}\n\
         Max Trades: {}\n\
         Max Buy (USDC): {}\n\
         Forbidden Assets: {}\n\n",
        state.session_id,
        state.started_at.to_rfc3339(),
        state.deadline.to_rfc3339(),
        constraints.max_runtime.num_hours(),
        constraints.profit_target_usdc,
        constraints.max_trades,
        constraints.max_buy_usdc,
        constraints.forbidden_assets.join(", "),
    )
}

fn render_entry(entry: &JournalEntry) -> String {
    format!(
        "## {} #{} ({} UTC)\n\n{}\n\n",
        entry.kind,
        entry.sequence,
        entry.recorded_at.format("%Y-%m-%dT%H:%M:%S"),
        entry.payload,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_config() -> JournalConfig {
        JournalConfig {
            directory: std::env::temp_dir().join(format!("journal-test-{}", Uuid::new_v4())),
            ..JournalConfig::default()
        }
    }

    fn new_journal() -> (Journal, SessionState, TradingConstraints) {
        let constraints = TradingConstraints::default();
        let state = SessionState::new(&constraints);
        let journal = Journal::create(&test_config(), &state, &constraints).unwrap();
        (journal, state, constraints)
    }

    #[test]
    fn sequences_are_gap_free_and_increasing() {
        let (mut journal, _, _) = new_journal();

        assert_eq!(journal.append(EntryKind::System, "session started").unwrap(), 1);
        assert_eq!(journal.append(EntryKind::Decision, "HOLD").unwrap(), 2);
        assert_eq!(journal.append(EntryKind::Rejection, "forbidden").unwrap(), 3);

        let sequences: Vec<u64> = journal.entries().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn render_reproduces_entries_in_append_order() {
        let (mut journal, _, _) = new_journal();

        let payloads = ["first entry", "second entry", "third entry"];
        journal.append(EntryKind::System, payloads[0]).unwrap();
        journal.append(EntryKind::Trade, payloads[1]).unwrap();
        journal.append(EntryKind::Decision, payloads[2]).unwrap();

        let context = journal.render_context();
        let first = context.find(payloads[0]).unwrap();
        let second = context.find(payloads[1]).unwrap();
        let third = context.find(payloads[2]).unwrap();
        assert!(first < second && second < third);

        // Each entry block is tagged with its kind and sequence.
        assert!(context.contains("## SYSTEM #1"));
        assert!(context.contains("## TRADE #2"));
        assert!(context.contains("## DECISION #3"));
    }

    #[test]
    fn header_carries_session_metadata_and_limits() {
        let (journal, state, _) = new_journal();
        let context = journal.render_context();

        assert!(context.contains(&state.session_id.to_string()));
        assert!(context.contains("Max Runtime (hours): 5"));
        assert!(context.contains("Profit Target (USDC): 50"));
        assert!(context.contains("Max Trades: 15"));
        assert!(context.contains("Max Buy (USDC): 200"));
        assert!(context.contains("Forbidden Assets: SOL, SUI, BTC, ETH"));
    }

    #[test]
    fn appends_are_durable_on_disk() {
        let (mut journal, _, _) = new_journal();
        journal.append(EntryKind::System, "persisted line").unwrap();

        let on_disk = std::fs::read_to_string(journal.path()).unwrap();
        assert!(on_disk.contains("persisted line"));
        assert!(on_disk.starts_with("# Trading Journal"));
    }
}
