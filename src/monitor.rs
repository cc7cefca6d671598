//! Live and replayed input monitoring
//!
//! Connects to a MIDI input port (or reads a hex dump), runs every message
//! through a [`Device`] and prints what the consumer would receive.

use anyhow::{Context, Result};
use colored::*;
use midir::{MidiInput, MidiInputConnection};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};

use crate::config::MappingWatcher;
use crate::conditioning::ControlValue;
use crate::device::{Device, Dispatch, IgnoreReason};
use crate::midi::{format_hex, parse_hex};

/// Raw input captured by the port callback
#[derive(Debug, Clone)]
struct InputEvent {
    timestamp_ms: u64,
    data: Vec<u8>,
}

/// How often overflow drops are reported
const DROP_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Queue an event from the port callback without blocking
///
/// Returns false when the event was dropped because the queue is full.
fn forward_event(tx: &mpsc::Sender<InputEvent>, dropped: &AtomicU64, event: InputEvent) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
        // monitor is shutting down
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Log and reset the overflow drop count
fn report_dropped(dropped: &AtomicU64) -> u64 {
    let count = dropped.swap(0, Ordering::Relaxed);
    if count > 0 {
        warn!("Input queue full, dropped {} messages", count);
    }
    count
}

/// One-line rendering of a dispatch result
pub fn format_dispatch(dispatch: &Dispatch) -> String {
    match dispatch {
        Dispatch::Emit(event) => {
            let value = match event.value {
                ControlValue::Absolute(v) => format!("abs {:.2}", v),
                ControlValue::Delta(v) => format!("delta {:+.2}", v),
                ControlValue::Position(v) => format!("pos {:+.2}", v),
                ControlValue::Button { pressed: true } => "down".to_string(),
                ControlValue::Button { pressed: false } => "up".to_string(),
                ControlValue::Trigger => "trigger".to_string(),
            };
            format!("{} <- {}", event.control, value)
        }
        Dispatch::Suppressed { control, .. } => format!("{} (soft takeover)", control),
        Dispatch::Script { control, raw, .. } => format!("{} -> script raw={}", control, raw),
        Dispatch::Ignored(IgnoreReason::Malformed) => "malformed".to_string(),
        Dispatch::Ignored(IgnoreReason::Clock) => "clock".to_string(),
        Dispatch::Ignored(IgnoreReason::Unmapped) => "unmapped".to_string(),
    }
}

fn print_dispatch(timestamp_ms: u64, data: &[u8], dispatch: &Dispatch) {
    let line = format_dispatch(dispatch);
    let line = match dispatch {
        Dispatch::Emit(_) => line.green(),
        Dispatch::Suppressed { .. } => line.yellow(),
        Dispatch::Script { .. } => line.cyan(),
        Dispatch::Ignored(_) => line.dimmed(),
    };
    println!(
        "[{:08}ms] {:<10} | {}",
        timestamp_ms,
        format_hex(data),
        line
    );
}

/// Replay a hex dump, one message per line (`#` starts a comment)
pub fn replay(device: &Device, dump: &str) -> Vec<Dispatch> {
    let mut results = Vec::new();
    for (line_no, line) in dump.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        match parse_hex(line) {
            Some(data) => {
                let dispatch = device.process(&data);
                print_dispatch(line_no as u64 + 1, &data, &dispatch);
                results.push(dispatch);
            }
            None => warn!("Skipping unparsable line {}: {}", line_no + 1, line),
        }
    }
    results
}

/// Replay a hex dump file
pub async fn replay_file(device: &Device, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let dump = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read replay file: {}", path.display()))?;

    let results = replay(device, &dump);
    info!("Replayed {} messages from {}", results.len(), path.display());
    Ok(())
}

/// Live monitor on a MIDI input port
pub struct Monitor {
    connection: Option<MidiInputConnection<()>>,
    event_tx: mpsc::Sender<InputEvent>,
    event_rx: mpsc::Receiver<InputEvent>,
    dropped: Arc<AtomicU64>,
    start_time: Instant,
}

impl Monitor {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::channel(1000);

        Self {
            connection: None,
            event_tx,
            event_rx,
            dropped: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    /// Connect to the first input port whose name contains `pattern`
    ///
    /// Returns the full port name.
    pub fn connect(&mut self, pattern: &str) -> Result<String> {
        let midi_in = MidiInput::new("surface-input")?;

        let pattern = pattern.to_lowercase();
        let port = midi_in
            .ports()
            .into_iter()
            .find(|port| {
                midi_in
                    .port_name(port)
                    .map(|name| name.to_lowercase().contains(&pattern))
                    .unwrap_or(false)
            })
            .with_context(|| format!("No input port found matching pattern: {}", pattern))?;
        let port_name = midi_in.port_name(&port)?;

        info!("Connecting to: {}", port_name);

        let event_tx = self.event_tx.clone();
        let dropped = Arc::clone(&self.dropped);
        let start_time = self.start_time;

        let conn = midi_in
            .connect(
                &port,
                "surface-input-monitor",
                move |_timestamp, data, _| {
                    let event = InputEvent {
                        timestamp_ms: start_time.elapsed().as_millis() as u64,
                        data: data.to_vec(),
                    };
                    // port callback must not block
                    forward_event(&event_tx, &dropped, event);
                },
                (),
            )
            .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", port_name, e))?;

        self.connection = Some(conn);
        Ok(port_name)
    }

    /// Process input until `shutdown` resolves
    ///
    /// Mapping updates from the watcher are applied between messages.
    pub async fn run(
        mut self,
        device: Arc<Device>,
        mut watcher: Option<MappingWatcher>,
        shutdown: impl std::future::Future<Output = ()>,
    ) -> Result<()> {
        tokio::pin!(shutdown);
        let mut drop_report = tokio::time::interval(DROP_REPORT_INTERVAL);

        println!("\n{}", "Monitoring control input...".green());
        println!("{}", "Format: [timestamp] HEX | RESULT".dimmed());
        println!("{}\n", "─".repeat(80).dimmed());

        loop {
            tokio::select! {
                Some(event) = self.event_rx.recv() => {
                    let dispatch = device.process(&event.data);
                    print_dispatch(event.timestamp_ms, &event.data, &dispatch);
                }
                _ = drop_report.tick() => {
                    report_dropped(&self.dropped);
                }
                Some(table) = next_table(&mut watcher) => {
                    device.reload(table);
                    println!("{}", "Mapping reloaded".bold().cyan());
                }
                _ = &mut shutdown => {
                    break;
                }
            }
        }

        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        report_dropped(&self.dropped);
        device.reset();
        Ok(())
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

async fn next_table(
    watcher: &mut Option<MappingWatcher>,
) -> Option<Arc<crate::mapping::MappingTable>> {
    match watcher {
        Some(w) => w.next_table().await,
        None => std::future::pending().await,
    }
}
