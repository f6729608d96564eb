//! Terminal input events
//!
//! Crossterm is polled on a dedicated thread; its events are forwarded to
//! the async side through an unbounded channel. Session events are merged
//! in by the app loop, not here.

use std::time::Duration;

use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Key(KeyEvent),
    /// Bracketed paste
    Paste(String),
    Resize { cols: u16, rows: u16 },
    /// Redraw tick for the clock and staleness display
    Tick,
}

pub struct EventHandler {
    tx: mpsc::UnboundedSender<AppEvent>,
    rx: mpsc::UnboundedReceiver<AppEvent>,
    tick_rate: Duration,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx, tick_rate }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.tx.clone()
    }

    /// Start polling terminal input on a background thread
    pub fn start_input_polling(&self) {
        let tx = self.tx.clone();
        let tick_rate = self.tick_rate;

        std::thread::spawn(move || loop {
            let event = if event::poll(tick_rate).unwrap_or(false) {
                match event::read() {
                    Ok(CrosstermEvent::Key(key)) if key.kind != KeyEventKind::Release => {
                        AppEvent::Key(key)
                    }
                    Ok(CrosstermEvent::Paste(text)) => AppEvent::Paste(text),
                    Ok(CrosstermEvent::Resize(cols, rows)) => AppEvent::Resize { cols, rows },
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::error!("Error reading terminal event: {}", e);
                        break;
                    }
                }
            } else {
                AppEvent::Tick
            };
            if tx.send(event).is_err() {
                break;
            }
        });
    }

    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }
}
