//! Main application loop
//!
//! The App owns the session and the terminal input handler, and processes
//! one event at a time from either source.

use std::time::Duration;

use crossterm::event::KeyEvent;

use birdactyl_utils::{ConsoleError, Result};

use crate::session::{HistoryDirection, Session};

use super::event::{AppEvent, EventHandler};
use super::input::{map_key, InputLine, KeyAction};
use super::render::{self, View};
use super::terminal::Terminal;

/// Lines moved per PageUp/PageDown
const SCROLL_STEP: usize = 10;

pub struct App {
    session: Session,
    events: EventHandler,
    input: InputLine,
    /// Lines scrolled up from the bottom of the console
    scroll: usize,
    /// Last error or notice, shown in the footer until the next key press
    message: Option<String>,
    quit: bool,
}

impl App {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            events: EventHandler::new(Duration::from_millis(250)),
            input: InputLine::new(),
            scroll: 0,
            message: None,
            quit: false,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Run until the user quits
    pub async fn run(&mut self) -> Result<()> {
        let mut terminal = Terminal::new()?;
        self.events.start_input_polling();

        while !self.should_quit() {
            self.draw(&mut terminal)?;

            tokio::select! {
                Some(event) = self.session.next_event() => {
                    let before = self.session.logs().total_appended();
                    self.session.handle_event(event);
                    self.follow_output(before);
                }
                event = self.events.next() => match event {
                    Some(event) => self.handle_app_event(event).await,
                    None => break,
                },
            }
        }

        self.session.close();
        Ok(())
    }

    fn draw(&self, terminal: &mut Terminal) -> Result<()> {
        let view = View {
            session: &self.session,
            input: &self.input,
            scroll: self.scroll,
            message: self.message.as_deref(),
        };
        terminal
            .terminal_mut()
            .draw(|frame| render::draw(frame, &view))?;
        Ok(())
    }

    async fn handle_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Key(key) => self.handle_key(key).await,
            AppEvent::Paste(text) => self.input.insert_str(&text),
            AppEvent::Resize { .. } | AppEvent::Tick => {}
        }
    }

    async fn handle_key(&mut self, key: KeyEvent) {
        let action = map_key(&key);
        if action != KeyAction::None {
            self.message = None;
        }

        match action {
            KeyAction::Quit => self.quit = true,
            KeyAction::Submit => {
                let line = self.input.take();
                match self.session.submit_command(&line).await {
                    Ok(()) => self.scroll = 0,
                    Err(e) => {
                        self.input.set(line);
                        self.report(e);
                    }
                }
            }
            KeyAction::HistoryOlder => {
                let recalled = self.session.navigate_history(HistoryDirection::Older);
                self.input.set(recalled);
            }
            KeyAction::HistoryNewer => {
                let recalled = self.session.navigate_history(HistoryDirection::Newer);
                self.input.set(recalled);
            }
            KeyAction::Power(action) => {
                if let Err(e) = self.session.request_power_action(action) {
                    self.report(e);
                }
            }
            KeyAction::ScrollUp => {
                self.scroll = scroll_up(self.scroll, self.session.logs().len());
            }
            KeyAction::ScrollDown => {
                self.scroll = self.scroll.saturating_sub(SCROLL_STEP);
            }
            KeyAction::Edit(edit) => self.input.apply(edit),
            KeyAction::None => {}
        }
    }

    /// Keep the viewport anchored while scrolled up and new lines arrive
    fn follow_output(&mut self, before: u64) {
        let logs = self.session.logs();
        let added = logs.total_appended().saturating_sub(before) as usize;
        self.scroll = anchored_scroll(self.scroll, added, logs.len());
    }

    fn report(&mut self, error: ConsoleError) {
        tracing::debug!(error = %error, "Action refused");
        self.message = Some(match error {
            ConsoleError::NotConnected => "Not connected; command kept in the input line".into(),
            // Already explained in the console.
            ConsoleError::PermissionDenied(_) => return,
            other => other.to_string(),
        });
    }
}

fn scroll_up(scroll: usize, len: usize) -> usize {
    (scroll + SCROLL_STEP).min(len)
}

/// Offset from the bottom after `added` lines arrive; 0 follows the tail
fn anchored_scroll(scroll: usize, added: usize, len: usize) -> usize {
    if scroll == 0 {
        0
    } else {
        (scroll + added).min(len)
    }
}
