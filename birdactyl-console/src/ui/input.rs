//! Command line editing and key bindings

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use birdactyl_protocol::PowerAction;

/// What a key press means to the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Submit,
    HistoryOlder,
    HistoryNewer,
    Power(PowerAction),
    ScrollUp,
    ScrollDown,
    Quit,
    Edit(Edit),
    None,
}

/// In-place edit of the input line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    Insert(char),
    Backspace,
    Delete,
    Left,
    Right,
    Home,
    End,
    Clear,
}

/// Translate a key press
pub fn map_key(key: &KeyEvent) -> KeyAction {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('c') if ctrl => KeyAction::Quit,
        KeyCode::Char('s') if ctrl => KeyAction::Power(PowerAction::Start),
        KeyCode::Char('x') if ctrl => KeyAction::Power(PowerAction::Stop),
        KeyCode::Char('r') if ctrl => KeyAction::Power(PowerAction::Restart),
        KeyCode::Char('k') if ctrl => KeyAction::Power(PowerAction::Kill),
        KeyCode::Char('u') if ctrl => KeyAction::Edit(Edit::Clear),
        KeyCode::Char('a') if ctrl => KeyAction::Edit(Edit::Home),
        KeyCode::Char('e') if ctrl => KeyAction::Edit(Edit::End),
        KeyCode::Char(_) if ctrl => KeyAction::None,
        KeyCode::Char(c) => KeyAction::Edit(Edit::Insert(c)),
        KeyCode::Enter => KeyAction::Submit,
        KeyCode::Up => KeyAction::HistoryOlder,
        KeyCode::Down => KeyAction::HistoryNewer,
        KeyCode::PageUp => KeyAction::ScrollUp,
        KeyCode::PageDown => KeyAction::ScrollDown,
        KeyCode::Backspace => KeyAction::Edit(Edit::Backspace),
        KeyCode::Delete => KeyAction::Edit(Edit::Delete),
        KeyCode::Left => KeyAction::Edit(Edit::Left),
        KeyCode::Right => KeyAction::Edit(Edit::Right),
        KeyCode::Home => KeyAction::Edit(Edit::Home),
        KeyCode::End => KeyAction::Edit(Edit::End),
        _ => KeyAction::None,
    }
}

/// Single-line editor; the cursor counts characters, not bytes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputLine {
    text: String,
    cursor: usize,
}

impl InputLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Replace the contents and move the cursor to the end
    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.cursor = self.text.chars().count();
    }

    /// Take the contents, leaving the line empty
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    pub fn insert_str(&mut self, s: &str) {
        for c in s.chars().filter(|c| !c.is_control()) {
            self.apply(Edit::Insert(c));
        }
    }

    pub fn apply(&mut self, edit: Edit) {
        let len = self.text.chars().count();
        match edit {
            Edit::Insert(c) => {
                let at = self.byte_index(self.cursor);
                self.text.insert(at, c);
                self.cursor += 1;
            }
            Edit::Backspace if self.cursor > 0 => {
                let at = self.byte_index(self.cursor - 1);
                self.text.remove(at);
                self.cursor -= 1;
            }
            Edit::Delete if self.cursor < len => {
                let at = self.byte_index(self.cursor);
                self.text.remove(at);
            }
            Edit::Left => self.cursor = self.cursor.saturating_sub(1),
            Edit::Right => self.cursor = (self.cursor + 1).min(len),
            Edit::Home => self.cursor = 0,
            Edit::End => self.cursor = len,
            Edit::Clear => {
                self.text.clear();
                self.cursor = 0;
            }
            Edit::Backspace | Edit::Delete => {}
        }
    }

    fn byte_index(&self, chars: usize) -> usize {
        self.text
            .char_indices()
            .nth(chars)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }
}
