use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use guru_core::Mode;

use crate::app::{App, InputMode, Screen};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
        AppEvent::Fragment { mode, reply_id, text } => app.on_fragment(mode, &reply_id, &text),
        AppEvent::StreamDone(mode) => app.on_stream_done(mode),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // The confirmation popup swallows every key
    if app.show_clear_confirm {
        let yes = matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y'));
        app.confirm_clear(yes);
        return;
    }

    match (app.screen, app.input_mode) {
        (Screen::Home, _) => handle_home(app, key),
        (Screen::Chat(_), InputMode::Normal) => handle_chat_normal(app, key),
        (Screen::Chat(_), InputMode::Editing) => handle_chat_editing(app, key),
    }
}

fn handle_home(app: &mut App, key: KeyEvent) {
    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Navigation
        KeyCode::Char('j') | KeyCode::Down => app.home_down(),
        KeyCode::Char('k') | KeyCode::Up => app.home_up(),

        // Open chat
        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => {
            let mode = app.selected_mode();
            app.open_chat(mode);
        }
        KeyCode::Char('1') => app.open_chat(Mode::Teacher),
        KeyCode::Char('2') => app.open_chat(Mode::Astrologer),

        _ => {}
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Back to home
        KeyCode::Esc | KeyCode::Char('h') => app.back_home(),

        // Start typing
        KeyCode::Char('i') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
            app.input_cursor = app.input.chars().count();
        }

        // Clear this chat (asks first)
        KeyCode::Char('D') => app.request_clear(),

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('g') => app.scroll_chat_to_top(),
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => app.submit_input(),
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_to_byte_index_multibyte() {
        let s = "नमस्ते ji";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 1), "न".len());
        assert_eq!(char_to_byte_index(s, 100), s.len());
    }
}
