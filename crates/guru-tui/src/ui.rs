use guru_core::{Mode, Role, CLEAR_PROMPT};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use crate::app::{App, InputMode, Screen};

fn mode_color(mode: Mode) -> Color {
    match mode {
        Mode::Teacher => Color::Rgb(79, 70, 229),    // indigo
        Mode::Astrologer => Color::Rgb(249, 115, 22), // orange
    }
}

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            // Consume the second *
            chars.next();

            // Push any accumulated plain text
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Home => render_home_screen(app, frame, body_area),
        Screen::Chat(mode) => render_chat_screen(app, frame, body_area, mode),
    }

    render_footer(app, frame, footer_area);

    if app.show_clear_confirm {
        render_clear_confirm(frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![Span::styled(" Guru & Jyotish ", Style::default().fg(Color::Cyan).bold())];

    if let Some(mode) = app.current_mode() {
        spans.push(Span::styled(
            format!(" {} ", mode.config().title),
            Style::default().fg(Color::White).bg(mode_color(mode)).bold(),
        ));
    }

    spans.push(Span::raw(" "));
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::DarkGray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::Home => " HOME ",
        Screen::Chat(Mode::Teacher) => " TEACHER ",
        Screen::Chat(Mode::Astrologer) => " JYOTISH ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = if app.show_clear_confirm {
        vec![
            Span::styled(" y ", key_style),
            Span::styled(" clear ", label_style),
            Span::styled(" any ", key_style),
            Span::styled(" cancel ", label_style),
        ]
    } else {
        match (app.screen, app.input_mode) {
            (Screen::Home, _) => vec![
                Span::styled(" j/k ", key_style),
                Span::styled(" nav ", label_style),
                Span::styled(" Enter ", key_style),
                Span::styled(" open ", label_style),
                Span::styled(" 1/2 ", key_style),
                Span::styled(" jump ", label_style),
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ],
            (Screen::Chat(_), InputMode::Normal) => vec![
                Span::styled(" i ", key_style),
                Span::styled(" type ", label_style),
                Span::styled(" j/k ", key_style),
                Span::styled(" scroll ", label_style),
                Span::styled(" D ", key_style),
                Span::styled(" clear ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" home ", label_style),
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ],
            (Screen::Chat(_), InputMode::Editing) => vec![
                Span::styled(" Enter ", key_style),
                Span::styled(" send ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" stop typing ", label_style),
            ],
        }
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_home_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Choose your guide ");

    let items: Vec<ListItem> = Mode::all()
        .iter()
        .enumerate()
        .map(|(i, &mode)| {
            let config = mode.config();
            let color = mode_color(mode);
            let count = app.controller.messages(mode).len();

            let mut title = vec![
                Span::styled(
                    format!("{}. {}", i + 1, config.title),
                    Style::default().fg(color).bold(),
                ),
                Span::styled(format!("  {}", config.subtitle), Style::default().fg(Color::Gray)),
            ];
            if count > 0 {
                title.push(Span::styled(
                    format!("  [{} messages]", count),
                    Style::default().fg(Color::DarkGray),
                ));
            }

            ListItem::new(Text::from(vec![
                Line::from(title),
                Line::from(Span::styled(
                    format!("   {}", config.description),
                    Style::default().fg(Color::DarkGray),
                )),
                Line::default(),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.home_state);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect, mode: Mode) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let color = mode_color(mode);
    let waiting = app.is_waiting(mode);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(format!(" {} | {} ", mode.config().title, app.provider_label));

    let messages = app.controller.messages(mode);

    let chat_text = if messages.is_empty() {
        Text::from(Span::styled(
            mode.config().description,
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                    lines.push(Line::from(msg.content.clone()));
                }
                Role::Model => {
                    lines.push(Line::from(Span::styled(
                        format!("{}:", mode.persona()),
                        Style::default().fg(color).add_modifier(Modifier::BOLD),
                    )));
                    if msg.content.is_empty() {
                        if waiting {
                            // Animated ellipsis: cycles through ".", "..", "..."
                            let dots = ".".repeat((app.animation_frame as usize) + 1);
                            lines.push(Line::from(Span::styled(
                                format!("Thinking{}", dots),
                                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                            )));
                        } else {
                            lines.push(Line::default());
                        }
                    }
                    // Split response into lines and parse markdown
                    for line in msg.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
            }
            lines.push(Line::default());
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, chat_area);

    let editing = app.input_mode == InputMode::Editing;
    let input_border_color = if editing { Color::Yellow } else { Color::DarkGray };
    let input_title = if waiting {
        format!(" Ask the {} (waiting for reply) ", mode.persona())
    } else {
        format!(" Ask the {} ", mode.persona())
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(input_title);

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, input_area);

    // Show cursor when editing
    if editing && !app.show_clear_confirm {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }
}

fn render_clear_confirm(frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 56.min(area.width.saturating_sub(4));
    let popup_height = 5.min(area.height);

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Clear history ");

    let text = Text::from(vec![
        Line::from(CLEAR_PROMPT),
        Line::default(),
        Line::from(Span::styled(
            "y to clear, any other key to cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ]);

    let popup = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
    frame.render_widget(popup, popup_area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_parse_markdown_bold() {
        let line = parse_markdown_line("Shani is **slow** today");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "slow");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(plain(&line), "Shani is slow today");
    }

    #[test]
    fn test_parse_markdown_unclosed_is_literal() {
        let line = parse_markdown_line("a **b");
        assert_eq!(plain(&line), "a **b");
    }

    #[test]
    fn test_parse_markdown_single_star_is_literal() {
        assert_eq!(plain(&parse_markdown_line("2 * 3")), "2 * 3");
        assert!(parse_markdown_line("").spans.is_empty());
    }
}
