use gptcli_core::commands::help_lines;
use gptcli_core::llm::Role;
use ratatui::{
    layout::{Constraint, Direction, Layout, Position, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
    },
    Frame,
};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::input::TextInput;
use crate::app::modal::{Modal, ModelPickerState, NewChatField};
use crate::app::{App, Focus};
use crate::strings::{
    build_status_line, confirm_delete_message, details_lines, help_lines_ascii, stick_label,
    waiting_label, EMPTY_CHAT_LIST, EMPTY_NO_CHAT, EMPTY_NO_MESSAGES, INPUT_HINT, TITLE_CHATS,
    TITLE_CONFIRM, TITLE_CONVERSATION, TITLE_DETAILS, TITLE_HELP, TITLE_INPUT, TITLE_MODEL_PICKER,
    TITLE_NEW_CHAT, TITLE_SYSTEM_PROMPT,
};

const LEFT_WIDTH: u16 = 34;
const DETAILS_HEIGHT: u16 = 16;

pub fn draw(f: &mut Frame, app: &mut App) {
    let area = f.area();
    let main_area = if app.show_chat_list {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(LEFT_WIDTH), Constraint::Min(20)])
            .split(area);
        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(5), Constraint::Length(DETAILS_HEIGHT)])
            .split(cols[0]);
        app.chat_list_area = Some(left[0]);
        app.ensure_chat_list_visible();
        draw_chat_list(f, left[0], app);
        draw_details(f, left[1], app);
        cols[1]
    } else {
        app.chat_list_area = None;
        area
    };
    draw_main(f, main_area, app);

    match &app.modal {
        Some(Modal::NewChat {
            name,
            system_prompt,
            field,
            error,
        }) => draw_new_chat(f, area, app, name, system_prompt, *field, error.as_deref()),
        Some(Modal::ConfirmDelete { chat }) => draw_confirm(f, area, chat),
        Some(Modal::EditSystemPrompt { chat, editor }) => {
            draw_system_prompt_editor(f, area, chat, editor)
        }
        Some(Modal::ModelPicker(state)) => draw_model_picker(f, area, app, state),
        Some(Modal::Help) => draw_help(f, area),
        Some(Modal::Info {
            title,
            lines,
            scroll,
        }) => draw_info(f, area, title, lines, *scroll),
        None => {}
    }
}

fn border_style(app: &App, focused: bool) -> Style {
    if focused {
        Style::default().fg(app.theme.border_focus)
    } else {
        Style::default().fg(app.theme.border_inactive)
    }
}

fn title_span(app: &App, title: &str) -> Span<'static> {
    Span::styled(
        title.to_string(),
        Style::default()
            .fg(app.theme.title)
            .add_modifier(Modifier::BOLD),
    )
}

fn inner(area: Rect) -> Rect {
    Rect {
        x: area.x.saturating_add(1),
        y: area.y.saturating_add(1),
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    }
}

fn draw_scrollbar(f: &mut Frame, area: Rect, total: usize, position: usize) {
    let inner = inner(area);
    if total > inner.height as usize {
        let mut sb_state = ScrollbarState::new(total).position(position);
        let sb = Scrollbar::default().orientation(ScrollbarOrientation::VerticalRight);
        f.render_stateful_widget(sb, inner, &mut sb_state);
    }
}

fn draw_chat_list(f: &mut Frame, area: Rect, app: &App) {
    let focused = app.focus == Focus::ChatList;
    let block = Block::default()
        .title(title_span(app, TITLE_CHATS))
        .borders(Borders::ALL)
        .border_style(border_style(app, focused));
    if app.chats.is_empty() {
        let hint = Paragraph::new(Span::styled(
            EMPTY_CHAT_LIST,
            Style::default().fg(app.theme.hint),
        ))
        .block(block)
        .wrap(Wrap { trim: false });
        f.render_widget(hint, area);
        return;
    }
    let inner_h = area.height.saturating_sub(2) as usize;
    let start = app.chat_list_scroll as usize;
    let mut lines: Vec<Line> = Vec::new();
    for (i, c) in app.chats.iter().enumerate().skip(start).take(inner_h) {
        let selected = i == app.selected;
        let active = app.active_chat.as_deref() == Some(c.name.as_str());
        let prefix = if selected { "> " } else { "  " };
        let style = if selected && focused {
            Style::default()
                .fg(app.theme.selected_fg)
                .bg(app.theme.selected_bg)
                .add_modifier(Modifier::BOLD)
        } else if active {
            Style::default()
                .fg(app.theme.border_focus)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::styled(format!("{}{}", prefix, c.name), style),
            Span::styled(
                format!(" ({})", c.message_count),
                Style::default().fg(app.theme.hint),
            ),
        ]));
    }
    f.render_widget(Paragraph::new(lines).block(block), area);
    draw_scrollbar(f, area, app.chats.len(), start);
}

fn draw_details(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(title_span(app, TITLE_DETAILS))
        .borders(Borders::ALL)
        .border_style(border_style(app, false));
    let lines: Vec<Line> = details_lines(app.details.as_ref())
        .into_iter()
        .map(Line::from)
        .collect();
    let para = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(para, area);
}

fn draw_main(f: &mut Frame, area: Rect, app: &mut App) {
    let inner_width = area.width.saturating_sub(2);
    let input_total_lines = measure_total_lines(&app.input.text, inner_width).max(1) as u16;
    let target_lines = input_total_lines.min(app.input_max_lines);
    // Grow or shrink the input box one line per frame.
    let current = app.input_visible_lines.max(1);
    app.input_visible_lines = match current.cmp(&target_lines) {
        std::cmp::Ordering::Less => current + 1,
        std::cmp::Ordering::Greater => current - 1,
        std::cmp::Ordering::Equal => current,
    };
    let input_height = app.input_visible_lines + 2;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),
            Constraint::Length(1),
            Constraint::Length(input_height),
        ])
        .split(area);

    app.chat_area = Some(chunks[0]);
    draw_conversation(f, chunks[0], app);
    draw_status(f, chunks[1], app);
    draw_input(f, chunks[2], app, inner_width);
}

fn draw_conversation(f: &mut Frame, area: Rect, app: &mut App) {
    let title = match &app.active_chat {
        Some(chat) => format!(" {} ", chat),
        None => TITLE_CONVERSATION.to_string(),
    };
    let block = Block::default()
        .title(title_span(app, &title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.theme.chat_border));

    let empty = if app.active_chat.is_none() {
        Some(EMPTY_NO_CHAT)
    } else if app.messages.is_empty() {
        Some(EMPTY_NO_MESSAGES)
    } else {
        None
    };
    if let Some(text) = empty {
        let para = Paragraph::new(Span::styled(text, Style::default().fg(app.theme.hint)))
            .block(block)
            .wrap(Wrap { trim: false });
        f.render_widget(para, area);
        app.chat_viewport = area.height.saturating_sub(2);
        return;
    }

    let inner_width = area.width.saturating_sub(2);
    let inner_height = area.height.saturating_sub(2);
    app.ensure_chat_wrapped(inner_width);
    let (viewport, _max_scroll, start_offset, total) = app.compute_chat_layout(inner_height);
    app.chat_viewport = viewport as u16;

    let user_style = Style::default()
        .fg(app.theme.user)
        .add_modifier(Modifier::BOLD);
    let assistant_style = Style::default()
        .fg(app.theme.assistant)
        .add_modifier(Modifier::BOLD);
    let mut skip = start_offset;
    let mut vis_lines: Vec<Line> = Vec::with_capacity(viewport);
    for cached in &app.chat_cache {
        if vis_lines.len() >= viewport {
            break;
        }
        if skip >= cached.lines.len() {
            skip -= cached.lines.len();
            continue;
        }
        let header_style = match cached.role {
            Role::User => user_style,
            Role::Assistant | Role::System => assistant_style,
        };
        for (i, line) in cached.lines.iter().enumerate().skip(skip) {
            if vis_lines.len() >= viewport {
                break;
            }
            let style = if i == 0 { header_style } else { Style::default() };
            vis_lines.push(Line::from(Span::styled(line.clone(), style)));
        }
        skip = 0;
    }

    f.render_widget(Paragraph::new(vis_lines).block(block), area);
    draw_scrollbar(f, area, total, start_offset);
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let line = if let Some(model) = app.waiting_for() {
        Line::from(Span::styled(
            waiting_label(app.tick, model),
            Style::default().fg(app.theme.info),
        ))
    } else if let Some(n) = &app.notice {
        let color = if n.is_error {
            app.theme.error
        } else {
            app.theme.info
        };
        Line::from(Span::styled(n.text.clone(), Style::default().fg(color)))
    } else {
        let model = app
            .details
            .as_ref()
            .map(|d| d.model.as_str())
            .unwrap_or_default();
        let chat = app.active_chat.as_deref().map(|c| (c, model));
        let tips = build_status_line(
            &stick_label(app.chat_scroll),
            app.focus.label(),
            chat,
            app.history.len(),
            area.width,
        );
        Line::from(Span::styled(tips, Style::default().fg(app.theme.hint)))
    };
    f.render_widget(Paragraph::new(line), area);
}

fn draw_input(f: &mut Frame, area: Rect, app: &App, inner_width: u16) {
    let focused = app.focus == Focus::Input && app.modal.is_none();
    let block = Block::default()
        .title(title_span(app, TITLE_INPUT))
        .borders(Borders::ALL)
        .border_style(border_style(app, focused));
    let graphemes: Vec<&str> = app.input.text.graphemes(true).collect();
    let upto = app.input.cursor.min(graphemes.len());
    let (line_idx, col_width) = measure_prefix_line_col(&graphemes, upto, inner_width);
    let offset_y = line_idx.saturating_sub(app.input_visible_lines.saturating_sub(1));

    let para = if app.input.is_empty() {
        Paragraph::new(Span::styled(INPUT_HINT, Style::default().fg(app.theme.hint)))
            .block(block)
            .wrap(Wrap { trim: false })
    } else {
        Paragraph::new(app.input.text.clone())
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((offset_y, 0))
    };
    f.render_widget(para, area);

    if focused {
        let cursor_x = area.x + 1 + col_width;
        let cursor_y = area.y + 1 + line_idx.saturating_sub(offset_y);
        f.set_cursor_position(Position::new(cursor_x, cursor_y));
    }
}

fn popup(f: &mut Frame, app: &App, area: Rect, title: &str) -> Block<'static> {
    f.render_widget(Clear, area);
    Block::default()
        .title(title_span(app, title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.theme.border_focus))
}

/// Cursor cell for a single-field editor whose text starts at `origin`.
fn field_cursor(input: &TextInput, origin: Position, width: u16) -> Position {
    let graphemes: Vec<&str> = input.text.graphemes(true).collect();
    let upto = input.cursor.min(graphemes.len());
    let (line, col) = measure_prefix_line_col(&graphemes, upto, width);
    Position::new(origin.x + col, origin.y + line)
}

fn draw_new_chat(
    f: &mut Frame,
    area: Rect,
    app: &App,
    name: &TextInput,
    system_prompt: &TextInput,
    field: NewChatField,
    error: Option<&str>,
) {
    let popup_area = centered_rect(60, 40, area);
    let block = popup(f, app, popup_area, TITLE_NEW_CHAT);
    let label = |text: &'static str, active: bool| {
        let style = if active {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(app.theme.hint)
        };
        Line::from(Span::styled(text, style))
    };
    let prompt_line = system_prompt.text.replace('\n', " ");
    let mut lines = vec![
        label("Chat name:", field == NewChatField::Name),
        Line::from(format!(">> {}", name.text)),
        Line::from(""),
        label(
            "System prompt (preset name or text, optional):",
            field == NewChatField::SystemPrompt,
        ),
        Line::from(format!(">> {}", prompt_line)),
        Line::from(""),
        Line::from(Span::styled(
            "Tab: switch field    Enter: create    Esc: cancel",
            Style::default().fg(app.theme.hint),
        )),
    ];
    if let Some(e) = error {
        lines.push(Line::from(Span::styled(
            e.to_string(),
            Style::default().fg(app.theme.error),
        )));
    }
    f.render_widget(Paragraph::new(lines).block(block), popup_area);

    let (input, row) = match field {
        NewChatField::Name => (name, 2),
        NewChatField::SystemPrompt => (system_prompt, 5),
    };
    let prefix: String = input.text.graphemes(true).take(input.cursor).collect();
    let col = UnicodeWidthStr::width(prefix.replace('\n', " ").as_str()) as u16;
    let x = (popup_area.x + 4 + col).min(popup_area.right().saturating_sub(2));
    f.set_cursor_position(Position::new(x, popup_area.y + row));
}

fn draw_confirm(f: &mut Frame, area: Rect, chat: &str) {
    let popup_area = centered_rect(60, 20, area);
    f.render_widget(Clear, popup_area);
    let block = Block::default()
        .title(Span::styled(
            TITLE_CONFIRM,
            Style::default().add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL);
    let para = Paragraph::new(confirm_delete_message(chat))
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(para, popup_area);
}

fn draw_system_prompt_editor(f: &mut Frame, area: Rect, chat: &str, editor: &TextInput) {
    let popup_area = centered_rect(70, 50, area);
    f.render_widget(Clear, popup_area);
    let block = Block::default()
        .title(Span::styled(
            TITLE_SYSTEM_PROMPT,
            Style::default().add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL);
    let body = inner(popup_area);
    f.render_widget(block, popup_area);
    if body.height < 3 {
        return;
    }
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Min(1)])
        .split(body);
    let header = vec![
        Line::from(format!("Chat: {}", chat)),
        Line::from("Preset name or custom text; empty clears. Enter: save  Shift+Enter: newline  Esc: cancel"),
    ];
    f.render_widget(Paragraph::new(header), rows[0]);

    let (line, _) = {
        let graphemes: Vec<&str> = editor.text.graphemes(true).collect();
        measure_prefix_line_col(&graphemes, editor.cursor.min(graphemes.len()), rows[1].width)
    };
    let offset_y = line.saturating_sub(rows[1].height.saturating_sub(1));
    let para = Paragraph::new(editor.text.clone())
        .wrap(Wrap { trim: false })
        .scroll((offset_y, 0));
    f.render_widget(para, rows[1]);
    let pos = field_cursor(editor, rows[1].as_position(), rows[1].width);
    f.set_cursor_position(Position::new(pos.x, pos.y.saturating_sub(offset_y)));
}

fn draw_model_picker(f: &mut Frame, area: Rect, app: &App, state: &ModelPickerState) {
    let popup_area = centered_rect(60, 60, area);
    let block = popup(f, app, popup_area, TITLE_MODEL_PICKER);

    let mut lines: Vec<Line> = Vec::new();
    lines.push(Line::from(format!(">> {}", state.filter.text)));
    let max_list = popup_area.height.saturating_sub(3) as usize;
    let start = (state.selected + 1).saturating_sub(max_list);
    for (i, m) in state.filtered.iter().enumerate().skip(start).take(max_list) {
        let sel = i == state.selected;
        let style = if sel {
            Style::default()
                .fg(app.theme.selected_fg)
                .bg(app.theme.selected_bg)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(
            format!("{} {}", if sel { ">" } else { " " }, m),
            style,
        )));
    }
    if state.filtered.is_empty() && !state.filter.is_empty() {
        lines.push(Line::from(Span::styled(
            "  Enter uses the typed name",
            Style::default().fg(app.theme.hint),
        )));
    }
    f.render_widget(Paragraph::new(lines).block(block), popup_area);
    let origin = Position::new(popup_area.x + 4, popup_area.y + 1);
    f.set_cursor_position(field_cursor(&state.filter, origin, u16::MAX));
}

fn draw_help(f: &mut Frame, area: Rect) {
    let popup_area = centered_rect(70, 70, area);
    f.render_widget(Clear, popup_area);
    let block = Block::default()
        .title(Span::styled(
            TITLE_HELP,
            Style::default().add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL);
    let mut lines: Vec<Line> = help_lines_ascii().iter().map(|s| Line::from(*s)).collect();
    lines.extend(help_lines().into_iter().map(|s| Line::from(format!("  {}", s))));
    let para = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(para, popup_area);
}

fn draw_info(f: &mut Frame, area: Rect, title: &str, lines: &[String], scroll: u16) {
    let popup_area = centered_rect(70, 60, area);
    f.render_widget(Clear, popup_area);
    let block = Block::default()
        .title(Span::styled(
            title.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL);
    let body: Vec<Line> = lines.iter().map(|l| Line::from(l.as_str())).collect();
    let para = Paragraph::new(body)
        .block(block)
        .scroll((scroll, 0));
    f.render_widget(para, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vert[1]);
    horiz[1]
}

fn measure_total_lines(s: &str, width: u16) -> usize {
    if width == 0 {
        return 1;
    }
    let mut lines = 1usize;
    let mut col = 0usize;
    for g in s.graphemes(true) {
        if g == "\n" {
            lines += 1;
            col = 0;
            continue;
        }
        let w = UnicodeWidthStr::width(g);
        if col + w > width as usize {
            lines += 1;
            col = 0;
        }
        col += w;
    }
    lines
}

/// (line, column) of the cell after the first `upto` graphemes.
fn measure_prefix_line_col(graphemes: &[&str], upto: usize, width: u16) -> (u16, u16) {
    if width == 0 {
        return (0, 0);
    }
    let mut line = 0usize;
    let mut col = 0usize;
    for g in graphemes.iter().take(upto) {
        if *g == "\n" {
            line += 1;
            col = 0;
            continue;
        }
        let w = UnicodeWidthStr::width(*g);
        if col + w > width as usize {
            line += 1;
            col = 0;
        }
        col += w;
    }
    (line as u16, col as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::app_with_chat;
    use gptcli_core::store::ChatMessage;
    use ratatui::{backend::TestBackend, Terminal};

    #[test]
    fn wrap_basic_ascii() {
        let s = "abcdef";
        let g: Vec<&str> = s.graphemes(true).collect();
        assert_eq!(measure_total_lines(s, 5), 2);
        assert_eq!(measure_prefix_line_col(&g, 5, 5), (0, 5));
        assert_eq!(measure_prefix_line_col(&g, 6, 5), (1, 1));
    }

    #[test]
    fn wrap_with_newline() {
        let s = "ab\ncdef";
        let g: Vec<&str> = s.graphemes(true).collect();
        assert_eq!(measure_total_lines(s, 80), 2);
        assert_eq!(measure_prefix_line_col(&g, 2, 80), (0, 2));
        assert_eq!(measure_prefix_line_col(&g, 5, 80), (1, 2));
    }

    #[test]
    fn wrap_fullwidth_chars() {
        let s = "\u{FF21}\u{FF22}\u{FF23}";
        let g: Vec<&str> = s.graphemes(true).collect();
        assert_eq!(measure_total_lines(s, 4), 2);
        assert_eq!(measure_prefix_line_col(&g, 2, 4), (0, 4));
        assert_eq!(measure_prefix_line_col(&g, 3, 4), (1, 2));
    }

    #[test]
    fn centered_rect_stays_inside() {
        let outer = Rect::new(0, 0, 100, 50);
        let r = centered_rect(60, 40, outer);
        assert_eq!(r.width, 60);
        assert_eq!(r.height, 20);
        assert!(r.x >= 20 && r.y >= 15);
    }

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        let buf = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buf.area.height {
            for x in 0..buf.area.width {
                out.push_str(buf[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn renders_panes_and_transcript() {
        let (_dir, mut app) = app_with_chat("work");
        app.messages = vec![
            ChatMessage::user("ping"),
            ChatMessage::assistant("pong", "gpt-4o"),
        ];
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw(f, &mut app)).unwrap();
        let text = screen_text(&terminal);
        assert!(text.contains("Chats"));
        assert!(text.contains("Chat Details & Stats"));
        assert!(text.contains("> work"));
        assert!(text.contains("You:"));
        assert!(text.contains("gpt-4o:"));
        assert!(text.contains("pong"));
        assert!(app.chat_area.is_some());
        assert!(app.chat_list_area.is_some());
    }

    #[test]
    fn renders_empty_state_and_help() {
        let (_dir, mut app) = app_with_chat("work");
        app.show_chat_list = false;
        app.modal = Some(Modal::Help);
        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        terminal.draw(|f| draw(f, &mut app)).unwrap();
        let text = screen_text(&terminal);
        assert!(text.contains(EMPTY_NO_MESSAGES));
        assert!(text.contains("/switch-chat"));
        assert!(app.chat_list_area.is_none());
    }
}
