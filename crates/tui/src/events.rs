use std::time::{Duration, Instant};

use crossterm::event::{self, Event, MouseButton, MouseEvent, MouseEventKind};
use ratatui::{backend::Backend, layout::Rect, Terminal};

use crate::{app::App, ui};

fn contains(area: Rect, x: u16, y: u16) -> bool {
    x >= area.x && x < area.x + area.width && y >= area.y && y < area.y + area.height
}

pub fn run<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> anyhow::Result<()> {
    let mut last_draw = Instant::now();
    let heartbeat = Duration::from_millis(500);
    loop {
        if app.dirty || last_draw.elapsed() >= heartbeat {
            terminal.draw(|f| ui::draw(f, app))?;
            app.dirty = false;
            last_draw = Instant::now();
        }

        if event::poll(Duration::from_millis(120))? {
            match event::read()? {
                Event::Key(key) => app.on_key(key),
                Event::Paste(s) => app.on_paste(&s),
                Event::Resize(_, _) => app.dirty = true,
                Event::Mouse(me) => on_mouse(app, me),
                _ => {}
            }
        }

        app.on_tick();

        if app.should_quit {
            app.abandon_request();
            app.save_ui_state();
            break;
        }
    }
    Ok(())
}

fn on_mouse(app: &mut App, me: MouseEvent) {
    if app.modal.is_some() {
        return;
    }
    let (x, y) = (me.column, me.row);
    if app.chat_area.is_some_and(|a| contains(a, x, y)) {
        match me.kind {
            MouseEventKind::ScrollUp => app.scroll_up(3),
            MouseEventKind::ScrollDown => app.scroll_down(3),
            MouseEventKind::Down(MouseButton::Left) => app.focus = crate::app::Focus::Input,
            _ => return,
        }
        app.dirty = true;
        return;
    }
    if let Some(area) = app.chat_list_area.filter(|a| contains(*a, x, y)) {
        match me.kind {
            MouseEventKind::ScrollUp => {
                app.chat_list_scroll = app.chat_list_scroll.saturating_sub(1);
            }
            MouseEventKind::ScrollDown => {
                app.chat_list_scroll = (app.chat_list_scroll + 1).min(app.chat_list_max_scroll());
            }
            MouseEventKind::Down(MouseButton::Left) => {
                if y > area.y && y < area.y + area.height - 1 {
                    let idx = app.chat_list_scroll as usize + (y - (area.y + 1)) as usize;
                    app.focus = crate::app::Focus::ChatList;
                    app.select_chat(idx);
                }
            }
            _ => return,
        }
        app.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::app;
    use crossterm::event::KeyModifiers;

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    #[test]
    fn click_in_chat_list_selects_row() {
        let (_dir, mut app) = app();
        for name in ["a", "b", "c"] {
            app.manager.create_chat(name, None).unwrap();
        }
        app.refresh_chats();
        app.chat_list_area = Some(Rect::new(0, 0, 30, 10));
        on_mouse(&mut app, mouse(MouseEventKind::Down(MouseButton::Left), 3, 2));
        assert_eq!(app.selected, 1);
        assert_eq!(app.active_chat.as_deref(), Some(app.chats[1].name.as_str()));

        // Border rows are ignored.
        on_mouse(&mut app, mouse(MouseEventKind::Down(MouseButton::Left), 3, 0));
        assert_eq!(app.selected, 1);
    }

    #[test]
    fn wheel_scrolls_conversation() {
        let (_dir, mut app) = app();
        app.chat_area = Some(Rect::new(30, 0, 50, 20));
        on_mouse(&mut app, mouse(MouseEventKind::ScrollUp, 40, 5));
        assert_eq!(app.chat_scroll, 3);
        assert!(!app.stick_to_bottom);
        on_mouse(&mut app, mouse(MouseEventKind::ScrollDown, 40, 5));
        assert!(app.stick_to_bottom);
        // Outside every pane.
        on_mouse(&mut app, mouse(MouseEventKind::ScrollUp, 90, 5));
        assert_eq!(app.chat_scroll, 0);
    }
}
