use std::str::FromStr;

use gptcli_core::config::GlobalConfig;
use ratatui::style::Color;

pub struct Theme {
    pub border_focus: Color,
    pub border_inactive: Color,
    pub chat_border: Color,
    pub selected_fg: Color,
    pub selected_bg: Color,
    pub title: Color,
    pub hint: Color,
    pub error: Color,
    pub info: Color,
    pub user: Color,
    pub assistant: Color,
}

pub const THEME: Theme = Theme {
    border_focus: Color::Cyan,
    border_inactive: Color::DarkGray,
    chat_border: Color::DarkGray,
    selected_fg: Color::Black,
    selected_bg: Color::Cyan,
    title: Color::Yellow,
    hint: Color::DarkGray,
    error: Color::Red,
    info: Color::Green,
    user: Color::Cyan,
    assistant: Color::Green,
};

/// Color names ("cyan", "light-blue"), hex ("#00ff88") or palette indices.
pub fn parse_color(name: &str) -> Option<Color> {
    Color::from_str(name.trim()).ok()
}

impl Theme {
    pub fn from_config(cfg: &GlobalConfig) -> Self {
        Theme {
            user: parse_color(&cfg.user_color).unwrap_or(THEME.user),
            assistant: parse_color(&cfg.assistant_color).unwrap_or(THEME.assistant),
            ..THEME
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_colors_override_defaults() {
        let mut cfg = GlobalConfig::default();
        cfg.user_color = "magenta".into();
        cfg.assistant_color = "not-a-color".into();
        let t = Theme::from_config(&cfg);
        assert_eq!(t.user, Color::Magenta);
        assert_eq!(t.assistant, Color::Green);
        assert_eq!(parse_color("#ff0000"), Some(Color::Rgb(255, 0, 0)));
    }
}
