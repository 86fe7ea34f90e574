//! Notification overlay

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::Notice;

pub fn render_notice(frame: &mut Frame, notice: &Notice) {
    let (message, title, color) = match notice {
        Notice::Info(message) => (message, " Info (Esc to dismiss) ", Color::Cyan),
        Notice::Error(message) => (message, " Error (Esc to dismiss) ", Color::Red),
    };
    let area = frame.area();

    let popup_width = 60.min(area.width.saturating_sub(4));
    let inner_width = popup_width.saturating_sub(4).max(1) as usize;
    let line_count = message.chars().count().div_ceil(inner_width).max(1) as u16;
    let popup_height = (2 + line_count).min(area.height.saturating_sub(4));

    let popup_area = Rect {
        x: area.width.saturating_sub(popup_width) / 2,
        y: area.height.saturating_sub(popup_height) / 2,
        width: popup_width,
        height: popup_height,
    };

    // Clear the area behind the popup first
    frame.render_widget(Clear, popup_area);

    let widget = Paragraph::new(message.as_str())
        .style(Style::default().fg(color))
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(title)
                .title_style(Style::default().fg(color).add_modifier(Modifier::BOLD))
                .style(Style::default().bg(Color::Black)),
        );
    frame.render_widget(widget, popup_area);
}
