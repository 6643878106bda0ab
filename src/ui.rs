use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Widget},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::{App, HistoryView};
use impact_trainer::trainer::TrainerView;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

/// Pad `text` on the left so it sits in the middle of `width` columns.
fn centered(text: &str, width: u16) -> String {
    let pad = (width as usize).saturating_sub(text.width()) / 2;
    format!("{}{}", " ".repeat(pad), text)
}

fn progress_bar(width: u16, view: &TrainerView) -> Line<'static> {
    let width = width as usize;
    let ratio = if view.duration_secs > 0.0 {
        (view.position_secs / view.duration_secs).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = ((ratio * width as f64).round() as usize).min(width);
    Line::from(vec![
        Span::styled("━".repeat(filled), Style::default().fg(Color::Cyan)),
        Span::styled(
            "─".repeat(width - filled),
            Style::default().add_modifier(Modifier::DIM),
        ),
    ])
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let view = self.trainer.view(self.now_ms);

        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let green_bold_style = Style::default().patch(bold_style).fg(Color::Green);
        let red_bold_style = Style::default().patch(bold_style).fg(Color::Red);
        let dim_style = Style::default().add_modifier(Modifier::DIM);
        let italic_style = Style::default().add_modifier(Modifier::ITALIC);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1), // clip
                Constraint::Length(1),
                Constraint::Length(1), // progress
                Constraint::Length(1), // time
                Constraint::Min(1),
                Constraint::Length(2), // stimulus / result
                Constraint::Min(1),
                Constraint::Length(1), // stats
                Constraint::Length(1), // help
            ])
            .split(area);

        let title = Line::from(vec![
            Span::styled(view.clip_id.clone().unwrap_or_default(), bold_style),
            Span::styled("  ·  ", dim_style),
            Span::styled(view.media_ref.clone().unwrap_or_default(), dim_style),
        ]);
        Paragraph::new(title).render(chunks[0], buf);

        progress_bar(chunks[2].width, &view).render(chunks[2], buf);

        Paragraph::new(Span::styled(
            format!("{:.2}s / {:.2}s", view.position_secs, view.duration_secs),
            dim_style,
        ))
        .alignment(Alignment::Right)
        .render(chunks[3], buf);

        let width = chunks[5].width;
        let center: Vec<Line> = if let Some(outcome) = &view.outcome {
            let style = if outcome.success {
                green_bold_style
            } else {
                red_bold_style
            };
            let mut lines = vec![Line::from(Span::styled(
                centered(&outcome.message(), width),
                style,
            ))];
            if let Some(rt) = outcome.reaction_time_ms {
                lines.push(Line::from(Span::styled(
                    centered(&format!("{:.0} ms", rt), width),
                    dim_style,
                )));
            }
            lines
        } else if view.stalled {
            vec![Line::from(Span::styled(
                centered(
                    &format!(
                        "playback blocked: press {} or click to start",
                        self.react_key_label()
                    ),
                    width,
                ),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
            ))]
        } else if view.window_open {
            vec![Line::from(Span::styled(
                centered("● DRIVE IMPACT ●", width),
                Style::default()
                    .fg(Color::White)
                    .bg(Color::Red)
                    .add_modifier(Modifier::BOLD),
            ))]
        } else {
            vec![Line::from(Span::styled(centered("watch…", width), italic_style))]
        };
        Paragraph::new(center).render(chunks[5], buf);

        let stats = view.stats;
        let stats_line = Line::from(vec![
            Span::styled(
                format!("pass {} ({:.1}%)", stats.pass, stats.pass_pct()),
                Style::default().fg(Color::Green),
            ),
            Span::raw("   "),
            Span::styled(
                format!("fail {} ({:.1}%)", stats.fail, stats.fail_pct()),
                Style::default().fg(Color::Red),
            ),
            Span::raw("   "),
            Span::styled(format!("total {}", stats.total()), bold_style),
        ]);
        Paragraph::new(stats_line)
            .alignment(Alignment::Center)
            .render(chunks[7], buf);

        Paragraph::new(Span::styled(
            format!(
                "({}/click) react  (←) restart  (→) skip  (tab) history  (esc) quit",
                self.react_key_label()
            ),
            italic_style.patch(dim_style),
        ))
        .alignment(Alignment::Center)
        .render(chunks[8], buf);
    }
}

pub fn render_history(view: &HistoryView, f: &mut Frame) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Min(0),    // Per-clip table
            Constraint::Length(reason_rows_height(view)),
            Constraint::Length(3), // Instructions
        ])
        .split(area);

    let subtitle = match (view.mean_reaction_ms, view.std_dev_reaction_ms) {
        (Some(m), Some(sd)) => format!("reaction time {:.0} ms ± {:.0} ms", m, sd),
        _ => "no reaction times yet".to_string(),
    };
    let title = Paragraph::new(subtitle)
        .block(Block::default().borders(Borders::ALL).title("History"))
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    if !view.enabled || view.clips.is_empty() {
        let text = if view.enabled {
            "No outcomes recorded yet.\nFinish a few clips to see your history!"
        } else {
            "History is disabled for this session."
        };
        let no_data = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("No Data"))
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center);
        f.render_widget(no_data, chunks[1]);
    } else {
        let header = Row::new(vec![
            Cell::from("Clip"),
            Cell::from("Attempts"),
            Cell::from("Pass (%)"),
            Cell::from("Mean RT (ms)"),
        ])
        .style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

        let rows: Vec<Row> = view
            .clips
            .iter()
            .map(|clip| {
                let pass_color = if clip.pass_rate >= 80.0 {
                    Color::Green
                } else if clip.pass_rate >= 50.0 {
                    Color::Yellow
                } else {
                    Color::Red
                };
                Row::new(vec![
                    Cell::from(clip.clip_id.clone()),
                    Cell::from(clip.attempts.to_string()),
                    Cell::from(format!("{:.1}", clip.pass_rate))
                        .style(Style::default().fg(pass_color)),
                    Cell::from(
                        clip.mean_reaction_ms
                            .map(|ms| format!("{:.0}", ms))
                            .unwrap_or_else(|| "-".to_string()),
                    ),
                ])
            })
            .collect();

        let table = Table::new(
            rows,
            &[
                Constraint::Min(12),
                Constraint::Length(10),
                Constraint::Length(10),
                Constraint::Length(14),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("By Clip"));
        f.render_widget(table, chunks[1]);
    }

    let reasons: Vec<Line> = view
        .reasons
        .iter()
        .map(|(reason, count)| {
            Line::from(vec![
                Span::raw(format!("{:<20}", reason.to_string())),
                Span::styled(
                    format!("{:>6}", count),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
            ])
        })
        .collect();
    f.render_widget(
        Paragraph::new(reasons).block(Block::default().borders(Borders::ALL).title("By Reason")),
        chunks[2],
    );

    let instructions = Paragraph::new("(tab/b) back to training | (esc) quit")
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC))
        .alignment(Alignment::Center);
    f.render_widget(instructions, chunks[3]);
}

fn reason_rows_height(view: &HistoryView) -> u16 {
    view.reasons.len().min(6) as u16 + 2
}
