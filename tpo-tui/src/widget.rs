//! Ratatui rendering of the market profile screen.
//!
//! Layout: header | TPO letters + distribution/ranking tables | range selector | status.

use chrono::{DateTime, Utc};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
};
use tpo_data::{profile::DayProfile, refresh::DisplayFrame};

use crate::app::{App, RefreshStatus};

const C_BUY: Color = Color::Rgb(100, 220, 100);
const C_SELL: Color = Color::Rgb(220, 100, 100);
const C_NEUTRAL: Color = Color::Rgb(180, 180, 100);
const C_DIM: Color = Color::Rgb(120, 120, 120);
const C_BRIGHT: Color = Color::Rgb(220, 220, 220);
const C_ACCENT: Color = Color::Rgb(100, 180, 220);
const C_HEADER: Color = Color::Rgb(180, 130, 220);

/// Widest TPO column, in letters.
const MAX_COLUMN_WIDTH: usize = 26;

/// One printed price row of the TPO chart.
#[derive(Debug, Clone, PartialEq)]
pub struct TpoRow {
    pub price: f64,
    /// Letters per selected profile, `None` where that profile has no level at `price`.
    pub cells: Vec<Option<TpoCell>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TpoCell {
    pub letters: String,
    pub is_poc: bool,
    pub in_value: bool,
    pub single_print: bool,
}

/// Price rows (descending) of `profiles`, clipped to `max_rows` around the last POC.
pub fn tpo_rows(profiles: &[&DayProfile], max_rows: usize) -> Vec<TpoRow> {
    let mut prices: Vec<f64> = profiles
        .iter()
        .flat_map(|profile| profile.levels.iter().map(|level| level.price))
        .collect();
    prices.sort_by(|a, b| b.total_cmp(a));
    prices.dedup();

    let rows: Vec<TpoRow> = prices
        .into_iter()
        .map(|price| TpoRow {
            price,
            cells: profiles.iter().map(|profile| cell_at(profile, price)).collect(),
        })
        .collect();

    if rows.len() <= max_rows {
        return rows;
    }

    let anchor = profiles
        .last()
        .and_then(|profile| {
            rows.iter()
                .position(|row| row.price <= profile.poc)
        })
        .unwrap_or(0);
    let start = anchor
        .saturating_sub(max_rows / 2)
        .min(rows.len() - max_rows);

    rows[start..start + max_rows].to_vec()
}

fn cell_at(profile: &DayProfile, price: f64) -> Option<TpoCell> {
    let level = profile.levels.iter().find(|level| level.price == price)?;
    // Levels ascend, the POC sits inside the highest level at or below it
    let poc_level = profile
        .levels
        .iter()
        .rev()
        .find(|level| level.price <= profile.poc)
        .map(|level| level.price);

    Some(TpoCell {
        letters: level.letters.clone(),
        is_poc: poc_level == Some(level.price),
        in_value: level.price >= profile.val && level.price < profile.vah,
        single_print: profile.single_prints.contains(&level.price),
    })
}

/// Range selector labels, e.g. `0 11-10`.
pub fn mark_labels(frame: &DisplayFrame) -> Vec<String> {
    let last = frame.day_index.last_index();
    frame
        .day_index
        .marks()
        .iter()
        .enumerate()
        .map(|(index, mark)| {
            if index == last {
                format!("{index} end")
            } else {
                format!("{index} {}", mark.format("%m-%d"))
            }
        })
        .collect()
}

fn power_color(power: f64) -> Color {
    if power >= 25.0 {
        C_BUY
    } else if power <= -25.0 {
        C_SELL
    } else {
        C_NEUTRAL
    }
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.format("%H:%M:%S").to_string()
}

/// Render the whole screen.
pub fn render(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),   // Profile + tables
            Constraint::Length(3), // Range selector
            Constraint::Length(1), // Status
        ])
        .split(f.area());

    render_header(f, chunks[0], app.frame());

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[1]);
    render_tpo_chart(f, body[0], app.frame());

    let tables = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(body[1]);
    render_distribution(f, tables[0], app.frame());
    render_breakdown(f, tables[1], app.frame());

    render_range_selector(f, chunks[2], app.frame());
    render_status(f, chunks[3], app);
}

fn render_header(f: &mut Frame, area: Rect, frame: &DisplayFrame) {
    let ranking = &frame.profile.ranking;
    let last_close = frame.merged.last().close;
    let live_tick = frame
        .live_tick_size
        .map(|tick| tick.to_string())
        .unwrap_or_else(|| "--".to_string());

    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", frame.label),
            Style::default().fg(C_HEADER).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" {last_close:.2} "), Style::default().fg(C_BRIGHT)),
        Span::styled("  POWER ", Style::default().fg(C_DIM)),
        Span::styled(
            format!("{:+.0}", ranking.power),
            Style::default()
                .fg(power_color(ranking.power))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" ({:+.0})", ranking.power1),
            Style::default().fg(power_color(ranking.power1)),
        ),
        Span::styled("  H/L ", Style::default().fg(C_DIM)),
        Span::styled(
            format!("{:.2} / {:.2}", ranking.highd, ranking.lowd),
            Style::default().fg(C_BRIGHT),
        ),
        Span::styled("  TICK ", Style::default().fg(C_DIM)),
        Span::styled(
            format!("live {live_tick} | hist {}", frame.historical_tick_size),
            Style::default().fg(C_ACCENT),
        ),
    ]);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_ACCENT));
    f.render_widget(Paragraph::new(line).block(block), area);
}

fn render_tpo_chart(f: &mut Frame, area: Rect, frame: &DisplayFrame) {
    let block = Block::default()
        .title(" TPO PROFILE ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_ACCENT));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let profiles = frame.selected_profiles();
    if profiles.is_empty() {
        f.render_widget(
            Paragraph::new(Span::styled("No bars in the selected range", Style::default().fg(C_DIM))),
            inner,
        );
        return;
    }

    let price_width = 10;
    let budget = (inner.width as usize).saturating_sub(price_width);
    let widths: Vec<usize> = profiles
        .iter()
        .map(|profile| {
            profile
                .levels
                .iter()
                .map(|level| level.letters.len())
                .max()
                .unwrap_or(0)
                .clamp(5, MAX_COLUMN_WIDTH)
        })
        .collect();

    // Most recent days first when the panel is too narrow for all of them
    let mut used = 0;
    let visible = widths
        .iter()
        .rev()
        .take_while(|width| {
            used += *width + 1;
            used <= budget
        })
        .count()
        .max(1);
    let skip = profiles.len() - visible.min(profiles.len());
    let profiles = &profiles[skip..];
    let widths = &widths[skip..];

    let mut lines = Vec::new();
    let mut header = vec![Span::styled(format!("{:>width$}", "", width = price_width), Style::default())];
    for (profile, width) in profiles.iter().zip(widths) {
        header.push(Span::styled(
            format!(" {:<width$}", profile.date.format("%m-%d"), width = *width),
            Style::default().fg(C_HEADER).add_modifier(Modifier::BOLD),
        ));
    }
    lines.push(Line::from(header));

    let max_rows = (inner.height as usize).saturating_sub(1);
    for row in tpo_rows(profiles, max_rows) {
        let mut spans = vec![Span::styled(
            format!("{:>width$.1}", row.price, width = price_width),
            Style::default().fg(C_DIM),
        )];
        for (cell, width) in row.cells.iter().zip(widths) {
            let (text, style) = match cell {
                Some(cell) => {
                    let letters: String = cell.letters.chars().take(*width).collect();
                    let style = if cell.is_poc {
                        Style::default().fg(C_NEUTRAL).add_modifier(Modifier::BOLD)
                    } else if cell.single_print {
                        Style::default().fg(C_ACCENT)
                    } else if cell.in_value {
                        Style::default().fg(C_BRIGHT)
                    } else {
                        Style::default().fg(C_DIM)
                    };
                    (letters, style)
                }
                None => (String::new(), Style::default()),
            };
            spans.push(Span::styled(format!(" {text:<width$}", width = *width), style));
        }
        lines.push(Line::from(spans));
    }

    f.render_widget(Paragraph::new(lines), inner);
}

fn render_distribution(f: &mut Frame, area: Rect, frame: &DisplayFrame) {
    let selected_dates = frame
        .selected
        .first()
        .zip(frame.selected.last())
        .map(|(first, last)| (first.date(), last.date()));

    let header = Row::new(
        ["#", "DATE", "POC", "VAH", "VAL", "IBH", "IBL", "CLOSE", "TPO"]
            .into_iter()
            .map(|title| {
                Cell::from(title).style(Style::default().fg(C_NEUTRAL).add_modifier(Modifier::BOLD))
            }),
    )
    .height(1);

    let rows = frame.profile.distribution.iter().map(|row| {
        let highlighted = selected_dates
            .is_some_and(|(first, last)| row.date >= first && row.date <= last);
        let style = if highlighted {
            Style::default().fg(C_BRIGHT)
        } else {
            Style::default().fg(C_DIM)
        };

        Row::new(vec![
            Cell::from(row.index.to_string()),
            Cell::from(row.date.format("%m-%d").to_string()),
            Cell::from(format!("{:.1}", row.poc)),
            Cell::from(format!("{:.1}", row.vah)),
            Cell::from(format!("{:.1}", row.val)),
            Cell::from(format!("{:.1}", row.ib_high)),
            Cell::from(format!("{:.1}", row.ib_low)),
            Cell::from(format!("{:.1}", row.close)),
            Cell::from(row.tpo_count.to_string()),
        ])
        .style(style)
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(5),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" DISTRIBUTION ")
            .border_style(Style::default().fg(C_ACCENT)),
    );

    f.render_widget(table, area);
}

fn render_breakdown(f: &mut Frame, area: Rect, frame: &DisplayFrame) {
    let header = Row::new(
        ["DATE", "C/POC", "C/VA", "MIGR", "EXT", "RVOL", "PWR1", "PWR"]
            .into_iter()
            .map(|title| {
                Cell::from(title).style(Style::default().fg(C_NEUTRAL).add_modifier(Modifier::BOLD))
            }),
    )
    .height(1);

    let rows = frame.profile.ranking.breakdown.iter().map(|row| {
        Row::new(vec![
            Cell::from(row.date.format("%m-%d").to_string()),
            Cell::from(format!("{:+.0}", row.close_vs_poc)),
            Cell::from(format!("{:+.0}", row.close_vs_value)),
            Cell::from(format!("{:+.0}", row.poc_migration)),
            Cell::from(format!("{:+.0}", row.range_extension)),
            Cell::from(format!("{:.2}", row.relative_volume)),
            Cell::from(format!("{:+.0}", row.power1))
                .style(Style::default().fg(power_color(row.power1))),
            Cell::from(format!("{:+.0}", row.power))
                .style(Style::default().fg(power_color(row.power)).add_modifier(Modifier::BOLD)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Length(5),
            Constraint::Length(5),
            Constraint::Length(4),
            Constraint::Length(5),
            Constraint::Length(5),
            Constraint::Length(5),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" DAY RANK (historical) ")
            .border_style(Style::default().fg(C_ACCENT)),
    );

    f.render_widget(table, area);
}

fn render_range_selector(f: &mut Frame, area: Rect, frame: &DisplayFrame) {
    let selection = frame.selection;
    let mut spans = Vec::new();

    for (index, label) in mark_labels(frame).into_iter().enumerate() {
        let style = if index == selection.start || index == selection.end {
            Style::default().fg(C_HEADER).add_modifier(Modifier::BOLD | Modifier::REVERSED)
        } else if index > selection.start && index < selection.end {
            Style::default().fg(C_BRIGHT)
        } else {
            Style::default().fg(C_DIM)
        };
        spans.push(Span::styled(format!(" {label} "), style));
        spans.push(Span::raw(" "));
    }

    let block = Block::default()
        .title(format!(" RANGE [{}..{}] {} bars ", selection.start, selection.end, frame.selected.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_ACCENT));
    f.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn render_status(f: &mut Frame, area: Rect, app: &App) {
    let (text, color) = match app.status() {
        RefreshStatus::Historical => ("history only, waiting for live data".to_string(), C_DIM),
        RefreshStatus::Refreshing => ("refreshing...".to_string(), C_NEUTRAL),
        RefreshStatus::Updated(at) => (format!("updated {}", format_time(at)), C_BUY),
        RefreshStatus::Failed { at, message } => (
            format!(
                "refresh failed at {} ({}x): {message}",
                format_time(at),
                app.failures()
            ),
            C_SELL,
        ),
    };

    let line = Line::from(vec![
        Span::styled(" ←/→ start  ⇧←/⇧→ or [/] end  r refresh  q quit ", Style::default().fg(C_DIM)),
        Span::styled(text, Style::default().fg(color)),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use tpo_data::profile::PriceLevel;

    fn level(price: f64, letters: &str) -> PriceLevel {
        PriceLevel {
            price,
            letters: letters.to_string(),
            tpo_count: letters.len(),
            volume: 0.0,
        }
    }

    fn profile(day: u32, levels: Vec<PriceLevel>, poc: f64, val: f64, vah: f64) -> DayProfile {
        let date = NaiveDate::from_ymd_opt(2023, 11, day).unwrap();
        DayProfile {
            date,
            start: Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()),
            single_prints: levels
                .iter()
                .filter(|level| level.tpo_count == 1)
                .map(|level| level.price)
                .collect(),
            levels,
            poc,
            vah,
            val,
            ib_high: 0.0,
            ib_low: 0.0,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            volume: 0.0,
            periods: 3,
        }
    }

    #[test]
    fn test_tpo_rows_merge_prices_descending() {
        let first = profile(
            12,
            vec![level(100.0, "A"), level(101.0, "ABC"), level(102.0, "AB")],
            101.5,
            101.0,
            103.0,
        );
        let second = profile(13, vec![level(102.0, "AB"), level(103.0, "B")], 102.5, 102.0, 103.0);

        let rows = tpo_rows(&[&first, &second], 10);
        let prices: Vec<f64> = rows.iter().map(|row| row.price).collect();

        assert_eq!(prices, vec![103.0, 102.0, 101.0, 100.0]);
        assert_eq!(rows[0].cells[0], None);
        assert_eq!(rows[2].cells[0].as_ref().map(|cell| cell.letters.as_str()), Some("ABC"));
        assert!(rows[2].cells[0].as_ref().is_some_and(|cell| cell.is_poc && cell.in_value));
        assert!(rows[3].cells[0].as_ref().is_some_and(|cell| !cell.in_value));
        assert!(rows[1].cells[1].as_ref().is_some_and(|cell| cell.is_poc));
    }

    #[test]
    fn test_tpo_rows_clip_around_last_poc() {
        let levels = (0..40).map(|i| level(100.0 + i as f64, "AB")).collect();
        let day = profile(13, levels, 110.5, 105.0, 115.0);

        let rows = tpo_rows(&[&day], 10);
        assert_eq!(rows.len(), 10);
        assert!(rows.iter().any(|row| row.price == 110.0));
        assert!(rows.windows(2).all(|pair| pair[0].price > pair[1].price));
    }
}
