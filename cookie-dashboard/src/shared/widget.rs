//! Ratatui panels for the cookie dashboard
//!
//! Pure consumers of [`DashboardState`] and the animated values; no
//! synchronisation logic lives here.

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, Gauge, GraphType, Paragraph, Wrap},
    Frame,
};

use super::animator::DisplayedValues;
use super::poller::{DashboardState, SnapshotOrigin};
use super::types::{ChartPoint, PnlClass, PnlLine, Snapshot};

const C_GAIN: Color = Color::Rgb(0, 255, 157);
const C_LOSS: Color = Color::Rgb(255, 77, 77);
const C_CAUTION: Color = Color::Rgb(255, 184, 77);
const C_DIM: Color = Color::Rgb(120, 120, 120);
const C_BRIGHT: Color = Color::Rgb(220, 220, 220);
const C_GOLD: Color = Color::Rgb(255, 215, 0);
const C_SILVER: Color = Color::Rgb(192, 192, 192);

/// Full scale of the cookie progress bar
pub const PROGRESS_MAX: f64 = 100.0;
/// Milestones drawn under the progress bar
pub const PROGRESS_MARKERS: [f64; 4] = [25.0, 50.0, 75.0, 100.0];

/// Maintenance margin risk band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Safe,     // <= 50%
    Caution,  // 50% - 80%
    Critical, // > 80%
}

impl RiskLevel {
    pub fn from_margin(percentage: f64) -> Self {
        let ratio = progress_ratio(percentage, 100.0);
        if ratio > 0.8 {
            RiskLevel::Critical
        } else if ratio > 0.5 {
            RiskLevel::Caution
        } else {
            RiskLevel::Safe
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "Safe",
            RiskLevel::Caution => "Caution",
            RiskLevel::Critical => "Critical",
        }
    }

    pub fn color(&self) -> Color {
        match self {
            RiskLevel::Safe => C_GAIN,
            RiskLevel::Caution => C_CAUTION,
            RiskLevel::Critical => C_LOSS,
        }
    }
}

/// Direction of the trend chart, first point vs last
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartTrend {
    Rising,
    Falling,
}

impl ChartTrend {
    pub fn of(points: &[ChartPoint]) -> Option<Self> {
        let first = points.first()?.value;
        let last = points.last()?.value;
        Some(if last >= first {
            ChartTrend::Rising
        } else {
            ChartTrend::Falling
        })
    }

    pub fn color(&self) -> Color {
        match self {
            ChartTrend::Rising => C_GAIN,
            ChartTrend::Falling => C_LOSS,
        }
    }
}

/// Clamp `value / max` into 0..=1
pub fn progress_ratio(value: f64, max: f64) -> f64 {
    if max <= 0.0 || !value.is_finite() {
        return 0.0;
    }
    (value / max).clamp(0.0, 1.0)
}

/// Format with thousands separators and a fixed number of decimals
pub fn format_cookies(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let negative = value < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0');
    let sign = if negative { "-" } else { "" };
    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}

fn class_style(class: PnlClass) -> (&'static str, Color) {
    match class {
        PnlClass::Gain => ("▲", C_GAIN),
        PnlClass::Loss => ("▼", C_LOSS),
        PnlClass::Neutral => ("●", C_DIM),
    }
}

/// Render the whole dashboard, or the loading/error screen when there is nothing to show
pub fn render_dashboard(f: &mut Frame, state: &DashboardState, displayed: &DisplayedValues) {
    let area = f.area();

    let Some(snapshot) = &state.snapshot else {
        let line = match &state.error {
            Some(error) if !state.loading => Line::from(Span::styled(
                format!("Connection Error: {}", error),
                Style::default().fg(C_LOSS),
            )),
            _ => Line::from(Span::styled(
                "Initializing connection...",
                Style::default().fg(C_DIM),
            )),
        };
        render_centered(f, area, line);
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Percentage(30),
            Constraint::Percentage(30),
            Constraint::Min(8),
        ])
        .split(area);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(2, 3), Constraint::Ratio(1, 3)])
        .split(rows[3]);

    render_progress(f, rows[0], displayed.cookie_count);
    render_risk(f, rows[1], snapshot);
    let pnl_is_positive = state.derived.map_or(true, |d| d.pnl_is_positive);
    render_cookies(f, rows[2], displayed, pnl_is_positive, state.origin);
    render_chart(f, bottom[0], &snapshot.chart_data);
    render_pnl_lines(f, bottom[1], &snapshot.pnl_lines);
}

fn render_centered(f: &mut Frame, area: Rect, line: Line) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(50),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(area);
    f.render_widget(Paragraph::new(line).alignment(Alignment::Center), rows[1]);
}

/// Cookie progress toward [`PROGRESS_MAX`] with milestone markers
pub fn render_progress(f: &mut Frame, area: Rect, cookie_count: f64) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Length(1)])
        .split(area);

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL))
        .gauge_style(Style::default().fg(C_SILVER))
        .ratio(progress_ratio(cookie_count, PROGRESS_MAX))
        .label(format!("{:.0} / {:.0}", cookie_count.max(0.0), PROGRESS_MAX));
    f.render_widget(gauge, rows[0]);

    let width = rows[1].width.saturating_sub(2) as usize;
    let mut markers = vec![' '; width];
    for marker in PROGRESS_MARKERS {
        let pos = (progress_ratio(marker, PROGRESS_MAX) * width as f64) as usize;
        if let Some(slot) = markers.get_mut(pos.min(width.saturating_sub(1))) {
            *slot = '┴';
        }
    }
    let marker_line: String = markers.into_iter().collect();
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(format!(" {}", marker_line), Style::default().fg(C_DIM)))),
        rows[1],
    );
}

/// Maintenance margin gauge and effective leverage
pub fn render_risk(f: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let block = Block::default()
        .title(" RISK ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_DIM));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(inner);

    let margin = snapshot.maintenance_margin_percentage;
    let level = RiskLevel::from_margin(margin);
    let gauge = Gauge::default()
        .block(
            Block::default()
                .title(format!(" MAINT. MARGIN · {} ", level.label().to_uppercase()))
                .borders(Borders::ALL),
        )
        .gauge_style(Style::default().fg(level.color()))
        .ratio(progress_ratio(margin, 100.0))
        .label(format!("{:.1}%", margin));
    f.render_widget(gauge, cols[0]);

    let leverage = vec![
        Line::from(Span::styled("EFFECTIVE LEVERAGE", Style::default().fg(C_DIM))),
        Line::from(Span::styled(
            format!("{:.2}x", snapshot.effective_leverage),
            Style::default().fg(C_BRIGHT).add_modifier(Modifier::BOLD),
        )),
    ];
    f.render_widget(Paragraph::new(leverage).alignment(Alignment::Center), cols[1]);
}

/// Animated cookie count with equity+|PnL| and signed PnL
///
/// Gain/loss styling follows the current snapshot, not the animated value,
/// which can still be crossing zero.
pub fn render_cookies(
    f: &mut Frame,
    area: Rect,
    displayed: &DisplayedValues,
    pnl_is_positive: bool,
    origin: Option<SnapshotOrigin>,
) {
    let title = match origin {
        Some(SnapshotOrigin::Cache) => " COOKIES (cached) ",
        _ => " COOKIES ",
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_DIM));

    let (pnl_class, sign) = if pnl_is_positive {
        (PnlClass::Gain, "+")
    } else {
        (PnlClass::Loss, "-")
    };
    let (arrow, pnl_color) = class_style(pnl_class);

    let lines = vec![
        Line::from(Span::styled(
            format_cookies(displayed.cookie_count, 3),
            Style::default().fg(C_GOLD).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("TOTAL ", Style::default().fg(C_DIM)),
            Span::styled(format_cookies(displayed.total_cookies, 3), Style::default().fg(C_BRIGHT)),
            Span::styled("   PNL ", Style::default().fg(C_DIM)),
            Span::styled(
                format!("{} {}{}", arrow, sign, format_cookies(displayed.pnl_cookies.abs(), 3)),
                Style::default().fg(pnl_color).add_modifier(Modifier::BOLD),
            ),
        ]),
    ];

    f.render_widget(
        Paragraph::new(lines).block(block).alignment(Alignment::Center),
        area,
    );
}

/// Trend line, green when the series ends at or above where it started
pub fn render_chart(f: &mut Frame, area: Rect, points: &[ChartPoint]) {
    let block = Block::default()
        .title(" PERFORMANCE ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_DIM));

    let Some(trend) = ChartTrend::of(points) else {
        f.render_widget(
            Paragraph::new(Span::styled("No chart data", Style::default().fg(C_DIM))).block(block),
            area,
        );
        return;
    };

    let data: Vec<(f64, f64)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| (i as f64, p.value))
        .collect();
    let (min, max) = data
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), (_, v)| (lo.min(*v), hi.max(*v)));
    let pad = ((max - min) * 0.05).max(1e-6);

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(trend.color()))
        .data(&data);

    let chart = Chart::new(vec![dataset])
        .block(block)
        .x_axis(Axis::default().bounds([0.0, (data.len().max(2) - 1) as f64]))
        .y_axis(Axis::default().bounds([min - pad, max + pad]));
    f.render_widget(chart, area);
}

/// PnL breakdown with gain/loss/neutral markers
pub fn render_pnl_lines(f: &mut Frame, area: Rect, pnl_lines: &[PnlLine]) {
    let block = Block::default()
        .title(" PNL ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_DIM));

    let mut lines = Vec::with_capacity(pnl_lines.len() * 2);
    for line in pnl_lines {
        let (icon, color) = class_style(line.class);
        lines.push(Line::from(vec![
            Span::styled(format!("{} ", icon), Style::default().fg(color)),
            Span::styled(line.text.as_str(), Style::default().fg(C_BRIGHT)),
        ]));
        lines.push(Line::from(""));
    }
    if lines.is_empty() {
        lines.push(Line::from(Span::styled("No PnL data", Style::default().fg(C_DIM))));
    }

    f.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::ChartTime;
    use ratatui::{backend::TestBackend, Terminal};

    fn points(values: &[f64]) -> Vec<ChartPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| ChartPoint {
                timestamp: ChartTime::Millis(i as i64),
                value: *v,
            })
            .collect()
    }

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_risk_levels() {
        assert_eq!(RiskLevel::from_margin(10.0), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_margin(50.0), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_margin(50.1), RiskLevel::Caution);
        assert_eq!(RiskLevel::from_margin(80.0), RiskLevel::Caution);
        assert_eq!(RiskLevel::from_margin(95.0), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_margin(250.0), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_margin(-5.0), RiskLevel::Safe);
    }

    #[test]
    fn test_chart_trend() {
        assert_eq!(ChartTrend::of(&[]), None);
        assert_eq!(ChartTrend::of(&points(&[1.0, 3.0, 2.0])), Some(ChartTrend::Rising));
        assert_eq!(ChartTrend::of(&points(&[5.0, 5.0])), Some(ChartTrend::Rising));
        assert_eq!(ChartTrend::of(&points(&[5.0, 7.0, 4.0])), Some(ChartTrend::Falling));
    }

    #[test]
    fn test_progress_ratio_clamps() {
        assert_eq!(progress_ratio(25.0, 100.0), 0.25);
        assert_eq!(progress_ratio(140.0, 100.0), 1.0);
        assert_eq!(progress_ratio(-3.0, 100.0), 0.0);
        assert_eq!(progress_ratio(f64::NAN, 100.0), 0.0);
        assert_eq!(progress_ratio(5.0, 0.0), 0.0);
    }

    #[test]
    fn test_format_cookies() {
        assert_eq!(format_cookies(1234567.891, 3), "1,234,567.891");
        assert_eq!(format_cookies(42.5, 3), "42.500");
        assert_eq!(format_cookies(999.0, 0), "999");
        assert_eq!(format_cookies(-1500.25, 2), "-1,500.25");
        assert_eq!(format_cookies(-0.0001, 2), "0.00");
    }

    #[test]
    fn test_render_loading_screen() {
        let mut terminal = Terminal::new(TestBackend::new(60, 10)).unwrap();
        terminal
            .draw(|f| render_dashboard(f, &DashboardState::default(), &DisplayedValues::default()))
            .unwrap();
        assert!(buffer_text(&terminal).contains("Initializing connection..."));
    }

    #[test]
    fn test_render_error_screen() {
        let mut state = DashboardState::default();
        state.fail("Failed to fetch data");

        let mut terminal = Terminal::new(TestBackend::new(60, 10)).unwrap();
        terminal
            .draw(|f| render_dashboard(f, &state, &DisplayedValues::default()))
            .unwrap();
        assert!(buffer_text(&terminal).contains("Connection Error: Failed to fetch data"));
    }

    #[test]
    fn test_render_dashboard_with_snapshot() {
        let mut state = DashboardState::default();
        state.adopt(
            Snapshot {
                cookie_count: 42.5,
                maintenance_margin_percentage: 12.0,
                effective_leverage: 3.25,
                chart_data: points(&[1.0, 2.0, 3.0]),
                pnl_lines: vec![PnlLine {
                    text: "+1 in the last hour".to_string(),
                    class: PnlClass::Gain,
                }],
                ..Default::default()
            },
            SnapshotOrigin::Live,
        );
        let displayed = DisplayedValues {
            cookie_count: 42.5,
            total_cookies: 0.0,
            pnl_cookies: 0.0,
        };

        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        terminal.draw(|f| render_dashboard(f, &state, &displayed)).unwrap();

        let text = buffer_text(&terminal);
        assert!(text.contains("42.500"));
        assert!(text.contains("3.25x"));
        assert!(text.contains("SAFE"));
        assert!(text.contains("in the last hour"));
    }

    #[test]
    fn test_pnl_styling_follows_snapshot_while_animating() {
        let mut state = DashboardState::default();
        state.adopt(
            Snapshot {
                cookie_count: 3.0,
                equity: 3000.0,
                unrealized_pnl_cookies: -50.0,
                ..Default::default()
            },
            SnapshotOrigin::Live,
        );
        // Still on the way down from a previous gain
        let displayed = DisplayedValues {
            cookie_count: 3.0,
            total_cookies: 20.0,
            pnl_cookies: 4.0,
        };

        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        terminal.draw(|f| render_dashboard(f, &state, &displayed)).unwrap();

        let text = buffer_text(&terminal);
        assert!(text.contains("▼ -4.000"));
        assert!(!text.contains("▲"));
    }
}
