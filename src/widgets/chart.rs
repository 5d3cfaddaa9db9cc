//! Plot view widget: sidebar (range, series, filters) and chart area.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Block, Borders, Chart, Dataset, GraphType, LegendPosition, List, ListItem,
        Paragraph, StatefulWidget, Widget,
    },
};

use crate::config::Theme;
use crate::i18n::Localization;
use crate::plot::{format_x_label, series_bounds, AXIS_LABEL_FORMAT};
use crate::plot_modal::{PlotModal, RangeBound};

const SIDEBAR_WIDTH: u16 = 40;
const LABEL_WIDTH: u16 = 20;

pub const SERIES_COLORS: [&str; 6] = [
    "chart_series_color_1",
    "chart_series_color_2",
    "chart_series_color_3",
    "chart_series_color_4",
    "chart_series_color_5",
    "chart_series_color_6",
];

fn checkbox(on: bool) -> &'static str {
    if on {
        "☑"
    } else {
        "☐"
    }
}

fn format_axis_label(v: f64) -> String {
    if v.abs() >= 1e6 || (v.abs() < 1e-2 && v != 0.0) {
        format!("{:.2e}", v)
    } else {
        format!("{:.2}", v)
    }
}

/// Label/value row in the sidebar.
fn render_setting(area: Rect, buf: &mut ratatui::buffer::Buffer, label: String, value: Span) {
    let row = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(LABEL_WIDTH), Constraint::Min(1)])
        .split(area);
    Paragraph::new(label).render(row[0], buf);
    Paragraph::new(Line::from(value)).render(row[1], buf);
}

/// Renders the plot view: title, left sidebar and chart area.
pub fn render_plot_view(
    area: Rect,
    buf: &mut ratatui::buffer::Buffer,
    modal: &mut PlotModal,
    theme: &Theme,
    loc: &Localization,
) {
    let border_color = theme.get("modal_border");
    let active_color = theme.get("modal_border_active");
    let text_primary = theme.get("text_primary");
    let text_secondary = theme.get("text_secondary");

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Fill(1)])
        .split(area);

    Paragraph::new(loc.t_with("plot.title", &[("table", &modal.table)]))
        .style(
            Style::default()
                .fg(theme.get("table_header"))
                .bg(theme.get("controls_bg")),
        )
        .render(layout[0], buf);

    let main_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Fill(1)])
        .split(layout[1]);

    let sidebar_content = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // range box
            Constraint::Min(4),    // series list
            Constraint::Length(6), // filter box
        ])
        .split(main_layout[0]);

    // Time range: the bound moved by the arrow keys is highlighted
    let range_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" {} ", loc.t("plot.range")));
    let range_inner = range_block.inner(sidebar_content[0]);
    range_block.render(sidebar_content[0], buf);
    let range_rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(range_inner);
    let (start, end) = modal.session.range();
    for (i, (bound, key, idx)) in [
        (RangeBound::Start, "plot.start", start),
        (RangeBound::End, "plot.end", end),
    ]
    .into_iter()
    .enumerate()
    {
        let style = if modal.bound == bound {
            Style::default().fg(active_color)
        } else {
            Style::default().fg(text_primary)
        };
        let text = modal
            .session
            .timeline_at(idx)
            .format(AXIS_LABEL_FORMAT)
            .to_string();
        render_setting(range_rows[i], buf, loc.t(key), Span::styled(text, style));
    }

    // Series list: plotted and filter flags per numeric column
    let items: Vec<ListItem> = modal
        .session
        .column_names()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let plotted = modal.session.is_plotted(i);
            let filtered = modal.session.is_filter_target(i);
            ListItem::new(Line::from(vec![
                Span::raw(format!("{} ", checkbox(plotted))),
                Span::styled(
                    format!("{} ", checkbox(filtered)),
                    Style::default().fg(theme.get("warning")),
                ),
                Span::raw(name.to_string()),
            ]))
        })
        .collect();
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(active_color))
                .title(format!(
                    " {} ({} / {}) ",
                    loc.t("plot.series"),
                    loc.t("plot.plotted"),
                    loc.t("plot.filtered")
                )),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    StatefulWidget::render(list, sidebar_content[1], buf, &mut modal.list_state);

    // Filter settings
    let filters = modal.session.filters;
    let filter_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" {} ", loc.t("plot.filters")));
    let filter_inner = filter_block.inner(sidebar_content[2]);
    filter_block.render(sidebar_content[2], buf);
    let filter_rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1); 4])
        .split(filter_inner);
    let value_style = Style::default().fg(text_primary);
    let on_off = |on: bool| loc.t(if on { "plot.on" } else { "plot.off" });
    render_setting(
        filter_rows[0],
        buf,
        loc.t("plot.spike"),
        Span::styled(
            format!("{} {}", checkbox(filters.spike_removal), on_off(filters.spike_removal)),
            value_style,
        ),
    );
    render_setting(
        filter_rows[1],
        buf,
        loc.t("plot.spike_window"),
        Span::styled(filters.spike_window.to_string(), value_style),
    );
    render_setting(
        filter_rows[2],
        buf,
        loc.t("plot.smoothing"),
        Span::styled(loc.t(filters.smoothing.label_key()), value_style),
    );
    render_setting(
        filter_rows[3],
        buf,
        loc.t("plot.smoothing_window"),
        Span::styled(filters.smoothing_window.to_string(), value_style),
    );

    // Chart area: no border, no title
    let chart_inner = main_layout[1];
    let series = modal.session.series();
    let Some((x_bounds, y_bounds)) = series_bounds(&series) else {
        Paragraph::new(loc.t("plot.no_series"))
            .style(Style::default().fg(text_secondary))
            .centered()
            .render(chart_inner, buf);
        return;
    };

    // Palette follows column order so a series keeps its color when others are hidden
    let names = modal.session.column_names();
    let datasets: Vec<Dataset> = series
        .iter()
        .map(|s| {
            let idx = names.iter().position(|n| *n == s.name).unwrap_or(0);
            let color = theme.get(SERIES_COLORS[idx % SERIES_COLORS.len()]);
            Dataset::default()
                .name(s.name.as_str())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(color))
                .data(&s.points)
        })
        .collect();

    let axis_label_style = Style::default().fg(text_primary);
    let x_labels = vec![
        Span::styled(format_x_label(x_bounds[0]), axis_label_style),
        Span::styled(
            format_x_label((x_bounds[0] + x_bounds[1]) / 2.0),
            axis_label_style,
        ),
        Span::styled(format_x_label(x_bounds[1]), axis_label_style),
    ];
    let y_labels = vec![
        Span::styled(format_axis_label(y_bounds[0]), axis_label_style),
        Span::styled(
            format_axis_label((y_bounds[0] + y_bounds[1]) / 2.0),
            axis_label_style,
        ),
        Span::styled(format_axis_label(y_bounds[1]), axis_label_style),
    ];

    let x_axis = Axis::default()
        .bounds(x_bounds)
        .style(Style::default().fg(text_primary))
        .labels(x_labels);
    let y_axis = Axis::default()
        .bounds(y_bounds)
        .style(Style::default().fg(text_primary))
        .labels(y_labels);

    let legend = modal.show_legend.then_some(LegendPosition::TopRight);
    Chart::new(datasets)
        .x_axis(x_axis)
        .y_axis(y_axis)
        .legend_position(legend)
        .render(chart_inner, buf);
}
