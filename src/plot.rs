//! Time-series plot state built from a full table: timestamp detection, a
//! one-minute timeline for range selection, and per-column filtering.

use crate::filters::FilterSettings;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Timelike};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use polars::datatypes::TimeUnit;
use polars::prelude::*;

/// Preferred layout of timestamp text (what date/time reformatting produces).
pub const PRIMARY_TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S%.f";

const FALLBACK_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S%.f",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M",
];

const FALLBACK_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"];

/// Axis label layout for timestamps.
pub const AXIS_LABEL_FORMAT: &str = "%d.%m.%Y %H:%M";

pub fn parse_timestamp(text: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), format).ok()
}

/// Try the common layouts in turn; the first that parses wins.
pub fn parse_timestamp_any(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    FALLBACK_TIMESTAMP_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            FALLBACK_DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub fn timestamp_to_x(ts: NaiveDateTime) -> f64 {
    ts.and_utc().timestamp_millis() as f64
}

pub fn x_to_timestamp(x: f64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(x as i64).map(|d| d.naive_utc())
}

/// Axis label for an x value produced by `timestamp_to_x`.
pub fn format_x_label(x: f64) -> String {
    x_to_timestamp(x)
        .map(|ts| ts.format(AXIS_LABEL_FORMAT).to_string())
        .unwrap_or_default()
}

fn floor_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

fn is_numeric_type(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

fn millis_per_unit(unit: &TimeUnit) -> (i64, i64) {
    // (multiplier, divisor) to convert into milliseconds
    match unit {
        TimeUnit::Nanoseconds => (1, 1_000_000),
        TimeUnit::Microseconds => (1, 1_000),
        TimeUnit::Milliseconds => (1, 1),
    }
}

/// Timestamps of a column, or `None` if the column cannot hold any.
fn column_timestamps(column: &Column) -> Result<Option<Vec<Option<NaiveDateTime>>>> {
    let series = column.as_materialized_series();
    let values = match series.dtype() {
        DataType::Datetime(unit, _) => {
            let (mul, div) = millis_per_unit(unit);
            let raw = series.cast(&DataType::Int64)?;
            raw.i64()?
                .into_iter()
                .map(|v| v.and_then(|v| DateTime::from_timestamp_millis(v * mul / div)))
                .map(|d| d.map(|d| d.naive_utc()))
                .collect::<Vec<_>>()
        }
        DataType::Date => {
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .ok_or_else(|| eyre!("invalid epoch"))?;
            let raw = series.cast(&DataType::Int32)?;
            raw.i32()?
                .into_iter()
                .map(|v| v.map(|days| epoch + Duration::days(days as i64)))
                .collect::<Vec<_>>()
        }
        DataType::String => {
            let text = series.str()?;
            let primary: Vec<Option<NaiveDateTime>> = text
                .into_iter()
                .map(|v| v.and_then(|s| parse_timestamp(s, PRIMARY_TIMESTAMP_FORMAT)))
                .collect();
            if primary.iter().any(Option::is_some) {
                primary
            } else {
                text.into_iter()
                    .map(|v| v.and_then(parse_timestamp_any))
                    .collect()
            }
        }
        _ => return Ok(None),
    };
    Ok(values.iter().any(Option::is_some).then_some(values))
}

/// One plottable numeric column, aligned with the sorted timestamps.
#[derive(Debug, Clone)]
struct SeriesColumn {
    name: String,
    values: Vec<Option<f64>>,
    plotted: bool,
    filter_target: bool,
}

/// Points ready for drawing: x is `timestamp_to_x`, y the (filtered) value.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSeries {
    pub name: String,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone)]
pub struct PlotSession {
    timestamp_column: String,
    timestamps: Vec<NaiveDateTime>,
    columns: Vec<SeriesColumn>,
    timeline_start: NaiveDateTime,
    timeline_len: usize,
    start: usize,
    end: usize,
    pub filters: FilterSettings,
    default_filters: FilterSettings,
}

impl PlotSession {
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        Self::from_frame_with_defaults(df, FilterSettings::default())
    }

    /// Like `from_frame`, with the filter values "reset" returns to.
    pub fn from_frame_with_defaults(df: &DataFrame, defaults: FilterSettings) -> Result<Self> {
        let mut timestamp = None;
        for column in df.get_columns() {
            if let Some(values) = column_timestamps(column)? {
                timestamp = Some((column.name().to_string(), values));
                break;
            }
        }
        let (timestamp_column, raw_ts) =
            timestamp.ok_or_else(|| eyre!("No valid datetime column found"))?;

        let mut numeric: Vec<(String, Vec<Option<f64>>)> = Vec::new();
        for column in df.get_columns() {
            if column.name().as_str() == timestamp_column || !is_numeric_type(column.dtype()) {
                continue;
            }
            let cast = column
                .as_materialized_series()
                .cast(&DataType::Float64)?;
            let values = cast
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()))
                .collect();
            numeric.push((column.name().to_string(), values));
        }
        if numeric.is_empty() {
            return Err(eyre!("No numeric columns available"));
        }

        // Rows without a timestamp are dropped; the rest sorted by time (stable).
        let mut order: Vec<(NaiveDateTime, usize)> = raw_ts
            .iter()
            .enumerate()
            .filter_map(|(i, ts)| ts.map(|ts| (ts, i)))
            .collect();
        order.sort_by_key(|(ts, _)| *ts);

        let timestamps: Vec<NaiveDateTime> = order.iter().map(|(ts, _)| *ts).collect();
        let columns = numeric
            .into_iter()
            .enumerate()
            .map(|(idx, (name, values))| SeriesColumn {
                name,
                values: order.iter().map(|(_, i)| values[*i]).collect(),
                plotted: idx == 0,
                filter_target: false,
            })
            .collect();

        let first = timestamps
            .first()
            .copied()
            .ok_or_else(|| eyre!("No valid datetime column found"))?;
        let last = timestamps.last().copied().unwrap_or(first);
        let timeline_start = floor_minute(first);
        let timeline_len =
            ((floor_minute(last) - timeline_start).num_minutes().max(0) as usize) + 1;

        tracing::debug!(
            timestamp = %timestamp_column,
            rows = timestamps.len(),
            minutes = timeline_len,
            "plot session ready"
        );

        Ok(Self {
            timestamp_column,
            timestamps,
            columns,
            timeline_start,
            timeline_len,
            start: 0,
            end: timeline_len - 1,
            filters: defaults,
            default_filters: defaults,
        })
    }

    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }

    pub fn row_count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn timeline_len(&self) -> usize {
        self.timeline_len
    }

    /// Timestamp of timeline slot `idx` (clamped).
    pub fn timeline_at(&self, idx: usize) -> NaiveDateTime {
        let idx = idx.min(self.timeline_len - 1);
        self.timeline_start + Duration::minutes(idx as i64)
    }

    pub fn range(&self) -> (usize, usize) {
        (self.start, self.end)
    }

    /// Selected window as timestamps: `[start, end + 1 minute)`.
    pub fn range_bounds(&self) -> (NaiveDateTime, NaiveDateTime) {
        (
            self.timeline_at(self.start),
            self.timeline_at(self.end) + Duration::minutes(1),
        )
    }

    /// Set both bounds; they are clamped to the timeline and swapped if inverted.
    pub fn set_range(&mut self, start: usize, end: usize) {
        let max = self.timeline_len - 1;
        let (a, b) = (start.min(max), end.min(max));
        self.start = a.min(b);
        self.end = a.max(b);
    }

    pub fn set_start(&mut self, start: usize) {
        self.set_range(start, self.end);
    }

    pub fn set_end(&mut self, end: usize) {
        self.set_range(self.start, end);
    }

    pub fn move_start(&mut self, delta: i64) {
        self.set_start(Self::offset(self.start, delta));
    }

    pub fn move_end(&mut self, delta: i64) {
        self.set_end(Self::offset(self.end, delta));
    }

    fn offset(idx: usize, delta: i64) -> usize {
        (idx as i64 + delta).max(0) as usize
    }

    pub fn is_plotted(&self, col: usize) -> bool {
        self.columns.get(col).is_some_and(|c| c.plotted)
    }

    pub fn toggle_plotted(&mut self, col: usize) {
        if let Some(c) = self.columns.get_mut(col) {
            c.plotted = !c.plotted;
        }
    }

    pub fn is_filter_target(&self, col: usize) -> bool {
        self.columns.get(col).is_some_and(|c| c.filter_target)
    }

    pub fn toggle_filter_target(&mut self, col: usize) {
        if let Some(c) = self.columns.get_mut(col) {
            c.filter_target = !c.filter_target;
        }
    }

    /// Restore default filter values and clear the filter target set.
    pub fn reset_filters(&mut self) {
        self.filters = self.default_filters;
        for c in &mut self.columns {
            c.filter_target = false;
        }
    }

    fn range_rows(&self) -> std::ops::Range<usize> {
        let (lo, hi) = self.range_bounds();
        let first = self.timestamps.partition_point(|ts| *ts < lo);
        let last = self.timestamps.partition_point(|ts| *ts < hi);
        first..last
    }

    /// Values of column `col` inside the selected range, filtered if it is a target.
    pub fn range_values(&self, col: usize) -> Vec<Option<f64>> {
        let Some(column) = self.columns.get(col) else {
            return Vec::new();
        };
        let raw = &column.values[self.range_rows()];
        if column.filter_target {
            self.filters.apply(raw)
        } else {
            raw.to_vec()
        }
    }

    /// Every plotted column over the selected range.
    pub fn series(&self) -> Vec<PlotSeries> {
        let rows = self.range_rows();
        let xs: Vec<f64> = self.timestamps[rows]
            .iter()
            .map(|ts| timestamp_to_x(*ts))
            .collect();
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.plotted)
            .map(|(idx, c)| PlotSeries {
                name: c.name.clone(),
                points: xs
                    .iter()
                    .zip(self.range_values(idx))
                    .filter_map(|(x, y)| y.map(|y| (*x, y)))
                    .collect(),
            })
            .collect()
    }
}

/// Min/max over all points, padded when flat. `None` if there are no points.
pub fn series_bounds(series: &[PlotSeries]) -> Option<([f64; 2], [f64; 2])> {
    let mut points = series.iter().flat_map(|s| s.points.iter());
    let &(x0, y0) = points.next()?;
    let (mut x, mut y) = ([x0, x0], [y0, y0]);
    for &(px, py) in points {
        x = [x[0].min(px), x[1].max(px)];
        y = [y[0].min(py), y[1].max(py)];
    }
    if x[0] == x[1] {
        x = [x[0] - 30_000.0, x[1] + 30_000.0];
    }
    if y[0] == y[1] {
        y = [y[0] - 1.0, y[1] + 1.0];
    }
    Some((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::Smoothing;

    fn sample_frame() -> DataFrame {
        df!(
            "ts" => &[
                "01/01/2024 10:02:30.000",
                "01/01/2024 10:00:00.000",
                "01/01/2024 10:01:15.500",
                "not a date",
                "01/01/2024 10:03:59.999",
            ],
            "label" => &["c", "a", "b", "x", "d"],
            "temp" => &[3.0_f64, 1.0, 2.0, 99.0, 4.0],
            "count" => &[30_i64, 10, 20, 990, 40]
        )
        .unwrap()
    }

    #[test]
    fn test_detects_text_timestamp_and_numeric_columns() {
        let session = PlotSession::from_frame(&sample_frame()).unwrap();
        assert_eq!(session.timestamp_column(), "ts");
        assert_eq!(session.column_names(), vec!["temp", "count"]);
        assert_eq!(session.row_count(), 4);
        assert!(session.is_plotted(0));
        assert!(!session.is_plotted(1));
        assert!(!session.is_filter_target(0));
    }

    #[test]
    fn test_rows_sorted_by_timestamp() {
        let session = PlotSession::from_frame(&sample_frame()).unwrap();
        assert_eq!(
            session.range_values(0),
            vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]
        );
    }

    #[test]
    fn test_timeline_has_one_minute_steps() {
        let session = PlotSession::from_frame(&sample_frame()).unwrap();
        assert_eq!(session.timeline_len(), 4);
        assert_eq!(
            session.timeline_at(3).format("%H:%M:%S").to_string(),
            "10:03:00"
        );
        assert_eq!(session.range(), (0, 3));
    }

    #[test]
    fn test_range_is_reordered_and_clamped() {
        let mut session = PlotSession::from_frame(&sample_frame()).unwrap();
        session.set_range(3, 1);
        assert_eq!(session.range(), (1, 3));
        session.set_end(0);
        assert_eq!(session.range(), (0, 1));
        session.move_end(100);
        assert_eq!(session.range(), (0, 3));
        session.move_start(-5);
        assert_eq!(session.range().0, 0);
    }

    #[test]
    fn test_range_end_includes_its_minute() {
        let mut session = PlotSession::from_frame(&sample_frame()).unwrap();
        session.set_range(1, 2);
        assert_eq!(session.range_values(0), vec![Some(2.0), Some(3.0)]);
        session.set_range(3, 3);
        assert_eq!(session.range_values(0), vec![Some(4.0)]);
    }

    #[test]
    fn test_unfiltered_series_matches_raw_range() {
        let mut session = PlotSession::from_frame(&sample_frame()).unwrap();
        session.toggle_plotted(1);
        session.filters.smoothing = Smoothing::Ema;
        // not a filter target, so EMA must not touch it
        let series = session.series();
        assert_eq!(series.len(), 2);
        let ys: Vec<f64> = series[0].points.iter().map(|p| p.1).collect();
        assert_eq!(ys, vec![1.0, 2.0, 3.0, 4.0]);
        let ys: Vec<f64> = series[1].points.iter().map(|p| p.1).collect();
        assert_eq!(ys, vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_filters_apply_only_to_targets() {
        let mut session = PlotSession::from_frame(&sample_frame()).unwrap();
        session.toggle_plotted(1);
        session.toggle_filter_target(1);
        session.filters.smoothing = Smoothing::Sma;
        session.filters.smoothing_window = 2;
        let series = session.series();
        let ys: Vec<f64> = series[0].points.iter().map(|p| p.1).collect();
        assert_eq!(ys, vec![1.0, 2.0, 3.0, 4.0]);
        let ys: Vec<f64> = series[1].points.iter().map(|p| p.1).collect();
        assert_eq!(ys, vec![10.0, 15.0, 25.0, 35.0]);
    }

    #[test]
    fn test_reset_filters() {
        let mut session = PlotSession::from_frame(&sample_frame()).unwrap();
        session.toggle_filter_target(0);
        session.filters.spike_removal = true;
        session.filters.spike_window = 9;
        session.filters.smoothing = Smoothing::Ema;
        session.filters.smoothing_window = 50;
        session.reset_filters();
        assert_eq!(session.filters, FilterSettings::default());
        assert!(!session.is_filter_target(0));
    }

    #[test]
    fn test_no_datetime_column_errors() {
        let df = df!("a" => &[1.0_f64, 2.0], "b" => &["x", "y"]).unwrap();
        let err = PlotSession::from_frame(&df).unwrap_err();
        assert!(err.to_string().contains("datetime"));
    }

    #[test]
    fn test_no_numeric_column_errors() {
        let df = df!("ts" => &["2024-01-01 00:00:00"], "b" => &["x"]).unwrap();
        let err = PlotSession::from_frame(&df).unwrap_err();
        assert!(err.to_string().contains("numeric"));
    }

    #[test]
    fn test_fallback_formats_and_datetime_dtype() {
        let df = df!("when" => &["2024-05-06 07:08:09", "2024-05-06 07:10:00"], "v" => &[1_i32, 2])
            .unwrap();
        let session = PlotSession::from_frame(&df).unwrap();
        assert_eq!(session.timeline_len(), 3);

        let millis = Series::new("dt".into(), &[0_i64, 120_000])
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap();
        let df = DataFrame::new(vec![
            millis.into(),
            Series::new("v".into(), &[1.0_f64, 2.0]).into(),
        ])
        .unwrap();
        let session = PlotSession::from_frame(&df).unwrap();
        assert_eq!(session.timestamp_column(), "dt");
        assert_eq!(session.timeline_len(), 3);
    }

    #[test]
    fn test_axis_label_round_trip() {
        let ts = parse_timestamp("05/03/2024 14:07:09.123", PRIMARY_TIMESTAMP_FORMAT).unwrap();
        assert_eq!(format_x_label(timestamp_to_x(ts)), "05.03.2024 14:07");
    }

    #[test]
    fn test_series_bounds_pads_flat_data() {
        let series = vec![PlotSeries {
            name: "a".to_string(),
            points: vec![(0.0, 5.0), (60_000.0, 5.0)],
        }];
        let (x, y) = series_bounds(&series).unwrap();
        assert_eq!(x, [0.0, 60_000.0]);
        assert_eq!(y, [4.0, 6.0]);
        assert!(series_bounds(&[]).is_none());
    }
}
