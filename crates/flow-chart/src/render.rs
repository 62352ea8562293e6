use flow_core::{FlowPoint, PriceBar, TradingDay};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::ops::Range;

pub const CHART_WIDTH: u32 = 1000;
pub const CHART_HEIGHT: u32 = 1200;

const BUY_COLOR: RGBColor = RGBColor(214, 39, 40);
const SELL_COLOR: RGBColor = RGBColor(31, 119, 180);
const CLOSE_COLOR: RGBColor = RGBColor(31, 119, 180);
const MA_COLOR: RGBColor = RGBColor(255, 127, 14);

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;

/// Everything needed to draw one stock's detail figure.
#[derive(Debug, Clone)]
pub struct ChartData {
    pub title: String,
    pub bars: Vec<PriceBar>,
    pub moving_average: Vec<Option<f64>>,
    pub institutional_title: String,
    pub institutional: Option<Vec<FlowPoint>>,
    pub foreign_title: String,
    pub foreign: Option<Vec<FlowPoint>>,
}

/// Simple moving average; `None` until `window` values are available.
pub fn moving_average(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }

    let mut sum = 0.0;
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            sum += v;
            if i >= window {
                sum -= values[i - window];
            }
            (i + 1 >= window).then(|| sum / window as f64)
        })
        .collect()
}

/// Net buying is drawn red, net selling (or flat) blue.
pub fn bar_color(value: f64) -> RGBColor {
    if value > 0.0 {
        BUY_COLOR
    } else {
        SELL_COLOR
    }
}

/// Round to whole units and group thousands: `73600.0` -> `"73,600"`.
pub fn format_thousands(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if rounded < 0 {
        out.insert(0, '-');
    }
    out
}

/// Draw the three-panel figure (price 2 : institutional 1 : foreign 1) as an SVG document.
pub fn draw_svg(data: &ChartData, font: &str) -> anyhow::Result<String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE)?;

        let (price_area, flow_area) = root.split_vertically(CHART_HEIGHT / 2);
        let (inst_area, forg_area) = flow_area.split_vertically(CHART_HEIGHT / 4);

        draw_price_panel(&price_area, data, font)?;
        draw_flow_panel(&inst_area, &data.institutional_title, data.institutional.as_deref(), font)?;
        draw_flow_panel(&forg_area, &data.foreign_title, data.foreign.as_deref(), font)?;

        root.present()?;
    }
    Ok(svg)
}

fn caption_font(font: &str, size: f64, style: FontStyle) -> FontDesc<'_> {
    FontDesc::new(FontFamily::Name(font), size, style)
}

fn date_label(dates: &[TradingDay], x: f64) -> String {
    let i = x.round();
    if i < 0.0 || i as usize >= dates.len() {
        return String::new();
    }
    dates[i as usize].date().format("%y-%m-%d").to_string()
}

fn draw_price_panel(area: &Area<'_>, data: &ChartData, font: &str) -> anyhow::Result<()> {
    let dates: Vec<TradingDay> = data.bars.iter().map(|b| b.date).collect();
    let closes = data.bars.iter().map(|b| b.close);
    let averages = data.moving_average.iter().flatten().copied();
    let y_range = padded_range(closes.chain(averages));
    let n = data.bars.len() as f64;

    let mut chart = ChartBuilder::on(area)
        .caption(&data.title, caption_font(font, 22.0, FontStyle::Bold))
        .margin(12)
        .x_label_area_size(28)
        .y_label_area_size(80)
        .build_cartesian_2d(-0.5..n - 0.5, y_range)?;

    let x_fmt = |x: &f64| date_label(&dates, *x);
    let y_fmt = |y: &f64| format_thousands(*y);
    chart
        .configure_mesh()
        .x_labels(6)
        .x_label_formatter(&x_fmt)
        .y_label_formatter(&y_fmt)
        .light_line_style(BLACK.mix(0.05))
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            data.bars.iter().enumerate().map(|(i, b)| (i as f64, b.close)),
            CLOSE_COLOR.stroke_width(2),
        ))?
        .label("Close")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], CLOSE_COLOR));

    chart
        .draw_series(LineSeries::new(
            data.moving_average
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.map(|v| (i as f64, v))),
            MA_COLOR.mix(0.7),
        ))?
        .label("MA20")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], MA_COLOR));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK.mix(0.3))
        .draw()?;

    Ok(())
}

fn draw_flow_panel(area: &Area<'_>, title: &str, points: Option<&[FlowPoint]>, font: &str) -> anyhow::Result<()> {
    let Some(points) = points.filter(|p| !p.is_empty()) else {
        area.titled(&format!("{} - 데이터 없음", title), caption_font(font, 16.0, FontStyle::Normal))?;
        return Ok(());
    };

    let dates: Vec<TradingDay> = points.iter().map(|p| p.date).collect();
    let n = points.len() as f64;

    let mut chart = ChartBuilder::on(area)
        .caption(title, caption_font(font, 16.0, FontStyle::Normal))
        .margin(12)
        .x_label_area_size(28)
        .y_label_area_size(80)
        .build_cartesian_2d(-0.5..n - 0.5, bar_range(points.iter().map(|p| p.value)))?;

    let x_fmt = |x: &f64| date_label(&dates, *x);
    let y_fmt = |y: &f64| format_thousands(*y);
    chart
        .configure_mesh()
        .x_labels(6)
        .x_label_formatter(&x_fmt)
        .y_label_formatter(&y_fmt)
        .light_line_style(BLACK.mix(0.05))
        .draw()?;

    chart.draw_series(points.iter().enumerate().map(|(i, p)| {
        let x = i as f64;
        Rectangle::new([(x - 0.4, 0.0), (x + 0.4, p.value)], bar_color(p.value).filled())
    }))?;

    Ok(())
}

/// Min..max of the values with 5% headroom; never empty.
fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || !hi.is_finite() {
        return 0.0..1.0;
    }
    if hi - lo < f64::EPSILON {
        let pad = (hi.abs() * 0.05).max(1.0);
        return lo - pad..hi + pad;
    }
    let pad = (hi - lo) * 0.05;
    lo - pad..hi + pad
}

/// Like [`padded_range`] but always includes zero so bars grow from the axis.
fn bar_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    padded_range(values.chain([0.0]))
}
