//! Chart export: `plot.png` (plotters bitmap encoded with `image`) and `plot.html` (inline SVG
//! plus hover tooltips driven by the embedded chart data).

use plotters::coord::Shift;
use plotters::prelude::*;
use serde::Serialize;
use std::f64::consts::PI;
use std::io::Cursor;

use crate::chart::{ChartArtifact, ChartData, ChartKind, XAxis};
use crate::error::ChartConstructionError;
use crate::export::{Download, PLOT_HTML_FILE, PLOT_PNG_FILE};
use crate::filter::format_number;

/// Default static image resolution.
pub const DEFAULT_EXPORT_SIZE: (u32, u32) = (700, 500);

const SERIES_COLORS: [RGBColor; 10] = [
    RGBColor(99, 110, 250),
    RGBColor(239, 85, 59),
    RGBColor(0, 204, 150),
    RGBColor(171, 99, 250),
    RGBColor(255, 161, 90),
    RGBColor(25, 211, 243),
    RGBColor(255, 102, 146),
    RGBColor(182, 232, 128),
    RGBColor(255, 151, 255),
    RGBColor(254, 203, 82),
];

/// The two downloads of a chart.
#[derive(Debug, Clone)]
pub struct ChartExports {
    pub html: Download,
    pub png: Download,
}

/// Renders both exports of `artifact`. Either failing fails the whole render; the artifact itself
/// is left to the caller.
pub fn render_chart(
    artifact: &ChartArtifact,
    size: (u32, u32),
) -> Result<ChartExports, ChartConstructionError> {
    if size.0 == 0 || size.1 == 0 {
        return Err(ChartConstructionError::Render(format!(
            "export size {}x{} has no area",
            size.0, size.1
        )));
    }
    let png = chart_png(artifact, size)?;
    let html = chart_html(artifact, size)?;
    tracing::debug!(
        kind = artifact.kind.as_str(),
        png_bytes = png.len(),
        html_bytes = html.len(),
        "rendered chart exports"
    );
    Ok(ChartExports { html, png })
}

/// Pixel-space region that shows a tooltip when hovered in the HTML export.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum HoverTarget {
    Rect {
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        label: String,
    },
    /// Pie slice; angles in radians, clockwise on screen, `start < end`.
    Wedge {
        cx: i32,
        cy: i32,
        r: i32,
        start: f64,
        end: f64,
        label: String,
    },
}

fn render_error<E: std::error::Error + Send + Sync>(
    err: DrawingAreaErrorKind<E>,
) -> ChartConstructionError {
    ChartConstructionError::Render(err.to_string())
}

/// `plot.png`: RGB raster of the chart, PNG-encoded.
pub fn chart_png(
    artifact: &ChartArtifact,
    size: (u32, u32),
) -> Result<Download, ChartConstructionError> {
    let (w, h) = size;
    let mut buf = vec![0u8; w as usize * h as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buf, size).into_drawing_area();
        draw_chart(&root, artifact).map_err(render_error)?;
        root.present().map_err(render_error)?;
    }

    let image = image::RgbImage::from_raw(w, h, buf).ok_or_else(|| {
        ChartConstructionError::Render("bitmap buffer does not match image size".to_string())
    })?;
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| ChartConstructionError::Render(e.to_string()))?;
    Ok(Download::new(PLOT_PNG_FILE, "image/png", bytes))
}

#[derive(Serialize)]
struct HtmlPayload<'a> {
    title: &'a str,
    kind: &'static str,
    x_label: &'a str,
    y_label: &'a str,
    width: u32,
    height: u32,
    targets: &'a [HoverTarget],
}

/// `plot.html`: standalone document with the chart as inline SVG and hover tooltips.
pub fn chart_html(
    artifact: &ChartArtifact,
    size: (u32, u32),
) -> Result<Download, ChartConstructionError> {
    let mut svg = String::new();
    let targets = {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        let targets = draw_chart(&root, artifact).map_err(render_error)?;
        root.present().map_err(render_error)?;
        targets
    };

    let payload = HtmlPayload {
        title: &artifact.title,
        kind: artifact.kind.as_str(),
        x_label: &artifact.x_label,
        y_label: &artifact.y_label,
        width: size.0,
        height: size.1,
        targets: &targets,
    };
    let json = serde_json::to_string(&payload)
        .map_err(|e| ChartConstructionError::Render(e.to_string()))?
        .replace("</", "<\\/");

    let mut html = String::with_capacity(svg.len() + json.len() + 2048);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>");
    html.push_str(&escape_html(&artifact.title));
    html.push_str("</title>\n<style>\n");
    html.push_str(HTML_STYLE);
    html.push_str("</style>\n</head>\n<body>\n<div id=\"chart\">\n");
    html.push_str(&svg);
    html.push_str("\n</div>\n<div id=\"tooltip\"></div>\n");
    html.push_str("<script type=\"application/json\" id=\"chart-data\">");
    html.push_str(&json);
    html.push_str("</script>\n<script>\n");
    html.push_str(HOVER_SCRIPT);
    html.push_str("</script>\n</body>\n</html>\n");

    Ok(Download::new(PLOT_HTML_FILE, "text/html", html.into_bytes()))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const HTML_STYLE: &str = r#"body { font-family: sans-serif; margin: 16px; }
#chart svg { max-width: 100%; height: auto; }
#tooltip {
  position: absolute; display: none; pointer-events: none; white-space: pre;
  background: rgba(255, 255, 255, 0.95); border: 1px solid #888; border-radius: 4px;
  padding: 4px 8px; font-size: 12px;
}
"#;

const HOVER_SCRIPT: &str = r#"(function () {
  var data = JSON.parse(document.getElementById('chart-data').textContent);
  var svg = document.querySelector('#chart svg');
  var tip = document.getElementById('tooltip');
  if (!svg) { return; }
  function hit(t, x, y) {
    if (t.shape === 'rect') {
      return x >= Math.min(t.x0, t.x1) && x <= Math.max(t.x0, t.x1) &&
             y >= Math.min(t.y0, t.y1) && y <= Math.max(t.y0, t.y1);
    }
    var dx = x - t.cx, dy = y - t.cy;
    if (dx * dx + dy * dy > t.r * t.r) { return false; }
    var a = Math.atan2(dy, dx);
    while (a < t.start) { a += 2 * Math.PI; }
    return a <= t.end;
  }
  svg.addEventListener('mousemove', function (ev) {
    var box = svg.getBoundingClientRect();
    var x = (ev.clientX - box.left) * data.width / box.width;
    var y = (ev.clientY - box.top) * data.height / box.height;
    var found = null;
    for (var i = data.targets.length - 1; i >= 0; i--) {
      if (hit(data.targets[i], x, y)) { found = data.targets[i]; break; }
    }
    if (!found) { tip.style.display = 'none'; return; }
    tip.textContent = found.label;
    tip.style.left = (ev.pageX + 12) + 'px';
    tip.style.top = (ev.pageY + 12) + 'px';
    tip.style.display = 'block';
  });
  svg.addEventListener('mouseleave', function () { tip.style.display = 'none'; });
})();
"#;

/// Draws the artifact onto any plotters backend and returns hover regions in backend pixels.
pub fn draw_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    artifact: &ChartArtifact,
) -> Result<Vec<HoverTarget>, DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;
    let area = root.titled(&artifact.title, ("sans-serif", 22))?;

    if let ChartData::Pie(slices) = &artifact.data {
        return draw_pie(&area, slices);
    }

    let Some((x_min, x_max, y_min, y_max)) = artifact.bounds() else {
        return Ok(Vec::new());
    };

    let x_axis = match &artifact.data {
        ChartData::Points { x_axis, .. } => x_axis.clone(),
        _ => XAxis::Numeric,
    };
    let is_box = matches!(artifact.data, ChartData::Box(_));
    let format_x = |v: &f64| {
        if is_box {
            String::new()
        } else {
            x_axis.format(*v)
        }
    };
    let format_y = |v: &f64| format_number(*v);

    let mut chart = ChartBuilder::on(&area)
        .margin(20)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    let mut mesh = chart.configure_mesh();
    mesh.x_desc(artifact.x_label.as_str())
        .y_desc(artifact.y_label.as_str())
        .x_label_formatter(&format_x)
        .y_label_formatter(&format_y);
    if let XAxis::Categorical(labels) = &x_axis {
        mesh.x_labels(labels.len() + 2);
    }
    if is_box {
        mesh.x_labels(0);
    }
    mesh.draw()?;

    let color = SERIES_COLORS[0];
    let mut targets = Vec::new();

    match &artifact.data {
        ChartData::Points { points, x_axis } => {
            match artifact.kind {
                ChartKind::Line => {
                    chart.draw_series(LineSeries::new(
                        points.iter().copied(),
                        color.stroke_width(2),
                    ))?;
                }
                ChartKind::Bar => {
                    let half = bar_width(points, x_axis) / 2.0;
                    chart.draw_series(points.iter().map(|&(x, y)| {
                        Rectangle::new([(x - half, 0.0), (x + half, y)], color.filled())
                    }))?;
                    for &(x, y) in points {
                        let (x0, y0) = chart.backend_coord(&(x - half, 0.0));
                        let (x1, y1) = chart.backend_coord(&(x + half, y));
                        targets.push(HoverTarget::Rect {
                            x0,
                            y0,
                            x1,
                            y1,
                            label: point_label(artifact, x_axis, x, y),
                        });
                    }
                    return Ok(targets);
                }
                _ => {
                    chart.draw_series(
                        points
                            .iter()
                            .map(|&p| Circle::new(p, 3, color.mix(0.8).filled())),
                    )?;
                }
            }
            for &(x, y) in points {
                let (px, py) = chart.backend_coord(&(x, y));
                targets.push(HoverTarget::Rect {
                    x0: px - 5,
                    y0: py - 5,
                    x1: px + 5,
                    y1: py + 5,
                    label: point_label(artifact, x_axis, x, y),
                });
            }
        }
        ChartData::Histogram(bins) => {
            chart.draw_series(bins.iter().map(|b| {
                Rectangle::new([(b.start, 0.0), (b.end, b.count as f64)], color.filled())
            }))?;
            chart.draw_series(bins.iter().map(|b| {
                Rectangle::new(
                    [(b.start, 0.0), (b.end, b.count as f64)],
                    WHITE.stroke_width(1),
                )
            }))?;
            for b in bins {
                let (x0, y0) = chart.backend_coord(&(b.start, 0.0));
                let (x1, y1) = chart.backend_coord(&(b.end, b.count as f64));
                targets.push(HoverTarget::Rect {
                    x0,
                    y0,
                    x1,
                    y1,
                    label: format!(
                        "{}: [{}, {})\ncount: {}",
                        artifact.x_label,
                        format_number(b.start),
                        format_number(b.end),
                        b.count
                    ),
                });
            }
        }
        ChartData::Box(stats) => {
            let style = color.stroke_width(2);
            chart.draw_series(std::iter::once(Rectangle::new(
                [(-0.25, stats.q1), (0.25, stats.q3)],
                color.mix(0.3).filled(),
            )))?;
            chart.draw_series(std::iter::once(Rectangle::new(
                [(-0.25, stats.q1), (0.25, stats.q3)],
                style,
            )))?;
            let segments = [
                [(-0.25, stats.median), (0.25, stats.median)],
                [(0.0, stats.q3), (0.0, stats.upper_whisker)],
                [(0.0, stats.q1), (0.0, stats.lower_whisker)],
                [(-0.1, stats.upper_whisker), (0.1, stats.upper_whisker)],
                [(-0.1, stats.lower_whisker), (0.1, stats.lower_whisker)],
            ];
            chart.draw_series(
                segments
                    .iter()
                    .map(|seg| PathElement::new(seg.to_vec(), style)),
            )?;
            chart.draw_series(
                stats
                    .outliers
                    .iter()
                    .map(|&v| Circle::new((0.0, v), 3, color.stroke_width(1))),
            )?;

            let (x0, y0) = chart.backend_coord(&(-0.25, stats.upper_whisker));
            let (x1, y1) = chart.backend_coord(&(0.25, stats.lower_whisker));
            targets.push(HoverTarget::Rect {
                x0,
                y0,
                x1,
                y1,
                label: format!(
                    "{}\nmax: {}\nupper fence: {}\nq3: {}\nmedian: {}\nq1: {}\nlower fence: {}\nmin: {}\ncount: {}",
                    artifact.y_label,
                    format_number(stats.max),
                    format_number(stats.upper_whisker),
                    format_number(stats.q3),
                    format_number(stats.median),
                    format_number(stats.q1),
                    format_number(stats.lower_whisker),
                    format_number(stats.min),
                    stats.count
                ),
            });
            for &v in &stats.outliers {
                let (px, py) = chart.backend_coord(&(0.0, v));
                targets.push(HoverTarget::Rect {
                    x0: px - 5,
                    y0: py - 5,
                    x1: px + 5,
                    y1: py + 5,
                    label: format!("{}: {}", artifact.y_label, format_number(v)),
                });
            }
        }
        ChartData::Pie(_) => {}
    }

    Ok(targets)
}

fn point_label(artifact: &ChartArtifact, x_axis: &XAxis, x: f64, y: f64) -> String {
    format!(
        "{}: {}\n{}: {}",
        artifact.x_label,
        x_axis.format(x),
        artifact.y_label,
        format_number(y)
    )
}

/// Bar width in data units: 0.8 of the smallest gap between distinct x values.
fn bar_width(points: &[(f64, f64)], x_axis: &XAxis) -> f64 {
    if matches!(x_axis, XAxis::Categorical(_)) {
        return 0.8;
    }
    let mut xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    xs.sort_by(|a, b| a.total_cmp(b));
    xs.dedup();
    let gap = xs
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|g| *g > 0.0)
        .fold(f64::INFINITY, f64::min);
    if gap.is_finite() { gap * 0.8 } else { 0.8 }
}

fn draw_pie<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    slices: &[crate::chart::PieSlice],
) -> Result<Vec<HoverTarget>, DrawingAreaErrorKind<DB::ErrorType>> {
    let (w, h) = area.dim_in_pixel();
    let (base_x, base_y) = area.get_base_pixel();
    let legend_width = (w as i32 / 4).min(180);
    let cx = (w as i32 - legend_width) / 2;
    let cy = h as i32 / 2;
    let r = ((w as i32 - legend_width).min(h as i32) as f64 * 0.4) as i32;

    let mut targets = Vec::with_capacity(slices.len());
    let mut start = -PI / 2.0;
    for (i, slice) in slices.iter().enumerate() {
        let sweep = slice.fraction * 2.0 * PI;
        let end = start + sweep;
        let color = SERIES_COLORS[i % SERIES_COLORS.len()];

        if sweep > 0.0 {
            let steps = ((sweep / (2.0 * PI)) * 180.0).ceil().max(2.0) as usize;
            let mut outline = Vec::with_capacity(steps + 2);
            outline.push((cx, cy));
            for s in 0..=steps {
                let a = start + sweep * s as f64 / steps as f64;
                outline.push((
                    cx + (r as f64 * a.cos()).round() as i32,
                    cy + (r as f64 * a.sin()).round() as i32,
                ));
            }
            area.draw(&Polygon::new(outline.clone(), color.filled()))?;
            area.draw(&PathElement::new(outline, WHITE.stroke_width(1)))?;

            if slice.fraction >= 0.04 {
                let mid = start + sweep / 2.0;
                let text = format!("{:.1}%", slice.fraction * 100.0);
                let pos = (
                    cx + (r as f64 * 0.65 * mid.cos()) as i32 - 4 * text.len() as i32 / 2,
                    cy + (r as f64 * 0.65 * mid.sin()) as i32 - 6,
                );
                area.draw(&Text::new(text, pos, ("sans-serif", 13).into_font().color(&WHITE)))?;
            }
        }

        let legend_x = w as i32 - legend_width;
        let legend_y = 20 + i as i32 * 20;
        area.draw(&Rectangle::new(
            [(legend_x, legend_y), (legend_x + 12, legend_y + 12)],
            color.filled(),
        ))?;
        area.draw(&Text::new(
            slice.label.clone(),
            (legend_x + 18, legend_y),
            ("sans-serif", 13),
        ))?;

        targets.push(HoverTarget::Wedge {
            cx: base_x + cx,
            cy: base_y + cy,
            r,
            start,
            end,
            label: format!(
                "{}\n{} ({:.1}%)",
                slice.label,
                format_number(slice.value),
                slice.fraction * 100.0
            ),
        });
        start = end;
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{ChartArtifact, ChartData, ChartKind, PieSlice, XAxis};

    fn line_artifact() -> ChartArtifact {
        ChartArtifact {
            kind: ChartKind::Line,
            title: "Line Chart".to_string(),
            x_label: "x".to_string(),
            y_label: "y".to_string(),
            data: ChartData::Points {
                points: vec![(0.0, 1.0), (1.0, 2.0), (2.0, 1.5)],
                x_axis: XAxis::Numeric,
            },
        }
    }

    #[test]
    fn bar_width_uses_smallest_gap() {
        let pts = [(0.0, 1.0), (10.0, 1.0), (12.0, 1.0)];
        assert!((bar_width(&pts, &XAxis::Numeric) - 1.6).abs() < 1e-12);
        assert_eq!(bar_width(&[(3.0, 1.0)], &XAxis::Numeric), 0.8);
        assert_eq!(bar_width(&pts, &XAxis::Categorical(vec![])), 0.8);
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("a<b & \"c\">"), "a&lt;b &amp; &quot;c&quot;&gt;");
    }

    #[test]
    fn hover_targets_serialize_with_shape_tag() {
        let t = HoverTarget::Rect {
            x0: 1,
            y0: 2,
            x1: 3,
            y1: 4,
            label: "a".to_string(),
        };
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"shape\":\"rect\""), "{json}");
    }

    /// Text layout needs a system font. Only a missing font is tolerated, any other render
    /// failure fails the test.
    fn font_missing(msg: &str) -> bool {
        msg.to_lowercase().contains("font")
    }

    #[test]
    fn zero_sized_export_is_render_error() {
        let err = render_chart(&line_artifact(), (0, 500)).unwrap_err();
        assert!(
            matches!(&err, ChartConstructionError::Render(msg) if msg.contains("0x500")),
            "{err}"
        );
    }

    #[test]
    fn png_export_is_png() {
        match chart_png(&line_artifact(), DEFAULT_EXPORT_SIZE) {
            Ok(download) => {
                assert_eq!(download.file_name, "plot.png");
                assert_eq!(download.mime, "image/png");
                assert_eq!(&download.bytes[..8], b"\x89PNG\r\n\x1a\n");
            }
            Err(ChartConstructionError::Render(msg)) if font_missing(&msg) => {
                eprintln!("no system font, skipping: {msg}")
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn html_export_embeds_svg_and_tooltips() {
        let artifact = ChartArtifact {
            kind: ChartKind::Pie,
            title: "Pie Chart".to_string(),
            x_label: "category".to_string(),
            y_label: "amount".to_string(),
            data: ChartData::Pie(vec![
                PieSlice {
                    label: "A".to_string(),
                    value: 1.0,
                    fraction: 0.25,
                },
                PieSlice {
                    label: "B".to_string(),
                    value: 3.0,
                    fraction: 0.75,
                },
            ]),
        };
        match chart_html(&artifact, DEFAULT_EXPORT_SIZE) {
            Ok(download) => {
                assert_eq!(download.file_name, "plot.html");
                let html = String::from_utf8(download.bytes).unwrap();
                assert!(html.starts_with("<!DOCTYPE html>"));
                assert!(html.contains("<svg"));
                assert!(html.contains("\"shape\":\"wedge\""));
                assert!(html.contains("addEventListener('mousemove'"));
                assert!(html.contains("<title>Pie Chart</title>"));
            }
            Err(ChartConstructionError::Render(msg)) if font_missing(&msg) => {
                eprintln!("no system font, skipping: {msg}")
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
