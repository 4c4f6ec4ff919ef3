use crate::api::{ApiResult, SkewError};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Turns a skew curve into an artifact file at `target`.
pub trait ArtifactRenderer: Send + Sync {
    /// File extension of produced artifacts, without the dot.
    fn extension(&self) -> &str;
    /// Renders `skew`, captioned with `title` or the renderer's own default.
    fn render(&self, skew: &[i64], title: Option<&str>, target: &Path) -> ApiResult<()>;
}

/// Line plot of a skew curve as a standalone SVG document.
pub struct SkewPlotter {
    width: u32,
    height: u32,
    margin: u32,
    max_points: usize,
    canvas_background: u32,
    line_color: u32,
    title: String,
}

struct SvgTag {
    name: &'static str,
    attributes: BTreeMap<&'static str, String>,
}

impl SvgTag {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            attributes: BTreeMap::new(),
        }
    }

    fn attr(mut self, key: &'static str, value: impl ToString) -> Self {
        self.attributes.insert(key, value.to_string());
        self
    }

    fn render(&self, self_closing: bool) -> String {
        let attrs: String = self
            .attributes
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, escape_xml(v)))
            .collect::<Vec<_>>()
            .join(" ");

        if self_closing {
            format!("<{} {}/>", self.name, attrs)
        } else {
            format!("<{} {}>", self.name, attrs)
        }
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('\'', "&apos;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl Default for SkewPlotter {
    fn default() -> Self {
        Self::new(1250, 500)
    }
}

impl SkewPlotter {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            margin: 60,
            max_points: (4 * width as usize).max(4),
            canvas_background: 0xFFFFFF,
            line_color: 0x2D4DF0,
            title: "G-C Skew Along The Genome".to_string(),
        }
    }

    // Long curves are thinned to at most `max_points` vertices, keeping the
    // extreme values of every bucket so dips survive.
    fn sample(&self, skew: &[i64]) -> Vec<(usize, i64)> {
        if skew.len() <= self.max_points {
            return skew.iter().copied().enumerate().collect();
        }

        let bucket = skew.len().div_ceil(self.max_points / 2);
        let mut points = Vec::with_capacity(self.max_points + 1);
        for (chunk_idx, chunk) in skew.chunks(bucket).enumerate() {
            let offset = chunk_idx * bucket;
            let (mut lo, mut hi) = (0, 0);
            for (idx, &value) in chunk.iter().enumerate() {
                if value < chunk[lo] {
                    lo = idx;
                }
                if value > chunk[hi] {
                    hi = idx;
                }
            }
            let (first, second) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            points.push((offset + first, chunk[first]));
            if second != first {
                points.push((offset + second, chunk[second]));
            }
        }
        points
    }

    pub fn generate_svg(&self, skew: &[i64], title: Option<&str>) -> String {
        let plot_w = self.width.saturating_sub(2 * self.margin).max(1) as f64;
        let plot_h = self.height.saturating_sub(2 * self.margin).max(1) as f64;
        let left = self.margin as f64;
        let top = self.margin as f64;

        let min = skew.iter().copied().min().unwrap_or(0).min(0);
        let max = skew.iter().copied().max().unwrap_or(0).max(0);
        let span = (max - min).max(1) as f64;
        let last = skew.len().saturating_sub(1).max(1) as f64;

        let x_of = |pos: usize| left + pos as f64 / last * plot_w;
        let y_of = |value: i64| top + (max - value) as f64 / span * plot_h;

        let mut svg = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n");

        svg.push_str(&SvgTag::new("svg")
            .attr("xmlns", "http://www.w3.org/2000/svg")
            .attr("width", self.width)
            .attr("height", self.height)
            .attr("style", format!("background:#{:06x}", self.canvas_background))
            .render(false));
        svg.push('\n');

        svg.push_str(&SvgTag::new("text")
            .attr("x", self.width / 2)
            .attr("y", self.margin / 2)
            .attr("text-anchor", "middle")
            .attr("font-family", "sans-serif")
            .attr("font-size", 18)
            .render(false));
        svg.push_str(&escape_xml(title.unwrap_or(&self.title)));
        svg.push_str("</text>\n");

        // Axes, plus the zero line when the curve crosses it
        let zero_y = y_of(0);
        for (x1, y1, x2, y2, color) in [
            (left, top, left, top + plot_h, "#000000"),
            (left, top + plot_h, left + plot_w, top + plot_h, "#000000"),
            (left, zero_y, left + plot_w, zero_y, "#999999"),
        ] {
            svg.push_str(&SvgTag::new("line")
                .attr("x1", format!("{:.2}", x1))
                .attr("y1", format!("{:.2}", y1))
                .attr("x2", format!("{:.2}", x2))
                .attr("y2", format!("{:.2}", y2))
                .attr("stroke", color)
                .attr("stroke-width", 1)
                .render(true));
            svg.push('\n');
        }

        for (x, y, anchor, label) in [
            (left - 8.0, top + 4.0, "end", max.to_string()),
            (left - 8.0, top + plot_h + 4.0, "end", min.to_string()),
            (left + plot_w, top + plot_h + 20.0, "end", format!("{} bp", skew.len().saturating_sub(1))),
            (left + plot_w / 2.0, top + plot_h + 40.0, "middle", "Position in Genome (bp)".to_string()),
        ] {
            svg.push_str(&SvgTag::new("text")
                .attr("x", format!("{:.2}", x))
                .attr("y", format!("{:.2}", y))
                .attr("text-anchor", anchor)
                .attr("font-family", "sans-serif")
                .attr("font-size", 12)
                .render(false));
            svg.push_str(&escape_xml(&label));
            svg.push_str("</text>\n");
        }

        let points: Vec<String> = self
            .sample(skew)
            .into_iter()
            .map(|(pos, value)| format!("{:.2},{:.2}", x_of(pos), y_of(value)))
            .collect();
        svg.push_str(&SvgTag::new("polyline")
            .attr("points", points.join(" "))
            .attr("fill", "none")
            .attr("stroke", format!("#{:06x}", self.line_color))
            .attr("stroke-width", 1)
            .render(true));
        svg.push('\n');

        svg.push_str("</svg>\n");
        svg
    }
}

impl ArtifactRenderer for SkewPlotter {
    fn extension(&self) -> &str {
        "svg"
    }

    fn render(&self, skew: &[i64], title: Option<&str>, target: &Path) -> ApiResult<()> {
        fs::write(target, self.generate_svg(skew, title))
            .map_err(|e| SkewError::RenderError(format!("{}: {}", target.display(), e)))
    }
}
