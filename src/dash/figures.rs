// The four chart templates.
//
// A figure is the {data, layout, frames} object consumed by plotly.js; the
// rendering library itself is a black box. Serializing a figure into the
// HTML shell below yields a standalone artifact.

use serde_json::json;
use serde_json::Value as JSValue;
use snafu::prelude::*;

use crate::dash::*;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.32.0.min.js";

/// A renderable figure: base traces, layout and the animation frames
/// (empty for the static templates).
#[derive(Debug, Clone)]
pub struct Figure {
    pub data: Vec<JSValue>,
    pub layout: JSValue,
    pub frames: Vec<JSValue>,
}

impl Figure {
    pub fn to_value(&self) -> JSValue {
        let mut figure = json!({
            "data": self.data,
            "layout": self.layout,
        });
        if !self.frames.is_empty() {
            figure["frames"] = json!(self.frames);
        }
        figure
    }

    /// Serializes the figure into a self-contained HTML document.
    pub fn to_html(&self) -> DashResult<String> {
        let encoded =
            serde_json::to_string(&self.to_value()).context(ParsingJsonSnafu {})?;
        Ok(format!(
            "<!DOCTYPE html>\n\
             <html>\n\
             <head><meta charset=\"utf-8\" /><script src=\"{}\"></script></head>\n\
             <body style=\"margin:0\">\n\
             <div id=\"figure\" style=\"width:100%;height:100vh\"></div>\n\
             <script>\n\
             var figure = {};\n\
             Plotly.newPlot(\"figure\", figure.data, figure.layout, {{\"responsive\": true}}).then(function (gd) {{\n\
                 if (figure.frames) {{ Plotly.addFrames(gd, figure.frames); }}\n\
             }});\n\
             </script>\n\
             </body>\n\
             </html>\n",
            PLOTLY_CDN, encoded
        ))
    }
}

/// A distribution over one numeric field: 50 bins over [0, 1], a fixed
/// y-axis cap per chart and fixed opacity. Missing values are not part of
/// the sample.
pub fn histogram(values: &[f64], title: &str, y_cap: f64) -> Figure {
    Figure {
        data: vec![json!({
            "type": "histogram",
            "x": values,
            "nbinsx": 50,
            "opacity": 0.7,
        })],
        layout: json!({
            "title": {"text": title},
            "xaxis": {"range": [0.0, 1.0]},
            "yaxis": {"range": [0.0, y_cap]},
        }),
        frames: vec![],
    }
}

fn choropleth_trace(points: &[(String, f64)], color_max: f64) -> JSValue {
    let locations: Vec<&str> = points.iter().map(|(state, _)| state.as_str()).collect();
    let z: Vec<f64> = points.iter().map(|(_, value)| *value).collect();
    json!({
        "type": "choropleth",
        "locationmode": "USA-states",
        "locations": locations,
        "z": z,
        "colorscale": "Portland",
        "zmin": 0.0,
        "zmax": color_max,
        "colorbar": {"title": {"text": ""}},
    })
}

/// One value per state colored over US state boundaries, one animation frame
/// per week, with a fixed color range per chart.
pub fn choropleth(weeks: &[(String, Vec<(String, f64)>)], title: &str, color_max: f64) -> Figure {
    let frames: Vec<JSValue> = weeks
        .iter()
        .map(|(week, points)| {
            json!({"name": week, "data": [choropleth_trace(points, color_max)]})
        })
        .collect();
    let data = weeks
        .first()
        .map(|(_, points)| vec![choropleth_trace(points, color_max)])
        .unwrap_or_default();
    let week_labels: Vec<&str> = weeks.iter().map(|(week, _)| week.as_str()).collect();
    let (sliders, updatemenus) = animation_controls(&week_labels);
    Figure {
        data,
        layout: json!({
            "title": {"text": title},
            "margin": {"r": 0, "t": 25, "l": 0, "b": 0},
            "geo": {"scope": "usa", "visible": true},
            "sliders": sliders,
            "updatemenus": updatemenus,
        }),
        frames,
    }
}

/// One marker on the bubble map: facility coordinates, hover label and the
/// count bound to the marker size.
#[derive(Debug, Clone, PartialEq)]
pub struct BubblePoint {
    pub lat: f64,
    pub lon: f64,
    pub label: String,
    pub size: f64,
}

fn bubble_trace(points: &[BubblePoint], sizeref: f64) -> JSValue {
    json!({
        "type": "scattergeo",
        "locationmode": "USA-states",
        "lat": points.iter().map(|p| p.lat).collect::<Vec<f64>>(),
        "lon": points.iter().map(|p| p.lon).collect::<Vec<f64>>(),
        "text": points.iter().map(|p| p.label.as_str()).collect::<Vec<&str>>(),
        "marker": {
            "size": points.iter().map(|p| p.size).collect::<Vec<f64>>(),
            "sizemode": "area",
            "sizeref": sizeref,
            "sizemin": 2,
        },
    })
}

/// Point markers at facility coordinates, sized by a count field and
/// animated by week.
pub fn bubble_map(weeks: &[(String, Vec<BubblePoint>)], title: &str) -> Figure {
    // One sizeref across all frames keeps the marker scale stable while the
    // animation runs.
    let max_size = weeks
        .iter()
        .flat_map(|(_, points)| points.iter().map(|p| p.size))
        .fold(0.0_f64, f64::max);
    let sizeref = if max_size > 0.0 {
        2.0 * max_size / (18.0 * 18.0)
    } else {
        1.0
    };
    let frames: Vec<JSValue> = weeks
        .iter()
        .map(|(week, points)| json!({"name": week, "data": [bubble_trace(points, sizeref)]}))
        .collect();
    let data = weeks
        .first()
        .map(|(_, points)| vec![bubble_trace(points, sizeref)])
        .unwrap_or_default();
    let week_labels: Vec<&str> = weeks.iter().map(|(week, _)| week.as_str()).collect();
    let (sliders, updatemenus) = animation_controls(&week_labels);
    Figure {
        data,
        layout: json!({
            "title": {"text": title},
            "margin": {"r": 0, "t": 25, "l": 0, "b": 0},
            "geo": {"scope": "usa", "visible": true},
            "sliders": sliders,
            "updatemenus": updatemenus,
        }),
        frames,
    }
}

/// One line of a line chart. A `None` value serializes as null, so the
/// point is omitted instead of breaking the chart.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSeries {
    pub name: String,
    pub x: Vec<String>,
    pub y: Vec<Option<f64>>,
}

/// Multi-series line chart against the week axis: several value columns for
/// the national view, or one value column split into one line per entity
/// for the state view.
pub fn line_chart(series: &[LineSeries], title: &str, legend_top_right: bool) -> Figure {
    let data: Vec<JSValue> = series
        .iter()
        .map(|s| {
            json!({
                "type": "scatter",
                "mode": "lines",
                "name": s.name,
                "x": s.x,
                "y": s.y,
            })
        })
        .collect();
    let mut layout = json!({"title": {"text": title}});
    if legend_top_right {
        layout["legend"] = json!({
            "yanchor": "top",
            "y": 0.99,
            "xanchor": "right",
            "x": 0.99,
        });
    }
    Figure {
        data,
        layout,
        frames: vec![],
    }
}

// Slider and play/pause controls shared by the animated templates.
fn animation_controls(week_labels: &[&str]) -> (JSValue, JSValue) {
    let steps: Vec<JSValue> = week_labels
        .iter()
        .map(|label| {
            json!({
                "args": [[label], {
                    "frame": {"duration": 300, "redraw": true},
                    "mode": "immediate",
                    "transition": {"duration": 0},
                }],
                "label": label,
                "method": "animate",
            })
        })
        .collect();
    let sliders = json!([{
        "active": 0,
        "pad": {"t": 30},
        "steps": steps,
    }]);
    let updatemenus = json!([{
        "type": "buttons",
        "showactive": false,
        "x": 0.05,
        "y": -0.05,
        "buttons": [
            {
                "label": "Play",
                "method": "animate",
                "args": [JSValue::Null, {
                    "frame": {"duration": 500, "redraw": true},
                    "fromcurrent": true,
                }],
            },
            {
                "label": "Pause",
                "method": "animate",
                "args": [[JSValue::Null], {
                    "frame": {"duration": 0, "redraw": false},
                    "mode": "immediate",
                }],
            },
        ],
    }]);
    (sliders, updatemenus)
}
