use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Grid the vision collaborator normalizes its bounding boxes against.
/// Fixed by that protocol, not configurable.
pub const DETECTION_GRID: f64 = 1000.0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid region '{raw}': {reason}")]
pub struct InvalidRegionError {
    pub raw: String,
    pub reason: String,
}

/// Axis-aligned rectangle in canvas pixel space. Producers keep rectangles
/// inside the canvas they target; the mask synthesizer does not clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RegionRect {
    /// Parses `X,Y,WxH` (also accepted: `X,Y,W,H`). Negative or
    /// non-numeric components are rejected here, so a rectangle that
    /// exists is always well-formed.
    pub fn parse(raw: &str) -> Result<Self, InvalidRegionError> {
        let fail = |reason: &str| InvalidRegionError {
            raw: raw.to_string(),
            reason: reason.to_string(),
        };
        let normalized = raw.trim().replace('x', ",");
        let fields: Vec<&str> = normalized.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(fail("expected X,Y,WxH"));
        }
        let mut values = [0u32; 4];
        for (slot, field) in values.iter_mut().zip(&fields) {
            *slot = field
                .parse::<u32>()
                .map_err(|_| fail("components must be non-negative integers"))?;
        }
        Ok(Self {
            x: values[0],
            y: values[1],
            width: values[2],
            height: values[3],
        })
    }
}

/// One bounding box as reported by the vision collaborator: `box` is
/// `[yMin, xMin, yMax, xMax]` on the 1000-unit grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    #[serde(rename = "box", alias = "box_2d")]
    pub bounds: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

impl Detection {
    fn well_formed(&self) -> bool {
        self.bounds.len() == 4
            && self.bounds.iter().all(|value| value.is_finite())
            && self.bounds[2] >= self.bounds[0]
            && self.bounds[3] >= self.bounds[1]
    }
}

/// Converts detections to pixel-space rectangles on the given canvas.
/// Preserves input order; malformed detections are dropped with a warning
/// rather than failing the batch.
pub fn translate(detections: &[Detection], canvas_width: u32, canvas_height: u32) -> Vec<RegionRect> {
    let mut out = Vec::with_capacity(detections.len());
    for detection in detections {
        if !detection.well_formed() {
            warn!(
                label = %detection.label,
                "dropping detection with malformed bounds"
            );
            continue;
        }
        let [y_min, x_min, y_max, x_max] =
            [detection.bounds[0], detection.bounds[1], detection.bounds[2], detection.bounds[3]];
        let scale_x = canvas_width as f64 / DETECTION_GRID;
        let scale_y = canvas_height as f64 / DETECTION_GRID;
        out.push(RegionRect {
            x: (x_min * scale_x).round() as u32,
            y: (y_min * scale_y).round() as u32,
            width: ((x_max - x_min) * scale_x).round() as u32,
            height: ((y_max - y_min) * scale_y).round() as u32,
        });
    }
    out
}

/// Tolerant parse of the vision model's free-text reply. The reply is
/// expected to be a JSON array of detections, possibly wrapped in code
/// fences or prose; anything unparseable degrades to "no detections".
pub fn parse_detection_response(raw: &str) -> Vec<Detection> {
    let stripped = strip_code_fences(raw);
    let Some(body) = slice_json_array(stripped) else {
        if !stripped.trim().is_empty() {
            warn!("vision response carried no JSON array; treating as zero detections");
        }
        return Vec::new();
    };
    let rows: Vec<Value> = match serde_json::from_str(body) {
        Ok(Value::Array(rows)) => rows,
        _ => {
            warn!("vision response array failed to parse; treating as zero detections");
            return Vec::new();
        }
    };
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        match serde_json::from_value::<Detection>(row) {
            Ok(detection) => out.push(detection),
            Err(err) => warn!(%err, "skipping undecodable detection entry"),
        }
    }
    out
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn slice_json_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (end > start).then(|| &raw[start..=end])
}
