// THEORY:
// Ground truth is the description of *where* and *what* was placed on a generated
// document: one labelled polygon per rendered element. It travels next to the
// image through every augmentation and must stay geometrically consistent with it.
//
// Key principles:
// 1.  **Lossless pass-through**: the renderer may attach fields this engine knows
//     nothing about. They are captured in `extra` maps and written back untouched.
// 2.  **Audit trail**: `augs_done` is append-only. Its order is the order in which
//     operations actually ran on the image.
// 3.  **Plain data**: nothing in here knows how to transform itself. Geometry
//     transport is the job of the operations and the `geometry_adapter`.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// A 2D point in pixel coordinates. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(point: Point) -> Self {
        [point.x, point.y]
    }
}

/// One labelled element on the document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroundTruthElement {
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Clockwise polygon. Axis-aligned shapes are stored top-left, top-right,
    /// bottom-right, bottom-left.
    #[serde(default)]
    pub points: Vec<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GroundTruthElement {
    pub fn new(label: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            label: label.into(),
            points,
            ..Default::default()
        }
    }
}

/// Everything known about one generated document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroundTruthSet {
    #[serde(default)]
    pub doc_name: String,
    #[serde(default)]
    pub data: Vec<GroundTruthElement>,
    #[serde(default)]
    pub augs_done: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GroundTruthSet {
    pub fn new(doc_name: impl Into<String>, data: Vec<GroundTruthElement>) -> Self {
        Self {
            doc_name: doc_name.into(),
            data,
            ..Default::default()
        }
    }

    /// All polygons in element order.
    pub fn polygons(&self) -> Vec<Vec<Point>> {
        self.data.iter().map(|element| element.points.clone()).collect()
    }

    /// Writes transported polygons back onto the elements, pairing them by position.
    pub fn set_polygons(&mut self, polygons: Vec<Vec<Point>>) {
        for (element, points) in self.data.iter_mut().zip(polygons) {
            element.points = points;
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Pretty JSON with a 4-space indent; non-ASCII text is written as UTF-8.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
        self.serialize(&mut serializer)?;
        writer.flush()?;
        Ok(())
    }
}
