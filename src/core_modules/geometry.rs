// THEORY:
// The `geometry_adapter` bridges polygon ground truth and operations that only
// understand axis-aligned boxes. It is a stateless utility, in the same spirit as
// `blob_detector`: polygons go in, boxes come out, and the reverse.
//
// Box format is COCO-style `(x_min, y_min, width, height)`. A polygon is read as a
// clockwise rectangle: its first point is the top-left corner and the point half
// way round the ring is the diagonal-opposite corner. For the usual 4-point
// rectangle that is `points[2]`. Rebuilding always yields a 4-point clockwise
// rectangle, so a rectangle survives the round trip exactly; any other shape is
// replaced by the rectangle spanned by those two points.

use crate::core_modules::ground_truth::{GroundTruthElement, Point};

/// An axis-aligned box in COCO layout.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoxCoco {
    pub x_min: f64,
    pub y_min: f64,
    pub width: f64,
    pub height: f64,
}

impl BoxCoco {
    pub fn new(x_min: f64, y_min: f64, width: f64, height: f64) -> Self {
        Self {
            x_min,
            y_min,
            width,
            height,
        }
    }

    /// Multiplies position and extent by independent x/y factors.
    pub fn scale(self, sx: f64, sy: f64) -> Self {
        Self::new(self.x_min * sx, self.y_min * sy, self.width * sx, self.height * sy)
    }

    /// Top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> Vec<Point> {
        let x_max = self.x_min + self.width;
        let y_max = self.y_min + self.height;
        vec![
            Point::new(self.x_min, self.y_min),
            Point::new(x_max, self.y_min),
            Point::new(x_max, y_max),
            Point::new(self.x_min, y_max),
        ]
    }
}

pub mod geometry_adapter {
    use super::*;

    /// Converts every element's polygon to a box, returning the boxes and a parallel
    /// label list. An element without points yields an empty box at the origin.
    pub fn polygons_to_boxes(elements: &[GroundTruthElement]) -> (Vec<BoxCoco>, Vec<String>) {
        elements
            .iter()
            .map(|element| (polygon_to_box(&element.points), element.label.clone()))
            .unzip()
    }

    /// Rebuilds one 4-point clockwise rectangle per box. When `shape`
    /// (`(width, height)` of the image the boxes live on) is given, corners are
    /// clamped into the image.
    pub fn boxes_to_polygons(
        boxes: &[BoxCoco],
        labels: &[String],
        shape: Option<(u32, u32)>,
    ) -> Vec<GroundTruthElement> {
        boxes
            .iter()
            .zip(labels)
            .map(|(bbox, label)| {
                let mut points = bbox.corners();
                if let Some((width, height)) = shape {
                    for point in &mut points {
                        point.x = point.x.clamp(0.0, width as f64);
                        point.y = point.y.clamp(0.0, height as f64);
                    }
                }
                GroundTruthElement::new(label.clone(), points)
            })
            .collect()
    }

    fn polygon_to_box(points: &[Point]) -> BoxCoco {
        let Some(first) = points.first() else {
            return BoxCoco::default();
        };
        let opposite = points[points.len() / 2];
        BoxCoco::new(first.x, first.y, opposite.x - first.x, opposite.y - first.y)
    }
}

#[cfg(test)]
mod tests {
    use super::geometry_adapter::*;
    use super::*;

    fn rect(label: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> GroundTruthElement {
        GroundTruthElement::new(
            label,
            vec![
                Point::new(x0, y0),
                Point::new(x1, y0),
                Point::new(x1, y1),
                Point::new(x0, y1),
            ],
        )
    }

    #[test]
    fn rectangle_survives_round_trip() {
        let element = rect("date", 30.0, 30.0, 70.0, 70.0);
        let (boxes, labels) = polygons_to_boxes(std::slice::from_ref(&element));
        assert_eq!(boxes, vec![BoxCoco::new(30.0, 30.0, 40.0, 40.0)]);
        let rebuilt = boxes_to_polygons(&boxes, &labels, None);
        assert_eq!(rebuilt[0].points, element.points);
        assert_eq!(rebuilt[0].label, "date");
    }

    #[test]
    fn fractional_rectangle_survives_round_trip_with_shape() {
        let element = rect("id", 1.25, 2.5, 9.75, 4.0);
        let (boxes, labels) = polygons_to_boxes(std::slice::from_ref(&element));
        let rebuilt = boxes_to_polygons(&boxes, &labels, Some((20, 20)));
        assert_eq!(rebuilt[0].points, element.points);
    }

    #[test]
    fn shape_clamps_corners() {
        let boxes = vec![BoxCoco::new(-5.0, 10.0, 30.0, 30.0)];
        let labels = vec!["x".to_string()];
        let rebuilt = boxes_to_polygons(&boxes, &labels, Some((20, 25)));
        assert_eq!(
            rebuilt[0].points,
            vec![
                Point::new(0.0, 10.0),
                Point::new(20.0, 10.0),
                Point::new(20.0, 25.0),
                Point::new(0.0, 25.0),
            ]
        );
    }

    #[test]
    fn empty_polygon_gives_empty_box() {
        let element = GroundTruthElement::new("empty", Vec::new());
        let (boxes, _) = polygons_to_boxes(&[element]);
        assert_eq!(boxes[0], BoxCoco::default());
    }

    #[test]
    fn scale_moves_and_resizes() {
        let scaled = BoxCoco::new(10.0, 20.0, 4.0, 8.0).scale(0.5, 2.0);
        assert_eq!(scaled, BoxCoco::new(5.0, 40.0, 2.0, 16.0));
    }
}
