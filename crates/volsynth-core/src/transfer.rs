use serde::{Deserialize, Serialize};

/// An RGBA color with one byte per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub const fn from_array(c: [u8; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

/// One transfer-function control point: a position on the 0–255 value axis
/// and the color assigned there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub position: u8,
    #[serde(alias = "value")]
    pub color: Rgba8,
}

impl ControlPoint {
    pub const fn new(position: u8, color: Rgba8) -> Self {
        Self { position, color }
    }
}

/// Sparse value → color mapping, ordered by position.
///
/// The synthesizer emits one point per cluster, sorted by the cluster's
/// centroid value, so positions are non-decreasing. Ramp interpolation
/// additionally requires them to be strictly increasing; see
/// [`TransferFunction::dedup_positions`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferFunction {
    pub points: Vec<ControlPoint>,
}

impl TransferFunction {
    pub fn new(points: Vec<ControlPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index of the first point whose position does not strictly exceed its
    /// predecessor's, if any.
    pub fn first_unordered(&self) -> Option<usize> {
        self.points
            .windows(2)
            .position(|pair| pair[1].position <= pair[0].position)
            .map(|i| i + 1)
    }

    /// Collapse runs of equal adjacent positions, keeping the first point of
    /// each run (the lowest-valued cluster mapped to that position).
    /// Out-of-order positions are left untouched.
    pub fn dedup_positions(&self) -> Self {
        let mut points = self.points.clone();
        points.dedup_by(|later, earlier| later.position == earlier.position);
        Self { points }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(position: u8, shade: u8) -> ControlPoint {
        ControlPoint::new(position, Rgba8::new(shade, shade, shade, 255))
    }

    #[test]
    fn test_wire_format() {
        let tf = TransferFunction::new(vec![point(3, 7)]);
        let json = serde_json::to_string(&tf).expect("serialize");
        assert_eq!(
            json,
            r#"[{"position":3,"color":{"r":7,"g":7,"b":7,"a":255}}]"#
        );
    }

    #[test]
    fn test_accepts_legacy_value_field() {
        let json = r#"[{"position":10,"value":{"r":1,"g":2,"b":3,"a":4}}]"#;
        let tf: TransferFunction = serde_json::from_str(json).expect("legacy tf");
        assert_eq!(tf.points[0].color, Rgba8::new(1, 2, 3, 4));
    }

    #[test]
    fn test_first_unordered() {
        assert_eq!(TransferFunction::new(vec![point(0, 0), point(5, 0)]).first_unordered(), None);
        assert_eq!(
            TransferFunction::new(vec![point(0, 0), point(5, 0), point(5, 1)]).first_unordered(),
            Some(2)
        );
        assert_eq!(
            TransferFunction::new(vec![point(9, 0), point(5, 0)]).first_unordered(),
            Some(1)
        );
    }

    #[test]
    fn test_dedup_keeps_first() {
        let tf = TransferFunction::new(vec![point(0, 1), point(10, 2), point(10, 3), point(20, 4)]);
        let deduped = tf.dedup_positions();
        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped.points[1], point(10, 2));
        assert_eq!(deduped.first_unordered(), None);
    }
}
