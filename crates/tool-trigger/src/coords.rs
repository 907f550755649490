//! Position resolution into element, viewport and window frames.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use soultrigger_core_types::{Point, Rect, ScrollOffset};

use crate::errors::TriggerError;

/// The nine anchors an interaction can be aimed at.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NamedPosition {
    TopLeft,
    Top,
    TopRight,
    Left,
    Center,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl NamedPosition {
    pub const ALL: [NamedPosition; 9] = [
        NamedPosition::TopLeft,
        NamedPosition::Top,
        NamedPosition::TopRight,
        NamedPosition::Left,
        NamedPosition::Center,
        NamedPosition::Right,
        NamedPosition::BottomLeft,
        NamedPosition::Bottom,
        NamedPosition::BottomRight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NamedPosition::TopLeft => "topLeft",
            NamedPosition::Top => "top",
            NamedPosition::TopRight => "topRight",
            NamedPosition::Left => "left",
            NamedPosition::Center => "center",
            NamedPosition::Right => "right",
            NamedPosition::BottomLeft => "bottomLeft",
            NamedPosition::Bottom => "bottom",
            NamedPosition::BottomRight => "bottomRight",
        }
    }

    /// Offset from the box's top-left corner. Far edges sit one pixel inside
    /// the box so the point still hits the element.
    fn offset_within(&self, width: f64, height: f64) -> Point {
        let left = 0.0;
        let center_x = width / 2.0;
        let right = (width - 1.0).max(0.0);
        let top = 0.0;
        let center_y = height / 2.0;
        let bottom = (height - 1.0).max(0.0);
        match self {
            NamedPosition::TopLeft => Point::new(left, top),
            NamedPosition::Top => Point::new(center_x, top),
            NamedPosition::TopRight => Point::new(right, top),
            NamedPosition::Left => Point::new(left, center_y),
            NamedPosition::Center => Point::new(center_x, center_y),
            NamedPosition::Right => Point::new(right, center_y),
            NamedPosition::BottomLeft => Point::new(left, bottom),
            NamedPosition::Bottom => Point::new(center_x, bottom),
            NamedPosition::BottomRight => Point::new(right, bottom),
        }
    }
}

impl FromStr for NamedPosition {
    type Err = TriggerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        NamedPosition::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == raw)
            .ok_or_else(|| TriggerError::InvalidPosition(raw.to_string()))
    }
}

impl fmt::Display for NamedPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where inside the target the interaction lands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPosition", into = "RawPosition")]
pub enum PositionSpec {
    /// Geometric center of the box.
    #[default]
    Default,
    Named(NamedPosition),
    /// Offset from the box's top-left corner.
    Offset { x: f64, y: f64 },
}

/// Loose form accepted from scenario files and argument lists.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum RawPosition {
    Named(String),
    Offset { x: f64, y: f64 },
}

impl TryFrom<RawPosition> for PositionSpec {
    type Error = TriggerError;

    fn try_from(raw: RawPosition) -> Result<Self, Self::Error> {
        match raw {
            RawPosition::Named(name) => name.parse().map(PositionSpec::Named),
            RawPosition::Offset { x, y } => Ok(PositionSpec::Offset { x, y }),
        }
    }
}

impl From<PositionSpec> for RawPosition {
    fn from(spec: PositionSpec) -> Self {
        match spec {
            PositionSpec::Default => RawPosition::Named(NamedPosition::Center.as_str().into()),
            PositionSpec::Named(named) => RawPosition::Named(named.as_str().into()),
            PositionSpec::Offset { x, y } => RawPosition::Offset { x, y },
        }
    }
}

/// First positional argument of a trigger call: either an anchor name or an x offset.
#[derive(Clone, Debug, PartialEq)]
pub enum PositionArg {
    Name(String),
    X(f64),
}

impl PositionSpec {
    /// Normalizes `(positionOrX, y)` call arguments.
    pub fn from_arguments(
        position_or_x: Option<PositionArg>,
        y: Option<f64>,
    ) -> Result<Self, TriggerError> {
        match (position_or_x, y) {
            (None, None) => Ok(PositionSpec::Default),
            (None, Some(y)) => Err(TriggerError::InvalidPosition(format!(
                "y offset {y} given without x"
            ))),
            (Some(PositionArg::Name(name)), None) => name.parse().map(PositionSpec::Named),
            (Some(PositionArg::Name(name)), Some(_)) => Err(TriggerError::InvalidPosition(
                format!("'{name}' cannot be combined with a y offset"),
            )),
            (Some(PositionArg::X(x)), Some(y)) => Ok(PositionSpec::Offset { x, y }),
            (Some(PositionArg::X(x)), None) => Err(TriggerError::InvalidPosition(format!(
                "x offset {x} given without y"
            ))),
        }
    }

    fn offset_within(&self, rect: &Rect) -> Point {
        match self {
            PositionSpec::Default => NamedPosition::Center.offset_within(rect.width, rect.height),
            PositionSpec::Named(named) => named.offset_within(rect.width, rect.height),
            PositionSpec::Offset { x, y } => Point::new(*x, *y),
        }
    }
}

/// One interaction point expressed in the three frames consumers need.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCoordinates {
    /// Relative to the element's top-left corner.
    pub from_element: Point,
    /// Relative to the visible viewport (`clientX/clientY`).
    pub from_viewport: Point,
    /// Relative to the document, i.e. viewport plus scroll (`pageX/pageY`).
    pub from_window: Point,
}

/// Resolves `position` against a viewport-relative bounding box.
pub fn resolve(
    rect: &Rect,
    scroll: &ScrollOffset,
    position: &PositionSpec,
) -> Result<ResolvedCoordinates, TriggerError> {
    if rect.is_empty() {
        return Err(TriggerError::ZeroSizeTarget {
            width: rect.width,
            height: rect.height,
        });
    }
    let from_element = position.offset_within(rect);
    let from_viewport = from_element + rect.origin();
    let from_window = from_viewport + scroll.as_point();
    Ok(ResolvedCoordinates {
        from_element,
        from_viewport,
        from_window,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> Rect {
        Rect::new(40.0, 60.0, 100.0, 50.0)
    }

    #[test]
    fn frames_satisfy_origin_and_scroll_identities() {
        let scroll = ScrollOffset::new(7.0, 300.0);
        for named in NamedPosition::ALL {
            let coords = resolve(&rect(), &scroll, &PositionSpec::Named(named)).unwrap();
            assert_eq!(coords.from_viewport, coords.from_element + rect().origin());
            assert_eq!(coords.from_window, coords.from_viewport + scroll.as_point());
            assert!(rect().contains(&coords.from_viewport), "{named} fell outside");
        }
    }

    #[test]
    fn default_is_center() {
        let coords = resolve(&rect(), &ScrollOffset::default(), &PositionSpec::Default).unwrap();
        assert_eq!(coords.from_element, Point::new(50.0, 25.0));
        assert_eq!(coords.from_viewport, Point::new(90.0, 85.0));
    }

    #[test]
    fn named_corners_stay_inside() {
        let coords = resolve(
            &rect(),
            &ScrollOffset::default(),
            &PositionSpec::Named(NamedPosition::BottomRight),
        )
        .unwrap();
        assert_eq!(coords.from_element, Point::new(99.0, 49.0));
    }

    #[test]
    fn explicit_offset_is_relative_to_top_left() {
        let coords = resolve(
            &rect(),
            &ScrollOffset::new(0.0, 10.0),
            &PositionSpec::Offset { x: 5.0, y: 6.0 },
        )
        .unwrap();
        assert_eq!(coords.from_viewport, Point::new(45.0, 66.0));
        assert_eq!(coords.from_window, Point::new(45.0, 76.0));
    }

    #[test]
    fn zero_area_box_is_rejected() {
        for degenerate in [
            Rect::new(0.0, 0.0, 0.0, 10.0),
            Rect::new(0.0, 0.0, 10.0, 0.0),
            Rect::new(5.0, 5.0, 0.0, 0.0),
        ] {
            let err = resolve(&degenerate, &ScrollOffset::default(), &PositionSpec::Default)
                .unwrap_err();
            assert!(matches!(err, TriggerError::ZeroSizeTarget { .. }));
        }
    }

    #[test]
    fn unknown_anchor_name_is_invalid() {
        let err = "middle".parse::<NamedPosition>().unwrap_err();
        assert!(matches!(err, TriggerError::InvalidPosition(name) if name == "middle"));
    }

    #[test]
    fn arguments_normalize_like_call_sites() {
        assert_eq!(
            PositionSpec::from_arguments(None, None).unwrap(),
            PositionSpec::Default
        );
        assert_eq!(
            PositionSpec::from_arguments(Some(PositionArg::Name("topRight".into())), None)
                .unwrap(),
            PositionSpec::Named(NamedPosition::TopRight)
        );
        assert_eq!(
            PositionSpec::from_arguments(Some(PositionArg::X(3.0)), Some(4.0)).unwrap(),
            PositionSpec::Offset { x: 3.0, y: 4.0 }
        );
        assert!(PositionSpec::from_arguments(Some(PositionArg::X(3.0)), None).is_err());
    }

    #[test]
    fn deserializes_from_name_or_offset() {
        let named: PositionSpec = serde_json::from_str("\"bottomLeft\"").unwrap();
        assert_eq!(named, PositionSpec::Named(NamedPosition::BottomLeft));
        let offset: PositionSpec = serde_json::from_str(r#"{"x": 1, "y": 2}"#).unwrap();
        assert_eq!(offset, PositionSpec::Offset { x: 1.0, y: 2.0 });
        assert!(serde_json::from_str::<PositionSpec>("\"nowhere\"").is_err());
    }
}
