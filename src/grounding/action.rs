use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::grounding::coords::NormPoint;

/// Kind of input a grounding response asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Click,
    DoubleClick,
    RightClick,
    Hover,
    Drag,
    Hotkey,
    Type,
    Scroll,
    Wait,
    Finished,
    Unknown,
}

impl ActionType {
    /// Resolve an action name from the grounding grammar, including legacy aliases.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "click" | "left_single" => ActionType::Click,
            "left_double" | "double_click" => ActionType::DoubleClick,
            "right_single" | "right_click" => ActionType::RightClick,
            "hover" | "mouse_move" => ActionType::Hover,
            "drag" | "select" => ActionType::Drag,
            "hotkey" | "press" | "keydown" => ActionType::Hotkey,
            "type" => ActionType::Type,
            "scroll" => ActionType::Scroll,
            "wait" => ActionType::Wait,
            "finished" => ActionType::Finished,
            _ => ActionType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Click => "click",
            ActionType::DoubleClick => "double_click",
            ActionType::RightClick => "right_click",
            ActionType::Hover => "hover",
            ActionType::Drag => "drag",
            ActionType::Hotkey => "hotkey",
            ActionType::Type => "type",
            ActionType::Scroll => "scroll",
            ActionType::Wait => "wait",
            ActionType::Finished => "finished",
            ActionType::Unknown => "unknown",
        }
    }

    /// Whether the action needs a pointer anchor to be executable.
    pub fn needs_point(&self) -> bool {
        matches!(
            self,
            ActionType::Click | ActionType::DoubleClick | ActionType::RightClick | ActionType::Hover
        )
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Some(ScrollDirection::Up),
            "down" => Some(ScrollDirection::Down),
            "left" => Some(ScrollDirection::Left),
            "right" => Some(ScrollDirection::Right),
            _ => None,
        }
    }

    pub fn is_horizontal(&self) -> bool {
        matches!(self, ScrollDirection::Left | ScrollDirection::Right)
    }
}

/// One parsed argument value. Coordinates are already normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Text(String),
    Keys(Vec<String>),
    Direction(ScrollDirection),
    Point(NormPoint),
    /// Two corners of a region; acts on its centre.
    Box(NormPoint, NormPoint),
}

impl ParamValue {
    /// The single point an input command should target.
    pub fn anchor(&self) -> Option<NormPoint> {
        match self {
            ParamValue::Point(p) => Some(*p),
            ParamValue::Box(a, b) => Some(NormPoint::midpoint(*a, *b)),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Argument names whose values carry coordinates.
pub const COORDINATE_PARAMS: [&str; 5] = ["point", "start_point", "end_point", "start_box", "end_box"];

pub fn is_coordinate_param(name: &str) -> bool {
    COORDINATE_PARAMS.contains(&name)
}

/// A typed action parsed out of one grounding response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredAction {
    pub action_type: ActionType,
    /// Name exactly as the model wrote it.
    pub name: String,
    pub parameters: BTreeMap<String, ParamValue>,
    /// Reasoning shared by every action of the same response.
    pub thought: String,
    /// Source text of the call, e.g. `click(point='<point>10 20</point>')`.
    pub raw: String,
}

impl StructuredAction {
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.param(name).and_then(ParamValue::as_text)
    }

    /// Primary pointer target: `point`, then `start_point`, then `start_box`.
    pub fn anchor(&self) -> Option<NormPoint> {
        ["point", "start_point", "start_box"]
            .iter()
            .find_map(|k| self.param(k).and_then(ParamValue::anchor))
    }

    /// Start and end of a drag; `None` unless both ends are present.
    pub fn drag_endpoints(&self) -> Option<(NormPoint, NormPoint)> {
        let start = ["start_point", "start_box", "point"]
            .iter()
            .find_map(|k| self.param(k).and_then(ParamValue::anchor))?;
        let end = ["end_point", "end_box"]
            .iter()
            .find_map(|k| self.param(k).and_then(ParamValue::anchor))?;
        Some((start, end))
    }

    pub fn keys(&self) -> Option<&[String]> {
        self.parameters.values().find_map(|v| match v {
            ParamValue::Keys(k) => Some(k.as_slice()),
            _ => None,
        })
    }

    pub fn direction(&self) -> Option<ScrollDirection> {
        match self.param("direction") {
            Some(ParamValue::Direction(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.action_type == ActionType::Finished
    }
}

/// True when any action ends the step.
pub fn contains_finished(actions: &[StructuredAction]) -> bool {
    actions.iter().any(StructuredAction::is_finished)
}
