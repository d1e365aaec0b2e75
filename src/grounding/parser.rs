/// Parser for the `Thought:` / `Action:` grounding grammar.
///
/// A response looks like
///
/// ```text
/// Thought: The search box is at the top of the page.
/// Action: click(point='<point>500 300</point>')
/// ```
///
/// The action block may hold several calls, one per line. Each call is scanned
/// on its own so that one malformed call does not take its siblings down with it.
use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{GroundError, GroundResult};
use crate::grounding::action::{
    is_coordinate_param, ActionType, ParamValue, ScrollDirection, StructuredAction,
};
use crate::grounding::coords::PerceivedFrame;
use crate::grounding::keys::parse_key_combo;

const THOUGHT_MARKER: &str = "Thought:";
const ACTION_MARKER: &str = "Action:";

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number pattern is valid"));

/// Everything extracted from one grounding response.
#[derive(Debug, Default)]
pub struct ParsedResponse {
    pub thought: String,
    pub actions: Vec<StructuredAction>,
    /// `MalformedAction` errors for calls that were skipped.
    pub rejected: Vec<GroundError>,
}

impl ParsedResponse {
    pub fn is_finished(&self) -> bool {
        crate::grounding::action::contains_finished(&self.actions)
    }

    pub fn primary(&self) -> Option<&StructuredAction> {
        self.actions.first()
    }
}

/// Parse a full model reply. Never fails: unparseable calls end up in `rejected`.
pub fn parse_response(response: &str, frame: &PerceivedFrame) -> ParsedResponse {
    let (thought, block) = split_thought(response);
    let mut parsed = ParsedResponse {
        thought,
        ..ParsedResponse::default()
    };
    let Some(block) = block else {
        return parsed;
    };

    let mut scanner = Scanner::new(block);
    loop {
        scanner.skip_separators();
        if scanner.at_end() {
            break;
        }
        let start = scanner.pos;
        let outcome = match scanner.call() {
            Ok(call) => build_action(call, &parsed.thought, frame),
            Err(reason) => {
                let fragment = scanner.resync(start);
                Err(GroundError::malformed(fragment, reason))
            }
        };
        match outcome {
            Ok(action) => parsed.actions.push(action),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed action");
                parsed.rejected.push(e);
            }
        }
    }
    parsed
}

/// Parse a single call such as `drag(start_point='…', end_point='…')`.
pub fn parse_action_call(
    segment: &str,
    thought: &str,
    frame: &PerceivedFrame,
) -> GroundResult<StructuredAction> {
    let mut scanner = Scanner::new(segment);
    scanner.skip_separators();
    let call = scanner
        .call()
        .map_err(|reason| GroundError::malformed(segment.trim(), reason))?;
    scanner.skip_separators();
    if !scanner.at_end() {
        return Err(GroundError::malformed(
            segment.trim(),
            format!("trailing input `{}`", scanner.rest().trim()),
        ));
    }
    build_action(call, thought, frame)
}

/// Split off the thought text; the second half is everything after the first `Action:`.
fn split_thought(response: &str) -> (String, Option<&str>) {
    let (head, block) = match response.find(ACTION_MARKER) {
        Some(idx) => (&response[..idx], Some(&response[idx + ACTION_MARKER.len()..])),
        None => (response, None),
    };
    let thought = match head.find(THOUGHT_MARKER) {
        Some(idx) => &head[idx + THOUGHT_MARKER.len()..],
        None => head,
    };
    (thought.trim().to_string(), block)
}

// ── Call scanner ─────────────────────────────────────────────────────────────

struct RawCall<'a> {
    name: &'a str,
    args: Vec<(String, String)>,
    raw: &'a str,
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Whitespace, stray `Action:` markers, list punctuation and code fences.
    fn skip_separators(&mut self) {
        loop {
            self.skip_ws();
            if self.rest().starts_with(ACTION_MARKER) {
                self.pos += ACTION_MARKER.len();
                continue;
            }
            match self.peek() {
                Some(',' | ';' | '`') => {
                    self.bump();
                }
                _ => break,
            }
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        let start = self.pos;
        if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            return None;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        (self.pos > start).then(|| &self.src[start..self.pos])
    }

    fn expect(&mut self, want: char) -> Result<(), String> {
        self.skip_ws();
        match self.peek() {
            Some(c) if c == want => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(format!("expected `{want}`, found `{c}`")),
            None => Err(format!("expected `{want}`, found end of input")),
        }
    }

    fn call(&mut self) -> Result<RawCall<'a>, String> {
        let start = self.pos;
        let name = self
            .ident()
            .ok_or_else(|| "expected an action name".to_string())?;
        self.expect('(')?;

        let mut args = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(')') {
                self.bump();
                break;
            }
            let key = self
                .ident()
                .ok_or_else(|| format!("expected an argument name in `{name}`"))?;
            self.expect('=')?;
            self.skip_ws();
            let value = match self.peek() {
                Some(q @ ('\'' | '"')) => {
                    self.bump();
                    self.quoted(q)?
                }
                Some(_) => self.bare()?,
                None => return Err(format!("missing value for `{key}`")),
            };
            args.push((key.to_string(), value));

            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(')') => break,
                Some(c) => return Err(format!("unexpected `{c}` after argument `{key}`")),
                None => return Err(format!("unterminated call `{name}(`")),
            }
        }

        Ok(RawCall {
            name,
            args,
            raw: self.src[start..self.pos].trim(),
        })
    }

    /// Quoted value with `\n`, `\t`, `\'`, `\"` and `\\` escapes. A quote that is
    /// not followed by `,`, `)` or a line end is kept as a literal apostrophe.
    fn quoted(&mut self, quote: char) -> Result<String, String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err("unterminated string".into()),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c @ ('\\' | '\'' | '"')) => out.push(c),
                    Some(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => return Err("unterminated string".into()),
                },
                Some(c) if c == quote => {
                    if self.closes_value() {
                        return Ok(out);
                    }
                    out.push(c);
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn closes_value(&self) -> bool {
        let rest = self.rest().trim_start_matches([' ', '\t']);
        rest.is_empty() || rest.starts_with([',', ')', '\n', '\r'])
    }

    /// Unquoted value such as `(100,200)` or `[1,2,3,4]`.
    fn bare(&mut self) -> Result<String, String> {
        let start = self.pos;
        let mut depth = 0u32;
        while let Some(c) = self.peek() {
            match c {
                '(' | '[' => depth += 1,
                ')' | ']' if depth > 0 => depth -= 1,
                ')' | ',' | '\n' if depth == 0 => break,
                _ => {}
            }
            self.bump();
        }
        let value = self.src[start..self.pos].trim();
        if value.is_empty() {
            Err("empty argument value".into())
        } else {
            Ok(value.to_string())
        }
    }

    /// Skip to the line after `start` and return the abandoned fragment.
    fn resync(&mut self, start: usize) -> &'a str {
        self.pos = match self.src[start..].find('\n') {
            Some(off) => start + off + 1,
            None => self.src.len(),
        };
        self.src[start..self.pos].trim()
    }
}

// ── Typed conversion ─────────────────────────────────────────────────────────

fn build_action(
    call: RawCall<'_>,
    thought: &str,
    frame: &PerceivedFrame,
) -> GroundResult<StructuredAction> {
    let action_type = ActionType::from_name(call.name);
    let mut parameters = BTreeMap::new();
    for (key, value) in call.args {
        let parsed = parse_param(action_type, &key, &value, frame)
            .map_err(|reason| GroundError::malformed(call.raw, reason))?;
        parameters.insert(key, parsed);
    }

    let action = StructuredAction {
        action_type,
        name: call.name.to_string(),
        parameters,
        thought: thought.to_string(),
        raw: call.raw.to_string(),
    };
    validate(&action).map_err(|reason| GroundError::malformed(call.raw, reason))?;
    Ok(action)
}

fn parse_param(
    action_type: ActionType,
    key: &str,
    value: &str,
    frame: &PerceivedFrame,
) -> Result<ParamValue, String> {
    if is_coordinate_param(key) {
        return parse_coordinates(value, frame);
    }
    match (action_type, key) {
        (ActionType::Scroll, "direction") => ScrollDirection::parse(value)
            .map(ParamValue::Direction)
            .ok_or_else(|| format!("unknown scroll direction `{value}`")),
        (ActionType::Hotkey, "key" | "keys" | "hotkey") => parse_key_combo(value).map(ParamValue::Keys),
        _ => Ok(ParamValue::Text(value.to_string())),
    }
}

/// `<point>x y</point>`, `(x,y)`, `[x1,y1,x2,y2]` or `<bbox>x1 y1 x2 y2</bbox>`.
fn parse_coordinates(value: &str, frame: &PerceivedFrame) -> Result<ParamValue, String> {
    let nums: Vec<f64> = NUMBER
        .find_iter(value)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    let normalize = |x: f64, y: f64| frame.normalize(x, y).map_err(|e| e.to_string());
    match nums.as_slice() {
        [x, y] => Ok(ParamValue::Point(normalize(*x, *y)?)),
        [x1, y1, x2, y2] => Ok(ParamValue::Box(normalize(*x1, *y1)?, normalize(*x2, *y2)?)),
        other => Err(format!(
            "expected one coordinate pair or a box, found {} numbers in `{value}`",
            other.len()
        )),
    }
}

fn validate(action: &StructuredAction) -> Result<(), String> {
    match action.action_type {
        ActionType::Drag if action.drag_endpoints().is_none() => {
            Err("drag needs both a start and an end point".into())
        }
        t if t.needs_point() && action.anchor().is_none() => Err(format!("{t} needs a point")),
        ActionType::Scroll if action.direction().is_none() => Err("scroll needs a direction".into()),
        ActionType::Hotkey if action.keys().is_none() => Err("hotkey needs a key".into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grounding::coords::{CoordinateSpace, NormPoint};

    fn frame() -> PerceivedFrame {
        PerceivedFrame {
            width: 3360,
            height: 2100,
            space: CoordinateSpace::ResizedPixels,
        }
    }

    #[test]
    fn parses_thought_and_click() {
        let parsed = parse_response(
            "Thought: click field\nAction: click(point='<point>500 300</point>')",
            &frame(),
        );
        assert_eq!(parsed.thought, "click field");
        assert!(parsed.rejected.is_empty());
        assert_eq!(parsed.actions.len(), 1);

        let click = &parsed.actions[0];
        assert_eq!(click.action_type, ActionType::Click);
        assert_eq!(click.thought, "click field");
        assert_eq!(click.raw, "click(point='<point>500 300</point>')");
        let p = click.anchor().unwrap();
        assert!((p.x - 500.0 / 3360.0).abs() < 1e-12);
        assert!((p.y - 300.0 / 2100.0).abs() < 1e-12);
    }

    #[test]
    fn finished_alone_is_terminal() {
        let parsed = parse_response("Action: finished(content='done')", &frame());
        assert_eq!(parsed.thought, "");
        assert!(parsed.is_finished());
        assert_eq!(parsed.actions[0].text("content"), Some("done"));
    }

    #[test]
    fn malformed_drag_is_skipped_but_siblings_survive() {
        let response = "Thought: fill the form\n\
            Action: click(point='<point>100 100</point>')\n\
            drag(start_point='<point>10 20</point>')\n\
            type(content='hello')";
        let parsed = parse_response(response, &frame());

        assert_eq!(parsed.actions.len(), 2);
        assert_eq!(parsed.actions[0].action_type, ActionType::Click);
        assert_eq!(parsed.actions[1].action_type, ActionType::Type);
        assert_eq!(parsed.rejected.len(), 1);
        assert!(matches!(
            &parsed.rejected[0],
            GroundError::MalformedAction { action, .. } if action.starts_with("drag(")
        ));
    }

    #[test]
    fn single_drag_call_reports_malformed_action() {
        let err = parse_action_call("drag(start_point='<point>10 20</point>')", "", &frame()).unwrap_err();
        assert!(matches!(err, GroundError::MalformedAction { .. }));

        let ok = parse_action_call(
            "drag(start_point='<point>0 0</point>', end_point='<point>3360 2100</point>')",
            "",
            &frame(),
        )
        .unwrap();
        assert_eq!(
            ok.drag_endpoints(),
            Some((NormPoint { x: 0.0, y: 0.0 }, NormPoint { x: 1.0, y: 1.0 }))
        );
    }

    #[test]
    fn legacy_boxes_and_bare_tuples() {
        let parsed = parse_response(
            "Action: click(start_box='(1680,1050)')\nright_single(start_box=[0,0,336,210])",
            &frame(),
        );
        assert_eq!(parsed.actions.len(), 2);
        assert_eq!(parsed.actions[0].anchor(), Some(NormPoint { x: 0.5, y: 0.5 }));
        let centre = parsed.actions[1].anchor().unwrap();
        assert!((centre.x - 0.05).abs() < 1e-12);
        assert!((centre.y - 0.05).abs() < 1e-12);
    }

    #[test]
    fn type_content_escapes_are_decoded() {
        let parsed = parse_response(r"Action: type(content='it\'s done\n')", &frame());
        assert_eq!(parsed.actions[0].text("content"), Some("it's done\n"));
    }

    #[test]
    fn unescaped_apostrophe_is_kept() {
        let parsed = parse_response("Action: type(content='don't stop')", &frame());
        assert_eq!(parsed.actions[0].text("content"), Some("don't stop"));
    }

    #[test]
    fn broken_line_does_not_swallow_the_next() {
        let parsed = parse_response(
            "Action: click(point='<point>1 2</point>'\nscroll(point='<point>5 5</point>', direction='down')",
            &frame(),
        );
        assert_eq!(parsed.rejected.len(), 1);
        assert_eq!(parsed.actions.len(), 1);
        assert_eq!(parsed.actions[0].direction(), Some(ScrollDirection::Down));
    }

    #[test]
    fn unknown_actions_are_preserved() {
        let parsed = parse_response("Action: open_app(app_name='Chrome')", &frame());
        assert_eq!(parsed.actions[0].action_type, ActionType::Unknown);
        assert_eq!(parsed.actions[0].name, "open_app");
        assert_eq!(parsed.actions[0].text("app_name"), Some("Chrome"));
    }

    #[test]
    fn hotkeys_are_validated() {
        let parsed = parse_response(
            "Action: hotkey(key='Ctrl C')\nhotkey(key='ctrl shift alt t')",
            &frame(),
        );
        assert_eq!(parsed.actions.len(), 1);
        assert_eq!(parsed.actions[0].keys().unwrap(), ["ctrl", "c"]);
        assert_eq!(parsed.rejected.len(), 1);
    }

    #[test]
    fn missing_action_marker_yields_no_actions() {
        let parsed = parse_response("Thought: I am not sure what to do", &frame());
        assert!(parsed.actions.is_empty());
        assert_eq!(parsed.thought, "I am not sure what to do");
    }

    #[test]
    fn wait_needs_no_arguments() {
        let parsed = parse_response("Thought: page loading\nAction: wait()", &frame());
        assert_eq!(parsed.actions[0].action_type, ActionType::Wait);
        assert!(parsed.actions[0].parameters.is_empty());
    }

    #[test]
    fn scroll_direction_is_required() {
        let parsed = parse_response(
            "Action: scroll(point='<point>5 5</point>', direction='sideways')",
            &frame(),
        );
        assert!(parsed.actions.is_empty());
        assert_eq!(parsed.rejected.len(), 1);
    }
}
