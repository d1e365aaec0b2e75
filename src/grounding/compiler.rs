/// Compiles structured actions into a pyautogui script for one destination surface.
///
/// Coordinates are denormalized here and nowhere else. A `finished` action
/// anywhere in the input short-circuits to the `DONE` sentinel.
use crate::errors::GroundError;
use crate::executor::text_input::{needs_clipboard, split_submit};
use crate::grounding::action::{ActionType, ScrollDirection, StructuredAction};
use crate::grounding::coords::{to_destination_pixels, NormPoint};
use crate::grounding::keys::{normalize_key, MAX_HOTKEY_KEYS};
use crate::perception::types::SurfaceSize;

pub const DONE_SENTINEL: &str = "DONE";
/// Line every executable script must contain.
pub const ENTRY_POINT: &str = "import pyautogui";

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Pause after each statement, in seconds.
    pub statement_delay_secs: f64,
    /// Paste all typed text through the clipboard.
    pub clipboard_text_entry: bool,
    /// Wheel clicks per scroll action.
    pub scroll_amount: i32,
    pub drag_duration_secs: f64,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            statement_delay_secs: 0.5,
            clipboard_text_entry: false,
            scroll_amount: 5,
            drag_duration_secs: 1.0,
        }
    }
}

#[derive(Debug)]
pub struct CompiledScript {
    pub text: String,
    /// Number of input statements emitted.
    pub statements: usize,
    /// Actions that had no input-command form.
    pub skipped: Vec<GroundError>,
}

#[derive(Debug)]
pub enum CompiledCommand {
    Done,
    Script(CompiledScript),
}

impl CompiledCommand {
    pub fn is_done(&self) -> bool {
        matches!(self, CompiledCommand::Done)
    }

    pub fn as_text(&self) -> &str {
        match self {
            CompiledCommand::Done => DONE_SENTINEL,
            CompiledCommand::Script(s) => &s.text,
        }
    }
}

/// Compile `actions` against a `dest` surface.
pub fn compile(actions: &[StructuredAction], dest: SurfaceSize, opts: &CompileOptions) -> CompiledCommand {
    if crate::grounding::action::contains_finished(actions) {
        return CompiledCommand::Done;
    }

    let mut body = Vec::new();
    let mut skipped = Vec::new();
    let mut uses_clipboard = false;

    for action in actions {
        match statement_for(action, dest, opts) {
            Ok(Some(stmt)) => {
                uses_clipboard |= stmt.uses_clipboard;
                body.push(stmt.code);
            }
            Ok(None) => {}
            Err(reason) => {
                tracing::warn!(action = %action.raw, reason = %reason, "action not compiled");
                skipped.push(GroundError::malformed(action.raw.clone(), reason));
            }
        }
    }

    let mut text = String::from(ENTRY_POINT);
    text.push_str("\nimport time\n");
    if uses_clipboard {
        text.push_str("import pyperclip\n");
    }
    let delay = format!("time.sleep({:?})", opts.statement_delay_secs);
    for code in &body {
        text.push('\n');
        text.push_str(code);
        text.push('\n');
        text.push_str(&delay);
        text.push('\n');
    }

    CompiledCommand::Script(CompiledScript {
        text,
        statements: body.len(),
        skipped,
    })
}

struct Statement {
    code: String,
    uses_clipboard: bool,
}

impl Statement {
    fn plain(code: String) -> Option<Self> {
        Some(Self {
            code,
            uses_clipboard: false,
        })
    }
}

fn statement_for(
    action: &StructuredAction,
    dest: SurfaceSize,
    opts: &CompileOptions,
) -> Result<Option<Statement>, String> {
    let px = |p: NormPoint| to_destination_pixels(p, dest.width, dest.height);
    let anchor = || {
        action
            .anchor()
            .map(px)
            .ok_or_else(|| format!("{} has no point", action.action_type))
    };

    let stmt = match action.action_type {
        ActionType::Click => {
            let (x, y) = anchor()?;
            Statement::plain(format!("pyautogui.click({x}, {y}, button='left')"))
        }
        ActionType::DoubleClick => {
            let (x, y) = anchor()?;
            Statement::plain(format!("pyautogui.doubleClick({x}, {y}, button='left')"))
        }
        ActionType::RightClick => {
            let (x, y) = anchor()?;
            Statement::plain(format!("pyautogui.click({x}, {y}, button='right')"))
        }
        ActionType::Hover => {
            let (x, y) = anchor()?;
            Statement::plain(format!("pyautogui.moveTo({x}, {y})"))
        }
        ActionType::Drag => {
            let (start, end) = action
                .drag_endpoints()
                .ok_or_else(|| "drag needs both a start and an end point".to_string())?;
            let ((sx, sy), (ex, ey)) = (px(start), px(end));
            Statement::plain(format!(
                "pyautogui.moveTo({sx}, {sy})\npyautogui.dragTo({ex}, {ey}, duration={:?})",
                opts.drag_duration_secs
            ))
        }
        ActionType::Hotkey => Statement::plain(hotkey_statement(action.keys().unwrap_or_default())?),
        ActionType::Type => type_statement(action.text("content").unwrap_or_default(), opts),
        ActionType::Scroll => {
            let direction = action
                .direction()
                .ok_or_else(|| "scroll needs a direction".to_string())?;
            let amount = match direction {
                ScrollDirection::Up | ScrollDirection::Right => opts.scroll_amount,
                ScrollDirection::Down | ScrollDirection::Left => -opts.scroll_amount,
            };
            let func = if direction.is_horizontal() { "hscroll" } else { "scroll" };
            let code = match action.anchor().map(px) {
                Some((x, y)) => format!("pyautogui.{func}({amount}, x={x}, y={y})"),
                None => format!("pyautogui.{func}({amount})"),
            };
            Statement::plain(code)
        }
        // The loop applies the wait delay itself.
        ActionType::Wait => None,
        ActionType::Finished => None,
        ActionType::Unknown => return Err(format!("no input command for `{}`", action.name)),
    };
    Ok(stmt)
}

fn hotkey_statement(keys: &[String]) -> Result<String, String> {
    if keys.is_empty() || keys.len() > MAX_HOTKEY_KEYS {
        return Err(format!("hotkey takes 1 to {MAX_HOTKEY_KEYS} keys, got {}", keys.len()));
    }
    let keys = keys
        .iter()
        .map(|k| normalize_key(k).ok_or_else(|| format!("unsupported key `{k}`")))
        .collect::<Result<Vec<_>, _>>()?;
    let args = keys
        .iter()
        .map(|k| python_literal(k))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(if keys.len() == 1 {
        format!("pyautogui.press({args})")
    } else {
        format!("pyautogui.hotkey({args})")
    })
}

fn type_statement(content: &str, opts: &CompileOptions) -> Option<Statement> {
    let (text, submit) = split_submit(content);
    let mut lines = Vec::new();
    let mut uses_clipboard = false;

    if !text.is_empty() {
        if opts.clipboard_text_entry || needs_clipboard(text) {
            uses_clipboard = true;
            lines.push(format!("pyperclip.copy({})", python_literal(text)));
            lines.push("pyautogui.hotkey('ctrl', 'v')".to_string());
        } else {
            lines.push(format!("pyautogui.write({}, interval=0.05)", python_literal(text)));
        }
    }
    if submit {
        lines.push("pyautogui.press('enter')".to_string());
    }
    if lines.is_empty() {
        return None;
    }
    Some(Statement {
        code: lines.join("\n"),
        uses_clipboard,
    })
}

/// Single-quoted Python string literal for arbitrary text.
pub fn python_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grounding::coords::{CoordinateSpace, PerceivedFrame, ResizeSpec};
    use crate::grounding::parser::parse_response;

    fn compile_response(response: &str, dest: SurfaceSize) -> CompiledCommand {
        let frame = PerceivedFrame::from_image(
            3360,
            2100,
            &ResizeSpec::with_factor(28),
            CoordinateSpace::ResizedPixels,
        )
        .unwrap();
        let parsed = parse_response(response, &frame);
        compile(&parsed.actions, dest, &CompileOptions::default())
    }

    fn script(cmd: CompiledCommand) -> CompiledScript {
        match cmd {
            CompiledCommand::Script(s) => s,
            CompiledCommand::Done => panic!("expected a script"),
        }
    }

    #[test]
    fn click_lands_on_half_resolution_pixel() {
        let cmd = compile_response(
            "Thought: click field\nAction: click(point='<point>500 300</point>')",
            SurfaceSize::new(1680, 1050),
        );
        let s = script(cmd);
        assert_eq!(s.statements, 1);
        assert!(s.text.starts_with("import pyautogui\nimport time\n"));
        assert!(s.text.contains("pyautogui.click(250, 150, button='left')"));
        assert!(s.text.contains("time.sleep(0.5)"));
    }

    #[test]
    fn finished_compiles_to_done() {
        let cmd = compile_response("Action: finished(content='done')", SurfaceSize::new(1680, 1050));
        assert!(cmd.is_done());
        assert_eq!(cmd.as_text(), "DONE");
    }

    #[test]
    fn finished_wins_over_other_actions() {
        let cmd = compile_response(
            "Action: click(point='<point>1 1</point>')\nfinished(content='ok')",
            SurfaceSize::new(100, 100),
        );
        assert!(cmd.is_done());
    }

    #[test]
    fn malformed_drag_is_left_out_of_the_script() {
        let s = script(compile_response(
            "Action: drag(start_point='<point>10 20</point>')\nhotkey(key='ctrl s')",
            SurfaceSize::new(1680, 1050),
        ));
        assert_eq!(s.statements, 1);
        assert!(!s.text.contains("dragTo"));
        assert!(s.text.contains("pyautogui.hotkey('ctrl', 's')"));
    }

    #[test]
    fn drag_scroll_and_double_click() {
        let s = script(compile_response(
            "Action: drag(start_point='<point>0 0</point>', end_point='<point>3360 2100</point>')\n\
             scroll(point='<point>1680 1050</point>', direction='down')\n\
             left_double(point='<point>336 210</point>')\n\
             scroll(direction='left')",
            SurfaceSize::new(1000, 500),
        ));
        assert_eq!(s.statements, 4);
        assert!(s.text.contains("pyautogui.moveTo(0, 0)\npyautogui.dragTo(999, 499, duration=1.0)"));
        assert!(s.text.contains("pyautogui.scroll(-5, x=500, y=250)"));
        assert!(s.text.contains("pyautogui.doubleClick(100, 50, button='left')"));
        assert!(s.text.contains("pyautogui.hscroll(-5)"));
    }

    #[test]
    fn typed_text_is_escaped_and_submitted() {
        let s = script(compile_response(
            r"Action: type(content='it\'s a \\path\n')",
            SurfaceSize::new(100, 100),
        ));
        assert!(s.text.contains(r"pyautogui.write('it\'s a \\path', interval=0.05)"));
        assert!(s.text.contains("pyautogui.press('enter')"));
        assert!(!s.text.contains("pyperclip"));
    }

    #[test]
    fn non_ascii_text_goes_through_the_clipboard() {
        let s = script(compile_response("Action: type(content='東京')", SurfaceSize::new(100, 100)));
        assert!(s.text.contains("import pyperclip"));
        assert!(s.text.contains("pyperclip.copy('東京')"));
        assert!(s.text.contains("pyautogui.hotkey('ctrl', 'v')"));
    }

    #[test]
    fn wait_and_unknown_emit_no_statement() {
        let s = script(compile_response(
            "Action: wait()\nopen_app(app_name='Chrome')",
            SurfaceSize::new(100, 100),
        ));
        assert_eq!(s.statements, 0);
        assert_eq!(s.skipped.len(), 1);
        assert!(crate::executor::safety::verify_script(&s.text).is_ok());
    }

    #[test]
    fn literal_escapes_quotes_and_newlines() {
        assert_eq!(python_literal("a'b\nc"), r"'a\'b\nc'");
    }
}
