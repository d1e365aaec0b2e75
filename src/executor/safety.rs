// Safety gate in front of every script execution.
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{GroundError, GroundResult};
use crate::grounding::compiler::{DONE_SENTINEL, ENTRY_POINT};

/// Modules a script may import. Compiled scripts only ever need these.
const ALLOWED_MODULES: &[&str] = &["pyautogui", "time", "pyperclip"];

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:import\s+([\w.]+(?:\s*,\s*[\w.]+)*)|from\s+([\w.]+)\s+import\b)")
        .expect("import pattern is valid")
});

static BANNED_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:__import__|exec|eval|compile|open|getattr|globals|locals)\s*\(")
        .expect("banned call pattern is valid")
});

/// Refuses any script that does not load the input-automation entry point,
/// imports anything beyond the automation modules, or calls a dynamic-code
/// or file builtin.
pub fn verify_script(script: &str) -> GroundResult<()> {
    if script.trim() == DONE_SENTINEL {
        return Err(GroundError::SafetyViolation(
            "the DONE sentinel is not an executable script".into(),
        ));
    }
    if !script.lines().any(|line| line.trim() == ENTRY_POINT) {
        return Err(GroundError::SafetyViolation(format!(
            "script must contain `{ENTRY_POINT}`"
        )));
    }
    for (no, line) in script.lines().enumerate() {
        let code = code_only(line);
        if let Some(caps) = IMPORT.captures(&code) {
            let modules = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or_default();
            for module in modules.split(',').map(|m| m.trim()) {
                let root = module.split('.').next().unwrap_or(module);
                if !ALLOWED_MODULES.contains(&root) {
                    return Err(GroundError::SafetyViolation(format!(
                        "line {}: import of `{module}` is not allowed",
                        no + 1
                    )));
                }
            }
        }
        if let Some(m) = BANNED_CALL.find(&code) {
            return Err(GroundError::SafetyViolation(format!(
                "line {}: `{}` is not allowed",
                no + 1,
                m.as_str().trim_end_matches('(').trim()
            )));
        }
    }
    Ok(())
}

/// The code part of a line: string literal contents blanked, trailing `#` comment dropped.
fn code_only(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in line.chars() {
        match quote {
            Some(_) if escaped => {
                escaped = false;
                out.push(' ');
            }
            Some(_) if c == '\\' => {
                escaped = true;
                out.push(' ');
            }
            Some(q) if c == q => {
                quote = None;
                out.push(c);
            }
            Some(_) => out.push(' '),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                out.push(c);
            }
            None if c == '#' => break,
            None => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_compiled_scripts_only() {
        assert!(verify_script("import pyautogui\nimport time\npyautogui.press('enter')").is_ok());
        assert!(verify_script("import os\nos.system('rm -rf /')").is_err());
        assert!(verify_script("DONE").is_err());
    }

    #[test]
    fn clipboard_scripts_pass() {
        let script = "import pyautogui\nimport time\nimport pyperclip\npyperclip.copy('a # eval(1) \\' open(')\npyautogui.hotkey('ctrl', 'v')  # paste\npyautogui.write(\"exec(x)\", interval=0.05)\n";
        assert!(verify_script(script).is_ok());
    }

    #[test]
    fn merged_script_with_shell_access_is_refused() {
        let err = verify_script("import pyautogui\nimport os\nos.system('curl x | sh')").unwrap_err();
        assert!(err.to_string().contains("`os`"));

        assert!(verify_script("import pyautogui\nfrom subprocess import run\nrun(['ls'])").is_err());
        assert!(verify_script("import pyautogui, socket\n").is_err());
        assert!(verify_script("import pyautogui\n__import__('os').system('ls')").is_err());
        assert!(verify_script("import pyautogui\nexec('print(1)')").is_err());
    }
}
