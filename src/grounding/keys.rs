// Key vocabulary accepted in hotkey actions.

/// Hotkeys combine at most this many simultaneous keys.
pub const MAX_HOTKEY_KEYS: usize = 3;

/// Canonical (pyautogui) name for a key, or `None` if the key is not supported.
pub fn normalize_key(key: &str) -> Option<String> {
    let lower = key.trim().to_ascii_lowercase();
    let mapped = match lower.as_str() {
        "ctrl" | "control" => "ctrl",
        "shift" => "shift",
        "alt" => "alt",
        "option" => "option",
        "cmd" | "command" | "meta" => "command",
        "win" | "super" | "windows" => "win",
        "enter" | "return" => "enter",
        "esc" | "escape" => "esc",
        "tab" => "tab",
        "space" | "spacebar" => "space",
        "backspace" => "backspace",
        "delete" | "del" => "delete",
        "insert" => "insert",
        "home" => "home",
        "end" => "end",
        "pageup" | "page_up" | "pgup" => "pageup",
        "pagedown" | "page_down" | "pgdn" => "pagedown",
        "up" | "arrowup" => "up",
        "down" | "arrowdown" => "down",
        "left" | "arrowleft" => "left",
        "right" | "arrowright" => "right",
        "capslock" => "capslock",
        other if is_function_key(other) => return Some(other.to_string()),
        other if other.chars().count() == 1 && other.chars().all(|c| c.is_ascii_graphic()) => {
            return Some(other.to_string())
        }
        _ => return None,
    };
    Some(mapped.to_string())
}

fn is_function_key(key: &str) -> bool {
    key.strip_prefix('f')
        .and_then(|n| n.parse::<u8>().ok())
        .is_some_and(|n| (1..=12).contains(&n))
}

/// Split a space- (or `+`-) separated combination such as `ctrl c` into canonical keys.
pub fn parse_key_combo(value: &str) -> Result<Vec<String>, String> {
    let keys = value
        .split(|c: char| c.is_whitespace() || c == '+')
        .filter(|s| !s.is_empty())
        .map(|k| normalize_key(k).ok_or_else(|| format!("unsupported key `{k}`")))
        .collect::<Result<Vec<_>, _>>()?;

    if keys.is_empty() {
        return Err("empty key combination".into());
    }
    if keys.len() > MAX_HOTKEY_KEYS {
        return Err(format!(
            "{} keys exceeds the limit of {MAX_HOTKEY_KEYS}",
            keys.len()
        ));
    }
    Ok(keys)
}
