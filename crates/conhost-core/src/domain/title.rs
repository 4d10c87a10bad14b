//! Translation of console titles into persistent-store keys.
//!
//! Store keys may not contain path separators, and a title that starts with
//! the absolute system root should match regardless of the drive the system
//! lives on.  `C:\Windows\System32\cmd.exe` therefore becomes
//! `%SystemRoot%_System32_cmd.exe`.

/// Placeholder substituted for the system root.
pub const SYSTEM_ROOT_TOKEN: &str = "%SystemRoot%";

/// Translates `title` into a store key.
///
/// - When `system_root` is given and `title` starts with it (ASCII
///   case-insensitive), that prefix is replaced by [`SYSTEM_ROOT_TOKEN`].
/// - When `substitute` is set, every `\` becomes `_`.
pub fn translate_console_title(title: &str, system_root: Option<&str>, substitute: bool) -> String {
    let (prefix, rest) = match system_root {
        Some(root) if !root.is_empty() && starts_with_ignore_ascii_case(title, root) => {
            (SYSTEM_ROOT_TOKEN, &title[root.len()..])
        }
        _ => ("", title),
    };

    let mut key = String::with_capacity(prefix.len() + rest.len());
    key.push_str(prefix);
    if substitute {
        key.extend(rest.chars().map(|c| if c == '\\' { '_' } else { c }));
    } else {
        key.push_str(rest);
    }
    key
}

/// Truncates `text` so that it fits in `max_units` UTF-16 code units without
/// splitting a surrogate pair.
pub fn bound_to_utf16_units(text: &str, max_units: usize) -> String {
    let mut used = 0;
    let mut bounded = String::new();
    for c in text.chars() {
        used += c.len_utf16();
        if used > max_units {
            break;
        }
        bounded.push(c);
    }
    bounded
}

fn starts_with_ignore_ascii_case(haystack: &str, prefix: &str) -> bool {
    haystack.len() >= prefix.len()
        && haystack.is_char_boundary(prefix.len())
        && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}
