use std::fmt;

use register_core::Region;

/// A streaming command for the store's `batch-edit` channel.
///
/// Renders as one s-expression line with every argument double-quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCommand<'a> {
    EnsureEntry {
        register: &'a str,
        region: Region,
        key: &'a str,
        items: &'a [&'a str],
    },
    EnsureItems {
        register: &'a str,
        region: Region,
        key: &'a str,
        items: &'a [&'a str],
    },
    DeleteUntouched {
        register: &'a str,
        region: Region,
    },
}

impl StoreCommand<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            StoreCommand::EnsureEntry { .. } => "ensure-entry",
            StoreCommand::EnsureItems { .. } => "ensure-items",
            StoreCommand::DeleteUntouched { .. } => "delete-untouched",
        }
    }
}

impl fmt::Display for StoreCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.name())?;
        match self {
            StoreCommand::EnsureEntry {
                register,
                region,
                key,
                items,
            }
            | StoreCommand::EnsureItems {
                register,
                region,
                key,
                items,
            } => {
                write!(f, " {} {} {}", quote(register), quote(region.as_str()), quote(key))?;
                for item in *items {
                    write!(f, " {}", quote(item))?;
                }
            }
            StoreCommand::DeleteUntouched { register, region } => {
                write!(f, " {} {}", quote(register), quote(region.as_str()))?;
            }
        }
        f.write_str(")")
    }
}

/// Double-quotes a string, escaping backslashes, quotes and control characters.
///
/// The result never contains a raw newline, so one command stays on one line.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{{{:x}}}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
