use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use std::fs;

use crate::envelope::{Resolved, Warning};

const HOSTNAME_TOKEN: &str = "%h";
const TIME_START: &str = "%t";
const TIME_END: &str = "t%";
const FILE_START: &str = "%f";
const FILE_END: &str = "f%";

/// Named layouts accepted inside `%t...t%`.
fn time_alias(format: &str) -> Option<&'static str> {
    match format {
        "ANSIC" => Some("%a %b %e %H:%M:%S %Y"),
        "UnixDate" => Some("%a %b %e %H:%M:%S %Z %Y"),
        "RubyDate" => Some("%a %b %d %H:%M:%S %z %Y"),
        "RFC822" => Some("%d %b %y %H:%M %Z"),
        "RFC822Z" => Some("%d %b %y %H:%M %z"),
        _ => None,
    }
}

/// Replaces the placeholders in `text`:
///
/// - `%h` with the hostname
/// - `%t<format>t%` with the current local time formatted with `<format>`
/// - `%f<path>f%` with the contents of `<path>` (nothing if it can't be read)
///
/// Soft failures are dropped; see [`resolve_with_warnings`] to inspect them.
pub fn resolve(text: &str) -> String {
    resolve_with_warnings(text).value
}

/// Delimited placeholder kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimited {
    Time,
    File,
}

impl Delimited {
    fn at(text: &str) -> Option<Self> {
        if text.starts_with(TIME_START) {
            Some(Delimited::Time)
        } else if text.starts_with(FILE_START) {
            Some(Delimited::File)
        } else {
            None
        }
    }

    fn delimiters(self) -> (&'static str, &'static str) {
        match self {
            Delimited::Time => (TIME_START, TIME_END),
            Delimited::File => (FILE_START, FILE_END),
        }
    }
}

/// Single left-to-right scan: a substitution is never scanned again, so
/// neither a formatted time nor included file contents can expand further.
/// Once a kind of token is found unterminated, the rest of the string holds
/// no more tokens of that kind.
pub fn resolve_with_warnings(text: &str) -> Resolved<String> {
    let mut warnings = Vec::new();
    let hostname = hostname();
    let now = Local::now();

    let mut out = String::with_capacity(text.len());
    let mut unterminated: Vec<Delimited> = Vec::new();
    let mut rest = text;

    while let Some(percent) = rest.find('%') {
        out.push_str(&rest[..percent]);
        let tail = &rest[percent..];

        if let Some(after) = tail.strip_prefix(HOSTNAME_TOKEN) {
            match &hostname {
                Some(hostname) => out.push_str(hostname),
                None => {
                    if !warnings.contains(&Warning::Hostname) {
                        warnings.push(Warning::Hostname);
                    }
                    out.push_str(HOSTNAME_TOKEN);
                }
            }
            rest = after;
            continue;
        }

        let Some(kind) = Delimited::at(tail).filter(|kind| !unterminated.contains(kind)) else {
            out.push('%');
            rest = &tail[1..];
            continue;
        };

        let (start, end) = kind.delimiters();
        let body = &tail[start.len()..];
        let Some(close) = body.find(end) else {
            unterminated.push(kind);
            out.push_str(start);
            rest = body;
            continue;
        };

        let token = body[..close].trim();
        let replacement = match kind {
            Delimited::Time => format_time(&now, token).or_else(|| {
                warnings.push(Warning::TimeFormat(token.to_string()));
                None
            }),
            Delimited::File => Some(read_placeholder(token, &mut warnings)),
        };
        let token_len = start.len() + close + end.len();
        match replacement {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(&tail[..token_len]),
        }
        rest = &tail[token_len..];
    }
    out.push_str(rest);

    Resolved::with_warnings(out, warnings)
}

/// Contents of `path`, or nothing if it can't be read.
fn read_placeholder(path: &str, warnings: &mut Vec<Warning>) -> String {
    match fs::read(path) {
        Ok(contents) => String::from_utf8_lossy(&contents).into_owned(),
        Err(err) => {
            warnings.push(Warning::Placeholder {
                path: path.into(),
                reason: err.to_string(),
            });
            String::new()
        }
    }
}

fn hostname() -> Option<String> {
    gethostname::gethostname()
        .into_string()
        .ok()
        .filter(|name| !name.is_empty())
}

/// `None` when the pattern is not a valid strftime layout.
fn format_time(now: &DateTime<Local>, format: &str) -> Option<String> {
    let pattern = time_alias(format).unwrap_or(format);
    let items: Vec<Item> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    Some(now.format_with_items(items.iter()).to_string())
}
