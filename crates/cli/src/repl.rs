//! Command parsing for the management REPL.
//!
//! Accepts call syntax (`readResource("thermometer-0", "/3303/0/5700")`) or plain words
//! (`readResource thermometer-0 /3303/0/5700`).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// History file, relative to the working directory.
pub const HISTORY_FILE: &str = ".repl_history";

pub const HELP: &str = "\
Management API commands: connect, devices, readResource, writeResource, history, exit and help.
Example usage:
  connect(apiPath=\"/1/mgmt\", socketPath=\"/tmp/edge.sock\")
  devices()
  readResource(endpointName, resourceURI)    e.g. readResource(\"thermometer-0\", \"/3303/0/5700\")
  writeResource(endpointName, resourceURI, base64Value)
                                             e.g. writeResource(\"thermostat-0\", \"/3308/0/5900\", \"QEcHSP//kFU=\")
  history()
  exit()
  help()";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Connect {
        api_path: Option<String>,
        socket_path: Option<PathBuf>,
    },
    Devices,
    ReadResource {
        endpoint_name: String,
        uri: String,
    },
    WriteResource {
        endpoint_name: String,
        uri: String,
        base64_value: String,
    },
    History,
    Help,
    Exit,
}

/// Parse one input line. `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<ReplCommand>, String> {
    let line = line.trim().trim_end_matches(';');
    if line.is_empty() {
        return Ok(None);
    }
    let (name, args) = split_call(line)?;
    let arg = |i: usize| args.get(i).cloned();
    let require = |i: usize, what: &str| {
        arg(i).ok_or_else(|| format!("{}: missing {}", name, what))
    };
    let command = match name.as_str() {
        "connect" => ReplCommand::Connect {
            api_path: arg(0),
            socket_path: arg(1).map(PathBuf::from),
        },
        "devices" => ReplCommand::Devices,
        "readResource" => ReplCommand::ReadResource {
            endpoint_name: require(0, "endpointName")?,
            uri: require(1, "resourceURI")?,
        },
        "writeResource" => ReplCommand::WriteResource {
            endpoint_name: require(0, "endpointName")?,
            uri: require(1, "resourceURI")?,
            base64_value: require(2, "base64Value")?,
        },
        "history" => ReplCommand::History,
        "help" => ReplCommand::Help,
        "exit" | "quit" => ReplCommand::Exit,
        other => return Err(format!("unknown command `{}`; try help", other)),
    };
    Ok(Some(command))
}

/// Entered lines, kept across sessions in an append-only file.
pub struct History {
    path: PathBuf,
    entries: Vec<String>,
}

impl History {
    /// Load previous entries. A missing or unreadable file starts an empty history.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = std::fs::read_to_string(&path)
            .map(|s| s.lines().filter(|l| !l.trim().is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        Self { path, entries }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Remember a line and append it to the file. Blank lines are skipped.
    pub fn record(&mut self, line: &str) -> std::io::Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        self.entries.push(line.to_string());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

fn split_call(line: &str) -> Result<(String, Vec<String>), String> {
    match line.find('(') {
        Some(open) => {
            let inner = line[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| "missing closing `)`".to_string())?;
            Ok((line[..open].trim().to_string(), call_args(inner)?))
        }
        None => {
            let mut words = line.split_whitespace().map(unquote);
            let name = words.next().unwrap_or_default();
            Ok((name, words.collect()))
        }
    }
}

const ARG_NAMES: &[&str] = &[
    "apiPath",
    "socketPath",
    "endpointName",
    "resourceURI",
    "uri",
    "base64Value",
];

/// Comma-separated arguments; quoted strings may contain commas. `apiPath=value` keeps the value.
fn call_args(inner: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in inner.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, ',') => args.push(std::mem::take(&mut current)),
            (None, c) => current.push(c),
        }
    }
    if quote.is_some() {
        return Err("unterminated string".to_string());
    }
    args.push(current);
    Ok(args
        .into_iter()
        .map(|a| {
            let a = a.trim();
            let value = match a.split_once('=') {
                Some((key, value)) if ARG_NAMES.contains(&key.trim()) => value.trim(),
                _ => a,
            };
            unquote(value)
        })
        .filter(|a| !a.is_empty())
        .collect())
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner.to_string();
        }
    }
    s.to_string()
}
