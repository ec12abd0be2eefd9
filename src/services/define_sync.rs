//! Development build define synchronization.
//!
//! The settings record's `development_build` flag is mirrored into the `DEVELOPMENT_BUILD`
//! scripting define of one build target group. Defines live in the project settings file
//! as a semicolon-separated list per group:
//!
//! ```text
//!   scriptingDefineSymbols:
//!     Standalone: FOO;DEVELOPMENT_BUILD
//! ```
//!
//! Only the group's entry is edited; every other line is written back unchanged.

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs;

pub const DEVELOPMENT_DEFINE: &str = "DEVELOPMENT_BUILD";

/// Whether `define` is one of the entries of a `;`-separated define list
pub fn has_define(list: &str, define: &str) -> bool {
    list.split(';').any(|part| part.trim() == define)
}

/// `list` with `define` added or removed; empty entries are dropped
pub fn set_define(list: &str, define: &str, enabled: bool) -> String {
    let mut parts: Vec<&str> = list
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty() && *part != define)
        .collect();
    if enabled {
        parts.push(define);
    }
    parts.join(";")
}

pub struct DefineSync {
    settings_path: Utf8PathBuf,
    group: String,
    define: String,
    section_pattern: Regex,
}

impl DefineSync {
    pub fn new(settings_path: impl Into<Utf8PathBuf>, group: impl Into<String>) -> Self {
        Self {
            settings_path: settings_path.into(),
            group: group.into(),
            define: DEVELOPMENT_DEFINE.to_string(),
            section_pattern: Regex::new(r"^(\s*)scriptingDefineSymbols:\s*(\{\s*\})?\s*$")
                .expect("Invalid define section regex"),
        }
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    /// Whether the group currently has the define
    pub fn is_defined(&self) -> Result<bool> {
        let text = self.read()?;
        let lines: Vec<&str> = text.lines().collect();
        let section = self.find_section(&lines)?;
        Ok(section
            .entry(&lines, &self.group)
            .is_some_and(|(_, _, value)| has_define(value, &self.define)))
    }

    /// Add or remove the define; returns true when the file was rewritten
    ///
    /// A project without a settings file has nothing to sync.
    pub fn sync(&self, enabled: bool) -> Result<bool> {
        if !self.settings_path.exists() {
            tracing::debug!(
                "No project settings at {}; skipping {} sync",
                self.settings_path,
                self.define
            );
            return Ok(false);
        }

        let text = self.read()?;
        let Some(updated) = self.rewrite(&text, enabled)? else {
            return Ok(false);
        };

        fs::write(&self.settings_path, updated)
            .with_context(|| format!("Failed to write project settings: {}", self.settings_path))?;

        tracing::info!(
            "{} {} for {}",
            if enabled { "Added" } else { "Removed" },
            self.define,
            self.group
        );
        Ok(true)
    }

    fn read(&self) -> Result<String> {
        fs::read_to_string(&self.settings_path)
            .with_context(|| format!("Failed to read project settings: {}", self.settings_path))
    }

    fn find_section(&self, lines: &[&str]) -> Result<Section> {
        for (index, line) in lines.iter().enumerate() {
            if let Some(captures) = self.section_pattern.captures(line) {
                let indent = captures.get(1).map_or("", |m| m.as_str()).to_string();
                let inline_empty = captures.get(2).is_some();
                let end = lines[index + 1..]
                    .iter()
                    .position(|l| indentation(l) <= indent.len())
                    .map_or(lines.len(), |offset| index + 1 + offset);
                return Ok(Section {
                    header: index,
                    end: if inline_empty { index + 1 } else { end },
                    indent,
                    inline_empty,
                });
            }
        }
        bail!(
            "No scriptingDefineSymbols section in {}",
            self.settings_path
        )
    }

    /// New file text, or `None` when the group is already in the wanted state
    fn rewrite(&self, text: &str, enabled: bool) -> Result<Option<String>> {
        let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
        let borrowed: Vec<&str> = text.lines().collect();
        let section = self.find_section(&borrowed)?;
        let entry = section
            .entry(&borrowed, &self.group)
            .map(|(index, indent, value)| (index, indent.to_string(), value.to_string()));
        let mut lines: Vec<String> = borrowed.iter().map(|l| l.to_string()).collect();

        match entry {
            Some((index, child_indent, value)) => {
                if has_define(&value, &self.define) == enabled {
                    return Ok(None);
                }
                let updated = set_define(&value, &self.define, enabled);
                if !updated.is_empty() {
                    lines[index] = format!("{}{}: {}", child_indent, self.group, updated);
                } else {
                    lines.remove(index);
                    if section.end - section.header == 2 {
                        lines[section.header] =
                            format!("{}scriptingDefineSymbols: {{}}", section.indent);
                    }
                }
            }
            None => {
                if !enabled {
                    return Ok(None);
                }
                let child_indent = if section.end > section.header + 1 {
                    leading_whitespace(&lines[section.header + 1]).to_string()
                } else {
                    format!("{}  ", section.indent)
                };
                if section.inline_empty {
                    lines[section.header] = format!("{}scriptingDefineSymbols:", section.indent);
                }
                lines.insert(
                    section.header + 1,
                    format!("{}{}: {}", child_indent, self.group, self.define),
                );
            }
        }

        let mut output = lines.join(newline);
        if text.ends_with('\n') {
            output.push_str(newline);
        }
        Ok(Some(output))
    }
}

/// Location of the `scriptingDefineSymbols` mapping; children are `header + 1 .. end`
struct Section {
    header: usize,
    end: usize,
    indent: String,
    inline_empty: bool,
}

impl Section {
    /// `(line index, indent, value)` of the group's entry
    fn entry<'a>(&self, lines: &[&'a str], group: &str) -> Option<(usize, &'a str, &'a str)> {
        (self.header + 1..self.end).find_map(|index| {
            let line = lines[index];
            let value = line
                .trim_start()
                .strip_prefix(group)?
                .strip_prefix(':')?
                .trim();
            Some((index, leading_whitespace(line), value))
        })
    }
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

fn indentation(line: &str) -> usize {
    if line.trim().is_empty() {
        0
    } else {
        leading_whitespace(line).len()
    }
}
