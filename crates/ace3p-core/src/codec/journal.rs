//! Line-oriented editor for Cubit mesh-generation journal files.
//!
//! Edits are surgical: only the located `name=value` declaration (or the
//! `export` line) is rewritten, every other line stays byte-identical,
//! including `##` comment lines and the `#{ ... }` APREPRO wrapper on
//! edited lines. A requested key that is absent logs a warning and is
//! skipped; user override sets may be broader than one journal's declared
//! variables.

use crate::domain::{ParamPoint, ParamValue};

#[derive(Debug, Clone, PartialEq)]
pub struct Journal {
    lines: Vec<String>,
}

impl Journal {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.split('\n').map(str::to_string).collect(),
        }
    }

    pub fn serialize(&self) -> String {
        self.lines.join("\n")
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Indices of lines the editor may touch: non-empty and not `##`
    /// full-line comments.
    fn editable_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.lines.iter().enumerate().filter_map(|(index, line)| {
            let trimmed = line.trim();
            (!trimmed.is_empty() && !trimmed.starts_with("##")).then_some(index)
        })
    }

    fn find_declaration(&self, key: &str) -> Option<usize> {
        let needle = format!("{}=", key);
        self.editable_indices().find(|&index| {
            let compact: String = self.lines[index]
                .chars()
                .filter(|character| !character.is_whitespace())
                .collect();
            compact.contains(&needle)
        })
    }

    /// Value of the first `key=` declaration, APREPRO-unwrapped. Missing
    /// keys warn and yield `None`.
    pub fn get_value(&self, key: &str) -> Option<String> {
        let Some(index) = self.find_declaration(key) else {
            tracing::warn!("'{}=' not found in Cubit journal, returning None", key);
            return None;
        };
        let line = &self.lines[index];
        let equals = line.find('=')?;
        let raw = &line[equals + 1..];
        let value = if line.trim_start().starts_with("#{") {
            raw.replace('}', "")
        } else {
            raw.to_string()
        };
        Some(value.trim().to_string())
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get_value(key)
            .and_then(|value| value.trim().parse::<f64>().ok())
    }

    /// Rewrites the first `key=` declaration for each override, keeping the
    /// APREPRO `#{ ... }` wrapper when the located line carries one.
    pub fn set_values(&mut self, overrides: &ParamPoint) {
        for (key, value) in overrides {
            self.set_value(key, value);
        }
    }

    pub fn set_value(&mut self, key: &str, value: &ParamValue) {
        let Some(index) = self.find_declaration(key) else {
            tracing::warn!("'{}=' not found in Cubit journal, override skipped", key);
            return;
        };
        let line = &self.lines[index];
        let Some(equals) = line.find('=') else {
            return;
        };
        let prefix = &line[..equals];
        let new_line = if line.trim_start().starts_with("#{") {
            format!("{}={}}}", prefix, value)
        } else {
            format!("{}={}", prefix, value)
        };
        self.lines[index] = new_line;
    }

    /// Filename quoted on the `export` line, if any.
    pub fn get_export(&self) -> Option<String> {
        for index in self.editable_indices().collect::<Vec<_>>() {
            let words: Vec<&str> = self.lines[index].split_whitespace().collect();
            if words.first() == Some(&"export") {
                return words
                    .iter()
                    .find(|word| word.starts_with('"') && word.ends_with('"') && word.len() >= 2)
                    .map(|word| word.trim_matches('"').to_string());
            }
        }
        tracing::warn!("no export command found in Cubit journal");
        None
    }

    /// Rewrites the `export` line with a new format, quoted filename, and
    /// option list.
    pub fn set_export(&mut self, filename: &str, format: &str, opts: &[&str]) {
        for index in self.editable_indices().collect::<Vec<_>>() {
            let words: Vec<&str> = self.lines[index].split_whitespace().collect();
            if words.first() == Some(&"export") {
                let mut parts = vec!["export".to_string(), format.to_string()];
                parts.push(format!("\"{}\"", filename));
                parts.extend(opts.iter().map(|opt| opt.to_string()));
                self.lines[index] = parts.join(" ");
                return;
            }
        }
        tracing::warn!("no export command found in Cubit journal, export unchanged");
    }
}

#[cfg(test)]
mod tests {
    use super::Journal;
    use crate::domain::ParamValue;

    const JOURNAL: &str = "\
## Pillbox cavity journal
reset
#{cav_radius=90}
#{cav_ellipticity=0.5}
wall_thickness=3
create cylinder height 10 radius {cav_radius}
## export section
mesh volume 1
export genesis \"mesh.gen\" overwrite
";

    #[test]
    fn get_value_unwraps_aprepro_lines() {
        let journal = Journal::parse(JOURNAL);
        assert_eq!(journal.get_value("cav_radius").as_deref(), Some("90"));
        assert_eq!(journal.get_number("cav_ellipticity"), Some(0.5));
        assert_eq!(journal.get_value("wall_thickness").as_deref(), Some("3"));
        assert_eq!(journal.get_value("not_declared"), None);
    }

    #[test]
    fn set_value_touches_only_the_declared_line() {
        let mut journal = Journal::parse(JOURNAL);
        let before: Vec<String> = journal.lines().to_vec();
        journal.set_value("cav_radius", &ParamValue::Number(95.0));

        let after = journal.lines();
        for (index, line) in after.iter().enumerate() {
            if line.contains("cav_radius=") {
                assert_eq!(line, "#{cav_radius=95}");
            } else {
                // Every non-edited line stays byte-identical, comments and
                // export line included.
                assert_eq!(line, &before[index]);
            }
        }
        assert_eq!(journal.get_number("cav_radius"), Some(95.0));
    }

    #[test]
    fn set_value_preserves_plain_declarations() {
        let mut journal = Journal::parse(JOURNAL);
        journal.set_value("wall_thickness", &ParamValue::Number(4.5));
        assert!(journal.lines().iter().any(|line| line == "wall_thickness=4.5"));
    }

    #[test]
    fn missing_override_key_is_skipped_without_error() {
        let mut journal = Journal::parse(JOURNAL);
        let before = journal.serialize();
        journal.set_value("no_such_key", &ParamValue::Number(1.0));
        assert_eq!(journal.serialize(), before);
    }

    #[test]
    fn export_line_is_located_and_rewritten_with_quoting() {
        let mut journal = Journal::parse(JOURNAL);
        assert_eq!(journal.get_export().as_deref(), Some("mesh.gen"));
        journal.set_export("pillbox4.gen", "genesis", &["overwrite"]);
        assert!(
            journal
                .lines()
                .iter()
                .any(|line| line == "export genesis \"pillbox4.gen\" overwrite")
        );
        assert_eq!(journal.get_export().as_deref(), Some("pillbox4.gen"));
    }

    #[test]
    fn round_trip_without_edits_is_byte_identical() {
        let journal = Journal::parse(JOURNAL);
        assert_eq!(journal.serialize(), JOURNAL);
    }
}
