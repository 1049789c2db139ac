//! Codec for the RF post-processor's flat block format.
//!
//! The input variant is one level deep: a section name line, a `{`/`}`
//! body of `field = value // comment` lines. The output variant adds
//! `[SectionName]` bracket headers in front of each data block, with
//! tabular mode-indexed (`RoverQ`) or surface-indexed
//! (`maxFieldsOnSurface`) rows inside.

use crate::domain::{Ace3pError, Ace3pResult};

pub const SECTION_ROVER_Q: &str = "RoverQ";
pub const SECTION_MAX_FIELDS: &str = "maxFieldsOnSurface";

/// One named section of an rfpost input file, fields in file order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RfPostSection {
    pub name: String,
    fields: Vec<(String, String)>,
}

impl RfPostSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Section toggles follow the original convention: an `ionoff` field
    /// equal to `1` marks the section's output block for parsing.
    pub fn is_enabled(&self) -> bool {
        self.field("ionoff").map(str::trim) == Some("1")
    }
}

/// Parsed rfpost input file: ordered named sections of `field = value`
/// pairs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RfPostInput {
    pub sections: Vec<RfPostSection>,
}

impl RfPostInput {
    pub fn section(&self, name: &str) -> Option<&RfPostSection> {
        self.sections.iter().find(|section| section.name == name)
    }

    pub fn section_mut(&mut self, name: &str) -> Option<&mut RfPostSection> {
        self.sections.iter_mut().find(|section| section.name == name)
    }

    /// Names of sections whose output block should be parsed.
    pub fn enabled_sections(&self) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|section| section.is_enabled())
            .map(|section| section.name.as_str())
            .collect()
    }

    pub fn parse(text: &str) -> Ace3pResult<Self> {
        let mut input = Self::default();
        let mut pending_name: Option<String> = None;
        let mut open_section: Option<RfPostSection> = None;

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') {
                let name = pending_name.take().ok_or_else(|| {
                    Ace3pError::malformed_document(
                        "PARSE.RFPOST_SECTION",
                        "'{' with no section name on the line before it",
                    )
                })?;
                if open_section.is_some() {
                    return Err(Ace3pError::malformed_document(
                        "PARSE.RFPOST_SECTION",
                        format!("section '{}' opened inside another section", name),
                    ));
                }
                open_section = Some(RfPostSection::new(name));
                continue;
            }
            if trimmed.starts_with('}') {
                let section = open_section.take().ok_or_else(|| {
                    Ace3pError::malformed_document(
                        "PARSE.RFPOST_SECTION",
                        "'}' with no open section",
                    )
                })?;
                input.sections.push(section);
                continue;
            }
            match &mut open_section {
                Some(section) => {
                    if let Some((key, rest)) = trimmed.split_once('=') {
                        let value = rest.split("//").next().unwrap_or("").trim();
                        section.set_field(key.trim(), value);
                    }
                }
                None => pending_name = Some(trimmed.to_string()),
            }
        }

        if let Some(section) = open_section {
            return Err(Ace3pError::malformed_document(
                "PARSE.RFPOST_SECTION",
                format!("section '{}' is never closed", section.name),
            ));
        }
        Ok(input)
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push_str(&section.name);
            out.push_str("\n{\n");
            for (key, value) in &section.fields {
                out.push_str("   ");
                out.push_str(key);
                out.push_str(" = ");
                out.push_str(value);
                out.push('\n');
            }
            out.push_str("}\n\n");
        }
        out
    }
}

/// One row of the `[RoverQ]` output table.
#[derive(Debug, Clone, PartialEq)]
pub struct RoverQMode {
    pub mode_id: String,
    pub frequency: f64,
    pub q_ext: f64,
    pub v_real: f64,
    pub v_imag: f64,
    pub abs_v: f64,
    pub r_over_q: f64,
}

impl RoverQMode {
    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "Frequency" => Some(self.frequency),
            "Qext" => Some(self.q_ext),
            "V_r" => Some(self.v_real),
            "V_i" => Some(self.v_imag),
            "absV" => Some(self.abs_v),
            "RoQ" => Some(self.r_over_q),
            _ => None,
        }
    }
}

/// One `surfaceID`/`modeID` group of the `[maxFieldsOnSurface]` output.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceMaxFields {
    pub surface_id: String,
    pub mode_id: String,
    pub e_max: f64,
    pub e_max_location: [f64; 3],
    pub h_max: f64,
    pub h_max_location: [f64; 3],
}

/// Parsed rfpost output, restricted to the sections requested by the
/// caller (normally the input sections flagged `ionoff = 1`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RfPostOutput {
    pub rover_q: Vec<RoverQMode>,
    pub max_fields: Vec<SurfaceMaxFields>,
}

impl RfPostOutput {
    pub fn mode(&self, mode_id: &str) -> Option<&RoverQMode> {
        self.rover_q.iter().find(|mode| mode.mode_id == mode_id)
    }

    pub fn surface_mode(&self, surface_id: &str, mode_id: &str) -> Option<&SurfaceMaxFields> {
        self.max_fields
            .iter()
            .find(|group| group.surface_id == surface_id && group.mode_id == mode_id)
    }

    pub fn first_for_surface(&self, surface_id: &str) -> Option<&SurfaceMaxFields> {
        self.max_fields
            .iter()
            .find(|group| group.surface_id == surface_id)
    }

    pub fn parse(text: &str, sections: &[&str]) -> Ace3pResult<Self> {
        let mut output = Self::default();
        for section in sections {
            let Some(body) = section_body(text, section) else {
                tracing::warn!("data key '{}' not found in rfpost output", section);
                continue;
            };
            match *section {
                SECTION_ROVER_Q => output.rover_q = parse_rover_q(&body)?,
                SECTION_MAX_FIELDS => output.max_fields = parse_max_fields(&body)?,
                other => {
                    tracing::warn!("rfpost section '{}' parsing not implemented", other);
                }
            }
        }
        Ok(output)
    }
}

/// Lines between the `{` after `[name]` and the closing `}`.
fn section_body(text: &str, name: &str) -> Option<Vec<String>> {
    let header = format!("[{}]", name);
    let mut in_section = false;
    let mut body = Vec::new();
    for line in text.lines() {
        if line.starts_with(&header) {
            in_section = true;
            continue;
        }
        if in_section {
            if line.starts_with('}') {
                return Some(body);
            }
            if line.trim() == "{" {
                continue;
            }
            body.push(line.to_string());
        }
    }
    None
}

fn parse_rover_q(body: &[String]) -> Ace3pResult<Vec<RoverQMode>> {
    let header_index = body
        .iter()
        .position(|line| line.trim().starts_with("ModeID"));
    let rows = match header_index {
        Some(index) => &body[index + 1..],
        None => body,
    };

    let mut modes = Vec::new();
    for row in rows {
        let trimmed = row.trim();
        if trimmed.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        if tokens.len() < 7 {
            return Err(rover_q_error(trimmed));
        }
        modes.push(RoverQMode {
            mode_id: tokens[0].to_string(),
            frequency: parse_float(tokens[1]).ok_or_else(|| rover_q_error(trimmed))?,
            q_ext: parse_float(tokens[2]).ok_or_else(|| rover_q_error(trimmed))?,
            // V_r column carries a trailing comma in the native format.
            v_real: parse_float(tokens[3].trim_end_matches(','))
                .ok_or_else(|| rover_q_error(trimmed))?,
            v_imag: parse_float(tokens[4]).ok_or_else(|| rover_q_error(trimmed))?,
            abs_v: parse_float(tokens[5]).ok_or_else(|| rover_q_error(trimmed))?,
            r_over_q: parse_float(tokens[6]).ok_or_else(|| rover_q_error(trimmed))?,
        });
    }
    Ok(modes)
}

fn rover_q_error(row: &str) -> Ace3pError {
    Ace3pError::malformed_document(
        "PARSE.RFPOST_ROVERQ_ROW",
        format!("unreadable RoverQ row '{}'", row),
    )
}

fn parse_max_fields(body: &[String]) -> Ace3pResult<Vec<SurfaceMaxFields>> {
    let mut groups = Vec::new();
    let mut index = 0_usize;
    while index < body.len() {
        let trimmed = body[index].trim();
        if !trimmed.starts_with("surfaceID") {
            index += 1;
            continue;
        }
        if index + 3 >= body.len() {
            return Err(max_fields_error("truncated surfaceID group"));
        }
        let surface_id = value_after_colon(trimmed)
            .ok_or_else(|| max_fields_error("surfaceID line missing ':'"))?;
        let mode_id = value_after_colon(body[index + 1].trim())
            .ok_or_else(|| max_fields_error("modeID line missing ':'"))?;
        let (e_max, e_max_location) = parse_field_line(body[index + 2].trim())?;
        let (h_max, h_max_location) = parse_field_line(body[index + 3].trim())?;
        groups.push(SurfaceMaxFields {
            surface_id,
            mode_id,
            e_max,
            e_max_location,
            h_max,
            h_max_location,
        });
        index += 4;
    }
    Ok(groups)
}

/// Parses `Emax = <value> [units] at (x, y, z)` (same shape for Hmax).
fn parse_field_line(line: &str) -> Ace3pResult<(f64, [f64; 3])> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let value = tokens
        .get(2)
        .and_then(|token| parse_float(token))
        .ok_or_else(|| max_fields_error(&format!("unreadable field line '{}'", line)))?;

    let location_text = line
        .rsplit_once(" at ")
        .map(|(_, rest)| rest.trim())
        .ok_or_else(|| max_fields_error(&format!("field line lacks 'at (x,y,z)': '{}'", line)))?;
    let coords: Vec<f64> = location_text
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .filter_map(|token| parse_float(token.trim()))
        .collect();
    if coords.len() != 3 {
        return Err(max_fields_error(&format!(
            "field location is not a 3-tuple: '{}'",
            location_text
        )));
    }
    Ok((value, [coords[0], coords[1], coords[2]]))
}

fn max_fields_error(message: &str) -> Ace3pError {
    Ace3pError::malformed_document("PARSE.RFPOST_MAXFIELDS", message.to_string())
}

fn value_after_colon(line: &str) -> Option<String> {
    line.split_once(':')
        .map(|(_, value)| value.trim().to_string())
}

fn parse_float(token: &str) -> Option<f64> {
    token.trim().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::{RfPostInput, RfPostOutput, SECTION_MAX_FIELDS, SECTION_ROVER_Q};

    const RFPOST_INPUT: &str = "\
RFField
{
   ResultDir = omega3p_results
   ModeID = 0   // first mode
}

RoverQ
{
   ionoff = 1
   modeID1 = -1
}

maxFieldsOnSurface
{
   ionoff = 0
   surfaceID = 6
}
";

    const RFPOST_OUTPUT: &str = "\
[RoverQ]
{
   ModeID   Frequency      Qext        V_r,          V_i         absV        RoQ
   0        1.3e9          4.5e4       1.2e6,        3.4e5       1.25e6      120.5
   1        1.8e9          2.1e4       8.0e5,        1.1e5       8.1e5       95.2
}

[maxFieldsOnSurface]
{
   surfaceID : 6
   modeID : 0
   Emax = 2.4e6 V*m at (0.01, 0.0, 0.057)
   Hmax = 5.5e3 A/m at (0.02, 0.0, -0.057)
}
";

    #[test]
    fn input_round_trip_preserves_sections_and_fields() {
        let input = RfPostInput::parse(RFPOST_INPUT).expect("input parses");
        assert_eq!(input.sections.len(), 3);
        let rf_field = input.section("RFField").expect("RFField section");
        assert_eq!(rf_field.field("ModeID"), Some("0"));

        let reparsed = RfPostInput::parse(&input.serialize()).expect("serialized reparses");
        assert_eq!(input, reparsed);
    }

    #[test]
    fn ionoff_gates_which_sections_are_enabled() {
        let input = RfPostInput::parse(RFPOST_INPUT).expect("input parses");
        assert_eq!(input.enabled_sections(), vec![SECTION_ROVER_Q]);
    }

    #[test]
    fn rover_q_rows_parse_with_trailing_comma_column() {
        let output =
            RfPostOutput::parse(RFPOST_OUTPUT, &[SECTION_ROVER_Q]).expect("output parses");
        assert_eq!(output.rover_q.len(), 2);
        let mode0 = output.mode("0").expect("mode 0");
        assert_eq!(mode0.frequency, 1.3e9);
        assert_eq!(mode0.v_real, 1.2e6);
        assert_eq!(mode0.r_over_q, 120.5);
        assert_eq!(mode0.field("RoQ"), Some(120.5));
        assert_eq!(mode0.field("NotAField"), None);
    }

    #[test]
    fn max_fields_groups_parse_values_and_locations() {
        let output =
            RfPostOutput::parse(RFPOST_OUTPUT, &[SECTION_MAX_FIELDS]).expect("output parses");
        assert_eq!(output.max_fields.len(), 1);
        let group = output.surface_mode("6", "0").expect("surface 6 mode 0");
        assert_eq!(group.e_max, 2.4e6);
        assert_eq!(group.e_max_location, [0.01, 0.0, 0.057]);
        assert_eq!(group.h_max_location[2], -0.057);
    }

    #[test]
    fn missing_section_warns_but_does_not_fail() {
        let output = RfPostOutput::parse("no sections here\n", &[SECTION_ROVER_Q])
            .expect("parse tolerates absent section");
        assert!(output.rover_q.is_empty());
    }

    #[test]
    fn unclosed_input_section_is_malformed() {
        assert!(RfPostInput::parse("RFField\n{\n   a = 1\n").is_err());
    }
}
