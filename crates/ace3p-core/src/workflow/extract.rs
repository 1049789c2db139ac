//! Typed output-extraction specs.
//!
//! A spec maps user-chosen output column names onto
//! `(section, identifier, field[, sub-component])` paths into the parsed
//! post-processor output. Section and field names are validated when the
//! spec is built: an unknown name is a hard configuration error, never a
//! silent skip. Extraction itself is data-level and yields `None` for
//! identifiers a (possibly failed) run never produced.

use crate::codec::rfpost::{RfPostOutput, SECTION_MAX_FIELDS, SECTION_ROVER_Q};
use crate::domain::{Ace3pError, Ace3pResult};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoverQField {
    Frequency,
    Qext,
    VReal,
    VImag,
    AbsV,
    RoQ,
}

impl RoverQField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "Frequency" => Some(Self::Frequency),
            "Qext" => Some(Self::Qext),
            "V_r" => Some(Self::VReal),
            "V_i" => Some(Self::VImag),
            "absV" => Some(Self::AbsV),
            "RoQ" => Some(Self::RoQ),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Frequency => "Frequency",
            Self::Qext => "Qext",
            Self::VReal => "V_r",
            Self::VImag => "V_i",
            Self::AbsV => "absV",
            Self::RoQ => "RoQ",
        }
    }
}

/// Component index into a `(x, y, z)` location triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationComponent(usize);

impl LocationComponent {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "x" | "0" => Some(Self(0)),
            "y" | "1" => Some(Self(1)),
            "z" | "2" => Some(Self(2)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceField {
    EMax,
    HMax,
    EMaxLocation(LocationComponent),
    HMaxLocation(LocationComponent),
}

/// One validated path into the parsed post-processor output.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionPath {
    RoverQ { mode_id: String, field: RoverQField },
    MaxFields { surface_id: String, field: SurfaceField },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractionSpec {
    columns: Vec<(String, ExtractionPath)>,
}

impl ExtractionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Adds one output column. `section` must be `RoverQ` or
    /// `maxFieldsOnSurface`; `field` must name a real field of that
    /// section; location fields additionally need a `sub_component`.
    pub fn push(
        &mut self,
        column: impl Into<String>,
        section: &str,
        identifier: &str,
        field: &str,
        sub_component: Option<&str>,
    ) -> Ace3pResult<()> {
        let path = match section {
            SECTION_ROVER_Q => {
                let field = RoverQField::from_name(field).ok_or_else(|| {
                    Ace3pError::unknown_output_path(
                        "EXTRACT.ROVERQ_FIELD",
                        format!("'{}' is not a RoverQ output field", field),
                    )
                })?;
                ExtractionPath::RoverQ {
                    mode_id: identifier.to_string(),
                    field,
                }
            }
            SECTION_MAX_FIELDS => ExtractionPath::MaxFields {
                surface_id: identifier.to_string(),
                field: surface_field(field, sub_component)?,
            },
            other => {
                return Err(Ace3pError::unknown_output_path(
                    "EXTRACT.SECTION",
                    format!("'{}' is not a supported output section", other),
                ));
            }
        };
        self.columns.push((column.into(), path));
        Ok(())
    }

    /// Output sections the post-processing stage must parse.
    pub fn required_sections(&self) -> Vec<&'static str> {
        let mut sections = Vec::new();
        for (_, path) in &self.columns {
            let section = match path {
                ExtractionPath::RoverQ { .. } => SECTION_ROVER_Q,
                ExtractionPath::MaxFields { .. } => SECTION_MAX_FIELDS,
            };
            if !sections.contains(&section) {
                sections.push(section);
            }
        }
        sections
    }

    /// Resolves every column against a parsed output. Identifiers the run
    /// never produced extract as `None`.
    pub fn extract(&self, output: &RfPostOutput) -> BTreeMap<String, Option<f64>> {
        self.columns
            .iter()
            .map(|(name, path)| (name.clone(), resolve(path, output)))
            .collect()
    }

    /// Every column marked absent, for runs whose pipeline failed before
    /// post-processing.
    pub fn absent(&self) -> BTreeMap<String, Option<f64>> {
        self.columns
            .iter()
            .map(|(name, _)| (name.clone(), None))
            .collect()
    }
}

fn surface_field(field: &str, sub_component: Option<&str>) -> Ace3pResult<SurfaceField> {
    let component = |sub: Option<&str>| -> Ace3pResult<LocationComponent> {
        let sub = sub.ok_or_else(|| {
            Ace3pError::unknown_output_path(
                "EXTRACT.LOCATION_COMPONENT",
                format!("location field '{}' needs a sub-component (x, y, or z)", field),
            )
        })?;
        LocationComponent::from_name(sub).ok_or_else(|| {
            Ace3pError::unknown_output_path(
                "EXTRACT.LOCATION_COMPONENT",
                format!("'{}' is not a location component", sub),
            )
        })
    };
    match field {
        "Emax" => Ok(SurfaceField::EMax),
        "Hmax" => Ok(SurfaceField::HMax),
        "Emax_location" => Ok(SurfaceField::EMaxLocation(component(sub_component)?)),
        "Hmax_location" => Ok(SurfaceField::HMaxLocation(component(sub_component)?)),
        other => Err(Ace3pError::unknown_output_path(
            "EXTRACT.MAXFIELDS_FIELD",
            format!("'{}' is not a maxFieldsOnSurface output field", other),
        )),
    }
}

fn resolve(path: &ExtractionPath, output: &RfPostOutput) -> Option<f64> {
    match path {
        ExtractionPath::RoverQ { mode_id, field } => output
            .mode(mode_id)
            .and_then(|mode| mode.field(field.as_str())),
        ExtractionPath::MaxFields { surface_id, field } => {
            let group = output.first_for_surface(surface_id)?;
            Some(match field {
                SurfaceField::EMax => group.e_max,
                SurfaceField::HMax => group.h_max,
                SurfaceField::EMaxLocation(LocationComponent(index)) => {
                    group.e_max_location[*index]
                }
                SurfaceField::HMaxLocation(LocationComponent(index)) => {
                    group.h_max_location[*index]
                }
            })
        }
    }
}
