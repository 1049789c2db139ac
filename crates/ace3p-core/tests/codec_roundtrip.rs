use ace3p_core::codec::{ace3p, Journal, RfPostInput};
use ace3p_core::domain::ParamValue;

const COUPLER_DECK: &str = "\
ModelInfo : {
  File : ./coupler.ncdf
}

FiniteElement : {
  Order : 2
  CurvedSurfaces : on
}

SurfaceMaterial : {
  ReferenceNumber : 6
  Sigma : 5.8e7, 4.5e7   // two-layer coating
}

SurfaceMaterial : {
  ReferenceNumber : 7
  Sigma : 5.8e7
}
";

#[test]
fn deck_round_trip_preserves_structure_tags_and_commas() {
    let document = ace3p::parse(COUPLER_DECK).expect("deck parses");
    let rendered = ace3p::serialize(&document);
    let reparsed = ace3p::parse(&rendered).expect("rendered deck reparses");
    assert_eq!(document, reparsed);

    let coated = reparsed
        .block("SurfaceMaterial")
        .expect("first occurrence reachable by key");
    assert_eq!(coated.scalar("ReferenceNumber"), Some("6"));
    assert_eq!(coated.scalar("Sigma"), Some("5.8e7, 4.5e7"));

    let bare = reparsed
        .get_tagged("SurfaceMaterial", "7")
        .and_then(|value| value.as_block())
        .expect("tagged duplicate reachable");
    assert_eq!(bare.scalar("Sigma"), Some("5.8e7"));
    assert!(!bare.contains_key("ReferenceNumber"));
}

#[test]
fn journal_edit_touches_only_the_declared_line() {
    let source = "## pillbox cavity\n\
#{radius=80}\n\
#{blend_radius=2.5}\n\
create cylinder radius {radius}\n\
export genesis \"pillbox.gen\" overwrite\n";
    let mut journal = Journal::parse(source);
    assert_eq!(journal.serialize(), source);

    journal.set_value("radius", &ParamValue::Number(95.0));
    let edited = journal.serialize();
    let before: Vec<&str> = source.lines().collect();
    let after: Vec<&str> = edited.lines().collect();
    assert_eq!(after[1], "#{radius=95}");
    for index in [0, 2, 3, 4] {
        assert_eq!(after[index], before[index]);
    }
}

#[test]
fn rfpost_input_round_trips_and_gates_on_ionoff() {
    let source = "RoverQ\n\
{\n\
   ionoff = 1\n\
   modeID = 0\n\
}\n\
\n\
maxFieldsOnSurface\n\
{\n\
   ionoff = 0\n\
   surfaceID = 6\n\
}\n";
    let input = RfPostInput::parse(source).expect("input parses");
    assert_eq!(input.enabled_sections(), vec!["RoverQ"]);

    let reparsed = RfPostInput::parse(&input.serialize()).expect("rendered input reparses");
    assert_eq!(input, reparsed);
}
