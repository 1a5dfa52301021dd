use serde_json::json;

use crate::errors::ParserError;
use crate::model::{DataFormat, IndexedValue, RowFormat};
use crate::{detect_format, parse_bulk_payload_str, parse_payload_str};

const META: &str = r#"
    "meta": {
        "channels": [
            { "index": 0, "code": "Time", "uom": "unitless", "dimension": "time" },
            { "index": 1, "code": "AirPressure", "uom": "kPa", "dimension": "pressure" },
            { "index": 2, "code": "DischargeRate", "uom": "m3/sec", "dimension": "flow" }
        ]
    }"#;

fn payload(rows: &str) -> String {
    format!("{{ {META}, \"rows\": {rows} }}")
}

#[test]
fn parses_implicit_rows() {
    let parsed = parse_payload_str(&payload(
        r#"[["2019-08-12T00:00:00Z", 101.3, 0.5], ["2019-08-12T00:00:01Z", 101.4, null]]"#,
    ))
    .expect("implicit payload should parse");

    assert_eq!(parsed.channels.len(), 3);
    assert_eq!(parsed.channels[1].code, "AirPressure");
    assert_eq!(parsed.channels[1].unit, "kPa");
    assert!(parsed.channels[0].is_time());
    assert_eq!(parsed.rows.data_format(), DataFormat::Implicit);
    assert_eq!(parsed.rows.equipment_id, None);

    match parsed.rows.rows {
        RowFormat::Implicit(rows) => {
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0][1], json!(101.3));
            assert!(rows[1][2].is_null());
        }
        RowFormat::Explicit(_) => panic!("expected implicit rows"),
    }
}

#[test]
fn parses_explicit_rows() {
    let parsed = parse_payload_str(&payload(
        r#"[[[0, "2019-08-12T00:00:00Z"], [2, 0.5]], [[0, "2019-08-12T00:00:01Z"], [1, 99.0]]]"#,
    ))
    .expect("explicit payload should parse");

    assert_eq!(parsed.rows.data_format(), DataFormat::Explicit);
    match parsed.rows.rows {
        RowFormat::Explicit(rows) => {
            assert_eq!(rows[0].len(), 2);
            assert_eq!(
                rows[0][1],
                IndexedValue {
                    index: 2,
                    value: json!(0.5)
                }
            );
        }
        RowFormat::Implicit(_) => panic!("expected explicit rows"),
    }
}

#[test]
fn empty_rows_default_to_implicit() {
    let parsed = parse_payload_str(&payload("[]")).expect("empty rows parse");
    assert_eq!(parsed.rows.data_format(), DataFormat::Implicit);
    assert!(parsed.rows.rows.is_empty());

    let rows = [json!([]), json!([[1, 2.0]])];
    assert_eq!(detect_format(&rows).unwrap(), DataFormat::Explicit);
}

#[test]
fn rejects_rows_that_switch_format() {
    let err = parse_payload_str(&payload(
        r#"[["2019-08-12T00:00:00Z", 1.0, 2.0], [[0, "2019-08-12T00:00:01Z"], [1, 2.0]]]"#,
    ))
    .expect_err("mixed formats must be rejected");

    match err {
        ParserError::MalformedRow { row_index, .. } => assert_eq!(row_index, 1),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn rejects_explicit_pair_with_bad_index() {
    let err = parse_payload_str(&payload(r#"[[[0, "2019-08-12T00:00:00Z"], [-1, 2.0]]]"#))
        .expect_err("negative index must be rejected");
    assert!(err.to_string().contains("not a non-negative integer"));

    let err = parse_payload_str(&payload(r#"[[[0, "2019-08-12T00:00:00Z", 3]]]"#))
        .expect_err("triples must be rejected");
    assert!(err.to_string().contains("3 items"));
}

#[test]
fn rejects_non_array_row() {
    let err = parse_payload_str(&payload(r#"[{"time": 1}]"#)).expect_err("object row");
    assert!(matches!(err, ParserError::MalformedRow { row_index: 0, .. }));
}

#[test]
fn channel_index_defaults_to_position() {
    let parsed = parse_payload_str(
        r#"{ "meta": { "channels": [
                { "code": "Time", "uom": "unitless", "dimension": "time" },
                { "code": " AirPressure ", "uom": " kPa ", "dimension": "pressure" }
            ] }, "rows": [] }"#,
    )
    .unwrap();

    assert_eq!(parsed.channels[0].index, 0);
    assert_eq!(parsed.channels[1].index, 1);
    assert_eq!(parsed.channels[1].code, "AirPressure");
    assert_eq!(parsed.channels[1].unit, "kPa");
}

#[test]
fn rejects_duplicate_channel_index_and_empty_code() {
    let err = parse_payload_str(
        r#"{ "meta": { "channels": [
                { "index": 1, "code": "Time" },
                { "index": 1, "code": "AirPressure" }
            ] } }"#,
    )
    .unwrap_err();
    assert!(matches!(err, ParserError::DuplicateChannelIndex { index: 1, .. }));

    let err = parse_payload_str(r#"{ "meta": { "channels": [ { "code": "  " } ] } }"#).unwrap_err();
    assert!(matches!(err, ParserError::EmptyChannelCode { position: 0 }));
}

#[test]
fn duplicate_code_is_reported_before_index_collision() {
    let err = parse_payload_str(
        r#"{ "meta": { "channels": [
                { "index": 0, "code": "time" },
                { "index": 1, "code": "AirPressure" },
                { "index": 1, "code": "airpressure" }
            ] } }"#,
    )
    .unwrap_err();
    assert!(matches!(err, ParserError::DuplicateChannel { ref code } if code == "airpressure"));
    assert!(err.to_string().contains("duplicate channel"));
}

#[test]
fn rejects_invalid_json() {
    let err = parse_payload_str("{ not json").unwrap_err();
    assert!(matches!(err, ParserError::Json(_)));
}

#[test]
fn bulk_payload_threads_equipment_ids() {
    let content = format!(
        r#"{{ {META}, "equipments": [
            {{ "equipmentId": "100196736:SBF62412A0281", "rows": [["2019-08-12T00:00:00Z", 1.0, 2.0]] }},
            {{ "equipmentId": "100196736:SBF62412A0282", "rows": [] }}
        ] }}"#
    );
    let parsed = parse_bulk_payload_str(&content).expect("bulk payload should parse");

    assert_eq!(parsed.format, DataFormat::Implicit);
    assert_eq!(parsed.equipments.len(), 2);
    assert_eq!(
        parsed.equipments[0].equipment_id.as_deref(),
        Some("100196736:SBF62412A0281")
    );
    assert_eq!(parsed.equipments[0].rows.len(), 1);
    assert!(parsed.equipments[1].rows.is_empty());
}

#[test]
fn bulk_payload_format_is_decided_once() {
    let content = format!(
        r#"{{ {META}, "equipments": [
            {{ "equipmentId": "A:1", "rows": [["2019-08-12T00:00:00Z", 1.0, 2.0]] }},
            {{ "equipmentId": "A:2", "rows": [[[0, "2019-08-12T00:00:00Z"], [1, 2.0]]] }}
        ] }}"#
    );
    let err = parse_bulk_payload_str(&content).expect_err("mixed bulk formats");
    match err {
        ParserError::Equipment { equipment_id, .. } => assert_eq!(equipment_id, "A:2"),
        other => panic!("unexpected error: {other}"),
    }
}
