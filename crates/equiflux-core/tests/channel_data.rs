mod common;

use equiflux_core::interfaces::Series;
use equiflux_core::{
    parse_timestamp, Aggregation, ErrorKind, FieldValue, MathFunction, MathRequest, ReadRequest,
    ServiceError, TimePeriod,
};
use equiflux_parser::{BulkChannelPayload, ChannelPayload};
use serde_json::json;

use common::{enabled_mapping, harness, BLENDER, BRAND, ORPHAN, PUMP, TECHNOLOGY, UNMAPPED};

fn payload(rows: serde_json::Value) -> ChannelPayload {
    serde_json::from_value(json!({
        "meta": { "channels": [
            { "code": "time", "uom": "unitless", "dimension": "time" },
            { "code": "AirPressure", "uom": "kPa", "dimension": "pressure" }
        ]},
        "rows": rows
    }))
    .unwrap()
}

fn bulk(equipments: &[&str]) -> BulkChannelPayload {
    let groups: Vec<_> = equipments
        .iter()
        .map(|id| {
            json!({
                "equipmentId": id,
                "rows": [["2019-08-12T00:00:00Z", 100.0], ["2019-08-12T00:00:01Z", 101.0]]
            })
        })
        .collect();
    serde_json::from_value(json!({
        "meta": { "channels": [
            { "code": "time", "uom": "unitless", "dimension": "time" },
            { "code": "AirPressure", "uom": "kPa", "dimension": "pressure" }
        ]},
        "equipments": groups
    }))
    .unwrap()
}

#[tokio::test]
async fn write_channels_writes_mapped_rows() {
    let h = harness(vec![enabled_mapping(&["EQ-BLENDER"])]);

    let summary = h
        .service
        .write_channels(BLENDER, &payload(json!([["2019-08-12T00:00:00Z", 101.3]])))
        .await
        .unwrap();
    assert_eq!(summary.rows_written, 1);

    let writes = h.historian.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].equipment_instance, BLENDER);
    assert_eq!(writes[0].path.technology, TECHNOLOGY);
    assert_eq!(writes[0].path.brand, BRAND);
    assert_eq!(
        writes[0].rows[0].fields.get("AirPressure.kPa"),
        Some(&FieldValue::Float(101.3))
    );
}

#[tokio::test]
async fn write_to_unmapped_equipment_fails_inactive() {
    let h = harness(vec![]);

    let err = h
        .service
        .write_channels(UNMAPPED, &payload(json!([["2019-08-12T00:00:00Z", 1.0]])))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "INACTIVE_MAPPING");
    assert!(err.to_string().contains(UNMAPPED));
    assert!(err.to_string().contains("EQ-NEW"));
    assert!(h.historian.writes().is_empty());
    assert_eq!(h.mappings.snapshot().len(), 1);
}

#[tokio::test]
async fn invalid_payload_never_provisions() {
    let h = harness(vec![]);

    let err = h
        .service
        .write_channels(UNMAPPED, &payload(json!([["2019-08-12T00:00:00Z"]])))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::RowLengthMismatch { .. }));
    assert!(h.mappings.snapshot().is_empty());
}

#[tokio::test]
async fn empty_payload_writes_nothing_and_never_provisions() {
    let h = harness(vec![]);

    let summary = h
        .service
        .write_channels(UNMAPPED, &payload(json!([])))
        .await
        .unwrap();

    assert_eq!(summary.rows_written, 0);
    assert!(summary.path.is_none());
    assert!(h.historian.writes().is_empty());
    assert!(h.mappings.snapshot().is_empty());
}

#[tokio::test]
async fn bulk_write_skips_routing_for_empty_groups() {
    let h = harness(vec![enabled_mapping(&["EQ-BLENDER"])]);
    let payload: BulkChannelPayload = serde_json::from_value(json!({
        "meta": { "channels": [
            { "code": "time", "uom": "unitless", "dimension": "time" },
            { "code": "AirPressure", "uom": "kPa", "dimension": "pressure" }
        ]},
        "equipments": [
            { "equipmentId": BLENDER, "rows": [["2019-08-12T00:00:00Z", 100.0]] },
            { "equipmentId": UNMAPPED, "rows": [] }
        ]
    }))
    .unwrap();

    let summaries = h.service.bulk_write(&payload).await.unwrap();
    assert_eq!(summaries[0].rows_written, 1);
    assert_eq!(summaries[1].rows_written, 0);
    assert!(summaries[1].path.is_none());
    assert_eq!(h.historian.writes().len(), 1);
    assert_eq!(h.mappings.snapshot().len(), 1);
}

#[tokio::test]
async fn invalid_equipment_id_is_rejected_before_lookups() {
    let h = harness(vec![]);

    let err = h
        .service
        .write_channels("not-an-id", &payload(json!([])))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::InvalidEquipmentId(_)));
    assert_eq!(h.hierarchy.equipment_count(), 0);
}

#[tokio::test]
async fn unknown_equipment_is_not_found() {
    let h = harness(vec![]);

    let err = h
        .service
        .write_channels("999:MISSING", &payload(json!([])))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn historian_write_failure_is_a_server_error() {
    let h = harness(vec![enabled_mapping(&["EQ-BLENDER"])]);
    *h.historian.fail_writes.lock().unwrap() = true;

    let err = h
        .service
        .write_channels(BLENDER, &payload(json!([["2019-08-12T00:00:00Z", 1.0]])))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);
}

#[tokio::test]
async fn bulk_write_commits_every_equipment() {
    let h = harness(vec![enabled_mapping(&["EQ-BLENDER", "EQ-PUMP"])]);

    let summaries = h.service.bulk_write(&bulk(&[BLENDER, PUMP])).await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().all(|summary| summary.rows_written == 2));

    let writes = h.historian.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].equipment_instance, BLENDER);
    assert_eq!(writes[1].equipment_instance, PUMP);
    assert_eq!(writes[1].path.equipment_code, "EQ-PUMP");
}

#[tokio::test]
async fn bulk_write_is_all_or_nothing_on_path_failure() {
    let h = harness(vec![enabled_mapping(&["EQ-BLENDER", "EQ-PUMP"])]);

    let err = h
        .service
        .bulk_write(&bulk(&[BLENDER, ORPHAN, PUMP]))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::NoStoragePath { ref wkeid } if wkeid == ORPHAN));
    assert!(h.historian.writes().is_empty());
}

#[tokio::test]
async fn bulk_write_is_all_or_nothing_on_unknown_equipment() {
    let h = harness(vec![enabled_mapping(&["EQ-BLENDER", "EQ-PUMP"])]);

    let err = h
        .service
        .bulk_write(&bulk(&[BLENDER, "999:MISSING", PUMP]))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::EquipmentNotFound { .. }));
    assert!(h.historian.writes().is_empty());
    assert_eq!(h.hierarchy.equipment_count(), 2);
}

#[tokio::test]
async fn bulk_write_rejects_inactive_mapping_without_writing() {
    let h = harness(vec![enabled_mapping(&["EQ-BLENDER", "EQ-PUMP"])]);

    let err = h
        .service
        .bulk_write(&bulk(&[BLENDER, PUMP, UNMAPPED]))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::InactiveMapping { .. }));
    assert!(h.historian.writes().is_empty());
}

#[tokio::test]
async fn read_uses_trailing_window_before_latest_point() {
    let h = harness(vec![enabled_mapping(&["EQ-BLENDER"])]);
    h.historian
        .set_latest(Some(parse_timestamp("2019-08-14T00:00:00Z").unwrap()));
    h.historian.set_field_keys(&["AirPressure.kPa", "PumpState"]);

    let response = h
        .service
        .read_channels(&ReadRequest::new(BLENDER, ["AirPressure", "DischargeRate"]))
        .await
        .unwrap();
    assert_eq!(
        response.period,
        Some(TimePeriod::parse("2019-08-13", "2019-08-14").unwrap())
    );

    let queries = h.historian.queries();
    assert_eq!(queries.len(), 3);
    assert!(queries[0].ends_with("ORDER BY time DESC LIMIT 1"));
    assert!(queries[1].starts_with("SHOW FIELD KEYS"));
    assert_eq!(
        queries[2],
        "SELECT \"AirPressure.kPa\" FROM \"WS-63_STIMULATION_BLENDER_PROP\" \
         WHERE EquipmentInstance='100196736:SBF62412A0281' \
         AND time >= 1565654400000000000 AND time <= 1565740800000000000"
    );
}

#[tokio::test]
async fn read_without_data_is_empty() {
    let h = harness(vec![enabled_mapping(&["EQ-BLENDER"])]);

    let response = h
        .service
        .read_channels(&ReadRequest::new(BLENDER, ["AirPressure"]))
        .await
        .unwrap();

    assert!(response.is_empty());
    assert!(response.period.is_none());
    assert_eq!(h.historian.queries().len(), 1);
}

#[tokio::test]
async fn read_for_equipment_without_path_is_empty() {
    let h = harness(vec![]);

    let response = h
        .service
        .read_channels(&ReadRequest::new(ORPHAN, ["AirPressure"]))
        .await
        .unwrap();

    assert!(response.path.is_none());
    assert!(h.historian.queries().is_empty());
}

#[tokio::test]
async fn read_with_unknown_channel_is_not_found() {
    let h = harness(vec![enabled_mapping(&["EQ-BLENDER"])]);

    let err = h
        .service
        .read_channels(&ReadRequest::new(BLENDER, ["Ghost"]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn read_skips_the_query_when_no_requested_field_exists() {
    let h = harness(vec![enabled_mapping(&["EQ-BLENDER"])]);
    h.historian.set_field_keys(&["PumpState"]);

    let request = ReadRequest {
        period: Some(TimePeriod::parse("2019-08-12", "2019-08-14").unwrap()),
        ..ReadRequest::new(BLENDER, ["AirPressure"])
    };
    let response = h.service.read_channels(&request).await.unwrap();

    assert!(response.is_empty());
    assert_eq!(h.historian.queries().len(), 1);
}

#[tokio::test]
async fn aggregated_read_decodes_columns() {
    let h = harness(vec![enabled_mapping(&["EQ-BLENDER"])]);
    h.historian.set_field_keys(&["AirPressure.kPa", "DischargeRate.m3/sec"]);
    h.historian.set_series(vec![Series {
        name: BRAND.to_string(),
        columns: vec!["time".into(), "mean_AirPressure.kPa".into()],
        values: vec![vec![json!("2019-08-12T00:00:00Z"), json!(100.5)]],
    }]);

    let request = ReadRequest {
        aggregation: Some(Aggregation::Mean),
        period: Some(TimePeriod::parse("2019-08-12", "2019-08-14").unwrap()),
        ..ReadRequest::new(BLENDER, ["AirPressure"])
    };
    let response = h.service.read_channels(&request).await.unwrap();

    let columns = &response.series[0].columns;
    assert!(columns[0].channel.is_none());
    let channel = columns[1].channel.as_ref().unwrap();
    assert_eq!(channel.code, "AirPressure");
    assert_eq!(channel.unit, "kPa");
    assert!(h.historian.queries()[1]
        .starts_with("SELECT mean(\"AirPressure.kPa\") AS \"mean_AirPressure.kPa\" FROM"));
}

#[tokio::test]
async fn math_read_renders_operator_query() {
    let h = harness(vec![enabled_mapping(&["EQ-BLENDER"])]);
    h.historian.set_field_keys(&["AirPressure.kPa", "DischargeRate.m3/sec"]);

    let request = MathRequest {
        wkeid: BLENDER.to_string(),
        left: "AirPressure".into(),
        function: MathFunction::Divide,
        right: "DischargeRate".into(),
        period: Some(TimePeriod::parse("2019-08-12", "2019-08-14").unwrap()),
    };
    h.service.read_math(&request).await.unwrap();

    let queries = h.historian.queries();
    assert!(queries[1].starts_with(
        "SELECT \"AirPressure.kPa\" / \"DischargeRate.m3/sec\" AS \"AirPressure_Divide_DischargeRate\""
    ));
}

#[tokio::test]
async fn list_fields_decodes_keys() {
    let h = harness(vec![enabled_mapping(&["EQ-BLENDER"])]);
    h.historian.set_field_keys(&["PumpState", "AirPressure.kPa", "Unknown.bar"]);

    let fields = h.service.list_fields(BLENDER).await.unwrap();
    let pairs: Vec<(String, String)> = fields.into_iter().map(|f| (f.code, f.unit)).collect();
    assert_eq!(
        pairs,
        vec![
            ("AirPressure".to_string(), "kPa".to_string()),
            ("PumpState".to_string(), "unitless".to_string()),
            ("Unknown".to_string(), "bar".to_string()),
        ]
    );
}

#[tokio::test]
async fn latest_timestamp_passes_through() {
    let h = harness(vec![enabled_mapping(&["EQ-BLENDER"])]);
    let latest = parse_timestamp("2019-08-14T06:30:00Z").unwrap();
    h.historian.set_latest(Some(latest));

    assert_eq!(h.service.latest_timestamp(BLENDER).await.unwrap(), Some(latest));
    assert_eq!(h.service.latest_timestamp(ORPHAN).await.unwrap(), None);
}
