use anyhow::Result;
use httpmock::prelude::*;
use london_ev_etl::domain::model::{ExclusionReason, MalformedReason};
use london_ev_etl::utils::validation::Validate;
use london_ev_etl::{EtlError, FileSink, LocalStorage, Source, TomlConfig};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn google_body() -> serde_json::Value {
    serde_json::json!({
        "status": "OK",
        "results": [
            {
                "place_id": "g1",
                "name": "Tesco EV Charger",
                "vicinity": "Cromwell Rd, London",
                "geometry": {"location": {"lat": 51.5, "lng": -0.1}},
                "types": ["electric_vehicle_charging_station", "point_of_interest"],
                "rating": 4.2
            },
            {
                "place_id": "g2",
                "name": "Joe's Cafe",
                "vicinity": "High St, London",
                "geometry": {"location": {"lat": 51.51, "lng": -0.12}},
                "types": ["cafe"]
            }
        ]
    })
}

fn ocm_body() -> serde_json::Value {
    serde_json::json!([
        {
            "ID": 1,
            "AddressInfo": {
                "Title": "Tesco Extra",
                "AddressLine1": "Cromwell Road",
                "Town": "London",
                "Postcode": "W8 6LX",
                "Latitude": 51.50005,
                "Longitude": -0.10005
            },
            "OperatorInfo": {"Title": "Pod Point"},
            "UsageType": {"Title": "Public"},
            "StatusType": {"Title": "Operational"},
            "Connections": [
                {
                    "ConnectionType": {"Title": "Type 2 (Socket Only)"},
                    "PowerKW": 7.0,
                    "CurrentType": {"Title": "AC (Single-Phase)"},
                    "Quantity": 2
                },
                {
                    "ConnectionType": {"Title": "CCS (Type 2)"},
                    "PowerKW": 50.0,
                    "CurrentType": {"Title": "DC"},
                    "Quantity": 1
                }
            ]
        },
        {
            "ID": 2,
            "AddressInfo": {"Title": "Milton Keynes Depot", "Latitude": 52.0, "Longitude": -0.1},
            "OperatorInfo": {"Title": "(Unknown Operator)"}
        },
        {
            "ID": 3,
            "AddressInfo": {"Title": "No coordinates"}
        }
    ])
}

fn load_config(server: &MockServer, output_path: &str, enabled: &str, load_extra: &str) -> TomlConfig {
    let toml = format!(
        r#"
[bounding_box]
min_lat = 51.49
max_lat = 51.52
min_lon = -0.15
max_lon = -0.05

[sources]
enabled = [{enabled}]

[sources.google_places]
api_key = "test-google-key"
nearby_url = "{nearby}"
details_url = "{details}"
grid_step_deg = 1.0
page_token_delay_ms = 0
fetch_details = false

[sources.open_charge_map]
api_key = "test-ocm-key"
endpoint = "{ocm}"
grid_step_deg = 1.0

[http]
timeout_seconds = 5
retry_attempts = 1
retry_delay_ms = 1
source_timeout_seconds = 10

[load]
output_path = "{output_path}"
output_formats = ["csv", "json"]
{load_extra}
"#,
        enabled = enabled,
        nearby = server.url("/nearby"),
        details = server.url("/details"),
        ocm = server.url("/poi"),
        output_path = output_path,
        load_extra = load_extra,
    );
    let config = TomlConfig::from_toml_str(&toml).unwrap();
    config.validate().unwrap();
    config
}

fn both_sources() -> &'static str {
    r#""google_places", "open_charge_map""#
}

fn find_output(dir: &Path, extension: &str) -> Option<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .find(|path| {
            path.extension().and_then(|e| e.to_str()) == Some(extension)
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("ev_chargers_"))
        })
}

#[tokio::test]
async fn test_end_to_end_run_with_both_sources() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let server = MockServer::start();
    let google_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/nearby")
            .query_param("key", "test-google-key");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(google_body());
    });
    let ocm_mock = server.mock(|when, then| {
        when.method(GET).path("/poi").query_param("key", "test-ocm-key");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(ocm_body());
    });

    let config = load_config(&server, &output_path, both_sources(), "");
    let storage = LocalStorage::new(output_path.clone());
    let sink = FileSink::new(storage, config.sink_options().unwrap());
    let engine = config.build_engine(Arc::new(sink)).unwrap();

    let output = engine
        .run(&config.bounding_box(), &config.enabled_sources().unwrap())
        .await
        .unwrap();

    google_mock.assert();
    ocm_mock.assert();

    let report = &output.report;
    assert_eq!(report.fetched_from(Source::GooglePlaces), 1);
    assert_eq!(report.fetched_from(Source::OpenChargeMap), 2);
    assert_eq!(
        report.malformed[&Source::GooglePlaces][&MalformedReason::NotACharger],
        1
    );
    assert_eq!(report.malformed_total(Source::OpenChargeMap), 1);
    assert_eq!(report.matched_pairs, 1);
    assert_eq!(report.merged_points, 2);
    assert_eq!(report.excluded_for(ExclusionReason::OutOfBounds), 1);
    assert_eq!(report.output_rows, 1);
    assert!(!report.is_degraded());

    // CSV
    let csv_path = find_output(temp_dir.path(), "csv").expect("csv output written");
    assert_eq!(output.output_path, csv_path.display().to_string());
    let mut reader = csv::Reader::from_path(&csv_path).unwrap();
    let rows: Vec<HashMap<String, String>> =
        reader.deserialize().collect::<std::result::Result<_, _>>().unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row["google_id"], "g1");
    assert_eq!(row["ocm_id"], "1");
    assert_eq!(row["name"], "Tesco EV Charger");
    assert_eq!(row["latitude"], "51.5");
    assert_eq!(row["operator"], "Pod Point");
    assert_eq!(row["status"], "Operational");
    assert_eq!(row["phone"], "");
    assert_eq!(row["number_of_connectors"], "2");
    assert_eq!(row["total_connector_quantity"], "3");
    assert_eq!(row["max_charging_speed"], "Rapid");
    assert_eq!(row["sources"], "google_places; open_charge_map");
    assert!(row["provenance"].contains("name=google_places"));
    assert!(row["provenance"].contains("operator=open_charge_map"));

    // JSON and run report
    let json_path = find_output(temp_dir.path(), "json").expect("json output written");
    let points: serde_json::Value =
        serde_json::from_slice(&std::fs::read(json_path).unwrap()).unwrap();
    assert_eq!(points.as_array().unwrap().len(), 1);
    assert!(points[0]["point"]["match_confidence"].as_f64().unwrap() > 0.5);

    let report_json: serde_json::Value = serde_json::from_slice(
        &std::fs::read(temp_dir.path().join("run_report.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report_json["output_rows"], 1);
    assert_eq!(report_json["excluded"]["OUT_OF_BOUNDS"], 1);
}

#[tokio::test]
async fn test_degraded_run_when_google_denies_requests() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/nearby");
        then.status(200).json_body(serde_json::json!({
            "status": "REQUEST_DENIED",
            "error_message": "The provided API key is invalid."
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/poi");
        then.status(200).json_body(ocm_body());
    });

    let config = load_config(&server, &output_path, both_sources(), "");
    let sink = FileSink::new(
        LocalStorage::new(output_path.clone()),
        config.sink_options().unwrap(),
    );
    let engine = config.build_engine(Arc::new(sink)).unwrap();

    let output = engine
        .run(&config.bounding_box(), &config.enabled_sources().unwrap())
        .await
        .unwrap();

    assert!(output.report.is_degraded());
    assert!(output.report.unavailable[&Source::GooglePlaces].contains("REQUEST_DENIED"));
    assert_eq!(output.points.len(), 1);

    let point = &output.points[0].point;
    assert_eq!(point.ocm_id.as_deref(), Some("1"));
    assert!(point.google_id.is_none());
    assert!(point.match_confidence.is_none());
    assert!(point
        .provenance
        .values()
        .all(|source| *source == Source::OpenChargeMap));
    assert!(find_output(temp_dir.path(), "csv").is_some());
}

#[tokio::test]
async fn test_all_sources_failing_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/nearby");
        then.status(503);
    });
    server.mock(|when, then| {
        when.method(GET).path("/poi");
        then.status(500);
    });

    let config = load_config(&server, &output_path, both_sources(), "");
    let sink = FileSink::new(
        LocalStorage::new(output_path.clone()),
        config.sink_options().unwrap(),
    );
    let engine = config.build_engine(Arc::new(sink)).unwrap();

    let err = engine
        .run(&config.bounding_box(), &config.enabled_sources().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::AllSourcesUnavailable));
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_ocm_only_run_never_calls_google() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let server = MockServer::start();
    let google_mock = server.mock(|when, then| {
        when.method(GET).path("/nearby");
        then.status(200).json_body(google_body());
    });
    server.mock(|when, then| {
        when.method(GET).path("/poi");
        then.status(200).json_body(ocm_body());
    });

    let config = load_config(&server, &output_path, r#""ocm""#, "");
    let sink = FileSink::new(
        LocalStorage::new(output_path.clone()),
        config.sink_options().unwrap(),
    );
    let engine = config.build_engine(Arc::new(sink)).unwrap();

    let output = engine
        .run(&config.bounding_box(), &config.enabled_sources().unwrap())
        .await
        .unwrap();

    google_mock.assert_hits(0);
    assert_eq!(output.report.matched_pairs, 0);
    assert_eq!(output.points.len(), 1);
    assert!(output.points[0].point.match_confidence.is_none());
}

#[tokio::test]
async fn test_compressed_output_archive() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_string_lossy().to_string();

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/poi");
        then.status(200).json_body(ocm_body());
    });

    let config = load_config(
        &server,
        &output_path,
        r#""open_charge_map""#,
        "\n[load.compression]\nenabled = true\nfilename = \"ev_chargers.zip\"\n",
    );
    let sink = FileSink::new(LocalStorage::new(output_path.clone()), config.sink_options()?);
    let engine = config.build_engine(Arc::new(sink))?;

    let output = engine
        .run(&config.bounding_box(), &config.enabled_sources()?)
        .await?;

    assert!(output.output_path.ends_with("ev_chargers.zip"));
    let zip_data = std::fs::read(temp_dir.path().join("ev_chargers.zip"))?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data))?;
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    assert_eq!(names.len(), 3);
    assert!(names.iter().any(|n| n.ends_with(".csv")));
    assert!(names.iter().any(|n| n == "run_report.json"));

    let report: serde_json::Value =
        serde_json::from_reader(archive.by_name("run_report.json")?)?;
    assert_eq!(report["output_rows"], 1);
    assert!(report["enabled_sources"]
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("enabled_sources is not an array"))?
        .iter()
        .all(|s| s == "open_charge_map"));
    Ok(())
}

#[tokio::test]
async fn test_dry_run_plan_rejects_missing_section() -> Result<()> {
    let server = MockServer::start();
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_string_lossy().to_string();

    let mut config = load_config(&server, &output_path, r#""open_charge_map""#, "");
    config.sources.google_places = None;
    let sink = FileSink::new(LocalStorage::new(output_path), config.sink_options()?);
    let engine = config.build_engine(Arc::new(sink))?;

    let planned = engine.plan(&config.bounding_box(), &config.enabled_sources()?)?;
    assert_eq!(planned.len(), 1);
    assert_eq!(planned[0].source(), Source::OpenChargeMap);

    let both = [Source::GooglePlaces, Source::OpenChargeMap].into_iter().collect();
    assert!(matches!(
        engine.plan(&config.bounding_box(), &both),
        Err(EtlError::MissingConfigError { .. })
    ));
    Ok(())
}
