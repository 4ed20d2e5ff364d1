use discovery_engine::discovery::export::{read_json, write_records, CSV_BODY_LIMIT};
use discovery_engine::{ApiRecord, CapturedExchange, ExportFormat, ResourceType};
use tempfile::TempDir;
use tokio_test::assert_ok;

fn sample_records() -> Vec<ApiRecord> {
    vec![
        ApiRecord::from_exchange(
            CapturedExchange::new("GET", "http://app.test/api/items?page=2", ResourceType::Xhr, 200)
                .with_request_header("Accept", "application/json")
                .with_response_header("Content-Type", "application/json; charset=utf-8")
                .with_response_body(br#"{"items":[1,2,3]}"#.to_vec()),
        ),
        ApiRecord::from_exchange(
            CapturedExchange::new("POST", "http://app.test/api/upload", ResourceType::Fetch, 201)
                .with_request_body("name=a,b")
                .with_response_header("Content-Type", "application/octet-stream")
                .with_response_body(vec![0u8, 159, 146, 150, 255]),
        ),
        ApiRecord::from_exchange(
            CapturedExchange::new("DELETE", "http://app.test/api/items/1", ResourceType::Fetch, 204),
        ),
    ]
}

#[test]
fn test_json_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("apis.json");
    let records = sample_records();

    assert_eq!(assert_ok!(write_records(&path, &records)), ExportFormat::Json);
    let restored = assert_ok!(read_json(&path));

    assert_eq!(restored.len(), 3);
    assert_eq!(restored[0], records[0]);
    assert_eq!(restored[1].response_body, records[1].response_body);
    assert_eq!(restored[1].request_body.as_deref(), Some(b"name=a,b".as_slice()));
    assert!(restored[1].snippet.starts_with("[Binary Data (application/octet-stream)"));
    assert_eq!(restored[2].response_body, None);
    assert_eq!(restored[2].snippet, "[No Response Body Captured]");
}

#[test]
fn test_json_keeps_field_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("apis.json");
    write_records(&path, &sample_records()[..1]).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let method = text.find("\"method\"").unwrap();
    let url = text.find("\"url\"").unwrap();
    let body = text.find("\"raw_response_body_bytes\"").unwrap();
    assert!(method < url && url < body);
}

#[test]
fn test_csv_file_export() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("apis.csv");
    let mut records = sample_records();
    records.push(ApiRecord::from_exchange(
        CapturedExchange::new("GET", "http://app.test/api/large", ResourceType::Fetch, 200)
            .with_response_header("content-type", "application/json")
            .with_response_body(vec![b'x'; CSV_BODY_LIMIT * 2]),
    ));

    assert_eq!(write_records(&path, &records).unwrap(), ExportFormat::Csv);
    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.split("\r\n").filter(|line| !line.is_empty()).collect();

    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("\"method\",\"status\""));
    assert!(lines[2].contains("\"name=a,b\""));
    assert!(lines[3].ends_with("\"\",\"\""));
    assert!(lines[4].ends_with("...(truncated)\""));
}
