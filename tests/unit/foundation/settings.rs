use super::*;

#[test]
fn defaults_are_valid() {
    let s = EngineSettings::default();
    s.validate().unwrap();
    assert_eq!(s.fps.num, 24);
    assert!(s.loop_mode);
    assert_eq!(s.fps_refresh_interval, 24);
}

#[test]
fn partial_json_keeps_defaults() {
    let json = r#"{ "max_disk_cache_bytes": 1048576, "loop_mode": false, "worker_threads": 2 }"#;
    let s = EngineSettings::from_reader(json.as_bytes()).unwrap();
    assert_eq!(s.max_disk_cache_bytes, 1_048_576);
    assert!(!s.loop_mode);
    assert_eq!(s.worker_threads, Some(2));
    assert_eq!(s.decode_buffer_capacity, EngineSettings::default().decode_buffer_capacity);
}

#[test]
fn invalid_values_are_rejected() {
    let err = EngineSettings::from_reader(r#"{ "decode_buffer_capacity": 0 }"#.as_bytes())
        .unwrap_err();
    assert!(err.to_string().contains("decode_buffer_capacity"));

    let err = EngineSettings::from_reader(r#"{ "worker_threads": 0 }"#.as_bytes()).unwrap_err();
    assert!(err.to_string().contains("worker_threads"));

    let err =
        EngineSettings::from_reader(r#"{ "fps": { "num": 24, "den": 0 } }"#.as_bytes()).unwrap_err();
    assert!(err.to_string().contains("den"));
}

#[test]
fn unknown_keys_and_bad_json_fail_as_serde() {
    let err = EngineSettings::from_reader(r#"{ "frobnicate": 1 }"#.as_bytes()).unwrap_err();
    assert!(matches!(err, PlayheadError::Serde(_)));

    let err = EngineSettings::from_reader("not json".as_bytes()).unwrap_err();
    assert!(matches!(err, PlayheadError::Serde(_)));
}

#[test]
fn missing_file_reports_path() {
    let err = EngineSettings::from_path("/definitely/not/here.json").unwrap_err();
    assert!(err.to_string().contains("/definitely/not/here.json"));
}
