use pricerelay::error::RelayError;

#[test]
fn error_constructors_map_to_variants() {
    assert!(matches!(RelayError::config("x"), RelayError::Config { .. }));
    assert!(matches!(RelayError::io("x"), RelayError::Io { .. }));
    assert!(matches!(
        RelayError::upstream_data("x"),
        RelayError::UpstreamData { .. }
    ));
    assert!(matches!(
        RelayError::site_resolution("x"),
        RelayError::SiteResolution { .. }
    ));
    assert!(matches!(
        RelayError::publish("amber/import/30m", "x"),
        RelayError::Publish { .. }
    ));
}

#[test]
fn io_and_json_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    assert!(matches!(RelayError::from(io), RelayError::Io { .. }));

    let json = serde_json::from_str::<Vec<u8>>("{").unwrap_err();
    assert!(matches!(
        RelayError::from(json),
        RelayError::UpstreamData { .. }
    ));
}

#[test]
fn display_includes_context() {
    let err = RelayError::upstream_unavailable("HTTP 503 from /sites");
    assert_eq!(format!("{}", err), "Upstream unavailable: HTTP 503 from /sites");
}
