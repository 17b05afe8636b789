use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use tucson_data::config::{
    Config, ConfigLoader, PagingConfig, ServiceEntry, ServiceEntryObject, ServicesConfig,
};
use tucson_data::domain::ServiceFamily;
use tucson_data::error::PipelineError;

fn write_config(content: &str) -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("tucson-data.json")).unwrap();
    std::fs::write(path.as_std_path(), content).unwrap();
    (temp, path)
}

#[test]
fn loads_full_config_file() {
    let (_temp, path) = write_config(
        r#"{
            "data_dir": "/srv/tucson",
            "services": {
                "pima_gis": "https://mirror.example.org/arcgis/rest/services",
                "pag_region": {"base_url": "https://pag.example.org/server/rest/services/"}
            },
            "paging": {"page_size": 1000, "max_pages": 50},
            "boundary": {"value": "SOUTH TUCSON"},
            "timeout_secs": 120
        }"#,
    );

    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();

    assert_eq!(resolved.data_dir, "/srv/tucson");
    assert_eq!(
        resolved.base_url(ServiceFamily::PimaGis),
        "https://mirror.example.org/arcgis/rest/services"
    );
    assert_eq!(
        resolved.base_url(ServiceFamily::PagRegion),
        "https://pag.example.org/server/rest/services/"
    );
    assert_eq!(resolved.paging.page_size, 1000);
    assert_eq!(resolved.paging.max_pages, Some(50));
    assert_eq!(resolved.boundary.field, "NAME");
    assert_eq!(resolved.boundary.value, "SOUTH TUCSON");
    assert_eq!(resolved.timeout, Some(Duration::from_secs(120)));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("absent.json")).unwrap();

    let err = ConfigLoader::resolve(Some(&path)).unwrap_err();

    assert_matches!(err, PipelineError::ConfigRead(_));
}

#[test]
fn invalid_json_is_parse_error() {
    let (_temp, path) = write_config("{ not json");

    let err = ConfigLoader::resolve(Some(&path)).unwrap_err();

    assert_matches!(err, PipelineError::ConfigParse(_));
}

#[test]
fn rejects_unparseable_base_url() {
    let config = Config {
        services: ServicesConfig {
            pima_gis: Some(ServiceEntry::Detailed(ServiceEntryObject {
                base_url: "not a url".to_string(),
            })),
            pag_region: None,
        },
        ..Config::default()
    };

    let err = ConfigLoader::resolve_config(config).unwrap_err();

    assert_matches!(err, PipelineError::InvalidConfig(_));
}

#[test]
fn rejects_zero_page_guard() {
    let config = Config {
        paging: PagingConfig {
            page_size: None,
            max_pages: Some(0),
        },
        ..Config::default()
    };

    let err = ConfigLoader::resolve_config(config).unwrap_err();

    assert_matches!(err, PipelineError::InvalidConfig(_));
}
