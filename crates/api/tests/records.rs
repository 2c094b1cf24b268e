#![forbid(unsafe_code)]

use std::path::PathBuf;

use deck_api::{DeckConfig, ExposureType, InProcApi};
use deck_core::{CompositeWorkloadRecord, DeckError};
use deck_persist::{SqliteStore, Store};
use deck_select::SelectionQuery;

fn offline_config(db: &std::path::Path) -> DeckConfig {
    DeckConfig {
        db_path: db.display().to_string(),
        kubeconfig: Some(PathBuf::from("/nonexistent/kubedeck/kubeconfig")),
        ..DeckConfig::default()
    }
}

#[tokio::test]
async fn records_are_readable_without_a_cluster() {
    let db = std::env::temp_dir().join(format!("kubedeck-records-{}.db", std::process::id()));
    let _ = std::fs::remove_file(&db);
    let id = {
        let store = SqliteStore::open(&db.display().to_string()).unwrap();
        store.insert(&CompositeWorkloadRecord::new("shop", "prod", 2, ExposureType::RouteExposed)).unwrap()
    };
    let config = offline_config(&db);

    let records = InProcApi::open_records(&config).unwrap();
    let sel = records.list(&SelectionQuery::new("", 10, 1).unwrap()).unwrap();
    assert_eq!(sel.total, 1);
    assert_eq!(records.get(id).unwrap().route_resource_name, "shop-ing");
    assert!(matches!(records.get(id + 1), Err(DeckError::NotFound(_))));

    // the cluster side still refuses a missing kubeconfig
    assert!(InProcApi::connect_with(config, records).await.is_err());
    let _ = std::fs::remove_file(&db);
}
