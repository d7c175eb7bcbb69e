//! PostgreSQL store tests
//!
//! These tests require a database reachable through `DATABASE_URL`.

use vcd_store::{Organization, PgStore, StoreTrait, VApp, Vdc};

async fn connect() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    PgStore::connect(&url, 2).await.expect("Failed to connect")
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_unique_vapp_name_maps_to_conflict() {
    let store = connect().await;
    let org = Organization::new(format!("it-{}", uuid::Uuid::new_v4()));
    store.create_org(&org).await.unwrap();
    let vdc = Vdc::new(org.id, "dev", format!("vdc-{}", uuid::Uuid::new_v4()));
    store.create_vdc(&vdc).await.unwrap();

    store.create_vapp(&VApp::new(vdc.id, "web")).await.unwrap();
    let err = store.create_vapp(&VApp::new(vdc.id, "web")).await.unwrap_err();
    assert!(err.is_conflict());

    // Blocked while the vApp exists
    assert!(store.delete_vdc(vdc.id).await.unwrap_err().is_conflict());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_schema_is_reapplicable() {
    let store = connect().await;
    store.migrate().await.unwrap();
    store.ping().await.unwrap();
}
