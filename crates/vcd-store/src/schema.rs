//! Embedded PostgreSQL schema
//!
//! Applied by [`PgStore::connect`](crate::PgStore::connect). Every statement is
//! idempotent so the schema can be applied on each start.

/// Schema DDL
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS organizations (
    id           UUID PRIMARY KEY,
    name         TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    enabled      BOOLEAN NOT NULL DEFAULT TRUE,
    is_provider  BOOLEAN NOT NULL DEFAULT FALSE,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS organizations_single_provider
    ON organizations (is_provider) WHERE is_provider;

CREATE TABLE IF NOT EXISTS users (
    id      UUID PRIMARY KEY,
    org_id  UUID NOT NULL REFERENCES organizations (id) ON DELETE CASCADE,
    name    TEXT NOT NULL,
    role    TEXT NOT NULL,
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    UNIQUE (org_id, name)
);

CREATE TABLE IF NOT EXISTS vdcs (
    id               UUID PRIMARY KEY,
    org_id           UUID NOT NULL REFERENCES organizations (id),
    name             TEXT NOT NULL,
    description      TEXT,
    allocation_model TEXT NOT NULL,
    cpu_limit        BIGINT NOT NULL DEFAULT 0,
    cpu_units        TEXT NOT NULL,
    memory_limit     BIGINT NOT NULL DEFAULT 0,
    memory_units     TEXT NOT NULL,
    network_quota    INTEGER NOT NULL DEFAULT 0,
    enabled          BOOLEAN NOT NULL DEFAULT TRUE,
    namespace        TEXT NOT NULL,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT vdcs_namespace_key UNIQUE (namespace),
    CONSTRAINT vdcs_org_name_key UNIQUE (org_id, name)
);

CREATE TABLE IF NOT EXISTS catalogs (
    id          UUID PRIMARY KEY,
    org_id      UUID NOT NULL REFERENCES organizations (id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    description TEXT,
    published   BOOLEAN NOT NULL DEFAULT FALSE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (org_id, name)
);

CREATE TABLE IF NOT EXISTS vapps (
    id                  UUID PRIMARY KEY,
    vdc_id              UUID NOT NULL REFERENCES vdcs (id),
    name                TEXT NOT NULL,
    description         TEXT,
    status              TEXT NOT NULL,
    source_catalog_item TEXT,
    instance_namespace  TEXT,
    instance_name       TEXT,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT vapps_vdc_name_key UNIQUE (vdc_id, name)
);

CREATE INDEX IF NOT EXISTS vapps_instance_idx
    ON vapps (instance_namespace, instance_name);

CREATE TABLE IF NOT EXISTS vms (
    id           UUID PRIMARY KEY,
    vapp_id      UUID NOT NULL REFERENCES vapps (id) ON DELETE CASCADE,
    name         TEXT NOT NULL,
    status       TEXT NOT NULL,
    cluster_name TEXT NOT NULL,
    namespace    TEXT NOT NULL,
    cpu_count    INTEGER,
    memory_mb    BIGINT,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT vms_cluster_name_key UNIQUE (namespace, cluster_name)
);
"#;
