//! OpenShift Template
//!
//! Templates carry `objects` and `parameters` at the top level instead of a `spec`,
//! so they are read as `DynamicObject` with a fixed `ApiResource`.

use kube::api::DynamicObject;
use kube::discovery::ApiResource;

use crate::labels::{CATALOG_ID_LABEL, CATALOG_ITEM_LABEL};

/// API group of Template and TemplateInstance
pub const TEMPLATE_API_GROUP: &str = "template.openshift.io";

/// `ApiResource` for `template.openshift.io/v1` Template
pub fn template_api_resource() -> ApiResource {
    ApiResource {
        group: TEMPLATE_API_GROUP.to_string(),
        version: "v1".to_string(),
        api_version: format!("{}/v1", TEMPLATE_API_GROUP),
        kind: "Template".to_string(),
        plural: "templates".to_string(),
    }
}

/// Catalog UUID label on a template, if any
pub fn template_catalog_id(template: &DynamicObject) -> Option<&str> {
    template
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(CATALOG_ID_LABEL))
        .map(String::as_str)
}

/// Whether the template is published as a catalog item
pub fn is_catalog_item(template: &DynamicObject) -> bool {
    template
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(CATALOG_ITEM_LABEL))
        .is_some_and(|v| v == "true")
}

/// Full template body as JSON, suitable for embedding in a TemplateInstance
pub fn template_body(template: &DynamicObject) -> Result<serde_json::Value, serde_json::Error> {
    let mut body = serde_json::to_value(template)?;
    // Server-managed fields are rejected when embedded
    if let Some(meta) = body.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("resourceVersion");
        meta.remove("uid");
        meta.remove("managedFields");
        meta.remove("creationTimestamp");
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(labels: serde_json::Value) -> DynamicObject {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "template.openshift.io/v1",
            "kind": "Template",
            "metadata": {
                "name": "centos-web",
                "namespace": "openshift",
                "uid": "1234",
                "resourceVersion": "42",
                "labels": labels
            },
            "objects": [{"kind": "VirtualMachine"}],
            "parameters": [{"name": "NAME"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_catalog_labels() {
        let t = template(serde_json::json!({
            CATALOG_ID_LABEL: "7f9c0d1e-0000-4000-8000-000000000001",
            CATALOG_ITEM_LABEL: "true"
        }));
        assert!(is_catalog_item(&t));
        assert_eq!(template_catalog_id(&t), Some("7f9c0d1e-0000-4000-8000-000000000001"));

        let unlabelled = template(serde_json::json!({}));
        assert!(!is_catalog_item(&unlabelled));
        assert_eq!(template_catalog_id(&unlabelled), None);
    }

    #[test]
    fn test_template_body_strips_server_fields() {
        let body = template_body(&template(serde_json::json!({}))).unwrap();
        assert!(body["metadata"].get("uid").is_none());
        assert!(body["metadata"].get("resourceVersion").is_none());
        assert_eq!(body["objects"][0]["kind"], "VirtualMachine");
        assert_eq!(body["kind"], "Template");
    }
}
