//! Well-known labels and annotations
//!
//! Label values must satisfy the Kubernetes label-value charset, see
//! [`sanitize_label_value`].

/// Marks objects owned by the orchestrator
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY_VALUE: &str = "vcd-orchestrator";

/// Organization UUID
pub const ORG_ID_LABEL: &str = "vcd.microscaler.io/org-id";
/// VDC UUID
pub const VDC_ID_LABEL: &str = "vcd.microscaler.io/vdc-id";
/// vApp UUID
pub const VAPP_ID_LABEL: &str = "vcd.microscaler.io/vapp-id";
/// Catalog UUID on templates published as catalog items
pub const CATALOG_ID_LABEL: &str = "vcd.microscaler.io/catalog-id";
/// `"true"` on templates published as catalog items
pub const CATALOG_ITEM_LABEL: &str = "vcd.microscaler.io/catalog-item";
/// Set by the template service broker on every object a TemplateInstance creates
pub const TEMPLATE_INSTANCE_OWNER_LABEL: &str = "template.openshift.io/template-instance-owner";

/// Organization display name
pub const ORG_NAME_ANNOTATION: &str = "vcd.microscaler.io/org-name";
/// VDC display name
pub const VDC_NAME_ANNOTATION: &str = "vcd.microscaler.io/vdc-name";
/// Organization handle
pub const ORG_URN_ANNOTATION: &str = "vcd.microscaler.io/org-urn";
/// VDC handle
pub const VDC_URN_ANNOTATION: &str = "vcd.microscaler.io/vdc-urn";
/// VDC allocation model
pub const ALLOCATION_MODEL_ANNOTATION: &str = "vcd.microscaler.io/allocation-model";
/// Catalog item handle a TemplateInstance was created from
pub const SOURCE_ITEM_ANNOTATION: &str = "vcd.microscaler.io/source-catalog-item";

/// Maximum length of a label value
pub const LABEL_VALUE_MAX_LEN: usize = 63;

/// Sanitizes an arbitrary string into a valid label value.
///
/// Keeps alphanumerics, `-`, `_` and `.`, replaces anything else with `-`,
/// truncates to 63 characters and strips non-alphanumeric characters from both ends.
pub fn sanitize_label_value(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .take(LABEL_VALUE_MAX_LEN)
        .collect();
    replaced
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_uuid() {
        let uuid = "3f2b8c1e-9a4d-4b7e-8c2f-1d0e5a6b7c8d";
        assert_eq!(sanitize_label_value(uuid), uuid);
    }

    #[test]
    fn test_sanitize_replaces_and_trims() {
        assert_eq!(sanitize_label_value("  Acme Corp!! "), "Acme-Corp");
        assert_eq!(sanitize_label_value("_.-x-._"), "x");
        assert_eq!(sanitize_label_value("///"), "");
    }

    #[test]
    fn test_sanitize_truncates_then_strips_edges() {
        let long = format!("{}-tail", "a".repeat(62));
        let out = sanitize_label_value(&long);
        assert_eq!(out.len(), 62);
        assert!(out.chars().all(|c| c == 'a'));
    }
}
