//! Catalog item listing.
//!
//! Catalog items are not stored: a template in the template namespace is an item of a
//! catalog when it carries the catalog-item and catalog-id labels.

use super::Orchestrator;
use super::access::Action;
use crate::error::OrchestratorError;
use crate::urn::{CatalogItemRef, Kind};
use crds::{CATALOG_ID_LABEL, CATALOG_ITEM_LABEL};
use kube::ResourceExt;
use kube::api::DynamicObject;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Default page size
pub const DEFAULT_PAGE_SIZE: usize = 25;
/// Largest accepted page size
pub const MAX_PAGE_SIZE: usize = 128;

const DISPLAY_NAME_ANNOTATION: &str = "openshift.io/display-name";
const DESCRIPTION_ANNOTATION: &str = "description";

/// Catalog item as presented to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    /// Catalog item handle
    pub handle: String,
    /// Template name
    pub name: String,
    /// Catalog the item is published in
    pub catalog_id: Uuid,
    /// `openshift.io/display-name` annotation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// `description` annotation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Offset pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Items to skip
    pub offset: usize,
    /// Page size, capped at `MAX_PAGE_SIZE`
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of results with the total count before pagination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageResult<T> {
    /// Items of this page
    pub items: Vec<T>,
    /// Matches before pagination
    pub total: usize,
    pub offset: usize,
}

/// Slice a full result set
pub fn paginate<T>(items: Vec<T>, page: Page) -> Result<PageResult<T>, OrchestratorError> {
    if page.limit == 0 || page.limit > MAX_PAGE_SIZE {
        return Err(OrchestratorError::InvalidRequest(format!(
            "page size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    let total = items.len();
    let items = items.into_iter().skip(page.offset).take(page.limit).collect();
    Ok(PageResult {
        items,
        total,
        offset: page.offset,
    })
}

fn annotation(template: &DynamicObject, key: &str) -> Option<String> {
    template.annotations().get(key).cloned()
}

impl Orchestrator {
    /// List the items of a catalog visible to the caller, ordered by name
    pub async fn list_catalog_items(
        &self,
        caller_id: Uuid,
        catalog_handle: &str,
        page: Page,
    ) -> Result<PageResult<CatalogItem>, OrchestratorError> {
        let caller = self.caller(caller_id).await?;
        let id = self.codec.decode_as(catalog_handle, Kind::Catalog)?;
        let catalog = self.resolve_catalog(&caller, id, Action::Read).await?;

        let selector = BTreeMap::from([
            (CATALOG_ITEM_LABEL.to_string(), "true".to_string()),
            (CATALOG_ID_LABEL.to_string(), catalog.id.to_string()),
        ]);
        let templates = self
            .cluster()?
            .list_templates(&self.template_namespace, &selector)
            .await?;

        let mut items: Vec<CatalogItem> = templates
            .iter()
            .map(|t| {
                let name = t.name_any();
                CatalogItem {
                    handle: self.codec.encode_catalog_item(&CatalogItemRef::Scoped {
                        catalog_id: catalog.id,
                        name: name.clone(),
                    }),
                    name,
                    catalog_id: catalog.id,
                    display_name: annotation(t, DISPLAY_NAME_ANNOTATION),
                    description: annotation(t, DESCRIPTION_ANNOTATION),
                }
            })
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        paginate(items, page)
    }
}
