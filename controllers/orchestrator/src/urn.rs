//! Resource handles (URNs).
//!
//! A handle is `<prefix>:<kind>:<payload>`. For every kind except `catalogitem` the
//! payload is a canonical hyphenated UUID. Catalog items have two payload shapes:
//!
//! - scoped: `<catalog-uuid>:<url-escaped item name>`
//! - legacy: `<item name>` with no catalog
//!
//! The shape is resolved once, at decode time, into a [`CatalogItemRef`].

use crate::error::OrchestratorError;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length of a canonical hyphenated UUID
const CANONICAL_UUID_LEN: usize = 36;

/// Resource kind carried by a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A user account
    User,
    /// An organization
    Org,
    /// A role
    Role,
    /// A login session
    Session,
    /// A virtual data center
    Vdc,
    /// A catalog
    Catalog,
    /// A catalog item
    CatalogItem,
    /// A vApp
    VApp,
    /// A virtual machine
    Vm,
}

impl Kind {
    /// Kind segment as it appears in a handle
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::User => "user",
            Kind::Org => "org",
            Kind::Role => "role",
            Kind::Session => "session",
            Kind::Vdc => "vdc",
            Kind::Catalog => "catalog",
            Kind::CatalogItem => "catalogitem",
            Kind::VApp => "vapp",
            Kind::Vm => "vm",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Kind::User),
            "org" => Ok(Kind::Org),
            "role" => Ok(Kind::Role),
            "session" => Ok(Kind::Session),
            "vdc" => Ok(Kind::Vdc),
            "catalog" => Ok(Kind::Catalog),
            "catalogitem" => Ok(Kind::CatalogItem),
            "vapp" => Ok(Kind::VApp),
            "vm" => Ok(Kind::Vm),
            _ => Err(()),
        }
    }
}

/// Catalog item reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CatalogItemRef {
    /// Catalog-less item, looked up by template name only
    Legacy { name: String },
    /// Item inside a known catalog
    Scoped { catalog_id: Uuid, name: String },
}

impl CatalogItemRef {
    /// Item (template) name
    pub fn name(&self) -> &str {
        match self {
            CatalogItemRef::Legacy { name } | CatalogItemRef::Scoped { name, .. } => name,
        }
    }

    /// Owning catalog, when known
    pub fn catalog_id(&self) -> Option<Uuid> {
        match self {
            CatalogItemRef::Legacy { .. } => None,
            CatalogItemRef::Scoped { catalog_id, .. } => Some(*catalog_id),
        }
    }
}

/// Key identified by a handle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Id(Uuid),
    CatalogItem(CatalogItemRef),
}

/// Encodes and decodes handles under one prefix
#[derive(Debug, Clone)]
pub struct UrnCodec {
    prefix: String,
}

impl Default for UrnCodec {
    fn default() -> Self {
        Self::new("urn:vcloud")
    }
}

impl UrnCodec {
    /// Codec for handles starting with `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Handle prefix without the trailing colon
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Encode a key as a handle of `kind`
    ///
    /// Returns `MalformedHandle` when the key shape does not fit the kind.
    pub fn encode(&self, kind: Kind, key: &ResourceKey) -> Result<String, OrchestratorError> {
        match (kind, key) {
            (Kind::CatalogItem, ResourceKey::CatalogItem(item)) => Ok(self.encode_catalog_item(item)),
            (Kind::CatalogItem, ResourceKey::Id(_)) | (_, ResourceKey::CatalogItem(_)) => {
                Err(OrchestratorError::MalformedHandle(format!(
                    "key does not fit kind {}",
                    kind
                )))
            }
            (_, ResourceKey::Id(id)) => Ok(self.encode_id(kind, *id)),
        }
    }

    /// Encode a UUID-keyed handle
    pub fn encode_id(&self, kind: Kind, id: Uuid) -> String {
        format!("{}:{}:{}", self.prefix, kind, id.hyphenated())
    }

    /// Encode a catalog item handle
    pub fn encode_catalog_item(&self, item: &CatalogItemRef) -> String {
        match item {
            CatalogItemRef::Legacy { name } => {
                format!("{}:{}:{}", self.prefix, Kind::CatalogItem, urlencoding::encode(name))
            }
            CatalogItemRef::Scoped { catalog_id, name } => format!(
                "{}:{}:{}:{}",
                self.prefix,
                Kind::CatalogItem,
                catalog_id.hyphenated(),
                urlencoding::encode(name)
            ),
        }
    }

    /// Decode a handle into its kind and key
    pub fn decode(&self, handle: &str) -> Result<(Kind, ResourceKey), OrchestratorError> {
        let (kind, payload) = self.split(handle)?;
        let key = match kind {
            Kind::CatalogItem => ResourceKey::CatalogItem(decode_catalog_payload(handle, payload)?),
            _ => ResourceKey::Id(parse_canonical_uuid(payload).ok_or_else(|| malformed(handle))?),
        };
        Ok((kind, key))
    }

    /// Kind of a handle, without validating the payload
    pub fn kind_of(&self, handle: &str) -> Result<Kind, OrchestratorError> {
        self.split(handle).map(|(kind, _)| kind)
    }

    /// Decode a UUID-keyed handle that must be of `expected` kind
    pub fn decode_as(&self, handle: &str, expected: Kind) -> Result<Uuid, OrchestratorError> {
        match self.decode(handle)? {
            (kind, ResourceKey::Id(id)) if kind == expected => Ok(id),
            (kind, _) => Err(OrchestratorError::MalformedHandle(format!(
                "expected a {} handle, got {}",
                expected, kind
            ))),
        }
    }

    /// Decode a catalog item handle
    pub fn decode_catalog_item(&self, handle: &str) -> Result<CatalogItemRef, OrchestratorError> {
        match self.decode(handle)? {
            (_, ResourceKey::CatalogItem(item)) => Ok(item),
            (kind, _) => Err(OrchestratorError::MalformedHandle(format!(
                "expected a {} handle, got {}",
                Kind::CatalogItem,
                kind
            ))),
        }
    }

    /// Decode a VM reference
    ///
    /// Besides the full handle, accepts a bare canonical UUID and a 32-character hex
    /// string; all three normalize to the same UUID.
    pub fn decode_vm_handle(&self, input: &str) -> Result<Uuid, OrchestratorError> {
        if input.starts_with(&format!("{}:", self.prefix)) {
            return self.decode_as(input, Kind::Vm);
        }
        if input.len() == 32 && input.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Uuid::try_parse(input).map_err(|_| malformed(input));
        }
        parse_canonical_uuid(input).ok_or_else(|| malformed(input))
    }

    fn split<'a>(&self, handle: &'a str) -> Result<(Kind, &'a str), OrchestratorError> {
        let rest = handle
            .strip_prefix(self.prefix.as_str())
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(|| malformed(handle))?;
        let (kind, payload) = rest.split_once(':').ok_or_else(|| malformed(handle))?;
        let kind = kind.parse::<Kind>().map_err(|()| malformed(handle))?;
        if payload.is_empty() {
            return Err(malformed(handle));
        }
        Ok((kind, payload))
    }
}

fn malformed(handle: &str) -> OrchestratorError {
    OrchestratorError::MalformedHandle(handle.to_string())
}

fn parse_canonical_uuid(s: &str) -> Option<Uuid> {
    if s.len() != CANONICAL_UUID_LEN {
        return None;
    }
    Uuid::try_parse(s).ok()
}

fn decode_catalog_payload(handle: &str, payload: &str) -> Result<CatalogItemRef, OrchestratorError> {
    match payload.split_once(':') {
        Some((catalog, escaped)) => {
            let catalog_id = parse_canonical_uuid(catalog).ok_or_else(|| {
                OrchestratorError::InvalidCatalogReference(format!(
                    "catalog segment '{}' is not a UUID",
                    catalog
                ))
            })?;
            let name = unescape(handle, escaped)?;
            Ok(CatalogItemRef::Scoped { catalog_id, name })
        }
        None => Ok(CatalogItemRef::Legacy {
            name: unescape(handle, payload)?,
        }),
    }
}

fn unescape(handle: &str, escaped: &str) -> Result<String, OrchestratorError> {
    let name = urlencoding::decode(escaped).map_err(|_| malformed(handle))?;
    if name.is_empty() {
        return Err(malformed(handle));
    }
    Ok(name.into_owned())
}

#[cfg(test)]
#[path = "urn_test.rs"]
mod urn_test;
