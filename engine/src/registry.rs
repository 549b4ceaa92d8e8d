use fnv::FnvBuildHasher;
use indexmap::map::{Entry, IndexMap};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Stable identifier of a registered field or protocol.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Serialize)]
#[serde(transparent)]
pub struct FieldId(u32);

impl FieldId {
    /// Wraps a raw registry index.
    pub const fn new(index: u32) -> Self {
        FieldId(index)
    }

    /// Returns the raw registry index.
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Field types as declared by dissectors.
///
/// Only a subset can be used in filters, see [`FieldType`](crate::FieldType).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RegistryType {
    /// No value, also used for protocols.
    None,
    Boolean,
    Uint8,
    Uint16,
    Uint24,
    Uint32,
    /// Unsigned integers rendered through a value-string table.
    ValsUint8,
    ValsUint16,
    ValsUint24,
    ValsUint32,
    AbsoluteTime,
    RelativeTime,
    Ether,
    Ipv4,
    Ipv6,
    Ipxnet,
    Bytes,
    String,
    Double,
}

/// The narrow view of a field registry the filter compiler consumes.
pub trait FieldRegistry {
    /// Number of registered ids; valid ids are `0..field_count()`.
    fn field_count(&self) -> usize;

    /// Textual abbreviation such as `tcp.port`.
    fn abbrev(&self, id: FieldId) -> Option<&str>;

    fn field_type(&self, id: FieldId) -> RegistryType;

    fn is_protocol(&self, id: FieldId) -> bool;

    /// Protocol a field belongs to, `None` for protocols and orphan fields.
    fn parent_protocol(&self, id: FieldId) -> Option<FieldId>;
}

/// An error that occurs when registering a field.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The abbreviation is already taken.
    #[error("field {0:?} is already registered")]
    Redefinition(String),

    /// The parent id is not a registered protocol.
    #[error("{0:?} is not a registered protocol")]
    NotAProtocol(FieldId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldInfo {
    ty: RegistryType,
    parent: Option<FieldId>,
}

/// An in-memory field registry.
///
/// Ids are assigned densely in registration order.
#[derive(Default, Debug)]
pub struct Registry {
    fields: IndexMap<String, FieldInfo, FnvBuildHasher>,
}

impl Registry {
    fn insert(&mut self, name: String, info: FieldInfo) -> Result<FieldId, RegistryError> {
        match self.fields.entry(name) {
            Entry::Occupied(entry) => Err(RegistryError::Redefinition(entry.key().clone())),
            Entry::Vacant(entry) => {
                let id = FieldId(entry.index() as u32);
                entry.insert(info);
                Ok(id)
            }
        }
    }

    fn info(&self, id: FieldId) -> Option<&FieldInfo> {
        self.fields.get_index(id.0 as usize).map(|(_, info)| info)
    }

    /// Registers a protocol, which can then own fields.
    pub fn register_protocol(&mut self, name: &str) -> Result<FieldId, RegistryError> {
        self.insert(
            name.to_owned(),
            FieldInfo {
                ty: RegistryType::None,
                parent: None,
            },
        )
    }

    /// Registers a field owned by `protocol`.
    pub fn register_field(
        &mut self,
        name: &str,
        ty: RegistryType,
        protocol: FieldId,
    ) -> Result<FieldId, RegistryError> {
        if !self.is_protocol(protocol) {
            return Err(RegistryError::NotAProtocol(protocol));
        }
        self.insert(
            name.to_owned(),
            FieldInfo {
                ty,
                parent: Some(protocol),
            },
        )
    }

    /// Looks up a field by its exact abbreviation.
    pub fn get_field_id(&self, name: &str) -> Option<FieldId> {
        self.fields
            .get_index_of(name)
            .map(|index| FieldId(index as u32))
    }
}

impl FieldRegistry for Registry {
    fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn abbrev(&self, id: FieldId) -> Option<&str> {
        self.fields
            .get_index(id.0 as usize)
            .map(|(name, _)| name.as_str())
    }

    fn field_type(&self, id: FieldId) -> RegistryType {
        self.info(id).map_or(RegistryType::None, |info| info.ty)
    }

    fn is_protocol(&self, id: FieldId) -> bool {
        matches!(self.info(id), Some(FieldInfo { parent: None, .. }))
    }

    fn parent_protocol(&self, id: FieldId) -> Option<FieldId> {
        self.info(id).and_then(|info| info.parent)
    }
}

/// Builds a [`Registry`] from protocol blocks.
///
/// ```
/// let registry = dfilter::Registry! {
///     tcp {
///         tcp.port: Uint16,
///         tcp.flags.syn: Boolean,
///     },
/// };
/// # let _ = registry;
/// ```
#[macro_export]
macro_rules! Registry {
    ($($proto:ident { $($ns:ident $(. $field:ident)*: $ty:ident),* $(,)? }),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut registry = $crate::Registry::default();
        $(
            let _protocol = registry.register_protocol(stringify!($proto)).unwrap();
            $(
                registry
                    .register_field(
                        concat!(stringify!($ns) $(, ".", stringify!($field))*),
                        $crate::RegistryType::$ty,
                        _protocol,
                    )
                    .unwrap();
            )*
        )*
        registry
    }};
}

#[test]
fn test_registry() {
    let registry = Registry! {
        eth {
            eth.src: Ether,
            eth.dst: Ether,
        },
        ip {
            ip.addr: Ipv4,
        },
    };

    assert_eq!(registry.field_count(), 5);

    let eth = registry.get_field_id("eth").unwrap();
    let src = registry.get_field_id("eth.src").unwrap();
    let addr = registry.get_field_id("ip.addr").unwrap();

    assert!(registry.is_protocol(eth));
    assert!(!registry.is_protocol(src));
    assert_eq!(registry.parent_protocol(src), Some(eth));
    assert_eq!(registry.parent_protocol(eth), None);
    assert_eq!(registry.abbrev(addr), Some("ip.addr"));
    assert_eq!(registry.field_type(addr), RegistryType::Ipv4);
    assert_eq!(registry.field_type(eth), RegistryType::None);
    assert_eq!(registry.abbrev(FieldId::new(42)), None);
}

#[test]
fn test_registry_errors() {
    let mut registry = Registry::default();
    let tcp = registry.register_protocol("tcp").unwrap();
    let port = registry
        .register_field("tcp.port", RegistryType::Uint16, tcp)
        .unwrap();

    assert_eq!(
        registry.register_protocol("tcp"),
        Err(RegistryError::Redefinition("tcp".to_owned()))
    );
    assert_eq!(
        registry.register_field("tcp.len", RegistryType::Uint16, port),
        Err(RegistryError::NotAProtocol(port))
    );
}
