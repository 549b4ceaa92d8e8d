use crate::registry::FieldId;
use std::{net::Ipv4Addr, time::SystemTime};
use thiserror::Error;

/// A decoded value attached to one field instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Protocols and other valueless items.
    None,
    Unsigned(u32),
    Ipv4(Ipv4Addr),
    Ether([u8; 6]),
    Boolean(bool),
    /// The value is the item's own bytes in the packet.
    Bytes,
    AbsTime(SystemTime),
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Unsigned(value)
    }
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        FieldValue::Unsigned(value.into())
    }
}

impl From<u8> for FieldValue {
    fn from(value: u8) -> Self {
        FieldValue::Unsigned(value.into())
    }
}

impl From<Ipv4Addr> for FieldValue {
    fn from(value: Ipv4Addr) -> Self {
        FieldValue::Ipv4(value)
    }
}

impl From<[u8; 6]> for FieldValue {
    fn from(value: [u8; 6]) -> Self {
        FieldValue::Ether(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

/// One occurrence of a field inside a packet tree.
#[derive(Debug, Clone, Copy)]
pub struct FieldInstance<'t> {
    /// Decoded value.
    pub value: &'t FieldValue,
    /// Raw bytes the item covers in the packet.
    pub bytes: &'t [u8],
    /// Offset of `bytes` from the start of the packet.
    pub offset: usize,
}

/// The view of a decoded packet a filter is applied to.
///
/// Subtree handles are cheap, copyable cursors into the implementor's own
/// storage.
pub trait PacketTree {
    type Subtree: Copy;

    /// Handle to the whole packet.
    fn root(&self) -> Self::Subtree;

    /// First subtree under `root` (in tree order) rooted at an instance of `protocol`.
    fn find_protocol_subtree(&self, root: Self::Subtree, protocol: FieldId)
        -> Option<Self::Subtree>;

    /// First subtree under `root` rooted at an instance of `field`.
    fn find_field_subtree(&self, root: Self::Subtree, field: FieldId) -> Option<Self::Subtree>;

    /// Calls `callback` for every instance of `field` within `subtree`, in tree order.
    fn for_each_field_instance<'t, F>(&'t self, subtree: Self::Subtree, field: FieldId, callback: F)
    where
        F: FnMut(FieldInstance<'t>);
}

/// Handle to an item of a [`ProtoTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(usize);

/// An error that occurs when building a [`ProtoTree`].
#[derive(Debug, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The item covers bytes outside of the packet.
    #[error("item at {start}+{length} exceeds packet length {packet_length}")]
    OutOfBounds {
        /// First byte of the item.
        start: usize,
        /// Number of bytes covered.
        length: usize,
        /// Length of the packet data.
        packet_length: usize,
    },

    /// The parent handle does not belong to this tree.
    #[error("unknown parent item {0:?}")]
    UnknownParent(ItemId),
}

#[derive(Debug)]
struct ProtoItem {
    field: Option<FieldId>,
    value: FieldValue,
    start: usize,
    length: usize,
    children: Vec<ItemId>,
}

/// An in-memory decoded packet: the raw bytes plus a tree of field items.
#[derive(Debug)]
pub struct ProtoTree {
    data: Box<[u8]>,
    items: Vec<ProtoItem>,
}

impl ProtoTree {
    /// Creates a tree with a single root item spanning the whole packet.
    pub fn new<D: Into<Box<[u8]>>>(data: D) -> Self {
        let data = data.into();
        let root = ProtoItem {
            field: None,
            value: FieldValue::None,
            start: 0,
            length: data.len(),
            children: Vec::new(),
        };
        ProtoTree {
            data,
            items: vec![root],
        }
    }

    /// Returns the packet bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Handle of the root item.
    pub fn root_item(&self) -> ItemId {
        ItemId(0)
    }

    /// Appends an item covering `length` bytes from `start` under `parent`.
    pub fn add_item<V: Into<FieldValue>>(
        &mut self,
        parent: ItemId,
        field: FieldId,
        start: usize,
        length: usize,
        value: V,
    ) -> Result<ItemId, TreeError> {
        if parent.0 >= self.items.len() {
            return Err(TreeError::UnknownParent(parent));
        }
        match start.checked_add(length) {
            Some(end) if end <= self.data.len() => {}
            _ => {
                return Err(TreeError::OutOfBounds {
                    start,
                    length,
                    packet_length: self.data.len(),
                })
            }
        }

        let id = ItemId(self.items.len());
        self.items.push(ProtoItem {
            field: Some(field),
            value: value.into(),
            start,
            length,
            children: Vec::new(),
        });
        self.items[parent.0].children.push(id);
        Ok(id)
    }

    /// Appends a protocol item, a valueless item other fields nest under.
    pub fn add_protocol(
        &mut self,
        parent: ItemId,
        protocol: FieldId,
        start: usize,
        length: usize,
    ) -> Result<ItemId, TreeError> {
        self.add_item(parent, protocol, start, length, FieldValue::None)
    }

    /// Iterates over `root` and its descendants in pre-order.
    fn descendants(&self, root: ItemId) -> impl Iterator<Item = (ItemId, &ProtoItem)> + '_ {
        let mut stack = vec![root];
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            let item = &self.items[id.0];
            stack.extend(item.children.iter().rev());
            Some((id, item))
        })
    }

    fn find(&self, root: ItemId, field: FieldId) -> Option<ItemId> {
        self.descendants(root)
            .find(|(_, item)| item.field == Some(field))
            .map(|(id, _)| id)
    }
}

impl PacketTree for ProtoTree {
    type Subtree = ItemId;

    fn root(&self) -> ItemId {
        self.root_item()
    }

    fn find_protocol_subtree(&self, root: ItemId, protocol: FieldId) -> Option<ItemId> {
        self.find(root, protocol)
    }

    fn find_field_subtree(&self, root: ItemId, field: FieldId) -> Option<ItemId> {
        self.find(root, field)
    }

    fn for_each_field_instance<'t, F>(&'t self, subtree: ItemId, field: FieldId, mut callback: F)
    where
        F: FnMut(FieldInstance<'t>),
    {
        for (_, item) in self.descendants(subtree) {
            if item.field == Some(field) {
                callback(FieldInstance {
                    value: &item.value,
                    bytes: &self.data[item.start..item.start + item.length],
                    offset: item.start,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETH: FieldId = FieldId::new(0);
    const ETH_SRC: FieldId = FieldId::new(1);
    const IP: FieldId = FieldId::new(2);
    const IP_ADDR: FieldId = FieldId::new(3);

    fn tree() -> ProtoTree {
        let mut tree = ProtoTree::new(vec![
            0, 1, 2, 3, 4, 5, // eth.src
            10, 0, 0, 1, // ip.addr
            10, 0, 0, 2, // ip.addr
        ]);
        let root = tree.root_item();
        let eth = tree.add_protocol(root, ETH, 0, 6).unwrap();
        tree.add_item(eth, ETH_SRC, 0, 6, [0, 1, 2, 3, 4, 5])
            .unwrap();
        let ip = tree.add_protocol(root, IP, 6, 8).unwrap();
        tree.add_item(ip, IP_ADDR, 6, 4, Ipv4Addr::new(10, 0, 0, 1))
            .unwrap();
        tree.add_item(ip, IP_ADDR, 10, 4, Ipv4Addr::new(10, 0, 0, 2))
            .unwrap();
        tree
    }

    #[test]
    fn test_find() {
        let tree = tree();

        let ip = tree.find_protocol_subtree(tree.root(), IP).unwrap();
        assert_eq!(ip, ItemId(3));
        assert!(tree.find_field_subtree(ip, ETH_SRC).is_none());
        assert!(tree.find_field_subtree(tree.root(), ETH_SRC).is_some());
        assert!(tree.find_protocol_subtree(tree.root(), FieldId::new(9)).is_none());
    }

    #[test]
    fn test_for_each_field_instance() {
        let tree = tree();
        let ip = tree.find_protocol_subtree(tree.root(), IP).unwrap();

        let mut seen = Vec::new();
        tree.for_each_field_instance(ip, IP_ADDR, |instance| {
            seen.push((instance.value.clone(), instance.bytes.to_vec(), instance.offset));
        });

        assert_eq!(
            seen,
            vec![
                (
                    FieldValue::Ipv4(Ipv4Addr::new(10, 0, 0, 1)),
                    vec![10, 0, 0, 1],
                    6
                ),
                (
                    FieldValue::Ipv4(Ipv4Addr::new(10, 0, 0, 2)),
                    vec![10, 0, 0, 2],
                    10
                ),
            ]
        );

        let mut count = 0;
        tree.for_each_field_instance(ip, ETH_SRC, |_| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_add_item_errors() {
        let mut tree = ProtoTree::new(vec![0; 4]);
        let root = tree.root_item();

        assert_eq!(
            tree.add_item(root, ETH_SRC, 2, 6, FieldValue::Bytes),
            Err(TreeError::OutOfBounds {
                start: 2,
                length: 6,
                packet_length: 4,
            })
        );
        assert_eq!(
            tree.add_protocol(ItemId(7), ETH, 0, 1),
            Err(TreeError::UnknownParent(ItemId(7)))
        );
    }
}
