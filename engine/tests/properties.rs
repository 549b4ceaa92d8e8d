use dfilter::{
    CompilerSettings, FieldId, FieldInstance, FilterCompiler, ItemId, LexErrorKind, PacketTree,
    ProtoTree, Registry,
};
use lazy_static::lazy_static;
use std::{
    cell::Cell,
    net::Ipv4Addr,
    panic::{self, AssertUnwindSafe},
};

lazy_static! {
    static ref REGISTRY: Registry = Registry! {
        eth {
            eth.src: Ether,
            eth.dst: Ether,
        },
        ip {
            ip.addr: Ipv4,
        },
        tcp {
            tcp.port: Uint16,
        },
        http {
            http.header: Bytes,
        },
        ppp {
            ppp.proto: Uint8,
        },
    };
}

fn field(name: &str) -> FieldId {
    REGISTRY.get_field_id(name).unwrap()
}

#[derive(Default)]
struct Packet {
    data: Vec<u8>,
    eth: Option<([u8; 6], [u8; 6])>,
    ip: Vec<Ipv4Addr>,
    tcp_port: Option<u16>,
    http_headers: Vec<&'static [u8]>,
}

impl Packet {
    fn build(mut self) -> ProtoTree {
        if let Some((src, dst)) = self.eth {
            self.data.extend_from_slice(&src);
            self.data.extend_from_slice(&dst);
        }
        let ip_start = self.data.len();
        for addr in &self.ip {
            self.data.extend_from_slice(&addr.octets());
        }
        let tcp_start = self.data.len();
        if let Some(port) = self.tcp_port {
            self.data.extend_from_slice(&port.to_be_bytes());
        }
        let http_start = self.data.len();
        for header in &self.http_headers {
            self.data.extend_from_slice(header);
        }

        let mut tree = ProtoTree::new(self.data.clone());
        let root = tree.root_item();

        if let Some((src, dst)) = self.eth {
            let eth = tree.add_protocol(root, field("eth"), 0, 12).unwrap();
            tree.add_item(eth, field("eth.src"), 0, 6, src).unwrap();
            tree.add_item(eth, field("eth.dst"), 6, 6, dst).unwrap();
        }

        if !self.ip.is_empty() {
            let ip = tree
                .add_protocol(root, field("ip"), ip_start, 4 * self.ip.len())
                .unwrap();
            for (i, addr) in self.ip.iter().enumerate() {
                tree.add_item(ip, field("ip.addr"), ip_start + 4 * i, 4, *addr)
                    .unwrap();
            }
        }

        if let Some(port) = self.tcp_port {
            let tcp = tree.add_protocol(root, field("tcp"), tcp_start, 2).unwrap();
            tree.add_item(tcp, field("tcp.port"), tcp_start, 2, port)
                .unwrap();
        }

        if !self.http_headers.is_empty() {
            let len = self.data.len() - http_start;
            let http = tree
                .add_protocol(root, field("http"), http_start, len)
                .unwrap();
            let mut start = http_start;
            for header in &self.http_headers {
                tree.add_item(
                    http,
                    field("http.header"),
                    start,
                    header.len(),
                    dfilter::FieldValue::Bytes,
                )
                .unwrap();
                start += header.len();
            }
        }

        tree
    }
}

fn web_packet() -> ProtoTree {
    Packet {
        eth: Some(([0, 1, 2, 3, 4, 5], [0, 1, 2, 9, 9, 9])),
        ip: vec![Ipv4Addr::new(192, 168, 0, 1), Ipv4Addr::new(1, 2, 3, 4)],
        tcp_port: Some(80),
        http_headers: vec![&[0x10][..], &[0x20][..]],
        ..Packet::default()
    }
    .build()
}

fn arp_packet() -> ProtoTree {
    Packet {
        eth: Some(([9, 1, 2, 3, 4, 5], [0, 1, 2, 9, 9, 9])),
        ..Packet::default()
    }
    .build()
}

fn apply(filter: &str, tree: &ProtoTree) -> bool {
    dfilter::apply(&dfilter::compile(&*REGISTRY, filter).unwrap(), tree)
}

/// Delegates to a [`ProtoTree`] and counts lookups, refusing to look up one
/// field at all.
struct CountingTree<'t> {
    inner: &'t ProtoTree,
    forbidden: FieldId,
    lookups: Cell<usize>,
}

impl CountingTree<'_> {
    fn check(&self, field: FieldId) {
        self.lookups.set(self.lookups.get() + 1);
        assert_ne!(field, self.forbidden, "forbidden field looked up");
    }
}

impl PacketTree for CountingTree<'_> {
    type Subtree = ItemId;

    fn root(&self) -> ItemId {
        self.inner.root()
    }

    fn find_protocol_subtree(&self, root: ItemId, protocol: FieldId) -> Option<ItemId> {
        self.check(protocol);
        self.inner.find_protocol_subtree(root, protocol)
    }

    fn find_field_subtree(&self, root: ItemId, field: FieldId) -> Option<ItemId> {
        self.check(field);
        self.inner.find_field_subtree(root, field)
    }

    fn for_each_field_instance<'t, F>(&'t self, subtree: ItemId, field: FieldId, callback: F)
    where
        F: FnMut(FieldInstance<'t>),
    {
        self.check(field);
        self.inner.for_each_field_instance(subtree, field, callback)
    }
}

#[test]
fn compile_idempotence() {
    let compiler = FilterCompiler::new(&*REGISTRY);
    let packets = [web_packet(), arp_packet(), Packet::default().build()];

    for filter in &[
        "tcp.port eq 80 and ip.addr eq 1.2.3.4",
        "eth.src[0:3] eq eth.dst[0:3] or not http",
        "http.header gt 15 xor exists tcp",
    ] {
        let first = compiler.compile(filter).unwrap();
        let second = compiler.compile(filter).unwrap();
        assert_eq!(first, second);
        for packet in &packets {
            assert_eq!(first.apply(packet), second.apply(packet), "{}", filter);
        }
    }
}

#[test]
fn existence() {
    assert!(apply("exists tcp", &web_packet()));
    assert!(apply("exist http.header", &web_packet()));
    assert!(!apply("exists tcp", &arp_packet()));
    assert!(!apply("exists tcp", &Packet::default().build()));
    assert!(apply("tcp", &web_packet()));
    assert!(!apply("tcp.port", &arp_packet()));
}

#[test]
fn empty_sequences() {
    let arp = arp_packet();
    for op in &["eq", "ne", "gt", "ge", "lt", "le"] {
        let filter = format!("tcp.port {} 80", op);
        assert!(!apply(&filter, &arp), "{}", filter);
        let filter = format!("ip.addr {} ip.addr", op);
        assert!(!apply(&filter, &arp), "{}", filter);
    }
}

#[test]
fn existential_semantics() {
    let packet = web_packet();
    assert!(apply("http.header eq 20", &packet));
    assert!(apply("http.header eq 10", &packet));
    assert!(!apply("http.header eq 30", &packet));
    assert!(apply(r#"http.header eq "\x20""#, &packet));
    assert!(apply("ip.addr eq 1.2.3.4 and ip.addr eq 192.168.0.0/16", &packet));
    // one of the two addresses differs from 1.2.3.4
    assert!(apply("ip.addr ne 1.2.3.4", &packet));
}

#[test]
fn and_short_circuit() {
    let ast = dfilter::compile(&*REGISTRY, "ip.addr eq 9.9.9.9 and exists ppp.proto").unwrap();
    let packet = web_packet();
    let tree = CountingTree {
        inner: &packet,
        forbidden: field("ppp.proto"),
        lookups: Cell::new(0),
    };

    assert!(!ast.apply(&tree));
    assert_eq!(tree.lookups.get(), 2);

    // both sides of `or` are always evaluated
    let ast = dfilter::compile(&*REGISTRY, "ip.addr eq 1.2.3.4 or exists ppp.proto").unwrap();
    let result = panic::catch_unwind(AssertUnwindSafe(|| ast.apply(&tree)));
    assert!(result.is_err());
}

#[test]
fn unregistered_existence() {
    assert!(REGISTRY.get_field_id("bogus.field").is_none());

    let packet = web_packet();
    assert!(!apply("ip.addr eq 9.9.9.9 and exists bogus.field", &packet));
    assert!(!apply("exists bogus.field", &packet));
    assert!(apply("ip.addr eq 1.2.3.4 and not exists bogus.field", &packet));
    assert!(apply("exists bogus.field or tcp", &packet));

    let err = dfilter::compile(&*REGISTRY, "bogus.field").unwrap_err();
    assert_eq!(err.kind(), &LexErrorKind::UnknownIdentifier);
}

#[test]
fn byte_window_intersection() {
    let filter = "eth.src[0:3] eq eth.dst[0:3]";
    assert!(apply(filter, &web_packet()));
    assert!(!apply(filter, &arp_packet()));

    assert!(apply("eth.src[0:3] eq 00:01:02", &web_packet()));
    // a shorter literal narrows the window to its own length
    assert!(apply("eth.src[0:4] eq 00:01", &web_packet()));
    assert!(apply("eth.src[0:4] ne 00:09", &web_packet()));
    assert!(!apply("eth.src[0:4] eq 00:09", &web_packet()));
    assert!(!apply("eth.src[0:4] eq eth.dst[0:4]", &web_packet()));
    // windows past the end of the field never match
    assert!(!apply("eth.src[4:8] ne eth.dst[4:8]", &web_packet()));
}

#[test]
fn bytes_ordering() {
    let empty = Packet::default().build();
    assert!(apply(r#""\x01\x02" lt "\x01\x03""#, &empty));
    assert!(!apply(r#""\x01\x02" gt "\x01\x03""#, &empty));
    assert!(apply(r#""\x01\x02" ne "\x01\x03""#, &empty));
    assert!(!apply(r#""\x01\x02" eq "\x01\x03""#, &empty));
    assert!(apply("http.header lt 15", &web_packet()));
    assert!(apply("http.header gt 15", &web_packet()));
    assert!(!apply("http.header gt 20", &web_packet()));
}

#[test]
fn parse_failure_containment() {
    let compiler = FilterCompiler::new(&*REGISTRY);

    let err = compiler.compile("tcp.port eq").unwrap_err();
    assert_eq!(err.kind(), &LexErrorKind::ExpectedName("operand"));

    let ast = compiler.compile("ip.addr eq 1.2.3.4").unwrap();
    assert!(ast.apply(&web_packet()));
    assert!(!ast.apply(&arp_packet()));
}

#[test]
fn xor_modes() {
    let packet = web_packet();
    assert!(!apply("tcp xor ip", &packet));
    assert!(apply("tcp xor ppp", &packet));
    assert!(!apply("ppp xor ppp.proto", &packet));

    let legacy = FilterCompiler::with_settings(
        &*REGISTRY,
        CompilerSettings {
            legacy_xor: true,
            ..CompilerSettings::default()
        },
    );
    assert!(legacy.compile("tcp xor ip").unwrap().apply(&packet));
    assert!(legacy.compile("tcp xor ppp").unwrap().apply(&packet));
    assert!(!legacy
        .compile("ppp xor ppp.proto")
        .unwrap()
        .apply(&packet));
}

#[test]
fn uses() {
    let ast = dfilter::compile(&*REGISTRY, "tcp.port eq 80 or exists http").unwrap();
    assert!(ast.uses(field("tcp.port")));
    assert!(ast.uses(field("http")));
    assert!(!ast.uses(field("ip.addr")));
}
