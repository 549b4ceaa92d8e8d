use crate::lex::{expect, span, take_while, Lex, LexErrorKind, LexResult};
use cidr::{errors::NetworkParseError, Ipv4Cidr};
use serde::{Serialize, Serializer};
use std::{cmp::Ordering, fmt, net::Ipv4Addr, str::FromStr};

/// An IPv4 address with the number of significant leading bits.
///
/// Plain addresses carry a prefix of 32.
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct Ipv4Net {
    /// Network or host address.
    pub addr: Ipv4Addr,
    /// Number of significant bits, `0..=32`.
    pub prefix: u8,
}

impl Ipv4Net {
    pub fn host(addr: Ipv4Addr) -> Self {
        Ipv4Net { addr, prefix: 32 }
    }

    /// Compares both addresses numerically under the shorter prefix.
    pub fn masked_cmp(&self, other: &Ipv4Net) -> Ordering {
        let prefix = self.prefix.min(other.prefix);
        let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
        (u32::from(self.addr) & mask).cmp(&(u32::from(other.addr) & mask))
    }
}

impl From<Ipv4Addr> for Ipv4Net {
    fn from(addr: Ipv4Addr) -> Self {
        Ipv4Net::host(addr)
    }
}

impl<'i> Lex<'i> for Ipv4Net {
    fn lex(input: &str) -> LexResult<'_, Self> {
        let (chunk, rest) = take_while(input, "IPv4 address character", |c| {
            c.is_ascii_digit() || c == '.'
        })?;
        let addr = Ipv4Addr::from_str(chunk).map_err(|err| {
            (
                LexErrorKind::ParseNetwork(NetworkParseError::AddrParseError(err)),
                chunk,
            )
        })?;

        let (prefix, rest) = match expect(rest, "/") {
            Ok(rest) => {
                let (len, rest) = take_while(rest, "digit", |c| c.is_ascii_digit())?;
                let prefix = u8::from_str(len).map_err(|err| {
                    (
                        LexErrorKind::ParseNetwork(NetworkParseError::NetworkLengthParseError(
                            err,
                        )),
                        len,
                    )
                })?;
                Ipv4Cidr::new(addr, prefix)
                    .map_err(|err| (LexErrorKind::ParseNetwork(err), span(input, rest)))?;
                (prefix, rest)
            }
            Err(_) => (32, rest),
        };

        Ok((Ipv4Net { addr, prefix }, rest))
    }
}

impl fmt::Display for Ipv4Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix == 32 {
            write!(f, "{}", self.addr)
        } else {
            write!(f, "{}/{}", self.addr, self.prefix)
        }
    }
}

impl fmt::Debug for Ipv4Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Ipv4Net {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[test]
fn test() {
    assert_ok!(
        Ipv4Net::lex("10.0.0.1 "),
        Ipv4Net::host(Ipv4Addr::new(10, 0, 0, 1)),
        " "
    );
    assert_ok!(
        Ipv4Net::lex("10.0.0.0/8)"),
        Ipv4Net {
            addr: Ipv4Addr::new(10, 0, 0, 0),
            prefix: 8,
        },
        ")"
    );
    assert_err!(
        Ipv4Net::lex("10.0.0.1/8"),
        LexErrorKind::ParseNetwork(NetworkParseError::InvalidHostPart),
        "10.0.0.1/8"
    );
    match Ipv4Net::lex("10.0.0.0/33") {
        Err((
            LexErrorKind::ParseNetwork(NetworkParseError::NetworkLengthTooLongError(_)),
            "10.0.0.0/33",
        )) => {}
        err => panic!("Expected NetworkLengthTooLongError, got {:?}", err),
    }
    assert!(Ipv4Net::lex("10.0.1").is_err());
    assert_json!(Ipv4Net::lex("192.168.0.0/16").unwrap().0, "192.168.0.0/16");
}

#[test]
fn test_masked_cmp() {
    let net = Ipv4Net {
        addr: Ipv4Addr::new(10, 0, 0, 0),
        prefix: 8,
    };
    let inside = Ipv4Net::host(Ipv4Addr::new(10, 1, 2, 3));
    let above = Ipv4Net::host(Ipv4Addr::new(11, 0, 0, 0));

    assert_eq!(inside.masked_cmp(&net), Ordering::Equal);
    assert_eq!(net.masked_cmp(&inside), Ordering::Equal);
    assert_eq!(above.masked_cmp(&net), Ordering::Greater);
    assert_eq!(inside.masked_cmp(&above), Ordering::Less);

    let any = Ipv4Net {
        addr: Ipv4Addr::new(0, 0, 0, 0),
        prefix: 0,
    };
    assert_eq!(above.masked_cmp(&any), Ordering::Equal);
}
