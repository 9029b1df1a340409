//! Bluetooth device addresses

/// An error returned when a string is not a valid Bluetooth device address
///
/// Addresses must be six upper-case hexadecimal octets separated by colons, e.g. `AB:CD:EF:01:23:45`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InvalidAddress(());

impl std::fmt::Display for InvalidAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("invalid bluetooth address")
    }
}

impl std::error::Error for InvalidAddress {}

/// The link-layer address of a Bluetooth device, in the format `AB:CD:EF:01:23:45`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Address(String);

impl Address {
    const LEN: usize = 17;

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid(s: &str) -> bool {
        s.len() == Self::LEN
            && s.bytes().enumerate().all(|(i, b)| match i % 3 {
                2 => b == b':',
                _ => b.is_ascii_digit() || (b'A'..=b'F').contains(&b),
            })
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for Address {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if Address::is_valid(s) {
            Ok(Address(s.to_owned()))
        } else {
            Err(InvalidAddress(()))
        }
    }
}

impl TryFrom<String> for Address {
    type Error = InvalidAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if Address::is_valid(&value) {
            Ok(Address(value))
        } else {
            Err(InvalidAddress(()))
        }
    }
}

impl From<Address> for String {
    fn from(val: Address) -> Self {
        val.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
