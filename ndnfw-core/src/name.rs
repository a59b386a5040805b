use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::tlv::{TlvElement, TlvError};
use crate::tlv_types;

/// A single opaque name component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NameComponent(pub Vec<u8>);

impl NameComponent {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self(value.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "%{:02X}", b)?;
            }
        }
        Ok(())
    }
}

/// Hierarchical NDN name.
///
/// Names compare component-wise lexicographically. The derived `Hash` only
/// covers the component vector, so a `Name` and the equivalent
/// `[NameComponent]` slice hash identically and prefixes can be probed in a
/// `HashMap<Name, _>` without allocating.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Name {
    components: Vec<NameComponent>,
}

impl Name {
    /// Create a new empty name
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_components(components: Vec<NameComponent>) -> Self {
        Self { components }
    }

    /// Append a component to the name
    pub fn append(mut self, component: impl Into<Vec<u8>>) -> Self {
        self.components.push(NameComponent::new(component));
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    pub fn components(&self) -> &[NameComponent] {
        &self.components
    }

    /// The first `length` components, borrowed
    pub fn prefix_components(&self, length: usize) -> &[NameComponent] {
        &self.components[..length.min(self.components.len())]
    }

    /// Get a prefix of this name with the specified number of components
    pub fn get_prefix(&self, length: usize) -> Name {
        Self::from_components(self.prefix_components(length).to_vec())
    }

    /// Check if this name is a prefix of (or equal to) another name
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.len() <= other.len() && self.components[..] == other.components[..self.len()]
    }

    pub fn to_uri(&self) -> String {
        self.to_string()
    }

    /// Encode as a Name TLV element
    pub fn to_tlv(&self) -> TlvElement {
        let children: Vec<TlvElement> = self
            .components
            .iter()
            .map(|c| TlvElement::new(tlv_types::GENERIC_NAME_COMPONENT, c.0.clone()))
            .collect();
        TlvElement::nested(tlv_types::NAME, &children)
    }

    /// Decode from a Name TLV element
    pub fn from_tlv(element: &TlvElement) -> Result<Self, TlvError> {
        if element.type_ != tlv_types::NAME {
            return Err(TlvError::InvalidType(element.type_));
        }
        let components = element
            .children()?
            .into_iter()
            .map(|c| match c.type_ {
                tlv_types::GENERIC_NAME_COMPONENT
                | tlv_types::IMPLICIT_SHA256_DIGEST_COMPONENT
                | tlv_types::PARAMETERS_SHA256_DIGEST_COMPONENT => Ok(NameComponent(c.value)),
                other => Err(TlvError::InvalidType(other)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { components })
    }
}

impl Borrow<[NameComponent]> for Name {
    fn borrow(&self) -> &[NameComponent] {
        &self.components
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameParseError {
    #[error("Invalid percent-encoding in component {0:?}")]
    InvalidEscape(String),
}

impl FromStr for Name {
    type Err = NameParseError;

    /// Parse an NDN URI such as `/hello/world` or `/bin/%00%FF`.
    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let uri = uri.strip_prefix("ndn:").unwrap_or(uri);
        let components = uri
            .split('/')
            .filter(|part| !part.is_empty())
            .map(|part| unescape(part).map(NameComponent))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { components })
    }
}

fn unescape(part: &str) -> Result<Vec<u8>, NameParseError> {
    let bytes = part.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = part
                .get(i + 1..i + 3)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| NameParseError::InvalidEscape(part.to_string()))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    #[test]
    fn test_name_creation() {
        let name = name("/hello/world/test");
        assert_eq!(name.len(), 3);
        assert_eq!(name.get(0).unwrap().as_bytes(), b"hello");
        assert_eq!(name.get(2).unwrap().as_bytes(), b"test");
        assert_eq!(name.to_uri(), "/hello/world/test");
    }

    #[test]
    fn test_empty_name() {
        let name = name("");
        assert!(name.is_empty());
        assert_eq!(name.to_uri(), "/");
        assert_eq!(Name::new(), "/".parse().unwrap());
    }

    #[test]
    fn test_percent_escapes() {
        let name = name("/bin/%00%FFx");
        assert_eq!(name.get(1).unwrap().as_bytes(), &[0x00, 0xFF, b'x']);
        assert_eq!(name.to_uri(), "/bin/%00%FFx");
        assert!("/bad/%G1".parse::<Name>().is_err());
        assert!("/bad/%1".parse::<Name>().is_err());
    }

    #[test]
    fn test_name_prefix() {
        let a = name("/A");
        let a1 = name("/A/1");
        assert!(a.is_prefix_of(&a1));
        assert!(a1.is_prefix_of(&a1));
        assert!(!a1.is_prefix_of(&a));
        assert!(!name("/B").is_prefix_of(&a1));
        assert!(Name::new().is_prefix_of(&a1));
        assert_eq!(a1.get_prefix(1), a);
        assert_eq!(a1.get_prefix(9), a1);
    }

    #[test]
    fn test_component_wise_ordering() {
        assert!(name("/A") < name("/A/1"));
        assert!(name("/A/1") < name("/B"));
        assert!(name("/A/1") < name("/A/2"));
    }

    #[test]
    fn test_slice_lookup_matches_owned_key() {
        let mut map = HashMap::new();
        map.insert(name("/A/B"), 7);
        let probe = name("/A/B/C");
        assert_eq!(map.get(probe.prefix_components(2)), Some(&7));
        assert_eq!(map.get(probe.prefix_components(1)), None);
    }

    #[test]
    fn test_tlv_round_trip() {
        let original = name("/A/%01");
        let tlv = original.to_tlv();
        assert_eq!(tlv.encode(), vec![7, 6, 8, 1, b'A', 8, 1, 0x01]);
        assert_eq!(Name::from_tlv(&tlv).unwrap(), original);
    }

    #[test]
    fn test_tlv_rejects_bad_component_type() {
        let tlv = TlvElement::new(tlv_types::NAME, vec![9, 1, b'x']);
        assert!(matches!(Name::from_tlv(&tlv), Err(TlvError::InvalidType(9))));
    }
}
