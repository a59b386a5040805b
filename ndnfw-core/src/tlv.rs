/// TLV (Type-Length-Value) codec for the NDN wire format
///
/// Wire format:
/// - Type: VAR-NUMBER (1, 3, 5 or 9 bytes)
/// - Length: VAR-NUMBER (1, 3, 5 or 9 bytes)
/// - Value: `length` bytes
///
/// A VAR-NUMBER below 253 is a single byte. Larger values use a marker
/// byte (0xFD, 0xFE, 0xFF) followed by a big-endian u16, u32 or u64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvElement {
    pub type_: u32,
    pub value: Vec<u8>,
}

/// Errors that can occur during TLV encoding/decoding
#[derive(Debug, thiserror::Error)]
pub enum TlvError {
    #[error("Invalid VAR-NUMBER encoding")]
    InvalidVarNumber,
    #[error("Buffer too short")]
    BufferTooShort,
    #[error("Invalid TLV type: {0}")]
    InvalidType(u32),
    #[error("Invalid NonNegativeInteger of {0} bytes")]
    InvalidNonNegativeInteger(usize),
}

impl TlvElement {
    /// Create a new TLV element
    pub fn new(type_: u32, value: Vec<u8>) -> Self {
        Self { type_, value }
    }

    /// Create an element holding a NonNegativeInteger
    pub fn new_nni(type_: u32, n: u64) -> Self {
        Self::new(type_, encode_nni(n))
    }

    /// Create an element whose value is the concatenation of `children`
    pub fn nested(type_: u32, children: &[TlvElement]) -> Self {
        let mut value = Vec::with_capacity(children.iter().map(|c| c.encoded_length()).sum());
        for child in children {
            child.write_into(&mut value);
        }
        Self::new(type_, value)
    }

    /// Get the total encoded length of this TLV element
    pub fn encoded_length(&self) -> usize {
        var_number_size(self.type_ as u64)
            + var_number_size(self.value.len() as u64)
            + self.value.len()
    }

    /// Encode this TLV element to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.encoded_length());
        self.write_into(&mut buffer);
        buffer
    }

    /// Append this TLV element to a byte vector
    pub fn write_into(&self, buffer: &mut Vec<u8>) {
        put_var_number(self.type_ as u64, buffer);
        put_var_number(self.value.len() as u64, buffer);
        buffer.extend_from_slice(&self.value);
    }

    /// Decode a TLV element from bytes, returning it with the number of
    /// bytes consumed
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let (type_, type_bytes) = decode_var_number(data)?;
        let type_ = u32::try_from(type_).map_err(|_| TlvError::InvalidVarNumber)?;
        if type_ == 0 {
            return Err(TlvError::InvalidType(0));
        }
        let mut offset = type_bytes;

        let (length, length_bytes) = decode_var_number(&data[offset..])?;
        offset += length_bytes;

        let length = usize::try_from(length).map_err(|_| TlvError::BufferTooShort)?;
        if data.len() - offset < length {
            return Err(TlvError::BufferTooShort);
        }

        let value = data[offset..offset + length].to_vec();
        offset += length;

        Ok((TlvElement::new(type_, value), offset))
    }

    /// Decode the value as a NonNegativeInteger
    pub fn nni(&self) -> Result<u64, TlvError> {
        decode_nni(&self.value)
    }

    /// Decode the value as a sequence of child elements
    pub fn children(&self) -> Result<Vec<TlvElement>, TlvError> {
        decode_tlv_sequence(&self.value)
    }
}

/// Append a VAR-NUMBER
pub fn put_var_number(n: u64, buffer: &mut Vec<u8>) {
    if n < 253 {
        buffer.push(n as u8);
    } else if n <= u16::MAX as u64 {
        buffer.push(0xFD);
        buffer.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= u32::MAX as u64 {
        buffer.push(0xFE);
        buffer.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buffer.push(0xFF);
        buffer.extend_from_slice(&n.to_be_bytes());
    }
}

/// Get the size needed to encode a VAR-NUMBER
pub fn var_number_size(n: u64) -> usize {
    if n < 253 {
        1
    } else if n <= u16::MAX as u64 {
        3
    } else if n <= u32::MAX as u64 {
        5
    } else {
        9
    }
}

/// Decode a VAR-NUMBER, returning the value and the bytes consumed
pub fn decode_var_number(data: &[u8]) -> Result<(u64, usize), TlvError> {
    let first_byte = *data.first().ok_or(TlvError::BufferTooShort)?;
    let width = match first_byte {
        0..=252 => return Ok((first_byte as u64, 1)),
        0xFD => 2,
        0xFE => 4,
        0xFF => 8,
    };
    let bytes = data.get(1..1 + width).ok_or(TlvError::BufferTooShort)?;
    let n = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
    // Reject non-minimal encodings.
    if var_number_size(n) != 1 + width {
        return Err(TlvError::InvalidVarNumber);
    }
    Ok((n, 1 + width))
}

/// Encode a NonNegativeInteger using the shortest of 1, 2, 4 or 8 bytes
pub fn encode_nni(n: u64) -> Vec<u8> {
    if n <= u8::MAX as u64 {
        vec![n as u8]
    } else if n <= u16::MAX as u64 {
        (n as u16).to_be_bytes().to_vec()
    } else if n <= u32::MAX as u64 {
        (n as u32).to_be_bytes().to_vec()
    } else {
        n.to_be_bytes().to_vec()
    }
}

/// Decode a NonNegativeInteger
pub fn decode_nni(value: &[u8]) -> Result<u64, TlvError> {
    match value.len() {
        1 | 2 | 4 | 8 => Ok(value.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)),
        len => Err(TlvError::InvalidNonNegativeInteger(len)),
    }
}

/// Encode multiple TLV elements into a single buffer
pub fn encode_tlv_sequence(elements: &[TlvElement]) -> Vec<u8> {
    let total_size = elements.iter().map(|e| e.encoded_length()).sum();
    let mut buffer = Vec::with_capacity(total_size);

    for element in elements {
        element.write_into(&mut buffer);
    }

    buffer
}

/// Decode multiple TLV elements from a buffer
pub fn decode_tlv_sequence(data: &[u8]) -> Result<Vec<TlvElement>, TlvError> {
    let mut elements = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let (element, consumed) = TlvElement::decode(&data[offset..])?;
        elements.push(element);
        offset += consumed;
    }

    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tlv_encoding() {
        let element = TlvElement::new(1, vec![0x01, 0x02, 0x03]);
        assert_eq!(element.encode(), vec![1, 3, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_basic_tlv_decoding() {
        let data = vec![1, 3, 0x01, 0x02, 0x03];
        let (element, consumed) = TlvElement::decode(&data).unwrap();

        assert_eq!(element.type_, 1);
        assert_eq!(element.value, vec![0x01, 0x02, 0x03]);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_empty_value() {
        let element = TlvElement::new(42, vec![]);
        let encoded = element.encode();
        assert_eq!(encoded, vec![42, 0]);

        let (decoded, consumed) = TlvElement::decode(&encoded).unwrap();
        assert_eq!(decoded, element);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_large_value_uses_big_endian_length() {
        let large_value = vec![0xAA; 300];
        let element = TlvElement::new(100, large_value.clone());
        let encoded = element.encode();

        assert_eq!(encoded[0], 100);
        assert_eq!(encoded[1], 0xFD);
        assert_eq!(u16::from_be_bytes([encoded[2], encoded[3]]), 300);
        assert_eq!(encoded[4..], large_value[..]);
    }

    #[test]
    fn test_multi_byte_type() {
        // Nack header type 800 needs the 3-byte form.
        let element = TlvElement::new(800, vec![]);
        let encoded = element.encode();
        assert_eq!(encoded, vec![0xFD, 0x03, 0x20, 0x00]);
        assert_eq!(element.encoded_length(), 4);

        let (decoded, consumed) = TlvElement::decode(&encoded).unwrap();
        assert_eq!(decoded.type_, 800);
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_buffer_too_short() {
        let data = vec![1, 5, 0x01, 0x02];
        assert!(matches!(TlvElement::decode(&data), Err(TlvError::BufferTooShort)));
        assert!(matches!(TlvElement::decode(&[0xFD, 0x03]), Err(TlvError::BufferTooShort)));
        assert!(matches!(TlvElement::decode(&[]), Err(TlvError::BufferTooShort)));
    }

    #[test]
    fn test_non_minimal_var_number_rejected() {
        assert!(matches!(
            decode_var_number(&[0xFD, 0x00, 0x05]),
            Err(TlvError::InvalidVarNumber)
        ));
    }

    #[test]
    fn test_zero_type_rejected() {
        assert!(matches!(TlvElement::decode(&[0, 0]), Err(TlvError::InvalidType(0))));
    }

    #[test]
    fn test_nni_widths() {
        assert_eq!(encode_nni(0), vec![0]);
        assert_eq!(encode_nni(4000), vec![0x0F, 0xA0]);
        assert_eq!(encode_nni(70_000).len(), 4);
        assert_eq!(encode_nni(u64::MAX).len(), 8);
        assert_eq!(decode_nni(&[0x0F, 0xA0]).unwrap(), 4000);
        assert!(matches!(decode_nni(&[1, 2, 3]), Err(TlvError::InvalidNonNegativeInteger(3))));
    }

    #[test]
    fn test_sequence_encoding() {
        let elements = vec![
            TlvElement::new(1, vec![0x01]),
            TlvElement::new(2, vec![0x02, 0x03]),
            TlvElement::new(3, vec![]),
        ];

        let encoded = encode_tlv_sequence(&elements);
        let decoded = decode_tlv_sequence(&encoded).unwrap();

        assert_eq!(decoded, elements);
    }
}
