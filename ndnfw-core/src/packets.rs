use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::name::Name;
use crate::tlv::{decode_tlv_sequence, TlvElement, TlvError};

/// TLV Type constants for NDN packets and NDNLPv2 framing
pub mod tlv_types {
    pub const IMPLICIT_SHA256_DIGEST_COMPONENT: u32 = 0x01;
    pub const PARAMETERS_SHA256_DIGEST_COMPONENT: u32 = 0x02;
    pub const INTEREST: u32 = 0x05;
    pub const DATA: u32 = 0x06;
    pub const NAME: u32 = 0x07;
    pub const GENERIC_NAME_COMPONENT: u32 = 0x08;
    pub const NONCE: u32 = 0x0A;
    pub const INTEREST_LIFETIME: u32 = 0x0C;
    pub const MUST_BE_FRESH: u32 = 0x12;
    pub const META_INFO: u32 = 0x14;
    pub const CONTENT: u32 = 0x15;
    pub const SIGNATURE_INFO: u32 = 0x16;
    pub const SIGNATURE_VALUE: u32 = 0x17;
    pub const CONTENT_TYPE: u32 = 0x18;
    pub const FRESHNESS_PERIOD: u32 = 0x19;
    pub const FINAL_BLOCK_ID: u32 = 0x1A;
    pub const FORWARDING_HINT: u32 = 0x1E;
    pub const PREFERENCE: u32 = 0x1E;
    pub const DELEGATION: u32 = 0x1F;
    pub const CAN_BE_PREFIX: u32 = 0x21;
    pub const HOP_LIMIT: u32 = 0x22;
    pub const APPLICATION_PARAMETERS: u32 = 0x24;

    pub const LP_PAYLOAD: u32 = 80;
    pub const LP_SEQ_NO: u32 = 81;
    pub const FRAG_INDEX: u32 = 82;
    pub const FRAG_COUNT: u32 = 83;
    pub const PIT_TOKEN: u32 = 98;
    pub const LP_PACKET: u32 = 100;
    pub const NACK: u32 = 800;
    pub const NACK_REASON: u32 = 801;
    pub const CONGESTION_MARK: u32 = 832;
}

/// Largest packet accepted at ingress.
pub const MAX_PACKET_SIZE: usize = 8800;

/// InterestLifetime applied when the element is absent.
pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_millis(4000);

/// Errors raised while parsing a packet handed over by a face
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("TLV error: {0}")]
    Tlv(#[from] TlvError),
    #[error("Packet of {0} bytes exceeds the maximum packet size")]
    TooLarge(usize),
    #[error("Unexpected TLV type {0}")]
    UnexpectedType(u32),
    #[error("Missing {0} element")]
    Missing(&'static str),
    #[error("Nonce must be 4 bytes, got {0}")]
    BadNonce(usize),
    #[error("HopLimit must be 1 byte, got {0}")]
    BadHopLimit(usize),
    #[error("PitToken must be 8 bytes, got {0}")]
    BadPitToken(usize),
    #[error("Value {0} overflows its field")]
    LengthOverflow(u64),
    #[error("Unknown critical LP header {0}")]
    UnknownCriticalLpHeader(u32),
    #[error("FragIndex {index} is not below FragCount {count}")]
    FragIndexExceedFragCount { index: u16, count: u16 },
    #[error("Fragmented LP packet ({0} fragments)")]
    Fragmented(u16),
    #[error("Nack payload is not an Interest")]
    NackNotInterest,
    #[error("Trailing bytes after packet")]
    TrailingBytes,
}

/// One entry of a forwarding hint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delegation {
    pub preference: u64,
    pub name: Name,
}

impl Delegation {
    pub fn new(preference: u64, name: Name) -> Self {
        Self { preference, name }
    }
}

/// Interest packet structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
    pub forwarding_hint: Vec<Delegation>,
    pub nonce: Option<u32>,
    pub lifetime: Duration,
    pub hop_limit: Option<u8>,
    pub application_parameters: Option<Vec<u8>>,
}

impl Interest {
    /// Create a new Interest with the given name
    pub fn new(name: Name) -> Self {
        Self {
            name,
            can_be_prefix: false,
            must_be_fresh: false,
            forwarding_hint: Vec::new(),
            nonce: None,
            lifetime: DEFAULT_INTEREST_LIFETIME,
            hop_limit: None,
            application_parameters: None,
        }
    }

    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = Some(hop_limit);
        self
    }

    pub fn with_can_be_prefix(mut self, can_be_prefix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self
    }

    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    /// Append a delegation to the forwarding hint
    pub fn with_delegation(mut self, preference: u64, name: Name) -> Self {
        self.forwarding_hint.push(Delegation::new(preference, name));
        self
    }

    /// Check if a Data packet with the given name can satisfy this Interest
    pub fn matches_data(&self, data_name: &Name) -> bool {
        if self.can_be_prefix {
            self.name.is_prefix_of(data_name)
        } else {
            &self.name == data_name
        }
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut elements = vec![self.name.to_tlv()];
        if self.can_be_prefix {
            elements.push(TlvElement::new(tlv_types::CAN_BE_PREFIX, vec![]));
        }
        if self.must_be_fresh {
            elements.push(TlvElement::new(tlv_types::MUST_BE_FRESH, vec![]));
        }
        if !self.forwarding_hint.is_empty() {
            let delegations: Vec<TlvElement> = self
                .forwarding_hint
                .iter()
                .map(|d| {
                    TlvElement::nested(
                        tlv_types::DELEGATION,
                        &[TlvElement::new_nni(tlv_types::PREFERENCE, d.preference), d.name.to_tlv()],
                    )
                })
                .collect();
            elements.push(TlvElement::nested(tlv_types::FORWARDING_HINT, &delegations));
        }
        if let Some(nonce) = self.nonce {
            elements.push(TlvElement::new(tlv_types::NONCE, nonce.to_be_bytes().to_vec()));
        }
        if self.lifetime != DEFAULT_INTEREST_LIFETIME {
            elements.push(TlvElement::new_nni(
                tlv_types::INTEREST_LIFETIME,
                self.lifetime.as_millis() as u64,
            ));
        }
        if let Some(hop_limit) = self.hop_limit {
            elements.push(TlvElement::new(tlv_types::HOP_LIMIT, vec![hop_limit]));
        }
        if let Some(params) = &self.application_parameters {
            elements.push(TlvElement::new(tlv_types::APPLICATION_PARAMETERS, params.clone()));
        }
        TlvElement::nested(tlv_types::INTEREST, &elements)
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, PacketError> {
        if element.type_ != tlv_types::INTEREST {
            return Err(PacketError::UnexpectedType(element.type_));
        }

        let mut name = None;
        let mut interest = Interest::new(Name::new());

        for child in element.children()? {
            match child.type_ {
                tlv_types::NAME => name = Some(Name::from_tlv(&child)?),
                tlv_types::CAN_BE_PREFIX => interest.can_be_prefix = true,
                tlv_types::MUST_BE_FRESH => interest.must_be_fresh = true,
                tlv_types::FORWARDING_HINT => {
                    interest.forwarding_hint = decode_forwarding_hint(&child)?;
                }
                tlv_types::NONCE => {
                    let bytes: [u8; 4] = child
                        .value
                        .as_slice()
                        .try_into()
                        .map_err(|_| PacketError::BadNonce(child.value.len()))?;
                    interest.nonce = Some(u32::from_be_bytes(bytes));
                }
                tlv_types::INTEREST_LIFETIME => {
                    interest.lifetime = Duration::from_millis(child.nni()?);
                }
                tlv_types::HOP_LIMIT => match child.value.as_slice() {
                    [h] => interest.hop_limit = Some(*h),
                    other => return Err(PacketError::BadHopLimit(other.len())),
                },
                tlv_types::APPLICATION_PARAMETERS => {
                    interest.application_parameters = Some(child.value);
                }
                _ => {} // Ignore unknown non-critical elements
            }
        }

        interest.name = name.ok_or(PacketError::Missing("Name"))?;
        Ok(interest)
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_tlv().encode()
    }
}

fn decode_forwarding_hint(element: &TlvElement) -> Result<Vec<Delegation>, PacketError> {
    let mut delegations = Vec::new();
    for delegation in element.children()? {
        if delegation.type_ != tlv_types::DELEGATION {
            return Err(PacketError::UnexpectedType(delegation.type_));
        }
        let mut preference = None;
        let mut name = None;
        for field in delegation.children()? {
            match field.type_ {
                tlv_types::PREFERENCE => preference = Some(field.nni()?),
                tlv_types::NAME => name = Some(Name::from_tlv(&field)?),
                other => return Err(PacketError::UnexpectedType(other)),
            }
        }
        delegations.push(Delegation {
            preference: preference.ok_or(PacketError::Missing("Preference"))?,
            name: name.ok_or(PacketError::Missing("Delegation Name"))?,
        });
    }
    Ok(delegations)
}

/// Content type for Data packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContentType {
    #[default]
    Blob,
    Link,
    Key,
    Nack,
    Other(u64),
}

impl ContentType {
    pub fn code(self) -> u64 {
        match self {
            ContentType::Blob => 0,
            ContentType::Link => 1,
            ContentType::Key => 2,
            ContentType::Nack => 3,
            ContentType::Other(code) => code,
        }
    }

    pub fn from_code(code: u64) -> Self {
        match code {
            0 => ContentType::Blob,
            1 => ContentType::Link,
            2 => ContentType::Key,
            3 => ContentType::Nack,
            other => ContentType::Other(other),
        }
    }
}

/// Data packet structure
///
/// Signature elements are carried as opaque TLV values and re-emitted
/// unchanged on egress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub name: Name,
    pub content_type: ContentType,
    pub freshness_period: Duration,
    pub final_block_id: Option<Vec<u8>>,
    pub content: Vec<u8>,
    pub signature_info: Option<Vec<u8>>,
    pub signature_value: Option<Vec<u8>>,
}

impl Data {
    /// Create a new Data packet with the given name and content
    pub fn new(name: Name, content: Vec<u8>) -> Self {
        Self {
            name,
            content_type: ContentType::Blob,
            freshness_period: Duration::ZERO,
            final_block_id: None,
            content,
            signature_info: None,
            signature_value: None,
        }
    }

    pub fn with_freshness_period(mut self, freshness_period: Duration) -> Self {
        self.freshness_period = freshness_period;
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Whether a router may keep this Data in its Content Store
    pub fn is_cacheable(&self) -> bool {
        self.content_type != ContentType::Nack
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut elements = vec![self.name.to_tlv()];

        let mut meta = Vec::new();
        if self.content_type != ContentType::Blob {
            meta.push(TlvElement::new_nni(tlv_types::CONTENT_TYPE, self.content_type.code()));
        }
        if !self.freshness_period.is_zero() {
            meta.push(TlvElement::new_nni(
                tlv_types::FRESHNESS_PERIOD,
                self.freshness_period.as_millis() as u64,
            ));
        }
        if let Some(final_block_id) = &self.final_block_id {
            meta.push(TlvElement::new(tlv_types::FINAL_BLOCK_ID, final_block_id.clone()));
        }
        if !meta.is_empty() {
            elements.push(TlvElement::nested(tlv_types::META_INFO, &meta));
        }

        elements.push(TlvElement::new(tlv_types::CONTENT, self.content.clone()));
        if let Some(info) = &self.signature_info {
            elements.push(TlvElement::new(tlv_types::SIGNATURE_INFO, info.clone()));
        }
        if let Some(value) = &self.signature_value {
            elements.push(TlvElement::new(tlv_types::SIGNATURE_VALUE, value.clone()));
        }
        TlvElement::nested(tlv_types::DATA, &elements)
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, PacketError> {
        if element.type_ != tlv_types::DATA {
            return Err(PacketError::UnexpectedType(element.type_));
        }

        let mut name = None;
        let mut data = Data::new(Name::new(), Vec::new());

        for child in element.children()? {
            match child.type_ {
                tlv_types::NAME => name = Some(Name::from_tlv(&child)?),
                tlv_types::META_INFO => {
                    for field in child.children()? {
                        match field.type_ {
                            tlv_types::CONTENT_TYPE => {
                                data.content_type = ContentType::from_code(field.nni()?);
                            }
                            tlv_types::FRESHNESS_PERIOD => {
                                data.freshness_period = Duration::from_millis(field.nni()?);
                            }
                            tlv_types::FINAL_BLOCK_ID => data.final_block_id = Some(field.value),
                            _ => {}
                        }
                    }
                }
                tlv_types::CONTENT => data.content = child.value,
                tlv_types::SIGNATURE_INFO => data.signature_info = Some(child.value),
                tlv_types::SIGNATURE_VALUE => data.signature_value = Some(child.value),
                _ => {}
            }
        }

        data.name = name.ok_or(PacketError::Missing("Name"))?;
        Ok(data)
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_tlv().encode()
    }
}

/// Reason carried in a Nack header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NackReason {
    Congestion,
    Duplicate,
    NoRoute,
    /// Nack header without a NackReason element
    Unspecified,
    Other(u8),
}

impl NackReason {
    pub fn code(self) -> Option<u8> {
        match self {
            NackReason::Congestion => Some(50),
            NackReason::Duplicate => Some(100),
            NackReason::NoRoute => Some(150),
            NackReason::Unspecified => None,
            NackReason::Other(code) => Some(code),
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            50 => NackReason::Congestion,
            100 => NackReason::Duplicate,
            150 => NackReason::NoRoute,
            other => NackReason::Other(other),
        }
    }
}

/// Negative acknowledgement: the rejected Interest plus a reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nack {
    pub reason: NackReason,
    pub interest: Interest,
}

impl Nack {
    pub fn new(reason: NackReason, interest: Interest) -> Self {
        Self { reason, interest }
    }
}

/// Network layer packet types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Interest(Interest),
    Data(Data),
    Nack(Nack),
}

impl Packet {
    /// Get the name of the packet
    pub fn name(&self) -> &Name {
        match self {
            Packet::Interest(interest) => &interest.name,
            Packet::Data(data) => &data.name,
            Packet::Nack(nack) => &nack.interest.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Interest(_) => "Interest",
            Packet::Data(_) => "Data",
            Packet::Nack(_) => "Nack",
        }
    }
}

impl From<Interest> for Packet {
    fn from(interest: Interest) -> Self {
        Packet::Interest(interest)
    }
}

impl From<Data> for Packet {
    fn from(data: Data) -> Self {
        Packet::Data(data)
    }
}

impl From<Nack> for Packet {
    fn from(nack: Nack) -> Self {
        Packet::Nack(nack)
    }
}

/// NDNLPv2 frame: link-layer headers around one network layer packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LpPacket {
    /// Opaque correlator, 0 when absent
    pub pit_token: u64,
    pub congestion_mark: u8,
    pub packet: Packet,
}

impl LpPacket {
    pub fn new(packet: impl Into<Packet>) -> Self {
        Self {
            pit_token: 0,
            congestion_mark: 0,
            packet: packet.into(),
        }
    }

    pub fn with_pit_token(mut self, pit_token: u64) -> Self {
        self.pit_token = pit_token;
        self
    }

    /// Parse one packet as received from a face
    pub fn decode(wire: &[u8]) -> Result<Self, PacketError> {
        if wire.len() > MAX_PACKET_SIZE {
            return Err(PacketError::TooLarge(wire.len()));
        }
        let (outer, consumed) = TlvElement::decode(wire)?;
        if consumed != wire.len() {
            return Err(PacketError::TrailingBytes);
        }

        match outer.type_ {
            tlv_types::INTEREST => Ok(Self::new(Interest::from_tlv(&outer)?)),
            tlv_types::DATA => Ok(Self::new(Data::from_tlv(&outer)?)),
            tlv_types::LP_PACKET => decode_lp(&outer),
            other => Err(PacketError::UnexpectedType(other)),
        }
    }

    fn to_tlv(&self) -> TlvElement {
        let (payload, nack_reason) = match &self.packet {
            Packet::Interest(interest) => (interest.to_tlv(), None),
            Packet::Data(data) => (data.to_tlv(), None),
            Packet::Nack(nack) => (nack.interest.to_tlv(), Some(nack.reason)),
        };

        let mut headers = Vec::new();
        if self.pit_token != 0 {
            headers.push(TlvElement::new(
                tlv_types::PIT_TOKEN,
                self.pit_token.to_le_bytes().to_vec(),
            ));
        }
        if let Some(reason) = nack_reason {
            let value = match reason.code() {
                Some(code) => vec![TlvElement::new_nni(tlv_types::NACK_REASON, code as u64)],
                None => vec![],
            };
            headers.push(TlvElement::nested(tlv_types::NACK, &value));
        }
        if self.congestion_mark != 0 {
            headers.push(TlvElement::new_nni(
                tlv_types::CONGESTION_MARK,
                self.congestion_mark as u64,
            ));
        }

        if headers.is_empty() {
            return payload;
        }
        headers.push(TlvElement::new(tlv_types::LP_PAYLOAD, payload.encode()));
        TlvElement::nested(tlv_types::LP_PACKET, &headers)
    }

    /// Number of bytes `encode_into` will append
    pub fn encoded_length(&self) -> usize {
        self.to_tlv().encoded_length()
    }

    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        self.to_tlv().write_into(buffer);
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_tlv().encode()
    }
}

fn can_ignore_lp_header(type_: u32) -> bool {
    (800..=959).contains(&type_) && type_ & 0x3 == 0
}

fn nni_u8(element: &TlvElement) -> Result<u8, PacketError> {
    let n = element.nni()?;
    u8::try_from(n).map_err(|_| PacketError::LengthOverflow(n))
}

fn nni_u16(element: &TlvElement) -> Result<u16, PacketError> {
    let n = element.nni()?;
    u16::try_from(n).map_err(|_| PacketError::LengthOverflow(n))
}

fn decode_lp(outer: &TlvElement) -> Result<LpPacket, PacketError> {
    let mut pit_token = 0;
    let mut congestion_mark = 0;
    let mut nack_reason = None;
    let mut frag_index = 0u16;
    let mut frag_count = 1u16;
    let mut payload = None;

    for header in outer.children()? {
        if payload.is_some() {
            // LpPayload must be the last field
            return Err(PacketError::TrailingBytes);
        }
        match header.type_ {
            tlv_types::LP_PAYLOAD => payload = Some(header.value),
            tlv_types::LP_SEQ_NO => {
                header.nni()?;
            }
            tlv_types::FRAG_INDEX => frag_index = nni_u16(&header)?,
            tlv_types::FRAG_COUNT => frag_count = nni_u16(&header)?,
            tlv_types::PIT_TOKEN => {
                let bytes: [u8; 8] = header
                    .value
                    .as_slice()
                    .try_into()
                    .map_err(|_| PacketError::BadPitToken(header.value.len()))?;
                pit_token = u64::from_le_bytes(bytes);
            }
            tlv_types::NACK => {
                let reason = match decode_tlv_sequence(&header.value)?.first() {
                    Some(field) if field.type_ == tlv_types::NACK_REASON => {
                        NackReason::from_code(nni_u8(field)?)
                    }
                    _ => NackReason::Unspecified,
                };
                nack_reason = Some(reason);
            }
            tlv_types::CONGESTION_MARK => congestion_mark = nni_u8(&header)?,
            other if can_ignore_lp_header(other) => {}
            other => return Err(PacketError::UnknownCriticalLpHeader(other)),
        }
    }

    if frag_index >= frag_count {
        return Err(PacketError::FragIndexExceedFragCount {
            index: frag_index,
            count: frag_count,
        });
    }
    if frag_count > 1 {
        return Err(PacketError::Fragmented(frag_count));
    }

    let payload = payload.ok_or(PacketError::Missing("LpPayload"))?;
    let (inner, consumed) = TlvElement::decode(&payload)?;
    if consumed != payload.len() {
        return Err(PacketError::TrailingBytes);
    }

    let packet = match (inner.type_, nack_reason) {
        (tlv_types::INTEREST, None) => Packet::Interest(Interest::from_tlv(&inner)?),
        (tlv_types::INTEREST, Some(reason)) => {
            Packet::Nack(Nack::new(reason, Interest::from_tlv(&inner)?))
        }
        (tlv_types::DATA, None) => Packet::Data(Data::from_tlv(&inner)?),
        (tlv_types::DATA, Some(_)) => return Err(PacketError::NackNotInterest),
        (other, _) => return Err(PacketError::UnexpectedType(other)),
    };

    Ok(LpPacket {
        pit_token,
        congestion_mark,
        packet,
    })
}
