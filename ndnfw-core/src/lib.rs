//! Names, TLV codec and packet model shared by the forwarder crates.

pub mod name;
pub mod packets;
pub mod tlv;

pub use name::{Name, NameComponent, NameParseError};
pub use packets::tlv_types;
pub use packets::{
    ContentType, Data, Delegation, Interest, LpPacket, Nack, NackReason, Packet, PacketError,
};
pub use tlv::{TlvElement, TlvError};
