//! Fixed-shape frames exchanged with the host once the link is in sync.
//!
//! On the wire every frame is `[length][16 data bytes][crc8]`. The low nibble
//! of `length` holds the payload size minus one, and every data byte after the
//! payload is the [`PADDING_BYTE`] sentinel. Control frames carry a single
//! [`PacketKind`] byte; the device ID and firmware length responses carry the
//! kind byte followed by their argument.

use crc::{Crc, CRC_8_SMBUS};

pub const PACKET_LENGTH_BYTES: usize = 1;
pub const PACKET_DATA_BYTES: usize = 16;
pub const PACKET_CRC_BYTES: usize = 1;
pub const PACKET_CRC_INDEX: usize = PACKET_LENGTH_BYTES + PACKET_DATA_BYTES;
pub const PACKET_FRAME_BYTES: usize = PACKET_LENGTH_BYTES + PACKET_DATA_BYTES + PACKET_CRC_BYTES;

pub const PADDING_BYTE: u8 = 0xFF;

const LENGTH_MASK: u8 = 0x0F;

/// CRC-8, poly 0x07, init 0x00, no reflection, no final xor
pub const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum PacketKind {
    Ack = 0x15,
    Retransmit = 0x19,
    SyncObserved = 0x20,
    FwUpdateRequest = 0x31,
    FwUpdateResponse = 0x37,
    DeviceIdRequest = 0x3C,
    DeviceIdResponse = 0x3F,
    FwLengthRequest = 0x42,
    FwLengthResponse = 0x45,
    ReadyForData = 0x48,
    UpdateSuccessful = 0x54,
    Nack = 0x59,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct Packet {
    pub length: u8,
    pub data: [u8; PACKET_DATA_BYTES],
    pub checksum: u8,
}

impl Packet {
    /// A one byte, all-padding packet. Used as the reusable rx/tx buffer.
    pub const fn empty() -> Self {
        Self {
            length: 0,
            data: [PADDING_BYTE; PACKET_DATA_BYTES],
            checksum: 0,
        }
    }

    /// A control packet carrying only `kind`.
    pub fn single_byte(kind: PacketKind) -> Self {
        let mut packet = Self::empty();
        packet.data[0] = kind as u8;
        packet.checksum = packet.compute_checksum();
        packet
    }

    /// Pack 1..=16 payload bytes. Returns `None` for any other length.
    pub fn with_payload(payload: &[u8]) -> Option<Self> {
        if payload.is_empty() || payload.len() > PACKET_DATA_BYTES {
            return None;
        }

        let mut packet = Self::empty();
        packet.length = (payload.len() - 1) as u8;
        packet.data[..payload.len()].copy_from_slice(payload);
        packet.checksum = packet.compute_checksum();
        Some(packet)
    }

    /// What the host answers to a device ID request.
    pub fn device_id_response(device_id: u8) -> Self {
        let mut packet = Self::empty();
        packet.length = 1;
        packet.data[0] = PacketKind::DeviceIdResponse as u8;
        packet.data[1] = device_id;
        packet.checksum = packet.compute_checksum();
        packet
    }

    /// What the host answers to a firmware length request.
    pub fn fw_length_response(fw_length: u32) -> Self {
        let mut packet = Self::empty();
        packet.length = 4;
        packet.data[0] = PacketKind::FwLengthResponse as u8;
        packet.data[1..5].copy_from_slice(&fw_length.to_le_bytes());
        packet.checksum = packet.compute_checksum();
        packet
    }

    pub fn from_bytes(frame: &[u8; PACKET_FRAME_BYTES]) -> Self {
        let mut data = [0u8; PACKET_DATA_BYTES];
        data.copy_from_slice(&frame[PACKET_LENGTH_BYTES..PACKET_CRC_INDEX]);
        Self {
            length: frame[0],
            data,
            checksum: frame[PACKET_CRC_INDEX],
        }
    }

    pub fn to_bytes(&self) -> [u8; PACKET_FRAME_BYTES] {
        let mut frame = [0u8; PACKET_FRAME_BYTES];
        frame[0] = self.length;
        frame[PACKET_LENGTH_BYTES..PACKET_CRC_INDEX].copy_from_slice(&self.data);
        frame[PACKET_CRC_INDEX] = self.checksum;
        frame
    }

    /// Decoded payload size, always in 1..=16.
    pub fn payload_len(&self) -> usize {
        (self.length & LENGTH_MASK) as usize + 1
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.payload_len()]
    }

    pub fn compute_checksum(&self) -> u8 {
        let mut digest = CRC8.digest();
        digest.update(&[self.length]);
        digest.update(&self.data);
        digest.finalize()
    }

    pub fn verify(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Every byte after the declared payload must be the sentinel.
    pub fn has_valid_padding(&self) -> bool {
        self.data[self.payload_len()..]
            .iter()
            .all(|b| *b == PADDING_BYTE)
    }

    pub fn is_single_byte(&self, kind: PacketKind) -> bool {
        self.payload_len() == 1
            && self.data[0] == kind as u8
            && self.has_valid_padding()
    }

    pub fn is_device_id_response(&self, device_id: u8) -> bool {
        self.payload_len() == 2
            && self.data[0] == PacketKind::DeviceIdResponse as u8
            && self.data[1] == device_id
            && self.has_valid_padding()
    }

    /// The little-endian length carried by a firmware length response.
    pub fn fw_length(&self) -> Option<u32> {
        if self.payload_len() != 5
            || self.data[0] != PacketKind::FwLengthResponse as u8
            || !self.has_valid_padding()
        {
            return None;
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&self.data[1..5]);
        Some(u32::from_le_bytes(len_bytes))
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::empty()
    }
}
