//! Frame reassembly and the link-level ack/retransmit handshake.
//!
//! Once the link is in sync, every byte from the host belongs to an 18 byte
//! frame. Frames are rebuilt here one byte at a time; good ones are queued for
//! the state machine and acknowledged, ones failing the CRC are answered with a
//! retransmit request. Judging the contents is left to the state machine.
//! The host does the same for our frames.

use embedded_hal::serial;
use heapless::Deque;

use crate::{
    consts::RX_QUEUE_DEPTH,
    packet::{Packet, PacketKind, PACKET_DATA_BYTES},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Length,
    Data { idx: usize },
    Checksum,
}

pub struct Comms<S> {
    serial: S,
    rx_state: RxState,
    rx_packet: Packet,
    last_tx: Packet,
    queue: Deque<Packet, RX_QUEUE_DEPTH>,
}

impl<S> Comms<S>
where
    S: serial::Read<u8> + serial::Write<u8>,
{
    pub fn new(serial: S) -> Self {
        Self {
            serial,
            rx_state: RxState::Length,
            rx_packet: Packet::empty(),
            last_tx: Packet::single_byte(PacketKind::Ack),
            queue: Deque::new(),
        }
    }

    /// Take one raw byte off the wire, if there is one.
    ///
    /// Only used before sync; afterwards [`Comms::update`] owns the stream.
    pub fn read_byte(&mut self) -> Option<u8> {
        match self.serial.read() {
            Ok(byte) => Some(byte),
            Err(nb::Error::WouldBlock) => None,
            Err(nb::Error::Other(_)) => {
                sprkt_log!(warn, "UART read error, byte lost");
                None
            }
        }
    }

    /// Drain the UART, completing as many frames as the bytes allow.
    pub fn update(&mut self) {
        while let Some(byte) = self.read_byte() {
            match self.rx_state {
                RxState::Length => {
                    self.rx_packet.length = byte;
                    self.rx_state = RxState::Data { idx: 0 };
                }
                RxState::Data { idx } => {
                    self.rx_packet.data[idx] = byte;
                    self.rx_state = if idx + 1 >= PACKET_DATA_BYTES {
                        RxState::Checksum
                    } else {
                        RxState::Data { idx: idx + 1 }
                    };
                }
                RxState::Checksum => {
                    self.rx_packet.checksum = byte;
                    self.rx_state = RxState::Length;
                    self.accept_frame();
                }
            }
        }
    }

    fn accept_frame(&mut self) {
        let packet = self.rx_packet;

        if !packet.verify() {
            sprkt_log!(warn, "Bad checksum, requesting retransmit");
            self.send_link(PacketKind::Retransmit);
            return;
        }

        if packet.is_single_byte(PacketKind::Retransmit) {
            sprkt_log!(info, "Retransmitting last packet");
            let last = self.last_tx;
            self.send_frame(&last);
            return;
        }

        if packet.is_single_byte(PacketKind::Ack) {
            return;
        }

        if self.queue.push_back(packet).is_err() {
            sprkt_log!(error, "Rx queue full, frame dropped!");
            return;
        }

        self.send_link(PacketKind::Ack);
    }

    /// Move the oldest queued frame into `out`.
    ///
    /// Returns false and leaves `out` alone when nothing is queued.
    pub fn read(&mut self, out: &mut Packet) -> bool {
        match self.queue.pop_front() {
            Some(packet) => {
                *out = packet;
                true
            }
            None => false,
        }
    }

    /// Send a protocol packet and remember it for retransmission.
    pub fn write(&mut self, packet: &Packet) {
        self.send_frame(packet);
        self.last_tx = *packet;
    }

    pub fn write_single(&mut self, kind: PacketKind) {
        let packet = Packet::single_byte(kind);
        self.write(&packet);
    }

    // Link frames are never what the host wants repeated
    fn send_link(&mut self, kind: PacketKind) {
        let packet = Packet::single_byte(kind);
        self.send_frame(&packet);
    }

    fn send_frame(&mut self, packet: &Packet) {
        for byte in packet.to_bytes().iter() {
            if nb::block!(self.serial.write(*byte)).is_err() {
                sprkt_log!(error, "UART write failed!");
                return;
            }
        }
    }

    pub fn release(self) -> S {
        self.serial
    }
}
