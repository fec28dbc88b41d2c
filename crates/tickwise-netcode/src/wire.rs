//! Packet encoding
//!
//! Every packet starts with one kind byte. The rest is bincode (fixed-width
//! little-endian integers):
//!
//! ```text
//! command:  [1][entity:u32][redundancy:u8][len:u64][{tick:u32, payload:Option<I>}; len]
//! snapshot: [2][entity:u32][tick:u32][sequence:u32][state]
//! ```
//!
//! The snapshot header has a fixed size so a receiver can reject stale
//! snapshots without decoding the state. Decoding reads at most
//! `MAX_DECODE_LEN` bytes past the kind byte.

use crate::{Command, CommandState, Error, Result, Snapshot};
use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tickwise_core::{EntityId, Tick};

/// Encoded size of a snapshot header
pub const SNAPSHOT_HEADER_LEN: usize = 12;

/// Most bytes a single packet body may decode from
pub const MAX_DECODE_LEN: u64 = 64 * 1024;

/// First byte of every packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    Command = 1,
    Snapshot = 2,
}

impl PacketKind {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(PacketKind::Command),
            2 => Ok(PacketKind::Snapshot),
            other => Err(Error::UnknownPacketKind(other)),
        }
    }
}

/// One command as carried on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord<I> {
    pub tick: Tick,
    pub payload: Option<I>,
}

/// The owner's most recent commands for one entity, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPacket<I> {
    pub entity: EntityId,
    /// Number of commands the sender repeats per packet
    pub redundancy: u8,
    pub records: Vec<CommandRecord<I>>,
}

impl<I> CommandPacket<I> {
    /// Newest tick carried by this packet
    pub fn newest_tick(&self) -> Option<Tick> {
        self.records.iter().map(|r| r.tick).max()
    }

    /// Turn the records back into user-created commands
    pub fn into_commands(self) -> Vec<Command<I>> {
        self.records
            .into_iter()
            .map(|r| Command::new(r.tick, r.payload).with_state(CommandState::UserCreated))
            .collect()
    }
}

/// Fixed-size prefix of a snapshot packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub entity: EntityId,
    pub tick: Tick,
    pub sequence: u32,
}

/// Read the packet kind without decoding anything else
pub fn peek_kind(bytes: &[u8]) -> Result<PacketKind> {
    let first = bytes.first().ok_or(Error::TruncatedPacket { len: 0, needed: 1 })?;
    PacketKind::from_byte(*first)
}

pub fn encode_command<I: Serialize>(packet: &CommandPacket<I>) -> Result<Vec<u8>> {
    let mut out = vec![PacketKind::Command as u8];
    bincode::serialize_into(&mut out, packet)?;
    Ok(out)
}

pub fn decode_command<I: DeserializeOwned>(bytes: &[u8]) -> Result<CommandPacket<I>> {
    expect_kind(bytes, PacketKind::Command)?;
    Ok(decode_options().deserialize(&bytes[1..])?)
}

pub fn encode_snapshot<S: Serialize>(snapshot: &Snapshot<S>) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(1 + SNAPSHOT_HEADER_LEN);
    out.push(PacketKind::Snapshot as u8);
    bincode::serialize_into(&mut out, &snapshot.header())?;
    bincode::serialize_into(&mut out, &snapshot.state)?;
    Ok(out)
}

/// Decode only the header of a snapshot packet
pub fn peek_snapshot_header(bytes: &[u8]) -> Result<SnapshotHeader> {
    expect_kind(bytes, PacketKind::Snapshot)?;
    let needed = 1 + SNAPSHOT_HEADER_LEN;
    if bytes.len() < needed {
        return Err(Error::TruncatedPacket {
            len: bytes.len(),
            needed,
        });
    }
    Ok(decode_options().deserialize(&bytes[1..needed])?)
}

pub fn decode_snapshot<S: DeserializeOwned>(bytes: &[u8]) -> Result<Snapshot<S>> {
    let header = peek_snapshot_header(bytes)?;
    let state = decode_options().deserialize(&bytes[1 + SNAPSHOT_HEADER_LEN..])?;
    Ok(Snapshot::from_header(header, state))
}

/// Same layout as `bincode::serialize`, bounded by `MAX_DECODE_LEN`
fn decode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(MAX_DECODE_LEN)
}

fn expect_kind(bytes: &[u8], expected: PacketKind) -> Result<()> {
    let kind = peek_kind(bytes)?;
    if kind != expected {
        log::trace!("expected {:?} packet, found {:?}", expected, kind);
        return Err(Error::UnknownPacketKind(kind as u8));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet() -> CommandPacket<i16> {
        CommandPacket {
            entity: EntityId(9),
            redundancy: 3,
            records: vec![
                CommandRecord {
                    tick: 101,
                    payload: Some(-4),
                },
                CommandRecord {
                    tick: 102,
                    payload: None,
                },
            ],
        }
    }

    #[test]
    fn test_command_layout() {
        let bytes = encode_command(&packet()).unwrap();
        assert_eq!(bytes[0], 1);
        // entity, then redundancy
        assert_eq!(&bytes[1..5], &9u32.to_le_bytes());
        assert_eq!(bytes[5], 3);

        let decoded: CommandPacket<i16> = decode_command(&bytes).unwrap();
        assert_eq!(decoded, packet());
        assert_eq!(decoded.newest_tick(), Some(102));
    }

    #[test]
    fn test_snapshot_header_is_fixed_size() {
        let snapshot = Snapshot {
            entity: EntityId(3),
            tick: 205,
            sequence: 17,
            state: vec![1.0f32, 2.0, 3.0],
        };
        let bytes = encode_snapshot(&snapshot).unwrap();
        assert_eq!(bytes[0], 2);
        assert_eq!(&bytes[1..5], &3u32.to_le_bytes());
        assert_eq!(&bytes[5..9], &205u32.to_le_bytes());
        assert_eq!(&bytes[9..13], &17u32.to_le_bytes());

        let header = peek_snapshot_header(&bytes[..13]).unwrap();
        assert_eq!(header.tick, 205);
        assert_eq!(header.sequence, 17);

        let decoded: Snapshot<Vec<f32>> = decode_snapshot(&bytes).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_malformed_packets() {
        assert!(matches!(peek_kind(&[]), Err(Error::TruncatedPacket { .. })));
        assert!(matches!(peek_kind(&[9]), Err(Error::UnknownPacketKind(9))));
        assert!(matches!(
            peek_snapshot_header(&[2, 0, 0]),
            Err(Error::TruncatedPacket { len: 3, needed: 13 })
        ));

        let command = encode_command(&packet()).unwrap();
        assert!(matches!(
            peek_snapshot_header(&command),
            Err(Error::UnknownPacketKind(1))
        ));
        assert!(matches!(
            decode_command::<i16>(&command[..4]),
            Err(Error::Codec(_))
        ));
    }

    #[test]
    fn test_oversized_body_rejected() {
        let mut snapshot = Snapshot {
            entity: EntityId(1),
            tick: 1,
            sequence: 1,
            state: vec![7u8; MAX_DECODE_LEN as usize],
        };
        let bytes = encode_snapshot(&snapshot).unwrap();
        assert!(matches!(
            decode_snapshot::<Vec<u8>>(&bytes),
            Err(Error::Codec(err)) if matches!(*err, bincode::ErrorKind::SizeLimit)
        ));

        snapshot.state.truncate(1024);
        let bytes = encode_snapshot(&snapshot).unwrap();
        assert_eq!(decode_snapshot::<Vec<u8>>(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn test_huge_length_prefix_fails_cleanly() {
        let mut bytes = vec![PacketKind::Command as u8];
        bytes.extend_from_slice(&5u32.to_le_bytes());
        bytes.push(3);
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(decode_command::<u32>(&bytes), Err(Error::Codec(_))));
    }
}
