use std::fmt;

/// First byte of every RTGP datagram
pub const MAGIC_BYTE: u8 = 0xA1;

/// Fixed RTGP header size in bytes
pub const HEADER_SIZE: usize = 16;

/// Default game server port
pub const DEFAULT_PORT: u16 = 4242;

/// User ID carried by server-originated packets
pub const SERVER_USER_ID: u32 = 0xFFFF_FFFF;

pub mod flags {
    pub const RELIABLE: u8 = 0x01;
    pub const IS_ACK: u8 = 0x02;
}

/// Decoded RTGP header. Bytes 13..16 are reserved and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtgpHeader {
    pub magic: u8,
    pub opcode: u8,
    pub payload_size: u16,
    pub user_id: u32,
    pub seq_id: u16,
    pub ack_id: u16,
    pub flags: u8,
}

impl RtgpHeader {
    /// Decode an RTGP header from the start of a UDP payload.
    ///
    /// Returns `None` when the buffer is shorter than [`HEADER_SIZE`] or the
    /// magic byte does not match. The opcode is not checked against the known
    /// table.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_SIZE || data[0] != MAGIC_BYTE {
            return None;
        }

        Some(Self {
            magic: data[0],
            opcode: data[1],
            payload_size: u16::from_be_bytes([data[2], data[3]]),
            user_id: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            seq_id: u16::from_be_bytes([data[8], data[9]]),
            ack_id: u16::from_be_bytes([data[10], data[11]]),
            flags: data[12],
        })
    }

    pub fn is_reliable(&self) -> bool {
        self.flags & flags::RELIABLE != 0
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::IS_ACK != 0
    }

    pub fn is_from_server(&self) -> bool {
        self.user_id == SERVER_USER_ID
    }

    pub fn op_code(&self) -> OpCode {
        OpCode::from(self.opcode)
    }
}

/// Aggregation key for a payload: the raw opcode byte if the header is valid.
pub fn classify(data: &[u8]) -> Option<u8> {
    RtgpHeader::decode(data).map(|header| header.opcode)
}

/// RTGP message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Connect,
    Accept,
    Disconnect,
    GetUsers,
    GetUsersReply,
    UpdateState,
    GameOver,
    EntitySpawn,
    EntityMove,
    EntityDestroy,
    EntityHealth,
    PowerupEvent,
    EntityMoveBatch,
    Input,
    UpdatePos,
    Ping,
    Pong,
    Unknown(u8),
}

impl From<u8> for OpCode {
    fn from(byte: u8) -> Self {
        match byte {
            0x01 => OpCode::Connect,
            0x02 => OpCode::Accept,
            0x03 => OpCode::Disconnect,
            0x04 => OpCode::GetUsers,
            0x05 => OpCode::GetUsersReply,
            0x06 => OpCode::UpdateState,
            0x07 => OpCode::GameOver,
            0x10 => OpCode::EntitySpawn,
            0x11 => OpCode::EntityMove,
            0x12 => OpCode::EntityDestroy,
            0x13 => OpCode::EntityHealth,
            0x14 => OpCode::PowerupEvent,
            0x15 => OpCode::EntityMoveBatch,
            0x20 => OpCode::Input,
            0x21 => OpCode::UpdatePos,
            0xF0 => OpCode::Ping,
            0xF1 => OpCode::Pong,
            other => OpCode::Unknown(other),
        }
    }
}

impl OpCode {
    /// Wire name used in reports, `None` for unknown values
    pub fn name(&self) -> Option<&'static str> {
        let name = match self {
            OpCode::Connect => "C_CONNECT",
            OpCode::Accept => "S_ACCEPT",
            OpCode::Disconnect => "DISCONNECT",
            OpCode::GetUsers => "C_GET_USERS",
            OpCode::GetUsersReply => "R_GET_USERS",
            OpCode::UpdateState => "S_UPDATE_STATE",
            OpCode::GameOver => "S_GAME_OVER",
            OpCode::EntitySpawn => "S_ENTITY_SPAWN",
            OpCode::EntityMove => "S_ENTITY_MOVE",
            OpCode::EntityDestroy => "S_ENTITY_DESTROY",
            OpCode::EntityHealth => "S_ENTITY_HEALTH",
            OpCode::PowerupEvent => "S_POWERUP_EVENT",
            OpCode::EntityMoveBatch => "S_ENTITY_MOVE_BATCH",
            OpCode::Input => "C_INPUT",
            OpCode::UpdatePos => "S_UPDATE_POS",
            OpCode::Ping => "PING",
            OpCode::Pong => "PONG",
            OpCode::Unknown(_) => return None,
        };
        Some(name)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpCode::Unknown(byte) => write!(f, "0x{:02X}", byte),
            known => f.write_str(known.name().unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(opcode: u8) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data[0] = MAGIC_BYTE;
        data[1] = opcode;
        data[2..4].copy_from_slice(&20u16.to_be_bytes());
        data[4..8].copy_from_slice(&SERVER_USER_ID.to_be_bytes());
        data[8..10].copy_from_slice(&7u16.to_be_bytes());
        data[10..12].copy_from_slice(&6u16.to_be_bytes());
        data[12] = flags::RELIABLE | flags::IS_ACK;
        data
    }

    #[test]
    fn test_decode_fields() {
        let header = RtgpHeader::decode(&header_bytes(0x11)).unwrap();

        assert_eq!(header.magic, MAGIC_BYTE);
        assert_eq!(header.opcode, 0x11);
        assert_eq!(header.payload_size, 20);
        assert_eq!(header.user_id, SERVER_USER_ID);
        assert_eq!(header.seq_id, 7);
        assert_eq!(header.ack_id, 6);
        assert!(header.is_reliable());
        assert!(header.is_ack());
        assert!(header.is_from_server());
        assert_eq!(header.op_code(), OpCode::EntityMove);
    }

    #[test]
    fn test_decode_rejects_short_and_bad_magic() {
        let data = header_bytes(0x01);
        assert!(RtgpHeader::decode(&data[..HEADER_SIZE - 1]).is_none());
        assert!(RtgpHeader::decode(&[]).is_none());

        let mut bad_magic = data.clone();
        bad_magic[0] = 0xA2;
        assert!(RtgpHeader::decode(&bad_magic).is_none());
    }

    #[test]
    fn test_classify_matches_second_byte() {
        for opcode in [0x00u8, 0x01, 0x10, 0x7F, 0xF1, 0xFF] {
            let mut data = header_bytes(opcode);
            data.extend_from_slice(&[0xEE; 9]);
            assert_eq!(classify(&data), Some(opcode));
            // Pure: same answer every time
            assert_eq!(classify(&data), classify(&data));
        }
    }

    #[test]
    fn test_unknown_opcode_still_valid() {
        let header = RtgpHeader::decode(&header_bytes(0x99)).unwrap();
        assert_eq!(header.op_code(), OpCode::Unknown(0x99));
        assert_eq!(header.op_code().to_string(), "0x99");
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(OpCode::from(0x01).to_string(), "C_CONNECT");
        assert_eq!(OpCode::from(0x15).to_string(), "S_ENTITY_MOVE_BATCH");
        assert_eq!(OpCode::from(0xF0).to_string(), "PING");
        assert_eq!(OpCode::from(0x0A).name(), None);
    }
}
