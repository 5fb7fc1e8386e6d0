// world_server/server/src/network/opcodes.rs
use crate::core::error::FramingError;
use std::convert::TryFrom;

/// Wire opcodes shared between client and server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum OpCode {
    // Session and world
    JwtLogin = 0x0001,
    JwtResponse = 0x0002,
    CharacterList = 0x0003,
    CharacterCreate = 0x0004,
    CharacterCreateResult = 0x0005,
    DeleteCharacter = 0x0006,
    EnterWorld = 0x0007,
    PostEnterWorld = 0x0008,
    ZoneSession = 0x0009,
    ZoneSessionValid = 0x000A,
    SessionAssigned = 0x000B,

    // Zone
    RequestClientZoneChange = 0x0020,
    NewZone = 0x0021,
    PlayerProfile = 0x0022,
    BatchZoneSpawns = 0x0023,
    ZoneSpawns = 0x0024,
    DeleteSpawn = 0x0025,
    ClientUpdate = 0x0026,
    SpawnPositionUpdate = 0x0027,
    Animation = 0x0028,
    ChannelMessage = 0x0029,
    ZoneChange = 0x002A,
    ZoneChangeAccepted = 0x002B,
    Logout = 0x002C,
}

impl OpCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Opcodes handled by the world layer without an assigned zone.
    pub fn is_global(self) -> bool {
        matches!(
            self,
            OpCode::JwtLogin
                | OpCode::CharacterCreate
                | OpCode::DeleteCharacter
                | OpCode::EnterWorld
                | OpCode::ZoneSession
        )
    }

    /// The only opcodes accepted before a session authenticates.
    pub fn allowed_unauthenticated(self) -> bool {
        matches!(self, OpCode::JwtLogin)
    }
}

impl TryFrom<u16> for OpCode {
    type Error = FramingError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        let op = match raw {
            0x0001 => OpCode::JwtLogin,
            0x0002 => OpCode::JwtResponse,
            0x0003 => OpCode::CharacterList,
            0x0004 => OpCode::CharacterCreate,
            0x0005 => OpCode::CharacterCreateResult,
            0x0006 => OpCode::DeleteCharacter,
            0x0007 => OpCode::EnterWorld,
            0x0008 => OpCode::PostEnterWorld,
            0x0009 => OpCode::ZoneSession,
            0x000A => OpCode::ZoneSessionValid,
            0x000B => OpCode::SessionAssigned,
            0x0020 => OpCode::RequestClientZoneChange,
            0x0021 => OpCode::NewZone,
            0x0022 => OpCode::PlayerProfile,
            0x0023 => OpCode::BatchZoneSpawns,
            0x0024 => OpCode::ZoneSpawns,
            0x0025 => OpCode::DeleteSpawn,
            0x0026 => OpCode::ClientUpdate,
            0x0027 => OpCode::SpawnPositionUpdate,
            0x0028 => OpCode::Animation,
            0x0029 => OpCode::ChannelMessage,
            0x002A => OpCode::ZoneChange,
            0x002B => OpCode::ZoneChangeAccepted,
            0x002C => OpCode::Logout,
            other => return Err(FramingError::UnknownOpcode(other)),
        };
        Ok(op)
    }
}

impl From<OpCode> for u16 {
    fn from(op: OpCode) -> u16 {
        op as u16
    }
}
