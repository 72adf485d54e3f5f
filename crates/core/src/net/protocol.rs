use std::fmt;

use bitflags::bitflags;
use glam::Vec2;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

use crate::clock::Tick;
use crate::snapshot::WorldSnapshot;

use super::error::ProtocolError;

pub const PROTOCOL_MAGIC: u32 = 0x5445_5448;
pub const PROTOCOL_VERSION: u32 = 1;
pub const GAME_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Hello = 0,
    RegisterPlayer = 1,
    SetPlayerInput = 2,
    AddWorldSnapshot = 3,
}

impl Command {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Command::Hello),
            1 => Some(Command::RegisterPlayer),
            2 => Some(Command::SetPlayerInput),
            3 => Some(Command::AddWorldSnapshot),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Hello => "Hello",
            Command::RegisterPlayer => "RegisterPlayer",
            Command::SetPlayerInput => "SetPlayerInput",
            Command::AddWorldSnapshot => "AddWorldSnapshot",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InputFlags: u16 {
        const FIRE = 1 << 0;
        const USE = 1 << 1;
        const RELOAD = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq, Default, Archive, Serialize, Deserialize)]
pub struct PlayerInput {
    pub sequence: u32,
    pub move_direction: [f32; 2],
    pub aim_angle: f32,
    pub flags: u16,
    pub timestamp_ms: f64,
}

impl PlayerInput {
    pub fn direction(&self) -> Vec2 {
        let direction = Vec2::from(self.move_direction);
        if direction.is_finite() {
            direction.clamp_length_max(1.0)
        } else {
            Vec2::ZERO
        }
    }

    pub fn flags(&self) -> InputFlags {
        InputFlags::from_bits_truncate(self.flags)
    }

    pub fn set_flags(&mut self, flags: InputFlags) {
        self.flags = flags.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u32,
    pub command: u8,
}

impl PacketHeader {
    pub fn new(command: Command) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            command: command.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct RegisterPlayer {
    pub name: String,
    pub game_version: String,
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct SetPlayerInput {
    pub player_id: String,
    pub input: PlayerInput,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum Request {
    RegisterPlayer(RegisterPlayer),
    SetPlayerInput(SetPlayerInput),
}

impl Request {
    pub fn command(&self) -> Command {
        match self {
            Request::RegisterPlayer(_) => Command::RegisterPlayer,
            Request::SetPlayerInput(_) => Command::SetPlayerInput,
        }
    }
}

/// Everything a client needs to join: its id, the clock anchors and the
/// current world so it can render before the first push arrives.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Registration {
    pub player_id: String,
    pub server_time_ms: f64,
    pub start_time_ms: f64,
    pub timestep_ms: f64,
    pub world: WorldSnapshot,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum RegisterOutcome {
    Accepted(Registration),
    Rejected { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct InputAck {
    pub tick: Tick,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum Response {
    RegisterPlayer(RegisterOutcome),
    SetPlayerInput(InputAck),
}

impl Response {
    pub fn command(&self) -> Command {
        match self {
            Response::RegisterPlayer(_) => Command::RegisterPlayer,
            Response::SetPlayerInput(_) => Command::SetPlayerInput,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum Push {
    AddWorldSnapshot(WorldSnapshot),
}

impl Push {
    pub fn command(&self) -> Command {
        match self {
            Push::AddWorldSnapshot(_) => Command::AddWorldSnapshot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum Payload {
    Hello { client_id: String },
    Request(Request),
    Response(Response),
    Push(Push),
}

impl Payload {
    pub fn command(&self) -> Command {
        match self {
            Payload::Hello { .. } => Command::Hello,
            Payload::Request(request) => request.command(),
            Payload::Response(response) => response.command(),
            Payload::Push(push) => push.command(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Payload,
}

impl Packet {
    pub fn new(payload: Payload) -> Self {
        Self {
            header: PacketHeader::new(payload.command()),
            payload,
        }
    }

    pub fn hello(client_id: impl Into<String>) -> Self {
        Self::new(Payload::Hello {
            client_id: client_id.into(),
        })
    }

    pub fn request(request: Request) -> Self {
        Self::new(Payload::Request(request))
    }

    pub fn response(response: Response) -> Self {
        Self::new(Payload::Response(response))
    }

    pub fn push(push: Push) -> Self {
        Self::new(Payload::Push(push))
    }

    pub fn command(&self) -> Command {
        self.payload.command()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(ProtocolError::Serialize)
    }

    /// Decodes and validates the envelope: magic, version and a command code
    /// that agrees with the payload variant.
    pub fn deserialize(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut aligned: AlignedVec = AlignedVec::with_capacity(data.len());
        aligned.extend_from_slice(data);

        let packet =
            rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(ProtocolError::Deserialize)?;
        packet.validate()?;
        Ok(packet)
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        if self.header.magic != PROTOCOL_MAGIC {
            return Err(ProtocolError::BadMagic(self.header.magic));
        }
        if self.header.version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                found: self.header.version,
            });
        }
        let header = Command::from_code(self.header.command)
            .ok_or(ProtocolError::UnknownCommand(self.header.command))?;
        let payload = self.payload.command();
        if header != payload {
            return Err(ProtocolError::CommandMismatch { header, payload });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Snapshot, TreeSnapshot};

    fn world() -> WorldSnapshot {
        WorldSnapshot::with_entities(
            42,
            vec![Snapshot::Tree(TreeSnapshot {
                id: "tree-1".to_string(),
                position: [10.0, 20.0],
                radius: 25.0,
            })],
        )
    }

    #[test]
    fn push_packet_survives_the_wire() {
        let packet = Packet::push(Push::AddWorldSnapshot(world()));
        let bytes = packet.serialize().unwrap();
        let decoded = Packet::deserialize(&bytes).unwrap();

        assert_eq!(decoded, packet);
        assert_eq!(decoded.header.command, Command::AddWorldSnapshot.code());
    }

    #[test]
    fn command_codes_are_stable() {
        assert_eq!(Command::Hello.code(), 0);
        assert_eq!(Command::RegisterPlayer.code(), 1);
        assert_eq!(Command::SetPlayerInput.code(), 2);
        assert_eq!(Command::AddWorldSnapshot.code(), 3);
        assert_eq!(Command::from_code(4), None);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut packet = Packet::hello("c1");
        packet.header.magic = 0xdead_beef;
        let bytes = packet.serialize().unwrap();

        assert!(matches!(
            Packet::deserialize(&bytes),
            Err(ProtocolError::BadMagic(0xdead_beef))
        ));
    }

    #[test]
    fn rejects_version_mismatch() {
        let mut packet = Packet::hello("c1");
        packet.header.version = PROTOCOL_VERSION + 1;
        let bytes = packet.serialize().unwrap();

        assert!(matches!(
            Packet::deserialize(&bytes),
            Err(ProtocolError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn rejects_header_payload_disagreement() {
        let mut packet = Packet::push(Push::AddWorldSnapshot(world()));
        packet.header.command = Command::RegisterPlayer.code();
        let bytes = packet.serialize().unwrap();

        assert!(matches!(
            Packet::deserialize(&bytes),
            Err(ProtocolError::CommandMismatch {
                header: Command::RegisterPlayer,
                payload: Command::AddWorldSnapshot,
            })
        ));

        packet.header.command = 99;
        let bytes = packet.serialize().unwrap();
        assert!(matches!(
            Packet::deserialize(&bytes),
            Err(ProtocolError::UnknownCommand(99))
        ));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            Packet::deserialize(&[1, 2, 3, 4, 5]),
            Err(ProtocolError::Deserialize(_))
        ));
    }

    #[test]
    fn input_direction_is_sanitized() {
        let mut input = PlayerInput {
            move_direction: [3.0, 4.0],
            ..Default::default()
        };
        assert!((input.direction().length() - 1.0).abs() < 1e-5);

        input.move_direction = [f32::NAN, 0.0];
        assert_eq!(input.direction(), Vec2::ZERO);

        input.set_flags(InputFlags::FIRE | InputFlags::RELOAD);
        assert!(input.flags().contains(InputFlags::FIRE));
        assert!(!input.flags().contains(InputFlags::USE));
    }
}
