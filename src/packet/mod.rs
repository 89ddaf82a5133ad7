//! Classification of host packets by the name of their runtime type.
//!
//! Host packet names follow one of two conventions. Modern names look like
//! `ClientboundLoginFinishedPacket` and only encode the direction, while legacy
//! names look like `PacketLoginOutSuccess` and encode both the stage and the
//! direction. Fields of a classified packet are addressed by position, either
//! among all of its fields or among the fields of one exact type.

mod direction;
mod stage;

pub use self::direction::Direction;
pub use self::stage::Stage;

use crate::introspect::{
    self, descriptor_of, FieldDescriptor, Reflect, Selector, TypeDescriptor, Value,
};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

lazy_static! {
    static ref PACKET_PATTERN: Regex =
        Regex::new(r"^(Clientbound|Serverbound)(.+)Packet$").unwrap();
    static ref LEGACY_PACKET_PATTERN: Regex =
        Regex::new(r"^Packet(Handshaking|Login|Play|Status)(In|Out)(.+)$").unwrap();
}

/// Derive the stage, direction and short name of a packet from its type name.
/// Modern names are tried before legacy names.
///
/// # Examples
///
/// ```
/// # use pipetap::packet::{classify_name, Direction, Stage};
/// let (stage, direction, name) = classify_name("PacketLoginInStart").unwrap();
/// assert_eq!(stage, Stage::Login);
/// assert_eq!(direction, Direction::Serverbound);
/// assert_eq!(name, "Start");
///
/// let (stage, direction, name) = classify_name("ClientboundSetTimePacket").unwrap();
/// assert_eq!(stage, Stage::Unknown);
/// assert_eq!(direction, Direction::Clientbound);
/// assert_eq!(name, "SetTime");
///
/// assert!(classify_name("SomeRandomClass").is_none());
/// ```
pub fn classify_name(type_name: &str) -> Option<(Stage, Direction, String)> {
    if let Some(captures) = PACKET_PATTERN.captures(type_name) {
        let direction = Direction::from_token(&captures[1])?;
        return Some((Stage::Unknown, direction, captures[2].to_string()));
    }

    if let Some(captures) = LEGACY_PACKET_PATTERN.captures(type_name) {
        let stage = Stage::from_legacy_token(&captures[1]);
        let direction = Direction::from_token(&captures[2])?;
        return Some((stage, direction, captures[3].to_string()));
    }

    None
}

/// A classified host packet
pub struct Packet<'a> {
    handle: &'a mut dyn Reflect,
    descriptor: Arc<TypeDescriptor>,
    stage: Stage,
    direction: Direction,
    name: String,
}

impl<'a> Packet<'a> {
    /// Classify the given host object. Objects outside of `namespace`, or
    /// whose type name matches neither naming convention, are not packets.
    pub fn classify(handle: &'a mut dyn Reflect, namespace: &str) -> Option<Packet<'a>> {
        let descriptor = descriptor_of(&*handle);
        if !descriptor.namespace().starts_with(namespace) {
            return None;
        }

        let (stage, direction, name) = classify_name(descriptor.name())?;
        Some(Packet {
            handle,
            descriptor,
            stage,
            direction,
            name,
        })
    }

    /// Get the underlying host object
    pub fn handle(&self) -> &dyn Reflect {
        &*self.handle
    }

    /// Get the underlying host object mutably
    pub fn handle_mut(&mut self) -> &mut dyn Reflect {
        &mut *self.handle
    }

    /// Get the descriptor of the packet type
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// The stage of this packet. Modern packet names do not encode a stage,
    /// so this is `Stage::Unknown` for them.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The direction of this packet
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The short name of this packet, e.g. `Start` for `PacketLoginInStart`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full type name of this packet
    pub fn full_name(&self) -> &str {
        self.descriptor.name()
    }

    /// All instance fields of this packet, derived before inherited
    pub fn fields(&self) -> Vec<&FieldDescriptor> {
        self.descriptor.all_fields()
    }

    fn field(&self, position: usize) -> introspect::Result<&FieldDescriptor> {
        let fields = self.descriptor.all_fields();
        let len = fields.len();
        fields
            .into_iter()
            .nth(position)
            .ok_or(introspect::Error::OutOfRange { position, len })
    }

    /// Read the raw value of the field at `position`
    pub fn value_at(&self, position: usize) -> introspect::Result<Option<Value>> {
        self.field(position)?.get(&*self.handle)
    }

    /// Read the field at `position`
    pub fn field_at<T: 'static>(&self, position: usize) -> introspect::Result<Option<T>> {
        self.field(position)?.get_as(&*self.handle)
    }

    /// Overwrite the field at `position`
    pub fn set_field_at<T: Send + 'static>(
        &mut self,
        position: usize,
        value: T,
    ) -> introspect::Result<()> {
        let descriptor = Arc::clone(&self.descriptor);
        let fields = descriptor.all_fields();
        let len = fields.len();
        let field = fields
            .into_iter()
            .nth(position)
            .ok_or(introspect::Error::OutOfRange { position, len })?;

        field.set(&mut *self.handle, Box::new(value))
    }

    /// Read the field at `position` among the fields declared exactly as `T`
    pub fn field_of_type_at<T: 'static>(&self, position: usize) -> introspect::Result<Option<T>> {
        self.descriptor
            .field_at(Selector::exact::<T>(), position)?
            .get_as(&*self.handle)
    }

    /// Overwrite the field at `position` among the fields declared exactly as
    /// `T`
    pub fn set_field_of_type_at<T: Send + 'static>(
        &mut self,
        position: usize,
        value: T,
    ) -> introspect::Result<()> {
        let descriptor = Arc::clone(&self.descriptor);
        descriptor
            .field_at(Selector::exact::<T>(), position)?
            .set(&mut *self.handle, Box::new(value))
    }
}

impl<'a> fmt::Debug for Packet<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Packet")
            .field("handle", &self.full_name())
            .field("stage", &self.stage)
            .field("direction", &self.direction)
            .field("name", &self.name)
            .finish()
    }
}

impl<'a> fmt::Display for Packet<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Packet{{handle={}, stage={}, direction={}, name={}}}",
            self.full_name(),
            self.stage,
            self.direction,
            self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Identity;
    use assert_matches::assert_matches;
    use uuid::Uuid;

    const NAMESPACE: &str = "net.minecraft";

    crate::host_type! {
        struct PacketLoginInStart("net.minecraft.server.v1_8_R3") {
            name: String,
            profile: Identity,
            fallback: Identity,
            retries: u8,
        }
    }

    crate::host_type! {
        struct ClientboundSetTimePacket("net.minecraft.network.protocol.game") {
            game_time: i64,
            day_time: i64,
        }
    }

    crate::host_type! {
        struct PacketPlayOutChat("org.example.fake") {
            message: String,
        }
    }

    crate::host_type! {
        struct SomeRandomClass("net.minecraft.util") {
            value: u32,
        }
    }

    fn login_start() -> PacketLoginInStart {
        PacketLoginInStart {
            name: "Notch".to_string(),
            profile: Identity::new(Uuid::from_u128(1), "Notch"),
            fallback: Identity::new(Uuid::from_u128(2), "jeb_"),
            retries: 0,
        }
    }

    #[test]
    fn modern_names_encode_direction_only() {
        assert_eq!(
            classify_name("ClientboundSetTimePacket"),
            Some((Stage::Unknown, Direction::Clientbound, "SetTime".to_string()))
        );
        assert_eq!(
            classify_name("ServerboundHelloPacket"),
            Some((Stage::Unknown, Direction::Serverbound, "Hello".to_string()))
        );
        assert_eq!(
            classify_name("ClientboundLoginFinishedPacket"),
            Some((Stage::Unknown, Direction::Clientbound, "LoginFinished".to_string()))
        );
    }

    #[test]
    fn legacy_names_encode_stage_and_direction() {
        let cases = [
            ("PacketHandshakingInSetProtocol", Stage::Handshake, Direction::Serverbound, "SetProtocol"),
            ("PacketLoginInStart", Stage::Login, Direction::Serverbound, "Start"),
            ("PacketLoginOutSuccess", Stage::Login, Direction::Clientbound, "Success"),
            ("PacketPlayOutChat", Stage::Play, Direction::Clientbound, "Chat"),
            ("PacketStatusInPing", Stage::Query, Direction::Serverbound, "Ping"),
        ];

        for (name, stage, direction, short) in &cases {
            assert_eq!(
                classify_name(name),
                Some((*stage, *direction, short.to_string())),
                "{}",
                name
            );
        }
    }

    #[test]
    fn unmatched_names_are_not_packets() {
        assert_eq!(classify_name("SomeRandomClass"), None);
        assert_eq!(classify_name("PacketConfigurationInFinish"), None);
        assert_eq!(classify_name("MyClientboundHelloPacket"), None);
        assert_eq!(classify_name("PacketPlayOut"), None);
        assert_eq!(classify_name("ClientboundPacket"), None);
    }

    #[test]
    fn only_the_protocol_namespace_is_classified() {
        let mut chat = PacketPlayOutChat {
            message: "hi".to_string(),
        };
        let mut random = SomeRandomClass { value: 1 };
        let mut time = ClientboundSetTimePacket {
            game_time: 1,
            day_time: 2,
        };

        assert!(Packet::classify(&mut chat, NAMESPACE).is_none());
        assert!(Packet::classify(&mut random, NAMESPACE).is_none());

        let packet = Packet::classify(&mut time, NAMESPACE).unwrap();
        assert_eq!(packet.full_name(), "ClientboundSetTimePacket");
        assert_eq!(
            packet.to_string(),
            "Packet{handle=ClientboundSetTimePacket, stage=UNKNOWN, direction=CLIENTBOUND, name=SetTime}"
        );
    }

    #[test]
    fn positional_fields_round_trip() {
        let mut start = login_start();
        let mut packet = Packet::classify(&mut start, NAMESPACE).unwrap();

        assert_eq!(packet.fields().len(), 4);
        assert_eq!(packet.field_at::<String>(0).unwrap(), Some("Notch".to_string()));

        packet.set_field_at(0, "Dinnerbone".to_string()).unwrap();
        packet.set_field_at(3, 5u8).unwrap();
        assert_eq!(
            packet.field_at::<String>(0).unwrap(),
            Some("Dinnerbone".to_string())
        );
        assert_eq!(packet.field_at::<u8>(3).unwrap(), Some(5));

        drop(packet);
        assert_eq!(start.name, "Dinnerbone");
        assert_eq!(start.retries, 5);
    }

    #[test]
    fn typed_fields_are_addressed_by_declaration_order() {
        let mut start = login_start();
        let mut packet = Packet::classify(&mut start, NAMESPACE).unwrap();

        assert_eq!(
            packet.field_of_type_at::<Identity>(1).unwrap().map(|i| i.id()),
            Some(Uuid::from_u128(2))
        );

        let replacement = Identity::new(Uuid::from_u128(9), "Grumm");
        packet
            .set_field_of_type_at(0, replacement.clone())
            .unwrap();
        assert_eq!(packet.field_of_type_at::<Identity>(0).unwrap(), Some(replacement));
    }

    #[test]
    fn out_of_range_positions_are_rejected() {
        let mut start = login_start();
        let mut packet = Packet::classify(&mut start, NAMESPACE).unwrap();

        assert_matches!(
            packet.field_at::<String>(4),
            Err(introspect::Error::OutOfRange { position: 4, len: 4 })
        );
        assert_matches!(
            packet.field_of_type_at::<Identity>(2),
            Err(introspect::Error::OutOfRange { position: 2, len: 2 })
        );
        assert_matches!(
            packet.set_field_of_type_at(0, 1u64),
            Err(introspect::Error::OutOfRange { position: 0, len: 0 })
        );
    }

    #[test]
    fn mismatched_values_are_invalid_arguments() {
        let mut start = login_start();
        let mut packet = Packet::classify(&mut start, NAMESPACE).unwrap();

        assert_matches!(
            packet.set_field_at(0, 42u32),
            Err(introspect::Error::InvalidArgument(_))
        );
        assert_matches!(
            packet.field_at::<u32>(0),
            Err(introspect::Error::InvalidArgument(_))
        );
    }
}
