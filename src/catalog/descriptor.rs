use uuid::Uuid;

use crate::decoder::DecoderKind;

/// One GATT service the pipeline knows how to decode.
#[derive(Debug)]
pub struct DeviceDescriptor {
    pub service: Uuid,

    pub label: &'static str,

    pub characteristics: &'static [CharacteristicDescriptor],
}

impl DeviceDescriptor {
    /// Canonical key used in records and on the wire.
    pub fn service_key(&self) -> String {
        self.service.to_string()
    }

    /// The measurement characteristic, used when a notification does not
    /// name one.
    pub fn primary(&self) -> Option<&'static CharacteristicDescriptor> {
        self.characteristics.first()
    }

    pub fn characteristic(&self, uuid: Uuid) -> Option<&'static CharacteristicDescriptor> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

#[derive(Debug)]
pub struct CharacteristicDescriptor {
    pub uuid: Uuid,

    /// Decoder for fields that do not name their own.
    pub decoder: DecoderKind,

    pub fields: &'static [FieldSpec],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,

    pub kind: FieldKind,

    pub decoder: Option<DecoderKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Always present at `offset`.
    Fixed { offset: usize },

    /// Present only when `flags & mask != 0`.
    Conditional { mask: u8, offset: FieldOffset },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOffset {
    At(usize),

    /// Directly after the previous field that was present in the payload.
    AfterPrevious,
}

impl FieldSpec {
    pub const fn fixed(name: &'static str, offset: usize) -> Self {
        Self {
            name,
            kind: FieldKind::Fixed { offset },
            decoder: None,
        }
    }

    pub const fn conditional(name: &'static str, mask: u8, offset: FieldOffset) -> Self {
        Self {
            name,
            kind: FieldKind::Conditional { mask, offset },
            decoder: None,
        }
    }

    pub const fn with_decoder(mut self, decoder: DecoderKind) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn decoder_or(&self, default: DecoderKind) -> DecoderKind {
        self.decoder.unwrap_or(default)
    }
}
