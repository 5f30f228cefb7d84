//! Node label field encoding
//!
//! The label field is a single u64. The top nibble is a tag:
//! - `0x8`: the labels live in a NODE_LABEL dynamic chain whose head id is
//!   held in the low 36 bits
//! - `0..=7`: the number of labels stored inline; the low 36 bits are split
//!   into `36 / n` bit slots, one per label
//!
//! A NODE_LABEL chain payload is the owning node id (u64 LE) followed by the
//! label ids (u32 LE each).

use serde::{Deserialize, Serialize};

const TAG_SHIFT: u32 = 60;
const DYNAMIC_TAG: u64 = 0x8;
const PAYLOAD_BITS: u32 = 36;
const PAYLOAD_MASK: u64 = (1 << PAYLOAD_BITS) - 1;
const MAX_INLINE_LABELS: usize = 7;

/// Packed label field of a node record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelField(pub u64);

/// Decoded representation of a label field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelFieldKind {
    /// Labels held inline, in stored order
    Inline(Vec<u32>),
    /// Head id of the NODE_LABEL chain
    Dynamic(u64),
    /// Unknown tag nibble
    Invalid(u8),
}

impl LabelField {
    /// No labels
    pub const EMPTY: LabelField = LabelField(0);

    /// Pack `labels` inline. Returns `None` when they do not fit.
    pub fn inline(labels: &[u32]) -> Option<Self> {
        if labels.is_empty() {
            return Some(Self::EMPTY);
        }
        if labels.len() > MAX_INLINE_LABELS {
            return None;
        }
        let bits = PAYLOAD_BITS / labels.len() as u32;
        let mut payload = 0u64;
        for (slot, &label) in labels.iter().enumerate() {
            if u64::from(label) >> bits != 0 {
                return None;
            }
            payload |= u64::from(label) << (slot as u32 * bits);
        }
        Some(Self(((labels.len() as u64) << TAG_SHIFT) | payload))
    }

    /// Point at a NODE_LABEL chain. Returns `None` when the id does not fit.
    pub fn dynamic(first_record: u64) -> Option<Self> {
        if first_record > PAYLOAD_MASK {
            return None;
        }
        Some(Self((DYNAMIC_TAG << TAG_SHIFT) | first_record))
    }

    pub fn kind(&self) -> LabelFieldKind {
        let tag = self.0 >> TAG_SHIFT;
        let payload = self.0 & PAYLOAD_MASK;
        match tag {
            DYNAMIC_TAG => LabelFieldKind::Dynamic(payload),
            0 => LabelFieldKind::Inline(Vec::new()),
            n if n as usize <= MAX_INLINE_LABELS => {
                let bits = PAYLOAD_BITS / n as u32;
                let mask = (1u64 << bits) - 1;
                let labels = (0..n as u32)
                    .map(|slot| ((payload >> (slot * bits)) & mask) as u32)
                    .collect();
                LabelFieldKind::Inline(labels)
            }
            other => LabelFieldKind::Invalid(other as u8),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.0 >> TAG_SHIFT == DYNAMIC_TAG
    }

    /// Head of the NODE_LABEL chain, when the field is dynamic
    pub fn dynamic_head(&self) -> Option<u64> {
        match self.kind() {
            LabelFieldKind::Dynamic(head) => Some(head),
            _ => None,
        }
    }
}

/// Encode a NODE_LABEL chain payload
pub fn encode_label_chain(owner: u64, labels: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 + labels.len() * 4);
    bytes.extend_from_slice(&owner.to_le_bytes());
    for label in labels {
        bytes.extend_from_slice(&label.to_le_bytes());
    }
    bytes
}

/// Decode a NODE_LABEL chain payload into its owner and labels
pub fn decode_label_chain(bytes: &[u8]) -> Option<(u64, Vec<u32>)> {
    if bytes.len() < 8 || (bytes.len() - 8) % 4 != 0 {
        return None;
    }
    let (owner, rest) = bytes.split_at(8);
    let owner = u64::from_le_bytes(owner.try_into().ok()?);
    let labels = rest
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Some((owner, labels))
}

/// Decode just the owner of a NODE_LABEL chain from its head block
pub fn label_chain_owner(head_data: &[u8]) -> Option<u64> {
    let owner: [u8; 8] = head_data.get(..8)?.try_into().ok()?;
    Some(u64::from_le_bytes(owner))
}
