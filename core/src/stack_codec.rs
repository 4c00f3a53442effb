//! State-stack codec: the ordered frame stack to/from records.
//!
//! RULE: one bad frame never costs the whole stack. A frame whose tag is
//! unknown, whose fields are malformed, or whose references do not fit the
//! restored world is replaced IN PLACE by the safe default (`MainMenu`),
//! so stack length and the position of every other frame are preserved.
//!
//! Decoding is two steps:
//!   1. `decode`: rebuild frame values through the shared deserializer
//!      (the same object table as the world, so an NPC first written
//!      inside a dialogue frame resolves later).
//!   2. `attach`: wire every frame to the live session once the world
//!      exists. Not part of deserialization.

use crate::{
    deserializer::{DecodeIssue, FieldReader, GraphDeserializer},
    frame::{FrameState, GameContext, StateFrame, StateStack},
    record::Record,
    registry::TypeRegistry,
    serializer::GraphSerializer,
};
use serde::Deserialize;
use serde_json::Value;

pub struct StateStackCodec<'r> {
    registry: &'r mut TypeRegistry<FrameState>,
}

impl<'r> StateStackCodec<'r> {
    pub fn new(registry: &'r mut TypeRegistry<FrameState>) -> Self {
        Self { registry }
    }

    /// Bottom-to-top, one record per frame.
    pub fn encode(stack: &StateStack, ser: &mut GraphSerializer<'_>) -> Vec<Record> {
        stack
            .iter()
            .map(|frame| ser.serialize_detached(&frame.state))
            .collect()
    }

    /// Always returns exactly one frame per record.
    pub fn decode(&mut self, records: &[Record], de: &mut GraphDeserializer<'_>) -> StateStack {
        records
            .iter()
            .enumerate()
            .map(|(index, record)| self.decode_frame(index, record, de))
            .collect::<Vec<_>>()
            .into()
    }

    /// Like `decode`, but over raw JSON values straight from a save file.
    /// A value that is not a record at all is replaced like any other
    /// undecodable frame.
    pub fn decode_values(&mut self, values: &[Value], de: &mut GraphDeserializer<'_>) -> StateStack {
        values
            .iter()
            .enumerate()
            .map(|(index, value)| match Record::deserialize(value) {
                Ok(record) => self.decode_frame(index, &record, de),
                Err(e) => replace(de, index, None, format!("not a record: {e}")),
            })
            .collect::<Vec<_>>()
            .into()
    }

    fn decode_frame(
        &mut self,
        index: usize,
        record: &Record,
        de: &mut GraphDeserializer<'_>,
    ) -> StateFrame {
        let node = match record {
            Record::Node(node) => node,
            Record::Ref(r) => {
                return replace(de, index, None, format!("frame is a bare reference to {}", r.identity));
            }
        };

        let reconstructor = match self.registry.resolve(&node.type_tag) {
            Ok(f) => f,
            Err(e) => {
                // Entities first written inside this frame must still enter
                // the object table, or later references to them dangle.
                de.absorb_nested(&node.fields);
                return replace(de, index, Some(&node.type_tag), e.to_string());
            }
        };

        let reader = FieldReader::new(&node.type_tag, &node.fields);
        match reconstructor(&reader, de) {
            Ok(state) => StateFrame::new(state),
            Err(e) => {
                de.absorb_nested(&node.fields);
                replace(de, index, Some(&node.type_tag), e.to_string())
            }
        }
    }

    /// Wire each frame to the session and check its references against the
    /// restored world. Frames pointing at missing or wrong-kind entities are
    /// replaced by the safe default.
    pub fn attach(stack: &mut StateStack, ctx: &GameContext<'_>) -> Vec<DecodeIssue> {
        let mut issues = Vec::new();
        for (index, frame) in stack.iter_mut().enumerate() {
            let mismatch = frame.state.references().into_iter().find_map(|(r, accepted)| {
                match ctx.world.entities.kind_of(r) {
                    Some(kind) if accepted.contains(&kind) => None,
                    Some(kind) => Some(format!(
                        "expects {:?} at slot {}, found {}",
                        accepted, r.index(), kind.tag()
                    )),
                    None => Some(format!("slot {} is empty", r.index())),
                }
            });

            if let Some(reason) = mismatch {
                let tag = frame.tag();
                log::warn!("Frame {index} ('{tag}') cannot be restored: {reason}; using main menu");
                issues.push(DecodeIssue::FrameReplaced {
                    index,
                    tag: Some(tag.to_string()),
                    reason,
                });
                *frame = StateFrame::safe_default();
            }
            frame.attach_to(ctx.session_id);
        }
        issues
    }
}

fn replace(
    de: &mut GraphDeserializer<'_>,
    index: usize,
    tag: Option<&str>,
    reason: String,
) -> StateFrame {
    log::warn!(
        "Frame {index} ('{}') could not be decoded: {reason}; using main menu",
        tag.unwrap_or("?")
    );
    de.note(DecodeIssue::FrameReplaced {
        index,
        tag: tag.map(str::to_string),
        reason,
    });
    StateFrame::safe_default()
}
