//! Event leaves and their level-of-detail (LOD) synthetic parents.

use crate::arena::EventId;
use crate::error::{ControllerError, Result};
use crate::handle::{Handle, MemoryUsage, ObjectKind, PropertyAccess, PropertyId};
use crate::string_table::StrIndex;

pub mod prop {
    use crate::handle::{ObjectKind, PROP_FIRST_RESERVED};

    pub const ID: u32 = ObjectKind::Event.block_first() + PROP_FIRST_RESERVED;
    pub const START_TS: u32 = ID + 1;
    pub const END_TS: u32 = ID + 2;
    pub const NAME_STR_INDEX: u32 = ID + 3;
    pub const CATEGORY_STR_INDEX: u32 = ID + 4;
    pub const LEVEL: u32 = ID + 5;
    pub const TOP_COMBINED_NAME_STR_INDEX: u32 = ID + 6;
    pub const NUM_CHILDREN: u32 = ID + 7;
    pub const CHILD_INDEXED: u32 = ID + 8;
}

/// Children adopted by a coalesced LOD event; the base leaf event has none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLod {
    pub children: Vec<EventId>,
}

/// A single event, either a leaf interval or (when `lod` is `Some`) a
/// synthetic parent coalescing a run of same-level, same-name children for a
/// zoomed-out flamegraph.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: EventId,
    pub start_ts: i64,
    pub end_ts: i64,
    pub name_str_index: StrIndex,
    pub category_str_index: StrIndex,
    /// Clamped to `0..=255` on construction.
    pub level: u8,
    pub top_combined_name_str_index: StrIndex,
    /// `None` for a leaf event; `Some` marks this as a synthetic LOD parent
    /// coalescing the contained children.
    pub lod: Option<EventLod>,
}

impl Event {
    pub fn new_leaf(
        id: EventId,
        start_ts: i64,
        end_ts: i64,
        name_str_index: StrIndex,
        category_str_index: StrIndex,
        level: u32,
    ) -> Self {
        Self {
            id,
            start_ts,
            end_ts,
            name_str_index,
            category_str_index,
            level: level.min(255) as u8,
            top_combined_name_str_index: name_str_index,
            lod: None,
        }
    }

    pub fn new_lod_parent(
        id: EventId,
        start_ts: i64,
        end_ts: i64,
        name_str_index: StrIndex,
        category_str_index: StrIndex,
        level: u32,
        children: Vec<EventId>,
    ) -> Self {
        Self {
            id,
            start_ts,
            end_ts,
            name_str_index,
            category_str_index,
            level: level.min(255) as u8,
            top_combined_name_str_index: name_str_index,
            lod: Some(EventLod { children }),
        }
    }

    pub fn duration(&self) -> i64 {
        self.end_ts - self.start_ts
    }

    pub fn num_children(&self) -> u32 {
        self.lod.as_ref().map_or(0, |l| l.children.len() as u32)
    }

    pub fn children(&self) -> &[EventId] {
        self.lod.as_ref().map_or(&[], |l| l.children.as_slice())
    }
}

impl MemoryUsage for Event {
    fn memory_usage_inclusive(&self) -> u64 {
        self.memory_usage_exclusive()
    }

    fn memory_usage_exclusive(&self) -> u64 {
        std::mem::size_of::<Self>() as u64
    }
}

impl PropertyAccess for Event {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Event
    }

    fn get_u64(&self, p: PropertyId) -> Result<u64> {
        if let Ok(v) = self.get_universal_u64(p) {
            return Ok(v);
        }
        match p.id {
            id if id == prop::ID => Ok(self.id),
            id if id == prop::START_TS => Ok(self.start_ts as u64),
            id if id == prop::END_TS => Ok(self.end_ts as u64),
            id if id == prop::NAME_STR_INDEX => Ok(self.name_str_index),
            id if id == prop::CATEGORY_STR_INDEX => Ok(self.category_str_index),
            id if id == prop::LEVEL => Ok(self.level as u64),
            id if id == prop::TOP_COMBINED_NAME_STR_INDEX => Ok(self.top_combined_name_str_index),
            id if id == prop::NUM_CHILDREN => Ok(self.num_children() as u64),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_f64(&self, p: PropertyId) -> Result<f64> {
        Err(ControllerError::InvalidEnum(p.id).pin_type_if_in_range(self.kind(), p))
    }

    fn get_string(&self, p: PropertyId) -> Result<String> {
        Err(ControllerError::InvalidEnum(p.id).pin_type_if_in_range(self.kind(), p))
    }

    fn get_object(&self, p: PropertyId) -> Result<Handle> {
        if p.id == prop::CHILD_INDEXED {
            let children = self.children();
            let child = *children
                .get(p.index as usize)
                .ok_or(ControllerError::OutOfRange {
                    index: p.index,
                    num_entries: children.len() as u64,
                })?;
            return Ok(Handle::new(ObjectKind::Event, child));
        }
        Err(ControllerError::InvalidEnum(p.id).pin_type_if_in_range(self.kind(), p))
    }
}

/// Small helper so "id is in range but wrong accessor" reports `InvalidType`
/// rather than `InvalidEnum`.
trait PinTypeError {
    fn pin_type_if_in_range(self, kind: ObjectKind, p: PropertyId) -> ControllerError;
}

impl PinTypeError for ControllerError {
    fn pin_type_if_in_range(self, kind: ObjectKind, p: PropertyId) -> ControllerError {
        if kind.owns_id(p.id) {
            ControllerError::InvalidType
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_clamps_to_u8_range() {
        let e = Event::new_leaf(1, 0, 10, 0, 0, 999);
        assert_eq!(e.level, 255);
    }

    #[test]
    fn mismatched_accessor_is_invalid_type() {
        let e = Event::new_leaf(1, 0, 10, 0, 0, 2);
        let err = e.get_f64(PropertyId::scalar(prop::START_TS));
        assert_eq!(err, Err(ControllerError::InvalidType));
    }

    #[test]
    fn id_outside_range_is_invalid_enum() {
        let e = Event::new_leaf(1, 0, 10, 0, 0, 2);
        let err = e.get_u64(PropertyId::scalar(ObjectKind::Track.block_first()));
        assert_eq!(
            err,
            Err(ControllerError::InvalidEnum(ObjectKind::Track.block_first()))
        );
    }
}
