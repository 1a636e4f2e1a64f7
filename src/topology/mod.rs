//! The hardware/software resource tree: system nodes, processes, processors,
//! threads, queues, streams and counters. Built once at metadata load;
//! children below the root are fetched lazily per node.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::{ControllerError, Result};
use crate::handle::{Handle, MemoryUsage, ObjectKind, PropertyAccess, PropertyId};
use crate::string_table::StrIndex;
use crate::track::TrackId;

pub type NodeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKindTag {
    SystemNode,
    Process,
    Processor,
    Thread,
    Queue,
    Stream,
    Counter,
}

/// Kind-specific fields. Variant names mirror `NodeKindTag` one-to-one.
#[derive(Debug, Clone)]
pub enum NodeData {
    SystemNode {
        host_name: StrIndex,
        os: StrIndex,
    },
    Process {
        command: StrIndex,
        environment: Vec<(StrIndex, StrIndex)>,
        start_time: i64,
        end_time: i64,
        node_ref: NodeId,
    },
    Processor {
        hardware_id: u64,
        device_type: StrIndex,
        type_index: u32,
        node_ref: NodeId,
    },
    Thread {
        tid: u64,
        process_ref: NodeId,
        track_id: Option<TrackId>,
    },
    Queue {
        uuid: Uuid,
        processor_ref: NodeId,
        track_id: Option<TrackId>,
    },
    Stream {
        uuid: Uuid,
        processor_ref: NodeId,
        track_id: Option<TrackId>,
    },
    Counter {
        processor_ref: NodeId,
        track_id: Option<TrackId>,
    },
}

impl NodeData {
    pub fn tag(&self) -> NodeKindTag {
        match self {
            NodeData::SystemNode { .. } => NodeKindTag::SystemNode,
            NodeData::Process { .. } => NodeKindTag::Process,
            NodeData::Processor { .. } => NodeKindTag::Processor,
            NodeData::Thread { .. } => NodeKindTag::Thread,
            NodeData::Queue { .. } => NodeKindTag::Queue,
            NodeData::Stream { .. } => NodeKindTag::Stream,
            NodeData::Counter { .. } => NodeKindTag::Counter,
        }
    }

    /// The track this node is wired to, if any — only Thread/Queue/Stream/
    /// Counter nodes carry a back-pointer.
    pub fn track_id(&self) -> Option<TrackId> {
        match self {
            NodeData::Thread { track_id, .. }
            | NodeData::Queue { track_id, .. }
            | NodeData::Stream { track_id, .. }
            | NodeData::Counter { track_id, .. } => *track_id,
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TopologyNode {
    pub id: NodeId,
    pub name: StrIndex,
    pub data: NodeData,
    pub children: Vec<NodeId>,
    /// Whether this node's children have been fetched from the topology
    /// port yet; the root is always eagerly populated, deeper levels lazily.
    pub children_loaded: bool,
}

pub mod prop {
    use crate::handle::{ObjectKind, PROP_FIRST_RESERVED};

    pub const NAME_STR_INDEX: u32 = ObjectKind::Node.block_first() + PROP_FIRST_RESERVED;
    pub const NODE_KIND: u32 = NAME_STR_INDEX + 1;
    pub const NUM_CHILDREN: u32 = NAME_STR_INDEX + 2;
    pub const CHILD_INDEXED: u32 = NAME_STR_INDEX + 3;
    pub const TRACK_BACK_REF: u32 = NAME_STR_INDEX + 4;

    /// SystemNode
    pub const HOST_NAME: u32 = NAME_STR_INDEX + 5;
    pub const OS: u32 = NAME_STR_INDEX + 6;

    /// Process
    pub const COMMAND: u32 = NAME_STR_INDEX + 7;
    pub const START_TIME: u32 = NAME_STR_INDEX + 8;
    pub const END_TIME: u32 = NAME_STR_INDEX + 9;
    pub const NUM_ENVIRONMENT_ENTRIES: u32 = NAME_STR_INDEX + 10;
    pub const ENVIRONMENT_KEY_INDEXED: u32 = NAME_STR_INDEX + 11;
    pub const ENVIRONMENT_VALUE_INDEXED: u32 = NAME_STR_INDEX + 12;

    /// Processor
    pub const HARDWARE_ID: u32 = NAME_STR_INDEX + 13;
    pub const DEVICE_TYPE: u32 = NAME_STR_INDEX + 14;
    pub const TYPE_INDEX: u32 = NAME_STR_INDEX + 15;

    /// Thread
    pub const TID: u32 = NAME_STR_INDEX + 16;

    /// Queue/Stream
    pub const UUID_STR: u32 = NAME_STR_INDEX + 17;

    /// Process/Processor -> SystemNode, Thread -> Process, Queue/Stream/Counter -> Processor.
    pub const NODE_BACK_REF: u32 = NAME_STR_INDEX + 18;
    pub const PROCESS_BACK_REF: u32 = NAME_STR_INDEX + 19;
    pub const PROCESSOR_BACK_REF: u32 = NAME_STR_INDEX + 20;
}

impl MemoryUsage for TopologyNode {
    fn memory_usage_inclusive(&self) -> u64 {
        self.memory_usage_exclusive()
    }

    fn memory_usage_exclusive(&self) -> u64 {
        (std::mem::size_of::<Self>() + self.children.len() * std::mem::size_of::<NodeId>()) as u64
    }
}

impl PropertyAccess for TopologyNode {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Node
    }

    fn get_u64(&self, p: PropertyId) -> Result<u64> {
        if let Ok(v) = self.get_universal_u64(p) {
            return Ok(v);
        }
        match p.id {
            id if id == prop::NAME_STR_INDEX => Ok(self.name),
            id if id == prop::NODE_KIND => Ok(self.data.tag() as u64),
            id if id == prop::NUM_CHILDREN => Ok(self.children.len() as u64),
            id if id == prop::HOST_NAME => match &self.data {
                NodeData::SystemNode { host_name, .. } => Ok(*host_name),
                _ => Err(ControllerError::InvalidType),
            },
            id if id == prop::OS => match &self.data {
                NodeData::SystemNode { os, .. } => Ok(*os),
                _ => Err(ControllerError::InvalidType),
            },
            id if id == prop::COMMAND => match &self.data {
                NodeData::Process { command, .. } => Ok(*command),
                _ => Err(ControllerError::InvalidType),
            },
            id if id == prop::START_TIME => match &self.data {
                NodeData::Process { start_time, .. } => Ok(*start_time as u64),
                _ => Err(ControllerError::InvalidType),
            },
            id if id == prop::END_TIME => match &self.data {
                NodeData::Process { end_time, .. } => Ok(*end_time as u64),
                _ => Err(ControllerError::InvalidType),
            },
            id if id == prop::NUM_ENVIRONMENT_ENTRIES => match &self.data {
                NodeData::Process { environment, .. } => Ok(environment.len() as u64),
                _ => Err(ControllerError::InvalidType),
            },
            id if id == prop::ENVIRONMENT_KEY_INDEXED => match &self.data {
                NodeData::Process { environment, .. } => environment
                    .get(p.index as usize)
                    .map(|(k, _)| *k)
                    .ok_or(ControllerError::OutOfRange { index: p.index, num_entries: environment.len() as u64 }),
                _ => Err(ControllerError::InvalidType),
            },
            id if id == prop::ENVIRONMENT_VALUE_INDEXED => match &self.data {
                NodeData::Process { environment, .. } => environment
                    .get(p.index as usize)
                    .map(|(_, v)| *v)
                    .ok_or(ControllerError::OutOfRange { index: p.index, num_entries: environment.len() as u64 }),
                _ => Err(ControllerError::InvalidType),
            },
            id if id == prop::HARDWARE_ID => match &self.data {
                NodeData::Processor { hardware_id, .. } => Ok(*hardware_id),
                _ => Err(ControllerError::InvalidType),
            },
            id if id == prop::DEVICE_TYPE => match &self.data {
                NodeData::Processor { device_type, .. } => Ok(*device_type),
                _ => Err(ControllerError::InvalidType),
            },
            id if id == prop::TYPE_INDEX => match &self.data {
                NodeData::Processor { type_index, .. } => Ok(*type_index as u64),
                _ => Err(ControllerError::InvalidType),
            },
            id if id == prop::TID => match &self.data {
                NodeData::Thread { tid, .. } => Ok(*tid),
                _ => Err(ControllerError::InvalidType),
            },
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_f64(&self, p: PropertyId) -> Result<f64> {
        Err(ControllerError::InvalidEnum(p.id))
    }

    fn get_string(&self, p: PropertyId) -> Result<String> {
        match p.id {
            id if id == prop::UUID_STR => match &self.data {
                NodeData::Queue { uuid, .. } | NodeData::Stream { uuid, .. } => Ok(uuid.to_string()),
                _ => Err(ControllerError::InvalidType),
            },
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_object(&self, p: PropertyId) -> Result<Handle> {
        match p.id {
            id if id == prop::CHILD_INDEXED => {
                let child = *self
                    .children
                    .get(p.index as usize)
                    .ok_or(ControllerError::OutOfRange {
                        index: p.index,
                        num_entries: self.children.len() as u64,
                    })?;
                Ok(Handle::new(ObjectKind::Node, child))
            }
            id if id == prop::TRACK_BACK_REF => self
                .data
                .track_id()
                .map(|t| Handle::new(ObjectKind::Track, t))
                .ok_or(ControllerError::NotLoaded),
            id if id == prop::NODE_BACK_REF => match &self.data {
                NodeData::Process { node_ref, .. } | NodeData::Processor { node_ref, .. } => {
                    Ok(Handle::new(ObjectKind::Node, *node_ref))
                }
                _ => Err(ControllerError::InvalidType),
            },
            id if id == prop::PROCESS_BACK_REF => match &self.data {
                NodeData::Thread { process_ref, .. } => Ok(Handle::new(ObjectKind::Node, *process_ref)),
                _ => Err(ControllerError::InvalidType),
            },
            id if id == prop::PROCESSOR_BACK_REF => match &self.data {
                NodeData::Queue { processor_ref, .. }
                | NodeData::Stream { processor_ref, .. }
                | NodeData::Counter { processor_ref, .. } => Ok(Handle::new(ObjectKind::Node, *processor_ref)),
                _ => Err(ControllerError::InvalidType),
            },
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }
}

/// Owns every node; `Controller` holds the root id. Mirrors `EventArena`'s
/// shape but nodes are never released mid-session — the whole tree drops
/// with the `Controller`.
#[derive(Debug, Default)]
pub struct Topology {
    nodes: HashMap<NodeId, TopologyNode>,
    root: Option<NodeId>,
    next_id: NodeId,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_id(&self) -> Option<NodeId> {
        self.root
    }

    pub fn insert_root(&mut self, name: StrIndex, host_name: StrIndex, os: StrIndex) -> NodeId {
        let id = self.alloc_id();
        self.nodes.insert(
            id,
            TopologyNode {
                id,
                name,
                data: NodeData::SystemNode { host_name, os },
                children: Vec::new(),
                children_loaded: true,
            },
        );
        self.root = Some(id);
        id
    }

    pub fn insert_child(&mut self, parent: NodeId, name: StrIndex, data: NodeData) -> Result<NodeId> {
        if !self.nodes.contains_key(&parent) {
            return Err(ControllerError::InvalidArgument(format!(
                "unknown topology parent id {parent}"
            )));
        }
        let id = self.alloc_id();
        self.nodes.insert(
            id,
            TopologyNode {
                id,
                name,
                data,
                children: Vec::new(),
                children_loaded: false,
            },
        );
        self.nodes.get_mut(&parent).unwrap().children.push(id);
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&TopologyNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut TopologyNode> {
        self.nodes.get_mut(&id)
    }

    /// Marks `id`'s children as fetched (called once the topology port has
    /// returned them and they've been inserted via `insert_child`).
    pub fn mark_children_loaded(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children_loaded = true;
        }
    }

    /// Finds the track back-pointer for `track_id` and records its
    /// corresponding topology node, wiring the cross-link in both
    /// directions exactly once, at construction time.
    pub fn wire_track_back_ref(&mut self, node_id: NodeId, track: &mut crate::track::Track) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        let track_id = track.id;
        match &mut node.data {
            NodeData::Thread { track_id: t, .. } => {
                *t = Some(track_id);
                track.topology_ref = crate::track::TrackTopologyRef::Thread(node_id);
            }
            NodeData::Queue { track_id: t, .. } => {
                *t = Some(track_id);
                track.topology_ref = crate::track::TrackTopologyRef::Queue(node_id);
            }
            NodeData::Stream { track_id: t, .. } => {
                *t = Some(track_id);
                track.topology_ref = crate::track::TrackTopologyRef::Stream(node_id);
            }
            NodeData::Counter { track_id: t, .. } => {
                *t = Some(track_id);
                track.topology_ref = crate::track::TrackTopologyRef::Counter(node_id);
            }
            _ => {}
        }
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
