//! Entity types for the Trellis requirement tree and conversation state.
//!
//! Pure data structures with serde wire mappings. Tree mutation and
//! persistence logic live in their own crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Node identifier using UUIDv7 for timestamp-sortable IDs.
/// Assigned once at creation time and never reused within a project.
pub type NodeId = Uuid;

/// Timestamp type using UTC timezone, serialized RFC3339.
pub type Timestamp = DateTime<Utc>;

/// Epoch-milliseconds timestamp used for chat history and checkpoints.
pub type EpochMillis = i64;

/// Schema version stamped onto new documents and assumed by migration.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Generate a new UUIDv7 NodeId (timestamp-sortable).
pub fn new_node_id() -> NodeId {
    Uuid::now_v7()
}

/// Current instant as epoch milliseconds.
pub fn epoch_millis_now() -> EpochMillis {
    Utc::now().timestamp_millis()
}

// ============================================================================
// TREE NODES
// ============================================================================

/// Kind of a node in the requirement tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Top-level grouping (e.g. "Security", "Networking")
    Subsystem,
    /// Physical or logical equipment under a subsystem
    Device,
    /// Capability or option attached to a device
    Feature,
}

impl NodeType {
    /// Wire/display form of the node type.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Subsystem => "subsystem",
            NodeType::Device => "device",
            NodeType::Feature => "feature",
        }
    }

    /// Parse the wire form back into a NodeType.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "subsystem" => Some(NodeType::Subsystem),
            "device" => Some(NodeType::Device),
            "feature" => Some(NodeType::Feature),
            _ => None,
        }
    }
}

/// Scalar value of a spec entry: string, number, or boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecValue {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

impl From<&str> for SpecValue {
    fn from(value: &str) -> Self {
        SpecValue::Text(value.to_string())
    }
}

impl From<i64> for SpecValue {
    fn from(value: i64) -> Self {
        SpecValue::Number(value.into())
    }
}

impl From<bool> for SpecValue {
    fn from(value: bool) -> Self {
        SpecValue::Flag(value)
    }
}

/// A node in the requirement tree.
///
/// `children` order is meaningful and preserved; it reflects presentation
/// order. Subtrees are acyclic by construction: nodes are only ever created
/// fresh or moved, never duplicated by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectNode {
    /// Stable identifier, unique within a project.
    pub id: NodeId,
    /// Node kind.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Display name (non-empty).
    pub name: String,
    /// How many of this item the proposal includes (>= 1).
    pub quantity: u32,
    /// Key/value attributes of the item.
    #[serde(default)]
    pub specs: HashMap<String, SpecValue>,
    /// Ordered child nodes.
    #[serde(default)]
    pub children: Vec<ProjectNode>,
}

impl ProjectNode {
    /// Create a node with a fresh id, quantity 1, and no specs or children.
    pub fn new(node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            id: new_node_id(),
            node_type,
            name: name.into(),
            quantity: 1,
            specs: HashMap::new(),
            children: Vec::new(),
        }
    }

    /// Set the node id.
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    /// Set the quantity.
    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Add a spec entry.
    pub fn with_spec(mut self, key: impl Into<String>, value: impl Into<SpecValue>) -> Self {
        self.specs.insert(key.into(), value.into());
        self
    }

    /// Append a child node.
    pub fn with_child(mut self, child: ProjectNode) -> Self {
        self.children.push(child);
        self
    }
}

// ============================================================================
// PROJECT DOCUMENT
// ============================================================================

/// Document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMeta {
    /// Project display name (non-empty).
    pub name: String,
    /// Creation instant.
    pub create_time: Timestamp,
    /// Document version string.
    pub version: String,
    /// Last persisted instant, stamped on every save.
    pub last_modified: Timestamp,
    /// Schema version the document conforms to.
    pub schema_version: String,
}

/// The persisted project document: metadata, narrative context, chat
/// history, and the requirement tree.
///
/// Owned exclusively by the project store while at rest; callers operate on
/// an in-memory copy and write back through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectData {
    pub meta: ProjectMeta,
    /// Free-text narrative describing the proposal.
    pub context: String,
    /// Full conversation history, append-only.
    #[serde(default)]
    pub chat_history: Vec<ConversationMessage>,
    /// Root-level nodes of the requirement tree, in presentation order.
    pub structure_tree: Vec<ProjectNode>,
}

impl ProjectData {
    /// Create an empty document with stamped metadata.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            meta: ProjectMeta {
                name: name.into(),
                create_time: now,
                version: "1.0.0".to_string(),
                last_modified: now,
                schema_version: SCHEMA_VERSION.to_string(),
            },
            context: String::new(),
            chat_history: Vec::new(),
            structure_tree: Vec::new(),
        }
    }
}

// ============================================================================
// CONVERSATION MESSAGES
// ============================================================================

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    /// Creation instant in epoch milliseconds.
    pub timestamp: EpochMillis,
    /// Optional UI guidance attached to assistant messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<GuidanceData>,
}

impl ConversationMessage {
    /// Create a message stamped with the current instant.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: epoch_millis_now(),
            guidance: None,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Attach guidance.
    pub fn with_guidance(mut self, guidance: GuidanceData) -> Self {
        self.guidance = Some(guidance);
        self
    }
}

// ============================================================================
// GUIDANCE
// ============================================================================

/// Why the assistant is steering the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuidanceIntent {
    /// The assistant needs a decision before it can proceed.
    Clarification,
    /// The assistant proposes follow-up directions.
    Suggestion,
}

/// A selectable option offered to the user. `value` is the literal text sent
/// back as the next user message when the option is chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidanceOption {
    pub label: String,
    pub value: String,
}

/// Non-authoritative UI hint emitted by the model alongside its reply.
/// Never involved in tree mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidanceData {
    pub intent: GuidanceIntent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<GuidanceOption>,
}

// ============================================================================
// TREE OPERATIONS
// ============================================================================

/// What an operation does to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpAction {
    Add,
    Update,
    Delete,
    Move,
}

/// Where a moved subtree lands relative to its anchor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovePosition {
    Before,
    After,
    Inside,
}

/// Partial node fields carried by add and update operations.
///
/// The resolver stores the eagerly generated id for add operations here so
/// the mutator creates the node with exactly that id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specs: Option<HashMap<String, SpecValue>>,
}

/// An intent to mutate the tree, as emitted by the model (name-qualified)
/// or after resolution (id-qualified).
///
/// Wire format is camelCase with the action under the `type` key, matching
/// what the model is instructed to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(rename = "type")]
    pub action: OpAction,
    /// Parent (add) or anchor (move) reference by display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_parent_name: Option<String>,
    /// Parent/anchor reference by id; None means the tree root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_parent_id: Option<NodeId>,
    /// Target node reference by display name (update/delete/move).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node_name: Option<String>,
    /// Target node reference by id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node_id: Option<NodeId>,
    /// Node fields for add/update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_data: Option<NodeDraft>,
    /// Placement for move operations; defaults to inside.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<MovePosition>,
}

impl Operation {
    /// Create an operation with no references set.
    pub fn new(action: OpAction) -> Self {
        Self {
            action,
            target_parent_name: None,
            target_parent_id: None,
            target_node_name: None,
            target_node_id: None,
            node_data: None,
            position: None,
        }
    }

    pub fn with_parent_name(mut self, name: impl Into<String>) -> Self {
        self.target_parent_name = Some(name.into());
        self
    }

    pub fn with_parent_id(mut self, id: NodeId) -> Self {
        self.target_parent_id = Some(id);
        self
    }

    pub fn with_node_name(mut self, name: impl Into<String>) -> Self {
        self.target_node_name = Some(name.into());
        self
    }

    pub fn with_node_id(mut self, id: NodeId) -> Self {
        self.target_node_id = Some(id);
        self
    }

    pub fn with_node_data(mut self, draft: NodeDraft) -> Self {
        self.node_data = Some(draft);
        self
    }

    pub fn with_position(mut self, position: MovePosition) -> Self {
        self.position = Some(position);
        self
    }
}

// ============================================================================
// CHECKPOINTS
// ============================================================================

/// A full-document snapshot for rollback.
///
/// Checkpoints are stored append-only and pruned to the most recent entries
/// by chronological order; rollback restores the single most recent one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    /// Creation instant in epoch milliseconds.
    pub timestamp: EpochMillis,
    /// Human-readable reason the checkpoint was taken.
    pub description: String,
    /// The document as it was when the checkpoint was taken.
    pub project: ProjectData,
}

// ============================================================================
// RETRIEVAL
// ============================================================================

/// A retrieval request extracted from the model's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

/// One result returned by the search collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub content: String,
    pub url: String,
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
