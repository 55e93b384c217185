//! Prompt assembly for one conversation turn.
//!
//! The model sees a simplified snapshot of the tree (ids, types, names —
//! specs and quantities are stripped to keep the token footprint
//! proportional to structure, not content), the instruction block that
//! defines the reply contract, a short window of recent history, and the
//! new user message. The retrieval hop re-enters through the same prompt
//! with a synthesized results message appended.

use serde::Serialize;
use trellis_core::{ConversationMessage, NodeId, NodeType, ProjectNode, SearchResult};
use trellis_llm::ChatMessage;

/// How many trailing history messages ride along in the prompt.
pub const HISTORY_WINDOW: usize = 5;

/// A tree node reduced to its identity, as embedded in the system prompt.
#[derive(Debug, Clone, Serialize)]
pub struct SimplifiedNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: String,
    pub children: Vec<SimplifiedNode>,
}

/// Strip a tree down to `{id, type, name, children}`.
pub fn simplify_tree(nodes: &[ProjectNode]) -> Vec<SimplifiedNode> {
    nodes
        .iter()
        .map(|node| SimplifiedNode {
            id: node.id,
            node_type: node.node_type,
            name: node.name.clone(),
            children: simplify_tree(&node.children),
        })
        .collect()
}

const PROMPT_INTRO: &str = "\
You are Trellis, an AI assistant for system integration proposals.
Your goal is to help users shape their project structure (a tree of
subsystems, devices, and features) while maintaining a helpful conversation.";

const PROMPT_CONTRACT: &str = r#"INSTRUCTIONS:
1. Analyze the user's request.
2. Reply with a natural language response first, explaining your actions or answering questions.
3. BE PROACTIVE: if the request is broad (e.g. "Add a security system"), suggest a standard breakdown and ask for confirmation.
4. BE INQUISITIVE: if technical details are missing (e.g. "Add 10 cameras" - what type? where?), ask clarifying questions.
5. To modify the structure, append a JSON code block at the very end containing your operations.
6. Use "guidance" to give the user clickable options for answering your questions or accepting your suggestions.

OUTPUT FORMAT:

<conversational text>

```json
{
  "tool": "search",
  "query": "search query string",
  "operations": [
    {
      "type": "add" | "update" | "delete" | "move",
      "targetParentName": "parent node name (add/move)",
      "targetNodeName": "node to update/delete/move",
      "position": "before" | "after" | "inside",
      "nodeData": {
        "type": "subsystem" | "device" | "feature",
        "name": "New Node Name",
        "quantity": 1,
        "specs": { "key": "value" }
      }
    }
  ],
  "guidance": {
    "intent": "clarification" | "suggestion",
    "text": "optional question text",
    "options": [
      { "label": "Short Label", "value": "Full text to send back" }
    ]
  }
}
```

RULES:
- When adding multiple items, emit one "add" operation per item.
- "Add cameras to Security" with an existing "Security" node means "targetParentName": "Security".
- "Add a Security subsystem" means no "targetParentName" (root level).
- For "nodeData", "type" and "name" are required on additions.
- "quantity" defaults to 1.
- Use "tool": "search" with a "query" ONLY when you lack specific information (specs, prices, compatibility) needed to answer. Do not emit operations in the same reply.
- Use "guidance" only when the request is ambiguous or you are suggesting a standard breakdown.
- Omit "operations" and "guidance" when neither is needed."#;

/// Full system prompt: instructions around the current tree snapshot.
pub fn system_prompt(tree: &[ProjectNode]) -> String {
    let simplified = simplify_tree(tree);
    let tree_json =
        serde_json::to_string_pretty(&simplified).unwrap_or_else(|_| "[]".to_string());
    format!(
        "{PROMPT_INTRO}\n\nCURRENT PROJECT STRUCTURE:\n```json\n{tree_json}\n```\n\n{PROMPT_CONTRACT}"
    )
}

/// Assemble the prompt for a pass: system instructions, the trailing
/// history window, then the new user message.
pub fn build_messages(
    system_prompt: &str,
    history: &[ConversationMessage],
    user_text: &str,
) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let mut messages = Vec::with_capacity(history.len() - start + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(history[start..].iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(user_text));
    messages
}

/// Synthesize the system-role message that feeds retrieval results back
/// into the second pass.
pub fn search_results_message(results: &[SearchResult]) -> ChatMessage {
    if results.is_empty() {
        return ChatMessage::system(
            "SEARCH RESULTS: none found. Answer from your own knowledge and say so.",
        );
    }
    let mut body = String::from("SEARCH RESULTS:\n");
    for (index, result) in results.iter().enumerate() {
        body.push_str(&format!(
            "\n{}. {}\n{}\nSource: {}\n",
            index + 1,
            result.title,
            result.content,
            result.url
        ));
    }
    body.push_str("\nUse these results to answer the pending request. Do not search again.");
    ChatMessage::system(body)
}

// ============================================================================
// TESTS
// ============================================================================
