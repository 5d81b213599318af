//! Agent reply types.
//!
//! A reply is the finite sequence of typed content blocks an agent handle
//! produces for one message. Parley only interprets plain text blocks;
//! everything else passes through untouched as opaque JSON so the gateway
//! never has to track the SDK's full block taxonomy.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One content block within an agent reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyBlock {
    /// Plain assistant text.
    Text { text: String },
    /// Any block type the gateway does not interpret, passed through verbatim.
    Json { value: Value },
}

/// The full reply collected for one message exchange.
///
/// Returned by `run_exclusive` and serialized directly in API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    /// Session key the exchange ran against.
    pub session_key: String,
    /// Content blocks in the order the handle produced them.
    pub blocks: Vec<ReplyBlock>,
}

impl Reply {
    /// Concatenate all text blocks into a single string.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ReplyBlock::Text { text } => Some(text.as_str()),
                ReplyBlock::Json { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_block_serde_tagging() {
        let block = ReplyBlock::Text {
            text: "hello".to_string(),
        };
        let encoded = serde_json::to_value(&block).unwrap();
        assert_eq!(encoded, json!({ "type": "text", "text": "hello" }));
    }

    #[test]
    fn test_reply_text_concatenates_text_blocks_only() {
        let reply = Reply {
            session_key: "a".to_string(),
            blocks: vec![
                ReplyBlock::Text { text: "foo".to_string() },
                ReplyBlock::Json { value: json!({ "tool": "ls" }) },
                ReplyBlock::Text { text: "bar".to_string() },
            ],
        };
        assert_eq!(reply.text(), "foobar");
    }
}
