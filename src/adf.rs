//! Atlassian Document Format（リッチテキスト）をプレーンテキストに変換する

use serde_json::Value;

/// ブロック要素として扱うノード種別
const BLOCK_NODES: &[&str] = &[
    "doc",
    "paragraph",
    "heading",
    "blockquote",
    "codeBlock",
    "bulletList",
    "orderedList",
    "listItem",
    "panel",
    "rule",
    "table",
    "tableRow",
    "tableHeader",
    "tableCell",
    "mediaSingle",
    "mediaGroup",
    "expand",
    "nestedExpand",
    "taskList",
    "taskItem",
    "decisionList",
    "decisionItem",
];

/// ADFドキュメントをプレーンテキストに平坦化する
///
/// 段落などのブロックは改行で区切り、最上位のブロック同士は空行で区切る。
pub fn to_plain_text(document: &Value) -> String {
    match document {
        Value::String(s) => s.clone(),
        Value::Array(nodes) => join_blocks(nodes, "\n\n"),
        _ => render(document).trim().to_string(),
    }
}

fn node_type(node: &Value) -> Option<&str> {
    node.get("type").and_then(|t| t.as_str())
}

fn is_block(node: &Value) -> bool {
    node_type(node).is_some_and(|t| BLOCK_NODES.contains(&t))
}

fn attr<'a>(node: &'a Value, name: &str) -> Option<&'a str> {
    node.get("attrs")
        .and_then(|attrs| attrs.get(name))
        .and_then(|v| v.as_str())
}

fn render(node: &Value) -> String {
    match node_type(node) {
        Some("text") => node
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string(),
        Some("hardBreak") => "\n".to_string(),
        Some("mention") => attr(node, "text").unwrap_or_default().to_string(),
        Some("emoji") => attr(node, "text")
            .or_else(|| attr(node, "shortName"))
            .unwrap_or_default()
            .to_string(),
        Some("inlineCard") | Some("blockCard") => attr(node, "url").unwrap_or_default().to_string(),
        kind => {
            let Some(children) = node.get("content").and_then(|c| c.as_array()) else {
                return node
                    .get("text")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string();
            };

            if children.iter().any(is_block) {
                let separator = match kind {
                    Some("doc") => "\n\n",
                    Some("tableRow") => " | ",
                    _ => "\n",
                };
                join_blocks(children, separator)
            } else {
                children.iter().map(render).collect()
            }
        }
    }
}

fn join_blocks(nodes: &[Value], separator: &str) -> String {
    nodes
        .iter()
        .map(|n| render(n).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}
