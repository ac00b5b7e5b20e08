use roxmltree::{Document, Node};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed snapshot xml at {line}:{column}: {message}")]
pub struct SnapshotParseError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

/// Owned element tree parsed from a recorded payload. Only element names,
/// trimmed text and child order are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotNode {
    name: String,
    text: String,
    children: Vec<SnapshotNode>,
}

impl SnapshotNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: SnapshotNode) -> Self {
        self.children.push(child);
        self
    }

    /// Parses `fragment` as the content of a synthetic `<root_name>` element.
    pub fn parse_rooted(root_name: &str, fragment: &str) -> Result<Self, SnapshotParseError> {
        let wrapped = format!("<{root_name}>{fragment}</{root_name}>");
        let doc = Document::parse(&wrapped).map_err(|error| SnapshotParseError {
            line: error.pos().row,
            column: error.pos().col,
            message: error.to_string(),
        })?;
        Ok(Self::from_node(doc.root_element()))
    }

    fn from_node(node: Node<'_, '_>) -> Self {
        let mut text = String::new();
        let mut children = Vec::new();
        for child in node.children() {
            if child.is_element() {
                children.push(Self::from_node(child));
            } else if child.is_text() {
                if let Some(value) = child.text() {
                    text.push_str(value);
                }
            }
        }
        Self {
            name: node.tag_name().name().to_string(),
            text: text.trim().to_string(),
            children,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[SnapshotNode] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&SnapshotNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SnapshotNode> {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(SnapshotNode::text)
    }

    /// Replaces this node's children with those of its only child when that
    /// child is one of `wrappers`. Used for payloads that carry a redundant
    /// wrapper element.
    pub fn unwrap_single(&mut self, wrappers: &[&str]) {
        let is_wrapped = self.children.len() == 1
            && wrappers
                .iter()
                .any(|wrapper| self.children[0].name == *wrapper);
        if is_wrapped {
            if let Some(inner) = self.children.pop() {
                self.children = inner.children;
            }
        }
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        out.push('>');
        out.push_str(&escape_text(&self.text));
        for child in &self.children {
            child.write_xml(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

pub(crate) fn escape_text(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
