//! Structured submission payload.
//!
//! # Responsibility
//! - Parse raw XML payload text into an owned element tree.
//! - Expose the identity attributes and field lookups used by validation,
//!   queries and CSV export.
//!
//! # Invariants
//! - Parsing never fails loudly: malformed input becomes
//!   [`ParsedPayload::Malformed`].
//! - Node order inside the tree is document order.

/// Root attribute carrying the form identifier.
pub const FORM_ID_ATTRIBUTE: &str = "id";
/// Root attribute carrying the instance identifier.
pub const INSTANCE_ID_ATTRIBUTE: &str = "instanceID";

/// One child node of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    /// Comment or processing instruction. Counted, never rendered.
    Other,
}

/// Owned XML element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

/// Rendered content of a payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    /// No element with that name exists in the document.
    Missing,
    /// Element exists but has no single text child.
    Empty,
    /// Element has exactly one text child.
    Text(&'a str),
    /// Element has more than one child node.
    RepeatGroup,
}

/// Result of parsing a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParsedPayload {
    /// No payload has been set.
    #[default]
    Absent,
    /// Payload parsed; holds the root element.
    Parsed(XmlElement),
    /// Payload text is not well-formed XML.
    Malformed,
}

impl ParsedPayload {
    /// Parses raw payload text. Never returns an error.
    ///
    /// A `<!DOCTYPE>` declaration is accepted; entity expansion stays
    /// bounded by the parser's own limits.
    pub fn parse(raw: &str) -> Self {
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        match roxmltree::Document::parse_with_options(raw, options) {
            Ok(document) => Self::Parsed(XmlElement::from_node(document.root_element())),
            Err(err) => {
                log::debug!(
                    "event=payload_parse module=model status=error error_code=malformed_payload error={}",
                    err
                );
                Self::Malformed
            }
        }
    }

    /// Returns the root element when the payload parsed.
    pub fn root(&self) -> Option<&XmlElement> {
        match self {
            Self::Parsed(root) => Some(root),
            Self::Absent | Self::Malformed => None,
        }
    }

    /// Form identifier embedded in the document.
    pub fn form_id(&self) -> Option<&str> {
        self.root().and_then(|root| root.attribute(FORM_ID_ATTRIBUTE))
    }

    /// Instance identifier embedded in the document.
    pub fn instance_id(&self) -> Option<&str> {
        self.root()
            .and_then(|root| root.attribute(INSTANCE_ID_ATTRIBUTE))
    }

    /// Looks up a field anywhere below the root.
    pub fn field_value(&self, field: &str) -> FieldValue<'_> {
        self.root()
            .map_or(FieldValue::Missing, |root| root.field_value(field))
    }
}

impl XmlElement {
    fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let attributes = node
            .attributes()
            .map(|attribute| (attribute.name().to_string(), attribute.value().to_string()))
            .collect();
        let children = node
            .children()
            .map(|child| {
                if child.is_element() {
                    XmlNode::Element(Self::from_node(child))
                } else if child.is_text() {
                    XmlNode::Text(child.text().unwrap_or_default().to_string())
                } else {
                    XmlNode::Other
                }
            })
            .collect();

        Self {
            name: node.tag_name().name().to_string(),
            attributes,
            children,
        }
    }

    /// Local element name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns an attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All child nodes in document order.
    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// Direct element children in document order; text is skipped.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) | XmlNode::Other => None,
        })
    }

    /// First descendant element named `name`, in document order. The
    /// element itself is not considered.
    pub fn find_descendant(&self, name: &str) -> Option<&XmlElement> {
        for child in self.child_elements() {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// Classifies the content of the first descendant named `field`.
    pub fn field_value(&self, field: &str) -> FieldValue<'_> {
        let Some(element) = self.find_descendant(field) else {
            return FieldValue::Missing;
        };
        match element.children.as_slice() {
            [] => FieldValue::Empty,
            [XmlNode::Text(text)] => FieldValue::Text(text),
            [_] => FieldValue::Empty,
            _ => FieldValue::RepeatGroup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldValue, ParsedPayload};

    const DOC: &str = r#"<data id="weights" instanceID="uuid:1"><age>5</age><kilograms>12</kilograms><meta><note>deep</note></meta></data>"#;

    #[test]
    fn parse_reads_identity_attributes() {
        let payload = ParsedPayload::parse(DOC);
        assert_eq!(payload.form_id(), Some("weights"));
        assert_eq!(payload.instance_id(), Some("uuid:1"));
    }

    #[test]
    fn malformed_input_is_tagged_not_raised() {
        let payload = ParsedPayload::parse("<data><age>5</data>");
        assert_eq!(payload, ParsedPayload::Malformed);
        assert_eq!(payload.form_id(), None);
        assert_eq!(payload.field_value("age"), FieldValue::Missing);
    }

    #[test]
    fn child_elements_skip_text_nodes() {
        let payload = ParsedPayload::parse("<data>\n  <a>1</a>\n  <b/>\n</data>");
        let root = payload.root().expect("payload should parse");
        let names: Vec<&str> = root.child_elements().map(|child| child.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(root.children().len(), 5);
    }

    #[test]
    fn field_value_classifies_content() {
        let payload = ParsedPayload::parse(
            "<data><age>5</age><empty/><group><v>1</v><v>2</v></group><wrap><x>1</x></wrap></data>",
        );
        assert_eq!(payload.field_value("age"), FieldValue::Text("5"));
        assert_eq!(payload.field_value("empty"), FieldValue::Empty);
        assert_eq!(payload.field_value("group"), FieldValue::RepeatGroup);
        assert_eq!(payload.field_value("wrap"), FieldValue::Empty);
        assert_eq!(payload.field_value("nope"), FieldValue::Missing);
    }

    #[test]
    fn doctype_header_does_not_hide_identity() {
        let payload = ParsedPayload::parse(
            r#"<?xml version="1.0"?><!DOCTYPE data><data id="weights" instanceID="uuid:1"><age>5</age></data>"#,
        );
        assert_eq!(payload.form_id(), Some("weights"));
        assert_eq!(payload.instance_id(), Some("uuid:1"));
        assert_eq!(payload.field_value("age"), FieldValue::Text("5"));
    }

    #[test]
    fn field_lookup_searches_descendants() {
        let payload = ParsedPayload::parse(DOC);
        assert_eq!(payload.field_value("note"), FieldValue::Text("deep"));
    }
}
