//! Call record tree.
//!
//! A [`CallRecord`] is the parsed form of the recorder's XML metadata: an ordered tree of named
//! elements, each with optional text and attributes. Whitespace-only text between elements is
//! dropped at parse time; everything else is kept in document order.
//!
//! The record knows how to render itself two ways:
//!
//! - [`CallRecord::to_xml`] writes canonical XML (UTF-8 declaration, two-space indent).
//! - [`CallRecord::to_json`] folds the tree into JSON: the root element becomes the single
//!   top-level key, every child element becomes a key of its parent's object, repeated siblings
//!   collapse into an array, and leaf text becomes a string. Attributes are not projected, and a
//!   leaf with no text becomes `null`.

use crate::{PipelineError, PipelineResult};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::encoding::Decoder;
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};

/// One element of a call record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Leaf element holding `text`.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut element = Self::new(name);
        element.text = Some(text.into());
        element
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element name without any namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    /// First direct child with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.local_name() == name)
    }

    /// Text of the first direct child with the given local name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(XmlElement::text)
    }

    /// All descendants (not including `self`) in document order.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }

    /// Removes every direct child with the given local name; returns how many were removed.
    pub fn remove_children(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|c| c.local_name() != name);
        before - self.children.len()
    }

    fn append_text(&mut self, text: &str) {
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_owned()),
        }
    }

    fn write_into(&self, writer: &mut Writer<Vec<u8>>) -> PipelineResult<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.text.is_none() && self.children.is_empty() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|e| PipelineError::XmlSerialization(e.to_string()));
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|e| PipelineError::XmlSerialization(e.to_string()))?;
        if let Some(text) = &self.text {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(|e| PipelineError::XmlSerialization(e.to_string()))?;
        }
        for child in &self.children {
            child.write_into(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(|e| PipelineError::XmlSerialization(e.to_string()))
    }

    fn to_json_value(&self) -> Value {
        if self.children.is_empty() {
            return match &self.text {
                Some(text) => Value::String(text.clone()),
                None => Value::Null,
            };
        }

        let mut object = Map::new();
        for child in &self.children {
            let value = child.to_json_value();
            match object.get_mut(child.name()) {
                None => {
                    object.insert(child.name().to_owned(), value);
                }
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            }
        }
        Value::Object(object)
    }
}

/// Depth-first, document-order iterator over an element's descendants.
pub struct Descendants<'a> {
    stack: Vec<&'a XmlElement>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

/// A parsed call-metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    root: XmlElement,
}

impl CallRecord {
    pub fn from_root(root: XmlElement) -> Self {
        Self { root }
    }

    /// Parse raw recorder XML.
    ///
    /// Text is decoded according to the document's BOM or `encoding` declaration, defaulting to
    /// UTF-8.
    ///
    /// # Errors
    ///
    /// `PipelineError::MalformedRecord` for undecodable text, malformed XML, mismatched tags, or a
    /// document without a root element.
    pub fn parse(bytes: &[u8]) -> PipelineResult<Self> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut open: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            buf.clear();
            let event = reader.read_event_into(&mut buf).map_err(|e| {
                PipelineError::MalformedRecord(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                ))
            })?;
            let decoder = reader.decoder();

            match event {
                Event::Start(start) => open.push(element_from_start(&start, decoder)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start, decoder)?;
                    attach(&mut open, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = open.pop().ok_or_else(|| {
                        PipelineError::MalformedRecord("unexpected closing tag".into())
                    })?;
                    attach(&mut open, &mut root, element)?;
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| PipelineError::MalformedRecord(e.to_string()))?;
                    if let Some(current) = open.last_mut() {
                        current.append_text(&text);
                    }
                }
                Event::CData(data) => {
                    let text = decoder
                        .decode(&data)
                        .map_err(|e| PipelineError::MalformedRecord(e.to_string()))?;
                    if let Some(current) = open.last_mut() {
                        current.append_text(&text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !open.is_empty() {
            return Err(PipelineError::MalformedRecord(format!(
                "unclosed element <{}>",
                open.last().map(XmlElement::name).unwrap_or_default()
            )));
        }

        root.map(Self::from_root)
            .ok_or_else(|| PipelineError::MalformedRecord("document has no root element".into()))
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }

    /// Render canonical XML.
    pub fn to_xml(&self) -> PipelineResult<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| PipelineError::XmlSerialization(e.to_string()))?;
        self.root.write_into(&mut writer)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Fold the record into JSON, keeping the root element as the top-level key.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert(self.root.name().to_owned(), self.root.to_json_value());
        Value::Object(object)
    }
}

fn element_from_start(start: &BytesStart<'_>, decoder: Decoder) -> PipelineResult<XmlElement> {
    let name = decoder
        .decode(start.name().as_ref())
        .map_err(|e| PipelineError::MalformedRecord(e.to_string()))?
        .into_owned();
    let mut element = XmlElement::new(name);

    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| PipelineError::MalformedRecord(e.to_string()))?;
        let key = decoder
            .decode(attribute.key.as_ref())
            .map_err(|e| PipelineError::MalformedRecord(e.to_string()))?
            .into_owned();
        let value = attribute
            .decode_and_unescape_value(decoder)
            .map_err(|e| PipelineError::MalformedRecord(e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }

    Ok(element)
}

fn attach(
    open: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> PipelineResult<()> {
    match open.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(PipelineError::MalformedRecord(
            "document has more than one root element".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<recording version="2">
  <id>abc-123</id>
  <employees>
    <employee><firstName>Ada</firstName><lastName>Lovelace</lastName></employee>
    <employee><firstName>Alan</firstName><lastName>Turing</lastName></employee>
  </employees>
  <note><![CDATA[a < b]]></note>
  <empty/>
  <escaped>Smith &amp; Sons</escaped>
</recording>"#;

    #[test]
    fn parses_tree_in_document_order() {
        let record = CallRecord::parse(SAMPLE.as_bytes()).unwrap();
        let root = record.root();

        assert_eq!(root.name(), "recording");
        assert_eq!(root.attributes(), &[("version".to_string(), "2".to_string())]);
        assert_eq!(root.child_text("id"), Some("abc-123"));
        assert_eq!(root.child_text("note"), Some("a < b"));
        assert_eq!(root.child_text("escaped"), Some("Smith & Sons"));
        assert_eq!(root.child("empty").and_then(XmlElement::text), None);

        let last_names: Vec<_> = root
            .descendants()
            .filter(|e| e.name() == "lastName")
            .filter_map(XmlElement::text)
            .collect();
        assert_eq!(last_names, vec!["Lovelace", "Turing"]);
    }

    #[test]
    fn rejects_malformed_documents() {
        for bad in ["", "<a><b></a>", "<a>", "<a/><b/>", "not xml at all"] {
            assert!(
                matches!(
                    CallRecord::parse(bad.as_bytes()),
                    Err(PipelineError::MalformedRecord(_))
                ),
                "accepted {bad:?}"
            );
        }
        assert!(CallRecord::parse(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn decodes_declared_latin1_records() {
        let mut bytes = br#"<?xml version="1.0" encoding="ISO-8859-1"?><recording><id>g-1</id><employee><firstName>Jos"#.to_vec();
        bytes.push(0xe9);
        bytes.extend_from_slice(b"</firstName></employee><note kind=\"caf");
        bytes.push(0xe9);
        bytes.extend_from_slice(b"\"/></recording>");

        let record = CallRecord::parse(&bytes).unwrap();
        let employee = record.root().child("employee").unwrap();
        assert_eq!(employee.child_text("firstName"), Some("Jos\u{e9}"));
        let note = record.root().child("note").unwrap();
        assert_eq!(note.attributes(), [("kind".to_owned(), "caf\u{e9}".to_owned())]);

        let xml = String::from_utf8(record.to_xml().unwrap()).unwrap();
        assert!(xml.contains("Jos\u{e9}"));
    }

    #[test]
    fn json_projection_folds_repeats_into_arrays() {
        let record = CallRecord::parse(SAMPLE.as_bytes()).unwrap();

        assert_eq!(
            record.to_json(),
            json!({
                "recording": {
                    "id": "abc-123",
                    "employees": {
                        "employee": [
                            {"firstName": "Ada", "lastName": "Lovelace"},
                            {"firstName": "Alan", "lastName": "Turing"}
                        ]
                    },
                    "note": "a < b",
                    "empty": null,
                    "escaped": "Smith & Sons"
                }
            })
        );
    }

    #[test]
    fn json_projection_handles_three_repeats() {
        let mut root = XmlElement::new("r");
        for n in ["1", "2", "3"] {
            root.push_child(XmlElement::with_text("n", n));
        }
        let record = CallRecord::from_root(root);

        assert_eq!(record.to_json(), json!({"r": {"n": ["1", "2", "3"]}}));
    }

    #[test]
    fn xml_output_reparses_to_same_tree() {
        let record = CallRecord::parse(SAMPLE.as_bytes()).unwrap();
        let xml = record.to_xml().unwrap();
        let text = String::from_utf8(xml.clone()).unwrap();

        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("Smith &amp; Sons"));
        assert!(text.contains("<empty/>"));
        assert_eq!(CallRecord::parse(&xml).unwrap(), record);
    }

    #[test]
    fn remove_children_by_local_name() {
        let mut root = XmlElement::new("r");
        root.push_child(XmlElement::with_text("x", "1"));
        root.push_child(XmlElement::with_text("y", "2"));
        root.push_child(XmlElement::with_text("x", "3"));

        assert_eq!(root.remove_children("x"), 2);
        assert_eq!(root.children().len(), 1);
    }
}
