//! Namespace-agnostic element tree built with `quick-xml`.
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// Why a document could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub code: &'static str,
    pub line: usize,
}

/// One element: local name, attributes by local name, and its direct text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed text content, `None` when empty.
    pub fn text(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty()).then_some(text)
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Every child with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Follow a `>`-style path of child names starting below this node.
    pub fn descend(&self, path: &[&str]) -> Option<&XmlNode> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }
}

fn node_from_start(start: &BytesStart<'_>) -> Result<XmlNode, quick_xml::Error> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute?;
        if attribute.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(XmlNode {
        name,
        attributes,
        ..XmlNode::default()
    })
}

fn error_code(error: &quick_xml::Error) -> &'static str {
    match error {
        quick_xml::Error::Syntax(_) => "InvalidXml",
        quick_xml::Error::IllFormed(_) => "InvalidTag",
        quick_xml::Error::InvalidAttr(_) => "InvalidAttr",
        quick_xml::Error::Escape(_) => "InvalidEntity",
        quick_xml::Error::Encoding(_) => "InvalidEncoding",
        _ => "InvalidXml",
    }
}

fn line_at(xml: &str, position: impl TryInto<usize>) -> usize {
    let end = position.try_into().unwrap_or(usize::MAX).min(xml.len());
    1 + xml.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count()
}

fn invalid(xml: &str, message: impl Into<String>, position: usize) -> SyntaxError {
    SyntaxError {
        message: message.into(),
        code: "InvalidXml",
        line: line_at(xml, position),
    }
}

fn position(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

/// Parse `xml` into its single root element.
///
/// Character data outside the root, a second top-level element and a
/// document without any element are all syntax errors.
pub fn parse(xml: &str) -> Result<XmlNode, SyntaxError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    let fail = |reader: &Reader<&[u8]>, error: quick_xml::Error| SyntaxError {
        message: error.to_string(),
        code: error_code(&error),
        line: line_at(xml, reader.error_position()),
    };

    loop {
        let started = position(&reader);
        let event = reader.read_event().map_err(|e| fail(&reader, e))?;
        match event {
            Event::Start(start) | Event::Empty(start) if stack.is_empty() && root.is_some() => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                return Err(invalid(
                    xml,
                    format!("multiple root elements, found `{name}` after the root"),
                    started,
                ));
            }
            Event::Start(start) => {
                let node = node_from_start(&start).map_err(|e| fail(&reader, e))?;
                stack.push(node);
            }
            Event::Empty(start) => {
                let node = node_from_start(&start).map_err(|e| fail(&reader, e))?;
                attach(&mut stack, &mut root, node);
            }
            Event::End(_) => {
                if let Some(node) = stack.pop() {
                    attach(&mut stack, &mut root, node);
                }
            }
            Event::Text(text) => match stack.last_mut() {
                Some(node) => {
                    let text = text.unescape().map_err(|e| fail(&reader, e))?;
                    node.text.push_str(&text);
                }
                None => {
                    let raw = String::from_utf8_lossy(&text);
                    let stray = raw.trim_start_matches('\u{feff}').trim();
                    if !stray.is_empty() {
                        return Err(invalid(
                            xml,
                            format!("character data outside the root element: `{stray}`"),
                            started + (raw.len() - raw.trim_start().len()),
                        ));
                    }
                }
            },
            Event::CData(data) => match stack.last_mut() {
                Some(node) => node.text.push_str(&String::from_utf8_lossy(&data)),
                None => {
                    return Err(invalid(xml, "CDATA outside the root element", started));
                }
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(SyntaxError {
            message: format!("unclosed element `{}`", open.name),
            code: "InvalidTag",
            line: line_at(xml, position(&reader)),
        });
    }
    root.ok_or_else(|| invalid(xml, "document has no root element", xml.len()))
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}
