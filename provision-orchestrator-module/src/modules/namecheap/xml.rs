//! Minimal element tree over `quick-xml` events.
//!
//! Namecheap answers are small and attribute-heavy; a tree with case-insensitive
//! lookups keeps the command handlers readable.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

fn start_node(e: &BytesStart<'_>) -> Result<XmlNode, String> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?;
        attrs.push((key, value.into_owned()));
    }
    Ok(XmlNode {
        name,
        attrs,
        ..XmlNode::default()
    })
}

impl XmlNode {
    /// Parses a document and returns its root element.
    pub fn parse(xml: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack = vec![XmlNode::default()];
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => stack.push(start_node(&e)?),
                Ok(Event::Empty(e)) => {
                    let node = start_node(&e)?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(node);
                    }
                }
                Ok(Event::End(_)) => {
                    let node = stack.pop().ok_or("unbalanced closing tag")?;
                    let parent = stack.last_mut().ok_or("unbalanced closing tag")?;
                    parent.children.push(node);
                }
                Ok(Event::Text(t)) => {
                    let text = t.unescape().map_err(|e| e.to_string())?;
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&text);
                    }
                }
                Ok(Event::CData(c)) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(format!("at byte {}: {e}", reader.buffer_position()));
                }
            }
        }

        if stack.len() != 1 {
            return Err("document ended inside an element".to_string());
        }
        stack
            .pop()
            .and_then(|doc| doc.children.into_iter().next())
            .ok_or_else(|| "empty document".to_string())
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Attribute equals `true` (Namecheap spells booleans as text).
    pub fn attr_true(&self, name: &str) -> bool {
        self.attr(name).is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children
            .iter()
            .filter(move |c| c.name.eq_ignore_ascii_case(name))
    }

    /// Depth-first search for the first descendant with this name.
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find_map(|c| {
            if c.name.eq_ignore_ascii_case(name) {
                Some(c)
            } else {
                c.find(name)
            }
        })
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_attributes_children_and_text() {
        let root = XmlNode::parse(
            r#"<?xml version="1.0" encoding="utf-8"?>
<ApiResponse Status="OK" xmlns="http://api.namecheap.com/xml.response">
  <Errors />
  <CommandResponse Type="namecheap.domains.dns.getList">
    <DomainDNSGetListResult Domain="example.com" IsUsingOurDNS="false">
      <Nameserver>ns1.host.com</Nameserver>
      <Nameserver>ns2.host.com</Nameserver>
    </DomainDNSGetListResult>
  </CommandResponse>
</ApiResponse>"#,
        )
        .unwrap();
        assert_eq!(root.name, "ApiResponse");
        assert_eq!(root.attr("status"), Some("OK"));
        let result = root.find("DomainDNSGetListResult").unwrap();
        let ns: Vec<&str> = result
            .children_named("Nameserver")
            .map(|n| n.text.as_str())
            .collect();
        assert_eq!(ns, vec!["ns1.host.com", "ns2.host.com"]);
        assert!(!result.attr_true("IsUsingOurDNS"));
    }

    #[test]
    fn unescapes_entities() {
        let root = XmlNode::parse(r#"<A note="a &amp; b">x &lt; y</A>"#).unwrap();
        assert_eq!(root.attr("note"), Some("a & b"));
        assert_eq!(root.text, "x < y");
    }

    #[test]
    fn rejects_truncated_documents() {
        assert!(XmlNode::parse("<ApiResponse><Errors>").is_err());
        assert!(XmlNode::parse("").is_err());
    }
}
