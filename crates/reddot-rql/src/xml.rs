//! Minimal XML tree for RQL replies, plus a builder for request fragments.
//!
//! Replies are small and navigated by element name, so they are parsed once
//! into an owned [`XmlElement`] tree. Requests are built as text with
//! [`ElementBuilder`], which escapes every attribute value. Credential
//! placeholders only reach the request through
//! [`ElementBuilder::placeholder_attr`]; a value that merely contains `[!`
//! is written as a character reference and never substituted.

use std::fmt::{self, Display, Write as _};
use std::str::FromStr;

use chrono::NaiveDateTime;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::Result;
use crate::protocol::Placeholder;
use crate::types::{self, Guid};

// ============================================================================
// Parsed tree
// ============================================================================

/// An element of a parsed reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    /// Attributes in document order, values unescaped.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    /// Concatenated, unescaped text content (whitespace-trimmed).
    pub text: String,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a document and return its root element.
    pub fn parse(input: &str) -> Result<XmlElement> {
        let mut reader = Reader::from_str(input);
        reader.trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(element_from_start(&e)?),
                Event::Empty(e) => {
                    let element = element_from_start(&e)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    if let Some(element) = stack.pop() {
                        attach(&mut stack, &mut root, element);
                    }
                }
                Event::Text(t) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&t.unescape()?);
                    }
                }
                Event::CData(c) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(quick_xml::Error::UnexpectedEof(format!("unclosed element <{}>", open.name)).into());
        }
        root.ok_or_else(|| quick_xml::Error::UnexpectedEof("document has no root element".into()).into())
    }

    /// Element name without a namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// Whether the element is called `name`, with or without prefix.
    pub fn is(&self, name: &str) -> bool {
        self.name == name || self.local_name() == name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Attribute value parsed with `FromStr`; `None` when absent or unparseable.
    pub fn parse_attr<T: FromStr>(&self, name: &str) -> Option<T> {
        self.attr(name).and_then(|v| v.trim().parse().ok())
    }

    pub fn bool_attr(&self, name: &str) -> Option<bool> {
        self.attr(name).and_then(types::parse_rql_bool)
    }

    /// GUID attribute; empty and nil GUIDs read as `None`.
    pub fn guid_attr(&self, name: &str) -> Option<Guid> {
        self.attr(name).and_then(Guid::parse_optional)
    }

    /// OLE automation date attribute.
    pub fn date_attr(&self, name: &str) -> Option<NaiveDateTime> {
        self.attr(name).and_then(types::parse_ole_date)
    }

    /// Non-empty string attribute.
    pub fn string_attr(&self, name: &str) -> Option<String> {
        self.attr(name).filter(|v| !v.is_empty()).map(str::to_string)
    }

    /// First direct child called `name`.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is(name))
    }

    /// All direct children called `name`.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.is(name))
    }

    /// First element called `name`, searching this element and then its
    /// descendants depth-first.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        if self.is(name) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Every element called `name` in this subtree, in document order.
    pub fn find_all<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        self.collect_named(name, &mut found);
        found
    }

    fn collect_named<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlElement>) {
        if self.is(name) {
            out.push(self);
        }
        for child in &self.children {
            child.collect_named(name, out);
        }
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::InvalidAttr)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    }
}

// ============================================================================
// Request builder
// ============================================================================

/// Builds one request element as text.
///
/// ```
/// use reddot_rql::ElementBuilder;
///
/// let xml = ElementBuilder::new("PROJECT")
///     .child(ElementBuilder::new("CATEGORY").attr("action", "addnew").attr("value", "R&D"))
///     .to_string();
/// assert_eq!(xml, r#"<PROJECT><CATEGORY action="addnew" value="R&amp;D"/></PROJECT>"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementBuilder {
    name: String,
    attributes: Vec<(String, AttrValue)>,
    children: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrValue {
    Text(String),
    Placeholder(Placeholder),
}

impl ElementBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Add an attribute. The value is escaped when the element is rendered.
    pub fn attr(mut self, name: &str, value: impl Display) -> Self {
        self.attributes
            .push((name.to_string(), AttrValue::Text(value.to_string())));
        self
    }

    /// Add an attribute whose value is filled in with a credential when the
    /// request is sent.
    pub fn placeholder_attr(mut self, name: &str, placeholder: Placeholder) -> Self {
        self.attributes
            .push((name.to_string(), AttrValue::Placeholder(placeholder)));
        self
    }

    /// Add an attribute only when a value is present.
    pub fn attr_opt<V: Display>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.attr(name, v),
            None => self,
        }
    }

    pub fn bool_attr(self, name: &str, value: bool) -> Self {
        self.attr(name, types::rql_bool(value))
    }

    pub fn child(mut self, child: ElementBuilder) -> Self {
        self.children.push(child.to_string());
        self
    }
}

impl Display for ElementBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('<')?;
        f.write_str(&self.name)?;
        for (k, v) in &self.attributes {
            match v {
                AttrValue::Text(text) => write!(f, " {k}=\"{}\"", escape_value(text))?,
                AttrValue::Placeholder(p) => write!(f, " {k}=\"{}\"", p.as_str())?,
            }
        }
        if self.children.is_empty() {
            return f.write_str("/>");
        }
        f.write_char('>')?;
        for child in &self.children {
            f.write_str(child)?;
        }
        write!(f, "</{}>", self.name)
    }
}

/// Escape an attribute value; `[!` becomes `&#91;!` so user text can never
/// form a credential placeholder.
fn escape_value(value: &str) -> String {
    escape(value).replace("[!", "&#91;!")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PAGES_REPLY: &str = r#"<IODATA>
  <PAGES>
    <PAGE guid="11111111111111111111111111111111" id="17" headline="Home &amp; Garden"/>
    <PAGE guid="22222222222222222222222222222222" id="18" headline="News"/>
  </PAGES>
</IODATA>"#;

    #[test]
    fn test_parse_nested_elements() {
        let root = XmlElement::parse(PAGES_REPLY).unwrap();
        assert_eq!(root.name, "IODATA");
        let pages = root.child("PAGES").unwrap();
        let headlines: Vec<_> = pages
            .children_named("PAGE")
            .map(|p| p.attr("headline").unwrap())
            .collect();
        assert_eq!(headlines, vec!["Home & Garden", "News"]);
        assert_eq!(pages.children[0].parse_attr::<u32>("id"), Some(17));
    }

    #[test]
    fn test_find_searches_depth_first() {
        let root = XmlElement::parse(PAGES_REPLY).unwrap();
        let first = root.find("PAGE").unwrap();
        assert_eq!(first.attr("id"), Some("17"));
        assert_eq!(root.find_all("PAGE").len(), 2);
        assert!(root.find("TEMPLATE").is_none());
    }

    #[test]
    fn test_text_and_cdata() {
        let root = XmlElement::parse("<R><A>one &lt; two</A><B><![CDATA[<raw>]]></B></R>").unwrap();
        assert_eq!(root.child("A").unwrap().text, "one < two");
        assert_eq!(root.child("B").unwrap().text, "<raw>");
    }

    #[test]
    fn test_prefixed_names() {
        let root = XmlElement::parse(
            r#"<s:Envelope xmlns:s="urn:x"><s:Body><Result>ok</Result></s:Body></s:Envelope>"#,
        )
        .unwrap();
        assert_eq!(root.local_name(), "Envelope");
        assert!(root.is("Envelope"));
        assert_eq!(root.find("Result").unwrap().text, "ok");
    }

    #[test]
    fn test_typed_attributes() {
        let el = XmlElement::parse(
            r#"<PAGE guid="6D3B5C1E22A14F779CBB0E2F2A1B3C4D" parent="" locked="1" changedate="36526.5"/>"#,
        )
        .unwrap();
        assert!(el.guid_attr("guid").is_some());
        assert_eq!(el.guid_attr("parent"), None);
        assert_eq!(el.bool_attr("locked"), Some(true));
        assert_eq!(el.bool_attr("missing"), None);
        assert_eq!(el.date_attr("changedate").unwrap().to_string(), "2000-01-01 12:00:00");
        assert_eq!(el.string_attr("parent"), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(XmlElement::parse("").is_err());
        assert!(XmlElement::parse("<A><B></A>").is_err());
        assert!(XmlElement::parse("<A>").is_err());
    }

    #[test]
    fn test_builder_escapes_attribute_values() {
        let xml = ElementBuilder::new("PAGE")
            .attr("action", "save")
            .attr("headline", r#"Tom & "Jerry" <3"#)
            .to_string();
        assert_eq!(
            xml,
            r#"<PAGE action="save" headline="Tom &amp; &quot;Jerry&quot; &lt;3"/>"#
        );
    }

    #[test]
    fn test_builder_nesting_and_optional_attributes() {
        let xml = ElementBuilder::new("ADMINISTRATION")
            .child(
                ElementBuilder::new("PROJECT")
                    .attr("action", "load")
                    .attr_opt("guid", None::<&str>)
                    .bool_attr("force", true),
            )
            .to_string();
        assert_eq!(
            xml,
            r#"<ADMINISTRATION><PROJECT action="load" force="1"/></ADMINISTRATION>"#
        );
    }

    #[test]
    fn test_placeholder_text_in_values_is_not_a_placeholder() {
        let xml = ElementBuilder::new("PAGE")
            .attr("headline", "Use [!key!] or [!guid_login!]")
            .placeholder_attr("guid", Placeholder::LoginGuid)
            .to_string();
        assert_eq!(
            xml,
            r#"<PAGE headline="Use &#91;!key!] or &#91;!guid_login!]" guid="[!guid_login!]"/>"#
        );
        let el = XmlElement::parse(&xml).unwrap();
        assert_eq!(el.attr("headline"), Some("Use [!key!] or [!guid_login!]"));
    }

    #[test]
    fn test_built_request_parses_back() {
        let xml = ElementBuilder::new("CATEGORY")
            .attr("value", "a<b & 'c'")
            .to_string();
        let el = XmlElement::parse(&xml).unwrap();
        assert_eq!(el.attr("value"), Some("a<b & 'c'"));
    }
}
