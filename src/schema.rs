//! Schema validation.
//!
//! The document schema is fixed and known at build time, so validation is a
//! single streaming pass with a hand-rolled checker rather than a general
//! schema engine. [`validate`] is purely a gate: it retains no state, can
//! run zero or more times independently of parsing, and fails on the first
//! structural or type violation with a location hint. Production pipelines
//! should validate and then parse.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;

use crate::construct::ConstructKind;
use crate::error::{KunskapError, Result};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").unwrap();
}

pub const ROOT_TAG: &str = "knowledgebase";

const METADATA_FIELDS: [&str; 8] = [
    "name",
    "version",
    "created",
    "author",
    "description",
    "locale",
    "generator",
    "checksum",
];

const COLLECTIONS: [&str; 7] = [
    "purposes",
    "variants",
    "features",
    "events",
    "rules",
    "fulfillments",
    "constitutions",
];

/// Validates a document against the fixed schema.
pub fn validate<R: BufRead>(source: R) -> Result<()> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut checker = Checker::new();
    loop {
        buf.clear();
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(cause) => {
                return Err(checker.violation(
                    reader.buffer_position(),
                    format!("malformed XML: {}", cause),
                ));
            }
        };
        let position = reader.buffer_position();
        match event {
            Event::Start(start) => checker.start(&start, position)?,
            Event::Empty(start) => {
                checker.start(&start, position)?;
                checker.end(position)?;
            }
            Event::Text(text) => {
                let unescaped = text
                    .unescape()
                    .map_err(|cause| checker.violation(position, cause.to_string()))?;
                checker.text(&unescaped);
            }
            Event::CData(data) => {
                let raw = data.into_inner();
                checker.text(&String::from_utf8_lossy(&raw));
            }
            Event::End(_) => checker.end(position)?,
            Event::Eof => return checker.eof(position),
            _ => {}
        }
    }
}

pub fn validate_str(document: &str) -> Result<()> {
    validate(document.as_bytes())
}

pub fn validate_file(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|cause| KunskapError::Schema {
        location: path.display().to_string(),
        message: cause.to_string(),
    })?;
    validate(BufReader::new(file))
}

// ------------- Checker -------------
struct Frame {
    name: String,
    children: usize,
    values: usize,
    variant_refs: usize,
    enumeration: bool,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            children: 0,
            values: 0,
            variant_refs: 0,
            enumeration: false,
            text: String::new(),
        }
    }
}

struct Checker {
    stack: Vec<Frame>,
    root_seen: bool,
}

impl Checker {
    fn new() -> Self {
        Self {
            stack: Vec::new(),
            root_seen: false,
        }
    }

    fn path(&self) -> String {
        let mut path = String::new();
        for frame in &self.stack {
            path.push('/');
            path.push_str(&frame.name);
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }

    fn violation(&self, position: u64, message: impl Into<String>) -> KunskapError {
        KunskapError::Schema {
            location: format!("byte {} in {}", position, self.path()),
            message: message.into(),
        }
    }

    fn attributes(&self, start: &BytesStart<'_>, position: u64) -> Result<Vec<(String, String)>> {
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute =
                attribute.map_err(|cause| self.violation(position, cause.to_string()))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|cause| self.violation(position, cause.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(attributes)
    }

    fn start(&mut self, start: &BytesStart<'_>, position: u64) -> Result<()> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let attributes = self.attributes(start, position)?;
        self.check_element(&name, &attributes, position)?;
        if let Some(parent) = self.stack.last_mut() {
            parent.children += 1;
            match name.as_str() {
                "value" => parent.values += 1,
                "variant" if parent.name == "event" || parent.name == "rule" => {
                    parent.variant_refs += 1;
                }
                _ => {}
            }
        }
        let mut frame = Frame::new(name);
        if frame.name == "feature" {
            frame.enumeration = attributes
                .iter()
                .any(|(key, value)| key == "kind" && value == "enumeration");
        }
        self.stack.push(frame);
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(frame) = self.stack.last_mut() {
            frame.text.push_str(text.trim());
        }
    }

    fn end(&mut self, position: u64) -> Result<()> {
        let frame = match self.stack.pop() {
            Some(frame) => frame,
            None => return Err(self.violation(position, "unbalanced end tag")),
        };
        match frame.name.as_str() {
            ROOT_TAG => {
                if frame.children != 2 {
                    // reported against the root so the path is still useful
                    self.stack.push(frame);
                    let violation =
                        self.violation(position, "expected exactly <metadata> and <data>");
                    self.stack.pop();
                    return Err(violation);
                }
            }
            "metadata" => {
                if frame.children != METADATA_FIELDS.len() {
                    return Err(self.violation(
                        position,
                        format!(
                            "metadata must carry all {} fields, found {}",
                            METADATA_FIELDS.len(),
                            frame.children
                        ),
                    ));
                }
            }
            "data" => {
                if frame.children != COLLECTIONS.len() {
                    return Err(self.violation(
                        position,
                        format!(
                            "data must carry all {} collections, found {}",
                            COLLECTIONS.len(),
                            frame.children
                        ),
                    ));
                }
            }
            "created" => {
                if NaiveDate::parse_from_str(frame.text.trim(), "%Y-%m-%d").is_err() {
                    return Err(self.violation(
                        position,
                        format!("created must be an ISO date, got '{}'", frame.text.trim()),
                    ));
                }
            }
            "value" => {
                if frame.text.trim().is_empty() {
                    return Err(self.violation(position, "empty <value>"));
                }
            }
            "feature" => {
                if frame.enumeration && frame.values == 0 {
                    return Err(
                        self.violation(position, "an enumeration needs at least one <value>")
                    );
                }
            }
            "event" | "rule" => {
                if frame.variant_refs == 0 {
                    return Err(self.violation(
                        position,
                        format!("a {} must be attached to at least one variant", frame.name),
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn eof(&self, position: u64) -> Result<()> {
        if !self.stack.is_empty() {
            return Err(self.violation(position, "unexpected end of document"));
        }
        if !self.root_seen {
            return Err(self.violation(position, "document has no root element"));
        }
        Ok(())
    }

    fn check_element(
        &mut self,
        name: &str,
        attributes: &[(String, String)],
        position: u64,
    ) -> Result<()> {
        let parent = self.stack.last().map(|frame| frame.name.clone());
        match parent.as_deref() {
            None => {
                if self.root_seen {
                    return Err(self.violation(position, "more than one root element"));
                }
                if name != ROOT_TAG {
                    return Err(self.violation(
                        position,
                        format!("root element must be <{}>, got <{}>", ROOT_TAG, name),
                    ));
                }
                self.root_seen = true;
                self.no_attributes(name, attributes, position)
            }
            Some(ROOT_TAG) => {
                let index = self.child_index();
                let expected = match index {
                    0 => "metadata",
                    1 => "data",
                    _ => {
                        return Err(
                            self.violation(position, format!("unexpected element <{}>", name))
                        );
                    }
                };
                if name != expected {
                    return Err(self.violation(
                        position,
                        format!("expected <{}> here, got <{}>", expected, name),
                    ));
                }
                self.no_attributes(name, attributes, position)
            }
            Some("metadata") => {
                let index = self.child_index();
                match METADATA_FIELDS.get(index) {
                    Some(expected) if *expected == name => {
                        self.no_attributes(name, attributes, position)
                    }
                    Some(expected) => Err(self.violation(
                        position,
                        format!("expected <{}> here, got <{}>", expected, name),
                    )),
                    None => Err(self.violation(position, format!("unexpected element <{}>", name))),
                }
            }
            Some("data") => {
                let index = self.child_index();
                match COLLECTIONS.get(index) {
                    Some(expected) if *expected == name => {
                        self.no_attributes(name, attributes, position)
                    }
                    Some(expected) => Err(self.violation(
                        position,
                        format!("expected <{}> here, got <{}>", expected, name),
                    )),
                    None => Err(self.violation(position, format!("unexpected element <{}>", name))),
                }
            }
            Some("purposes") => {
                self.expect(name, "purpose", position)?;
                self.check_attributes(
                    name,
                    attributes,
                    &[("id", Type::Identifier), ("name", Type::Text)],
                    &[("description", Type::Text), ("root", Type::Flag)],
                    position,
                )
            }
            Some("variants") => {
                self.expect(name, "variant", position)?;
                self.check_attributes(
                    name,
                    attributes,
                    &[("id", Type::Identifier), ("name", Type::Text)],
                    &[("description", Type::Text)],
                    position,
                )
            }
            Some("features") => {
                self.expect(name, "feature", position)?;
                let range = attributes
                    .iter()
                    .any(|(key, value)| key == "kind" && value == "range");
                let (required, allowed): (&[_], &[_]) = if range {
                    (
                        &[
                            ("id", Type::Identifier),
                            ("variant", Type::Identifier),
                            ("name", Type::Text),
                            ("kind", Type::FeatureKind),
                            ("min", Type::Integer),
                            ("max", Type::Integer),
                        ],
                        &[],
                    )
                } else {
                    (
                        &[
                            ("id", Type::Identifier),
                            ("variant", Type::Identifier),
                            ("name", Type::Text),
                            ("kind", Type::FeatureKind),
                        ],
                        &[],
                    )
                };
                self.check_attributes(name, attributes, required, allowed, position)
            }
            Some("events") => {
                self.expect(name, "event", position)?;
                self.check_attributes(
                    name,
                    attributes,
                    &[("id", Type::Identifier), ("name", Type::Text)],
                    &[],
                    position,
                )
            }
            Some("rules") => {
                self.expect(name, "rule", position)?;
                self.check_attributes(
                    name,
                    attributes,
                    &[("id", Type::Identifier), ("name", Type::Text)],
                    &[("expr", Type::Text)],
                    position,
                )
            }
            Some("fulfillments") => {
                self.expect(name, "fulfills", position)?;
                self.check_attributes(
                    name,
                    attributes,
                    &[("purpose", Type::Identifier), ("variant", Type::Identifier)],
                    &[],
                    position,
                )
            }
            Some("constitutions") => {
                self.expect(name, "constitutes", position)?;
                self.check_attributes(
                    name,
                    attributes,
                    &[("variant", Type::Identifier), ("purpose", Type::Identifier)],
                    &[],
                    position,
                )
            }
            Some("feature") => {
                if name != "value" {
                    return Err(self.violation(
                        position,
                        format!("a feature may only contain <value>, got <{}>", name),
                    ));
                }
                let enumeration = self
                    .stack
                    .last()
                    .map(|frame| frame.enumeration)
                    .unwrap_or(false);
                if !enumeration {
                    return Err(self.violation(
                        position,
                        "only enumeration features carry <value> children",
                    ));
                }
                self.no_attributes(name, attributes, position)
            }
            Some("event") => {
                self.expect(name, "variant", position)?;
                self.check_attributes(name, attributes, &[("ref", Type::Identifier)], &[], position)
            }
            Some("rule") => match name {
                "variant" => self.check_attributes(
                    name,
                    attributes,
                    &[("ref", Type::Identifier)],
                    &[],
                    position,
                ),
                "ref" => self.check_attributes(
                    name,
                    attributes,
                    &[("kind", Type::ReferenceKind), ("id", Type::Identifier)],
                    &[],
                    position,
                ),
                other => Err(self.violation(
                    position,
                    format!("a rule may only contain <variant> and <ref>, got <{}>", other),
                )),
            },
            Some(leaf) => Err(self.violation(
                position,
                format!("<{}> may not contain child elements (<{}>)", leaf, name),
            )),
        }
    }

    fn expect(&self, name: &str, expected: &str, position: u64) -> Result<()> {
        if name != expected {
            return Err(self.violation(
                position,
                format!("expected <{}> here, got <{}>", expected, name),
            ));
        }
        Ok(())
    }

    fn child_index(&self) -> usize {
        self.stack.last().map(|frame| frame.children).unwrap_or(0)
    }

    fn no_attributes(
        &self,
        name: &str,
        attributes: &[(String, String)],
        position: u64,
    ) -> Result<()> {
        if let Some((key, _)) = attributes.first() {
            return Err(self.violation(
                position,
                format!("<{}> takes no attributes, found '{}'", name, key),
            ));
        }
        Ok(())
    }

    fn check_attributes(
        &self,
        name: &str,
        attributes: &[(String, String)],
        required: &[(&str, Type)],
        allowed: &[(&str, Type)],
        position: u64,
    ) -> Result<()> {
        for (key, declared) in required {
            match attributes.iter().find(|(k, _)| k == key) {
                Some((_, value)) => self.check_type(name, key, value, *declared, position)?,
                None => {
                    return Err(self.violation(
                        position,
                        format!("<{}> requires attribute '{}'", name, key),
                    ));
                }
            }
        }
        for (key, value) in attributes {
            if required.iter().any(|(k, _)| k == key) {
                continue;
            }
            match allowed.iter().find(|(k, _)| k == key) {
                Some((_, declared)) => self.check_type(name, key, value, *declared, position)?,
                None => {
                    return Err(self.violation(
                        position,
                        format!("<{}> does not take attribute '{}'", name, key),
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_type(
        &self,
        element: &str,
        attribute: &str,
        value: &str,
        declared: Type,
        position: u64,
    ) -> Result<()> {
        let ok = match declared {
            Type::Text => true,
            Type::Identifier => IDENTIFIER.is_match(value),
            Type::Flag => value == "true" || value == "false",
            Type::Integer => value.parse::<i64>().is_ok(),
            Type::FeatureKind => matches!(value, "enumeration" | "range" | "toggle"),
            Type::ReferenceKind => ConstructKind::parse_referencable(value).is_some(),
        };
        if !ok {
            return Err(self.violation(
                position,
                format!(
                    "<{}> attribute '{}' has invalid {} value '{}'",
                    element,
                    attribute,
                    declared.describe(),
                    value
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Type {
    Text,
    Identifier,
    Flag,
    Integer,
    FeatureKind,
    ReferenceKind,
}

impl Type {
    fn describe(&self) -> &'static str {
        match self {
            Type::Text => "text",
            Type::Identifier => "identifier",
            Type::Flag => "boolean",
            Type::Integer => "integer",
            Type::FeatureKind => "feature kind",
            Type::ReferenceKind => "reference kind",
        }
    }
}
