//! Record binding.
//!
//! [`bind`] maps one materialized element onto the fixed set of domain
//! record kinds. Binding is a pure function with no I/O: either the whole
//! subtree maps cleanly or binding fails. Wrapper and collection elements
//! bind to [`Record::Batch`], which is what lets one binder serve every
//! skip policy: the data wrapper may arrive as a single nested record or
//! its pieces may arrive individually.

use chrono::NaiveDate;
use tracing::debug;

use crate::construct::{
    Constitutes, ConstructKind, ConstructRef, Domain, Event, Feature, Fulfills, Metadata, Purpose,
    Rule, Variant,
};
use crate::error::{KunskapError, Result};
use crate::stream::Element;

// ------------- Record -------------
#[derive(Debug)]
pub enum Record {
    Metadata(Metadata),
    Purpose(Purpose),
    Variant(Variant),
    Feature(Feature),
    Event(Event),
    Rule(Rule),
    Fulfills(Fulfills),
    Constitutes(Constitutes),
    /// A wrapper or collection subtree, bound recursively.
    Batch(Vec<Record>),
}

impl Record {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Record::Metadata(_) => "metadata",
            Record::Purpose(_) => "purpose",
            Record::Variant(_) => "variant",
            Record::Feature(_) => "feature",
            Record::Event(_) => "event",
            Record::Rule(_) => "rule",
            Record::Fulfills(_) => "fulfills",
            Record::Constitutes(_) => "constitutes",
            Record::Batch(_) => "batch",
        }
    }
}

// ------------- RecordHandler -------------
/// The single extension point of the ingestion pipeline, invoked exactly
/// once per emitted element, in document order, on the thread driving the
/// read loop. Records are passed by value, so implementations keep nothing
/// of the reader's buffers.
pub trait RecordHandler {
    fn handle(&mut self, record: Record) -> Result<()>;
}

/// A handler that only logs what passes by. Useful to inspect a document
/// without building anything.
#[derive(Debug, Default)]
pub struct DiagnosticPrinter {
    handled: u64,
}

impl DiagnosticPrinter {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn handled(&self) -> u64 {
        self.handled
    }
}

impl RecordHandler for DiagnosticPrinter {
    fn handle(&mut self, record: Record) -> Result<()> {
        self.handled += 1;
        debug!(kind = record.kind_name(), n = self.handled, "record");
        Ok(())
    }
}

// ------------- Binder -------------
const BATCH_TAGS: &[&str] = &[
    "knowledgebase",
    "data",
    "purposes",
    "variants",
    "features",
    "events",
    "rules",
    "fulfillments",
    "constitutions",
];

/// Binds one element to a record.
pub fn bind(element: &Element) -> Result<Record> {
    match element.name() {
        "metadata" => bind_metadata(element),
        "purpose" => bind_purpose(element),
        "variant" => bind_variant(element),
        "feature" => bind_feature(element),
        "event" => bind_event(element),
        "rule" => bind_rule(element),
        "fulfills" => bind_fulfills(element),
        "constitutes" => bind_constitutes(element),
        tag if BATCH_TAGS.contains(&tag) => {
            let mut records = Vec::with_capacity(element.children().len());
            for child in element.children() {
                records.push(bind(child)?);
            }
            Ok(Record::Batch(records))
        }
        tag => Err(KunskapError::UnknownKind {
            tag: tag.to_owned(),
        }),
    }
}

fn malformed(element: &Element, message: impl Into<String>) -> KunskapError {
    let mut name = element.name().to_owned();
    if let Some(id) = element.attribute("id") {
        name.push_str(" id=");
        name.push_str(id);
    }
    KunskapError::Malformed {
        element: name,
        message: message.into(),
    }
}

fn required<'e>(element: &'e Element, attribute: &str) -> Result<&'e str> {
    element
        .attribute(attribute)
        .ok_or_else(|| malformed(element, format!("missing attribute '{}'", attribute)))
}

fn optional(element: &Element, attribute: &str) -> Option<String> {
    element.attribute(attribute).map(str::to_owned)
}

fn flag(element: &Element, attribute: &str) -> Result<bool> {
    match element.attribute(attribute) {
        None => Ok(false),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(malformed(
            element,
            format!("attribute '{}' must be true or false, got '{}'", attribute, other),
        )),
    }
}

fn child_text<'e>(element: &'e Element, child: &str) -> Option<&'e str> {
    element
        .children()
        .iter()
        .find(|c| c.name() == child)
        .map(Element::text)
}

fn bind_metadata(element: &Element) -> Result<Record> {
    let name = child_text(element, "name")
        .ok_or_else(|| malformed(element, "missing <name>"))?
        .to_owned();
    let version = child_text(element, "version")
        .ok_or_else(|| malformed(element, "missing <version>"))?
        .to_owned();
    let created = child_text(element, "created")
        .ok_or_else(|| malformed(element, "missing <created>"))?;
    let created = NaiveDate::parse_from_str(created, "%Y-%m-%d")
        .map_err(|_| malformed(element, format!("invalid date '{}'", created)))?;
    let field = |name: &str| child_text(element, name).map(str::to_owned);
    Ok(Record::Metadata(Metadata::new(
        name,
        version,
        created,
        field("author"),
        field("description"),
        field("locale"),
        field("generator"),
        field("checksum"),
    )))
}

fn bind_purpose(element: &Element) -> Result<Record> {
    Ok(Record::Purpose(Purpose::new(
        required(element, "id")?.to_owned(),
        required(element, "name")?.to_owned(),
        optional(element, "description"),
        flag(element, "root")?,
    )))
}

fn bind_variant(element: &Element) -> Result<Record> {
    Ok(Record::Variant(Variant::new(
        required(element, "id")?.to_owned(),
        required(element, "name")?.to_owned(),
        optional(element, "description"),
    )))
}

fn integer(element: &Element, attribute: &str) -> Result<i64> {
    required(element, attribute)?
        .parse::<i64>()
        .map_err(|_| malformed(element, format!("attribute '{}' must be an integer", attribute)))
}

fn bind_feature(element: &Element) -> Result<Record> {
    let domain = match required(element, "kind")? {
        "enumeration" => {
            let values: Vec<String> = element
                .children()
                .iter()
                .filter(|c| c.name() == "value")
                .map(|c| c.text().to_owned())
                .collect();
            if values.is_empty() {
                return Err(malformed(element, "an enumeration needs at least one <value>"));
            }
            Domain::Enumeration(values)
        }
        "range" => {
            let min = integer(element, "min")?;
            let max = integer(element, "max")?;
            if min > max {
                return Err(malformed(element, format!("empty range {}..{}", min, max)));
            }
            Domain::Range { min, max }
        }
        "toggle" => Domain::Toggle,
        other => {
            return Err(malformed(element, format!("unknown feature kind '{}'", other)));
        }
    };
    Ok(Record::Feature(Feature::new(
        required(element, "id")?.to_owned(),
        required(element, "variant")?.to_owned(),
        required(element, "name")?.to_owned(),
        domain,
    )))
}

fn variant_refs(element: &Element) -> Result<Vec<String>> {
    let mut refs = Vec::new();
    for child in element.children().iter().filter(|c| c.name() == "variant") {
        refs.push(required(child, "ref")?.to_owned());
    }
    if refs.is_empty() {
        return Err(malformed(element, "must be attached to at least one variant"));
    }
    Ok(refs)
}

fn bind_event(element: &Element) -> Result<Record> {
    Ok(Record::Event(Event::new(
        required(element, "id")?.to_owned(),
        required(element, "name")?.to_owned(),
        variant_refs(element)?,
    )))
}

fn bind_rule(element: &Element) -> Result<Record> {
    let mut references = Vec::new();
    for child in element.children().iter().filter(|c| c.name() == "ref") {
        let kind = required(child, "kind")?;
        let kind = ConstructKind::parse_referencable(kind)
            .ok_or_else(|| malformed(element, format!("unknown reference kind '{}'", kind)))?;
        references.push(ConstructRef::new(kind, required(child, "id")?.to_owned()));
    }
    Ok(Record::Rule(Rule::new(
        required(element, "id")?.to_owned(),
        required(element, "name")?.to_owned(),
        optional(element, "expr"),
        variant_refs(element)?,
        references,
    )))
}

fn bind_fulfills(element: &Element) -> Result<Record> {
    Ok(Record::Fulfills(Fulfills::new(
        required(element, "purpose")?.to_owned(),
        required(element, "variant")?.to_owned(),
    )))
}

fn bind_constitutes(element: &Element) -> Result<Record> {
    Ok(Record::Constitutes(Constitutes::new(
        required(element, "variant")?.to_owned(),
        required(element, "purpose")?.to_owned(),
    )))
}
