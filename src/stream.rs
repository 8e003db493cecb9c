//! Streaming element reader.
//!
//! A pull based cursor over a knowledge base document. The reader never
//! holds more than the subtree currently being materialized: skipping
//! discards content without building anything, and emission buffers exactly
//! one sibling subtree at a time. Documents are expected to be UTF-8.
//!
//! The skip knob exists so that one reader can serve two document shapes:
//! with [`SkipPolicy::SkipNone`] the complete document structure is
//! delivered top-level element by top-level element (the data wrapper
//! arrives as one nested subtree), while [`SkipPolicy::SkipWrapper`] and
//! [`SkipPolicy::SkipCount`] dive into wrappers so that their children
//! become the emission level. The skip counter advances once per element
//! opened, in document order: a self-closed element is consumed whole,
//! while skipping a container's start tag makes its children the new
//! emission level.

use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{KunskapError, Result};

/// Name of the wrapper element that [`SkipPolicy::SkipWrapper`] dives into.
pub const DATA_TAG: &str = "data";

// ------------- SkipPolicy -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipPolicy {
    /// Emit every child of the document root, wrappers included.
    SkipNone,
    /// Discard everything up to and into the data wrapper; emission starts
    /// at its first child.
    SkipWrapper,
    /// Discard this many element starts, descending into containers.
    SkipCount(u64),
}

impl Default for SkipPolicy {
    fn default() -> Self {
        SkipPolicy::SkipNone
    }
}

impl FromStr for SkipPolicy {
    type Err = KunskapError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(SkipPolicy::SkipNone),
            "wrapper" => Ok(SkipPolicy::SkipWrapper),
            other => other
                .parse::<u64>()
                .map(SkipPolicy::SkipCount)
                .map_err(|_| KunskapError::Config(format!("unknown skip policy '{}'", other))),
        }
    }
}

// ------------- Element -------------
/// One fully materialized subtree, owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
    pub fn children(&self) -> &[Element] {
        &self.children
    }
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<{}> ({} children)", self.name, self.children.len())
    }
}

// ------------- ElementReader -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Start,
    Skipping,
    Ready,
    ElementOpen,
    Done,
    Failed,
}

pub struct ElementReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    state: ReaderState,
    policy: SkipPolicy,
    to_skip: u64,
    depth: u64,
    emitted: u64,
}

impl<'a> ElementReader<&'a [u8]> {
    pub fn from_str(document: &'a str, policy: SkipPolicy) -> Self {
        Self::new(document.as_bytes(), policy)
    }
}

impl<R: BufRead> ElementReader<R> {
    pub fn new(source: R, policy: SkipPolicy) -> Self {
        let to_skip = match policy {
            SkipPolicy::SkipCount(n) => n,
            _ => 0,
        };
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::new(),
            state: ReaderState::Start,
            policy,
            to_skip,
            depth: 0,
            emitted: 0,
        }
    }

    /// The number of elements emitted so far (post-skip), strictly
    /// increasing across calls to [`ElementReader::next`].
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Advances the cursor and delivers the next materialized element, or
    /// `None` once the emission level has closed. After a failure the
    /// reader stays failed.
    pub fn next(&mut self) -> Result<Option<Element>> {
        match self.state {
            ReaderState::Done => return Ok(None),
            ReaderState::Failed => {
                return Err(self.poisoned());
            }
            ReaderState::Start => {
                self.enter_root()?;
                if self.state == ReaderState::Done {
                    return Ok(None);
                }
            }
            _ => {}
        }
        if self.state == ReaderState::Skipping {
            self.skip()?;
            if self.state == ReaderState::Done {
                return Ok(None);
            }
        }
        self.emit()
    }

    fn poisoned(&self) -> KunskapError {
        KunskapError::Parse {
            location: self.location(),
            message: "reader is in a failed state".into(),
        }
    }

    fn location(&self) -> String {
        format!("byte {}", self.reader.buffer_position())
    }

    fn fail(&mut self, message: String) -> KunskapError {
        self.state = ReaderState::Failed;
        KunskapError::Parse {
            location: self.location(),
            message,
        }
    }

    fn read_event(&mut self) -> Result<Event<'static>> {
        self.buf.clear();
        match self.reader.read_event_into(&mut self.buf) {
            Ok(event) => Ok(event.into_owned()),
            Err(cause) => Err(self.fail(cause.to_string())),
        }
    }

    /// Consumes events up to and including the document root's start tag.
    fn enter_root(&mut self) -> Result<()> {
        loop {
            match self.read_event()? {
                Event::Start(_) => {
                    self.depth = 1;
                    self.state = match self.policy {
                        SkipPolicy::SkipNone => ReaderState::Ready,
                        SkipPolicy::SkipCount(0) => ReaderState::Ready,
                        _ => ReaderState::Skipping,
                    };
                    return Ok(());
                }
                // a self-closed root has no children to deliver
                Event::Empty(_) => {
                    self.state = ReaderState::Done;
                    return Ok(());
                }
                Event::Eof => {
                    return Err(self.fail("document has no root element".into()));
                }
                _ => {}
            }
        }
    }

    fn skip(&mut self) -> Result<()> {
        match self.policy {
            SkipPolicy::SkipCount(_) => self.skip_count(),
            SkipPolicy::SkipWrapper => self.skip_to_wrapper(),
            SkipPolicy::SkipNone => {
                self.state = ReaderState::Ready;
                Ok(())
            }
        }
    }

    fn skip_count(&mut self) -> Result<()> {
        while self.to_skip > 0 {
            match self.read_event()? {
                Event::Start(_) => {
                    self.depth += 1;
                    self.to_skip -= 1;
                }
                Event::Empty(_) => {
                    self.to_skip -= 1;
                }
                Event::End(_) => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        // root closed while skipping: nothing left to emit
                        self.state = ReaderState::Done;
                        return Ok(());
                    }
                }
                Event::Eof => {
                    return Err(self.fail("unexpected end of document while skipping".into()));
                }
                _ => {}
            }
        }
        self.state = ReaderState::Ready;
        Ok(())
    }

    fn skip_to_wrapper(&mut self) -> Result<()> {
        loop {
            match self.read_event()? {
                Event::Start(start) => {
                    self.depth += 1;
                    if self.depth == 2 && start.name().as_ref() == DATA_TAG.as_bytes() {
                        self.state = ReaderState::Ready;
                        return Ok(());
                    }
                }
                Event::Empty(start) => {
                    if self.depth == 1 && start.name().as_ref() == DATA_TAG.as_bytes() {
                        // an empty wrapper has no children to deliver
                        self.state = ReaderState::Done;
                        return Ok(());
                    }
                }
                Event::End(_) => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        self.state = ReaderState::Done;
                        return Ok(());
                    }
                }
                Event::Eof => {
                    return Err(self.fail("unexpected end of document while skipping".into()));
                }
                _ => {}
            }
        }
    }

    fn emit(&mut self) -> Result<Option<Element>> {
        loop {
            match self.read_event()? {
                Event::Start(start) => {
                    let element = self.materialize(start)?;
                    self.emitted += 1;
                    return Ok(Some(element));
                }
                Event::Empty(start) => {
                    let element = self.element_from_start(&start)?;
                    self.emitted += 1;
                    return Ok(Some(element));
                }
                Event::End(_) => {
                    // the element enclosing the emission level has closed
                    self.depth -= 1;
                    self.state = ReaderState::Done;
                    return Ok(None);
                }
                Event::Eof => {
                    if self.depth == 0 {
                        self.state = ReaderState::Done;
                        return Ok(None);
                    }
                    return Err(self.fail("unexpected end of document".into()));
                }
                _ => {}
            }
        }
    }

    /// Buffers one complete subtree, starting from an already consumed
    /// start tag.
    fn materialize(&mut self, start: BytesStart<'static>) -> Result<Element> {
        self.state = ReaderState::ElementOpen;
        let mut stack: Vec<Element> = vec![self.element_from_start(&start)?];
        loop {
            match self.read_event()? {
                Event::Start(child) => {
                    let element = self.element_from_start(&child)?;
                    stack.push(element);
                }
                Event::Empty(child) => {
                    let element = self.element_from_start(&child)?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(element);
                    }
                }
                Event::Text(text) => {
                    let unescaped = text
                        .unescape()
                        .map_err(|cause| self.fail(cause.to_string()))?;
                    let trimmed = unescaped.trim();
                    if !trimmed.is_empty() {
                        if let Some(open) = stack.last_mut() {
                            open.text.push_str(trimmed);
                        }
                    }
                }
                Event::CData(data) => {
                    let raw = data.into_inner();
                    let text = String::from_utf8_lossy(&raw);
                    if let Some(open) = stack.last_mut() {
                        open.text.push_str(&text);
                    }
                }
                Event::End(_) => match stack.pop() {
                    Some(closed) => {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(closed);
                        } else {
                            self.state = ReaderState::Ready;
                            return Ok(closed);
                        }
                    }
                    None => {
                        return Err(self.fail("unbalanced end tag".into()));
                    }
                },
                Event::Eof => {
                    return Err(self.fail("unexpected end of document inside element".into()));
                }
                _ => {}
            }
        }
    }

    fn element_from_start(&mut self, start: &BytesStart<'_>) -> Result<Element> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|cause| self.fail(cause.to_string()))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|cause| self.fail(cause.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Element {
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }
}
