//! The ingestion pipeline.
//!
//! Wires the pieces end-to-end on the caller's thread: stream, bind,
//! dispatch, build. Everything is synchronous; aborting anywhere discards
//! the partially built graph entirely. The raw bytes are hashed while they
//! stream past, so every graph built here carries a fingerprint of its
//! source document.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use tracing::info;

use crate::error::{KunskapError, Result};
use crate::graph::{GraphBuilder, KnowledgeGraph, Strictness};
use crate::record::{RecordHandler, bind};
use crate::schema;
use crate::stream::{ElementReader, SkipPolicy};

// ------------- IngestReport -------------
#[derive(Debug, Clone)]
pub struct IngestReport {
    emitted: u64,
    fingerprint: String,
}

impl IngestReport {
    /// Number of elements emitted by the reader, which equals the number of
    /// handler invocations.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
    /// Hex encoded blake3 hash of the complete source document.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

struct HashingReader<R: Read> {
    inner: R,
    hasher: blake3::Hasher,
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

fn io_error(cause: io::Error) -> KunskapError {
    KunskapError::Parse {
        location: "i/o".into(),
        message: cause.to_string(),
    }
}

/// Drives the read loop: every element the reader emits is bound and handed
/// to the handler, once, in document order.
pub fn ingest<R, H>(source: R, policy: SkipPolicy, handler: &mut H) -> Result<IngestReport>
where
    R: Read,
    H: RecordHandler + ?Sized,
{
    let mut hashing = HashingReader {
        inner: source,
        hasher: blake3::Hasher::new(),
    };
    let emitted = {
        let mut reader = ElementReader::new(BufReader::new(&mut hashing), policy);
        while let Some(element) = reader.next()? {
            handler.handle(bind(&element)?)?;
        }
        reader.emitted()
    };
    // drain whatever trails the emission level so the fingerprint covers
    // the whole document
    io::copy(&mut hashing, &mut io::sink()).map_err(io_error)?;
    Ok(IngestReport {
        emitted,
        fingerprint: hashing.hasher.finalize().to_hex().to_string(),
    })
}

/// Builds a frozen graph from any byte source.
pub fn build_graph<R: Read>(
    source: R,
    policy: SkipPolicy,
    strictness: Strictness,
) -> Result<KnowledgeGraph> {
    let mut builder = GraphBuilder::new(strictness);
    let report = ingest(source, policy, &mut builder)?;
    builder.set_fingerprint(report.fingerprint().to_owned());
    let graph = builder.finish()?;
    info!(
        purposes = graph.purposes().len(),
        variants = graph.variants().len(),
        features = graph.all_features().len(),
        events = graph.events().len(),
        rules = graph.rules().len(),
        elements = report.emitted(),
        valid = graph.is_valid(),
        "knowledge graph built"
    );
    Ok(graph)
}

pub fn build_graph_from_str(document: &str, strictness: Strictness) -> Result<KnowledgeGraph> {
    build_graph(document.as_bytes(), SkipPolicy::SkipNone, strictness)
}

/// Validates and then builds: the production entry point for documents on
/// disk. Validation and parsing are independent passes over the file.
pub fn load(path: impl AsRef<Path>, strictness: Strictness) -> Result<KnowledgeGraph> {
    let path = path.as_ref();
    schema::validate_file(path)?;
    let file = File::open(path).map_err(io_error)?;
    build_graph(file, SkipPolicy::SkipNone, strictness)
}
