//! Kunskap – streaming ingestion of an XML knowledge base into a frozen,
//! cross-indexed in-memory graph.
//!
//! A knowledge base document catalogues *purposes* (named goals to be
//! fulfilled), *variants* (concrete options that fulfil purposes and may
//! require further purposes of their own), *features* (typed value domains
//! on variants), *events*, constraint *rules*, and the two relations that
//! tie the catalogue into a graph:
//! * a [`construct::Fulfills`] edge says a variant can satisfy a purpose;
//! * a [`construct::Constitutes`] edge says a variant additionally requires
//!   a purpose, which is what makes the model nested rather than flat.
//!
//! Ingestion is a single synchronous pass: the [`schema`] validator gates
//! the document, the [`stream`] reader delivers one materialized subtree at
//! a time (never the whole tree), the [`record`] binder maps each subtree
//! onto a tagged-union record, and the [`graph`] builder keeps every
//! construct under its identifier, indexes the relations over interned
//! things and validates referential integrity before freezing. The frozen
//! [`graph::KnowledgeGraph`] answers identity and relationship queries in
//! constant or near-constant time and is safe to share across threads.
//!
//! ## Modules
//! * [`construct`] – Fundamental constructs, keepers and lookups.
//! * [`schema`] – The fixed-schema validation gate.
//! * [`stream`] – The pull based streaming element reader and skip policies.
//! * [`record`] – Record kinds, the binder and the handler extension point.
//! * [`graph`] – Graph construction, integrity validation and the read API.
//! * [`ingest`] – End-to-end pipeline conveniences.
//! * [`interface`] – Bounded session store and session-id generation.
//! * [`server`] – A thin HTTP facade over graph and sessions.
//! * [`error`] – The crate-wide error taxonomy.
//!
//! ## Quick Start
//! ```
//! use kunskap::graph::Strictness;
//! use kunskap::ingest;
//!
//! let document = r#"
//! <knowledgebase>
//!   <metadata>
//!     <name>demo</name><version>1</version><created>2026-01-15</created>
//!     <author/><description/><locale/><generator/><checksum/>
//!   </metadata>
//!   <data>
//!     <purposes><purpose id="p1" name="Power" root="true"/></purposes>
//!     <variants><variant id="v1" name="Battery"/></variants>
//!     <features/>
//!     <events/>
//!     <rules/>
//!     <fulfillments><fulfills purpose="p1" variant="v1"/></fulfillments>
//!     <constitutions/>
//!   </data>
//! </knowledgebase>
//! "#;
//! let graph = ingest::build_graph_from_str(document, Strictness::Strict).unwrap();
//! assert!(graph.is_valid());
//! let fulfilling = graph.fulfilling_variants("p1").unwrap();
//! assert_eq!(fulfilling.len(), 1);
//! ```
//!
//! ## Lifecycle
//! All constructs and relations are created during one ingestion pass; the
//! graph transitions from building to built exactly once, after integrity
//! validation succeeds. Nothing is mutated or destroyed afterwards. If the
//! source document changes, the whole graph is discarded and rebuilt.

pub mod construct;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod interface;
pub mod record;
pub mod schema;
pub mod server;
pub mod stream;
