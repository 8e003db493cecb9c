use std::sync::Arc;

// used to keep the one-to-one mapping between identifiers and their things
use bimap::BiMap;

// keepers use HashMap with fast hashers, relation indexes use bitmaps
use core::hash::BuildHasherDefault;
use roaring::RoaringTreemap;
use seahash::SeaHasher;
use std::collections::HashMap;

// used to print out readable forms of a construct
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

// ------------- Thing -------------
// Things are opaque numeric identities handed out in document order, so any
// ascending iteration over things is also an iteration in insertion order.
pub type Thing = u64;

pub type ThingHasher = BuildHasherDefault<SeaHasher>;
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

pub const GENESIS: Thing = 0;

#[derive(Debug)]
pub struct ThingGenerator {
    lower_bound: Thing,
}

impl ThingGenerator {
    pub fn new() -> Self {
        Self {
            lower_bound: GENESIS,
        }
    }
    pub fn generate(&mut self) -> Thing {
        self.lower_bound += 1;
        self.lower_bound
    }
    pub fn count(&self) -> u64 {
        self.lower_bound
    }
}

impl Default for ThingGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- ConstructKind -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstructKind {
    Purpose,
    Variant,
    Feature,
    Event,
    Rule,
    Session,
}

impl ConstructKind {
    /// Parses the kinds that may be referenced from a rule. Sessions are not
    /// part of the document vocabulary.
    pub fn parse_referencable(s: &str) -> Option<ConstructKind> {
        match s {
            "purpose" => Some(ConstructKind::Purpose),
            "variant" => Some(ConstructKind::Variant),
            "feature" => Some(ConstructKind::Feature),
            "event" => Some(ConstructKind::Event),
            "rule" => Some(ConstructKind::Rule),
            _ => None,
        }
    }
}

impl fmt::Display for ConstructKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ConstructKind::Purpose => "purpose",
            ConstructKind::Variant => "variant",
            ConstructKind::Feature => "feature",
            ConstructKind::Event => "event",
            ConstructKind::Rule => "rule",
            ConstructKind::Session => "session",
        };
        write!(f, "{}", name)
    }
}

/// Anything a keeper can keep: an immutable construct with an identifier
/// that is unique within its own kind.
pub trait Construct {
    const KIND: ConstructKind;
    fn id(&self) -> &str;
}

// ------------- Purpose -------------
#[derive(Debug, Eq, Serialize)]
pub struct Purpose {
    id: String,
    name: String,
    description: Option<String>,
    root: bool,
}

impl Purpose {
    pub fn new(id: String, name: String, description: Option<String>, root: bool) -> Self {
        Self {
            id,
            name,
            description,
            root,
        }
    }
    // It's intentional to encapsulate fields in the struct and only expose
    // them using "getters", because this yields true immutability for
    // constructs after creation.
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    pub fn is_root(&self) -> bool {
        self.root
    }
}

impl Construct for Purpose {
    const KIND: ConstructKind = ConstructKind::Purpose;
    fn id(&self) -> &str {
        &self.id
    }
}

impl PartialEq for Purpose {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "purpose {} ({})", self.id, self.name)
    }
}

// ------------- Variant -------------
#[derive(Debug, Eq, Serialize)]
pub struct Variant {
    id: String,
    name: String,
    description: Option<String>,
}

impl Variant {
    pub fn new(id: String, name: String, description: Option<String>) -> Self {
        Self {
            id,
            name,
            description,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl Construct for Variant {
    const KIND: ConstructKind = ConstructKind::Variant;
    fn id(&self) -> &str {
        &self.id
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "variant {} ({})", self.id, self.name)
    }
}

// ------------- Feature -------------
/// The typed value domain a feature offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Enumeration(Vec<String>),
    Range { min: i64, max: i64 },
    Toggle,
}

#[derive(Debug, Eq, Serialize)]
pub struct Feature {
    id: String,
    variant: String,
    name: String,
    domain: Domain,
}

impl Feature {
    pub fn new(id: String, variant: String, name: String, domain: Domain) -> Self {
        Self {
            id,
            variant,
            name,
            domain,
        }
    }
    pub fn variant(&self) -> &str {
        &self.variant
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn domain(&self) -> &Domain {
        &self.domain
    }
}

impl Construct for Feature {
    const KIND: ConstructKind = ConstructKind::Feature;
    fn id(&self) -> &str {
        &self.id
    }
}

impl PartialEq for Feature {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

// ------------- Event -------------
#[derive(Debug, Eq, Serialize)]
pub struct Event {
    id: String,
    name: String,
    variants: Vec<String>,
}

impl Event {
    pub fn new(id: String, name: String, variants: Vec<String>) -> Self {
        Self { id, name, variants }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn variants(&self) -> &[String] {
        &self.variants
    }
}

impl Construct for Event {
    const KIND: ConstructKind = ConstructKind::Event;
    fn id(&self) -> &str {
        &self.id
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

// ------------- Rule -------------
/// A (kind, identifier) pair naming another construct from a rule body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstructRef {
    kind: ConstructKind,
    id: String,
}

impl ConstructRef {
    pub fn new(kind: ConstructKind, id: String) -> Self {
        Self { kind, id }
    }
    pub fn kind(&self) -> ConstructKind {
        self.kind
    }
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Eq, Serialize)]
pub struct Rule {
    id: String,
    name: String,
    expression: Option<String>,
    variants: Vec<String>,
    references: Vec<ConstructRef>,
}

impl Rule {
    pub fn new(
        id: String,
        name: String,
        expression: Option<String>,
        variants: Vec<String>,
        references: Vec<ConstructRef>,
    ) -> Self {
        Self {
            id,
            name,
            expression,
            variants,
            references,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }
    pub fn variants(&self) -> &[String] {
        &self.variants
    }
    pub fn references(&self) -> &[ConstructRef] {
        &self.references
    }
}

impl Construct for Rule {
    const KIND: ConstructKind = ConstructKind::Rule;
    fn id(&self) -> &str {
        &self.id
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

// ------------- Relations -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fulfills {
    purpose: String,
    variant: String,
}

impl Fulfills {
    pub fn new(purpose: String, variant: String) -> Self {
        Self { purpose, variant }
    }
    pub fn purpose(&self) -> &str {
        &self.purpose
    }
    pub fn variant(&self) -> &str {
        &self.variant
    }
}

impl fmt::Display for Fulfills {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "fulfills({}, {})", self.purpose, self.variant)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Constitutes {
    variant: String,
    purpose: String,
}

impl Constitutes {
    pub fn new(variant: String, purpose: String) -> Self {
        Self { variant, purpose }
    }
    pub fn variant(&self) -> &str {
        &self.variant
    }
    pub fn purpose(&self) -> &str {
        &self.purpose
    }
}

impl fmt::Display for Constitutes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "constitutes({}, {})", self.variant, self.purpose)
    }
}

// ------------- Metadata -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    name: String,
    version: String,
    created: NaiveDate,
    author: Option<String>,
    description: Option<String>,
    locale: Option<String>,
    generator: Option<String>,
    checksum: Option<String>,
}

impl Metadata {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        version: String,
        created: NaiveDate,
        author: Option<String>,
        description: Option<String>,
        locale: Option<String>,
        generator: Option<String>,
        checksum: Option<String>,
    ) -> Self {
        Self {
            name,
            version,
            created,
            author,
            description,
            locale,
            generator,
            checksum,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn version(&self) -> &str {
        &self.version
    }
    pub fn created(&self) -> NaiveDate {
        self.created
    }
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }
    pub fn generator(&self) -> Option<&str> {
        self.generator.as_deref()
    }
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }
}

// ------------- Keeper -------------
/// Owns constructs of one kind, guarantees identifier uniqueness, interns
/// identifier <-> thing, and preserves insertion order for stable iteration.
#[derive(Debug)]
pub struct Keeper<T: Construct> {
    kept: HashMap<String, Arc<T>, OtherHasher>,
    lookup: HashMap<Thing, Arc<T>, ThingHasher>,
    things: BiMap<String, Thing>,
    order: Vec<Arc<T>>,
}

impl<T: Construct> Keeper<T> {
    pub fn new() -> Self {
        Self {
            kept: HashMap::default(),
            lookup: HashMap::default(),
            things: BiMap::new(),
            order: Vec::new(),
        }
    }
    /// Keeps a construct under the given thing. The second member of the
    /// returned pair tells whether the identifier was previously kept, in
    /// which case the already kept construct is returned and the new one is
    /// dropped (it is the caller's decision whether that is an error).
    pub fn keep(&mut self, construct: T, thing: Thing) -> (Arc<T>, bool) {
        let keepsake = construct.id().to_owned();
        if let Some(existing) = self.kept.get(&keepsake) {
            return (Arc::clone(existing), true);
        }
        let kept = Arc::new(construct);
        self.kept.insert(keepsake.clone(), Arc::clone(&kept));
        self.lookup.insert(thing, Arc::clone(&kept));
        self.things.insert(keepsake, thing);
        self.order.push(Arc::clone(&kept));
        (kept, false)
    }
    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.kept.get(id).map(Arc::clone)
    }
    pub fn lookup(&self, thing: Thing) -> Option<Arc<T>> {
        self.lookup.get(&thing).map(Arc::clone)
    }
    pub fn thing_of(&self, id: &str) -> Option<Thing> {
        self.things.get_by_left(id).copied()
    }
    pub fn id_of(&self, thing: Thing) -> Option<&str> {
        self.things.get_by_right(&thing).map(String::as_str)
    }
    pub fn contains(&self, id: &str) -> bool {
        self.kept.contains_key(id)
    }
    pub fn as_slice(&self) -> &[Arc<T>] {
        &self.order
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<T>> {
        self.order.iter()
    }
    pub fn len(&self) -> usize {
        self.order.len()
    }
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<T: Construct> Default for Keeper<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- ThingLookup -------------
/// An inverted index from a thing to a set of things. Since things are
/// assigned in document order, ascending bitmap iteration is insertion
/// order.
#[derive(Debug, Default)]
pub struct ThingLookup {
    index: HashMap<Thing, RoaringTreemap, ThingHasher>,
}

impl ThingLookup {
    pub fn new() -> Self {
        Self {
            index: HashMap::default(),
        }
    }
    pub fn insert(&mut self, key: Thing, value: Thing) {
        self.index.entry(key).or_default().insert(value);
    }
    pub fn lookup(&self, key: Thing) -> Option<&RoaringTreemap> {
        self.index.get(&key)
    }
    pub fn contains(&self, key: Thing, value: Thing) -> bool {
        self.index.get(&key).is_some_and(|set| set.contains(value))
    }
    pub fn len(&self) -> usize {
        self.index.len()
    }
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
