//! Graph construction and the frozen read API.
//!
//! The [`GraphBuilder`] is a [`RecordHandler`]: it consumes the ordered
//! record stream, routes each record into the matching keeper (rejecting
//! duplicate identifiers) and accumulates relations. [`GraphBuilder::finish`]
//! then runs integrity validation and freezes a [`KnowledgeGraph`].
//! Construction is deterministic: things are assigned in document order, so
//! every index iterates in insertion order, and byte-identical input yields
//! the same indexes and the same verdict.
//!
//! Once frozen the graph is never mutated again and is safe for unlimited
//! concurrent reads. If the source document changes, the whole graph is
//! discarded and rebuilt wholesale.

use std::sync::Arc;

use roaring::RoaringTreemap;
use tracing::warn;

use crate::construct::{
    Constitutes, Construct, ConstructKind, Event, Feature, Fulfills, Keeper, Metadata, Purpose,
    Rule, Thing, ThingGenerator, ThingLookup, Variant,
};
use crate::error::{KunskapError, Result};
use crate::record::{Record, RecordHandler};

/// How to treat a non-root purpose that no variant constitutes. The
/// reachability rule is inferred from regression fixtures rather than a
/// written contract, so leniency is a configuration knob: strict builds
/// fail, lenient builds record the finding and leave `is_valid()` false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    Strict,
    Lenient,
}

impl Default for Strictness {
    fn default() -> Self {
        Strictness::Strict
    }
}

// ------------- GraphBuilder -------------
pub struct GraphBuilder {
    things: ThingGenerator,
    purposes: Keeper<Purpose>,
    variants: Keeper<Variant>,
    features: Keeper<Feature>,
    events: Keeper<Event>,
    rules: Keeper<Rule>,
    metadata: Option<Metadata>,
    fulfills: Vec<Fulfills>,
    constitutes: Vec<Constitutes>,
    strictness: Strictness,
    fingerprint: Option<String>,
}

impl GraphBuilder {
    pub fn new(strictness: Strictness) -> Self {
        Self {
            things: ThingGenerator::new(),
            purposes: Keeper::new(),
            variants: Keeper::new(),
            features: Keeper::new(),
            events: Keeper::new(),
            rules: Keeper::new(),
            metadata: None,
            fulfills: Vec::new(),
            constitutes: Vec::new(),
            strictness,
            fingerprint: None,
        }
    }

    /// Records the content hash of the source document on the graph under
    /// construction.
    pub fn set_fingerprint(&mut self, fingerprint: String) {
        self.fingerprint = Some(fingerprint);
    }

    fn keep<T: Construct>(
        keeper: &mut Keeper<T>,
        things: &mut ThingGenerator,
        construct: T,
    ) -> Result<()> {
        let id = construct.id().to_owned();
        let thing = things.generate();
        let (_, previously_kept) = keeper.keep(construct, thing);
        if previously_kept {
            return Err(KunskapError::DuplicateIdentifier { kind: T::KIND, id });
        }
        Ok(())
    }

    /// Validates referential integrity and freezes the graph. The builder
    /// is consumed either way; a failed build leaves nothing behind.
    pub fn finish(self) -> Result<KnowledgeGraph> {
        let metadata = self.metadata.ok_or_else(|| KunskapError::Malformed {
            element: "metadata".into(),
            message: "the document must carry exactly one metadata element".into(),
        })?;

        let mut purpose_to_variants = ThingLookup::new();
        let mut variant_to_purposes = ThingLookup::new();
        let mut variant_to_features = ThingLookup::new();
        let mut variant_to_events = ThingLookup::new();
        let mut variant_to_rules = ThingLookup::new();
        let mut constituted = RoaringTreemap::new();

        let resolve = |keeper_thing: Option<Thing>,
                       kind: ConstructKind,
                       id: &str,
                       referenced_by: &dyn std::fmt::Display|
         -> Result<Thing> {
            keeper_thing.ok_or_else(|| KunskapError::DanglingReference {
                kind,
                id: id.to_owned(),
                referenced_by: referenced_by.to_string(),
            })
        };

        for relation in &self.fulfills {
            let purpose = resolve(
                self.purposes.thing_of(relation.purpose()),
                ConstructKind::Purpose,
                relation.purpose(),
                relation,
            )?;
            let variant = resolve(
                self.variants.thing_of(relation.variant()),
                ConstructKind::Variant,
                relation.variant(),
                relation,
            )?;
            purpose_to_variants.insert(purpose, variant);
        }

        for relation in &self.constitutes {
            let variant = resolve(
                self.variants.thing_of(relation.variant()),
                ConstructKind::Variant,
                relation.variant(),
                relation,
            )?;
            let purpose = resolve(
                self.purposes.thing_of(relation.purpose()),
                ConstructKind::Purpose,
                relation.purpose(),
                relation,
            )?;
            variant_to_purposes.insert(variant, purpose);
            constituted.insert(purpose);
        }

        for feature in self.features.iter() {
            let referenced_by = format!("feature {}", feature.id());
            let variant = resolve(
                self.variants.thing_of(feature.variant()),
                ConstructKind::Variant,
                feature.variant(),
                &referenced_by,
            )?;
            if let Some(thing) = self.features.thing_of(feature.id()) {
                variant_to_features.insert(variant, thing);
            }
        }

        for event in self.events.iter() {
            let referenced_by = format!("event {}", event.id());
            for variant_id in event.variants() {
                let variant = resolve(
                    self.variants.thing_of(variant_id),
                    ConstructKind::Variant,
                    variant_id,
                    &referenced_by,
                )?;
                if let Some(thing) = self.events.thing_of(event.id()) {
                    variant_to_events.insert(variant, thing);
                }
            }
        }

        for rule in self.rules.iter() {
            let referenced_by = format!("rule {}", rule.id());
            for variant_id in rule.variants() {
                let variant = resolve(
                    self.variants.thing_of(variant_id),
                    ConstructKind::Variant,
                    variant_id,
                    &referenced_by,
                )?;
                if let Some(thing) = self.rules.thing_of(rule.id()) {
                    variant_to_rules.insert(variant, thing);
                }
            }
            for reference in rule.references() {
                let thing_of = match reference.kind() {
                    ConstructKind::Purpose => self.purposes.thing_of(reference.id()),
                    ConstructKind::Variant => self.variants.thing_of(reference.id()),
                    ConstructKind::Feature => self.features.thing_of(reference.id()),
                    ConstructKind::Event => self.events.thing_of(reference.id()),
                    ConstructKind::Rule => self.rules.thing_of(reference.id()),
                    ConstructKind::Session => None,
                };
                resolve(thing_of, reference.kind(), reference.id(), &referenced_by)?;
            }
        }

        // every non-root purpose must be reachable through some variant,
        // since an unreachable purpose can never be chosen
        let mut findings = Vec::new();
        let mut roots = Vec::new();
        for purpose in self.purposes.iter() {
            if purpose.is_root() {
                roots.push(Arc::clone(purpose));
                continue;
            }
            let reachable = self
                .purposes
                .thing_of(purpose.id())
                .map(|thing| constituted.contains(thing))
                .unwrap_or(false);
            if !reachable {
                match self.strictness {
                    Strictness::Strict => {
                        return Err(KunskapError::UnreachablePurpose {
                            id: purpose.id().to_owned(),
                        });
                    }
                    Strictness::Lenient => {
                        warn!(purpose = purpose.id(), "unreachable non-root purpose");
                        findings.push(format!(
                            "purpose '{}' is not a root purpose and no variant constitutes it",
                            purpose.id()
                        ));
                    }
                }
            }
        }

        let valid = findings.is_empty();
        Ok(KnowledgeGraph {
            metadata,
            purposes: self.purposes,
            variants: self.variants,
            features: self.features,
            events: self.events,
            rules: self.rules,
            fulfills: self.fulfills,
            constitutes: self.constitutes,
            purpose_to_variants,
            variant_to_purposes,
            variant_to_features,
            variant_to_events,
            variant_to_rules,
            roots,
            valid,
            findings,
            fingerprint: self.fingerprint,
        })
    }
}

impl RecordHandler for GraphBuilder {
    fn handle(&mut self, record: Record) -> Result<()> {
        match record {
            Record::Metadata(metadata) => {
                if self.metadata.is_some() {
                    return Err(KunskapError::Malformed {
                        element: "metadata".into(),
                        message: "more than one metadata element".into(),
                    });
                }
                self.metadata = Some(metadata);
            }
            Record::Purpose(purpose) => {
                Self::keep(&mut self.purposes, &mut self.things, purpose)?;
            }
            Record::Variant(variant) => {
                Self::keep(&mut self.variants, &mut self.things, variant)?;
            }
            Record::Feature(feature) => {
                Self::keep(&mut self.features, &mut self.things, feature)?;
            }
            Record::Event(event) => {
                Self::keep(&mut self.events, &mut self.things, event)?;
            }
            Record::Rule(rule) => {
                Self::keep(&mut self.rules, &mut self.things, rule)?;
            }
            Record::Fulfills(relation) => {
                self.fulfills.push(relation);
            }
            Record::Constitutes(relation) => {
                self.constitutes.push(relation);
            }
            Record::Batch(records) => {
                for record in records {
                    self.handle(record)?;
                }
            }
        }
        Ok(())
    }
}

// ------------- KnowledgeGraph -------------
/// The frozen, validated result of ingestion. All operations are pure reads
/// against the frozen indexes and never fail except for "no such
/// identifier".
#[derive(Debug)]
pub struct KnowledgeGraph {
    metadata: Metadata,
    purposes: Keeper<Purpose>,
    variants: Keeper<Variant>,
    features: Keeper<Feature>,
    events: Keeper<Event>,
    rules: Keeper<Rule>,
    fulfills: Vec<Fulfills>,
    constitutes: Vec<Constitutes>,
    purpose_to_variants: ThingLookup,
    variant_to_purposes: ThingLookup,
    variant_to_features: ThingLookup,
    variant_to_events: ThingLookup,
    variant_to_rules: ThingLookup,
    roots: Vec<Arc<Purpose>>,
    valid: bool,
    findings: Vec<String>,
    fingerprint: Option<String>,
}

impl KnowledgeGraph {
    /// True iff the graph passed integrity validation at build time. This
    /// is a pre-computed flag, not re-evaluated per call.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Lenient-mode integrity findings, empty on a clean build.
    pub fn findings(&self) -> &[String] {
        &self.findings
    }

    /// Content hash of the source document, when ingested through the
    /// pipeline.
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn root_purposes(&self) -> &[Arc<Purpose>] {
        &self.roots
    }

    fn thing_of<T: Construct>(keeper: &Keeper<T>, id: &str) -> Result<Thing> {
        keeper.thing_of(id).ok_or_else(|| KunskapError::NotFound {
            kind: T::KIND,
            id: id.to_owned(),
        })
    }

    fn gather<T: Construct>(keeper: &Keeper<T>, set: Option<&RoaringTreemap>) -> Vec<Arc<T>> {
        match set {
            Some(things) => things.iter().filter_map(|thing| keeper.lookup(thing)).collect(),
            None => Vec::new(),
        }
    }

    /// The variants that fulfil a purpose, in document order. An empty
    /// vector means the purpose exists but nothing fulfils it yet.
    pub fn fulfilling_variants(&self, purpose_id: &str) -> Result<Vec<Arc<Variant>>> {
        let purpose = Self::thing_of(&self.purposes, purpose_id)?;
        Ok(Self::gather(
            &self.variants,
            self.purpose_to_variants.lookup(purpose),
        ))
    }

    /// The purposes a variant additionally requires to be constituted.
    pub fn constituting_purposes(&self, variant_id: &str) -> Result<Vec<Arc<Purpose>>> {
        let variant = Self::thing_of(&self.variants, variant_id)?;
        Ok(Self::gather(
            &self.purposes,
            self.variant_to_purposes.lookup(variant),
        ))
    }

    pub fn features(&self, variant_id: &str) -> Result<Vec<Arc<Feature>>> {
        let variant = Self::thing_of(&self.variants, variant_id)?;
        Ok(Self::gather(
            &self.features,
            self.variant_to_features.lookup(variant),
        ))
    }

    pub fn attached_events(&self, variant_id: &str) -> Result<Vec<Arc<Event>>> {
        let variant = Self::thing_of(&self.variants, variant_id)?;
        Ok(Self::gather(
            &self.events,
            self.variant_to_events.lookup(variant),
        ))
    }

    pub fn attached_rules(&self, variant_id: &str) -> Result<Vec<Arc<Rule>>> {
        let variant = Self::thing_of(&self.variants, variant_id)?;
        Ok(Self::gather(
            &self.rules,
            self.variant_to_rules.lookup(variant),
        ))
    }

    pub fn purpose(&self, id: &str) -> Result<Arc<Purpose>> {
        self.purposes.get(id).ok_or_else(|| KunskapError::NotFound {
            kind: ConstructKind::Purpose,
            id: id.to_owned(),
        })
    }

    pub fn variant(&self, id: &str) -> Result<Arc<Variant>> {
        self.variants.get(id).ok_or_else(|| KunskapError::NotFound {
            kind: ConstructKind::Variant,
            id: id.to_owned(),
        })
    }

    // flat, insertion-ordered snapshots for bulk export
    pub fn purposes(&self) -> &[Arc<Purpose>] {
        self.purposes.as_slice()
    }
    pub fn variants(&self) -> &[Arc<Variant>] {
        self.variants.as_slice()
    }
    pub fn all_features(&self) -> &[Arc<Feature>] {
        self.features.as_slice()
    }
    pub fn events(&self) -> &[Arc<Event>] {
        self.events.as_slice()
    }
    pub fn rules(&self) -> &[Arc<Rule>] {
        self.rules.as_slice()
    }
    pub fn fulfills(&self) -> &[Fulfills] {
        &self.fulfills
    }
    pub fn constitutes(&self) -> &[Constitutes] {
        &self.constitutes
    }

    /// One flat JSON rendition of the whole catalogue, for presentation
    /// layers that want a bulk export rather than indexed queries.
    pub fn export(&self) -> serde_json::Value {
        fn flat<T: serde::Serialize>(kept: &[Arc<T>]) -> Vec<&T> {
            kept.iter().map(Arc::as_ref).collect()
        }
        serde_json::json!({
            "metadata": &self.metadata,
            "purposes": flat(self.purposes()),
            "variants": flat(self.variants()),
            "features": flat(self.all_features()),
            "events": flat(self.events()),
            "rules": flat(self.rules()),
            "fulfills": &self.fulfills,
            "constitutes": &self.constitutes,
            "valid": self.valid,
            "fingerprint": &self.fingerprint,
        })
    }
}
