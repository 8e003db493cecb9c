use kunskap::construct::{Construct, Domain};
use kunskap::error::KunskapError;
use kunskap::graph::Strictness;
use kunskap::ingest;

fn document() -> String {
    String::from(
        r#"<knowledgebase>
  <metadata>
    <name>queries</name>
    <version>1.0</version>
    <created>2026-01-20</created>
    <author>qa</author>
    <description>query fixture</description>
    <locale>en</locale>
    <generator>handmade</generator>
    <checksum>0</checksum>
  </metadata>
  <data>
    <purposes>
      <purpose id="power" name="Power" root="true"/>
      <purpose id="mount" name="Mount"/>
      <purpose id="idle" name="Idle" root="true"/>
    </purposes>
    <variants>
      <variant id="battery" name="Battery"/>
      <variant id="mains" name="Mains"/>
      <variant id="bracket" name="Bracket"/>
    </variants>
    <features>
      <feature id="capacity" variant="battery" name="capacity" kind="range" min="1" max="12"/>
      <feature id="chemistry" variant="battery" name="chemistry" kind="enumeration"><value>li-ion</value><value>nimh</value></feature>
      <feature id="grounded" variant="mains" name="grounded" kind="toggle"/>
    </features>
    <events>
      <event id="low" name="low-power"><variant ref="battery"/></event>
      <event id="surge" name="surge"><variant ref="mains"/><variant ref="battery"/></event>
    </events>
    <rules>
      <rule id="pair" name="needs-mount"><variant ref="battery"/><ref kind="purpose" id="mount"/></rule>
    </rules>
    <fulfillments>
      <fulfills purpose="power" variant="battery"/>
      <fulfills purpose="power" variant="mains"/>
      <fulfills purpose="mount" variant="bracket"/>
    </fulfillments>
    <constitutions>
      <constitutes variant="battery" purpose="mount"/>
    </constitutions>
  </data>
</knowledgebase>"#,
    )
}

#[test]
fn fulfilling_variants_contain_exactly_the_related_variants() {
    let graph = ingest::build_graph_from_str(&document(), Strictness::Strict).expect("build ok");
    let fulfilling: Vec<String> = graph
        .fulfilling_variants("power")
        .expect("purpose exists")
        .iter()
        .map(|variant| variant.id().to_owned())
        .collect();
    assert_eq!(fulfilling, vec!["battery", "mains"]);
    let mount: Vec<String> = graph
        .fulfilling_variants("mount")
        .expect("purpose exists")
        .iter()
        .map(|variant| variant.id().to_owned())
        .collect();
    assert_eq!(mount, vec!["bracket"]);
}

#[test]
fn a_purpose_nothing_fulfils_yields_an_empty_set_not_an_error() {
    let graph = ingest::build_graph_from_str(&document(), Strictness::Strict).expect("build ok");
    let idle = graph.fulfilling_variants("idle").expect("purpose exists");
    assert!(idle.is_empty());
}

#[test]
fn an_unknown_identifier_yields_not_found() {
    let graph = ingest::build_graph_from_str(&document(), Strictness::Strict).expect("build ok");
    let err = graph.fulfilling_variants("warp-drive").expect_err("unknown purpose");
    assert!(matches!(err, KunskapError::NotFound { .. }));
    let err = graph.features("warp-drive").expect_err("unknown variant");
    assert!(matches!(err, KunskapError::NotFound { .. }));
}

#[test]
fn constituting_purposes_follow_the_expansion_edges() {
    let graph = ingest::build_graph_from_str(&document(), Strictness::Strict).expect("build ok");
    let constituted: Vec<String> = graph
        .constituting_purposes("battery")
        .expect("variant exists")
        .iter()
        .map(|purpose| purpose.id().to_owned())
        .collect();
    assert_eq!(constituted, vec!["mount"]);
    assert!(graph.constituting_purposes("mains").expect("variant exists").is_empty());
}

#[test]
fn attachments_resolve_per_variant() {
    let graph = ingest::build_graph_from_str(&document(), Strictness::Strict).expect("build ok");

    let features = graph.features("battery").expect("variant exists");
    assert_eq!(features.len(), 2);
    assert_eq!(features[0].id(), "capacity");
    assert_eq!(*features[0].domain(), Domain::Range { min: 1, max: 12 });
    assert_eq!(
        *features[1].domain(),
        Domain::Enumeration(vec!["li-ion".into(), "nimh".into()])
    );

    let events: Vec<String> = graph
        .attached_events("battery")
        .expect("variant exists")
        .iter()
        .map(|event| event.id().to_owned())
        .collect();
    assert_eq!(events, vec!["low", "surge"]);

    let rules = graph.attached_rules("battery").expect("variant exists");
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id(), "pair");
    assert!(graph.attached_rules("bracket").expect("variant exists").is_empty());
}

#[test]
fn root_purposes_keep_document_order() {
    let graph = ingest::build_graph_from_str(&document(), Strictness::Strict).expect("build ok");
    let roots: Vec<String> = graph
        .root_purposes()
        .iter()
        .map(|purpose| purpose.id().to_owned())
        .collect();
    assert_eq!(roots, vec!["power", "idle"]);
}

#[test]
fn metadata_is_carried_on_the_graph() {
    let graph = ingest::build_graph_from_str(&document(), Strictness::Strict).expect("build ok");
    assert_eq!(graph.metadata().name(), "queries");
    assert_eq!(graph.metadata().version(), "1.0");
    assert_eq!(graph.metadata().created().to_string(), "2026-01-20");
    assert_eq!(graph.metadata().author(), Some("qa"));
}

#[test]
fn the_graph_carries_a_source_fingerprint() {
    let graph = ingest::build_graph_from_str(&document(), Strictness::Strict).expect("build ok");
    let fingerprint = graph.fingerprint().expect("built through the pipeline");
    assert_eq!(fingerprint.len(), 64);
}

#[test]
fn the_flat_export_covers_every_snapshot() {
    let graph = ingest::build_graph_from_str(&document(), Strictness::Strict).expect("build ok");
    let export = graph.export();
    assert_eq!(export["metadata"]["name"], "queries");
    assert_eq!(export["purposes"].as_array().map(Vec::len), Some(3));
    assert_eq!(export["variants"].as_array().map(Vec::len), Some(3));
    assert_eq!(export["features"].as_array().map(Vec::len), Some(3));
    assert_eq!(export["events"].as_array().map(Vec::len), Some(2));
    assert_eq!(export["rules"].as_array().map(Vec::len), Some(1));
    assert_eq!(export["fulfills"].as_array().map(Vec::len), Some(3));
    assert_eq!(export["constitutes"].as_array().map(Vec::len), Some(1));
    assert_eq!(export["valid"], true);
}

#[test]
fn rebuilding_from_identical_input_is_idempotent() {
    let document = document();
    let first = ingest::build_graph_from_str(&document, Strictness::Strict).expect("build ok");
    let second = ingest::build_graph_from_str(&document, Strictness::Strict).expect("build ok");

    assert_eq!(first.is_valid(), second.is_valid());
    assert_eq!(first.fingerprint(), second.fingerprint());

    let ids = |graph: &kunskap::graph::KnowledgeGraph| {
        (
            graph.purposes().iter().map(|p| p.id().to_owned()).collect::<Vec<_>>(),
            graph.variants().iter().map(|v| v.id().to_owned()).collect::<Vec<_>>(),
            graph.root_purposes().iter().map(|p| p.id().to_owned()).collect::<Vec<_>>(),
        )
    };
    assert_eq!(ids(&first), ids(&second));

    for purpose in first.purposes() {
        let a: Vec<String> = first
            .fulfilling_variants(purpose.id())
            .expect("purpose exists")
            .iter()
            .map(|v| v.id().to_owned())
            .collect();
        let b: Vec<String> = second
            .fulfilling_variants(purpose.id())
            .expect("purpose exists")
            .iter()
            .map(|v| v.id().to_owned())
            .collect();
        assert_eq!(a, b);
    }
    for variant in first.variants() {
        let a: Vec<String> = first
            .constituting_purposes(variant.id())
            .expect("variant exists")
            .iter()
            .map(|p| p.id().to_owned())
            .collect();
        let b: Vec<String> = second
            .constituting_purposes(variant.id())
            .expect("variant exists")
            .iter()
            .map(|p| p.id().to_owned())
            .collect();
        assert_eq!(a, b);
    }
}
