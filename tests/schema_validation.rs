use kunskap::error::KunskapError;
use kunskap::schema;

fn valid_document() -> String {
    String::from(
        r#"<knowledgebase>
  <metadata>
    <name>catalogue</name>
    <version>2.1</version>
    <created>2026-02-11</created>
    <author>qa</author>
    <description>schema fixture</description>
    <locale>en</locale>
    <generator>handmade</generator>
    <checksum>deadbeef</checksum>
  </metadata>
  <data>
    <purposes>
      <purpose id="p1" name="Power" root="true"/>
      <purpose id="p2" name="Mount" description="attachment point"/>
    </purposes>
    <variants>
      <variant id="v1" name="Battery"/>
    </variants>
    <features>
      <feature id="f1" variant="v1" name="capacity" kind="range" min="0" max="100"/>
      <feature id="f2" variant="v1" name="chemistry" kind="enumeration"><value>li-ion</value></feature>
      <feature id="f3" variant="v1" name="fast-charge" kind="toggle"/>
    </features>
    <events>
      <event id="e1" name="low-power"><variant ref="v1"/></event>
    </events>
    <rules>
      <rule id="r1" name="needs-mount" expr="requires(p2)"><variant ref="v1"/><ref kind="purpose" id="p2"/></rule>
    </rules>
    <fulfillments>
      <fulfills purpose="p1" variant="v1"/>
    </fulfillments>
    <constitutions>
      <constitutes variant="v1" purpose="p2"/>
    </constitutions>
  </data>
</knowledgebase>"#,
    )
}

fn expect_schema_error(document: &str, fragment: &str) {
    let err = schema::validate_str(document).expect_err("document should be rejected");
    match &err {
        KunskapError::Schema { location, message } => {
            assert!(
                message.contains(fragment),
                "message '{}' should mention '{}'",
                message,
                fragment
            );
            assert!(
                location.contains("byte"),
                "location '{}' should carry a byte offset",
                location
            );
        }
        other => panic!("expected a schema error, got {:?}", other),
    }
}

#[test]
fn accepts_a_conforming_document() {
    schema::validate_str(&valid_document()).expect("fixture conforms to the schema");
}

#[test]
fn validation_is_repeatable() {
    // purely a gate: no state is retained between runs
    let document = valid_document();
    schema::validate_str(&document).expect("first run");
    schema::validate_str(&document).expect("second run");
}

#[test]
fn rejects_a_wrong_root_element() {
    expect_schema_error("<catalogue/>", "root element");
}

#[test]
fn rejects_data_before_metadata() {
    let document = valid_document();
    let metadata_first = document.find("<metadata>").expect("fixture has metadata");
    // cheap structural swap: build a document whose first child is <data>
    let swapped = format!(
        "<knowledgebase><data/>{}",
        &document[metadata_first..]
    );
    expect_schema_error(&swapped, "expected <metadata>");
}

#[test]
fn rejects_missing_metadata_fields() {
    let document = valid_document().replace("<locale>en</locale>", "");
    expect_schema_error(&document, "expected <locale>");
}

#[test]
fn rejects_a_missing_collection() {
    let document = valid_document().replace("<events>", "<chimes>").replace("</events>", "</chimes>");
    expect_schema_error(&document, "expected <events>");
}

#[test]
fn rejects_a_purpose_without_a_name() {
    let document = valid_document().replace(
        r#"<purpose id="p1" name="Power" root="true"/>"#,
        r#"<purpose id="p1" root="true"/>"#,
    );
    expect_schema_error(&document, "requires attribute 'name'");
}

#[test]
fn rejects_a_bad_root_flag() {
    let document = valid_document().replace(r#"root="true""#, r#"root="yes""#);
    expect_schema_error(&document, "invalid boolean");
}

#[test]
fn rejects_a_bad_created_date() {
    let document = valid_document().replace("2026-02-11", "in February");
    expect_schema_error(&document, "ISO date");
}

#[test]
fn rejects_a_bad_identifier() {
    let document = valid_document().replace(r#"<variant id="v1" name="Battery"/>"#, r#"<variant id="1 v" name="Battery"/>"#);
    expect_schema_error(&document, "invalid identifier");
}

#[test]
fn rejects_an_unknown_feature_kind() {
    let document = valid_document().replace(r#"kind="toggle""#, r#"kind="switch""#);
    expect_schema_error(&document, "invalid feature kind");
}

#[test]
fn rejects_an_enumeration_without_values() {
    let document = valid_document().replace(
        r#"<feature id="f2" variant="v1" name="chemistry" kind="enumeration"><value>li-ion</value></feature>"#,
        r#"<feature id="f2" variant="v1" name="chemistry" kind="enumeration"></feature>"#,
    );
    expect_schema_error(&document, "at least one <value>");
}

#[test]
fn rejects_an_event_without_variants() {
    let document = valid_document().replace(
        r#"<event id="e1" name="low-power"><variant ref="v1"/></event>"#,
        r#"<event id="e1" name="low-power"></event>"#,
    );
    expect_schema_error(&document, "at least one variant");
}

#[test]
fn rejects_an_unexpected_attribute() {
    let document = valid_document().replace(
        r#"<fulfills purpose="p1" variant="v1"/>"#,
        r#"<fulfills purpose="p1" variant="v1" weight="3"/>"#,
    );
    expect_schema_error(&document, "does not take attribute 'weight'");
}

#[test]
fn rejects_an_unknown_reference_kind() {
    let document = valid_document().replace(r#"<ref kind="purpose" id="p2"/>"#, r#"<ref kind="gadget" id="p2"/>"#);
    expect_schema_error(&document, "invalid reference kind");
}
