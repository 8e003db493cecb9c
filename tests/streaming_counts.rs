use kunskap::ingest;
use kunskap::record::{DiagnosticPrinter, Record, RecordHandler};
use kunskap::stream::{ElementReader, SkipPolicy};

/// A document with a metadata element (carrying its eight fields), a data
/// wrapper and seven named collections. The collections hold 4 features,
/// 5 fulfils relations, 3 constitutes relations, 3 events and 1 rule.
fn nested_document() -> String {
    String::from(
        r#"<knowledgebase>
  <metadata>
    <name>fixture</name>
    <version>1.0</version>
    <created>2026-03-01</created>
    <author>test</author>
    <description>streaming fixture</description>
    <locale>en</locale>
    <generator>handmade</generator>
    <checksum>0</checksum>
  </metadata>
  <data>
    <purposes>
      <purpose id="p1" name="Power" root="true"/>
      <purpose id="p2" name="Mount"/>
    </purposes>
    <variants>
      <variant id="v1" name="Battery"/>
      <variant id="v2" name="Mains"/>
      <variant id="v3" name="Bracket"/>
    </variants>
    <features>
      <feature id="f1" variant="v1" name="capacity" kind="range" min="1" max="10"/>
      <feature id="f2" variant="v1" name="chemistry" kind="enumeration"><value>li-ion</value><value>nimh</value></feature>
      <feature id="f3" variant="v2" name="grounded" kind="toggle"/>
      <feature id="f4" variant="v3" name="width" kind="range" min="10" max="20"/>
    </features>
    <events>
      <event id="e1" name="low-power"><variant ref="v1"/></event>
      <event id="e2" name="surge"><variant ref="v2"/></event>
      <event id="e3" name="detach"><variant ref="v3"/></event>
    </events>
    <rules>
      <rule id="r1" name="needs-mount"><variant ref="v1"/><ref kind="purpose" id="p2"/></rule>
    </rules>
    <fulfillments>
      <fulfills purpose="p1" variant="v1"/>
      <fulfills purpose="p1" variant="v2"/>
      <fulfills purpose="p2" variant="v3"/>
      <fulfills purpose="p2" variant="v1"/>
      <fulfills purpose="p2" variant="v2"/>
    </fulfillments>
    <constitutions>
      <constitutes variant="v1" purpose="p2"/>
      <constitutes variant="v2" purpose="p2"/>
      <constitutes variant="v3" purpose="p2"/>
    </constitutions>
  </data>
</knowledgebase>"#,
    )
}

#[test]
fn skip_none_on_single_child_root_emits_one() {
    let mut reader = ElementReader::from_str("<root><only/></root>", SkipPolicy::SkipNone);
    let element = reader.next().expect("read ok").expect("one element");
    assert_eq!(element.name(), "only");
    assert!(reader.next().expect("read ok").is_none());
    assert_eq!(reader.emitted(), 1);
}

#[test]
fn skip_none_delivers_document_top_level_element_by_element() {
    let document = nested_document();
    let mut reader = ElementReader::from_str(&document, SkipPolicy::SkipNone);
    let first = reader.next().expect("read ok").expect("metadata");
    assert_eq!(first.name(), "metadata");
    assert_eq!(first.children().len(), 8);
    let second = reader.next().expect("read ok").expect("data");
    assert_eq!(second.name(), "data");
    // the wrapper arrives as one nested subtree
    assert_eq!(second.children().len(), 7);
    assert!(reader.next().expect("read ok").is_none());
    assert_eq!(reader.emitted(), 2);
}

#[test]
fn skip_one_past_empty_metadata_emits_the_data_element() {
    let document = "<knowledgebase><metadata/><data><purposes/></data></knowledgebase>";
    let mut reader = ElementReader::from_str(document, SkipPolicy::SkipCount(1));
    let element = reader.next().expect("read ok").expect("data element");
    assert_eq!(element.name(), "data");
    assert!(reader.next().expect("read ok").is_none());
    assert_eq!(reader.emitted(), 1);
}

#[test]
fn skip_ten_dives_into_the_wrapper_and_emits_the_seven_collections() {
    // metadata start + its eight fields + the data wrapper start = 10
    let document = nested_document();
    let mut reader = ElementReader::from_str(&document, SkipPolicy::SkipCount(10));
    let mut names = Vec::new();
    let mut child_counts = Vec::new();
    while let Some(element) = reader.next().expect("read ok") {
        names.push(element.name().to_owned());
        child_counts.push(element.children().len());
    }
    assert_eq!(
        names,
        vec![
            "purposes",
            "variants",
            "features",
            "events",
            "rules",
            "fulfillments",
            "constitutions"
        ]
    );
    assert_eq!(child_counts, vec![2, 3, 4, 3, 1, 5, 3]);
    assert_eq!(reader.emitted(), 7);
}

#[test]
fn skip_wrapper_matches_the_counted_dive() {
    let document = nested_document();
    let mut reader = ElementReader::from_str(&document, SkipPolicy::SkipWrapper);
    let mut names = Vec::new();
    while let Some(element) = reader.next().expect("read ok") {
        names.push(element.name().to_owned());
    }
    assert_eq!(names.len(), 7);
    assert_eq!(names[0], "purposes");
    assert_eq!(names[6], "constitutions");
    assert_eq!(reader.emitted(), 7);
}

#[test]
fn empty_root_yields_none_immediately() {
    let mut reader = ElementReader::from_str("<knowledgebase></knowledgebase>", SkipPolicy::SkipNone);
    assert!(reader.next().expect("read ok").is_none());
    assert_eq!(reader.emitted(), 0);

    let mut reader = ElementReader::from_str("<knowledgebase/>", SkipPolicy::SkipNone);
    assert!(reader.next().expect("read ok").is_none());
    assert_eq!(reader.emitted(), 0);
}

#[test]
fn skipping_past_the_end_yields_none_and_zero_emitted() {
    let document = "<knowledgebase><metadata/><data/></knowledgebase>";
    let mut reader = ElementReader::from_str(document, SkipPolicy::SkipCount(50));
    assert!(reader.next().expect("read ok").is_none());
    assert_eq!(reader.emitted(), 0);
}

#[test]
fn malformed_document_poisons_the_reader() {
    let mut reader = ElementReader::from_str("<a><b></a>", SkipPolicy::SkipNone);
    assert!(reader.next().is_err());
    // not reusable after failure
    assert!(reader.next().is_err());
}

struct Counting {
    handled: u64,
}

impl RecordHandler for Counting {
    fn handle(&mut self, _record: Record) -> kunskap::error::Result<()> {
        self.handled += 1;
        Ok(())
    }
}

#[test]
fn emitted_count_equals_handler_invocations() {
    let document = nested_document();
    let mut handler = Counting { handled: 0 };
    let report = ingest::ingest(
        document.as_bytes(),
        SkipPolicy::SkipWrapper,
        &mut handler,
    )
    .expect("ingest ok");
    assert_eq!(report.emitted(), 7);
    assert_eq!(report.emitted(), handler.handled);
}

#[test]
fn any_handler_plugs_into_the_same_pipeline() {
    // the diagnostic printer and the counting handler see identical streams
    let document = nested_document();
    let mut printer = DiagnosticPrinter::new();
    let report = ingest::ingest(document.as_bytes(), SkipPolicy::SkipNone, &mut printer)
        .expect("ingest ok");
    assert_eq!(report.emitted(), 2);
    assert_eq!(printer.handled(), 2);
}

#[test]
fn fingerprint_is_stable_across_reads() {
    let document = nested_document();
    let mut first = Counting { handled: 0 };
    let mut second = Counting { handled: 0 };
    let a = ingest::ingest(document.as_bytes(), SkipPolicy::SkipNone, &mut first).expect("ok");
    let b = ingest::ingest(document.as_bytes(), SkipPolicy::SkipWrapper, &mut second).expect("ok");
    // the fingerprint covers the whole document regardless of skip policy
    assert_eq!(a.fingerprint(), b.fingerprint());
}
