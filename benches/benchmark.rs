use criterion::{Criterion, black_box, criterion_group, criterion_main};

use kunskap::graph::Strictness;
use kunskap::ingest;

fn synthetic_document(variants: usize) -> String {
    let mut purposes = String::from(r#"<purpose id="root" name="Root" root="true"/>"#);
    let mut variant_list = String::new();
    let mut features = String::new();
    let mut fulfillments = String::new();
    for index in 0..variants {
        purposes.push_str(&format!(r#"<purpose id="p{}" name="Purpose {}"/>"#, index, index));
        variant_list.push_str(&format!(r#"<variant id="v{}" name="Variant {}"/>"#, index, index));
        features.push_str(&format!(
            r#"<feature id="f{}" variant="v{}" name="size" kind="range" min="0" max="{}"/>"#,
            index, index, index
        ));
        fulfillments.push_str(&format!(r#"<fulfills purpose="root" variant="v{}"/>"#, index));
    }
    let mut constitutions = String::new();
    for index in 0..variants {
        constitutions.push_str(&format!(
            r#"<constitutes variant="v{}" purpose="p{}"/>"#,
            index, index
        ));
    }
    format!(
        r#"<knowledgebase>
  <metadata>
    <name>bench</name><version>1</version><created>2026-01-01</created>
    <author>bench</author><description>synthetic</description>
    <locale>en</locale><generator>bench</generator><checksum>0</checksum>
  </metadata>
  <data>
    <purposes>{}</purposes>
    <variants>{}</variants>
    <features>{}</features>
    <events/>
    <rules/>
    <fulfillments>{}</fulfillments>
    <constitutions>{}</constitutions>
  </data>
</knowledgebase>"#,
        purposes, variant_list, features, fulfillments, constitutions
    )
}

pub fn criterion_benchmark(c: &mut Criterion) {
    for size in [100usize, 1_000, 10_000] {
        let document = synthetic_document(size);
        c.bench_function(&format!("build {}", size), |b| {
            b.iter(|| {
                let graph =
                    ingest::build_graph_from_str(black_box(&document), Strictness::Strict)
                        .expect("build ok");
                black_box(graph)
            })
        });
    }

    let document = synthetic_document(10_000);
    let graph = ingest::build_graph_from_str(&document, Strictness::Strict).expect("build ok");
    c.bench_function("fulfilling_variants 10k", |b| {
        b.iter(|| black_box(graph.fulfilling_variants(black_box("root")).expect("purpose exists")))
    });
    c.bench_function("constituting_purposes 10k", |b| {
        b.iter(|| black_box(graph.constituting_purposes(black_box("v42")).expect("variant exists")))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
