//! Type inference properties.

use anyhow::Result;
use bulkload::infer::{ColumnType, TypeCounts, classify_text};
use bulkload::{TypeMode, infer_csv, infer_jsonl};
use std::collections::BTreeSet;

#[test]
fn text_dominates_any_mix() {
    let mixes: [&[ColumnType]; 4] = [
        &[ColumnType::Integer; 50],
        &[ColumnType::Float, ColumnType::Integer, ColumnType::Float],
        &[ColumnType::Json, ColumnType::Json],
        &[ColumnType::Numeric; 9],
    ];
    for mix in mixes {
        let mut counts = TypeCounts::default();
        for &ty in mix {
            counts.observe(ty);
        }
        assert_ne!(counts.resolve(), ColumnType::Text);
        counts.observe(ColumnType::Text);
        assert_eq!(counts.resolve(), ColumnType::Text);
    }
}

#[test]
fn csv_values_classify_like_their_parsers() {
    assert_eq!(classify_text("42"), ColumnType::Integer);
    assert_eq!(classify_text("-7"), ColumnType::Integer);
    assert_eq!(classify_text("10.5"), ColumnType::Float);
    assert_eq!(classify_text("1e3"), ColumnType::Float);
    assert_eq!(classify_text("Alice"), ColumnType::Text);
    assert_eq!(classify_text("12abc"), ColumnType::Text);
}

#[test]
fn csv_scenario_types() -> Result<()> {
    let cols = infer_csv("id,name,amount\n1,Alice,10.5\n2,Bob,7\n3,,\n".as_bytes(), 400, TypeMode::Dynamic)?;
    let types: Vec<_> = cols.iter().map(|c| (c.name.as_str(), c.ty)).collect();
    assert_eq!(
        types,
        [("id", ColumnType::Integer), ("name", ColumnType::Text), ("amount", ColumnType::Float)]
    );
    Ok(())
}

#[test]
fn jsonl_columns_are_the_union_of_sampled_keys() -> Result<()> {
    let lines = [
        r#"{"a":1}"#,
        r#"{"b":"x","a":2}"#,
        r#"{"c":[1,2]}"#,
        r#"{"d":null,"e":{"k":true}}"#,
        r#"{}"#,
    ];
    let input = lines.join("\n");
    let cols = infer_jsonl(input.as_bytes(), 400, TypeMode::Dynamic)?;

    let names: Vec<_> = cols.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["a", "b", "c", "d", "e"]);
    let expected: BTreeSet<_> = ["a", "b", "c", "d", "e"].into_iter().collect();
    assert_eq!(names.iter().copied().collect::<BTreeSet<_>>(), expected);

    let ty = |n: &str| cols.iter().find(|c| c.name == n).map(|c| c.ty);
    assert_eq!(ty("a"), Some(ColumnType::Numeric));
    assert_eq!(ty("c"), Some(ColumnType::Json));
    assert_eq!(ty("d"), Some(ColumnType::Text));
    assert_eq!(ty("e"), Some(ColumnType::Json));
    Ok(())
}

#[test]
fn all_text_mode_ignores_content() -> Result<()> {
    let cols = infer_csv("n,f\n1,2.5\n".as_bytes(), 400, TypeMode::AllText)?;
    assert!(cols.iter().all(|c| c.ty == ColumnType::Text));

    let cols = infer_jsonl("{\"n\":1,\"o\":{}}\n".as_bytes(), 400, TypeMode::AllText)?;
    assert_eq!(cols.len(), 2);
    assert!(cols.iter().all(|c| c.ty == ColumnType::Text));
    Ok(())
}

#[test]
fn keys_beyond_the_lookup_are_not_columns() -> Result<()> {
    let input = "{\"a\":1}\n{\"a\":2}\n{\"late\":3}\n";
    let cols = infer_jsonl(input.as_bytes(), 2, TypeMode::Dynamic)?;
    assert_eq!(cols.len(), 1);
    assert_eq!(cols[0].name, "a");
    Ok(())
}
