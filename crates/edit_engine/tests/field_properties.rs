//! Property tests for field construction and evaluation

use doc_model::DocumentTree;
use edit_engine::{formula, DocumentBuilder};
use proptest::prelude::*;
use std::cmp::Ordering;

#[derive(Debug, Clone)]
enum Step {
    Write(String),
    Field(&'static str),
    Paragraph,
    ToStart,
    ToParagraph(usize),
    ToEnd,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        "[a-z ]{1,6}".prop_map(Step::Write),
        prop::sample::select(vec!["PAGE", "= 1 + 2", "QUOTE \"q\"", "MERGEFIELD Name", "NUMWORDS"])
            .prop_map(Step::Field),
        Just(Step::Paragraph),
        Just(Step::ToStart),
        (0usize..6).prop_map(Step::ToParagraph),
        Just(Step::ToEnd),
    ]
}

fn run(steps: &[Step]) -> DocumentTree {
    let mut tree = DocumentTree::new();
    let mut builder = DocumentBuilder::new(&mut tree);
    for step in steps {
        match step {
            Step::Write(text) => builder.write(text).unwrap(),
            Step::Field(code) => {
                builder.insert_field(code).unwrap();
            }
            Step::Paragraph => {
                builder.insert_paragraph().unwrap();
            }
            Step::ToStart => {
                builder.move_to_document_start();
            }
            Step::ToParagraph(index) => {
                builder.move_to_paragraph(*index);
            }
            Step::ToEnd => {
                builder.move_to_document_end();
            }
        }
    }
    tree
}

proptest! {
    #[test]
    fn prop_field_markers_stay_ordered(steps in prop::collection::vec(step(), 1..25)) {
        let tree = run(&steps);
        for id in tree.fields_in_document_order() {
            let field = tree.field(id).unwrap();
            prop_assert!(field.is_closed());
            let separator = field.separator().unwrap();
            let end = field.end().unwrap();
            prop_assert_eq!(tree.compare_order(field.start(), separator), Some(Ordering::Less));
            prop_assert_eq!(tree.compare_order(separator, end), Some(Ordering::Less));
        }
    }

    #[test]
    fn prop_updating_twice_changes_nothing(steps in prop::collection::vec(step(), 1..25)) {
        let mut tree = run(&steps);
        let mut builder = DocumentBuilder::new(&mut tree);
        builder.update_fields().unwrap();
        let once = builder.tree().text();
        builder.update_fields().unwrap();
        prop_assert_eq!(builder.tree().text(), once);
    }

    #[test]
    fn prop_nested_formula_is_idempotent(a in 0i32..1000, b in 0i32..1000) {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        let outer = builder.start_field().unwrap();
        builder.write("IF ").unwrap();
        builder.insert_field(&format!("= {} + {}", a, b)).unwrap();
        builder.write(&format!(" = {} \"same\" \"different\"", a + b)).unwrap();
        builder.insert_field_separator().unwrap();
        builder.end_field().unwrap();

        builder.update_field(outer).unwrap();
        let first = builder.tree().field_result(outer).unwrap();
        builder.update_field(outer).unwrap();
        prop_assert_eq!(&first, "same");
        prop_assert_eq!(builder.tree().field_result(outer).unwrap(), first);
    }

    #[test]
    fn prop_formula_input_never_panics(input in "\\PC{0,30}") {
        let _ = formula::evaluate(&input, &|_| None);
    }
}
