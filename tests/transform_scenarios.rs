use serde_json::json;
use tree_ot::{
    DEFAULT_GRAVEYARD, Delta, DeltaKind, DeltaRequest, Document, Element, Node, OperationKind,
    Position, Range, TransformContext, transform, transform_delta_sets,
};

fn pos(path: &[usize]) -> Position {
    Position::new("main", path.to_vec())
}

fn paragraph(text: &str) -> Node {
    Node::element("p", vec![Node::text(text)])
}

fn context(is_strong: bool) -> TransformContext {
    TransformContext::new(is_strong, DEFAULT_GRAVEYARD)
}

type MoveSummary = (&'static str, Vec<usize>, usize, Vec<usize>, u64);

fn summary(delta: &Delta) -> Vec<MoveSummary> {
    delta
        .operations()
        .iter()
        .filter_map(|operation| match &operation.kind {
            OperationKind::Move(moved) => Some((
                "move",
                moved.source.path.clone(),
                moved.how_many,
                moved.target.path.clone(),
                operation.base_version,
            )),
            OperationKind::Remove(moved) => Some((
                "remove",
                moved.source.path.clone(),
                moved.how_many,
                moved.target.path.clone(),
                operation.base_version,
            )),
            _ => None,
        })
        .collect()
}

/// Applies `a` and `b` in both orders, transforming the second one, and
/// checks that both replicas end up with the same tree.
fn converge(document: &Document, a: &Delta, b: &Delta) -> Document {
    let context = TransformContext::for_document(document, true);
    let (a_after_b, b_after_a) =
        transform_delta_sets(std::slice::from_ref(a), std::slice::from_ref(b), &context);

    let mut a_first = document.clone();
    a_first.apply_delta(a).unwrap();
    for delta in &b_after_a {
        a_first.apply_delta(delta).unwrap();
    }
    let mut b_first = document.clone();
    b_first.apply_delta(b).unwrap();
    for delta in &a_after_b {
        b_first.apply_delta(delta).unwrap();
    }
    assert!(
        a_first.structurally_eq(&b_first),
        "replicas diverged\n{a_first:#?}\n{b_first:#?}"
    );
    a_first
}

fn create(document: &Document, request: DeltaRequest) -> Delta {
    Delta::create(document, request).unwrap()
}

/// `main` with a blockquote at [3, 3, 3] holding twelve paragraphs.
fn nested_document() -> Document {
    let quote = Node::element(
        "blockquote",
        (0..12).map(|index| paragraph(&format!("c{index}"))).collect(),
    );
    let section = Node::element(
        "section",
        vec![paragraph("s0"), paragraph("s1"), paragraph("s2"), quote],
    );
    let div = Node::element(
        "div",
        vec![paragraph("d0"), paragraph("d1"), paragraph("d2"), section],
    );
    Document::from_nodes(vec![paragraph("x"), paragraph("y"), paragraph("z"), div])
}

#[test]
fn unwrap_against_split_of_the_unwrapped_element() {
    let doc = nested_document();
    let unwrap = create(&doc, DeltaRequest::Unwrap { position: pos(&[3, 3, 3]) });
    let split = create(&doc, DeltaRequest::Split { position: pos(&[3, 3, 3, 3]) });

    let result = transform(&unwrap, &split, &context(true));
    assert_eq!(result.len(), 2);
    assert_eq!(result[0].kind(), DeltaKind::Merge);
    assert_eq!(
        summary(&result[0]),
        vec![
            ("move", vec![3, 3, 4, 0], 9, vec![3, 3, 3, 3], 2),
            ("remove", vec![3, 3, 4], 1, vec![0], 3),
        ]
    );
    assert_eq!(result[1].kind(), DeltaKind::Unwrap);
    assert_eq!(
        summary(&result[1]),
        vec![
            ("move", vec![3, 3, 3, 0], 12, vec![3, 3, 3], 4),
            ("remove", vec![3, 3, 15], 1, vec![0], 5),
        ]
    );

    let dropped = transform(&split, &unwrap, &context(false));
    assert_eq!(dropped.len(), 1);
    assert!(dropped[0].is_no_op());

    let merged = converge(&doc, &unwrap, &split);
    assert_eq!(merged.element_at(&pos(&[3, 3])).unwrap().children.len(), 15);
}

#[test]
fn unwrap_against_split_of_its_parent() {
    let doc = nested_document();
    let unwrap = create(&doc, DeltaRequest::Unwrap { position: pos(&[3, 3, 3]) });
    let split = create(&doc, DeltaRequest::Split { position: pos(&[3, 3, 3]) });

    let result = transform(&unwrap, &split, &context(true));
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].kind(), DeltaKind::Unwrap);
    assert_eq!(
        summary(&result[0]),
        vec![
            ("move", vec![3, 4, 0, 0], 12, vec![3, 4, 0], 2),
            ("remove", vec![3, 4, 12], 1, vec![0], 3),
        ]
    );

    let merged = converge(&doc, &unwrap, &split);
    assert_eq!(merged.element_at(&pos(&[3, 3])).unwrap().children.len(), 3);
    assert_eq!(merged.element_at(&pos(&[3, 4])).unwrap().children.len(), 12);
}

#[test]
fn splits_of_one_element_at_different_offsets_cut_it_in_three() {
    let doc = Document::from_nodes(vec![paragraph("abcdef")]);
    let early = create(&doc, DeltaRequest::Split { position: pos(&[0, 1]) });
    let late = create(&doc, DeltaRequest::Split { position: pos(&[0, 4]) });
    let merged = converge(&doc, &early, &late);
    let expected = Document::from_nodes(vec![paragraph("a"), paragraph("bcd"), paragraph("ef")]);
    assert!(merged.structurally_eq(&expected));
    converge(&doc, &late, &early);
}

#[test]
fn identical_splits_happen_once() {
    let doc = Document::from_nodes(vec![paragraph("abcd")]);
    let a = create(&doc, DeltaRequest::Split { position: pos(&[0, 2]) });
    let b = create(&doc, DeltaRequest::Split { position: pos(&[0, 2]) });
    let merged = converge(&doc, &a, &b);
    assert!(merged.structurally_eq(&Document::from_nodes(vec![paragraph("ab"), paragraph("cd")])));
}

#[test]
fn attribute_reaches_the_copy_of_a_split_element() {
    let doc = Document::from_nodes(vec![paragraph("abcd")]);
    let attribute = Delta::attribute(
        Range::new(pos(&[0]), pos(&[1])),
        "align",
        None,
        Some(json!("left")),
        0,
    )
    .unwrap();
    let split = create(&doc, DeltaRequest::Split { position: pos(&[0, 2]) });

    let rebased = transform(&attribute, &split, &context(true));
    assert_eq!(rebased.len(), 2);
    assert_eq!(rebased[1].base_version(), 3);

    for merged in [converge(&doc, &attribute, &split), converge(&doc, &split, &attribute)] {
        for path in [[0], [1]] {
            let element = merged.element_at(&pos(&path)).unwrap();
            assert_eq!(element.attributes.get("align"), Some(&json!("left")));
        }
    }
}

#[test]
fn rename_reaches_the_copy_of_a_split_element() {
    let doc = Document::from_nodes(vec![paragraph("abcd")]);
    let rename = Delta::rename(pos(&[0]), "p", "h1", 0).unwrap();
    let split = create(&doc, DeltaRequest::Split { position: pos(&[0, 2]) });
    for merged in [converge(&doc, &rename, &split), converge(&doc, &split, &rename)] {
        assert_eq!(merged.element_at(&pos(&[0])).unwrap().name, "h1");
        assert_eq!(merged.element_at(&pos(&[1])).unwrap().name, "h1");
    }
}

#[test]
fn insert_at_merged_element_undoes_the_merge() {
    let doc = Document::from_nodes(vec![paragraph("ab"), paragraph("cd")]);
    let insert = create(
        &doc,
        DeltaRequest::Insert {
            position: pos(&[1]),
            nodes: vec![Node::element("img", vec![])],
        },
    );
    let merge = create(&doc, DeltaRequest::Merge { position: pos(&[1]) });

    let rebased = transform(&insert, &merge, &context(false));
    assert_eq!(rebased.len(), 2);
    assert_eq!(rebased[0].kind(), DeltaKind::Split);
    assert_eq!(rebased[1].base_version(), 4);

    let merged = converge(&doc, &insert, &merge);
    let expected = Document::from_nodes(vec![
        paragraph("ab"),
        Node::element("img", vec![]),
        paragraph("cd"),
    ]);
    assert!(merged.structurally_eq(&expected));
    converge(&doc, &merge, &insert);
}

#[test]
fn removal_of_merged_element_undoes_the_merge() {
    let doc = Document::from_nodes(vec![paragraph("ab"), paragraph("cd"), paragraph("ef")]);
    let remove = create(
        &doc,
        DeltaRequest::Remove {
            range: Range::new(pos(&[1]), pos(&[2])),
        },
    );
    let merge = create(&doc, DeltaRequest::Merge { position: pos(&[1]) });
    let merged = converge(&doc, &remove, &merge);
    assert!(merged.structurally_eq(&Document::from_nodes(vec![paragraph("ab"), paragraph("ef")])));
    converge(&doc, &merge, &remove);
}

#[test]
fn split_of_unwrapped_element_is_dropped() {
    let doc = Document::from_nodes(vec![Node::element(
        "blockquote",
        vec![paragraph("a"), paragraph("b"), paragraph("c")],
    )]);
    let split = create(&doc, DeltaRequest::Split { position: pos(&[0, 1]) });
    let unwrap = create(&doc, DeltaRequest::Unwrap { position: pos(&[0]) });
    let merged = converge(&doc, &split, &unwrap);
    let expected = Document::from_nodes(vec![paragraph("a"), paragraph("b"), paragraph("c")]);
    assert!(merged.structurally_eq(&expected));
    converge(&doc, &unwrap, &split);
}

#[test]
fn split_of_removed_element_is_dropped() {
    let doc = Document::from_nodes(vec![paragraph("abcd"), paragraph("x")]);
    let split = create(&doc, DeltaRequest::Split { position: pos(&[0, 2]) });
    let remove = create(
        &doc,
        DeltaRequest::Remove {
            range: Range::new(pos(&[0]), pos(&[1])),
        },
    );
    let rebased = transform(&split, &remove, &context(true));
    assert!(rebased[0].is_no_op());
    let merged = converge(&doc, &split, &remove);
    assert!(merged.structurally_eq(&Document::from_nodes(vec![paragraph("x")])));
}

#[test]
fn wrap_takes_in_the_copy_of_a_split_element() {
    let doc = Document::from_nodes(vec![paragraph("ab"), paragraph("cd")]);
    let wrap = create(
        &doc,
        DeltaRequest::Wrap {
            range: Range::new(pos(&[0]), pos(&[1])),
            wrapper: Element::new("blockquote"),
        },
    );
    let split = create(&doc, DeltaRequest::Split { position: pos(&[0, 1]) });
    let merged = converge(&doc, &wrap, &split);
    let expected = Document::from_nodes(vec![
        Node::element("blockquote", vec![paragraph("a"), paragraph("b")]),
        paragraph("cd"),
    ]);
    assert!(merged.structurally_eq(&expected));
    converge(&doc, &split, &wrap);
}

#[test]
fn merge_of_split_element_undoes_the_split() {
    let doc = Document::from_nodes(vec![paragraph("ab"), paragraph("cd")]);
    let merge = create(&doc, DeltaRequest::Merge { position: pos(&[1]) });
    let split = create(&doc, DeltaRequest::Split { position: pos(&[1, 1]) });
    let merged = converge(&doc, &merge, &split);
    assert!(merged.structurally_eq(&Document::from_nodes(vec![paragraph("abcd")])));
    converge(&doc, &split, &merge);
}

#[test]
fn unwrap_of_merged_element_undoes_the_merge() {
    let doc = Document::from_nodes(vec![
        paragraph("ab"),
        Node::element("blockquote", vec![paragraph("c")]),
    ]);
    let unwrap = create(&doc, DeltaRequest::Unwrap { position: pos(&[1]) });
    let merge = create(&doc, DeltaRequest::Merge { position: pos(&[1]) });
    let merged = converge(&doc, &unwrap, &merge);
    assert!(merged.structurally_eq(&Document::from_nodes(vec![paragraph("ab"), paragraph("c")])));
    converge(&doc, &merge, &unwrap);
}

#[test]
fn repeated_structural_changes_happen_once() {
    let doc = Document::from_nodes(vec![
        paragraph("ab"),
        Node::element("blockquote", vec![paragraph("c")]),
    ]);
    let unwrap = create(&doc, DeltaRequest::Unwrap { position: pos(&[1]) });
    converge(&doc, &unwrap, &unwrap.clone());

    let doc = Document::from_nodes(vec![paragraph("ab"), paragraph("cd")]);
    let merge = create(&doc, DeltaRequest::Merge { position: pos(&[1]) });
    let merged = converge(&doc, &merge, &merge.clone());
    assert!(merged.structurally_eq(&Document::from_nodes(vec![paragraph("abcd")])));
}

#[test]
fn undo_rebasing_skips_structural_special_cases() {
    let doc = Document::from_nodes(vec![paragraph("abcd")]);
    let a = create(&doc, DeltaRequest::Split { position: pos(&[0, 2]) });
    let b = create(&doc, DeltaRequest::Split { position: pos(&[0, 2]) });
    let result = transform(&a, &b, &context(true).same_session(true));
    assert_eq!(result[0].kind(), DeltaKind::Split);
    assert!(!result[0].is_no_op());
}
