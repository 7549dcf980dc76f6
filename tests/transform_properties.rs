use proptest::prelude::*;
use tree_ot::{
    DEFAULT_GRAVEYARD, Delta, DeltaRequest, Document, Element, Node, Position, Range,
    TransformContext, transform, transform_delta_sets,
};
use tree_ot_naive_oracle::{self as oracle, TextEdit};

fn pos(offset: usize) -> Position {
    Position::new("main", vec![0, offset])
}

fn to_delta(edit: &TextEdit) -> Delta {
    match edit {
        TextEdit::Insert { at, text } => {
            Delta::insert(pos(*at), vec![Node::text(text.as_str())], 0).unwrap()
        }
        TextEdit::Delete { at, len } => {
            Delta::remove(Range::new(pos(*at), pos(at + len)), DEFAULT_GRAVEYARD, 0).unwrap()
        }
    }
}

fn text_of(document: &Document) -> String {
    document
        .element_at(&Position::new("main", vec![0]))
        .unwrap()
        .children
        .iter()
        .filter_map(|node| match node {
            Node::Text(text) => Some(text.data.as_str()),
            Node::Element(_) => None,
        })
        .collect()
}

fn run(base: &str, first: &Delta, then: &Delta, context: &TransformContext) -> String {
    let mut document = Document::from_nodes(vec![Node::element("p", vec![Node::text(base)])]);
    document.apply_delta(first).unwrap();
    for delta in transform(then, first, context) {
        document.apply_delta(&delta).unwrap();
    }
    text_of(&document)
}

fn edit(len: usize) -> impl Strategy<Value = TextEdit> {
    prop_oneof![
        (0..=len, "[X-Z]{1,3}").prop_map(|(at, text)| TextEdit::Insert { at, text }),
        (0..len)
            .prop_flat_map(move |at| (Just(at), 1..=len - at))
            .prop_map(|(at, len)| TextEdit::Delete { at, len }),
    ]
}

fn scenario() -> impl Strategy<Value = (String, TextEdit, TextEdit)> {
    "[a-e]{1,10}".prop_flat_map(|base| {
        let len = base.chars().count();
        (Just(base), edit(len), edit(len))
    })
}

/// `main` with paragraphs at the top level and inside a blockquote.
fn nested_document() -> Document {
    let paragraph = |text: &str| Node::element("p", vec![Node::text(text)]);
    Document::from_nodes(vec![
        paragraph("abc"),
        Node::element("blockquote", vec![paragraph("de"), paragraph("fgh")]),
        paragraph("ij"),
    ])
}

/// Paths and lengths of the elements that hold only text.
fn text_blocks(document: &Document) -> Vec<(Vec<usize>, usize)> {
    fn walk(element: &Element, path: &mut Vec<usize>, blocks: &mut Vec<(Vec<usize>, usize)>) {
        let mut offset = 0;
        let mut has_elements = false;
        for node in element.children.iter() {
            if let Node::Element(child) = node {
                has_elements = true;
                path.push(offset);
                walk(child, path, blocks);
                path.pop();
            }
            offset += node.offset_size();
        }
        if !has_elements && !path.is_empty() {
            blocks.push((path.clone(), element.children.max_offset()));
        }
    }
    let mut blocks = Vec::new();
    if let Some(root) = document.root("main") {
        walk(root, &mut Vec::new(), &mut blocks);
    }
    blocks
}

type Choice = (u8, u8, u8, u8);

fn at(path: &[usize], offset: usize) -> Position {
    let mut path = path.to_vec();
    path.push(offset);
    Position::new("main", path)
}

/// Reads one edit of a text block from `choice`.
fn request(document: &Document, (kind, block, offset, extent): Choice) -> Option<DeltaRequest> {
    let blocks = text_blocks(document);
    let (path, len) = &blocks[block as usize % blocks.len()];
    let offset = offset as usize % (len + 1);
    match kind % 4 {
        0 => Some(DeltaRequest::Insert {
            position: at(path, offset),
            nodes: vec![Node::text("XY")],
        }),
        1 => {
            let start = offset.min(len.checked_sub(1)?);
            let end = start + 1 + extent as usize % (len - start);
            Some(DeltaRequest::Remove {
                range: Range::new(at(path, start), at(path, end)),
            })
        }
        2 => Some(DeltaRequest::Split {
            position: at(path, offset),
        }),
        _ => Some(DeltaRequest::Rename {
            position: Position::new("main", path.clone()),
            name: format!("h{}", extent % 3),
        }),
    }
}

/// Deltas made one after another by a single replica.
fn local_edits(document: &Document, choices: &[Choice]) -> Vec<Delta> {
    let mut local = document.clone();
    let mut deltas = Vec::new();
    for choice in choices {
        let Some(request) = request(&local, *choice) else {
            continue;
        };
        let Ok(delta) = Delta::create(&local, request) else {
            continue;
        };
        local.apply_delta(&delta).unwrap();
        deltas.push(delta);
    }
    deltas
}

fn replay(document: &Document, first: &[Delta], then: &[Delta]) -> Document {
    let mut document = document.clone();
    for delta in first.iter().chain(then) {
        if let Err(err) = document.apply_delta(delta) {
            panic!("delta does not apply: {err}\n{delta:?}");
        }
    }
    document
}

fn choices() -> impl Strategy<Value = Vec<Choice>> {
    prop::collection::vec(any::<Choice>(), 2..=3)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(proptest_config::cases()))]

    #[test]
    fn concurrent_text_edits_match_the_oracle((base, a, b) in scenario()) {
        let strong = TransformContext::new(true, DEFAULT_GRAVEYARD);
        let weak = strong.flipped();
        let (a_delta, b_delta) = (to_delta(&a), to_delta(&b));

        let expected = oracle::merge(&base, &a, &b, true);
        prop_assert_eq!(run(&base, &a_delta, &b_delta, &weak), expected.clone());
        prop_assert_eq!(run(&base, &b_delta, &a_delta, &strong), expected);
    }

    #[test]
    fn concurrent_edit_sequences_converge(a in choices(), b in choices()) {
        let document = nested_document();
        let a = local_edits(&document, &a);
        let b = local_edits(&document, &b);
        prop_assume!(a.len() >= 2 && b.len() >= 2);

        let context = TransformContext::for_document(&document, true);
        let (a_after_b, b_after_a) = transform_delta_sets(&a, &b, &context);
        let a_first = replay(&document, &a, &b_after_a);
        let b_first = replay(&document, &b, &a_after_b);
        prop_assert!(
            a_first.structurally_eq(&b_first),
            "replicas diverged\n{:#?}\n{:#?}",
            a_first,
            b_first
        );
    }
}
