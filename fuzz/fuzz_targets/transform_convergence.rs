#![no_main]

//! Two concurrent deltas applied in both orders, each rebased past the
//! other, must leave both replicas with the same tree.

use libfuzzer_sys::fuzz_target;
use tree_ot::{
    Delta, DeltaRequest, Document, Node, Position, Range, TransformContext, transform_delta_sets,
};

const TEXTS: [&str; 3] = ["abcdef", "gh", "ijkl"];

fn document() -> Document {
    Document::from_nodes(
        TEXTS
            .iter()
            .map(|text| Node::element("p", vec![Node::text(*text)]))
            .collect(),
    )
}

fn pos(path: &[usize]) -> Position {
    Position::new("main", path.to_vec())
}

/// Reads one request from four bytes.
fn request(bytes: &[u8]) -> DeltaRequest {
    let paragraph = bytes[1] as usize % TEXTS.len();
    let len = TEXTS[paragraph].len();
    let offset = bytes[2] as usize % (len + 1);
    let extent = 1 + bytes[3] as usize % len;
    match bytes[0] % 6 {
        0 => DeltaRequest::Insert {
            position: pos(&[paragraph, offset]),
            nodes: vec![Node::text("X")],
        },
        1 => DeltaRequest::Remove {
            range: Range::new(pos(&[paragraph, offset]), pos(&[paragraph, offset + extent])),
        },
        2 => DeltaRequest::Split {
            position: pos(&[paragraph, offset]),
        },
        3 => DeltaRequest::Merge {
            position: pos(&[1 + paragraph % (TEXTS.len() - 1)]),
        },
        4 => DeltaRequest::Rename {
            position: pos(&[paragraph]),
            name: format!("h{}", bytes[3] % 3),
        },
        _ => DeltaRequest::Attribute {
            range: Range::new(pos(&[paragraph, offset]), pos(&[paragraph, offset + extent])),
            key: "bold".into(),
            value: Some((bytes[3] % 2 == 0).into()),
        },
    }
}

fn replay(document: &Document, first: &Delta, then: &[Delta]) -> Option<Document> {
    let mut document = document.clone();
    document.apply_delta(first).ok()?;
    for delta in then {
        if let Err(err) = document.apply_delta(delta) {
            panic!("rebased delta does not apply: {err}\n{delta:?}");
        }
    }
    Some(document)
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }
    let document = document();
    let (Ok(a), Ok(b)) = (
        Delta::create(&document, request(&data[..4])),
        Delta::create(&document, request(&data[4..8])),
    ) else {
        return;
    };

    let context = TransformContext::for_document(&document, true);
    let (a_after_b, b_after_a) =
        transform_delta_sets(std::slice::from_ref(&a), std::slice::from_ref(&b), &context);
    let (Some(a_first), Some(b_first)) = (
        replay(&document, &a, &b_after_a),
        replay(&document, &b, &a_after_b),
    ) else {
        return;
    };
    assert!(
        a_first.structurally_eq(&b_first),
        "replicas diverged\na: {a:?}\nb: {b:?}\n{a_first:#?}\n{b_first:#?}"
    );
});
