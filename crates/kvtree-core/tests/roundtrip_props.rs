use kvtree_core::{BinaryFormat, Color, KvTree, NodeId, Value, decode, encode, text, to_text};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Shape {
    Leaf(String, Value),
    Block(String, Option<Value>, Vec<Shape>),
}

fn name() -> impl Strategy<Value = String> {
    "[a-zA-Z_][a-zA-Z0-9_ .]{0,8}"
}

/// Values the text format reproduces with their kind intact.
fn text_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(Value::Int),
        any::<f32>().prop_map(Value::Float),
        any::<u64>().prop_map(Value::Uint64),
        "[a-zA-Z0-9 ./_-]{1,12}".prop_map(Value::String),
    ]
}

fn binary_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        text_value(),
        any::<[u8; 4]>().prop_map(|b| Value::Color(Color::from_bytes(b))),
        any::<usize>().prop_map(Value::Ptr),
        r"[^\x00]{0,8}".prop_map(Value::WString),
        r"[^\x00]{0,8}".prop_map(Value::String),
    ]
}

fn shape(value: BoxedStrategy<Value>) -> impl Strategy<Value = Vec<Shape>> {
    let leaf = (name(), value.clone()).prop_map(|(n, v)| Shape::Leaf(n, v));
    let node = leaf.prop_recursive(4, 48, 6, move |inner| {
        (name(), prop::option::of(value.clone()), prop::collection::vec(inner, 0..6))
            .prop_map(|(n, v, kids)| Shape::Block(n, v, kids))
    });
    prop::collection::vec(node, 0..8)
}

fn build(tree: &mut KvTree, parent: NodeId, items: &[Shape]) {
    for item in items {
        match item {
            Shape::Leaf(n, v) => {
                let id = tree.create_key(parent, n).unwrap();
                tree.set_value(id, v.clone()).unwrap();
            }
            Shape::Block(n, v, kids) => {
                let id = tree.create_key(parent, n).unwrap();
                if let Some(v) = v {
                    tree.set_value(id, v.clone()).unwrap();
                }
                build(tree, id, kids);
            }
        }
    }
}

fn tree_of(root: &str, items: &[Shape]) -> KvTree {
    let mut tree = KvTree::new(root);
    let id = tree.root();
    build(&mut tree, id, items);
    tree
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_text_round_trip(root in name(), items in shape(text_value().boxed())) {
        let tree = tree_of(&root, &items);
        let written = to_text(&tree).unwrap();
        let back = text::parse("prop", &written).unwrap();
        prop_assert!(tree.tree_eq(&back), "{}", written);
    }

    #[test]
    fn prop_binary_round_trip(root in name(), items in shape(binary_value().boxed())) {
        let tree = tree_of(&root, &items);
        for format in [BinaryFormat::Direct, BinaryFormat::Pooled] {
            let back = decode(&encode(&tree, format).unwrap()).unwrap();
            prop_assert!(tree.tree_eq(&back), "{:?}", format);
        }
    }

    #[test]
    fn prop_copy_is_equal(items in shape(binary_value().boxed())) {
        let tree = tree_of("copy", &items);
        let copy = tree.make_copy(tree.root()).unwrap();
        prop_assert!(tree.tree_eq(&copy));
    }
}
