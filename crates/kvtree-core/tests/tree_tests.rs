use kvtree_core::{Color, DataType, KvTree, Value, text};

fn sample() -> KvTree {
    text::parse("sample", r#""root" { "a" "1" "b" { "c" "2.5" } }"#).expect("parse")
}

fn child_names(tree: &KvTree) -> Vec<String> {
    tree.root_node().children().map(|c| c.name()).collect()
}

#[test]
fn parsed_scenario_reads_back() {
    let tree = sample();
    let root = tree.root_node();
    assert_eq!(root.name(), "root");
    assert_eq!(root.get_int("a", 0), 1);
    let b = root.find_key("b").expect("b");
    assert!((b.get_float("c", 0.0) - 2.5).abs() < f32::EPSILON);
    assert!((root.get_float("b/c", 0.0) - 2.5).abs() < f32::EPSILON);
}

#[test]
fn elide_splices_children_in_place() {
    let mut tree = sample();
    let root = tree.root();
    let b = tree.root_node().find_key("b").unwrap().id();
    tree.elide_sub_key(root, b).unwrap();
    assert_eq!(child_names(&tree), ["a", "c"]);
    assert!(tree.node(b).is_none(), "elided node is freed");
}

#[test]
fn getters_fall_back_to_defaults() {
    let tree = sample();
    let root = tree.root_node();
    assert_eq!(root.get_int("missing", 7), 7);
    assert_eq!(root.get_string("missing", "dflt"), "dflt");
    assert_eq!(root.get_color("missing", Color::new(1, 2, 3, 4)), Color::new(1, 2, 3, 4));
    assert!(root.get_bool("missing", true));
    assert!(root.is_empty("missing"));
    assert_eq!(root.get_data_type("missing"), DataType::None);
    // kind conversion rather than failure
    assert_eq!(root.get_string("a", ""), "1");
    assert_eq!(root.get_int("b/c", 0), 2);
    assert_eq!(root.get_ptr("a", 99), 99);
}

#[test]
fn setters_create_paths() {
    let mut tree = KvTree::new("cfg");
    let root = tree.root();
    tree.set_int(root, "video/width", 1920).unwrap();
    tree.set_float(root, "video/gamma", 2.2).unwrap();
    tree.set_string(root, "name", "player").unwrap();
    tree.set_uint64(root, "steamid", 0x0110_0001_0000_0001).unwrap();
    tree.set_color(root, "tint", Color::new(255, 128, 0, 255)).unwrap();
    tree.set_bool(root, "fullscreen", true).unwrap();
    tree.set_ptr(root, "handle", 0xdead).unwrap();
    tree.set_wstring(root, "title", "héllo").unwrap();

    let r = tree.root_node();
    assert_eq!(r.get_int("video/width", 0), 1920);
    assert_eq!(r.get_data_type("video/gamma"), DataType::Float);
    assert_eq!(r.get_string("name", ""), "player");
    assert_eq!(r.get_uint64("steamid", 0), 0x0110_0001_0000_0001);
    assert_eq!(r.get_color("tint", Color::default()), Color::new(255, 128, 0, 255));
    assert!(r.get_bool("fullscreen", false));
    assert_eq!(r.get_ptr("handle", 0), 0xdead);
    assert_eq!(r.get_wstring("title", ""), "héllo".encode_utf16().collect::<Vec<_>>());

    // setting again overwrites instead of adding a sibling
    tree.set_int(root, "video/width", 1280).unwrap();
    let video = tree.root_node().find_key("video").unwrap();
    assert_eq!(video.child_count(), 2);
    assert_eq!(video.get_int("width", 0), 1280);
}

#[test]
fn lookups_ignore_case_unless_asked() {
    let mut tree = KvTree::new("root");
    let root = tree.root();
    tree.set_int(root, "MaxPlayers", 16).unwrap();
    let r = tree.root_node();
    assert_eq!(r.get_int("maxplayers", 0), 16);
    assert!(r.find_key_case_sensitive("MaxPlayers").is_some());
    assert!(r.find_key_case_sensitive("maxplayers").is_none());
    assert_eq!(r.find_key("MAXPLAYERS").unwrap().exact_name(), "MaxPlayers");
}

#[test]
fn chain_is_consulted_only_on_miss() {
    let mut tree = KvTree::new("a");
    let a = tree.root();
    tree.set_int(a, "own", 1).unwrap();
    tree.set_int(a, "shared", 10).unwrap();

    let defaults = KvTree::with_pairs(
        "defaults",
        &[("shared", Value::Int(20)), ("fallback", Value::Int(30))],
    );
    let b = tree.copy_from(&defaults, defaults.root()).unwrap();
    tree.chain_key_values(a, Some(b)).unwrap();

    let r = tree.root_node();
    assert_eq!(r.get_int("fallback", 0), 30);
    assert_eq!(r.get_int("shared", 0), 10);
    assert_eq!(r.get_int("own", 0), 1);
    assert_eq!(r.chain().map(|c| c.name()).as_deref(), Some("defaults"));

    tree.chain_key_values(a, None).unwrap();
    assert_eq!(tree.root_node().get_int("fallback", -1), -1);
}

#[test]
fn chain_into_another_tree_sees_later_edits() {
    let mut defaults = KvTree::with_pairs("defaults", &[("shared", Value::Int(20))]);
    let d = defaults.root();
    let mut tree = KvTree::new("a");
    let a = tree.root();
    tree.set_int(a, "own", 1).unwrap();
    tree.chain_to_tree(a, &defaults, d).unwrap();
    assert_eq!(tree.chain_link(a).map(|l| l.tree), Some(defaults.tree_id()));

    defaults.set_int(d, "shared", 21).unwrap();
    defaults.set_int(d, "late/x", 3).unwrap();

    let linked = [&defaults];
    let view = tree.root_node().with_linked(&linked);
    assert_eq!(view.get_int("own", 0), 1);
    assert_eq!(view.get_int("shared", 0), 21);
    assert_eq!(view.get_int("late/x", 0), 3);
    assert_eq!(view.chain().map(|c| c.name()).as_deref(), Some("defaults"));

    // without the other tree in view the chain is not followed
    assert_eq!(tree.root_node().get_int("shared", -1), -1);
    assert!(tree.root_node().chain().is_none());
}

#[test]
fn chain_into_another_tree_is_weak() {
    let mut defaults = KvTree::new("defaults");
    let section = defaults.create_key(defaults.root(), "section").unwrap();
    defaults.set_int(section, "v", 5).unwrap();

    let mut tree = KvTree::new("a");
    let a = tree.root();
    tree.chain_to_tree(a, &defaults, section).unwrap();
    assert_eq!(tree.root_node().with_linked(&[&defaults]).get_int("v", 0), 5);

    defaults.delete(section).unwrap();
    assert_eq!(tree.root_node().with_linked(&[&defaults]).get_int("v", -1), -1);
    assert!(tree.chain_to_tree(a, &defaults, section).is_err());

    let other = KvTree::new("unrelated");
    assert_eq!(tree.root_node().with_linked(&[&other]).get_int("v", -1), -1);
}

#[test]
fn cyclic_chain_terminates() {
    let mut tree = KvTree::new("a");
    let a = tree.root();
    let b = tree.create_node("b");
    tree.chain_key_values(a, Some(b)).unwrap();
    tree.chain_key_values(b, Some(a)).unwrap();
    assert_eq!(tree.root_node().get_int("nowhere", 5), 5);
}

#[test]
fn find_or_create_never_writes_through_chain() {
    let mut tree = KvTree::new("a");
    let a = tree.root();
    let b = tree.create_node("b");
    tree.set_int(b, "x", 1).unwrap();
    tree.chain_key_values(a, Some(b)).unwrap();
    tree.set_int(a, "x", 2).unwrap();
    assert_eq!(tree.node(b).unwrap().get_int("x", 0), 1);
    assert_eq!(tree.root_node().get_int("x", 0), 2);
}

#[test]
fn structural_edits() {
    let mut tree = KvTree::new("root");
    let root = tree.root();
    let x = tree.create_key(root, "x").unwrap();
    let z = tree.create_key(root, "z").unwrap();
    let y = tree.create_node("y");
    tree.insert_sub_key(root, 1, y).unwrap();
    assert_eq!(child_names(&tree), ["x", "y", "z"]);

    assert!(tree.add_sub_key(root, y).is_err(), "already attached");
    assert!(tree.remove_sub_key(root, y));
    assert!(!tree.contains_sub_key(root, y));
    assert!(tree.node(y).is_some(), "removed node survives");
    assert!(!tree.remove_sub_key(root, y));

    tree.swap_sub_key(root, x, y).unwrap();
    assert_eq!(child_names(&tree), ["y", "z"]);
    tree.add_sub_key(root, x).unwrap();
    assert_eq!(child_names(&tree), ["y", "z", "x"]);

    let peer = tree.create_peer_key(z, "z2").unwrap();
    assert_eq!(child_names(&tree), ["y", "z", "z2", "x"]);
    assert_eq!(tree.node(peer).unwrap().parent().unwrap().id(), root);

    tree.delete(z).unwrap();
    assert_eq!(child_names(&tree), ["y", "z2", "x"]);
    assert!(tree.node(z).is_none());
    assert!(tree.set_int(z, "", 1).is_err(), "stale handle");

    tree.clear(root).unwrap();
    assert!(tree.root_node().is_empty_node());
    assert!(tree.delete(root).is_err(), "only root stays");
}

#[test]
fn freed_slots_do_not_alias_old_handles() {
    let mut tree = KvTree::new("root");
    let root = tree.root();
    let old = tree.create_key(root, "old").unwrap();
    tree.delete(old).unwrap();
    let new = tree.create_key(root, "new").unwrap();
    assert_ne!(old, new);
    assert!(tree.node(old).is_none());
    assert_eq!(tree.node(new).unwrap().name(), "new");
}

#[test]
fn new_keys_are_numbered() {
    let mut tree = KvTree::new("list");
    let root = tree.root();
    let first = tree.create_new_key(root).unwrap();
    assert_eq!(tree.node(first).unwrap().name(), "1");
    tree.create_key(root, "7").unwrap();
    let next = tree.create_new_key(root).unwrap();
    assert_eq!(tree.node(next).unwrap().name(), "8");
}

#[test]
fn iteration_helpers() {
    let tree = text::parse(
        "iter",
        r#""r" { "v1" "1" "blk" { } "v2" "x" "n" 3.5 "blk2" { "k" "v" } }"#,
    )
    .unwrap();
    let r = tree.root_node();

    let mut values = Vec::new();
    let mut cur = r.first_value();
    while let Some(n) = cur {
        values.push(n.name());
        cur = n.next_value();
    }
    assert_eq!(values, ["v1", "v2", "n"]);

    let mut blocks = Vec::new();
    let mut cur = r.first_true_sub_key();
    while let Some(n) = cur {
        blocks.push(n.name());
        cur = n.next_true_sub_key();
    }
    assert_eq!(blocks, ["blk", "blk2"]);

    let f = r.first_of_data_type(DataType::Float).unwrap();
    assert_eq!(f.name(), "n");
    assert!(f.next_of_data_type(DataType::Float).is_none());
    assert_eq!(r.find_last_sub_key().unwrap().name(), "blk2");
    assert_eq!(r.first_sub_key().unwrap().next_key().unwrap().name(), "blk");
}

#[test]
fn copies_are_deep_and_independent() {
    let tree = sample();
    let mut copy = tree.make_copy(tree.root()).unwrap();
    assert!(tree.tree_eq(&copy));

    let croot = copy.root();
    copy.set_float(croot, "b/c", 9.0).unwrap();
    assert!(!tree.tree_eq(&copy));
    assert!((tree.root_node().get_float("b/c", 0.0) - 2.5).abs() < f32::EPSILON);

    let mut dest = KvTree::new("dest");
    let droot = dest.root();
    tree.copy_subkeys(tree.root(), &mut dest, droot).unwrap();
    assert_eq!(dest.root_node().child_count(), 2);
    assert!(!dest.is_equal(droot, &tree, tree.root()), "names differ");
    let b = tree.root_node().find_key("b").unwrap().id();
    let db = dest.root_node().find_key("b").unwrap().id();
    assert!(dest.is_equal(db, &tree, b));

    let mut same = sample();
    let sroot = same.root();
    let dup = same.duplicate(b).unwrap();
    same.add_sub_key(sroot, dup).unwrap();
    assert_eq!(same.root_node().child_count(), 3);
}

#[test]
fn resolution_keys_replace_base_keys() {
    let mut tree = text::parse(
        "res",
        r#""r" { "font" "small" "font_hidef" "large" "inner" { "size" 10 "size_HIDEF" 20 } }"#,
    )
    .unwrap();
    let root = tree.root();
    assert!(tree.process_resolution_keys(root, "_hidef"));
    let r = tree.root_node();
    assert_eq!(r.get_string("font", ""), "large");
    assert!(r.find_key("font_hidef").is_none());
    assert_eq!(r.get_int("inner/size", 0), 20);
    assert_eq!(r.find_key("inner").unwrap().child_count(), 1);
}

#[test]
fn from_string_reads_a_bare_body() {
    let tree = text::from_string("opts", "width 640 height 480 title \"my game\"").unwrap();
    let r = tree.root_node();
    assert_eq!(r.name(), "opts");
    assert_eq!(r.get_int("width", 0), 640);
    assert_eq!(r.get_int("height", 0), 480);
    assert_eq!(r.get_string("title", ""), "my game");
}
