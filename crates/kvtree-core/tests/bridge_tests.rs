use std::fs;

use kvtree_core::archive::{ZipFileSystem, pack};
use kvtree_core::json::{self, JsonOpts};
use kvtree_core::{
    Color, DirFileSystem, Error, FileSystem, KvTree, LogDump, MemoryFileSystem, TextDump, Value,
    dump, dump_tree, text,
};

fn dump_sample() -> KvTree {
    text::parse(
        "d",
        r#""root" { "a" 1 "blk" { "x" "y" } "f" 2.5 "empty" { } }"#,
    )
    .unwrap()
}

#[test]
fn text_dump_writes_values_before_blocks() {
    let tree = dump_sample();
    let mut out = TextDump::default();
    dump_tree(&tree, &mut out).unwrap();
    let expected = "\
\"root\"
{
  \"a\" 1
  \"f\" 2.500000
  \"blk\"
  {
    \"x\" \"y\"
  }
  \"empty\"
  {
  }
}
";
    assert_eq!(out.out, expected);
}

#[test]
fn log_dump_counts_lines() {
    let tree = dump_sample();
    let mut log = LogDump::default();
    dump(tree.root_node(), &mut log, 0).unwrap();
    // root, a, f, blk, x, blk close, empty, empty close, root close
    assert_eq!(log.lines_written(), 9);
}

fn typed() -> KvTree {
    let mut tree = KvTree::new("typed");
    let root = tree.root();
    tree.set_int(root, "i", -5).unwrap();
    tree.set_float(root, "f", -0.25).unwrap();
    tree.set_float(root, "nan", f32::NAN).unwrap();
    tree.set_uint64(root, "u", u64::MAX).unwrap();
    tree.set_color(root, "c", Color::new(1, 2, 3, 4)).unwrap();
    tree.set_ptr(root, "p", 0xbeef).unwrap();
    tree.set_string(root, "s", "hello").unwrap();
    tree.set_wstring(root, "w", "wide").unwrap();
    tree.set_int(root, "deep/er", 1).unwrap();
    tree.create_key(root, "empty").unwrap();
    tree
}

#[test]
fn json_keeps_every_kind() {
    let tree = typed();
    let text = json::to_json(&tree, JsonOpts::default()).unwrap();
    let back = json::from_json("typed.json", &text).unwrap();
    assert!(tree.tree_eq(&back), "{text}");
    assert!(back.root_node().get_float("nan", 0.0).is_nan());
}

#[test]
fn json_keeps_order_and_repeats() {
    let tree = text::parse("r", "r { b 1 a 2 b 3 } peer { x 1 }").unwrap();
    let v = json::to_json_value(&tree, JsonOpts::default());
    assert_eq!(v.as_array().unwrap().len(), 2);
    let back = json::from_json_value("r", &v).unwrap();
    assert!(tree.tree_eq(&back));
}

#[test]
fn json_depth_limit_marks_truncation() {
    let tree = text::parse("r", "r { a { b { c 1 } } }").unwrap();
    let v = json::to_json_value(&tree, JsonOpts { max_depth: 1 });
    let a = &v[0]["$children"][0];
    assert_eq!(a["$key"], "a");
    assert_eq!(a["$truncated"], 1);
    assert!(a.get("$children").is_none());
}

#[test]
fn json_shape_errors_name_the_source() {
    for bad in [
        r#"[{"$children": []}]"#,
        r#"[{"$key": "r", "$type": "int", "$value": "x"}]"#,
        r#"[{"$key": "r", "$type": "mystery", "$value": 1}]"#,
        r#"[{"$key": "r", "$children": {}}]"#,
        r#"[{"$key": "r", "$type": "color", "$value": [1, 2, 3]}]"#,
    ] {
        match json::from_json("bad.json", bad) {
            Err(Error::Parse { source_name, .. }) => assert_eq!(source_name, "bad.json"),
            other => panic!("{bad}: {other:?}"),
        }
    }
    assert!(matches!(json::from_json("x", "{"), Err(Error::Json(_))));
}

#[test]
fn single_json_object_is_accepted() {
    let src = r#"{"$key": "cfg", "$children": [{"$key": "a", "$type": "string", "$value": "1"}]}"#;
    let tree = json::from_json("one", src).unwrap();
    assert_eq!(tree.root_node().name(), "cfg");
    assert_eq!(tree.root_node().get_int("a", 0), 1);
}

#[test]
fn directory_file_system() {
    let dir = tempfile::tempdir().unwrap();
    let dfs = DirFileSystem::new(dir.path());
    dfs.save("cfg/main.txt", b"\"main\" { #include \"part.txt\" \"b\" 2 }").unwrap();
    dfs.save("cfg/part.txt", b"\"part\" { \"a\" 1 }").unwrap();
    dfs.save("notes.md", b"ignored").unwrap();

    assert_eq!(dfs.list("txt"), ["cfg/main.txt", "cfg/part.txt"]);
    assert_eq!(dfs.list("").len(), 3);

    let tree = text::load(&dfs, "cfg/main.txt").unwrap();
    let names: Vec<String> = tree.root_node().children().map(|c| c.name()).collect();
    assert_eq!(names, ["a", "b"]);

    assert!(matches!(dfs.load("cfg/missing.txt"), Err(Error::NotFound(_))));
    assert!(dfs.load("../outside.txt").is_err());
    assert!(dfs.save("cfg/../../x.txt", b"").is_err());
}

#[test]
fn zip_archive_serves_includes() {
    let dir = tempfile::tempdir().unwrap();
    let res = DirFileSystem::new(dir.path().join("res"));
    res.save("main.txt", b"\"main\" { #include \"sub/part.txt\" }").unwrap();
    res.save("sub/part.txt", b"\"part\" { \"k\" \"v\" }").unwrap();

    let names = res.list("");
    assert_eq!(names, ["main.txt", "sub/part.txt"]);
    let bytes = pack(&res, &names).unwrap();
    let zip_path = dir.path().join("res.zip");
    fs::write(&zip_path, &bytes).unwrap();

    let zfs = ZipFileSystem::open(&zip_path).unwrap();
    assert_eq!(zfs.list(), ["main.txt", "sub/part.txt"]);
    let tree = text::load(&zfs, "main.txt").unwrap();
    assert_eq!(tree.root_node().get_string("k", ""), "v");
    assert!(matches!(zfs.load("nope.txt"), Err(Error::NotFound(_))));
    assert!(zfs.save("main.txt", b"").is_err());

    let mem = ZipFileSystem::from_bytes(bytes).unwrap();
    assert_eq!(mem.load("sub/part.txt").unwrap(), b"\"part\" { \"k\" \"v\" }");
}

#[test]
fn pack_reads_through_any_file_system() {
    let mem = MemoryFileSystem::new();
    mem.insert("b.txt", "\"b\" { }");
    mem.insert("a.txt", "\"a\" { \"x\" 1 }");
    let bytes = pack(&mem, &["b.txt".to_string(), "a.txt".to_string()]).unwrap();
    let zfs = ZipFileSystem::from_bytes(bytes).unwrap();
    assert_eq!(zfs.list(), ["a.txt", "b.txt"]);
    assert_eq!(text::load(&zfs, "a.txt").unwrap().root_node().get_int("x", 0), 1);

    let missing = pack(&mem, &["gone.txt".to_string()]);
    assert!(matches!(missing, Err(Error::NotFound(_))));
}

#[test]
fn with_pairs_builds_leaf_children() {
    let tree = KvTree::with_pairs("r", &[("a", Value::Int(1)), ("b", Value::String("x".into()))]);
    let mut out = TextDump::default();
    dump_tree(&tree, &mut out).unwrap();
    assert!(out.out.contains("  \"b\" \"x\"\n"));
}
