// Own test binary: backend selection must happen before anything interns.
use kvtree_core::symbol::{self, Backend, SymbolError};
use kvtree_core::{KvTree, text};

#[test]
fn growable_backend_selected_once() {
    assert_eq!(symbol::select_backend(Backend::Growable), Ok(()));
    assert_eq!(
        symbol::select_backend(Backend::Fixed { capacity: 1024 }),
        Err(SymbolError::BackendLocked)
    );
    assert_eq!(symbol::global().backend(), Backend::Growable);

    let mut tree = KvTree::new("root");
    let root = tree.root();
    for i in 0..2_000 {
        tree.set_int(root, &format!("key_{i}"), i).unwrap();
    }
    assert_eq!(tree.root_node().get_int("key_1999", -1), 1999);

    let parsed = text::parse("t", "\"cfg\" { \"a\" \"1\" }").unwrap();
    assert_eq!(parsed.root_node().get_string("a", ""), "1");
}
