use hindsight_scope::ScopeTree;
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn digest_settles_watcher_cascades() {
    let tree = ScopeTree::new();
    let root = tree.root();
    tree.assign(root, "celsius", json!(0)).unwrap();
    tree.assign(root, "fahrenheit", json!(32)).unwrap();

    // A watcher that derives one value from another forces a second pass.
    let _celsius = tree
        .observe(
            root,
            "celsius",
            Rc::new(|tree, scope, new, _| {
                let c = new.as_f64().unwrap_or(0.0);
                tree.assign(scope, "fahrenheit", json!(c * 9.0 / 5.0 + 32.0))
                    .unwrap();
            }),
        )
        .unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let _fahrenheit = tree
        .observe(
            root,
            "fahrenheit",
            Rc::new(move |_, _, new, _| log.borrow_mut().push(new.clone())),
        )
        .unwrap();

    tree.digest();
    tree.assign(root, "celsius", json!(100)).unwrap();
    tree.digest();

    assert_eq!(tree.resolve(root, "fahrenheit").unwrap(), Some(json!(212.0)));
    assert_eq!(seen.borrow().last().unwrap(), &json!(212.0));
}

#[test]
fn watchers_fire_in_installation_order() {
    let tree = ScopeTree::new();
    let root = tree.root();
    tree.assign(root, "n", json!(0)).unwrap();

    let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
    for name in ["first", "second", "third"] {
        let order = order.clone();
        let _ = tree
            .observe(
                root,
                "n",
                Rc::new(move |_, _, _, _| order.borrow_mut().push(name)),
            )
            .unwrap();
    }
    tree.digest();
    assert_eq!(&*order.borrow(), &["first", "second", "third"]);
}

#[test]
fn watches_installed_mid_digest_capture_their_baseline() {
    let tree = ScopeTree::new();
    let root = tree.root();
    tree.assign(root, "a", json!(1)).unwrap();
    tree.assign(root, "b", json!(2)).unwrap();

    let baselines = Rc::new(RefCell::new(Vec::new()));
    let installed = Rc::new(RefCell::new(false));
    let log = baselines.clone();
    let _ = tree
        .observe(
            root,
            "a",
            Rc::new(move |tree, scope, _, _| {
                if *installed.borrow() {
                    return;
                }
                *installed.borrow_mut() = true;
                let log = log.clone();
                let _ = tree.observe(
                    scope,
                    "b",
                    Rc::new(move |_, _, new, old| {
                        log.borrow_mut().push((new.clone(), old.clone()));
                    }),
                );
            }),
        )
        .unwrap();

    tree.digest();
    assert_eq!(&*baselines.borrow(), &[(json!(2), json!(2))]);
}
