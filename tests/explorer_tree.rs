// Explorer tree behavior - lazy loading, identity-preserving reloads and
// overlapping refreshes

mod common;

use common::fakes::{wait_until, within, Gated, Scripted};
use common::fixtures::storage_account;
use common::tracing::init_tracing_from_env;
use explorer::services::cloud::{StorageAccount, StorageModule};
use explorer::view::explorer_tree::{
    ChildLoader, ExplorerTree, GroupId, LoadError, LoadOptions, LoadState, Node, NodeId,
    StaticView, TreeEvent,
};
use std::sync::mpsc;
use tokio::runtime::Handle;

fn tree() -> ExplorerTree {
    init_tracing_from_env();
    ExplorerTree::new(Handle::current())
}

/// Tree that lets superseded fetches run to completion
fn tree_without_abort() -> ExplorerTree {
    init_tracing_from_env();
    ExplorerTree::with_options(
        Handle::current(),
        LoadOptions {
            timeout: None,
            abort_superseded: false,
        },
        None,
    )
}

fn leaf(label: &str) -> Node<String> {
    Node::new(label.to_string()).view(StaticView::new(label, None))
}

fn labels(tree: &ExplorerTree, ids: &[NodeId]) -> Vec<String> {
    ids.iter()
        .map(|&id| tree.view(id).unwrap().label())
        .collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_storage_accounts_reload_reuses_kept_nodes() {
    let tree = tree();
    let accounts = Scripted::new(vec![
        storage_account("A", "s1"),
        storage_account("B", "s1"),
    ]);
    let containers = Scripted::new(strings(&["logs", "images"]));
    let containers_fetch = std::sync::Arc::new(containers.fetch::<StorageAccount>());

    let root = tree.insert_root(
        Node::new(StorageModule)
            .view(StaticView::new("Storage Account", None))
            .add_loader(ChildLoader::keyed(
                accounts.fetch(),
                StorageAccount::id,
                move |account: StorageAccount, _| {
                    let fetch = std::sync::Arc::clone(&containers_fetch);
                    let label = account.name.clone();
                    Node::new(account)
                        .view(StaticView::new(label, None))
                        .add_children(move |a| fetch(a), |name: String, _| leaf(&name))
                },
            )),
    );

    tree.get_children(root, None);
    tree.wait_idle().await;
    let first = tree.get_children(root, None);
    assert_eq!(labels(&tree, &first), vec!["A", "B"]);
    let (a, b) = (first[0], first[1]);

    // Expand B so it has grandchildren that must survive the reload
    tree.get_children(b, None);
    tree.wait_idle().await;
    let b_children = tree.get_children(b, None);
    assert_eq!(labels(&tree, &b_children), vec!["logs", "images"]);

    accounts.set(vec![storage_account("B", "s1"), storage_account("C", "s1")]);
    tree.refresh_children(root, None);
    tree.wait_idle().await;

    let second = tree.get_children(root, None);
    assert_eq!(labels(&tree, &second), vec!["B", "C"]);
    assert_eq!(second[0], b, "B keeps its node");
    assert!(!tree.contains(a), "A was removed");
    assert!(b_children.iter().all(|&c| tree.parent(c) == Some(b)));
    assert_eq!(tree.get_children(b, None), b_children, "B's subtree survives");
    assert_eq!(tree.load_state(b, GroupId(0)), Some(LoadState::Loaded));
    assert_eq!(tree.parent(second[1]), Some(root));
    assert_eq!(containers.calls(), 1, "B was not reloaded");
    // root + B + C + B's two containers
    assert_eq!(tree.node_count(), 5);
}

#[tokio::test]
async fn test_removed_node_takes_its_subtree() {
    let tree = tree();
    let items = Scripted::new(strings(&["keep", "drop"]));
    let grandchildren = Scripted::new(strings(&["x", "y"]));
    let fetch = std::sync::Arc::new(grandchildren.fetch::<String>());

    let root = tree.insert_root(Node::new(()).add_children(items.fetch(), move |item: String, _| {
        let fetch = std::sync::Arc::clone(&fetch);
        leaf(&item).add_children(move |owner| fetch(owner), |name: String, _| leaf(&name))
    }));

    tree.refresh_children(root, None);
    tree.wait_idle().await;
    let dropped = tree.get_children(root, None)[1];
    tree.refresh_children(dropped, None);
    tree.wait_idle().await;
    let orphans = tree.get_children(dropped, None);
    assert_eq!(orphans.len(), 2);

    items.set(strings(&["keep"]));
    tree.refresh_children(root, None);
    tree.wait_idle().await;

    assert!(!tree.contains(dropped));
    assert!(orphans.iter().all(|&id| !tree.contains(id)));
    assert!(tree.get_children(dropped, None).is_empty());
    assert_eq!(tree.node_count(), 2);
}

#[tokio::test]
async fn test_files_and_logs_fail_independently() {
    let tree = tree();
    let files = Scripted::new(strings(&["index.html", "app.js"]));
    let logs = Scripted::new(Vec::<String>::new());
    logs.fail("listing /LogFiles: 403 Forbidden");

    let app = tree.insert_root(
        leaf("shop")
            .add_loader(ChildLoader::new(files.fetch(), |f: String, _| leaf(&f)).named("files"))
            .add_loader(ChildLoader::new(logs.fetch(), |f: String, _| leaf(&f)).named("logs")),
    );

    assert!(tree.get_children(app, None).is_empty());
    tree.wait_idle().await;

    let files_group = tree.group_by_name(app, "files").unwrap();
    let logs_group = tree.group_by_name(app, "logs").unwrap();
    assert_eq!(tree.load_state(app, files_group), Some(LoadState::Loaded));
    assert_eq!(
        tree.load_state(app, logs_group),
        Some(LoadState::Failed(LoadError::Fetch(
            "listing /LogFiles: 403 Forbidden".to_string()
        )))
    );

    let children = tree.get_children(app, None);
    assert_eq!(labels(&tree, &children), vec!["index.html", "app.js"]);
    assert!(tree.get_children(app, Some(logs_group)).is_empty());

    // Retrying logs touches nothing in files
    logs.set(strings(&["eventlog.xml"]));
    tree.refresh_children(app, Some(logs_group));
    tree.wait_idle().await;

    assert_eq!(tree.generation(app, files_group), Some(1));
    assert_eq!(tree.generation(app, logs_group), Some(2));
    assert_eq!(files.calls(), 1);
    let children = tree.get_children(app, None);
    assert_eq!(
        labels(&tree, &children),
        vec!["index.html", "app.js", "eventlog.xml"]
    );
}

#[tokio::test]
async fn test_stale_completion_is_discarded() {
    let tree = tree_without_abort();
    let gated = Gated::<String>::new();
    let root = tree.insert_root(leaf("root").add_children(gated.fetch(), |s: String, _| leaf(&s)));

    let first = gated.expect();
    let second = gated.expect();
    tree.refresh_children(root, None);
    tree.refresh_children(root, None);
    assert_eq!(gated.calls(), 2);
    assert_eq!(tree.generation(root, GroupId(0)), Some(2));

    // The newer load finishes first
    second.send(Ok(strings(&["new"]))).unwrap();
    wait_until(|| tree.load_state(root, GroupId(0)) == Some(LoadState::Loaded)).await;
    let current = tree.get_children(root, None);
    assert_eq!(labels(&tree, &current), vec!["new"]);

    // The older one arrives late and must change nothing
    first.send(Ok(strings(&["old"]))).unwrap();
    within(tree.wait_idle()).await;

    assert_eq!(tree.get_children(root, None), current);
    assert_eq!(tree.load_state(root, GroupId(0)), Some(LoadState::Loaded));
    assert_eq!(tree.generation(root, GroupId(0)), Some(2));
    assert_eq!(tree.node_count(), 2);
}

#[tokio::test]
async fn test_stale_failure_is_discarded() {
    let tree = tree_without_abort();
    let gated = Gated::<String>::new();
    let root = tree.insert_root(leaf("root").add_children(gated.fetch(), |s: String, _| leaf(&s)));

    let first = gated.expect();
    let second = gated.expect();
    tree.refresh_children(root, None);
    tree.refresh_children(root, None);

    first.send(Err("timeout".to_string())).unwrap();
    second.send(Ok(strings(&["a"]))).unwrap();
    within(tree.wait_idle()).await;

    assert_eq!(tree.load_state(root, GroupId(0)), Some(LoadState::Loaded));
    assert_eq!(labels(&tree, &tree.get_children(root, None)), vec!["a"]);
}

#[tokio::test]
async fn test_superseded_fetch_is_aborted() {
    let tree = tree();
    let gated = Gated::<String>::new();
    let root = tree.insert_root(leaf("root").add_children(gated.fetch(), |s: String, _| leaf(&s)));

    let first = gated.expect();
    let second = gated.expect();
    tree.refresh_children(root, None);
    tree.refresh_children(root, None);

    // Aborting the first fetch drops its gate receiver
    wait_until(|| first.is_closed()).await;
    second.send(Ok(strings(&["only"]))).unwrap();
    within(tree.wait_idle()).await;

    assert_eq!(tree.load_state(root, GroupId(0)), Some(LoadState::Loaded));
    assert_eq!(labels(&tree, &tree.get_children(root, None)), vec!["only"]);
}

#[tokio::test]
async fn test_get_children_on_unloaded_starts_exactly_one_load() {
    let tree = tree();
    let gated = Gated::<String>::new();
    let root = tree.insert_root(leaf("root").add_children(gated.fetch(), |s: String, _| leaf(&s)));

    let gate = gated.expect();
    for _ in 0..3 {
        assert!(tree.get_children(root, None).is_empty());
    }
    assert_eq!(gated.calls(), 1);
    assert_eq!(tree.load_state(root, GroupId(0)), Some(LoadState::Loading));

    gate.send(Ok(strings(&["a", "b"]))).unwrap();
    within(tree.wait_idle()).await;

    assert_eq!(tree.get_children(root, None).len(), 2);
    assert_eq!(tree.get_children(root, None).len(), 2);
    assert_eq!(gated.calls(), 1, "loaded groups are served from cache");
}

#[tokio::test]
async fn test_failure_keeps_children_until_next_success() {
    let tree = tree();
    let items = Scripted::new(strings(&["a", "b"]));
    let root = tree.insert_root(leaf("root").add_children(items.fetch(), |s: String, _| leaf(&s)));

    tree.refresh_children(root, None);
    tree.wait_idle().await;
    let loaded = tree.get_children(root, None);

    items.fail("service unavailable");
    tree.refresh_children(root, None);
    tree.wait_idle().await;

    let state = tree.load_state(root, GroupId(0)).unwrap();
    assert!(state.is_failed());
    assert_eq!(state.error().unwrap().to_string(), "service unavailable");
    assert_eq!(tree.get_children(root, None), loaded);
    assert_eq!(items.calls(), 2, "failed groups are not retried implicitly");

    items.set(strings(&["b"]));
    tree.refresh_children(root, None);
    tree.wait_idle().await;

    assert_eq!(tree.load_state(root, GroupId(0)), Some(LoadState::Loaded));
    assert_eq!(tree.get_children(root, None), vec![loaded[1]]);
}

#[tokio::test]
async fn test_children_follow_registration_then_fetch_order() {
    let tree = tree();
    let first = Scripted::new(strings(&["z", "y"]));
    let second = Scripted::new(strings(&["b", "a", "b"]));
    let root = tree.insert_root(
        leaf("root")
            .add_children(first.fetch(), |s: String, _| leaf(&s))
            .add_children(second.fetch(), |s: String, _| leaf(&s)),
    );

    tree.refresh_children(root, None);
    tree.wait_idle().await;

    // Duplicates collapse to the last occurrence
    let children = tree.get_children(root, None);
    assert_eq!(labels(&tree, &children), vec!["z", "y", "a", "b"]);

    first.set(strings(&["y", "z"]));
    tree.refresh_children(root, Some(GroupId(0)));
    tree.wait_idle().await;
    let reordered = tree.get_children(root, None);
    assert_eq!(labels(&tree, &reordered), vec!["y", "z", "a", "b"]);
    assert_eq!(reordered[0], children[1]);
}

#[tokio::test]
async fn test_events_report_load_progress() {
    init_tracing_from_env();
    let (tx, rx) = mpsc::channel();
    let tree = ExplorerTree::with_options(Handle::current(), LoadOptions::default(), Some(tx));
    let items = Scripted::new(strings(&["a"]));
    let root = tree.insert_root(leaf("root").add_children(items.fetch(), |s: String, _| leaf(&s)));

    tree.get_children(root, None);
    tree.wait_idle().await;
    items.set(Vec::new());
    tree.refresh_children(root, None);
    tree.wait_idle().await;

    let events: Vec<TreeEvent> = rx.try_iter().collect();
    let group = GroupId(0);
    assert_eq!(
        events[0],
        TreeEvent::LoadStarted {
            node: root,
            group,
            generation: 1
        }
    );
    assert_eq!(events[1], TreeEvent::ChildrenChanged { node: root, group });
    assert_eq!(
        events[2],
        TreeEvent::LoadStarted {
            node: root,
            group,
            generation: 2
        }
    );
    assert!(matches!(events[3], TreeEvent::NodeRemoved(_)));
    assert_eq!(events[4], TreeEvent::ChildrenChanged { node: root, group });
    assert_eq!(events.len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refreshes_settle_on_latest_generation() {
    let tree = tree();
    let items = Scripted::new(strings(&["a", "b", "c"]));
    let root = tree.insert_root(leaf("root").add_children(items.fetch(), |s: String, _| leaf(&s)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tree = tree.clone();
            std::thread::spawn(move || {
                for _ in 0..10 {
                    tree.refresh_children(root, None);
                    tree.get_children(root, None);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    within(tree.wait_idle()).await;

    assert_eq!(tree.generation(root, GroupId(0)), Some(80));
    assert_eq!(tree.load_state(root, GroupId(0)), Some(LoadState::Loaded));
    let children = tree.get_children(root, None);
    assert_eq!(labels(&tree, &children), vec!["a", "b", "c"]);
    assert!(children.iter().all(|&c| tree.parent(c) == Some(root)));
    assert_eq!(tree.node_count(), 4);
}
