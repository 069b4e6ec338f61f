//! Dataset loading, cluster joins and load ordering.

mod common;

use std::time::Duration;

use labelman_core::gateway::{Endpoint, GatewayCall};
use labelman_core::{ApplyOutcome, DatasetStore, LabelmanError, LoadRequest, LoadState};

#[tokio::test]
async fn test_load_merges_items_and_clusters() {
    let gw = common::gateway();
    let mut store = DatasetStore::new();

    let outcome = store
        .load(gw.as_ref(), LoadRequest::new("ds1").with_clusters("cr1"))
        .await
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Applied);
    assert_eq!(store.state(), &LoadState::Ready);

    let collection = store.collection();
    assert_eq!(collection.len(), 5);
    assert_eq!(collection.dataset_name.as_deref(), Some("Flowers"));
    assert_eq!(
        collection.item("a").unwrap().display_ref.as_deref(),
        Some("https://cdn.test/a.jpg")
    );
    assert_eq!(collection.item("c").unwrap().display_ref, None);

    let clusters: Vec<Option<i64>> = collection.items().iter().map(|i| i.cluster_id).collect();
    assert_eq!(clusters, vec![Some(0), Some(0), Some(1), Some(1), None]);

    let grouping = store.grouping().unwrap();
    assert_eq!(grouping.cluster_result_id, "cr1");
    assert_eq!(grouping.groups.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
    let members: Vec<&str> = grouping.members(0).unwrap().iter().map(String::as_str).collect();
    assert_eq!(members, vec!["p1", "p2"]);

    assert_eq!(gw.call_count(Endpoint::DatasetItems), 1);
    assert_eq!(gw.call_count(Endpoint::ClusterResult), 1);
}

#[tokio::test]
async fn test_partition_leaves_unassigned_items_without_cluster() {
    let gw = common::gateway();
    let mut store = DatasetStore::new();
    store
        .load(gw.as_ref(), LoadRequest::new("ds1").with_clusters("cr3"))
        .await
        .unwrap();

    let grouping = store.grouping().unwrap();
    let groups: Vec<(i64, Vec<&str>)> = grouping
        .groups
        .iter()
        .map(|(c, paths)| (*c, paths.iter().map(String::as_str).collect()))
        .collect();
    assert_eq!(groups, vec![(0, vec!["p1", "p2"]), (1, vec!["p3"])]);
    assert_eq!(store.item("d").unwrap().cluster_id, None);
    assert_eq!(grouping.first_group(), Some(0));
}

#[tokio::test]
async fn test_group_tags_hydrate_from_first_member() {
    let gw = common::gateway();
    let mut store = DatasetStore::new();
    store
        .load(gw.as_ref(), LoadRequest::new("ds1").with_clusters("cr1"))
        .await
        .unwrap();

    let hydrated = store.collection().hydrated_group_tags();
    assert_eq!(hydrated.get(0), Some("rose"));
    assert_eq!(hydrated.get(1), None);
}

#[tokio::test]
async fn test_first_assignment_wins_and_unknown_paths_are_ignored() {
    let gw = common::gateway();
    let mut store = DatasetStore::new();
    store
        .load(gw.as_ref(), LoadRequest::new("ds1").with_clusters("cr2"))
        .await
        .unwrap();

    let collection = store.collection();
    assert_eq!(collection.item("a").unwrap().cluster_id, Some(0));
    assert_eq!(collection.item("b").unwrap().cluster_id, None);
    assert_eq!(collection.item("c").unwrap().cluster_id, Some(1));

    let grouping = collection.grouping().unwrap();
    assert!(!grouping.contains_group(2), "p9 is not in the dataset");
    let members: Vec<&str> = grouping.members(1).unwrap().iter().map(String::as_str).collect();
    assert_eq!(members, vec!["p3"]);

    let group_ids: Vec<&str> = collection
        .group_items(1)
        .iter()
        .map(|i| i.item_id.as_str())
        .collect();
    assert_eq!(group_ids, vec!["c"]);
}

#[tokio::test]
async fn test_load_without_clusters_has_no_grouping() {
    let gw = common::gateway();
    let mut store = DatasetStore::new();
    store.load(gw.as_ref(), LoadRequest::new("ds1")).await.unwrap();

    assert!(store.grouping().is_none());
    assert!(store.items().iter().all(|i| i.cluster_id.is_none()));
    assert_eq!(gw.call_count(Endpoint::ClusterResult), 0);
}

#[tokio::test]
async fn test_cluster_failure_degrades_to_plain_collection() {
    let gw = common::gateway();
    gw.fail(Endpoint::ClusterResult, "clustering service down");
    let mut store = DatasetStore::new();

    let outcome = store
        .load(gw.as_ref(), LoadRequest::new("ds1").with_clusters("cr1"))
        .await
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Applied);
    assert_eq!(store.items().len(), 5);
    assert!(store.grouping().is_none());
    assert_eq!(
        store.collection().cluster_warning(),
        Some("clustering service down")
    );
}

#[tokio::test]
async fn test_item_failure_empties_collection() {
    let gw = common::gateway();
    let mut store = DatasetStore::new();
    store
        .load(gw.as_ref(), LoadRequest::new("ds1").with_clusters("cr1"))
        .await
        .unwrap();
    assert_eq!(store.items().len(), 5);

    gw.fail(Endpoint::DatasetItems, "permission denied");
    let err = store.reload(gw.as_ref()).await.unwrap_err();
    assert!(matches!(err, LabelmanError::Remote(ref m) if m == "permission denied"));
    assert!(store.items().is_empty());
    assert!(store.grouping().is_none());
    assert_eq!(store.error(), Some("permission denied"));
}

#[tokio::test]
async fn test_unknown_dataset_is_an_error() {
    let gw = common::gateway();
    let mut store = DatasetStore::new();
    let err = store
        .load(gw.as_ref(), LoadRequest::new("missing"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("missing"));
    assert!(matches!(store.state(), LoadState::Failed(_)));
}

#[tokio::test]
async fn test_stale_load_is_discarded() {
    let gw = common::gateway();
    let mut store = DatasetStore::new();

    let first = store.begin_load(LoadRequest::new("ds1"));
    let second = store.begin_load(LoadRequest::new("ds2"));

    let outcome = DatasetStore::fetch(gw.as_ref(), second.request()).await;
    assert_eq!(store.apply(second, outcome).unwrap(), ApplyOutcome::Applied);

    // The older request lands after the newer one.
    let outcome = DatasetStore::fetch(gw.as_ref(), first.request()).await;
    assert_eq!(store.apply(first, outcome).unwrap(), ApplyOutcome::Stale);

    assert_eq!(store.collection().dataset_id, "ds2");
    assert_eq!(store.items().len(), 1);
    assert_eq!(store.dataset_id(), Some("ds2"));
}

#[tokio::test(start_paused = true)]
async fn test_item_and_cluster_fetches_run_concurrently() {
    let gw = common::gateway();
    gw.set_latency(Endpoint::DatasetItems, Duration::from_millis(200));
    gw.set_latency(Endpoint::ClusterResult, Duration::from_millis(200));
    let mut store = DatasetStore::new();

    let started = tokio::time::Instant::now();
    store
        .load(gw.as_ref(), LoadRequest::new("ds1").with_clusters("cr1"))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(400), "fetches ran sequentially: {elapsed:?}");
}

#[tokio::test]
async fn test_reload_reissues_last_request() {
    let gw = common::gateway();
    let mut store = DatasetStore::new();
    assert!(store.reload(gw.as_ref()).await.is_err());

    store
        .load(gw.as_ref(), LoadRequest::new("ds1").with_clusters("cr1"))
        .await
        .unwrap();
    gw.clear_calls();
    store.reload(gw.as_ref()).await.unwrap();

    assert_eq!(
        gw.calls(),
        vec![
            GatewayCall::DatasetItems {
                dataset_id: "ds1".into()
            },
            GatewayCall::ClusterResult {
                cluster_result_id: "cr1".into()
            },
        ]
    );
}
