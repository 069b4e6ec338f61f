//! Grid presentation, selection and workflow mode transitions.

mod common;

use labelman_core::gateway::Endpoint;
use labelman_core::viewport::Cell;
use labelman_core::{
    Activation, ActivationEffect, LabelingWorkflow, LabelmanError, LoadRequest, Notifier,
    NotifyLevel, SelectionManager, TaggingMode, ViewMode, Viewport,
};

// ─── Viewport ────────────────────────────────────────────────────────────────

#[test]
fn test_viewport_linear_index_and_bounds() {
    let vp = Viewport::new(4);
    assert_eq!(vp.linear_index(2, 3), Some(11));
    assert_eq!(vp.linear_index(usize::MAX / 4 + 1, 0), None);

    let ten: Vec<usize> = (0..10).collect();
    assert_eq!(vp.cell(&ten, 2, 3), None, "index 11 is past the end");
    assert_eq!(vp.cell(&ten, 2, 1), Some(&9));
    assert_eq!(vp.cell(&ten, 0, 4), None, "column outside the grid");

    let twelve: Vec<usize> = (0..12).collect();
    assert_eq!(vp.cell(&twelve, 2, 3), Some(&11));
    assert_eq!(vp.row_count(10), 3);
    assert_eq!(Viewport::new(0).column_count(), 1);
}

#[test]
fn test_viewport_windows_rows() {
    let mut vp = Viewport::new(4);
    assert_eq!(vp.visible_rows(100), 0..6);
    assert_eq!(vp.visible_rows(0), 0..0);

    vp.scroll_to(2200.0);
    assert_eq!(vp.visible_rows(100), 8..16);
    let cells = vp.visible_cells(100);
    assert_eq!(cells.len(), 32);
    assert_eq!(
        cells[0],
        Cell {
            row: 8,
            column: 0,
            index: 32
        }
    );

    // Last partial row only yields real items.
    vp.scroll_to(0.0);
    assert_eq!(vp.visible_cells(5).len(), 5);
}

#[test]
fn test_scroll_into_view() {
    let mut vp = Viewport::new(4);
    vp.scroll_into_view(60);
    assert_eq!(vp.scroll_offset(), 2640.0);
    vp.scroll_into_view(0);
    assert_eq!(vp.scroll_offset(), 0.0);
}

// ─── Selection ───────────────────────────────────────────────────────────────

#[test]
fn test_selection_toggle_and_order() {
    let mut sel = SelectionManager::new();
    assert!(sel.toggle("b"));
    assert!(sel.toggle("a"));
    assert!(!sel.toggle("b"));
    assert!(sel.toggle("b"));
    assert_eq!(sel.to_vec(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(sel.single(), None);

    sel.retain(|id| id == "a");
    assert_eq!(sel.single(), Some("a"));

    sel.replace(vec!["x".to_string(), "x".to_string()]);
    assert_eq!(sel.len(), 1);
    sel.clear();
    assert!(sel.is_empty());
}

#[tokio::test]
async fn test_select_all_then_clear_is_empty() {
    let gw = common::gateway();
    let mut store = labelman_core::DatasetStore::new();
    store.load(gw.as_ref(), LoadRequest::new("ds1")).await.unwrap();

    let mut sel = SelectionManager::new();
    sel.select_all(store.items());
    assert_eq!(sel.len(), 5);
    sel.clear();
    assert!(sel.is_empty());

    sel.select_all(&[]);
    sel.clear();
    assert!(sel.is_empty());
}

// ─── Workflow ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_grouped_dataset_opens_in_group_mode() {
    let gw = common::gateway();
    let mut wf = LabelingWorkflow::new(gw.clone(), Notifier::disabled(), 4);
    wf.open_dataset(LoadRequest::new("ds1").with_clusters("cr1"))
        .await
        .unwrap();

    assert_eq!(wf.tagging_mode(), &TaggingMode::Group);
    assert_eq!(wf.active_group(), Some(0));
    let ids: Vec<&str> = wf.source_items().iter().map(|i| i.item_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);

    wf.select_all();
    assert_eq!(wf.selection().to_vec(), vec!["a".to_string(), "b".to_string()]);

    wf.set_active_group(1).unwrap();
    let ids: Vec<&str> = wf.source_items().iter().map(|i| i.item_id.as_str()).collect();
    assert_eq!(ids, vec!["c", "d"]);
    assert!(wf.set_active_group(9).is_err());
    assert!(wf.is_ready(), "group 0 is hydrated");
}

#[tokio::test]
async fn test_plain_dataset_opens_in_bulk_mode() {
    let gw = common::gateway();
    let mut wf = LabelingWorkflow::new(gw.clone(), Notifier::disabled(), 4);
    wf.open_dataset(LoadRequest::new("ds1")).await.unwrap();

    assert_eq!(wf.tagging_mode(), &TaggingMode::Bulk);
    assert_eq!(wf.source_items().len(), 5);
    assert!(matches!(
        wf.set_tagging_mode(TaggingMode::Group),
        Err(LabelmanError::NoGrouping)
    ));
    assert!(!wf.is_ready());
    assert!(wf.training_input().is_err());

    wf.toggle_selection("a").unwrap();
    wf.set_bulk_label("rose");
    let input = wf.training_input().unwrap();
    assert!(input.source_cluster_result_id.is_none());
    assert!(input.group_labels.is_none());
}

#[tokio::test]
async fn test_activation_toggles_and_opens_detail() {
    let gw = common::gateway();
    let mut wf = LabelingWorkflow::new(gw.clone(), Notifier::disabled(), 4);
    wf.open_dataset(LoadRequest::new("ds1")).await.unwrap();

    assert_eq!(
        wf.activate(1, 0, Activation::Single),
        Some(ActivationEffect::Toggled {
            item_id: "e".into(),
            selected: true
        })
    );
    assert!(wf.selection().contains("e"));
    assert_eq!(wf.activate(1, 1, Activation::Single), None, "past the end");

    assert_eq!(
        wf.activate(0, 2, Activation::Double),
        Some(ActivationEffect::OpenedDetail("c".into()))
    );
    assert_eq!(wf.view_mode(), &ViewMode::Detail("c".into()));
    assert_eq!(wf.tagging_mode(), &TaggingMode::Individual("c".into()));
    assert!(wf.selection().is_empty());
    assert_eq!(wf.source_items().len(), 1);
    assert_eq!(wf.focused_item(), Some("c"));
    assert_eq!(wf.activate(0, 0, Activation::Single), None, "grid inactive in detail view");

    wf.back_to_gallery();
    assert_eq!(wf.view_mode(), &ViewMode::Gallery);
    assert_eq!(wf.tagging_mode(), &TaggingMode::Bulk);
    assert_eq!(wf.visible_cells().len(), 5);
}

#[tokio::test]
async fn test_activation_far_past_the_grid_does_nothing() {
    let gw = common::gateway();
    let mut wf = LabelingWorkflow::new(gw.clone(), Notifier::disabled(), 4);
    wf.open_dataset(LoadRequest::new("ds1")).await.unwrap();

    let row = usize::MAX / 4 + 1;
    assert_eq!(wf.activate(row, 0, Activation::Single), None);
    assert_eq!(wf.activate(row, 0, Activation::Double), None);
    assert_eq!(wf.activate(usize::MAX, usize::MAX, Activation::Single), None);
    assert!(wf.selection().is_empty());
    assert_eq!(wf.view_mode(), &ViewMode::Gallery);
}

#[tokio::test]
async fn test_rejected_actions_warn_once() {
    let gw = common::gateway();
    let (notifier, mut rx) = Notifier::channel();
    let mut wf = LabelingWorkflow::new(gw.clone(), notifier, 4);
    wf.open_dataset(LoadRequest::new("ds1")).await.unwrap();
    common::drain(&mut rx);

    let cases: Vec<LabelmanError> = vec![
        wf.training_input().unwrap_err(),
        wf.set_tagging_mode(TaggingMode::Group).unwrap_err(),
        wf.set_tagging_mode(TaggingMode::Individual("zzz".into()))
            .unwrap_err(),
        wf.apply_group_tags().await.unwrap_err(),
        wf.set_group_label(0, "rose").unwrap_err(),
    ];
    let notes = common::drain(&mut rx);
    assert_eq!(notes.len(), cases.len());
    for (note, err) in notes.iter().zip(&cases) {
        assert_eq!(note.level, NotifyLevel::Warn);
        assert_eq!(note.message, err.to_string());
    }
    assert_eq!(
        notes[0].message,
        "Select images and enter a tag before training"
    );
    assert!(gw.calls().iter().all(|c| c.endpoint() == Endpoint::DatasetItems));
}

#[tokio::test]
async fn test_detail_view_keeps_group_readiness() {
    let gw = common::gateway();
    let mut wf = LabelingWorkflow::new(gw.clone(), Notifier::disabled(), 4);
    wf.open_dataset(LoadRequest::new("ds1").with_clusters("cr1"))
        .await
        .unwrap();
    assert!(wf.is_ready(), "group 0 is hydrated");

    wf.open_detail("c").unwrap();
    assert_eq!(wf.tagging_mode(), &TaggingMode::Individual("c".into()));
    assert!(wf.selection().is_empty());
    assert!(wf.is_ready());
    let input = wf.training_input().unwrap();
    assert_eq!(input.source_cluster_result_id.as_deref(), Some("cr1"));
    assert_eq!(input.group_labels.unwrap().get(0), Some("rose"));

    // Without a grouping the detail view falls back to the bulk rule.
    wf.open_dataset(LoadRequest::new("ds2")).await.unwrap();
    wf.open_detail("x").unwrap();
    assert!(!wf.is_ready());
}

#[tokio::test]
async fn test_switching_dataset_clears_page_state() {
    let gw = common::gateway();
    let mut wf = LabelingWorkflow::new(gw.clone(), Notifier::disabled(), 4);
    wf.open_dataset(LoadRequest::new("ds1").with_clusters("cr1"))
        .await
        .unwrap();
    wf.toggle_selection("a").unwrap();
    wf.set_group_label(1, "tulip").unwrap();

    // Same dataset: proposed labels survive, the selection does not.
    wf.reload().await.unwrap();
    assert!(wf.selection().is_empty());
    assert_eq!(wf.group_tags().get(0), Some("rose"));
    assert_eq!(wf.group_tags().get(1), Some("tulip"));

    wf.open_dataset(LoadRequest::new("ds2")).await.unwrap();
    assert!(wf.selection().is_empty());
    assert!(wf.group_tags().is_empty());
    assert_eq!(wf.active_group(), None);
    assert!(matches!(
        wf.toggle_selection("a"),
        Err(LabelmanError::UnknownItem(_))
    ));
}

#[tokio::test]
async fn test_cluster_failure_is_reported_once() {
    let gw = common::gateway();
    gw.fail(Endpoint::ClusterResult, "clustering service down");
    let (notifier, mut rx) = Notifier::channel();
    let mut wf = LabelingWorkflow::new(gw.clone(), notifier, 4);

    wf.open_dataset(LoadRequest::new("ds1").with_clusters("cr1"))
        .await
        .unwrap();
    assert_eq!(wf.tagging_mode(), &TaggingMode::Bulk);

    let notes = common::drain(&mut rx);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotifyLevel::Warn);
    assert!(notes[0].message.contains("clustering service down"));
}

#[tokio::test]
async fn test_load_failure_resets_modes() {
    let gw = common::gateway();
    let (notifier, mut rx) = Notifier::channel();
    let mut wf = LabelingWorkflow::new(gw.clone(), notifier, 4);
    wf.open_dataset(LoadRequest::new("ds1")).await.unwrap();
    wf.open_detail("a").unwrap();

    gw.fail(Endpoint::DatasetItems, "timeout");
    assert!(wf.reload().await.is_err());
    assert_eq!(wf.view_mode(), &ViewMode::Gallery);
    assert!(wf.source_items().is_empty());
    assert_eq!(
        common::drain(&mut rx).last().unwrap().level,
        NotifyLevel::Error
    );
}
