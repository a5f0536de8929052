//! CRUD Operations Tests
//!
//! Create, Read, Update, Delete through request plans, including plans
//! decoded from their JSON form.

use archive_meta::*;
use serde_json::json;

fn payload(value: serde_json::Value) -> Document {
    value.as_object().cloned().unwrap()
}

/// Root "fonds" with three "file" children
fn setup_fonds() -> QueryExecutor {
    let executor = QueryExecutor::new(EngineContext::in_memory());
    let root = RequestPlan::insert(
        NodeKind::Unit,
        payload(json!({"_id": "fonds", "Title": "Fonds", "Level": "fonds"})),
    );
    executor.execute_request(&root, None).unwrap();

    for (id, year) in [("f1", 1990), ("f2", 2001), ("f3", 2015)] {
        let plan = RequestPlan::insert(
            NodeKind::Unit,
            payload(json!({"_id": id, "Title": id, "Level": "file", "Year": year})),
        )
        .with_roots(["fonds"]);
        let result = executor.execute_request(&plan, None).unwrap();
        assert_eq!(result.nb_result(), 1, "insert {} should create one node", id);
    }
    executor
}

fn children_of(root: &str, predicate: Filter) -> RequestPlan {
    RequestPlan::select(NodeKind::Unit)
        .with_roots([root])
        .with_step(StepQuery::relative(predicate, 1))
}

#[test]
fn test_insert_links_children() {
    let executor = setup_fonds();

    let mut root = Unit::new("fonds");
    assert!(root.load(executor.context()).unwrap());
    assert_eq!(root.nb_children, 3);
    assert_eq!(root.children_ids(executor.context()).unwrap().len(), 3);
}

#[test]
fn test_read_with_filters() {
    let executor = setup_fonds();

    let all = executor
        .execute_request(&children_of("fonds", Filter::All), None)
        .unwrap();
    assert_eq!(all.nb_result(), 3);

    let recent = executor
        .execute_request(&children_of("fonds", Filter::gte("Year", 2000)), None)
        .unwrap();
    let ids: Vec<&str> = recent.current_ids().iter().map(String::as_str).collect();
    assert_eq!(ids, vec!["f2", "f3"]);
}

#[test]
fn test_update_many() {
    let executor = setup_fonds();
    let plan = RequestPlan::update(NodeKind::Unit, UpdateDoc::new().set("Status", "reviewed"))
        .with_roots(["fonds"])
        .with_step(StepQuery::relative(Filter::All, 1));
    let result = executor.execute_request(&plan, None).unwrap();
    assert_eq!(result.nb_result(), 3);

    let reviewed = executor
        .execute_request(&children_of("fonds", Filter::eq("Status", "reviewed")), None)
        .unwrap();
    assert_eq!(reviewed.nb_result(), 3);
}

#[test]
fn test_delete_many() {
    let executor = setup_fonds();
    let plan = RequestPlan::delete(NodeKind::Unit)
        .with_roots(["fonds"])
        .with_step(StepQuery::relative(Filter::lte("Year", 2001), 1));
    let result = executor.execute_request(&plan, None).unwrap();
    assert_eq!(result.nb_result(), 2);

    let left = executor
        .execute_request(&children_of("fonds", Filter::All), None)
        .unwrap();
    assert_eq!(left.nb_result(), 1);
    assert!(left.current_ids().contains("f3"));
}

#[test]
fn test_plan_from_json() {
    let executor = setup_fonds();
    let plan: RequestPlan = serde_json::from_value(json!({
        "operation": "Select",
        "kind": "Unit",
        "roots": ["fonds"],
        "steps": [
            {"predicate": {"Eq": ["Level", "file"]}, "depth": {"Relative": 1}}
        ],
        "projection": {"Include": ["Title"]},
        "order_by": [{"field": "Year", "direction": "Descending"}],
        "offset": 0,
        "limit": 2
    }))
    .unwrap();

    let result = executor.execute_request(&plan, None).unwrap();
    let titles: Vec<&serde_json::Value> = result.finals().iter().map(|d| &d["Title"]).collect();
    assert_eq!(titles, vec![&json!("f3"), &json!("f2")]);
    assert_eq!(result.nb_result(), 2);
}

#[test]
fn test_custom_store_config() {
    let config = EngineConfig::from_json_str(r#"{"max_depth": 2, "print_request": true}"#).unwrap();
    let ctx = EngineContext::new(std::sync::Arc::new(MemoryStore::new()), config).unwrap();
    let executor = QueryExecutor::new(ctx);

    for (id, parent) in [("a", None), ("b", Some("a"))] {
        let plan = RequestPlan::insert(NodeKind::Unit, payload(json!({"_id": id})))
            .with_roots(parent);
        executor.execute_request(&plan, None).unwrap();
    }

    let too_deep = RequestPlan::insert(NodeKind::Unit, payload(json!({"_id": "c"})))
        .with_roots(["b"]);
    let err = executor.execute_request(&too_deep, None).unwrap_err();
    assert!(matches!(err, MetaError::MaxDepthExceeded { depth: 3, max: 2, .. }));
}
