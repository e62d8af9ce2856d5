use std::sync::Arc;

use xacml_common::{
    attribute::{AttributeType, AttributeValue, Category},
    context::RequestContext,
    id::xacml,
    index_map::IndexMap,
    policy::SchemaValidator,
};
use xacml_pdp::{
    index::PolicyIndex,
    store::{IndexedPolicyStore, PolicyStore},
    Error,
};

use crate::fixtures::{deny_below, deny_pid, permit_all, request};

fn open(dir: &tempfile::TempDir) -> IndexedPolicyStore {
    IndexedPolicyStore::open(
        dir.path().join("policies"),
        Arc::new(IndexMap::repository_default()),
        Some(SchemaValidator::xacml()),
    )
    .unwrap()
}

fn candidate_ids(store: &IndexedPolicyStore, request: &RequestContext) -> Vec<String> {
    let mut ids: Vec<String> = store.candidates(request).unwrap().into_keys().collect();
    ids.sort();
    ids
}

#[test_log::test]
fn add_get_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);

    let doc = deny_pid("demo:2", "demo:2");
    let id = store.add_policy(doc.as_bytes(), None).unwrap();
    assert_eq!(store.get_policy(&id).unwrap(), doc.as_bytes());
    assert_eq!(store.list_policies().unwrap(), ["demo:2"]);
    assert!(!store.snapshot().metadata(&id).unwrap().any_resource);

    assert!(matches!(
        store.add_policy(doc.as_bytes(), None),
        Err(Error::Duplicate(_))
    ));

    assert!(store.delete_policy(&id).unwrap());
    assert!(matches!(store.get_policy(&id), Err(Error::NotFound(_))));
    assert!(!store.contains(&id).unwrap());
    assert!(!dir.path().join("policies/demo_2.xml").exists());
}

#[test_log::test]
fn committed_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = open(&dir);
        store.add_policy(permit_all("a").as_bytes(), None).unwrap();
        store
            .add_policy(deny_pid("b", "demo:2").as_bytes(), Some("b-policy"))
            .unwrap();
        store.delete_policy("a").unwrap();
    }

    let store = open(&dir);
    assert_eq!(store.list_policies().unwrap(), ["b"]);
    assert!(dir.path().join("policies/b-policy.xml").is_file());
    assert!(dir.path().join("policies/manifest.json").is_file());
}

#[test_log::test]
fn transactions_publish_on_commit_only() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);

    {
        let mut tx = store.begin();
        tx.add_policy(permit_all("a").as_bytes(), None).unwrap();
        assert!(tx.get_policy("a").is_some());
        assert!(!store.contains("a").unwrap());
        tx.abort();
    }
    assert!(!store.contains("a").unwrap());

    let mut tx = store.begin();
    tx.add_policy(permit_all("a").as_bytes(), None).unwrap();
    tx.add_policy(permit_all("b").as_bytes(), None).unwrap();
    assert!(tx.delete_policy("b"));
    tx.commit().unwrap();

    assert_eq!(store.list_policies().unwrap(), ["a"]);
}

#[test_log::test]
fn failed_add_leaves_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let before = store.last_update();

    assert!(store.add_policy(b"<Policy RuleCombiningAlgId=\"a\"/>", None).is_err());
    assert_eq!(store.last_update(), before);
    assert!(store.snapshot().is_empty());
}

#[test_log::test]
fn update_writes_a_new_version_and_reindexes() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    store
        .add_policy(deny_pid("p", "demo:1").as_bytes(), None)
        .unwrap();
    assert!(dir.path().join("policies/p.xml").is_file());

    assert_eq!(
        candidate_ids(&store, &request("alice", "demo:1", "/demo:1")),
        ["p"]
    );

    assert!(store
        .update_policy("p", deny_pid("p", "demo:2").as_bytes())
        .unwrap());

    assert!(candidate_ids(&store, &request("alice", "demo:1", "/demo:1")).is_empty());
    assert_eq!(
        candidate_ids(&store, &request("alice", "demo:2", "/demo:2")),
        ["p"]
    );

    assert!(!dir.path().join("policies/p.xml").exists());
    assert!(dir.path().join("policies/p~1.xml").is_file());

    assert!(store
        .update_policy("p", deny_pid("p", "demo:3").as_bytes())
        .unwrap());
    assert!(dir.path().join("policies/p.xml").is_file());
    assert!(!dir.path().join("policies/p~1.xml").exists());

    drop(store);
    let store = open(&dir);
    assert_eq!(
        store.get_policy("p").unwrap(),
        deny_pid("p", "demo:3").as_bytes()
    );
}

#[test_log::test]
fn failed_commit_leaves_committed_version_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let policies = dir.path().join("policies");
    let permit = permit_all("p");
    let deny = deny_pid("p", "demo:1");

    let store = open(&dir);
    store.add_policy(permit.as_bytes(), None).unwrap();

    // a non-empty directory in place of the manifest makes the manifest rename fail
    let manifest = policies.join("manifest.json");
    let saved = dir.path().join("manifest.saved");
    std::fs::rename(&manifest, &saved).unwrap();
    std::fs::create_dir_all(manifest.join("blocker")).unwrap();

    assert!(matches!(
        store.update_policy("p", deny.as_bytes()),
        Err(Error::Transaction(_))
    ));
    assert_eq!(store.get_policy("p").unwrap(), permit.as_bytes());

    let mut files: Vec<String> = std::fs::read_dir(&policies)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    files.sort();
    assert_eq!(files, ["manifest.json", "p.xml"]);

    std::fs::remove_dir_all(&manifest).unwrap();
    std::fs::rename(&saved, &manifest).unwrap();
    drop(store);

    let store = open(&dir);
    assert_eq!(store.get_policy("p").unwrap(), permit.as_bytes());
}

#[test_log::test]
fn any_resource_policy_is_always_a_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    store.add_policy(permit_all("all").as_bytes(), None).unwrap();
    store
        .add_policy(deny_pid("deny-2", "demo:2").as_bytes(), None)
        .unwrap();

    assert!(store.snapshot().metadata("all").unwrap().any_resource);

    assert_eq!(
        candidate_ids(&store, &request("alice", "demo:1", "/demo:1")),
        ["all"]
    );
    assert_eq!(
        candidate_ids(&store, &request("bob", "demo:2", "/demo:2")),
        ["all", "deny-2"]
    );
    assert_eq!(
        candidate_ids(&store, &RequestContext::builder().build()),
        ["all", "deny-2"]
    );
}

#[test_log::test]
fn resource_id_components_select_hierarchical_policies() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    store
        .add_policy(deny_below("below-demo-2", "/demo:2").as_bytes(), None)
        .unwrap();

    assert_eq!(
        candidate_ids(&store, &request("alice", "demo:2", "/demo:2/DC")),
        ["below-demo-2"]
    );
    assert!(candidate_ids(&store, &request("alice", "demo:3", "/demo:3/DC")).is_empty());
}

#[test_log::test]
fn equal_shapes_share_one_plan() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    store.add_policy(permit_all("all").as_bytes(), None).unwrap();

    store
        .candidates(&request("alice", "demo:1", "/demo:1/DC"))
        .unwrap();
    store
        .candidates(&request("bob", "demo:7", "/demo:7/RELS-EXT"))
        .unwrap();

    assert_eq!(store.plan_cache().len(), 1);
}

#[test_log::test]
fn custom_index_map_limits_narrowing() {
    let dir = tempfile::tempdir().unwrap();
    let mut index_map = IndexMap::default();
    index_map
        .category_mut(Category::Resource)
        .put(xacml::RESOURCE_ID, AttributeType::String);

    let store = IndexedPolicyStore::open(dir.path(), Arc::new(index_map), None).unwrap();
    store
        .add_policy(deny_pid("deny-2", "demo:2").as_bytes(), None)
        .unwrap();

    // the pid attribute is not indexed, so the policy cannot be excluded
    let request = RequestContext::builder()
        .resource_attribute(xacml::RESOURCE_ID, AttributeValue::string("/demo:1"))
        .build();
    assert_eq!(candidate_ids(&store, &request), ["deny-2"]);
}
