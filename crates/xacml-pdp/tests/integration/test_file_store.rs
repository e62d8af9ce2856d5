use std::fs;

use xacml_common::policy::SchemaValidator;
use xacml_pdp::{
    index::PolicyIndex,
    store::{FilePolicyStore, PolicyStore},
    Error,
};

use crate::fixtures::{deny_pid, permit_all, request};

fn open(dir: &tempfile::TempDir) -> FilePolicyStore {
    FilePolicyStore::open(
        dir.path().join("policies"),
        dir.path().join("recycle"),
        Some(SchemaValidator::xacml()),
    )
    .unwrap()
}

#[test_log::test]
fn add_get_roundtrip_and_list_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);

    let doc = permit_all("permit-all");
    let id = store.add_policy(doc.as_bytes(), None).unwrap();

    assert_eq!(id, "permit-all");
    assert_eq!(store.get_policy(&id).unwrap(), doc.as_bytes());
    assert!(dir.path().join("policies/permit-all.xml").is_file());

    store
        .add_policy(deny_pid("demo:2", "demo:2").as_bytes(), None)
        .unwrap();
    assert!(dir.path().join("policies/demo_2.xml").is_file());

    assert!(matches!(
        store.add_policy(doc.as_bytes(), Some("other.xml")),
        Err(Error::Duplicate(id)) if id == "permit-all"
    ));

    assert_eq!(store.list_policies().unwrap(), ["demo:2", "permit-all"]);
}

#[test_log::test]
fn delete_moves_to_recycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let before = store.last_update();

    store
        .add_policy(permit_all("p").as_bytes(), Some("custom"))
        .unwrap();
    assert!(store.last_update() >= before);

    assert!(store.delete_policy("p").unwrap());
    assert!(!store.delete_policy("p").unwrap());

    assert!(matches!(store.get_policy("p"), Err(Error::NotFound(_))));
    assert!(!store.contains("p").unwrap());
    assert!(!dir.path().join("policies/custom.xml").exists());

    let recycled: Vec<String> = fs::read_dir(dir.path().join("recycle"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(recycled.len(), 1);
    let suffix = recycled[0].strip_prefix("custom.xml.").unwrap();
    assert!(suffix.parse::<i128>().is_ok());
}

#[test_log::test]
fn repeated_deletes_keep_every_recycled_copy() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);

    for pid in ["demo:1", "demo:2", "demo:3", "demo:4", "demo:5"] {
        store
            .add_policy(deny_pid("p", pid).as_bytes(), Some("p"))
            .unwrap();
        assert!(store.delete_policy("p").unwrap());
    }

    let mut recycled: Vec<String> = fs::read_dir(dir.path().join("recycle"))
        .unwrap()
        .map(|entry| fs::read_to_string(entry.unwrap().path()).unwrap())
        .collect();
    recycled.sort();

    let mut expected: Vec<String> = ["demo:1", "demo:2", "demo:3", "demo:4", "demo:5"]
        .into_iter()
        .map(|pid| deny_pid("p", pid))
        .collect();
    expected.sort();

    assert_eq!(recycled, expected);
}

#[test_log::test]
fn startup_scan_skips_invalid_files() {
    let dir = tempfile::tempdir().unwrap();
    let policies = dir.path().join("policies");
    fs::create_dir_all(&policies).unwrap();
    fs::write(policies.join("a.xml"), permit_all("a")).unwrap();
    fs::write(policies.join("broken.xml"), "<Policy").unwrap();
    fs::write(policies.join("notes.txt"), "not a policy").unwrap();

    let store = open(&dir);
    assert_eq!(store.list_policies().unwrap(), ["a"]);
    assert!(store.contains_file(&policies.join("a.xml")).unwrap());
}

#[test_log::test]
fn startup_scan_rejects_duplicate_ids() {
    let dir = tempfile::tempdir().unwrap();
    let policies = dir.path().join("policies");
    fs::create_dir_all(&policies).unwrap();
    fs::write(policies.join("a.xml"), permit_all("same")).unwrap();
    fs::write(policies.join("b.xml"), permit_all("same")).unwrap();

    let result = FilePolicyStore::open(&policies, dir.path().join("recycle"), None);
    assert!(matches!(result, Err(Error::Duplicate(id)) if id == "same"));
}

#[test_log::test]
fn update_replaces_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    store.add_policy(permit_all("p").as_bytes(), None).unwrap();

    let new = deny_pid("p", "demo:9");
    assert!(store.update_policy("p", new.as_bytes()).unwrap());
    assert_eq!(store.get_policy("p").unwrap(), new.as_bytes());
    assert_eq!(
        fs::read_to_string(dir.path().join("policies/p.xml")).unwrap(),
        new
    );

    assert!(!store
        .update_policy("q", permit_all("q").as_bytes())
        .unwrap());
    assert!(matches!(
        store.update_policy("p", permit_all("q").as_bytes()),
        Err(Error::IdMismatch { .. })
    ));
}

#[test_log::test]
fn invalid_documents_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let before = store.last_update();

    assert!(matches!(
        store.add_policy(b"<Policy xmlns=\"urn:example\" PolicyId=\"p\"/>", None),
        Err(Error::Validation(_))
    ));
    assert_eq!(store.last_update(), before);
    assert!(store.list_policies().unwrap().is_empty());
}

#[test_log::test]
fn every_policy_is_a_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    store.add_policy(permit_all("a").as_bytes(), None).unwrap();
    store
        .add_policy(deny_pid("b", "demo:2").as_bytes(), None)
        .unwrap();

    let candidates = store
        .candidates(&request("alice", "demo:1", "/demo:1"))
        .unwrap();
    assert_eq!(candidates.len(), 2);
}
