use http::Method;
use xacml_common::config::Backend;
use xacml_pep::{request::PepRequest, Error};

use crate::fixtures::demo_enforcer;

#[test_log::test(tokio::test)]
async fn object_operations() {
    for backend in [Backend::File, Backend::Indexed] {
        let dir = tempfile::tempdir().unwrap();
        let enforcer = demo_enforcer(&dir, backend);

        let request = PepRequest::new(Method::GET, "/objects/demo:1").with_remote_user("alice");
        let operation = enforcer.operation(&request).unwrap();
        assert_eq!(operation, "getObjectProfile");
        enforcer.enforce_request(operation, &request).await.unwrap();

        let request =
            PepRequest::new(Method::GET, "/objects/demo:2/datastreams/DC").with_remote_user("alice");
        let operation = enforcer.operation(&request).unwrap();
        assert_eq!(operation, "getDatastream");
        assert!(matches!(
            enforcer.enforce_request(operation, &request).await,
            Err(Error::AccessDenied)
        ));
    }
}

#[test_log::test(tokio::test)]
async fn method_override_selects_operation() {
    let dir = tempfile::tempdir().unwrap();
    let enforcer = demo_enforcer(&dir, Backend::Indexed);

    let request = PepRequest::new(Method::POST, "/objects/demo:2")
        .with_header("X-HTTP-Method-Override", "DELETE");
    let operation = enforcer.operation(&request).unwrap();

    assert_eq!(operation, "purgeObject");
    assert!(matches!(
        enforcer.enforce_request(operation, &request).await,
        Err(Error::AccessDenied)
    ));
}

#[test_log::test(tokio::test)]
async fn malformed_requests() {
    let dir = tempfile::tempdir().unwrap();
    let enforcer = demo_enforcer(&dir, Backend::File);

    let request = PepRequest::new(Method::GET, "/objects/demo1");
    assert!(matches!(enforcer.operation(&request), Err(Error::BadRequest(_))));
    assert!(matches!(
        enforcer.enforce_request("getObjectProfile", &request).await,
        Err(Error::BadRequest(_))
    ));

    let request = PepRequest::new(Method::PATCH, "/objects/demo:1");
    assert!(matches!(enforcer.operation(&request), Err(Error::BadRequest(_))));
}

#[test_log::test(tokio::test)]
async fn unknown_operations_are_denied() {
    let dir = tempfile::tempdir().unwrap();
    let enforcer = demo_enforcer(&dir, Backend::File);

    let request = PepRequest::new(Method::GET, "/objects/demo:1");
    assert!(matches!(
        enforcer.enforce_request("compareDatastreamChecksum", &request).await,
        Err(Error::AccessDenied)
    ));
    assert!(matches!(
        enforcer.enforce_response("compareDatastreamChecksum", &request, b"x".to_vec()).await,
        Err(Error::AccessDenied)
    ));
}

#[test_log::test(tokio::test)]
async fn responses_of_plain_operations_pass_through() {
    let dir = tempfile::tempdir().unwrap();
    let enforcer = demo_enforcer(&dir, Backend::File);

    let request = PepRequest::new(Method::GET, "/objects/demo:1");
    let body = b"<objectProfile pid=\"demo:1\"/>".to_vec();

    assert_eq!(
        enforcer
            .enforce_response("getObjectProfile", &request, body.clone())
            .await
            .unwrap(),
        body
    );
}
