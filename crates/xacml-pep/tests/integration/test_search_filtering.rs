use std::sync::Arc;

use http::Method;
use indoc::indoc;
use xacml_common::{
    config::Backend,
    context::RequestContext,
    decision::{Decision, DecisionResult, Status},
    evaluator::{DecisionEvaluator, EvalFuture, EvaluationError},
    id::xacml,
};
use xacml_pep::{context::ContextBuilder, filter::Enforcer, request::PepRequest, Error};

use crate::fixtures::{decision_point, demo_enforcer, deny_resource_id, permit_all};

const FIND_OBJECTS_XML: &str = indoc! {r#"
    <?xml version="1.0" encoding="UTF-8"?>
    <result xmlns="http://www.fedora.info/definitions/1/0/types/"
        xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
      <listSession>
        <token>f7c2</token>
        <cursor>0</cursor>
      </listSession>
      <resultList>
        <objectFields>
          <pid>demo:1</pid>
          <title>First</title>
        </objectFields>
        <objectFields>
          <pid>demo:2</pid>
          <title>Second</title>
        </objectFields>
        <objectFields>
          <pid>demo:3</pid>
          <title>Third</title>
        </objectFields>
      </resultList>
    </result>
"#};

fn find_objects_request() -> PepRequest {
    PepRequest::new(Method::GET, "/objects")
        .with_query("terms=demo*&pid=true&title=true&resultFormat=xml")
        .with_remote_user("alice")
}

#[test_log::test(tokio::test)]
async fn find_objects_xml() {
    for backend in [Backend::File, Backend::Indexed] {
        let dir = tempfile::tempdir().unwrap();
        let enforcer = demo_enforcer(&dir, backend);
        let request = find_objects_request();

        let operation = enforcer.operation(&request).unwrap();
        assert_eq!(operation, "findObjects");
        enforcer.enforce_request(operation, &request).await.unwrap();

        let filtered = enforcer
            .enforce_response(operation, &request, FIND_OBJECTS_XML.as_bytes().to_vec())
            .await
            .unwrap();

        let expected = indoc! {r#"
            <?xml version="1.0" encoding="UTF-8"?>
            <result xmlns="http://www.fedora.info/definitions/1/0/types/"
                xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
              <listSession>
                <token>f7c2</token>
                <cursor>0</cursor>
              </listSession>
              <resultList>
                <objectFields>
                  <pid>demo:1</pid>
                  <title>First</title>
                </objectFields>
                <objectFields>
                  <pid>demo:3</pid>
                  <title>Third</title>
                </objectFields>
              </resultList>
            </result>
        "#};
        assert_eq!(String::from_utf8(filtered).unwrap(), expected);
    }
}

#[test_log::test(tokio::test)]
async fn find_objects_html() {
    let dir = tempfile::tempdir().unwrap();
    let enforcer = demo_enforcer(&dir, Backend::Indexed);
    let request = PepRequest::new(Method::GET, "/objects").with_query("terms=demo*&pid=true");

    let html = indoc! {r#"
        <html><head><title>Search Results</title></head><body>
        <table>
        <tr><th>pid</th></tr>
        <tr><td><a href="/fedora/objects/demo%3A1">demo:1</a></td></tr>
        <tr><td>fields of one</td></tr>
        <tr><td><a href="/fedora/objects/demo%3A2">demo:2</a></td></tr>
        <tr><td>fields of two
        <tr><td><a href="/fedora/objects/demo%3A3">demo:3</a></td></tr>
        <tr><td>fields of three</td></tr>
        </table>
        </body></html>
    "#};

    let filtered = enforcer
        .enforce_response("findObjects", &request, html.as_bytes().to_vec())
        .await
        .unwrap();
    let filtered = String::from_utf8(filtered).unwrap();

    for kept in ["Search Results", "demo:1", "fields of one", "demo:3", "fields of three"] {
        assert!(filtered.contains(kept), "{kept} missing from {filtered}");
    }
    for removed in ["demo:2", "fields of two"] {
        assert!(!filtered.contains(removed), "{removed} left in {filtered}");
    }
}

#[test_log::test(tokio::test)]
async fn list_datastreams() {
    let dir = tempfile::tempdir().unwrap();
    let pdp = decision_point(
        &dir,
        Backend::Indexed,
        &[
            permit_all("permit-all"),
            deny_resource_id("deny-rels", "/demo:1/RELS-EXT"),
        ],
    );
    let enforcer = Enforcer::with_default_filters(pdp, ContextBuilder::new());

    let request = PepRequest::new(Method::GET, "/objects/demo:1/datastreams").with_query("format=xml");
    let operation = enforcer.operation(&request).unwrap();
    assert_eq!(operation, "listDatastreams");
    enforcer.enforce_request(operation, &request).await.unwrap();

    let xml = indoc! {r#"
        <objectDatastreams xmlns="http://www.fedora.info/definitions/1/0/access/" pid="demo:1" baseURL="http://localhost:8080/fedora/">
          <datastream dsid="DC" label="Dublin Core" mimeType="text/xml"/>
          <datastream dsid="RELS-EXT" label="Relationships" mimeType="application/rdf+xml"/>
        </objectDatastreams>
    "#};
    let filtered = enforcer
        .enforce_response(operation, &request, xml.as_bytes().to_vec())
        .await
        .unwrap();
    assert_eq!(
        String::from_utf8(filtered).unwrap(),
        indoc! {r#"
            <objectDatastreams xmlns="http://www.fedora.info/definitions/1/0/access/" pid="demo:1" baseURL="http://localhost:8080/fedora/">
              <datastream dsid="DC" label="Dublin Core" mimeType="text/xml"/>
            </objectDatastreams>
        "#}
    );

    let request = PepRequest::new(Method::GET, "/objects/demo:1/datastreams");
    let html = indoc! {r#"
        <html><body><table>
        <tr><td><a href="/fedora/objects/demo:1/datastreams/DC/content">DC</a></td><td>Dublin Core</td></tr>
        <tr><td><a href="/fedora/objects/demo:1/datastreams/RELS-EXT/content">RELS-EXT</a></td><td>Relationships</td></tr>
        </table></body></html>
    "#};
    let filtered = enforcer
        .enforce_response(operation, &request, html.as_bytes().to_vec())
        .await
        .unwrap();
    let filtered = String::from_utf8(filtered).unwrap();
    assert!(filtered.contains("Dublin Core"));
    assert!(!filtered.contains("Relationships"));
}

#[test_log::test(tokio::test)]
async fn risearch_formats() {
    let dir = tempfile::tempdir().unwrap();
    let enforcer = demo_enforcer(&dir, Backend::Indexed);

    let request = PepRequest::new(Method::GET, "/risearch").with_query("type=triples&lang=spo");
    let rdf = indoc! {r#"
        <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
            xmlns:dc="http://purl.org/dc/elements/1.1/">
          <rdf:Description rdf:about="info:fedora/demo:1"><dc:title>One</dc:title></rdf:Description>
          <rdf:Description rdf:about="info:fedora/demo:2"><dc:title>Two</dc:title></rdf:Description>
          <rdf:Description rdf:about="info:fedora/demo:3"><dc:title>Three</dc:title></rdf:Description>
        </rdf:RDF>
    "#};
    let filtered = enforcer
        .enforce_response("risearch", &request, rdf.as_bytes().to_vec())
        .await
        .unwrap();
    assert_eq!(
        String::from_utf8(filtered).unwrap(),
        indoc! {r#"
            <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
                xmlns:dc="http://purl.org/dc/elements/1.1/">
              <rdf:Description rdf:about="info:fedora/demo:1"><dc:title>One</dc:title></rdf:Description>
              <rdf:Description rdf:about="info:fedora/demo:3"><dc:title>Three</dc:title></rdf:Description>
            </rdf:RDF>
        "#}
    );

    let request = PepRequest::new(Method::GET, "/risearch").with_query("type=tuples&format=Sparql");
    let sparql = indoc! {r#"
        <sparql xmlns="http://www.w3.org/2001/sw/DataAccess/rf1/result">
          <head><variable name="o"/></head>
          <results>
            <result><o uri="info:fedora/demo:1"/></result>
            <result><o uri="info:fedora/demo:2"/></result>
            <result><o uri="info:fedora/demo:3"/></result>
          </results>
        </sparql>
    "#};
    let filtered = enforcer
        .enforce_response("risearch", &request, sparql.as_bytes().to_vec())
        .await
        .unwrap();
    let filtered = String::from_utf8(filtered).unwrap();
    assert!(filtered.contains("info:fedora/demo:1"));
    assert!(!filtered.contains("info:fedora/demo:2"));
    assert!(filtered.contains("info:fedora/demo:3"));
    assert!(filtered.contains(r#"<head><variable name="o"/></head>"#));

    let request =
        PepRequest::new(Method::GET, "/risearch").with_query("type=triples&format=N-Triples");
    let graph = indoc! {r#"
        <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
            xmlns:dc="http://purl.org/dc/elements/1.1/"
            xmlns:rel="info:fedora/fedora-system:def/relations-external#">
          <rdf:Description rdf:about="info:fedora/demo:1"><dc:title>One</dc:title></rdf:Description>
          <rdf:Description rdf:about="info:fedora/demo:2"><dc:title>Two</dc:title></rdf:Description>
          <rdf:Description rdf:about="info:fedora/demo:3">
            <rel:isMemberOf rdf:resource="info:fedora/demo:1"/>
            <dc:title>Three</dc:title>
          </rdf:Description>
        </rdf:RDF>
    "#};
    let filtered = enforcer
        .enforce_response("risearch", &request, graph.as_bytes().to_vec())
        .await
        .unwrap();
    assert_eq!(
        String::from_utf8(filtered).unwrap(),
        indoc! {r#"
            <info:fedora/demo:1> <http://purl.org/dc/elements/1.1/title> "One" .
            <info:fedora/demo:3> <info:fedora/fedora-system:def/relations-external#isMemberOf> <info:fedora/demo:1> .
            <info:fedora/demo:3> <http://purl.org/dc/elements/1.1/title> "Three" .
        "#}
    );

    let sparql_as_ntriples = enforcer
        .enforce_response("risearch", &request, sparql.as_bytes().to_vec())
        .await;
    assert!(matches!(sparql_as_ntriples, Err(Error::ResponseParse(_))));
}

#[test_log::test(tokio::test)]
async fn unparseable_responses_fail() {
    let dir = tempfile::tempdir().unwrap();
    let enforcer = demo_enforcer(&dir, Backend::File);
    let request = find_objects_request();

    let truncated = &FIND_OBJECTS_XML[..FIND_OBJECTS_XML.len() / 2];
    let result = enforcer
        .enforce_response("findObjects", &request, truncated.as_bytes().to_vec())
        .await;
    assert!(matches!(result, Err(Error::ResponseParse(_))));

    let request = PepRequest::new(Method::GET, "/risearch").with_query("format=CSV");
    let result = enforcer
        .enforce_response("risearch", &request, b"\"s\"\ninfo:fedora/demo:2\n".to_vec())
        .await;
    assert!(matches!(result, Err(Error::ResponseParse(_))));

    let request = PepRequest::new(Method::GET, "/objects/demo:1/datastreams").with_query("format=xml");
    let result = enforcer
        .enforce_response("listDatastreams", &request, FIND_OBJECTS_XML.as_bytes().to_vec())
        .await;
    assert!(matches!(result, Err(Error::ResponseParse(_))));
}

/// Denies everything, with a configurable defect.
enum Faulty {
    /// Results carry no resource-id.
    Uncorrelated,
    /// Results are indeterminate with an error status.
    Failing,
    /// One result too few.
    Short,
}

impl DecisionEvaluator for Faulty {
    fn evaluate(&self, request: RequestContext) -> EvalFuture<'_, DecisionResult> {
        Box::pin(async move {
            let resource_id = request.resource_id();
            Ok(match self {
                Faulty::Uncorrelated | Faulty::Short => DecisionResult::new(None, Decision::Deny),
                Faulty::Failing => DecisionResult::indeterminate(
                    resource_id,
                    Status::error(xacml::STATUS_PROCESSING_ERROR, "boom"),
                ),
            })
        })
    }

    fn evaluate_batch(&self, requests: Vec<RequestContext>) -> EvalFuture<'_, Vec<DecisionResult>> {
        Box::pin(async move {
            let skip = matches!(self, Faulty::Short) as usize;
            let mut results = vec![];
            for request in requests.into_iter().skip(skip) {
                results.push(self.evaluate(request).await?);
            }
            Ok(results)
        })
    }
}

async fn filter_with(evaluator: Faulty) -> Result<String, Error> {
    let enforcer = Enforcer::with_default_filters(Arc::new(evaluator), ContextBuilder::new());
    let filtered = enforcer
        .enforce_response(
            "findObjects",
            &find_objects_request(),
            FIND_OBJECTS_XML.as_bytes().to_vec(),
        )
        .await?;
    Ok(String::from_utf8(filtered).unwrap())
}

#[test_log::test(tokio::test)]
async fn uncorrelated_results_leave_entries() {
    assert_eq!(filter_with(Faulty::Uncorrelated).await.unwrap(), FIND_OBJECTS_XML);
}

#[test_log::test(tokio::test)]
async fn error_status_removes_entries() {
    let filtered = filter_with(Faulty::Failing).await.unwrap();
    assert!(!filtered.contains("objectFields"));
    assert!(filtered.contains("<resultList>"));
}

#[test_log::test(tokio::test)]
async fn short_batches_fail() {
    assert!(matches!(
        filter_with(Faulty::Short).await,
        Err(Error::Evaluation(EvaluationError::ResultCount {
            expected: 3,
            actual: 2
        }))
    ));
}
