//! Integration tests for the data modeling API client using wiremock
//!
//! These tests verify the request layout, response parsing and error
//! mapping of `CdfClient` against mocked endpoints.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{bearer_token, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dms_sync::cdf::{CdfClient, ResourceApi};
use dms_sync::loader::{ResourceLoader, SchemaLoaders};
use dms_sync::planner::{DeploymentExecutor, DeploymentPlanner, ExistingPolicy, KindExecution, MergePolicy};
use dms_sync::schema::{ContainerApply, ContainerId, ContainerKind, SpaceApply, SpaceId, SpaceKind};

const MODELS: &str = "/api/v1/projects/acme/models";

fn client(server: &MockServer) -> CdfClient {
    CdfClient::with_timeout(&server.uri(), "acme", "test-token", 5)
        .expect("client")
        .with_retry_delay(Duration::from_millis(1))
}

fn space_read(space: &str) -> serde_json::Value {
    json!({
        "space": space,
        "isGlobal": false,
        "createdTime": 1,
        "lastUpdatedTime": 2
    })
}

/// Test module for request layout and success paths
mod success_tests {
    use super::*;

    /// Creating spaces posts the items envelope with the bearer token
    #[tokio::test]
    async fn test_create_posts_items_envelope() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/spaces")))
            .and(bearer_token("test-token"))
            .and(body_json(json!({"items": [{"space": "sp", "name": "Assets"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [space_read("sp")]})))
            .expect(1)
            .mount(&server)
            .await;

        let mut space = SpaceApply::new("sp");
        space.name = Some(String::from("Assets"));

        let created = ResourceApi::<SpaceKind>::create(&client(&server), &[space])
            .await
            .expect("create should succeed");
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].space, "sp");
        assert_eq!(created[0].created_time, 1);
    }

    /// Retrieve posts identities to byids and omits unknown ones
    #[tokio::test]
    async fn test_retrieve_uses_byids() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/spaces/byids")))
            .and(body_json(json!({"items": [{"space": "sp"}, {"space": "gone"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [space_read("sp")]})))
            .mount(&server)
            .await;

        let ids = [SpaceId::new("sp"), SpaceId::new("gone")];
        let spaces = ResourceApi::<SpaceKind>::retrieve(&client(&server), &ids)
            .await
            .expect("retrieve should succeed");
        assert_eq!(spaces.len(), 1);
    }

    /// Delete posts identities to the delete endpoint
    #[tokio::test]
    async fn test_delete_returns_identities() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/containers/delete")))
            .and(body_json(json!({"items": [{"space": "sp", "externalId": "Pump"}]})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"items": [{"space": "sp", "externalId": "Pump"}]})),
            )
            .mount(&server)
            .await;

        let deleted =
            ResourceApi::<ContainerKind>::delete(&client(&server), &[ContainerId::new("sp", "Pump")])
                .await
                .expect("delete should succeed");
        assert_eq!(deleted, vec![ContainerId::new("sp", "Pump")]);
    }

    /// A cached loader on top of the client only calls the API once
    #[tokio::test]
    async fn test_loader_caches_retrieved_spaces() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/spaces/byids")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [space_read("sp")]})))
            .expect(1)
            .mount(&server)
            .await;

        let mut loaders = SchemaLoaders::new(&Arc::new(client(&server)), true);
        let ids = [SpaceId::new("sp")];
        let first = loaders.spaces.retrieve(&ids).await.expect("first retrieve");
        let second = loaders.spaces.retrieve(&ids).await.expect("second retrieve");
        assert_eq!(first, second);
    }
}

/// Test module for error mapping
mod error_tests {
    use super::*;

    /// A conflict naming one item fails only that item
    #[tokio::test]
    async fn test_conflict_names_failed_items() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/containers")))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": {
                    "code": 409,
                    "message": "Cannot change property type",
                    "duplicated": [{"space": "sp", "externalId": "Valve"}]
                }
            })))
            .mount(&server)
            .await;

        let items = [ContainerApply::new("sp", "Pump"), ContainerApply::new("sp", "Valve")];
        let failure = ResourceApi::<ContainerKind>::create(&client(&server), &items)
            .await
            .expect_err("create should fail");

        assert_eq!(failure.status, 409);
        assert!(failure.message.contains("Cannot change property type"));
        assert_eq!(failure.failed, vec![ContainerId::new("sp", "Valve")]);
        assert!(!failure.is_retryable());
    }

    /// An error body without items fails every requested item
    #[tokio::test]
    async fn test_plain_error_fails_everything() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/spaces")))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let items = [SpaceApply::new("a"), SpaceApply::new("b")];
        let failure = ResourceApi::<SpaceKind>::update(&client(&server), &items)
            .await
            .expect_err("update should fail");

        assert_eq!(failure.status, 400);
        assert_eq!(failure.failed, vec![SpaceId::new("a"), SpaceId::new("b")]);
    }

    /// 401 maps to an authentication failure and is not retried
    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/spaces/byids")))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": 401, "message": "Unauthorized"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let failure = ResourceApi::<SpaceKind>::retrieve(&client(&server), &[SpaceId::new("sp")])
            .await
            .expect_err("retrieve should fail");
        assert_eq!(failure.status, 401);
        assert_eq!(failure.failed, vec![SpaceId::new("sp")]);
    }

    /// Server errors are retried until the request succeeds
    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/spaces/byids")))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1)
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/spaces/byids")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [space_read("sp")]})))
            .with_priority(2)
            .expect(1)
            .mount(&server)
            .await;

        let spaces = ResourceApi::<SpaceKind>::retrieve(&client(&server), &[SpaceId::new("sp")])
            .await
            .expect("third attempt should succeed");
        assert_eq!(spaces.len(), 1);
    }

    /// Retries stop after three attempts
    #[tokio::test]
    async fn test_retries_are_bounded() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/spaces/byids")))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let failure = ResourceApi::<SpaceKind>::retrieve(&client(&server), &[SpaceId::new("sp")])
            .await
            .expect_err("retrieve should fail");
        assert_eq!(failure.status, 429);
        assert!(failure.is_retryable());
    }
}

/// Test module for batches the API rejects as a whole
mod rejected_batch_tests {
    use super::*;

    /// A conflict on one space applies nothing; force-create deletes the
    /// conflicting space and sends the whole batch again
    #[tokio::test]
    async fn test_force_create_resends_whole_batch() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/spaces")))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": {
                    "code": 409,
                    "message": "Space already exists",
                    "duplicated": [{"space": "a"}]
                }
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/spaces")))
            .and(body_json(json!({"items": [{"space": "a"}, {"space": "b"}]})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"items": [space_read("a"), space_read("b")]})),
            )
            .with_priority(2)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/spaces/byids")))
            .and(body_json(json!({"items": [{"space": "a"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [space_read("a")]})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/spaces/delete")))
            .and(body_json(json!({"items": [{"space": "a"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"space": "a"}]})))
            .expect(1)
            .mount(&server)
            .await;

        let mut loader = ResourceLoader::<SpaceKind>::new(Arc::new(client(&server)));
        let forced = loader
            .create_force(&[SpaceApply::new("a"), SpaceApply::new("b")])
            .await;

        let created = forced.result.expect("second create should succeed");
        let names: Vec<_> = created.iter().map(|s| s.space.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(forced.deleted.len(), 1);
        assert_eq!(forced.deleted[0].space, "a");
    }

    /// Spaces missing from a create response are failures, not creations
    #[tokio::test]
    async fn test_create_without_read_form_is_not_reported_created() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/spaces/byids")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("{MODELS}/spaces")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [space_read("a")]})))
            .expect(1)
            .mount(&server)
            .await;

        let mut loader = ResourceLoader::<SpaceKind>::new(Arc::new(client(&server)));
        let plan = DeploymentPlanner::new(ExistingPolicy::Update, MergePolicy::Merge)
            .plan_kind(&mut loader, &[SpaceApply::new("a"), SpaceApply::new("b")])
            .await
            .expect("plan");

        let mut execution = KindExecution::new(&plan);
        DeploymentExecutor::new(ExistingPolicy::Update)
            .create_phase(&mut loader, &plan, &mut execution)
            .await;

        assert_eq!(execution.report.created, vec!["a"]);
        assert_eq!(execution.created, vec![SpaceId::new("a")]);
        assert_eq!(execution.report.failed_created.len(), 1);
        assert_eq!(execution.report.failed_created[0].resource_ids, vec!["b"]);
        assert_eq!(execution.report.failed_created[0].status_code, 0);
    }
}
