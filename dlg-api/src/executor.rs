//! The Pipeline Executor (spec.md §4.3, SPEC_FULL.md §4.3): drives the
//! ordered [`Stage`] list for one endpoint invocation, fanning out per
//! window where a stage's request type reports independence and merging
//! results back into the accumulator between stages.
//!
//! Grounded on `orchestrator.py`'s generic pipeline (SPEC_FULL.md §9 Open
//! Question 2): stages run strictly in order; within a stage, fan-out tasks
//! run concurrently via [`futures::future::join_all`] and a single task's
//! failure does not cancel its siblings (spec.md §5) - every task in the
//! stage is awaited to completion, and the first-observed failure is
//! returned only after all of them have resolved.

use std::future::Future;

use dlg_api_core::accumulator::{AccumulatorDelta, AccumulatorMap};
use dlg_api_core::endpoints::{Endpoint, Stage};
use dlg_api_core::error::GatewayApiError;
use dlg_api_core::registry::ServiceRegistry;
use dlg_api_core::wire::{
    direction_angle::DirectionAngleRequest, encode::EncodeRequest, merge::MergeRequest,
    model::ModelRequest, obstruction::ObstructionRequest,
    reference_point::ReferencePointRequest, stats::StatsRequest,
};
use dlg_api_core::wire::{direction_angle, encode, merge, model, obstruction, reference_point, stats};
use futures::future::join_all;

use crate::client::ServiceClient;

/// Drives [`Endpoint::stages`] against the downstream services, threading
/// an [`AccumulatorMap`] through each stage (spec.md §4.3's pipeline
/// algorithm).
pub struct PipelineExecutor {
    client: ServiceClient,
    registry: ServiceRegistry,
}

impl PipelineExecutor {
    pub fn new(client: ServiceClient, registry: ServiceRegistry) -> Self {
        Self { client, registry }
    }

    /// Runs the full pipeline for `endpoint`, returning the final
    /// accumulator. Strips `accumulator.image` once a Merge stage has run
    /// (spec.md §4.3's pipeline algorithm's last line, SPEC_FULL.md §3's
    /// MERGEABLE_KEYS note on `image`'s lifecycle).
    pub async fn run(
        &self,
        endpoint: Endpoint,
        mut accumulator: AccumulatorMap,
    ) -> Result<AccumulatorMap, GatewayApiError> {
        for &stage in endpoint.stages() {
            self.run_stage(stage, &mut accumulator).await?;
        }
        if endpoint.has_merge_stage() {
            accumulator.strip_image();
        }
        Ok(accumulator)
    }

    async fn run_stage(
        &self,
        stage: Stage,
        accumulator: &mut AccumulatorMap,
    ) -> Result<(), GatewayApiError> {
        let service = stage.service();
        let base_url = self.registry.base_url(service).to_owned();

        let deltas = match stage {
            Stage::DirectionAngle => {
                let requests = DirectionAngleRequest::parse(accumulator);
                join_and_collect(requests.iter().map(|request| async {
                    let json = self
                        .client
                        .post_json(service, &base_url, stage, &request.to_wire())
                        .await?;
                    direction_angle::parse_response(&json)
                }))
                .await?
            }
            Stage::ReferencePoint => {
                let requests = ReferencePointRequest::parse(accumulator);
                join_and_collect(requests.iter().map(|request| async {
                    let json = self
                        .client
                        .post_json(service, &base_url, stage, &request.to_wire())
                        .await?;
                    reference_point::parse_response(&json)
                }))
                .await?
            }
            Stage::Obstruction => {
                let requests = ObstructionRequest::parse(accumulator);
                join_and_collect(requests.iter().map(|request| async {
                    let json = self
                        .client
                        .post_json(service, &base_url, stage, &request.to_wire())
                        .await?;
                    obstruction::parse_response(&request.window_name, &json)
                }))
                .await?
            }
            Stage::Encode => {
                let requests = EncodeRequest::parse(accumulator);
                let all_window_names = accumulator.window_names();
                join_and_collect(requests.iter().map(|request| async {
                    let bytes = self
                        .client
                        .post_binary(service, &base_url, stage, &request.to_wire())
                        .await?;
                    encode::parse_binary_response(&request.window_name, &all_window_names, &bytes)
                }))
                .await?
            }
            Stage::Model => {
                let requests = ModelRequest::parse(accumulator);
                join_and_collect(requests.iter().map(|request| async {
                    let json = self
                        .client
                        .post_multipart(
                            service,
                            &base_url,
                            stage,
                            "file",
                            "encoded.png",
                            request.encoded_png.clone(),
                            &[],
                        )
                        .await?;
                    model::parse_response(&request.window_name, &json)
                }))
                .await?
            }
            Stage::Merge => {
                let requests = MergeRequest::parse(accumulator);
                join_and_collect(requests.iter().map(|request| async {
                    let json = self
                        .client
                        .post_json(service, &base_url, stage, &request.to_wire())
                        .await?;
                    merge::parse_response(&json)
                }))
                .await?
            }
            Stage::Stats => {
                let requests = StatsRequest::parse(accumulator);
                join_and_collect(requests.iter().map(|request| async {
                    let json = self
                        .client
                        .post_json(service, &base_url, stage, &request.to_wire())
                        .await?;
                    stats::parse_response(&json)
                }))
                .await?
            }
        };

        for delta in deltas {
            accumulator.merge(delta);
        }
        Ok(())
    }
}

/// Awaits every future in `futures` to completion regardless of individual
/// failure (spec.md §5: "sibling tasks are allowed to complete... no
/// mid-flight cancellation"), then returns the first-observed error, if
/// any, only after every task has resolved.
async fn join_and_collect<F>(
    futures: impl Iterator<Item = F>,
) -> Result<Vec<AccumulatorDelta>, GatewayApiError>
where
    F: Future<Output = Result<AccumulatorDelta, GatewayApiError>>,
{
    let results = join_all(futures).await;
    let mut first_err = None;
    let mut deltas = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(delta) => deltas.push(delta),
            Err(error) => {
                first_err.get_or_insert(error);
            }
        }
    }
    match first_err {
        Some(error) => Err(error),
        None => Ok(deltas),
    }
}

#[cfg(test)]
mod test {
    use dlg_api_core::registry::DeploymentMode;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use dlg_api_core::geometry::WindowGeometry;

    fn window() -> WindowGeometry {
        WindowGeometry {
            x1: -2.0,
            y1: 7.0,
            z1: 2.8,
            x2: -0.4,
            y2: 7.2,
            z2: 5.4,
            window_frame_ratio: 0.8,
            direction_angle: None,
            horizon: None,
            zenith: None,
        }
    }

    async fn registry_for(obstruction_url: &str) -> ServiceRegistry {
        ServiceRegistry::resolve(DeploymentMode::Local, None, |var| {
            (var == "OBSTRUCTION_SERVICE_URL").then(|| obstruction_url.to_owned())
        })
    }

    #[tokio::test]
    async fn calculate_direction_single_window_round_trip() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calculate-direction"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "direction_angle": { "w1": 1.5708 }
            })))
            .mount(&mock_server)
            .await;

        let executor = PipelineExecutor::new(
            ServiceClient::new(None),
            registry_for(&mock_server.uri()).await,
        );
        let accumulator = AccumulatorMap::new(
            None,
            BTreeMap::from([("w1".to_owned(), window())]),
            None,
            None,
            None,
            None,
        );
        let result = executor
            .run(Endpoint::CalculateDirection, accumulator)
            .await
            .unwrap();
        assert_eq!(result.direction_angle.get("w1"), Some(&1.5708));
    }

    #[tokio::test]
    async fn obstruction_all_fan_out_two_windows() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get-reference-point"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "reference_point": { "w1": {"x": 1.0, "y": 2.0, "z": 3.0} }
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/calculate-direction"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "direction_angle": { "w1": 1.0 }
            })))
            .mount(&mock_server)
            .await;
        let results: Vec<Value> = (0..64)
            .map(|i| {
                json!({
                    "horizon": { "obstruction_angle_degrees": i as f64 },
                    "zenith": { "obstruction_angle_degrees": i as f64 },
                })
            })
            .collect();
        Mock::given(method("POST"))
            .and(path("/obstruction_parallel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": { "results": results }
            })))
            .mount(&mock_server)
            .await;

        let executor = PipelineExecutor::new(
            ServiceClient::new(None),
            registry_for(&mock_server.uri()).await,
        );
        let accumulator = AccumulatorMap::new(
            None,
            BTreeMap::from([("w1".to_owned(), window())]),
            None,
            None,
            Some(dlg_api_core::geometry::Mesh(vec![])),
            None,
        );
        let result = executor
            .run(Endpoint::ObstructionAll, accumulator)
            .await
            .unwrap();
        assert_eq!(result.horizon.get("w1").unwrap().len(), 64);
        assert_eq!(result.zenith.get("w1").unwrap().len(), 64);
    }

    use serde_json::Value;

    #[tokio::test]
    async fn fan_out_failure_on_one_window_surfaces_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calculate-direction"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let executor = PipelineExecutor::new(
            ServiceClient::new(None),
            registry_for(&mock_server.uri()).await,
        );
        let accumulator = AccumulatorMap::new(
            None,
            BTreeMap::from([
                ("w1".to_owned(), window()),
                ("w2".to_owned(), window()),
            ]),
            None,
            None,
            None,
            None,
        );
        let error = executor
            .run(Endpoint::CalculateDirection, accumulator)
            .await
            .unwrap_err();
        assert!(matches!(
            error.kind,
            dlg_api_core::error::GatewayErrorKind::Authorization { .. }
        ));
    }
}
