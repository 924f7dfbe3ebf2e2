//! The closed endpoint set and the endpoint -> pipeline-stage-list mapping
//! (spec.md §4.3, §4.6, §6).

use crate::registry::ServiceName;

/// One step of a pipeline (spec.md §4.2's `StageRequest` sum type: the seven
/// kinds of requests a pipeline stage can issue). Distinct from
/// [`ServiceName`]: `DirectionAngle`, `ReferencePoint`, and `Obstruction` are
/// three different wire contracts but are all served by the obstruction
/// microservice (grounded on `service_map.py`, which registers all three
/// executor classes against the same obstruction-service client).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    DirectionAngle,
    ReferencePoint,
    Obstruction,
    Encode,
    Model,
    Merge,
    Stats,
}

impl Stage {
    /// The downstream microservice this stage's requests are sent to.
    pub fn service(self) -> ServiceName {
        match self {
            Self::DirectionAngle | Self::ReferencePoint | Self::Obstruction => {
                ServiceName::Obstruction
            }
            Self::Encode => ServiceName::Encoder,
            Self::Model => ServiceName::Model,
            Self::Merge => ServiceName::Merger,
            Self::Stats => ServiceName::Stats,
        }
    }

    /// The downstream HTTP path this stage calls, relative to the service's
    /// base URL (spec.md §4.2's wire-contract table; `Obstruction` uses the
    /// `_parallel` suffix per the per-window fan-out decision in
    /// SPEC_FULL.md §9 Open Question 1).
    pub fn downstream_path(self) -> &'static str {
        match self {
            Self::DirectionAngle => "/calculate-direction",
            Self::ReferencePoint => "/get-reference-point",
            Self::Obstruction => "/obstruction_parallel",
            Self::Encode => "/encode",
            Self::Model => "/predict",
            Self::Merge => "/merge",
            Self::Stats => "/stats",
        }
    }
}

/// Every public HTTP endpoint the gateway exposes, mounted under `/v1/`
/// (spec.md §6: "Base path `/v<major>/`").
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Endpoint {
    CalculateDirection,
    GetReferencePoint,
    Obstruction,
    Horizon,
    Zenith,
    ObstructionAll,
    ObstructionParallel,
    Encode,
    EncodeRaw,
    Simulate,
    Merge,
    Stats,
}

impl Endpoint {
    /// Parses the path segment after the `/v1/` prefix (e.g. `simulate`,
    /// `obstruction_all`). `run` is accepted as an alias of `simulate`
    /// (spec.md §6: "`POST /v1/simulate` (alias `/run`)").
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        Some(match segment {
            "calculate-direction" => Self::CalculateDirection,
            "get-reference-point" => Self::GetReferencePoint,
            "obstruction" => Self::Obstruction,
            "horizon" => Self::Horizon,
            "zenith" => Self::Zenith,
            "obstruction_all" => Self::ObstructionAll,
            "obstruction_parallel" => Self::ObstructionParallel,
            "encode" => Self::Encode,
            "encode_raw" => Self::EncodeRaw,
            "simulate" | "run" => Self::Simulate,
            "merge" => Self::Merge,
            "stats" => Self::Stats,
            _ => return None,
        })
    }

    /// The canonical path segment this endpoint is mounted at. The `run`
    /// alias routes to the same handler via a separate router entry.
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::CalculateDirection => "calculate-direction",
            Self::GetReferencePoint => "get-reference-point",
            Self::Obstruction => "obstruction",
            Self::Horizon => "horizon",
            Self::Zenith => "zenith",
            Self::ObstructionAll => "obstruction_all",
            Self::ObstructionParallel => "obstruction_parallel",
            Self::Encode => "encode",
            Self::EncodeRaw => "encode_raw",
            Self::Simulate => "simulate",
            Self::Merge => "merge",
            Self::Stats => "stats",
        }
    }

    /// The ordered pipeline this endpoint drives (spec.md §4.3's endpoint ->
    /// service-list table, a closed set; restated here as `Stage`s rather
    /// than bare `ServiceName`s so the executor knows which wire contract to
    /// use at each step).
    pub fn stages(self) -> &'static [Stage] {
        use Stage::*;
        match self {
            // `/calculate-direction` and `/get-reference-point` ARE the
            // DirectionAngle/ReferencePoint requests; there's no further
            // fan-out after them.
            Self::CalculateDirection => &[DirectionAngle],
            Self::GetReferencePoint => &[ReferencePoint],
            Self::Obstruction | Self::Horizon | Self::Zenith => &[Obstruction],
            Self::ObstructionAll | Self::ObstructionParallel => {
                &[ReferencePoint, DirectionAngle, Obstruction]
            }
            Self::Encode => &[ReferencePoint, DirectionAngle, Obstruction, Encode],
            Self::EncodeRaw => &[Encode],
            Self::Simulate => &[
                ReferencePoint,
                DirectionAngle,
                Obstruction,
                Encode,
                Model,
                Merge,
            ],
            Self::Merge => &[Merge],
            Self::Stats => &[Stats],
        }
    }

    /// Whether this endpoint's pipeline includes a Merge stage, i.e.
    /// `accumulator.image` must be stripped per spec.md §4.3's pipeline
    /// algorithm ("if this endpoint includes a Merge stage: accumulator.image
    /// <- None").
    pub fn has_merge_stage(self) -> bool {
        self.stages().contains(&Stage::Merge)
    }

    /// Whether the final response is the binary `accumulator.image` payload
    /// rather than a JSON body (spec.md §4.5: `/encode`, `/encode_raw`).
    pub fn is_binary_response(self) -> bool {
        matches!(self, Self::Encode | Self::EncodeRaw)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn run_is_simulate_alias() {
        assert_eq!(
            Endpoint::from_path_segment("run"),
            Endpoint::from_path_segment("simulate")
        );
    }

    #[test]
    fn simulate_pipeline_matches_spec() {
        use Stage::*;
        assert_eq!(
            Endpoint::Simulate.stages(),
            &[ReferencePoint, DirectionAngle, Obstruction, Encode, Model, Merge]
        );
    }

    #[test]
    fn merge_stage_strips_image() {
        assert!(Endpoint::Simulate.has_merge_stage());
        assert!(Endpoint::Merge.has_merge_stage());
        assert!(!Endpoint::Encode.has_merge_stage());
    }

    #[test]
    fn unknown_path_segment_is_none() {
        assert_eq!(Endpoint::from_path_segment("nonexistent"), None);
    }

    #[test]
    fn every_stage_resolves_to_a_service() {
        use ServiceName::*;
        assert_eq!(Stage::DirectionAngle.service(), Obstruction);
        assert_eq!(Stage::ReferencePoint.service(), Obstruction);
        assert_eq!(Stage::Obstruction.service(), Obstruction);
        assert_eq!(Stage::Encode.service(), Encoder);
        assert_eq!(Stage::Model.service(), Model);
        assert_eq!(Stage::Merge.service(), Merger);
        assert_eq!(Stage::Stats.service(), Stats);
    }
}
