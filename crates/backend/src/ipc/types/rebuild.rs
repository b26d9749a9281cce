//! Rebuild IPC types - operator triggers and coordinator status
use serde::{Deserialize, Serialize};

use crate::actor::message::{CoordinatorStatus, TriggerOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "params")]
pub enum RebuildRequest {
  Trigger(RebuildTriggerParams),
  Status(RebuildStatusParams),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "data")]
pub enum RebuildResponse {
  Trigger(RebuildTriggerResult),
  Status(Box<CoordinatorStatus>),
}

/// Release hook and CLI entry point for starting a cycle.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RebuildTriggerParams;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RebuildStatusParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildTriggerResult {
  pub outcome: TriggerOutcome,
}

use crate::{
  impl_ipc_request,
  ipc::{RequestData, ResponseData},
};

impl_ipc_request!(
  RebuildTriggerParams => RebuildTriggerResult,
  ResponseData::Rebuild(RebuildResponse::Trigger(v)) => v,
  v => RequestData::Rebuild(RebuildRequest::Trigger(v)),
  v => ResponseData::Rebuild(RebuildResponse::Trigger(v))
);
impl_ipc_request!(
  RebuildStatusParams => Box<CoordinatorStatus>,
  ResponseData::Rebuild(RebuildResponse::Status(v)) => v,
  v => RequestData::Rebuild(RebuildRequest::Status(v)),
  v => ResponseData::Rebuild(RebuildResponse::Status(v))
);
