//! Wire types for the line-delimited JSON worker protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Identifier correlating a request with its response.
///
/// Ids are allocated from a monotonically increasing counter and are never
/// reused, even across worker restarts, so a response frame can never be
/// delivered under a stale id.
pub type RequestId = u64;

/// A request frame sent to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeRequest {
	/// Correlation id, unique per in-flight request.
	pub id: RequestId,
	/// Worker operation name, e.g. `analyze` or `introspect_module`.
	pub method: String,
	/// Operation parameters.
	pub params: JsonValue,
}

/// A response frame received from the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeResponse {
	/// Correlation id of the request this answers.
	pub id: RequestId,
	/// Successful result, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<JsonValue>,
	/// Worker-reported error message, if the request failed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
