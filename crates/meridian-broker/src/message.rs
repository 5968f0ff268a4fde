//! Structured RPC messages carried over the broker.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use meridian_core::RpcError;

/// An RPC invocation addressed to a hosted service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Target service name.
    pub service: String,
    /// Method name on the target service.
    pub method: String,
    /// Named-field argument bag as a JSON object.
    pub args: Value,
    /// Channel the reply must be published to.
    pub reply_to: String,
    /// Correlation ID echoed by the reply.
    pub correlation_id: Uuid,
    /// Request timestamp in milliseconds since Unix epoch.
    pub timestamp_ms: u64,
}

impl RpcRequest {
    /// Creates a new request with a fresh correlation ID.
    #[must_use]
    pub fn new(service: impl Into<String>, method: impl Into<String>, args: Value) -> Self {
        let correlation_id = Uuid::new_v4();
        Self {
            service: service.into(),
            method: method.into(),
            args,
            reply_to: format!("reply:{correlation_id}"),
            correlation_id,
            timestamp_ms: current_timestamp_ms(),
        }
    }
}

/// The result carried by an [`RpcReply`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyResult {
    /// Successful invocation with its JSON result.
    Ok(Value),
    /// Failed invocation with a coded error.
    Err {
        /// Stable wire code, see [`RpcError::code`].
        code: u8,
        /// Human-readable message.
        message: String,
    },
}

/// A reply to an [`RpcRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcReply {
    /// Correlation ID echoed from the request.
    pub correlation_id: Uuid,
    /// The invocation result.
    pub result: ReplyResult,
    /// Reply timestamp in milliseconds since Unix epoch.
    pub timestamp_ms: u64,
}

impl RpcReply {
    /// Builds a reply to the given request.
    #[must_use]
    pub fn to_request(request: &RpcRequest, result: Result<Value, RpcError>) -> Self {
        let result = match result {
            Ok(value) => ReplyResult::Ok(value),
            Err(error) => ReplyResult::Err {
                code: error.code(),
                message: error.detail().to_owned(),
            },
        };

        Self {
            correlation_id: request.correlation_id,
            result,
            timestamp_ms: current_timestamp_ms(),
        }
    }

    /// Converts the reply back into a dispatch result.
    #[must_use]
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.result {
            ReplyResult::Ok(value) => Ok(value),
            ReplyResult::Err { code, message } => Err(RpcError::from_code(code, &message)),
        }
    }
}

/// Returns the current timestamp in milliseconds since Unix epoch.
fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reply_echoes_correlation_id() {
        let request = RpcRequest::new("billing", "charge", json!({ "amount": 5 }));
        let reply = RpcReply::to_request(&request, Ok(json!({ "charged": true })));

        assert_eq!(reply.correlation_id, request.correlation_id);
    }

    #[test]
    fn reply_result_roundtrip() {
        let request = RpcRequest::new("billing", "charge", json!({}));

        let ok = RpcReply::to_request(&request, Ok(json!({ "x": 1 })));
        assert_eq!(ok.into_result(), Ok(json!({ "x": 1 })));

        let err = RpcReply::to_request(
            &request,
            Err(RpcError::MethodNotFound("charge".to_owned())),
        );
        assert_eq!(
            err.into_result(),
            Err(RpcError::MethodNotFound("charge".to_owned()))
        );
    }

    #[test]
    fn request_reply_serialise_as_json() {
        let request = RpcRequest::new("billing", "charge", json!({ "amount": 5 }));
        let encoded = serde_json::to_vec(&request).unwrap();
        let decoded: RpcRequest = serde_json::from_slice(&encoded).unwrap();

        assert_eq!(decoded.correlation_id, request.correlation_id);
        assert_eq!(decoded.method, "charge");
        assert_eq!(decoded.reply_to, request.reply_to);
    }
}
