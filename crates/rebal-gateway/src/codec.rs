//! Byte-level encoding of solver traffic.
//!
//! JSON through serde. Backends receive and return opaque bytes; only this
//! module knows the layout.

use chrono::{DateTime, Utc};
use rebal_assembly::{Specification, SpecificationBody};
use rebal_schemas::{RequestEnvelope, SolveResponse};

use crate::error::GatewayError;

pub type SolveRequest = RequestEnvelope<SpecificationBody>;

pub fn encode_request(spec: &Specification, created_at_utc: DateTime<Utc>) -> Result<Vec<u8>, GatewayError> {
    let envelope = RequestEnvelope {
        request_id: spec.request_id(),
        created_at_utc,
        spec_hash: spec.spec_hash().to_string(),
        payload: spec.body(),
    };
    serde_json::to_vec(&envelope).map_err(|e| codec_error("encode request", e))
}

pub fn decode_request(bytes: &[u8]) -> Result<SolveRequest, GatewayError> {
    serde_json::from_slice(bytes).map_err(|e| codec_error("decode request", e))
}

pub fn encode_response(response: &SolveResponse) -> Result<Vec<u8>, GatewayError> {
    serde_json::to_vec(response).map_err(|e| codec_error("encode response", e))
}

pub fn decode_response(bytes: &[u8]) -> Result<SolveResponse, GatewayError> {
    serde_json::from_slice(bytes).map_err(|e| codec_error("decode response", e))
}

fn codec_error(stage: &str, e: serde_json::Error) -> GatewayError {
    GatewayError::Codec {
        message: format!("{stage}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_a_codec_error() {
        let err = decode_response(b"not json").unwrap_err();
        assert_eq!(err.kind(), "codec");
        assert!(err.to_string().contains("decode response"));
    }
}
