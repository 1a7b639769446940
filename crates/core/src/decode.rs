//! Explicit per-kind decoding of an opaque object payload into [`ReadinessStatus`].

use serde_json::Value as Json;
use thiserror::Error;

use crate::condition::ReadinessStatus;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not an object")]
    NotAnObject,
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("{field}: expected {expected}")]
    Type { field: &'static str, expected: &'static str },
    #[error("{field}: {source}")]
    Field {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Maps an object payload of one resource kind to its readiness status.
///
/// Decoders are chosen by the caller when building a `WatchTarget`; there is no
/// process-wide registry of kinds.
pub trait StatusDecoder: Send + Sync {
    fn decode(&self, object: &Json) -> Result<ReadinessStatus, DecodeError>;
}

/// Decoder for the conventional `status.observedGeneration` + `status.conditions` layout.
///
/// An absent or null `status` decodes to an empty status (nothing reported yet). Any
/// present field with the wrong shape, or a condition status outside
/// `True|False|Unknown`, is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionsDecoder;

impl StatusDecoder for ConditionsDecoder {
    fn decode(&self, object: &Json) -> Result<ReadinessStatus, DecodeError> {
        let obj = object.as_object().ok_or(DecodeError::NotAnObject)?;
        match obj.get("status") {
            None | Some(Json::Null) => Ok(ReadinessStatus::default()),
            Some(status @ Json::Object(_)) => {
                serde_json::from_value(status.clone()).map_err(|source| DecodeError::Field { field: "status", source })
            }
            Some(_) => Err(DecodeError::Type { field: "status", expected: "object" }),
        }
    }
}

impl<F> StatusDecoder for F
where
    F: Fn(&Json) -> Result<ReadinessStatus, DecodeError> + Send + Sync,
{
    fn decode(&self, object: &Json) -> Result<ReadinessStatus, DecodeError> {
        self(object)
    }
}
