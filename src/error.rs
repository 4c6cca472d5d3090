//! Error types for the broker
//!
//! `StoreError` covers the resource store contract. `BrokerError` is the
//! request-level taxonomy; each variant maps to an HTTP status and an OSB
//! error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::model::OsbError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Create-if-absent found an existing object with the same name
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("resource store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the object as invalid, e.g. a malformed name or label
    #[error("resource store rejected the object: {0}")]
    Rejected(String),

    #[error("cannot convert {kind}: {message}")]
    Serialization { kind: String, message: String },
}

impl StoreError {
    pub fn serialization(kind: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Serialization {
            kind: kind.into(),
            message: err.to_string(),
        }
    }
}

impl From<kube::Error> for StoreError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(ae) if ae.code == 400 || ae.code == 422 => StoreError::Rejected(ae.message),
            e => StoreError::Unavailable(e.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("cannot decode request body: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("cannot find template for service {0}")]
    TemplateNotFound(String),

    #[error("cannot find plan {plan_id} for service {service_id}")]
    PlanNotFound { service_id: String, plan_id: String },

    #[error("parameter {0} must be included")]
    MissingRequiredParameter(String),

    #[error("parameter {name} is invalid: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("template instance {namespace}/{name} already exists")]
    InstanceConflict { namespace: String, name: String },

    #[error("cannot find template instance for service instance {0}")]
    InstanceNotFound(String),

    #[error("manifest object #{index} is malformed: {message}")]
    InvalidManifestObject { index: usize, message: String },

    #[error("{kind} {namespace}/{name} referenced by the instance does not exist")]
    BoundResourceNotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("cannot get namespace: {0}")]
    NamespaceUndiscoverable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BrokerError {
    pub fn status(&self) -> StatusCode {
        match self {
            BrokerError::Store(StoreError::Rejected(_)) => StatusCode::BAD_REQUEST,
            BrokerError::Store(_) | BrokerError::NamespaceUndiscoverable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Whether retrying the identical request may succeed
    pub fn update_repeatable(&self) -> bool {
        matches!(
            self,
            BrokerError::Store(StoreError::Unavailable(_) | StoreError::Serialization { .. })
        )
    }

    fn error_code(&self) -> &'static str {
        match self {
            BrokerError::InstanceConflict { .. } => "Conflict",
            BrokerError::Store(StoreError::Rejected(_)) => "BadRequest",
            BrokerError::Store(_) | BrokerError::NamespaceUndiscoverable(_) => "InternalServerError",
            _ => "BadRequest",
        }
    }

    pub fn to_body(&self) -> OsbError {
        OsbError {
            error: self.error_code().to_string(),
            description: self.to_string(),
            instance_usable: false,
            update_repeatable: self.update_repeatable(),
        }
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{}", self);
        } else {
            log::warn!("{}", self);
        }
        (status, Json(self.to_body())).into_response()
    }
}
