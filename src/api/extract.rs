use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::BrokerError;

/// JSON body extractor whose rejection is an OSB error body.
///
/// `axum::Json` answers malformed bodies with plain text and 415/422 codes;
/// brokers must answer 400 with `{error, description}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrokerJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for BrokerJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = BrokerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(decode_error(rejection)),
        }
    }
}

fn decode_error(rejection: JsonRejection) -> BrokerError {
    BrokerError::Decode(rejection.body_text())
}
