//! HTTP transport implementation.
//!
//! Maps the remote contract onto CBOR-over-POST endpoints. The actual HTTP
//! client is abstracted via a trait so different libraries (or non-HTTP
//! transports) can be plugged in; the adapter owns authentication headers,
//! body encoding, and status classification.

use crate::error::{SyncError, SyncResult};
use crate::transport::{Ack, ChangePage, RemoteTransport, TokenProvider};
use fitlog_core::{EntityKind, EntityRecord, Timestamp};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// HTTP client abstraction.
///
/// Implementations own connection pooling and the per-call timeout (the
/// engine's `call_timeout` should be applied here); a timed-out or failed
/// request is reported through `Err`, which the adapter treats as
/// unreachable.
pub trait HttpClient: Send + Sync {
    /// Sends a POST with a bearer credential and returns status plus body.
    fn post(&self, url: &str, bearer: &str, body: Vec<u8>) -> Result<HttpResponse, String>;
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

#[derive(Serialize)]
struct DeleteRequest {
    id: Uuid,
    updated_at: Timestamp,
}

#[derive(Serialize)]
struct ChangesRequest<'a> {
    since: Timestamp,
    page_token: Option<&'a str>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// HTTP-based remote transport.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    tokens: Arc<dyn TokenProvider>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport rooted at `base_url`.
    pub fn new(base_url: impl Into<String>, client: C, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            tokens,
        }
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post_cbor<Req, Res>(
        &self,
        endpoint: &str,
        request: &Req,
        kind: EntityKind,
        id: Uuid,
    ) -> SyncResult<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let mut body = Vec::new();
        ciborium::into_writer(request, &mut body)
            .map_err(|e| SyncError::Protocol(format!("request encode failed: {e}")))?;

        let bearer = self.tokens.bearer_token()?;
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url, &bearer, body)
            .map_err(SyncError::unreachable)?;

        classify_status(response.status, kind, id, &response.body)?;

        ciborium::from_reader(response.body.as_slice())
            .map_err(|e| SyncError::Protocol(format!("response decode failed: {e}")))
    }
}

/// Maps an HTTP status onto the sync error taxonomy.
///
/// 2xx passes through. 401/403 is an expired credential (pass-fatal), 422 a
/// per-record validation rejection, and 408/409/423/425/429 plus every 5xx a
/// transient unreachable. Anything else is a protocol error.
fn classify_status(status: u16, kind: EntityKind, id: Uuid, body: &[u8]) -> SyncResult<()> {
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(SyncError::AuthExpired),
        422 => Err(SyncError::RemoteValidationRejected {
            kind,
            id,
            message: remote_message(body),
        }),
        408 | 409 | 423 | 425 | 429 => Err(SyncError::unreachable(format!("status {status}"))),
        500..=599 => Err(SyncError::unreachable(format!("status {status}"))),
        other => Err(SyncError::Protocol(format!("unexpected status {other}"))),
    }
}

fn remote_message(body: &[u8]) -> String {
    ciborium::from_reader::<ErrorBody, _>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| "rejected".into())
}

impl<C: HttpClient> RemoteTransport for HttpTransport<C> {
    fn upsert(&self, kind: EntityKind, record: &EntityRecord) -> SyncResult<Ack> {
        self.post_cbor(
            &format!("/sync/{kind}/upsert"),
            record,
            kind,
            record.id,
        )
    }

    fn delete(&self, kind: EntityKind, id: Uuid, updated_at: Timestamp) -> SyncResult<Ack> {
        self.post_cbor(
            &format!("/sync/{kind}/delete"),
            &DeleteRequest { id, updated_at },
            kind,
            id,
        )
    }

    fn fetch_changed_since(
        &self,
        kind: EntityKind,
        since: Timestamp,
        page_token: Option<&str>,
    ) -> SyncResult<ChangePage> {
        self.post_cbor(
            &format!("/sync/{kind}/changes"),
            &ChangesRequest { since, page_token },
            kind,
            Uuid::nil(),
        )
    }
}
