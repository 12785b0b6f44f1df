//! Request pipeline of the processor
//!
//! Steps run strictly in order and the first failing step decides the
//! response: transport check, decode, field check, protocol check, method
//! lookup, request id injection, invocation, request id cleanup, duration
//! capture. Transport failures answer with a bare status code; every later
//! failure answers with a response envelope carrying a reserved error.

use std::time::Instant;

use axum::{
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response as HttpResponse},
};
use tracing::{debug, error};

use crate::rpc::{ErrorCode, MetaData, Request, Response, RpcError};
use crate::server::processor::Processor;
use crate::server::transport::{check_http_request, JSON_MEDIA_TYPE};

/// Result of running one HTTP request through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Rejected at the transport level; answered without an envelope.
    Rejected(StatusCode),
    Responded(Response),
}

impl Processor {
    /// Runs the pipeline for one request. `body` is `None` when the request
    /// body could not be read.
    pub fn process(&self, method: &Method, headers: &HeaderMap, body: Option<&[u8]>) -> Outcome {
        let mut call = Call::start(self);

        if let Err(status) = check_http_request(method, headers) {
            return Outcome::Rejected(status);
        }

        if let Err(err) = call.run(body) {
            call.response.result = None;
            call.response.error = Some(err);
        }

        Outcome::Responded(call.finish())
    }
}

struct Call<'p> {
    processor: &'p Processor,
    started_at: Option<Instant>,
    meta: MetaData,
    response: Response,
}

impl<'p> Call<'p> {
    fn start(processor: &'p Processor) -> Self {
        let started_at = processor
            .settings()
            .is_duration_enabled()
            .then(Instant::now);
        processor.count_received();

        Self {
            processor,
            started_at,
            meta: MetaData::new(),
            response: Response::new(),
        }
    }

    fn run(&mut self, body: Option<&[u8]>) -> Result<(), RpcError> {
        let request = decode(body)?;
        self.response.id = request.id.clone();

        if !request.has_all_root_fields() {
            return Err(reserved(ErrorCode::INVALID_REQUEST));
        }

        if !request.has_supported_protocol() {
            return Err(reserved(ErrorCode::UNSUPPORTED_PROTOCOL));
        }

        let Request {
            id: Some(id),
            method: Some(method),
            params,
            ..
        } = request
        else {
            return Err(reserved(ErrorCode::INVALID_REQUEST));
        };

        self.processor
            .lookup_function(&method)
            .map_err(|_| reserved(ErrorCode::UNKNOWN_METHOD))?;

        let settings = self.processor.settings();
        if let Some(field) = &settings.request_id_field_name {
            self.meta
                .add_field(field.as_str(), id)
                .map_err(|_| reserved(ErrorCode::INTERNAL_RPC_ERROR))?;
        }

        match self
            .processor
            .invoke(&method, params.as_deref(), &mut self.meta)
        {
            Ok(result) => self.response.result = Some(result),
            Err(err) => self.response.error = Some(err),
        }

        if let Some(field) = &settings.request_id_field_name {
            self.meta
                .remove_field(field)
                .map_err(|_| reserved(ErrorCode::INTERNAL_RPC_ERROR))?;
        }

        if let (Some(field), Some(started_at)) = (&settings.duration_field_name, self.started_at) {
            let elapsed_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
            self.meta
                .add_field(field.as_str(), elapsed_ms)
                .map_err(|_| reserved(ErrorCode::INTERNAL_RPC_ERROR))?;
        }

        debug!(method = %method, id = ?self.response.id, "rpc call finished");
        Ok(())
    }

    fn finish(mut self) -> Response {
        if !self.meta.is_empty() {
            self.response.meta = Some(self.meta);
        }

        self.response.ok = !self.response.has_error();
        if self.response.ok {
            self.processor.count_successful();
        }

        self.response
    }
}

fn decode(body: Option<&[u8]>) -> Result<Request, RpcError> {
    let body = body.ok_or_else(|| reserved(ErrorCode::REQUEST_IS_NOT_READABLE))?;
    serde_json::from_slice(body).map_err(|err| {
        debug!(error = %err, "request body is not readable");
        reserved(ErrorCode::REQUEST_IS_NOT_READABLE)
    })
}

fn reserved(code: ErrorCode) -> RpcError {
    RpcError::system_or_panic(code)
}

impl IntoResponse for Outcome {
    fn into_response(self) -> HttpResponse {
        let response = match self {
            Self::Rejected(status) => return status.into_response(),
            Self::Responded(response) => response,
        };

        let body = serde_json::to_vec(&response).unwrap_or_else(|err| {
            error!(error = %err, "failed to encode rpc response");
            Vec::new()
        });

        (
            [(CONTENT_TYPE, HeaderValue::from_static(JSON_MEDIA_TYPE))],
            body,
        )
            .into_response()
    }
}
