//! HTTP transport implementation using reqwest.
//!
//! This adapter implements the `HttpTransport` port. The underlying client
//! keeps a cookie store, so the session cookie set at login is sent back on
//! every later call, including the refresh call.

use std::collections::HashMap;
use std::future::Future;
use std::time::Instant;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use shopkeep_application::ports::{HttpTransport, OutboundRequest, TransportError};
use shopkeep_domain::{
    ClientSettings, HttpMethod, MultipartForm, PartValue, RequestBody, ResponseSpec,
};

/// HTTP transport backed by `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport configured from `settings`.
    ///
    /// Configuration:
    /// - Cookie store: enabled
    /// - Follow redirects: up to 10
    /// - User-Agent: `settings.user_agent`
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn new(settings: &ClientSettings) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self { client })
    }

    /// Creates a transport around an existing reqwest client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    const fn to_reqwest_method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    fn build_body(
        builder: RequestBuilder,
        body: &RequestBody,
    ) -> Result<RequestBuilder, TransportError> {
        match body {
            RequestBody::Empty => Ok(builder),
            RequestBody::Json(value) => {
                let bytes = serde_json::to_vec(value)
                    .map_err(|e| TransportError::InvalidBody(format!("Invalid JSON: {e}")))?;
                Ok(builder.body(bytes))
            }
            // reqwest sets the multipart Content-Type, boundary included.
            RequestBody::Multipart(form) => Ok(builder.multipart(Self::build_form(form)?)),
        }
    }

    fn build_form(form: &MultipartForm) -> Result<Form, TransportError> {
        form.parts.iter().try_fold(Form::new(), |multipart, part| {
            match &part.value {
                PartValue::Text(value) => Ok(multipart.text(part.name.clone(), value.clone())),
                PartValue::File {
                    file_name,
                    content_type,
                    bytes,
                } => {
                    let mime = content_type.clone().unwrap_or_else(|| {
                        mime_guess::from_path(file_name)
                            .first_or_octet_stream()
                            .essence_str()
                            .to_string()
                    });
                    let file = Part::bytes(bytes.clone())
                        .file_name(file_name.clone())
                        .mime_str(&mime)
                        .map_err(|e| {
                            TransportError::InvalidBody(format!("Invalid content type: {e}"))
                        })?;
                    Ok(multipart.part(part.name.clone(), file))
                }
            }
        })
    }

    fn map_error(error: &reqwest::Error, timeout_ms: u64) -> TransportError {
        if error.is_timeout() {
            return TransportError::Timeout { timeout_ms };
        }

        if error.is_connect() {
            return TransportError::ConnectionFailed(error.to_string());
        }

        if error.is_body() || error.is_builder() {
            return TransportError::InvalidBody(error.to_string());
        }

        TransportError::Other(error.to_string())
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(
        &self,
        request: &OutboundRequest,
    ) -> impl Future<Output = Result<ResponseSpec, TransportError>> + Send {
        let request = request.clone();

        async move {
            let timeout_ms = request.timeout_ms();
            let start = Instant::now();

            let mut builder = self
                .client
                .request(Self::to_reqwest_method(request.method), request.url.clone())
                .timeout(request.timeout);

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            if let Some(content_type) = request.body.content_type()
                && request.header("content-type").is_none()
            {
                builder = builder.header("Content-Type", content_type);
            }

            builder = Self::build_body(builder, &request.body)?;

            let response = builder
                .send()
                .await
                .map_err(|e| Self::map_error(&e, timeout_ms))?;

            let status = response.status().as_u16();
            let headers: HashMap<String, String> = response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("<binary>").to_string()))
                .collect();

            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::Other(format!("Failed to read body: {e}")))?
                .to_vec();

            let duration = start.elapsed();
            tracing::trace!(status, url = %request.url, ?duration, "http exchange complete");

            Ok(ResponseSpec::new(status, headers, body, duration))
        }
    }
}
