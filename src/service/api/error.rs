use {
    crate::service::{
        holiday::{
            CountryCode,
            Year,
        },
        upstream::FetchError,
    },
    serde::Serialize,
    std::convert::Infallible,
    warp::{
        Rejection,
        Reply,
        hyper::StatusCode,
        reject::{
            LengthRequired,
            MethodNotAllowed,
            PayloadTooLarge,
            UnsupportedMediaType,
        },
        reply::{
            self,
            Response,
        },
    },
};

/// Every failure the HTTP API reports to its callers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
    #[error("Invalid resource: {0}")]
    NoSuchResource(String),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("API error: No holidays found for {country} in year {year}")]
    UpstreamNotFound { country: CountryCode, year: Year },
    #[error("API error: {0}")]
    UpstreamBadRequest(String),
    #[error("API error: API request failed: {path} with {status}")]
    UpstreamStatus { status: u16, path: String },
    #[error("External service is unreachable: {0}")]
    UpstreamUnreachable(String),
    #[error("An unexpected error occurred: Error parsing API response: {0}")]
    UpstreamParse(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotFound { country, year } => ApiError::UpstreamNotFound { country, year },
            FetchError::BadRequest(body) => ApiError::UpstreamBadRequest(body),
            FetchError::Status { status, path } => ApiError::UpstreamStatus { status, path },
            FetchError::Unreachable(cause) => ApiError::UpstreamUnreachable(cause),
            FetchError::Parse(cause) => ApiError::UpstreamParse(cause),
        }
    }
}

/// JSON body of every error response.
#[derive(Serialize, Debug)]
struct ErrorBody {
    status:  u16,
    error:   String,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) | ApiError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NoSuchResource(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::UpstreamNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::UpstreamBadRequest(_) => StatusCode::BAD_REQUEST,
            // Pass the source's own status through when it is one we can send.
            ApiError::UpstreamStatus { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ApiError::UpstreamUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::UpstreamParse(_) | ApiError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Render as a `{status, error, message}` JSON response, logging the failure.
    pub fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "Request failed.");
        } else {
            tracing::warn!(status = status.as_u16(), error = %message, "Request rejected.");
        }

        let body = ErrorBody {
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Unknown").to_string(),
            message,
        };
        reply::with_status(reply::json(&body), status).into_response()
    }
}

/// Turn warp's own rejections (unknown route, unreadable body, ...) into API errors.
pub fn from_rejection(rejection: &Rejection) -> ApiError {
    if rejection.is_not_found() {
        ApiError::NoSuchResource("no route matches the requested path".to_string())
    } else if let Some(err) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        ApiError::MalformedRequest(err.to_string())
    } else if let Some(err) = rejection.find::<UnsupportedMediaType>() {
        ApiError::MalformedRequest(err.to_string())
    } else if let Some(err) = rejection.find::<PayloadTooLarge>() {
        ApiError::MalformedRequest(err.to_string())
    } else if let Some(err) = rejection.find::<LengthRequired>() {
        ApiError::MalformedRequest(err.to_string())
    } else if rejection.find::<MethodNotAllowed>().is_some() {
        ApiError::MethodNotAllowed
    } else {
        ApiError::Unexpected(format!("{rejection:?}"))
    }
}

pub async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    Ok(from_rejection(&rejection).into_response())
}
