use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::{PredictError, ValidationError};
use crate::predictor::Predictor;
use crate::record::RawGradeInput;
use crate::reference::ReferenceStore;

const INTERNAL_ERROR_MESSAGE: &str = "internal error while computing prediction";

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthStatus {
    status: &'static str,
    reference_records: usize,
    reference_groups: usize,
}

impl ResponseError for PredictError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictError::Validation(_) => StatusCode::BAD_REQUEST,
            PredictError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            PredictError::Validation(err) => err.to_string(),
            PredictError::Internal { .. } => INTERNAL_ERROR_MESSAGE.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody { error: message })
    }
}

// Prediction endpoint: one reference snapshot per request
async fn predict(
    body: web::Json<RawGradeInput>,
    predictor: web::Data<Predictor>,
    store: web::Data<ReferenceStore>,
) -> Result<HttpResponse, PredictError> {
    let snapshot = store.snapshot();
    match predictor.predict(&body, snapshot.as_ref()) {
        Ok(result) => Ok(HttpResponse::Ok().json(result)),
        Err(err) => {
            match &err {
                PredictError::Validation(reason) => {
                    warn!(%reason, "rejected prediction request")
                }
                PredictError::Internal { stage, reason } => {
                    error!(%stage, %reason, "prediction failed")
                }
            }
            Err(err)
        }
    }
}

// Health check endpoint
async fn health(store: web::Data<ReferenceStore>) -> HttpResponse {
    let snapshot = store.snapshot();
    HttpResponse::Ok().json(HealthStatus {
        status: "healthy",
        reference_records: snapshot.records(),
        reference_groups: snapshot.groups(),
    })
}

/// Bodies that don't deserialize still get the `{ "error": ... }` shape.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let reason = ValidationError::Malformed(err.to_string());
        warn!(%reason, "rejected prediction request");
        let response = HttpResponse::BadRequest().json(ErrorBody {
            error: reason.to_string(),
        });
        InternalError::from_response(err, response).into()
    })
}

/// Routes and extractor config; the app supplies `Predictor` and `ReferenceStore` data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/predict", web::post().to(predict))
        .route("/health", web::get().to(health));
}
