use axum::{Json, http::StatusCode, response::IntoResponse};
use escrelay_sdk::objects::Product;
use escrelay_sdk::validation::ValidationErrors;

/// `POST /products/validate`: check a product record.
///
/// Returns the validated product, or `422` with every field-level
/// violation.
pub(super) async fn validate_product(
    Json(input): Json<serde_json::Value>,
) -> Result<Json<Product>, ProductApiError> {
    Product::validate(&input)
        .map(Json)
        .map_err(ProductApiError::Invalid)
}

/// Errors that can occur in the product handler.
#[derive(Debug)]
pub(super) enum ProductApiError {
    /// The record failed the product schema.
    Invalid(ValidationErrors),
}

impl IntoResponse for ProductApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ProductApiError::Invalid(errors) => {
                tracing::debug!(violations = errors.violations.len(), "Product rejected");
                (StatusCode::UNPROCESSABLE_ENTITY, Json(errors)).into_response()
            }
        }
    }
}
