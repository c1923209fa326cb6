//! Product record and its validation schema.
//!
//! Products arrive as untrusted JSON. [`Product::validate`] is the only way
//! to obtain a [`Product`]; serde deserialization is routed through it as
//! well, so an invalid product can never be constructed from JSON.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::validation::{ValidationErrors, Violation};

/// A validated product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Value")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: Price,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Product price in the form it was received.
///
/// Both forms are accepted on input and kept as-is; use
/// [`Price::to_decimal`] when a single numeric representation is needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Price {
    Number(serde_json::Number),
    Text(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("price {0:?} is not a decimal number")]
    NotDecimal(String),
}

impl Price {
    /// Normalize either form into an exact decimal.
    pub fn to_decimal(&self) -> Result<Decimal, PriceError> {
        let text = match self {
            Price::Number(n) => n.to_string(),
            Price::Text(s) => s.trim().to_string(),
        };
        let parsed = if text.contains(['e', 'E']) {
            Decimal::from_scientific(&text)
        } else {
            text.parse::<Decimal>()
        };
        parsed.map_err(|_| PriceError::NotDecimal(text))
    }
}

impl Product {
    /// Check `input` against the product schema.
    ///
    /// Every offending field is reported; unknown keys are dropped.
    pub fn validate(input: &Value) -> Result<Product, ValidationErrors> {
        let Some(fields) = input.as_object() else {
            return Err(ValidationErrors {
                violations: vec![Violation::new("", "object", Some(input))],
            });
        };

        let id = check_id(fields);
        let name = check_name(fields);
        let description = check_description(fields);
        let price = check_price(fields);
        let image_url = check_image_url(fields);
        let created_at = check_created_at(fields);

        match (id, name, description, price, image_url, created_at) {
            (
                Ok(id),
                Ok(name),
                Ok(description),
                Ok(price),
                Ok(image_url),
                Ok(created_at),
            ) => Ok(Product {
                id,
                name,
                description,
                price,
                image_url,
                created_at,
            }),
            // At least one check failed to reach this arm.
            (id, name, description, price, image_url, created_at) => Err(ValidationErrors {
                violations: [
                    id.err(),
                    name.err(),
                    description.err(),
                    price.err(),
                    image_url.err(),
                    created_at.err(),
                ]
                .into_iter()
                .flatten()
                .collect(),
            }),
        }
    }
}

impl TryFrom<Value> for Product {
    type Error = ValidationErrors;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Product::validate(&value)
    }
}

fn check_id(fields: &Map<String, Value>) -> Result<String, Violation> {
    match fields.get("id") {
        Some(Value::String(id)) => Ok(id.clone()),
        other => Err(Violation::new("id", "string", other)),
    }
}

fn check_name(fields: &Map<String, Value>) -> Result<String, Violation> {
    match fields.get("name") {
        Some(Value::String(name)) if !name.is_empty() => Ok(name.clone()),
        other => Err(Violation::new("name", "non-empty string", other)),
    }
}

fn check_description(fields: &Map<String, Value>) -> Result<Option<String>, Violation> {
    match fields.get("description") {
        None => Ok(None),
        Some(Value::String(description)) => Ok(Some(description.clone())),
        other => Err(Violation::new("description", "string or absent", other)),
    }
}

fn check_price(fields: &Map<String, Value>) -> Result<Price, Violation> {
    match fields.get("price") {
        Some(Value::String(text)) => Ok(Price::Text(text.clone())),
        Some(Value::Number(number)) => Ok(Price::Number(number.clone())),
        other => Err(Violation::new("price", "string or number", other)),
    }
}

fn check_image_url(fields: &Map<String, Value>) -> Result<Option<String>, Violation> {
    match fields.get("imageUrl") {
        Some(Value::String(url)) => Ok(Some(url.clone())),
        Some(Value::Null) => Ok(None),
        other => Err(Violation::new("imageUrl", "string or null", other)),
    }
}

fn check_created_at(fields: &Map<String, Value>) -> Result<OffsetDateTime, Violation> {
    let raw = fields.get("createdAt");
    match raw {
        Some(Value::String(text)) => parse_iso_datetime(text)
            .ok_or_else(|| Violation::new("createdAt", "ISO-8601 date-time string", raw)),
        other => Err(Violation::new("createdAt", "ISO-8601 date-time string", other)),
    }
}

/// Parse a UTC date-time such as `2024-01-01T00:00:00Z` or
/// `2024-01-01T00:00:00.123Z`.
///
/// Offsets other than `Z` are rejected.
fn parse_iso_datetime(text: &str) -> Option<OffsetDateTime> {
    if !text.ends_with('Z') || text.as_bytes().get(10) != Some(&b'T') {
        return None;
    }
    OffsetDateTime::parse(text, &Rfc3339).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn widget() -> Value {
        json!({
            "id": "p1",
            "name": "Widget",
            "price": "9.99",
            "imageUrl": null,
            "createdAt": "2024-01-01T00:00:00Z"
        })
    }

    #[test]
    fn test_valid_product() {
        let product = Product::validate(&widget()).unwrap();
        assert_eq!(product.id, "p1");
        assert_eq!(product.name, "Widget");
        assert_eq!(product.price, Price::Text("9.99".to_string()));
        assert!(product.image_url.is_none());
        assert!(product.description.is_none());
        assert_eq!(product.created_at.unix_timestamp(), 1_704_067_200);
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut input = widget();
        input["name"] = json!("");
        let errors = Product::validate(&input).unwrap_err();
        assert_eq!(errors.violations.len(), 1);
        let violation = &errors.violations[0];
        assert_eq!(violation.path, "name");
        assert_eq!(violation.received, Some(json!("")));
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let mut input = widget();
        input.as_object_mut().unwrap().remove("name");
        let errors = Product::validate(&input).unwrap_err();
        let violation = errors.field("name").next().unwrap();
        assert_eq!(violation.received, None);
    }

    #[test]
    fn test_price_accepts_string_or_number_only() {
        for price in [json!("12"), json!(12), json!(12.5), json!(-3)] {
            let mut input = widget();
            input["price"] = price;
            assert!(Product::validate(&input).is_ok());
        }

        for price in [json!(null), json!(true), json!([1]), json!({ "amount": 1 })] {
            let mut input = widget();
            input["price"] = price.clone();
            let errors = Product::validate(&input).unwrap_err();
            assert!(errors.has_field("price"), "price {price} should be rejected");
        }

        let mut input = widget();
        input.as_object_mut().unwrap().remove("price");
        assert!(Product::validate(&input).unwrap_err().has_field("price"));
    }

    #[test]
    fn test_created_at_must_be_iso_datetime() {
        for ok in [
            "2024-01-01T00:00:00Z",
            "2024-02-29T23:59:59.999Z",
            "1999-12-31T12:00:00.5Z",
        ] {
            let mut input = widget();
            input["createdAt"] = json!(ok);
            assert!(Product::validate(&input).is_ok(), "{ok} should pass");
        }

        for bad in [
            json!("01/01/2024"),
            json!("2024-01-01"),
            json!("2024-01-01 00:00:00Z"),
            json!("2024-01-01T00:00:00+02:00"),
            json!("2024-13-01T00:00:00Z"),
            json!(1_704_067_200),
            json!(null),
        ] {
            let mut input = widget();
            input["createdAt"] = bad.clone();
            let errors = Product::validate(&input).unwrap_err();
            assert!(errors.has_field("createdAt"), "{bad} should fail");
        }
    }

    #[test]
    fn test_image_url_is_nullable_but_required() {
        let mut input = widget();
        input["imageUrl"] = json!("https://cdn.example.com/w.png");
        let product = Product::validate(&input).unwrap();
        assert_eq!(
            product.image_url.as_deref(),
            Some("https://cdn.example.com/w.png")
        );

        input.as_object_mut().unwrap().remove("imageUrl");
        assert!(Product::validate(&input).unwrap_err().has_field("imageUrl"));

        let mut input = widget();
        input["imageUrl"] = json!(7);
        assert!(Product::validate(&input).unwrap_err().has_field("imageUrl"));
    }

    #[test]
    fn test_description_optional_but_typed() {
        let mut input = widget();
        input["description"] = json!("A widget");
        let product = Product::validate(&input).unwrap();
        assert_eq!(product.description.as_deref(), Some("A widget"));

        input["description"] = json!(null);
        assert!(Product::validate(&input).unwrap_err().has_field("description"));
    }

    #[test]
    fn test_all_violations_are_reported() {
        let input = json!({
            "id": 5,
            "name": "",
            "price": false,
            "createdAt": "yesterday"
        });
        let errors = Product::validate(&input).unwrap_err();
        let paths: Vec<&str> = errors.violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, ["id", "name", "price", "imageUrl", "createdAt"]);
    }

    #[test]
    fn test_each_single_field_failure_yields_one_violation() {
        for (field, bad) in [
            ("id", json!(1)),
            ("name", json!(null)),
            ("description", json!(null)),
            ("price", json!([])),
            ("imageUrl", json!(3)),
            ("createdAt", json!("2024-01-01")),
        ] {
            let mut input = widget();
            input[field] = bad;
            let errors = Product::validate(&input).unwrap_err();
            assert_eq!(errors.violations.len(), 1, "{field}");
            assert_eq!(errors.violations[0].path, field);
        }
    }

    #[test]
    fn test_non_object_is_rejected_at_root() {
        let errors = Product::validate(&json!(["p1"])).unwrap_err();
        assert_eq!(errors.violations.len(), 1);
        assert_eq!(errors.violations[0].path, "");
    }

    #[test]
    fn test_unknown_keys_are_dropped() {
        let mut input = widget();
        input["sku"] = json!("W-1");
        let product = Product::validate(&input).unwrap();
        let back = serde_json::to_value(&product).unwrap();
        assert!(back.get("sku").is_none());
    }

    #[test]
    fn test_revalidation_is_stable() {
        let inputs = [
            widget(),
            json!({
                "id": "p2",
                "name": "Gadget",
                "description": "Shiny",
                "price": 19.95,
                "imageUrl": "https://cdn.example.com/g.png",
                "createdAt": "2023-06-30T08:15:30.250Z"
            }),
            json!({
                "id": "",
                "name": "x",
                "price": 0,
                "imageUrl": null,
                "createdAt": "2000-01-01T00:00:00Z",
                "extra": true
            }),
        ];
        for input in inputs {
            let first = Product::validate(&input).unwrap();
            let json = serde_json::to_string(&first).unwrap();
            let second: Product = serde_json::from_str(&json).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_deserialize_runs_validation() {
        let result = serde_json::from_value::<Product>(json!({
            "id": "p1",
            "name": "",
            "price": "1",
            "imageUrl": null,
            "createdAt": "2024-01-01T00:00:00Z"
        }));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_price_to_decimal() {
        assert_eq!(
            Price::Text(" 9.99 ".to_string()).to_decimal().unwrap().to_string(),
            "9.99"
        );
        let number: serde_json::Number = serde_json::from_str("19.95").unwrap();
        assert_eq!(Price::Number(number).to_decimal().unwrap().to_string(), "19.95");
        let number: serde_json::Number = serde_json::from_str("1e3").unwrap();
        assert_eq!(
            Price::Number(number).to_decimal().unwrap(),
            Decimal::from(1000)
        );
        assert!(Price::Text("free".to_string()).to_decimal().is_err());
    }
}
