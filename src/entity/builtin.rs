//! Entity types shipped with Pano.

use super::EntityType;
use crate::error::Result;
use crate::schema::{FieldSpec, Properties, PropertyKind, PropertyValue};

const DOMAIN_PATTERN: &str = r"^[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

/// All built-in entity types, in registration order.
pub fn builtin_entity_types() -> Result<Vec<EntityType>> {
    Ok(vec![
        email()?,
        username()?,
        person()?,
        phone()?,
        website()?,
        location()?,
        image()?,
        company()?,
        text()?,
        event()?,
        vehicle()?,
        evidence()?,
    ])
}

/// Fill `domain` from `address` when the caller did not supply one.
fn derive_email_domain(props: &mut Properties) {
    let has_domain = props.get("domain").map_or(false, |v| !v.is_null());
    if has_domain {
        return;
    }
    let domain = props
        .get("address")
        .and_then(PropertyValue::as_str)
        .and_then(|addr| addr.rsplit_once('@'))
        .map(|(_, domain)| domain.to_string());
    if let Some(domain) = domain {
        props.insert("domain".to_string(), PropertyValue::String(domain));
    }
}

/// `+<country_code> <number>`, or just the number.
fn derive_phone_display(props: &mut Properties) {
    let number = props.get("number").filter(|v| !v.is_null()).map(|v| v.to_string());
    let Some(number) = number else {
        props.remove("display_number");
        return;
    };
    let display = match props.get("country_code").filter(|v| !v.is_null()) {
        Some(cc) => format!("+{} {}", cc.to_string().trim_start_matches('+'), number),
        None => number,
    };
    props.insert("display_number".to_string(), PropertyValue::String(display));
}

pub fn email() -> Result<EntityType> {
    let domain = PropertyKind::pattern(DOMAIN_PATTERN).expect("Invalid regex pattern");
    EntityType::builder("Email")
        .description("An email address")
        .color("#2196F3")
        .field(FieldSpec::new("address", PropertyKind::email()))
        .field(FieldSpec::new("domain", domain))
        .field(FieldSpec::new("verified", PropertyKind::Boolean))
        .label(&["address"])
        .key(&["address"])
        .derive(derive_email_domain)
        .build()
}

pub fn username() -> Result<EntityType> {
    EntityType::builder("Username")
        .description("A username")
        .color("#21B57D")
        .field(FieldSpec::new("username", PropertyKind::string_min(1)))
        .field(FieldSpec::new("platform", PropertyKind::string()))
        .field(FieldSpec::new("link", PropertyKind::string()))
        .label(&["username"])
        .key(&["username", "platform"])
        .key(&["username"])
        .build()
}

pub fn person() -> Result<EntityType> {
    EntityType::builder("Person")
        .description("A person representing an individual")
        .color("#4CAF50")
        .field(FieldSpec::new("full_name", PropertyKind::string_min(2)))
        .field(FieldSpec::new("age", PropertyKind::integer_range(0, 150)))
        .field(FieldSpec::new("height", PropertyKind::float_range(0.0, 300.0)))
        .field(FieldSpec::new("nationality", PropertyKind::string_min(2)))
        .field(FieldSpec::new("occupation", PropertyKind::string()))
        .label(&["full_name"])
        .key(&["full_name"])
        .build()
}

pub fn phone() -> Result<EntityType> {
    EntityType::builder("Phone")
        .description("A phone number with country code and metadata")
        .color("#b82549")
        .field(FieldSpec::new("number", PropertyKind::string_min(5)))
        .field(FieldSpec::new("country_code", PropertyKind::string_min(1)))
        .field(FieldSpec::new(
            "phone_type",
            PropertyKind::choices(&["mobile", "landline", "fax", "voip"]),
        ))
        .field(FieldSpec::new("carrier", PropertyKind::string()))
        .field(FieldSpec::new("display_number", PropertyKind::string()).hidden())
        .label(&["display_number"])
        .key(&["country_code", "number"])
        .key(&["number"])
        .derive(derive_phone_display)
        .build()
}

pub fn website() -> Result<EntityType> {
    EntityType::builder("Website")
        .description("A website, domain, or specific URL")
        .color("#9C27B0")
        .field(FieldSpec::new("url", PropertyKind::string_min(4)))
        .field(FieldSpec::new("domain", PropertyKind::string_min(3)))
        .field(FieldSpec::new("title", PropertyKind::string()))
        .field(FieldSpec::new("description", PropertyKind::string()))
        .field(FieldSpec::new("ip_address", PropertyKind::string()))
        .field(FieldSpec::new(
            "status",
            PropertyKind::choices(&["active", "inactive", "redirecting"]),
        ))
        .field(FieldSpec::new("technologies", PropertyKind::string()))
        .label(&["title", "url"])
        .key(&["url"])
        .key(&["domain"])
        .build()
}

pub fn location() -> Result<EntityType> {
    EntityType::builder("Location")
        .description("A physical location, address, or place of interest")
        .color("#FF5722")
        .field(FieldSpec::new("address", PropertyKind::string()))
        .field(FieldSpec::new("city", PropertyKind::string()))
        .field(FieldSpec::new("state", PropertyKind::string()))
        .field(FieldSpec::new("country", PropertyKind::string()))
        .field(FieldSpec::new("postal_code", PropertyKind::string()))
        .field(FieldSpec::new("latitude", PropertyKind::string()))
        .field(FieldSpec::new("longitude", PropertyKind::string()))
        .field(FieldSpec::new(
            "location_type",
            PropertyKind::choices(&["residential", "commercial", "industrial"]),
        ))
        .label(&["address", "city", "country"])
        .key(&["latitude", "longitude"])
        .key(&["address"])
        .build()
}

pub fn image() -> Result<EntityType> {
    EntityType::builder("Image")
        .description("An image")
        .color("#E9B96E")
        .field(FieldSpec::new("title", PropertyKind::string()))
        .field(FieldSpec::new("url", PropertyKind::string()))
        .field(FieldSpec::new("description", PropertyKind::string()))
        .label(&["title"])
        .key(&["url"])
        .build()
}

pub fn company() -> Result<EntityType> {
    EntityType::builder("Company")
        .description("A company")
        .color("#037d9e")
        .field(FieldSpec::new("name", PropertyKind::string()))
        .field(FieldSpec::new("description", PropertyKind::string()))
        .label(&["name"])
        .key(&["name"])
        .build()
}

pub fn text() -> Result<EntityType> {
    EntityType::builder("Text")
        .description("A text")
        .color("#D0BD1D")
        .field(FieldSpec::new("text", PropertyKind::string()))
        .label(&["text"])
        .key(&["text"])
        .build()
}

pub fn event() -> Result<EntityType> {
    EntityType::builder("Event")
        .description("An event")
        .color("#F22416")
        .field(FieldSpec::new("name", PropertyKind::string()))
        .field(FieldSpec::new("description", PropertyKind::string()))
        .field(FieldSpec::new("start_date", PropertyKind::DateTime))
        .field(FieldSpec::new("end_date", PropertyKind::DateTime))
        .field(FieldSpec::new("add_to_timeline", PropertyKind::Boolean).with_default(false))
        .label(&["name"])
        .key(&["name", "start_date"])
        .key(&["name"])
        .build()
}

pub fn vehicle() -> Result<EntityType> {
    EntityType::builder("Vehicle")
        .description("A vehicle with make, model, and metadata")
        .color("#6c5952")
        .field(FieldSpec::new("model", PropertyKind::string()))
        .field(FieldSpec::new("year", PropertyKind::integer()))
        .field(FieldSpec::new("vin", PropertyKind::string()))
        .label(&["model", "year"])
        .separator(" ")
        .key(&["vin"])
        .build()
}

pub fn evidence() -> Result<EntityType> {
    EntityType::builder("Evidence")
        .description("Evidence")
        .color("#02bfd4")
        .field(FieldSpec::new("name", PropertyKind::string()))
        .field(FieldSpec::new("description", PropertyKind::string()))
        .field(FieldSpec::new("is_tampered", PropertyKind::Boolean))
        .label(&["name"])
        .build()
}
