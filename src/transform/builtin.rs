//! Offline transforms shipped with Pano.

use async_trait::async_trait;
use std::sync::Arc;

use super::{EntityCandidate, Transform, TransformContext, TransformDescriptor, TransformOutput};

/// All built-in transforms, in registration order.
pub fn builtin_transforms() -> Vec<Arc<dyn Transform>> {
    vec![
        Arc::new(EmailToUsername::new()),
        Arc::new(EmailToWebsite::new()),
        Arc::new(LocationToMapImage::new()),
    ]
}

/// Username candidate from the local part of an email address.
pub struct EmailToUsername {
    descriptor: TransformDescriptor,
}

impl EmailToUsername {
    pub fn new() -> Self {
        Self {
            descriptor: TransformDescriptor::new(
                "Email to Username",
                "Extracts the username from an email address",
            )
            .inputs(&["Email"])
            .outputs(&["Username"]),
        }
    }
}

impl Default for EmailToUsername {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transform for EmailToUsername {
    fn descriptor(&self) -> &TransformDescriptor {
        &self.descriptor
    }

    async fn run(&self, ctx: TransformContext) -> anyhow::Result<TransformOutput> {
        let address = ctx.entity().property_str("address");
        let Some((local, _)) = address.split_once('@') else {
            anyhow::bail!("'{}' has no local part", address);
        };
        ctx.progress(&format!("Found username {local}"));
        Ok(TransformOutput::new().entity(EntityCandidate::new("Username").with("username", local)))
    }
}

/// Website candidate for the domain of an email address.
pub struct EmailToWebsite {
    descriptor: TransformDescriptor,
}

impl EmailToWebsite {
    pub fn new() -> Self {
        Self {
            descriptor: TransformDescriptor::new(
                "Email to Website",
                "Creates a website entity for the email's domain",
            )
            .inputs(&["Email"])
            .outputs(&["Website"]),
        }
    }
}

impl Default for EmailToWebsite {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transform for EmailToWebsite {
    fn descriptor(&self) -> &TransformDescriptor {
        &self.descriptor
    }

    async fn run(&self, ctx: TransformContext) -> anyhow::Result<TransformOutput> {
        let entity = ctx.entity();
        let domain = match entity.property_str("domain") {
            "" => entity
                .property_str("address")
                .rsplit_once('@')
                .map(|(_, d)| d)
                .unwrap_or(""),
            d => d,
        };
        if domain.is_empty() {
            anyhow::bail!("email entity {} has no domain", entity.id());
        }
        let website = EntityCandidate::new("Website")
            .with("domain", domain.to_lowercase())
            .with("url", format!("https://{}", domain.to_lowercase()));
        Ok(TransformOutput::new().entity(website))
    }
}

/// Static map image for a location with numeric coordinates.
pub struct LocationToMapImage {
    descriptor: TransformDescriptor,
}

impl LocationToMapImage {
    pub fn new() -> Self {
        Self {
            descriptor: TransformDescriptor::new(
                "Location to Map Image",
                "Creates a static map image centred on the location",
            )
            .inputs(&["Location"])
            .outputs(&["Image"]),
        }
    }
}

impl Default for LocationToMapImage {
    fn default() -> Self {
        Self::new()
    }
}

fn map_url(lat: f64, lon: f64) -> String {
    format!(
        "https://staticmap.openstreetmap.de/staticmap.php?center={lat},{lon}&zoom=15&size=600x400&markers={lat},{lon},red-pushpin"
    )
}

#[async_trait]
impl Transform for LocationToMapImage {
    fn descriptor(&self) -> &TransformDescriptor {
        &self.descriptor
    }

    async fn run(&self, ctx: TransformContext) -> anyhow::Result<TransformOutput> {
        let entity = ctx.entity();
        let coords = entity
            .property_str("latitude")
            .trim()
            .parse::<f64>()
            .ok()
            .zip(entity.property_str("longitude").trim().parse::<f64>().ok());
        let Some((lat, lon)) = coords else {
            ctx.progress("Location has no usable coordinates");
            return Ok(TransformOutput::new());
        };
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            anyhow::bail!("coordinates out of range: {lat}, {lon}");
        }
        let image = EntityCandidate::new("Image")
            .with("title", format!("Map of {}", entity.label()))
            .with("url", map_url(lat, lon));
        Ok(TransformOutput::new().entity(image))
    }
}
