//! Shopify storefronts.
//!
//! One global application serves every shop. A shop is identified by its
//! `*.myshopify.com` domain, stored in each installation's config together
//! with the shared secret used to sign webhooks and app proxy calls.

use std::sync::{Arc, LazyLock};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Extension;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::Utc;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tracing::info;

use tether_auth::{AccessToken, Scope, require_scopes};
use tether_core::{Application, ConfigMap, Installation, ValidationError};

use crate::capability::{Capability, WEBHOOKS};
use crate::error::LookupError;
use crate::form::{ConfigForm, FieldSpec, FormContext};
use crate::integration::Integration;
use crate::lookup::{InstallationFinder, InstallationLookup, LookupScope};
use crate::request::InboundRequest;

type HmacSha256 = Hmac<Sha256>;

pub const NAME: &str = "shopify";
pub const SHOP_FIELD: &str = "shopify_shop";
pub const SECRET_FIELD: &str = "shared_secret";

pub const HMAC_HEADER: &str = "x-shopify-hmac-sha256";
pub const SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";
pub const TOPIC_HEADER: &str = "x-shopify-topic";

pub const PURCHASE_SCOPE: Scope = Scope::from_static("purchase:shopify:write");
pub const WEBHOOK_SCOPE: Scope = Scope::from_static("webhook:shopify:write");

const SHOP_SUFFIX: &str = ".myshopify.com";

static FORM: LazyLock<Arc<ShopifyConfigForm>> = LazyLock::new(|| Arc::new(ShopifyConfigForm::new()));

#[derive(Debug)]
pub struct ShopifyConfigForm {
    fields: Vec<FieldSpec>,
}

impl ShopifyConfigForm {
    fn new() -> Self {
        Self {
            fields: vec![
                FieldSpec::text(SHOP_FIELD).help_text("Shop domain, e.g. acme.myshopify.com"),
                FieldSpec::text(SECRET_FIELD),
            ],
        }
    }
}

impl ConfigForm for ShopifyConfigForm {
    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Lowercases the shop and refuses a shop already installed on another
    /// target.
    fn clean_form_data(
        &self,
        mut data: ConfigMap,
        ctx: &FormContext<'_>,
    ) -> Result<ConfigMap, ValidationError> {
        let Some(shop) = data.get(SHOP_FIELD).and_then(|v| v.as_str()) else {
            return Ok(data);
        };
        let shop = shop.to_ascii_lowercase();
        let name = shop.strip_suffix(SHOP_SUFFIX).unwrap_or_default();
        let valid = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
        if !valid {
            return Err(ValidationError::field(
                SHOP_FIELD,
                format!("Enter a shop domain ending in {SHOP_SUFFIX}"),
            ));
        }
        if let (Some(existing), Some(target)) = (ctx.existing, ctx.target) {
            let lookup = InstallationLookup::new(LookupScope::Internal(NAME.to_string()))
                .with_config(SHOP_FIELD, shop.as_str());
            if existing.targets_matching(&lookup).iter().any(|t| *t != target) {
                return Err(ValidationError::field(
                    SHOP_FIELD,
                    format!("There is already an existing installation with shop {shop}"),
                ));
            }
        }
        data.insert(SHOP_FIELD.to_string(), shop.into());
        Ok(data)
    }
}

#[derive(Debug, Clone)]
pub struct ShopifyIntegration {
    form: Arc<ShopifyConfigForm>,
}

impl Default for ShopifyIntegration {
    fn default() -> Self {
        Self { form: FORM.clone() }
    }
}

impl Integration for ShopifyIntegration {
    fn name(&self) -> &str {
        NAME
    }

    fn display_name(&self) -> &str {
        "Shopify"
    }

    fn is_local(&self) -> bool {
        false
    }

    fn default_scopes(&self) -> &[Scope] {
        const SCOPES: &[Scope] = &[PURCHASE_SCOPE, WEBHOOK_SCOPE];
        SCOPES
    }

    fn capabilities(&self) -> &[Capability] {
        const CAPS: &[Capability] = &[WEBHOOKS];
        CAPS
    }

    fn config_form(&self) -> Option<Arc<dyn ConfigForm>> {
        Some(self.form.clone())
    }

    fn routes(&self) -> Option<Router> {
        Some(
            Router::new()
                .route("/webhook", post(webhook))
                .route("/proxy", get(proxy)),
        )
    }

    /// The shop comes from the webhook domain header or the `shop` query
    /// parameter of app proxy calls.
    fn installation_lookup_from_request(
        &self,
        request: &InboundRequest,
        _application: Option<&Application>,
    ) -> Result<InstallationLookup, LookupError> {
        let shop = request
            .header(SHOP_DOMAIN_HEADER)
            .map(str::to_string)
            .or_else(|| request.query_param("shop"))
            .ok_or(LookupError::MissingValue("shop"))?;
        let mut values = ConfigMap::new();
        values.insert(SHOP_FIELD.to_string(), shop.to_ascii_lowercase().into());
        Ok(self.installation_lookup_from_config_values(values))
    }
}

fn keyed(secret: &str, payload: &[u8]) -> Result<HmacSha256, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(payload);
    Ok(mac)
}

/// Hex HMAC-SHA256 of `payload` under `secret`.
pub fn sign(secret: &str, payload: &[u8]) -> Result<String, InvalidLength> {
    let mac = keyed(secret, payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature.
pub fn verify(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    keyed(secret, payload).is_ok_and(|mac| mac.verify_slice(&expected).is_ok())
}

/// Canonical app proxy payload: `key=value` pairs sorted by key, joined by
/// `&`; repeated keys have their sorted values joined by `,`. The
/// `signature` parameter itself is excluded.
pub fn proxy_payload(pairs: &[(String, String)]) -> String {
    let mut grouped: std::collections::BTreeMap<&str, Vec<&str>> = Default::default();
    for (key, value) in pairs {
        if key != "signature" {
            grouped.entry(key.as_str()).or_default().push(value.as_str());
        }
    }
    grouped
        .into_iter()
        .map(|(key, mut values)| {
            values.sort_unstable();
            format!("{key}={}", values.join(","))
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Installation a signed Shopify call belongs to, and the grant it would
/// receive through the global application.
fn authenticate(
    finder: &dyn InstallationFinder,
    request: &InboundRequest,
    payload: &[u8],
    signature: &str,
    required: &Scope,
) -> Result<Installation, Response> {
    let integration = ShopifyIntegration::default();
    let lookup = integration
        .installation_lookup_from_request(request, None)
        .map_err(|_| unauthorized("missing shop"))?;

    let (installation, application) = finder.find_one(&lookup).map_err(|e| {
        info!(error = %e, "integrations.shopify.application_setup_not_found");
        unauthorized("unknown shop")
    })?;

    let config = installation.get_config();
    let Some(secret) = config.get(SECRET_FIELD).and_then(|v| v.as_str()) else {
        info!(installation_id = %installation.id, "integrations.shopify.missing_signature_values");
        return Err(unauthorized("installation has no shared secret"));
    };
    if !verify(secret, payload, signature) {
        info!(installation_id = %installation.id, "integrations.shopify.invalid_signature");
        return Err(unauthorized("invalid signature"));
    }

    let grant = AccessToken::internal(application.id, integration.default_scopes(), Utc::now());
    require_scopes(&grant, std::slice::from_ref(required))
        .map_err(|e| (StatusCode::FORBIDDEN, Json(json!({"error": "forbidden", "message": e.to_string()}))).into_response())?;

    Ok(installation)
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "unauthorized", "message": message})),
    )
        .into_response()
}

async fn webhook(
    Extension(finder): Extension<Arc<dyn InstallationFinder>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = InboundRequest::new(method, uri, headers, body);
    let (Some(signature), Some(_)) = (request.header(HMAC_HEADER), request.header(SHOP_DOMAIN_HEADER)) else {
        info!("integrations.shopify.missing_params");
        return unauthorized("missing webhook headers");
    };

    match authenticate(finder.as_ref(), &request, &request.body, signature, &WEBHOOK_SCOPE) {
        Ok(installation) => {
            info!(
                installation_id = %installation.id,
                target = %installation.target,
                topic = request.header(TOPIC_HEADER).unwrap_or_default(),
                "integrations.shopify.webhook"
            );
            StatusCode::OK.into_response()
        }
        Err(response) => response,
    }
}

async fn proxy(
    Extension(finder): Extension<Arc<dyn InstallationFinder>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request = InboundRequest::new(method, uri, headers, Bytes::new());
    let (Some(shop), Some(signature)) = (request.query_param("shop"), request.query_param("signature")) else {
        info!("integrations.shopify.missing_params");
        return unauthorized("missing proxy parameters");
    };

    let payload = proxy_payload(&request.query_pairs());
    match authenticate(finder.as_ref(), &request, payload.as_bytes(), &signature, &PURCHASE_SCOPE) {
        Ok(installation) => Json(json!({
            "shop": shop,
            "target": installation.target,
            "installation_id": installation.id,
        }))
        .into_response(),
        Err(response) => response,
    }
}
