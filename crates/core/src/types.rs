use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Axum integration for RequestContext
#[cfg(feature = "axum")]
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::Json,
};

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

opaque_id!(TenantId);
opaque_id!(ScreeningId);
opaque_id!(SubjectId);
opaque_id!(QueryId);
opaque_id!(FindingId);
opaque_id!(FactId);
opaque_id!(AlertId);
opaque_id!(SubscriptionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    Deleted,
}

/// The closed set of evidence categories the engine investigates. Shared
/// between the provider gateway (as a check-type key) and the engine's
/// phase ordering, so it lives here rather than in either crate alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InformationType {
    Identity,
    Criminal,
    Civil,
    Employment,
    Education,
    Financial,
    Licenses,
    Regulatory,
    Sanctions,
    AdverseMedia,
    DigitalFootprint,
}

/// Dependency phase an information type belongs to. Records may not be
/// queried until all permitted Foundation types are terminal; Intelligence
/// may not be queried until Records is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoTypePhase {
    Foundation,
    Records,
    Intelligence,
}

impl InformationType {
    pub const ALL: [InformationType; 11] = [
        InformationType::Identity,
        InformationType::Criminal,
        InformationType::Civil,
        InformationType::Employment,
        InformationType::Education,
        InformationType::Financial,
        InformationType::Licenses,
        InformationType::Regulatory,
        InformationType::Sanctions,
        InformationType::AdverseMedia,
        InformationType::DigitalFootprint,
    ];

    pub fn phase(self) -> InfoTypePhase {
        match self {
            InformationType::Identity | InformationType::Employment | InformationType::Education => {
                InfoTypePhase::Foundation
            }
            InformationType::Criminal
            | InformationType::Civil
            | InformationType::Financial
            | InformationType::Licenses
            | InformationType::Regulatory
            | InformationType::Sanctions => InfoTypePhase::Records,
            InformationType::AdverseMedia | InformationType::DigitalFootprint => {
                InfoTypePhase::Intelligence
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InformationType::Identity => "IDENTITY",
            InformationType::Criminal => "CRIMINAL",
            InformationType::Civil => "CIVIL",
            InformationType::Employment => "EMPLOYMENT",
            InformationType::Education => "EDUCATION",
            InformationType::Financial => "FINANCIAL",
            InformationType::Licenses => "LICENSES",
            InformationType::Regulatory => "REGULATORY",
            InformationType::Sanctions => "SANCTIONS",
            InformationType::AdverseMedia => "ADVERSE_MEDIA",
            InformationType::DigitalFootprint => "DIGITAL_FOOTPRINT",
        }
    }
}

impl std::fmt::Display for InformationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub schema_name: String,
}

/// Per-request context threaded through handlers and down into the engine.
/// Unlike an authenticated user session, a screening request is identified
/// by its tenant and an API-key-derived caller id rather than a login.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant_context: Option<TenantContext>,
    pub caller_id: Option<String>,
    pub request_id: String,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            tenant_context: None,
            caller_id: None,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_tenant_context(mut self, tenant_context: TenantContext) -> Self {
        self.tenant_context = Some(tenant_context);
        self
    }

    pub fn with_caller_id(mut self, caller_id: String) -> Self {
        self.caller_id = Some(caller_id);
        self
    }

    /// Projects this request's identifying fields onto an `ErrorContext` for
    /// attaching to an error raised while handling the request.
    pub fn to_error_context(&self) -> crate::error::ErrorContext {
        let mut ctx = crate::error::ErrorContext::new().with_request_id(self.request_id.clone());
        if let Some(tenant) = &self.tenant_context {
            ctx = ctx.with_tenant_id(tenant.tenant_id.to_string());
        }
        if let Some(caller_id) = &self.caller_id {
            ctx = ctx.with_user_id(caller_id.clone());
        }
        ctx
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

// Axum FromRequestParts implementation for RequestContext
#[cfg(feature = "axum")]
#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({
                        "error": "Authentication required"
                    })),
                )
            })
    }
}
