//! Transport-agnostic REST surface
//!
//! [`ModuleApi`] maps module routes onto lifecycle calls and renders results
//! as a status code plus JSON body. Binding it to an HTTP framework is left
//! to the embedding service, which resolves the tenant and actor upstream and
//! passes them in the [`RequestContext`].
//!
//! | Method | Path | Result |
//! |---|---|---|
//! | GET | `/modules` | active catalog entries |
//! | GET | `/modules/{id}/plan` | install order for a module |
//! | GET | `/tenant/modules` | tenant rows joined with catalog metadata |
//! | GET | `/tenant/modules/{id}/history` | installation attempts |
//! | POST | `/modules/install` | 201 + installation |
//! | POST | `/modules/{id}/update` | updated installation |
//! | DELETE | `/modules/{id}` | uninstall |
//! | POST | `/modules/{id}/enable`, `/modules/{id}/disable` | enablement row |
//! | PUT | `/modules/{id}/config` | enablement row |

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::enablement::TenantEnablementStore;
use crate::error::ModuleError;
use crate::lifecycle::ModuleLifecycleManager;
use crate::module_config::{parse_config, validate_config};
use crate::retry::{with_retry_if, RetryConfig};

/// Caller identity resolved by the upstream auth layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Tenant the request acts on
    pub tenant_id: Option<Uuid>,

    /// User performing the request
    pub actor_id: Option<Uuid>,
}

impl RequestContext {
    /// Context with both tenant and actor resolved.
    pub fn new(tenant_id: Uuid, actor_id: Uuid) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            actor_id: Some(actor_id),
        }
    }

    /// Context with nothing resolved.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Body of `POST /modules/install`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallModuleRequest {
    /// Module to install
    #[serde(alias = "moduleId")]
    pub module_id: Uuid,

    /// Version to install; defaults to the catalog version
    #[serde(default)]
    pub version: Option<String>,

    /// Initial config; absent means `{}`
    #[serde(default)]
    pub config: Option<Value>,
}

/// Body of `PUT /modules/{id}/config`.
///
/// `config` may be a JSON object or a string holding one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateModuleConfigRequest {
    /// New tenant config
    pub config: Value,
}

/// Body of `POST /modules/{id}/update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateModuleVersionRequest {
    /// Target version
    pub version: String,
}

/// An incoming request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method, e.g. "GET"
    pub method: String,

    /// Request path, e.g. "/modules/install"
    pub path: String,

    /// Resolved caller identity
    pub context: RequestContext,

    /// JSON body, if any
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Create a request without a body.
    pub fn new(method: impl Into<String>, path: impl Into<String>, context: RequestContext) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            context,
            body: None,
        }
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status code and JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,

    /// JSON body
    pub body: Value,
}

impl ApiResponse {
    /// Response with `status` and a serialized body.
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Self { status, body },
            Err(e) => Self::failure(500, "SERIALIZATION_FAILED", e.to_string(), false),
        }
    }

    /// Error response in the standard envelope.
    pub fn failure(status: u16, code: &str, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            status,
            body: json!({
                "error": {
                    "code": code,
                    "message": message.into(),
                    "retryable": retryable,
                }
            }),
        }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<&ModuleError> for ApiResponse {
    fn from(err: &ModuleError) -> Self {
        let mut response = Self::failure(
            err.status_code(),
            err.error_code(),
            err.to_string(),
            err.is_retryable(),
        );
        if !err.module_names().is_empty() {
            response.body["error"]["modules"] = json!(err.module_names());
        }
        response
    }
}

/// Request handler over the lifecycle manager and enablement store.
pub struct ModuleApi {
    lifecycle: Arc<ModuleLifecycleManager>,
    enablement: TenantEnablementStore,
    retry: RetryConfig,
}

impl ModuleApi {
    /// Create an API over `lifecycle`, retrying as configured there.
    pub fn new(lifecycle: Arc<ModuleLifecycleManager>) -> Self {
        let enablement =
            TenantEnablementStore::new(lifecycle.store().clone(), lifecycle.registry().clone());
        let retry = lifecycle.config().retry();
        Self {
            lifecycle,
            enablement,
            retry,
        }
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Enablement read side used by this API.
    pub fn enablement(&self) -> &TenantEnablementStore {
        &self.enablement
    }

    /// Route and execute a request.
    pub async fn handle(&self, request: ApiRequest) -> ApiResponse {
        let segments: Vec<&str> = request
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let method = request.method.to_ascii_uppercase();

        let response = match (method.as_str(), segments.as_slice()) {
            ("GET", ["modules"]) => self.list_modules().await,
            ("GET", ["modules", id, "plan"]) => self.install_plan(id).await,
            ("GET", ["tenant", "modules"]) => self.list_tenant_modules(&request.context).await,
            ("GET", ["tenant", "modules", id, "history"]) => {
                self.installation_history(&request.context, id).await
            }
            ("POST", ["modules", "install"]) => {
                self.install(&request.context, request.body.as_ref()).await
            }
            ("POST", ["modules", id, "update"]) => {
                self.update(&request.context, id, request.body.as_ref()).await
            }
            ("DELETE", ["modules", id]) => self.uninstall(&request.context, id).await,
            ("POST", ["modules", id, "enable"]) => {
                self.set_enabled(&request.context, id, true).await
            }
            ("POST", ["modules", id, "disable"]) => {
                self.set_enabled(&request.context, id, false).await
            }
            ("PUT", ["modules", id, "config"]) => {
                self.update_config(&request.context, id, request.body.as_ref())
                    .await
            }
            _ => ApiResponse::failure(
                404,
                "ROUTE_NOT_FOUND",
                format!("No route for {} {}", method, request.path),
                false,
            ),
        };

        tracing::debug!(
            method = %method,
            path = %request.path,
            status = response.status,
            "Module API request handled"
        );
        response
    }

    async fn list_modules(&self) -> ApiResponse {
        match self.lifecycle.registry().list_available().await {
            Ok(modules) => ApiResponse::json(200, &modules),
            Err(e) => error_response(&e),
        }
    }

    async fn install_plan(&self, id: &str) -> ApiResponse {
        let module_id = match parse_id(id) {
            Ok(id) => id,
            Err(response) => return response,
        };
        match self.lifecycle.evaluator().install_plan(module_id).await {
            Ok(plan) => ApiResponse::json(200, &plan),
            Err(e) => error_response(&e),
        }
    }

    async fn list_tenant_modules(&self, context: &RequestContext) -> ApiResponse {
        let tenant_id = match tenant(context) {
            Ok(tenant_id) => tenant_id,
            Err(response) => return response,
        };
        match self.enablement.list_detailed(tenant_id).await {
            Ok(views) => ApiResponse::json(200, &views),
            Err(e) => error_response(&e),
        }
    }

    async fn installation_history(&self, context: &RequestContext, id: &str) -> ApiResponse {
        let (tenant_id, module_id) = match tenant(context).and_then(|t| Ok((t, parse_id(id)?))) {
            Ok(ids) => ids,
            Err(response) => return response,
        };
        match self
            .enablement
            .installation_history(tenant_id, module_id)
            .await
        {
            Ok(history) => ApiResponse::json(200, &history),
            Err(e) => error_response(&e),
        }
    }

    async fn install(&self, context: &RequestContext, body: Option<&Value>) -> ApiResponse {
        let (tenant_id, actor_id) = match actor(context) {
            Ok(ids) => ids,
            Err(response) => return response,
        };
        let request: InstallModuleRequest = match parse_body(body) {
            Ok(request) => request,
            Err(response) => return response,
        };
        let config = match request.config {
            Some(config) => config,
            None => json!({}),
        };

        let result = with_retry_if(
            &self.retry,
            || {
                self.lifecycle.install(
                    tenant_id,
                    request.module_id,
                    actor_id,
                    request.version.as_deref(),
                    config.clone(),
                )
            },
            ModuleError::is_retryable,
        )
        .await;

        match result {
            Ok(installation) => ApiResponse::json(201, &installation),
            Err(e) => error_response(&e),
        }
    }

    async fn update(&self, context: &RequestContext, id: &str, body: Option<&Value>) -> ApiResponse {
        let (tenant_id, actor_id, module_id) = match actor(context)
            .and_then(|(t, a)| Ok((t, a, parse_id(id)?)))
        {
            Ok(ids) => ids,
            Err(response) => return response,
        };
        let request: UpdateModuleVersionRequest = match parse_body(body) {
            Ok(request) => request,
            Err(response) => return response,
        };

        let result = with_retry_if(
            &self.retry,
            || {
                self.lifecycle
                    .update(tenant_id, module_id, actor_id, &request.version)
            },
            ModuleError::is_retryable,
        )
        .await;

        match result {
            Ok(installation) => ApiResponse::json(200, &installation),
            Err(e) => error_response(&e),
        }
    }

    async fn uninstall(&self, context: &RequestContext, id: &str) -> ApiResponse {
        let (tenant_id, actor_id, module_id) = match actor(context)
            .and_then(|(t, a)| Ok((t, a, parse_id(id)?)))
        {
            Ok(ids) => ids,
            Err(response) => return response,
        };

        let result = with_retry_if(
            &self.retry,
            || self.lifecycle.uninstall(tenant_id, module_id, actor_id),
            ModuleError::is_retryable,
        )
        .await;

        match result {
            Ok(()) => ApiResponse::json(
                200,
                &json!({ "module_id": module_id, "status": "uninstalled" }),
            ),
            Err(e) => error_response(&e),
        }
    }

    async fn set_enabled(&self, context: &RequestContext, id: &str, enabled: bool) -> ApiResponse {
        let (tenant_id, actor_id, module_id) = match actor(context)
            .and_then(|(t, a)| Ok((t, a, parse_id(id)?)))
        {
            Ok(ids) => ids,
            Err(response) => return response,
        };

        let result = with_retry_if(
            &self.retry,
            || async move {
                if enabled {
                    self.lifecycle.enable(tenant_id, module_id, actor_id).await
                } else {
                    self.lifecycle.disable(tenant_id, module_id, actor_id).await
                }
            },
            ModuleError::is_retryable,
        )
        .await;

        match result {
            Ok(row) => ApiResponse::json(200, &row),
            Err(e) => error_response(&e),
        }
    }

    async fn update_config(
        &self,
        context: &RequestContext,
        id: &str,
        body: Option<&Value>,
    ) -> ApiResponse {
        let (tenant_id, actor_id, module_id) = match actor(context)
            .and_then(|(t, a)| Ok((t, a, parse_id(id)?)))
        {
            Ok(ids) => ids,
            Err(response) => return response,
        };
        let request: UpdateModuleConfigRequest = match parse_body(body) {
            Ok(request) => request,
            Err(response) => return response,
        };
        let config = match request.config {
            Value::String(raw) => parse_config(&raw),
            value => validate_config(&value).map(|()| value),
        };
        let config = match config {
            Ok(config) => config,
            Err(e) => return error_response(&e),
        };

        let result = with_retry_if(
            &self.retry,
            || {
                self.lifecycle
                    .update_config(tenant_id, module_id, actor_id, config.clone())
            },
            ModuleError::is_retryable,
        )
        .await;

        match result {
            Ok(row) => ApiResponse::json(200, &row),
            Err(e) => error_response(&e),
        }
    }
}

fn error_response(err: &ModuleError) -> ApiResponse {
    if err.is_server_error() {
        tracing::error!(error = %err, code = err.error_code(), "Module operation failed");
    } else {
        tracing::debug!(error = %err, code = err.error_code(), "Module operation rejected");
    }
    ApiResponse::from(err)
}

fn missing_context(what: &str) -> ApiResponse {
    ApiResponse::failure(
        400,
        "MISSING_CONTEXT",
        format!("{what} was not resolved for this request"),
        false,
    )
}

fn tenant(context: &RequestContext) -> Result<Uuid, ApiResponse> {
    context.tenant_id.ok_or_else(|| missing_context("tenant_id"))
}

fn actor(context: &RequestContext) -> Result<(Uuid, Uuid), ApiResponse> {
    let tenant_id = tenant(context)?;
    let actor_id = context.actor_id.ok_or_else(|| missing_context("actor_id"))?;
    Ok((tenant_id, actor_id))
}

fn parse_id(raw: &str) -> Result<Uuid, ApiResponse> {
    Uuid::parse_str(raw).map_err(|e| {
        ApiResponse::failure(400, "INVALID_REQUEST", format!("Invalid module id {raw}: {e}"), false)
    })
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: Option<&Value>) -> Result<T, ApiResponse> {
    let body = body.ok_or_else(|| {
        ApiResponse::failure(400, "INVALID_REQUEST", "Request body is required", false)
    })?;
    serde_json::from_value(body.clone())
        .map_err(|e| ApiResponse::failure(400, "INVALID_REQUEST", e.to_string(), false))
}
