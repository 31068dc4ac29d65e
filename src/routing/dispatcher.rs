//! Resolution of canonical `controller/action/args` paths to controller calls.
//!
//! Controllers are registered by name with a factory closure at startup. Each
//! request gets a fresh controller built from a [`RequestContext`], so no
//! controller state outlives its request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::auth::TokenService;
use crate::database::connection::{Connection, ConnectionSource};
use crate::database::manager::DatabaseError;
use crate::error::ApiError;
use crate::handlers::error::ErrorHandler;
use crate::handlers::request::{HttpRequest, JsonResponse};

pub const HOME_CONTROLLER: &str = "home";
pub const DEFAULT_ACTION: &str = "index";

/// One callable action and how many positional arguments it requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    pub name: &'static str,
    pub arity: usize,
}

impl Action {
    pub const fn new(name: &'static str, arity: usize) -> Self {
        Self { name, arity }
    }
}

#[async_trait]
pub trait Controller: Send {
    fn actions(&self) -> &'static [Action];

    /// Run a resolved action. `action` is always one of [`actions`](Self::actions)
    /// and `args` holds at least its arity.
    async fn invoke(
        &mut self,
        action: &'static str,
        args: Vec<String>,
        request: &HttpRequest,
    ) -> Result<JsonResponse, ApiError>;
}

/// What a controller may use while handling one request. The database
/// connection is checked out on first use and shared by every DAO the request
/// builds.
pub struct RequestContext {
    source: Arc<dyn ConnectionSource>,
    connection: OnceCell<Arc<dyn Connection>>,
    tokens: Arc<TokenService>,
}

impl RequestContext {
    pub fn new(source: Arc<dyn ConnectionSource>, tokens: Arc<TokenService>) -> Self {
        Self {
            source,
            connection: OnceCell::new(),
            tokens,
        }
    }

    pub async fn connection(&self) -> Result<Arc<dyn Connection>, DatabaseError> {
        self.connection
            .get_or_try_init(|| self.source.acquire())
            .await
            .cloned()
    }

    pub async fn ping(&self) -> Result<(), DatabaseError> {
        self.source.ping().await
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }
}

type ControllerFactory = Arc<dyn Fn(Arc<RequestContext>) -> Box<dyn Controller> + Send + Sync>;

/// Controller factories by lower-cased name
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    factories: HashMap<String, ControllerFactory>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C, F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        C: Controller + 'static,
        F: Fn(Arc<RequestContext>) -> C + Send + Sync + 'static,
    {
        self.factories.insert(
            name.to_ascii_lowercase(),
            Arc::new(move |ctx| Box::new(factory(ctx)) as Box<dyn Controller>),
        );
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn build(&self, name: &str, ctx: Arc<RequestContext>) -> Option<Box<dyn Controller>> {
        self.factories
            .get(&name.to_ascii_lowercase())
            .map(|factory| factory(ctx))
    }
}

/// A canonical path split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub controller: String,
    pub action: String,
    pub args: Vec<String>,
}

impl Target {
    /// `/controller/action/arg1/arg2`; empty or `/` is the home controller
    pub fn parse(path: &str) -> Self {
        let mut segments = path.trim_start_matches('/').split('/');
        let controller = segments
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(HOME_CONTROLLER)
            .to_string();
        let action = segments
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_ACTION)
            .to_string();
        let args = segments.map(str::to_string).collect();
        Self { controller, action, args }
    }
}

pub struct Dispatcher {
    registry: ControllerRegistry,
    source: Arc<dyn ConnectionSource>,
    tokens: Arc<TokenService>,
}

impl Dispatcher {
    pub fn new(
        registry: ControllerRegistry,
        source: Arc<dyn ConnectionSource>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self { registry, source, tokens }
    }

    pub fn registry(&self) -> &ControllerRegistry {
        &self.registry
    }

    /// Run the action `path` names. Unknown controllers answer 404, unknown
    /// actions and missing arguments answer 400; nothing here fails.
    pub async fn dispatch(&self, path: &str, request: &HttpRequest) -> JsonResponse {
        let target = Target::parse(path);
        let ctx = Arc::new(RequestContext::new(self.source.clone(), self.tokens.clone()));

        let Some(mut controller) = self.registry.build(&target.controller, ctx) else {
            debug!(controller = %target.controller, "no such controller");
            return ErrorHandler::page_not_found();
        };

        let action = controller
            .actions()
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(&target.action))
            .copied();

        let action = match action {
            Some(action) if target.args.len() >= action.arity => action,
            _ => {
                debug!(
                    controller = %target.controller,
                    action = %target.action,
                    args = target.args.len(),
                    "no such action or missing arguments"
                );
                return ErrorHandler::invalid_parameters();
            }
        };

        let mut args = target.args;
        args.truncate(action.arity);

        match controller.invoke(action.name, args, request).await {
            Ok(response) => response,
            Err(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedConnection, ScriptedSource};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Controller for Echo {
        fn actions(&self) -> &'static [Action] {
            const ACTIONS: &[Action] = &[Action::new("index", 0), Action::new("show", 1)];
            ACTIONS
        }

        async fn invoke(
            &mut self,
            action: &'static str,
            args: Vec<String>,
            _request: &HttpRequest,
        ) -> Result<JsonResponse, ApiError> {
            Ok(JsonResponse::ok(json!({"action": action, "args": args})))
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut registry = ControllerRegistry::new();
        registry.register("home", |_| Echo).register("Echo", |_| Echo);
        Dispatcher::new(
            registry,
            Arc::new(ScriptedSource::new(ScriptedConnection::new())),
            Arc::new(TokenService::new("secret", 1)),
        )
    }

    #[test]
    fn parses_targets() {
        assert_eq!(
            Target::parse("/product/handleUpdateProduct/4"),
            Target {
                controller: "product".into(),
                action: "handleUpdateProduct".into(),
                args: vec!["4".into()],
            }
        );
        assert_eq!(Target::parse("/").controller, "home");
        assert_eq!(Target::parse("").action, "index");
        assert_eq!(Target::parse("/user").action, "index");
    }

    #[tokio::test]
    async fn root_goes_to_home_index() {
        let response = dispatcher().dispatch("/", &HttpRequest::new(Method::GET)).await;
        assert_eq!(response.body["action"], json!("index"));
    }

    #[tokio::test]
    async fn controller_and_action_match_case_insensitively() {
        let response = dispatcher()
            .dispatch("/echo/SHOW/9", &HttpRequest::new(Method::GET))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, json!({"action": "show", "args": ["9"]}));
    }

    #[tokio::test]
    async fn extra_arguments_are_dropped() {
        let response = dispatcher()
            .dispatch("/echo/show/9/10", &HttpRequest::new(Method::GET))
            .await;
        assert_eq!(response.body["args"], json!(["9"]));
    }

    #[tokio::test]
    async fn unknown_controller_is_page_not_found() {
        let response = dispatcher()
            .dispatch("/nope/index", &HttpRequest::new(Method::GET))
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body, json!({"message": "Page not found."}));
    }

    #[tokio::test]
    async fn unknown_action_or_missing_args_is_invalid_parameters() {
        let d = dispatcher();
        for path in ["/echo/missing", "/echo/show"] {
            let response = d.dispatch(path, &HttpRequest::new(Method::GET)).await;
            assert_eq!(response.status, StatusCode::BAD_REQUEST);
            assert_eq!(response.body, json!({"message": "Invalid parameters."}));
        }
    }

    #[tokio::test]
    async fn context_acquires_one_connection() {
        let scripted = ScriptedConnection::new();
        let ctx = RequestContext::new(
            Arc::new(ScriptedSource::new(scripted)),
            Arc::new(TokenService::new("s", 1)),
        );
        let a = ctx.connection().await.unwrap();
        let b = ctx.connection().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
