// Application: module assembly, routing and the pipeline behind one handle

use crate::controller::ControllerEntry;
use crate::logging::{debug, info, info_span, LogConfig};
use crate::module::{assemble, AssembledModule, Assembly};
use crate::pipeline::{Pipeline, RequestOutcome};
use crate::render::{DefaultRenderer, ErrorContext, Renderer, ResponseSink};
use crate::routing::{RouteConfig, Router};
use crate::{
    ApplicationOptions, ConfigurationError, Error, HttpMethod, Injector, ModuleDef, Provider,
    Request, RequestContext, Token,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// An assembled application.
pub struct Application {
    assembly: Assembly,
    router: Router,
    pipeline: Pipeline,
    renderer: Arc<dyn Renderer>,
    options: ApplicationOptions,
}

impl Application {
    /// Assemble `module`, register `rules` and validate that every rule
    /// names a registered controller.
    pub fn create(
        module: ModuleDef,
        rules: Vec<RouteConfig>,
        options: ApplicationOptions,
    ) -> Result<Self, Error> {
        Self::create_with_providers(module, rules, options, Vec::new())
    }

    /// Like [`create`](Self::create), with extra providers resolved into the
    /// application scope ahead of every module.
    pub fn create_with_providers(
        module: ModuleDef,
        rules: Vec<RouteConfig>,
        options: ApplicationOptions,
        providers: Vec<Provider>,
    ) -> Result<Self, Error> {
        let mut application = vec![Provider::value(
            Token::of::<ApplicationOptions>(),
            options.clone(),
        )];
        application.extend(providers);
        let assembly = assemble(module, application)?;

        let router = Router::new(assembly.injector().clone(), options.router.clone());
        let pipeline = Pipeline::new(
            assembly.metadata().clone(),
            assembly.handlers().clone(),
            options.pipeline.clone(),
        );
        let app = Self {
            assembly,
            router,
            pipeline,
            renderer: Arc::new(DefaultRenderer),
            options,
        };

        for rule in &rules {
            app.target(&rule.route)
                .map_err(|reason| ConfigurationError::UnknownRoute {
                    route: rule.route.clone(),
                    reason,
                })?;
        }
        app.router.add_rules(rules)?;

        info!(
            routes = app.router.len(),
            root = app.assembly.root().name(),
            "Application created"
        );
        Ok(app)
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn injector(&self) -> &Injector {
        self.assembly.injector()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn options(&self) -> &ApplicationOptions {
        &self.options
    }

    /// Subscriber settings for the configured `log` section
    pub fn log_config(&self) -> LogConfig {
        LogConfig::from_options(&self.options.log)
    }

    pub fn module(&self, name: &str) -> Option<&Arc<AssembledModule>> {
        self.assembly.module(name)
    }

    pub fn root_module(&self) -> &Arc<AssembledModule> {
        self.assembly.root()
    }

    /// Module, controller and action named by a route.
    ///
    /// `controller/action` targets the root module, `module/controller/action`
    /// any assembled module.
    fn target<'a>(&self, route: &'a str) -> Result<(&Arc<AssembledModule>, &ControllerEntry, &'a str), String> {
        let parts: Vec<&str> = route.split('/').collect();
        let (module, controller, action) = match parts.as_slice() {
            [controller, action] => (self.assembly.root(), *controller, *action),
            [module, controller, action] => (
                self.assembly
                    .module(module)
                    .ok_or_else(|| format!("no module named `{}`", module))?,
                *controller,
                *action,
            ),
            _ => return Err("expected `controller/action` or `module/controller/action`".to_string()),
        };
        if action.is_empty() {
            return Err("the action name is empty".to_string());
        }
        let entry = module
            .controller(controller)
            .ok_or_else(|| format!("module `{}` has no controller `{}`", module.name(), controller))?;
        Ok((module, entry, action))
    }

    fn request_span(context: &RequestContext, id: Uuid) -> tracing::Span {
        info_span!(
            "request",
            method = %context.method,
            path = %context.path,
            request_id = %id,
            route = tracing::field::Empty,
        )
    }

    /// Route and run one request.
    pub async fn handle(&self, context: RequestContext) -> Result<RequestOutcome, Error> {
        let id = Uuid::new_v4();
        let span = Self::request_span(&context, id);
        self.run(id, context, &mut None).instrument(span).await
    }

    /// Routing and the pipeline for a request with a preassigned `id`.
    ///
    /// `route` receives the matched route name as soon as routing succeeds.
    async fn run(
        &self,
        id: Uuid,
        context: RequestContext,
        route: &mut Option<String>,
    ) -> Result<RequestOutcome, Error> {
        let method: HttpMethod = context.method.parse()?;
        let resolved = self
            .router
            .parse_request(&context.path, method, &context.headers)
            .await?;
        tracing::Span::current().record("route", resolved.route.as_str());
        *route = Some(resolved.route.clone());

        let (module, controller, action) = self
            .target(&resolved.route)
            .map_err(|reason| ConfigurationError::UnknownRoute {
                route: resolved.route.clone(),
                reason,
            })?;
        let action = action.to_string();
        let controller = controller.clone();
        let module = module.clone();

        let request = Arc::new(Request::with_id(id, context, resolved));
        debug!(controller = %controller.name, action = %action, "Dispatching");

        self.pipeline
            .run(module.injector(), &controller, &action, request)
            .await
    }

    /// Handle a request and write the response into `sink`.
    ///
    /// The request scope is released as finished once the response is
    /// written, or as closed when writing fails. Errors are rendered inside
    /// the request span with the request id and, once routing succeeded,
    /// the route name.
    pub async fn dispatch(
        &self,
        context: RequestContext,
        sink: &mut dyn ResponseSink,
    ) -> Result<(), Error> {
        let id = Uuid::new_v4();
        let span = Self::request_span(&context, id);
        let method = context.method.clone();
        let path = context.path.clone();
        async move {
            let mut route = None;
            match self.run(id, context, &mut route).await {
                Ok(outcome) => {
                    let written = self.renderer.render(&outcome, sink);
                    if written.is_ok() {
                        outcome.scope.finished();
                    } else {
                        outcome.scope.closed();
                    }
                    written
                }
                Err(err) => self.renderer.render_error(
                    &err,
                    ErrorContext {
                        request_id: Some(id),
                        route: route.as_deref(),
                        method: &method,
                        path: &path,
                    },
                    sink,
                ),
            }
        }
        .instrument(span)
        .await
    }

    pub async fn create_url(&self, route: &str, params: &HashMap<String, String>) -> String {
        self.router.create_url(route, params).await
    }

    /// Destroy every route and scope owned by the application.
    pub fn destroy(&self) {
        self.router.destroy();
        self.assembly.injector().destroy();
    }
}
