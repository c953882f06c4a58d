// Test application builder

use crate::{RecordingSink, TestRequest, TestResponse};
use std::sync::Arc;
use trellis_core::{
    Application, ApplicationOptions, Error, Injector, ModuleDef, Provider, Renderer,
    RequestContext, RequestOutcome, RouteConfig,
};

/// An application driven entirely in memory.
pub struct TestApp {
    app: Application,
}

impl TestApp {
    pub fn builder(module: ModuleDef) -> TestAppBuilder {
        TestAppBuilder::new(module)
    }

    pub fn from_application(app: Application) -> Self {
        Self { app }
    }

    /// Dispatch a request and capture the rendered response.
    ///
    /// Failures that escape the renderer come back as status 0 with the
    /// error text as body; the sink never saw headers in that case.
    pub async fn send(&self, request: impl Into<RequestContext>) -> TestResponse {
        let mut sink = RecordingSink::new();
        match self.app.dispatch(request.into(), &mut sink).await {
            Ok(()) => sink.into(),
            Err(err) => TestResponse::failed(&err),
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(TestRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: impl Into<Vec<u8>>) -> TestResponse {
        self.send(TestRequest::post(path).body(body)).await
    }

    /// Run the pipeline without rendering, for assertions on the chain.
    pub async fn handle(&self, request: impl Into<RequestContext>) -> Result<RequestOutcome, Error> {
        self.app.handle(request.into()).await
    }

    pub fn app(&self) -> &Application {
        &self.app
    }

    pub fn injector(&self) -> &Injector {
        self.app.injector()
    }

    /// Resolve a service from the application scope
    pub fn service<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        self.app.injector().get::<T>()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.app.destroy();
    }
}

/// Builder for test applications
pub struct TestAppBuilder {
    module: ModuleDef,
    routes: Vec<RouteConfig>,
    providers: Vec<Provider>,
    options: ApplicationOptions,
    renderer: Option<Arc<dyn Renderer>>,
}

impl TestAppBuilder {
    pub fn new(module: ModuleDef) -> Self {
        Self {
            module,
            routes: Vec::new(),
            providers: Vec::new(),
            options: ApplicationOptions::default(),
            renderer: None,
        }
    }

    pub fn route(mut self, rule: RouteConfig) -> Self {
        self.routes.push(rule);
        self
    }

    pub fn routes(mut self, rules: impl IntoIterator<Item = RouteConfig>) -> Self {
        self.routes.extend(rules);
        self
    }

    /// Provider resolved into the application scope, ahead of every module.
    /// Handy for swapping in mocks.
    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn options(mut self, options: ApplicationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn build(self) -> Result<TestApp, Error> {
        let app = Application::create_with_providers(
            self.module,
            self.routes,
            self.options,
            self.providers,
        )?;
        let app = match self.renderer {
            Some(renderer) => app.with_renderer(renderer),
            None => app,
        };
        Ok(TestApp { app })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{method, ControllerDef, Injectable};

    struct Ping;

    impl Injectable for Ping {
        fn construct(_: &trellis_core::Arguments) -> Result<Self, Error> {
            Ok(Ping)
        }
    }

    fn module() -> ModuleDef {
        ModuleDef::new("app").controller(
            ControllerDef::<Ping>::new("ping")
                .action("index", method(|_: Arc<Ping>, _| async { Ok("pong") })),
        )
    }

    #[tokio::test]
    async fn test_get_renders_response() {
        let app = TestApp::builder(module())
            .route(RouteConfig::get("/ping", "ping/index"))
            .build()
            .unwrap();

        let response = app.get("/ping").await;
        assert_eq!(response.status(), 200);
        assert_eq!(response.body_string(), "pong");
        assert!(response.is_success());
    }

    #[test]
    fn test_build_rejects_unknown_routes() {
        let result = TestApp::builder(module())
            .route(RouteConfig::get("/", "missing/index"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_service_lookup() {
        let app = TestApp::builder(module())
            .provider(Provider::value("greeting", "hi".to_string()))
            .build()
            .unwrap();
        assert_eq!(*app.service::<ApplicationOptions>().unwrap(), ApplicationOptions::default());
        assert!(app.service::<Ping>().is_err());
    }
}
