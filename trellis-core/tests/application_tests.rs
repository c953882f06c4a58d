// End-to-end tests for application assembly, dispatch and rendering

use std::collections::HashMap;
use std::sync::Arc;
use trellis_core::{
    method, Application, ApplicationOptions, Arguments, Chain, ConfigurationError, ControllerDef,
    DefaultRenderer, Error, ErrorContext, Injectable, Instance, LiveBinding, LogFormat, LogLevel,
    ModuleDef, Provider, Renderer, Request, RequestContext, RequestOutcome, ResponseSink,
    RouteConfig, Token, CHAIN_TOKEN, REQUEST_ID_HEADER,
};
use uuid::Uuid;

#[derive(Default)]
struct Buffer {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    ended: bool,
}

impl Buffer {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl ResponseSink for Buffer {
    fn write_header(&mut self, status: u16, headers: &[(String, String)]) -> Result<(), Error> {
        self.status = Some(status);
        self.headers = headers.to_vec();
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), Error> {
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    fn end(&mut self) -> Result<(), Error> {
        self.ended = true;
        Ok(())
    }
}

struct Greeter {
    greeting: String,
}

impl Injectable for Greeter {
    fn construct(_: &Arguments) -> Result<Self, Error> {
        Ok(Greeter {
            greeting: "hello".to_string(),
        })
    }
}

/// Controller built per request from the request itself.
struct Users {
    request: Arc<Request>,
    greeter: Arc<Greeter>,
}

impl Injectable for Users {
    fn dependencies() -> Vec<Token> {
        vec![Token::of::<Request>(), Token::of::<Greeter>()]
    }

    fn construct(args: &Arguments) -> Result<Self, Error> {
        Ok(Users {
            request: args.get(0)?,
            greeter: args.get(1)?,
        })
    }
}

fn users() -> ControllerDef<Users> {
    ControllerDef::<Users>::new("users")
        .action(
            "show",
            method(|users: Arc<Users>, _| async move {
                let id = users.request.param("id").unwrap_or("?").to_string();
                Ok(format!("{} user {}", users.greeter.greeting, id))
            }),
        )
        .action(
            "legacy",
            method(|users: Arc<Users>, _| async move {
                users.request.redirect_to("/users/1", 301);
                Ok(Chain::Empty)
            }),
        )
}

fn accounts_module() -> ModuleDef {
    ModuleDef::new("accounts")
        .provider(Provider::class::<Greeter>())
        .controller(users())
        .export::<Greeter>()
}

/// Controller reading the chain through a live field binding.
struct Status {
    chain: Option<LiveBinding>,
}

impl Injectable for Status {
    fn construct(_: &Arguments) -> Result<Self, Error> {
        Ok(Status { chain: None })
    }

    fn inject_field(&mut self, field: &str, value: Instance) -> Result<(), Error> {
        match (field, value.downcast::<LiveBinding>()) {
            ("chain", Ok(binding)) => {
                self.chain = Some(binding.as_ref().clone());
                Ok(())
            }
            _ => Err(Error::internal(format!("unexpected field {}", field))),
        }
    }
}

fn status() -> ControllerDef<Status> {
    ControllerDef::<Status>::new("status")
        .inject_live_field("chain", CHAIN_TOKEN)
        .before_each(method(|_: Arc<Status>, _| async { Ok("warm") }))
        .action(
            "index",
            method(|status: Arc<Status>, _| async move {
                let binding = status
                    .chain
                    .as_ref()
                    .ok_or_else(|| Error::internal("chain binding missing"))?;
                Ok(format!("seen {}", binding.get::<Chain>()?.as_text()))
            }),
        )
}

fn app() -> Application {
    Application::create(
        ModuleDef::new("app")
            .import(accounts_module())
            .controller(status()),
        vec![
            RouteConfig::get("/status", "status/index"),
            RouteConfig::get("/users/<id:(\\d+)>", "accounts/users/show"),
            RouteConfig::get("/u/<id>", "accounts/users/legacy"),
        ],
        ApplicationOptions::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_routes_into_imported_module() {
    let app = app();
    let outcome = app.handle(RequestContext::new("GET", "/users/9")).await.unwrap();
    assert_eq!(outcome.chain, Chain::from("hello user 9"));
    assert_eq!(outcome.route, "accounts/users/show");
}

#[tokio::test]
async fn test_live_field_sees_current_chain() {
    let app = app();
    let outcome = app.handle(RequestContext::new("GET", "/status")).await.unwrap();
    assert_eq!(outcome.chain, Chain::from("seen warm"));
}

#[tokio::test]
async fn test_dispatch_renders_and_releases_scope() {
    let app = app();
    let root = app.root_module().injector().clone();
    let mut sink = Buffer::default();

    app.dispatch(RequestContext::new("GET", "/status"), &mut sink)
        .await
        .unwrap();
    assert_eq!(sink.status, Some(200));
    assert_eq!(sink.text(), "seen warm");
    assert_eq!(sink.header("content-type"), Some("text/html; charset=utf-8"));
    assert_eq!(sink.header("content-length"), Some("9"));
    assert!(sink.ended);
    assert_eq!(root.child_count(), 0);
}

#[tokio::test]
async fn test_dispatch_writes_redirect() {
    let app = app();
    let mut sink = Buffer::default();

    app.dispatch(RequestContext::new("GET", "/u/1"), &mut sink)
        .await
        .unwrap();
    assert_eq!(sink.status, Some(301));
    assert_eq!(sink.header("location"), Some("/users/1"));
    assert!(sink.body.is_empty());
}

#[tokio::test]
async fn test_dispatch_renders_errors() {
    let app = app();

    let mut sink = Buffer::default();
    app.dispatch(RequestContext::new("GET", "/nowhere"), &mut sink)
        .await
        .unwrap();
    assert_eq!(sink.status, Some(404));
    assert!(sink.text().starts_with("404 Not Found"));

    let mut sink = Buffer::default();
    app.dispatch(RequestContext::new("BREW", "/status"), &mut sink)
        .await
        .unwrap();
    assert_eq!(sink.status, Some(400));
}

/// Renderer that notes the error context before writing the default page.
#[derive(Default)]
struct NotingRenderer {
    seen: parking_lot::Mutex<Vec<(Option<Uuid>, Option<String>)>>,
}

impl Renderer for NotingRenderer {
    fn render(&self, outcome: &RequestOutcome, sink: &mut dyn ResponseSink) -> Result<(), Error> {
        DefaultRenderer.render(outcome, sink)
    }

    fn render_error(
        &self,
        error: &Error,
        context: ErrorContext<'_>,
        sink: &mut dyn ResponseSink,
    ) -> Result<(), Error> {
        self.seen
            .lock()
            .push((context.request_id, context.route.map(str::to_string)));
        DefaultRenderer.render_error(error, context, sink)
    }
}

#[tokio::test]
async fn test_dispatch_errors_carry_request_id_and_route() {
    let renderer = Arc::new(NotingRenderer::default());
    let app = Application::create(
        ModuleDef::new("app").controller(status()),
        vec![
            RouteConfig::get("/status", "status/index"),
            RouteConfig::get("/status/gone", "status/gone"),
        ],
        ApplicationOptions::default(),
    )
    .unwrap()
    .with_renderer(renderer.clone());

    let mut unrouted = Buffer::default();
    app.dispatch(RequestContext::new("GET", "/nowhere"), &mut unrouted)
        .await
        .unwrap();
    let mut failed = Buffer::default();
    app.dispatch(RequestContext::new("GET", "/status/gone"), &mut failed)
        .await
        .unwrap();
    assert_eq!(failed.status, Some(400));

    let seen = renderer.seen.lock().clone();
    assert_eq!(seen.len(), 2);
    let (unrouted_id, unrouted_route) = seen[0].clone();
    assert_eq!(unrouted_route, None);
    assert_eq!(
        unrouted.header(REQUEST_ID_HEADER).map(Uuid::parse_str).and_then(Result::ok),
        unrouted_id
    );
    let (failed_id, failed_route) = seen[1].clone();
    assert_eq!(failed_route.as_deref(), Some("status/gone"));
    assert_eq!(
        failed.header(REQUEST_ID_HEADER).map(Uuid::parse_str).and_then(Result::ok),
        failed_id
    );
    assert!(unrouted_id.is_some() && failed_id.is_some());
    assert_ne!(unrouted_id, failed_id);
}

#[tokio::test]
async fn test_dispatch_success_reports_request_id() {
    let app = app();
    let mut sink = Buffer::default();
    app.dispatch(RequestContext::new("GET", "/status"), &mut sink)
        .await
        .unwrap();
    let id = sink.header(REQUEST_ID_HEADER).unwrap();
    assert!(Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn test_create_url() {
    let app = app();
    let params: HashMap<String, String> = [("id".to_string(), "12".to_string())].into();
    assert_eq!(app.create_url("accounts/users/show", &params).await, "/users/12");
    assert_eq!(app.create_url("status/index", &HashMap::new()).await, "/status");
    assert_eq!(app.create_url("unknown", &params).await, "/unknown?id=12");
}

#[test]
fn test_unknown_route_target_is_rejected() {
    for route in ["nobody/index", "accounts/nobody/index", "ghost/users/show", "status"] {
        let result = Application::create(
            ModuleDef::new("app")
                .import(accounts_module())
                .controller(status()),
            vec![RouteConfig::get("/", route)],
            ApplicationOptions::default(),
        );
        assert!(
            matches!(
                result.err(),
                Some(Error::Configuration(ConfigurationError::UnknownRoute { .. }))
            ),
            "route {} should be rejected",
            route
        );
    }
}

#[test]
fn test_invalid_rule_pattern_is_rejected() {
    let result = Application::create(
        ModuleDef::new("app").controller(status()),
        vec![RouteConfig::get("/<id:>", "status/index")],
        ApplicationOptions::default(),
    );
    assert!(matches!(
        result.err(),
        Some(Error::Configuration(ConfigurationError::InvalidRoutePattern { .. }))
    ));
}

#[test]
fn test_options_are_injectable() {
    let app = app();
    let options = app.injector().get::<ApplicationOptions>().unwrap();
    assert_eq!(*options, *app.options());
}

#[test]
fn test_log_config_follows_options() {
    let mut options = ApplicationOptions::default();
    options.log.level = "debug".to_string();
    options.log.format = "pretty".to_string();
    let app = Application::create(
        ModuleDef::new("app").controller(status()),
        Vec::new(),
        options,
    )
    .unwrap();

    let config = app.log_config();
    assert_eq!(config.level, LogLevel::Debug);
    assert_eq!(config.format, LogFormat::Pretty);
}

#[tokio::test]
async fn test_destroy_releases_everything() {
    let app = app();
    let outcome = app.handle(RequestContext::new("GET", "/status")).await.unwrap();

    app.destroy();
    assert!(app.router().is_empty());
    assert!(app.injector().is_destroyed());
    assert!(app.root_module().injector().is_destroyed());
    assert!(outcome.scope.injector().is_destroyed());
}
