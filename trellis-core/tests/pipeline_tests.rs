// Tests for the controller pipeline, driven through an assembled application

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use trellis_core::{
    method, Application, ApplicationOptions, Arguments, BearerAuthFilter, Chain, ControllerDef,
    Error, Filter, FilterDef, Injectable, Method, ModuleDef, PipelineOptions, Provider, Request,
    RequestContext, RouteConfig, Token,
};

/// Shared event log, provided at application level.
#[derive(Default)]
struct Trace {
    events: Mutex<Vec<String>>,
}

impl Trace {
    fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

struct Home {
    trace: Arc<Trace>,
}

impl Injectable for Home {
    fn dependencies() -> Vec<Token> {
        vec![Token::of::<Trace>()]
    }

    fn construct(args: &Arguments) -> Result<Self, Error> {
        Ok(Home { trace: args.get(0)? })
    }
}

/// Stage appending `marker` to the chain and recording that it ran.
fn append(marker: &'static str) -> Method<Home> {
    method(move |home: Arc<Home>, args: Arguments| async move {
        home.trace.record(marker);
        Ok(format!("{}{}", args.chain(0).as_text(), marker))
    })
    .chain()
}

struct Wrap {
    trace: Arc<Trace>,
}

impl Injectable for Wrap {
    fn dependencies() -> Vec<Token> {
        vec![Token::of::<Trace>()]
    }

    fn construct(args: &Arguments) -> Result<Self, Error> {
        Ok(Wrap { trace: args.get(0)? })
    }
}

#[async_trait]
impl Filter for Wrap {
    async fn before(&self, _chain: Chain) -> Result<Chain, Error> {
        self.trace.record("filter.before");
        Ok(Chain::from("F<-"))
    }

    async fn after(&self, chain: Chain) -> Result<Chain, Error> {
        self.trace.record("filter.after");
        Ok(chain)
    }
}

struct Outer;

impl Injectable for Outer {
    fn construct(_: &Arguments) -> Result<Self, Error> {
        Ok(Outer)
    }
}

#[async_trait]
impl Filter for Outer {
    async fn before(&self, chain: Chain) -> Result<Chain, Error> {
        Ok(format!("{}[", chain.as_text()).into())
    }

    async fn after(&self, chain: Chain) -> Result<Chain, Error> {
        Ok(format!("{}]", chain.as_text()).into())
    }
}

fn application(
    controller: ControllerDef<Home>,
    rules: Vec<RouteConfig>,
    options: ApplicationOptions,
) -> (Application, Arc<Trace>) {
    let app = Application::create_with_providers(
        ModuleDef::new("app").controller(controller),
        rules,
        options,
        vec![Provider::value(Token::of::<Trace>(), Trace::default())],
    )
    .unwrap();
    let trace = app.injector().get::<Trace>().unwrap();
    (app, trace)
}

fn index_rule() -> Vec<RouteConfig> {
    vec![RouteConfig::get("/", "home/index")]
}

#[tokio::test]
async fn test_stages_run_in_order() {
    let home = ControllerDef::<Home>::new("home")
        .after_each(append("5"))
        .after("index", append("4"))
        .action("index", append("3"))
        .before("index", append("2"))
        .before_each(append("1"));
    let (app, trace) = application(home, index_rule(), ApplicationOptions::default());

    let outcome = app.handle(RequestContext::new("GET", "/")).await.unwrap();
    assert_eq!(outcome.chain, Chain::from("12345"));
    assert_eq!(outcome.response.status, 200);
    assert_eq!(outcome.route, "home/index");
    assert_eq!(trace.events(), vec!["1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn test_hooks_for_other_actions_do_not_run() {
    let home = ControllerDef::<Home>::new("home")
        .before("other", append("x"))
        .action("index", append("a"))
        .action("other", append("o"));
    let (app, _) = application(home, index_rule(), ApplicationOptions::default());

    let outcome = app.handle(RequestContext::new("GET", "/")).await.unwrap();
    assert_eq!(outcome.chain, Chain::from("a"));
}

fn stopping_home() -> ControllerDef<Home> {
    ControllerDef::<Home>::new("home")
        .filter(FilterDef::new::<Wrap>(1))
        .before_each(append("E"))
        .before(
            "index",
            method(|home: Arc<Home>, args: Arguments| async move {
                home.trace.record("before");
                args.get::<Request>(0)?.stop_chain();
                Ok("B")
            })
            .inject_type::<Request>(),
        )
        .action("index", append("A"))
        .after("index", append("R"))
        .after_each(append("Z"))
}

#[tokio::test]
async fn test_stop_chain_skips_remaining_stages() {
    let (app, trace) = application(stopping_home(), index_rule(), ApplicationOptions::default());

    let outcome = app.handle(RequestContext::new("GET", "/")).await.unwrap();
    assert_eq!(outcome.chain, Chain::from("B"));
    assert_eq!(trace.events(), vec!["filter.before", "E", "before"]);
}

#[tokio::test]
async fn test_closing_filters_can_run_after_stop() {
    let options = ApplicationOptions {
        pipeline: PipelineOptions {
            run_filters_after_stop: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let (app, trace) = application(stopping_home(), index_rule(), options);

    let outcome = app.handle(RequestContext::new("GET", "/")).await.unwrap();
    assert_eq!(outcome.chain, Chain::from("B"));
    assert_eq!(
        trace.events(),
        vec!["filter.before", "E", "before", "filter.after"]
    );
}

#[tokio::test]
async fn test_missing_action_fails() {
    let home = ControllerDef::<Home>::new("home").action("index", append("a"));
    let (app, _) = application(
        home,
        vec![RouteConfig::get("/missing", "home/missing")],
        ApplicationOptions::default(),
    );

    match app.handle(RequestContext::new("GET", "/missing")).await {
        Err(Error::ActionNotFound { action, controller }) => {
            assert_eq!(action, "missing");
            assert_eq!(controller, "home");
        }
        other => panic!("expected ActionNotFound, got {:?}", other.map(|o| o.chain)),
    }
}

#[tokio::test]
async fn test_filter_wraps_action() {
    let home = ControllerDef::<Home>::new("home")
        .filter(FilterDef::new::<Wrap>(100))
        .action("index", append("A"));
    let (app, trace) = application(home, index_rule(), ApplicationOptions::default());

    let outcome = app.handle(RequestContext::new("GET", "/")).await.unwrap();
    assert_eq!(outcome.chain, Chain::from("F<-A"));
    assert_eq!(trace.events(), vec!["filter.before", "A", "filter.after"]);
}

#[tokio::test]
async fn test_filters_nest_by_priority() {
    let home = ControllerDef::<Home>::new("home")
        .filter(FilterDef::new::<Outer>(1))
        .filter(FilterDef::new::<Wrap>(100))
        .filter(FilterDef::new::<BearerAuthFilter>(5).only(["admin"]))
        .action("index", append("A"));
    let (app, _) = application(home, index_rule(), ApplicationOptions::default());

    // Wrap replaces the chain, Outer opens and closes around the action
    let outcome = app.handle(RequestContext::new("GET", "/")).await.unwrap();
    assert_eq!(outcome.chain, Chain::from("F<-[A]"));
}

#[tokio::test]
async fn test_filter_rejection_propagates() {
    let home = ControllerDef::<Home>::new("home")
        .filter(FilterDef::new::<BearerAuthFilter>(10))
        .action("index", append("A"));
    let (app, trace) = application(home, index_rule(), ApplicationOptions::default());

    let err = app.handle(RequestContext::new("GET", "/")).await.unwrap_err();
    assert_eq!(err.status_code(), 401);
    assert!(trace.events().is_empty());

    let outcome = app
        .handle(RequestContext::new("GET", "/").with_header("authorization", "Bearer token"))
        .await
        .unwrap();
    assert_eq!(outcome.chain, Chain::from("A"));
}

fn failing_home() -> ControllerDef<Home> {
    ControllerDef::<Home>::new("home")
        .action(
            "index",
            method(|_: Arc<Home>, _| async { Err::<Chain, _>(Error::http(409, "conflict")) }),
        )
        .after_each(append("Z"))
}

#[tokio::test]
async fn test_error_hook_recovers() {
    let home = failing_home().on_error(
        "index",
        method(|_: Arc<Home>, args: Arguments| async move {
            let error = args.error(0).map(|e| e.to_string()).unwrap_or_default();
            Ok(format!("handled: {}", error))
        })
        .error(),
    );
    let (app, trace) = application(home, index_rule(), ApplicationOptions::default());

    let outcome = app.handle(RequestContext::new("GET", "/")).await.unwrap();
    assert_eq!(outcome.chain, Chain::from("handled: conflict"));
    assert_eq!(outcome.response.status, 409);
    assert!(trace.events().is_empty());
}

#[tokio::test]
async fn test_catch_all_error_hook() {
    let home = failing_home().on_error(
        "*",
        method(|_: Arc<Home>, _| async { Ok("fallback") }),
    );
    let (app, _) = application(home, index_rule(), ApplicationOptions::default());

    let outcome = app.handle(RequestContext::new("GET", "/")).await.unwrap();
    assert_eq!(outcome.chain, Chain::from("fallback"));
}

#[tokio::test]
async fn test_error_without_hook_propagates() {
    let (app, _) = application(failing_home(), index_rule(), ApplicationOptions::default());
    let err = app.handle(RequestContext::new("GET", "/")).await.unwrap_err();
    assert_eq!(err.status_code(), 409);
    // the failed request's scope is gone
    assert_eq!(app.root_module().injector().child_count(), 0);
}

#[tokio::test]
async fn test_produces_sets_content_type() {
    let home = ControllerDef::<Home>::new("home")
        .produces("index", "application/json")
        .action(
            "index",
            method(|_: Arc<Home>, _| async { Ok(r#"{"ok":true}"#) }),
        );
    let (app, _) = application(home, index_rule(), ApplicationOptions::default());

    let outcome = app.handle(RequestContext::new("GET", "/")).await.unwrap();
    assert_eq!(outcome.response.content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn test_route_params_and_query() {
    let home = ControllerDef::<Home>::new("home").action(
        "view",
        method(|_: Arc<Home>, args: Arguments| async move {
            let request = args.get::<Request>(1)?;
            Ok(format!(
                "{}:{}",
                args.param(0).unwrap_or("-"),
                request.query("tab").unwrap_or("-")
            ))
        })
        .param("id")
        .inject_type::<Request>(),
    );
    let (app, _) = application(
        home,
        vec![RouteConfig::get("/users/<id:(\\d+)>", "home/view")],
        ApplicationOptions::default(),
    );

    let outcome = app
        .handle(RequestContext::new("GET", "/users/7?tab=posts"))
        .await
        .unwrap();
    assert_eq!(outcome.chain, Chain::from("7:posts"));
}

#[tokio::test]
async fn test_derived_bindings_override_base() {
    let base = ControllerDef::<Home>::base("page")
        .before_each(append("<"))
        .action("index", append("base"))
        .action("about", append("about"));
    let home = ControllerDef::<Home>::new("home")
        .extends(base)
        .action("index", append("home"));
    let (app, _) = application(
        home,
        vec![
            RouteConfig::get("/", "home/index"),
            RouteConfig::get("/about", "home/about"),
        ],
        ApplicationOptions::default(),
    );

    let index = app.handle(RequestContext::new("GET", "/")).await.unwrap();
    assert_eq!(index.chain, Chain::from("<home"));
    let about = app.handle(RequestContext::new("GET", "/about")).await.unwrap();
    assert_eq!(about.chain, Chain::from("<about"));
}

#[tokio::test]
async fn test_request_scope_released_once() {
    let home = ControllerDef::<Home>::new("home").action("index", append("a"));
    let (app, _) = application(home, index_rule(), ApplicationOptions::default());
    let root = app.root_module().injector().clone();

    let outcome = app.handle(RequestContext::new("GET", "/")).await.unwrap();
    assert_eq!(root.child_count(), 1);
    assert!(outcome.scope.injector().get::<Request>().is_ok());

    assert!(outcome.scope.finished());
    assert!(!outcome.scope.closed());
    assert_eq!(root.child_count(), 0);
}
