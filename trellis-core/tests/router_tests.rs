// Tests for route matching and reverse routing

use std::collections::HashMap;
use trellis_core::{Error, HttpMethod, Injector, RouteConfig, Router, RouterOptions};

fn router(rules: Vec<RouteConfig>) -> Router {
    let router = Router::new(Injector::new(), RouterOptions::default());
    router.add_rules(rules).unwrap();
    router
}

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_root_and_parameter_routes() {
    let router = router(vec![
        RouteConfig::get("/", "core/index"),
        RouteConfig::get("/home/<id:(\\d+)>", "core/view"),
    ]);
    let headers = HashMap::new();

    let index = router.parse_request("/", HttpMethod::GET, &headers).await.unwrap();
    assert_eq!(index.route, "core/index");
    assert!(index.params.is_empty());
    assert_eq!(index.method, HttpMethod::GET);

    let view = router.parse_request("/home/42", HttpMethod::GET, &headers).await.unwrap();
    assert_eq!(view.route, "core/view");
    assert_eq!(view.params, params(&[("id", "42")]));
    assert_eq!(view.method, HttpMethod::GET);
}

#[tokio::test]
async fn test_constraint_and_method_mismatch_are_not_found() {
    let router = router(vec![RouteConfig::get("/home/<id:(\\d+)>", "core/view")]);
    let headers = HashMap::new();

    let resolved = router.parse_request("/home/123", HttpMethod::GET, &headers).await.unwrap();
    assert_eq!(resolved.param("id"), Some("123"));

    assert!(matches!(
        router.parse_request("/home/abc", HttpMethod::GET, &headers).await,
        Err(Error::RouteNotFound { .. })
    ));
    let err = router
        .parse_request("/home/123", HttpMethod::POST, &headers)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RouteNotFound { .. }));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_reverse_url_round_trips() {
    let rules = vec![
        RouteConfig::new(
            &[HttpMethod::GET, HttpMethod::PUT],
            "/posts/<year:(\\d{4})>/<slug>",
            "blog/post",
        ),
        RouteConfig::get("/files/<name>.<ext:(txt|md)>", "files/show"),
    ];
    let router = router(rules.clone());
    let headers = HashMap::new();

    let cases = [
        ("blog/post", params(&[("year", "2024"), ("slug", "hello-world")])),
        ("files/show", params(&[("name", "readme"), ("ext", "md")])),
    ];
    for (route, values) in cases {
        let url = router.create_url(route, &values).await;
        let rule = rules.iter().find(|rule| rule.route == route).unwrap();
        for method in rule.parsed_methods().unwrap() {
            let resolved = router.parse_request(&url, method, &headers).await.unwrap();
            assert_eq!(resolved.route, route);
            assert_eq!(resolved.params, values, "round trip through {}", url);
        }
    }
}

#[tokio::test]
async fn test_reverse_url_rejects_invalid_values() {
    let router = router(vec![RouteConfig::get("/home/<id:(\\d+)>", "core/view")]);

    assert_eq!(router.create_url("core/view", &params(&[("id", "7")])).await, "/home/7");
    // a value the placeholder does not accept falls back to the query form
    assert_eq!(
        router.create_url("core/view", &params(&[("id", "seven")])).await,
        "/core/view?id=seven"
    );
}

#[tokio::test]
async fn test_reverse_url_keeps_delimiters_out_of_the_path() {
    let router = router(vec![
        RouteConfig::get("/tag/<name>", "tags/show"),
        RouteConfig::get("/files/<path:.+>", "files/read"),
    ]);
    let headers = HashMap::new();

    let tag = params(&[("name", "c#?x")]);
    let url = router.create_url("tags/show", &tag).await;
    assert_eq!(url, "/tags/show?name=c%23%3Fx");
    assert!(!url.starts_with("/tag/"));

    let file = params(&[("path", "a/b")]);
    assert_eq!(router.create_url("files/read", &file).await, "/files/read?path=a%2Fb");

    // values without delimiters still produce a path that parses back
    for (route, values) in [
        ("tags/show", params(&[("name", "rust-lang")])),
        ("files/read", params(&[("path", "notes.txt")])),
    ] {
        let url = router.create_url(route, &values).await;
        let resolved = router.parse_request(&url, HttpMethod::GET, &headers).await.unwrap();
        assert_eq!(resolved.route, route);
        assert_eq!(resolved.params, values, "round trip through {}", url);
    }
}

#[tokio::test]
async fn test_rules_are_scoped_under_router_injector() {
    let injector = Injector::new();
    let router = Router::new(injector.clone(), RouterOptions::default());
    router
        .add_rules(vec![
            RouteConfig::get("/a", "core/a"),
            RouteConfig::get("/b", "core/b"),
        ])
        .unwrap();
    assert_eq!(injector.child_count(), 2);

    router.destroy();
    assert!(router.is_empty());
    assert_eq!(injector.child_count(), 0);
}
