// Routing: rule registration, request matching and reverse URLs

use crate::logging::{debug, trace};
use crate::route_matcher::RouteParser;
use crate::{
    Arguments, Error, HttpMethod, Injectable, Injector, Provider, RouterOptions, Token,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// `{url pattern, route name, accepted methods}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Method names, validated when the rule is added
    pub methods: Vec<String>,
    pub url: String,
    pub route: String,
}

impl RouteConfig {
    pub fn new(methods: &[HttpMethod], url: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            methods: methods.iter().map(|m| m.as_str().to_string()).collect(),
            url: url.into(),
            route: route.into(),
        }
    }

    pub fn get(url: impl Into<String>, route: impl Into<String>) -> Self {
        Self::new(&[HttpMethod::GET], url, route)
    }

    pub fn post(url: impl Into<String>, route: impl Into<String>) -> Self {
        Self::new(&[HttpMethod::POST], url, route)
    }

    /// Declared methods, failing on any name outside the closed set.
    pub fn parsed_methods(&self) -> Result<Vec<HttpMethod>, Error> {
        self.methods.iter().map(|m| m.parse()).collect()
    }
}

/// Output of a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub method: HttpMethod,
    pub params: HashMap<String, String>,
    pub route: String,
}

impl ResolvedRoute {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// A matchable route.
#[async_trait]
pub trait Route: Send + Sync {
    /// Name used by [`Router::remove_rules`]; `None` for anonymous routes.
    fn name(&self) -> Option<&str> {
        None
    }

    async fn parse_request(
        &self,
        path: &str,
        method: HttpMethod,
        headers: &HashMap<String, String>,
    ) -> Option<ResolvedRoute>;

    async fn create_url(&self, route_name: &str, params: &HashMap<String, String>) -> Option<String>;

    /// Release compiled state when the route is removed.
    fn destroy(&self) {}
}

/// Route backed by a compiled URL pattern.
pub struct RouteRule {
    config: Arc<RouteConfig>,
    methods: Vec<HttpMethod>,
    parser: RwLock<RouteParser>,
}

impl RouteRule {
    pub fn config(&self) -> &RouteConfig {
        &self.config
    }
}

impl Injectable for RouteRule {
    fn dependencies() -> Vec<Token> {
        vec![Token::of::<RouteConfig>()]
    }

    fn construct(args: &Arguments) -> Result<Self, Error> {
        let config: Arc<RouteConfig> = args.get(0)?;
        let methods = config.parsed_methods()?;
        let parser = RouteParser::parse(&config.url)?;
        Ok(Self {
            config,
            methods,
            parser: RwLock::new(parser),
        })
    }
}

#[async_trait]
impl Route for RouteRule {
    fn name(&self) -> Option<&str> {
        Some(&self.config.route)
    }

    async fn parse_request(
        &self,
        path: &str,
        method: HttpMethod,
        _headers: &HashMap<String, String>,
    ) -> Option<ResolvedRoute> {
        if !self.methods.contains(&method) {
            return None;
        }
        let params = self.parser.read().get_params(path)?;
        Some(ResolvedRoute {
            method,
            params,
            route: self.config.route.clone(),
        })
    }

    async fn create_url(&self, route_name: &str, params: &HashMap<String, String>) -> Option<String> {
        if route_name != self.config.route {
            return None;
        }
        self.parser.read().create_url(params)
    }

    fn destroy(&self) {
        self.parser.write().destroy();
    }
}

struct RouteEntry {
    route: Arc<dyn Route>,
    scope: Option<Injector>,
}

/// Ordered route list: first registered, first matched.
pub struct Router {
    injector: Injector,
    options: RouterOptions,
    routes: RwLock<Vec<RouteEntry>>,
}

impl Router {
    pub fn new(injector: Injector, options: RouterOptions) -> Self {
        Self {
            injector,
            options,
            routes: RwLock::new(Vec::new()),
        }
    }

    /// Register rules in order. Each rule is built in its own child scope
    /// of the router's injector.
    pub fn add_rules(&self, rules: impl IntoIterator<Item = RouteConfig>) -> Result<(), Error> {
        for config in rules {
            let scope = Injector::create_and_resolve_child(
                &self.injector,
                &Provider::class::<RouteRule>(),
                vec![Provider::value(Token::of::<RouteConfig>(), config.clone())],
            )?;
            let rule = scope.get::<RouteRule>()?;
            debug!(route = %config.route, url = %config.url, methods = ?config.methods, "Route rule added");
            self.routes.write().push(RouteEntry {
                route: rule,
                scope: Some(scope),
            });
        }
        Ok(())
    }

    /// Register a custom route after the existing ones.
    pub fn add_route(&self, route: Arc<dyn Route>) {
        debug!(route = route.name().unwrap_or("<anonymous>"), "Custom route added");
        self.routes.write().push(RouteEntry { route, scope: None });
    }

    /// Remove every route named `route_name`, returning how many were removed.
    pub fn remove_rules(&self, route_name: &str) -> usize {
        let removed: Vec<RouteEntry> = {
            let mut routes = self.routes.write();
            let (removed, kept): (Vec<RouteEntry>, Vec<RouteEntry>) = std::mem::take(&mut *routes)
                .into_iter()
                .partition(|entry| entry.route.name() == Some(route_name));
            *routes = kept;
            removed
        };
        for entry in &removed {
            entry.route.destroy();
            if let Some(scope) = &entry.scope {
                scope.destroy();
            }
        }
        debug!(route = route_name, removed = removed.len(), "Route rules removed");
        removed.len()
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Route>> {
        self.routes.read().iter().map(|entry| entry.route.clone()).collect()
    }

    /// Resolve `path` and `method` to the first matching route.
    pub async fn parse_request(
        &self,
        path: &str,
        method: HttpMethod,
        headers: &HashMap<String, String>,
    ) -> Result<ResolvedRoute, Error> {
        let path = if self.options.strip_query {
            split_query(path).0
        } else {
            path
        };

        for route in self.snapshot() {
            if let Some(resolved) = route.parse_request(path, method, headers).await {
                trace!(route = %resolved.route, path, method = %method, "Route matched");
                return Ok(resolved);
            }
        }

        debug!(path, method = %method, "No route matched");
        Err(Error::RouteNotFound {
            method: method.to_string(),
            path: path.to_string(),
        })
    }

    /// Reverse URL for `route_name`.
    ///
    /// Falls back to `/route_name?key=value&..` with keys sorted and values
    /// percent-encoded when no route can generate the URL.
    pub async fn create_url(&self, route_name: &str, params: &HashMap<String, String>) -> String {
        for route in self.snapshot() {
            if let Some(url) = route.create_url(route_name, params).await {
                return if url.starts_with('/') {
                    url
                } else {
                    format!("/{}", url)
                };
            }
        }

        let mut url = if route_name.starts_with('/') {
            route_name.to_string()
        } else {
            format!("/{}", route_name)
        };
        if !params.is_empty() {
            let mut keys: Vec<&String> = params.keys().collect();
            keys.sort();
            let query: Vec<String> = keys
                .into_iter()
                .map(|key| format!("{}={}", key, urlencoding::encode(&params[key])))
                .collect();
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }

    /// Destroy every route and its scope.
    pub fn destroy(&self) {
        let routes = std::mem::take(&mut *self.routes.write());
        for entry in routes {
            entry.route.destroy();
            if let Some(scope) = entry.scope {
                scope.destroy();
            }
        }
    }
}

/// Split `path?query` into its two halves.
pub fn split_query(path: &str) -> (&str, Option<&str>) {
    match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    }
}

/// Parse a query string into a map of decoded parameters
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let mut split = part.splitn(2, '=');
            let key = split.next()?;
            let value = split.next().unwrap_or("");
            let decode = |s: &str| {
                urlencoding::decode(&s.replace('+', " "))
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            };
            Some((decode(key), decode(value)))
        })
        .collect()
}
