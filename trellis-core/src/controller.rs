//! Controller declarations.
//!
//! A controller is a type implementing [`Injectable`] plus a
//! [`ControllerDef`] naming its actions, hooks, filters and providers:
//!
//! ```
//! use trellis_core::{method, Arguments, Chain, ControllerDef, Error, Injectable};
//! use std::sync::Arc;
//!
//! struct Home;
//!
//! impl Injectable for Home {
//!     fn construct(_: &Arguments) -> Result<Self, Error> {
//!         Ok(Home)
//!     }
//! }
//!
//! impl Home {
//!     async fn view(self: Arc<Self>, args: Arguments) -> Result<String, Error> {
//!         Ok(format!("{}view {}", args.chain(1).as_text(), args.param(0).unwrap_or("-")))
//!     }
//! }
//!
//! let home = ControllerDef::<Home>::new("home")
//!     .before_each(method(|_home: Arc<Home>, _args| async { Ok("> ") }))
//!     .action("view", method(Home::view).param("id").chain());
//! assert_eq!(home.name(), "home");
//! ```
//!
//! Inheritance is expressed by composition: [`ControllerDef::base`] declares
//! a reusable set of bindings and [`ControllerDef::extends`] layers the
//! controller's own bindings over it. The most derived binding for an
//! action wins.

use crate::filter::FilterDef;
use crate::metadata::{
    ActionBinding, ActionKind, ComponentConfig, InjectBinding, Metadata, MetadataValue,
    Namespace, ParamBinding, ParamKind,
};
use crate::provider::{verify_provider, ClassRef, Instance, Provider, ProviderRecord};
use crate::{Arguments, Chain, ConfigurationError, Error, Injectable, Token};
use futures_util::future::{self, BoxFuture, FutureExt};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased controller method.
pub type Handler =
    Arc<dyn Fn(Instance, Arguments) -> BoxFuture<'static, Result<Chain, Error>> + Send + Sync>;

/// A controller method and the sources of its arguments, in order.
pub struct Method<C> {
    key: Option<String>,
    params: Vec<ParamKind>,
    handler: Handler,
    _controller: PhantomData<fn() -> C>,
}

/// Wrap an async function of the controller as a [`Method`].
pub fn method<C, F, Fut, R>(function: F) -> Method<C>
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: Into<Chain> + Send + 'static,
{
    let handler: Handler = Arc::new(move |instance: Instance, args: Arguments| {
        match instance.downcast::<C>() {
            Ok(controller) => {
                let pending = function(controller, args);
                async move { pending.await.map(Into::into) }.boxed()
            }
            Err(_) => future::ready(Err(Error::Downcast {
                token: "controller instance".to_string(),
                expected: std::any::type_name::<C>(),
            }))
            .boxed(),
        }
    });
    Method {
        key: None,
        params: Vec::new(),
        handler,
        _controller: PhantomData,
    }
}

impl<C> Method<C> {
    /// Override the method key the bindings are recorded under.
    pub fn named(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Next argument: route parameter `name`.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamKind::Param(name.into()));
        self
    }

    /// Next argument: the current chain value.
    pub fn chain(mut self) -> Self {
        self.params.push(ParamKind::Chain);
        self
    }

    /// Next argument: the value registered for `token`.
    pub fn inject(mut self, token: impl Into<Token>) -> Self {
        self.params.push(ParamKind::Inject(token.into()));
        self
    }

    pub fn inject_type<T: ?Sized + 'static>(self) -> Self {
        self.inject(Token::of::<T>())
    }

    /// Next argument: the error being handled (OnError hooks only).
    pub fn error(mut self) -> Self {
        self.params.push(ParamKind::ErrorMessage);
        self
    }
}

struct Entry {
    binding: ActionBinding,
    params: Vec<ParamKind>,
    handler: Option<Handler>,
}

/// Untyped declaration, as consumed by module assembly.
pub struct Declaration {
    token: Token,
    name: String,
    class: Option<ClassRef>,
    providers: Vec<ProviderRecord>,
    filters: Vec<FilterDef>,
    entries: Vec<Entry>,
    injections: Vec<InjectBinding>,
    bases: Vec<Declaration>,
}

impl fmt::Debug for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declaration")
            .field("token", &self.token)
            .field("name", &self.name)
            .field("bindings", &self.entries.iter().map(|e| &e.binding).collect::<Vec<_>>())
            .field("bases", &self.bases)
            .finish()
    }
}

/// Handlers of every registered controller, keyed by declaring token and
/// method key.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<(Token, String), Handler>,
}

impl HandlerTable {
    pub fn get(&self, declared_by: &Token, key: &str) -> Option<&Handler> {
        self.handlers.get(&(declared_by.clone(), key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn has_token(&self, token: &Token) -> bool {
        self.handlers.keys().any(|(declared_by, _)| declared_by == token)
    }
}

/// Builder for a controller of type `C`.
pub struct ControllerDef<C> {
    decl: Declaration,
    _controller: PhantomData<fn() -> C>,
}

impl<C: Injectable> ControllerDef<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_parts(Token::of::<C>(), name.into(), Some(ClassRef::of::<C>()))
    }
}

impl<C: Send + Sync + 'static> ControllerDef<C> {
    /// A base declaration other controllers of type `C` can extend.
    pub fn base(name: impl Into<String>) -> Self {
        let name = name.into();
        let token = Token::named(format!("{}@{}", name, std::any::type_name::<C>()));
        Self::with_parts(token, name, None)
    }

    fn with_parts(token: Token, name: String, class: Option<ClassRef>) -> Self {
        Self {
            decl: Declaration {
                token,
                name,
                class,
                providers: Vec::new(),
                filters: Vec::new(),
                entries: Vec::new(),
                injections: Vec::new(),
                bases: Vec::new(),
            },
            _controller: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn token(&self) -> &Token {
        &self.decl.token
    }

    fn bind(mut self, kind: ActionKind, default_key: String, value: Option<String>, method: Method<C>) -> Self {
        self.decl.entries.push(Entry {
            binding: ActionBinding {
                kind,
                key: method.key.unwrap_or(default_key),
                value,
            },
            params: method.params,
            handler: Some(method.handler),
        });
        self
    }

    pub fn action(self, action: impl Into<String>, method: Method<C>) -> Self {
        let action = action.into();
        self.bind(ActionKind::Action, action.clone(), Some(action), method)
    }

    pub fn before(self, action: impl Into<String>, method: Method<C>) -> Self {
        let action = action.into();
        self.bind(ActionKind::Before, format!("before_{}", action), Some(action), method)
    }

    pub fn after(self, action: impl Into<String>, method: Method<C>) -> Self {
        let action = action.into();
        self.bind(ActionKind::After, format!("after_{}", action), Some(action), method)
    }

    pub fn before_each(self, method: Method<C>) -> Self {
        self.bind(ActionKind::BeforeEach, "before_each".to_string(), None, method)
    }

    pub fn after_each(self, method: Method<C>) -> Self {
        self.bind(ActionKind::AfterEach, "after_each".to_string(), None, method)
    }

    /// Error hook for `action`; `"*"` covers every action.
    pub fn on_error(self, action: impl Into<String>, method: Method<C>) -> Self {
        let action = action.into();
        if action == "*" {
            self.bind(ActionKind::OnError, "on_error".to_string(), None, method)
        } else {
            self.bind(ActionKind::OnError, format!("on_error_{}", action), Some(action), method)
        }
    }

    /// Content type of `action`'s response.
    pub fn produces(mut self, action: impl Into<String>, content_type: impl Into<String>) -> Self {
        self.decl.entries.push(Entry {
            binding: ActionBinding {
                kind: ActionKind::Produces,
                key: action.into(),
                value: Some(content_type.into()),
            },
            params: Vec::new(),
            handler: None,
        });
        self
    }

    /// Provider resolved into each instance's scope before construction.
    pub fn provider(mut self, provider: impl Into<ProviderRecord>) -> Self {
        self.decl.providers.push(provider.into());
        self
    }

    pub fn providers<I, P>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProviderRecord>,
    {
        self.decl.providers.extend(providers.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, filter: FilterDef) -> Self {
        self.decl.filters.push(filter);
        self
    }

    /// Replace constructor argument `index` with `token`.
    pub fn inject_param(mut self, index: usize, token: impl Into<Token>) -> Self {
        let token = token.into();
        self.decl.injections.push(InjectBinding {
            key: token.to_string(),
            token,
            param_index: Some(index),
            is_mutable: false,
        });
        self
    }

    /// Inject `token` into `field` after construction.
    pub fn inject_field(mut self, field: impl Into<String>, token: impl Into<Token>) -> Self {
        self.decl.injections.push(InjectBinding {
            token: token.into(),
            key: field.into(),
            param_index: None,
            is_mutable: false,
        });
        self
    }

    /// Inject a [`LiveBinding`](crate::LiveBinding) to `token` into `field`.
    pub fn inject_live_field(mut self, field: impl Into<String>, token: impl Into<Token>) -> Self {
        self.decl.injections.push(InjectBinding {
            token: token.into(),
            key: field.into(),
            param_index: None,
            is_mutable: true,
        });
        self
    }

    /// Inherit the bindings, filters and providers of `base`.
    pub fn extends(mut self, base: ControllerDef<C>) -> Self {
        self.decl.bases.push(base.decl);
        self
    }

    pub fn into_declaration(self) -> Declaration {
        self.decl
    }
}

impl<C> From<ControllerDef<C>> for Declaration {
    fn from(def: ControllerDef<C>) -> Self {
        def.decl
    }
}

/// What module assembly keeps about a registered controller.
#[derive(Clone, Debug)]
pub struct ControllerEntry {
    pub name: String,
    pub token: Token,
    pub provider: Provider,
}

fn duplicate(kind: impl fmt::Display, class: &Token, detail: String) -> ConfigurationError {
    ConfigurationError::DuplicateBinding {
        kind: kind.to_string(),
        class: class.to_string(),
        detail,
    }
}

impl Declaration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub(crate) fn is_controller(&self) -> bool {
        self.class.is_some()
    }

    /// Ancestors, base first, deduplicated.
    fn ancestry(&self) -> Vec<Token> {
        let mut chain: Vec<Token> = Vec::new();
        for base in &self.bases {
            for token in base.ancestry().into_iter().chain(std::iter::once(base.token.clone())) {
                if !chain.contains(&token) {
                    chain.push(token);
                }
            }
        }
        chain
    }

    fn inherited_filters(&self) -> Vec<FilterDef> {
        let mut filters: Vec<FilterDef> = self.bases.iter().flat_map(Declaration::inherited_filters).collect();
        filters.extend(self.filters.iter().cloned());
        filters
    }

    fn inherited_providers(&self) -> Result<Vec<Provider>, ConfigurationError> {
        let own = self
            .providers
            .iter()
            .cloned()
            .map(verify_provider)
            .collect::<Result<Vec<_>, _>>()?;
        let mut merged = own;
        for base in self.bases.iter().rev() {
            merged = Metadata::merge_providers(&merged, &base.inherited_providers()?);
        }
        Ok(merged)
    }

    fn inherited_injections(&self) -> Vec<InjectBinding> {
        let mut injections: Vec<InjectBinding> =
            self.bases.iter().flat_map(Declaration::inherited_injections).collect();
        for own in &self.injections {
            injections.retain(|existing| {
                existing.key != own.key
                    && (own.param_index.is_none() || existing.param_index != own.param_index)
            });
            injections.push(own.clone());
        }
        injections
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let mut keys = HashSet::new();
        let mut slots = HashSet::new();
        for entry in &self.entries {
            let binding = &entry.binding;
            if binding.kind != ActionKind::Produces && !keys.insert(binding.key.as_str()) {
                return Err(duplicate(
                    binding.kind,
                    &self.token,
                    format!("method `{}` is bound more than once", binding.key),
                ));
            }
            let slot = match binding.kind {
                ActionKind::Produces => Some(binding.key.as_str()),
                _ => binding.value.as_deref(),
            };
            if !slots.insert((binding.kind, slot)) {
                return Err(duplicate(
                    binding.kind,
                    &self.token,
                    match slot {
                        Some(action) => format!("action `{}` already has one", action),
                        None => "only one is allowed per controller".to_string(),
                    },
                ));
            }
            for (index, param) in entry.params.iter().enumerate() {
                let reason = match param {
                    ParamKind::ErrorMessage if binding.kind != ActionKind::OnError => {
                        Some("error arguments are only available to OnError hooks".to_string())
                    }
                    ParamKind::Param(name) if name.is_empty() => {
                        Some(format!("argument {} names an empty route parameter", index))
                    }
                    _ => None,
                };
                if let Some(reason) = reason {
                    return Err(ConfigurationError::InvalidParamBinding {
                        class: self.token.to_string(),
                        method: binding.key.clone(),
                        reason,
                    });
                }
            }
        }
        Ok(())
    }

    /// Record this declaration and its bases in `metadata` and `handlers`.
    pub(crate) fn register(
        &self,
        metadata: &mut Metadata,
        handlers: &mut HandlerTable,
    ) -> Result<(), ConfigurationError> {
        for base in &self.bases {
            if !handlers.has_token(&base.token)
                && !metadata.has_metadata(&base.token, Namespace::FunctionActions)
            {
                base.register(metadata, handlers)?;
            }
        }
        self.validate()?;

        let mut params = Vec::new();
        for entry in &self.entries {
            if let Some(handler) = &entry.handler {
                handlers
                    .handlers
                    .insert((self.token.clone(), entry.binding.key.clone()), handler.clone());
            }
            params.extend(entry.params.iter().enumerate().map(|(index, kind)| ParamBinding {
                kind: kind.clone(),
                key: entry.binding.key.clone(),
                param_index: index,
            }));
        }

        metadata.define_metadata(
            self.token.clone(),
            MetadataValue::Actions(self.entries.iter().map(|e| e.binding.clone()).collect()),
        );
        metadata.define_metadata(self.token.clone(), MetadataValue::Params(params));

        if self.is_controller() {
            metadata.define_metadata(self.token.clone(), MetadataValue::Inject(self.inherited_injections()));
            metadata.set_component_config(
                self.token.clone(),
                ComponentConfig {
                    name: Some(self.name.clone()),
                    providers: self.inherited_providers()?,
                    filters: self.inherited_filters(),
                    extends: self.ancestry(),
                },
            );
        }

        for filter in self.inherited_filters() {
            if !filter.providers().is_empty() {
                let providers = filter
                    .providers()
                    .iter()
                    .cloned()
                    .map(verify_provider)
                    .collect::<Result<Vec<_>, _>>()?;
                metadata.set_component_config(
                    filter.token().clone(),
                    ComponentConfig {
                        providers,
                        ..Default::default()
                    },
                );
            }
        }
        Ok(())
    }

    /// Entry for a registered controller; `None` for bases.
    pub(crate) fn entry(&self) -> Option<ControllerEntry> {
        self.class.as_ref().map(|class| ControllerEntry {
            name: self.name.clone(),
            token: self.token.clone(),
            provider: Provider::from(class.clone()),
        })
    }

    pub(crate) fn class(&self) -> Option<&ClassRef> {
        self.class.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Home;

    impl Injectable for Home {
        fn construct(_: &Arguments) -> Result<Self, Error> {
            Ok(Home)
        }
    }

    fn noop() -> Method<Home> {
        method(|_: Arc<Home>, args: Arguments| async move { Ok(args.chain(0)) })
    }

    fn registered(def: ControllerDef<Home>) -> Result<(Metadata, HandlerTable), ConfigurationError> {
        let mut metadata = Metadata::new();
        let mut handlers = HandlerTable::default();
        def.into_declaration().register(&mut metadata, &mut handlers)?;
        Ok((metadata, handlers))
    }

    #[test]
    fn test_bindings_recorded() {
        let def = ControllerDef::<Home>::new("home")
            .before_each(noop())
            .before("index", noop().chain())
            .action("index", noop().chain())
            .produces("index", "application/json")
            .on_error("*", noop().error());
        let (metadata, handlers) = registered(def).unwrap();
        let token = Token::of::<Home>();

        assert_eq!(metadata.action_bindings(&token).len(), 5);
        assert_eq!(handlers.len(), 4);
        assert!(handlers.get(&token, "before_index").is_some());
        assert_eq!(
            metadata.get_component_config(&token).and_then(|c| c.name.clone()),
            Some("home".to_string())
        );
        let produces = metadata
            .get_mapped_action(&token, "index", ActionKind::Produces)
            .unwrap();
        assert_eq!(produces.binding.value.as_deref(), Some("application/json"));
        assert_eq!(metadata.method_params(&token, "on_error")[0].kind, ParamKind::ErrorMessage);
    }

    #[test]
    fn test_duplicate_action_rejected() {
        let def = ControllerDef::<Home>::new("home")
            .action("index", noop())
            .action("index", noop().named("index_again"));
        assert!(matches!(
            registered(def),
            Err(ConfigurationError::DuplicateBinding { .. })
        ));

        let def = ControllerDef::<Home>::new("home")
            .before_each(noop())
            .before_each(noop().named("second"));
        assert!(registered(def).is_err());

        let def = ControllerDef::<Home>::new("home")
            .action("index", noop())
            .action("view", noop().named("index"));
        assert!(registered(def).is_err());
    }

    #[test]
    fn test_error_param_outside_on_error_rejected() {
        let def = ControllerDef::<Home>::new("home").action("index", noop().error());
        assert!(matches!(
            registered(def),
            Err(ConfigurationError::InvalidParamBinding { .. })
        ));
    }

    #[test]
    fn test_extends_records_ancestry() {
        let core = ControllerDef::<Home>::base("core").action("about", noop());
        let view = ControllerDef::<Home>::base("view")
            .extends(core)
            .action("index", noop())
            .filter(FilterDef::new::<crate::BearerAuthFilter>(1));
        let def = ControllerDef::<Home>::new("home")
            .extends(view)
            .action("index", noop().named("home_index"));
        let (metadata, handlers) = registered(def).unwrap();
        let token = Token::of::<Home>();

        let config = metadata.get_component_config(&token).unwrap();
        assert_eq!(config.extends.len(), 2);
        assert_eq!(config.filters.len(), 1);

        let index = metadata
            .get_mapped_action(&token, "index", ActionKind::Action)
            .unwrap();
        assert_eq!(index.declared_by, token);
        assert_eq!(index.binding.key, "home_index");

        let about = metadata
            .get_mapped_action(&token, "about", ActionKind::Action)
            .unwrap();
        assert_eq!(about.declared_by, config.extends[0]);
        assert!(handlers.get(&about.declared_by, "about").is_some());
    }

    #[test]
    fn test_invalid_provider_rejected() {
        let def = ControllerDef::<Home>::new("home")
            .action("index", noop())
            .provider(ProviderRecord::new("name"));
        assert!(matches!(
            registered(def),
            Err(ConfigurationError::InvalidProvider { .. })
        ));
    }

    #[tokio::test]
    async fn test_handler_converts_return_value() {
        let m = method(|_: Arc<Home>, args: Arguments| async move {
            Ok(format!("{}!", args.param(0).unwrap_or("")))
        });
        let args = Arguments::new(vec![crate::Argument::Param(Some("hi".into()))]);
        let out = (m.handler)(Arc::new(Home) as Instance, args).await.unwrap();
        assert_eq!(out, Chain::from("hi!"));

        let wrong = (m.handler)(Arc::new(1u8) as Instance, Arguments::default()).await;
        assert!(matches!(wrong, Err(Error::Downcast { .. })));
    }
}
