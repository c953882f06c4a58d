//! Hierarchical dependency injection.
//!
//! An [`Injector`] owns the instances resolved into it and falls back to its
//! parent on lookup. Children are tracked weakly so a dropped scope never
//! leaks; [`Injector::destroy`] cascades to every child still alive.

use crate::logging::{debug, trace};
use crate::metadata::Metadata;
use crate::provider::{downcast_instance, merge_providers, Argument, Arguments, Instance, Provider, Strategy};
use crate::{Error, Token};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_INJECTOR_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct State {
    parent: Option<Injector>,
    providers: HashMap<Token, Instance>,
    mutable: HashSet<Token>,
    children: Vec<Weak<Inner>>,
    destroyed: bool,
}

struct Inner {
    id: u64,
    metadata: Arc<Metadata>,
    state: RwLock<State>,
}

/// A DI scope. Cloning yields another handle to the same scope.
#[derive(Clone)]
pub struct Injector {
    inner: Arc<Inner>,
}

impl Injector {
    /// Root injector with an empty metadata registry.
    pub fn new() -> Self {
        Self::with_metadata(Arc::new(Metadata::new()))
    }

    pub fn with_metadata(metadata: Arc<Metadata>) -> Self {
        Self::build(metadata, State::default())
    }

    /// Child scope of `parent`. Tokens in `mutable` may be re-set.
    pub fn with_parent(parent: &Injector, mutable: impl IntoIterator<Item = Token>) -> Self {
        let child = Self::build(
            parent.inner.metadata.clone(),
            State {
                parent: Some(parent.clone()),
                mutable: mutable.into_iter().collect(),
                ..Default::default()
            },
        );

        let mut state = parent.inner.state.write();
        state.children.retain(|weak| weak.strong_count() > 0);
        state.children.push(Arc::downgrade(&child.inner));
        drop(state);

        trace!(injector = child.id(), parent = parent.id(), "Created child injector");
        child
    }

    fn build(metadata: Arc<Metadata>, state: State) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_INJECTOR_ID.fetch_add(1, Ordering::Relaxed),
                metadata,
                state: RwLock::new(state),
            }),
        }
    }

    /// New child of `parent` with `provider` resolved into it.
    ///
    /// The child is destroyed again when resolution fails.
    pub fn create_and_resolve_child(
        parent: &Injector,
        provider: &Provider,
        providers: Vec<Provider>,
    ) -> Result<Injector, Error> {
        let child = Injector::with_parent(parent, []);
        if let Err(err) = child.create_and_resolve(provider, providers) {
            child.destroy();
            return Err(err);
        }
        Ok(child)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.inner.metadata
    }

    pub fn parent(&self) -> Option<Injector> {
        self.inner.state.read().parent.clone()
    }

    /// Number of live child scopes.
    pub fn child_count(&self) -> usize {
        self.inner
            .state
            .read()
            .children
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.read().destroyed
    }

    /// Resolve `provider` into this injector and return its instance.
    ///
    /// The provider's own declared providers, merged with `providers`, are
    /// resolved first. A token already present in this injector is returned
    /// as-is, so every token is constructed at most once per scope.
    pub fn create_and_resolve(
        &self,
        provider: &Provider,
        providers: Vec<Provider>,
    ) -> Result<Instance, Error> {
        let mut resolving = Vec::new();
        self.resolve_provider(provider, &providers, &mut resolving)
    }

    fn resolve_provider(
        &self,
        provider: &Provider,
        providers: &[Provider],
        resolving: &mut Vec<Token>,
    ) -> Result<Instance, Error> {
        let token = provider.token().clone();
        if let Some(existing) = self.local(&token) {
            trace!(injector = self.id(), token = %token, "Provider already resolved");
            return Ok(existing);
        }

        let own = self.inner.metadata.component_providers(provider.metadata_token());
        let merged = merge_providers(&own, providers);

        resolving.push(token.clone());
        let result = self.resolve_dependencies(&merged, resolving).and_then(|_| {
            match provider.strategy() {
                Strategy::Value(value) => Ok(value.clone()),
                Strategy::Factory(factory) => {
                    let args = self.arguments(factory.dependencies(), &token)?;
                    factory.call(&args)
                }
                Strategy::Class(class) => {
                    let keys = self.inner.metadata.get_constructor_inject_keys(class)?;
                    let args = self.arguments(&keys, &token)?;
                    let mut fields = Vec::new();
                    for binding in self.inner.metadata.field_injections(class.token()) {
                        let value = if binding.is_mutable {
                            Arc::new(LiveBinding::new(self, binding.token.clone())) as Instance
                        } else {
                            self.get_value_for(&binding.token, Some(&token))?
                        };
                        fields.push((binding.key, value));
                    }
                    class.build(&args, fields)
                }
            }
        });
        resolving.pop();

        let instance = result?;
        self.register(token.clone(), instance.clone())?;
        debug!(injector = self.id(), token = %token, "Provider resolved");
        Ok(instance)
    }

    fn resolve_dependencies(
        &self,
        merged: &[Provider],
        resolving: &mut Vec<Token>,
    ) -> Result<(), Error> {
        for dependency in merged {
            if resolving.contains(dependency.token()) || self.has(dependency.token()) {
                continue;
            }
            self.resolve_provider(dependency, merged, resolving)?;
        }
        Ok(())
    }

    fn arguments(&self, tokens: &[Token], requested_by: &Token) -> Result<Arguments, Error> {
        tokens
            .iter()
            .map(|token| {
                self.get_value_for(token, Some(requested_by))
                    .map(|value| Argument::Instance(token.clone(), value))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Arguments::new)
    }

    fn local(&self, token: &Token) -> Option<Instance> {
        self.inner.state.read().providers.get(token).cloned()
    }

    fn register(&self, token: Token, instance: Instance) -> Result<(), Error> {
        let mut state = self.inner.state.write();
        if state.destroyed {
            return Err(Error::internal(format!(
                "injector #{} is destroyed",
                self.inner.id
            )));
        }
        if state.providers.contains_key(&token) && !state.mutable.contains(&token) {
            return Err(Error::TokenAlreadyDefined {
                token: token.to_string(),
                injector: self.inner.id,
            });
        }
        state.providers.insert(token, instance);
        Ok(())
    }

    /// Typed lookup by type token.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        self.get_token(&Token::of::<T>())
    }

    pub fn get_token<T: Send + Sync + 'static>(&self, token: &Token) -> Result<Arc<T>, Error> {
        downcast_instance(token, self.get_value(token)?)
    }

    pub fn get_named<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, Error> {
        self.get_token(&Token::named(name.to_string()))
    }

    pub fn get_value(&self, token: &Token) -> Result<Instance, Error> {
        self.get_value_for(token, None)
    }

    /// Lookup through this scope and its ancestors.
    ///
    /// The injector's own type token answers with a handle to this scope.
    pub fn get_value_for(
        &self,
        token: &Token,
        requested_by: Option<&Token>,
    ) -> Result<Instance, Error> {
        if *token == Token::of::<Injector>() {
            return Ok(Arc::new(self.clone()));
        }

        let mut current = Some(self.clone());
        while let Some(scope) = current {
            let state = scope.inner.state.read();
            if let Some(value) = state.providers.get(token) {
                return Ok(value.clone());
            }
            current = state.parent.clone();
        }

        debug!(injector = self.id(), token = %token, "No provider");
        Err(Error::NoProvider {
            token: token.to_string(),
            injector: self.inner.id,
            requested_by: requested_by.map(ToString::to_string),
        })
    }

    /// Local lookup only.
    pub fn has(&self, token: &Token) -> bool {
        *token == Token::of::<Injector>() || self.inner.state.read().providers.contains_key(token)
    }

    /// Register a value directly.
    ///
    /// Fails with [`Error::TokenAlreadyDefined`] when `token` is present and
    /// was not declared mutable.
    pub fn set(&self, token: impl Into<Token>, value: Instance) -> Result<(), Error> {
        let token = token.into();
        trace!(injector = self.id(), token = %token, "Setting value");
        self.register(token, value)
    }

    pub fn set_value<T: Send + Sync + 'static>(
        &self,
        token: impl Into<Token>,
        value: T,
    ) -> Result<(), Error> {
        self.set(token, Arc::new(value))
    }

    /// Detach from the parent, destroy every child and drop all instances.
    pub fn destroy(&self) {
        let (parent, children, released) = {
            let mut state = self.inner.state.write();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.mutable.clear();
            let released = state.providers.len();
            let providers = std::mem::take(&mut state.providers);
            let result = (
                state.parent.take(),
                std::mem::take(&mut state.children),
                released,
            );
            drop(state);
            // instances may own scope handles; drop them outside the lock
            drop(providers);
            result
        };

        if let Some(parent) = parent {
            let id = self.inner.id;
            parent
                .inner
                .state
                .write()
                .children
                .retain(|weak| weak.upgrade().is_some_and(|inner| inner.id != id));
        }

        for child in children.iter().filter_map(Weak::upgrade) {
            Injector { inner: child }.destroy();
        }

        debug!(injector = self.id(), released, "Injector destroyed");
    }
}

impl Default for Injector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Injector")
            .field("id", &self.inner.id)
            .field("parent", &state.parent.as_ref().map(Injector::id))
            .field("tokens", &state.providers.keys().collect::<Vec<_>>())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

/// Field value for a mutable injection: reads the token's current value from
/// the scope on every access.
#[derive(Clone)]
pub struct LiveBinding {
    scope: Weak<Inner>,
    scope_id: u64,
    token: Token,
}

impl LiveBinding {
    fn new(scope: &Injector, token: Token) -> Self {
        Self {
            scope: Arc::downgrade(&scope.inner),
            scope_id: scope.id(),
            token,
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn current(&self) -> Result<Instance, Error> {
        match self.scope.upgrade() {
            Some(inner) => Injector { inner }.get_value(&self.token),
            None => Err(Error::NoProvider {
                token: self.token.to_string(),
                injector: self.scope_id,
                requested_by: None,
            }),
        }
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        downcast_instance(&self.token, self.current()?)
    }
}

impl fmt::Debug for LiveBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LiveBinding({} in #{})", self.token, self.scope_id)
    }
}
