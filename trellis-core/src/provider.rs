//! Providers: recipes the injector follows to produce a value for a token.
//!
//! A provider uses exactly one strategy:
//!
//! - **value**: a pre-built instance
//! - **class**: a type implementing [`Injectable`], constructed with its
//!   dependencies resolved from the injector
//! - **factory**: a function plus the tokens of its own dependencies
//!
//! ```
//! use trellis_core::{Arguments, Error, Injectable, Injector, Provider, Token};
//! use std::sync::Arc;
//!
//! struct Logger;
//!
//! impl Injectable for Logger {
//!     fn construct(_: &Arguments) -> Result<Self, Error> {
//!         Ok(Logger)
//!     }
//! }
//!
//! struct Greeter {
//!     logger: Arc<Logger>,
//! }
//!
//! impl Injectable for Greeter {
//!     fn dependencies() -> Vec<Token> {
//!         vec![Token::of::<Logger>()]
//!     }
//!
//!     fn construct(args: &Arguments) -> Result<Self, Error> {
//!         Ok(Greeter { logger: args.get(0)? })
//!     }
//! }
//!
//! let injector = Injector::new();
//! injector
//!     .create_and_resolve(&Provider::class::<Greeter>(), vec![Provider::class::<Logger>()])
//!     .unwrap();
//! let greeter = injector.get::<Greeter>().unwrap();
//! assert!(Arc::ptr_eq(&greeter.logger, &injector.get::<Logger>().unwrap()));
//! ```

use crate::{Chain, ConfigurationError, Error, Token};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A resolved value as stored by the injector.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Downcast an untyped instance, naming the token on failure.
pub fn downcast_instance<T: Send + Sync + 'static>(
    token: &Token,
    instance: Instance,
) -> Result<Arc<T>, Error> {
    instance.downcast::<T>().map_err(|_| Error::Downcast {
        token: token.to_string(),
        expected: std::any::type_name::<T>(),
    })
}

/// One resolved argument of a constructor, factory, action or hook.
#[derive(Clone)]
pub enum Argument {
    Instance(Token, Instance),
    Param(Option<String>),
    Chain(Chain),
    Error(Option<Arc<Error>>),
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Instance(token, _) => write!(f, "Instance({})", token),
            Argument::Param(value) => write!(f, "Param({:?})", value),
            Argument::Chain(chain) => write!(f, "Chain({:?})", chain),
            Argument::Error(error) => write!(f, "Error({:?})", error.as_ref().map(|e| e.to_string())),
        }
    }
}

/// Positional arguments, already ordered by parameter index.
#[derive(Clone, Debug, Default)]
pub struct Arguments {
    values: Vec<Argument>,
}

impl Arguments {
    pub fn new(values: Vec<Argument>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn raw(&self, index: usize) -> Option<&Argument> {
        self.values.get(index)
    }

    /// Injected instance at `index`, downcast to `T`.
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>, Error> {
        match self.values.get(index) {
            Some(Argument::Instance(token, instance)) => downcast_instance(token, instance.clone()),
            other => Err(Error::internal(format!(
                "argument {} is not an injected instance: {:?}",
                index, other
            ))),
        }
    }

    /// Route parameter at `index`; `None` when the route did not capture it.
    pub fn param(&self, index: usize) -> Option<&str> {
        match self.values.get(index) {
            Some(Argument::Param(value)) => value.as_deref(),
            _ => None,
        }
    }

    /// Chain value at `index`, [`Chain::Empty`] when absent.
    pub fn chain(&self, index: usize) -> Chain {
        match self.values.get(index) {
            Some(Argument::Chain(chain)) => chain.clone(),
            _ => Chain::Empty,
        }
    }

    /// Captured error at `index`.
    pub fn error(&self, index: usize) -> Option<Arc<Error>> {
        match self.values.get(index) {
            Some(Argument::Error(error)) => error.clone(),
            _ => None,
        }
    }
}

/// A type the injector can construct.
pub trait Injectable: Send + Sync + Sized + 'static {
    /// Implicit constructor dependencies, in parameter order.
    ///
    /// Explicit overrides registered in the metadata replace entries at their
    /// parameter index.
    fn dependencies() -> Vec<Token> {
        Vec::new()
    }

    fn construct(args: &Arguments) -> Result<Self, Error>;

    /// Assign a field-level injection declared in the metadata.
    fn inject_field(&mut self, field: &str, _value: Instance) -> Result<(), Error> {
        Err(ConfigurationError::InvalidField {
            class: std::any::type_name::<Self>().to_string(),
            reason: format!("no injectable field `{}`", field),
        }
        .into())
    }

    /// Post-construction hook, runs before the instance is registered.
    fn after_construct(&self) -> Result<(), Error> {
        Ok(())
    }
}

type BuildFn = fn(&Arguments, Vec<(String, Instance)>) -> Result<Instance, Error>;

fn build_class<T: Injectable>(
    args: &Arguments,
    fields: Vec<(String, Instance)>,
) -> Result<Instance, Error> {
    let mut instance = T::construct(args)?;
    for (field, value) in fields {
        instance.inject_field(&field, value)?;
    }
    instance.after_construct()?;
    Ok(Arc::new(instance))
}

/// A bare class reference.
#[derive(Clone)]
pub struct ClassRef {
    token: Token,
    dependencies: fn() -> Vec<Token>,
    build: BuildFn,
}

impl ClassRef {
    pub fn of<T: Injectable>() -> Self {
        Self {
            token: Token::of::<T>(),
            dependencies: T::dependencies,
            build: build_class::<T>,
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn dependencies(&self) -> Vec<Token> {
        (self.dependencies)()
    }

    pub(crate) fn build(
        &self,
        args: &Arguments,
        fields: Vec<(String, Instance)>,
    ) -> Result<Instance, Error> {
        (self.build)(args, fields)
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassRef({})", self.token)
    }
}

type FactoryFn = Arc<dyn Fn(&Arguments) -> Result<Instance, Error> + Send + Sync>;

/// A factory function with its dependency tokens.
#[derive(Clone)]
pub struct Factory {
    dependencies: Vec<Token>,
    function: FactoryFn,
}

impl Factory {
    pub fn new<T, F>(dependencies: Vec<Token>, function: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Arguments) -> Result<T, Error> + Send + Sync + 'static,
    {
        Self {
            dependencies,
            function: Arc::new(move |args| Ok(Arc::new(function(args)?) as Instance)),
        }
    }

    pub fn dependencies(&self) -> &[Token] {
        &self.dependencies
    }

    pub(crate) fn call(&self, args: &Arguments) -> Result<Instance, Error> {
        (self.function)(args)
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

#[derive(Clone)]
pub enum Strategy {
    Value(Instance),
    Class(ClassRef),
    Factory(Factory),
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Value(_) => f.write_str("Value"),
            Strategy::Class(class) => write!(f, "Class({})", class.token()),
            Strategy::Factory(factory) => write!(f, "{:?}", factory),
        }
    }
}

/// A validated provider.
#[derive(Clone, Debug)]
pub struct Provider {
    provide: Token,
    strategy: Strategy,
}

impl Provider {
    /// `T` provided by constructing `T`.
    pub fn class<T: Injectable>() -> Self {
        ClassRef::of::<T>().into()
    }

    /// A pre-built value under any token.
    pub fn value<T: Send + Sync + 'static>(provide: impl Into<Token>, value: T) -> Self {
        Self::instance(provide, Arc::new(value))
    }

    pub fn instance(provide: impl Into<Token>, instance: Instance) -> Self {
        Self {
            provide: provide.into(),
            strategy: Strategy::Value(instance),
        }
    }

    /// `T` provided by a factory.
    pub fn factory<T, F>(dependencies: Vec<Token>, function: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Arguments) -> Result<T, Error> + Send + Sync + 'static,
    {
        Self {
            provide: Token::of::<T>(),
            strategy: Strategy::Factory(Factory::new(dependencies, function)),
        }
    }

    pub fn token(&self) -> &Token {
        &self.provide
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Token whose metadata describes this provider: the class for class
    /// providers, the provided token otherwise.
    pub fn metadata_token(&self) -> &Token {
        match &self.strategy {
            Strategy::Class(class) => class.token(),
            _ => &self.provide,
        }
    }
}

impl From<ClassRef> for Provider {
    fn from(class: ClassRef) -> Self {
        Self {
            provide: class.token().clone(),
            strategy: Strategy::Class(class),
        }
    }
}

/// Raw provider record, validated by [`verify_provider`].
#[derive(Clone, Default)]
pub struct ProviderRecord {
    pub provide: Option<Token>,
    pub use_value: Option<Instance>,
    pub use_class: Option<ClassRef>,
    pub use_factory: Option<Factory>,
}

impl ProviderRecord {
    pub fn new(provide: impl Into<Token>) -> Self {
        Self {
            provide: Some(provide.into()),
            ..Default::default()
        }
    }

    pub fn use_value<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.use_value = Some(Arc::new(value));
        self
    }

    pub fn use_class<T: Injectable>(mut self) -> Self {
        self.use_class = Some(ClassRef::of::<T>());
        self
    }

    pub fn use_factory<T, F>(mut self, dependencies: Vec<Token>, function: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Arguments) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.use_factory = Some(Factory::new(dependencies, function));
        self
    }
}

impl From<ClassRef> for ProviderRecord {
    fn from(class: ClassRef) -> Self {
        Self {
            provide: Some(class.token().clone()),
            use_class: Some(class),
            ..Default::default()
        }
    }
}

impl From<Provider> for ProviderRecord {
    fn from(provider: Provider) -> Self {
        let mut record = ProviderRecord::new(provider.provide);
        match provider.strategy {
            Strategy::Value(value) => record.use_value = Some(value),
            Strategy::Class(class) => record.use_class = Some(class),
            Strategy::Factory(factory) => record.use_factory = Some(factory),
        }
        record
    }
}

impl fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("provide", &self.provide)
            .field("use_value", &self.use_value.is_some())
            .field("use_class", &self.use_class)
            .field("use_factory", &self.use_factory)
            .finish()
    }
}

/// Normalize and validate a provider.
///
/// A bare [`ClassRef`] becomes `provide = use_class = class`. A record must
/// name its token, set exactly one strategy, and string tokens may only use
/// a value.
pub fn verify_provider(value: impl Into<ProviderRecord>) -> Result<Provider, ConfigurationError> {
    let record = value.into();
    let provide = record
        .provide
        .ok_or_else(|| ConfigurationError::InvalidProvider {
            token: "<unnamed>".to_string(),
            reason: "`provide` is required".to_string(),
        })?;

    let invalid = |reason: &str| ConfigurationError::InvalidProvider {
        token: provide.to_string(),
        reason: reason.to_string(),
    };

    let strategies = [
        record.use_value.is_some(),
        record.use_class.is_some(),
        record.use_factory.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();

    if strategies != 1 {
        return Err(invalid(
            "exactly one of use_value, use_class or use_factory must be set",
        ));
    }

    if provide.is_named() && record.use_value.is_none() {
        return Err(invalid("string tokens can only be provided with use_value"));
    }

    let strategy = if let Some(value) = record.use_value {
        Strategy::Value(value)
    } else if let Some(class) = record.use_class {
        Strategy::Class(class)
    } else if let Some(factory) = record.use_factory {
        Strategy::Factory(factory)
    } else {
        return Err(invalid("no strategy"));
    };

    Ok(Provider { provide, strategy })
}

/// `a` followed by the providers of `b` whose token `a` does not already
/// provide. Order is preserved and `a` wins.
pub fn merge_providers(a: &[Provider], b: &[Provider]) -> Vec<Provider> {
    let mut merged = a.to_vec();
    for provider in b {
        if !merged.iter().any(|existing| existing.token() == provider.token()) {
            merged.push(provider.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Logger;

    impl Injectable for Logger {
        fn construct(_: &Arguments) -> Result<Self, Error> {
            Ok(Logger)
        }
    }

    #[test]
    fn test_bare_class_is_normalized() {
        let provider = verify_provider(ClassRef::of::<Logger>()).unwrap();
        assert_eq!(provider.token(), &Token::of::<Logger>());
        assert!(matches!(provider.strategy(), Strategy::Class(_)));
    }

    #[test]
    fn test_exactly_one_strategy() {
        let none = ProviderRecord::new(Token::of::<Logger>());
        let err = verify_provider(none).unwrap_err();
        assert!(err.to_string().contains("exactly one"));

        let both = ProviderRecord::new(Token::of::<Logger>())
            .use_class::<Logger>()
            .use_value(42u32);
        assert!(verify_provider(both).is_err());
    }

    #[test]
    fn test_string_tokens_require_value() {
        let record = ProviderRecord::new("logger").use_class::<Logger>();
        let err = verify_provider(record).unwrap_err();
        assert!(err.to_string().contains("string tokens"));

        let record = ProviderRecord::new("logger").use_value("stdout".to_string());
        assert!(verify_provider(record).is_ok());
    }

    #[test]
    fn test_missing_provide() {
        let record = ProviderRecord {
            use_value: Some(Arc::new(1u8)),
            ..Default::default()
        };
        assert!(verify_provider(record).is_err());
    }

    #[test]
    fn test_merge_providers_keeps_first() {
        let a = vec![Provider::value("x", 1u32), Provider::class::<Logger>()];
        let b = vec![Provider::value("x", 2u32), Provider::value("y", 3u32)];
        let merged = merge_providers(&a, &b);

        let tokens: Vec<_> = merged.iter().map(|p| p.token().to_string()).collect();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], "x");
        assert_eq!(tokens[2], "y");

        match merged[0].strategy() {
            Strategy::Value(value) => assert_eq!(value.downcast_ref::<u32>(), Some(&1)),
            other => panic!("unexpected strategy {:?}", other),
        }
    }

    #[test]
    fn test_arguments_accessors() {
        let args = Arguments::new(vec![
            Argument::Param(Some("42".to_string())),
            Argument::Chain(Chain::from("prev")),
            Argument::Instance(Token::of::<u32>(), Arc::new(7u32)),
            Argument::Param(None),
        ]);
        assert_eq!(args.param(0), Some("42"));
        assert_eq!(args.chain(1), Chain::from("prev"));
        assert_eq!(*args.get::<u32>(2).unwrap(), 7);
        assert!(args.get::<String>(2).is_err());
        assert_eq!(args.param(3), None);
        assert!(args.error(0).is_none());
    }
}
