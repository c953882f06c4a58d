//! Module assembly.
//!
//! A [`ModuleDef`] groups controllers and providers. Modules import other
//! modules and see only the tokens those modules export:
//!
//! ```
//! use trellis_core::{assemble, Arguments, Error, Injectable, ModuleDef, Provider, Token};
//!
//! struct Database;
//!
//! impl Injectable for Database {
//!     fn construct(_: &Arguments) -> Result<Self, Error> {
//!         Ok(Database)
//!     }
//! }
//!
//! let storage = ModuleDef::new("storage")
//!     .provider(Provider::class::<Database>())
//!     .provider(Provider::value("storage.secret", "hidden"))
//!     .export::<Database>();
//! let app = ModuleDef::new("app").import(storage);
//!
//! let assembly = assemble(app, Vec::new()).unwrap();
//! let root = assembly.root();
//! assert!(root.injector().has(&Token::of::<Database>()));
//! assert!(!root.injector().has(&Token::named("storage.secret")));
//! ```
//!
//! Assembly happens in two passes. The first records every controller in
//! the shared [`Metadata`] registry and rejects wiring defects; the second
//! resolves each module into its own injector, imports first.

use crate::controller::{ControllerDef, ControllerEntry, Declaration, HandlerTable};
use crate::logging::{debug, info};
use crate::metadata::Metadata;
use crate::pipeline::CHAIN_TOKEN;
use crate::provider::{verify_provider, Provider, ProviderRecord};
use crate::{ConfigurationError, Error, Injector, Request, RequestContext, ResolvedRoute, Token};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Declarative module configuration.
#[derive(Debug)]
pub struct ModuleDef {
    name: String,
    controllers: Vec<Declaration>,
    providers: Vec<ProviderRecord>,
    imports: Vec<ModuleDef>,
    exports: Vec<Token>,
}

impl ModuleDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            controllers: Vec::new(),
            providers: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn controller<C>(mut self, controller: ControllerDef<C>) -> Self {
        self.controllers.push(controller.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<ProviderRecord>) -> Self {
        self.providers.push(provider.into());
        self
    }

    pub fn providers<I, P>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProviderRecord>,
    {
        self.providers.extend(providers.into_iter().map(Into::into));
        self
    }

    pub fn import(mut self, module: ModuleDef) -> Self {
        self.imports.push(module);
        self
    }

    /// Make `T` visible to importing modules.
    pub fn export<T: ?Sized + 'static>(self) -> Self {
        self.export_token(Token::of::<T>())
    }

    pub fn export_token(mut self, token: impl Into<Token>) -> Self {
        self.exports.push(token.into());
        self
    }
}

/// A resolved module.
#[derive(Debug)]
pub struct AssembledModule {
    name: String,
    injector: Injector,
    controllers: HashMap<String, ControllerEntry>,
    exports: Vec<Token>,
}

impl AssembledModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    pub fn controller(&self, name: &str) -> Option<&ControllerEntry> {
        self.controllers.get(name)
    }

    pub fn controller_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.controllers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn exports(&self) -> &[Token] {
        &self.exports
    }
}

/// Result of [`assemble`].
pub struct Assembly {
    injector: Injector,
    root: Arc<AssembledModule>,
    modules: HashMap<String, Arc<AssembledModule>>,
    metadata: Arc<Metadata>,
    handlers: Arc<HandlerTable>,
}

impl Assembly {
    /// Application scope: parent of every module injector.
    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    pub fn root(&self) -> &Arc<AssembledModule> {
        &self.root
    }

    pub fn module(&self, name: &str) -> Option<&Arc<AssembledModule>> {
        self.modules.get(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Arc<AssembledModule>> {
        self.modules.values()
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    pub fn handlers(&self) -> &Arc<HandlerTable> {
        &self.handlers
    }
}

/// Tokens every request scope provides.
fn request_scoped_tokens() -> [Token; 5] {
    [
        Token::of::<Request>(),
        Token::of::<ResolvedRoute>(),
        Token::of::<RequestContext>(),
        Token::of::<Injector>(),
        CHAIN_TOKEN,
    ]
}

/// Assemble `root` and everything it imports.
///
/// `application` providers are resolved first into the application scope,
/// which every module injector falls back to.
pub fn assemble(root: ModuleDef, application: Vec<Provider>) -> Result<Assembly, Error> {
    let mut metadata = Metadata::new();
    let mut handlers = HandlerTable::default();
    let mut names = HashSet::new();
    record(&root, &mut metadata, &mut handlers, &mut names)?;

    let metadata = Arc::new(metadata);
    let injector = Injector::with_metadata(metadata.clone());
    for provider in &application {
        injector.create_and_resolve(provider, application.clone())?;
    }

    let mut modules = HashMap::new();
    let root = match resolve(&root, &injector, &mut modules) {
        Ok(root) => root,
        Err(err) => {
            injector.destroy();
            return Err(err);
        }
    };

    info!(
        modules = modules.len(),
        handlers = handlers.len(),
        root = %root.name,
        "Module assembly complete"
    );

    Ok(Assembly {
        injector,
        root,
        modules,
        metadata,
        handlers: Arc::new(handlers),
    })
}

fn record(
    module: &ModuleDef,
    metadata: &mut Metadata,
    handlers: &mut HandlerTable,
    names: &mut HashSet<String>,
) -> Result<(), ConfigurationError> {
    if !names.insert(module.name.clone()) {
        return Err(ConfigurationError::DuplicateModule(module.name.clone()));
    }
    for import in &module.imports {
        record(import, metadata, handlers, names)?;
    }
    for provider in &module.providers {
        verify_provider(provider.clone())?;
    }

    let mut controllers = HashSet::new();
    for controller in &module.controllers {
        if !controller.is_controller() {
            return Err(ConfigurationError::InvalidProvider {
                token: controller.token().to_string(),
                reason: "base declarations can only be extended".to_string(),
            });
        }
        if !controllers.insert(controller.name()) {
            return Err(ConfigurationError::DuplicateController {
                module: module.name.clone(),
                controller: controller.name().to_string(),
            });
        }
        controller.register(metadata, handlers)?;
    }
    Ok(())
}

fn resolve(
    module: &ModuleDef,
    application: &Injector,
    modules: &mut HashMap<String, Arc<AssembledModule>>,
) -> Result<Arc<AssembledModule>, Error> {
    let imported = module
        .imports
        .iter()
        .map(|import| resolve(import, application, modules))
        .collect::<Result<Vec<_>, _>>()?;

    let injector = Injector::with_parent(application, []);
    for import in &imported {
        for token in &import.exports {
            if injector.has(token) {
                continue;
            }
            injector.set(token.clone(), import.injector.get_value(token)?)?;
            debug!(module = %module.name, from = %import.name, token = %token, "Imported token");
        }
    }

    let providers = module
        .providers
        .iter()
        .cloned()
        .map(verify_provider)
        .collect::<Result<Vec<_>, _>>()?;
    for provider in &providers {
        injector.create_and_resolve(provider, providers.clone())?;
    }

    for token in &module.exports {
        if !injector.has(token) {
            return Err(ConfigurationError::UnknownExport {
                module: module.name.clone(),
                token: token.to_string(),
            }
            .into());
        }
    }

    let mut controllers = HashMap::new();
    for declaration in &module.controllers {
        let Some(entry) = declaration.entry() else {
            continue;
        };
        check_constructible(&injector, declaration, &entry)?;
        controllers.insert(entry.name.clone(), entry);
    }

    debug!(
        module = %module.name,
        injector = injector.id(),
        providers = providers.len(),
        controllers = controllers.len(),
        "Module resolved"
    );

    let assembled = Arc::new(AssembledModule {
        name: module.name.clone(),
        injector,
        controllers,
        exports: module.exports.clone(),
    });
    modules.insert(module.name.clone(), assembled.clone());
    Ok(assembled)
}

/// Every constructor and field dependency of the controller must be
/// request-scoped, provided by the controller itself or visible from the
/// module.
fn check_constructible(
    injector: &Injector,
    declaration: &Declaration,
    entry: &ControllerEntry,
) -> Result<(), Error> {
    let Some(class) = declaration.class() else {
        return Ok(());
    };
    let metadata = injector.metadata();
    let own: Vec<Token> = metadata
        .component_providers(&entry.token)
        .iter()
        .map(|provider| provider.token().clone())
        .collect();
    let request_scoped = request_scoped_tokens();

    let mut required = metadata.get_constructor_inject_keys(class)?;
    required.extend(
        metadata
            .field_injections(&entry.token)
            .into_iter()
            .map(|binding| binding.token),
    );

    for token in required {
        if request_scoped.contains(&token) || own.contains(&token) || injector.get_value(&token).is_ok() {
            continue;
        }
        return Err(Error::NoProvider {
            token: token.to_string(),
            injector: injector.id(),
            requested_by: Some(entry.token.to_string()),
        });
    }
    Ok(())
}
