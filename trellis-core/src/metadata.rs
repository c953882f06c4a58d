//! Metadata registry.
//!
//! Associates configuration with class tokens, partitioned by
//! [`Namespace`]. The registry is filled while a module is assembled and is
//! read-only afterwards; the injector and every request pipeline share it
//! through an `Arc`.

use crate::provider::{self, ClassRef, Provider, ProviderRecord};
use crate::{ConfigurationError, FilterDef, Token};
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    InjectParams,
    FunctionActions,
    FunctionParams,
    ComponentConfig,
}

/// Kind of a method-level binding on a controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Action,
    Before,
    After,
    BeforeEach,
    AfterEach,
    OnError,
    Produces,
}

impl ActionKind {
    /// Kinds bound to a single action name.
    pub fn is_keyed(&self) -> bool {
        !matches!(self, ActionKind::BeforeEach | ActionKind::AfterEach)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// `{type, key, value}`: method `key` is bound as `kind` for `value`.
///
/// `value` is the action name for Action/Before/After/OnError (`None` on an
/// OnError hook that covers every action) and `None` for
/// BeforeEach/AfterEach. Produces has no method: `key` is the action name
/// and `value` the content type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionBinding {
    pub kind: ActionKind,
    pub key: String,
    pub value: Option<String>,
}

/// Source of one handler argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamKind {
    /// Route parameter by name
    Param(String),
    /// Current chain value
    Chain,
    /// Any injector token
    Inject(Token),
    /// The error being handled
    ErrorMessage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamBinding {
    pub kind: ParamKind,
    pub key: String,
    pub param_index: usize,
}

/// Explicit injection: a constructor override when `param_index` is set, a
/// field injection (field `key`) otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InjectBinding {
    pub token: Token,
    pub key: String,
    pub param_index: Option<usize>,
    pub is_mutable: bool,
}

/// Component-level configuration of a class.
#[derive(Clone, Debug, Default)]
pub struct ComponentConfig {
    pub name: Option<String>,
    pub providers: Vec<Provider>,
    pub filters: Vec<FilterDef>,
    /// Declaring classes this one inherits bindings from, base first
    pub extends: Vec<Token>,
}

impl ComponentConfig {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.providers.is_empty()
            && self.filters.is_empty()
            && self.extends.is_empty()
    }
}

#[derive(Clone, Debug)]
pub enum MetadataValue {
    Inject(Vec<InjectBinding>),
    Actions(Vec<ActionBinding>),
    Params(Vec<ParamBinding>),
    Component(ComponentConfig),
}

impl MetadataValue {
    pub fn namespace(&self) -> Namespace {
        match self {
            MetadataValue::Inject(_) => Namespace::InjectParams,
            MetadataValue::Actions(_) => Namespace::FunctionActions,
            MetadataValue::Params(_) => Namespace::FunctionParams,
            MetadataValue::Component(_) => Namespace::ComponentConfig,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            MetadataValue::Inject(list) => list.is_empty(),
            MetadataValue::Actions(list) => list.is_empty(),
            MetadataValue::Params(list) => list.is_empty(),
            MetadataValue::Component(config) => config.is_empty(),
        }
    }
}

/// Result of [`Metadata::get_mapped_action`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappedAction {
    pub declared_by: Token,
    pub binding: ActionBinding,
}

#[derive(Clone, Debug, Default)]
pub struct Metadata {
    entries: HashMap<(Token, Namespace), MetadataValue>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `token`, replacing the namespace's previous value.
    ///
    /// Empty values are not stored and return `false`.
    pub fn define_metadata(&mut self, token: Token, value: MetadataValue) -> bool {
        if value.is_empty() {
            return false;
        }
        self.entries.insert((token, value.namespace()), value);
        true
    }

    pub fn has_metadata(&self, token: &Token, namespace: Namespace) -> bool {
        self.entries.contains_key(&(token.clone(), namespace))
    }

    pub fn get_metadata(&self, token: &Token, namespace: Namespace) -> Option<&MetadataValue> {
        self.entries.get(&(token.clone(), namespace))
    }

    pub fn inject_bindings(&self, token: &Token) -> &[InjectBinding] {
        match self.get_metadata(token, Namespace::InjectParams) {
            Some(MetadataValue::Inject(list)) => list,
            _ => &[],
        }
    }

    pub fn action_bindings(&self, token: &Token) -> &[ActionBinding] {
        match self.get_metadata(token, Namespace::FunctionActions) {
            Some(MetadataValue::Actions(list)) => list,
            _ => &[],
        }
    }

    pub fn param_bindings(&self, token: &Token) -> &[ParamBinding] {
        match self.get_metadata(token, Namespace::FunctionParams) {
            Some(MetadataValue::Params(list)) => list,
            _ => &[],
        }
    }

    /// Parameter bindings of one method, sorted by parameter index.
    pub fn method_params(&self, token: &Token, method: &str) -> Vec<ParamBinding> {
        let mut params: Vec<ParamBinding> = self
            .param_bindings(token)
            .iter()
            .filter(|binding| binding.key == method)
            .cloned()
            .collect();
        params.sort_by_key(|binding| binding.param_index);
        params
    }

    pub fn get_component_config(&self, token: &Token) -> Option<&ComponentConfig> {
        match self.get_metadata(token, Namespace::ComponentConfig) {
            Some(MetadataValue::Component(config)) => Some(config),
            _ => None,
        }
    }

    pub fn set_component_config(&mut self, token: Token, config: ComponentConfig) -> bool {
        self.define_metadata(token, MetadataValue::Component(config))
    }

    /// Providers a class declares for its own dependencies.
    pub fn component_providers(&self, token: &Token) -> Vec<Provider> {
        self.get_component_config(token)
            .map(|config| config.providers.clone())
            .unwrap_or_default()
    }

    pub fn verify_provider(value: impl Into<ProviderRecord>) -> Result<Provider, ConfigurationError> {
        provider::verify_provider(value)
    }

    pub fn merge_providers(a: &[Provider], b: &[Provider]) -> Vec<Provider> {
        provider::merge_providers(a, b)
    }

    /// Ordered constructor tokens: the class's implicit dependencies with
    /// explicit overrides spliced in at their parameter index.
    pub fn get_constructor_inject_keys(
        &self,
        class: &ClassRef,
    ) -> Result<Vec<Token>, ConfigurationError> {
        let mut keys = class.dependencies();
        for binding in self.inject_bindings(class.token()) {
            let Some(index) = binding.param_index else {
                continue;
            };
            if index < keys.len() {
                keys[index] = binding.token.clone();
            } else if index == keys.len() {
                keys.push(binding.token.clone());
            } else {
                return Err(ConfigurationError::InvalidParamBinding {
                    class: class.token().to_string(),
                    method: "constructor".to_string(),
                    reason: format!(
                        "injection at index {} leaves earlier parameters undeclared",
                        index
                    ),
                });
            }
        }
        Ok(keys)
    }

    /// Field injections declared for a class.
    pub fn field_injections(&self, token: &Token) -> Vec<InjectBinding> {
        self.inject_bindings(token)
            .iter()
            .filter(|binding| binding.param_index.is_none())
            .cloned()
            .collect()
    }

    /// The controller itself preceded by the classes it extends, base first.
    pub fn inheritance_chain(&self, controller: &Token) -> Vec<Token> {
        let mut chain = self
            .get_component_config(controller)
            .map(|config| config.extends.clone())
            .unwrap_or_default();
        chain.push(controller.clone());
        chain
    }

    /// Find the binding of `kind` for `action` on `controller`.
    ///
    /// Candidates are collected across the inheritance chain, base first, so
    /// the last candidate is the most derived one: the controller's own
    /// binding when it has one, otherwise the closest inherited binding.
    /// OnError bindings for the exact action win over catch-all ones.
    pub fn get_mapped_action(
        &self,
        controller: &Token,
        action: &str,
        kind: ActionKind,
    ) -> Option<MappedAction> {
        let mut candidates = Vec::new();
        for class in self.inheritance_chain(controller) {
            for binding in self.action_bindings(&class) {
                if binding.kind != kind {
                    continue;
                }
                let matches = match kind {
                    ActionKind::BeforeEach | ActionKind::AfterEach => true,
                    ActionKind::OnError => {
                        binding.value.is_none() || binding.value.as_deref() == Some(action)
                    }
                    ActionKind::Produces => binding.key == action,
                    _ => binding.value.as_deref() == Some(action),
                };
                if matches {
                    candidates.push(MappedAction {
                        declared_by: class.clone(),
                        binding: binding.clone(),
                    });
                }
            }
        }

        if kind == ActionKind::OnError {
            if let Some(exact) = candidates
                .iter()
                .rev()
                .find(|mapped| mapped.binding.value.as_deref() == Some(action))
            {
                return Some(exact.clone());
            }
        }

        candidates.pop()
    }
}
