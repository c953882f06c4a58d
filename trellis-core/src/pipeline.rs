//! Per-request controller pipeline.
//!
//! Stages run strictly in this order, each only when a binding exists and
//! the chain has not been stopped:
//!
//! ```text
//! filters.before* -> BeforeEach -> Before -> Action -> After -> AfterEach -> filters.after*
//! ```
//!
//! Each stage receives the current chain value (when it binds one) and its
//! return value becomes the chain seen by the next stage.

use crate::controller::{ControllerEntry, HandlerTable};
use crate::filter::{sorted_filters, FilterDef};
use crate::logging::{debug, trace, warn};
use crate::metadata::{ActionKind, MappedAction, Metadata, ParamKind};
use crate::provider::{Argument, Arguments, Instance, Provider};
use crate::{
    Chain, Error, Injector, PipelineOptions, Request, RequestContext, ResolvedRoute, ResponseState,
    Token,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Reserved slot holding the chain value in every request scope.
pub const CHAIN_TOKEN: Token = Token::from_static("trellis:chain");

const CONTROLLER_STAGES: [ActionKind; 5] = [
    ActionKind::BeforeEach,
    ActionKind::Before,
    ActionKind::Action,
    ActionKind::After,
    ActionKind::AfterEach,
];

struct ScopeInner {
    injector: Injector,
    released: AtomicBool,
}

/// Handle on a request's injector scope.
///
/// The transport signals the end of the response through [`finished`] or
/// [`closed`]; whichever comes first destroys the scope, later calls are
/// no-ops.
///
/// [`finished`]: RequestScope::finished
/// [`closed`]: RequestScope::closed
#[derive(Clone)]
pub struct RequestScope {
    inner: Arc<ScopeInner>,
}

impl RequestScope {
    fn new(injector: Injector) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                injector,
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn injector(&self) -> &Injector {
        &self.inner.injector
    }

    /// The response was fully written.
    pub fn finished(&self) -> bool {
        self.release("finished")
    }

    /// The connection went away before the response was finished.
    pub fn closed(&self) -> bool {
        self.release("closed")
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    fn release(&self, reason: &'static str) -> bool {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        debug!(injector = self.inner.injector.id(), reason, "Releasing request scope");
        self.inner.injector.destroy();
        true
    }
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("injector", &self.inner.injector.id())
            .field("released", &self.is_released())
            .finish()
    }
}

/// Result of a pipeline run, handed to the renderer.
#[derive(Debug)]
pub struct RequestOutcome {
    pub request_id: Uuid,
    pub route: String,
    pub chain: Chain,
    pub response: ResponseState,
    pub scope: RequestScope,
}

#[derive(Clone, Copy, Debug)]
enum FilterPass {
    Before,
    After,
}

/// Runs controller actions for resolved routes.
#[derive(Clone)]
pub struct Pipeline {
    metadata: Arc<Metadata>,
    handlers: Arc<HandlerTable>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(metadata: Arc<Metadata>, handlers: Arc<HandlerTable>, options: PipelineOptions) -> Self {
        Self {
            metadata,
            handlers,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run `action` of `controller` in a new request scope under `parent`.
    ///
    /// On success the scope stays alive until the outcome's
    /// [`RequestScope`] is released. On failure it is destroyed before the
    /// error is returned.
    pub async fn run(
        &self,
        parent: &Injector,
        controller: &ControllerEntry,
        action: &str,
        request: Arc<Request>,
    ) -> Result<RequestOutcome, Error> {
        let scope = RequestScope::new(Injector::with_parent(parent, [CHAIN_TOKEN]));
        trace!(
            injector = scope.injector().id(),
            controller = %controller.name,
            action,
            "Request scope created"
        );

        match self.execute(scope.injector(), controller, action, &request).await {
            Ok(chain) => Ok(RequestOutcome {
                request_id: request.id(),
                route: request.route().to_string(),
                chain,
                response: request.response_state(),
                scope,
            }),
            Err(err) => {
                scope.release("failed");
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        scope: &Injector,
        controller: &ControllerEntry,
        action: &str,
        request: &Arc<Request>,
    ) -> Result<Chain, Error> {
        scope.set(Token::of::<Request>(), request.clone() as Instance)?;
        scope.set_value(Token::of::<ResolvedRoute>(), request.resolved_route().clone())?;
        scope.set_value(Token::of::<RequestContext>(), request.context().clone())?;
        scope.set_value(CHAIN_TOKEN, Chain::Empty)?;

        let action_binding = self
            .metadata
            .get_mapped_action(&controller.token, action, ActionKind::Action)
            .ok_or_else(|| Error::ActionNotFound {
                action: action.to_string(),
                controller: controller.name.clone(),
            })?;

        let filters: Vec<FilterDef> = self
            .metadata
            .get_component_config(&controller.token)
            .map(|config| config.filters.clone())
            .unwrap_or_default();
        let filters = sorted_filters(&filters, action);

        for filter in &filters {
            if request.is_chain_stopped() {
                break;
            }
            self.run_filter(scope, filter, FilterPass::Before).await?;
        }

        if !request.is_chain_stopped() {
            let controller_scope =
                Injector::create_and_resolve_child(scope, &controller.provider, Vec::new())?;
            let instance = controller_scope.get_value(&controller.token)?;
            self.run_stages(scope, &controller_scope, controller, &instance, action, action_binding, request)
                .await?;
        }

        for filter in &filters {
            if request.is_chain_stopped() && !self.options.run_filters_after_stop {
                trace!(filter = %filter.token(), "Chain stopped, skipping closing filter");
                break;
            }
            self.run_filter(scope, filter, FilterPass::After).await?;
        }

        current_chain(scope)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_stages(
        &self,
        scope: &Injector,
        controller_scope: &Injector,
        controller: &ControllerEntry,
        instance: &Instance,
        action: &str,
        action_binding: MappedAction,
        request: &Arc<Request>,
    ) -> Result<(), Error> {
        let mut action_binding = Some(action_binding);
        for kind in CONTROLLER_STAGES {
            if request.is_chain_stopped() {
                trace!(stage = %kind, "Chain stopped");
                break;
            }

            let mapped = match kind {
                ActionKind::Action => action_binding.take(),
                _ => self.metadata.get_mapped_action(&controller.token, action, kind),
            };
            let Some(mapped) = mapped else {
                continue;
            };

            if kind == ActionKind::Action {
                if let Some(produces) =
                    self.metadata
                        .get_mapped_action(&controller.token, action, ActionKind::Produces)
                {
                    if let Some(content_type) = produces.binding.value {
                        request.set_content_type(content_type);
                    }
                }
            }

            let result = self
                .invoke(scope, controller_scope, controller, instance, &mapped, request, None)
                .await;
            match result {
                Ok(chain) => scope.set_value(CHAIN_TOKEN, chain)?,
                Err(err) => {
                    return self
                        .recover(scope, controller_scope, controller, instance, action, request, err)
                        .await;
                }
            }
        }
        Ok(())
    }

    /// Hand a stage failure to the controller's OnError hook, if it has one.
    #[allow(clippy::too_many_arguments)]
    async fn recover(
        &self,
        scope: &Injector,
        controller_scope: &Injector,
        controller: &ControllerEntry,
        instance: &Instance,
        action: &str,
        request: &Arc<Request>,
        err: Error,
    ) -> Result<(), Error> {
        let Some(hook) = self
            .metadata
            .get_mapped_action(&controller.token, action, ActionKind::OnError)
        else {
            return Err(err);
        };

        warn!(
            request_id = %request.id(),
            controller = %controller.name,
            action,
            error = %err,
            "Stage failed, running error hook"
        );
        request.set_status_code(err.status_code());
        let chain = self
            .invoke(scope, controller_scope, controller, instance, &hook, request, Some(Arc::new(err)))
            .await?;
        scope.set_value(CHAIN_TOKEN, chain)
    }

    #[allow(clippy::too_many_arguments)]
    async fn invoke(
        &self,
        scope: &Injector,
        controller_scope: &Injector,
        controller: &ControllerEntry,
        instance: &Instance,
        mapped: &MappedAction,
        request: &Arc<Request>,
        error: Option<Arc<Error>>,
    ) -> Result<Chain, Error> {
        let key = &mapped.binding.key;
        let handler = self.handlers.get(&mapped.declared_by, key).ok_or_else(|| {
            Error::internal(format!(
                "no handler registered for {}::{}",
                mapped.declared_by, key
            ))
        })?;

        let chain = current_chain(scope)?;
        let mut args = Vec::new();
        for param in self.metadata.method_params(&mapped.declared_by, key) {
            args.push(match param.kind {
                ParamKind::Param(name) => Argument::Param(request.param(&name).map(str::to_string)),
                ParamKind::Chain => Argument::Chain(chain.clone()),
                ParamKind::Inject(token) => {
                    let value = controller_scope.get_value_for(&token, Some(&controller.token))?;
                    Argument::Instance(token, value)
                }
                ParamKind::ErrorMessage => Argument::Error(error.clone()),
            });
        }

        let started = Instant::now();
        let result = handler(instance.clone(), Arguments::new(args)).await;
        if self.options.stage_telemetry {
            debug!(
                stage = %mapped.binding.kind,
                controller = %controller.name,
                method = %key,
                elapsed_us = started.elapsed().as_micros() as u64,
                ok = result.is_ok(),
                "Stage completed"
            );
        }
        result
    }

    /// Run one filter pass in its own scope, destroyed right after.
    async fn run_filter(&self, scope: &Injector, filter: &FilterDef, pass: FilterPass) -> Result<(), Error> {
        let started = Instant::now();
        let filter_scope = Injector::create_and_resolve_child(
            scope,
            &Provider::from(filter.class().clone()),
            Vec::new(),
        )?;

        let result = async {
            let instance = filter.instance(filter_scope.get_value(filter.token())?)?;
            let chain = current_chain(scope)?;
            match pass {
                FilterPass::Before => instance.before(chain).await,
                FilterPass::After => instance.after(chain).await,
            }
        }
        .await;
        filter_scope.destroy();

        if self.options.stage_telemetry {
            debug!(
                stage = ?pass,
                filter = %filter.token(),
                priority = filter.priority(),
                elapsed_us = started.elapsed().as_micros() as u64,
                ok = result.is_ok(),
                "Filter completed"
            );
        }
        scope.set_value(CHAIN_TOKEN, result?)
    }
}

fn current_chain(scope: &Injector) -> Result<Chain, Error> {
    scope
        .get_token::<Chain>(&CHAIN_TOKEN)
        .map(|chain| chain.as_ref().clone())
}
