// Filters wrapping the controller stages of a request

use crate::provider::{ClassRef, Instance, ProviderRecord};
use crate::{Arguments, Chain, Error, HttpStatus, Injectable, Request, Token};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Code run around a controller's stages.
///
/// `before` runs ahead of the controller, `after` once it is done; both
/// receive the current chain value and return the next one. A filter is
/// constructed in its own short-lived scope for each call.
#[async_trait]
pub trait Filter: Send + Sync + 'static {
    async fn before(&self, chain: Chain) -> Result<Chain, Error> {
        Ok(chain)
    }

    async fn after(&self, chain: Chain) -> Result<Chain, Error> {
        Ok(chain)
    }
}

type FilterCast = fn(Instance) -> Option<Arc<dyn Filter>>;

fn cast<F: Filter>(instance: Instance) -> Option<Arc<dyn Filter>> {
    instance.downcast::<F>().ok().map(|filter| filter as Arc<dyn Filter>)
}

/// Registration of a filter on a controller.
#[derive(Clone)]
pub struct FilterDef {
    class: ClassRef,
    priority: i32,
    actions: Option<Vec<String>>,
    providers: Vec<ProviderRecord>,
    cast: FilterCast,
}

impl FilterDef {
    /// Filter `F` with `priority`; higher priorities run first.
    pub fn new<F: Filter + Injectable>(priority: i32) -> Self {
        Self {
            class: ClassRef::of::<F>(),
            priority,
            actions: None,
            providers: Vec::new(),
            cast: cast::<F>,
        }
    }

    /// Restrict the filter to the named actions.
    pub fn only<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = Some(actions.into_iter().map(Into::into).collect());
        self
    }

    /// Provider the filter's scope resolves before constructing it.
    pub fn provider(mut self, provider: impl Into<ProviderRecord>) -> Self {
        self.providers.push(provider.into());
        self
    }

    pub fn token(&self) -> &Token {
        self.class.token()
    }

    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn providers(&self) -> &[ProviderRecord] {
        &self.providers
    }

    pub fn applies_to(&self, action: &str) -> bool {
        match &self.actions {
            Some(actions) => actions.iter().any(|a| a == action),
            None => true,
        }
    }

    pub(crate) fn instance(&self, instance: Instance) -> Result<Arc<dyn Filter>, Error> {
        (self.cast)(instance).ok_or_else(|| Error::Downcast {
            token: self.class.token().to_string(),
            expected: "Filter",
        })
    }
}

impl fmt::Debug for FilterDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterDef")
            .field("filter", self.class.token())
            .field("priority", &self.priority)
            .field("actions", &self.actions)
            .finish()
    }
}

/// Filters applying to `action`, highest priority first. Equal priorities
/// keep their registration order.
pub fn sorted_filters<'a>(filters: &'a [FilterDef], action: &str) -> Vec<&'a FilterDef> {
    let mut applicable: Vec<&FilterDef> = filters.iter().filter(|f| f.applies_to(action)).collect();
    applicable.sort_by(|a, b| b.priority.cmp(&a.priority));
    applicable
}

/// Rejects requests without a `Bearer` authorization header.
pub struct BearerAuthFilter {
    request: Arc<Request>,
}

impl Injectable for BearerAuthFilter {
    fn dependencies() -> Vec<Token> {
        vec![Token::of::<Request>()]
    }

    fn construct(args: &Arguments) -> Result<Self, Error> {
        Ok(Self {
            request: args.get(0)?,
        })
    }
}

#[async_trait]
impl Filter for BearerAuthFilter {
    async fn before(&self, chain: Chain) -> Result<Chain, Error> {
        let unauthorized = HttpStatus::Unauthorized.code();
        match self.request.header("authorization") {
            Some(header) if header.starts_with("Bearer ") && header.len() > 7 => Ok(chain),
            Some(_) => Err(Error::http(unauthorized, "Invalid authorization header")),
            None => Err(Error::http(unauthorized, "Missing authorization header")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Injectable for Noop {
        fn construct(_: &Arguments) -> Result<Self, Error> {
            Ok(Noop)
        }
    }

    impl Filter for Noop {}

    struct Other;

    impl Injectable for Other {
        fn construct(_: &Arguments) -> Result<Self, Error> {
            Ok(Other)
        }
    }

    impl Filter for Other {}

    #[test]
    fn test_sorted_by_priority_then_registration() {
        let filters = vec![
            FilterDef::new::<Noop>(10),
            FilterDef::new::<Other>(100),
            FilterDef::new::<Noop>(10).only(["view"]),
            FilterDef::new::<Other>(10),
        ];
        let index = sorted_filters(&filters, "index");
        let priorities: Vec<_> = index.iter().map(|f| f.priority()).collect();
        assert_eq!(priorities, vec![100, 10, 10]);
        assert_eq!(index[1].token(), &Token::of::<Noop>());
        assert_eq!(index[2].token(), &Token::of::<Other>());

        assert_eq!(sorted_filters(&filters, "view").len(), 4);
    }

    #[tokio::test]
    async fn test_default_filter_passes_chain_through() {
        let def = FilterDef::new::<Noop>(1);
        let filter = def.instance(Arc::new(Noop)).unwrap();
        assert_eq!(filter.before(Chain::from("a")).await.unwrap(), Chain::from("a"));
        assert_eq!(filter.after(Chain::Empty).await.unwrap(), Chain::Empty);
        assert!(def.instance(Arc::new(Other)).is_err());
    }
}
