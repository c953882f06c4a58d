//! Provider tokens.
//!
//! A token identifies a value in an [`Injector`](crate::Injector). Type
//! tokens are derived from a Rust type; string tokens name values that have
//! no type of their own (configuration values, request-scoped slots).

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Clone)]
pub enum Token {
    Type { id: TypeId, name: &'static str },
    Named(Cow<'static, str>),
}

impl Token {
    /// Token for a concrete type.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Token::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// String token.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Token::Named(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Token::Named(Cow::Borrowed(name))
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Token::Named(_))
    }

    /// Human-readable name: the type path or the string key.
    pub fn name(&self) -> &str {
        match self {
            Token::Type { name, .. } => name,
            Token::Named(name) => name,
        }
    }

    /// Last path segment of a type token, the key itself for string tokens.
    pub fn short_name(&self) -> &str {
        match self {
            Token::Type { name, .. } => {
                let base = name.split('<').next().unwrap_or(name);
                base.rsplit("::").next().unwrap_or(base)
            }
            Token::Named(name) => name,
        }
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Token::Type { id: a, .. }, Token::Type { id: b, .. }) => a == b,
            (Token::Named(a), Token::Named(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Token::Type { id, .. } => {
                0u8.hash(state);
                id.hash(state);
            }
            Token::Named(name) => {
                1u8.hash(state);
                name.hash(state);
            }
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Type { name, .. } => write!(f, "Type({})", name),
            Token::Named(name) => write!(f, "Named({:?})", name),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&'static str> for Token {
    fn from(name: &'static str) -> Self {
        Token::from_static(name)
    }
}

impl From<String> for Token {
    fn from(name: String) -> Self {
        Token::Named(Cow::Owned(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Logger;

    #[test]
    fn test_type_tokens_compare_by_type() {
        assert_eq!(Token::of::<Logger>(), Token::of::<Logger>());
        assert_ne!(Token::of::<Logger>(), Token::of::<String>());
        assert_eq!(Token::of::<Logger>().short_name(), "Logger");
    }

    #[test]
    fn test_named_tokens() {
        let a = Token::named("db.url");
        let b: Token = "db.url".into();
        assert_eq!(a, b);
        assert!(a.is_named());
        assert_ne!(a, Token::named(String::from("db.host")));
    }

    #[test]
    fn test_hash_distinguishes_kinds() {
        let mut set = HashSet::new();
        set.insert(Token::of::<Logger>());
        set.insert(Token::named("Logger"));
        set.insert(Token::of::<Logger>());
        assert_eq!(set.len(), 2);
    }
}
