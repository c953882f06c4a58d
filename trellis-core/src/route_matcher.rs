//! URL pattern compilation and matching.
//!
//! A pattern such as `/home/<id:(\d+)>/<slug>` is split on `/` into a chain
//! of segment nodes. Each segment is literal text with zero or more
//! placeholders: `<name:regex>` or a bare `<name>`, which matches any
//! non-empty segment text.

use crate::ConfigurationError;
use regex::Regex;
use std::collections::HashMap;

/// One raw URL segment and the segment to its right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlNode {
    pub path: String,
    pub child: Option<Box<UrlNode>>,
}

impl UrlNode {
    pub fn iter(&self) -> impl Iterator<Item = &UrlNode> {
        std::iter::successors(Some(self), |node| node.child.as_deref())
    }
}

/// Split `url` on `/` into a chain rooted at the leftmost segment.
///
/// A single leading `/` is ignored, so `/` and the empty string both yield
/// one empty segment.
pub fn to_url_tree(url: &str) -> UrlNode {
    let trimmed = url.strip_prefix('/').unwrap_or(url);
    let mut child: Option<Box<UrlNode>> = None;
    for segment in trimmed.rsplit('/') {
        child = Some(Box::new(UrlNode {
            path: segment.to_string(),
            child,
        }));
    }
    // rsplit always yields at least one item
    child.map(|node| *node).unwrap_or(UrlNode {
        path: String::new(),
        child: None,
    })
}

/// Characters that end a path segment or the path itself.
const PATH_RESERVED: [char; 3] = ['/', '?', '#'];

fn split_path(path: &str) -> Vec<&str> {
    path.strip_prefix('/').unwrap_or(path).split('/').collect()
}

#[derive(Debug, Clone)]
pub struct Placeholder {
    pub name: String,
    pub regex: String,
    validator: Regex,
}

impl Placeholder {
    pub fn accepts(&self, value: &str) -> bool {
        self.validator.is_match(value)
    }
}

#[derive(Debug, Clone)]
enum Part {
    Literal(String),
    Param(usize),
}

/// Compiled form of one segment.
#[derive(Debug, Clone)]
pub struct SegmentPattern {
    source: String,
    matcher: Regex,
    parts: Vec<Part>,
    placeholders: Vec<Placeholder>,
}

impl SegmentPattern {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    pub fn is_literal(&self) -> bool {
        self.placeholders.is_empty()
    }

    pub fn is_match(&self, segment: &str) -> bool {
        self.matcher.is_match(segment)
    }

    /// Named captures of `segment`, or `None` when it does not match.
    pub fn captures(&self, segment: &str) -> Option<Vec<(String, String)>> {
        let captures = self.matcher.captures(segment)?;
        Some(
            self.placeholders
                .iter()
                .filter_map(|placeholder| {
                    captures
                        .name(&placeholder.name)
                        .map(|value| (placeholder.name.clone(), value.as_str().to_string()))
                })
                .collect(),
        )
    }

    /// Segment text with placeholders substituted from `params`.
    ///
    /// Values holding `/`, `?` or `#` would not survive a parse of the
    /// rendered path, so they are refused even when the regex accepts them.
    pub fn render(&self, params: &HashMap<String, String>) -> Option<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Param(index) => {
                    let placeholder = &self.placeholders[*index];
                    let value = params.get(&placeholder.name)?;
                    if value.contains(PATH_RESERVED) || !placeholder.accepts(value) {
                        return None;
                    }
                    out.push_str(value);
                }
            }
        }
        Some(out)
    }
}

fn invalid(pattern: &str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidRoutePattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn compile(pattern: &str, source: &str) -> Result<Regex, ConfigurationError> {
    Regex::new(source).map_err(|err| invalid(pattern, err.to_string()))
}

/// Compile one segment.
pub fn to_pattern(segment: &str) -> Result<SegmentPattern, ConfigurationError> {
    let mut parts = Vec::new();
    let mut placeholders: Vec<Placeholder> = Vec::new();
    let mut literal = String::new();
    let mut chars = segment.chars();

    while let Some(c) = chars.next() {
        if c != '<' {
            literal.push(c);
            continue;
        }

        let mut name = String::new();
        let mut regex = None;
        let mut closed = false;
        while let Some(c) = chars.next() {
            match c {
                '>' => {
                    closed = true;
                    break;
                }
                ':' => {
                    // parentheses and classes may contain `>`
                    let mut body = String::new();
                    let mut depth = 0i32;
                    let mut in_class = false;
                    let mut escaped = false;
                    for c in chars.by_ref() {
                        if escaped {
                            escaped = false;
                        } else if c == '\\' {
                            escaped = true;
                        } else if in_class {
                            in_class = c != ']';
                        } else if c == '[' {
                            in_class = true;
                        } else if c == '(' {
                            depth += 1;
                        } else if c == ')' {
                            depth -= 1;
                        } else if c == '>' && depth <= 0 {
                            closed = true;
                            break;
                        }
                        body.push(c);
                    }
                    regex = Some(body);
                    break;
                }
                c => name.push(c),
            }
        }

        if !closed {
            return Err(invalid(segment, "unterminated placeholder"));
        }
        if !is_valid_name(&name) {
            return Err(invalid(segment, format!("invalid parameter name `{}`", name)));
        }
        if placeholders.iter().any(|p| p.name == name) {
            return Err(invalid(segment, format!("duplicate parameter `{}`", name)));
        }
        let regex = match regex {
            Some(body) if body.is_empty() => {
                return Err(invalid(segment, format!("empty regex for `{}`", name)));
            }
            Some(body) => body,
            None => "[^/]+".to_string(),
        };

        if !literal.is_empty() {
            parts.push(Part::Literal(std::mem::take(&mut literal)));
        }
        let validator = compile(segment, &format!("^(?:{})$", regex))?;
        parts.push(Part::Param(placeholders.len()));
        placeholders.push(Placeholder {
            name,
            regex,
            validator,
        });
    }
    if !literal.is_empty() {
        parts.push(Part::Literal(literal));
    }

    let mut source = String::from("^");
    for part in &parts {
        match part {
            Part::Literal(text) => source.push_str(&regex::escape(text)),
            Part::Param(index) => {
                let placeholder = &placeholders[*index];
                source.push_str(&format!("(?P<{}>{})", placeholder.name, placeholder.regex));
            }
        }
    }
    source.push('$');

    Ok(SegmentPattern {
        source: segment.to_string(),
        matcher: compile(segment, &source)?,
        parts,
        placeholders,
    })
}

#[derive(Debug)]
struct PatternNode {
    pattern: SegmentPattern,
    child: Option<Box<PatternNode>>,
}

/// A compiled route pattern.
#[derive(Debug)]
pub struct RouteParser {
    pattern: String,
    root: Option<Box<PatternNode>>,
    depth: usize,
    param_names: Vec<String>,
}

impl RouteParser {
    pub fn parse(pattern: &str) -> Result<Self, ConfigurationError> {
        let tree = to_url_tree(pattern);
        let compiled = tree
            .iter()
            .map(|node| to_pattern(&node.path))
            .collect::<Result<Vec<_>, _>>()?;

        let mut param_names: Vec<String> = Vec::new();
        for name in compiled
            .iter()
            .flat_map(|segment| segment.placeholders().iter().map(|p| p.name.clone()))
        {
            if param_names.contains(&name) {
                return Err(invalid(pattern, format!("duplicate parameter `{}`", name)));
            }
            param_names.push(name);
        }

        let depth = compiled.len();
        let mut root: Option<Box<PatternNode>> = None;
        for pattern in compiled.into_iter().rev() {
            root = Some(Box::new(PatternNode {
                pattern,
                child: root,
            }));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            root,
            depth,
            param_names,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    fn nodes(&self) -> impl Iterator<Item = &PatternNode> {
        std::iter::successors(self.root.as_deref(), |node| node.child.as_deref())
    }

    pub fn is_valid(&self, path: &str) -> bool {
        let segments = split_path(path);
        self.root.is_some()
            && segments.len() == self.depth
            && self
                .nodes()
                .zip(segments)
                .all(|(node, segment)| node.pattern.is_match(segment))
    }

    /// Parameters captured from `path`, or `None` when it does not match.
    pub fn get_params(&self, path: &str) -> Option<HashMap<String, String>> {
        let segments = split_path(path);
        if self.root.is_none() || segments.len() != self.depth {
            return None;
        }
        let mut params = HashMap::new();
        for (node, segment) in self.nodes().zip(segments) {
            params.extend(node.pattern.captures(segment)?);
        }
        Some(params)
    }

    /// Path for `params`, without the leading `/`.
    ///
    /// `params` must name exactly the route's placeholders and every value
    /// must satisfy its placeholder's regex.
    pub fn create_url(&self, params: &HashMap<String, String>) -> Option<String> {
        if self.root.is_none()
            || params.len() != self.param_names.len()
            || !self.param_names.iter().all(|name| params.contains_key(name))
        {
            return None;
        }
        let segments = self
            .nodes()
            .map(|node| node.pattern.render(params))
            .collect::<Option<Vec<_>>>()?;
        Some(segments.join("/"))
    }

    /// Break the node chain and drop the compiled patterns.
    pub fn destroy(&mut self) {
        let mut next = self.root.take();
        while let Some(mut node) = next {
            next = node.child.take();
        }
        self.depth = 0;
        self.param_names.clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.root.is_none()
    }
}
