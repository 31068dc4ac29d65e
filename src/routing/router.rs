//! Path rewriting from public URLs to canonical `controller/action/args` paths.
//!
//! A route pattern is literal text with `{name}` placeholders, e.g.
//! `/edit-product/{id}`; its target may reference the captured values as
//! `:name`, e.g. `/product/handleUpdateProduct/:id`. Routes are tried in
//! declaration order and the first full-path, case-insensitive match wins.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_yaml::Mapping;
use thiserror::Error;
use tracing::{debug, info};

const BUNDLED_ROUTES: &str = include_str!("../../config/routes.yaml");

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z0-9_]+)\}").expect("valid regex"));
static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r":([A-Za-z0-9_]+)").expect("valid regex"));

/// Matches one placeholder segment value
const SEGMENT: &str = "([a-z0-9-]+)";

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("failed to read route file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("route file is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("route file must be a mapping of pattern to target")]
    NotAMapping,

    #[error("route entry {0} must map a string to a string")]
    InvalidEntry(String),

    #[error("route pattern '{pattern}' does not compile: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Route {
    pattern: String,
    target: String,
    matcher: Regex,
    names: Vec<String>,
}

impl Route {
    pub fn new(pattern: &str, target: &str) -> Result<Self, RouteError> {
        let mut source = String::from("(?i)^");
        let mut names = Vec::new();
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(pattern) {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            source.push_str(&regex::escape(&pattern[last..whole.start]));
            source.push_str(SEGMENT);
            names.push(caps[1].to_string());
            last = whole.end;
        }
        source.push_str(&regex::escape(&pattern[last..]));
        source.push('$');

        let matcher = Regex::new(&source).map_err(|e| RouteError::Pattern {
            pattern: pattern.to_string(),
            source: e,
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            target: target.to_string(),
            matcher,
            names,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Placeholder names in declaration order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The rewritten target when `url` matches this route
    pub fn rewrite(&self, url: &str) -> Option<String> {
        let caps = self.matcher.captures(url)?;
        let args: HashMap<&str, &str> = self
            .names
            .iter()
            .zip(caps.iter().skip(1))
            .filter_map(|(name, value)| value.map(|v| (name.as_str(), v.as_str())))
            .collect();

        let rewritten = TOKEN.replace_all(&self.target, |token: &Captures| {
            match args.get(&token[1]) {
                Some(value) => value.to_string(),
                None => token[0].to_string(),
            }
        });
        Some(rewritten.into_owned())
    }
}

/// Ordered routes, loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pattern: &str, target: &str) -> Result<&mut Self, RouteError> {
        self.routes.push(Route::new(pattern, target)?);
        Ok(self)
    }

    /// Parse a YAML mapping of pattern to target, keeping file order
    pub fn from_yaml(source: &str) -> Result<Self, RouteError> {
        let mapping: Mapping = match serde_yaml::from_str(source)? {
            serde_yaml::Value::Mapping(mapping) => mapping,
            serde_yaml::Value::Null => Mapping::new(),
            _ => return Err(RouteError::NotAMapping),
        };

        let mut table = Self::new();
        for (pattern, target) in &mapping {
            match (pattern.as_str(), target.as_str()) {
                (Some(pattern), Some(target)) => {
                    table.add(pattern, target)?;
                }
                _ => return Err(RouteError::InvalidEntry(format!("{:?}", pattern))),
            }
        }
        Ok(table)
    }

    /// The routes shipped in `config/routes.yaml`
    pub fn bundled() -> Result<Self, RouteError> {
        Self::from_yaml(BUNDLED_ROUTES)
    }

    /// Routes from `path` when given, otherwise the bundled set
    pub fn load(path: Option<&str>) -> Result<Self, RouteError> {
        let table = match path {
            Some(path) => {
                let source = std::fs::read_to_string(Path::new(path)).map_err(|e| RouteError::Io {
                    path: path.to_string(),
                    source: e,
                })?;
                Self::from_yaml(&source)?
            }
            None => Self::bundled()?,
        };
        info!(routes = table.len(), file = path.unwrap_or("<bundled>"), "Loaded routes");
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }
}

#[derive(Debug, Clone)]
pub struct Router {
    table: RouteTable,
}

impl Router {
    pub fn new(table: RouteTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Rewrite `url` through the first matching route; unmatched paths are
    /// returned unchanged.
    pub fn check_routes(&self, url: &str) -> String {
        for route in self.table.iter() {
            if let Some(rewritten) = route.rewrite(url) {
                debug!(url, route = route.pattern(), target = %rewritten, "route matched");
                return rewritten;
            }
        }
        url.to_string()
    }
}
