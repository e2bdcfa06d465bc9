use crate::{MethodMask, ParamKind, RouteParams, trie::Trie};
use crow_http::Method;
use std::fmt::{self, Debug, Formatter};
use thiserror::Error;

/// Route registration and validation failures. These indicate programmer
/// error in application setup rather than runtime conditions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// the pattern contained an unclosed or unrecognized placeholder
    #[error("invalid route pattern {0:?}")]
    InvalidPattern(String),

    /// two rules on the same pattern accept an overlapping method set
    #[error("more than one rule for {0:?} accepts the same method")]
    AmbiguousMethods(String),
}

/// One registered route: pattern, method set, placeholder tag, optional
/// name, and the handler payload.
pub struct Rule<H> {
    pattern: String,
    methods: MethodMask,
    kinds: Vec<ParamKind>,
    name: Option<String>,
    node: u32,
    /// the payload invoked when this rule matches
    pub handler: H,
}

impl<H> Rule<H> {
    /// the url template this rule was registered with
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// the methods this rule accepts
    pub fn methods(&self) -> MethodMask {
        self.methods
    }

    /// the placeholder tag derived from the pattern
    pub fn kinds(&self) -> &[ParamKind] {
        &self.kinds
    }

    /// the rule's name: explicit if set, otherwise the pattern
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.pattern)
    }

    /// name this rule
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }
}

impl<H> Debug for Rule<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.pattern, self.name())
    }
}

/// The outcome of routing one request path.
#[derive(Debug)]
pub enum Match<'a, H> {
    /// a rule accepted the path and method
    Found {
        /// the winning rule
        rule: &'a Rule<H>,
        /// values captured from the path, in placeholder order
        params: RouteParams,
    },
    /// the path exists but no rule on it accepts this method
    MethodNotAllowed {
        /// the methods the path does accept
        allow: MethodMask,
    },
    /// nothing matched
    NotFound,
}

struct BlueprintEntry<H> {
    prefix: String,
    catchall: Option<H>,
}

/// The request router: a rule table plus the trie that indexes it.
///
/// `H` is the handler payload; the router itself never invokes it. Read-only
/// after [`validate`][Router::validate], which the application calls before
/// serving.
pub struct Router<H> {
    rules: Vec<Rule<H>>,
    trie: Trie,
    blueprints: Vec<BlueprintEntry<H>>,
    catchall: Option<H>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Router<H> {
    /// construct an empty router
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            trie: Trie::new(),
            blueprints: Vec::new(),
            catchall: None,
        }
    }

    /// Register a rule. The returned mutable reference allows naming the
    /// rule; the placeholder tag is available as [`Rule::kinds`] for the
    /// caller's handler-signature check.
    pub fn add(
        &mut self,
        pattern: &str,
        methods: MethodMask,
        handler: H,
    ) -> Result<&mut Rule<H>, RouterError> {
        let rule_index = u16::try_from(self.rules.len())
            .map_err(|_| RouterError::InvalidPattern(pattern.to_owned()))?;
        let (kinds, node) = self.trie.add(pattern, rule_index)?;
        self.rules.push(Rule {
            pattern: pattern.to_owned(),
            methods,
            kinds,
            name: None,
            node,
            handler,
        });
        Ok(self.rules.last_mut().unwrap())
    }

    /// install the application-level catch-all, run when nothing matches
    pub fn set_catchall(&mut self, handler: H) {
        self.catchall = Some(handler);
    }

    /// Record a blueprint subtree rooted at `prefix`, optionally with its
    /// own catch-all. A failed match under the prefix falls back to the
    /// innermost blueprint catch-all before the application's.
    pub fn add_blueprint(&mut self, prefix: impl Into<String>, catchall: Option<H>) {
        self.blueprints.push(BlueprintEntry {
            prefix: prefix.into(),
            catchall,
        });
    }

    /// Route a request. A HEAD request with no HEAD rule falls back to the
    /// GET rule on the same path; the connection suppresses the body.
    pub fn route(&self, method: Method, path: &str) -> Match<'_, H> {
        let Some((rule_indices, params)) = self.trie.find(path) else {
            return Match::NotFound;
        };

        let rule_for = |m: Method| {
            rule_indices
                .iter()
                .map(|index| &self.rules[usize::from(*index)])
                .find(|rule| rule.methods.contains(m))
        };

        let mut winner = rule_for(method);
        if winner.is_none() && method == Method::Head {
            winner = rule_for(Method::Get);
        }

        match winner {
            Some(rule) => {
                log::debug!("matched {} {}", method, rule.name());
                Match::Found { rule, params }
            }
            None => Match::MethodNotAllowed {
                allow: self.allow_mask(rule_indices),
            },
        }
    }

    /// the methods accepted at `path`, if the path exists
    pub fn allow_for(&self, path: &str) -> Option<MethodMask> {
        self.trie
            .find(path)
            .map(|(rule_indices, _)| self.allow_mask(rule_indices))
    }

    /// the union of methods accepted anywhere in the router, for
    /// `OPTIONS *`
    pub fn allow_all(&self) -> MethodMask {
        self.rules
            .iter()
            .fold(MethodMask::EMPTY, |mask, rule| mask.union(rule.methods))
    }

    /// The catch-all responsible for a missed path: the innermost
    /// blueprint covering it, else the application's.
    pub fn catchall_for(&self, path: &str) -> Option<&H> {
        let mut best: Option<&BlueprintEntry<H>> = None;
        for entry in &self.blueprints {
            if entry.catchall.is_some()
                && path.starts_with(&entry.prefix)
                && best.is_none_or(|b| entry.prefix.len() > b.prefix.len())
            {
                best = Some(entry);
            }
        }
        best.map_or(self.catchall.as_ref(), |entry| entry.catchall.as_ref())
    }

    /// Check rule-table consistency: no two rules on one pattern may accept
    /// the same method.
    pub fn validate(&self) -> Result<(), RouterError> {
        for (i, rule) in self.rules.iter().enumerate() {
            for other in &self.rules[i + 1..] {
                if rule.node == other.node && rule.methods.intersects(other.methods) {
                    return Err(RouterError::AmbiguousMethods(rule.pattern.clone()));
                }
            }
        }
        Ok(())
    }

    /// iterate all registered rules
    pub fn rules(&self) -> std::slice::Iter<'_, Rule<H>> {
        self.rules.iter()
    }

    fn allow_mask(&self, rule_indices: &[u16]) -> MethodMask {
        rule_indices
            .iter()
            .map(|index| self.rules[usize::from(*index)].methods)
            .fold(MethodMask::EMPTY, MethodMask::union)
    }
}

impl<H> Debug for Router<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("Router ")?;
        let mut set = f.debug_set();
        for rule in &self.rules {
            set.entry(rule);
        }
        set.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn get() -> MethodMask {
        MethodMask::of(Method::Get)
    }

    #[test]
    fn typed_route_end_to_end() {
        let mut router = Router::new();
        router
            .add("/5/<int>/<uint>/<double>/<string>/<path>", get(), "five")
            .unwrap();

        match router.route(Method::Get, "/5/-5/999/3.141592/hello_there/a/b/c/d") {
            Match::Found { rule, params } => {
                assert_eq!(rule.handler, "five");
                assert_eq!(params.shape(), (1, 1, 1, 2));
                assert_eq!(params.int(0), Some(-5));
                assert_eq!(params.string(1), Some("a/b/c/d"));
            }
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn captured_shape_matches_tag() {
        let mut router = Router::new();
        let kinds = router
            .add("/a/<int>/b/<string>", get(), ())
            .unwrap()
            .kinds()
            .to_vec();
        assert_eq!(kinds, vec![ParamKind::Int, ParamKind::String]);
        match router.route(Method::Get, "/a/7/b/x") {
            Match::Found { params, .. } => assert_eq!(params.shape(), (1, 0, 0, 1)),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn method_gate() {
        let mut router = Router::new();
        router.add("/get_only", get(), ()).unwrap();

        match router.route(Method::Post, "/get_only") {
            Match::MethodNotAllowed { allow } => {
                assert_eq!(allow.allow_header_value(), "OPTIONS, HEAD, GET");
            }
            other => panic!("expected MethodNotAllowed, got {other:?}"),
        }
    }

    #[test]
    fn head_falls_back_to_get() {
        let mut router = Router::new();
        router.add("/page", get(), ()).unwrap();
        assert!(matches!(
            router.route(Method::Head, "/page"),
            Match::Found { .. }
        ));
    }

    #[test]
    fn allow_union_across_rules() {
        let mut router = Router::new();
        router.add("/", get(), 1).unwrap();
        router.add("/", MethodMask::of(Method::Post), 2).unwrap();
        let allow = router.allow_for("/").unwrap();
        assert_eq!(allow.allow_header_value(), "OPTIONS, HEAD, GET, POST");
        assert!(router.allow_for("/nope").is_none());
    }

    #[test]
    fn validation_rejects_overlapping_methods() {
        let mut router = Router::new();
        router.add("/dup", get(), ()).unwrap();
        router.add("/dup", get(), ()).unwrap();
        assert_eq!(
            router.validate(),
            Err(RouterError::AmbiguousMethods("/dup".into()))
        );
    }

    #[test]
    fn blueprint_catchall_selection() {
        let mut router: Router<&str> = Router::new();
        router.set_catchall("app");
        router.add_blueprint("/api", Some("api"));
        router.add_blueprint("/api/v2", Some("v2"));
        router.add_blueprint("/static", None);

        assert_eq!(router.catchall_for("/api/missing"), Some(&"api"));
        assert_eq!(router.catchall_for("/api/v2/missing"), Some(&"v2"));
        assert_eq!(router.catchall_for("/static/missing"), Some(&"app"));
        assert_eq!(router.catchall_for("/other"), Some(&"app"));
    }
}
