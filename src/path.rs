//! Path patterns.
//!
//! A pattern is a `/`-separated list of segments:
//!
//! | Segment | Matches |
//! |---|---|
//! | `books` | exactly `books` |
//! | `:id` | any one segment, captured as `id` |
//! | `:page?` | one segment or nothing, captured as `page` when present |
//! | `*` | the rest of the path (last segment only), captured as `0` |
//!
//! A pattern compiles into one small [`matchit`] tree per shape it can take,
//! one shape per combination of present/absent optional segments (and of an
//! empty or non-empty wildcard). Matching only reads the trees, so one compiled
//! matcher serves any number of concurrent requests.

use std::borrow::Cow;

use matchit::Router as Tree;

use crate::error::Error;

const WILDCARD: &str = "__wildcard";
const WILDCARD_PARAM: &str = "0";
const MAX_OPTIONAL: usize = 8;

// ── Params ────────────────────────────────────────────────────────────────────

/// Parameters extracted from one match, in pattern order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

// ── PathMatcher ───────────────────────────────────────────────────────────────

/// A compiled path pattern.
pub struct PathMatcher {
    pattern: String,
    shapes: Vec<Shape>,
}

/// One concrete form of a pattern. A trailing `*` that matched nothing
/// compiles to its own shape so the `0` parameter can still be reported.
struct Shape {
    tree: Tree<()>,
    empty_rest: bool,
}

impl PathMatcher {
    /// Compiles `pattern`, rejecting malformed ones with [`Error::InvalidPattern`].
    pub fn new(pattern: &str) -> Result<Self, Error> {
        let segments = parse(pattern)?;
        let mut seen = Vec::new();
        let mut compiled = Vec::new();
        for (route, empty_rest) in shapes(&segments) {
            // Shapes differing only in parameter names match the same paths;
            // the earlier one always answers first.
            let key = erase_names(&route);
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);

            let mut tree = Tree::new();
            tree.insert(route, ()).map_err(|e| invalid(pattern, e.to_string()))?;
            compiled.push(Shape { tree, empty_rest });
        }
        Ok(Self { pattern: pattern.to_owned(), shapes: compiled })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Tests `pathname` (no query string) and returns the decoded parameters.
    ///
    /// Shapes are tried in order, so an optional segment binds before any
    /// later one and before the wildcard. `*` also matches an empty
    /// remainder: `/static/*` accepts `/static/` with `0` set to `""`, but
    /// not `/static`.
    ///
    /// Values are percent-decoded; a value that does not decode to UTF-8 is
    /// returned as it appeared in the path.
    pub fn matches(&self, pathname: &str) -> Option<Params> {
        let path = if pathname.is_empty() { "/" } else { pathname };
        self.shapes.iter().find_map(|shape| {
            let matched = shape.tree.at(path).ok()?;
            let mut params: Vec<(String, String)> = matched
                .params
                .iter()
                .map(|(name, raw)| {
                    let name = if name == WILDCARD { WILDCARD_PARAM } else { name };
                    (name.to_owned(), decode(raw))
                })
                .collect();
            if shape.empty_rest {
                params.push((WILDCARD_PARAM.to_owned(), String::new()));
            }
            Some(Params(params))
        })
    }
}

impl std::fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PathMatcher").field(&self.pattern).finish()
    }
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_owned())
}

fn invalid(pattern: &str, reason: impl Into<String>) -> Error {
    Error::InvalidPattern { pattern: pattern.to_owned(), reason: reason.into() }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Literal(&'a str),
    Param { name: &'a str, optional: bool },
    Wildcard,
}

fn parse(pattern: &str) -> Result<Vec<Segment<'_>>, Error> {
    let Some(rest) = pattern.strip_prefix('/') else {
        return Err(invalid(pattern, "must start with `/`"));
    };
    let raw: Vec<&str> = rest.split('/').collect();
    let mut segments = Vec::with_capacity(raw.len());
    let mut names: Vec<&str> = Vec::new();

    for (i, part) in raw.iter().enumerate() {
        if *part == "*" {
            if i + 1 != raw.len() {
                return Err(invalid(pattern, "`*` must be the last segment"));
            }
            segments.push(Segment::Wildcard);
        } else if let Some(param) = part.strip_prefix(':') {
            let (name, optional) = match param.strip_suffix('?') {
                Some(name) => (name, true),
                None => (param, false),
            };
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
                return Err(invalid(pattern, format!("bad parameter name `{param}`")));
            }
            if names.contains(&name) {
                return Err(invalid(pattern, format!("parameter `{name}` appears twice")));
            }
            names.push(name);
            segments.push(Segment::Param { name, optional });
        } else {
            segments.push(Segment::Literal(part));
        }
    }

    let optional = segments
        .iter()
        .filter(|s| matches!(s, Segment::Param { optional: true, .. }))
        .count();
    if optional > MAX_OPTIONAL {
        return Err(invalid(pattern, format!("more than {MAX_OPTIONAL} optional segments")));
    }
    Ok(segments)
}

/// Every concrete route the segments can produce, in matchit syntax, paired
/// with whether it stands for an empty wildcard remainder.
///
/// Ordered so that shapes keeping earlier optional parameters come first, and
/// a non-empty wildcard before an empty one.
fn shapes(segments: &[Segment<'_>]) -> Vec<(String, bool)> {
    let total = segments
        .iter()
        .filter(|s| matches!(s, Segment::Param { optional: true, .. }))
        .count();
    let wildcard = matches!(segments.last(), Some(Segment::Wildcard));
    let rests: &[bool] = if wildcard { &[false, true] } else { &[false] };

    let mut out = Vec::new();
    for mask in (0..1u32 << total).rev() {
        for &empty_rest in rests {
            out.push((render(segments, total, mask, empty_rest), empty_rest));
        }
    }
    out
}

fn render(segments: &[Segment<'_>], total: usize, mask: u32, empty_rest: bool) -> String {
    let mut route = String::new();
    let mut slot = 0;
    for segment in segments {
        match segment {
            Segment::Literal(text) => {
                route.push('/');
                route.push_str(&text.replace('{', "{{").replace('}', "}}"));
            }
            Segment::Param { name, optional } => {
                // The first optional segment owns the highest bit.
                let present = if *optional {
                    let bit = 1u32 << (total - 1 - slot);
                    slot += 1;
                    mask & bit != 0
                } else {
                    true
                };
                if present {
                    route.push_str("/{");
                    route.push_str(name);
                    route.push('}');
                }
            }
            Segment::Wildcard if empty_rest => route.push('/'),
            Segment::Wildcard => {
                route.push_str("/{*");
                route.push_str(WILDCARD);
                route.push('}');
            }
        }
    }
    if route.is_empty() {
        route.push('/');
    }
    route
}

/// `route` with every parameter name dropped, so that shapes matching the
/// same paths compare equal.
fn erase_names(route: &str) -> String {
    let mut out = String::with_capacity(route.len());
    let mut chars = route.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push_str("{{");
            }
            '{' => {
                out.push('{');
                if chars.peek() == Some(&'*') {
                    out.push('*');
                }
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                }
                out.push('}');
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(m: &PathMatcher, path: &str) -> Option<Vec<(String, String)>> {
        m.matches(path)
            .map(|p| p.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect())
    }

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_owned(), v.to_owned())
    }

    #[test]
    fn static_paths() {
        let m = PathMatcher::new("/books").unwrap();
        assert_eq!(params(&m, "/books"), Some(vec![]));
        assert_eq!(params(&m, "/books/"), None);
        assert_eq!(params(&m, "/book"), None);

        let root = PathMatcher::new("/").unwrap();
        assert!(root.matches("/").is_some());
        assert!(root.matches("").is_some());
    }

    #[test]
    fn named_parameters() {
        let m = PathMatcher::new("/books/:id/pages/:page").unwrap();
        assert_eq!(
            params(&m, "/books/2/pages/10"),
            Some(vec![pair("id", "2"), pair("page", "10")])
        );
        assert_eq!(params(&m, "/books/2/pages"), None);
    }

    #[test]
    fn optional_parameters() {
        let m = PathMatcher::new("/books/:id?").unwrap();
        assert_eq!(params(&m, "/books/7"), Some(vec![pair("id", "7")]));
        assert_eq!(params(&m, "/books"), Some(vec![]));

        let m = PathMatcher::new("/a/:x?/c").unwrap();
        assert_eq!(params(&m, "/a/b/c"), Some(vec![pair("x", "b")]));
        assert_eq!(params(&m, "/a/c"), Some(vec![]));
    }

    #[test]
    fn earlier_optional_binds_first() {
        let m = PathMatcher::new("/:a?/:b?").unwrap();
        assert_eq!(params(&m, "/x/y"), Some(vec![pair("a", "x"), pair("b", "y")]));
        assert_eq!(params(&m, "/x"), Some(vec![pair("a", "x")]));
        assert_eq!(params(&m, "/"), Some(vec![]));
    }

    #[test]
    fn trailing_wildcard() {
        let m = PathMatcher::new("/static/*").unwrap();
        assert_eq!(params(&m, "/static/css/site.css"), Some(vec![pair("0", "css/site.css")]));
        assert_eq!(params(&m, "/other/x"), None);
    }

    #[test]
    fn wildcard_may_be_empty() {
        let m = PathMatcher::new("/static/*").unwrap();
        assert_eq!(params(&m, "/static/"), Some(vec![pair("0", "")]));
        assert_eq!(params(&m, "/static"), None);

        let any = PathMatcher::new("/*").unwrap();
        assert_eq!(params(&any, "/"), Some(vec![pair("0", "")]));
        assert_eq!(params(&any, "/a/b"), Some(vec![pair("0", "a/b")]));
    }

    #[test]
    fn optional_parameter_before_wildcard() {
        let m = PathMatcher::new("/a/:x?/*").unwrap();
        assert_eq!(params(&m, "/a/x/rest"), Some(vec![pair("x", "x"), pair("0", "rest")]));
        assert_eq!(params(&m, "/a/foo"), Some(vec![pair("0", "foo")]));
        assert_eq!(params(&m, "/a/x/"), Some(vec![pair("x", "x"), pair("0", "")]));
        assert_eq!(params(&m, "/a/"), Some(vec![pair("0", "")]));
        assert_eq!(params(&m, "/b/foo"), None);

        let m = PathMatcher::new("/:x?/*").unwrap();
        assert_eq!(params(&m, "/foo"), Some(vec![pair("0", "foo")]));
        assert_eq!(params(&m, "/foo/bar/baz"), Some(vec![pair("x", "foo"), pair("0", "bar/baz")]));
    }

    #[test]
    fn shapes_differing_only_in_names_compile_once() {
        let m = PathMatcher::new("/:a?/:b?").unwrap();
        // `/{a}/{b}`, `/{a}` and `/`; `/{b}` is unreachable behind `/{a}`.
        assert_eq!(m.shapes.len(), 3);
    }

    #[test]
    fn values_are_percent_decoded() {
        let m = PathMatcher::new("/users/:name").unwrap();
        assert_eq!(params(&m, "/users/j%C3%B8rn"), Some(vec![pair("name", "jørn")]));
        assert_eq!(params(&m, "/users/a%2Fb"), Some(vec![pair("name", "a/b")]));
    }

    #[test]
    fn undecodable_values_fall_back_to_raw() {
        let m = PathMatcher::new("/users/:name").unwrap();
        assert_eq!(params(&m, "/users/%FF"), Some(vec![pair("name", "%FF")]));
    }

    #[test]
    fn literal_braces_are_escaped() {
        let m = PathMatcher::new("/{weird}/:id").unwrap();
        assert_eq!(params(&m, "/{weird}/1"), Some(vec![pair("id", "1")]));
    }

    #[test]
    fn rejects_malformed_patterns() {
        for bad in ["books", "/a/*/b", "/:", "/:bad-name", "/:id/:id"] {
            assert!(
                matches!(PathMatcher::new(bad), Err(Error::InvalidPattern { .. })),
                "{bad} should be rejected"
            );
        }
    }
}
