use std::fmt::{self, Display};

/// The type of one url placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// `<int>`: an optional `-` followed by digits, captured as `i64`
    Int,
    /// `<uint>`: digits, captured as `u64`
    Uint,
    /// `<double>`: a numeric literal with optional dot and exponent,
    /// captured as `f64`
    Double,
    /// `<string>`: one or more non-`/` bytes, captured as `String`
    String,
    /// `<path>`: the remainder of the url, slashes included
    Path,
}

impl ParamKind {
    /// Recognize a placeholder token, brackets included. `<str>` and
    /// `<float>` are accepted aliases.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "<int>" => Some(Self::Int),
            "<uint>" => Some(Self::Uint),
            "<double>" | "<float>" => Some(Self::Double),
            "<string>" | "<str>" => Some(Self::String),
            "<path>" => Some(Self::Path),
            _ => None,
        }
    }
}

impl Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Int => "<int>",
            Self::Uint => "<uint>",
            Self::Double => "<double>",
            Self::String => "<string>",
            Self::Path => "<path>",
        })
    }
}

/// The placeholder tag of a url pattern: the typed placeholders in order of
/// appearance. Returns `None` for an unclosed or unrecognized placeholder.
pub fn pattern_tag(pattern: &str) -> Option<Vec<ParamKind>> {
    let mut kinds = Vec::new();
    let mut rest = pattern;
    while let Some(open) = rest.find('<') {
        let close = rest[open..].find('>')?;
        kinds.push(ParamKind::from_token(&rest[open..open + close + 1])?);
        rest = &rest[open + close + 1..];
    }
    Some(kinds)
}

/// The values captured while matching one request path: four parallel typed
/// vectors, each filled in placeholder order. [`FromRouteParams`] converts a
/// `RouteParams` into the tuple a typed handler expects.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RouteParams {
    pub(crate) int_params: Vec<i64>,
    pub(crate) uint_params: Vec<u64>,
    pub(crate) double_params: Vec<f64>,
    pub(crate) string_params: Vec<String>,
}

impl RouteParams {
    /// the `index`th `<int>` capture, in placeholder order
    pub fn int(&self, index: usize) -> Option<i64> {
        self.int_params.get(index).copied()
    }

    /// the `index`th `<uint>` capture
    pub fn uint(&self, index: usize) -> Option<u64> {
        self.uint_params.get(index).copied()
    }

    /// the `index`th `<double>` capture
    pub fn double(&self, index: usize) -> Option<f64> {
        self.double_params.get(index).copied()
    }

    /// the `index`th `<string>` or `<path>` capture
    pub fn string(&self, index: usize) -> Option<&str> {
        self.string_params.get(index).map(String::as_str)
    }

    /// the shape of this capture set, as counts per typed vector:
    /// `(ints, uints, doubles, strings)`
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        (
            self.int_params.len(),
            self.uint_params.len(),
            self.double_params.len(),
            self.string_params.len(),
        )
    }
}

/// A single typed handler argument extracted from [`RouteParams`].
pub trait FromParam: Sized {
    /// which placeholder kinds this type accepts
    fn accepts(kind: ParamKind) -> bool;
    /// the default kind, used when deriving a pattern's expected tag
    const KIND: ParamKind;
    /// pull the `index`th value of this type out of the captures
    fn extract(params: &RouteParams, index: usize) -> Self;
}

impl FromParam for i64 {
    const KIND: ParamKind = ParamKind::Int;
    fn accepts(kind: ParamKind) -> bool {
        kind == ParamKind::Int
    }
    fn extract(params: &RouteParams, index: usize) -> Self {
        params.int_params[index]
    }
}

impl FromParam for u64 {
    const KIND: ParamKind = ParamKind::Uint;
    fn accepts(kind: ParamKind) -> bool {
        kind == ParamKind::Uint
    }
    fn extract(params: &RouteParams, index: usize) -> Self {
        params.uint_params[index]
    }
}

impl FromParam for f64 {
    const KIND: ParamKind = ParamKind::Double;
    fn accepts(kind: ParamKind) -> bool {
        kind == ParamKind::Double
    }
    fn extract(params: &RouteParams, index: usize) -> Self {
        params.double_params[index]
    }
}

impl FromParam for String {
    const KIND: ParamKind = ParamKind::String;
    fn accepts(kind: ParamKind) -> bool {
        matches!(kind, ParamKind::String | ParamKind::Path)
    }
    fn extract(params: &RouteParams, index: usize) -> Self {
        params.string_params[index].clone()
    }
}

/// A tuple of typed handler arguments. Implemented for tuples of
/// [`FromParam`] types up to arity eight; the unit type serves routes
/// without placeholders.
pub trait FromRouteParams: Sized {
    /// does this tuple's shape match the placeholder tag of a pattern?
    fn matches(kinds: &[ParamKind]) -> bool;
    /// a human-readable description of the expected placeholders, for
    /// registration-time error messages
    fn describe() -> String;
    /// build the tuple from captured values
    fn from_params(params: &RouteParams) -> Self;
}

impl FromRouteParams for () {
    fn matches(kinds: &[ParamKind]) -> bool {
        kinds.is_empty()
    }

    fn describe() -> String {
        "no placeholders".into()
    }

    fn from_params(_: &RouteParams) -> Self {}
}

macro_rules! from_route_params_tuple {
    ($($name:ident),+) => {
        impl<$($name: FromParam),+> FromRouteParams for ($($name,)+) {
            fn matches(kinds: &[ParamKind]) -> bool {
                let expected = [$(<$name as FromParam>::accepts as fn(ParamKind) -> bool),+];
                kinds.len() == expected.len()
                    && kinds.iter().zip(expected).all(|(kind, accepts)| accepts(*kind))
            }

            fn describe() -> String {
                [$(<$name as FromParam>::KIND.to_string()),+].join("/")
            }

            #[allow(unused_variables, unused_mut)]
            fn from_params(params: &RouteParams) -> Self {
                let mut ints = 0usize;
                let mut uints = 0usize;
                let mut doubles = 0usize;
                let mut strings = 0usize;
                (
                    $({
                        let index = match <$name as FromParam>::KIND {
                            ParamKind::Int => { ints += 1; ints - 1 }
                            ParamKind::Uint => { uints += 1; uints - 1 }
                            ParamKind::Double => { doubles += 1; doubles - 1 }
                            ParamKind::String | ParamKind::Path => { strings += 1; strings - 1 }
                        };
                        <$name as FromParam>::extract(params, index)
                    },)+
                )
            }
        }
    };
}

from_route_params_tuple!(A);
from_route_params_tuple!(A, B);
from_route_params_tuple!(A, B, C);
from_route_params_tuple!(A, B, C, D);
from_route_params_tuple!(A, B, C, D, E);
from_route_params_tuple!(A, B, C, D, E, F);
from_route_params_tuple!(A, B, C, D, E, F, G);
from_route_params_tuple!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tuple_matching() {
        use ParamKind::*;
        assert!(<()>::matches(&[]));
        assert!(<(i64,)>::matches(&[Int]));
        assert!(!<(i64,)>::matches(&[Uint]));
        assert!(<(i64, u64, f64, std::string::String, std::string::String)>::matches(&[
            Int, Uint, Double, String, Path
        ]));
        assert!(!<(i64, u64)>::matches(&[Int]));
    }

    #[test]
    fn extraction_order() {
        let params = RouteParams {
            int_params: vec![-5],
            uint_params: vec![999],
            double_params: vec![3.5],
            string_params: vec!["hello".into(), "a/b".into()],
        };
        let (a, b, c, d, e) = <(i64, u64, f64, String, String)>::from_params(&params);
        assert_eq!((a, b, c), (-5, 999, 3.5));
        assert_eq!(d, "hello");
        assert_eq!(e, "a/b");
    }
}
