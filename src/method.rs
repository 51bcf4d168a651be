//! The set of HTTP methods a route answers to.
//!
//! Method strings are case-sensitive per RFC 9110 §9.1: `"get"` is an
//! extension method, not `GET`.

use std::fmt;
use std::str::FromStr;

use http::Method;

use crate::error::Error;

/// Methods accepted by a route.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Methods {
    /// Every method, written `*`.
    Any,
    Only(Vec<Method>),
}

impl Methods {
    pub fn contains(&self, method: &Method) -> bool {
        match self {
            Self::Any => true,
            Self::Only(list) => list.contains(method),
        }
    }

    /// The explicit methods, empty for [`Methods::Any`].
    pub fn as_slice(&self) -> &[Method] {
        match self {
            Self::Any => &[],
            Self::Only(list) => list,
        }
    }
}

impl From<Method> for Methods {
    fn from(method: Method) -> Self {
        Self::Only(vec![method])
    }
}

impl<const N: usize> From<[Method; N]> for Methods {
    fn from(methods: [Method; N]) -> Self {
        Self::Only(methods.into())
    }
}

impl From<Vec<Method>> for Methods {
    fn from(methods: Vec<Method>) -> Self {
        Self::Only(methods)
    }
}

/// Parses `*` or a comma-separated list such as `"GET, HEAD"`.
impl FromStr for Methods {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "*" {
            return Ok(Self::Any);
        }
        let mut list = Vec::new();
        for token in s.split(',').map(str::trim) {
            if token.is_empty() {
                return Err(Error::InvalidMethod(s.to_owned()));
            }
            let method = Method::from_bytes(token.as_bytes())
                .map_err(|_| Error::InvalidMethod(s.to_owned()))?;
            if !list.contains(&method) {
                list.push(method);
            }
        }
        Ok(Self::Only(list))
    }
}

/// Renders an `Allow` header value.
impl fmt::Display for Methods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Only(list) => {
                for (i, method) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(method.as_str())?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lists_and_wildcard() {
        assert_eq!("*".parse::<Methods>().unwrap(), Methods::Any);
        let m: Methods = "GET, POST,GET".parse().unwrap();
        assert_eq!(m, Methods::Only(vec![Method::GET, Method::POST]));
        assert_eq!(m.to_string(), "GET, POST");
    }

    #[test]
    fn rejects_empty_tokens() {
        for bad in ["GET,,POST", "", "GET,", " , "] {
            assert!(
                matches!(bad.parse::<Methods>(), Err(Error::InvalidMethod(ref input)) if input == bad),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn method_names_are_case_sensitive() {
        let m: Methods = "get".parse().unwrap();
        assert!(!m.contains(&Method::GET));
        assert!(Methods::Any.contains(&Method::DELETE));
    }
}
