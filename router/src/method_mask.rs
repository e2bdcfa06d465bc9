use crow_http::Method;

/// A set of HTTP methods, one bit per verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MethodMask(u64);

impl MethodMask {
    /// the empty set
    pub const EMPTY: Self = Self(0);

    fn bit(method: Method) -> u64 {
        1 << Method::ALL
            .iter()
            .position(|m| *m == method)
            .expect("method missing from Method::ALL")
    }

    /// a set containing exactly `method`
    pub fn of(method: Method) -> Self {
        Self(Self::bit(method))
    }

    /// add a method to the set
    pub fn add(&mut self, method: Method) {
        self.0 |= Self::bit(method);
    }

    /// does the set contain `method`?
    pub fn contains(&self, method: Method) -> bool {
        self.0 & Self::bit(method) != 0
    }

    /// set union
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// do the two sets share any method?
    pub fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// is the set empty?
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// the methods in this set, in declaration order
    pub fn iter(&self) -> impl Iterator<Item = Method> + '_ {
        Method::ALL.into_iter().filter(|m| self.contains(*m))
    }

    /// The value for an `Allow` header advertising this set: `OPTIONS`
    /// first, `HEAD` when `GET` is allowed, then the remaining methods.
    pub fn allow_header_value(&self) -> String {
        let mut parts = vec!["OPTIONS"];
        if self.contains(Method::Get) || self.contains(Method::Head) {
            parts.push("HEAD");
        }
        for method in Method::ALL {
            if !matches!(method, Method::Options | Method::Head) && self.contains(method) {
                parts.push(method.as_str());
            }
        }
        parts.join(", ")
    }
}

impl From<Method> for MethodMask {
    fn from(method: Method) -> Self {
        Self::of(method)
    }
}

impl FromIterator<Method> for MethodMask {
    fn from_iter<T: IntoIterator<Item = Method>>(iter: T) -> Self {
        let mut mask = Self::EMPTY;
        for method in iter {
            mask.add(method);
        }
        mask
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn contains_and_union() {
        let mut mask = MethodMask::of(Method::Get);
        assert!(mask.contains(Method::Get));
        assert!(!mask.contains(Method::Post));
        mask.add(Method::Post);
        assert!(mask.contains(Method::Post));
        assert!(mask.intersects(MethodMask::of(Method::Post)));
    }

    #[test]
    fn allow_header() {
        let mask = MethodMask::of(Method::Get);
        assert_eq!(mask.allow_header_value(), "OPTIONS, HEAD, GET");

        let mask: MethodMask = [Method::Get, Method::Post].into_iter().collect();
        assert_eq!(mask.allow_header_value(), "OPTIONS, HEAD, GET, POST");

        let mask = MethodMask::of(Method::Delete);
        assert_eq!(mask.allow_header_value(), "OPTIONS, DELETE");
    }
}
