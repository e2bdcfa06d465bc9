mod header_name;
mod header_value;
mod header_values;
mod known_header_name;

pub use header_name::HeaderName;
pub(crate) use header_name::is_tchar;
pub use header_value::HeaderValue;
pub use header_values::HeaderValues;
pub use known_header_name::KnownHeaderName;

use std::fmt::{self, Display, Formatter};

/// Crow's header map type.
///
/// Keys compare case-insensitively, values are preserved byte-exact, and a
/// name may carry several values. Iteration yields headers in the order they
/// were first inserted; that ordering is part of the contract, which is why
/// the backing store is a vector rather than a hash map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[must_use]
pub struct Headers {
    entries: Vec<(HeaderName, HeaderValues)>,
}

impl Headers {
    /// Construct an empty header map
    pub fn new() -> Self {
        Self::default()
    }

    /// Are there zero headers?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many unique [`HeaderName`]s have been added? Note that each name
    /// may hold more than one [`HeaderValue`].
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Add the value or values under this name. If the name is already
    /// present, the new values are appended to the existing ones; `append`
    /// never replaces. To replace, use [`Headers::insert`].
    pub fn append(&mut self, name: impl Into<HeaderName>, values: impl Into<HeaderValues>) {
        let name = name.into();
        let values = values.into();
        match self.position(&name) {
            Some(index) => self.entries[index].1.extend(values),
            None => self.entries.push((name, values)),
        }
    }

    /// Add the value or values under this name, replacing any values already
    /// present. The entry keeps its original position in iteration order.
    pub fn insert(&mut self, name: impl Into<HeaderName>, values: impl Into<HeaderValues>) {
        let name = name.into();
        let values = values.into();
        match self.position(&name) {
            Some(index) => self.entries[index].1 = values,
            None => self.entries.push((name, values)),
        }
    }

    /// Insert the value or values if and only if no header with this name
    /// exists yet.
    pub fn try_insert(&mut self, name: impl Into<HeaderName>, values: impl Into<HeaderValues>) {
        let name = name.into();
        if self.position(&name).is_none() {
            self.entries.push((name, values.into()));
        }
    }

    /// Insert the result of the provided function if and only if no header
    /// with this name exists yet.
    pub fn try_insert_with<V>(&mut self, name: impl Into<HeaderName>, values: impl FnOnce() -> V)
    where
        V: Into<HeaderValues>,
    {
        let name = name.into();
        if self.position(&name).is_none() {
            self.entries.push((name, values().into()));
        }
    }

    /// Retrieve all values for this name, or None if the header is absent.
    pub fn get_values(&self, name: impl Into<HeaderName>) -> Option<&HeaderValues> {
        let name = name.into();
        self.position(&name).map(|index| &self.entries[index].1)
    }

    /// Retrieve the first value for this name.
    pub fn get(&self, name: impl Into<HeaderName>) -> Option<&HeaderValue> {
        self.get_values(name).and_then(HeaderValues::one)
    }

    /// Retrieve the first value for this name as a `&str`, if it is utf-8.
    pub fn get_str(&self, name: impl Into<HeaderName>) -> Option<&str> {
        self.get(name).and_then(HeaderValue::as_str)
    }

    /// Remove all values for this name, returning them if the header was
    /// present.
    pub fn remove(&mut self, name: impl Into<HeaderName>) -> Option<HeaderValues> {
        let name = name.into();
        self.position(&name)
            .map(|index| self.entries.remove(index).1)
    }

    /// Predicate function to check whether this map contains the name.
    pub fn has_header(&self, name: impl Into<HeaderName>) -> bool {
        let name = name.into();
        self.position(&name).is_some()
    }

    /// Convenience predicate: does the first value for this name compare
    /// ascii-case-insensitively equal to `needle`? Returns false when the
    /// header is absent.
    pub fn eq_ignore_ascii_case(&self, name: impl Into<HeaderName>, needle: &str) -> bool {
        self.get_str(name)
            .is_some_and(|value| value.eq_ignore_ascii_case(needle))
    }

    /// Convenience predicate: does any comma-separated token of the first
    /// value for this name match `needle` ascii-case-insensitively?
    pub fn contains_token(&self, name: impl Into<HeaderName>, needle: &str) -> bool {
        self.get_str(name).is_some_and(|value| {
            value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case(needle))
        })
    }

    /// Iterate over `(name, values)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValues)> {
        self.entries.iter().map(|(name, values)| (name, values))
    }

    fn position(&self, name: &HeaderName) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }
}

impl Display for Headers {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (name, values) in &self.entries {
            for value in values {
                f.write_fmt(format_args!("{name}: {value}\r\n"))?;
            }
        }
        Ok(())
    }
}

impl<HN, HV> Extend<(HN, HV)> for Headers
where
    HN: Into<HeaderName>,
    HV: Into<HeaderValues>,
{
    fn extend<T: IntoIterator<Item = (HN, HV)>>(&mut self, iter: T) {
        for (name, values) in iter {
            self.append(name, values);
        }
    }
}

impl<HN, HV> FromIterator<(HN, HV)> for Headers
where
    HN: Into<HeaderName>,
    HV: Into<HeaderValues>,
{
    fn from_iter<T: IntoIterator<Item = (HN, HV)>>(iter: T) -> Self {
        let mut headers = Self::new();
        headers.extend(iter);
        headers
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a HeaderName, &'a HeaderValues);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (HeaderName, HeaderValues)>,
        fn(&'a (HeaderName, HeaderValues)) -> (&'a HeaderName, &'a HeaderValues),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter().map(|(name, values)| (name, values))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use KnownHeaderName::{ContentType, Server};

    #[test]
    fn keys_are_case_insensitive() {
        let mut headers = Headers::new();
        headers.append("X-Custom", "a");
        assert_eq!(headers.get_str("x-custom"), Some("a"));
        assert_eq!(headers.get_str("X-CUSTOM"), Some("a"));
        headers.append("content-type", "text/html");
        assert_eq!(headers.get_str(ContentType), Some("text/html"));
    }

    #[test]
    fn append_never_replaces() {
        let mut headers = Headers::new();
        headers.append("set-cookie", "a=1");
        headers.append("Set-Cookie", "b=2");
        let values = headers.get_values("set-cookie").unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(headers.get_str("set-cookie"), Some("a=1"));
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut headers = Headers::new();
        headers.append("zeta", "1");
        headers.append(Server, "crow");
        headers.append("alpha", "2");
        headers.append("Zeta", "3");
        let names = headers
            .iter()
            .map(|(name, _)| name.to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["zeta", "Server", "alpha"]);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut headers = Headers::new();
        headers.append("a", "1");
        headers.append("b", "2");
        headers.insert("a", "3");
        assert_eq!(headers.get_str("a"), Some("3"));
        let names = headers
            .iter()
            .map(|(name, _)| name.to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn values_are_byte_exact() {
        let mut headers = Headers::new();
        headers.append("x", "MiXeD CaSe");
        assert_eq!(headers.get_str("x"), Some("MiXeD CaSe"));
    }
}
