use super::HeaderValue;
use smallvec::{SmallVec, smallvec};
use std::fmt::{self, Debug};

/// The values stored under one header name. Nearly all headers carry a
/// single value, so one value is held inline.
#[derive(Clone, Eq, PartialEq)]
pub struct HeaderValues(SmallVec<[HeaderValue; 1]>);

impl HeaderValues {
    /// the first value, if any. The scalar lookup api on
    /// [`Headers`][crate::Headers] routes through this.
    pub fn one(&self) -> Option<&HeaderValue> {
        self.0.first()
    }

    /// how many values are stored under this name
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// is this value set empty?
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// iterate the values in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, HeaderValue> {
        self.0.iter()
    }

    pub(crate) fn extend(&mut self, other: HeaderValues) {
        self.0.extend(other.0);
    }
}

impl Debug for HeaderValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            Debug::fmt(&self.0[0], f)
        } else {
            f.debug_list().entries(&self.0).finish()
        }
    }
}

impl<'a> IntoIterator for &'a HeaderValues {
    type Item = &'a HeaderValue;
    type IntoIter = std::slice::Iter<'a, HeaderValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<V> From<V> for HeaderValues
where
    V: Into<HeaderValue>,
{
    fn from(value: V) -> Self {
        Self(smallvec![value.into()])
    }
}

impl<V> FromIterator<V> for HeaderValues
where
    V: Into<HeaderValue>,
{
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
