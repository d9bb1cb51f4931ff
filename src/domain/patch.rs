//! Per-field "leave unchanged" marker for partial updates.
//!
//! Every updatable column of a patch struct is a [`Patch<T>`]. `Patch::Unset`
//! (the default) means the caller did not ask to touch the column, while
//! `Patch::Set(value)` carries the new value. Nullable columns use
//! `Patch<Option<T>>`, so `Patch::Set(None)` writes `NULL` and stays distinct
//! from `Patch::Unset`.

/// A single field of a partial update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Patch<T> {
    /// The caller did not provide this field.
    Unset,
    /// The field should be written with this value.
    Set(T),
}

impl<T> Patch<T> {
    /// Returns true when the field carries a value to write.
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    pub fn as_ref(&self) -> Patch<&T> {
        match self {
            Patch::Unset => Patch::Unset,
            Patch::Set(value) => Patch::Set(value),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Patch::Unset => Patch::Unset,
            Patch::Set(value) => Patch::Set(f(value)),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Patch::Unset => None,
            Patch::Set(value) => Some(value),
        }
    }
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unset
    }
}

impl<T> From<T> for Patch<T> {
    fn from(value: T) -> Self {
        Patch::Set(value)
    }
}

/// Free-standing form of [`Patch::is_set`].
pub fn is_set<T>(patch: &Patch<T>) -> bool {
    patch.is_set()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unset() {
        let patch: Patch<i64> = Patch::default();
        assert!(!patch.is_set());
        assert!(!is_set(&patch));
    }

    #[test]
    fn zero_values_are_still_set() {
        assert!(Patch::Set(0_i64).is_set());
        assert!(Patch::Set(String::new()).is_set());
        assert!(Patch::Set(false).is_set());
    }

    #[test]
    fn set_none_differs_from_unset() {
        let cleared: Patch<Option<String>> = Patch::Set(None);
        let untouched: Patch<Option<String>> = Patch::Unset;

        assert!(cleared.is_set());
        assert_ne!(cleared, untouched);
    }

    #[test]
    fn from_value_wraps_in_set() {
        let patch: Patch<i64> = 5.into();
        assert_eq!(patch, Patch::Set(5));
        assert_eq!(patch.map(|v| v * 2).into_option(), Some(10));
    }
}
