use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// A value tied back to the element it was produced for.
///
/// The element reference is weak: a component never keeps its element alive,
/// and it is only there so consumers can correlate values with elements.
pub struct Component<E, T> {
    element: Weak<E>,
    value: T,
}

impl<E, T> Component<E, T> {
    pub fn new(element: Weak<E>, value: T) -> Self {
        Self { element, value }
    }

    /// The originating element, if it still exists.
    pub fn element(&self) -> Option<Arc<E>> {
        self.element.upgrade()
    }

    /// Returns `true` if this component was produced for `element`.
    pub fn is_for(&self, element: &Arc<E>) -> bool {
        std::ptr::eq(self.element.as_ptr(), Arc::as_ptr(element))
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

impl<E, T> Deref for Component<E, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<E, T: Clone> Clone for Component<E, T> {
    fn clone(&self) -> Self {
        Self { element: Weak::clone(&self.element), value: self.value.clone() }
    }
}

impl<E, T: fmt::Debug> fmt::Debug for Component<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("element", &self.element.as_ptr())
            .field("value", &self.value)
            .finish()
    }
}
