//! Dynamically typed per-object storage.

use std::any::Any;

/// One value of any type attached to a handle's data block and shared by
/// every copy of the handle.
#[derive(Default)]
pub struct UserData(Option<Box<dyn Any>>);

impl UserData {
    pub fn set<T: Any>(&mut self, value: T) {
        self.0 = Some(Box::new(value));
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.as_ref()?.downcast_ref()
    }

    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.0.as_mut()?.downcast_mut()
    }

    /// Remove and return the value if it has type `T`.
    pub fn take<T: Any>(&mut self) -> Option<T> {
        match self.0.take()?.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.0 = Some(other);
                None
            }
        }
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.as_ref().map_or(false, |v| v.is::<T>())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }
}

impl std::fmt::Debug for UserData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserData").field("set", &self.0.is_some()).finish()
    }
}
