use std::collections::HashMap;

/// Maps opaque debugger objects to the small positive integers handed to the
/// DAP client as `frameId` / `variablesReference`.
///
/// Reference `0` is never issued; DAP uses it to mean "no children".
#[derive(Debug)]
pub struct HandleTable<T> {
    next: i64,
    map: HashMap<i64, T>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self {
            next: 0,
            map: HashMap::new(),
        }
    }
}

impl<T> HandleTable<T> {
    pub fn create(&mut self, value: T) -> i64 {
        self.next += 1;
        let id = self.next;
        self.map.insert(id, value);
        id
    }

    pub fn get(&self, id: i64) -> Option<&T> {
        self.map.get(&id)
    }

    /// Drop every entry and restart numbering at 1.
    ///
    /// Used on resume: the client discards all references once it sees a
    /// `continued` event, so reusing small numbers is safe.
    pub fn clear(&mut self) {
        self.map.clear();
        self.next = 0;
    }

    /// Drop every entry but keep counting from the last issued reference, so
    /// a stale reference can never alias a new object.
    pub fn invalidate(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &T)> + '_ {
        self.map.iter().map(|(id, value)| (*id, value))
    }
}
