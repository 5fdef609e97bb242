use hashbrown::HashMap;

pub trait Named {
    fn name(&self) -> &str;
}

/// Insertion-ordered name → entity map.
///
/// Iteration follows insertion order; removal keeps the relative order of
/// the remaining entries.
#[derive(Debug, Clone)]
pub struct NamedMap<T> {
    entries: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for NamedMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Named> NamedMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.entries[i]),
            None => None,
        }
    }

    /// Appends `entry`, handing it back if the name is taken.
    pub fn insert(&mut self, entry: T) -> Result<&mut T, T> {
        if self.index.contains_key(entry.name()) {
            return Err(entry);
        }
        let i = self.entries.len();
        self.index.insert(entry.name().to_string(), i);
        self.entries.push(entry);
        Ok(&mut self.entries[i])
    }

    pub fn remove(&mut self, name: &str) -> Option<T> {
        let i = self.index.remove(name)?;
        let removed = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, T> {
        self.entries.iter_mut()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(Named::name)
    }
}
