/// Checker-attached metadata slot.
///
/// Structural equality of AST nodes is purely syntactic: two nodes compare
/// equal whether or not the type checker has filled their slots yet. That
/// keeps `parse(pretty_print(p)) == p` valid for type-checked programs.
#[derive(Debug, Clone)]
pub struct Resolved<T>(Option<T>);

impl<T> Resolved<T> {
    pub fn none() -> Self {
        Resolved(None)
    }

    pub fn new(value: T) -> Self {
        Resolved(Some(value))
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn set(&mut self, value: T) {
        self.0 = Some(value);
    }

    pub fn is_resolved(&self) -> bool {
        self.0.is_some()
    }
}

impl<T> Default for Resolved<T> {
    fn default() -> Self {
        Resolved(None)
    }
}

impl<T> PartialEq for Resolved<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T> From<T> for Resolved<T> {
    fn from(value: T) -> Self {
        Resolved(Some(value))
    }
}
