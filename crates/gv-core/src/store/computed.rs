//! Lazily evaluated derived values

use std::sync::Arc;

use crate::value::{self, Object, Value};

pub(crate) type ComputeFn = Arc<dyn Fn(&Object) -> Value + Send + Sync>;

pub(crate) struct Computed {
    compute: ComputeFn,
    deps: Vec<String>,
    cache: Option<Value>,
}

impl Computed {
    pub fn new(compute: ComputeFn, deps: Vec<String>) -> Self {
        Self {
            compute,
            deps,
            cache: None,
        }
    }

    /// A write to `key` affects this value if `key` is a dependency, lies
    /// below one, or replaces a subtree containing one
    pub fn depends_on(&self, key: &str) -> bool {
        self.deps
            .iter()
            .any(|dep| value::is_within(key, dep) || value::is_within(dep, key))
    }

    pub fn cached(&self) -> Option<&Value> {
        self.cache.as_ref()
    }

    pub fn function(&self) -> ComputeFn {
        self.compute.clone()
    }

    pub fn store(&mut self, value: Value) {
        self.cache = Some(value);
    }

    pub fn invalidate(&mut self) {
        self.cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_matching() {
        let computed = Computed::new(Arc::new(|_: &Object| Value::Null), vec!["filters.minValue".into()]);
        assert!(computed.depends_on("filters.minValue"));
        assert!(computed.depends_on("filters"));
        assert!(computed.depends_on("filters.minValue.unit"));
        assert!(!computed.depends_on("filters.maxValue"));
        assert!(!computed.depends_on("selection"));
    }
}
