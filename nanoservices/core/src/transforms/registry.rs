use std::collections::HashMap;
use std::sync::Arc;

use pypeline_utils::error::ConfigError;

use crate::transforms::builtin::{DropNulls, EmptyStringsToNull, Passthrough, TrimStrings};
use crate::transforms::traits::Transform;

type Factory = Arc<dyn Fn() -> Box<dyn Transform> + Send + Sync>;

/// Maps the names used in a definition's `transformers` list to
/// zero-argument constructors. Any string works as a key, dotted module
/// paths included.
#[derive(Clone)]
pub struct TransformRegistry {
    factories: HashMap<String, Factory>,
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("TransformRegistry").field("names", &names).finish()
    }
}

impl TransformRegistry {
    pub fn empty() -> Self {
        Self { factories: HashMap::new() }
    }

    /// `passthrough`, `drop_nulls`, `trim_strings` and `empty_strings_to_null`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register::<Passthrough>("passthrough");
        registry.register::<DropNulls>("drop_nulls");
        registry.register::<TrimStrings>("trim_strings");
        registry.register::<EmptyStringsToNull>("empty_strings_to_null");
        registry
    }

    /// Register a step type under `name`, replacing any previous entry.
    pub fn register<T>(&mut self, name: impl Into<String>) -> &mut Self
    where
        T: Transform + Default + 'static,
    {
        self.register_fn(name, || Box::new(T::default()))
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Transform> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiate the step registered under `name` for the given pype.
    pub fn create(&self, pype: &str, name: &str) -> Result<Box<dyn Transform>, ConfigError> {
        let factory = self.factories.get(name).ok_or_else(|| ConfigError::UnknownTransform {
            pype: pype.to_string(),
            transformer: name.to_string(),
        })?;
        Ok(factory())
    }

    /// Instantiate a whole chain, in order.
    pub fn create_chain(&self, pype: &str, names: &[String]) -> Result<Vec<Box<dyn Transform>>, ConfigError> {
        names.iter().map(|name| self.create(pype, name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pypeline_utils::record::record;
    use pypeline_utils::{PypelineResult, Record, Value};

    #[derive(Default)]
    struct Tag;

    impl Transform for Tag {
        fn name(&self) -> &str { "acme.transforms.Tag" }
        fn apply(&mut self, mut record: Record) -> PypelineResult<Option<Record>> {
            record.insert("tagged".to_string(), Value::Bool(true));
            Ok(Some(record))
        }
    }

    #[test]
    fn builtins_are_registered() {
        let registry = TransformRegistry::default();
        for name in ["passthrough", "drop_nulls", "trim_strings", "empty_strings_to_null"] {
            assert!(registry.contains(name), "missing builtin {name}");
            assert_eq!(registry.create("p", name).unwrap().name(), name);
        }
    }

    #[test]
    fn dotted_names_resolve_to_fresh_instances() {
        let mut registry = TransformRegistry::empty();
        registry.register::<Tag>("acme.transforms.Tag");

        let mut step = registry.create("users", "acme.transforms.Tag").unwrap();
        let out = step.apply(record([("id", 1)])).unwrap().unwrap();
        assert_eq!(out["tagged"], Value::Bool(true));
    }

    #[test]
    fn unknown_name_is_a_config_error() {
        let registry = TransformRegistry::with_builtins();
        let err = registry
            .create_chain("users", &["trim_strings".to_string(), "nope.Missing".to_string()])
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ConfigError::UnknownTransform { ref pype, ref transformer }
                if pype == "users" && transformer == "nope.Missing"
        ));
    }

    #[test]
    fn register_fn_overrides_existing_entry() {
        let mut registry = TransformRegistry::with_builtins();
        registry.register_fn("trim_strings", || Box::new(Tag));
        assert_eq!(registry.create("p", "trim_strings").unwrap().name(), "acme.transforms.Tag");
    }
}
