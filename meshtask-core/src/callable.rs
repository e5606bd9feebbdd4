//! Task dispatch by name. A submitted task carries only a `task_name`
//! string across the wire — the actual code never moves, mirroring the
//! cross-language-callable-migration Non-goal — so every worker must
//! register the same callables under the same names before `init`.

use std::collections::HashMap;
use std::sync::Arc;

use meshtask_messages::ArgTree;

/// A registrable unit of work. `call` receives the fully materialized
/// argument tree (every id already resolved to a value) and must produce
/// exactly `num_returns` output blobs.
pub trait Callable: Send + Sync {
    fn call(&self, args: &ArgTree, kwargs: &ArgTree, num_returns: usize) -> Result<Vec<Vec<u8>>, String>;
}

impl<F> Callable for F
where
    F: Fn(&ArgTree, &ArgTree, usize) -> Result<Vec<Vec<u8>>, String> + Send + Sync,
{
    fn call(&self, args: &ArgTree, kwargs: &ArgTree, num_returns: usize) -> Result<Vec<Vec<u8>>, String> {
        self(args, kwargs, num_returns)
    }
}

/// Maps a task name to the callable that implements it. Identical
/// registrations are expected on every worker rank.
#[derive(Default, Clone)]
pub struct CallableRegistry {
    callables: HashMap<String, Arc<dyn Callable>>,
}

impl CallableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, callable: impl Callable + 'static) {
        self.callables.insert(name.into(), Arc::new(callable));
    }

    pub fn dispatch(
        &self,
        name: &str,
        args: &ArgTree,
        kwargs: &ArgTree,
        num_returns: usize,
    ) -> Result<Vec<Vec<u8>>, String> {
        match self.callables.get(name) {
            Some(callable) => callable.call(args, kwargs, num_returns),
            None => Err(format!("no callable registered for task {name:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_by_name() {
        let mut registry = CallableRegistry::new();
        registry.register("noop", |_args: &ArgTree, _kwargs: &ArgTree, _n: usize| Ok(vec![]));

        let result = registry.dispatch("noop", &ArgTree::List(vec![]), &ArgTree::List(vec![]), 0);
        assert_eq!(result.unwrap(), Vec::<Vec<u8>>::new());
    }

    #[test]
    fn missing_callable_is_an_error() {
        let registry = CallableRegistry::new();
        let err = registry.dispatch("missing", &ArgTree::List(vec![]), &ArgTree::List(vec![]), 1).unwrap_err();
        assert!(err.contains("missing"));
    }
}
