//! Scope of one loop iteration

use std::sync::Arc;

use super::{Data, ResolveError, Resolver, ResolverSet};

/// The child scope of one loop iteration, reachable under a singular alias
///
/// Inside loop `items`, names resolve against the element first; `item` then
/// names the element itself, so `{{item.label}}` and `{{label}}` agree.
#[derive(Clone)]
pub struct IterationScope {
    element: Arc<dyn Resolver>,
    alias: Option<String>,
}

impl IterationScope {
    pub fn new(element: Arc<dyn Resolver>, loop_name: &str) -> Self {
        Self {
            element,
            alias: singular(loop_name),
        }
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
}

/// Last path segment of a loop name with one trailing `s` removed
fn singular(loop_name: &str) -> Option<String> {
    let last = loop_name.rsplit('.').next()?;
    let stem = last.strip_suffix('s')?;
    (!stem.is_empty() && stem != "thi").then(|| stem.to_string())
}

impl Resolver for IterationScope {
    fn resolve(&self, name: &str) -> Result<Option<Data>, ResolveError> {
        if let Some(data) = self.element.resolve(name)? {
            return Ok(Some(data));
        }
        let Some(alias) = self.alias.as_deref() else {
            return Ok(None);
        };
        if name == alias {
            return Ok(Some(Data::Set(ResolverSet::single(Arc::clone(&self.element)))));
        }
        match name.strip_prefix(alias).and_then(|rest| rest.strip_prefix('.')) {
            Some(rest) => self.element.resolve(rest),
            None => Ok(None),
        }
    }
}
