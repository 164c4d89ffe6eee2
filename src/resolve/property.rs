//! Default resolver over the in-memory value graph

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::format::{Formatters, Locale, Translator};
use super::registry::CustomRegistry;
use super::value::{DeferredOutcome, Value};
use super::{Custom, Data, ResolveError, Resolver, ResolverSet};

/// Settings shared by a resolver and every child scope it creates
#[derive(Clone)]
pub struct ResolutionSettings {
    pub formatters: Formatters,
    pub locale: Locale,
    pub translator: Option<Translator>,
    pub registry: CustomRegistry,
    /// Upper bound for unwrapping a deferred value
    pub deferred_timeout: Duration,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            formatters: Formatters::default(),
            locale: Locale::default(),
            translator: None,
            registry: CustomRegistry::default(),
            deferred_timeout: Duration::from_secs(5),
        }
    }
}

/// Resolves placeholder names against a bound [`Value`]
///
/// Precedence for a name, first match wins:
/// 1. the custom placeholder registry
/// 2. dynamic methods of the bound object, in declaration order
/// 3. a direct property of the bound object
/// 4. a dotted path, `a.b` resolving `b` in the single scope `a` yields
/// 5. `this`, the current scope itself
#[derive(Clone)]
pub struct PropertyResolver {
    value: Value,
    settings: Arc<ResolutionSettings>,
    use_registry: bool,
}

impl PropertyResolver {
    /// Create a resolver with default settings
    pub fn new(value: impl Into<Value>) -> Self {
        Self::with_settings(value, Arc::new(ResolutionSettings::default()))
    }

    pub fn with_settings(value: impl Into<Value>, settings: Arc<ResolutionSettings>) -> Self {
        Self {
            value: value.into(),
            settings,
            use_registry: true,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn settings(&self) -> &Arc<ResolutionSettings> {
        &self.settings
    }

    /// Same scope with the custom registry switched off
    pub fn without_registry(&self) -> Self {
        Self {
            use_registry: false,
            ..self.clone()
        }
    }

    fn child(&self, value: Value) -> Arc<dyn Resolver> {
        Arc::new(Self::with_settings(value, Arc::clone(&self.settings)))
    }

    fn format(&self, value: &Value) -> Option<String> {
        let settings = &self.settings;
        settings
            .formatters
            .format(value, &settings.locale, settings.translator.as_ref())
    }

    /// Type classification of a raw value
    fn classify(&self, name: &str, value: Value) -> Option<Data> {
        match value {
            Value::Null => None,
            Value::List(items) => {
                let children = items.into_iter().map(|item| self.child(item)).collect();
                Some(Data::Set(ResolverSet::new(children)))
            }
            Value::Object(_) => Some(Data::Set(ResolverSet::single(self.child(value)))),
            Value::Deferred(deferred) => match deferred.wait(self.settings.deferred_timeout) {
                DeferredOutcome::Ready(inner) => self.classify(name, inner),
                DeferredOutcome::TimedOut => {
                    warn!(name, timeout = ?self.settings.deferred_timeout, "deferred value timed out, treating as not found");
                    None
                }
                DeferredOutcome::Failed(reason) => {
                    warn!(name, %reason, "deferred value failed, treating as not found");
                    None
                }
            },
            scalar => self.format(&scalar).map(Data::Scalar),
        }
    }

    fn registry_match(&self, name: &str) -> Option<Data> {
        if !self.use_registry {
            return None;
        }
        let handler = self.settings.registry.create(name)?;
        let scope: Arc<dyn Resolver> = Arc::new(self.without_registry());
        Some(Data::Custom(Custom::new(name, handler, scope)))
    }

    fn dynamic_match(&self, name: &str) -> Result<Option<Data>, ResolveError> {
        let Value::Object(object) = &self.value else {
            return Ok(None);
        };
        for method in object.dynamic_methods() {
            if let Some(result) = method.invoke(name) {
                let value = result.map_err(|e| ResolveError::fault(name, e))?;
                return Ok(match self.format(&value) {
                    Some(text) => Some(Data::Scalar(text)),
                    None => self.classify(name, value),
                });
            }
        }
        Ok(None)
    }

    fn property_match(&self, name: &str) -> Result<Option<Data>, ResolveError> {
        let Value::Object(object) = &self.value else {
            return Ok(None);
        };
        match object.property(name) {
            Ok(Some(value)) => Ok(self.classify(name, value)),
            Ok(None) => Ok(None),
            Err(e) => Err(ResolveError::fault(name, e)),
        }
    }

    fn path_match(&self, name: &str) -> Result<Option<Data>, ResolveError> {
        let Some((head, rest)) = name.split_once('.') else {
            return Ok(None);
        };
        match self.resolve(head)? {
            Some(Data::Set(set)) if set.count() == 1 => set.children()[0].resolve(rest),
            _ => Ok(None),
        }
    }

    fn this_match(&self, name: &str) -> Option<Data> {
        if name != "this" {
            return None;
        }
        // A scope bound to a plain value has nothing to traverse into.
        if self.value.is_scalar() {
            return self.format(&self.value).map(Data::Scalar);
        }
        Some(Data::Set(ResolverSet::single(Arc::new(self.clone()))))
    }
}

impl Resolver for PropertyResolver {
    fn resolve(&self, name: &str) -> Result<Option<Data>, ResolveError> {
        if let Some(custom) = self.registry_match(name) {
            return Ok(Some(custom));
        }
        if let Some(data) = self.dynamic_match(name)? {
            return Ok(Some(data));
        }
        if let Some(data) = self.property_match(name)? {
            return Ok(Some(data));
        }
        if let Some(data) = self.path_match(name)? {
            return Ok(Some(data));
        }
        Ok(self.this_match(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::format::Formatter;
    use crate::resolve::registry::CustomPlaceholder;
    use crate::resolve::value::{AccessError, Deferred, DynamicMethod, Record, ValueKind};
    use chrono::NaiveDate;

    #[derive(Default)]
    struct Marker;

    impl CustomPlaceholder for Marker {}

    fn scalar(data: Option<Data>) -> String {
        match data {
            Some(Data::Scalar(text)) => text,
            other => panic!("expected scalar, got {:?}", other),
        }
    }

    fn invoice() -> Value {
        Record::new("invoice")
            .with("number", 17)
            .with(
                "customer",
                Record::new("customer")
                    .with("name", "ACME")
                    .with("address", Record::new("address").with("city", "Springfield")),
            )
            .with(
                "lines",
                vec![
                    Record::new("line").with("label", "A"),
                    Record::new("line").with("label", "B"),
                ],
            )
            .with("a.b", "literal")
            .into()
    }

    #[test]
    fn test_direct_property() {
        let resolver = PropertyResolver::new(invoice());
        assert_eq!(scalar(resolver.resolve("number").unwrap()), "17");
        assert!(resolver.resolve("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_yields_set_in_order() {
        let resolver = PropertyResolver::new(invoice());
        let Some(Data::Set(set)) = resolver.resolve("lines").unwrap() else {
            panic!("expected set");
        };
        assert_eq!(set.count(), 2);
        let labels: Vec<String> = set
            .iter()
            .map(|child| scalar(child.resolve("label").unwrap()))
            .collect();
        assert_eq!(labels, vec!["A", "B"]);
    }

    #[test]
    fn test_dotted_path_matches_stepwise_resolution() {
        let resolver = PropertyResolver::new(invoice());
        let direct = scalar(resolver.resolve("customer.address.city").unwrap());

        let Some(Data::Set(customer)) = resolver.resolve("customer").unwrap() else {
            panic!("expected set");
        };
        let Some(Data::Set(address)) = customer.children()[0].resolve("address").unwrap() else {
            panic!("expected set");
        };
        let stepwise = scalar(address.children()[0].resolve("city").unwrap());
        assert_eq!(direct, stepwise);
        assert_eq!(direct, "Springfield");
    }

    #[test]
    fn test_dotted_path_through_multi_element_set_is_not_found() {
        let resolver = PropertyResolver::new(invoice());
        assert!(resolver.resolve("lines.label").unwrap().is_none());
    }

    #[test]
    fn test_direct_property_wins_over_dotted_path() {
        let resolver = PropertyResolver::new(invoice());
        assert_eq!(scalar(resolver.resolve("a.b").unwrap()), "literal");
    }

    #[test]
    fn test_this_wraps_current_scope() {
        let resolver = PropertyResolver::new(invoice());
        let Some(Data::Set(set)) = resolver.resolve("this").unwrap() else {
            panic!("expected set");
        };
        assert_eq!(set.count(), 1);
        assert_eq!(scalar(set.children()[0].resolve("number").unwrap()), "17");
        assert_eq!(scalar(resolver.resolve("this.number").unwrap()), "17");
    }

    #[test]
    fn test_this_on_plain_value_is_scalar() {
        let resolver = PropertyResolver::new("tag");
        assert_eq!(scalar(resolver.resolve("this").unwrap()), "tag");
    }

    #[test]
    fn test_registry_wins_over_property() {
        let settings = ResolutionSettings {
            registry: CustomRegistry::new().with::<Marker>("number"),
            ..ResolutionSettings::default()
        };
        let resolver = PropertyResolver::with_settings(invoice(), Arc::new(settings));
        let Some(Data::Custom(custom)) = resolver.resolve("number").unwrap() else {
            panic!("expected custom");
        };
        // the handler's scope sees the underlying data
        assert_eq!(scalar(custom.scope().resolve("number").unwrap()), "17");
    }

    #[test]
    fn test_dynamic_methods_in_declaration_order() {
        let value: Value = Record::new("labels")
            .with("label_en", "stored")
            .with_method(
                DynamicMethod::new(r"label_(\w+)", |caps| Ok(Value::text(format!("first:{}", &caps[1]))))
                    .unwrap(),
            )
            .with_method(DynamicMethod::new(r"label_.*", |_| Ok(Value::text("second"))).unwrap())
            .into();
        let resolver = PropertyResolver::new(value);
        assert_eq!(scalar(resolver.resolve("label_en").unwrap()), "first:en");
    }

    #[test]
    fn test_accessor_failure_is_a_fault_not_empty() {
        let value: Value = Record::new("broken")
            .with_computed("total", || Err(AccessError::new("boom")))
            .into();
        let resolver = PropertyResolver::new(value);
        let err = resolver.resolve("total").unwrap_err();
        assert!(err.to_string().contains("total"));
    }

    #[test]
    fn test_deferred_values_unwrap_or_downgrade() {
        let (_completer, pending) = Deferred::channel();
        let value: Value = Record::new("async")
            .with("ready", Deferred::ready(vec![1, 2, 3]))
            .with("pending", pending)
            .into();
        let settings = ResolutionSettings {
            deferred_timeout: Duration::from_millis(20),
            ..ResolutionSettings::default()
        };
        let resolver = PropertyResolver::with_settings(value, Arc::new(settings));
        match resolver.resolve("ready").unwrap() {
            Some(Data::Set(set)) => assert_eq!(set.count(), 3),
            other => panic!("expected set, got {:?}", other),
        }
        assert!(resolver.resolve("pending").unwrap().is_none());
    }

    #[test]
    fn test_formatting_override_is_applied() {
        let settings = ResolutionSettings {
            formatters: Formatters::new()
                .with(ValueKind::Date, Formatter::Pattern("%d/%m/%Y".into())),
            ..ResolutionSettings::default()
        };
        let value: Value = Record::new("doc")
            .with("issued", NaiveDate::from_ymd_opt(2024, 12, 31).unwrap())
            .into();
        let resolver = PropertyResolver::with_settings(value, Arc::new(settings));
        assert_eq!(scalar(resolver.resolve("issued").unwrap()), "31/12/2024");
    }
}
