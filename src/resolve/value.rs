//! In-memory data graph resolved by [`PropertyResolver`](super::PropertyResolver)

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::OnceCell;
use regex::{Captures, Regex};
use thiserror::Error;

/// A property accessor failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct AccessError {
    message: String,
}

impl AccessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A node of the data graph
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// An enumerated constant, rendered by name (and translated when configured)
    Enum(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    List(Vec<Value>),
    Object(Arc<dyn Properties>),
    /// A value computed elsewhere, unwrapped with a bounded wait
    Deferred(Deferred),
}

/// Discriminant of [`Value`], used to key formatting overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Text,
    Enum,
    Date,
    Time,
    DateTime,
    List,
    Object,
    Deferred,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::Enum(_) => ValueKind::Enum,
            Value::Date(_) => ValueKind::Date,
            Value::Time(_) => ValueKind::Time,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::List(_) => ValueKind::List,
            Value::Object(_) => ValueKind::Object,
            Value::Deferred(_) => ValueKind::Deferred,
        }
    }

    /// Primitive, text, enumerated and temporal values render as text
    pub fn is_scalar(&self) -> bool {
        matches!(
            self.kind(),
            ValueKind::Bool
                | ValueKind::Int
                | ValueKind::Float
                | ValueKind::Text
                | ValueKind::Enum
                | ValueKind::Date
                | ValueKind::Time
                | ValueKind::DateTime
        )
    }

    pub fn text(text: impl Into<String>) -> Self {
        Value::Text(text.into())
    }

    pub fn enumerated(name: impl Into<String>) -> Self {
        Value::Enum(name.into())
    }

    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::Text(v) => write!(f, "Text({v:?})"),
            Value::Enum(v) => write!(f, "Enum({v})"),
            Value::Date(v) => write!(f, "Date({v})"),
            Value::Time(v) => write!(f, "Time({v})"),
            Value::DateTime(v) => write!(f, "DateTime({v})"),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Object(obj) => write!(f, "Object({})", obj.type_name()),
            Value::Deferred(_) => write!(f, "Deferred"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Object(Arc::new(v))
    }
}

impl From<Deferred> for Value {
    fn from(v: Deferred) -> Self {
        Value::Deferred(v)
    }
}

impl From<toml::Value> for Value {
    fn from(v: toml::Value) -> Self {
        match v {
            toml::Value::String(s) => Value::Text(s),
            toml::Value::Integer(i) => Value::Int(i),
            toml::Value::Float(f) => Value::Float(f),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => from_toml_datetime(&dt),
            toml::Value::Array(items) => Value::list(items),
            toml::Value::Table(table) => {
                let record = table
                    .into_iter()
                    .fold(Record::new("table"), |record, (key, value)| {
                        record.with(key, Value::from(value))
                    });
                record.into()
            }
        }
    }
}

fn from_toml_datetime(dt: &toml::value::Datetime) -> Value {
    let date = dt.date.and_then(|d| {
        NaiveDate::from_ymd_opt(d.year.into(), d.month.into(), d.day.into())
    });
    let time = dt.time.and_then(|t| {
        NaiveTime::from_hms_nano_opt(t.hour.into(), t.minute.into(), t.second.into(), t.nanosecond)
    });
    match (date, time) {
        (Some(date), Some(time)) => Value::DateTime(date.and_time(time)),
        (Some(date), None) => Value::Date(date),
        (None, Some(time)) => Value::Time(time),
        (None, None) => Value::Text(dt.to_string()),
    }
}

/// Capability of an object node: named properties plus pattern-matched methods
pub trait Properties: Send + Sync {
    /// Name used in diagnostics
    fn type_name(&self) -> &str;

    /// Direct property lookup; `Ok(None)` when the property does not exist
    fn property(&self, name: &str) -> Result<Option<Value>, AccessError>;

    /// Methods answering every name their pattern matches, in declaration order
    fn dynamic_methods(&self) -> &[DynamicMethod] {
        &[]
    }
}

type MethodFn = dyn Fn(&Captures<'_>) -> Result<Value, AccessError> + Send + Sync;
type ComputedFn = dyn Fn() -> Result<Value, AccessError> + Send + Sync;

/// A method invoked for any placeholder name matching its pattern
#[derive(Clone)]
pub struct DynamicMethod {
    pattern: Regex,
    call: Arc<MethodFn>,
}

impl DynamicMethod {
    /// Compile a method; the pattern must match the whole name
    pub fn new<F>(pattern: &str, call: F) -> Result<Self, regex::Error>
    where
        F: Fn(&Captures<'_>) -> Result<Value, AccessError> + Send + Sync + 'static,
    {
        Ok(Self {
            pattern: Regex::new(&format!("^(?:{pattern})$"))?,
            call: Arc::new(call),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Invoke the method if the name matches
    pub fn invoke(&self, name: &str) -> Option<Result<Value, AccessError>> {
        self.pattern.captures(name).map(|caps| (self.call)(&caps))
    }
}

impl fmt::Debug for DynamicMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicMethod")
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

#[derive(Clone)]
enum Field {
    Value(Value),
    Computed(Arc<ComputedFn>),
}

/// A general-purpose object node built field by field
#[derive(Clone)]
pub struct Record {
    type_name: String,
    fields: Vec<(String, Field)>,
    methods: Vec<DynamicMethod>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Add (or replace) a stored field
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name.into(), Field::Value(value.into()));
        self
    }

    /// Add a field computed on every lookup; errors surface as resolution faults
    pub fn with_computed<F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn() -> Result<Value, AccessError> + Send + Sync + 'static,
    {
        self.set(name.into(), Field::Computed(Arc::new(accessor)));
        self
    }

    pub fn with_method(mut self, method: DynamicMethod) -> Self {
        self.methods.push(method);
        self
    }

    fn set(&mut self, name: String, field: Field) {
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = field,
            None => self.fields.push((name, field)),
        }
    }

    /// Field names in insertion order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }
}

impl Properties for Record {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn property(&self, name: &str) -> Result<Option<Value>, AccessError> {
        match self.fields.iter().find(|(n, _)| n == name) {
            Some((_, Field::Value(value))) => Ok(Some(value.clone())),
            Some((_, Field::Computed(accessor))) => accessor().map(Some),
            None => Ok(None),
        }
    }

    fn dynamic_methods(&self) -> &[DynamicMethod] {
        &self.methods
    }
}

/// Outcome of waiting on a [`Deferred`]
#[derive(Debug, Clone)]
pub enum DeferredOutcome {
    Ready(Value),
    TimedOut,
    Failed(String),
}

/// Pause between attempts to take the receiver from another waiter
const LOCK_POLL: Duration = Duration::from_millis(2);

struct DeferredInner {
    receiver: Mutex<Receiver<Result<Value, AccessError>>>,
    settled: OnceCell<Result<Value, String>>,
}

/// A value produced asynchronously by some other piece of work
///
/// Waiting is bounded. A timeout leaves the value pending so a later wait may
/// still observe it; success and failure are cached once seen.
#[derive(Clone)]
pub struct Deferred {
    inner: Arc<DeferredInner>,
}

/// Producer side of a [`Deferred`]
pub struct Completer {
    sender: SyncSender<Result<Value, AccessError>>,
}

impl Completer {
    pub fn complete(self, value: impl Into<Value>) {
        // The consumer may already be gone; nothing left to notify then.
        let _ = self.sender.send(Ok(value.into()));
    }

    pub fn fail(self, error: AccessError) {
        let _ = self.sender.send(Err(error));
    }
}

impl Deferred {
    /// Create a pending value and the handle that completes it
    pub fn channel() -> (Completer, Deferred) {
        let (sender, receiver) = mpsc::sync_channel(1);
        let deferred = Deferred {
            inner: Arc::new(DeferredInner {
                receiver: Mutex::new(receiver),
                settled: OnceCell::new(),
            }),
        };
        (Completer { sender }, deferred)
    }

    /// An already completed value
    pub fn ready(value: impl Into<Value>) -> Self {
        let (completer, deferred) = Self::channel();
        completer.complete(value);
        deferred
    }

    /// Compute the value on a background thread
    pub fn spawn<F>(producer: F) -> Self
    where
        F: FnOnce() -> Result<Value, AccessError> + Send + 'static,
    {
        let (completer, deferred) = Self::channel();
        std::thread::spawn(move || match producer() {
            Ok(value) => completer.complete(value),
            Err(error) => completer.fail(error),
        });
        deferred
    }

    /// Wait at most `timeout` for the value
    ///
    /// The bound covers waiting behind other callers of the same value too.
    pub fn wait(&self, timeout: Duration) -> DeferredOutcome {
        let started = Instant::now();
        let receiver = loop {
            if let Some(settled) = self.inner.settled.get() {
                return outcome(settled);
            }
            match self.inner.receiver.try_lock() {
                Ok(receiver) => break receiver,
                Err(TryLockError::Poisoned(_)) => {
                    return DeferredOutcome::Failed("deferred value lock poisoned".to_string())
                }
                Err(TryLockError::WouldBlock) => {
                    let remaining = timeout.saturating_sub(started.elapsed());
                    if remaining.is_zero() {
                        return DeferredOutcome::TimedOut;
                    }
                    std::thread::sleep(remaining.min(LOCK_POLL));
                }
            }
        };
        // Another waiter may have settled it while we were polling.
        if let Some(settled) = self.inner.settled.get() {
            return outcome(settled);
        }
        let settled = match receiver.recv_timeout(timeout.saturating_sub(started.elapsed())) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(error.to_string()),
            Err(RecvTimeoutError::Timeout) => return DeferredOutcome::TimedOut,
            Err(RecvTimeoutError::Disconnected) => {
                Err("producer dropped without a value".to_string())
            }
        };
        outcome(self.inner.settled.get_or_init(|| settled))
    }
}

fn outcome(settled: &Result<Value, String>) -> DeferredOutcome {
    match settled {
        Ok(value) => DeferredOutcome::Ready(value.clone()),
        Err(message) => DeferredOutcome::Failed(message.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_lookup_and_replace() {
        let record = Record::new("person").with("name", "Ada").with("name", "Grace");
        match record.property("name").unwrap() {
            Some(Value::Text(name)) => assert_eq!(name, "Grace"),
            other => panic!("expected text, got {:?}", other),
        }
        assert!(record.property("missing").unwrap().is_none());
        assert_eq!(record.field_names().count(), 1);
    }

    #[test]
    fn test_computed_field_error_is_reported() {
        let record = Record::new("broken")
            .with_computed("total", || Err(AccessError::new("division by zero")));
        assert_eq!(
            record.property("total").unwrap_err(),
            AccessError::new("division by zero")
        );
    }

    #[test]
    fn test_dynamic_method_is_anchored() {
        let method = DynamicMethod::new(r"label_(\w+)", |caps| {
            Ok(Value::text(caps[1].to_uppercase()))
        })
        .unwrap();
        assert!(method.invoke("label_x").is_some());
        assert!(method.invoke("my_label_x").is_none());
    }

    #[test]
    fn test_deferred_ready_and_timeout() {
        let ready = Deferred::ready(5);
        assert!(matches!(
            ready.wait(Duration::from_millis(10)),
            DeferredOutcome::Ready(Value::Int(5))
        ));
        // cached on the second wait
        assert!(matches!(
            ready.wait(Duration::from_millis(10)),
            DeferredOutcome::Ready(Value::Int(5))
        ));

        let (completer, pending) = Deferred::channel();
        assert!(matches!(
            pending.wait(Duration::from_millis(10)),
            DeferredOutcome::TimedOut
        ));
        completer.complete("late");
        assert!(matches!(
            pending.wait(Duration::from_millis(10)),
            DeferredOutcome::Ready(Value::Text(_))
        ));
    }

    #[test]
    fn test_concurrent_waits_share_one_deadline() {
        let (_completer, pending) = Deferred::channel();
        let timeout = Duration::from_millis(200);
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let pending = pending.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let started = Instant::now();
                    let outcome = pending.wait(timeout);
                    (outcome, started.elapsed())
                })
            })
            .collect();
        for waiter in waiters {
            let (outcome, elapsed) = waiter.join().unwrap();
            assert!(matches!(outcome, DeferredOutcome::TimedOut));
            assert!(elapsed < Duration::from_millis(350), "waited {elapsed:?}");
        }
    }

    #[test]
    fn test_deferred_failure_and_dropped_producer() {
        let failing = Deferred::spawn(|| Err(AccessError::new("backend down")));
        assert!(matches!(
            failing.wait(Duration::from_secs(5)),
            DeferredOutcome::Failed(msg) if msg == "backend down"
        ));

        let (completer, orphan) = Deferred::channel();
        drop(completer);
        assert!(matches!(
            orphan.wait(Duration::from_millis(10)),
            DeferredOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_toml_conversion() {
        let table: toml::Value = toml::from_str(
            r#"
            name = "Invoice"
            issued = 2024-03-01
            lines = [{ label = "A" }, { label = "B" }]
            "#,
        )
        .unwrap();
        let value = Value::from(table);
        let Value::Object(obj) = value else {
            panic!("expected object");
        };
        assert!(matches!(obj.property("issued").unwrap(), Some(Value::Date(_))));
        match obj.property("lines").unwrap() {
            Some(Value::List(items)) => assert_eq!(items.len(), 2),
            other => panic!("expected list, got {:?}", other),
        }
    }
}
