//! Raw event stores, event hooks, and the dataframe handle.
//!
//! Persistence of events and dataframe contents belongs to the host; the
//! engine keeps the script-visible surface (store handles, hook
//! registration, schema validation) and forwards writes through
//! `HostContext`.

use std::str::FromStr;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::error::{RunResult, ScriptError};
use crate::stack::CallStack;
use crate::value::{DataType, Value};

/// Handle created by `RawEventStore(type, expiryType, expiryValue)`.
///
/// Carries the post-add hook registered through the `add_event` decorator.
#[derive(Debug)]
pub struct RawEventStore {
    event_type: String,
    expiry_type: String,
    expiry_value: i64,
    hook: RwLock<Option<Value>>,
}

impl RawEventStore {
    pub fn new(event_type: String, expiry_type: String, expiry_value: i64) -> RunResult<Self> {
        if expiry_type != "time" && expiry_type != "count" {
            return Err(ScriptError::argument(format!(
                "RawEventStore expiryType should be time/count, given {expiry_type}"
            )));
        }
        Ok(Self {
            event_type,
            expiry_type,
            expiry_value,
            hook: RwLock::new(None),
        })
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn expiry(&self) -> (&str, i64) {
        (&self.expiry_type, self.expiry_value)
    }

    pub fn set_add_event_hook(&self, hook: Value) {
        *self.hook.write() = Some(hook);
    }

    pub fn hook(&self) -> Option<Value> {
        self.hook.read().clone()
    }
}

/// Hook registered through the `pre_add_event` decorator for named event
/// types.
#[derive(Debug)]
pub struct PreEventHook {
    pub types: Vec<String>,
    pub func: Value,
}

/// Task-level registry of event stores and pre-add hooks.
#[derive(Debug, Default)]
pub struct EventRegistry {
    stores: RwLock<Vec<std::sync::Arc<RawEventStore>>>,
    pre_hooks: RwLock<Vec<PreEventHook>>,
}

impl EventRegistry {
    pub fn register_store(&self, store: std::sync::Arc<RawEventStore>) {
        self.stores.write().push(store);
    }

    pub fn register_pre_hook(&self, types: Vec<String>, func: Value) {
        self.pre_hooks.write().push(PreEventHook { types, func });
    }

    pub fn stores_for(&self, event_type: &str) -> Vec<std::sync::Arc<RawEventStore>> {
        self.stores
            .read()
            .iter()
            .filter(|s| s.event_type() == event_type)
            .cloned()
            .collect()
    }

    pub fn pre_hooks_for(&self, event_type: &str) -> Vec<Value> {
        self.pre_hooks
            .read()
            .iter()
            .filter(|h| h.types.iter().any(|t| t == event_type))
            .map(|h| h.func.clone())
            .collect()
    }
}

/// The applied form of the event decorators: `add_event(stores...)` and
/// `pre_add_event(types)` each return one of these, which then receives the
/// decorated function.
#[derive(Debug)]
pub enum EventBinder {
    AddEvent(Vec<Value>),
    PreAddEvent(Vec<String>),
}

impl EventBinder {
    pub fn add_event(stores: Vec<Value>) -> RunResult<Self> {
        for store in &stores {
            if !matches!(store, Value::EventStore(_)) {
                return Err(ScriptError::argument(format!(
                    "RawEventStore required for add_event decorator dataType={} given",
                    store.data_type()
                )));
            }
        }
        Ok(Self::AddEvent(stores))
    }

    pub fn pre_add_event(args: Vec<Value>) -> RunResult<Self> {
        if args.len() != 1 {
            return Err(ScriptError::argument(format!(
                "pre_add_event expects 1 argument, {} given",
                args.len()
            )));
        }
        let Value::List(list) = &args[0] else {
            return Err(ScriptError::argument(format!(
                "pre_add_event decorator accepts argument of the type list. Provided: {}",
                args[0].container_kind()
            )));
        };
        let mut types = Vec::with_capacity(list.len());
        for item in list.snapshot() {
            match item {
                Value::Str(s) => types.push(s.as_str().to_owned()),
                other => {
                    return Err(ScriptError::argument(format!(
                        "Only string data type variables can be defined as types for \
                         pre_add_event hook got {}",
                        other.data_type()
                    )))
                }
            }
        }
        Ok(Self::PreAddEvent(types))
    }

    /// Applies the binder to the decorated function.
    pub fn apply(&self, args: Vec<Value>, stack: &mut CallStack) -> RunResult<Value> {
        if args.len() != 1 {
            return Err(ScriptError::argument(format!(
                "decorator function args should have size 1 given {}.",
                args.len()
            )));
        }
        let func = args.into_iter().next().expect("arity checked");
        match self {
            Self::AddEvent(stores) => {
                for store in stores {
                    let Value::EventStore(store) = store else {
                        unreachable!("validated at binder construction");
                    };
                    store.set_add_event_hook(func.clone());
                }
            }
            Self::PreAddEvent(types) => {
                let task = stack.task().ok_or_else(|| {
                    ScriptError::status(1, "pre_add_event hook registered outside a task")
                })?;
                task.events.register_pre_hook(types.clone(), func.clone());
            }
        }
        Ok(func)
    }
}

/// Schema-validated row sink created by `Dataframe(schema)`.
///
/// Row storage is the host's concern; the handle validates and counts.
#[derive(Debug)]
pub struct Dataframe {
    schema: IndexMap<String, DataType>,
    rows: Mutex<u64>,
}

impl Dataframe {
    /// Builds a dataframe from a schema map of `column -> dtype string`.
    pub fn new(schema: &Value) -> RunResult<Self> {
        let Value::Map(map) = schema else {
            return Err(ScriptError::argument(format!(
                "Dataframe expects a schema map, given {}",
                schema.container_kind()
            )));
        };
        let mut columns = IndexMap::new();
        for (name, dtype_value) in map.snapshot() {
            let dtype_name = dtype_value.as_str_value()?;
            let dtype = DataType::from_str(&dtype_name).map_err(|_| {
                ScriptError::argument(format!("{dtype_name} is not a dataType"))
            })?;
            columns.insert(name, dtype);
        }
        Ok(Self {
            schema: columns,
            rows: Mutex::new(0),
        })
    }

    pub fn num_rows(&self) -> u64 {
        *self.rows.lock()
    }

    /// Validates a row against the schema and accepts it.
    pub fn append(&self, row: &Value) -> RunResult<()> {
        let Value::Map(map) = row else {
            return Err(ScriptError::argument(format!(
                "Dataframe append expects a map, given {}",
                row.container_kind()
            )));
        };
        for (column, dtype) in &self.schema {
            let value = map.get(column)?;
            let compatible = match dtype {
                DataType::Bool
                | DataType::Int32
                | DataType::Int64
                | DataType::Float
                | DataType::Double => value.is_numeric_scalar(),
                DataType::String => value.is_string(),
                _ => true,
            };
            if !compatible {
                return Err(ScriptError::argument(format!(
                    "column {column} expects {dtype}, given {}",
                    value.data_type()
                )));
            }
        }
        *self.rows.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::map::ScriptMap;
    use std::sync::Arc;

    fn schema_map() -> Value {
        let m = ScriptMap::new();
        m.set("id", Value::string("int64"));
        m.set("name", Value::string("string"));
        Value::Map(Arc::new(m))
    }

    #[test]
    fn dataframe_validates_rows_against_schema() {
        let df = Dataframe::new(&schema_map()).unwrap();
        let row = ScriptMap::new();
        row.set("id", Value::Int64(1));
        row.set("name", Value::string("a"));
        df.append(&Value::Map(Arc::new(row))).unwrap();
        assert_eq!(df.num_rows(), 1);

        let bad = ScriptMap::new();
        bad.set("id", Value::string("oops"));
        bad.set("name", Value::string("a"));
        assert!(df.append(&Value::Map(Arc::new(bad))).is_err());
    }

    #[test]
    fn event_store_rejects_unknown_expiry() {
        assert!(RawEventStore::new("e".into(), "time".into(), 10).is_ok());
        assert!(RawEventStore::new("e".into(), "weeks".into(), 10).is_err());
    }
}
