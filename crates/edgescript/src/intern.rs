//! Process-wide attribute-name interning.
//!
//! Every attribute name ever observed (builtin member functions plus
//! user-defined class members) is assigned a stable integer. Member tables
//! and attribute-access AST nodes are keyed by [`AttrId`]; the string form is
//! only needed for error messages.
//!
//! Ids 0..`Attr::COUNT` are the builtin attributes below; dynamic names are
//! appended to a registry behind a lock. The table only ever grows.

use std::str::FromStr;
use std::sync::OnceLock;

use ahash::AHashMap;
use parking_lot::RwLock;
use strum::{EnumCount, EnumString, FromRepr, IntoStaticStr};

/// Stable index of an interned attribute name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrId(u32);

impl AttrId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Attribute names known at compile time.
///
/// The strum string form is the exact spelling scripts use.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr, FromRepr, EnumCount)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum Attr {
    // Tensor / shared container members
    Reshape,
    Shape,
    Append,
    Sort,
    Argsort,
    Topk,
    Arrange,
    #[strum(serialize = "is_integer")]
    IsInteger,
    #[strum(serialize = "is_float")]
    IsFloat,
    #[strum(serialize = "is_string")]
    IsString,
    Pop,
    Keys,
    Iterator,
    Next,

    // String members
    Upper,
    Lower,
    Strip,
    Join,

    // nimblenet module members
    #[strum(serialize = "Model")]
    Model,
    Llm,
    #[strum(serialize = "Retriever")]
    Retriever,
    Zeros,
    Tensor,
    Time,
    #[strum(serialize = "get_config")]
    GetConfig,
    Exp,
    Pow,
    Min,
    Max,
    Sum,
    Mean,
    #[strum(serialize = "parse_json")]
    ParseJson,
    Log,
    #[strum(serialize = "RawEventStore")]
    RawEventStore,
    #[strum(serialize = "Dataframe")]
    Dataframe,
    #[strum(serialize = "ConcurrentExecutor")]
    ConcurrentExecutor,
    #[strum(serialize = "set_threadpool_threads")]
    SetThreadpoolThreads,
    #[strum(serialize = "list_compatible_llms")]
    ListCompatibleLlms,

    // internal module members
    #[strum(serialize = "get_chrono_time")]
    GetChronoTime,
    #[strum(serialize = "create_simulated_char_stream")]
    CreateSimulatedCharStream,

    // regex module + match object members
    #[strum(serialize = "match")]
    Match,
    Search,
    Fullmatch,
    Split,
    Findall,
    Finditer,
    Sub,
    Subn,
    Group,
    Groups,
    Start,
    End,
    Span,

    // Model / future / stream members
    Run,
    Status,
    #[strum(serialize = "is_available")]
    IsAvailable,
    Get,
    #[strum(serialize = "wait_for_completion")]
    WaitForCompletion,
    Finished,
    #[strum(serialize = "next_available")]
    NextAvailable,
    #[strum(serialize = "get_blocking_str")]
    GetBlockingStr,
    Prompt,
    Cancel,

    // Concurrent executor members
    Sync,
    #[strum(serialize = "run_parallel")]
    RunParallel,

    // Class machinery
    #[strum(serialize = "__init__")]
    Constructor,
}

impl Attr {
    #[inline]
    pub fn id(self) -> AttrId {
        AttrId(self as u32)
    }
}

#[derive(Debug, Default)]
struct DynamicAttrs {
    by_name: AHashMap<String, AttrId>,
    names: Vec<String>,
}

static DYNAMIC: OnceLock<RwLock<DynamicAttrs>> = OnceLock::new();

fn dynamic() -> &'static RwLock<DynamicAttrs> {
    DYNAMIC.get_or_init(|| RwLock::new(DynamicAttrs::default()))
}

/// Interns `name`, returning its stable id.
///
/// Builtin attribute names resolve without touching the dynamic table.
pub fn intern_attr(name: &str) -> AttrId {
    if let Ok(attr) = Attr::from_str(name) {
        return attr.id();
    }
    {
        let table = dynamic().read();
        if let Some(id) = table.by_name.get(name) {
            return *id;
        }
    }
    let mut table = dynamic().write();
    if let Some(id) = table.by_name.get(name) {
        return *id;
    }
    let id = AttrId(Attr::COUNT as u32 + table.names.len() as u32);
    table.names.push(name.to_owned());
    table.by_name.insert(name.to_owned(), id);
    id
}

/// Returns the string form of an attribute id, for error messages.
pub fn attr_name(id: AttrId) -> String {
    let builtin_count = Attr::COUNT as u32;
    if id.0 < builtin_count {
        let attr = Attr::from_repr(id.0).expect("builtin attr id in range");
        let s: &'static str = attr.into();
        s.to_owned()
    } else {
        let table = dynamic().read();
        table
            .names
            .get((id.0 - builtin_count) as usize)
            .cloned()
            .unwrap_or_else(|| format!("<attr#{}>", id.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_resolve_to_fixed_ids() {
        assert_eq!(intern_attr("reshape"), Attr::Reshape.id());
        assert_eq!(intern_attr("__init__"), Attr::Constructor.id());
        assert_eq!(intern_attr("run_parallel"), Attr::RunParallel.id());
    }

    #[test]
    fn dynamic_names_are_stable() {
        let a = intern_attr("user_member_xyz");
        let b = intern_attr("user_member_xyz");
        assert_eq!(a, b);
        assert_eq!(attr_name(a), "user_member_xyz");
    }
}
