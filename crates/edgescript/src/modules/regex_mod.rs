//! Python-like regular expressions on top of the `regex` crate.
//!
//! Divergences from CPython, kept deliberate and documented:
//! - `match` matches at the start of the string (not the whole string);
//!   implemented by anchoring the pattern with `\A(?:...)`.
//! - `split` does not implement CPython's capture-group splitting; an
//!   optional third boolean argument instead includes the whole matched text
//!   between the pieces. The pieces come back as a 1-D string tensor.
//! - Replacement strings in `sub`/`subn` are literal; `$`/backreference
//!   expansion is not performed.

use std::sync::Arc;

use regex::{NoExpand, Regex};

use crate::error::{RunResult, ScriptError};
use crate::intern::{attr_name, Attr, AttrId};
use crate::modules::BuiltinModule;
use crate::stack::CallStack;
use crate::types::tensor::{Tensor, TensorBuf};
use crate::value::{expect_args, Value};

/// One capture group of a match: byte span plus the matched text.
#[derive(Debug, Clone)]
struct MatchGroup {
    start: i64,
    end: i64,
    text: String,
}

/// A regex match object supporting `group/groups/start/end/span`.
///
/// Group 0 is the whole match; absent optional groups are `None`.
#[derive(Debug)]
pub struct RegexMatch {
    groups: Vec<Option<MatchGroup>>,
}

impl RegexMatch {
    fn from_captures(captures: &regex::Captures<'_>) -> Self {
        let groups = (0..captures.len())
            .map(|i| {
                captures.get(i).map(|m| MatchGroup {
                    start: m.start() as i64,
                    end: m.end() as i64,
                    text: m.as_str().to_owned(),
                })
            })
            .collect();
        Self { groups }
    }

    fn group_index(&self, args: &[Value]) -> RunResult<usize> {
        let index = match args.first() {
            Some(arg) => arg.cast_i64()?,
            None => 0,
        };
        if index < 0 || index as usize >= self.groups.len() {
            return Err(ScriptError::index(format!(
                "no such group: {index}"
            )));
        }
        Ok(index as usize)
    }

    /// The participating group addressed by `args`, for `start`/`end`/`span`.
    fn group_span(&self, args: &[Value]) -> RunResult<&MatchGroup> {
        let idx = self.group_index(args)?;
        self.groups[idx].as_ref().ok_or_else(|| {
            ScriptError::index(format!("group {idx} did not participate in the match"))
        })
    }

    pub fn call_attr(&self, attr: AttrId, args: Vec<Value>) -> RunResult<Value> {
        if attr == Attr::Group.id() {
            if args.len() > 1 {
                return Err(ScriptError::argument(format!(
                    "group expects 0 or 1 argument(s), {} given",
                    args.len()
                )));
            }
            let idx = self.group_index(&args)?;
            return Ok(match &self.groups[idx] {
                Some(group) => Value::string(group.text.clone()),
                None => Value::None,
            });
        }
        if attr == Attr::Groups.id() {
            expect_args("groups", &args, 0)?;
            let members: Vec<Value> = self.groups[1..]
                .iter()
                .map(|g| match g {
                    Some(group) => Value::string(group.text.clone()),
                    None => Value::None,
                })
                .collect();
            return Ok(Value::Tuple(Arc::new(members)));
        }
        if attr == Attr::Start.id() {
            return Ok(Value::Int64(self.group_span(&args)?.start));
        }
        if attr == Attr::End.id() {
            return Ok(Value::Int64(self.group_span(&args)?.end));
        }
        if attr == Attr::Span.id() {
            let group = self.group_span(&args)?;
            return Ok(Value::Tuple(Arc::new(vec![
                Value::Int64(group.start),
                Value::Int64(group.end),
            ])));
        }
        Err(ScriptError::type_error(format!(
            "{} not supported on match object",
            attr_name(attr)
        )))
    }
}

fn compile(pattern: &str) -> RunResult<Regex> {
    Regex::new(pattern).map_err(|e| ScriptError::argument(format!("invalid pattern: {e}")))
}

fn compile_anchored(pattern: &str) -> RunResult<Regex> {
    compile(&format!(r"\A(?:{pattern})"))
}

fn two_strings(func: &str, args: &[Value]) -> RunResult<(String, String)> {
    expect_args(func, args, 2)?;
    Ok((args[0].as_str_value()?, args[1].as_str_value()?))
}

fn capture_match(re: &Regex, text: &str) -> Value {
    match re.captures(text) {
        Some(captures) => Value::Match(Arc::new(RegexMatch::from_captures(&captures))),
        None => Value::None,
    }
}

pub(crate) fn call(attr: AttrId, args: Vec<Value>, _stack: &mut CallStack) -> RunResult<Value> {
    if attr == Attr::Match.id() {
        let (pattern, text) = two_strings("match", &args)?;
        return Ok(capture_match(&compile_anchored(&pattern)?, &text));
    }
    if attr == Attr::Search.id() {
        let (pattern, text) = two_strings("search", &args)?;
        return Ok(capture_match(&compile(&pattern)?, &text));
    }
    if attr == Attr::Fullmatch.id() {
        let (pattern, text) = two_strings("fullmatch", &args)?;
        let re = compile(&format!(r"\A(?:{pattern})\z"))?;
        return Ok(capture_match(&re, &text));
    }
    if attr == Attr::Split.id() {
        if args.len() != 2 && args.len() != 3 {
            return Err(ScriptError::argument(format!(
                "split expects 2 or 3 argument(s), {} given",
                args.len()
            )));
        }
        let pattern = args[0].as_str_value()?;
        let text = args[1].as_str_value()?;
        let include_matches = match args.get(2) {
            Some(flag) => {
                if !matches!(flag, Value::Bool(_)) {
                    return Err(ScriptError::argument(
                        "split expects argument at index 2 to be of type bool",
                    ));
                }
                flag.truthy()
            }
            None => false,
        };
        let re = compile(&pattern)?;
        let mut pieces: Vec<String> = Vec::new();
        let mut last = 0;
        for m in re.find_iter(&text) {
            pieces.push(text[last..m.start()].to_owned());
            if include_matches {
                pieces.push(m.as_str().to_owned());
            }
            last = m.end();
        }
        pieces.push(text[last..].to_owned());
        let len = pieces.len() as i64;
        return Ok(Value::Tensor(Arc::new(Tensor::new(
            TensorBuf::Str(pieces),
            &[len],
        )?)));
    }
    if attr == Attr::Findall.id() {
        let (pattern, text) = two_strings("findall", &args)?;
        let re = compile(&pattern)?;
        let mut results = Vec::new();
        for captures in re.captures_iter(&text) {
            results.push(match captures.len() {
                // No groups: the whole match. One group: that group.
                1 | 2 => {
                    let m = captures.get(captures.len() - 1);
                    Value::string(m.map_or("", |m| m.as_str()).to_owned())
                }
                _ => {
                    let members: Vec<Value> = (1..captures.len())
                        .map(|i| {
                            Value::string(
                                captures.get(i).map_or("", |m| m.as_str()).to_owned(),
                            )
                        })
                        .collect();
                    Value::Tuple(Arc::new(members))
                }
            });
        }
        return Ok(Value::list(results));
    }
    if attr == Attr::Finditer.id() {
        let (pattern, text) = two_strings("finditer", &args)?;
        let re = compile(&pattern)?;
        let matches: Vec<Value> = re
            .captures_iter(&text)
            .map(|captures| Value::Match(Arc::new(RegexMatch::from_captures(&captures))))
            .collect();
        return Ok(Value::list(matches));
    }
    if attr == Attr::Sub.id() || attr == Attr::Subn.id() {
        let func = if attr == Attr::Sub.id() { "sub" } else { "subn" };
        if args.len() != 3 && args.len() != 4 {
            return Err(ScriptError::argument(format!(
                "{func} expects 3 or 4 argument(s), {} given",
                args.len()
            )));
        }
        let pattern = args[0].as_str_value()?;
        let replacement = args[1].as_str_value()?;
        let text = args[2].as_str_value()?;
        let max = match args.get(3) {
            Some(arg) => {
                let n = arg.cast_i64()?;
                if n < 0 {
                    return Err(ScriptError::argument(format!(
                        "{func} expects max number of replacements to be a non-negative integer."
                    )));
                }
                n as usize
            }
            None => 0,
        };
        let re = compile(&pattern)?;
        let available = re.find_iter(&text).count();
        let replacements = if max == 0 { available } else { max.min(available) };
        let result = re
            .replacen(&text, replacements, NoExpand(&replacement))
            .into_owned();
        if attr == Attr::Sub.id() {
            return Ok(Value::string(result));
        }
        return Ok(Value::Tuple(Arc::new(vec![
            Value::string(result),
            Value::Int32(replacements as i32),
        ])));
    }
    Err(BuiltinModule::unknown_member(attr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Attr;

    fn call_regex(attr: Attr, args: Vec<Value>) -> RunResult<Value> {
        // The regex module never touches the stack; fabricate none.
        let mut stack = crate::task::detached_stack();
        call(attr.id(), args, &mut stack)
    }

    #[test]
    fn match_is_anchored_at_start_only() {
        let hit = call_regex(
            Attr::Match,
            vec![Value::string("ab"), Value::string("abc")],
        )
        .unwrap();
        assert!(matches!(hit, Value::Match(_)));

        let miss = call_regex(
            Attr::Match,
            vec![Value::string("bc"), Value::string("abc")],
        )
        .unwrap();
        assert!(miss.is_none());

        // search finds it anywhere.
        let found = call_regex(
            Attr::Search,
            vec![Value::string("bc"), Value::string("abc")],
        )
        .unwrap();
        assert!(matches!(found, Value::Match(_)));
    }

    #[test]
    fn split_returns_string_tensor() {
        let result = call_regex(
            Attr::Split,
            vec![Value::string(r",\s*"), Value::string("a, b,c")],
        )
        .unwrap();
        let Value::Tensor(t) = result else {
            panic!("split should return a string tensor");
        };
        assert_eq!(t.shape().as_slice(), &[3]);
        assert_eq!(t.element(1), Value::string("b"));
    }

    #[test]
    fn subn_counts_replacements() {
        let result = call_regex(
            Attr::Subn,
            vec![
                Value::string("a"),
                Value::string("x"),
                Value::string("banana"),
            ],
        )
        .unwrap();
        let Value::Tuple(parts) = result else {
            panic!("subn returns a tuple");
        };
        assert_eq!(parts[0], Value::string("bxnxnx"));
        assert_eq!(parts[1], Value::Int32(3));
    }

    #[test]
    fn findall_group_shapes() {
        let plain = call_regex(
            Attr::Findall,
            vec![Value::string(r"\d+"), Value::string("a1b22c333")],
        )
        .unwrap();
        assert_eq!(plain.size().unwrap(), 3);

        let pairs = call_regex(
            Attr::Findall,
            vec![Value::string(r"(\w)=(\d)"), Value::string("a=1,b=2")],
        )
        .unwrap();
        let first = pairs.get_int_subscript(0).unwrap();
        assert!(matches!(first, Value::Tuple(_)));
    }
}
