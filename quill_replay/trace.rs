//! Trace parser
//!
//! A trace is a line-oriented record of the reference operations an interpreter performed. Names
//! bind values for the rest of the trace; `#` starts a comment.

use quill_gc::ContainerKind;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    NewContainer { kind: ContainerKind, name: String },
    NewBuffer { name: String, size: usize },
    Int { name: String, value: i128 },
    Bytes { name: String, text: String },
    Push { name: String, count: usize },
    Pop { name: String },
    Append { owner: String, child: String },
    Set { owner: String, index: usize, child: String },
    Put { owner: String, key: String, child: String },
    Remove { owner: String, index: usize },
    Delete { owner: String, key: String },
    Clear { owner: String },
    Settle,
}

/// An operation together with the 1-based line it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceLine {
    pub line: usize,
    pub op: Op,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: unknown operation `{op}`")]
    UnknownOp { line: usize, op: String },

    #[error("line {line}: `{op}` expects {expected}")]
    Operands {
        line: usize,
        op: &'static str,
        expected: &'static str,
    },

    #[error("line {line}: invalid number `{text}`")]
    InvalidNumber { line: usize, text: String },

    #[error("line {line}: unknown value kind `{kind}`")]
    UnknownKind { line: usize, kind: String },
}

struct LineParser<'a> {
    line: usize,
    op: &'static str,
    expected: &'static str,
    words: &'a [&'a str],
}

impl<'a> LineParser<'a> {
    fn exact(&self, len: usize) -> Result<(), ParseError> {
        if self.words.len() == len {
            Ok(())
        } else {
            Err(self.operands_error())
        }
    }

    fn operands_error(&self) -> ParseError {
        ParseError::Operands {
            line: self.line,
            op: self.op,
            expected: self.expected,
        }
    }

    fn name(&self, index: usize) -> String {
        self.words[index].to_owned()
    }

    fn number<T: core::str::FromStr>(&self, index: usize) -> Result<T, ParseError> {
        let text = self.words[index];
        text.parse().map_err(|_| ParseError::InvalidNumber {
            line: self.line,
            text: text.to_owned(),
        })
    }
}

fn parse_line(line: usize, op_name: &str, operands: &[&str]) -> Result<Op, ParseError> {
    let parser = |op: &'static str, expected: &'static str| LineParser {
        line,
        op,
        expected,
        words: operands,
    };

    let op = match op_name {
        "new" => {
            let p = parser("new", "a kind and a name");
            match operands.first().copied() {
                Some("buffer") => {
                    p.exact(3)?;
                    Op::NewBuffer {
                        name: p.name(1),
                        size: p.number(2)?,
                    }
                }
                Some(kind) => {
                    p.exact(2)?;
                    let kind = match kind {
                        "array" => ContainerKind::Array,
                        "struct" => ContainerKind::Struct,
                        "map" => ContainerKind::Map,
                        other => {
                            return Err(ParseError::UnknownKind {
                                line,
                                kind: other.to_owned(),
                            })
                        }
                    };
                    Op::NewContainer {
                        kind,
                        name: p.name(1),
                    }
                }
                None => return Err(p.operands_error()),
            }
        }
        "int" => {
            let p = parser("int", "a name and a value");
            p.exact(2)?;
            Op::Int {
                name: p.name(0),
                value: p.number(1)?,
            }
        }
        "bytes" => {
            let p = parser("bytes", "a name and a value");
            p.exact(2)?;
            Op::Bytes {
                name: p.name(0),
                text: p.name(1),
            }
        }
        "push" => {
            let p = parser("push", "a name and an optional count");
            let count = match operands.len() {
                1 => 1,
                2 => p.number(1)?,
                _ => return Err(p.operands_error()),
            };
            Op::Push {
                name: p.name(0),
                count,
            }
        }
        "pop" => {
            let p = parser("pop", "a name");
            p.exact(1)?;
            Op::Pop { name: p.name(0) }
        }
        "append" => {
            let p = parser("append", "an owner and a child");
            p.exact(2)?;
            Op::Append {
                owner: p.name(0),
                child: p.name(1),
            }
        }
        "set" => {
            let p = parser("set", "an owner, an index and a child");
            p.exact(3)?;
            Op::Set {
                owner: p.name(0),
                index: p.number(1)?,
                child: p.name(2),
            }
        }
        "put" => {
            let p = parser("put", "an owner, a key and a child");
            p.exact(3)?;
            Op::Put {
                owner: p.name(0),
                key: p.name(1),
                child: p.name(2),
            }
        }
        "remove" => {
            let p = parser("remove", "an owner and an index");
            p.exact(2)?;
            Op::Remove {
                owner: p.name(0),
                index: p.number(1)?,
            }
        }
        "delete" => {
            let p = parser("delete", "an owner and a key");
            p.exact(2)?;
            Op::Delete {
                owner: p.name(0),
                key: p.name(1),
            }
        }
        "clear" => {
            let p = parser("clear", "an owner");
            p.exact(1)?;
            Op::Clear { owner: p.name(0) }
        }
        "settle" => {
            parser("settle", "no operands").exact(0)?;
            Op::Settle
        }
        other => {
            return Err(ParseError::UnknownOp {
                line,
                op: other.to_owned(),
            })
        }
    };

    Ok(op)
}

/// Parse a whole trace, stopping at the first malformed line.
pub fn parse_trace(source: &str) -> Result<Vec<TraceLine>, ParseError> {
    let mut trace = Vec::new();

    for (index, text) in source.lines().enumerate() {
        let text = match text.find('#') {
            Some(comment) => &text[..comment],
            None => text,
        };

        let words = text.split_whitespace().collect::<Vec<_>>();
        let Some((op_name, operands)) = words.split_first() else {
            continue;
        };

        let line = index + 1;
        trace.push(TraceLine {
            line,
            op: parse_line(line, op_name, operands)?,
        });
    }

    Ok(trace)
}
